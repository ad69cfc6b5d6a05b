//! Azure teardown runs against an in-memory cloud inventory.

use pke_workflow::names::DELETE_INFRA_WORKFLOW_NAME;
use pke_workflow::proxy::InMemoryPasswordSecretStore;
use pke_workflow::workflows::{DeleteAzureInfrastructureWorkflowInput, DeleteInfrastructureWorkflow};
use pke_workflow::{
    register, InMemoryResourceDeleter, OrganizationId, PkeDependencies, ResourceKind,
};
use proptest::prelude::*;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use workflow_engine::types::{
    ActivityError, ActivityOptions, HistoryEvent, RunId, RunStatus, TimeoutKind, WorkflowError,
};
use workflow_engine::{HistoryStore, InMemoryHistoryStore, Registry, RuntimeConfig, WorkflowRuntime};

fn names(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn cluster_input() -> DeleteAzureInfrastructureWorkflowInput {
    DeleteAzureInfrastructureWorkflowInput {
        organization_id: OrganizationId(13),
        cluster_name: "pke-test".into(),
        secret_id: "azure-creds".into(),
        resource_group_name: "pke-test-rg".into(),
        load_balancer_names: names(&["kubernetes", "kubernetes-internal"]),
        public_ip_address_names: names(&["pke-test-ip"]),
        route_table_name: "pke-test-rt".into(),
        scale_set_names: names(&["pool-1", "pool-2"]),
        security_group_names: names(&["master-nsg", "worker-nsg"]),
        virtual_network_name: "pke-test-vnet".into(),
    }
}

fn inventory(input: &DeleteAzureInfrastructureWorkflowInput) -> InMemoryResourceDeleter {
    InMemoryResourceDeleter::new()
        .with_resources(ResourceKind::ScaleSet, input.scale_set_names.clone())
        .with_resources(ResourceKind::LoadBalancer, input.load_balancer_names.clone())
        .with_resources(ResourceKind::PublicIpAddress, input.public_ip_address_names.clone())
        .with_resources(ResourceKind::VirtualNetwork, [input.virtual_network_name.clone()])
        .with_resources(ResourceKind::RouteTable, [input.route_table_name.clone()])
        .with_resources(ResourceKind::SecurityGroup, input.security_group_names.clone())
}

fn build_runtime(deleter: Arc<InMemoryResourceDeleter>, store: Arc<dyn HistoryStore>) -> WorkflowRuntime {
    build_runtime_with(deleter, store, RuntimeConfig::default())
}

fn build_runtime_with(
    deleter: Arc<InMemoryResourceDeleter>,
    store: Arc<dyn HistoryStore>,
    config: RuntimeConfig,
) -> WorkflowRuntime {
    let mut builder = Registry::builder();
    register(
        &mut builder,
        PkeDependencies {
            deleter,
            secrets: Arc::new(InMemoryPasswordSecretStore::new()),
            retry: None,
        },
    )
    .unwrap();
    WorkflowRuntime::new(builder.build().unwrap(), store, config)
}

async fn recorded_phases(store: &dyn HistoryStore, run: &RunId) -> Vec<String> {
    store
        .load(run)
        .await
        .unwrap()
        .into_iter()
        .filter_map(|record| match record.event {
            HistoryEvent::PhaseStarted { phase, .. } => Some(phase),
            _ => None,
        })
        .collect()
}

fn teardown_rank(kind: ResourceKind) -> usize {
    ResourceKind::TEARDOWN_ORDER
        .iter()
        .position(|k| *k == kind)
        .unwrap()
}

#[tokio::test]
async fn test_teardown_deletes_everything_in_order() {
    let input = cluster_input();
    let deleter = Arc::new(inventory(&input));
    let store = Arc::new(InMemoryHistoryStore::new());
    let runtime = build_runtime(deleter.clone(), store.clone());

    let run = runtime
        .submit::<DeleteInfrastructureWorkflow>(input)
        .await
        .unwrap();
    runtime
        .wait::<DeleteInfrastructureWorkflow>(&run)
        .await
        .unwrap();

    assert!(deleter.remaining().is_empty());

    let ranks: Vec<usize> = deleter
        .calls()
        .iter()
        .map(|call| teardown_rank(call.kind))
        .collect();
    assert_eq!(ranks.len(), 9);
    assert!(ranks.windows(2).all(|pair| pair[0] <= pair[1]));

    let expected: Vec<String> = ResourceKind::TEARDOWN_ORDER
        .iter()
        .map(|kind| kind.as_str().to_string())
        .collect();
    assert_eq!(recorded_phases(store.as_ref(), &run).await, expected);

    match runtime.status(&run).await.unwrap() {
        RunStatus::Completed { workflow, .. } => assert_eq!(workflow, DELETE_INFRA_WORKFLOW_NAME),
        other => panic!("unexpected status {:?}", other),
    }
}

#[tokio::test]
async fn test_failed_sibling_does_not_stop_the_others() {
    let mut input = cluster_input();
    input.security_group_names = names(&["a", "b", "c"]);
    let deleter = Arc::new(inventory(&input));
    deleter.fail(ResourceKind::SecurityGroup, "b", "in use by subnet");

    let runtime = build_runtime(deleter.clone(), Arc::new(InMemoryHistoryStore::new()));
    let run = runtime
        .submit::<DeleteInfrastructureWorkflow>(input)
        .await
        .unwrap();
    let err = runtime
        .wait::<DeleteInfrastructureWorkflow>(&run)
        .await
        .unwrap_err();

    let failures = err.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].target, "b");
    assert_eq!(failures[0].activity, "pke-azure-delete-nsg");
    assert!(err.to_string().contains("in use by subnet"));

    let mut attempted = deleter.calls_for(ResourceKind::SecurityGroup);
    attempted.sort();
    assert_eq!(attempted, vec!["a", "b", "c"]);
    assert_eq!(
        deleter.remaining(),
        vec![(ResourceKind::SecurityGroup, "b".to_string())]
    );
}

#[tokio::test]
async fn test_failed_phase_halts_later_phases() {
    let input = cluster_input();
    let deleter = Arc::new(inventory(&input));
    deleter.fail(ResourceKind::LoadBalancer, "kubernetes", "409 conflict");
    deleter.fail(ResourceKind::LoadBalancer, "kubernetes-internal", "500 internal");

    let store = Arc::new(InMemoryHistoryStore::new());
    let runtime = build_runtime(deleter.clone(), store.clone());
    let run = runtime
        .submit::<DeleteInfrastructureWorkflow>(input)
        .await
        .unwrap();
    let err = runtime
        .wait::<DeleteInfrastructureWorkflow>(&run)
        .await
        .unwrap_err();

    let targets: Vec<_> = err.failures().iter().map(|f| f.target.clone()).collect();
    assert_eq!(targets, vec!["kubernetes", "kubernetes-internal"]);
    assert!(deleter.calls_for(ResourceKind::PublicIpAddress).is_empty());
    assert!(deleter.contains(ResourceKind::VirtualNetwork, "pke-test-vnet"));
    assert_eq!(
        recorded_phases(store.as_ref(), &run).await,
        vec!["scale-set", "load-balancer"]
    );
}

#[tokio::test]
async fn test_rerun_after_failure_completes() {
    let input = cluster_input();
    let deleter = Arc::new(inventory(&input));
    deleter.fail(ResourceKind::PublicIpAddress, "pke-test-ip", "still attached");
    let runtime = build_runtime(deleter.clone(), Arc::new(InMemoryHistoryStore::new()));

    let first = runtime
        .submit::<DeleteInfrastructureWorkflow>(input.clone())
        .await
        .unwrap();
    assert!(runtime
        .wait::<DeleteInfrastructureWorkflow>(&first)
        .await
        .is_err());

    deleter.clear_failures();
    let second = runtime
        .submit::<DeleteInfrastructureWorkflow>(input)
        .await
        .unwrap();
    runtime
        .wait::<DeleteInfrastructureWorkflow>(&second)
        .await
        .unwrap();

    assert!(deleter.remaining().is_empty());
    assert_eq!(deleter.calls_for(ResourceKind::ScaleSet).len(), 4);
}

#[tokio::test]
async fn test_sparse_input() {
    let input = DeleteAzureInfrastructureWorkflowInput {
        organization_id: OrganizationId(1),
        cluster_name: "tiny".into(),
        scale_set_names: names(&["pool", "pool"]),
        ..Default::default()
    };
    let deleter = Arc::new(InMemoryResourceDeleter::new().with_resources(ResourceKind::ScaleSet, ["pool"]));
    let runtime = build_runtime(deleter.clone(), Arc::new(InMemoryHistoryStore::new()));

    let run = runtime
        .submit::<DeleteInfrastructureWorkflow>(input)
        .await
        .unwrap();
    runtime
        .wait::<DeleteInfrastructureWorkflow>(&run)
        .await
        .unwrap();

    assert_eq!(deleter.calls_for(ResourceKind::ScaleSet), vec!["pool", "pool"]);
    assert!(deleter.calls_for(ResourceKind::LoadBalancer).is_empty());
    assert_eq!(deleter.calls_for(ResourceKind::VirtualNetwork), vec![""]);
    assert_eq!(deleter.calls_for(ResourceKind::RouteTable), vec![""]);
}

#[tokio::test]
async fn test_cancel_is_honored_at_the_next_phase() {
    let input = cluster_input();
    let deleter = Arc::new(inventory(&input).with_latency(Duration::from_millis(200)));
    let runtime = build_runtime(deleter.clone(), Arc::new(InMemoryHistoryStore::new()));

    let run = runtime
        .submit::<DeleteInfrastructureWorkflow>(input)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    runtime.cancel(&run).await.unwrap();

    let err = runtime
        .wait::<DeleteInfrastructureWorkflow>(&run)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        WorkflowError::Canceled {
            phase: "load-balancer".into()
        }
    );
    assert_eq!(deleter.calls().len(), 2);
    assert!(!deleter.contains(ResourceKind::ScaleSet, "pool-1"));
    assert!(deleter.contains(ResourceKind::LoadBalancer, "kubernetes"));
}

#[tokio::test]
async fn test_configured_execution_timeout_applies() {
    let input = cluster_input();
    let deleter = Arc::new(inventory(&input).with_latency(Duration::from_millis(300)));
    let config = RuntimeConfig {
        default_activity_options: ActivityOptions::default()
            .with_start_to_close_timeout(Duration::from_millis(50)),
        ..RuntimeConfig::default()
    };
    let runtime = build_runtime_with(deleter, Arc::new(InMemoryHistoryStore::new()), config);

    let run = runtime
        .submit::<DeleteInfrastructureWorkflow>(input)
        .await
        .unwrap();
    let err = runtime
        .wait::<DeleteInfrastructureWorkflow>(&run)
        .await
        .unwrap_err();

    let failures = err.failures();
    assert_eq!(failures.len(), 2);
    assert!(failures.iter().all(|failure| matches!(
        failure.error,
        ActivityError::Timeout {
            kind: TimeoutKind::Execution,
            ..
        }
    )));
}

#[tokio::test]
async fn test_resume_does_not_repeat_finished_deletes() {
    let input = cluster_input();
    let deleter = Arc::new(inventory(&input));
    let store = Arc::new(InMemoryHistoryStore::new());
    let run = RunId::new("interrupted-teardown");

    for event in [
        HistoryEvent::WorkflowStarted {
            workflow: DELETE_INFRA_WORKFLOW_NAME.into(),
            input: serde_json::to_value(&input).unwrap(),
        },
        HistoryEvent::PhaseStarted {
            index: 0,
            phase: "scale-set".into(),
        },
        HistoryEvent::ActivityScheduled {
            seq: 0,
            activity: "pke-azure-delete-vmss".into(),
            target: "pool-1".into(),
        },
        HistoryEvent::ActivityScheduled {
            seq: 1,
            activity: "pke-azure-delete-vmss".into(),
            target: "pool-2".into(),
        },
        HistoryEvent::ActivityCompleted {
            seq: 0,
            output: json!(null),
        },
    ] {
        store.append(&run, event).await.unwrap();
    }

    let runtime = build_runtime(deleter.clone(), store.clone());
    assert_eq!(runtime.resume_incomplete().await.unwrap(), vec![run.clone()]);
    runtime
        .wait::<DeleteInfrastructureWorkflow>(&run)
        .await
        .unwrap();

    assert_eq!(deleter.calls_for(ResourceKind::ScaleSet), vec!["pool-2"]);
    assert!(deleter.contains(ResourceKind::ScaleSet, "pool-1"));
    assert_eq!(deleter.calls().len(), 8);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn property_phase_failure_lists_exactly_the_failed_resources(
        failing in prop::collection::vec(any::<bool>(), 1..8)
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let mut input = cluster_input();
        input.security_group_names = (0..failing.len()).map(|i| format!("nsg-{}", i)).collect();

        let deleter = Arc::new(inventory(&input));
        for (i, fails) in failing.iter().enumerate() {
            if *fails {
                deleter.fail(ResourceKind::SecurityGroup, format!("nsg-{}", i), "locked");
            }
        }

        let outcome = rt.block_on(async {
            let runtime = build_runtime(deleter.clone(), Arc::new(InMemoryHistoryStore::new()));
            let run = runtime.submit::<DeleteInfrastructureWorkflow>(input).await.unwrap();
            runtime.wait::<DeleteInfrastructureWorkflow>(&run).await
        });

        let expected: Vec<String> = failing
            .iter()
            .enumerate()
            .filter(|(_, fails)| **fails)
            .map(|(i, _)| format!("nsg-{}", i))
            .collect();

        match outcome {
            Ok(()) => prop_assert!(expected.is_empty()),
            Err(err) => {
                let targets: Vec<String> = err.failures().iter().map(|f| f.target.clone()).collect();
                prop_assert_eq!(targets, expected);
            }
        }
        prop_assert_eq!(deleter.calls_for(ResourceKind::SecurityGroup).len(), failing.len());
    }
}
