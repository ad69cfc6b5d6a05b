//! Azure PKE infrastructure teardown
//!
//! Deletes a cluster's cloud resources in dependency order: scale sets, load
//! balancers, public IP addresses, the virtual network, the route table and
//! finally the network security groups. Every resource of a phase is deleted
//! concurrently and the phase only completes once all of them finished. The
//! first phase with a failure halts the run with every failure of that phase.
//!
//! There is no rollback. Running the workflow again after a failure is the
//! recovery path, since deleting an absent resource succeeds.

use crate::activities::delete::{
    DeletableResource, DeleteResourceActivity, DeleteResourceActivityInput, LoadBalancer,
    PublicIpAddress, RouteTable, ScaleSet, SecurityGroup, VirtualNetwork,
};
use crate::names;
use crate::types::OrganizationId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use workflow_engine::{Workflow, WorkflowContext};
use workflow_types::{combine, ActivityOptions, WorkflowResult};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeleteAzureInfrastructureWorkflowInput {
    pub organization_id: OrganizationId,
    pub cluster_name: String,
    pub secret_id: String,
    pub resource_group_name: String,

    pub load_balancer_names: Vec<String>,
    pub public_ip_address_names: Vec<String>,
    pub route_table_name: String,
    pub scale_set_names: Vec<String>,
    pub security_group_names: Vec<String>,
    pub virtual_network_name: String,
}

impl DeleteAzureInfrastructureWorkflowInput {
    /// Input of the deletion activity for one resource of this cluster
    pub fn activity_input(&self, resource_name: &str) -> DeleteResourceActivityInput {
        DeleteResourceActivityInput {
            organization_id: self.organization_id,
            secret_id: self.secret_id.clone(),
            cluster_name: self.cluster_name.clone(),
            resource_group_name: self.resource_group_name.clone(),
            resource_name: resource_name.to_string(),
        }
    }
}

pub struct DeleteInfrastructureWorkflow;

#[async_trait]
impl Workflow for DeleteInfrastructureWorkflow {
    const NAME: &'static str = names::DELETE_INFRA_WORKFLOW_NAME;
    const ACTIVITIES: &'static [&'static str] = &[
        names::DELETE_VMSS_ACTIVITY_NAME,
        names::DELETE_LOAD_BALANCER_ACTIVITY_NAME,
        names::DELETE_PUBLIC_IP_ACTIVITY_NAME,
        names::DELETE_VNET_ACTIVITY_NAME,
        names::DELETE_ROUTE_TABLE_ACTIVITY_NAME,
        names::DELETE_NSG_ACTIVITY_NAME,
    ];
    type Input = DeleteAzureInfrastructureWorkflowInput;
    type Output = ();

    async fn run(
        &self,
        ctx: &mut WorkflowContext,
        input: DeleteAzureInfrastructureWorkflowInput,
    ) -> WorkflowResult<()> {
        // Timeouts stay as configured on the runtime. Deletions in flight
        // always finish when the run is canceled.
        ctx.set_activity_options(ActivityOptions {
            wait_for_cancellation: true,
            ..ctx.activity_options().clone()
        });

        delete_all::<ScaleSet>(ctx, &input, &input.scale_set_names).await?;
        delete_all::<LoadBalancer>(ctx, &input, &input.load_balancer_names).await?;
        delete_all::<PublicIpAddress>(ctx, &input, &input.public_ip_address_names).await?;
        delete_all::<VirtualNetwork>(ctx, &input, std::slice::from_ref(&input.virtual_network_name))
            .await?;
        delete_all::<RouteTable>(ctx, &input, std::slice::from_ref(&input.route_table_name))
            .await?;
        delete_all::<SecurityGroup>(ctx, &input, &input.security_group_names).await?;

        tracing::info!(
            run_id = %ctx.run_id(),
            cluster = %input.cluster_name,
            "Cluster infrastructure deleted"
        );
        Ok(())
    }
}

/// One teardown phase: delete every named resource of kind `R` concurrently
async fn delete_all<R: DeletableResource>(
    ctx: &mut WorkflowContext,
    input: &DeleteAzureInfrastructureWorkflowInput,
    resource_names: &[String],
) -> WorkflowResult<()> {
    ctx.enter_phase(R::KIND.as_str()).await?;

    let inputs = resource_names
        .iter()
        .map(|name| input.activity_input(name))
        .collect();
    let results = ctx
        .execute_all::<DeleteResourceActivity<R>>(inputs)
        .await?;

    combine(results)?;
    Ok(())
}
