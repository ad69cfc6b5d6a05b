//! Per-resource-type deletion activities
//!
//! Every resource type gets its own activity so each is registered, retried
//! and recorded under its own name. They all delegate to one
//! [`ResourceDeleter`]; an already absent resource counts as deleted.

use crate::names;
use crate::resource::{DeleteError, DeleteOutcome, ResourceDeleter, ResourceKind, ResourceRef};
use crate::types::OrganizationId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use std::sync::Arc;
use workflow_engine::Activity;
use workflow_types::ActivityError;

/// Binds a resource kind to the activity name that deletes it
pub trait DeletableResource: Send + Sync + 'static {
    const KIND: ResourceKind;
    const ACTIVITY: &'static str;
}

macro_rules! deletable_resource {
    ($marker:ident, $kind:expr, $activity:expr) => {
        #[derive(Debug, Clone, Copy)]
        pub struct $marker;

        impl DeletableResource for $marker {
            const KIND: ResourceKind = $kind;
            const ACTIVITY: &'static str = $activity;
        }
    };
}

deletable_resource!(ScaleSet, ResourceKind::ScaleSet, names::DELETE_VMSS_ACTIVITY_NAME);
deletable_resource!(LoadBalancer, ResourceKind::LoadBalancer, names::DELETE_LOAD_BALANCER_ACTIVITY_NAME);
deletable_resource!(PublicIpAddress, ResourceKind::PublicIpAddress, names::DELETE_PUBLIC_IP_ACTIVITY_NAME);
deletable_resource!(VirtualNetwork, ResourceKind::VirtualNetwork, names::DELETE_VNET_ACTIVITY_NAME);
deletable_resource!(RouteTable, ResourceKind::RouteTable, names::DELETE_ROUTE_TABLE_ACTIVITY_NAME);
deletable_resource!(SecurityGroup, ResourceKind::SecurityGroup, names::DELETE_NSG_ACTIVITY_NAME);

pub type DeleteVmssActivity = DeleteResourceActivity<ScaleSet>;
pub type DeleteLoadBalancerActivity = DeleteResourceActivity<LoadBalancer>;
pub type DeletePublicIpActivity = DeleteResourceActivity<PublicIpAddress>;
pub type DeleteVnetActivity = DeleteResourceActivity<VirtualNetwork>;
pub type DeleteRouteTableActivity = DeleteResourceActivity<RouteTable>;
pub type DeleteNsgActivity = DeleteResourceActivity<SecurityGroup>;

/// Input shared by every deletion activity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteResourceActivityInput {
    pub organization_id: OrganizationId,
    pub secret_id: String,
    pub cluster_name: String,
    pub resource_group_name: String,
    pub resource_name: String,
}

/// Deletes one resource of kind `R`
pub struct DeleteResourceActivity<R> {
    deleter: Arc<dyn ResourceDeleter>,
    _kind: PhantomData<fn() -> R>,
}

impl<R: DeletableResource> DeleteResourceActivity<R> {
    pub fn new(deleter: Arc<dyn ResourceDeleter>) -> Self {
        Self {
            deleter,
            _kind: PhantomData,
        }
    }
}

#[async_trait]
impl<R: DeletableResource> Activity for DeleteResourceActivity<R> {
    const NAME: &'static str = R::ACTIVITY;
    type Input = DeleteResourceActivityInput;
    type Output = ();

    fn target(&self, input: &DeleteResourceActivityInput) -> String {
        input.resource_name.clone()
    }

    async fn execute(&self, input: DeleteResourceActivityInput) -> Result<(), ActivityError> {
        let resource = ResourceRef {
            organization_id: input.organization_id,
            secret_id: input.secret_id,
            cluster_name: input.cluster_name,
            resource_group_name: input.resource_group_name,
            kind: R::KIND,
            name: input.resource_name,
        };

        match self.deleter.delete(&resource).await {
            Ok(DeleteOutcome::Deleted) => {
                tracing::info!(
                    kind = %R::KIND,
                    resource = %resource.name,
                    cluster = %resource.cluster_name,
                    "Resource deleted"
                );
                Ok(())
            }
            Ok(DeleteOutcome::NotFound) => {
                tracing::debug!(kind = %R::KIND, resource = %resource.name, "Resource already absent");
                Ok(())
            }
            Err(e @ DeleteError::CredentialsNotFound { .. }) => {
                Err(ActivityError::NotFound(e.to_string()))
            }
            Err(e) => Err(ActivityError::RemoteOperation(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::InMemoryResourceDeleter;

    struct NoCredentials;

    #[async_trait]
    impl ResourceDeleter for NoCredentials {
        async fn delete(&self, resource: &ResourceRef) -> Result<DeleteOutcome, DeleteError> {
            Err(DeleteError::CredentialsNotFound {
                organization_id: resource.organization_id,
                secret_id: resource.secret_id.clone(),
            })
        }
    }

    fn input(name: &str) -> DeleteResourceActivityInput {
        DeleteResourceActivityInput {
            organization_id: OrganizationId(7),
            secret_id: "azure-secret".into(),
            cluster_name: "prod".into(),
            resource_group_name: "prod-rg".into(),
            resource_name: name.into(),
        }
    }

    #[test]
    fn test_activity_names() {
        assert_eq!(DeleteVmssActivity::NAME, "pke-azure-delete-vmss");
        assert_eq!(DeleteLoadBalancerActivity::NAME, "pke-azure-delete-load-balancer");
        assert_eq!(DeletePublicIpActivity::NAME, "pke-azure-delete-public-ip");
        assert_eq!(DeleteVnetActivity::NAME, "pke-azure-delete-vnet");
        assert_eq!(DeleteRouteTableActivity::NAME, "pke-azure-delete-route-table");
        assert_eq!(DeleteNsgActivity::NAME, "pke-azure-delete-nsg");
    }

    #[tokio::test]
    async fn test_delete_targets_own_kind() {
        let deleter = Arc::new(
            InMemoryResourceDeleter::new()
                .with_resources(ResourceKind::PublicIpAddress, ["ip-1"])
                .with_resources(ResourceKind::LoadBalancer, ["ip-1"]),
        );
        let activity = DeletePublicIpActivity::new(deleter.clone());

        activity.execute(input("ip-1")).await.unwrap();

        assert!(!deleter.contains(ResourceKind::PublicIpAddress, "ip-1"));
        assert!(deleter.contains(ResourceKind::LoadBalancer, "ip-1"));
        assert_eq!(deleter.calls()[0].resource_group_name, "prod-rg");
    }

    #[tokio::test]
    async fn test_absent_resource_is_success() {
        let activity = DeleteVnetActivity::new(Arc::new(InMemoryResourceDeleter::new()));
        assert!(activity.execute(input("vnet")).await.is_ok());
    }

    #[tokio::test]
    async fn test_error_mapping() {
        let deleter = Arc::new(InMemoryResourceDeleter::new());
        deleter.fail(ResourceKind::RouteTable, "rt", "conflict");
        let err = DeleteRouteTableActivity::new(deleter)
            .execute(input("rt"))
            .await
            .unwrap_err();
        assert!(matches!(err, ActivityError::RemoteOperation(_)));

        let err = DeleteNsgActivity::new(Arc::new(NoCredentials))
            .execute(input("nsg"))
            .await
            .unwrap_err();
        assert!(matches!(err, ActivityError::NotFound(_)));
    }
}
