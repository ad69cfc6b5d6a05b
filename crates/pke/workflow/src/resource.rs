//! Cloud resources torn down with a cluster and the collaborator that deletes them

use crate::types::OrganizationId;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;
use thiserror::Error;

/// Resource types owned by an Azure PKE cluster
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    ScaleSet,
    LoadBalancer,
    PublicIpAddress,
    VirtualNetwork,
    RouteTable,
    SecurityGroup,
}

impl ResourceKind {
    /// Teardown order; each kind may only go once every kind before it is gone.
    pub const TEARDOWN_ORDER: [ResourceKind; 6] = [
        ResourceKind::ScaleSet,
        ResourceKind::LoadBalancer,
        ResourceKind::PublicIpAddress,
        ResourceKind::VirtualNetwork,
        ResourceKind::RouteTable,
        ResourceKind::SecurityGroup,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::ScaleSet => "scale-set",
            ResourceKind::LoadBalancer => "load-balancer",
            ResourceKind::PublicIpAddress => "public-ip-address",
            ResourceKind::VirtualNetwork => "virtual-network",
            ResourceKind::RouteTable => "route-table",
            ResourceKind::SecurityGroup => "security-group",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Fully qualified reference to one cloud resource of a cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRef {
    pub organization_id: OrganizationId,
    pub secret_id: String,
    pub cluster_name: String,
    pub resource_group_name: String,
    pub kind: ResourceKind,
    pub name: String,
}

/// Successful answer of a delete call
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeleteOutcome {
    Deleted,
    /// Nothing to delete; already gone
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeleteError {
    #[error("credentials '{secret_id}' not found for organization {organization_id}")]
    CredentialsNotFound {
        organization_id: OrganizationId,
        secret_id: String,
    },

    #[error("{kind} '{name}' could not be deleted: {reason}")]
    Rejected {
        kind: ResourceKind,
        name: String,
        reason: String,
    },

    #[error("cloud API unavailable: {0}")]
    Unavailable(String),
}

/// Deletes cloud resources; must be idempotent
#[async_trait]
pub trait ResourceDeleter: Send + Sync {
    async fn delete(&self, resource: &ResourceRef) -> Result<DeleteOutcome, DeleteError>;
}

#[derive(Default)]
struct Inventory {
    resources: BTreeSet<(ResourceKind, String)>,
    failures: HashMap<(ResourceKind, String), String>,
    calls: Vec<ResourceRef>,
}

/// In-memory deleter for development and tests
///
/// Keeps a resource inventory, logs every call and fails deletes of
/// resources registered with [`InMemoryResourceDeleter::fail`].
#[derive(Default)]
pub struct InMemoryResourceDeleter {
    inventory: Mutex<Inventory>,
    latency: Duration,
}

impl InMemoryResourceDeleter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every delete call by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_resources<I, S>(self, kind: ResourceKind, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            self.insert(kind, name);
        }
        self
    }

    pub fn insert(&self, kind: ResourceKind, name: impl Into<String>) {
        self.inventory.lock().resources.insert((kind, name.into()));
    }

    /// Make every delete of `name` fail with `reason` until cleared
    pub fn fail(&self, kind: ResourceKind, name: impl Into<String>, reason: impl Into<String>) {
        self.inventory
            .lock()
            .failures
            .insert((kind, name.into()), reason.into());
    }

    pub fn clear_failures(&self) {
        self.inventory.lock().failures.clear();
    }

    pub fn contains(&self, kind: ResourceKind, name: &str) -> bool {
        self.inventory
            .lock()
            .resources
            .contains(&(kind, name.to_string()))
    }

    /// Resources still present, ordered by kind then name
    pub fn remaining(&self) -> Vec<(ResourceKind, String)> {
        self.inventory.lock().resources.iter().cloned().collect()
    }

    /// Every delete call received so far, in arrival order
    pub fn calls(&self) -> Vec<ResourceRef> {
        self.inventory.lock().calls.clone()
    }

    pub fn calls_for(&self, kind: ResourceKind) -> Vec<String> {
        self.inventory
            .lock()
            .calls
            .iter()
            .filter(|call| call.kind == kind)
            .map(|call| call.name.clone())
            .collect()
    }
}

#[async_trait]
impl ResourceDeleter for InMemoryResourceDeleter {
    async fn delete(&self, resource: &ResourceRef) -> Result<DeleteOutcome, DeleteError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let mut inventory = self.inventory.lock();
        inventory.calls.push(resource.clone());

        let key = (resource.kind, resource.name.clone());
        if let Some(reason) = inventory.failures.get(&key) {
            return Err(DeleteError::Rejected {
                kind: resource.kind,
                name: resource.name.clone(),
                reason: reason.clone(),
            });
        }

        if inventory.resources.remove(&key) {
            Ok(DeleteOutcome::Deleted)
        } else {
            Ok(DeleteOutcome::NotFound)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource(kind: ResourceKind, name: &str) -> ResourceRef {
        ResourceRef {
            organization_id: OrganizationId(1),
            secret_id: "azure".into(),
            cluster_name: "c1".into(),
            resource_group_name: "rg".into(),
            kind,
            name: name.into(),
        }
    }

    #[test]
    fn test_teardown_order() {
        let names: Vec<_> = ResourceKind::TEARDOWN_ORDER
            .iter()
            .map(ResourceKind::as_str)
            .collect();
        assert_eq!(
            names,
            vec![
                "scale-set",
                "load-balancer",
                "public-ip-address",
                "virtual-network",
                "route-table",
                "security-group"
            ]
        );
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let deleter =
            InMemoryResourceDeleter::new().with_resources(ResourceKind::LoadBalancer, ["lb-1"]);
        let lb = resource(ResourceKind::LoadBalancer, "lb-1");

        assert_eq!(deleter.delete(&lb).await.unwrap(), DeleteOutcome::Deleted);
        assert_eq!(deleter.delete(&lb).await.unwrap(), DeleteOutcome::NotFound);
        assert!(!deleter.contains(ResourceKind::LoadBalancer, "lb-1"));
        assert_eq!(deleter.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_injected_failure_keeps_resource() {
        let deleter = InMemoryResourceDeleter::new().with_resources(ResourceKind::SecurityGroup, ["nsg"]);
        deleter.fail(ResourceKind::SecurityGroup, "nsg", "in use by subnet");

        let err = deleter
            .delete(&resource(ResourceKind::SecurityGroup, "nsg"))
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "security-group 'nsg' could not be deleted: in use by subnet"
        );
        assert!(deleter.contains(ResourceKind::SecurityGroup, "nsg"));

        deleter.clear_failures();
        deleter
            .delete(&resource(ResourceKind::SecurityGroup, "nsg"))
            .await
            .unwrap();
        assert!(deleter.remaining().is_empty());
    }
}
