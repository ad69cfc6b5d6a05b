//! Resource deleter used when no cloud backend is wired in

use async_trait::async_trait;
use pke_workflow::{DeleteError, DeleteOutcome, ResourceDeleter, ResourceRef};

/// Logs every deletion request and reports it as done
#[derive(Debug, Default)]
pub struct DryRunResourceDeleter;

#[async_trait]
impl ResourceDeleter for DryRunResourceDeleter {
    async fn delete(&self, resource: &ResourceRef) -> Result<DeleteOutcome, DeleteError> {
        tracing::info!(
            organization_id = %resource.organization_id,
            cluster = %resource.cluster_name,
            resource_group = %resource.resource_group_name,
            kind = %resource.kind,
            name = %resource.name,
            "Dry run: would delete resource"
        );
        Ok(DeleteOutcome::Deleted)
    }
}
