//! PKE infrastructure lifecycle workflows
//!
//! - [`workflows::DeleteInfrastructureWorkflow`] tears down an Azure PKE
//!   cluster's cloud resources in dependency order
//! - [`activities`] holds one deletion activity per resource type, all backed
//!   by a [`ResourceDeleter`]
//! - [`proxy`] assembles HTTP(S) proxy URLs from options and organization
//!   secrets
//!
//! [`register`] wires all of them into a workflow registry.

#![deny(unsafe_code)]

pub mod activities;
pub mod names;
pub mod proxy;
pub mod resource;
pub mod types;
pub mod workflows;

pub use resource::{
    DeleteError, DeleteOutcome, InMemoryResourceDeleter, ResourceDeleter, ResourceKind,
    ResourceRef,
};
pub use types::OrganizationId;

use activities::{
    DeleteLoadBalancerActivity, DeleteNsgActivity, DeletePublicIpActivity,
    DeleteRouteTableActivity, DeleteVmssActivity, DeleteVnetActivity,
};
use proxy::{AssembleHttpProxySettingsActivity, PasswordSecretStore};
use std::sync::Arc;
use workflow_engine::{Activity, RegistryBuilder, RegistryError};
use workflow_types::RetryPolicy;
use workflows::DeleteInfrastructureWorkflow;

/// Collaborators and policies needed by the PKE activities
#[derive(Clone)]
pub struct PkeDependencies {
    pub deleter: Arc<dyn ResourceDeleter>,
    pub secrets: Arc<dyn PasswordSecretStore>,
    /// Retry policy for every PKE activity; `None` runs each invocation once
    pub retry: Option<RetryPolicy>,
}

fn register_one<A: Activity>(
    builder: &mut RegistryBuilder,
    activity: A,
    retry: &Option<RetryPolicy>,
) -> Result<(), RegistryError> {
    match retry {
        Some(policy) => builder.register_activity_with_retry(activity, policy.clone())?,
        None => builder.register_activity(activity)?,
    };
    Ok(())
}

/// Register every PKE activity and workflow
pub fn register(builder: &mut RegistryBuilder, deps: PkeDependencies) -> Result<(), RegistryError> {
    let deleter = deps.deleter;
    let retry = &deps.retry;

    register_one(builder, DeleteVmssActivity::new(deleter.clone()), retry)?;
    register_one(builder, DeleteLoadBalancerActivity::new(deleter.clone()), retry)?;
    register_one(builder, DeletePublicIpActivity::new(deleter.clone()), retry)?;
    register_one(builder, DeleteVnetActivity::new(deleter.clone()), retry)?;
    register_one(builder, DeleteRouteTableActivity::new(deleter.clone()), retry)?;
    register_one(builder, DeleteNsgActivity::new(deleter), retry)?;
    register_one(builder, AssembleHttpProxySettingsActivity::new(deps.secrets), retry)?;

    builder.register_workflow(DeleteInfrastructureWorkflow)?;
    Ok(())
}
