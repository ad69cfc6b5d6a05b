//! Workflows registered by the PKE worker

pub mod delete_infra;

pub use delete_infra::{DeleteAzureInfrastructureWorkflowInput, DeleteInfrastructureWorkflow};
