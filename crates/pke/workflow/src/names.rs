//! Stable registration names
//!
//! These strings are recorded in run histories. Renaming one orphans every
//! run recorded under the old name.

/// Azure PKE infrastructure teardown
pub const DELETE_INFRA_WORKFLOW_NAME: &str = "pke-azure-delete-infra";

pub const DELETE_VMSS_ACTIVITY_NAME: &str = "pke-azure-delete-vmss";
pub const DELETE_LOAD_BALANCER_ACTIVITY_NAME: &str = "pke-azure-delete-load-balancer";
pub const DELETE_PUBLIC_IP_ACTIVITY_NAME: &str = "pke-azure-delete-public-ip";
pub const DELETE_VNET_ACTIVITY_NAME: &str = "pke-azure-delete-vnet";
pub const DELETE_ROUTE_TABLE_ACTIVITY_NAME: &str = "pke-azure-delete-route-table";
pub const DELETE_NSG_ACTIVITY_NAME: &str = "pke-azure-delete-nsg";

pub const ASSEMBLE_HTTP_PROXY_SETTINGS_ACTIVITY_NAME: &str = "pke-assemble-http-proxy-settings";
