//! HTTP(S) proxy parameter assembly
//!
//! Turns declarative proxy options plus organization-scoped credentials into
//! the proxy URLs handed to cluster nodes.

pub mod activity;
pub mod assembly;
pub mod options;
pub mod secrets;

pub use activity::{
    AssembleHttpProxySettingsActivity, AssembleHttpProxySettingsActivityInput,
    AssembleHttpProxySettingsActivityOutput,
};
pub use assembly::{assemble_http_proxy_settings, Protocol, ProxyBase, ProxyError};
pub use options::{HttpProxy, HttpProxySettingsInput, ProxyOptions};
pub use secrets::{
    InMemoryPasswordSecretStore, PasswordSecret, PasswordSecretStore, SecretRecord,
    SecretStoreError, PASSWORD_KEY, USERNAME_KEY,
};
