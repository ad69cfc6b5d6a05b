use super::assembly::{assemble_http_proxy_settings, ProxyError};
use super::options::{HttpProxy, HttpProxySettingsInput};
use super::secrets::{PasswordSecretStore, SecretStoreError};
use crate::names::ASSEMBLE_HTTP_PROXY_SETTINGS_ACTIVITY_NAME;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use workflow_engine::Activity;
use workflow_types::ActivityError;

pub type AssembleHttpProxySettingsActivityInput = HttpProxySettingsInput;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssembleHttpProxySettingsActivityOutput {
    pub settings: HttpProxy,
}

/// Resolves proxy settings against the organization's secrets
pub struct AssembleHttpProxySettingsActivity {
    secrets: Arc<dyn PasswordSecretStore>,
}

impl AssembleHttpProxySettingsActivity {
    pub fn new(secrets: Arc<dyn PasswordSecretStore>) -> Self {
        Self { secrets }
    }
}

#[async_trait]
impl Activity for AssembleHttpProxySettingsActivity {
    const NAME: &'static str = ASSEMBLE_HTTP_PROXY_SETTINGS_ACTIVITY_NAME;
    type Input = AssembleHttpProxySettingsActivityInput;
    type Output = AssembleHttpProxySettingsActivityOutput;

    async fn execute(
        &self,
        input: AssembleHttpProxySettingsActivityInput,
    ) -> Result<AssembleHttpProxySettingsActivityOutput, ActivityError> {
        let settings = assemble_http_proxy_settings(self.secrets.as_ref(), &input).await?;

        tracing::debug!(
            organization_id = %input.organization_id,
            http = settings.http_proxy_url.is_some(),
            https = settings.https_proxy_url.is_some(),
            "Proxy settings assembled"
        );

        Ok(AssembleHttpProxySettingsActivityOutput { settings })
    }
}

impl From<ProxyError> for ActivityError {
    fn from(err: ProxyError) -> Self {
        let message = err.to_string();
        match err {
            ProxyError::Secret {
                source: SecretStoreError::NotFound { .. },
                ..
            } => ActivityError::NotFound(message),
            ProxyError::Secret {
                source: SecretStoreError::Malformed { .. },
                ..
            } => ActivityError::InvalidInput(message),
            ProxyError::Secret {
                source: SecretStoreError::Backend(_),
                ..
            } => ActivityError::RemoteOperation(message),
            ProxyError::InvalidProxyUrl { .. } => ActivityError::InvalidInput(message),
        }
    }
}
