use crate::types::OrganizationId;
use serde::{Deserialize, Serialize};

/// Proxy configuration for one protocol
///
/// `url` takes precedence over `host_port` and `scheme`. Empty strings count
/// as unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyOptions {
    /// `host:port` of the proxy; deprecated in favor of `url`
    pub host_port: Option<String>,
    /// Password secret holding the proxy credentials
    pub secret_id: Option<String>,
    /// Scheme used with `host_port`; deprecated in favor of `url`
    pub scheme: Option<String>,
    pub url: Option<String>,
}

fn set(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

impl ProxyOptions {
    pub fn with_host_port(mut self, host_port: impl Into<String>) -> Self {
        self.host_port = Some(host_port.into());
        self
    }

    pub fn with_secret_id(mut self, secret_id: impl Into<String>) -> Self {
        self.secret_id = Some(secret_id.into());
        self
    }

    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = Some(scheme.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn configured_host_port(&self) -> Option<&str> {
        set(&self.host_port)
    }

    pub fn configured_secret_id(&self) -> Option<&str> {
        set(&self.secret_id)
    }

    pub fn configured_scheme(&self) -> Option<&str> {
        set(&self.scheme)
    }

    pub fn configured_url(&self) -> Option<&str> {
        set(&self.url)
    }

    /// Whether this protocol has a proxy at all
    pub fn is_configured(&self) -> bool {
        self.configured_url().is_some() || self.configured_host_port().is_some()
    }
}

/// Proxy options of one organization for both protocols
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpProxySettingsInput {
    pub organization_id: OrganizationId,
    pub http: ProxyOptions,
    pub https: ProxyOptions,
}

/// Resolved proxy URLs; a field is absent when its protocol is not configured
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpProxy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_proxy_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub https_proxy_url: Option<String>,
}
