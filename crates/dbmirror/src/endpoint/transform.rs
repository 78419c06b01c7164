//! Direct/pooled and host/container URL rewriting.
//!
//! None of these functions fail: a URL that does not match the expected
//! pattern yields `None` or comes back unchanged.

use super::{direct_tenant, DatabaseEndpoint, EndpointKind};
use crate::config::{Config, ProviderConfig};
use crate::platform::HostPlatform;

/// URL rewriting rules for one provider on one host platform.
#[derive(Debug, Clone)]
pub struct UrlTransform {
    provider: ProviderConfig,
    platform: HostPlatform,
    host_alias: String,
}

impl UrlTransform {
    pub fn new(provider: ProviderConfig, platform: HostPlatform, host_alias: impl Into<String>) -> Self {
        Self {
            provider,
            platform,
            host_alias: host_alias.into(),
        }
    }

    /// Rules for the current platform from the loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.provider.clone(),
            HostPlatform::current(),
            config.runtime.host_alias.clone(),
        )
    }

    pub fn provider(&self) -> &ProviderConfig {
        &self.provider
    }

    pub fn kind(&self, url: &str) -> Option<EndpointKind> {
        DatabaseEndpoint::parse(url).map(|ep| ep.kind(&self.provider))
    }

    /// Host matches the provider's direct-connection pattern.
    pub fn is_direct_form(&self, url: &str) -> bool {
        self.kind(url) == Some(EndpointKind::Direct)
    }

    /// Tenant ref from a direct host or from a pooled `user.<tenant>` username.
    pub fn extract_tenant_ref(&self, url: &str) -> Option<String> {
        let ep = DatabaseEndpoint::parse(url)?;
        match ep.kind(&self.provider) {
            EndpointKind::Direct => direct_tenant(ep.host(), &self.provider).map(str::to_string),
            EndpointKind::Pooled => ep
                .raw_user()
                .rsplit_once('.')
                .map(|(_, tenant)| tenant)
                .filter(|t| !t.is_empty())
                .map(str::to_string),
            _ => None,
        }
    }

    /// Rebuild `url` as a pooled URL for `region`.
    ///
    /// Password, database and query string are carried over verbatim.
    pub fn to_pooled_form(&self, url: &str, region: &str) -> Option<String> {
        let ep = DatabaseEndpoint::parse(url)?;
        let tenant = self.extract_tenant_ref(url)?;

        let base_user = match ep.kind(&self.provider) {
            EndpointKind::Pooled => ep
                .raw_user()
                .rsplit_once('.')
                .map(|(user, _)| user)
                .unwrap_or_else(|| ep.raw_user()),
            _ => ep.raw_user(),
        };

        let mut out = format!("{}://{}.{}", ep.scheme(), base_user, tenant);
        if let Some(pw) = ep.raw_password() {
            out.push(':');
            out.push_str(pw);
        }
        out.push_str(&format!(
            "@{}:{}/{}",
            self.provider.pooler_host(region),
            self.provider.pooler_port,
            ep.raw_database()
        ));
        if let Some(query) = ep.query() {
            out.push('?');
            out.push_str(query);
        }
        Some(out)
    }

    /// Pooled form when `url` is direct and a region is known, else unchanged.
    pub fn ensure_pooled_form(&self, url: &str, region: Option<&str>) -> String {
        match region {
            Some(region) if self.is_direct_form(url) => self
                .to_pooled_form(url, region)
                .unwrap_or_else(|| url.to_string()),
            _ => url.to_string(),
        }
    }

    /// Point a loopback URL at the runtime's host alias where containers
    /// cannot reach the host loopback directly.
    pub fn rewrite_host_for_container_networking(&self, url: &str) -> String {
        if self.platform.shares_host_network() {
            return url.to_string();
        }
        match DatabaseEndpoint::parse(url) {
            Some(ep) if ep.is_loopback() => ep
                .with_host(&self.host_alias)
                .map(|ep| ep.as_str().to_string())
                .unwrap_or_else(|| url.to_string()),
            _ => url.to_string(),
        }
    }

    /// Extra `docker run` arguments needed to reach the URL's host.
    pub fn container_network_args(&self, url: &str) -> Vec<String> {
        let loopback = DatabaseEndpoint::parse(url)
            .map(|ep| ep.is_loopback())
            .unwrap_or(false);
        if self.platform.shares_host_network() && loopback {
            vec!["--network".to_string(), "host".to_string()]
        } else {
            Vec::new()
        }
    }
}
