//! Pooler region discovery.
//!
//! Every candidate region's pooler is sent a StartupMessage for the tenant.
//! A pooler that does not host the tenant answers with a "tenant not found"
//! error; the right one asks for credentials. All probes run concurrently,
//! then the first match in candidate order wins.

pub mod protocol;

use futures::future::join_all;
use serde::Serialize;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::config::ProviderConfig;
use protocol::{read_message, startup_message, BackendMessage};

/// Result of probing one region for one tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeOutcome {
    /// The tenant exists behind this pooler.
    Matched,
    /// The pooler reported the tenant as unknown.
    Rejected,
    /// Timeout or transport failure. Counts as rejected for selection.
    Inconclusive(String),
}

/// Outcome for a named region.
#[derive(Debug, Clone, Serialize)]
pub struct ProbeResult {
    pub region: String,
    pub outcome: ProbeOutcome,
}

/// First matched region in candidate order.
pub fn select_region(results: &[ProbeResult]) -> Option<&str> {
    results
        .iter()
        .find(|r| r.outcome == ProbeOutcome::Matched)
        .map(|r| r.region.as_str())
}

/// Probes pooler endpoints over the PostgreSQL startup handshake.
#[derive(Debug, Clone)]
pub struct RegionProbe {
    provider: ProviderConfig,
    timeout: Duration,
    user: String,
    database: String,
}

impl RegionProbe {
    pub fn new(provider: ProviderConfig) -> Self {
        let timeout = provider.probe_timeout();
        Self {
            provider,
            timeout,
            user: "postgres".to_string(),
            database: "postgres".to_string(),
        }
    }

    /// Override the per-probe timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Base username the tenant ref is appended to.
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    /// Map the server's first reply to an outcome.
    ///
    /// Any error other than the tenant-not-found marker still proves the
    /// tenant is known here.
    pub fn classify(&self, message: &BackendMessage) -> ProbeOutcome {
        match message {
            BackendMessage::AuthenticationRequest { .. } => ProbeOutcome::Matched,
            BackendMessage::ErrorResponse { message } => {
                let marker = self.provider.tenant_not_found_marker.to_lowercase();
                if message.to_lowercase().contains(&marker) {
                    ProbeOutcome::Rejected
                } else {
                    ProbeOutcome::Matched
                }
            }
            BackendMessage::Other { tag } => {
                ProbeOutcome::Inconclusive(format!("unexpected message '{}'", *tag as char))
            }
        }
    }

    /// Send the StartupMessage on an open stream and classify the reply.
    pub async fn handshake<S>(&self, stream: &mut S, tenant_ref: &str) -> ProbeOutcome
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let user = format!("{}.{}", self.user, tenant_ref);
        let startup = startup_message(&user, &self.database);
        if let Err(e) = stream.write_all(&startup).await {
            return ProbeOutcome::Inconclusive(format!("send startup: {}", e));
        }
        match read_message(stream).await {
            Ok(msg) => self.classify(&msg),
            Err(e) => ProbeOutcome::Inconclusive(format!("read reply: {}", e)),
        }
    }

    /// Connect to `addr` and probe, bounded by the probe timeout.
    pub async fn probe_address(&self, addr: &str, tenant_ref: &str) -> ProbeOutcome {
        let attempt = async {
            let mut stream = match TcpStream::connect(addr).await {
                Ok(s) => s,
                Err(e) => return ProbeOutcome::Inconclusive(format!("connect: {}", e)),
            };
            self.handshake(&mut stream, tenant_ref).await
        };
        match tokio::time::timeout(self.timeout, attempt).await {
            Ok(outcome) => outcome,
            Err(_) => ProbeOutcome::Inconclusive(format!(
                "no reply within {}s",
                self.timeout.as_secs()
            )),
        }
    }

    /// Probe `(region, address)` pairs concurrently, results in input order.
    pub async fn probe_targets(
        &self,
        tenant_ref: &str,
        targets: &[(String, String)],
    ) -> Vec<ProbeResult> {
        let probes = targets.iter().map(|(region, addr)| async move {
            let outcome = self.probe_address(addr, tenant_ref).await;
            debug!("Probe {} ({}): {:?}", region, addr, outcome);
            ProbeResult {
                region: region.clone(),
                outcome,
            }
        });
        join_all(probes).await
    }

    /// Probe every candidate region's pooler.
    pub async fn probe_all(&self, tenant_ref: &str, candidates: &[String]) -> Vec<ProbeResult> {
        let targets: Vec<(String, String)> = candidates
            .iter()
            .map(|region| {
                let addr = format!(
                    "{}:{}",
                    self.provider.pooler_host(region),
                    self.provider.pooler_port
                );
                (region.clone(), addr)
            })
            .collect();
        self.probe_targets(tenant_ref, &targets).await
    }

    /// Region serving `tenant_ref`, or `None` when no candidate matched.
    pub async fn detect_region(&self, tenant_ref: &str, candidates: &[String]) -> Option<String> {
        info!(
            "Detecting pooler region for tenant {} across {} candidates",
            tenant_ref,
            candidates.len()
        );
        let results = self.probe_all(tenant_ref, candidates).await;
        match select_region(&results) {
            Some(region) => {
                info!("Tenant {} is served from {}", tenant_ref, region);
                Some(region.to_string())
            }
            None => {
                warn!("No pooler region recognised tenant {}", tenant_ref);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::protocol::tests::{auth_request, error_response};
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    fn probe() -> RegionProbe {
        RegionProbe::new(ProviderConfig::default()).with_timeout(Duration::from_secs(2))
    }

    /// One-connection fake pooler that answers with `reply` (or nothing).
    async fn fake_pooler(reply: Option<Vec<u8>>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let len = socket.read_i32().await.unwrap();
            let mut rest = vec![0u8; len as usize - 4];
            socket.read_exact(&mut rest).await.unwrap();
            match reply {
                Some(bytes) => {
                    socket.write_all(&bytes).await.unwrap();
                }
                None => {
                    tokio::time::sleep(Duration::from_secs(10)).await;
                }
            }
        });
        addr
    }

    #[test]
    fn test_classify() {
        let p = probe();
        assert_eq!(
            p.classify(&BackendMessage::AuthenticationRequest { code: 10 }),
            ProbeOutcome::Matched
        );
        assert_eq!(
            p.classify(&BackendMessage::ErrorResponse {
                message: "Tenant or user not found".into()
            }),
            ProbeOutcome::Rejected
        );
        assert_eq!(
            p.classify(&BackendMessage::ErrorResponse {
                message: "(ENOTFOUND) tenant or user not found".into()
            }),
            ProbeOutcome::Rejected
        );
        assert_eq!(
            p.classify(&BackendMessage::ErrorResponse {
                message: "password authentication failed".into()
            }),
            ProbeOutcome::Matched
        );
        assert!(matches!(
            p.classify(&BackendMessage::Other { tag: b'N' }),
            ProbeOutcome::Inconclusive(_)
        ));
    }

    #[tokio::test]
    async fn test_handshake_over_duplex() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        let server_task = tokio::spawn(async move {
            let len = server.read_i32().await.unwrap();
            let mut rest = vec![0u8; len as usize - 4];
            server.read_exact(&mut rest).await.unwrap();
            server.write_all(&auth_request(10)).await.unwrap();
            rest
        });

        let outcome = probe().handshake(&mut client, "abcdef").await;
        assert_eq!(outcome, ProbeOutcome::Matched);

        let sent = server_task.await.unwrap();
        let text = String::from_utf8_lossy(&sent);
        assert!(text.contains("postgres.abcdef"));
    }

    #[tokio::test]
    async fn test_only_true_region_matches() {
        let regions = ["us-east-1", "us-west-2", "eu-west-1", "ap-south-1"];
        let mut targets = Vec::new();
        for region in regions {
            let reply = if region == "eu-west-1" {
                auth_request(10)
            } else {
                error_response("Tenant or user not found")
            };
            targets.push((region.to_string(), fake_pooler(Some(reply)).await));
        }

        let results = probe().probe_targets("abcdef", &targets).await;
        for result in &results {
            if result.region == "eu-west-1" {
                assert_eq!(result.outcome, ProbeOutcome::Matched);
            } else {
                assert_eq!(result.outcome, ProbeOutcome::Rejected);
            }
        }
        assert_eq!(select_region(&results), Some("eu-west-1"));
    }

    #[tokio::test]
    async fn test_silent_pooler_is_inconclusive() {
        let addr = fake_pooler(None).await;
        let outcome = probe()
            .with_timeout(Duration::from_millis(200))
            .probe_address(&addr, "abcdef")
            .await;
        assert!(matches!(outcome, ProbeOutcome::Inconclusive(_)));
    }

    #[tokio::test]
    async fn test_refused_connection_is_inconclusive() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);
        let outcome = probe().probe_address(&addr, "abcdef").await;
        assert!(matches!(outcome, ProbeOutcome::Inconclusive(_)));
    }

    #[test]
    fn test_select_region_uses_candidate_order() {
        let results = vec![
            ProbeResult {
                region: "us-east-1".into(),
                outcome: ProbeOutcome::Inconclusive("timeout".into()),
            },
            ProbeResult {
                region: "us-west-1".into(),
                outcome: ProbeOutcome::Matched,
            },
            ProbeResult {
                region: "eu-west-1".into(),
                outcome: ProbeOutcome::Matched,
            },
        ];
        assert_eq!(select_region(&results), Some("us-west-1"));
    }

    #[test]
    fn test_select_region_none_matched() {
        let results = vec![ProbeResult {
            region: "us-east-1".into(),
            outcome: ProbeOutcome::Rejected,
        }];
        assert_eq!(select_region(&results), None);
    }
}
