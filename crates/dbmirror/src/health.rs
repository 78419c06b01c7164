//! Connection testing.
//!
//! [`ConnectionTester`] answers "can I run a trivial query against this URL".
//! Readiness polling and URL verification both go through it.

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tokio_postgres::{Config as PgConfig, SimpleQueryMessage};
use tracing::debug;

use crate::endpoint::DatabaseEndpoint;
use crate::error::{MirrorError, Result};
use crate::tls::{make_connector, SslMode};

/// Connect timeout for a single test.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of one connection test.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConnectionTest {
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ConnectionTest {
    pub fn ok(version: impl Into<String>) -> Self {
        Self {
            connected: true,
            version: Some(version.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            connected: false,
            version: None,
            error: Some(error.into()),
        }
    }
}

/// Something that can check whether a database URL answers queries.
#[async_trait]
pub trait ConnectionTester: Send + Sync {
    async fn test(&self, url: &str) -> ConnectionTest;
}

/// Tests connections with `tokio-postgres` and `SELECT version()`.
#[derive(Debug, Clone, Default)]
pub struct PgConnectionTester;

impl PgConnectionTester {
    async fn query_version(&self, url: &str) -> Result<String> {
        let endpoint = DatabaseEndpoint::parse(url)
            .ok_or_else(|| MirrorError::InvalidUrl("expected postgres:// URL".into()))?;

        let mut pg_config = PgConfig::new();
        pg_config.host(endpoint.host().trim_start_matches('[').trim_end_matches(']'));
        pg_config.port(endpoint.port_or_default());
        pg_config.user(&endpoint.user());
        if let Some(password) = endpoint.password() {
            pg_config.password(password);
        }
        let database = endpoint.database();
        if !database.is_empty() {
            pg_config.dbname(&database);
        }
        pg_config.connect_timeout(CONNECT_TIMEOUT);

        let client = match make_connector(SslMode::for_endpoint(&endpoint)?)? {
            Some(tls) => {
                let (client, connection) = pg_config.connect(tls).await?;
                tokio::spawn(async move {
                    if let Err(e) = connection.await {
                        debug!("connection closed: {}", e);
                    }
                });
                client
            }
            None => {
                let (client, connection) = pg_config.connect(tokio_postgres::NoTls).await?;
                tokio::spawn(async move {
                    if let Err(e) = connection.await {
                        debug!("connection closed: {}", e);
                    }
                });
                client
            }
        };

        // Simple protocol so transaction-mode poolers accept it.
        let messages = client.simple_query("SELECT version()").await?;
        let version = messages
            .iter()
            .find_map(|m| match m {
                SimpleQueryMessage::Row(row) => row.get(0).map(str::to_string),
                _ => None,
            })
            .unwrap_or_default();
        Ok(version)
    }
}

#[async_trait]
impl ConnectionTester for PgConnectionTester {
    async fn test(&self, url: &str) -> ConnectionTest {
        match self.query_version(url).await {
            Ok(version) => ConnectionTest::ok(version),
            Err(e) => ConnectionTest::failed(e.to_string()),
        }
    }
}
