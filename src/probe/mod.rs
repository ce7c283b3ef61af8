//! Probe module for game server status.
//!
//! Queries a server's status endpoint and folds every failure into an
//! `Offline` result so callers never see an error.

mod slp;

pub use slp::*;

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

/// Probe error types.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
    #[error("network error: {0}")]
    Network(String),
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Status reported by a reachable server.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerStatus {
    pub players: u32,
    pub max_players: u32,
    pub version: String,
    pub motd: String,
    pub latency_ms: u64,
}

/// Normalized outcome of one probe.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum ProbeResult {
    Online(ServerStatus),
    Offline { error: String },
}

impl ProbeResult {
    pub fn is_online(&self) -> bool {
        matches!(self, ProbeResult::Online(_))
    }
}

/// A service that can query a server's status.
#[async_trait]
pub trait StatusProbe: Send + Sync {
    async fn query(&self, host: &str, port: u16, timeout: Duration) -> Result<ServerStatus, ProbeError>;
}

/// Run a probe, capturing any failure as `Offline`.
pub async fn probe(prober: &dyn StatusProbe, host: &str, port: u16, timeout: Duration) -> ProbeResult {
    let query = prober.query(host, port, timeout);
    let result = match tokio::time::timeout(timeout, query).await {
        Ok(result) => result,
        Err(_) => Err(ProbeError::Timeout(timeout)),
    };

    match result {
        Ok(status) => ProbeResult::Online(status),
        Err(e) => {
            tracing::debug!("Probe of {}:{} failed: {}", host, port, e);
            ProbeResult::Offline { error: e.to_string() }
        }
    }
}
