//! System status probe.
//!
//! Runs a fixed set of read-only commands concurrently on a dedicated
//! connection. The probe never touches the session slot, so it works while
//! an invocation is running.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::runner::RemoteExecutor;

/// Commands run by the probe.
pub const STATUS_COMMANDS: &[&str] = &[
    "uptime",
    "free -h",
    "df -h",
    "vcgencmd measure_temp",
    "hostname -I",
];

/// Result of one probe command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProbeOutput {
    Output(String),
    Error { error: String },
}

impl ProbeOutput {
    pub fn output(&self) -> Option<&str> {
        match self {
            Self::Output(text) => Some(text),
            Self::Error { .. } => None,
        }
    }
}

/// Point-in-time view of the remote host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemSnapshot {
    pub timestamp: DateTime<Utc>,
    /// Output per command, keyed by command line
    #[serde(default)]
    pub system: BTreeMap<String, ProbeOutput>,
    /// Set when the host could not be reached at all
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SystemSnapshot {
    pub fn is_reachable(&self) -> bool {
        self.error.is_none()
    }

    pub fn get(&self, command: &str) -> Option<&str> {
        self.system.get(command).and_then(ProbeOutput::output)
    }

    /// JSON form handed to the translator as system state.
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Collects a [`SystemSnapshot`].
#[derive(Clone)]
pub struct StatusProbe {
    executor: Arc<dyn RemoteExecutor>,
    commands: Vec<String>,
    timeout: Duration,
}

impl StatusProbe {
    pub fn new(executor: Arc<dyn RemoteExecutor>) -> Self {
        Self {
            executor,
            commands: STATUS_COMMANDS.iter().map(|c| c.to_string()).collect(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_commands(mut self, commands: Vec<String>) -> Self {
        self.commands = commands;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Take a snapshot. Failures are recorded in the snapshot.
    pub async fn snapshot(&self) -> SystemSnapshot {
        let mut snapshot = SystemSnapshot {
            timestamp: Utc::now(),
            system: BTreeMap::new(),
            error: None,
        };

        let connection = match tokio::time::timeout(self.timeout, self.executor.connect()).await {
            Ok(Ok(connection)) => connection,
            Ok(Err(e)) => {
                warn!(error = %e, "status probe could not connect");
                snapshot.error = Some(format!("Could not connect to remote host: {}", e));
                return snapshot;
            }
            Err(_) => {
                snapshot.error = Some(format!(
                    "Could not connect to remote host: timed out after {:?}",
                    self.timeout
                ));
                return snapshot;
            }
        };

        let runs = self.commands.iter().map(|command| {
            let connection = &connection;
            async move {
                let result =
                    tokio::time::timeout(self.timeout, connection.capture(command)).await;
                let output = match result {
                    Ok(Ok(text)) => ProbeOutput::Output(text),
                    Ok(Err(e)) => ProbeOutput::Error {
                        error: e.to_string(),
                    },
                    Err(_) => ProbeOutput::Error {
                        error: "timed out".to_string(),
                    },
                };
                (command.clone(), output)
            }
        });
        snapshot.system = join_all(runs).await.into_iter().collect();
        connection.close().await;

        debug!(commands = snapshot.system.len(), "status snapshot taken");
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockExecutor, MockResponse};

    #[tokio::test]
    async fn test_snapshot_collects_every_command() {
        let executor = MockExecutor::new()
            .respond_to("uptime", MockResponse::success(" 10:00 up 3 days, load average: 0.10, 0.20, 0.30\n"))
            .respond_to("vcgencmd measure_temp", MockResponse::failure(127, "vcgencmd: not found"));
        let probe = StatusProbe::new(Arc::new(executor.clone()));

        let snapshot = probe.snapshot().await;
        assert!(snapshot.is_reachable());
        assert_eq!(snapshot.system.len(), STATUS_COMMANDS.len());
        assert!(snapshot.get("uptime").unwrap().starts_with("10:00 up"));
        assert_eq!(snapshot.get("vcgencmd measure_temp"), Some("vcgencmd: not found"));
        assert_eq!(executor.call_count("connect"), 1);
        assert!(executor.was_called("close"));
    }

    #[tokio::test]
    async fn test_unreachable_host() {
        let executor = MockExecutor::new().simulate_connect_failure("no route to host");
        let snapshot = StatusProbe::new(Arc::new(executor)).snapshot().await;

        assert!(!snapshot.is_reachable());
        assert!(snapshot.error.unwrap().contains("no route to host"));
        assert!(snapshot.system.is_empty());
    }

    #[tokio::test]
    async fn test_exec_errors_are_per_command() {
        let executor = MockExecutor::new().simulate_exec_failure("channel refused");
        let snapshot = StatusProbe::new(Arc::new(executor))
            .with_commands(vec!["uptime".to_string()])
            .snapshot()
            .await;

        assert!(matches!(
            snapshot.system.get("uptime"),
            Some(ProbeOutput::Error { .. })
        ));
        assert!(snapshot.to_value()["system"]["uptime"]["error"].is_string());
    }
}
