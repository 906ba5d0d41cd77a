//! Fire-and-forget execution telemetry.
//!
//! The executor hands every attempt record and final result to a
//! [`TelemetryStore`] from a spawned task. Store failures are logged and
//! never reach the caller of `execute()`.

mod jsonl;


pub use jsonl::JsonlTelemetryStore;

use crate::executor::{ExecutionAttemptRecord, ExecutionResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Mutex;

/// Errors from a telemetry backend.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("telemetry I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("telemetry serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// One line of telemetry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TelemetryEvent {
    Attempt(ExecutionAttemptRecord),
    Execution(ExecutionResult),
}

/// Sink for telemetry events.
#[async_trait]
pub trait TelemetryStore: Send + Sync + 'static {
    async fn append(&self, event: &TelemetryEvent) -> Result<(), TelemetryError>;
}

/// Telemetry settings.
///
/// ```toml
/// [telemetry]
/// enabled = true
/// path = "tierline-telemetry.jsonl"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub enabled: bool,
    /// JSONL file receiving one event per line
    pub path: PathBuf,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: PathBuf::from("tierline-telemetry.jsonl"),
        }
    }
}

/// In-memory store, for tests and in-process dashboards.
#[derive(Debug, Default)]
pub struct MemoryTelemetryStore {
    events: Mutex<Vec<TelemetryEvent>>,
}

impl MemoryTelemetryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every event appended so far.
    pub fn events(&self) -> Vec<TelemetryEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => {
                tracing::warn!("Telemetry mutex poisoned, recovering");
                poisoned.into_inner().clone()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.events().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl TelemetryStore for MemoryTelemetryStore {
    async fn append(&self, event: &TelemetryEvent) -> Result<(), TelemetryError> {
        let mut events = self.events.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Telemetry mutex poisoned, recovering");
            poisoned.into_inner()
        });
        events.push(event.clone());
        Ok(())
    }
}
