//! File-backed kill switch gate (spec.md §6 "Kill switch state file"). Persisted
//! synchronously on every change so an operator's `close_all`/activate survives a
//! process restart, and so the file itself is the auditable source of truth.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::domain::ports::KillSwitchGate;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct KillSwitchState {
    active: bool,
    activated_at: Option<DateTime<Utc>>,
    activated_by: Option<String>,
    reason: Option<String>,
}

impl Default for KillSwitchState {
    fn default() -> Self {
        Self {
            active: false,
            activated_at: None,
            activated_by: None,
            reason: None,
        }
    }
}

pub struct FileKillSwitchGate {
    path: PathBuf,
    state: RwLock<KillSwitchState>,
}

impl FileKillSwitchGate {
    /// Loads existing state from `path` if present; starts inactive otherwise.
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let state = std::fs::read_to_string(&path)
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default();
        Self { path, state: RwLock::new(state) }
    }

    async fn persist(&self, state: &KillSwitchState) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let tmp_path = self.path.with_extension("tmp");
        let serialized = serde_json::to_string_pretty(state)?;
        std::fs::write(&tmp_path, serialized)?;
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

#[async_trait]
impl KillSwitchGate for FileKillSwitchGate {
    async fn is_active(&self) -> bool {
        self.state.read().await.active
    }

    async fn activate(&self, activated_by: &str, reason: &str) -> anyhow::Result<()> {
        let mut state = self.state.write().await;
        state.active = true;
        state.activated_at = Some(Utc::now());
        state.activated_by = Some(activated_by.to_string());
        state.reason = Some(reason.to_string());
        warn!(%activated_by, %reason, "kill switch activated");
        self.persist(&state).await
    }

    async fn deactivate(&self) -> anyhow::Result<()> {
        let mut state = self.state.write().await;
        *state = KillSwitchState::default();
        info!("kill switch deactivated");
        self.persist(&state).await
    }
}
