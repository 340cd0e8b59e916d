use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use crate::bridge::{BridgeOptions, UnityBridge};
use crate::config::ConfigDocument;
use crate::error::{Language, McpError};
use crate::monitor::DataMonitor;
use crate::security::ProcessSecurity;

/// Everything a handler needs, built once at startup and shared by
/// reference with every in-flight request.
pub struct AppContext {
    pub config: Arc<ConfigDocument>,
    pub monitor: DataMonitor,
    pub bridge: UnityBridge,
    pub security: ProcessSecurity,
    pub language: Language,
}

impl AppContext {
    /// Build the context for `config`, sandboxing auxiliary commands to
    /// `project_root`.
    pub fn new(config: ConfigDocument, project_root: impl Into<PathBuf>) -> Self {
        Self {
            monitor: DataMonitor::from_config(&config),
            bridge: UnityBridge::new(BridgeOptions::from_config(&config)),
            security: ProcessSecurity::new(config.security.clone(), project_root),
            language: config.language,
            config: Arc::new(config),
        }
    }

    /// Use the process working directory as the project root.
    pub fn from_config(config: ConfigDocument) -> Result<Self, McpError> {
        let root = std::env::current_dir()?;
        Ok(Self::new(config, root))
    }

    /// Load the cache and, when enabled, start watching the data directory.
    pub async fn start(&self) -> Result<(), McpError> {
        self.monitor.load_all().await;
        if self.config.unity.auto_detect {
            self.monitor.watch()?;
        }
        Ok(())
    }

    /// Cancel pending debounce timers and in-flight command waits.
    pub fn shutdown(&self) {
        debug!("cleaning up: {} pending reload timer(s)", self.monitor.pending_timers());
        self.monitor.stop();
        self.bridge.cancel_pending();
    }
}
