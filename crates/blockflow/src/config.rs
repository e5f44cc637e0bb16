//! Engine configuration

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Deserialize;

use crate::error::{BlockflowError, Result};

/// Environment variable holding the module search path.
pub const PATH_VAR: &str = "BLOCKFLOW_PATH";

/// Environment variable overriding the call depth limit.
pub const MAX_DEPTH_VAR: &str = "BLOCKFLOW_MAX_CALL_DEPTH";

/// Configuration shared by the interpreter, the module loader and the
/// executing context.
///
/// This is passed through all evaluation calls and controls behavior like
/// recursion limits, module lookup and interruption.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum call depth (stack overflow protection)
    pub max_call_depth: usize,

    /// Directories searched for `<module>.py` sources
    pub module_paths: Vec<PathBuf>,

    /// Whether an executing context re-runs statements when its context changes
    pub auto_execute: bool,

    /// Interrupt flag - set to true to abort evaluation
    #[serde(skip)]
    pub interrupt: Arc<AtomicBool>,

    /// Whether to trace statement execution
    pub trace: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_call_depth: 200,
            module_paths: Vec::new(),
            auto_execute: false,
            interrupt: Arc::new(AtomicBool::new(false)),
            trace: false,
        }
    }
}

impl EngineConfig {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a configuration with a custom call depth limit.
    pub fn with_max_call_depth(max_depth: usize) -> Self {
        Self {
            max_call_depth: max_depth,
            ..Default::default()
        }
    }

    /// Add a module search directory.
    pub fn with_module_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.module_paths.push(path.into());
        self
    }

    /// Enable or disable automatic re-execution.
    pub fn with_auto_execute(mut self, enabled: bool) -> Self {
        self.auto_execute = enabled;
        self
    }

    /// Defaults overridden by `BLOCKFLOW_PATH` and `BLOCKFLOW_MAX_CALL_DEPTH`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(paths) = std::env::var_os(PATH_VAR) {
            config.module_paths = std::env::split_paths(&paths).collect();
        }
        if let Some(depth) = std::env::var(MAX_DEPTH_VAR)
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
        {
            config.max_call_depth = depth;
        }
        config
    }

    /// Read a JSON configuration file. Missing fields take their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| BlockflowError::Serialization(format!("{}: {}", path.display(), e)))?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Check if evaluation has been interrupted.
    pub fn is_interrupted(&self) -> bool {
        self.interrupt.load(Ordering::Relaxed)
    }

    /// Request interruption of evaluation.
    pub fn interrupt(&self) {
        self.interrupt.store(true, Ordering::Relaxed);
    }

    /// Reset the interrupt flag.
    pub fn reset_interrupt(&self) {
        self.interrupt.store(false, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_call_depth, 200);
        assert!(config.module_paths.is_empty());
        assert!(!config.auto_execute);
        assert!(!config.is_interrupted());
    }

    #[test]
    fn test_interrupt_round_trip() {
        let config = EngineConfig::new();
        config.interrupt();
        assert!(config.is_interrupted());
        config.reset_interrupt();
        assert!(!config.is_interrupted());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: EngineConfig = serde_json::from_str(r#"{"max_call_depth": 12}"#).unwrap();
        assert_eq!(config.max_call_depth, 12);
        assert!(!config.auto_execute);
    }

    #[test]
    fn test_builders() {
        let config = EngineConfig::with_max_call_depth(5)
            .with_module_path("/tmp/mods")
            .with_auto_execute(true);
        assert_eq!(config.max_call_depth, 5);
        assert_eq!(config.module_paths, vec![PathBuf::from("/tmp/mods")]);
        assert!(config.auto_execute);
    }
}
