//! Runtime configuration.

/// Configuration for one node's [`Runtime`](crate::Runtime).
#[derive(Debug, Clone, Default)]
pub struct RuntimeConfig {
    pub input: InputConfig,
    pub output: OutputConfig,
}

/// Configuration for the input manager thread.
#[derive(Debug, Clone)]
pub struct InputConfig {
    /// Thread name; `None` derives `weir-input-<node>`.
    pub thread_name: Option<String>,
    /// Pending-queue depth per destination at which a warning is logged.
    /// The queue itself is unbounded; a queue this deep means a consumer
    /// has stalled while its upstream keeps producing.
    pub pending_warn_depth: usize,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            thread_name: None,
            pending_warn_depth: 1024,
        }
    }
}

/// Configuration for the output manager thread.
#[derive(Debug, Clone, Default)]
pub struct OutputConfig {
    /// Thread name; `None` derives `weir-output-<node>`.
    pub thread_name: Option<String>,
}
