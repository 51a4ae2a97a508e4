//! # Session Configuration

use crate::policy::FrameRepeatPolicy;
use serde::{Deserialize, Serialize};

/// Per-session tuning, derived from the runtime `CoreConfig`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Chunk size used when feeding in-memory buffers to the engine.
    ///
    /// Zero splits the buffer into five equal parts instead.
    ///
    /// Default: 100 000 bytes.
    #[serde(default = "default_buffer_max_chunk_size")]
    pub buffer_max_chunk_size: usize,

    #[serde(default)]
    pub repeat_policy: FrameRepeatPolicy,
}

fn default_buffer_max_chunk_size() -> usize {
    100_000
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            buffer_max_chunk_size: default_buffer_max_chunk_size(),
            repeat_policy: FrameRepeatPolicy::default(),
        }
    }
}

impl From<&core_runtime::config::CoreConfig> for SessionConfig {
    fn from(config: &core_runtime::config::CoreConfig) -> Self {
        Self {
            buffer_max_chunk_size: config.buffer_max_chunk_size,
            repeat_policy: FrameRepeatPolicy {
                enabled: config.suppress_repeated_frames,
                exempt_width: config.fixed_size_sensor_width,
            },
        }
    }
}
