//! Peer configuration

use ipc::CodecLimits;

/// Environment variable used to hand a connection to a child process
pub const DEFAULT_ENVIRONMENT_VARIABLE: &str = "CAPBUS_PEER";

/// Messages handled by one [`dispatch_pending`](crate::Peer::dispatch_pending) call
pub const DEFAULT_MAX_DISPATCH: usize = 64;

/// Per-peer settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerConfig {
    /// Variable read by `new_from_environment` and written by `export_to_environment`
    pub environment_variable: String,
    /// Limits applied when decoding inbound payloads
    pub limits: CodecLimits,
    pub max_dispatch: usize,
}

impl PeerConfig {
    pub fn with_environment_variable(mut self, name: impl Into<String>) -> Self {
        self.environment_variable = name.into();
        self
    }

    pub fn with_limits(mut self, limits: CodecLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_max_dispatch(mut self, max: usize) -> Self {
        self.max_dispatch = max;
        self
    }
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            environment_variable: DEFAULT_ENVIRONMENT_VARIABLE.to_string(),
            limits: CodecLimits::default(),
            max_dispatch: DEFAULT_MAX_DISPATCH,
        }
    }
}
