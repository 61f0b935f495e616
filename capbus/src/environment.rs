//! Connection hand-off through the process environment
//!
//! A parent exports its connection as a small JSON record in an environment
//! variable; the child process reads the record, removes the variable and
//! attaches to the connection.

use crate::config::PeerConfig;
use crate::peer::Peer;
use crate::{Error, Result};
use core_types::PeerDescriptor;
use kernel_api::Transport;
use serde::{Deserialize, Serialize};
use std::env;
use std::sync::Arc;
use tracing::debug;

/// What is stored in the environment variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentRecord {
    pub descriptor: PeerDescriptor,
}

impl Peer {
    /// Publishes this peer's connection in the configured environment
    /// variable, replacing any previous value.
    pub fn export_to_environment(&self) -> Result<()> {
        self.ensure_open()?;
        let record = EnvironmentRecord {
            descriptor: self.descriptor(),
        };
        let value = serde_json::to_string(&record)?;
        env::set_var(&self.config().environment_variable, value);
        debug!(peer = %self.id(), variable = %self.config().environment_variable, "peer exported");
        Ok(())
    }

    /// Attaches to the connection named by `CAPBUS_PEER`.
    pub fn new_from_environment(transport: Arc<dyn Transport>) -> Result<Peer> {
        Peer::from_environment_with_config(transport, PeerConfig::default())
    }

    /// Attaches to the connection named by the configured variable. The
    /// variable is removed once it has been parsed.
    pub fn from_environment_with_config(
        transport: Arc<dyn Transport>,
        config: PeerConfig,
    ) -> Result<Peer> {
        let variable = config.environment_variable.clone();
        let value = env::var(&variable)
            .map_err(|_| Error::NotFound(format!("environment variable {variable}")))?;
        let record: EnvironmentRecord = serde_json::from_str(&value)?;
        env::remove_var(&variable);
        debug!(%variable, descriptor = %record.descriptor, "peer imported from environment");
        Peer::from_fd_with_config(transport, record.descriptor, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EINVAL, ENOENT};
    use sim_kernel::LocalBus;

    fn config(variable: &str) -> PeerConfig {
        PeerConfig::default().with_environment_variable(variable)
    }

    #[test]
    fn test_export_and_attach() {
        let bus = Arc::new(LocalBus::new());
        let parent = Peer::with_config(bus.clone(), config("CAPBUS_TEST_EXPORT")).unwrap();
        parent.export_to_environment().unwrap();

        let child =
            Peer::from_environment_with_config(bus, config("CAPBUS_TEST_EXPORT")).unwrap();
        assert_eq!(child.id(), parent.id());
        assert_eq!(child.descriptor(), parent.descriptor());
        assert!(env::var("CAPBUS_TEST_EXPORT").is_err());
    }

    #[test]
    fn test_missing_variable() {
        let bus = Arc::new(LocalBus::new());
        let err = Peer::from_environment_with_config(bus, config("CAPBUS_TEST_MISSING"))
            .unwrap_err();
        assert_eq!(err.errno(), ENOENT);
    }

    #[test]
    fn test_malformed_record() {
        env::set_var("CAPBUS_TEST_MALFORMED", "not json");
        let bus = Arc::new(LocalBus::new());
        let err = Peer::from_environment_with_config(bus, config("CAPBUS_TEST_MALFORMED"))
            .unwrap_err();
        assert!(matches!(err, Error::Environment(_)));
        assert_eq!(err.errno(), EINVAL);
    }

    #[test]
    fn test_record_format() {
        let record = EnvironmentRecord {
            descriptor: PeerDescriptor::new(7),
        };
        assert_eq!(serde_json::to_string(&record).unwrap(), r#"{"descriptor":7}"#);
    }
}
