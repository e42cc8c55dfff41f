//! protocol configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// default deadline for one reencryption run
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// how long the root waits for a quorum
    pub timeout: Duration,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ProtocolConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timeout() {
        assert_eq!(ProtocolConfig::default().timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_with_timeout() {
        let config = ProtocolConfig::default().with_timeout(Duration::from_millis(250));
        assert_eq!(config.timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_serde() {
        let config = ProtocolConfig::default().with_timeout(Duration::from_secs(5));
        let bytes = bincode::serialize(&config).unwrap();
        let restored: ProtocolConfig = bincode::deserialize(&bytes).unwrap();
        assert_eq!(restored, config);
    }
}
