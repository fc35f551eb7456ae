//! Relay configuration: pump timing, queue sizes and fan-out policy

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;
use crate::domain::relay::EchoPolicy;

/// Time allowed to write one frame (or one coalesced write session).
pub const DEFAULT_WRITE_TIMEOUT_SECS: u64 = 10;

/// Time allowed between pongs before the peer is considered gone.
pub const DEFAULT_PONG_WAIT_SECS: u64 = 60;

/// Largest inbound frame accepted, in bytes.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 512;

/// Relay configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// Write deadline for every frame, in seconds
    #[serde(default = "default_write_timeout")]
    pub write_timeout_secs: u64,

    /// Read deadline refreshed by each pong, in seconds
    #[serde(default = "default_pong_wait")]
    pub pong_wait_secs: u64,

    /// Maximum inbound frame size in bytes
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    /// Per-pump outbound queue capacity
    #[serde(default = "default_outbound_capacity")]
    pub outbound_capacity: usize,

    /// Capacity of the registry's broadcast channel
    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,

    /// Whether senders receive their own messages
    #[serde(default)]
    pub echo_policy: EchoPolicy,

    /// Consecutive malformed frames tolerated before the connection is
    /// closed. Unset means malformed frames never close the connection.
    #[serde(default)]
    pub max_consecutive_decode_failures: Option<u32>,
}

impl RelayConfig {
    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    pub fn pong_wait(&self) -> Duration {
        Duration::from_secs(self.pong_wait_secs)
    }

    /// Heartbeat period: nine tenths of the pong wait.
    pub fn ping_period(&self) -> Duration {
        ping_period_for(self.pong_wait())
    }

    /// Validate relay configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.write_timeout_secs == 0 {
            return Err(ValidationError::InvalidTimeout("write_timeout_secs"));
        }
        if self.pong_wait_secs == 0 {
            return Err(ValidationError::InvalidTimeout("pong_wait_secs"));
        }
        if self.ping_period().is_zero() || self.ping_period() >= self.pong_wait() {
            return Err(ValidationError::PingPeriodTooLong);
        }
        if self.max_message_size == 0 {
            return Err(ValidationError::InvalidMessageSize);
        }
        if self.outbound_capacity == 0 {
            return Err(ValidationError::InvalidCapacity("outbound_capacity"));
        }
        if self.broadcast_capacity == 0 {
            return Err(ValidationError::InvalidCapacity("broadcast_capacity"));
        }
        if self.max_consecutive_decode_failures == Some(0) {
            return Err(ValidationError::InvalidDecodeFailureBudget);
        }
        Ok(())
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            write_timeout_secs: default_write_timeout(),
            pong_wait_secs: default_pong_wait(),
            max_message_size: default_max_message_size(),
            outbound_capacity: default_outbound_capacity(),
            broadcast_capacity: default_broadcast_capacity(),
            echo_policy: EchoPolicy::default(),
            max_consecutive_decode_failures: None,
        }
    }
}

/// Nine tenths of `pong_wait`.
pub fn ping_period_for(pong_wait: Duration) -> Duration {
    pong_wait * 9 / 10
}

fn default_write_timeout() -> u64 {
    DEFAULT_WRITE_TIMEOUT_SECS
}

fn default_pong_wait() -> u64 {
    DEFAULT_PONG_WAIT_SECS
}

fn default_max_message_size() -> usize {
    DEFAULT_MAX_MESSAGE_SIZE
}

fn default_outbound_capacity() -> usize {
    256
}

fn default_broadcast_capacity() -> usize {
    256
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relay_config_defaults() {
        let config = RelayConfig::default();
        assert_eq!(config.write_timeout(), Duration::from_secs(10));
        assert_eq!(config.pong_wait(), Duration::from_secs(60));
        assert_eq!(config.max_message_size, 512);
        assert_eq!(config.echo_policy, EchoPolicy::ExcludeSender);
        assert!(config.max_consecutive_decode_failures.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_ping_period_is_nine_tenths_of_pong_wait() {
        let config = RelayConfig::default();
        assert_eq!(config.ping_period(), Duration::from_secs(54));
        assert!(config.ping_period() < config.pong_wait());
    }

    #[test]
    fn test_validation_zero_write_timeout() {
        let config = RelayConfig {
            write_timeout_secs: 0,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ValidationError::InvalidTimeout("write_timeout_secs"))
        );
    }

    #[test]
    fn test_validation_pong_wait_lower_bound() {
        // 9/10 of one second still rounds to a non-zero ping period.
        let config = RelayConfig {
            pong_wait_secs: 1,
            ..Default::default()
        };
        assert!(config.validate().is_ok());

        let config = RelayConfig {
            pong_wait_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_zero_capacities() {
        let config = RelayConfig {
            outbound_capacity: 0,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ValidationError::InvalidCapacity("outbound_capacity"))
        );

        let config = RelayConfig {
            broadcast_capacity: 0,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ValidationError::InvalidCapacity("broadcast_capacity"))
        );
    }

    #[test]
    fn test_validation_zero_decode_budget() {
        let config = RelayConfig {
            max_consecutive_decode_failures: Some(0),
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ValidationError::InvalidDecodeFailureBudget)
        );
    }
}
