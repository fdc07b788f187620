//! Workflow configuration.

use karma_session::{SessionKind, SessionTtls};
use std::time::Duration;
use thiserror::Error;

/// Default TTL of a recipient-selection prompt (10 hours)
pub const DEFAULT_SELECT_RECIPIENT_TTL: Duration = Duration::from_secs(60 * 60 * 10);

/// Default TTL of a confirmation prompt (10 hours)
pub const DEFAULT_CONFIRM_REQUEST_TTL: Duration = Duration::from_secs(60 * 60 * 10);

/// Default depth of the engine command queue
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("TTL for {0} sessions must be positive")]
    ZeroTtl(SessionKind),

    #[error("Engine channel capacity must be positive")]
    ZeroCapacity,
}

/// Process configuration consumed by the workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowConfig {
    pub ttls: SessionTtls,
    pub channel_capacity: usize,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            ttls: SessionTtls {
                select_recipient: DEFAULT_SELECT_RECIPIENT_TTL,
                confirm_request: DEFAULT_CONFIRM_REQUEST_TTL,
            },
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl WorkflowConfig {
    pub fn with_ttls(ttls: SessionTtls) -> Self {
        Self {
            ttls,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for kind in [SessionKind::SelectRecipient, SessionKind::ConfirmRequest] {
            if self.ttls.for_kind(kind).is_zero() {
                return Err(ConfigError::ZeroTtl(kind));
            }
        }
        if self.channel_capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        Ok(())
    }
}
