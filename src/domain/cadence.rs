//! Notification cadence policies.
//!
//! A cadence decides whether a freshly logged fault should also produce an
//! outbound notification. The decision is pure: the throttle gathers the
//! inputs (current time, artifact emptiness, window anchor) and applies it.

use crate::error::ConfigError;
use std::time::{Duration, SystemTime};

/// Decision made by a cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyDecision {
    /// Send a notification for this fault
    Notify,
    /// Log only
    Hold,
}

impl NotifyDecision {
    pub fn is_notify(&self) -> bool {
        matches!(self, NotifyDecision::Notify)
    }
}

/// What the cadence looks at when deciding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CadenceInput {
    pub now: SystemTime,
    /// Log artifact is missing or has zero length.
    pub store_empty: bool,
    /// Start of the current notification window, if one is known.
    pub anchor: Option<SystemTime>,
}

/// How often notifications may go out.
///
/// Configured as seconds: `-1` is [`Cadence::UntilCleared`], `0` is
/// [`Cadence::EveryError`], anything positive is an [`Cadence::Interval`].
///
/// # Example
/// ```
/// use fault_reporter::{Cadence, CadenceInput};
/// use std::time::{Duration, SystemTime};
///
/// let cadence = Cadence::from_seconds(60).unwrap();
/// let t0 = SystemTime::now();
///
/// let early = CadenceInput { now: t0 + Duration::from_secs(30), store_empty: false, anchor: Some(t0) };
/// assert!(!cadence.decide(&early).is_notify());
///
/// let late = CadenceInput { now: t0 + Duration::from_secs(60), store_empty: false, anchor: Some(t0) };
/// assert!(cadence.decide(&late).is_notify());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    /// Notify once, then stay silent until the log is cleared
    UntilCleared,
    /// Notify for every fault that reaches the throttle
    EveryError,
    /// At most one notification per interval
    Interval(Duration),
}

impl Cadence {
    /// Parse the configured seconds value.
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidCadence` for values below `-1`.
    pub fn from_seconds(seconds: i64) -> Result<Self, ConfigError> {
        match seconds {
            -1 => Ok(Cadence::UntilCleared),
            0 => Ok(Cadence::EveryError),
            s if s > 0 => Ok(Cadence::Interval(Duration::from_secs(s as u64))),
            s => Err(ConfigError::InvalidCadence(s)),
        }
    }

    /// The configured seconds value this cadence came from.
    pub fn as_seconds(&self) -> i64 {
        match self {
            Cadence::UntilCleared => -1,
            Cadence::EveryError => 0,
            Cadence::Interval(d) => d.as_secs() as i64,
        }
    }

    /// Decide whether to notify.
    pub fn decide(&self, input: &CadenceInput) -> NotifyDecision {
        let notify = match self {
            Cadence::EveryError => true,
            Cadence::UntilCleared => input.store_empty,
            Cadence::Interval(interval) => {
                input.store_empty
                    || match input.anchor {
                        Some(anchor) => {
                            // A clock that went backwards counts as no time elapsed.
                            let elapsed = input.now.duration_since(anchor).unwrap_or_default();
                            elapsed >= *interval
                        }
                        None => true,
                    }
            }
        };

        if notify {
            NotifyDecision::Notify
        } else {
            NotifyDecision::Hold
        }
    }

    /// Sentence telling the recipient when to expect the next notification.
    pub fn next_notice(&self) -> String {
        match self {
            Cadence::UntilCleared => {
                "You will receive the next notification after you have cleared the error log."
                    .to_string()
            }
            Cadence::EveryError => {
                "You will receive the next notification when another error occurred.".to_string()
            }
            Cadence::Interval(d) => format!(
                "You will receive the next notification when an error occurred {} seconds after this incident.",
                d.as_secs()
            ),
        }
    }
}
