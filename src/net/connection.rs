//! Client connection lifecycle with bounded exponential backoff.

use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Offline,
    Connecting,
    Online,
    /// Waiting to retry; `attempt` counts from 1.
    Reconnecting { attempt: u32 },
    /// Retries exhausted. Only `connect` or `disconnect` leave this state.
    Error,
}

#[derive(Debug, Error, PartialEq)]
pub enum ConnectionError {
    #[error("cannot {event} while {from:?}")]
    InvalidTransition {
        from: ConnectionState,
        event: &'static str,
    },
    #[error("gave up after {attempts} reconnect attempts")]
    RetriesExhausted { attempts: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub factor: u32,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(250),
            factor: 2,
            max_delay: Duration::from_secs(4),
            max_attempts: 5,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based), capped at `max_delay`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let multiplier = self.factor.max(1).saturating_pow(exponent);
        self.base_delay
            .saturating_mul(multiplier)
            .min(self.max_delay)
    }
}

#[derive(Debug, Clone)]
pub struct Connection {
    state: ConnectionState,
    policy: RetryPolicy,
}

impl Connection {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            state: ConnectionState::Offline,
            policy,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn is_online(&self) -> bool {
        self.state == ConnectionState::Online
    }

    fn invalid(&self, event: &'static str) -> ConnectionError {
        ConnectionError::InvalidTransition {
            from: self.state,
            event,
        }
    }

    /// Offline or Error to Connecting.
    pub fn connect(&mut self) -> Result<(), ConnectionError> {
        match self.state {
            ConnectionState::Offline | ConnectionState::Error => {
                self.state = ConnectionState::Connecting;
                Ok(())
            }
            _ => Err(self.invalid("connect")),
        }
    }

    /// The transport reports an open link.
    pub fn opened(&mut self) -> Result<(), ConnectionError> {
        match self.state {
            ConnectionState::Connecting | ConnectionState::Reconnecting { .. } => {
                info!(previous = ?self.state, "connection online");
                self.state = ConnectionState::Online;
                Ok(())
            }
            _ => Err(self.invalid("open")),
        }
    }

    /// The link dropped or an attempt failed. Returns how long to wait before
    /// the next attempt, or `RetriesExhausted` after moving to `Error`.
    pub fn failed(&mut self) -> Result<Duration, ConnectionError> {
        let attempt = match self.state {
            ConnectionState::Online | ConnectionState::Connecting => 1,
            ConnectionState::Reconnecting { attempt } => attempt + 1,
            _ => return Err(self.invalid("fail")),
        };
        if attempt > self.policy.max_attempts {
            warn!(attempts = self.policy.max_attempts, "reconnect attempts exhausted");
            self.state = ConnectionState::Error;
            return Err(ConnectionError::RetriesExhausted {
                attempts: self.policy.max_attempts,
            });
        }
        let delay = self.policy.delay(attempt);
        info!(attempt, delay_ms = delay.as_millis() as u64, "scheduling reconnect");
        self.state = ConnectionState::Reconnecting { attempt };
        Ok(delay)
    }

    /// Any state to Offline.
    pub fn disconnect(&mut self) {
        self.state = ConnectionState::Offline;
    }
}

impl Default for Connection {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_up_to_the_cap() {
        let policy = RetryPolicy::default();
        let delays: Vec<_> = (1..=6).map(|n| policy.delay(n).as_millis()).collect();
        assert_eq!(delays, vec![250, 500, 1000, 2000, 4000, 4000]);
    }

    #[test]
    fn retries_are_bounded_and_end_in_error() {
        let mut conn = Connection::default();
        conn.connect().unwrap();
        conn.opened().unwrap();
        assert!(conn.is_online());

        for attempt in 1..=5 {
            conn.failed().unwrap();
            assert_eq!(conn.state(), ConnectionState::Reconnecting { attempt });
        }
        assert_eq!(
            conn.failed(),
            Err(ConnectionError::RetriesExhausted { attempts: 5 })
        );
        assert_eq!(conn.state(), ConnectionState::Error);

        conn.connect().unwrap();
        assert_eq!(conn.state(), ConnectionState::Connecting);
    }

    #[test]
    fn reconnect_success_goes_back_online() {
        let mut conn = Connection::default();
        conn.connect().unwrap();
        conn.opened().unwrap();
        conn.failed().unwrap();
        conn.opened().unwrap();
        assert!(conn.is_online());
        // a fresh drop starts counting from one again
        conn.failed().unwrap();
        assert_eq!(conn.state(), ConnectionState::Reconnecting { attempt: 1 });
    }

    #[test]
    fn illegal_transitions_are_typed_errors() {
        let mut conn = Connection::default();
        assert!(matches!(
            conn.opened(),
            Err(ConnectionError::InvalidTransition { event: "open", .. })
        ));
        assert!(conn.failed().is_err());
        conn.connect().unwrap();
        assert!(conn.connect().is_err());
    }
}
