//! Registration gating: who the viewer is to the backend.
//!
//! [`RegistrationGate`] moves between `NotRegistered`, `RegistrationPending`
//! and `Registered`. At most one registration request is in flight per entry
//! into `RegistrationPending`. A failed attempt falls back to `NotRegistered`
//! and the next attempt waits an exponentially growing number of ticks, the
//! same schedule the engine's reconnect logic uses for sockets.

use tracing::{info, warn};

use crate::error::MessageError;
use crate::gateway::GatewayRequest;
use crate::message::same_name;

/// A durable credential and the display name it was issued for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Credentials {
    /// Value sent as `X-API-Key`.
    pub api_key: String,
    /// Display name the key was registered under.
    pub username: String,
}

impl Credentials {
    /// Builds credentials, or `None` if either part is blank.
    pub fn from_parts(api_key: &str, username: &str) -> Option<Self> {
        if api_key.trim().is_empty() || username.trim().is_empty() {
            return None;
        }
        Some(Self {
            api_key: api_key.to_string(),
            username: username.to_string(),
        })
    }
}

/// Where the gate currently stands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegistrationState {
    /// No usable credential.
    NotRegistered,
    /// A registration request is in flight.
    RegistrationPending,
    /// A credential for the current viewer is held.
    Registered,
}

// ---------------------------------------------------------------------------
// Backoff
// ---------------------------------------------------------------------------

/// Retry schedule for failed registrations, counted in ticks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackoffConfig {
    /// Wait after the first failure. Default: 5 ticks.
    pub initial_ticks: u64,
    /// Growth factor per further failure. Default: 2.
    pub multiplier: u64,
    /// Longest wait. Default: 200 ticks.
    pub max_ticks: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_ticks: 5,
            multiplier: 2,
            max_ticks: 200,
        }
    }
}

#[derive(Clone, Debug)]
struct Backoff {
    config: BackoffConfig,
    current: u64,
    failures: u32,
}

impl Backoff {
    fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            current: config.initial_ticks,
            failures: 0,
        }
    }

    fn next_delay(&mut self) -> u64 {
        let delay = self.current.min(self.config.max_ticks);
        self.failures += 1;
        self.current = self
            .current
            .saturating_mul(self.config.multiplier)
            .min(self.config.max_ticks);
        delay
    }

    fn reset(&mut self) {
        self.current = self.config.initial_ticks;
        self.failures = 0;
    }
}

// ---------------------------------------------------------------------------
// RegistrationGate
// ---------------------------------------------------------------------------

/// What a registration completion changed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegistrationOutcome {
    /// A new credential was issued and should be persisted.
    Issued(Credentials),
    /// The attempt failed; retry is scheduled.
    Failed,
    /// The completion no longer matches the gate's state.
    Stale,
}

/// Tracks the viewer's credential and issues registration/verify requests.
#[derive(Debug)]
pub struct RegistrationGate {
    state: RegistrationState,
    credentials: Option<Credentials>,
    pending_username: Option<String>,
    backoff: Backoff,
    retry_at: u64,
    verify_in_flight: bool,
    verified: bool,
}

impl RegistrationGate {
    /// Starts `Registered` when a stored credential exists.
    pub fn new(stored: Option<Credentials>, backoff: BackoffConfig) -> Self {
        let state = if stored.is_some() {
            RegistrationState::Registered
        } else {
            RegistrationState::NotRegistered
        };
        Self {
            state,
            credentials: stored,
            pending_username: None,
            backoff: Backoff::new(backoff),
            retry_at: 0,
            verify_in_flight: false,
            verified: false,
        }
    }

    /// Current state.
    pub fn state(&self) -> RegistrationState {
        self.state
    }

    /// Whether authenticated calls may be made.
    pub fn is_registered(&self) -> bool {
        self.state == RegistrationState::Registered
    }

    /// The held credential, whatever the state.
    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    /// API key to use for authenticated calls, only while `Registered`.
    pub fn api_key(&self) -> Option<&str> {
        if self.is_registered() {
            self.credentials.as_ref().map(|c| c.api_key.as_str())
        } else {
            None
        }
    }

    /// Advances the gate for `tick` with the active `viewer`, returning the
    /// request to submit, if any.
    pub fn poll(&mut self, tick: u64, viewer: &str) -> Option<GatewayRequest> {
        match self.state {
            RegistrationState::RegistrationPending => None,
            RegistrationState::Registered => {
                let Some(creds) = &self.credentials else {
                    self.state = RegistrationState::NotRegistered;
                    return self.poll(tick, viewer);
                };
                if !same_name(&creds.username, viewer) {
                    info!(
                        saved = %creds.username,
                        current = %viewer,
                        "different viewer detected, re-registering"
                    );
                    return Some(self.begin_attempt(viewer));
                }
                if !self.verified && !self.verify_in_flight {
                    let api_key = creds.api_key.clone();
                    self.verify_in_flight = true;
                    return Some(GatewayRequest::Verify { api_key });
                }
                None
            }
            RegistrationState::NotRegistered => {
                if tick < self.retry_at {
                    return None;
                }
                info!(username = %viewer, "registering");
                Some(self.begin_attempt(viewer))
            }
        }
    }

    /// Applies a registration completion received on `tick`.
    pub fn on_registered(
        &mut self,
        username: &str,
        result: Result<String, MessageError>,
        tick: u64,
    ) -> RegistrationOutcome {
        if self.state != RegistrationState::RegistrationPending
            || self.pending_username.as_deref() != Some(username)
        {
            return RegistrationOutcome::Stale;
        }
        self.pending_username = None;

        match result {
            Ok(api_key) => {
                let creds = Credentials {
                    api_key,
                    username: username.to_string(),
                };
                info!(username = %username, "registered");
                self.state = RegistrationState::Registered;
                self.credentials = Some(creds.clone());
                self.verified = true;
                self.backoff.reset();
                RegistrationOutcome::Issued(creds)
            }
            Err(err) => {
                let delay = self.backoff.next_delay();
                self.retry_at = tick + delay;
                warn!(
                    username = %username,
                    error = %err,
                    failures = self.backoff.failures,
                    retry_in_ticks = delay,
                    "registration failed"
                );
                self.state = RegistrationState::NotRegistered;
                RegistrationOutcome::Failed
            }
        }
    }

    /// Applies a verify completion. Returns `true` if the stored credential
    /// was rejected and dropped.
    pub fn on_verified(&mut self, api_key: &str, result: Result<(), MessageError>) -> bool {
        let matches = self
            .credentials
            .as_ref()
            .is_some_and(|c| c.api_key == api_key);
        if !matches {
            return false;
        }
        self.verify_in_flight = false;

        match result {
            Ok(()) => {
                self.verified = true;
                false
            }
            Err(err) if err.is_transient() => {
                warn!(error = %err, "could not verify credential, keeping it");
                self.verified = true;
                false
            }
            Err(err) => {
                warn!(error = %err, "stored credential rejected, dropping it");
                self.credentials = None;
                self.verified = false;
                if self.state == RegistrationState::Registered {
                    self.state = RegistrationState::NotRegistered;
                    self.retry_at = 0;
                }
                true
            }
        }
    }

    /// Makes the gate re-checkable after a logout or world hop. In-flight
    /// completions become stale.
    pub fn reset_session(&mut self) {
        self.pending_username = None;
        self.verify_in_flight = false;
        self.retry_at = 0;
        self.state = if self.credentials.is_some() {
            RegistrationState::Registered
        } else {
            RegistrationState::NotRegistered
        };
    }

    fn begin_attempt(&mut self, viewer: &str) -> GatewayRequest {
        self.state = RegistrationState::RegistrationPending;
        self.pending_username = Some(viewer.to_string());
        GatewayRequest::Register {
            username: viewer.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn creds(name: &str) -> Credentials {
        Credentials {
            api_key: format!("key-{name}"),
            username: name.to_string(),
        }
    }

    fn transient() -> MessageError {
        MessageError::TransientNetworkFailure("down".into())
    }

    #[test]
    fn test_credentials_require_both_parts() {
        assert!(Credentials::from_parts("k", "Bob").is_some());
        assert!(Credentials::from_parts("", "Bob").is_none());
        assert!(Credentials::from_parts("k", "  ").is_none());
    }

    #[test]
    fn test_fresh_gate_registers_once() {
        let mut gate = RegistrationGate::new(None, BackoffConfig::default());
        assert_eq!(
            gate.poll(0, "Bob"),
            Some(GatewayRequest::Register {
                username: "Bob".into()
            })
        );
        assert_eq!(gate.state(), RegistrationState::RegistrationPending);
        assert_eq!(gate.poll(1, "Bob"), None);
        assert_eq!(gate.poll(2, "Bob"), None);
    }

    #[test]
    fn test_success_issues_credentials() {
        let mut gate = RegistrationGate::new(None, BackoffConfig::default());
        gate.poll(0, "Bob");
        let outcome = gate.on_registered("Bob", Ok("abc".into()), 3);

        assert_eq!(
            outcome,
            RegistrationOutcome::Issued(Credentials {
                api_key: "abc".into(),
                username: "Bob".into()
            })
        );
        assert!(gate.is_registered());
        assert_eq!(gate.api_key(), Some("abc"));
        // Fresh keys are not re-verified.
        assert_eq!(gate.poll(4, "Bob"), None);
    }

    #[test]
    fn test_failure_backs_off_exponentially() {
        let mut gate = RegistrationGate::new(None, BackoffConfig::default());

        gate.poll(0, "Bob");
        assert_eq!(gate.on_registered("Bob", Err(transient()), 10), RegistrationOutcome::Failed);
        assert_eq!(gate.state(), RegistrationState::NotRegistered);
        assert_eq!(gate.api_key(), None);
        assert_eq!(gate.poll(14, "Bob"), None);
        assert!(gate.poll(15, "Bob").is_some());

        gate.on_registered("Bob", Err(transient()), 15);
        assert_eq!(gate.poll(24, "Bob"), None);
        assert!(gate.poll(25, "Bob").is_some());
    }

    #[test]
    fn test_backoff_is_capped() {
        let mut backoff = Backoff::new(BackoffConfig::default());
        let delays: Vec<u64> = (0..8).map(|_| backoff.next_delay()).collect();
        assert_eq!(delays, vec![5, 10, 20, 40, 80, 160, 200, 200]);
        backoff.reset();
        assert_eq!(backoff.next_delay(), 5);
    }

    #[test]
    fn test_stored_credentials_start_registered_and_verify_once() {
        let mut gate = RegistrationGate::new(Some(creds("Bob")), BackoffConfig::default());
        assert!(gate.is_registered());
        assert_eq!(
            gate.poll(0, "bob"),
            Some(GatewayRequest::Verify {
                api_key: "key-Bob".into()
            })
        );
        assert_eq!(gate.poll(1, "bob"), None);
        assert!(!gate.on_verified("key-Bob", Ok(())));
        assert_eq!(gate.poll(2, "bob"), None);
    }

    #[test]
    fn test_rejected_credential_is_dropped() {
        let mut gate = RegistrationGate::new(Some(creds("Bob")), BackoffConfig::default());
        gate.poll(0, "Bob");
        assert!(gate.on_verified("key-Bob", Err(MessageError::AuthenticationMissing)));
        assert_eq!(gate.state(), RegistrationState::NotRegistered);
        assert!(gate.credentials().is_none());
        assert_eq!(
            gate.poll(1, "Bob"),
            Some(GatewayRequest::Register {
                username: "Bob".into()
            })
        );
    }

    #[test]
    fn test_transient_verify_failure_keeps_credential() {
        let mut gate = RegistrationGate::new(Some(creds("Bob")), BackoffConfig::default());
        gate.poll(0, "Bob");
        assert!(!gate.on_verified("key-Bob", Err(transient())));
        assert!(gate.is_registered());
        assert_eq!(gate.poll(1, "Bob"), None);
    }

    #[test]
    fn test_account_switch_reregisters() {
        let mut gate = RegistrationGate::new(Some(creds("Bob")), BackoffConfig::default());
        assert_eq!(
            gate.poll(0, "Alice"),
            Some(GatewayRequest::Register {
                username: "Alice".into()
            })
        );
        assert_eq!(gate.state(), RegistrationState::RegistrationPending);
        assert_eq!(gate.api_key(), None);

        let outcome = gate.on_registered("Alice", Ok("new".into()), 1);
        assert!(matches!(outcome, RegistrationOutcome::Issued(c) if c.username == "Alice"));
    }

    #[test]
    fn test_completion_after_reset_is_stale() {
        let mut gate = RegistrationGate::new(None, BackoffConfig::default());
        gate.poll(0, "Bob");
        gate.reset_session();
        assert_eq!(gate.state(), RegistrationState::NotRegistered);
        assert_eq!(gate.on_registered("Bob", Ok("late".into()), 1), RegistrationOutcome::Stale);
        assert!(gate.poll(1, "Bob").is_some());
    }

    #[test]
    fn test_reset_clears_retry_wait() {
        let mut gate = RegistrationGate::new(None, BackoffConfig::default());
        gate.poll(0, "Bob");
        gate.on_registered("Bob", Err(transient()), 0);
        assert_eq!(gate.poll(1, "Bob"), None);
        gate.reset_session();
        assert!(gate.poll(1, "Bob").is_some());
    }
}
