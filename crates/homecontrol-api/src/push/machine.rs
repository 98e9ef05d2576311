//! Push channel connection state machine.
//!
//! Transitions are pure: [`PushMachine::handle`] takes an event and
//! returns the effects the driver must carry out. No socket, timer or
//! session is touched here, so every transition is testable in isolation.
//!
//! ```text
//! Disconnected ─ConnectRequested─▶ Connecting ─Opened─▶ Open
//!                                      │                  │ TransportError
//!                          TransportError                  ▼
//!                                      │              Erroring ─SessionRestored─▶ Connecting
//!                                      ▼                  │ SessionFailed
//!                                Reconnecting ◀───────────┘
//!                                  │  ▲   BackoffElapsed ⇒ RestoreSession
//!                                  └──┘   SessionFailed  ⇒ ScheduleReconnect
//! ```
//!
//! `CloseRequested` moves every state to the terminal `Closed`.

use std::time::Duration;

use strum::Display;

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Exponential backoff configuration for push channel reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay after the first failed reconnection attempt. Default: 16s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 3600s.
    pub max_delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(16),
            max_delay: Duration::from_secs(3600),
        }
    }
}

// ── Backoff ──────────────────────────────────────────────────────────

/// Doubling backoff, capped at the configured maximum.
///
/// Delays never decrease until [`reset`](Self::reset) is called.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: ReconnectConfig,
    next: Duration,
}

impl Backoff {
    pub fn new(config: ReconnectConfig) -> Self {
        let next = config.initial_delay.min(config.max_delay);
        Self { config, next }
    }

    /// Return the current delay and double it for the next call.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = delay.saturating_mul(2).min(self.config.max_delay);
        delay
    }

    /// Start over from the initial delay.
    pub fn reset(&mut self) {
        self.next = self.config.initial_delay.min(self.config.max_delay);
    }
}

// ── States, events, effects ──────────────────────────────────────────

/// Observable state of the push channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ConnectionState {
    /// Not started yet.
    Disconnected,
    /// Opening the WebSocket.
    Connecting,
    /// Socket open, notifications flowing.
    Open,
    /// The open socket failed; the first session restore is running.
    Erroring,
    /// Waiting out a backoff delay between session restore attempts.
    #[strum(to_string = "Reconnecting (attempt {attempt})")]
    Reconnecting { attempt: u32 },
    /// Explicitly disconnected. Terminal.
    Closed,
}

impl ConnectionState {
    pub fn is_open(self) -> bool {
        self == Self::Open
    }

    pub fn is_closed(self) -> bool {
        self == Self::Closed
    }
}

/// Inputs to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushEvent {
    /// Start the channel.
    ConnectRequested,
    /// The WebSocket handshake completed.
    Opened,
    /// A pong answered the keep-alive ping.
    Pong,
    /// Socket error, unexpected close or missed pong.
    TransportError,
    /// A fresh session was established.
    SessionRestored,
    /// Session establishment failed.
    SessionFailed,
    /// A scheduled backoff delay ran out.
    BackoffElapsed,
    /// Explicit disconnect.
    CloseRequested,
}

/// Work the driver performs in response to a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    OpenSocket,
    CloseSocket,
    StartWatchdog,
    StopWatchdog,
    MarkEstablished,
    MarkNotEstablished,
    MarkReachable,
    MarkUnreachable,
    /// Reset the expected event sequence number to zero.
    ResetSequence,
    /// Establish a new session now.
    RestoreSession,
    /// Sleep, then deliver [`PushEvent::BackoffElapsed`].
    ScheduleReconnect(Duration),
    /// Extend the gateway session timeout.
    RefreshSession,
}

// ── PushMachine ──────────────────────────────────────────────────────

/// The push channel state machine.
#[derive(Debug, Clone)]
pub struct PushMachine {
    state: ConnectionState,
    backoff: Backoff,
}

impl PushMachine {
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            backoff: Backoff::new(config),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Apply `event` and return the effects to run, in order.
    ///
    /// Events that make no sense in the current state are ignored.
    pub fn handle(&mut self, event: PushEvent) -> Vec<Effect> {
        use ConnectionState as S;
        use Effect as E;
        use PushEvent as Ev;

        let (next, effects) = match (self.state, event) {
            (S::Closed, _) => return Vec::new(),

            (_, Ev::CloseRequested) => (
                S::Closed,
                vec![E::StopWatchdog, E::CloseSocket, E::MarkNotEstablished],
            ),

            (S::Disconnected, Ev::ConnectRequested) => (S::Connecting, vec![E::OpenSocket]),

            (S::Connecting, Ev::Opened) => {
                (S::Open, vec![E::MarkEstablished, E::StartWatchdog])
            }

            // The socket never opened: keep the running backoff.
            (S::Connecting, Ev::TransportError) => (
                S::Reconnecting { attempt: 1 },
                vec![
                    E::MarkNotEstablished,
                    E::ResetSequence,
                    E::ScheduleReconnect(self.backoff.next_delay()),
                ],
            ),

            (S::Open, Ev::Pong) => (S::Open, vec![E::RefreshSession]),

            (S::Open, Ev::TransportError) => {
                self.backoff.reset();
                (
                    S::Erroring,
                    vec![
                        E::StopWatchdog,
                        E::MarkNotEstablished,
                        E::MarkUnreachable,
                        E::CloseSocket,
                        E::ResetSequence,
                        E::RestoreSession,
                    ],
                )
            }

            (S::Erroring | S::Reconnecting { .. }, Ev::SessionRestored) => {
                (S::Connecting, vec![E::MarkReachable, E::OpenSocket])
            }

            (S::Erroring, Ev::SessionFailed) => (
                S::Reconnecting { attempt: 1 },
                vec![E::ScheduleReconnect(self.backoff.next_delay())],
            ),

            (S::Reconnecting { attempt }, Ev::SessionFailed) => (
                S::Reconnecting {
                    attempt: attempt.saturating_add(1),
                },
                vec![E::ScheduleReconnect(self.backoff.next_delay())],
            ),

            (S::Reconnecting { attempt }, Ev::BackoffElapsed) => {
                (S::Reconnecting { attempt }, vec![E::RestoreSession])
            }

            (state, event) => {
                tracing::trace!(%state, ?event, "ignoring push event");
                return Vec::new();
            }
        };

        if next != self.state {
            tracing::debug!(from = %self.state, to = %next, "push channel transition");
        }
        self.state = next;
        effects
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn open_machine() -> PushMachine {
        let mut m = PushMachine::new(ReconnectConfig::default());
        m.handle(PushEvent::ConnectRequested);
        m.handle(PushEvent::Opened);
        assert_eq!(m.state(), ConnectionState::Open);
        m
    }

    fn scheduled_delay(effects: &[Effect]) -> Option<Duration> {
        effects.iter().find_map(|e| match e {
            Effect::ScheduleReconnect(d) => Some(*d),
            _ => None,
        })
    }

    #[test]
    fn default_reconnect_config() {
        let config = ReconnectConfig::default();
        assert_eq!(config.initial_delay, Duration::from_secs(16));
        assert_eq!(config.max_delay, Duration::from_secs(3600));
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let mut backoff = Backoff::new(ReconnectConfig::default());
        let delays: Vec<u64> = (0..10).map(|_| backoff.next_delay().as_secs()).collect();
        assert_eq!(
            delays,
            vec![16, 32, 64, 128, 256, 512, 1024, 2048, 3600, 3600]
        );
    }

    #[test]
    fn backoff_never_decreases_and_never_exceeds_ceiling() {
        let config = ReconnectConfig::default();
        let mut backoff = Backoff::new(config.clone());
        let mut last = Duration::ZERO;
        for _ in 0..50 {
            let d = backoff.next_delay();
            assert!(d >= last, "{d:?} < {last:?}");
            assert!(d <= config.max_delay);
            last = d;
        }
    }

    #[test]
    fn opening_marks_established_and_starts_watchdog() {
        let mut m = PushMachine::new(ReconnectConfig::default());
        assert_eq!(m.handle(PushEvent::ConnectRequested), vec![Effect::OpenSocket]);
        assert_eq!(
            m.handle(PushEvent::Opened),
            vec![Effect::MarkEstablished, Effect::StartWatchdog]
        );
    }

    #[test]
    fn transport_error_tears_down_and_restores_session() {
        let mut m = open_machine();
        let effects = m.handle(PushEvent::TransportError);
        assert_eq!(m.state(), ConnectionState::Erroring);
        assert_eq!(
            effects,
            vec![
                Effect::StopWatchdog,
                Effect::MarkNotEstablished,
                Effect::MarkUnreachable,
                Effect::CloseSocket,
                Effect::ResetSequence,
                Effect::RestoreSession,
            ]
        );
    }

    #[test]
    fn failed_restores_back_off_until_success() {
        let mut m = open_machine();
        m.handle(PushEvent::TransportError);

        let mut delays = Vec::new();
        for _ in 0..3 {
            delays.push(scheduled_delay(&m.handle(PushEvent::SessionFailed)).unwrap_or_default());
            assert_eq!(m.handle(PushEvent::BackoffElapsed), vec![Effect::RestoreSession]);
        }
        assert_eq!(m.state(), ConnectionState::Reconnecting { attempt: 3 });
        assert_eq!(
            delays,
            vec![
                Duration::from_secs(16),
                Duration::from_secs(32),
                Duration::from_secs(64)
            ]
        );

        let effects = m.handle(PushEvent::SessionRestored);
        assert_eq!(effects, vec![Effect::MarkReachable, Effect::OpenSocket]);
        assert_eq!(m.state(), ConnectionState::Connecting);
    }

    #[test]
    fn backoff_resets_only_after_fresh_erroring() {
        let mut m = open_machine();
        m.handle(PushEvent::TransportError);
        m.handle(PushEvent::SessionFailed);
        m.handle(PushEvent::BackoffElapsed);
        m.handle(PushEvent::SessionRestored);

        // Socket fails to open again: the backoff keeps growing.
        let effects = m.handle(PushEvent::TransportError);
        assert_eq!(scheduled_delay(&effects), Some(Duration::from_secs(32)));

        m.handle(PushEvent::BackoffElapsed);
        m.handle(PushEvent::SessionRestored);
        m.handle(PushEvent::Opened);
        m.handle(PushEvent::TransportError);
        let effects = m.handle(PushEvent::SessionFailed);
        assert_eq!(scheduled_delay(&effects), Some(Duration::from_secs(16)));
    }

    #[test]
    fn pong_refreshes_session_only_when_open() {
        let mut m = open_machine();
        assert_eq!(m.handle(PushEvent::Pong), vec![Effect::RefreshSession]);

        let mut idle = PushMachine::new(ReconnectConfig::default());
        assert!(idle.handle(PushEvent::Pong).is_empty());
    }

    #[test]
    fn close_is_terminal() {
        let mut m = open_machine();
        m.handle(PushEvent::TransportError);
        m.handle(PushEvent::SessionFailed);

        let effects = m.handle(PushEvent::CloseRequested);
        assert_eq!(m.state(), ConnectionState::Closed);
        assert!(effects.contains(&Effect::CloseSocket));

        assert!(m.handle(PushEvent::BackoffElapsed).is_empty());
        assert!(m.handle(PushEvent::ConnectRequested).is_empty());
        assert_eq!(m.state(), ConnectionState::Closed);
    }

    #[test]
    fn state_display() {
        assert_eq!(ConnectionState::Open.to_string(), "Open");
        assert_eq!(
            ConnectionState::Reconnecting { attempt: 2 }.to_string(),
            "Reconnecting (attempt 2)"
        );
    }
}
