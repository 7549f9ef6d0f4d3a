//! Gate Coordinator
//!
//! Sans-IO state machine deciding when the user is treated as having started
//! playback. Callers feed it signals and the current time; it answers with
//! [`Effect`]s to apply. All timers live in an internal [`Schedule`] and fire
//! from [`GateCoordinator::advance`].
//!
//! ```text
//! Idle ──start──▶ Armed ──signal──▶ PendingConfirmation ──delay──▶ Transitioned
//!   │               │                   ▲        │                      ▲
//!   │               │                   └─signal─┘                      │
//!   │               └──────────────── manual override ──────────────────┘
//!   └──fresh record──▶ Skipped
//! ```

mod schedule;

pub use schedule::{Schedule, TimerHandle, TimerKind};

use crate::models::{DecisionRecord, FocusChange, GateTimings, Signal};
use std::time::Duration;

/// Coordinator lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    /// Constructed, prior record not yet checked
    Idle,
    /// Listening for signals
    Armed,
    /// A confirmation delay is running
    PendingConfirmation,
    /// Terminal: decision written, navigation scheduled
    Transitioned,
    /// Terminal: a fresh record let the gate be skipped
    Skipped,
}

/// Side effect requested by the coordinator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Show the loading affordance
    RevealLoading,
    /// Show the manual-override control
    RevealOverride,
    /// Write the decision record
    PersistDecision(DecisionRecord),
    /// Play the terminal transition effect
    ShowTransition,
    /// Hand off to the main destination
    Navigate(String),
}

/// Result of checking the prior decision record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// Record is fresh: navigate immediately, nothing armed
    Skip { destination: String },
    /// Listeners should be attached; reveal timers are scheduled
    Armed,
}

/// Interaction-driven state/timer coordinator for one gate session
#[derive(Debug)]
pub struct GateCoordinator {
    timings: GateTimings,
    watched_attribute: String,
    destination: String,
    state: GateState,
    has_transitioned: bool,
    pending_confirmation: Option<TimerHandle>,
    schedule: Schedule,
    loaded_at: Option<i64>,
    transitioned_at: Option<i64>,
    loading_visible: bool,
    override_visible: bool,
    navigated: bool,
}

fn millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

impl GateCoordinator {
    pub fn new(
        timings: GateTimings,
        watched_attribute: impl Into<String>,
        destination: impl Into<String>,
    ) -> Self {
        Self {
            timings,
            watched_attribute: watched_attribute.into(),
            destination: destination.into(),
            state: GateState::Idle,
            has_transitioned: false,
            pending_confirmation: None,
            schedule: Schedule::new(),
            loaded_at: None,
            transitioned_at: None,
            loading_visible: false,
            override_visible: false,
            navigated: false,
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn state(&self) -> GateState {
        self.state
    }

    pub fn has_transitioned(&self) -> bool {
        self.has_transitioned
    }

    pub fn loading_visible(&self) -> bool {
        self.loading_visible
    }

    pub fn override_visible(&self) -> bool {
        self.override_visible
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Time the session was armed
    pub fn loaded_at(&self) -> Option<i64> {
        self.loaded_at
    }

    /// Time the terminal transition happened
    pub fn transitioned_at(&self) -> Option<i64> {
        self.transitioned_at
    }

    /// Earliest pending timer deadline
    pub fn next_deadline(&self) -> Option<i64> {
        self.schedule.next_deadline()
    }

    /// True once navigation has been handed off (or the gate was skipped)
    pub fn is_finished(&self) -> bool {
        self.navigated || self.state == GateState::Skipped
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Check the prior record and either skip the gate or arm it.
    ///
    /// Calling `start` again after the first call changes nothing.
    pub fn start(&mut self, prior: Option<DecisionRecord>, now: i64) -> StartOutcome {
        match self.state {
            GateState::Idle => {}
            GateState::Skipped => {
                return StartOutcome::Skip {
                    destination: self.destination.clone(),
                }
            }
            _ => return StartOutcome::Armed,
        }

        if let Some(record) = prior {
            if record.is_fresh(now, self.timings.record_ttl) {
                tracing::info!(
                    age_secs = record.age(now).as_secs(),
                    "gate passed recently, skipping"
                );
                self.state = GateState::Skipped;
                self.navigated = true;
                return StartOutcome::Skip {
                    destination: self.destination.clone(),
                };
            }
            tracing::debug!(?record, "prior decision expired");
        }

        self.loaded_at = Some(now);
        let loading_at = now.saturating_add(millis(self.timings.loading_reveal));
        let override_at = now.saturating_add(millis(self.timings.override_reveal));
        self.schedule.schedule(loading_at, TimerKind::RevealLoading);
        self.schedule.schedule(override_at, TimerKind::RevealOverride);
        self.state = GateState::Armed;

        tracing::info!("gate armed");
        StartOutcome::Armed
    }

    /// Feed a signal observed at `now`. Due timers fire first.
    pub fn handle_signal(&mut self, signal: Signal, now: i64) -> Vec<Effect> {
        let mut effects = self.advance(now);

        match self.state {
            GateState::Armed | GateState::PendingConfirmation => {}
            state => {
                tracing::debug!(%signal, ?state, "signal ignored");
                return effects;
            }
        }

        match &signal {
            Signal::ManualOverride => {
                tracing::info!("manual override");
                effects.extend(self.transition(now));
            }
            Signal::Pointer(_) | Signal::Focus(FocusChange::Gained) => {
                self.restart_confirmation(&signal, now);
            }
            Signal::AttributeMutation { attribute } if *attribute == self.watched_attribute => {
                self.restart_confirmation(&signal, now);
            }
            Signal::Focus(FocusChange::Lost) => {
                tracing::debug!("window blurred, user may be interacting with the player");
            }
            Signal::AttributeMutation { attribute } => {
                tracing::trace!(attribute = %attribute, "unwatched attribute changed");
            }
        }

        effects
    }

    /// Skip the confirmation delay and transition immediately
    pub fn manual_override(&mut self, now: i64) -> Vec<Effect> {
        self.handle_signal(Signal::ManualOverride, now)
    }

    /// Fire every timer due at or before `now`, in deadline order
    pub fn advance(&mut self, now: i64) -> Vec<Effect> {
        let mut effects = Vec::new();

        while let Some((deadline, handle, kind)) = self.schedule.pop_due(now) {
            match kind {
                TimerKind::RevealLoading => {
                    if !self.loading_visible {
                        self.loading_visible = true;
                        effects.push(Effect::RevealLoading);
                    }
                }
                TimerKind::RevealOverride => {
                    if !self.override_visible {
                        self.override_visible = true;
                        effects.push(Effect::RevealOverride);
                    }
                }
                TimerKind::Confirm => {
                    if self.pending_confirmation != Some(handle) {
                        continue;
                    }
                    self.pending_confirmation = None;
                    tracing::info!("no further signals, assuming playback started");
                    effects.extend(self.transition(deadline));
                }
                TimerKind::Navigate => {
                    if !self.navigated {
                        self.navigated = true;
                        tracing::info!(destination = %self.destination, "navigating");
                        effects.push(Effect::Navigate(self.destination.clone()));
                    }
                }
            }
        }

        effects
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn restart_confirmation(&mut self, signal: &Signal, now: i64) {
        if let Some(previous) = self.pending_confirmation.take() {
            self.schedule.cancel(previous);
        }

        let deadline = now.saturating_add(millis(self.timings.confirmation));
        self.pending_confirmation = Some(self.schedule.schedule(deadline, TimerKind::Confirm));
        self.state = GateState::PendingConfirmation;

        tracing::debug!(%signal, deadline, "confirmation delay (re)started");
    }

    /// Terminal transition. Runs at most once per coordinator.
    fn transition(&mut self, at: i64) -> Vec<Effect> {
        if self.has_transitioned {
            return Vec::new();
        }

        self.has_transitioned = true;
        self.state = GateState::Transitioned;
        self.transitioned_at = Some(at);

        if let Some(pending) = self.pending_confirmation.take() {
            self.schedule.cancel(pending);
        }
        self.schedule
            .schedule(at.saturating_add(millis(self.timings.navigate_delay)), TimerKind::Navigate);

        tracing::info!("proceeding to main destination");
        vec![
            Effect::PersistDecision(DecisionRecord::started_at(at)),
            Effect::ShowTransition,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PointerKind;

    const T0: i64 = 1_700_000_000_000;
    const UNIT: i64 = 1000;

    fn coordinator() -> GateCoordinator {
        GateCoordinator::new(GateTimings::default(), "src", "main.html")
    }

    fn armed() -> GateCoordinator {
        let mut gate = coordinator();
        assert_eq!(gate.start(None, T0), StartOutcome::Armed);
        gate
    }

    fn at(units: i64) -> i64 {
        T0 + units * UNIT
    }

    fn click() -> Signal {
        Signal::Pointer(PointerKind::Click)
    }

    #[test]
    fn test_start_without_record_arms() {
        let gate = armed();
        assert_eq!(gate.state(), GateState::Armed);
        assert_eq!(gate.next_deadline(), Some(at(2)));
        assert_eq!(gate.loaded_at(), Some(T0));
    }

    #[test]
    fn test_start_with_fresh_record_skips() {
        let mut gate = coordinator();
        let record = DecisionRecord::started_at(T0 - 30 * 60 * 1000);

        let outcome = gate.start(Some(record), T0);

        assert_eq!(
            outcome,
            StartOutcome::Skip {
                destination: "main.html".to_string()
            }
        );
        assert_eq!(gate.state(), GateState::Skipped);
        assert!(gate.is_finished());
        assert_eq!(gate.next_deadline(), None);
    }

    #[test]
    fn test_start_with_expired_record_arms() {
        let mut gate = coordinator();
        let record = DecisionRecord::started_at(T0 - 90 * 60 * 1000);
        assert_eq!(gate.start(Some(record), T0), StartOutcome::Armed);
    }

    #[test]
    fn test_start_twice_is_noop() {
        let mut gate = armed();
        gate.handle_signal(click(), at(1));
        assert_eq!(gate.start(None, at(2)), StartOutcome::Armed);
        assert_eq!(gate.state(), GateState::PendingConfirmation);
    }

    #[test]
    fn test_signals_before_start_ignored() {
        let mut gate = coordinator();
        assert!(gate.handle_signal(click(), T0).is_empty());
        assert_eq!(gate.state(), GateState::Idle);
        assert_eq!(gate.next_deadline(), None);
    }

    #[test]
    fn test_reveals_without_signals() {
        let mut gate = armed();

        assert!(gate.advance(at(1)).is_empty());
        assert_eq!(gate.advance(at(2)), vec![Effect::RevealLoading]);
        assert!(gate.loading_visible());
        assert!(!gate.override_visible());

        assert!(gate.advance(at(9)).is_empty());
        assert_eq!(gate.advance(at(10)), vec![Effect::RevealOverride]);
        assert!(gate.override_visible());

        assert!(gate.advance(at(1000)).is_empty());
        assert!(!gate.has_transitioned());
    }

    #[test]
    fn test_single_signal_transitions_after_delay() {
        let mut gate = armed();
        gate.handle_signal(click(), at(1));
        assert_eq!(gate.state(), GateState::PendingConfirmation);

        let effects = gate.advance(at(4) - 1);
        assert!(!effects.contains(&Effect::ShowTransition));

        let effects = gate.advance(at(4));
        assert_eq!(
            effects,
            vec![
                Effect::PersistDecision(DecisionRecord::started_at(at(4))),
                Effect::ShowTransition,
            ]
        );
        assert_eq!(gate.transitioned_at(), Some(at(4)));
    }

    #[test]
    fn test_retrigger_restarts_delay() {
        let mut gate = armed();
        gate.handle_signal(click(), at(1));
        gate.handle_signal(Signal::Focus(FocusChange::Gained), at(2));

        gate.advance(at(4));
        assert!(!gate.has_transitioned());

        gate.advance(at(5));
        assert!(gate.has_transitioned());
        assert_eq!(gate.transitioned_at(), Some(at(5)));
    }

    #[test]
    fn test_navigate_after_post_effect_delay() {
        let mut gate = armed();
        gate.handle_signal(click(), at(0));
        gate.advance(at(3));

        assert!(!gate.advance(at(5) - 1).iter().any(|e| matches!(e, Effect::Navigate(_))));
        assert_eq!(
            gate.advance(at(5)),
            vec![Effect::Navigate("main.html".to_string())]
        );
        assert!(gate.is_finished());
    }

    #[test]
    fn test_manual_override_is_immediate() {
        let mut gate = armed();
        gate.handle_signal(click(), at(1));

        let effects = gate.manual_override(at(2));

        assert!(effects.contains(&Effect::ShowTransition));
        assert_eq!(gate.transitioned_at(), Some(at(2)));
        assert_eq!(gate.state(), GateState::Transitioned);
    }

    #[test]
    fn test_manual_override_after_transition_is_noop() {
        let mut gate = armed();
        gate.handle_signal(click(), at(0));
        gate.advance(at(3));

        assert!(gate.manual_override(at(3)).is_empty());
        assert_eq!(gate.transitioned_at(), Some(at(3)));
    }

    #[test]
    fn test_blur_and_unwatched_attribute_do_not_trigger() {
        let mut gate = armed();
        gate.handle_signal(Signal::Focus(FocusChange::Lost), at(1));
        gate.handle_signal(
            Signal::AttributeMutation {
                attribute: "class".to_string(),
            },
            at(1),
        );

        assert_eq!(gate.state(), GateState::Armed);
        gate.advance(at(100));
        assert!(!gate.has_transitioned());
    }

    #[test]
    fn test_watched_attribute_triggers() {
        let mut gate = armed();
        gate.handle_signal(
            Signal::AttributeMutation {
                attribute: "src".to_string(),
            },
            at(1),
        );
        gate.advance(at(4));
        assert!(gate.has_transitioned());
    }

    #[test]
    fn test_simultaneous_signals_collapse() {
        let mut gate = armed();
        gate.handle_signal(click(), at(1));
        gate.handle_signal(Signal::Focus(FocusChange::Gained), at(1));
        gate.handle_signal(Signal::Pointer(PointerKind::TouchStart), at(1));

        let effects = gate.advance(at(10));
        let persisted = effects
            .iter()
            .filter(|e| matches!(e, Effect::PersistDecision(_)))
            .count();
        assert_eq!(persisted, 1);
    }

    #[test]
    fn test_signal_at_deadline_fires_pending_first() {
        let mut gate = armed();
        gate.handle_signal(click(), at(1));

        let effects = gate.handle_signal(click(), at(4));

        assert!(effects.contains(&Effect::ShowTransition));
        assert_eq!(gate.transitioned_at(), Some(at(4)));
    }

    #[test]
    fn test_late_advance_fires_everything_once() {
        let mut gate = armed();
        gate.handle_signal(click(), at(1));

        let effects = gate.advance(at(60));

        assert_eq!(
            effects,
            vec![
                Effect::RevealLoading,
                Effect::PersistDecision(DecisionRecord::started_at(at(4))),
                Effect::ShowTransition,
                Effect::Navigate("main.html".to_string()),
                Effect::RevealOverride,
            ]
        );
        assert!(gate.advance(at(120)).is_empty());
    }

    #[test]
    fn test_huge_timings_saturate_deadlines() {
        let timings = crate::models::TimingConfig {
            unit_ms: u64::MAX,
            ..Default::default()
        }
        .timings();
        let mut gate = GateCoordinator::new(timings, "src", "main.html");
        gate.start(None, T0);

        gate.handle_signal(click(), at(1));
        assert_eq!(gate.next_deadline(), Some(i64::MAX));

        let effects = gate.manual_override(at(2));
        assert!(effects.contains(&Effect::ShowTransition));

        let effects = gate.advance(i64::MAX);
        assert!(effects.contains(&Effect::Navigate("main.html".to_string())));
        assert!(gate.is_finished());
    }
}
