//! Gate session driver
//!
//! Owns one [`GateCoordinator`] for a single page load and runs it on tokio:
//! - loads the prior decision record and starts the coordinator
//! - attaches signal sources once armed
//! - sleeps until the next timer or signal, then applies the coordinator's effects
//!
//! The coordinator is only touched from the task running [`GateSession::run`],
//! so the transition guard needs no lock.

mod sources;

pub use sources::{
    Capability, SignalSink, SignalSource, SourceError, SourceRoutes, UnavailableSource,
};

use crate::clock::Clock;
use crate::coordinator::{Effect, GateCoordinator, StartOutcome};
use crate::models::{DecisionRecord, GateConfig, Signal};
use crate::store::{load_record, save_record, KeyValueStore, RecordKeys};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Receiver of the coordinator's visual and navigation effects
pub trait GateHost: Send {
    /// Make the loading affordance visible
    fn reveal_loading(&mut self);

    /// Make the manual-override control visible
    fn reveal_override(&mut self);

    /// Play the terminal transition effect
    fn show_transition(&mut self);

    /// Hand off to the main destination
    fn navigate(&mut self, destination: &str);
}

/// How a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// A fresh decision record skipped the gate
    Skipped,
    /// The gate transitioned at the given epoch millis and navigated
    Transitioned { at: i64 },
    /// Every source went away and no timers remain
    Abandoned,
}

/// One gate session: coordinator, clock, store, host and sources
pub struct GateSession<C: Clock, H: GateHost> {
    coordinator: GateCoordinator,
    clock: C,
    store: Arc<dyn KeyValueStore>,
    keys: RecordKeys,
    host: H,
    sources: Vec<Box<dyn SignalSource>>,
}

impl<C: Clock, H: GateHost> GateSession<C, H> {
    pub fn new(config: &GateConfig, clock: C, store: Arc<dyn KeyValueStore>, host: H) -> Self {
        let coordinator = GateCoordinator::new(
            config.timing.timings(),
            config.detection.watched_attribute.clone(),
            config.destination.clone(),
        );

        Self {
            coordinator,
            clock,
            store,
            keys: config.storage.clone().into(),
            host,
            sources: Vec::new(),
        }
    }

    /// Add a signal source, attached when the gate arms
    pub fn with_source(mut self, source: Box<dyn SignalSource>) -> Self {
        self.sources.push(source);
        self
    }

    /// Add several signal sources
    pub fn with_sources(
        mut self,
        sources: impl IntoIterator<Item = Box<dyn SignalSource>>,
    ) -> Self {
        self.sources.extend(sources);
        self
    }

    /// Check the prior record and arm the gate.
    ///
    /// On a fresh record the host is told to navigate right away and nothing
    /// is attached. Otherwise the sources are attached and the returned
    /// [`ArmedSession`] must be run to drive the timers.
    pub fn start(mut self) -> Started<C, H> {
        let now = self.clock.now_millis();
        let prior = load_record(self.store.as_ref(), &self.keys, now);

        if let StartOutcome::Skip { destination } = self.coordinator.start(prior, now) {
            self.host.navigate(&destination);
            return Started::Skipped { destination };
        }

        let (tx, rx) = mpsc::unbounded_channel();
        self.attach_sources(&tx);

        Started::Armed(ArmedSession { session: self, rx })
    }

    /// Start and run the session to completion.
    ///
    /// The prior record is read on the blocking pool.
    pub async fn run(self) -> SessionOutcome
    where
        C: 'static,
        H: 'static,
    {
        let started = match tokio::task::spawn_blocking(move || self.start()).await {
            Ok(started) => started,
            Err(e) => {
                tracing::warn!(error = %e, "gate session failed to start");
                return SessionOutcome::Abandoned;
            }
        };

        match started {
            Started::Skipped { .. } => SessionOutcome::Skipped,
            Started::Armed(armed) => armed.run().await,
        }
    }

    fn attach_sources(&mut self, tx: &mpsc::UnboundedSender<Signal>) {
        for source in self.sources.drain(..) {
            let capability = source.capability();
            match source.attach(SignalSink::new(tx.clone())) {
                Ok(()) => tracing::debug!(%capability, "signal source attached"),
                Err(SourceError::Unavailable(_)) => {
                    tracing::debug!(%capability, "signal source unavailable, continuing without it")
                }
            }
        }
    }

    async fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::RevealLoading => self.host.reveal_loading(),
                Effect::RevealOverride => self.host.reveal_override(),
                Effect::PersistDecision(record) => {
                    persist(Arc::clone(&self.store), self.keys.clone(), record).await
                }
                Effect::ShowTransition => self.host.show_transition(),
                Effect::Navigate(destination) => self.host.navigate(&destination),
            }
        }
    }
}

/// Write the record on the blocking pool. Failures are logged and the
/// transition carries on.
async fn persist(store: Arc<dyn KeyValueStore>, keys: RecordKeys, record: DecisionRecord) {
    let saved =
        tokio::task::spawn_blocking(move || save_record(store.as_ref(), &keys, &record)).await;

    match saved {
        Ok(Ok(())) => tracing::debug!(?record, "decision record persisted"),
        Ok(Err(e)) => tracing::warn!(error = %e, "failed to persist decision record"),
        Err(e) => tracing::warn!(error = %e, "decision record write task failed"),
    }
}

/// Result of [`GateSession::start`]
pub enum Started<C: Clock, H: GateHost> {
    /// The gate was skipped; the host has already been told to navigate
    Skipped { destination: String },
    /// Sources are attached; run the session to drive it
    Armed(ArmedSession<C, H>),
}

/// A started session with its signal channel
pub struct ArmedSession<C: Clock, H: GateHost> {
    session: GateSession<C, H>,
    rx: mpsc::UnboundedReceiver<Signal>,
}

impl<C: Clock, H: GateHost> ArmedSession<C, H> {
    /// Drive timers and signals until navigation or abandonment
    pub async fn run(self) -> SessionOutcome {
        let ArmedSession {
            session: mut this,
            mut rx,
        } = self;
        let mut listening = true;

        loop {
            if this.coordinator.is_finished() {
                let at = this
                    .coordinator
                    .transitioned_at()
                    .unwrap_or_else(|| this.clock.now_millis());
                return SessionOutcome::Transitioned { at };
            }

            let deadline = this.coordinator.next_deadline();
            if deadline.is_none() && !listening {
                tracing::debug!("all signal sources closed, session abandoned");
                return SessionOutcome::Abandoned;
            }

            let wait = deadline.map(|d| {
                let remaining = d.saturating_sub(this.clock.now_millis()).max(0);
                Duration::from_millis(remaining as u64)
            });

            let effects = tokio::select! {
                signal = rx.recv(), if listening => match signal {
                    Some(signal) => {
                        let now = this.clock.now_millis();
                        this.coordinator.handle_signal(signal, now)
                    }
                    None => {
                        listening = false;
                        Vec::new()
                    }
                },
                _ = sleep_or_forever(wait) => this.coordinator.advance(this.clock.now_millis()),
            };
            this.apply(effects).await;
        }
    }
}

async fn sleep_or_forever(wait: Option<Duration>) {
    match wait {
        Some(duration) => tokio::time::sleep(duration).await,
        None => std::future::pending().await,
    }
}
