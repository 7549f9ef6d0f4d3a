//! `musicgate simulate`: replay a scripted signal timeline against the coordinator
//!
//! Runs entirely on a [`ManualClock`], so the printed timeline is exact.

use crate::clock::{Clock, ManualClock};
use crate::coordinator::{Effect, GateCoordinator, StartOutcome};
use crate::models::{DecisionRecord, GateConfig, Signal};
use crate::store::{load_record, save_record, KeyValueStore, MemoryStore, RecordKeys};
use crate::{Context, Result};
use chrono::Utc;
use colored::Colorize;
use std::str::FromStr;

/// Largest time, in units, a script may refer to
pub const MAX_SIMULATED_UNITS: f64 = 86_400.0;

/// Parse a time in units for `--until`, rejecting values outside the simulated range
pub fn parse_units(s: &str) -> std::result::Result<f64, String> {
    let units: f64 = s
        .trim()
        .parse()
        .map_err(|_| format!("Invalid time '{}'", s))?;
    check_units(units).map_err(|e| e.to_string())?;
    Ok(units)
}

fn check_units(units: f64) -> Result<()> {
    if !units.is_finite() || !(0.0..=MAX_SIMULATED_UNITS).contains(&units) {
        anyhow::bail!(
            "Time must be between 0 and {} units, got {}",
            MAX_SIMULATED_UNITS,
            units
        );
    }
    Ok(())
}

/// One scripted signal, `<units>:<kind>[=<attribute>]` on the command line
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptedSignal {
    pub at_units: f64,
    pub signal: Signal,
}

impl FromStr for ScriptedSignal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (at, kind) = s
            .split_once(':')
            .ok_or_else(|| anyhow::anyhow!("Expected <units>:<kind>, got '{}'", s))?;

        let at_units: f64 = at
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid time '{}' in '{}'", at, s))?;
        check_units(at_units).with_context(|| format!("Invalid signal '{}'", s))?;

        let (kind, attribute) = match kind.split_once('=') {
            Some((kind, attribute)) => (kind, Some(attribute.to_string())),
            None => (kind, None),
        };
        let signal = Signal::from_wire(kind.trim(), attribute)
            .ok_or_else(|| anyhow::anyhow!("Unknown signal kind '{}'", kind))?;

        Ok(Self { at_units, signal })
    }
}

/// Inputs for one simulated page load
#[derive(Debug, Clone, Default)]
pub struct SimulationPlan {
    pub signals: Vec<ScriptedSignal>,
    /// Age of a prior decision record, if any
    pub prior_age_minutes: Option<u64>,
    /// Stop after this many units even if nothing happened
    pub until_units: f64,
}

/// What happened, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimelineEvent {
    Skipped,
    Armed,
    Signal(Signal),
    Effect(Effect),
}

/// Timeline entry, time relative to load in milliseconds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineEntry {
    pub offset_ms: i64,
    pub event: TimelineEvent,
}

/// Result of a simulation run
#[derive(Debug, Clone)]
pub struct SimulationReport {
    pub timeline: Vec<TimelineEntry>,
    pub stored: Option<DecisionRecord>,
}

/// Epoch millis of `units` after `anchor_millis`
fn offset_millis(anchor_millis: i64, units: f64, unit_ms: u64) -> Result<i64> {
    check_units(units)?;
    let offset = (units * unit_ms as f64).round();
    if offset >= i64::MAX as f64 {
        anyhow::bail!("{} units of {}ms is out of range", units, unit_ms);
    }
    anchor_millis
        .checked_add(offset as i64)
        .ok_or_else(|| anyhow::anyhow!("{} units of {}ms is out of range", units, unit_ms))
}

/// Replay `plan` against a fresh coordinator
pub fn simulate(
    config: &GateConfig,
    plan: &SimulationPlan,
    anchor_millis: i64,
) -> Result<SimulationReport> {
    let to_millis = |units: f64| offset_millis(anchor_millis, units, config.timing.unit_ms);

    let clock = ManualClock::new(anchor_millis);
    let store = MemoryStore::new();
    let keys: RecordKeys = config.storage.clone().into();

    if let Some(age) = plan.prior_age_minutes {
        let prior_at = i64::try_from(age)
            .ok()
            .and_then(|minutes| minutes.checked_mul(60_000))
            .and_then(|age_ms| anchor_millis.checked_sub(age_ms))
            .ok_or_else(|| anyhow::anyhow!("Prior record age of {} minutes is out of range", age))?;
        let prior = DecisionRecord::started_at(prior_at);
        if let Err(e) = save_record(&store, &keys, &prior) {
            tracing::warn!(error = %e, "failed to seed prior record");
        }
    }

    let mut coordinator = GateCoordinator::new(
        config.timing.timings(),
        config.detection.watched_attribute.clone(),
        config.destination.clone(),
    );
    let mut timeline = Vec::new();

    let prior = load_record(&store, &keys, clock.now_millis());
    match coordinator.start(prior, clock.now_millis()) {
        StartOutcome::Skip { destination } => {
            push(&mut timeline, 0, TimelineEvent::Skipped);
            push(&mut timeline, 0, TimelineEvent::Effect(Effect::Navigate(destination)));
            return Ok(SimulationReport {
                timeline,
                stored: load_record(&store, &keys, clock.now_millis()),
            });
        }
        StartOutcome::Armed => push(&mut timeline, 0, TimelineEvent::Armed),
    }

    let mut signals = plan.signals.clone();
    signals.sort_by(|a, b| a.at_units.total_cmp(&b.at_units));

    for scripted in &signals {
        let at = to_millis(scripted.at_units)?;
        for (deadline, effect) in fire_until(&mut coordinator, &clock, at) {
            persist(&store, &keys, &effect);
            push(&mut timeline, deadline - anchor_millis, TimelineEvent::Effect(effect));
        }
        if coordinator.is_finished() {
            break;
        }

        clock.set(at);
        let offset = at - anchor_millis;
        push(&mut timeline, offset, TimelineEvent::Signal(scripted.signal.clone()));
        for effect in coordinator.handle_signal(scripted.signal.clone(), at) {
            persist(&store, &keys, &effect);
            push(&mut timeline, offset, TimelineEvent::Effect(effect));
        }
    }

    let limit = to_millis(plan.until_units)?.max(clock.now_millis());
    for (deadline, effect) in fire_until(&mut coordinator, &clock, limit) {
        persist(&store, &keys, &effect);
        push(&mut timeline, deadline - anchor_millis, TimelineEvent::Effect(effect));
    }

    Ok(SimulationReport {
        timeline,
        stored: load_record(&store, &keys, clock.now_millis()),
    })
}

fn push(timeline: &mut Vec<TimelineEntry>, offset_ms: i64, event: TimelineEvent) {
    timeline.push(TimelineEntry { offset_ms, event });
}

/// Step the clock through every deadline up to `limit`, stopping once navigated
fn fire_until(
    coordinator: &mut GateCoordinator,
    clock: &ManualClock,
    limit: i64,
) -> Vec<(i64, Effect)> {
    let mut fired = Vec::new();
    while let Some(deadline) = coordinator.next_deadline() {
        if deadline > limit || coordinator.is_finished() {
            break;
        }
        clock.set(deadline);
        fired.extend(coordinator.advance(deadline).into_iter().map(|e| (deadline, e)));
    }
    fired
}

fn persist(store: &dyn KeyValueStore, keys: &RecordKeys, effect: &Effect) {
    if let Effect::PersistDecision(record) = effect {
        if let Err(e) = save_record(store, keys, record) {
            tracing::warn!(error = %e, "failed to persist decision record");
        }
    }
}

/// Entry point for the CLI
pub async fn run(config: &GateConfig, plan: SimulationPlan, json: bool) -> Result<()> {
    let anchor = Utc::now().timestamp_millis();
    let report = simulate(config, &plan, anchor)?;

    if json {
        let entries: Vec<_> = report
            .timeline
            .iter()
            .map(|entry| {
                serde_json::json!({
                    "offset_ms": entry.offset_ms,
                    "event": describe(&entry.event),
                })
            })
            .collect();
        let output = serde_json::json!({
            "timeline": entries,
            "stored": report.stored,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("{}", "Simulated gate timeline".cyan().bold());
    println!();

    for entry in &report.timeline {
        let offset = format!("t+{:>7.3}s", entry.offset_ms as f64 / 1000.0);
        let line = describe(&entry.event);
        let line = match &entry.event {
            TimelineEvent::Signal(_) => line.yellow(),
            TimelineEvent::Effect(Effect::Navigate(_)) | TimelineEvent::Skipped => line.green(),
            TimelineEvent::Effect(Effect::ShowTransition) => line.green(),
            _ => line.normal(),
        };
        println!("   {}  {}", offset.bright_black(), line);
    }

    println!();
    match report.stored {
        Some(record) if record.started => println!(
            "{}",
            format!("✓ Decision stored at t+{}ms", record.timestamp_millis - anchor).green()
        ),
        _ => println!("{}", "⚠ Gate never transitioned".yellow()),
    }

    Ok(())
}

fn describe(event: &TimelineEvent) -> String {
    match event {
        TimelineEvent::Skipped => "skip: recent decision found".to_string(),
        TimelineEvent::Armed => "armed".to_string(),
        TimelineEvent::Signal(signal) => format!("signal {}", signal),
        TimelineEvent::Effect(Effect::RevealLoading) => "reveal loading indicator".to_string(),
        TimelineEvent::Effect(Effect::RevealOverride) => "reveal manual continue".to_string(),
        TimelineEvent::Effect(Effect::PersistDecision(_)) => "persist decision".to_string(),
        TimelineEvent::Effect(Effect::ShowTransition) => "show transition".to_string(),
        TimelineEvent::Effect(Effect::Navigate(destination)) => {
            format!("navigate to {}", destination)
        }
    }
}
