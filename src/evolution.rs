//! Evolution Event Generator
//!
//! Periodically and stochastically emits discrete evolution events:
//! each tick draws a Bernoulli trial, and on success constructs one
//! event with a uniformly chosen type, a pooled description, and a
//! uniform impact magnitude. Manual triggers bypass the loop entirely
//! and work even while the generator is stopped.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::rng::Randomness;
use crate::types::{
    EvolutionEvent, EvolutionHandler, EvolutionType, EVOLUTION_DESCRIPTIONS, EVOLUTION_TYPES,
};

/// Options for creating an evolution generator.
pub struct EvolutionGeneratorOptions {
    /// Tick interval in seconds. Defaults to 6.
    pub tick_interval_secs: u64,
    /// Per-tick emission probability. Defaults to 0.35.
    pub chance: f64,
    /// Impact range for autonomous events.
    pub impact_min: f64,
    pub impact_max: f64,
    /// Impact range for manual triggers.
    pub manual_impact_min: f64,
    pub manual_impact_max: f64,
    /// Bounded history capacity, oldest evicted. Defaults to 50.
    pub history_capacity: usize,
}

impl Default for EvolutionGeneratorOptions {
    fn default() -> Self {
        Self {
            tick_interval_secs: 6,
            chance: 0.35,
            impact_min: 5.0,
            impact_max: 25.0,
            manual_impact_min: 10.0,
            manual_impact_max: 25.0,
            history_capacity: 50,
        }
    }
}

/// Copy of the per-tick knobs handed to the spawned loop.
#[derive(Clone, Copy)]
struct Tuning {
    chance: f64,
    impact_min: f64,
    impact_max: f64,
}

/// The evolution generator. Owns its bounded event history exclusively
/// and emits each new event through the callback.
pub struct EvolutionEventGenerator {
    running: Arc<AtomicBool>,
    interval_handle: Option<JoinHandle<()>>,
    tick_interval_secs: u64,
    tuning: Tuning,
    manual_impact_min: f64,
    manual_impact_max: f64,
    history_capacity: usize,
    history: Arc<RwLock<VecDeque<EvolutionEvent>>>,
    rng: Arc<dyn Randomness>,
    on_evolution: EvolutionHandler,
}

impl EvolutionEventGenerator {
    pub fn new(
        options: EvolutionGeneratorOptions,
        rng: Arc<dyn Randomness>,
        on_evolution: EvolutionHandler,
    ) -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
            interval_handle: None,
            tick_interval_secs: options.tick_interval_secs,
            tuning: Tuning {
                chance: options.chance,
                impact_min: options.impact_min,
                impact_max: options.impact_max,
            },
            manual_impact_min: options.manual_impact_min,
            manual_impact_max: options.manual_impact_max,
            history_capacity: options.history_capacity,
            history: Arc::new(RwLock::new(VecDeque::new())),
            rng,
            on_evolution,
        }
    }

    /// Start the generator loop. No-op if already running.
    pub fn start(&mut self) {
        if self.running.load(Ordering::SeqCst) {
            warn!("Evolution generator is already running");
            return;
        }

        self.running.store(true, Ordering::SeqCst);
        info!(
            "Starting evolution generator with {}s tick interval",
            self.tick_interval_secs
        );

        let running = Arc::clone(&self.running);
        let history = Arc::clone(&self.history);
        let rng = Arc::clone(&self.rng);
        let on_evolution = Arc::clone(&self.on_evolution);
        let tuning = self.tuning;
        let capacity = self.history_capacity;
        let tick_secs = self.tick_interval_secs;

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(tick_secs));
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                interval.tick().await;

                if !running.load(Ordering::SeqCst) {
                    info!("Evolution generator stopping");
                    break;
                }

                tick(tuning, capacity, &history, rng.as_ref(), &on_evolution).await;
            }
        });

        self.interval_handle = Some(handle);
    }

    /// Stop the generator loop. Safe to call when not running.
    pub fn stop(&mut self) {
        if !self.running.load(Ordering::SeqCst) {
            debug!("Evolution generator is not running");
            return;
        }

        info!("Stopping evolution generator");
        self.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.interval_handle.take() {
            handle.abort();
        }
    }

    /// Returns whether the generator is currently running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Construct and emit one event right now, regardless of loop state.
    /// Manual events are never marked autonomous and draw their impact
    /// from the manual range.
    pub async fn trigger_manual(&self, event_type: EvolutionType, description: &str) {
        let impact = self.rng.range(self.manual_impact_min, self.manual_impact_max);
        let event = EvolutionEvent::new(event_type, description, impact, false);

        info!(
            "Manual evolution triggered: {} (impact {:.1})",
            description, event.impact
        );

        record(&self.history, self.history_capacity, &event).await;
        (self.on_evolution)(event);
    }
}

/// Perform one generator tick: a Bernoulli trial, and on success one
/// emitted event. On failure neither an event nor a callback invocation.
async fn tick(
    tuning: Tuning,
    capacity: usize,
    history: &RwLock<VecDeque<EvolutionEvent>>,
    rng: &dyn Randomness,
    on_evolution: &EvolutionHandler,
) {
    if !rng.chance(tuning.chance) {
        return;
    }

    let event_type = EVOLUTION_TYPES[rng.pick(EVOLUTION_TYPES.len())];
    let description = EVOLUTION_DESCRIPTIONS[rng.pick(EVOLUTION_DESCRIPTIONS.len())];
    let impact = rng.range(tuning.impact_min, tuning.impact_max);
    let event = EvolutionEvent::new(event_type, description, impact, true);

    debug!(
        "Evolution event generated: {:?} {} (impact {:.1})",
        event.event_type, event.description, event.impact
    );

    record(history, capacity, &event).await;
    on_evolution(event);
}

/// Prepend an event to the bounded history, evicting the oldest entry
/// once the capacity is reached.
async fn record(history: &RwLock<VecDeque<EvolutionEvent>>, capacity: usize, event: &EvolutionEvent) {
    let mut entries = history.write().await;
    entries.push_front(event.clone());
    entries.truncate(capacity);
}
