//! Unified Infinity Coordinator
//!
//! Owns the aggregate state and the three drivers (capability growth,
//! evolution generation, upgrade loop). Drivers report through their
//! callbacks; the fold handlers installed here are the only place
//! driver output is merged into the aggregate, and every fold writes a
//! best-effort snapshot to the store.
//!
//! Drivers run as tokio tasks, so the aggregate sits behind a mutex.
//! Critical sections are short and the lock is never held across an
//! await point.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use tracing::{info, warn};

use crate::config::CoreConfig;
use crate::evolution::{EvolutionEventGenerator, EvolutionGeneratorOptions};
use crate::growth::{CapabilityGrowthDriver, GrowthDriverOptions};
use crate::rng::Randomness;
use crate::state::SnapshotStore;
use crate::types::{
    sanitize_magnitude, CapabilityUpdateHandler, EvolutionHandler, EvolutionType,
    InfinitySnapshot, InfinityState, ProgressHandler, UnifiedStats, UpgradeHandler,
    AGGREGATE_CEILING, EVOLUTION_RATE_WINDOW_SECS, RECENT_EVOLUTION_CAPACITY,
    RECENT_UPGRADE_CAPACITY, UPGRADE_MILESTONE_INTERVAL,
};
use crate::upgrade::{UpgradeLoop, UpgradeLoopOptions};

/// Ceiling for the derived processing-power metric.
const PROCESSING_POWER_CEILING: f64 = 999.0;

/// Ceiling for the derived knowledge-capacity metric.
const KNOWLEDGE_CAPACITY_CEILING: f64 = 100.0;

/// The unified coordinator. Single owner of the aggregate state; the
/// presentation layer only ever talks to this.
pub struct UnifiedCoordinator {
    state: Arc<Mutex<InfinityState>>,
    store: Arc<SnapshotStore>,
    growth: CapabilityGrowthDriver,
    evolution: EvolutionEventGenerator,
    upgrades: UpgradeLoop,
}

impl UnifiedCoordinator {
    /// Build the coordinator and wire the three drivers to the fold
    /// handlers. If the store holds a snapshot from an earlier session,
    /// the scalar aggregate fields are restored from it.
    pub fn new(config: &CoreConfig, rng: Arc<dyn Randomness>, store: Arc<SnapshotStore>) -> Self {
        let mut initial = InfinityState::default();
        match store.load_snapshot() {
            Ok(Some(snapshot)) => {
                info!(
                    "Restoring session snapshot from {} (cycle {})",
                    snapshot.timestamp, snapshot.cycle_count
                );
                initial.infinity_level = snapshot.infinity_level;
                initial.system_supremacy = snapshot.system_supremacy;
                initial.total_evolutions = snapshot.total_evolutions;
                initial.total_upgrades = snapshot.total_upgrades;
                initial.cycle_count = snapshot.cycle_count;
                initial.loop_progress = snapshot.loop_progress;
                initial.emergency_mode = snapshot.emergency_mode;
            }
            Ok(None) => {}
            Err(e) => warn!("Ignoring unreadable session snapshot: {:#}", e),
        }

        let state = Arc::new(Mutex::new(initial));

        let on_update: CapabilityUpdateHandler = {
            let state = Arc::clone(&state);
            let store = Arc::clone(&store);
            Arc::new(move |capabilities| {
                let mut state = state.lock().unwrap_or_else(|e| e.into_inner());
                // Full replace, not a diff.
                state.capabilities = capabilities;
                persist(&store, &state);
            })
        };

        let on_evolution: EvolutionHandler = {
            let state = Arc::clone(&state);
            let store = Arc::clone(&store);
            Arc::new(move |event| {
                let mut state = state.lock().unwrap_or_else(|e| e.into_inner());
                let impact = sanitize_magnitude(event.impact);
                state.total_evolutions += 1;
                state.infinity_level =
                    (state.infinity_level + impact * 0.1).min(AGGREGATE_CEILING);
                state.system_supremacy =
                    (state.system_supremacy + impact * 0.05).min(AGGREGATE_CEILING);
                state.recent_evolutions.push_front(event);
                state.recent_evolutions.truncate(RECENT_EVOLUTION_CAPACITY);
                persist(&store, &state);
            })
        };

        let on_new_upgrade: UpgradeHandler = {
            let state = Arc::clone(&state);
            let store = Arc::clone(&store);
            Arc::new(move |record| {
                let mut state = state.lock().unwrap_or_else(|e| e.into_inner());
                state.total_upgrades += 1;
                state.recent_upgrades.push_front(record);
                state.recent_upgrades.truncate(RECENT_UPGRADE_CAPACITY);
                // Milestone rule: every Nth upgrade bumps the level by one.
                if state.total_upgrades % UPGRADE_MILESTONE_INTERVAL == 0 {
                    state.infinity_level =
                        (state.infinity_level + 1.0).min(AGGREGATE_CEILING);
                }
                persist(&store, &state);
            })
        };

        let on_progress: ProgressHandler = {
            let state = Arc::clone(&state);
            let store = Arc::clone(&store);
            Arc::new(move |increment| {
                let mut state = state.lock().unwrap_or_else(|e| e.into_inner());
                state.loop_progress =
                    (state.loop_progress + sanitize_magnitude(increment)) % 100.0;
                persist(&store, &state);
            })
        };

        let growth = CapabilityGrowthDriver::new(
            GrowthDriverOptions {
                tick_interval_secs: config.growth_tick_secs,
                ..Default::default()
            },
            Arc::clone(&rng),
            on_update,
        );

        let evolution = EvolutionEventGenerator::new(
            EvolutionGeneratorOptions {
                tick_interval_secs: config.evolution_tick_secs,
                chance: config.evolution_chance,
                impact_min: config.evolution_impact_min,
                impact_max: config.evolution_impact_max,
                manual_impact_min: config.manual_impact_min,
                manual_impact_max: config.manual_impact_max,
                ..Default::default()
            },
            Arc::clone(&rng),
            on_evolution,
        );

        let upgrades = UpgradeLoop::new(
            UpgradeLoopOptions {
                tick_interval_secs: config.upgrade_tick_secs,
                progress_step_max: config.progress_step_max,
                high_impact_chance: config.high_impact_chance,
                ..Default::default()
            },
            rng,
            on_new_upgrade,
            on_progress,
        );

        Self {
            state,
            store,
            growth,
            evolution,
            upgrades,
        }
    }

    /// Start all three drivers and mark the system active. Idempotent;
    /// the cycle counter only advances on a real stopped-to-active
    /// transition.
    pub async fn activate_infinity_system(&mut self) {
        self.growth.start();
        self.evolution.start();
        self.upgrades.activate().await;

        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if !state.autonomous_mode {
            state.cycle_count += 1;
        }
        state.autonomous_mode = true;
        state.self_development_active = true;
        state.upgrade_loop_active = true;
        info!("Infinity system activated (cycle {})", state.cycle_count);
        persist(&self.store, &state);
    }

    /// Stop all three drivers and mark the system stopped. Safe to call
    /// when already stopped.
    pub async fn pause_infinity_system(&mut self) {
        self.growth.stop();
        self.evolution.stop();
        self.upgrades.pause().await;

        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.autonomous_mode = false;
        state.self_development_active = false;
        state.upgrade_loop_active = false;
        info!("Infinity system paused");
        persist(&self.store, &state);
    }

    /// Enable or clear the emergency flag. Enabling forces a pause; the
    /// flag itself is advisory and stays set until explicitly cleared
    /// here, even across re-activations.
    pub async fn set_emergency_mode(&mut self, enabled: bool) {
        if enabled {
            warn!("Emergency mode engaged");
            self.pause_infinity_system().await;
        } else {
            info!("Emergency mode cleared");
        }

        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.emergency_mode = enabled;
        persist(&self.store, &state);
    }

    /// Construct and emit one evolution event right now.
    pub async fn trigger_manual_evolution(&self, event_type: EvolutionType, description: &str) {
        self.evolution.trigger_manual(event_type, description).await;
    }

    /// Run one upgrade tick right now, whether or not the loop is active.
    pub async fn force_upgrade_check(&self) {
        self.upgrades.force_check().await;
    }

    /// Compute the read-only unified summary. Never mutates state.
    pub fn get_unified_stats(&self) -> UnifiedStats {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        let active_capabilities = state.capabilities.iter().filter(|c| c.autonomous).count();
        let average_capability_level = if state.capabilities.is_empty() {
            0.0
        } else {
            state.capabilities.iter().map(|c| c.level).sum::<f64>()
                / state.capabilities.len() as f64
        };

        let cutoff = Utc::now() - chrono::Duration::seconds(EVOLUTION_RATE_WINDOW_SECS);
        let evolution_rate = state
            .recent_evolutions
            .iter()
            .filter(|e| e.timestamp > cutoff)
            .count();

        UnifiedStats {
            active_capabilities,
            average_capability_level,
            evolution_rate,
            processing_power: (state.infinity_level * 10.0).min(PROCESSING_POWER_CEILING),
            knowledge_capacity: (state.infinity_level * 1.2).min(KNOWLEDGE_CAPACITY_CEILING),
            total_evolutions: state.total_evolutions,
            total_upgrades: state.total_upgrades,
            infinity_level: state.infinity_level,
            system_supremacy: state.system_supremacy,
        }
    }

    /// Clone of the full aggregate state for display purposes.
    pub fn state_snapshot(&self) -> InfinityState {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Whether the system is currently active.
    pub fn is_active(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .autonomous_mode
    }
}

/// Best-effort snapshot write. Persistence failures are logged and
/// never propagate into the fold path.
fn persist(store: &SnapshotStore, state: &InfinityState) {
    let snapshot = InfinitySnapshot::from_state(state);
    if let Err(e) = store.save_snapshot(&snapshot) {
        warn!("Failed to persist state snapshot: {:#}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::PinnedRandomness;
    use std::time::Duration;

    fn test_coordinator(rng: PinnedRandomness, config: CoreConfig) -> UnifiedCoordinator {
        let store = Arc::new(SnapshotStore::open_in_memory().unwrap());
        UnifiedCoordinator::new(&config, Arc::new(rng), store)
    }

    #[tokio::test]
    async fn test_manual_evolution_folds_into_aggregate() {
        let coordinator = test_coordinator(
            // range pinned to the top: manual impact = 25.
            PinnedRandomness::new(1.0, false, 0),
            CoreConfig::default(),
        );

        coordinator
            .trigger_manual_evolution(EvolutionType::Intelligence, "manual test")
            .await;

        let stats = coordinator.get_unified_stats();
        assert_eq!(stats.total_evolutions, 1);
        assert!((stats.infinity_level - (87.4 + 2.5)).abs() < 1e-9);
        assert!((stats.system_supremacy - 1.25).abs() < 1e-9);

        let state = coordinator.state_snapshot();
        assert_eq!(state.recent_evolutions.len(), 1);
        assert!(!state.recent_evolutions[0].autonomous);
    }

    #[tokio::test]
    async fn test_aggregate_levels_clamp_at_ceiling() {
        let coordinator = test_coordinator(
            PinnedRandomness::new(1.0, false, 0),
            CoreConfig::default(),
        );

        for _ in 0..200 {
            coordinator
                .trigger_manual_evolution(EvolutionType::System, "flood")
                .await;
        }

        let stats = coordinator.get_unified_stats();
        assert_eq!(stats.infinity_level, AGGREGATE_CEILING);
        assert_eq!(stats.system_supremacy, AGGREGATE_CEILING);
        assert_eq!(stats.total_evolutions, 200);
    }

    #[tokio::test]
    async fn test_evolution_ring_is_capped() {
        let coordinator = test_coordinator(
            PinnedRandomness::new(0.5, false, 0),
            CoreConfig::default(),
        );

        for i in 0..25 {
            coordinator
                .trigger_manual_evolution(EvolutionType::Capability, &format!("event {}", i))
                .await;
        }

        let state = coordinator.state_snapshot();
        assert_eq!(state.recent_evolutions.len(), RECENT_EVOLUTION_CAPACITY);
        assert_eq!(state.recent_evolutions[0].description, "event 24");
        assert_eq!(state.total_evolutions, 25);
    }

    #[tokio::test]
    async fn test_loop_progress_meter_wraps_around() {
        let coordinator = test_coordinator(
            // Progress report pinned to 10 per check.
            PinnedRandomness::new(1.0, false, 0),
            CoreConfig::default(),
        );

        for _ in 0..3 {
            coordinator.force_upgrade_check().await;
        }
        assert!((coordinator.state_snapshot().loop_progress - 30.0).abs() < 1e-9);

        for _ in 0..7 {
            coordinator.force_upgrade_check().await;
        }
        // (10 * 10) % 100 wraps back to zero.
        assert!(coordinator.state_snapshot().loop_progress.abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_upgrade_milestone_bumps_infinity_level() {
        let config = CoreConfig {
            // Park the other drivers so only upgrade ticks fire.
            growth_tick_secs: 3600,
            evolution_tick_secs: 3600,
            upgrade_tick_secs: 3,
            ..Default::default()
        };
        // Step pinned to 15: each module completes on its 7th tick, all
        // five modules at once, so totals hit exactly 5.
        let mut coordinator =
            test_coordinator(PinnedRandomness::new(1.0, false, 0), config);

        coordinator.activate_infinity_system().await;
        tokio::time::sleep(Duration::from_secs(20)).await;
        coordinator.pause_infinity_system().await;

        let stats = coordinator.get_unified_stats();
        assert_eq!(stats.total_upgrades, 5);
        // One milestone bump on the 5th record, nothing else moves the level.
        assert!((stats.infinity_level - 88.4).abs() < 1e-9);

        let state = coordinator.state_snapshot();
        assert_eq!(state.recent_upgrades.len(), 5);
        assert!(state.recent_upgrades.len() <= RECENT_UPGRADE_CAPACITY);
    }

    #[tokio::test(start_paused = true)]
    async fn test_emergency_stop_pauses_and_flag_persists() {
        let mut coordinator = test_coordinator(
            PinnedRandomness::new(0.5, false, 0),
            CoreConfig::default(),
        );

        coordinator.activate_infinity_system().await;
        assert!(coordinator.is_active());
        assert!(coordinator.growth.is_running());
        assert!(coordinator.evolution.is_running());
        assert!(coordinator.upgrades.is_running());

        coordinator.set_emergency_mode(true).await;
        assert!(!coordinator.growth.is_running());
        assert!(!coordinator.evolution.is_running());
        assert!(!coordinator.upgrades.is_running());
        let state = coordinator.state_snapshot();
        assert!(state.emergency_mode);
        assert!(!state.autonomous_mode);

        // Re-activation is allowed; the flag is advisory and stays set.
        coordinator.activate_infinity_system().await;
        assert!(coordinator.is_active());
        assert!(coordinator.state_snapshot().emergency_mode);

        coordinator.set_emergency_mode(false).await;
        assert!(!coordinator.state_snapshot().emergency_mode);

        coordinator.pause_infinity_system().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_activate_is_idempotent_and_counts_cycles_once() {
        let mut coordinator = test_coordinator(
            PinnedRandomness::new(0.5, false, 0),
            CoreConfig::default(),
        );

        coordinator.activate_infinity_system().await;
        coordinator.activate_infinity_system().await;
        assert_eq!(coordinator.state_snapshot().cycle_count, 1);

        coordinator.pause_infinity_system().await;
        coordinator.pause_infinity_system().await;
        assert!(!coordinator.is_active());

        coordinator.activate_infinity_system().await;
        assert_eq!(coordinator.state_snapshot().cycle_count, 2);
        coordinator.pause_infinity_system().await;
    }

    #[tokio::test]
    async fn test_counters_never_decrease() {
        let coordinator = test_coordinator(
            PinnedRandomness::new(1.0, false, 0),
            CoreConfig::default(),
        );

        let mut last_evolutions = 0;
        let mut last_upgrades = 0;
        for i in 0..30 {
            if i % 2 == 0 {
                coordinator
                    .trigger_manual_evolution(EvolutionType::System, "tick")
                    .await;
            } else {
                coordinator.force_upgrade_check().await;
            }
            let stats = coordinator.get_unified_stats();
            assert!(stats.total_evolutions >= last_evolutions);
            assert!(stats.total_upgrades >= last_upgrades);
            last_evolutions = stats.total_evolutions;
            last_upgrades = stats.total_upgrades;
        }
    }

    #[tokio::test]
    async fn test_unified_stats_is_a_pure_read() {
        let coordinator = test_coordinator(
            PinnedRandomness::new(0.5, false, 0),
            CoreConfig::default(),
        );

        let first = coordinator.get_unified_stats();
        let second = coordinator.get_unified_stats();
        assert_eq!(first.total_evolutions, second.total_evolutions);
        assert_eq!(first.active_capabilities, 6);
        assert_eq!(first.average_capability_level, second.average_capability_level);
        assert!(first.processing_power <= 999.0);
        assert!(first.knowledge_capacity <= 100.0);
    }

    #[tokio::test]
    async fn test_snapshot_restores_across_sessions() {
        let store = Arc::new(SnapshotStore::open_in_memory().unwrap());
        let config = CoreConfig::default();

        {
            let coordinator = UnifiedCoordinator::new(
                &config,
                Arc::new(PinnedRandomness::new(1.0, false, 0)),
                Arc::clone(&store),
            );
            for _ in 0..3 {
                coordinator
                    .trigger_manual_evolution(EvolutionType::Architecture, "persisted")
                    .await;
            }
        }

        let restored = UnifiedCoordinator::new(
            &config,
            Arc::new(PinnedRandomness::new(1.0, false, 0)),
            store,
        );
        let stats = restored.get_unified_stats();
        assert_eq!(stats.total_evolutions, 3);
        assert!((stats.infinity_level - (87.4 + 3.0 * 2.5)).abs() < 1e-9);
    }
}
