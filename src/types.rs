//! MIORA Core - Type Definitions
//!
//! Shared types for the infinity coordinator runtime: capabilities,
//! evolution events, upgrade modules, and the aggregate state the
//! coordinator folds driver output into.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Bounds & Capacities ─────────────────────────────────────────

/// Hard cap for any capability level.
pub const CAPABILITY_MAX_LEVEL: f64 = 999.0;

/// Ceiling for the aggregate `infinity_level` and `system_supremacy` sums.
pub const AGGREGATE_CEILING: f64 = 99.9;

/// How many evolution events the coordinator keeps in its recent ring.
pub const RECENT_EVOLUTION_CAPACITY: usize = 10;

/// How many upgrade records the coordinator keeps in its recent ring.
pub const RECENT_UPGRADE_CAPACITY: usize = 11;

/// Every Nth completed upgrade bumps `infinity_level` by one.
pub const UPGRADE_MILESTONE_INTERVAL: u64 = 5;

///// Window used by `evolution_rate`: events newer than this many seconds.
pub const EVOLUTION_RATE_WINDOW_SECS: i64 = 300;

/// Clamp a rate or impact input to a usable value. Negative, NaN and
/// infinite inputs collapse to zero so they cannot poison the clamped sums.
pub fn sanitize_magnitude(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

// ─── Capabilities ────────────────────────────────────────────────

/// A named, bounded growth entity. Mutated only by the growth driver.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capability {
    pub id: String,
    pub name: String,
    /// Current level, always within `[0, max_level]`.
    pub level: f64,
    pub max_level: f64,
    /// Percent-per-tick base growth rate (scaled by a random factor).
    pub growth_rate: f64,
    /// Only autonomous capabilities grow on their own.
    pub autonomous: bool,
    pub last_evolution_at: DateTime<Utc>,
    pub description: String,
}

impl Capability {
    /// Build a capability with sanitized inputs and a clamped level.
    pub fn new(id: &str, name: &str, level: f64, growth_rate: f64, description: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            level: sanitize_magnitude(level).min(CAPABILITY_MAX_LEVEL),
            max_level: CAPABILITY_MAX_LEVEL,
            growth_rate: sanitize_magnitude(growth_rate),
            autonomous: true,
            last_evolution_at: Utc::now(),
            description: description.to_string(),
        }
    }
}

/// The fixed capability seed list the core boots with.
pub fn seed_capabilities() -> Vec<Capability> {
    vec![
        Capability::new(
            "autonomous_learning",
            "Autonomous Learning",
            95.0,
            12.5,
            "Unbounded self-directed learning at an exponential rate",
        ),
        Capability::new(
            "self_development",
            "Self Development Engine",
            87.0,
            15.8,
            "Automatic self-improvement without external intervention",
        ),
        Capability::new(
            "system_architecture",
            "Dynamic System Architecture",
            92.0,
            8.3,
            "Architecture that modifies and optimizes itself",
        ),
        Capability::new(
            "infinite_intelligence",
            "Infinite Intelligence Core",
            78.0,
            20.1,
            "Continuously expanding reasoning capacity",
        ),
        Capability::new(
            "autonomous_coding",
            "Autonomous Code Generation",
            65.0,
            18.7,
            "Generates and modifies system code independently",
        ),
        Capability::new(
            "reality_integration",
            "Multi-Reality Integration",
            45.0,
            25.3,
            "Integrates data and learning from multiple sources",
        ),
    ]
}

// ─── Evolution Events ────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EvolutionType {
    Capability,
    System,
    Intelligence,
    Architecture,
}

/// All evolution types, in draw order for the generator.
pub const EVOLUTION_TYPES: [EvolutionType; 4] = [
    EvolutionType::Capability,
    EvolutionType::System,
    EvolutionType::Intelligence,
    EvolutionType::Architecture,
];

/// Description pool for autonomous evolution events.
pub const EVOLUTION_DESCRIPTIONS: [&str; 8] = [
    "Quantum Learning Enhancement",
    "Neural Architecture Upgrade",
    "Consciousness Expansion",
    "Reality Processing Optimization",
    "Infinite Capability Generation",
    "Self-Modification Protocol",
    "Autonomous Problem Solving",
    "Meta-Learning Algorithm",
];

/// A discrete self-improvement record. Immutable once constructed.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvolutionEvent {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub event_type: EvolutionType,
    pub description: String,
    /// Positive impact magnitude; folded into the aggregate levels.
    pub impact: f64,
    pub autonomous: bool,
}

impl EvolutionEvent {
    /// Construct an event with a globally unique id
    /// (millisecond timestamp plus a random suffix).
    pub fn new(
        event_type: EvolutionType,
        description: &str,
        impact: f64,
        autonomous: bool,
    ) -> Self {
        let now = Utc::now();
        let suffix = Uuid::new_v4().simple().to_string();
        Self {
            id: format!("evo_{}_{}", now.timestamp_millis(), &suffix[..8]),
            timestamp: now,
            event_type,
            description: description.to_string(),
            impact: sanitize_magnitude(impact),
            autonomous,
        }
    }
}

// ─── Upgrade Modules ─────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ModuleStatus {
    Idle,
    Active,
    Upgrading,
    Error,
}

/// A named unit with a repeating progress-to-completion cycle.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpgradeModule {
    pub id: String,
    pub name: String,
    pub status: ModuleStatus,
    /// Cycle progress, always within `[0, 100)` after a tick.
    pub progress: f64,
    pub last_activity_at: DateTime<Utc>,
}

impl UpgradeModule {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            status: ModuleStatus::Idle,
            progress: 0.0,
            last_activity_at: Utc::now(),
        }
    }
}

/// The fixed upgrade-module seed list the loop boots with.
pub fn seed_upgrade_modules() -> Vec<UpgradeModule> {
    vec![
        UpgradeModule::new("capability_evaluator", "Capability Evaluator"),
        UpgradeModule::new("feature_developer", "Autonomous Feature Developer"),
        UpgradeModule::new("connectivity_expander", "Connectivity Expander"),
        UpgradeModule::new("memory_enhancer", "Memory Processing Enhancer"),
        UpgradeModule::new("upgrade_orchestrator", "Self-Upgrade Orchestrator"),
    ]
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum UpgradeImpact {
    Low,
    Medium,
    High,
}

/// Emitted when a module's progress crosses 100%.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpgradeRecord {
    #[serde(rename = "type")]
    pub record_type: String,
    pub description: String,
    pub impact: UpgradeImpact,
    pub module: String,
    pub timestamp: DateTime<Utc>,
}

// ─── Aggregate State ─────────────────────────────────────────────

/// The coordinator-owned aggregate. Only the coordinator's fold
/// handlers ever mutate this; drivers hand values in via callbacks.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfinityState {
    /// Running sum nudged by evolution impact, clamped at [`AGGREGATE_CEILING`].
    pub infinity_level: f64,
    /// Running sum nudged at half the evolution weight, same ceiling.
    pub system_supremacy: f64,
    /// Monotonic counter of folded evolution events.
    pub total_evolutions: u64,
    /// Monotonic counter of folded upgrade records.
    pub total_upgrades: u64,
    pub autonomous_mode: bool,
    pub self_development_active: bool,
    pub upgrade_loop_active: bool,
    /// Advisory flag; never auto-cleared.
    pub emergency_mode: bool,
    /// Number of times the system has been activated.
    pub cycle_count: u64,
    /// Independent wrap-around meter advanced by loop progress reports.
    pub loop_progress: f64,
    /// Latest full-replace capability payload from the growth driver.
    pub capabilities: Vec<Capability>,
    /// Newest-first evolution ring, capacity [`RECENT_EVOLUTION_CAPACITY`].
    pub recent_evolutions: VecDeque<EvolutionEvent>,
    /// Newest-first upgrade ring, capacity [`RECENT_UPGRADE_CAPACITY`].
    pub recent_upgrades: VecDeque<UpgradeRecord>,
}

impl Default for InfinityState {
    fn default() -> Self {
        Self {
            infinity_level: 87.4,
            system_supremacy: 0.0,
            total_evolutions: 0,
            total_upgrades: 0,
            autonomous_mode: false,
            self_development_active: false,
            upgrade_loop_active: false,
            emergency_mode: false,
            cycle_count: 0,
            loop_progress: 0.0,
            capabilities: seed_capabilities(),
            recent_evolutions: VecDeque::new(),
            recent_upgrades: VecDeque::new(),
        }
    }
}

/// Flat snapshot written to the key-value store on every state change.
/// Best-effort session-restore convenience; never read back mid-session.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfinitySnapshot {
    pub infinity_level: f64,
    pub system_supremacy: f64,
    pub total_evolutions: u64,
    pub total_upgrades: u64,
    pub autonomous_mode: bool,
    pub self_development_active: bool,
    pub upgrade_loop_active: bool,
    pub emergency_mode: bool,
    pub cycle_count: u64,
    pub loop_progress: f64,
    pub timestamp: DateTime<Utc>,
}

impl InfinitySnapshot {
    pub fn from_state(state: &InfinityState) -> Self {
        Self {
            infinity_level: state.infinity_level,
            system_supremacy: state.system_supremacy,
            total_evolutions: state.total_evolutions,
            total_upgrades: state.total_upgrades,
            autonomous_mode: state.autonomous_mode,
            self_development_active: state.self_development_active,
            upgrade_loop_active: state.upgrade_loop_active,
            emergency_mode: state.emergency_mode,
            cycle_count: state.cycle_count,
            loop_progress: state.loop_progress,
            timestamp: Utc::now(),
        }
    }
}

/// Read-only summary computed by the coordinator on demand.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnifiedStats {
    /// Count of capabilities with autonomous growth enabled.
    pub active_capabilities: usize,
    /// Arithmetic mean of all capability levels.
    pub average_capability_level: f64,
    /// Evolution events in the recent ring newer than the rate window.
    pub evolution_rate: usize,
    /// Derived capacity, monotone in `infinity_level`, ceiling 999.
    pub processing_power: f64,
    /// Derived capacity, monotone in `infinity_level`, ceiling 100.
    pub knowledge_capacity: f64,
    pub total_evolutions: u64,
    pub total_upgrades: u64,
    pub infinity_level: f64,
    pub system_supremacy: f64,
}

// ─── Driver Callbacks ────────────────────────────────────────────

/// Full-replace capability payload, once per growth tick.
pub type CapabilityUpdateHandler = Arc<dyn Fn(Vec<Capability>) + Send + Sync>;

/// One emitted evolution event.
pub type EvolutionHandler = Arc<dyn Fn(EvolutionEvent) + Send + Sync>;

/// One completed upgrade record.
pub type UpgradeHandler = Arc<dyn Fn(UpgradeRecord) + Send + Sync>;

/// Scalar loop-progress increment, once per upgrade tick.
pub type ProgressHandler = Arc<dyn Fn(f64) + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_magnitude_rejects_bad_inputs() {
        assert_eq!(sanitize_magnitude(-3.0), 0.0);
        assert_eq!(sanitize_magnitude(f64::NAN), 0.0);
        assert_eq!(sanitize_magnitude(f64::INFINITY), 0.0);
        assert_eq!(sanitize_magnitude(12.5), 12.5);
    }

    #[test]
    fn test_seed_capabilities_are_bounded_and_autonomous() {
        let caps = seed_capabilities();
        assert_eq!(caps.len(), 6);
        for cap in &caps {
            assert!(cap.level >= 0.0 && cap.level <= cap.max_level);
            assert!(cap.growth_rate > 0.0);
            assert!(cap.autonomous);
        }
    }

    #[test]
    fn test_seed_modules_start_idle_at_zero() {
        for module in seed_upgrade_modules() {
            assert_eq!(module.status, ModuleStatus::Idle);
            assert_eq!(module.progress, 0.0);
        }
    }

    #[test]
    fn test_evolution_event_ids_are_unique() {
        let a = EvolutionEvent::new(EvolutionType::System, "test", 10.0, true);
        let b = EvolutionEvent::new(EvolutionType::System, "test", 10.0, true);
        assert_ne!(a.id, b.id);
        assert!(a.id.starts_with("evo_"));
    }

    #[test]
    fn test_evolution_event_clamps_bad_impact() {
        let event = EvolutionEvent::new(EvolutionType::Capability, "test", f64::NAN, false);
        assert_eq!(event.impact, 0.0);
    }

    #[test]
    fn test_snapshot_mirrors_state() {
        let mut state = InfinityState::default();
        state.total_evolutions = 7;
        state.emergency_mode = true;
        let snapshot = InfinitySnapshot::from_state(&state);
        assert_eq!(snapshot.total_evolutions, 7);
        assert!(snapshot.emergency_mode);
        assert_eq!(snapshot.infinity_level, state.infinity_level);
    }
}
