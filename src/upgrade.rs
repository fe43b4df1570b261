//! Upgrade-Module Loop
//!
//! Manages the set of upgrade modules: while the loop is active every
//! module's progress advances each tick, and a module crossing 100%
//! emits exactly one upgrade record and resets to zero in the same
//! mutation, ready for the next cycle. The timer path and the forced
//! check share a single tick function.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::rng::Randomness;
use crate::types::{
    seed_upgrade_modules, ModuleStatus, ProgressHandler, UpgradeHandler, UpgradeImpact,
    UpgradeModule, UpgradeRecord,
};

/// Upper bound of the scalar loop-progress report per tick.
const PROGRESS_REPORT_MAX: f64 = 10.0;

/// Options for creating an upgrade loop.
pub struct UpgradeLoopOptions {
    /// Tick interval in seconds. Defaults to 3.
    pub tick_interval_secs: u64,
    /// Upper bound of the per-module progress increment. Defaults to 15.
    pub progress_step_max: f64,
    /// Probability that a completed upgrade is rated HIGH. Defaults to 0.5.
    pub high_impact_chance: f64,
    /// Modules to manage. Defaults to the fixed seed list.
    pub modules: Vec<UpgradeModule>,
}

impl Default for UpgradeLoopOptions {
    fn default() -> Self {
        Self {
            tick_interval_secs: 3,
            progress_step_max: 15.0,
            high_impact_chance: 0.5,
            modules: seed_upgrade_modules(),
        }
    }
}

#[derive(Clone, Copy)]
struct Tuning {
    progress_step_max: f64,
    high_impact_chance: f64,
}

/// The upgrade loop. Owns the module list exclusively; completed cycles
/// are reported through `on_new_upgrade`, and each tick also reports a
/// scalar increment through `on_progress` for the coordinator's
/// wrap-around meter.
pub struct UpgradeLoop {
    running: Arc<AtomicBool>,
    interval_handle: Option<JoinHandle<()>>,
    tick_interval_secs: u64,
    tuning: Tuning,
    modules: Arc<RwLock<Vec<UpgradeModule>>>,
    rng: Arc<dyn Randomness>,
    on_new_upgrade: UpgradeHandler,
    on_progress: ProgressHandler,
}

impl UpgradeLoop {
    pub fn new(
        options: UpgradeLoopOptions,
        rng: Arc<dyn Randomness>,
        on_new_upgrade: UpgradeHandler,
        on_progress: ProgressHandler,
    ) -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
            interval_handle: None,
            tick_interval_secs: options.tick_interval_secs,
            tuning: Tuning {
                progress_step_max: options.progress_step_max,
                high_impact_chance: options.high_impact_chance,
            },
            modules: Arc::new(RwLock::new(options.modules)),
            rng,
            on_new_upgrade,
            on_progress,
        }
    }

    /// Mark every module active, then start the tick loop. The timer
    /// portion is idempotent; a second call only re-marks the modules.
    pub async fn activate(&mut self) {
        {
            let mut modules = self.modules.write().await;
            let now = Utc::now();
            for module in modules.iter_mut() {
                module.status = ModuleStatus::Active;
                module.last_activity_at = now;
            }
        }

        if self.running.load(Ordering::SeqCst) {
            warn!("Upgrade loop is already running");
            return;
        }

        self.running.store(true, Ordering::SeqCst);
        info!(
            "Starting upgrade loop with {}s tick interval",
            self.tick_interval_secs
        );

        let running = Arc::clone(&self.running);
        let modules = Arc::clone(&self.modules);
        let rng = Arc::clone(&self.rng);
        let on_new_upgrade = Arc::clone(&self.on_new_upgrade);
        let on_progress = Arc::clone(&self.on_progress);
        let tuning = self.tuning;
        let tick_secs = self.tick_interval_secs;

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(tick_secs));
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                interval.tick().await;

                if !running.load(Ordering::SeqCst) {
                    info!("Upgrade loop stopping");
                    break;
                }

                tick(tuning, &modules, rng.as_ref(), &on_new_upgrade, &on_progress).await;
            }
        });

        self.interval_handle = Some(handle);
    }

    /// Stop the tick loop and set every module idle. Safe to call when
    /// not running.
    pub async fn pause(&mut self) {
        if self.running.load(Ordering::SeqCst) {
            info!("Pausing upgrade loop");
            self.running.store(false, Ordering::SeqCst);

            if let Some(handle) = self.interval_handle.take() {
                handle.abort();
            }
        } else {
            debug!("Upgrade loop is not running");
        }

        let mut modules = self.modules.write().await;
        for module in modules.iter_mut() {
            module.status = ModuleStatus::Idle;
        }
    }

    /// Returns whether the loop is currently running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Run one tick right now, regardless of loop state. Reuses the
    /// exact tick logic the timer drives.
    pub async fn force_check(&self) {
        info!("Forced upgrade check");
        tick(
            self.tuning,
            &self.modules,
            self.rng.as_ref(),
            &self.on_new_upgrade,
            &self.on_progress,
        )
        .await;
    }
}

/// Perform one upgrade tick. Each active module advances by a uniform
/// increment; a module reaching 100 emits its record and resets to 0
/// under the same write lock, so no observer sees progress persist at
/// 100. Overflow past 100 is dropped, not carried.
async fn tick(
    tuning: Tuning,
    modules: &RwLock<Vec<UpgradeModule>>,
    rng: &dyn Randomness,
    on_new_upgrade: &UpgradeHandler,
    on_progress: &ProgressHandler,
) {
    let mut modules = modules.write().await;
    let now = Utc::now();

    for module in modules.iter_mut() {
        if module.status != ModuleStatus::Active {
            continue;
        }

        let increment = rng.range(0.0, tuning.progress_step_max);
        module.progress = (module.progress + increment).min(100.0);
        module.last_activity_at = now;

        if module.progress >= 100.0 {
            let impact = if rng.chance(tuning.high_impact_chance) {
                UpgradeImpact::High
            } else {
                UpgradeImpact::Medium
            };

            let record = UpgradeRecord {
                record_type: "module_upgrade".to_string(),
                description: format!("{} completed an upgrade cycle", module.name),
                impact,
                module: module.name.clone(),
                timestamp: now,
            };

            debug!("Upgrade completed: {} ({:?})", module.name, record.impact);
            on_new_upgrade(record);

            // Repeating cycle: the module stays active for the next pass.
            module.progress = 0.0;
        }
    }

    drop(modules);

    on_progress(rng.range(0.0, PROGRESS_REPORT_MAX));
}
