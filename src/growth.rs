//! Capability Growth Driver
//!
//! Periodically advances every autonomous capability's level toward its
//! cap using the capability's own growth rate scaled by a random factor.
//! Uses `tokio::time::interval` for the tick loop and `Arc<AtomicBool>`
//! plus a stored `JoinHandle` for idempotent start/stop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::rng::Randomness;
use crate::types::{sanitize_magnitude, seed_capabilities, Capability, CapabilityUpdateHandler};

/// Options for creating a growth driver.
pub struct GrowthDriverOptions {
    /// Tick interval in seconds. Defaults to 3.
    pub tick_interval_secs: u64,
    /// Capabilities to manage. Defaults to the fixed seed list.
    pub capabilities: Vec<Capability>,
}

impl Default for GrowthDriverOptions {
    fn default() -> Self {
        Self {
            tick_interval_secs: 3,
            capabilities: seed_capabilities(),
        }
    }
}

/// The growth driver. Owns the capability list exclusively and reports
/// the full updated list through its callback once per tick.
pub struct CapabilityGrowthDriver {
    running: Arc<AtomicBool>,
    interval_handle: Option<JoinHandle<()>>,
    tick_interval_secs: u64,
    capabilities: Arc<RwLock<Vec<Capability>>>,
    rng: Arc<dyn Randomness>,
    on_update: CapabilityUpdateHandler,
}

impl CapabilityGrowthDriver {
    /// Create a driver over the given capabilities. Growth rates are
    /// sanitized up front so a NaN or negative rate can never grow a level.
    pub fn new(
        options: GrowthDriverOptions,
        rng: Arc<dyn Randomness>,
        on_update: CapabilityUpdateHandler,
    ) -> Self {
        let mut capabilities = options.capabilities;
        for cap in capabilities.iter_mut() {
            cap.growth_rate = sanitize_magnitude(cap.growth_rate);
        }

        Self {
            running: Arc::new(AtomicBool::new(false)),
            interval_handle: None,
            tick_interval_secs: options.tick_interval_secs,
            capabilities: Arc::new(RwLock::new(capabilities)),
            rng,
            on_update,
        }
    }

    /// Start the growth tick loop. No-op if already running; a second
    /// call must never create a second timer.
    pub fn start(&mut self) {
        if self.running.load(Ordering::SeqCst) {
            warn!("Capability growth driver is already running");
            return;
        }

        self.running.store(true, Ordering::SeqCst);
        info!(
            "Starting capability growth driver with {}s tick interval",
            self.tick_interval_secs
        );

        let running = Arc::clone(&self.running);
        let capabilities = Arc::clone(&self.capabilities);
        let rng = Arc::clone(&self.rng);
        let on_update = Arc::clone(&self.on_update);
        let tick_secs = self.tick_interval_secs;

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(tick_secs));
            // Ticks must never overlap; a slow tick delays the next one.
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                interval.tick().await;

                if !running.load(Ordering::SeqCst) {
                    info!("Capability growth driver stopping");
                    break;
                }

                tick(&capabilities, rng.as_ref(), &on_update).await;
            }
        });

        self.interval_handle = Some(handle);
    }

    /// Stop the tick loop. Safe to call when not running; no tick fires
    /// after this returns.
    pub fn stop(&mut self) {
        if !self.running.load(Ordering::SeqCst) {
            debug!("Capability growth driver is not running");
            return;
        }

        info!("Stopping capability growth driver");
        self.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.interval_handle.take() {
            handle.abort();
        }
    }

    /// Returns whether the driver is currently running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Perform a single growth tick: advance every eligible capability,
/// then hand the full cloned list to the callback. A tick with zero
/// eligible capabilities still invokes the callback.
async fn tick(
    capabilities: &RwLock<Vec<Capability>>,
    rng: &dyn Randomness,
    on_update: &CapabilityUpdateHandler,
) {
    let mut caps = capabilities.write().await;
    let now = Utc::now();

    for cap in caps.iter_mut() {
        if cap.autonomous && cap.level < cap.max_level {
            let increment = (cap.growth_rate / 100.0) * rng.range(0.5, 1.5);
            cap.level = (cap.level + increment).min(cap.max_level);
            cap.last_evolution_at = now;
        }
    }

    let snapshot = caps.clone();
    drop(caps);

    on_update(snapshot);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::{PinnedRandomness, SeededRandomness};
    use std::sync::Mutex;

    fn collecting_handler() -> (CapabilityUpdateHandler, Arc<Mutex<Vec<Vec<Capability>>>>) {
        let collected: Arc<Mutex<Vec<Vec<Capability>>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&collected);
        let handler: CapabilityUpdateHandler =
            Arc::new(move |caps| sink.lock().unwrap().push(caps));
        (handler, collected)
    }

    fn single_capability(level: f64, max_level: f64, growth_rate: f64) -> Capability {
        Capability {
            id: "test_cap".to_string(),
            name: "Test Capability".to_string(),
            level,
            max_level,
            growth_rate,
            autonomous: true,
            last_evolution_at: Utc::now(),
            description: String::new(),
        }
    }

    #[tokio::test]
    async fn test_tick_grows_by_rate_over_100_when_factor_pinned() {
        // Midpoint of uniform(0.5, 1.5) is exactly 1.0.
        let rng = PinnedRandomness::new(0.5, false, 0);
        let (handler, _collected) = collecting_handler();
        let driver = CapabilityGrowthDriver::new(
            GrowthDriverOptions {
                tick_interval_secs: 3,
                capabilities: vec![single_capability(0.0, 100.0, 10.0)],
            },
            Arc::new(rng),
            handler,
        );

        tick(&driver.capabilities, driver.rng.as_ref(), &driver.on_update).await;

        let caps = driver.capabilities.read().await;
        assert!((caps[0].level - 0.1).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_level_clamps_at_cap_and_stops_changing() {
        let rng = Arc::new(PinnedRandomness::new(0.5, false, 0));
        let (handler, _collected) = collecting_handler();
        let driver = CapabilityGrowthDriver::new(
            GrowthDriverOptions {
                tick_interval_secs: 3,
                capabilities: vec![single_capability(0.0, 100.0, 10.0)],
            },
            rng,
            handler,
        );

        // 0.1 per tick; run well past the cap.
        for _ in 0..1100 {
            tick(&driver.capabilities, driver.rng.as_ref(), &driver.on_update).await;
        }
        let (level, stamped_at) = {
            let caps = driver.capabilities.read().await;
            (caps[0].level, caps[0].last_evolution_at)
        };
        assert_eq!(level, 100.0);

        // A capability at its cap is left untouched, timestamp included.
        tick(&driver.capabilities, driver.rng.as_ref(), &driver.on_update).await;
        let caps = driver.capabilities.read().await;
        assert_eq!(caps[0].level, 100.0);
        assert_eq!(caps[0].last_evolution_at, stamped_at);
    }

    #[tokio::test]
    async fn test_levels_stay_bounded_under_random_growth() {
        let rng = Arc::new(SeededRandomness::new(7));
        let (handler, _collected) = collecting_handler();
        let driver = CapabilityGrowthDriver::new(
            GrowthDriverOptions::default(),
            rng,
            handler,
        );

        for _ in 0..500 {
            tick(&driver.capabilities, driver.rng.as_ref(), &driver.on_update).await;
        }

        for cap in driver.capabilities.read().await.iter() {
            assert!(cap.level >= 0.0);
            assert!(cap.level <= cap.max_level);
        }
    }

    #[tokio::test]
    async fn test_non_autonomous_capability_untouched_but_callback_fires() {
        let mut cap = single_capability(50.0, 100.0, 10.0);
        cap.autonomous = false;
        let before = cap.last_evolution_at;

        let (handler, collected) = collecting_handler();
        let driver = CapabilityGrowthDriver::new(
            GrowthDriverOptions {
                tick_interval_secs: 3,
                capabilities: vec![cap],
            },
            Arc::new(PinnedRandomness::new(0.5, false, 0)),
            handler,
        );

        tick(&driver.capabilities, driver.rng.as_ref(), &driver.on_update).await;

        let payloads = collected.lock().unwrap();
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0][0].level, 50.0);
        assert_eq!(payloads[0][0].last_evolution_at, before);
    }

    #[tokio::test]
    async fn test_nan_growth_rate_is_clamped_to_zero() {
        let cap = single_capability(10.0, 100.0, f64::NAN);
        let (handler, _collected) = collecting_handler();
        let driver = CapabilityGrowthDriver::new(
            GrowthDriverOptions {
                tick_interval_secs: 3,
                capabilities: vec![cap],
            },
            Arc::new(PinnedRandomness::new(1.0, false, 0)),
            handler,
        );

        tick(&driver.capabilities, driver.rng.as_ref(), &driver.on_update).await;

        let caps = driver.capabilities.read().await;
        assert_eq!(caps[0].level, 10.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_is_idempotent_and_stop_cancels_ticks() {
        let (handler, collected) = collecting_handler();
        let mut driver = CapabilityGrowthDriver::new(
            GrowthDriverOptions {
                tick_interval_secs: 3,
                capabilities: vec![single_capability(0.0, 100.0, 10.0)],
            },
            Arc::new(PinnedRandomness::new(0.5, false, 0)),
            handler,
        );

        driver.start();
        driver.start(); // second start must not spawn a second timer
        assert!(driver.is_running());

        tokio::time::sleep(Duration::from_secs(10)).await;
        let ticks_while_running = collected.lock().unwrap().len();
        assert!(ticks_while_running >= 2);
        // One timer only: at most one tick per 3s window plus the
        // interval's immediate first fire.
        assert!(ticks_while_running <= 5);

        driver.stop();
        driver.stop(); // double-stop is a no-op
        assert!(!driver.is_running());

        let after_stop = collected.lock().unwrap().len();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(collected.lock().unwrap().len(), after_stop);
    }
}
