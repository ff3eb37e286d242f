//! SimulationManager - lifecycle and tick fan-out for the fleet.
//!
//! # Architecture
//!
//! ```text
//!                 ┌──────────────┐
//!   interval ────►│ broadcaster  │
//!                 └──────┬───────┘
//!          try_send(()) into one depth-1 queue per truck
//!          ┌─────────────┼─────────────┐
//!     ┌────▼────┐   ┌────▼────┐   ┌────▼────┐
//!     │ truck 1 │   │ truck 2 │   │ truck N │   ...
//!     └────┬────┘   └────┬────┘   └────┬────┘
//!          └── write lock, one truck ──┘
//!                 ┌──────▼───────┐
//!                 │   Registry   │◄──── snapshot() (read lock)
//!                 └──────────────┘
//! ```
//!
//! A truck still busy with the previous tick when the next one arrives
//! simply misses it: its queue is full and the send is dropped.

use crate::config::{ConfigUpdate, SimConfig};
use crate::error::SimError;
use crate::registry::{Registry, Truck};

use orbit_core::SimMetrics;
use orbit_env::{OrbitContext, ShutdownSignal, TaskHandle, TokioContext};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Mutex;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

/// Tasks belonging to one start/stop cycle.
struct Run {
    /// Child of the caller's signal; raised by `stop`
    shutdown: ShutdownSignal,

    tasks: Vec<TaskHandle>,
}

impl Run {
    /// True once `stop` or the caller's signal has ended this run.
    fn is_over(&self) -> bool {
        self.shutdown.is_triggered()
    }
}

#[derive(Default)]
struct Lifecycle {
    run: Option<Run>,
}

/// Owns the fleet and drives it on a fixed tick.
///
/// All methods take `&self`; wrap the manager in an `Arc` to share it with
/// API, streaming or metrics collaborators.
pub struct SimulationManager<Ctx: OrbitContext = TokioContext> {
    /// Runtime context (clock, task spawning)
    ctx: Arc<Ctx>,

    /// Truck and route state
    registry: Arc<Registry>,

    /// Timing and dispatch metrics
    metrics: Arc<SimMetrics>,

    /// Normalized configuration given at construction
    initial: SimConfig,

    /// Configuration of the current (or next) run
    config: RwLock<SimConfig>,

    running: AtomicBool,

    /// Signal passed to the last `start`, reused on reconfiguration
    parent: RwLock<Option<ShutdownSignal>>,

    lifecycle: Mutex<Lifecycle>,
}

impl SimulationManager<TokioContext> {
    /// Creates a stopped manager on the Tokio runtime.
    pub fn new(config: SimConfig) -> Self {
        Self::with_context(TokioContext::shared(), config, Arc::new(SimMetrics::new()))
    }
}

impl<Ctx: OrbitContext> SimulationManager<Ctx> {
    /// Creates a stopped manager with an explicit context and metrics collector.
    pub fn with_context(ctx: Arc<Ctx>, config: SimConfig, metrics: Arc<SimMetrics>) -> Self {
        let config = config.normalized();
        Self {
            ctx,
            registry: Arc::new(Registry::new(config.seed)),
            metrics,
            initial: config.clone(),
            config: RwLock::new(config),
            running: AtomicBool::new(false),
            parent: RwLock::new(None),
            lifecycle: Mutex::new(Lifecycle::default()),
        }
    }

    /// Seeds the fleet and starts one task per truck plus the broadcaster.
    ///
    /// Raising `parent` stops every task of this run.
    ///
    /// # Returns
    /// * `Ok(())` - The simulation is running
    /// * `Err(SimError::AlreadyStarted)` - It was already running; nothing changed
    pub async fn start(&self, parent: &ShutdownSignal) -> Result<(), SimError> {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.run.as_ref().is_some_and(|run| !run.is_over()) {
            return Err(SimError::AlreadyStarted);
        }
        // A run ended by the caller's signal is reaped before starting over
        self.halt(&mut lifecycle).await;

        *self.parent.write().unwrap_or_else(PoisonError::into_inner) = Some(parent.clone());
        lifecycle.run = Some(self.launch(parent));
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Stops every task and waits for all of them to exit.
    ///
    /// Idempotent. Once this returns no task touches the fleet, so
    /// successive snapshots are identical.
    pub async fn stop(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        self.halt(&mut lifecycle).await;
        self.running.store(false, Ordering::SeqCst);
    }

    /// Replaces the configuration and restarts from scratch.
    ///
    /// The fleet is rebuilt and the RNG reseeded; nothing carries over from
    /// the previous run. Returns the normalized configuration now in effect.
    pub async fn apply_config(&self, config: SimConfig) -> Result<SimConfig, SimError> {
        self.reconfigure(|_| config).await
    }

    /// Merges a partial update into the current configuration and restarts.
    pub async fn apply_update(&self, update: ConfigUpdate) -> Result<SimConfig, SimError> {
        self.reconfigure(|current| current.with_update(&update)).await
    }

    async fn reconfigure<F>(&self, build: F) -> Result<SimConfig, SimError>
    where
        F: FnOnce(&SimConfig) -> SimConfig,
    {
        let mut lifecycle = self.lifecycle.lock().await;
        let live = lifecycle.run.as_ref().is_some_and(|run| !run.is_over());
        let parent = match self.parent() {
            Some(parent) if live => parent,
            _ => return Err(SimError::NotStarted),
        };

        // `running` stays set across the restart
        self.halt(&mut lifecycle).await;

        let config = build(&self.current_config()).normalized();
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = config.clone();
        self.registry.reseed(config.seed);

        lifecycle.run = Some(self.launch(&parent));
        self.running.store(true, Ordering::SeqCst);

        info!(
            trucks = config.num_trucks,
            tick_ms = config.tick_interval.as_millis() as u64,
            "Simulation reconfigured"
        );
        Ok(config)
    }

    /// Copies the state of every truck, ordered by id.
    pub fn snapshot(&self) -> Vec<Truck> {
        self.registry.snapshot()
    }

    /// Alias of [`snapshot`](Self::snapshot).
    pub fn trucks(&self) -> Vec<Truck> {
        self.snapshot()
    }

    pub fn current_config(&self) -> SimConfig {
        self.config.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Configuration the manager was constructed with (normalized).
    pub fn initial_config(&self) -> SimConfig {
        self.initial.clone()
    }

    /// True between `start` and `stop`, unless the caller's signal has
    /// since been raised.
    pub fn started(&self) -> bool {
        self.running.load(Ordering::SeqCst) && !self.parent().is_some_and(|p| p.is_triggered())
    }

    fn parent(&self) -> Option<ShutdownSignal> {
        self.parent.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Shared metrics collector.
    pub fn metrics(&self) -> Arc<SimMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Seeds the registry and spawns the tasks of a new run.
    fn launch(&self, parent: &ShutdownSignal) -> Run {
        let config = self.current_config();
        let ids = self.registry.populate(&config);
        let shutdown = parent.child();
        let dt_secs = config.tick_interval.as_secs_f64();

        let mut senders = Vec::with_capacity(ids.len());
        let mut tasks = Vec::with_capacity(ids.len() + 1);

        for id in ids {
            let (tx, rx) = mpsc::channel(1);
            senders.push(tx);

            let worker = TruckWorker {
                ctx: Arc::clone(&self.ctx),
                registry: Arc::clone(&self.registry),
                metrics: Arc::clone(&self.metrics),
                ticks: rx,
                shutdown: shutdown.clone(),
                dt_secs,
            };
            self.metrics.task_started();
            tasks.push(self.ctx.spawn(&id, worker.run(id.clone())));
        }

        let broadcaster = Broadcaster {
            ctx: Arc::clone(&self.ctx),
            metrics: Arc::clone(&self.metrics),
            senders,
            shutdown: shutdown.clone(),
            period: config.tick_interval,
        };
        self.metrics.task_started();
        tasks.push(self.ctx.spawn("broadcaster", broadcaster.run()));

        info!(
            trucks = config.num_trucks,
            tick_ms = config.tick_interval.as_millis() as u64,
            seed = config.seed,
            "🚚 Simulation started"
        );

        Run { shutdown, tasks }
    }

    /// Stops the current run, if any, and joins all of its tasks.
    async fn halt(&self, lifecycle: &mut Lifecycle) {
        let Some(run) = lifecycle.run.take() else {
            return;
        };
        let exited = run.tasks.iter().filter(|task| task.is_finished()).count();
        if exited > 0 {
            debug!(exited, "Tasks already exited before stop");
        }
        run.shutdown.trigger();

        let total = run.tasks.len();
        for task in run.tasks {
            if let Err(e) = task.join().await {
                warn!(error = %e, "Task did not exit cleanly");
            }
        }

        info!(tasks = total, "Simulation stopped");
    }
}

impl<Ctx: OrbitContext> Drop for SimulationManager<Ctx> {
    fn drop(&mut self) {
        // Tasks hold their own Arcs; make sure they do not outlive the manager.
        if let Some(run) = &self.lifecycle.get_mut().run {
            run.shutdown.trigger();
        }
    }
}

/// One truck's update loop.
struct TruckWorker<Ctx: OrbitContext> {
    ctx: Arc<Ctx>,
    registry: Arc<Registry>,
    metrics: Arc<SimMetrics>,
    ticks: mpsc::Receiver<()>,
    shutdown: ShutdownSignal,
    dt_secs: f64,
}

impl<Ctx: OrbitContext> TruckWorker<Ctx> {
    async fn run(mut self, id: String) {
        let mut stopped = self.shutdown.triggered();

        loop {
            tokio::select! {
                biased;
                _ = &mut stopped => break,
                tick = self.ticks.recv() => {
                    if tick.is_none() {
                        break;
                    }
                    let began = self.ctx.now();
                    self.registry.advance(&id, self.dt_secs);
                    self.metrics.record_update(self.ctx.now().saturating_sub(began));
                }
            }
        }

        self.metrics.task_finished();
    }
}

/// Fans each timer tick out to every truck queue.
struct Broadcaster<Ctx: OrbitContext> {
    ctx: Arc<Ctx>,
    metrics: Arc<SimMetrics>,
    senders: Vec<mpsc::Sender<()>>,
    shutdown: ShutdownSignal,
    period: Duration,
}

impl<Ctx: OrbitContext> Broadcaster<Ctx> {
    async fn run(self) {
        let mut stopped = self.shutdown.triggered();
        let mut interval = tokio::time::interval_at(Instant::now() + self.period, self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_tick: Option<Duration> = None;

        loop {
            tokio::select! {
                biased;
                _ = &mut stopped => break,
                _ = interval.tick() => {
                    let now = self.ctx.now();
                    if let Some(prev) = last_tick {
                        self.metrics.record_tick_latency(now.saturating_sub(prev));
                    }
                    last_tick = Some(now);
                    self.fan_out();
                }
            }
        }

        debug!("Broadcaster exiting");
        self.metrics.task_finished();
    }

    fn fan_out(&self) {
        let mut delivered = 0;
        let mut dropped = 0;
        for tx in &self.senders {
            match tx.try_send(()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(())) => dropped += 1,
                // Truck task already gone (shutting down)
                Err(TrySendError::Closed(())) => {}
            }
        }
        if dropped > 0 {
            trace!(dropped, "Tick skipped by busy trucks");
        }
        self.metrics.record_broadcast(delivered, dropped);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::TruckStatus;
    use orbit_core::geo;
    use orbit_core::{BoundingBox, Point};

    fn lifecycle_config() -> SimConfig {
        SimConfig {
            num_trucks: 5,
            seed: 99,
            speed_min: 5.0,
            speed_max: 5.0,
            tick_interval: Duration::from_millis(20),
            start_points: vec![Point::new(0.0, 0.0)],
            end_points: vec![Point::new(1.0, 1.0)],
            ..Default::default()
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_lifecycle_start_stop() {
        let config = lifecycle_config();
        let manager = SimulationManager::new(config.clone());
        let shutdown = ShutdownSignal::new();

        manager.start(&shutdown).await.unwrap();
        assert!(manager.started());

        tokio::time::sleep(config.tick_interval * 3).await;
        manager.stop().await;
        assert!(!manager.started());

        let snapshot = manager.snapshot();
        tokio::time::sleep(config.tick_interval * 2).await;
        let snapshot_after = manager.snapshot();

        assert_eq!(snapshot.len(), 5);
        assert_eq!(snapshot, snapshot_after);
        assert_eq!(manager.metrics().active_tasks(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_update_frequency() {
        let config = SimConfig {
            num_trucks: 1,
            seed: 123,
            speed_min: 1.0,
            speed_max: 1.0,
            tick_interval: Duration::from_millis(30),
            start_points: vec![Point::new(0.0, 0.0)],
            end_points: vec![Point::new(10.0, 0.0)],
            ..Default::default()
        };
        let manager = SimulationManager::new(config.clone());
        manager.start(&ShutdownSignal::new()).await.unwrap();

        let initial = manager.snapshot()[0].clone();
        let expected = config.tick_interval.as_secs_f64() * initial.speed * 3.0;

        tokio::time::sleep(config.tick_interval * 3 + Duration::from_millis(10)).await;
        let updated = manager.snapshot()[0].clone();
        manager.stop().await;

        let travelled = geo::distance(initial.position(), updated.position());
        assert!(
            travelled >= expected * 0.8,
            "truck did not advance at expected frequency: moved {travelled:.4}m want at least {:.4}m",
            expected * 0.8
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_deterministic_seeding_and_state_mutation() {
        let config = SimConfig {
            num_trucks: 3,
            seed: 7,
            speed_min: 2.0,
            speed_max: 2.0,
            tick_interval: Duration::from_millis(200),
            start_points: vec![Point::new(10.0, 10.0), Point::new(20.0, 20.0)],
            end_points: vec![Point::new(15.0, 15.0)],
            ..Default::default()
        };
        let manager1 = SimulationManager::new(config.clone());
        let manager2 = SimulationManager::new(config.clone());
        manager1.start(&ShutdownSignal::new()).await.unwrap();
        manager2.start(&ShutdownSignal::new()).await.unwrap();

        let snap1 = manager1.snapshot();
        let snap2 = manager2.snapshot();
        assert_eq!(snap1, snap2);

        tokio::time::sleep(config.tick_interval + Duration::from_millis(20)).await;
        let after = manager1.snapshot();
        manager1.stop().await;
        manager2.stop().await;

        assert!(
            snap1.iter().zip(&after).any(|(a, b)| a.position() != b.position()),
            "expected trucks to mutate state after a tick"
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_route_loops_back_to_start() {
        let config = SimConfig {
            num_trucks: 1,
            seed: 5,
            speed_min: 200.0,
            speed_max: 200.0,
            waypoints_per_route: 2,
            loop_routes: true,
            tick_interval: Duration::from_millis(50),
            start_points: vec![Point::new(0.0, 0.0)],
            end_points: vec![Point::new(0.0, 0.001)],
            ..Default::default()
        };
        let manager = SimulationManager::new(config);
        manager.start(&ShutdownSignal::new()).await.unwrap();
        let origin = Point::new(0.0, 0.0);

        // Wait until the truck has left the start, then until it comes back
        let mut left_start = false;
        let deadline = Instant::now() + Duration::from_secs(4);
        loop {
            let truck = manager.snapshot()[0].clone();
            let from_start = geo::distance(origin, truck.position());
            if from_start > 50.0 {
                left_start = true;
            } else if left_start && from_start < 30.0 {
                break;
            }
            assert!(
                Instant::now() < deadline,
                "expected truck to loop back near start, distance {from_start:.2}"
            );
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        manager.stop().await;
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let manager = SimulationManager::new(lifecycle_config());
        let shutdown = ShutdownSignal::new();

        manager.start(&shutdown).await.unwrap();
        let before = manager.snapshot();
        assert!(matches!(manager.start(&shutdown).await, Err(SimError::AlreadyStarted)));
        assert!(manager.started());
        assert_eq!(manager.snapshot().len(), before.len());

        manager.stop().await;
        manager.stop().await;
        assert!(!manager.started());

        // A stopped manager can be started again
        manager.start(&shutdown).await.unwrap();
        manager.stop().await;
    }

    #[tokio::test]
    async fn test_reconfigure_requires_running() {
        let manager = SimulationManager::new(lifecycle_config());

        assert!(matches!(
            manager.apply_config(SimConfig::default()).await,
            Err(SimError::NotStarted)
        ));
        assert!(matches!(
            manager.apply_update(ConfigUpdate::default()).await,
            Err(SimError::NotStarted)
        ));
        assert!(!manager.started());
        assert!(manager.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_apply_update_restarts_with_merged_config() {
        let config = lifecycle_config();
        let manager = SimulationManager::new(config.clone());
        manager.start(&ShutdownSignal::new()).await.unwrap();

        let bbox = BoundingBox::new(0.0, 1.0, 0.0, 1.0);
        let applied = manager
            .apply_update(ConfigUpdate {
                num_trucks: Some(8),
                tick_interval: Some(Duration::from_millis(40)),
                bounding_box: Some(bbox),
            })
            .await
            .unwrap();

        assert!(manager.started());
        assert_eq!(applied.num_trucks, 8);
        assert_eq!(applied.tick_interval, Duration::from_millis(40));
        assert_eq!(applied.route_bounds, vec![bbox]);
        assert_eq!(applied.seed, config.seed);
        assert_eq!(manager.current_config(), applied);
        assert_eq!(manager.initial_config(), config.clone().normalized());
        assert_eq!(manager.snapshot().len(), 8);

        manager.stop().await;
    }

    #[tokio::test]
    async fn test_apply_config_reseeds_and_normalizes() {
        let config = SimConfig {
            tick_interval: Duration::from_millis(500),
            ..lifecycle_config()
        };
        let manager = SimulationManager::new(config.clone());
        manager.start(&ShutdownSignal::new()).await.unwrap();
        let first = manager.snapshot();

        let applied = manager
            .apply_config(SimConfig {
                tick_interval: Duration::ZERO,
                ..config.clone()
            })
            .await
            .unwrap();
        let restarted = manager.snapshot();
        manager.stop().await;

        // Interval normalized, fleet rebuilt from the same seed
        assert_eq!(applied.tick_interval, Duration::from_secs(1));
        assert_eq!(first, restarted);
    }

    #[tokio::test]
    async fn test_parent_shutdown_stops_tasks() {
        let manager = SimulationManager::new(lifecycle_config());
        let shutdown = ShutdownSignal::new();
        manager.start(&shutdown).await.unwrap();

        shutdown.trigger();
        assert!(!manager.started());
        assert!(matches!(
            manager.apply_update(ConfigUpdate::default()).await,
            Err(SimError::NotStarted)
        ));

        // Tasks wind down on their own; wait for the gauge to drain
        let deadline = Instant::now() + Duration::from_secs(2);
        while manager.metrics().active_tasks() > 0 {
            assert!(Instant::now() < deadline, "tasks did not exit after parent shutdown");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        // A fresh signal starts a new run
        let restart = ShutdownSignal::new();
        manager.start(&restart).await.unwrap();
        assert!(manager.started());
        assert_eq!(manager.metrics().active_tasks(), 6);
        manager.stop().await;
        assert!(!manager.started());
        assert_eq!(manager.metrics().active_tasks(), 0);
    }

    #[test]
    fn test_fan_out_drops_ticks_for_busy_trucks() {
        let metrics = Arc::new(SimMetrics::new());
        let (tx, mut rx) = mpsc::channel(1);
        let broadcaster = Broadcaster {
            ctx: TokioContext::shared(),
            metrics: Arc::clone(&metrics),
            senders: vec![tx],
            shutdown: ShutdownSignal::new(),
            period: Duration::from_millis(10),
        };

        // Receiver never drains: only the first tick fits in the queue
        for _ in 0..3 {
            broadcaster.fan_out();
        }
        let snap = metrics.snapshot();
        assert_eq!(snap.ticks_broadcast, 3);
        assert_eq!(snap.ticks_delivered, 1);
        assert_eq!(snap.ticks_dropped, 2);

        // Draining frees the slot for the next tick
        assert!(rx.try_recv().is_ok());
        broadcaster.fan_out();
        assert_eq!(metrics.snapshot().ticks_delivered, 2);

        // Gone trucks count as neither
        drop(rx);
        broadcaster.fan_out();
        let snap = metrics.snapshot();
        assert_eq!((snap.ticks_delivered, snap.ticks_dropped), (2, 2));
        assert_eq!(snap.ticks_broadcast, 5);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_metrics_recorded() {
        let manager = SimulationManager::new(lifecycle_config());
        manager.start(&ShutdownSignal::new()).await.unwrap();
        assert_eq!(manager.metrics().active_tasks(), 6);

        tokio::time::sleep(Duration::from_millis(110)).await;
        manager.stop().await;

        let snap = manager.metrics().snapshot();
        assert!(snap.ticks_broadcast >= 2);
        assert!(snap.update_duration.count >= 1);
        assert!(snap.tick_latency.count >= 1);
        // Trucks shutting down mid fan-out are neither delivered nor dropped
        assert!(snap.ticks_delivered + snap.ticks_dropped <= snap.ticks_broadcast * 5);
        assert!(snap.ticks_delivered >= 1);
        assert_eq!(snap.active_tasks, 0);
    }

    #[tokio::test]
    async fn test_idle_fleet_reports_idle() {
        let p = Point::new(3.0, 3.0);
        let manager = SimulationManager::new(SimConfig {
            num_trucks: 2,
            tick_interval: Duration::from_millis(10),
            start_points: vec![p],
            end_points: vec![p],
            ..Default::default()
        });
        manager.start(&ShutdownSignal::new()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        manager.stop().await;

        for truck in manager.snapshot() {
            assert_eq!(truck.status, TruckStatus::Idle);
            assert_eq!(truck.position(), p);
        }
    }
}
