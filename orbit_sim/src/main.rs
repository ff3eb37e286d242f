//! Orbit fleet simulator CLI
//!
//! Runs a fleet simulation, reports fleet and timing statistics, and
//! optionally records the run to a JSON file.

use clap::Parser;
use orbit_core::{BoundingBox, SimMetrics};
use orbit_env::{OrbitContext, ShutdownSignal, TokioContext};
use orbit_sim::{
    parse_bounding_box, FleetFrame, SimConfig, SimError, SimEvent, SimExport, SimulationManager,
    TruckStatus,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "orbit-sim")]
#[command(about = "Run a concurrent fleet simulation", long_about = None)]
struct Args {
    /// JSON configuration file; flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of trucks (0 = default of 2000)
    #[arg(short, long, env = "ORBIT_TRUCKS")]
    trucks: Option<usize>,

    /// Master seed for determinism (0 = default of 42)
    #[arg(short, long)]
    seed: Option<u64>,

    /// Tick interval in milliseconds
    #[arg(long, env = "ORBIT_TICK_MS")]
    tick_ms: Option<u64>,

    /// Region for intermediate waypoints: minLat,minLon,maxLat,maxLon
    #[arg(long, env = "ORBIT_BOUNDING_BOX", value_parser = parse_bounding_box)]
    bounding_box: Option<BoundingBox>,

    /// Waypoints per route, including start and end
    #[arg(short, long)]
    waypoints: Option<usize>,

    /// Repeat each route instead of reshuffling it
    #[arg(long)]
    loop_routes: bool,

    /// Minimum truck speed in m/s
    #[arg(long)]
    speed_min: Option<f64>,

    /// Maximum truck speed in m/s
    #[arg(long)]
    speed_max: Option<f64>,

    /// Run time in seconds (0 = until Ctrl-C)
    #[arg(short, long, default_value = "0")]
    duration: f64,

    /// Seconds between fleet reports
    #[arg(long, default_value = "5")]
    report_every: u64,

    /// Record fleet frames to a JSON file
    #[arg(long)]
    export: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON summary on stdout
    #[arg(long)]
    json: bool,
}

impl Args {
    /// Loads the base configuration and applies flag overrides.
    fn sim_config(&self) -> Result<SimConfig, SimError> {
        let mut config = match &self.config {
            Some(path) => SimConfig::from_json_file(path)?,
            None => SimConfig::default(),
        };

        if let Some(n) = self.trucks {
            config.num_trucks = n;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(ms) = self.tick_ms {
            config.tick_interval = Duration::from_millis(ms);
        }
        if let Some(bbox) = self.bounding_box {
            config.route_bounds = vec![bbox];
        }
        if let Some(k) = self.waypoints {
            config.waypoints_per_route = k;
        }
        if self.loop_routes {
            config.loop_routes = true;
        }
        if let Some(v) = self.speed_min {
            config.speed_min = v;
        }
        if let Some(v) = self.speed_max {
            config.speed_max = v;
        }

        Ok(config.normalized())
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize logging; RUST_LOG wins over --verbose
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("❌ {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), SimError> {
    let config = args.sim_config()?;

    info!("Orbit fleet simulator v{}", env!("CARGO_PKG_VERSION"));
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let ctx = TokioContext::shared();
    let manager = SimulationManager::with_context(Arc::clone(&ctx), config, Arc::new(SimMetrics::new()));
    let shutdown = ShutdownSignal::new();
    manager.start(&shutdown).await?;

    let mut export = args
        .export
        .as_ref()
        .map(|_| SimExport::new(&manager.current_config()));

    let started = Instant::now();
    let mut report = tokio::time::interval(Duration::from_secs(args.report_every.max(1)));

    let run_for = (args.duration > 0.0).then(|| Duration::from_secs_f64(args.duration));
    let deadline = async move {
        match run_for {
            Some(d) => ctx.sleep(d).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let reason = loop {
        tokio::select! {
            _ = &mut deadline => break "duration elapsed",
            res = &mut ctrl_c => {
                if let Err(e) = res {
                    warn!(error = %e, "Failed to listen for Ctrl-C");
                }
                break "interrupted";
            }
            _ = report.tick() => {
                report_fleet(&manager);
                if let Some(export) = export.as_mut() {
                    export.add_frame(FleetFrame::new(
                        started.elapsed().as_secs_f64(),
                        manager.snapshot(),
                    ));
                }
            }
        }
    };

    info!(reason, "Stopping simulation");
    shutdown.trigger();
    manager.stop().await;
    report_fleet(&manager);

    let metrics = manager.metrics().snapshot();

    if let (Some(path), Some(mut export)) = (args.export.as_ref(), export) {
        export.add_frame(
            FleetFrame::new(started.elapsed().as_secs_f64(), manager.snapshot())
                .with_event(SimEvent::info(format!("stopped: {reason}"))),
        );
        export.finalize(metrics.clone());
        export.write_to_file(path)?;
        info!("Exported {} frames to {}", export.frames.len(), path.display());
    }

    if args.json {
        let trucks = manager.snapshot();
        let idle = trucks.iter().filter(|t| t.status == TruckStatus::Idle).count();
        let summary = serde_json::json!({
            "config": manager.current_config(),
            "elapsed_secs": started.elapsed().as_secs_f64(),
            "trucks": trucks.len(),
            "enroute": trucks.len() - idle,
            "idle": idle,
            "metrics": metrics,
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }

    Ok(())
}

/// Logs fleet status counts and timing metrics.
fn report_fleet(manager: &SimulationManager) {
    let trucks = manager.snapshot();
    let idle = trucks.iter().filter(|t| t.status == TruckStatus::Idle).count();
    let metrics = manager.metrics().snapshot();

    info!(
        trucks = trucks.len(),
        enroute = trucks.len() - idle,
        idle,
        active_tasks = metrics.active_tasks,
        "Fleet status"
    );
    info!(
        tick_mean_ms = metrics.tick_latency.mean_secs() * 1000.0,
        tick_max_ms = metrics.tick_latency.max_secs * 1000.0,
        update_mean_us = metrics.update_duration.mean_secs() * 1e6,
        ticks = metrics.ticks_broadcast,
        dropped = metrics.ticks_dropped,
        "Timing"
    );
}
