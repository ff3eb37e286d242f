//! JSON exporter for fleet recordings.
//!
//! Collects periodic fleet snapshots during a run and writes them, together
//! with the final metrics, as a single JSON document.

use crate::config::SimConfig;
use crate::error::SimError;
use crate::registry::Truck;
use orbit_core::MetricsSnapshot;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// A single recorded frame of the fleet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetFrame {
    /// Seconds since the run started
    pub time_sec: f64,

    /// Every truck, ordered by id
    pub trucks: Vec<Truck>,

    /// Events (reconfiguration, shutdown, etc.)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<SimEvent>,
}

impl FleetFrame {
    pub fn new(time_sec: f64, trucks: Vec<Truck>) -> Self {
        Self {
            time_sec,
            trucks,
            events: Vec::new(),
        }
    }

    pub fn with_event(mut self, event: SimEvent) -> Self {
        self.events.push(event);
        self
    }
}

/// Simulation event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimEvent {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}

impl SimEvent {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level: Some("info".to_string()),
        }
    }
}

/// Complete recording of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimExport {
    /// Seed used
    pub seed: u64,

    pub num_trucks: usize,

    pub tick_interval_ms: u64,

    /// Time of the last recorded frame
    pub duration_sec: f64,

    /// All frames
    pub frames: Vec<FleetFrame>,

    /// Metrics at the end of the run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<MetricsSnapshot>,
}

impl SimExport {
    /// Creates an empty export for a run of `config`.
    pub fn new(config: &SimConfig) -> Self {
        Self {
            seed: config.seed,
            num_trucks: config.num_trucks,
            tick_interval_ms: u64::try_from(config.tick_interval.as_millis()).unwrap_or(u64::MAX),
            duration_sec: 0.0,
            frames: Vec::new(),
            metrics: None,
        }
    }

    /// Adds a frame.
    pub fn add_frame(&mut self, frame: FleetFrame) {
        self.duration_sec = frame.time_sec;
        self.frames.push(frame);
    }

    /// Attaches the final metrics.
    pub fn finalize(&mut self, metrics: MetricsSnapshot) {
        self.metrics = Some(metrics);
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<(), SimError> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::TruckStatus;
    use orbit_core::SimMetrics;
    use std::time::Duration;

    fn truck(id: &str) -> Truck {
        Truck {
            id: id.to_string(),
            lat: 1.5,
            lon: -2.5,
            speed: 12.0,
            current_route: "3.000,4.000".to_string(),
            status: TruckStatus::EnRoute,
        }
    }

    #[test]
    fn test_export_tracks_frames() {
        let config = SimConfig {
            num_trucks: 2,
            seed: 9,
            tick_interval: Duration::from_millis(250),
            ..Default::default()
        };
        let mut export = SimExport::new(&config);
        assert_eq!(export.tick_interval_ms, 250);

        export.add_frame(FleetFrame::new(0.0, vec![truck("entity-0001")]));
        export.add_frame(
            FleetFrame::new(2.5, vec![truck("entity-0001")]).with_event(SimEvent::info("stopped")),
        );

        assert_eq!(export.frames.len(), 2);
        assert_eq!(export.duration_sec, 2.5);
        assert!(export.metrics.is_none());

        export.finalize(SimMetrics::new().snapshot());
        assert_eq!(export.metrics.as_ref().map(|m| m.active_tasks), Some(0));
    }

    #[test]
    fn test_write_to_file() {
        let mut export = SimExport::new(&SimConfig::default());
        export.add_frame(FleetFrame::new(1.0, vec![truck("entity-0001"), truck("entity-0002")]));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fleet.json");
        export.write_to_file(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["seed"], 42);
        assert_eq!(value["frames"][0]["trucks"][1]["id"], "entity-0002");
        assert_eq!(value["frames"][0]["trucks"][0]["status"], "enroute");
        assert!(value["frames"][0].get("events").is_none());
        assert!(value.get("metrics").is_none());
    }

    #[test]
    fn test_write_to_missing_directory_fails() {
        let export = SimExport::new(&SimConfig::default());
        assert!(matches!(
            export.write_to_file("/nonexistent/dir/fleet.json"),
            Err(SimError::Io(_))
        ));
    }
}
