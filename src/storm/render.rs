use crate::storm::projector::ProjectedPoint;
use crate::storm::record::{TRACK_TIME_FORMAT, TrackPoint};
use crate::storm::util::{append_json_line, now_epoch_secs, sanitize_slug};
use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::{Value, json};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

const MAX_NAME_ATTEMPTS: u32 = 1000;

/// Turns a recorded track plus its projection into an artifact and returns a
/// reference (path or URL) to it. Receives the full, time-sorted history.
pub trait TrackRenderer {
    fn render(
        &self,
        history: &[TrackPoint],
        projected: &[ProjectedPoint],
        event_id: &str,
    ) -> Result<String>;
}

#[derive(Debug, Clone, Serialize)]
pub struct RenderLedgerEntry {
    pub event_id: String,
    pub artifact_path: String,
    pub history_points: usize,
    pub projected_points: usize,
    pub created_at_epoch_secs: u64,
}

/// Writes a GeoJSON `FeatureCollection` per projection into one directory.
#[derive(Debug, Clone)]
pub struct GeoJsonRenderer {
    output_dir: PathBuf,
    url_prefix: String,
}

impl GeoJsonRenderer {
    pub fn new(output_dir: &Path, url_prefix: &str) -> Self {
        Self {
            output_dir: output_dir.to_path_buf(),
            url_prefix: url_prefix.trim_end_matches('/').to_string(),
        }
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.output_dir.join("ledger.jsonl")
    }

    /// Claim `<stem>.geojson`, or `<stem>_2.geojson` and onward when taken.
    fn create_artifact(&self, stem: &str) -> Result<(File, String)> {
        fs::create_dir_all(&self.output_dir)
            .with_context(|| format!("failed to create {}", self.output_dir.display()))?;
        for attempt in 1..=MAX_NAME_ATTEMPTS {
            let file_name = if attempt == 1 {
                format!("{stem}.geojson")
            } else {
                format!("{stem}_{attempt}.geojson")
            };
            let path = self.output_dir.join(&file_name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok((file, file_name)),
                Err(err) if err.kind() == ErrorKind::AlreadyExists => continue,
                Err(err) => {
                    return Err(err).with_context(|| format!("failed to create {}", path.display()));
                }
            }
        }
        anyhow::bail!(
            "no free artifact name for {stem} in {}",
            self.output_dir.display()
        )
    }
}

pub fn feature_collection(
    history: &[TrackPoint],
    projected: &[ProjectedPoint],
    event_id: &str,
) -> Value {
    let history_line = history.iter().map(|p| json!([p.lon, p.lat])).collect::<Vec<_>>();
    let mut projected_line = history
        .last()
        .map(|p| vec![json!([p.lon, p.lat])])
        .unwrap_or_default();
    projected_line.extend(projected.iter().map(|p| json!([p.lon, p.lat])));

    let mut features = vec![
        json!({
            "type": "Feature",
            "properties": {"event_id": event_id, "kind": "history"},
            "geometry": {"type": "LineString", "coordinates": history_line},
        }),
        json!({
            "type": "Feature",
            "properties": {"event_id": event_id, "kind": "projection"},
            "geometry": {"type": "LineString", "coordinates": projected_line},
        }),
    ];
    features.extend(projected.iter().map(|p| {
        json!({
            "type": "Feature",
            "properties": {
                "event_id": event_id,
                "kind": "projected-step",
                "step": p.step,
                "time": p.time.format(TRACK_TIME_FORMAT).to_string(),
            },
            "geometry": {"type": "Point", "coordinates": [p.lon, p.lat]},
        })
    }));

    json!({"type": "FeatureCollection", "features": features})
}

impl TrackRenderer for GeoJsonRenderer {
    fn render(
        &self,
        history: &[TrackPoint],
        projected: &[ProjectedPoint],
        event_id: &str,
    ) -> Result<String> {
        let stamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
        let slug = sanitize_slug(event_id);
        let stem = if slug.is_empty() {
            format!("prediction_{stamp}")
        } else {
            format!("prediction_{slug}_{stamp}")
        };
        let (file, file_name) = self.create_artifact(&stem)?;
        let path = self.output_dir.join(&file_name);

        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &feature_collection(history, projected, event_id))?;
        writer.write_all(b"\n")?;
        writer
            .flush()
            .with_context(|| format!("failed to write {}", path.display()))?;
        append_json_line(
            &self.ledger_path(),
            &RenderLedgerEntry {
                event_id: event_id.to_string(),
                artifact_path: path.display().to_string(),
                history_points: history.len(),
                projected_points: projected.len(),
                created_at_epoch_secs: now_epoch_secs()?,
            },
        )?;

        Ok(format!("{}/{}", self.url_prefix, file_name))
    }
}
