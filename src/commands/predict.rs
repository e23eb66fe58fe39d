use anyhow::Result;

use crate::commands::CommandReport;
use crate::error::StormError;
use crate::storm::audit;
use crate::storm::config::load_config;
use crate::storm::file_store::FileRecordStore;
use crate::storm::images::ImageResolver;
use crate::storm::paths::resolve_paths;
use crate::storm::prediction::generate_projection;
use crate::storm::query::EventQuery;
use crate::storm::render::{GeoJsonRenderer, TrackRenderer};

#[derive(Debug, Clone, Default)]
pub struct PredictOptions {
    pub event_id: String,
    pub hours: Option<u32>,
    pub no_render: bool,
}

pub fn run(opts: &PredictOptions) -> Result<CommandReport> {
    let paths = resolve_paths()?;
    let cfg = load_config()?;
    let mut report = CommandReport::new("predict");

    let horizon = opts.hours.unwrap_or(cfg.projection.default_horizon_hours);
    report.detail(format!("event_id={}", opts.event_id));
    report.detail(format!("horizon_hours={horizon}"));

    let store = FileRecordStore::open(&paths.store_dir)?;
    let images = ImageResolver::new(&paths.data_dir, &cfg.ingest, &cfg.images);
    let events = EventQuery::new(&store, &images);
    let geojson = GeoJsonRenderer::new(&paths.predictions_dir, &cfg.projection.artifact_url_prefix);
    let renderer: Option<&dyn TrackRenderer> = if opts.no_render {
        None
    } else {
        Some(&geojson)
    };

    let projection = match generate_projection(
        &events,
        &opts.event_id,
        horizon,
        cfg.projection.window,
        renderer,
    ) {
        Ok(projection) => projection,
        Err(err) => {
            let Some(storm_err) = err.downcast_ref::<StormError>() else {
                return Err(err);
            };
            let message = format!("{}: {storm_err}", storm_err.kind());
            audit::append_event(
                &paths,
                "predict",
                "failed",
                &format!("event={} {message}", opts.event_id),
            )?;
            report.issue(message);
            return Ok(report);
        }
    };

    report.detail(format!("history_points={}", projection.history_points));
    report.detail(format!("projected_points={}", projection.points.len()));
    if let Some(snapshot) = &projection.snapshot_id {
        report.detail(format!("snapshot_id={snapshot}"));
    }
    let artifact = projection.artifact_reference.as_deref().unwrap_or("none");
    report.detail(format!("artifact={artifact}"));

    let status = if !opts.no_render && projection.artifact_reference.is_none() {
        "degraded"
    } else {
        "ok"
    };
    audit::append_event(
        &paths,
        "predict",
        status,
        &format!(
            "event={} points={} artifact={artifact}",
            opts.event_id,
            projection.points.len()
        ),
    )?;

    report.set_data(&projection)?;
    Ok(report)
}
