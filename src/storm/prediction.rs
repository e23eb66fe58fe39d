use crate::error::StormError;
use crate::storm::projector::{ProjectedPoint, project_with_window};
use crate::storm::query::EventQuery;
use crate::storm::record::sort_track;
use crate::storm::render::TrackRenderer;
use crate::storm::warn::{self, WarnEvent};
use anyhow::Result;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct ProjectionReport {
    pub event_id: String,
    pub name: Option<String>,
    pub snapshot_id: Option<String>,
    pub horizon_hours: u32,
    pub history_points: usize,
    pub points: Vec<ProjectedPoint>,
    pub artifact_reference: Option<String>,
}

/// Project the newest recorded track of `event_id` and hand it to `renderer`.
///
/// Lookup and projection failures are returned as [`StormError`] inside the
/// `anyhow` error. A failed render only drops the artifact reference.
pub fn generate_projection(
    query: &EventQuery<'_>,
    event_id: &str,
    horizon_hours: u32,
    window: usize,
    renderer: Option<&dyn TrackRenderer>,
) -> Result<ProjectionReport> {
    let Some(record) = query.latest_record(event_id)? else {
        return Err(StormError::NotFound(format!("no records for event {event_id}")).into());
    };

    let mut history = record.history()?;
    sort_track(&mut history);
    let points = project_with_window(&history, horizon_hours, window)?;

    let artifact_reference = match renderer {
        None => None,
        Some(renderer) => match renderer.render(&history, &points, event_id) {
            Ok(reference) => Some(reference),
            Err(err) => {
                warn::emit(WarnEvent {
                    code: "RENDER_FAILED",
                    stage: "predict",
                    action: "render-artifact",
                    target: event_id,
                    reason: "renderer-error",
                    err: &format!("{err:#}"),
                });
                None
            }
        },
    };

    Ok(ProjectionReport {
        event_id: event_id.to_string(),
        name: record.name().map(String::from),
        snapshot_id: record.snapshot_id.clone(),
        horizon_hours,
        history_points: history.len(),
        points,
        artifact_reference,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storm::config::{ImagesConfig, IngestConfig};
    use crate::storm::images::ImageResolver;
    use crate::storm::projector::{DEFAULT_WINDOW, ProjectedPoint};
    use crate::storm::record::{EventRecord, TrackPoint, parse_snapshot_id};
    use crate::storm::store::{MemoryRecordStore, RecordStore};
    use anyhow::anyhow;
    use serde_json::json;
    use std::cell::Cell;
    use tempfile::tempdir;

    fn store_with(history: serde_json::Value) -> MemoryRecordStore {
        let store = MemoryRecordStore::new();
        let older = json!({"id": "AL13", "name": "THIRTEEN", "history": []});
        let newer = json!({"id": "AL13", "name": "MELISSA", "history": history});
        for (doc, snap) in [(older, "2025-10-30_00-00-00"), (newer, "2025-10-31_00-00-00")] {
            let rec = EventRecord::from_source(
                doc.as_object().cloned().expect("object"),
                snap,
                parse_snapshot_id(snap).expect("ts"),
                None,
                "t",
            )
            .expect("record");
            store.upsert(&rec).expect("upsert");
        }
        store
    }

    fn unordered_track() -> serde_json::Value {
        json!([
            {"time": "2025-10-30 06:00:00", "lat": 11.2, "lon": -52.0},
            {"time": "2025-10-30 00:00:00", "lat": 10.0, "lon": -50.0},
        ])
    }

    struct RecordingRenderer {
        calls: Cell<usize>,
        fail: bool,
    }

    impl TrackRenderer for RecordingRenderer {
        fn render(
            &self,
            history: &[TrackPoint],
            projected: &[ProjectedPoint],
            event_id: &str,
        ) -> Result<String> {
            self.calls.set(self.calls.get() + 1);
            assert!(history.windows(2).all(|w| w[0].time <= w[1].time));
            if self.fail {
                return Err(anyhow!("disk full"));
            }
            Ok(format!("mem://{event_id}/{}", projected.len()))
        }
    }

    fn resolver() -> ImageResolver {
        let tmp = tempdir().expect("tempdir");
        ImageResolver::new(tmp.path(), &IngestConfig::default(), &ImagesConfig::default())
    }

    #[test]
    fn uses_latest_snapshot_and_sorted_history() {
        let store = store_with(unordered_track());
        let images = resolver();
        let query = EventQuery::new(&store, &images);
        let renderer = RecordingRenderer {
            calls: Cell::new(0),
            fail: false,
        };

        let report =
            generate_projection(&query, "AL13", 5, DEFAULT_WINDOW, Some(&renderer)).expect("ok");
        assert_eq!(report.snapshot_id.as_deref(), Some("2025-10-31_00-00-00"));
        assert_eq!(report.name.as_deref(), Some("MELISSA"));
        assert_eq!(report.points.len(), 5);
        assert_eq!(report.history_points, 2);
        assert_eq!(report.artifact_reference.as_deref(), Some("mem://AL13/5"));
        assert_eq!(renderer.calls.get(), 1);
    }

    #[test]
    fn unknown_event_is_not_found() {
        let store = store_with(unordered_track());
        let images = resolver();
        let query = EventQuery::new(&store, &images);
        let err = generate_projection(&query, "ZZ99", 5, DEFAULT_WINDOW, None).expect_err("nf");
        assert!(matches!(
            err.downcast_ref::<StormError>(),
            Some(StormError::NotFound(_))
        ));
    }

    #[test]
    fn short_history_is_surfaced() {
        let store = store_with(json!([{"time": "2025-10-30 00:00:00", "lat": 10.0, "lon": -50.0}]));
        let images = resolver();
        let query = EventQuery::new(&store, &images);
        let err = generate_projection(&query, "AL13", 5, DEFAULT_WINDOW, None).expect_err("short");
        assert!(matches!(
            err.downcast_ref::<StormError>(),
            Some(StormError::InsufficientHistory { points: 1 })
        ));
    }

    #[test]
    fn malformed_track_is_a_parse_error() {
        let store = store_with(json!([{"time": "yesterday", "lat": 10.0, "lon": -50.0}]));
        let images = resolver();
        let query = EventQuery::new(&store, &images);
        let err = generate_projection(&query, "AL13", 5, DEFAULT_WINDOW, None).expect_err("bad");
        assert!(matches!(
            err.downcast_ref::<StormError>(),
            Some(StormError::Parse { .. })
        ));
    }

    #[test]
    fn render_failure_keeps_points() {
        let store = store_with(unordered_track());
        let images = resolver();
        let query = EventQuery::new(&store, &images);
        let renderer = RecordingRenderer {
            calls: Cell::new(0),
            fail: true,
        };
        let report =
            generate_projection(&query, "AL13", 3, DEFAULT_WINDOW, Some(&renderer)).expect("ok");
        assert_eq!(report.points.len(), 3);
        assert!(report.artifact_reference.is_none());
    }
}
