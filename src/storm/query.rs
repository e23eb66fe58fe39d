use crate::storm::images::{ImageRefs, ImageResolver};
use crate::storm::record::{EVENT_ID_FIELD, EventRecord};
use crate::storm::store::{Direction, Filter, RecordStore, SortSpec, Stage};
use anyhow::Result;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Serialize)]
pub struct EnrichedRecord {
    #[serde(flatten)]
    pub record: EventRecord,
    pub images: ImageRefs,
}

/// Latest known identity of one event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventSummary {
    #[serde(rename = "id")]
    pub event_id: Option<String>,
    pub name: Option<String>,
    pub images: ImageRefs,
}

/// Newest snapshot first, first name per event, then alphabetical by name.
pub fn unique_events_pipeline() -> Vec<Stage> {
    vec![
        Stage::Sort {
            field: "snapshot_timestamp".to_string(),
            direction: Direction::Descending,
        },
        Stage::GroupFirst {
            by: EVENT_ID_FIELD.to_string(),
            fields: vec!["name".to_string(), EVENT_ID_FIELD.to_string()],
        },
        Stage::Project(vec![EVENT_ID_FIELD.to_string(), "name".to_string()]),
        Stage::Sort {
            field: "name".to_string(),
            direction: Direction::Ascending,
        },
    ]
}

/// Read side over a record store, enriching every result with image links.
pub struct EventQuery<'a> {
    store: &'a dyn RecordStore,
    images: &'a ImageResolver,
}

impl<'a> EventQuery<'a> {
    pub fn new(store: &'a dyn RecordStore, images: &'a ImageResolver) -> Self {
        Self { store, images }
    }

    fn enrich(&self, records: Vec<EventRecord>) -> Vec<EnrichedRecord> {
        records
            .into_iter()
            .map(|record| {
                let images = self.images.for_record(&record);
                EnrichedRecord { record, images }
            })
            .collect()
    }

    pub fn list_all_snapshots(&self) -> Result<Vec<EnrichedRecord>> {
        let records = self
            .store
            .find(&Filter::All, SortSpec::by_snapshot(Direction::Ascending))?;
        Ok(self.enrich(records))
    }

    /// Every capture of one event, oldest first. Unknown ids give an empty list.
    pub fn get_event_history(&self, event_id: &str) -> Result<Vec<EnrichedRecord>> {
        let records = self.store.find(
            &Filter::EventId(event_id.to_string()),
            SortSpec::by_snapshot(Direction::Ascending),
        )?;
        Ok(self.enrich(records))
    }

    pub fn latest_record(&self, event_id: &str) -> Result<Option<EventRecord>> {
        let records = self.store.find(
            &Filter::EventId(event_id.to_string()),
            SortSpec::by_snapshot(Direction::Descending),
        )?;
        Ok(records.into_iter().next())
    }

    pub fn list_unique_events(&self) -> Result<Vec<EventSummary>> {
        let grouped = self.store.aggregate(&unique_events_pipeline())?;
        Ok(grouped
            .into_iter()
            .map(|doc| {
                let event_id = doc.get(EVENT_ID_FIELD).and_then(Value::as_str).map(String::from);
                let name = doc.get("name").and_then(Value::as_str).map(String::from);
                // Summaries carry no record key, so there is no snapshot to look in.
                let images = self.images.resolve(event_id.as_deref(), None, None);
                EventSummary {
                    event_id,
                    name,
                    images,
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storm::config::{ImagesConfig, IngestConfig};
    use crate::storm::record::parse_snapshot_id;
    use crate::storm::store::MemoryRecordStore;
    use serde_json::json;
    use std::fs;
    use tempfile::tempdir;

    fn record(id: &str, name: &str, snapshot: &str) -> EventRecord {
        let doc = json!({"id": id, "name": name})
            .as_object()
            .cloned()
            .expect("object");
        EventRecord::from_source(doc, snapshot, parse_snapshot_id(snapshot).expect("ts"), None, "t")
            .expect("record")
    }

    fn seeded_store() -> MemoryRecordStore {
        let store = MemoryRecordStore::new();
        for rec in [
            record("AL13", "THIRTEEN", "2025-10-29_00-00-00"),
            record("AL13", "MELISSA", "2025-10-31_00-00-00"),
            record("AL13", "MELISSA", "2025-10-30_00-00-00"),
            record("EP92", "INVEST", "2025-10-30_12-00-00"),
        ] {
            store.upsert(&rec).expect("upsert");
        }
        store
    }

    fn resolver(root: &std::path::Path) -> ImageResolver {
        ImageResolver::new(root, &IngestConfig::default(), &ImagesConfig::default())
    }

    #[test]
    fn history_is_sorted_by_snapshot() {
        let tmp = tempdir().expect("tempdir");
        let store = seeded_store();
        let images = resolver(tmp.path());
        let query = EventQuery::new(&store, &images);

        let history = query.get_event_history("AL13").expect("history");
        let stamps = history
            .iter()
            .map(|r| r.record.snapshot_timestamp)
            .collect::<Vec<_>>();
        assert_eq!(stamps.len(), 3);
        assert!(stamps.windows(2).all(|w| w[0] <= w[1]));

        assert!(query.get_event_history("NOPE").expect("empty").is_empty());
    }

    #[test]
    fn all_snapshots_are_sorted_across_events() {
        let tmp = tempdir().expect("tempdir");
        let store = seeded_store();
        let images = resolver(tmp.path());
        let all = EventQuery::new(&store, &images)
            .list_all_snapshots()
            .expect("all");
        assert_eq!(all.len(), 4);
        assert_eq!(all[0].record.name(), Some("THIRTEEN"));
        assert_eq!(all[3].record.snapshot_id.as_deref(), Some("2025-10-31_00-00-00"));
    }

    #[test]
    fn unique_events_report_latest_name_sorted_by_name() {
        let tmp = tempdir().expect("tempdir");
        let store = seeded_store();
        let images = resolver(tmp.path());
        let unique = EventQuery::new(&store, &images)
            .list_unique_events()
            .expect("unique");

        assert_eq!(
            unique
                .iter()
                .map(|s| (s.event_id.as_deref(), s.name.as_deref()))
                .collect::<Vec<_>>(),
            vec![(Some("EP92"), Some("INVEST")), (Some("AL13"), Some("MELISSA"))]
        );
        assert!(unique.iter().all(|s| s.images == ImageRefs::default()));
    }

    #[test]
    fn rename_between_snapshots_surfaces_newest_name() {
        let tmp = tempdir().expect("tempdir");
        let store = MemoryRecordStore::new();
        store
            .upsert(&record("AL01", "A", "2025-10-01_00-00-00"))
            .expect("u");
        store
            .upsert(&record("AL01", "B", "2025-10-02_00-00-00"))
            .expect("u");
        let images = resolver(tmp.path());
        let unique = EventQuery::new(&store, &images)
            .list_unique_events()
            .expect("unique");
        assert_eq!(unique.len(), 1);
        assert_eq!(unique[0].name.as_deref(), Some("B"));
    }

    #[test]
    fn records_are_enriched_and_serialized_flat() {
        let tmp = tempdir().expect("tempdir");
        let maps = tmp.path().join("2025-10-31_00-00-00/maps_generated");
        fs::create_dir_all(&maps).expect("mkdir");
        fs::write(maps.join("Forecast_AL13.png"), b"png").expect("write");

        let store = seeded_store();
        let images = resolver(tmp.path());
        let query = EventQuery::new(&store, &images);
        let history = query.get_event_history("AL13").expect("history");

        let latest = serde_json::to_value(&history[2]).expect("json");
        assert_eq!(latest["id"], "AL13");
        assert_eq!(latest["snapshot_timestamp"], "2025-10-31T00:00:00");
        assert_eq!(
            latest["images"]["forecast"],
            "/api/maps/2025-10-31_00-00-00/maps_generated/Forecast_AL13.png"
        );
        assert_eq!(latest["images"]["model"], Value::Null);

        let older = serde_json::to_value(&history[0]).expect("json");
        assert_eq!(older["images"]["forecast"], Value::Null);
    }

    #[test]
    fn latest_record_picks_newest_snapshot() {
        let tmp = tempdir().expect("tempdir");
        let store = seeded_store();
        let images = resolver(tmp.path());
        let query = EventQuery::new(&store, &images);
        let latest = query.latest_record("AL13").expect("q").expect("some");
        assert_eq!(latest.snapshot_id.as_deref(), Some("2025-10-31_00-00-00"));
        assert!(query.latest_record("ZZ").expect("q").is_none());
    }
}
