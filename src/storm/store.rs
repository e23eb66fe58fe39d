use crate::storm::record::{EVENT_ID_FIELD, EventRecord};
use anyhow::{Result, anyhow};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Replaced,
    Unchanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

impl Direction {
    fn apply(self, ord: Ordering) -> Ordering {
        match self {
            Self::Ascending => ord,
            Self::Descending => ord.reverse(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    All,
    EventId(String),
}

impl Filter {
    pub fn matches(&self, record: &EventRecord) -> bool {
        match self {
            Self::All => true,
            Self::EventId(id) => record.event_id() == Some(id.as_str()),
        }
    }

    fn matches_value(&self, doc: &Value) -> bool {
        match self {
            Self::All => true,
            Self::EventId(id) => doc.get(EVENT_ID_FIELD).and_then(Value::as_str) == Some(id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    SnapshotTimestamp,
    RecordKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortSpec {
    pub field: SortField,
    pub direction: Direction,
}

impl SortSpec {
    pub fn by_snapshot(direction: Direction) -> Self {
        Self {
            field: SortField::SnapshotTimestamp,
            direction,
        }
    }
}

/// Aggregation stages, evaluated in order over stored documents.
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Match(Filter),
    Sort {
        field: String,
        direction: Direction,
    },
    /// Group on `by` and keep, per group, the first value of each of `fields`
    /// in the current document order. The group key lands in `_id`.
    GroupFirst {
        by: String,
        fields: Vec<String>,
    },
    Project(Vec<String>),
}

/// Document persistence keyed by `record_key`.
///
/// Implementations provide per-document atomicity and serialize concurrent
/// upserts of the same key (last writer wins).
pub trait RecordStore: Send + Sync {
    /// Insert, or replace wholesale, the record with the same `record_key`.
    fn upsert(&self, record: &EventRecord) -> Result<UpsertOutcome>;

    /// Every stored record, in no particular order.
    fn scan(&self) -> Result<Vec<EventRecord>>;

    fn find(&self, filter: &Filter, sort: SortSpec) -> Result<Vec<EventRecord>> {
        let mut out = self
            .scan()?
            .into_iter()
            .filter(|r| filter.matches(r))
            .collect::<Vec<_>>();
        sort_records(&mut out, sort);
        Ok(out)
    }

    fn aggregate(&self, pipeline: &[Stage]) -> Result<Vec<Value>> {
        let mut records = self.scan()?;
        sort_records(&mut records, SortSpec {
            field: SortField::RecordKey,
            direction: Direction::Ascending,
        });
        let docs = records
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(run_pipeline(docs, pipeline))
    }

    fn count(&self) -> Result<usize> {
        Ok(self.scan()?.len())
    }
}

pub fn sort_records(records: &mut [EventRecord], sort: SortSpec) {
    records.sort_by(|a, b| {
        let ord = match sort.field {
            SortField::SnapshotTimestamp => a
                .snapshot_timestamp
                .cmp(&b.snapshot_timestamp)
                .then_with(|| a.record_key.cmp(&b.record_key)),
            SortField::RecordKey => a.record_key.cmp(&b.record_key),
        };
        sort.direction.apply(ord)
    });
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order over JSON values: null < bool < number < string < array < object.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.total_cmp(&y)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => type_rank(a)
            .cmp(&type_rank(b))
            .then_with(|| a.to_string().cmp(&b.to_string())),
    }
}

fn field_path<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    let mut cursor = doc;
    for part in path.split('.') {
        cursor = cursor.get(part)?;
    }
    Some(cursor)
}

fn group_first(docs: Vec<Value>, by: &str, fields: &[String]) -> Vec<Value> {
    let mut groups: Vec<Map<String, Value>> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for doc in docs {
        let key = field_path(&doc, by).cloned().unwrap_or(Value::Null);
        let slot = key.to_string();
        if index.contains_key(&slot) {
            continue;
        }

        let mut out = Map::new();
        out.insert("_id".to_string(), key);
        for field in fields {
            let value = field_path(&doc, field).cloned().unwrap_or(Value::Null);
            out.insert(field.clone(), value);
        }
        index.insert(slot, groups.len());
        groups.push(out);
    }

    groups.into_iter().map(Value::Object).collect()
}

pub fn run_pipeline(mut docs: Vec<Value>, pipeline: &[Stage]) -> Vec<Value> {
    for stage in pipeline {
        docs = match stage {
            Stage::Match(filter) => docs.into_iter().filter(|d| filter.matches_value(d)).collect(),
            Stage::Sort { field, direction } => {
                docs.sort_by(|a, b| {
                    let null = Value::Null;
                    let x = field_path(a, field).unwrap_or(&null);
                    let y = field_path(b, field).unwrap_or(&null);
                    direction.apply(compare_values(x, y))
                });
                docs
            }
            Stage::GroupFirst { by, fields } => group_first(docs, by, fields),
            Stage::Project(fields) => docs
                .into_iter()
                .map(|doc| {
                    let mut out = Map::new();
                    for field in fields {
                        if let Some(v) = field_path(&doc, field) {
                            out.insert(field.clone(), v.clone());
                        }
                    }
                    Value::Object(out)
                })
                .collect(),
        };
    }
    docs
}

/// Process-local store used by tests and embedders that bring their own persistence.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: Mutex<BTreeMap<String, EventRecord>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordStore for MemoryRecordStore {
    fn upsert(&self, record: &EventRecord) -> Result<UpsertOutcome> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| anyhow!("memory record store lock poisoned"))?;
        let outcome = match records.get(&record.record_key) {
            Some(existing) if existing == record => UpsertOutcome::Unchanged,
            Some(_) => UpsertOutcome::Replaced,
            None => UpsertOutcome::Inserted,
        };
        records.insert(record.record_key.clone(), record.clone());
        Ok(outcome)
    }

    fn scan(&self) -> Result<Vec<EventRecord>> {
        let records = self
            .records
            .lock()
            .map_err(|_| anyhow!("memory record store lock poisoned"))?;
        Ok(records.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storm::record::parse_snapshot_id;
    use serde_json::json;

    fn record(id: &str, name: &str, snapshot: &str) -> EventRecord {
        let doc = json!({"id": id, "name": name})
            .as_object()
            .cloned()
            .expect("object");
        EventRecord::from_source(doc, snapshot, parse_snapshot_id(snapshot).expect("ts"), None, "t")
            .expect("record")
    }

    #[test]
    fn upsert_reports_insert_replace_unchanged() {
        let store = MemoryRecordStore::new();
        let first = record("AL01", "ONE", "2025-10-01_00-00-00");
        assert_eq!(store.upsert(&first).expect("u1"), UpsertOutcome::Inserted);
        assert_eq!(store.upsert(&first).expect("u2"), UpsertOutcome::Unchanged);

        let renamed = record("AL01", "UNO", "2025-10-01_00-00-00");
        assert_eq!(store.upsert(&renamed).expect("u3"), UpsertOutcome::Replaced);
        assert_eq!(store.count().expect("count"), 1);
    }

    #[test]
    fn find_filters_and_sorts_by_snapshot() {
        let store = MemoryRecordStore::new();
        store.upsert(&record("AL01", "B", "2025-10-02_00-00-00")).expect("u");
        store.upsert(&record("AL01", "A", "2025-10-01_00-00-00")).expect("u");
        store.upsert(&record("EP02", "C", "2025-10-01_12-00-00")).expect("u");

        let got = store
            .find(
                &Filter::EventId("AL01".into()),
                SortSpec::by_snapshot(Direction::Ascending),
            )
            .expect("find");
        let names = got.iter().filter_map(EventRecord::name).collect::<Vec<_>>();
        assert_eq!(names, vec!["A", "B"]);

        let all = store
            .find(&Filter::All, SortSpec::by_snapshot(Direction::Descending))
            .expect("find all");
        assert_eq!(all.first().and_then(EventRecord::name), Some("B"));
    }

    #[test]
    fn pipeline_group_first_after_sort_keeps_latest() {
        let docs = vec![
            json!({"id": "AL01", "name": "INVEST", "snapshot_timestamp": "2025-10-01T00:00:00"}),
            json!({"id": "AL01", "name": "MELISSA", "snapshot_timestamp": "2025-10-02T00:00:00"}),
            json!({"id": "EP02", "name": "ALVIN", "snapshot_timestamp": "2025-10-01T00:00:00"}),
        ];
        let out = run_pipeline(
            docs,
            &[
                Stage::Sort {
                    field: "snapshot_timestamp".into(),
                    direction: Direction::Descending,
                },
                Stage::GroupFirst {
                    by: "id".into(),
                    fields: vec!["name".into(), "id".into()],
                },
                Stage::Sort {
                    field: "name".into(),
                    direction: Direction::Ascending,
                },
            ],
        );

        assert_eq!(
            out,
            vec![
                json!({"_id": "EP02", "name": "ALVIN", "id": "EP02"}),
                json!({"_id": "AL01", "name": "MELISSA", "id": "AL01"}),
            ]
        );
    }

    #[test]
    fn pipeline_match_and_project() {
        let docs = vec![
            json!({"id": "AL01", "name": "A", "basin": "north_atlantic"}),
            json!({"id": "EP02", "name": "B", "basin": "east_pacific"}),
        ];
        let out = run_pipeline(
            docs,
            &[
                Stage::Match(Filter::EventId("EP02".into())),
                Stage::Project(vec!["name".into(), "missing".into()]),
            ],
        );
        assert_eq!(out, vec![json!({"name": "B"})]);
    }

    #[test]
    fn value_order_puts_null_first() {
        assert_eq!(compare_values(&Value::Null, &json!("a")), Ordering::Less);
        assert_eq!(compare_values(&json!(2), &json!(10)), Ordering::Less);
        assert_eq!(compare_values(&json!("b"), &json!("a")), Ordering::Greater);
    }
}
