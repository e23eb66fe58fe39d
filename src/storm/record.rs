use crate::error::StormError;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

/// Snapshot folder names look like `2025-10-31_23-32-15`.
pub const SNAPSHOT_DIR_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";
pub const TRACK_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
pub const KEY_SEPARATOR: char = '_';

/// Source field carrying the upstream event identifier.
pub const EVENT_ID_FIELD: &str = "id";

const RESERVED_FIELDS: [&str; 4] = [
    "record_key",
    "snapshot_id",
    "snapshot_timestamp",
    "content_hash",
];

pub fn parse_snapshot_id(snapshot_id: &str) -> Result<NaiveDateTime, StormError> {
    NaiveDateTime::parse_from_str(snapshot_id, SNAPSHOT_DIR_FORMAT)
        .map_err(|err| StormError::parse(format!("snapshot folder `{snapshot_id}`"), err))
}

pub fn record_key(event_id: &str, snapshot_id: &str) -> String {
    format!("{event_id}{KEY_SEPARATOR}{snapshot_id}")
}

pub fn parse_track_time(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim();
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
}

fn serialize_track_time<S: Serializer>(
    time: &NaiveDateTime,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&time.format(TRACK_TIME_FORMAT).to_string())
}

/// One observed position along a storm's recorded track.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackPoint {
    #[serde(serialize_with = "serialize_track_time")]
    pub time: NaiveDateTime,
    pub lat: f64,
    pub lon: f64,
    /// Intensity and classification fields (`vmax`, `mslp`, `type`, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn coordinate(value: Option<&Value>) -> Option<f64> {
    let parsed = match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

impl TrackPoint {
    pub fn new(time: NaiveDateTime, lat: f64, lon: f64) -> Self {
        Self {
            time,
            lat,
            lon,
            extra: Map::new(),
        }
    }

    pub fn from_value(value: &Value, context: &str) -> Result<Self, StormError> {
        let Some(object) = value.as_object() else {
            return Err(StormError::parse(context, "track point is not an object"));
        };
        let time = object
            .get("time")
            .and_then(Value::as_str)
            .and_then(parse_track_time)
            .ok_or_else(|| StormError::parse(context, "missing or malformed `time`"))?;
        let lat = coordinate(object.get("lat"))
            .ok_or_else(|| StormError::parse(context, "missing or malformed `lat`"))?;
        let lon = coordinate(object.get("lon"))
            .ok_or_else(|| StormError::parse(context, "missing or malformed `lon`"))?;

        let extra = object
            .iter()
            .filter(|(k, _)| !matches!(k.as_str(), "time" | "lat" | "lon"))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Ok(Self {
            time,
            lat,
            lon,
            extra,
        })
    }
}

/// Stable sort by `time`; duplicate timestamps keep their source order.
pub fn sort_track(points: &mut [TrackPoint]) {
    points.sort_by_key(|p| p.time);
}

/// The stored document for one (event, snapshot) pair.
///
/// Every field of the source JSON is preserved in `document`; the identity
/// fields are kept alongside so the record can be re-keyed without parsing
/// `record_key`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub record_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_id: Option<String>,
    pub snapshot_timestamp: NaiveDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    #[serde(flatten)]
    pub document: Map<String, Value>,
}

fn event_id_from(document: &Map<String, Value>) -> Option<String> {
    match document.get(EVENT_ID_FIELD)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) if n.is_i64() || n.is_u64() => Some(n.to_string()),
        _ => None,
    }
}

impl EventRecord {
    /// Build a record from a parsed source document captured in `snapshot_id`.
    pub fn from_source(
        mut document: Map<String, Value>,
        snapshot_id: &str,
        snapshot_timestamp: NaiveDateTime,
        content_hash: Option<String>,
        context: &str,
    ) -> Result<Self, StormError> {
        let Some(event_id) = event_id_from(&document) else {
            return Err(StormError::MissingKey {
                context: context.to_string(),
                field: EVENT_ID_FIELD,
            });
        };
        for field in RESERVED_FIELDS {
            document.remove(field);
        }
        document.insert(EVENT_ID_FIELD.to_string(), Value::String(event_id.clone()));

        Ok(Self {
            record_key: record_key(&event_id, snapshot_id),
            snapshot_id: Some(snapshot_id.to_string()),
            snapshot_timestamp,
            content_hash,
            document,
        })
    }

    pub fn event_id(&self) -> Option<&str> {
        self.document.get(EVENT_ID_FIELD).and_then(Value::as_str)
    }

    pub fn name(&self) -> Option<&str> {
        self.document.get("name").and_then(Value::as_str)
    }

    /// Parsed track points in source order. Invest records carry no history.
    pub fn history(&self) -> Result<Vec<TrackPoint>, StormError> {
        let items = match self.document.get("history") {
            None | Some(Value::Null) => return Ok(Vec::new()),
            Some(Value::Array(items)) => items,
            Some(_) => {
                return Err(StormError::parse(
                    format!("record {}", self.record_key),
                    "`history` is not an array",
                ));
            }
        };

        items
            .iter()
            .enumerate()
            .map(|(idx, item)| {
                TrackPoint::from_value(item, &format!("record {} history[{idx}]", self.record_key))
            })
            .collect()
    }
}

/// Parse one snapshot file body. Strict JSON first, then JSON5 so that the
/// `NaN`/`Infinity` tokens some feeds emit load as null instead of failing.
pub fn parse_source_document(raw: &str, context: &str) -> Result<Map<String, Value>, StormError> {
    let value = match serde_json::from_str::<Value>(raw) {
        Ok(value) => value,
        Err(strict_err) => json5::from_str::<Value>(raw)
            .map_err(|_| StormError::parse(context, strict_err))?,
    };

    match value {
        Value::Object(map) => Ok(map),
        _ => Err(StormError::parse(context, "expected a JSON object")),
    }
}
