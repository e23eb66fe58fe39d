use crate::storm::config::{ImagesConfig, IngestConfig};
use crate::storm::record::{EventRecord, KEY_SEPARATOR};
use crate::storm::warn::{self, WarnEvent};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Optional per-snapshot artifact list written alongside the maps.
pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImageRefs {
    pub model: Option<String>,
    pub forecast: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Model,
    Forecast,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub file: String,
    pub kind: ArtifactKind,
}

/// Finds the generated map images that belong to a record's snapshot.
#[derive(Debug, Clone)]
pub struct ImageResolver {
    data_dir: PathBuf,
    maps_subdir: String,
    url_prefix: String,
    model_keyword: String,
    forecast_keyword: String,
    legacy_key_split: bool,
}

impl ImageResolver {
    pub fn new(data_dir: &Path, ingest: &IngestConfig, images: &ImagesConfig) -> Self {
        Self {
            data_dir: data_dir.to_path_buf(),
            maps_subdir: ingest.maps_subdir.clone(),
            url_prefix: images.url_prefix.trim_end_matches('/').to_string(),
            model_keyword: images.model_keyword.to_lowercase(),
            forecast_keyword: images.forecast_keyword.to_lowercase(),
            legacy_key_split: images.legacy_key_split,
        }
    }

    pub fn classify(&self, file_name: &str) -> Option<ArtifactKind> {
        let lower = file_name.to_lowercase();
        if lower.contains(&self.model_keyword) {
            Some(ArtifactKind::Model)
        } else if lower.contains(&self.forecast_keyword) {
            Some(ArtifactKind::Forecast)
        } else {
            None
        }
    }

    /// Snapshot folder a record was ingested from.
    ///
    /// Uses the stored `snapshot_id` unless legacy splitting is on or the
    /// record predates it; the legacy path takes everything after the first
    /// separator of `record_key`, which misreads event ids containing `_`.
    pub fn snapshot_folder(
        &self,
        record_key: Option<&str>,
        snapshot_id: Option<&str>,
    ) -> Option<String> {
        if !self.legacy_key_split
            && let Some(id) = snapshot_id.filter(|s| !s.is_empty())
        {
            return Some(id.to_string());
        }
        record_key?
            .split_once(KEY_SEPARATOR)
            .map(|(_, rest)| rest)
            .filter(|rest| !rest.is_empty())
            .map(ToOwned::to_owned)
    }

    fn url(&self, snapshot: &str, file_name: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            self.url_prefix, snapshot, self.maps_subdir, file_name
        )
    }

    fn read_manifest(&self, maps_dir: &Path) -> Option<Vec<ManifestEntry>> {
        let path = maps_dir.join(MANIFEST_FILE);
        let raw = fs::read_to_string(&path).ok()?;
        match serde_json::from_str::<Vec<ManifestEntry>>(&raw) {
            Ok(entries) => Some(entries),
            Err(err) => {
                warn::emit(WarnEvent {
                    code: "IMAGE_MANIFEST_INVALID",
                    stage: "images",
                    action: "fallback-directory-scan",
                    target: &path.display().to_string(),
                    reason: "manifest-parse-failed",
                    err: &err.to_string(),
                });
                None
            }
        }
    }

    fn scan_dir(&self, maps_dir: &Path) -> Vec<(String, ArtifactKind)> {
        let Ok(entries) = fs::read_dir(maps_dir) else {
            return Vec::new();
        };
        // Directory order is whatever the filesystem returns.
        entries
            .filter_map(Result::ok)
            .filter_map(|entry| entry.file_name().to_str().map(ToOwned::to_owned))
            .filter(|name| name != MANIFEST_FILE)
            .filter_map(|name| self.classify(&name).map(|kind| (name, kind)))
            .collect()
    }

    /// Attach at most one URL per slot. When several files qualify for the
    /// same slot the last one listed wins.
    pub fn resolve(
        &self,
        event_id: Option<&str>,
        record_key: Option<&str>,
        snapshot_id: Option<&str>,
    ) -> ImageRefs {
        let mut refs = ImageRefs::default();
        let Some(event_id) = event_id.filter(|id| !id.is_empty()) else {
            return refs;
        };
        let Some(snapshot) = self.snapshot_folder(record_key, snapshot_id) else {
            return refs;
        };

        let maps_dir = self.data_dir.join(&snapshot).join(&self.maps_subdir);
        if !maps_dir.is_dir() {
            return refs;
        }

        let candidates = match self.read_manifest(&maps_dir) {
            Some(entries) => entries.into_iter().map(|e| (e.file, e.kind)).collect(),
            None => self.scan_dir(&maps_dir),
        };

        for (file, kind) in candidates {
            if !file.contains(event_id) {
                continue;
            }
            let url = self.url(&snapshot, &file);
            match kind {
                ArtifactKind::Model => refs.model = Some(url),
                ArtifactKind::Forecast => refs.forecast = Some(url),
            }
        }
        refs
    }

    pub fn for_record(&self, record: &EventRecord) -> ImageRefs {
        self.resolve(
            record.event_id(),
            Some(&record.record_key),
            record.snapshot_id.as_deref(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const SNAP: &str = "2025-10-31_23-32-15";

    fn resolver(root: &Path, legacy: bool) -> ImageResolver {
        let images = ImagesConfig {
            legacy_key_split: legacy,
            ..ImagesConfig::default()
        };
        ImageResolver::new(root, &IngestConfig::default(), &images)
    }

    fn maps_dir(root: &Path, snapshot: &str) -> PathBuf {
        let dir = root.join(snapshot).join("maps_generated");
        fs::create_dir_all(&dir).expect("mkdir");
        dir
    }

    #[test]
    fn classifies_by_keyword_case_insensitively() {
        let tmp = tempdir().expect("tempdir");
        let r = resolver(tmp.path(), false);
        assert_eq!(r.classify("Models_AL13.png"), Some(ArtifactKind::Model));
        assert_eq!(r.classify("FORECAST_AL13.png"), Some(ArtifactKind::Forecast));
        assert_eq!(r.classify("models_forecast.png"), Some(ArtifactKind::Model));
        assert_eq!(r.classify("track.png"), None);
    }

    #[test]
    fn resolves_model_and_forecast_for_matching_event() {
        let tmp = tempdir().expect("tempdir");
        let dir = maps_dir(tmp.path(), SNAP);
        fs::write(dir.join("Models_AL132025.png"), b"png").expect("write");
        fs::write(dir.join("Forecast_AL132025.png"), b"png").expect("write");
        fs::write(dir.join("Forecast_EP922025.png"), b"png").expect("write");

        let refs = resolver(tmp.path(), false).resolve(
            Some("AL132025"),
            Some(&format!("AL132025_{SNAP}")),
            Some(SNAP),
        );
        assert_eq!(
            refs.model.as_deref(),
            Some("/api/maps/2025-10-31_23-32-15/maps_generated/Models_AL132025.png")
        );
        assert_eq!(
            refs.forecast.as_deref(),
            Some("/api/maps/2025-10-31_23-32-15/maps_generated/Forecast_AL132025.png")
        );
    }

    #[test]
    fn skips_records_without_id_or_separator() {
        let tmp = tempdir().expect("tempdir");
        maps_dir(tmp.path(), SNAP);
        let r = resolver(tmp.path(), false);
        assert_eq!(r.resolve(None, Some("x_y"), Some(SNAP)), ImageRefs::default());
        assert_eq!(r.resolve(Some("AL13"), Some("AL13"), None), ImageRefs::default());
        assert_eq!(r.resolve(Some("AL13"), None, None), ImageRefs::default());
    }

    #[test]
    fn stored_snapshot_id_survives_underscored_event_ids() {
        let tmp = tempdir().expect("tempdir");
        let dir = maps_dir(tmp.path(), SNAP);
        fs::write(dir.join("Forecast_AL_13.png"), b"png").expect("write");
        let key = format!("AL_13_{SNAP}");

        let modern = resolver(tmp.path(), false).resolve(Some("AL_13"), Some(&key), Some(SNAP));
        assert!(modern.forecast.is_some());

        let legacy = resolver(tmp.path(), true);
        assert_eq!(
            legacy.snapshot_folder(Some(&key), Some(SNAP)).as_deref(),
            Some("13_2025-10-31_23-32-15")
        );
        assert_eq!(
            legacy.resolve(Some("AL_13"), Some(&key), Some(SNAP)),
            ImageRefs::default()
        );
    }

    #[test]
    fn manifest_takes_precedence_over_directory_scan() {
        let tmp = tempdir().expect("tempdir");
        let dir = maps_dir(tmp.path(), SNAP);
        fs::write(dir.join("Models_AL13.png"), b"png").expect("write");
        fs::write(
            dir.join(MANIFEST_FILE),
            r#"[{"file": "cone_AL13.png", "kind": "forecast"}]"#,
        )
        .expect("write manifest");

        let refs = resolver(tmp.path(), false).resolve(Some("AL13"), None, Some(SNAP));
        assert_eq!(refs.model, None);
        assert_eq!(
            refs.forecast.as_deref(),
            Some("/api/maps/2025-10-31_23-32-15/maps_generated/cone_AL13.png")
        );
    }

    #[test]
    fn last_listed_candidate_wins_its_slot() {
        let tmp = tempdir().expect("tempdir");
        let dir = maps_dir(tmp.path(), SNAP);
        let r = resolver(tmp.path(), false);

        fs::write(
            dir.join(MANIFEST_FILE),
            r#"[{"file": "a_AL13.png", "kind": "forecast"}, {"file": "b_AL13.png", "kind": "forecast"}]"#,
        )
        .expect("write manifest");
        let refs = r.resolve(Some("AL13"), None, Some(SNAP));
        assert_eq!(
            refs.forecast.as_deref(),
            Some("/api/maps/2025-10-31_23-32-15/maps_generated/b_AL13.png")
        );

        fs::write(
            dir.join(MANIFEST_FILE),
            r#"[{"file": "b_AL13.png", "kind": "forecast"}, {"file": "a_AL13.png", "kind": "forecast"}]"#,
        )
        .expect("rewrite manifest");
        let refs = r.resolve(Some("AL13"), None, Some(SNAP));
        assert_eq!(
            refs.forecast.as_deref(),
            Some("/api/maps/2025-10-31_23-32-15/maps_generated/a_AL13.png")
        );
        assert_eq!(refs.model, None);
    }

    #[test]
    fn invalid_manifest_falls_back_to_scan() {
        let tmp = tempdir().expect("tempdir");
        let dir = maps_dir(tmp.path(), SNAP);
        fs::write(dir.join("Models_AL13.png"), b"png").expect("write");
        fs::write(dir.join(MANIFEST_FILE), "not json").expect("write manifest");

        let refs = resolver(tmp.path(), false).resolve(Some("AL13"), None, Some(SNAP));
        assert!(refs.model.is_some());
    }
}
