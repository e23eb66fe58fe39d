use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn stormtrack(workdir: &Path, storm_home: &Path) -> assert_cmd::Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("stormtrack");
    cmd.current_dir(workdir)
        .env("STORM_HOME", storm_home)
        .env("STORM_CONFIG_PATH", workdir.join("absent.toml"))
        .env("STORM_LOG", "error");
    cmd
}

fn write_event(storm_home: &Path, snapshot: &str, id: &str, name: &str) {
    let dir = storm_home.join("data").join(snapshot).join("info_generated");
    fs::create_dir_all(&dir).expect("mkdir info");
    fs::write(
        dir.join(format!("Info_{id}.json")),
        format!(r#"{{"id": "{id}", "name": "{name}", "history": []}}"#),
    )
    .expect("write event");
}

fn stdout_json(cmd: &mut assert_cmd::Command) -> serde_json::Value {
    let output = cmd.assert().success().get_output().stdout.clone();
    serde_json::from_slice(&output).expect("stdout is json")
}

fn ingested_home(tmp: &Path) -> std::path::PathBuf {
    let home = tmp.join("storm");
    write_event(&home, "2025-10-29_00-00-00", "AL132025", "THIRTEEN");
    write_event(&home, "2025-10-31_00-00-00", "AL132025", "MELISSA");
    write_event(&home, "2025-10-30_00-00-00", "EP922025", "INVEST");
    let maps = home.join("data/2025-10-31_00-00-00/maps_generated");
    fs::create_dir_all(&maps).expect("mkdir maps");
    fs::write(maps.join("Forecast_AL132025.png"), b"png").expect("write map");

    stormtrack(tmp, &home).arg("ingest").assert().success();
    home
}

#[test]
fn unique_events_show_latest_name_sorted() {
    let tmp = tempdir().expect("tempdir");
    let home = ingested_home(tmp.path());

    let unique = stdout_json(stormtrack(tmp.path(), &home).args(["events", "unique"]));
    let pairs = unique
        .as_array()
        .expect("array")
        .iter()
        .map(|e| (e["id"].as_str().expect("id"), e["name"].as_str().expect("name")))
        .collect::<Vec<_>>();
    assert_eq!(pairs, vec![("EP922025", "INVEST"), ("AL132025", "MELISSA")]);
    assert!(unique[0]["images"]["model"].is_null());
}

#[test]
fn history_is_ordered_and_enriched_with_images() {
    let tmp = tempdir().expect("tempdir");
    let home = ingested_home(tmp.path());

    let history = stdout_json(stormtrack(tmp.path(), &home).args(["events", "history", "AL132025"]));
    let history = history.as_array().expect("array");
    assert_eq!(history.len(), 2);
    assert_eq!(history[0]["name"], "THIRTEEN");
    assert_eq!(history[1]["record_key"], "AL132025_2025-10-31_00-00-00");
    assert_eq!(
        history[1]["images"]["forecast"],
        "/api/maps/2025-10-31_00-00-00/maps_generated/Forecast_AL132025.png"
    );
    assert!(history[0]["images"]["forecast"].is_null());
}

#[test]
fn unknown_event_history_is_empty() {
    let tmp = tempdir().expect("tempdir");
    let home = ingested_home(tmp.path());

    let history = stdout_json(stormtrack(tmp.path(), &home).args(["events", "history", "ZZ99"]));
    assert_eq!(history, serde_json::json!([]));
}

#[test]
fn all_snapshots_span_every_event() {
    let tmp = tempdir().expect("tempdir");
    let home = ingested_home(tmp.path());

    let all = stdout_json(stormtrack(tmp.path(), &home).args(["events", "all"]));
    assert_eq!(all.as_array().expect("array").len(), 3);
    assert_eq!(all[0]["snapshot_id"], "2025-10-29_00-00-00");
}
