use anyhow::Result;

use crate::commands::CommandReport;
use crate::storm::config::load_config;
use crate::storm::file_store::FileRecordStore;
use crate::storm::images::ImageResolver;
use crate::storm::paths::resolve_paths;
use crate::storm::query::EventQuery;

#[derive(Debug, Clone)]
pub enum EventsQuery {
    All,
    History(String),
    Unique,
}

pub fn run(query: &EventsQuery) -> Result<CommandReport> {
    let paths = resolve_paths()?;
    let cfg = load_config()?;
    let store = FileRecordStore::open(&paths.store_dir)?;
    let images = ImageResolver::new(&paths.data_dir, &cfg.ingest, &cfg.images);
    let events = EventQuery::new(&store, &images);

    let mut report = match query {
        EventsQuery::All => {
            let records = events.list_all_snapshots()?;
            let mut report = CommandReport::new("events-all");
            report.detail(format!("records={}", records.len()));
            report.set_data(&records)?;
            report
        }
        EventsQuery::History(event_id) => {
            let records = events.get_event_history(event_id)?;
            let mut report = CommandReport::new("events-history");
            report.detail(format!("event_id={event_id}"));
            report.detail(format!("records={}", records.len()));
            report.set_data(&records)?;
            report
        }
        EventsQuery::Unique => {
            let summaries = events.list_unique_events()?;
            let mut report = CommandReport::new("events-unique");
            report.detail(format!("events={}", summaries.len()));
            report.set_data(&summaries)?;
            report
        }
    };
    report.detail(format!("store_dir={}", paths.store_dir.display()));
    Ok(report)
}
