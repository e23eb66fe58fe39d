pub mod audit;
pub mod config;
pub mod file_store;
pub mod images;
pub mod ingest;
pub mod paths;
pub mod prediction;
pub mod projector;
pub mod query;
pub mod record;
pub mod render;
pub mod state;
pub mod store;
pub mod util;
pub mod warn;
pub mod watcher;
