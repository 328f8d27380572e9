pub mod api;
pub mod batch;
pub mod clipboard;
pub mod config;
pub mod errors;
pub mod extract;
pub mod filter;
pub mod models;
pub mod realtime;
pub mod regions;
pub mod remark;
pub mod render;
pub mod review;
pub mod storage;
pub mod theme;
pub mod toast;
pub mod tracker;
pub mod ui;

#[cfg(test)]
mod testing;

pub use api::{HttpApi, ScoreApi};
pub use batch::BatchPage;
pub use config::Config;
pub use errors::{ClientError, Result};
pub use models::ScoreRecord;
pub use realtime::{ServerEvent, SyncAction};
pub use storage::{load_prefs, persist_prefs, resolve_prefs_path, Preferences};
pub use tracker::TrackerPage;
