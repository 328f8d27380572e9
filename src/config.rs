use crate::errors::{ClientError, Result};
use crate::render::{DEFAULT_CHUNK_SIZE, INITIAL_RENDER_CAP};
use crate::review::AUTO_CLOSE_DELAY;
use crate::storage::resolve_prefs_path;
use crate::toast::{PAGE_TOAST_DURATION, REVIEW_TOAST_DURATION};
use reqwest::Url;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:5005";
pub const AUTOSAVE_DEBOUNCE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tunables {
    pub toast_duration: Duration,
    pub review_toast_duration: Duration,
    pub autosave_debounce: Duration,
    pub chunk_size: usize,
    pub render_cap: usize,
    pub review_auto_close: Duration,
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            toast_duration: PAGE_TOAST_DURATION,
            review_toast_duration: REVIEW_TOAST_DURATION,
            autosave_debounce: AUTOSAVE_DEBOUNCE,
            chunk_size: DEFAULT_CHUNK_SIZE,
            render_cap: INITIAL_RENDER_CAP,
            review_auto_close: AUTO_CLOSE_DELAY,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub base_url: Url,
    pub prefs_path: PathBuf,
    pub tunables: Tunables,
}

impl Config {
    pub fn new(base_url: &str, prefs_path: PathBuf) -> Result<Self> {
        let base_url = Url::parse(base_url.trim()).map_err(|err| {
            ClientError::validation(format!("invalid server URL {base_url:?}: {err}"))
        })?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(ClientError::validation(format!(
                "server URL must be http or https, got {}",
                base_url.scheme()
            )));
        }
        Ok(Self {
            base_url,
            prefs_path,
            tunables: Tunables::default(),
        })
    }

    pub fn from_env() -> Result<Self> {
        let url = std::env::var("SCORE_TRACKER_URL")
            .unwrap_or_else(|_| DEFAULT_SERVER_URL.to_string());
        Self::new(&url, resolve_prefs_path())
    }
}
