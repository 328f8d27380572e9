use crate::errors::Result;
use crate::filter::PoolFilter;
use crate::theme::Theme;
use serde::{Deserialize, Serialize};
use std::{env, path::Path, path::PathBuf};
use tokio::fs;
use tracing::error;

/// Client-local state that survives restarts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<Theme>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_pool_filter: Option<PoolFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_pool_codes: Option<Vec<String>>,
}

pub fn resolve_prefs_path() -> PathBuf {
    if let Ok(path) = env::var("SCORE_TRACKER_PREFS") {
        return PathBuf::from(path);
    }

    PathBuf::from("data/prefs.json")
}

pub async fn load_prefs(path: &Path) -> Preferences {
    match fs::read(path).await {
        Ok(bytes) => match serde_json::from_slice(&bytes) {
            Ok(prefs) => prefs,
            Err(err) => {
                error!("failed to parse preferences file: {err}");
                Preferences::default()
            }
        },
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Preferences::default(),
        Err(err) => {
            error!("failed to read preferences file: {err}");
            Preferences::default()
        }
    }
}

pub async fn persist_prefs(path: &Path, prefs: &Preferences) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }
    let payload = serde_json::to_vec_pretty(prefs)?;
    fs::write(path, payload).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let prefs = load_prefs(&dir.path().join("absent.json")).await;
        assert_eq!(prefs, Preferences::default());
    }

    #[tokio::test]
    async fn prefs_round_trip_uses_fixed_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/prefs.json");
        let prefs = Preferences {
            theme: Some(Theme::Dark),
            batch_pool_filter: Some(PoolFilter {
                min_completion: Some(10),
                ..PoolFilter::default()
            }),
            batch_pool_codes: Some(vec!["12345".to_string()]),
        };
        persist_prefs(&path, &prefs).await.unwrap();

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(raw["theme"], "dark");
        assert_eq!(raw["batch_pool_filter"]["min_completion"], 10);
        assert_eq!(raw["batch_pool_codes"][0], "12345");

        assert_eq!(load_prefs(&path).await, prefs);
    }

    #[tokio::test]
    async fn corrupt_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        std::fs::write(&path, b"{not json").unwrap();
        assert_eq!(load_prefs(&path).await, Preferences::default());
    }
}
