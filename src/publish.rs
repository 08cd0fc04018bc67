use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::config::Config;

/// One scrape group in the Prometheus file_sd format: a list of
/// `host:port` targets plus labels applied to all of them.
///
/// `labels` is left out of the serialized form entirely when unset.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
pub struct TargetGroup {
    pub targets: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<IndexMap<String, String>>,
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("serialize targets failed: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("write targets file failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Build the published document from a fetched sensor list. Order and
/// duplicates are passed through as received.
pub fn target_groups(sensors: &[String], config: &Config) -> Vec<TargetGroup> {
    let targets = sensors
        .iter()
        .map(|sensor| format!("{}:{}", sensor, config.metrics_port))
        .collect();

    let labels = if config.omit_labels {
        None
    } else {
        let mut labels = IndexMap::new();
        labels.insert("__metrics_path__".to_string(), config.metrics_path.clone());
        labels.insert("job".to_string(), config.job.clone());
        labels.insert("environment".to_string(), config.environment.clone());
        Some(labels)
    };

    vec![TargetGroup { targets, labels }]
}

/// Persist the target groups at `path`, replacing whatever was there.
///
/// The document is serialized up front and written to a sibling tmp
/// file which is flushed to disk and then renamed over the
/// destination. Rename is atomic on POSIX, so a reader polling `path`
/// sees either the previous document or the new one, never a torn
/// write. A failed attempt may leave the tmp file behind, it is simply
/// overwritten on the next cycle.
pub fn write_target_groups(path: &Path, groups: &[TargetGroup]) -> Result<(), PublishError> {
    let data = serde_json::to_vec_pretty(groups).map_err(PublishError::Serialize)?;

    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir)?;
        }
    }

    let tmp = tmp_path(path);
    let mut file = fs::File::create(&tmp)?;
    file.write_all(&data)?;
    file.sync_all()?;

    fs::rename(&tmp, path)?;
    info!(message = "updated targets file", path = %path.display());

    Ok(())
}

// The tmp file must live in the same directory as the destination,
// rename is only atomic within one filesystem.
fn tmp_path(path: &Path) -> PathBuf {
    let mut buf = path.as_os_str().to_owned();
    buf.push(".tmp");
    PathBuf::from(buf)
}
