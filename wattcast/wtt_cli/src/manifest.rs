use std::{
    fs::{self, File, OpenOptions},
    io::{BufRead, BufReader, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Local, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// One training run in the JSON-lines manifest.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RunManifestEntry {
    pub run_id: String,
    pub submitted_at: DateTime<Utc>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    pub data_path: PathBuf,
    pub model_path: PathBuf,
    pub log_path: PathBuf,
    pub status: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub metrics: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

impl RunManifestEntry {
    pub fn new(data_path: PathBuf, model_path: PathBuf, log_path: PathBuf) -> Self {
        Self {
            run_id: format!("run-{}", Uuid::new_v4()),
            submitted_at: Utc::now(),
            finished_at: None,
            data_path,
            model_path,
            log_path,
            status: "pending".into(),
            summary: None,
            metrics: None,
            error: None,
        }
    }
}

pub fn append_manifest(path: &Path, entry: &RunManifestEntry) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening manifest {}", path.display()))?;
    serde_json::to_writer(&mut file, entry)?;
    file.write_all(b"\n")?;
    Ok(())
}

pub fn read_manifest(path: &Path) -> Result<Vec<RunManifestEntry>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut entries = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let entry: RunManifestEntry = serde_json::from_str(&line)
            .with_context(|| format!("manifest {} line {}", path.display(), idx + 1))?;
        entries.push(entry);
    }
    Ok(entries)
}

/// Applies `apply` to the entry with `run_id` and rewrites the manifest.
pub fn update_entry(
    path: &Path,
    run_id: &str,
    mut apply: impl FnMut(&mut RunManifestEntry),
) -> Result<()> {
    let mut entries = read_manifest(path)?;
    let mut changed = false;
    for entry in &mut entries {
        if entry.run_id == run_id {
            apply(entry);
            changed = true;
        }
    }
    if !changed {
        return Ok(());
    }
    let mut buffer = Vec::new();
    for entry in &entries {
        serde_json::to_writer(&mut buffer, entry)?;
        buffer.push(b'\n');
    }
    // Staged next to the manifest so the rename stays on one filesystem.
    let staging = staging_path(path);
    fs::write(&staging, &buffer)
        .with_context(|| format!("staging manifest {}", staging.display()))?;
    fs::rename(&staging, path)
        .with_context(|| format!("replacing manifest {}", path.display()))?;
    Ok(())
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

pub fn update_status(path: &Path, run_id: &str, status: &str) -> Result<()> {
    update_entry(path, run_id, |entry| entry.status = status.to_string())
}

/// `<base>/YYYY/MM/DD/wtt-<command>-<timestamp>.log.jsonl`
pub fn compute_log_path(base: &Path, command: &str) -> Result<PathBuf> {
    let now = Local::now();
    let dir = base
        .join(format!("{:04}", now.year()))
        .join(format!("{:02}", now.month()))
        .join(format!("{:02}", now.day()));
    fs::create_dir_all(&dir)?;
    Ok(dir.join(format!(
        "wtt-{command}-{}.log.jsonl",
        Utc::now().format("%Y%m%d-%H%M%S")
    )))
}
