//! Run observers
//!
//! Observers receive lifecycle events from [`Experiment`](super::Experiment)
//! and persist them somewhere. [`FileStorageObserver`] keeps one numbered
//! directory per run with the config, the run record and captured output.

use crate::config::ConfigMap;
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

const HEARTBEAT_SECS: i64 = 10;
const MAX_ID_ATTEMPTS: usize = 16;

/// Everything an observer needs to know when a run starts.
#[derive(Debug, Clone)]
pub struct RunStart<'a> {
    pub experiment: &'a str,
    pub token: &'a str,
    pub config: &'a ConfigMap,
    pub command: &'a [String],
    pub start_time: DateTime<Utc>,
}

pub trait RunObserver {
    /// Called once before training. Returns the run id assigned by the observer.
    fn started(&mut self, start: &RunStart<'_>) -> Result<String>;

    /// Filtered output captured from the trainer.
    fn output(&mut self, text: &str) -> Result<()>;

    fn completed(&mut self, stop_time: DateTime<Utc>) -> Result<()>;

    fn failed(&mut self, stop_time: DateTime<Utc>, fail_trace: Vec<String>) -> Result<()>;

    /// Directory holding this run's files, if the observer writes any.
    fn run_dir(&self) -> Option<&Path> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostInfo {
    pub hostname: String,
    pub os: String,
    pub arch: String,
    pub cpu_count: usize,
}

impl HostInfo {
    pub fn current() -> Self {
        let from_env = std::env::var("HOSTNAME").or_else(|_| std::env::var("COMPUTERNAME")).ok();
        #[cfg(unix)]
        let from_file = fs::read_to_string("/etc/hostname").ok();
        #[cfg(not(unix))]
        let from_file = None;
        Self {
            hostname: pick_hostname(from_env, from_file),
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            cpu_count: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
        }
    }
}

/// First non-blank candidate, env var before `/etc/hostname`.
fn pick_hostname(from_env: Option<String>, from_file: Option<String>) -> String {
    [from_env, from_file]
        .into_iter()
        .flatten()
        .map(|name| name.trim().to_string())
        .find(|name| !name.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Contents of `run.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub experiment: String,
    pub token: String,
    pub command: Vec<String>,
    pub status: RunStatus,
    pub start_time: DateTime<Utc>,
    pub stop_time: Option<DateTime<Utc>>,
    pub heartbeat: DateTime<Utc>,
    pub host: HostInfo,
    pub config_hash: String,
    pub fail_trace: Option<Vec<String>>,
}

/// Writes `config.json`, `run.json` and `cout.txt` under `<base_dir>/<id>/`.
pub struct FileStorageObserver {
    base_dir: PathBuf,
    dir: Option<PathBuf>,
    record: Option<RunRecord>,
    cout: Option<File>,
}

impl FileStorageObserver {
    /// Create the observer and its base directory.
    pub fn create(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir)
            .with_context(|| format!("Failed creating observer directory {}", base_dir.display()))?;
        Ok(Self { base_dir, dir: None, record: None, cout: None })
    }

    fn allocate_run_dir(&self) -> Result<(String, PathBuf)> {
        for _ in 0..MAX_ID_ATTEMPTS {
            let id = next_run_id(&self.base_dir)?.to_string();
            let dir = self.base_dir.join(&id);
            match fs::create_dir(&dir) {
                Ok(()) => return Ok((id, dir)),
                // Another process grabbed the id between scan and create.
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(err) => {
                    return Err(err)
                        .with_context(|| format!("Failed creating run directory {}", dir.display()))
                }
            }
        }
        anyhow::bail!("Could not allocate a run id under {}", self.base_dir.display())
    }

    fn save_record(&self) -> Result<()> {
        let (Some(dir), Some(record)) = (&self.dir, &self.record) else {
            return Ok(());
        };
        write_json(&dir.join("run.json"), record)
    }

    fn finish(
        &mut self,
        status: RunStatus,
        stop_time: DateTime<Utc>,
        trace: Option<Vec<String>>,
    ) -> Result<()> {
        if let Some(cout) = self.cout.as_mut() {
            cout.flush().context("Failed flushing captured output")?;
        }
        if let Some(record) = self.record.as_mut() {
            record.status = status;
            record.stop_time = Some(stop_time);
            record.heartbeat = stop_time;
            record.fail_trace = trace;
        }
        self.save_record()
    }
}

impl RunObserver for FileStorageObserver {
    fn started(&mut self, start: &RunStart<'_>) -> Result<String> {
        let (id, dir) = self.allocate_run_dir()?;

        write_json(&dir.join("config.json"), start.config)?;

        let record = RunRecord {
            experiment: start.experiment.to_string(),
            token: start.token.to_string(),
            command: start.command.to_vec(),
            status: RunStatus::Running,
            start_time: start.start_time,
            stop_time: None,
            heartbeat: start.start_time,
            host: HostInfo::current(),
            config_hash: config_hash(start.config)?,
            fail_trace: None,
        };

        let cout_path = dir.join("cout.txt");
        let cout = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&cout_path)
            .with_context(|| format!("Failed opening {}", cout_path.display()))?;

        self.dir = Some(dir);
        self.record = Some(record);
        self.cout = Some(cout);
        self.save_record()?;

        tracing::info!("Started run with ID \"{}\"", id);
        Ok(id)
    }

    fn output(&mut self, text: &str) -> Result<()> {
        if let Some(cout) = self.cout.as_mut() {
            cout.write_all(text.as_bytes()).context("Failed writing cout.txt")?;
        }

        let now = Utc::now();
        let due = self
            .record
            .as_ref()
            .is_some_and(|r| now - r.heartbeat >= Duration::seconds(HEARTBEAT_SECS));
        if due {
            if let Some(record) = self.record.as_mut() {
                record.heartbeat = now;
            }
            self.save_record()?;
        }
        Ok(())
    }

    fn completed(&mut self, stop_time: DateTime<Utc>) -> Result<()> {
        self.finish(RunStatus::Completed, stop_time, None)
    }

    fn failed(&mut self, stop_time: DateTime<Utc>, fail_trace: Vec<String>) -> Result<()> {
        self.finish(RunStatus::Failed, stop_time, Some(fail_trace))
    }

    fn run_dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }
}

/// One past the largest numeric directory name in `base_dir`.
fn next_run_id(base_dir: &Path) -> Result<u64> {
    let entries = fs::read_dir(base_dir)
        .with_context(|| format!("Failed listing {}", base_dir.display()))?;
    let max = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .filter_map(|entry| entry.file_name().to_str().and_then(|name| name.parse::<u64>().ok()))
        .max()
        .unwrap_or(0);
    Ok(max + 1)
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let mut content = serde_json::to_string_pretty(value)
        .with_context(|| format!("Failed serializing {}", path.display()))?;
    content.push('\n');
    fs::write(path, content).with_context(|| format!("Failed writing {}", path.display()))
}

/// SHA-256 of the config's compact JSON form.
pub fn config_hash(config: &ConfigMap) -> Result<String> {
    let json = serde_json::to_string(config).context("Config is not representable as JSON")?;
    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

/// Resolve backspaces and carriage returns the way a terminal would, so
/// progress bars end up as their final state instead of every redraw.
pub fn filter_captured_output(text: &str) -> String {
    text.split('\n').map(collapse_line).collect::<Vec<_>>().join("\n")
}

fn collapse_line(line: &str) -> String {
    let mut chars: Vec<char> = Vec::with_capacity(line.len());
    let mut cursor = 0usize;
    for ch in line.chars() {
        match ch {
            '\r' => cursor = 0,
            '\u{8}' => cursor = cursor.saturating_sub(1),
            _ => {
                if cursor == chars.len() {
                    chars.push(ch);
                } else {
                    chars[cursor] = ch;
                }
                cursor += 1;
            }
        }
    }
    chars.into_iter().collect()
}
