//! The training entry point
//!
//! Training itself lives outside this crate. [`CommandTrainer`] runs it as a
//! child process and tees the child's output into the run's observers.

use super::experiment::RunContext;
use crate::config::ConfigMap;
use anyhow::{Context, Result};
use serde_yaml::Value;
use std::fs;
use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};

pub trait Trainer {
    fn train(&mut self, ctx: &mut RunContext<'_>, config: &ConfigMap) -> Result<()>;
}

/// Runs an external program with the merged config.
///
/// The child sees `MARL_CONFIG` (path to the config as JSON), `MARL_RUN_TOKEN`
/// and, when an observer stores files, `MARL_RUN_DIR`.
#[derive(Debug, Clone)]
pub struct CommandTrainer {
    program: String,
    args: Vec<String>,
}

impl CommandTrainer {
    pub fn new(command: Vec<String>) -> Result<Self> {
        let mut parts = command.into_iter();
        let program = parts.next().context("Training command is empty")?;
        Ok(Self { program, args: parts.collect() })
    }

    /// Read the command from the `runner` key: either a whitespace-separated
    /// string or a list of strings. Returns `None` when the key is absent.
    pub fn from_config(config: &ConfigMap) -> Result<Option<Self>> {
        let command = match config.get("runner") {
            None | Some(Value::Null) => return Ok(None),
            Some(Value::String(line)) => line.split_whitespace().map(str::to_string).collect(),
            Some(Value::Sequence(items)) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s.clone()),
                    Value::Number(n) => Ok(n.to_string()),
                    _ => anyhow::bail!("'runner' entries must be strings"),
                })
                .collect::<Result<Vec<_>>>()?,
            Some(_) => anyhow::bail!("'runner' must be a string or a list of strings"),
        };
        Self::new(command).map(Some)
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    fn config_path(ctx: &RunContext<'_>, config: &ConfigMap) -> Result<PathBuf> {
        if let Some(dir) = ctx.run_dir() {
            let path = dir.join("config.json");
            if path.exists() {
                return Ok(path);
            }
        }
        let path = std::env::temp_dir().join(format!("marl-launch-{}.json", ctx.token()));
        let json = serde_json::to_string_pretty(config).context("Config is not representable as JSON")?;
        fs::write(&path, json).with_context(|| format!("Failed writing {}", path.display()))?;
        Ok(path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Stdout,
    Stderr,
}

impl Trainer for CommandTrainer {
    fn train(&mut self, ctx: &mut RunContext<'_>, config: &ConfigMap) -> Result<()> {
        let config_path = Self::config_path(ctx, config)?;

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .env("MARL_CONFIG", &config_path)
            .env("MARL_RUN_TOKEN", ctx.token())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = ctx.run_dir() {
            command.env("MARL_RUN_DIR", dir);
        }

        tracing::info!("Launching trainer: {} {}", self.program, self.args.join(" "));
        let mut child = command
            .spawn()
            .with_context(|| format!("Failed to launch training command '{}'", self.program))?;

        let (tx, rx) = mpsc::channel();
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_reader(stdout, Stream::Stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_reader(stderr, Stream::Stderr, tx.clone()));
        }
        drop(tx);

        for (stream, line) in rx {
            match stream {
                Stream::Stdout => println!("{line}"),
                Stream::Stderr => eprintln!("{line}"),
            }
            ctx.capture_line(&line);
        }
        for reader in readers {
            let _ = reader.join();
        }

        let status = child.wait().context("Failed waiting for training command")?;
        if !status.success() {
            anyhow::bail!("Training command '{}' exited with {}", self.program, status);
        }
        Ok(())
    }
}

fn spawn_reader<R>(pipe: R, stream: Stream, tx: Sender<(Stream, String)>) -> JoinHandle<()>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut reader = BufReader::new(pipe);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => break,
                Ok(_) => {
                    if buf.last() == Some(&b'\n') {
                        buf.pop();
                        if buf.last() == Some(&b'\r') {
                            buf.pop();
                        }
                    }
                    let line = String::from_utf8_lossy(&buf).into_owned();
                    if tx.send((stream, line)).is_err() {
                        break;
                    }
                }
                Err(err) => {
                    tracing::warn!("Failed reading trainer {:?}: {}", stream, err);
                    break;
                }
            }
        }
    })
}
