//! The experiment harness: owns the final config and drives observers
//! around a single trainer invocation.

use super::observer::{filter_captured_output, RunObserver, RunStart};
use super::trainer::Trainer;
use crate::config::ConfigMap;
use anyhow::Result;
use chrono::Utc;
use std::path::{Path, PathBuf};

pub struct Experiment {
    name: String,
    token: String,
    config: ConfigMap,
    command: Vec<String>,
    observers: Vec<Box<dyn RunObserver>>,
}

impl Experiment {
    pub fn new(name: impl Into<String>, token: impl Into<String>, config: ConfigMap) -> Self {
        Self {
            name: name.into(),
            token: token.into(),
            config,
            command: std::env::args().collect(),
            observers: Vec::new(),
        }
    }

    /// Override the command line recorded in the run record.
    pub fn with_command(mut self, command: Vec<String>) -> Self {
        self.command = command;
        self
    }

    pub fn observe(&mut self, observer: Box<dyn RunObserver>) {
        self.observers.push(observer);
    }

    /// Announce the run to every observer, call the trainer, then record
    /// completion or failure. The trainer's result is returned unchanged.
    pub fn run<T: Trainer + ?Sized>(&mut self, trainer: &mut T) -> Result<()> {
        let start = RunStart {
            experiment: &self.name,
            token: &self.token,
            config: &self.config,
            command: &self.command,
            start_time: Utc::now(),
        };

        let mut run_id = None;
        for observer in self.observers.iter_mut() {
            let id = observer.started(&start)?;
            if run_id.is_none() {
                run_id = Some(id);
            }
        }
        let run_dir = self.observers.iter().find_map(|o| o.run_dir()).map(Path::to_path_buf);

        let mut ctx = RunContext {
            run_id,
            token: &self.token,
            run_dir,
            observers: &mut self.observers,
        };
        let result = trainer.train(&mut ctx, &self.config);

        let stop_time = Utc::now();
        match &result {
            Ok(()) => {
                tracing::info!("Completed after {}s", (stop_time - start.start_time).num_seconds());
                for observer in self.observers.iter_mut() {
                    if let Err(err) = observer.completed(stop_time) {
                        tracing::warn!("Observer failed to record completion: {:#}", err);
                    }
                }
            }
            Err(err) => {
                tracing::error!(
                    "Failed after {}s: {:#}",
                    (stop_time - start.start_time).num_seconds(),
                    err
                );
                let trace: Vec<String> = err.chain().map(|cause| cause.to_string()).collect();
                for observer in self.observers.iter_mut() {
                    if let Err(obs_err) = observer.failed(stop_time, trace.clone()) {
                        tracing::warn!("Observer failed to record failure: {:#}", obs_err);
                    }
                }
            }
        }
        result
    }
}

/// Handle passed to the trainer for the duration of one run.
pub struct RunContext<'a> {
    run_id: Option<String>,
    token: &'a str,
    run_dir: Option<PathBuf>,
    observers: &'a mut [Box<dyn RunObserver>],
}

impl RunContext<'_> {
    pub fn run_id(&self) -> Option<&str> {
        self.run_id.as_deref()
    }

    pub fn token(&self) -> &str {
        self.token
    }

    /// Directory of the first observer that stores files.
    pub fn run_dir(&self) -> Option<&Path> {
        self.run_dir.as_deref()
    }

    /// Record one line of trainer output with every observer.
    pub fn capture_line(&mut self, line: &str) {
        let mut text = filter_captured_output(line);
        text.push('\n');
        for observer in self.observers.iter_mut() {
            if let Err(err) = observer.output(&text) {
                tracing::warn!("Observer failed to record output: {:#}", err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Events(Vec<String>);

    struct RecordingObserver(Rc<RefCell<Events>>);

    impl RunObserver for RecordingObserver {
        fn started(&mut self, start: &RunStart<'_>) -> Result<String> {
            self.0.borrow_mut().0.push(format!("started {}", start.token));
            Ok("7".into())
        }

        fn output(&mut self, text: &str) -> Result<()> {
            self.0.borrow_mut().0.push(format!("output {text:?}"));
            Ok(())
        }

        fn completed(&mut self, _stop_time: DateTime<Utc>) -> Result<()> {
            self.0.borrow_mut().0.push("completed".into());
            Ok(())
        }

        fn failed(&mut self, _stop_time: DateTime<Utc>, fail_trace: Vec<String>) -> Result<()> {
            self.0.borrow_mut().0.push(format!("failed {}", fail_trace.join(" <- ")));
            Ok(())
        }
    }

    struct EchoTrainer {
        fail: bool,
    }

    impl Trainer for EchoTrainer {
        fn train(&mut self, ctx: &mut RunContext<'_>, config: &ConfigMap) -> Result<()> {
            assert_eq!(ctx.run_id(), Some("7"));
            assert!(ctx.run_dir().is_none());
            ctx.capture_line(&format!("name={}", config["name"].as_str().unwrap_or("")));
            ctx.capture_line("50%\r100%");
            if self.fail {
                return Err(anyhow::anyhow!("env crashed").context("training failed"));
            }
            Ok(())
        }
    }

    fn experiment(events: &Rc<RefCell<Events>>) -> Experiment {
        let config: ConfigMap = serde_yaml::from_str("name: liir\n").expect("yaml");
        let mut ex = Experiment::new("marl", "liir_3m_tok", config).with_command(vec!["x".into()]);
        ex.observe(Box::new(RecordingObserver(Rc::clone(events))));
        ex
    }

    #[test]
    fn successful_run_emits_lifecycle_in_order() {
        let events = Rc::new(RefCell::new(Events::default()));
        let mut ex = experiment(&events);

        ex.run(&mut EchoTrainer { fail: false }).expect("run");

        assert_eq!(
            events.borrow().0,
            vec![
                "started liir_3m_tok".to_string(),
                "output \"name=liir\\n\"".to_string(),
                "output \"100%\\n\"".to_string(),
                "completed".to_string(),
            ]
        );
    }

    #[test]
    fn failed_run_records_error_chain_and_returns_error() {
        let events = Rc::new(RefCell::new(Events::default()));
        let mut ex = experiment(&events);

        let err = ex.run(&mut EchoTrainer { fail: true }).expect_err("should fail");
        assert_eq!(err.to_string(), "training failed");

        let events = events.borrow();
        assert_eq!(events.0.last().map(String::as_str), Some("failed training failed <- env crashed"));
    }
}
