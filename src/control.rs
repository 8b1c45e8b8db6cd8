use std::{fmt, sync::Arc, time::Duration};

use serde::Serialize;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::{
    process::{command_line, ProcessError},
    traits::CommandRunner,
};

/// Result of one half of a restart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", content = "output", rename_all = "snake_case")]
pub enum StepOutcome {
    Ok(String),
    Failed(String),
}

impl StepOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok(_) => write!(f, "ok"),
            Self::Failed(text) => write!(f, "{text}"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("invalid interface name {0:?}")]
    InvalidInterfaceName(String),
    #[error("`{command}` failed with {status}: {stderr}")]
    Failed {
        command: String,
        status: String,
        stdout: String,
        stderr: String,
    },
    #[error(transparent)]
    Process(#[from] ProcessError),
    #[error("restart of {interface} failed (stop: {stop}; start: {start})")]
    Restart {
        interface: String,
        stop: StepOutcome,
        start: StepOutcome,
    },
}

impl ControlError {
    /// The text an operator needs to see: the program's own complaint when
    /// there is one.
    pub fn diagnostic(&self) -> String {
        match self {
            Self::Failed { stderr, stdout, .. } => {
                let text = if stderr.is_empty() { stdout } else { stderr };
                if text.is_empty() {
                    self.to_string()
                } else {
                    text.clone()
                }
            }
            e => e.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestartOutput {
    pub stop: String,
    pub start: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verb {
    Up,
    Down,
}

impl Verb {
    fn as_str(self) -> &'static str {
        match self {
            Verb::Up => "up",
            Verb::Down => "down",
        }
    }
}

/// Drives `wg-quick up|down <interface>`. It keeps no state of its own; the
/// kernel knows whether the interface is up.
pub struct InterfaceControl {
    program: String,
    timeout: Duration,
    runner: Arc<dyn CommandRunner>,
}

impl InterfaceControl {
    pub fn new(program: impl Into<String>, timeout: Duration, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            program: program.into(),
            timeout,
            runner,
        }
    }

    #[instrument(skip(self))]
    pub async fn start(&self, name: &str) -> Result<String, ControlError> {
        self.transition(name, Verb::Up).await
    }

    #[instrument(skip(self))]
    pub async fn stop(&self, name: &str) -> Result<String, ControlError> {
        self.transition(name, Verb::Down).await
    }

    /// Stop then start. Start runs even if stop failed.
    #[instrument(skip(self))]
    pub async fn restart(&self, name: &str) -> Result<RestartOutput, ControlError> {
        let stop = outcome(self.transition(name, Verb::Down).await);
        if !stop.is_ok() {
            warn!("teardown of {name} failed, bringing it up anyway");
        }
        let start = outcome(self.transition(name, Verb::Up).await);

        match (stop, start) {
            (StepOutcome::Ok(stop), StepOutcome::Ok(start)) => Ok(RestartOutput { stop, start }),
            (stop, start) => Err(ControlError::Restart {
                interface: name.to_owned(),
                stop,
                start,
            }),
        }
    }

    async fn transition(&self, name: &str, verb: Verb) -> Result<String, ControlError> {
        validate_name(name)?;

        let args = vec![verb.as_str().to_owned(), name.to_owned()];
        let out = self.runner.run(&self.program, &args, self.timeout).await?;
        if !out.success {
            return Err(ControlError::Failed {
                command: command_line(&self.program, &args),
                status: out.status(),
                stdout: out.stdout.trim().to_owned(),
                stderr: out.stderr.trim().to_owned(),
            });
        }

        info!("interface {name} {}", verb.as_str());
        Ok(out.combined())
    }
}

fn outcome(res: Result<String, ControlError>) -> StepOutcome {
    match res {
        Ok(out) => StepOutcome::Ok(out),
        Err(e) => StepOutcome::Failed(e.diagnostic()),
    }
}

// Linux caps interface names at 15 bytes; wg-quick also accepts a config path,
// which is not allowed here.
fn validate_name(name: &str) -> Result<(), ControlError> {
    let ok = !name.is_empty()
        && name.len() <= 15
        && !name.starts_with('-')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_=+.-".contains(c));
    if ok {
        Ok(())
    } else {
        Err(ControlError::InvalidInterfaceName(name.to_owned()))
    }
}
