//! External process execution.
//!
//! A [`ProcessRunner`] never fails: a command that exits non-zero, or that
//! cannot be launched at all, is recorded on the returned
//! [`CompletedProcess`]. Runs are blocking and have no timeout.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use chrono::{DateTime, Local};

use crate::logging::{Outcome, traced};

/// Record of one external command invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedProcess {
    pub cmd: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
    pub exitcode: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    /// Set when the command could not be launched or waited on.
    pub exception: Option<String>,
    pub started: Option<DateTime<Local>>,
    pub completed: Option<DateTime<Local>>,
}

impl CompletedProcess {
    /// A record for `cmd` that has not run yet.
    pub fn pending(cmd: &[String], cwd: Option<&Path>, env: &BTreeMap<String, String>) -> Self {
        Self {
            cmd: cmd.to_vec(),
            cwd: cwd.map(Path::to_path_buf),
            env: env.clone(),
            exitcode: None,
            stdout: String::new(),
            stderr: String::new(),
            exception: None,
            started: None,
            completed: None,
        }
    }

    pub fn success(&self) -> bool {
        self.exception.is_none()
            && self.exitcode == Some(0)
            && self.started.is_some()
            && self.completed.is_some()
    }

    /// Wall time between start and completion, zero when either is unset.
    pub fn elapsed(&self) -> Duration {
        match (self.started, self.completed) {
            (Some(started), Some(completed)) => (completed - started).to_std().unwrap_or_default(),
            _ => Duration::ZERO,
        }
    }

    /// The command line joined with spaces.
    pub fn command_line(&self) -> String {
        self.cmd.join(" ")
    }
}

impl Outcome for CompletedProcess {
    fn succeeded(&self) -> bool {
        self.success()
    }
}

impl fmt::Display for CompletedProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.command_line())?;
        match (&self.exception, self.exitcode) {
            (Some(exception), _) => write!(f, " (error: {exception})"),
            (None, Some(code)) => write!(f, " (exit {code})"),
            (None, None) => write!(f, " (not run)"),
        }
    }
}

/// Executes external commands.
pub trait ProcessRunner: fmt::Debug {
    /// Runs `cmd` in `cwd` with `env` layered over the inherited environment.
    fn run(&self, cmd: &[String], cwd: Option<&Path>, env: &BTreeMap<String, String>)
    -> CompletedProcess;
}

/// Production runner backed by [`std::process::Command`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl SystemRunner {
    fn execute(
        cmd: &[String],
        cwd: Option<&Path>,
        env: &BTreeMap<String, String>,
    ) -> CompletedProcess {
        let mut record = CompletedProcess::pending(cmd, cwd, env);
        record.started = Some(Local::now());

        let Some((program, args)) = cmd.split_first() else {
            record.exception = Some("empty command".to_string());
            record.completed = Some(Local::now());
            return record;
        };
        let mut command = Command::new(program);
        command.args(args).envs(env);
        if let Some(dir) = cwd {
            command.current_dir(dir);
        }
        match command.output() {
            Ok(output) => {
                record.exitcode = output.status.code();
                record.stdout = String::from_utf8_lossy(&output.stdout).into_owned();
                record.stderr = String::from_utf8_lossy(&output.stderr).into_owned();
                if record.exitcode.is_none() {
                    record.exception = Some(format!("terminated by signal ({})", output.status));
                }
            }
            Err(err) => record.exception = Some(format!("failed to spawn {program}: {err}")),
        }
        record.completed = Some(Local::now());
        record
    }
}

impl ProcessRunner for SystemRunner {
    fn run(
        &self,
        cmd: &[String],
        cwd: Option<&Path>,
        env: &BTreeMap<String, String>,
    ) -> CompletedProcess {
        // Arguments may carry secrets (archive passwords); only the program is logged.
        let program = cmd.first().map_or("", String::as_str);
        traced("process", "run", &program, || Self::execute(cmd, cwd, env))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted runner for unit tests.

    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    /// Replays exit codes in order (0 once the script runs out) and records
    /// every command it was asked to run.
    #[derive(Debug, Default)]
    pub(crate) struct ScriptedRunner {
        pub exit_codes: RefCell<VecDeque<i32>>,
        pub calls: RefCell<Vec<(Vec<String>, Option<PathBuf>, BTreeMap<String, String>)>>,
        /// Files to create when a command succeeds, keyed by call index.
        pub touch: RefCell<BTreeMap<usize, PathBuf>>,
    }

    impl ScriptedRunner {
        pub(crate) fn with_exit_codes(codes: &[i32]) -> Self {
            Self {
                exit_codes: RefCell::new(codes.iter().copied().collect()),
                ..Self::default()
            }
        }
    }

    impl ProcessRunner for ScriptedRunner {
        fn run(
            &self,
            cmd: &[String],
            cwd: Option<&Path>,
            env: &BTreeMap<String, String>,
        ) -> CompletedProcess {
            let index = self.calls.borrow().len();
            self.calls
                .borrow_mut()
                .push((cmd.to_vec(), cwd.map(Path::to_path_buf), env.clone()));
            let code = self.exit_codes.borrow_mut().pop_front().unwrap_or(0);
            if code == 0 {
                if let Some(path) = self.touch.borrow().get(&index) {
                    std::fs::write(path, b"archive").unwrap();
                }
            }
            let mut record = CompletedProcess::pending(cmd, cwd, env);
            record.started = Some(Local::now());
            record.exitcode = Some(code);
            record.completed = Some(Local::now());
            record
        }
    }
}
