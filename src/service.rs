//! Deployable services.
//!
//! A service is started or stopped by running a fixed sequence of
//! orchestrator commands in its directory. The sequence halts at the first
//! failing step; every step that ran is kept on the [`OperationStatus`].

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::rc::Rc;
use std::str::FromStr;
use std::time::Duration;

use crate::constants::COMPOSE_KIND;
use crate::logging::{Outcome, traced};
use crate::process::{CompletedProcess, ProcessRunner};
use crate::resource::ServiceResource;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Start,
    Stop,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Start => "Start",
            Operation::Stop => "Stop",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Service kinds the factory can build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceKind {
    Compose,
}

impl FromStr for ServiceKind {
    type Err = Error;

    fn from_str(kind: &str) -> Result<Self> {
        match kind {
            COMPOSE_KIND => Ok(ServiceKind::Compose),
            other => Err(Error::UnknownServiceKind(other.to_string())),
        }
    }
}

/// Outcome of starting or stopping one service.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationStatus {
    pub service: String,
    pub operation: Operation,
    pub kind: String,
    pub processes: Vec<CompletedProcess>,
}

impl OperationStatus {
    pub fn new(service: &str, operation: Operation, kind: &str) -> Self {
        Self {
            service: service.to_string(),
            operation,
            kind: kind.to_string(),
            processes: Vec::new(),
        }
    }

    /// Every executed step succeeded.
    pub fn success(&self) -> bool {
        self.processes.iter().all(CompletedProcess::success)
    }

    /// Sum of the steps' elapsed times.
    pub fn elapsed(&self) -> Duration {
        self.processes.iter().map(CompletedProcess::elapsed).sum()
    }
}

impl Outcome for OperationStatus {
    fn succeeded(&self) -> bool {
        self.success()
    }
}

/// A compose stack driven through the compose CLI.
#[derive(Debug, Clone)]
pub struct ComposeService {
    resource: ServiceResource,
    command: Vec<String>,
    env: BTreeMap<String, String>,
    runner: Rc<dyn ProcessRunner>,
}

impl ComposeService {
    /// Orchestrator arguments per step, in execution order.
    pub fn steps(operation: Operation) -> &'static [&'static [&'static str]] {
        match operation {
            Operation::Start => &[
                &["config", "--quiet"],
                &["pull"],
                &["down"],
                &["up", "--detach"],
            ],
            Operation::Stop => &[&["config", "--quiet"], &["down"]],
        }
    }

    fn operate(&self, operation: Operation) -> OperationStatus {
        let mut status = OperationStatus::new(&self.resource.name, operation, &self.resource.kind);
        for args in Self::steps(operation) {
            let cmd: Vec<String> = self
                .command
                .iter()
                .map(String::as_str)
                .chain(args.iter().copied())
                .map(str::to_string)
                .collect();
            let process = self
                .runner
                .run(&cmd, Some(&self.resource.directory), &self.env);
            let ok = process.success();
            status.processes.push(process);
            if !ok {
                break;
            }
        }
        status
    }
}

/// A service built from a [`ServiceResource`].
#[derive(Debug, Clone)]
pub enum Service {
    Compose(ComposeService),
}

impl Service {
    /// Builds the service for `resource`. Unknown kinds are an error.
    pub fn create(
        resource: &ServiceResource,
        runner: Rc<dyn ProcessRunner>,
        compose_command: &[String],
        env: BTreeMap<String, String>,
    ) -> Result<Self> {
        match resource.kind.parse::<ServiceKind>()? {
            ServiceKind::Compose => Ok(Service::Compose(ComposeService {
                resource: resource.clone(),
                command: compose_command.to_vec(),
                env,
                runner,
            })),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Service::Compose(compose) => &compose.resource.name,
        }
    }

    pub fn directory(&self) -> &Path {
        match self {
            Service::Compose(compose) => &compose.resource.directory,
        }
    }

    pub fn env(&self) -> &BTreeMap<String, String> {
        match self {
            Service::Compose(compose) => &compose.env,
        }
    }

    pub fn start(&self) -> OperationStatus {
        self.operate(Operation::Start)
    }

    pub fn stop(&self) -> OperationStatus {
        self.operate(Operation::Stop)
    }

    pub fn operate(&self, operation: Operation) -> OperationStatus {
        traced("service", operation.as_str(), &self.name(), || match self {
            Service::Compose(compose) => compose.operate(operation),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::testing::ScriptedRunner;
    use std::path::PathBuf;

    fn compose(runner: Rc<ScriptedRunner>) -> Service {
        let resource = ServiceResource::new("media", COMPOSE_KIND, PathBuf::from("/srv/media"));
        let mut env = BTreeMap::new();
        env.insert("PUID".to_string(), "1000".to_string());
        Service::create(
            &resource,
            runner,
            &["docker".to_string(), "compose".to_string()],
            env,
        )
        .unwrap()
    }

    fn commands(runner: &ScriptedRunner) -> Vec<String> {
        runner
            .calls
            .borrow()
            .iter()
            .map(|(cmd, _, _)| cmd.join(" "))
            .collect()
    }

    #[test]
    fn test_start_sequence() {
        let runner = Rc::new(ScriptedRunner::default());
        let status = compose(runner.clone()).start();
        assert!(status.success());
        assert_eq!(status.operation, Operation::Start);
        assert_eq!(status.processes.len(), 4);
        assert_eq!(
            commands(&runner),
            vec![
                "docker compose config --quiet",
                "docker compose pull",
                "docker compose down",
                "docker compose up --detach",
            ]
        );
        let calls = runner.calls.borrow();
        assert!(calls.iter().all(|(_, cwd, env)| {
            cwd.as_deref() == Some(Path::new("/srv/media")) && env["PUID"] == "1000"
        }));
    }

    #[test]
    fn test_stop_sequence() {
        let runner = Rc::new(ScriptedRunner::default());
        let status = compose(runner.clone()).stop();
        assert!(status.success());
        assert_eq!(
            commands(&runner),
            vec!["docker compose config --quiet", "docker compose down"]
        );
    }

    #[test]
    fn test_halts_at_first_failure() {
        let runner = Rc::new(ScriptedRunner::with_exit_codes(&[0, 1, 0, 0]));
        let status = compose(runner.clone()).start();
        assert!(!status.success());
        assert_eq!(status.processes.len(), 2);
        assert_eq!(runner.calls.borrow().len(), 2);
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let resource = ServiceResource::new("x", "swarm", PathBuf::from("/srv/x"));
        let err = Service::create(
            &resource,
            Rc::new(ScriptedRunner::default()),
            &[],
            BTreeMap::new(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::UnknownServiceKind(kind) if kind == "swarm"));
    }

    #[test]
    fn test_elapsed_is_sum() {
        let runner = Rc::new(ScriptedRunner::default());
        let status = compose(runner).stop();
        let total: Duration = status.processes.iter().map(CompletedProcess::elapsed).sum();
        assert_eq!(status.elapsed(), total);
    }
}
