//! `up` and `down`: resolve compose stacks, build services, start or stop them.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::rc::Rc;

use crate::pipeline::{Action, Command, Entries, MapResources, Pipeline, Resolved};
use crate::process::ProcessRunner;
use crate::provider::ServiceProvider;
use crate::resource::ServiceResource;
use crate::selector::Selectors;
use crate::service::{Operation, OperationStatus, Service};

/// Environment variables injected into every service whose name matches.
#[derive(Debug, Clone)]
pub struct EnvironmentRule {
    pub selectors: Selectors,
    pub variables: BTreeMap<String, String>,
}

/// Everything the deployment pipelines need.
#[derive(Debug, Clone)]
pub struct Deployment {
    pub directories: Vec<PathBuf>,
    pub compose_command: Vec<String>,
    pub environment: Vec<EnvironmentRule>,
}

impl Deployment {
    /// Variables for `service`: every matching rule in order, later rules winning.
    pub fn environment_for(&self, service: &str) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        for rule in &self.environment {
            if rule.selectors.matches(service) {
                env.extend(rule.variables.clone());
            }
        }
        env
    }
}

/// Services built for the resolved resources, plus the ones that were rejected.
#[derive(Debug, Clone, Default)]
pub struct CreatedServices {
    pub services: Vec<Service>,
    /// Resource name and reason.
    pub rejected: Vec<(String, String)>,
}

impl Entries for CreatedServices {
    fn success(&self) -> bool {
        self.rejected.is_empty() && !self.services.is_empty()
    }

    fn lines(&self) -> Vec<String> {
        let created = self
            .services
            .iter()
            .map(|service| format!("{} ({})", service.name(), service.directory().display()));
        let rejected = self
            .rejected
            .iter()
            .map(|(name, reason)| format!("{name}: {reason}"));
        created.chain(rejected).collect()
    }
}

#[derive(Debug)]
pub struct CreateServices {
    deployment: Deployment,
    runner: Rc<dyn ProcessRunner>,
}

impl CreateServices {
    pub fn new(deployment: Deployment, runner: Rc<dyn ProcessRunner>) -> Self {
        Self { deployment, runner }
    }
}

impl Action for CreateServices {
    type Input = Resolved<ServiceResource>;
    type Output = CreatedServices;

    fn name(&self) -> &str {
        "create_services"
    }

    fn run(&self, resolved: &Resolved<ServiceResource>) -> CreatedServices {
        let mut created = CreatedServices::default();
        for resource in &resolved.resources {
            let env = self.deployment.environment_for(&resource.name);
            match Service::create(
                resource,
                Rc::clone(&self.runner),
                &self.deployment.compose_command,
                env,
            ) {
                Ok(service) => created.services.push(service),
                Err(err) => created.rejected.push((resource.name.clone(), err.to_string())),
            }
        }
        created
    }
}

/// Per-service outcomes of `start` or `stop`.
#[derive(Debug, Clone, Default)]
pub struct Operated {
    pub statuses: Vec<OperationStatus>,
}

impl Entries for Operated {
    /// Any service succeeded.
    fn success(&self) -> bool {
        self.statuses.iter().any(OperationStatus::success)
    }

    fn lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        for status in &self.statuses {
            lines.push(format!(
                "{} {} [{}] {} in {:.1}s",
                status.operation,
                status.service,
                status.kind,
                if status.success() { "ok" } else { "FAILED" },
                status.elapsed().as_secs_f64(),
            ));
            for process in &status.processes {
                lines.push(format!("  {process}"));
                if !process.success() && !process.stderr.trim().is_empty() {
                    lines.push(format!("    {}", process.stderr.trim()));
                }
            }
        }
        lines
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Operate {
    operation: Operation,
}

impl Operate {
    pub fn new(operation: Operation) -> Self {
        Self { operation }
    }
}

impl Action for Operate {
    type Input = CreatedServices;
    type Output = Operated;

    fn name(&self) -> &str {
        match self.operation {
            Operation::Start => "start",
            Operation::Stop => "stop",
        }
    }

    fn run(&self, created: &CreatedServices) -> Operated {
        Operated {
            statuses: created
                .services
                .iter()
                .map(|service| service.operate(self.operation))
                .collect(),
        }
    }
}

/// Builds the `up` (start) or `down` (stop) command.
pub fn command(
    operation: Operation,
    deployment: &Deployment,
    runner: Rc<dyn ProcessRunner>,
) -> Command<Selectors> {
    let name = match operation {
        Operation::Start => "up",
        Operation::Stop => "down",
    };
    let directories = deployment
        .directories
        .iter()
        .map(|dir| dir.display().to_string())
        .collect::<Vec<_>>()
        .join(", ");
    let compose_command = deployment.compose_command.join(" ");
    let pipeline = Pipeline::start(MapResources::new(
        "map_services",
        ServiceProvider::new(deployment.directories.clone()),
    ))
    .then(CreateServices::new(deployment.clone(), runner))
    .then(Operate::new(operation));
    Command::new(name, pipeline)
        .with_config("directories", directories)
        .with_config("compose_command", compose_command)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::COMPOSE_KIND;
    use crate::process::testing::ScriptedRunner;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn stack(root: &Path, relative: &str) {
        let dir = root.join(relative);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("compose.yml"), "services: {}\n").unwrap();
    }

    fn deployment(root: &Path, environment: Vec<EnvironmentRule>) -> Deployment {
        Deployment {
            directories: vec![root.to_path_buf()],
            compose_command: vec!["docker".to_string(), "compose".to_string()],
            environment,
        }
    }

    fn rule(patterns: &[&str], pairs: &[(&str, &str)]) -> EnvironmentRule {
        EnvironmentRule {
            selectors: Selectors::new(patterns).unwrap(),
            variables: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn test_partial_failure_does_not_stop_siblings() {
        let temp = TempDir::new().unwrap();
        stack(temp.path(), "srv/cloud");
        stack(temp.path(), "srv/media");
        stack(temp.path(), "infra/nginx");
        // cloud: 4 ok, media: fails at its second step, nginx: 4 ok
        let runner = Rc::new(ScriptedRunner::with_exit_codes(&[0, 0, 0, 0, 0, 1]));
        let command = command(Operation::Start, &deployment(temp.path(), vec![]), runner.clone());
        let result = command.execute(&Selectors::all());

        assert_eq!(result.command, "up");
        assert_eq!(result.actions.len(), 3);
        assert!(result.success());
        let operated = result.action::<Operated>(2).unwrap();
        let summary: Vec<(&str, usize, bool)> = operated
            .entries
            .statuses
            .iter()
            .map(|s| (s.service.as_str(), s.processes.len(), s.success()))
            .collect();
        assert_eq!(
            summary,
            vec![("cloud", 4, true), ("media", 2, false), ("nginx", 4, true)]
        );
        assert_eq!(runner.calls.borrow().len(), 10);
    }

    #[test]
    fn test_all_failed_is_unsuccessful() {
        let temp = TempDir::new().unwrap();
        stack(temp.path(), "media");
        let runner = Rc::new(ScriptedRunner::with_exit_codes(&[1]));
        let result = command(Operation::Stop, &deployment(temp.path(), vec![]), runner)
            .execute(&Selectors::all());
        assert_eq!(result.command, "down");
        assert!(!result.success());
        let operated = result.action::<Operated>(2).unwrap();
        assert_eq!(operated.entries.statuses[0].processes.len(), 1);
    }

    #[test]
    fn test_no_match_stops_pipeline() {
        let temp = TempDir::new().unwrap();
        stack(temp.path(), "media");
        let runner = Rc::new(ScriptedRunner::default());
        let result = command(Operation::Start, &deployment(temp.path(), vec![]), runner.clone())
            .execute(&Selectors::new(&["nginx*"]).unwrap());
        assert!(!result.success());
        assert_eq!(result.actions.len(), 1);
        assert_eq!(result.actions[0].name(), "map_services");
        assert!(runner.calls.borrow().is_empty());
    }

    #[test]
    fn test_selectors_pick_services() {
        let temp = TempDir::new().unwrap();
        stack(temp.path(), "nginx");
        stack(temp.path(), "nginx2");
        stack(temp.path(), "nginx22");
        let runner = Rc::new(ScriptedRunner::default());
        let result = command(Operation::Stop, &deployment(temp.path(), vec![]), runner.clone())
            .execute(&Selectors::new(&["nginx?"]).unwrap());
        let resolved = result.action::<Resolved<ServiceResource>>(0).unwrap();
        let names: Vec<_> = resolved.entries.resources.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["nginx2"]);
        assert_eq!(runner.calls.borrow().len(), 2);
    }

    #[test]
    fn test_environment_injection() {
        let temp = TempDir::new().unwrap();
        stack(temp.path(), "media");
        stack(temp.path(), "cloud");
        let environment = vec![
            rule(&[], &[("TZ", "UTC"), ("PUID", "1")]),
            rule(&["med*"], &[("PUID", "1000")]),
        ];
        let runner = Rc::new(ScriptedRunner::default());
        command(Operation::Stop, &deployment(temp.path(), environment), runner.clone())
            .execute(&Selectors::all());

        let calls = runner.calls.borrow();
        let (_, cwd, cloud_env) = &calls[0];
        assert!(cwd.as_ref().unwrap().ends_with("cloud"));
        assert_eq!(cloud_env["PUID"], "1");
        assert_eq!(cloud_env["TZ"], "UTC");
        let (_, cwd, media_env) = &calls[2];
        assert!(cwd.as_ref().unwrap().ends_with("media"));
        assert_eq!(media_env["PUID"], "1000");
        assert_eq!(media_env["TZ"], "UTC");
    }

    #[test]
    fn test_unknown_kind_fails_create_services() {
        let resolved = Resolved {
            selectors: "*".to_string(),
            resources: vec![
                ServiceResource::new("media", COMPOSE_KIND, PathBuf::from("/srv/media")),
                ServiceResource::new("legacy", "swarm", PathBuf::from("/srv/legacy")),
            ],
        };
        let create = CreateServices::new(
            Deployment {
                directories: vec![],
                compose_command: vec!["docker".to_string(), "compose".to_string()],
                environment: vec![],
            },
            Rc::new(ScriptedRunner::default()),
        );
        let created = create.run(&resolved);
        assert_eq!(created.services.len(), 1);
        assert_eq!(created.rejected.len(), 1);
        assert_eq!(created.rejected[0].0, "legacy");
        assert!(!created.success());
        assert!(created.lines()[1].contains("unknown service kind 'swarm'"));
    }
}
