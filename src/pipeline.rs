//! Commands as ordered, short-circuiting pipelines of actions.
//!
//! A [`Pipeline`] is built stage by stage with [`Pipeline::start`] and
//! [`Pipeline::then`]; each stage receives the typed entries produced by the
//! previous one. Execution stops at the first unsuccessful stage, so the
//! recorded actions are always a prefix of the declared ones.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use chrono::{DateTime, Local};

use crate::logging::{Outcome, traced};
use crate::provider::Provider;
use crate::resource::Resource;
use crate::selector::Selectors;

/// Payload of an [`ActionResult`].
pub trait Entries: fmt::Debug {
    /// Whether the stage succeeded. Stages that aggregate children override this.
    fn success(&self) -> bool {
        true
    }

    /// One line per entry, for reports.
    fn lines(&self) -> Vec<String>;
}

/// One stage of a command.
pub trait Action {
    type Input;
    type Output: Entries + 'static;

    fn name(&self) -> &str;

    fn run(&self, input: &Self::Input) -> Self::Output;
}

/// Typed, timestamped output of one action.
#[derive(Debug, Clone)]
pub struct ActionResult<T> {
    pub name: String,
    pub entries: T,
    pub started: DateTime<Local>,
    pub completed: DateTime<Local>,
}

impl<T: Entries> ActionResult<T> {
    pub fn success(&self) -> bool {
        self.entries.success()
    }

    pub fn elapsed(&self) -> Duration {
        (self.completed - self.started).to_std().unwrap_or_default()
    }
}

impl<T: Entries> Outcome for ActionResult<T> {
    fn succeeded(&self) -> bool {
        self.success()
    }
}

/// Type-erased view of an [`ActionResult`], as stored on an [`ExecutionResult`].
pub trait ActionRecord: fmt::Debug {
    fn name(&self) -> &str;
    fn success(&self) -> bool;
    fn started(&self) -> DateTime<Local>;
    fn completed(&self) -> DateTime<Local>;
    fn lines(&self) -> Vec<String>;
    fn as_any(&self) -> &dyn Any;

    fn elapsed(&self) -> Duration {
        (self.completed() - self.started()).to_std().unwrap_or_default()
    }
}

impl<T: Entries + 'static> ActionRecord for ActionResult<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn success(&self) -> bool {
        ActionResult::success(self)
    }

    fn started(&self) -> DateTime<Local> {
        self.started
    }

    fn completed(&self) -> DateTime<Local> {
        self.completed
    }

    fn lines(&self) -> Vec<String> {
        self.entries.lines()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

type Records = Vec<Rc<dyn ActionRecord>>;
type Stage<I, O> = Box<dyn Fn(&I, &mut Records) -> Option<Rc<ActionResult<O>>>>;

fn perform<A: Action>(action: &A, input: &A::Input) -> ActionResult<A::Output> {
    let name = action.name().to_string();
    let subject = name.clone();
    traced("pipeline", "action", &subject, || {
        let started = Local::now();
        let entries = action.run(input);
        ActionResult {
            name,
            entries,
            started,
            completed: Local::now(),
        }
    })
}

/// Records the result and hands it on only if the stage succeeded.
fn settle<O: Entries + 'static>(
    result: ActionResult<O>,
    records: &mut Records,
) -> Option<Rc<ActionResult<O>>> {
    let result = Rc::new(result);
    let record: Rc<dyn ActionRecord> = result.clone();
    records.push(record);
    result.success().then_some(result)
}

/// An ordered chain of actions from `I` to `O`.
pub struct Pipeline<I, O> {
    names: Vec<String>,
    stage: Stage<I, O>,
}

impl<I: 'static, O: Entries + 'static> Pipeline<I, O> {
    pub fn start<A>(action: A) -> Self
    where
        A: Action<Input = I, Output = O> + 'static,
    {
        Self {
            names: vec![action.name().to_string()],
            stage: Box::new(move |input: &I, records: &mut Records| {
                settle(perform(&action, input), records)
            }),
        }
    }

    /// Appends `action`, fed with this pipeline's output.
    pub fn then<A>(self, action: A) -> Pipeline<I, A::Output>
    where
        A: Action<Input = O> + 'static,
    {
        let mut names = self.names;
        names.push(action.name().to_string());
        let previous = self.stage;
        Pipeline {
            names,
            stage: Box::new(move |input: &I, records: &mut Records| {
                let prior = previous(input, records)?;
                settle(perform(&action, &prior.entries), records)
            }),
        }
    }

    /// Declared action names, in order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Runs every stage until one fails; returns the records of those that ran.
    pub fn run(&self, input: &I) -> Vec<Rc<dyn ActionRecord>> {
        let mut records = Vec::new();
        (self.stage)(input, &mut records);
        records
    }
}

impl<I, O> fmt::Debug for Pipeline<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline").field("names", &self.names).finish()
    }
}

/// A named pipeline plus the context it is reported with.
pub struct Command<I> {
    name: String,
    arguments: Vec<String>,
    config: BTreeMap<String, String>,
    actions: Vec<String>,
    run: Box<dyn Fn(&I) -> Vec<Rc<dyn ActionRecord>>>,
}

impl<I: 'static> Command<I> {
    pub fn new<O: Entries + 'static>(name: impl Into<String>, pipeline: Pipeline<I, O>) -> Self {
        Self {
            name: name.into(),
            arguments: Vec::new(),
            config: BTreeMap::new(),
            actions: pipeline.names().to_vec(),
            run: Box::new(move |input: &I| pipeline.run(input)),
        }
    }

    pub fn with_arguments(mut self, arguments: Vec<String>) -> Self {
        self.arguments = arguments;
        self
    }

    /// Adds a key/value pair to the configuration snapshot.
    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared action names, in order.
    pub fn actions(&self) -> &[String] {
        &self.actions
    }

    pub fn execute(&self, input: &I) -> ExecutionResult {
        traced("command", &self.name, &self.arguments.join(" "), || {
            let started = Local::now();
            let actions = (self.run)(input);
            ExecutionResult {
                command: self.name.clone(),
                arguments: self.arguments.clone(),
                config: self.config.clone(),
                actions,
                started,
                completed: Some(Local::now()),
            }
        })
    }
}

impl<I> fmt::Debug for Command<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("arguments", &self.arguments)
            .field("config", &self.config)
            .field("actions", &self.actions)
            .finish()
    }
}

/// Full record of one command invocation.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub command: String,
    pub arguments: Vec<String>,
    pub config: BTreeMap<String, String>,
    pub actions: Vec<Rc<dyn ActionRecord>>,
    pub started: DateTime<Local>,
    pub completed: Option<DateTime<Local>>,
}

impl ExecutionResult {
    /// AND over the actions that ran.
    pub fn success(&self) -> bool {
        self.actions.iter().all(|action| action.success())
    }

    pub fn elapsed(&self) -> Duration {
        self.completed
            .and_then(|completed| (completed - self.started).to_std().ok())
            .unwrap_or_default()
    }

    /// The `index`th recorded action, if it ran and carries entries of type `T`.
    pub fn action<T: Entries + 'static>(&self, index: usize) -> Option<&ActionResult<T>> {
        self.actions
            .get(index)
            .and_then(|action| action.as_any().downcast_ref())
    }
}

impl Outcome for ExecutionResult {
    fn succeeded(&self) -> bool {
        self.success()
    }
}

/// Resources matched by a selector list. Empty means nothing to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved<R> {
    pub selectors: String,
    pub resources: Vec<R>,
}

impl<R: Resource + fmt::Debug> Entries for Resolved<R> {
    fn success(&self) -> bool {
        !self.resources.is_empty()
    }

    fn lines(&self) -> Vec<String> {
        if self.resources.is_empty() {
            return vec![format!("nothing matches {}", self.selectors)];
        }
        self.resources
            .iter()
            .map(|resource| resource.name().to_string())
            .collect()
    }
}

/// First stage of every command: resolves selectors through a provider.
#[derive(Debug)]
pub struct MapResources<P> {
    name: &'static str,
    provider: P,
}

impl<P: Provider> MapResources<P> {
    pub fn new(name: &'static str, provider: P) -> Self {
        Self { name, provider }
    }
}

impl<P> Action for MapResources<P>
where
    P: Provider,
    P::Resource: fmt::Debug + 'static,
{
    type Input = Selectors;
    type Output = Resolved<P::Resource>;

    fn name(&self) -> &str {
        self.name
    }

    fn run(&self, selectors: &Selectors) -> Self::Output {
        Resolved {
            selectors: selectors.to_string(),
            resources: self.provider.resolve(selectors),
        }
    }
}
