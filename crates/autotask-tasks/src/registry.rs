use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{Result, TaskError};

/// Error type callables return; anything `Error + Send + Sync` converts into it.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Positional and keyword arguments of one invocation.
///
/// Stored JSON-encoded in the `arguments` column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskArgs {
    #[serde(default)]
    pub args: Vec<Value>,
    #[serde(default)]
    pub kwargs: Map<String, Value>,
}

impl TaskArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from positional values only.
    pub fn positional(values: impl IntoIterator<Item = Value>) -> Self {
        Self {
            args: values.into_iter().collect(),
            kwargs: Map::new(),
        }
    }

    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwargs.insert(name.into(), value.into());
        self
    }

    /// Decode positional argument `index`.
    pub fn get<T: DeserializeOwned>(&self, index: usize) -> Result<T> {
        let value = self
            .args
            .get(index)
            .ok_or_else(|| TaskError::MissingArgument(format!("position {index}")))?;
        Ok(T::deserialize(value)?)
    }

    /// Decode keyword argument `name`, `None` when it was not given.
    pub fn get_kwarg<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        self.kwargs
            .get(name)
            .map(|value| T::deserialize(value).map_err(TaskError::from))
            .transpose()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(raw: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(raw)?)
    }
}

/// A unit of work a worker can execute.
///
/// Implemented for every `Fn(TaskArgs) -> Result<Value, BoxError>` closure.
pub trait TaskFn: Send + Sync + 'static {
    fn call(&self, args: TaskArgs) -> std::result::Result<Value, BoxError>;
}

impl<F> TaskFn for F
where
    F: Fn(TaskArgs) -> std::result::Result<Value, BoxError> + Send + Sync + 'static,
{
    fn call(&self, args: TaskArgs) -> std::result::Result<Value, BoxError> {
        self(args)
    }
}

/// Stable identity of a registered callable: the `module`/`function` pair
/// recorded on every entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskTarget {
    pub module: String,
    pub function: String,
}

impl TaskTarget {
    pub fn new(module: impl Into<String>, function: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            function: function.into(),
        }
    }
}

impl fmt::Display for TaskTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.module, self.function)
    }
}

/// Name → callable table, built identically at startup by the host process
/// (which only enqueues) and by every worker process (which executes).
#[derive(Clone, Default)]
pub struct Registry {
    tasks: HashMap<TaskTarget, Arc<dyn TaskFn>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `task` under `module.function`, replacing any previous entry.
    pub fn register(
        &mut self,
        module: impl Into<String>,
        function: impl Into<String>,
        task: impl TaskFn,
    ) -> TaskTarget {
        let target = TaskTarget::new(module, function);
        debug!(%target, "task registered");
        self.tasks.insert(target.clone(), Arc::new(task));
        target
    }

    pub fn resolve(&self, module: &str, function: &str) -> Option<Arc<dyn TaskFn>> {
        self.tasks
            .get(&TaskTarget::new(module, function))
            .map(Arc::clone)
    }

    pub fn contains(&self, target: &TaskTarget) -> bool {
        self.tasks.contains_key(target)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn targets(&self) -> impl Iterator<Item = &TaskTarget> {
        self.tasks.keys()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("targets", &self.targets().collect::<Vec<_>>())
            .finish()
    }
}
