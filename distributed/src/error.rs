use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Map,
    Reduce,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKind::Map => write!(f, "map"),
            TaskKind::Reduce => write!(f, "reduce"),
        }
    }
}

/// A task descriptor that can never run correctly.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("number of map tasks must be positive")]
    NoMapTasks,

    #[error("number of reduce tasks must be positive")]
    NoReduceTasks,

    #[error("task index {index} out of range 0..{count}")]
    IndexOutOfRange { index: usize, count: usize },

    #[error("expected {expected} source endpoints, got {actual}")]
    SourceCount { expected: usize, actual: usize },

    #[error("no source endpoint recorded for map task {0}")]
    MissingSource(usize),
}

/// Failure of a whole task. Record-level problems never surface here.
#[derive(Debug, Error)]
#[error("{kind} task {index} failed: {cause:#}")]
pub struct TaskError {
    pub kind: TaskKind,
    pub index: usize,
    #[source]
    pub cause: anyhow::Error,
}

impl TaskError {
    pub fn new(kind: TaskKind, index: usize, cause: impl Into<anyhow::Error>) -> Self {
        Self {
            kind,
            index,
            cause: cause.into(),
        }
    }
}
