use std::{fmt, ops::Deref, sync::Arc};

use anyhow::bail;

pub mod apps;
pub mod corpus;
pub mod partition;
pub mod sequential;

pub use partition::partition;

/// A single key/value record flowing through the pipeline.
///
/// Ordering is by key, then by value, which is the order the merge engine
/// and ordered store scans agree on.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pair {
    pub key: String,
    pub value: String,
}

impl Pair {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.key, self.value)
    }
}

/// Output of a single map or reduce invocation.
///
/// The outer `Result` of the invocation covers failures discovered before
/// anything is emitted; an `Err` item covers failures found while the
/// sequence is being consumed. Either one abandons the whole invocation.
pub type Emit<'a> = Box<dyn Iterator<Item = anyhow::Result<Pair>> + Send + 'a>;

/// User supplied transformation logic.
pub trait MapReduce: Send + Sync {
    fn name(&self) -> &str;

    /// Called once per input record.
    fn map<'a>(&'a self, key: &'a str, value: &'a str) -> anyhow::Result<Emit<'a>>;

    /// Called once per distinct intermediate key with every value for it.
    fn reduce<'a>(&'a self, key: &'a str, values: Vec<String>) -> anyhow::Result<Emit<'a>>;
}

/// A loaded application, resolved by name.
#[derive(Clone)]
pub struct App {
    pub app_name: String,
    inner: Arc<dyn MapReduce>,
}

impl App {
    pub fn load(app_name: &str) -> anyhow::Result<Self> {
        let inner: Arc<dyn MapReduce> = match app_name {
            "wc" => Arc::new(apps::WordCount),
            "indexer" => Arc::new(apps::Indexer),
            other => bail!("unknown application `{other}` (expected one of: wc, indexer)"),
        };
        Ok(Self {
            app_name: app_name.to_string(),
            inner,
        })
    }

    /// Shared handle for executors that outlive the borrow of `self`.
    pub fn handle(&self) -> Arc<dyn MapReduce> {
        Arc::clone(&self.inner)
    }
}

impl Deref for App {
    type Target = dyn MapReduce;

    fn deref(&self) -> &Self::Target {
        self.inner.as_ref()
    }
}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("App").field("app_name", &self.app_name).finish()
    }
}
