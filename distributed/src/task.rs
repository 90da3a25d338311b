use std::{fmt, num::NonZeroUsize};

use crate::error::ConfigError;

/// Where a task's input can be read from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// Already in the executing workspace's root.
    Local,
    /// `host:port` of a file-serving endpoint.
    Remote(String),
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Local => write!(f, "local"),
            Endpoint::Remote(addr) => write!(f, "{addr}"),
        }
    }
}

fn counts(n_map: usize, n_reduce: usize) -> Result<(NonZeroUsize, NonZeroUsize), ConfigError> {
    let m = NonZeroUsize::new(n_map).ok_or(ConfigError::NoMapTasks)?;
    let r = NonZeroUsize::new(n_reduce).ok_or(ConfigError::NoReduceTasks)?;
    Ok((m, r))
}

fn check_index(index: usize, count: NonZeroUsize) -> Result<(), ConfigError> {
    if index >= count.get() {
        return Err(ConfigError::IndexOutOfRange {
            index,
            count: count.get(),
        });
    }
    Ok(())
}

/// One shard of the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapTask {
    pub(crate) n_map: NonZeroUsize,
    pub(crate) n_reduce: NonZeroUsize,
    pub(crate) index: usize,
    pub(crate) source: Endpoint,
}

impl MapTask {
    pub fn new(
        n_map: usize,
        n_reduce: usize,
        index: usize,
        source: Endpoint,
    ) -> Result<Self, ConfigError> {
        let (n_map, n_reduce) = counts(n_map, n_reduce)?;
        check_index(index, n_map)?;
        Ok(Self {
            n_map,
            n_reduce,
            index,
            source,
        })
    }

    pub fn n_map(&self) -> usize {
        self.n_map.get()
    }

    pub fn n_reduce(&self) -> usize {
        self.n_reduce.get()
    }

    pub fn index(&self) -> usize {
        self.index
    }
}

/// One bucket of the intermediate key space, with the location of every
/// map task's contribution to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReduceTask {
    pub(crate) n_map: NonZeroUsize,
    pub(crate) n_reduce: NonZeroUsize,
    pub(crate) index: usize,
    pub(crate) sources: Vec<Option<Endpoint>>,
}

impl ReduceTask {
    /// Task with no sources recorded yet.
    pub fn new(n_map: usize, n_reduce: usize, index: usize) -> Result<Self, ConfigError> {
        let (n_map, n_reduce) = counts(n_map, n_reduce)?;
        check_index(index, n_reduce)?;
        Ok(Self {
            n_map,
            n_reduce,
            index,
            sources: vec![None; n_map.get()],
        })
    }

    pub fn with_sources(
        n_reduce: usize,
        index: usize,
        sources: Vec<Endpoint>,
    ) -> Result<Self, ConfigError> {
        let mut task = Self::new(sources.len(), n_reduce, index)?;
        task.sources = sources.into_iter().map(Some).collect();
        Ok(task)
    }

    /// Records where map task `map` left its output.
    pub fn set_source(&mut self, map: usize, endpoint: Endpoint) -> Result<(), ConfigError> {
        check_index(map, self.n_map)?;
        self.sources[map] = Some(endpoint);
        Ok(())
    }

    /// All M endpoints, in map task order.
    pub fn sources(&self) -> Result<Vec<&Endpoint>, ConfigError> {
        if self.sources.len() != self.n_map.get() {
            return Err(ConfigError::SourceCount {
                expected: self.n_map.get(),
                actual: self.sources.len(),
            });
        }
        self.sources
            .iter()
            .enumerate()
            .map(|(m, ep)| ep.as_ref().ok_or(ConfigError::MissingSource(m)))
            .collect()
    }

    pub fn n_map(&self) -> usize {
        self.n_map.get()
    }

    pub fn index(&self) -> usize {
        self.index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_task_validation() {
        assert_eq!(
            MapTask::new(0, 1, 0, Endpoint::Local),
            Err(ConfigError::NoMapTasks)
        );
        assert_eq!(
            MapTask::new(1, 0, 0, Endpoint::Local),
            Err(ConfigError::NoReduceTasks)
        );
        assert_eq!(
            MapTask::new(2, 1, 2, Endpoint::Local),
            Err(ConfigError::IndexOutOfRange { index: 2, count: 2 })
        );
        let task = MapTask::new(3, 5, 2, Endpoint::Remote("h:1".into())).unwrap();
        assert_eq!((task.n_map(), task.n_reduce(), task.index()), (3, 5, 2));
    }

    #[test]
    fn test_reduce_task_validation() {
        assert_eq!(ReduceTask::new(0, 1, 0), Err(ConfigError::NoMapTasks));
        assert_eq!(ReduceTask::new(1, 0, 0), Err(ConfigError::NoReduceTasks));
        assert_eq!(
            ReduceTask::new(4, 2, 2),
            Err(ConfigError::IndexOutOfRange { index: 2, count: 2 })
        );
        assert_eq!(
            ReduceTask::with_sources(1, 0, vec![]),
            Err(ConfigError::NoMapTasks)
        );
    }

    #[test]
    fn test_sources_fill_in_as_maps_complete() {
        let mut task = ReduceTask::new(3, 2, 1).unwrap();
        assert_eq!(task.sources(), Err(ConfigError::MissingSource(0)));

        task.set_source(2, Endpoint::Remote("b:1".into())).unwrap();
        task.set_source(0, Endpoint::Local).unwrap();
        assert_eq!(task.sources(), Err(ConfigError::MissingSource(1)));
        assert_eq!(
            task.set_source(3, Endpoint::Local),
            Err(ConfigError::IndexOutOfRange { index: 3, count: 3 })
        );

        task.set_source(1, Endpoint::Remote("a:1".into())).unwrap();
        let sources = task.sources().unwrap();
        assert_eq!(sources[1], &Endpoint::Remote("a:1".into()));
        assert_eq!(sources.len(), 3);
    }
}
