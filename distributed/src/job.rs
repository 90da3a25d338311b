//! Drives a whole computation: split the corpus, run every map task, then
//! every reduce task, then gather the outputs.

use std::{
    future::Future,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
};

use anyhow::{anyhow, Context};
use common::{corpus, MapReduce, Pair};
use crossbeam_queue::ArrayQueue;
use dashmap::DashMap;
use futures::TryStreamExt;
use itertools::Itertools;
use tracing::{error, info};

use crate::{
    error::TaskError,
    naming::StoreName,
    store::{skip_malformed, Store},
    task::{Endpoint, MapTask, ReduceTask},
    workspace::Workspace,
};

/// Every line of every file, keyed by `<file>:<line>`.
pub async fn read_corpus(files: &[PathBuf]) -> anyhow::Result<Vec<Pair>> {
    let mut records = vec![];
    for file in files {
        let content = tokio::fs::read_to_string(file)
            .await
            .with_context(|| format!("reading {}", file.display()))?;
        records.extend(corpus::records(file, &content));
    }
    Ok(records)
}

/// Task counts for a corpus of `records` records. Explicit counts win;
/// otherwise M covers `rows_per_shard` records per shard and R is M / 2.
pub fn plan(
    records: usize,
    rows_per_shard: usize,
    n_map: Option<usize>,
    n_reduce: Option<usize>,
) -> (usize, usize) {
    let m = n_map
        .unwrap_or_else(|| records.div_ceil(rows_per_shard.max(1)))
        .max(1);
    let r = n_reduce.unwrap_or(m / 2).max(1);
    (m, r)
}

/// Pairs copied per transaction while gathering.
const GATHER_BATCH: usize = 512;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobReport {
    pub n_map: usize,
    pub n_reduce: usize,
    pub map_records: u64,
    pub intermediate: u64,
    pub keys: u64,
    pub output: u64,
}

#[derive(Debug, Default)]
struct Totals {
    records: AtomicU64,
    emitted: AtomicU64,
    keys: AtomicU64,
    written: AtomicU64,
}

pub struct Job {
    ws: Workspace,
    app: Arc<dyn MapReduce>,
    /// Where this job's map inputs and outputs can be fetched from.
    endpoint: Endpoint,
    workers: usize,
}

impl Job {
    pub fn new(ws: Workspace, app: Arc<dyn MapReduce>, endpoint: Endpoint, workers: usize) -> Self {
        Self {
            ws,
            app,
            endpoint,
            workers: workers.max(1),
        }
    }

    /// Writes `records` as `n_map` contiguous shards. Trailing shards may
    /// be empty.
    pub async fn split(&self, records: &[Pair], n_map: usize) -> anyhow::Result<()> {
        let n_map = n_map.max(1);
        let size = records.len().div_ceil(n_map).max(1);
        for m in 0..n_map {
            let start = (m * size).min(records.len());
            let end = ((m + 1) * size).min(records.len());
            let store = Store::create(self.ws.path(&StoreName::MapSource(m))).await?;
            store.insert_batch(&records[start..end]).await?;
            store.close().await;
        }
        info!(records = records.len(), n_map, "corpus split");
        Ok(())
    }

    /// Runs the map phase, then the reduce phase. Any task failure fails
    /// the job.
    pub async fn run(&self, n_map: usize, n_reduce: usize) -> anyhow::Result<JobReport> {
        let mut report = JobReport {
            n_map,
            n_reduce,
            ..Default::default()
        };

        let map_tasks = (0..n_map)
            .map(|n| MapTask::new(n_map, n_reduce, n, self.endpoint.clone()))
            .collect::<Result<Vec<_>, _>>()?;

        // Filled in as map tasks finish, in whatever order they finish.
        let locations: Arc<DashMap<usize, Endpoint>> = Arc::new(DashMap::new());
        let totals = Arc::new(Totals::default());

        let ws = self.ws.clone();
        let app = Arc::clone(&self.app);
        let endpoint = self.endpoint.clone();
        let done = Arc::clone(&locations);
        let counters = Arc::clone(&totals);
        run_pool(map_tasks, self.workers, move |task: MapTask| {
            let (ws, app, endpoint) = (ws.clone(), Arc::clone(&app), endpoint.clone());
            let (done, counters) = (Arc::clone(&done), Arc::clone(&counters));
            async move {
                let summary = task.execute(&ws, app.as_ref()).await?;
                counters.records.fetch_add(summary.records, Ordering::Relaxed);
                counters.emitted.fetch_add(summary.emitted, Ordering::Relaxed);
                done.insert(task.index(), endpoint);
                Ok::<_, TaskError>(())
            }
        })
        .await?;
        info!(n_map, "map phase done");

        let mut reduce_tasks = vec![];
        for r in 0..n_reduce {
            let mut task = ReduceTask::new(n_map, n_reduce, r)?;
            for entry in locations.iter() {
                task.set_source(*entry.key(), entry.value().clone())?;
            }
            reduce_tasks.push(task);
        }

        let ws = self.ws.clone();
        let app = Arc::clone(&self.app);
        let counters = Arc::clone(&totals);
        run_pool(reduce_tasks, self.workers, move |task: ReduceTask| {
            let (ws, app, counters) = (ws.clone(), Arc::clone(&app), Arc::clone(&counters));
            async move {
                let summary = task.execute(&ws, app.as_ref()).await?;
                counters.keys.fetch_add(summary.keys, Ordering::Relaxed);
                counters.written.fetch_add(summary.written, Ordering::Relaxed);
                Ok::<_, TaskError>(())
            }
        })
        .await?;
        info!(n_reduce, "reduce phase done");

        report.map_records = totals.records.load(Ordering::Relaxed);
        report.intermediate = totals.emitted.load(Ordering::Relaxed);
        report.keys = totals.keys.load(Ordering::Relaxed);
        report.output = totals.written.load(Ordering::Relaxed);
        Ok(report)
    }

    /// Copies every reduce output, bucket by bucket, into `target`.
    /// Malformed rows are skipped.
    pub async fn gather(&self, n_reduce: usize, target: &Path) -> anyhow::Result<u64> {
        let out = Store::create(target)
            .await
            .with_context(|| format!("creating {}", target.display()))?;
        let mut batch = Vec::with_capacity(GATHER_BATCH);
        let mut total = 0;
        for r in 0..n_reduce {
            let store = Store::open(self.ws.path(&StoreName::ReduceOutput(r))).await?;
            let mut pairs = skip_malformed(store.scan_ordered());
            while let Some(pair) = pairs
                .try_next()
                .await
                .with_context(|| format!("reading reduce output {r}"))?
            {
                batch.push(pair);
                if batch.len() >= GATHER_BATCH {
                    total += out.append(&mut batch).await?;
                }
            }
            total += out.append(&mut batch).await?;
            drop(pairs);
            store.close().await;
        }
        out.close().await;
        info!(pairs = total, target = %target.display(), "outputs gathered");
        Ok(total)
    }
}

/// Runs `tasks` on `workers` concurrent workers pulling from one queue.
/// After the first failure no new task is started; the first error is
/// returned once every worker has stopped.
async fn run_pool<T, F, Fut>(tasks: Vec<T>, workers: usize, f: F) -> anyhow::Result<()>
where
    T: Send + 'static,
    F: Fn(T) -> Fut + Clone + Send + 'static,
    Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
{
    if tasks.is_empty() {
        return Ok(());
    }
    let pending = Arc::new(ArrayQueue::new(tasks.len()));
    for task in tasks {
        pending
            .push(task)
            .map_err(|_| anyhow!("task queue overflow"))?;
    }
    let abort = Arc::new(AtomicBool::new(false));

    let handles = (0..workers.max(1))
        .map(|_| {
            let pending = Arc::clone(&pending);
            let abort = Arc::clone(&abort);
            let f = f.clone();
            tokio::spawn(async move {
                while !abort.load(Ordering::Acquire) {
                    let Some(task) = pending.pop() else { break };
                    if let Err(e) = f(task).await {
                        abort.store(true, Ordering::Release);
                        error!("{e}");
                        return Err(e);
                    }
                }
                Ok(())
            })
        })
        .collect_vec();

    let mut first = None;
    for handle in handles {
        let result = match handle.await {
            Ok(result) => result.map_err(anyhow::Error::from),
            Err(e) => Err(anyhow::Error::from(e).context("worker panicked")),
        };
        if let Err(e) = result {
            first.get_or_insert(e);
        }
    }
    first.map_or(Ok(()), Err)
}
