use std::path::PathBuf;

use anyhow::Context;
use common::{partition, MapReduce, Pair};
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{
    error::{TaskError, TaskKind},
    naming::StoreName,
    store::Store,
    task::{Endpoint, MapTask},
    workspace::Workspace,
};

/// Pairs in flight between the mapper and the bucket writer.
const HANDOFF_CAPACITY: usize = 1024;
/// Pairs buffered per bucket before a transaction is committed.
const INSERT_BATCH: usize = 512;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MapSummary {
    /// Input records handed to the mapper.
    pub records: u64,
    /// Input records that could not be decoded.
    pub skipped: u64,
    /// Mapper invocations that returned an error.
    pub failed: u64,
    pub emitted: u64,
    /// Pairs written to each bucket, by bucket index.
    pub buckets: Vec<u64>,
}

impl MapTask {
    /// Runs the mapper over this shard and writes its R bucket files.
    ///
    /// Returns only once every emitted pair is committed to its bucket.
    pub async fn execute(
        &self,
        ws: &Workspace,
        app: &dyn MapReduce,
    ) -> Result<MapSummary, TaskError> {
        self.run(ws, app)
            .await
            .map_err(|e| TaskError::new(TaskKind::Map, self.index, e))
    }

    async fn run(&self, ws: &Workspace, app: &dyn MapReduce) -> anyhow::Result<MapSummary> {
        let input_path = self.resolve_input(ws).await?;
        let input = Store::open(&input_path).await?;

        let (tx, rx) = mpsc::channel(HANDOFF_CAPACITY);
        let writer = BucketWriter::new(ws, self.index, self.n_reduce.get());
        let n_reduce = self.n_reduce;
        let writer = tokio::spawn(writer.run(rx, move |key| partition(key, n_reduce)));

        // The writer is always joined, even when scanning fails, so no
        // insertion outlives this call.
        let scanned = self.produce(&input, app, tx).await;
        let written = writer.await.context("bucket writer panicked")?;
        input.close().await;

        let mut summary = scanned?;
        summary.buckets = written?;
        info!(
            task = self.index,
            records = summary.records,
            skipped = summary.skipped,
            failed = summary.failed,
            emitted = summary.emitted,
            "map task done"
        );
        Ok(summary)
    }

    async fn resolve_input(&self, ws: &Workspace) -> anyhow::Result<PathBuf> {
        let source = StoreName::MapSource(self.index);
        match &self.source {
            Endpoint::Local => Ok(ws.path(&source)),
            Endpoint::Remote(addr) => {
                let local = ws.path(&StoreName::MapInput(self.index));
                ws.fetcher().fetch(addr, &source, &local).await?;
                Ok(local)
            }
        }
    }

    async fn produce(
        &self,
        input: &Store,
        app: &dyn MapReduce,
        tx: mpsc::Sender<Pair>,
    ) -> anyhow::Result<MapSummary> {
        let mut summary = MapSummary::default();
        let mut records = input.scan_all();

        while let Some(record) = records.next().await {
            let record = match record {
                Ok(record) => record,
                Err(e) if e.is_malformed() => {
                    warn!(task = self.index, "skipping input record: {e}");
                    summary.skipped += 1;
                    continue;
                }
                Err(e) => return Err(e).context("reading map input"),
            };
            summary.records += 1;

            let emitted = match invoke(app.map(&record.key, &record.value)) {
                Ok(pairs) => pairs,
                Err(e) => {
                    warn!(task = self.index, key = %record.key, "map failed: {e:#}");
                    summary.failed += 1;
                    continue;
                }
            };

            for pair in emitted {
                if tx.send(pair).await.is_err() {
                    // Writer stopped early; its own error is reported when joined.
                    debug!(task = self.index, "bucket writer hung up");
                    return Ok(summary);
                }
                summary.emitted += 1;
            }
        }
        Ok(summary)
    }
}

/// Collects a whole invocation so a failure part way through keeps none of
/// its output.
pub(crate) fn invoke(emit: anyhow::Result<common::Emit<'_>>) -> anyhow::Result<Vec<Pair>> {
    emit?.collect()
}

/// Sole writer of one map task's bucket files.
struct BucketWriter {
    task: usize,
    paths: Vec<PathBuf>,
    stores: Vec<Option<Store>>,
    pending: Vec<Vec<Pair>>,
    written: Vec<u64>,
}

impl BucketWriter {
    fn new(ws: &Workspace, task: usize, n_reduce: usize) -> Self {
        let paths = (0..n_reduce)
            .map(|bucket| ws.path(&StoreName::MapOutput { map: task, bucket }))
            .collect();
        Self {
            task,
            paths,
            stores: (0..n_reduce).map(|_| None).collect(),
            pending: vec![vec![]; n_reduce],
            written: vec![0; n_reduce],
        }
    }

    async fn run(
        mut self,
        mut rx: mpsc::Receiver<Pair>,
        bucket_of: impl Fn(&str) -> usize,
    ) -> anyhow::Result<Vec<u64>> {
        while let Some(pair) = rx.recv().await {
            let bucket = bucket_of(&pair.key);
            self.pending[bucket].push(pair);
            if self.pending[bucket].len() >= INSERT_BATCH {
                self.flush(bucket).await?;
            }
        }

        // Every bucket file must exist afterwards, empty or not.
        for bucket in 0..self.paths.len() {
            self.flush(bucket).await?;
        }
        for store in self.stores.into_iter().flatten() {
            store.close().await;
        }
        debug!(task = self.task, written = ?self.written, "buckets closed");
        Ok(self.written)
    }

    async fn flush(&mut self, bucket: usize) -> anyhow::Result<()> {
        if self.stores[bucket].is_none() {
            let store = Store::create(&self.paths[bucket])
                .await
                .with_context(|| format!("creating {}", self.paths[bucket].display()))?;
            self.stores[bucket] = Some(store);
        }
        let batch = std::mem::take(&mut self.pending[bucket]);
        if let Some(store) = &self.stores[bucket] {
            store
                .insert_batch(&batch)
                .await
                .with_context(|| format!("writing {}", store.path().display()))?;
        }
        self.written[bucket] += batch.len() as u64;
        Ok(())
    }
}
