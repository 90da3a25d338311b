use std::path::PathBuf;

use anyhow::Context;
use common::{MapReduce, Pair};
use tracing::{debug, info, warn};

use crate::{
    error::{TaskError, TaskKind},
    map::invoke,
    merge::KWayMerge,
    naming::StoreName,
    store::{skip_malformed, Store},
    task::{Endpoint, ReduceTask},
    workspace::Workspace,
};

/// Output pairs buffered before a transaction is committed.
const OUTPUT_BATCH: usize = 512;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReduceSummary {
    /// Bucket files merged, one per map task.
    pub sources: usize,
    /// Intermediate pairs read across all sources.
    pub merged: u64,
    /// Distinct keys handed to the reducer.
    pub keys: u64,
    /// Keys whose reducer invocation failed.
    pub failed: u64,
    /// Pairs written to the output store.
    pub written: u64,
}

impl ReduceTask {
    /// Merges this bucket's contribution from every map task and reduces
    /// each distinct key exactly once.
    ///
    /// A source that cannot be fetched or opened fails the whole task.
    pub async fn execute(
        &self,
        ws: &Workspace,
        app: &dyn MapReduce,
    ) -> Result<ReduceSummary, TaskError> {
        self.run(ws, app)
            .await
            .map_err(|e| TaskError::new(TaskKind::Reduce, self.index, e))
    }

    async fn run(&self, ws: &Workspace, app: &dyn MapReduce) -> anyhow::Result<ReduceSummary> {
        let endpoints = self.sources()?;

        let mut inputs = Vec::with_capacity(endpoints.len());
        for (map, endpoint) in endpoints.into_iter().enumerate() {
            let path = self.resolve_bucket(ws, map, endpoint).await?;
            let store = Store::open(&path)
                .await
                .with_context(|| format!("opening bucket from map task {map}"))?;
            inputs.push(store);
        }

        let output_path = ws.path(&StoreName::ReduceOutput(self.index));
        let output = Store::create(&output_path)
            .await
            .with_context(|| format!("creating {}", output_path.display()))?;

        let mut summary = ReduceSummary {
            sources: inputs.len(),
            ..Default::default()
        };
        let scans = inputs
            .iter()
            .map(|store| skip_malformed(store.scan_ordered()))
            .collect();
        let mut merge = KWayMerge::new(scans);
        let mut batch = Vec::with_capacity(OUTPUT_BATCH);

        while let Some((key, values)) = merge.next_group().await.context("merging buckets")? {
            summary.keys += 1;
            summary.merged += values.len() as u64;
            debug!(task = self.index, %key, values = values.len(), "reducing");

            match invoke(app.reduce(&key, values)) {
                Ok(mut pairs) => batch.append(&mut pairs),
                Err(e) => {
                    warn!(task = self.index, %key, "reduce failed: {e:#}");
                    summary.failed += 1;
                    continue;
                }
            }
            if batch.len() >= OUTPUT_BATCH {
                summary.written += flush(&output, &mut batch).await?;
            }
        }
        summary.written += flush(&output, &mut batch).await?;

        drop(merge);
        for store in inputs {
            store.close().await;
        }
        output.close().await;

        info!(
            task = self.index,
            n_reduce = self.n_reduce.get(),
            sources = summary.sources,
            merged = summary.merged,
            keys = summary.keys,
            failed = summary.failed,
            written = summary.written,
            "reduce task done"
        );
        Ok(summary)
    }

    async fn resolve_bucket(
        &self,
        ws: &Workspace,
        map: usize,
        endpoint: &Endpoint,
    ) -> anyhow::Result<PathBuf> {
        let bucket = StoreName::MapOutput {
            map,
            bucket: self.index,
        };
        match endpoint {
            Endpoint::Local => Ok(ws.path(&bucket)),
            Endpoint::Remote(addr) => {
                let local = ws.path(&StoreName::ReduceInput {
                    map,
                    bucket: self.index,
                });
                ws.fetcher()
                    .fetch(addr, &bucket, &local)
                    .await
                    .with_context(|| format!("fetching bucket from map task {map}"))?;
                Ok(local)
            }
        }
    }
}

async fn flush(output: &Store, batch: &mut Vec<Pair>) -> anyhow::Result<u64> {
    output
        .append(batch)
        .await
        .with_context(|| format!("writing {}", output.path().display()))
}
