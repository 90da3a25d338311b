//! In-memory reference run: map everything, sort, group, reduce.
//!
//! Used as the oracle for the distributed engine and by the `sequential`
//! binary.

use itertools::Itertools;
use tracing::warn;

use crate::{MapReduce, Pair};

pub fn run(app: &dyn MapReduce, records: impl IntoIterator<Item = Pair>) -> Vec<Pair> {
    let mut intermediate = records
        .into_iter()
        .flat_map(|record| match invoke(app.map(&record.key, &record.value)) {
            Ok(pairs) => pairs,
            Err(e) => {
                warn!(key = %record.key, "map failed: {e:#}");
                vec![]
            }
        })
        .collect_vec();

    intermediate.sort();

    let mut output = vec![];
    for (key, group) in &intermediate.into_iter().group_by(|kv| kv.key.clone()) {
        let values = group.map(|kv| kv.value).collect_vec();
        match invoke(app.reduce(&key, values)) {
            Ok(mut pairs) => output.append(&mut pairs),
            Err(e) => warn!(%key, "reduce failed: {e:#}"),
        }
    }
    output
}

fn invoke(emit: anyhow::Result<crate::Emit<'_>>) -> anyhow::Result<Vec<Pair>> {
    emit?.collect()
}
