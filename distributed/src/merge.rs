//! k-way merge over sorted pair streams.

use std::{cmp::Reverse, collections::BinaryHeap};

use common::Pair;
use futures::{stream, Stream, StreamExt};

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct Head {
    pair: Pair,
    source: usize,
}

/// Merges sources that are each sorted by key then value into one sorted
/// sequence. Every pair of every source comes out exactly once; nothing is
/// deduplicated.
///
/// Only the current head of each source is held in memory. Each source is
/// read left to right once, so the merge cannot be restarted.
pub struct KWayMerge<S> {
    sources: Vec<S>,
    heads: BinaryHeap<Reverse<Head>>,
    primed: bool,
}

impl<S, E> KWayMerge<S>
where
    S: Stream<Item = Result<Pair, E>> + Unpin,
{
    pub fn new(sources: Vec<S>) -> Self {
        let heads = BinaryHeap::with_capacity(sources.len());
        Self {
            sources,
            heads,
            primed: false,
        }
    }

    async fn advance(&mut self, source: usize) -> Result<(), E> {
        if let Some(item) = self.sources[source].next().await {
            self.heads.push(Reverse(Head { pair: item?, source }));
        }
        Ok(())
    }

    async fn prime(&mut self) -> Result<(), E> {
        if !self.primed {
            for source in 0..self.sources.len() {
                self.advance(source).await?;
            }
            self.primed = true;
        }
        Ok(())
    }

    /// Smallest pair not yet returned.
    pub async fn next_pair(&mut self) -> Result<Option<Pair>, E> {
        self.prime().await?;
        let Some(Reverse(head)) = self.heads.pop() else {
            return Ok(None);
        };
        self.advance(head.source).await?;
        Ok(Some(head.pair))
    }

    /// Next key with every value for it across all sources.
    pub async fn next_group(&mut self) -> Result<Option<(String, Vec<String>)>, E> {
        let Some(first) = self.next_pair().await? else {
            return Ok(None);
        };
        let key = first.key;
        let mut values = vec![first.value];
        while matches!(self.heads.peek(), Some(Reverse(head)) if head.pair.key == key) {
            if let Some(pair) = self.next_pair().await? {
                values.push(pair.value);
            }
        }
        Ok(Some((key, values)))
    }

    pub fn into_stream(self) -> impl Stream<Item = Result<Pair, E>> {
        stream::try_unfold(self, |mut merge| async move {
            Ok(merge.next_pair().await?.map(|pair| (pair, merge)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{stream::Iter, TryStreamExt};
    use itertools::Itertools;
    use std::{collections::HashMap, convert::Infallible, vec::IntoIter};

    type Source = Iter<IntoIter<Result<Pair, Infallible>>>;

    fn source(pairs: &[(&str, &str)]) -> Source {
        let mut pairs = pairs.iter().map(|(k, v)| Pair::new(*k, *v)).collect_vec();
        pairs.sort();
        stream::iter(pairs.into_iter().map(Ok).collect_vec())
    }

    async fn merged(sources: Vec<Source>) -> Vec<Pair> {
        KWayMerge::new(sources)
            .into_stream()
            .try_collect()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_merge_is_sorted_and_total() {
        let out = merged(vec![
            source(&[("a", "1"), ("c", "1"), ("e", "1")]),
            source(&[("b", "1"), ("c", "1"), ("d", "1")]),
            source(&[("a", "2"), ("f", "1")]),
        ])
        .await;
        assert_eq!(out.len(), 8);
        assert!(out.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(out.iter().filter(|p| p.key == "c").count(), 2);
    }

    #[tokio::test]
    async fn test_value_multisets_preserved() {
        let inputs: Vec<Vec<(String, String)>> = (0..5)
            .map(|s| {
                (0..40)
                    .map(|i| (format!("k{}", (i * 7 + s) % 13), format!("{s}-{i}")))
                    .collect()
            })
            .collect();
        let sources = inputs
            .iter()
            .map(|pairs| {
                source(
                    &pairs
                        .iter()
                        .map(|(k, v)| (k.as_str(), v.as_str()))
                        .collect_vec(),
                )
            })
            .collect_vec();

        let out = merged(sources).await;
        assert_eq!(out.len(), 200);
        assert!(out.windows(2).all(|w| w[0].key <= w[1].key));

        let mut expected: HashMap<String, Vec<String>> = HashMap::new();
        for (k, v) in inputs.into_iter().flatten() {
            expected.entry(k).or_default().push(v);
        }
        let mut actual: HashMap<String, Vec<String>> = HashMap::new();
        for p in out {
            actual.entry(p.key).or_default().push(p.value);
        }
        for values in expected.values_mut().chain(actual.values_mut()) {
            values.sort();
        }
        assert_eq!(actual, expected);
    }

    #[tokio::test]
    async fn test_duplicates_across_sources_kept() {
        let out = merged(vec![
            source(&[("x", "1")]),
            source(&[("x", "1")]),
            source(&[("x", "1")]),
        ])
        .await;
        assert_eq!(out, vec![Pair::new("x", "1"); 3]);
    }

    #[tokio::test]
    async fn test_empty_sources() {
        assert!(merged(vec![]).await.is_empty());
        assert!(merged(vec![source(&[]), source(&[])]).await.is_empty());
        let out = merged(vec![source(&[]), source(&[("only", "1")]), source(&[])]).await;
        assert_eq!(out, vec![Pair::new("only", "1")]);
    }

    #[tokio::test]
    async fn test_groups() {
        let mut merge = KWayMerge::new(vec![
            source(&[("a", "1"), ("b", "1"), ("b", "2")]),
            source(&[("b", "3"), ("c", "1")]),
            source(&[("a", "4")]),
        ]);
        let mut groups = vec![];
        while let Some((key, mut values)) = merge.next_group().await.unwrap() {
            values.sort();
            groups.push((key, values));
        }
        assert_eq!(
            groups,
            vec![
                ("a".to_string(), vec!["1".to_string(), "4".to_string()]),
                (
                    "b".to_string(),
                    vec!["1".to_string(), "2".to_string(), "3".to_string()]
                ),
                ("c".to_string(), vec!["1".to_string()]),
            ]
        );
    }

    #[tokio::test]
    async fn test_source_error_propagates() {
        let good = stream::iter(vec![Ok(Pair::new("a", "1")), Ok(Pair::new("z", "1"))]);
        let bad = stream::iter(vec![Ok(Pair::new("b", "1")), Err("disk gone")]);
        let result: Result<Vec<Pair>, &str> =
            KWayMerge::new(vec![good, bad]).into_stream().try_collect().await;
        assert_eq!(result, Err("disk gone"));
    }
}
