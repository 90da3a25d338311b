use std::iter;

use anyhow::Context;
use itertools::Itertools;

use crate::{Emit, MapReduce, Pair};

/// Letters (excluding letter-like numerals such as `Ⅻ`) and decimal digits.
fn is_word_char(c: char) -> bool {
    (c.is_alphabetic() && !c.is_numeric()) || c.is_ascii_digit()
}

/// Lower-cased words of `contents`: each whitespace separated token keeps
/// only its letters and decimal digits, tokens left empty are dropped.
fn words(contents: &str) -> impl Iterator<Item = String> + Send + '_ {
    contents
        .split_whitespace()
        .map(|token| {
            token
                .chars()
                .filter(|c| is_word_char(*c))
                .flat_map(char::to_lowercase)
                .collect::<String>()
        })
        .filter(|w| !w.is_empty())
}

/// word_count
#[derive(Debug, Clone, Copy, Default)]
pub struct WordCount;

impl MapReduce for WordCount {
    fn name(&self) -> &str {
        "wc"
    }

    fn map<'a>(&'a self, _key: &'a str, value: &'a str) -> anyhow::Result<Emit<'a>> {
        Ok(Box::new(words(value).map(|w| Ok(Pair::new(w, "1")))))
    }

    fn reduce<'a>(&'a self, key: &'a str, values: Vec<String>) -> anyhow::Result<Emit<'a>> {
        let mut count: i64 = 0;
        for v in &values {
            let n: i64 = v
                .parse()
                .with_context(|| format!("count `{v}` for key `{key}` is not an integer"))?;
            count += n;
        }
        Ok(Box::new(iter::once(Ok(Pair::new(key, count.to_string())))))
    }
}

/// indexer: which records mention each word
#[derive(Debug, Clone, Copy, Default)]
pub struct Indexer;

impl MapReduce for Indexer {
    fn name(&self) -> &str {
        "indexer"
    }

    fn map<'a>(&'a self, key: &'a str, value: &'a str) -> anyhow::Result<Emit<'a>> {
        Ok(Box::new(
            words(value).unique().map(move |w| Ok(Pair::new(w, key))),
        ))
    }

    fn reduce<'a>(&'a self, key: &'a str, values: Vec<String>) -> anyhow::Result<Emit<'a>> {
        let sources = values.into_iter().sorted().dedup().collect_vec();
        let value = format!("{} {}", sources.len(), sources.join(","));
        Ok(Box::new(iter::once(Ok(Pair::new(key, value)))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(emit: anyhow::Result<Emit<'_>>) -> Vec<Pair> {
        emit.unwrap().map(Result::unwrap).collect()
    }

    #[test]
    fn test_wc_map_folds_case_and_punctuation() {
        let out = collect(WordCount.map("doc:1", "the cat sat. The CAT sat!"));
        let keys = out.iter().map(|p| p.key.as_str()).collect_vec();
        assert_eq!(keys, vec!["the", "cat", "sat", "the", "cat", "sat"]);
        assert!(out.iter().all(|p| p.value == "1"));
    }

    #[test]
    fn test_wc_map_keeps_digits_and_drops_empty_tokens() {
        let out = collect(WordCount.map("k", "  R2-D2 ... 42 -- "));
        let keys = out.iter().map(|p| p.key.as_str()).collect_vec();
        assert_eq!(keys, vec!["r2d2", "42"]);
    }

    #[test]
    fn test_wc_map_drops_non_decimal_numerics() {
        let out = collect(WordCount.map("k", "x² ½ e\u{301} Ⅻ 7"));
        let keys = out.iter().map(|p| p.key.as_str()).collect_vec();
        assert_eq!(keys, vec!["x", "e", "7"]);
    }

    #[test]
    fn test_wc_reduce_sums() {
        let out = collect(WordCount.reduce("cat", vec!["1".into(), "2".into(), "3".into()]));
        assert_eq!(out, vec![Pair::new("cat", "6")]);
    }

    #[test]
    fn test_wc_reduce_rejects_garbage() {
        let err = WordCount
            .reduce("cat", vec!["1".into(), "x".into()])
            .err()
            .unwrap();
        assert!(err.to_string().contains("cat"));
    }

    #[test]
    fn test_indexer() {
        let out = collect(Indexer.map("a.txt:3", "to be or not to be"));
        assert_eq!(out.len(), 4);
        assert!(out.iter().all(|p| p.value == "a.txt:3"));

        let out = collect(Indexer.reduce(
            "be",
            vec!["b:1".into(), "a:2".into(), "b:1".into()],
        ));
        assert_eq!(out, vec![Pair::new("be", "2 a:2,b:1")]);
    }
}
