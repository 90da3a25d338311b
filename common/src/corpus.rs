//! Turning text files into input records.

use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::Pair;

/// One record per line of `content`, keyed by `<file>:<line>` with lines
/// counted from zero.
pub fn records<'a>(file: &'a Path, content: &'a str) -> impl Iterator<Item = Pair> + 'a {
    content
        .lines()
        .enumerate()
        .map(move |(i, line)| Pair::new(format!("{}:{}", file.display(), i), line))
}

/// Every line of every file, in file order.
pub fn read_corpus(files: &[PathBuf]) -> anyhow::Result<Vec<Pair>> {
    let mut out = vec![];
    for file in files {
        let content = std::fs::read_to_string(file)
            .with_context(|| format!("reading {}", file.display()))?;
        out.extend(records(file, &content));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_records_keys_by_line() {
        let got = records(Path::new("a.txt"), "one\n\ntwo two").collect::<Vec<_>>();
        assert_eq!(
            got,
            vec![
                Pair::new("a.txt:0", "one"),
                Pair::new("a.txt:1", ""),
                Pair::new("a.txt:2", "two two"),
            ]
        );
    }

    #[test]
    fn test_read_corpus() {
        let dir = TempDir::new().unwrap();
        let (a, b) = (dir.path().join("a.txt"), dir.path().join("b.txt"));
        std::fs::write(&a, "x\ny\n").unwrap();
        std::fs::write(&b, "z").unwrap();
        let got = read_corpus(&[a.clone(), b.clone()]).unwrap();
        assert_eq!(got.len(), 3);
        assert_eq!(got[2], Pair::new(format!("{}:0", b.display()), "z"));

        let err = read_corpus(&[dir.path().join("missing.txt")]).unwrap_err();
        assert!(err.to_string().contains("missing.txt"), "{err}");
    }
}
