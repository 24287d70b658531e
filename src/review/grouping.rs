//! Partitioning changed files into review units

use super::types::{Finding, PrFile, ReviewUnit};
use crate::retrieval::is_test_path;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

/// Inputs a grouping strategy may use besides the files themselves
#[derive(Debug, Clone, Copy)]
pub struct GroupingContext<'a> {
    pub findings_by_file: &'a BTreeMap<String, Vec<Finding>>,
    /// Upper bound on files placed into units
    pub max_files: usize,
}

/// Decides which files are reviewed together
pub trait FileGroupingStrategy: Send + Sync {
    fn group(&self, files: &[PrFile], ctx: &GroupingContext<'_>) -> Vec<ReviewUnit>;
}

/// Pairs each source file with its matching test, otherwise one file per unit.
///
/// Files with static findings come first, then larger changes.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultGroupingStrategy;

/// Stem shared by a source file and its tests, e.g. `parser` for
/// `src/parser.rs`, `tests/parser_test.rs` and `parser.spec.ts`
fn pairing_key(path: &str) -> String {
    let basename = Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(path);
    let stem = basename.split('.').next().unwrap_or(basename);
    let stem = stem.strip_suffix("Test").unwrap_or(stem);
    let lower = stem.to_lowercase();

    let mut key = lower.as_str();
    for prefix in ["test_", "test-"] {
        key = key.strip_prefix(prefix).unwrap_or(key);
    }
    for suffix in ["_test", "-test", "_spec", "-spec", "_tests"] {
        key = key.strip_suffix(suffix).unwrap_or(key);
    }
    key.to_string()
}

impl DefaultGroupingStrategy {
    fn prioritize<'f>(files: &'f [PrFile], ctx: &GroupingContext<'_>) -> Vec<&'f PrFile> {
        let mut ordered: Vec<&PrFile> = files.iter().collect();
        ordered.sort_by(|a, b| {
            let fa = ctx.findings_by_file.get(&a.filename).map_or(0, Vec::len);
            let fb = ctx.findings_by_file.get(&b.filename).map_or(0, Vec::len);
            fb.cmp(&fa)
                .then_with(|| b.changes().cmp(&a.changes()))
                .then_with(|| a.filename.cmp(&b.filename))
        });
        ordered.truncate(ctx.max_files);
        ordered
    }
}

impl FileGroupingStrategy for DefaultGroupingStrategy {
    fn group(&self, files: &[PrFile], ctx: &GroupingContext<'_>) -> Vec<ReviewUnit> {
        let selected = Self::prioritize(files, ctx);
        let keys: Vec<(String, bool)> = selected
            .iter()
            .map(|f| (pairing_key(&f.filename), is_test_path(&f.filename)))
            .collect();

        let mut assigned: HashSet<usize> = HashSet::new();
        let mut units = Vec::new();

        for (i, file) in selected.iter().enumerate() {
            if !assigned.insert(i) {
                continue;
            }
            let (ref key, is_test) = keys[i];
            let partner = (0..selected.len()).find(|&j| {
                !assigned.contains(&j) && keys[j].1 != is_test && !key.is_empty() && keys[j].0 == *key
            });

            match partner {
                Some(j) => {
                    assigned.insert(j);
                    let (source, test) = if is_test {
                        (selected[j], *file)
                    } else {
                        (*file, selected[j])
                    };
                    units.push(ReviewUnit {
                        primary_file: source.filename.clone(),
                        files: vec![source.clone(), test.clone()],
                    });
                }
                None => units.push(ReviewUnit::single((*file).clone())),
            }
        }

        units
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::review::types::Severity;

    fn group(files: &[PrFile], findings: &BTreeMap<String, Vec<Finding>>, max_files: usize) -> Vec<ReviewUnit> {
        let ctx = GroupingContext {
            findings_by_file: findings,
            max_files,
        };
        DefaultGroupingStrategy.group(files, &ctx)
    }

    #[test]
    fn test_pairing_key() {
        assert_eq!(pairing_key("src/parser.rs"), "parser");
        assert_eq!(pairing_key("tests/parser_test.rs"), "parser");
        assert_eq!(pairing_key("web/parser.spec.ts"), "parser");
        assert_eq!(pairing_key("src/test_parser.py"), "parser");
        assert_eq!(pairing_key("src/main/java/ParserTest.java"), "parser");
    }

    #[test]
    fn test_source_paired_with_test() {
        let files = vec![
            PrFile::new("tests/parser_test.rs", 40, 0),
            PrFile::new("src/parser.rs", 10, 2),
            PrFile::new("src/lexer.rs", 5, 5),
        ];
        let units = group(&files, &BTreeMap::new(), 50);

        assert_eq!(units.len(), 2);
        assert_eq!(units[0].primary_file, "src/parser.rs");
        let names: Vec<&str> = units[0].filenames().collect();
        assert_eq!(names, vec!["src/parser.rs", "tests/parser_test.rs"]);
        assert_eq!(units[1].primary_file, "src/lexer.rs");
    }

    #[test]
    fn test_files_with_findings_come_first() {
        let files = vec![PrFile::new("src/big.rs", 500, 0), PrFile::new("src/small.rs", 1, 0)];
        let mut findings = BTreeMap::new();
        findings.insert(
            "src/small.rs".to_string(),
            vec![Finding::new(Severity::High, "unchecked input")],
        );
        let units = group(&files, &findings, 50);
        assert_eq!(units[0].primary_file, "src/small.rs");
        assert_eq!(units[1].primary_file, "src/big.rs");
    }

    #[test]
    fn test_max_files_cap() {
        let files: Vec<PrFile> = (0..10).map(|i| PrFile::new(format!("src/m{}.rs", i), i, 0)).collect();
        let units = group(&files, &BTreeMap::new(), 4);
        assert_eq!(units.len(), 4);
        assert_eq!(units[0].primary_file, "src/m9.rs");
    }

    #[test]
    fn test_two_sources_do_not_pair() {
        let files = vec![PrFile::new("src/a/config.rs", 1, 0), PrFile::new("src/b/config.rs", 1, 0)];
        let units = group(&files, &BTreeMap::new(), 50);
        assert_eq!(units.len(), 2);
    }
}
