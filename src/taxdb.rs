//src/taxdb.rs

use ahash::{AHashMap, AHashSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::{ExtractError, Result};
use crate::types::{TaxId, TaxonSet, UNCLASSIFIED};

/// `parent -> direct children`, children kept in the order they were read.
#[derive(Debug, Default, Clone)]
pub struct ChildMap {
    children: AHashMap<TaxId, Vec<TaxId>>,
}

impl ChildMap {
    /// Build from a stream of `(child, parent)` pairs. Self-pairs are dropped,
    /// which keeps the root (`1 -> 1` in NCBI dumps) from pointing at itself.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (TaxId, TaxId)>,
    {
        let mut children: AHashMap<TaxId, Vec<TaxId>> = AHashMap::new();
        for (child, parent) in pairs {
            if child != parent {
                children.entry(parent).or_default().push(child);
            }
        }
        ChildMap { children }
    }

    /// Parses a taxonomy table, one pair per line:
    /// ```text
    /// <child_taxid>\t<parent_taxid>[\t...]
    /// ```
    /// NCBI `nodes.dmp` rows (`1\t|\t1\t|\tno rank\t|...`) are accepted too.
    /// Lines without two numeric fields are skipped.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| ExtractError::file_access(path, e))?;
        let reader = BufReader::new(file);

        let mut pairs = Vec::new();
        for line_result in reader.lines() {
            let line = line_result?;
            match parse_pair(&line) {
                Some(pair) => pairs.push(pair),
                None => log::debug!("Skipping taxonomy line: {line:?}"),
            }
        }
        let child_map = Self::from_pairs(pairs);
        log::debug!("Loaded taxonomy with {} parent taxa", child_map.parent_count());
        Ok(child_map)
    }

    pub fn children(&self, parent: TaxId) -> &[TaxId] {
        self.children.get(&parent).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn parent_count(&self) -> usize {
        self.children.len()
    }

    /// All taxa below `root`, excluding `root` itself unless a cycle leads
    /// back to it. Each taxon is expanded once, so cyclic tables terminate.
    pub fn descendants(&self, root: TaxId) -> TaxonSet {
        let mut found = TaxonSet::new();
        let mut expanded: AHashSet<TaxId> = AHashSet::new();
        let mut stack = vec![root];

        while let Some(taxid) = stack.pop() {
            if !expanded.insert(taxid) {
                continue;
            }
            for &child in self.children(taxid) {
                found.insert(child);
                if !expanded.contains(&child) {
                    stack.push(child);
                }
            }
        }
        if found.contains(&root) {
            log::warn!("Taxonomy table has a cycle through taxon {root}");
        }
        found
    }
}

fn parse_pair(line: &str) -> Option<(TaxId, TaxId)> {
    let separator = if line.contains("\t|\t") { "\t|\t" } else { "\t" };
    let mut fields = line.split(separator);
    let child = fields.next()?.trim().parse().ok()?;
    let parent = fields.next()?.trim().parse().ok()?;
    Some((child, parent))
}

/// Expand `seeds` with every descendant found in `child_map`.
/// Without a table the seeds are returned unchanged.
pub fn resolve(seeds: &TaxonSet, child_map: Option<&ChildMap>) -> TaxonSet {
    let Some(child_map) = child_map else {
        return seeds.clone();
    };

    let mut resolved = seeds.clone();
    for &seed in seeds {
        resolved.extend(child_map.descendants(seed));
    }
    log::info!(
        "Found {} descendant taxa of {} requested",
        resolved.len() - seeds.len(),
        seeds.len()
    );
    resolved
}

/// Parses requested taxa such as `9606,562` or `U`.
/// `U` and `unclassified` stand for the unclassified sentinel.
pub fn parse_taxon_ids<S: AsRef<str>>(tokens: &[S]) -> Result<TaxonSet> {
    let mut seeds = TaxonSet::new();
    for token in tokens.iter().flat_map(|t| t.as_ref().split(',')) {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        let taxid = if token.eq_ignore_ascii_case("u") || token.eq_ignore_ascii_case("unclassified") {
            UNCLASSIFIED
        } else {
            token.parse().map_err(|_| {
                ExtractError::Configuration(format!("invalid taxon ID {token:?}"))
            })?
        };
        seeds.insert(taxid);
    }
    if seeds.is_empty() {
        return Err(ExtractError::Configuration("no taxon IDs given".to_string()));
    }
    Ok(seeds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn set(ids: &[TaxId]) -> TaxonSet {
        ids.iter().copied().collect()
    }

    #[test]
    fn test_resolve_without_table_returns_seeds() {
        let seeds = set(&[9606, 562, UNCLASSIFIED]);
        assert_eq!(resolve(&seeds, None), seeds);
    }

    #[test]
    fn test_resolve_closure() {
        let map = ChildMap::from_pairs(vec![(10, 1), (11, 1), (12, 10)]);
        assert_eq!(resolve(&set(&[1]), Some(&map)), set(&[1, 10, 11, 12]));
        assert_eq!(resolve(&set(&[10]), Some(&map)), set(&[10, 12]));
        assert_eq!(resolve(&set(&[12]), Some(&map)), set(&[12]));
    }

    #[test]
    fn test_self_pairs_are_dropped() {
        let map = ChildMap::from_pairs(vec![(1, 1), (2, 1), (2, 2), (3, 2)]);
        for parent in [1, 2, 3] {
            assert!(!map.children(parent).contains(&parent));
        }
        assert_eq!(map.children(1), &[2]);
        assert_eq!(map.children(2), &[3]);
        assert_eq!(map.parent_count(), 2);
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let map = ChildMap::from_pairs(vec![(2, 1), (3, 1), (4, 2), (5, 4), (6, 3), (8, 7)]);
        let once = resolve(&set(&[2, 7]), Some(&map));
        let twice = resolve(&once, Some(&map));
        assert!(twice.is_superset(&once));
        assert_eq!(twice, once);
    }

    #[test]
    fn test_diamond_collapses_duplicates() {
        // 4 is reachable through both 2 and 3
        let map = ChildMap::from_pairs(vec![(2, 1), (3, 1), (4, 2), (4, 3)]);
        assert_eq!(resolve(&set(&[1]), Some(&map)), set(&[1, 2, 3, 4]));
    }

    #[test]
    fn test_cycle_terminates() {
        let map = ChildMap::from_pairs(vec![(2, 1), (3, 2), (1, 3)]);
        assert_eq!(resolve(&set(&[1]), Some(&map)), set(&[1, 2, 3]));
    }

    #[test]
    fn test_from_path_reads_plain_and_nodes_dmp() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "1\t1").unwrap();
        writeln!(file, "10\t1\tBacteria\tsuperkingdom").unwrap();
        writeln!(file, "11\t|\t1\t|\tno rank\t|").unwrap();
        writeln!(file, "garbage line").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "12\t10").unwrap();
        file.flush().unwrap();

        let map = ChildMap::from_path(file.path()).unwrap();
        assert_eq!(map.children(1), &[10, 11]);
        assert_eq!(map.children(10), &[12]);
        assert_eq!(resolve(&set(&[1]), Some(&map)), set(&[1, 10, 11, 12]));
    }

    #[test]
    fn test_from_path_missing_file() {
        let err = ChildMap::from_path("/nonexistent/taxonomy.tsv").unwrap_err();
        assert!(matches!(err, ExtractError::FileAccess { .. }));
    }

    #[test]
    fn test_parse_taxon_ids() {
        let seeds = parse_taxon_ids(&["9606,562", "U"]).unwrap();
        assert_eq!(seeds, set(&[9606, 562, UNCLASSIFIED]));
        assert!(matches!(
            parse_taxon_ids(&["96x6"]),
            Err(ExtractError::Configuration(_))
        ));
        assert!(parse_taxon_ids(&[","]).is_err());
    }
}
