// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Page ordering — recover each page file's ordinal from its name
// (`<anything>_<ordinal>.<ext>`) and sort a file set into reading order.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use scanprep_core::error::{Result, ScanprepError};
use tracing::{debug, instrument, warn};

/// Name of the merged output that shares a directory with its inputs.
pub const DEFAULT_MERGE_SENTINEL: &str = "percentage.pdf";

/// Sort key for a page file. Names without a parseable ordinal compare
/// greater than every parsed ordinal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum OrdinalKey {
    Parsed(i64),
    Unparsed,
}

/// Parse the ordinal of a page file name.
///
/// The ordinal is the token after the last `_`, cut at its first `.`.
/// Returns `None` when the token is not an integer.
///
/// ```
/// use scanprep_document::page_ordinal;
/// assert_eq!(page_ordinal("final_output_page_12.png"), Some(12));
/// assert_eq!(page_ordinal("scan_x.png"), None);
/// ```
pub fn page_ordinal(file_name: &str) -> Option<i64> {
    let token = file_name.rsplit('_').next().unwrap_or(file_name);
    let stem = token.split('.').next().unwrap_or(token);
    stem.parse::<i64>().ok()
}

fn ordinal_key(file_name: &str) -> OrdinalKey {
    page_ordinal(file_name).map_or(OrdinalKey::Unparsed, OrdinalKey::Parsed)
}

/// Produces a deterministic total order over a set of page files.
#[derive(Debug, Clone)]
pub struct PageOrderer {
    /// Output file name excluded from every input set.
    sentinel: Option<String>,
}

impl Default for PageOrderer {
    fn default() -> Self {
        Self::new()
    }
}

impl PageOrderer {
    /// Orderer excluding [`DEFAULT_MERGE_SENTINEL`].
    pub fn new() -> Self {
        Self::with_sentinel(DEFAULT_MERGE_SENTINEL)
    }

    /// Orderer excluding the given output file name.
    pub fn with_sentinel(sentinel: impl Into<String>) -> Self {
        Self {
            sentinel: Some(sentinel.into()),
        }
    }

    /// Orderer that keeps every input.
    pub fn without_sentinel() -> Self {
        Self { sentinel: None }
    }

    pub fn sentinel(&self) -> Option<&str> {
        self.sentinel.as_deref()
    }

    fn is_sentinel(&self, file_name: &str) -> bool {
        self.sentinel.as_deref() == Some(file_name)
    }

    /// Order file names by ordinal. Ties and unparseable names keep their
    /// enumeration order.
    pub fn order<S: AsRef<str>>(&self, names: &[S]) -> Vec<String> {
        let mut kept: Vec<&str> = names
            .iter()
            .map(AsRef::as_ref)
            .filter(|name| !self.is_sentinel(name))
            .collect();
        // `sort_by_key` is stable, which is what keeps ties in place.
        kept.sort_by_key(|name| ordinal_key(name));
        kept.into_iter().map(str::to_owned).collect()
    }

    /// Order paths by the ordinal in their file name.
    pub fn order_paths(&self, paths: Vec<PathBuf>) -> Vec<PathBuf> {
        let mut keyed: Vec<(OrdinalKey, PathBuf)> = paths
            .into_iter()
            .filter_map(|path| {
                let name = file_name_of(&path)?;
                if self.is_sentinel(&name) {
                    return None;
                }
                Some((ordinal_key(&name), path))
            })
            .collect();
        keyed.sort_by(|a, b| a.0.cmp(&b.0));
        keyed.into_iter().map(|(_, path)| path).collect()
    }

    /// Enumerate `dir`, keep files whose extension is in `extensions`
    /// (case-insensitive), and order them.
    ///
    /// Enumeration is alphabetical so that ties resolve the same way on
    /// every filesystem.
    #[instrument(skip(self, extensions), fields(dir = %dir.as_ref().display()))]
    pub fn order_directory(
        &self,
        dir: impl AsRef<Path>,
        extensions: &[&str],
    ) -> Result<Vec<PathBuf>> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(ScanprepError::InputNotFound(dir.display().to_string()));
        }

        let mut candidates = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let matches_ext = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)));
            if matches_ext {
                candidates.push(path);
            }
        }
        candidates.sort_by(|a, b| compare_names(a, b));

        let ordered = self.order_paths(candidates);
        let unparsed = ordered
            .iter()
            .filter_map(|p| file_name_of(p))
            .filter(|name| page_ordinal(name).is_none())
            .count();
        if unparsed > 0 {
            warn!(unparsed, "Page files without an ordinal were placed last");
        }
        debug!(files = ordered.len(), "Directory ordered");
        Ok(ordered)
    }
}

fn file_name_of(path: &Path) -> Option<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
}

fn compare_names(a: &Path, b: &Path) -> Ordering {
    a.file_name().cmp(&b.file_name())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unparseable_names_sort_last() {
        let orderer = PageOrderer::new();
        let ordered = orderer.order(&["scan_2.png", "scan_1.png", "scan_x.png"]);
        assert_eq!(ordered, vec!["scan_1.png", "scan_2.png", "scan_x.png"]);
    }

    #[test]
    fn ordinal_is_numeric_not_lexicographic() {
        let orderer = PageOrderer::new();
        let ordered = orderer.order(&["p_10.pdf", "p_9.pdf", "p_100.pdf", "p_1.pdf"]);
        assert_eq!(ordered, vec!["p_1.pdf", "p_9.pdf", "p_10.pdf", "p_100.pdf"]);
    }

    #[test]
    fn ties_and_missing_ordinals_keep_enumeration_order() {
        let orderer = PageOrderer::without_sentinel();
        let names = ["b_3.pdf", "zeta.pdf", "a_3.pdf", "cover.pdf", "c_1.pdf"];
        let ordered = orderer.order(&names);
        assert_eq!(
            ordered,
            vec!["c_1.pdf", "b_3.pdf", "a_3.pdf", "zeta.pdf", "cover.pdf"]
        );
    }

    #[test]
    fn ordering_is_repeatable() {
        let orderer = PageOrderer::new();
        let names = ["x_5.png", "x_2.png", "junk.png", "x_2.jpg", "x_0.png"];
        let first = orderer.order(&names);
        let second = orderer.order(&first);
        assert_eq!(first, second);
        assert_eq!(first, orderer.order(&names));
    }

    #[test]
    fn sentinel_is_excluded() {
        let orderer = PageOrderer::new();
        let ordered = orderer.order(&["doc_2.pdf", "percentage.pdf", "doc_1.pdf"]);
        assert_eq!(ordered, vec!["doc_1.pdf", "doc_2.pdf"]);
    }

    #[test]
    fn ordinal_token_stops_at_first_dot() {
        assert_eq!(page_ordinal("scan_7.tar.gz"), Some(7));
        assert_eq!(page_ordinal("no-underscore.png"), None);
        assert_eq!(page_ordinal("trailing_.png"), None);
        assert_eq!(page_ordinal("signed_-3.png"), Some(-3));
    }

    #[test]
    fn order_paths_uses_file_name_only() {
        let orderer = PageOrderer::new();
        let ordered = orderer.order_paths(vec![
            PathBuf::from("/tmp/run_9/page_2.png"),
            PathBuf::from("/tmp/run_1/page_1.png"),
        ]);
        assert_eq!(
            ordered,
            vec![
                PathBuf::from("/tmp/run_1/page_1.png"),
                PathBuf::from("/tmp/run_9/page_2.png"),
            ]
        );
    }

    #[test]
    fn order_directory_filters_extension_and_sentinel() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["doc_2.pdf", "doc_1.PDF", "percentage.pdf", "notes_0.txt", "doc_x.pdf"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("nested_0.pdf")).unwrap();

        let ordered = PageOrderer::new()
            .order_directory(dir.path(), &["pdf"])
            .unwrap();
        let names: Vec<String> = ordered
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["doc_1.PDF", "doc_2.pdf", "doc_x.pdf"]);
    }

    #[test]
    fn order_directory_missing_dir_is_input_error() {
        let err = PageOrderer::new()
            .order_directory("/no/such/dir/anywhere", &["pdf"])
            .unwrap_err();
        assert!(matches!(err, ScanprepError::InputNotFound(_)));
    }
}
