use serde::{Deserialize, Serialize};
use snafu::{OptionExt, ResultExt};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::errors::dataset::{DatasetError, IOSnafu, MissingDirectorySnafu, MissingSplitsSnafu};
use crate::file::NiftiFileOperations;
use crate::manifest::{read_json, write_json};
use crate::report::{Issue, IssueKind};

pub const SPLITS_FILENAME: &str = "splits_final.json";

/// One cross-validation fold of an nnU-Net `splits_final.json`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct Fold {
    pub train: Vec<String>,
    pub val: Vec<String>,
}

pub fn read_folds<P: AsRef<Path>>(path: P) -> Result<Vec<Fold>, DatasetError> {
    read_json(path)
}

pub fn write_folds<P: AsRef<Path>>(folds: &[Fold], path: P) -> Result<(), DatasetError> {
    write_json(&folds, path)
}

/// Return the first candidate that exists
pub fn locate_splits(candidates: &[PathBuf]) -> Result<PathBuf, DatasetError> {
    candidates
        .iter()
        .find(|p| p.is_file())
        .cloned()
        .context(MissingSplitsSnafu {
            candidates: candidates.to_vec(),
        })
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Split `<base>_<slice>_<channel>` (extension already removed) into base id and slice id.
///
/// ```
/// use mslesseg_preprocessing::folds::parse_slice_stem;
/// assert_eq!(
///     parse_slice_stem("P1_T1_001_0000"),
///     Some(("P1_T1".to_string(), "P1_T1_001".to_string()))
/// );
/// ```
pub fn parse_slice_stem(stem: &str) -> Option<(String, String)> {
    let (rest, channel) = stem.rsplit_once('_')?;
    let (base, slice) = rest.rsplit_once('_')?;
    if base.is_empty() || !is_digits(slice) || !is_digits(channel) {
        return None;
    }
    Some((base.to_string(), rest.to_string()))
}

/// Slice ids of every base case found in a 2D `imagesTr` directory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SliceIndex(BTreeMap<String, BTreeSet<String>>);

impl SliceIndex {
    pub fn from_stems<I, S>(stems: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut index: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for stem in stems {
            if let Some((base, slice)) = parse_slice_stem(stem.as_ref()) {
                index.entry(base).or_default().insert(slice);
            }
        }
        SliceIndex(index)
    }

    pub fn from_dir<P: AsRef<Path>>(dir: P) -> Result<Self, DatasetError> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return MissingDirectorySnafu { path: dir }.fail();
        }
        let files = dir.find_niftis().context(IOSnafu { path: dir })?;
        let index = Self::from_stems(files.iter().filter_map(|f| f.nifti_stem()));
        tracing::info!("Found {} base cases in {}", index.len(), dir.display());
        Ok(index)
    }

    /// Sorted slice ids of a base case
    pub fn slices(&self, base_id: &str) -> Option<&BTreeSet<String>> {
        self.0.get(base_id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn expand_ids(ids: &[String], index: &SliceIndex, issues: &mut Vec<Issue>) -> Vec<String> {
    let mut expanded = Vec::new();
    for base_id in ids {
        match index.slices(base_id) {
            Some(slices) => expanded.extend(slices.iter().cloned()),
            None => issues.push(Issue::new(
                base_id.clone(),
                IssueKind::UnknownCase,
                "no slices found for this case",
            )),
        }
    }
    expanded
}

/// Replace every base case id in the folds with its slice ids. Ids without slices are dropped
/// and reported.
pub fn expand_folds(folds: &[Fold], index: &SliceIndex) -> (Vec<Fold>, Vec<Issue>) {
    let mut issues = Vec::new();
    let expanded = folds
        .iter()
        .enumerate()
        .map(|(i, fold)| {
            let fold = Fold {
                train: expand_ids(&fold.train, index, &mut issues),
                val: expand_ids(&fold.val, index, &mut issues),
            };
            tracing::info!(
                "Fold {}: {} train, {} val slices",
                i,
                fold.train.len(),
                fold.val.len()
            );
            fold
        })
        .collect();
    (expanded, issues)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[rstest]
    #[case("P1_T1_001_0000", Some(("P1_T1", "P1_T1_001")))]
    #[case("P12_010_0002", Some(("P12", "P12_010")))]
    #[case("P1_T1_001", None)]
    #[case("P1_T1_abc_0000", None)]
    #[case("_001_0000", None)]
    #[case("P1", None)]
    fn test_parse_slice_stem(#[case] stem: &str, #[case] expected: Option<(&str, &str)>) {
        let expected = expected.map(|(a, b)| (a.to_string(), b.to_string()));
        assert_eq!(parse_slice_stem(stem), expected);
    }

    #[test]
    fn test_expand_folds() {
        let index = SliceIndex::from_stems([
            "P1_T1_002_0000",
            "P1_T1_001_0000",
            "P1_T1_001_0001",
            "P2_T1_001_0000",
            "P3_T1_005_0000",
        ]);
        let folds = vec![
            Fold {
                train: ids(&["P1_T1", "P4_T1"]),
                val: ids(&["P2_T1"]),
            },
            Fold {
                train: ids(&["P2_T1", "P3_T1"]),
                val: ids(&["P1_T1"]),
            },
        ];

        let (expanded, issues) = expand_folds(&folds, &index);
        assert_eq!(expanded.len(), 2);
        assert_eq!(expanded[0].train, ids(&["P1_T1_001", "P1_T1_002"]));
        assert_eq!(expanded[0].val, ids(&["P2_T1_001"]));
        assert_eq!(expanded[1].train, ids(&["P2_T1_001", "P3_T1_005"]));
        assert_eq!(expanded[1].val, ids(&["P1_T1_001", "P1_T1_002"]));
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].case_id, "P4_T1");
        assert_eq!(issues[0].kind, IssueKind::UnknownCase);
    }

    #[test]
    fn test_folds_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join(SPLITS_FILENAME);
        let folds = vec![Fold {
            train: ids(&["P1_T1_001"]),
            val: ids(&["P2_T1_001"]),
        }];
        write_folds(&folds, &path).unwrap();
        assert_eq!(read_folds(&path).unwrap(), folds);
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("\n        \"train\": ["));
    }

    #[test]
    fn test_locate_splits() {
        let temp_dir = TempDir::new().unwrap();
        let preprocessed = temp_dir.path().join("pre").join(SPLITS_FILENAME);
        let raw = temp_dir.path().join("raw").join(SPLITS_FILENAME);
        let candidates = vec![preprocessed.clone(), raw.clone()];
        assert!(matches!(
            locate_splits(&candidates),
            Err(DatasetError::MissingSplits { .. })
        ));

        write_folds(&[], &raw).unwrap();
        assert_eq!(locate_splits(&candidates).unwrap(), raw);
        write_folds(&[], &preprocessed).unwrap();
        assert_eq!(locate_splits(&candidates).unwrap(), preprocessed);
    }

    #[test]
    fn test_slice_index_from_dir() {
        let temp_dir = TempDir::new().unwrap();
        for name in ["P1_T1_001_0000.nii.gz", "P1_T1_001_0001.nii.gz", "notes.txt"] {
            std::fs::write(temp_dir.path().join(name), b"").unwrap();
        }
        let index = SliceIndex::from_dir(temp_dir.path()).unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index.slices("P1_T1").unwrap().len(), 1);
        assert!(SliceIndex::from_dir(temp_dir.path().join("missing")).is_err());
    }
}
