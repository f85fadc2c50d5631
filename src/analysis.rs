use snafu::ResultExt;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::errors::dataset::{DatasetError, IOSnafu, MissingDirectorySnafu};
use crate::file::{find_dirs, find_files, NIFTI_EXTENSION, NIFTI_GZ_EXTENSION};

pub const REPORT_FILENAME: &str = "dataset_analysis.txt";
pub const TRAIN_DIR: &str = "train";
pub const TEST_DIR: &str = "test";

/// Timepoint directories found under a training patient
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TimepointCombination {
    T1,
    T1T2,
    T1T2T3,
    T1T2T3T4,
    Other,
}

impl TimepointCombination {
    pub const ALL: [TimepointCombination; 5] = [
        TimepointCombination::T1,
        TimepointCombination::T1T2,
        TimepointCombination::T1T2T3,
        TimepointCombination::T1T2T3T4,
        TimepointCombination::Other,
    ];

    pub fn classify<S: AsRef<str>>(dirs: &[S]) -> Self {
        let dirs = dirs.iter().map(|d| d.as_ref()).collect::<BTreeSet<&str>>();
        let dirs = dirs.into_iter().collect::<Vec<_>>();
        match dirs.as_slice() {
            ["T1"] => TimepointCombination::T1,
            ["T1", "T2"] => TimepointCombination::T1T2,
            ["T1", "T2", "T3"] => TimepointCombination::T1T2T3,
            ["T1", "T2", "T3", "T4"] => TimepointCombination::T1T2T3T4,
            _ => TimepointCombination::Other,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            TimepointCombination::T1 => "T1",
            TimepointCombination::T1T2 => "T1 + T2",
            TimepointCombination::T1T2T3 => "T1 + T2 + T3",
            TimepointCombination::T1T2T3T4 => "T1 + T2 + T3 + T4",
            TimepointCombination::Other => "Other combinations",
        }
    }
}

/// T1/T2 sequence files present in one timepoint directory. FLAIR and MASK are not counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SequencePresence {
    OnlyT1,
    OnlyT2,
    Both,
    Other,
}

impl SequencePresence {
    pub const ALL: [SequencePresence; 4] = [
        SequencePresence::OnlyT1,
        SequencePresence::OnlyT2,
        SequencePresence::Both,
        SequencePresence::Other,
    ];

    pub fn classify(has_t1: bool, has_t2: bool) -> Self {
        match (has_t1, has_t2) {
            (true, false) => SequencePresence::OnlyT1,
            (false, true) => SequencePresence::OnlyT2,
            (true, true) => SequencePresence::Both,
            (false, false) => SequencePresence::Other,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            SequencePresence::OnlyT1 => "Only Pi_Ti_T1",
            SequencePresence::OnlyT2 => "Only Pi_Ti_T2",
            SequencePresence::Both => "Both T1 and T2",
            SequencePresence::Other => "Neither",
        }
    }
}

/// FLAIR/T1/T2 files present for one test patient
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TestPresence {
    OnlyFlair,
    OnlyT1,
    OnlyT2,
    All,
    Other,
}

impl TestPresence {
    pub const ALL: [TestPresence; 5] = [
        TestPresence::OnlyFlair,
        TestPresence::OnlyT1,
        TestPresence::OnlyT2,
        TestPresence::All,
        TestPresence::Other,
    ];

    pub fn classify(has_flair: bool, has_t1: bool, has_t2: bool) -> Self {
        match (has_flair, has_t1, has_t2) {
            (true, false, false) => TestPresence::OnlyFlair,
            (false, true, false) => TestPresence::OnlyT1,
            (false, false, true) => TestPresence::OnlyT2,
            (true, true, true) => TestPresence::All,
            _ => TestPresence::Other,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            TestPresence::OnlyFlair => "Only Pi_FLAIR",
            TestPresence::OnlyT1 => "Only Pi_T1",
            TestPresence::OnlyT2 => "Only Pi_T2",
            TestPresence::All => "All three",
            TestPresence::Other => "Other",
        }
    }
}

fn file_names(paths: Vec<PathBuf>) -> Vec<String> {
    paths
        .iter()
        .filter_map(|path| path.file_name()?.to_str().map(str::to_string))
        .collect()
}

fn subdirectories(dir: &Path) -> Result<Vec<String>, DatasetError> {
    find_dirs(dir).map(file_names).context(IOSnafu { path: dir })
}

fn files(dir: &Path) -> Result<Vec<String>, DatasetError> {
    find_files(dir).map(file_names).context(IOSnafu { path: dir })
}

fn require_dir(dir: &Path) -> Result<(), DatasetError> {
    if dir.is_dir() {
        Ok(())
    } else {
        MissingDirectorySnafu { path: dir }.fail()
    }
}

/// `name` is `<stem>.nii` or `<stem>.nii.gz`
fn is_nifti_named(name: &str, stem: &str) -> bool {
    [NIFTI_GZ_EXTENSION, NIFTI_EXTENSION]
        .iter()
        .any(|ext| name.strip_suffix(ext) == Some(stem))
}

/// `name` starts with `prefix` and ends in `<suffix>.nii` or `<suffix>.nii.gz`
fn has_sequence(names: &[String], prefix: &str, suffix: &str) -> bool {
    names.iter().any(|name| {
        name.starts_with(prefix)
            && [NIFTI_GZ_EXTENSION, NIFTI_EXTENSION]
                .iter()
                .any(|ext| name.ends_with(&format!("{suffix}{ext}")))
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrainAnalysis {
    pub timepoints: BTreeMap<TimepointCombination, usize>,
    pub sequences: BTreeMap<SequencePresence, usize>,
}

impl TrainAnalysis {
    /// Analyze `<train>/P<i>/T<j>/` directories
    pub fn analyze<P: AsRef<Path>>(train_dir: P) -> Result<Self, DatasetError> {
        let train_dir = train_dir.as_ref();
        require_dir(train_dir)?;
        let mut analysis = TrainAnalysis::default();

        for patient in subdirectories(train_dir)? {
            let patient_dir = train_dir.join(&patient);
            let timepoints = subdirectories(&patient_dir)?
                .into_iter()
                .filter(|d| d.to_uppercase().starts_with('T'))
                .collect::<Vec<_>>();
            *analysis
                .timepoints
                .entry(TimepointCombination::classify(&timepoints))
                .or_default() += 1;

            for timepoint in timepoints.iter() {
                let names = files(&patient_dir.join(timepoint))?;
                let prefix = format!("{patient}_{timepoint}_");
                let presence = SequencePresence::classify(
                    has_sequence(&names, &prefix, "T1"),
                    has_sequence(&names, &prefix, "T2"),
                );
                *analysis.sequences.entry(presence).or_default() += 1;
            }
        }
        Ok(analysis)
    }

    pub fn timepoint_count(&self, combination: TimepointCombination) -> usize {
        self.timepoints.get(&combination).copied().unwrap_or(0)
    }

    pub fn sequence_count(&self, presence: SequencePresence) -> usize {
        self.sequences.get(&presence).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestAnalysis {
    pub patients: BTreeMap<TestPresence, usize>,
}

impl TestAnalysis {
    /// Analyze `<test>/P<i>/P<i>_<MOD>` files
    pub fn analyze<P: AsRef<Path>>(test_dir: P) -> Result<Self, DatasetError> {
        let test_dir = test_dir.as_ref();
        require_dir(test_dir)?;
        let mut analysis = TestAnalysis::default();

        for patient in subdirectories(test_dir)? {
            let names = files(&test_dir.join(&patient))?;
            let has = |modality: &str| {
                let stem = format!("{patient}_{modality}");
                names.iter().any(|name| is_nifti_named(name, &stem))
            };
            let presence = TestPresence::classify(has("FLAIR"), has("T1"), has("T2"));
            *analysis.patients.entry(presence).or_default() += 1;
        }
        Ok(analysis)
    }

    pub fn count(&self, presence: TestPresence) -> usize {
        self.patients.get(&presence).copied().unwrap_or(0)
    }
}

/// Presence statistics over the raw `train/` and `test/` trees
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatasetAnalysis {
    pub train: TrainAnalysis,
    pub test: TestAnalysis,
}

impl DatasetAnalysis {
    pub fn analyze<P: AsRef<Path>>(root: P) -> Result<Self, DatasetError> {
        let root = root.as_ref();
        Ok(DatasetAnalysis {
            train: TrainAnalysis::analyze(root.join(TRAIN_DIR))?,
            test: TestAnalysis::analyze(root.join(TEST_DIR))?,
        })
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<(), DatasetError> {
        let path = path.as_ref();
        std::fs::write(path, self.to_string()).context(IOSnafu { path })
    }
}

impl fmt::Display for DatasetAnalysis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "TRAIN:")?;
        writeln!(f, "Timepoints per patient (P):")?;
        for combination in TimepointCombination::ALL {
            writeln!(
                f,
                "- {}: {}",
                combination.label(),
                self.train.timepoint_count(combination)
            )?;
        }
        writeln!(f)?;
        writeln!(f, "Sequence files per timepoint (P>T):")?;
        for presence in SequencePresence::ALL {
            writeln!(
                f,
                "- {}: {}",
                presence.label(),
                self.train.sequence_count(presence)
            )?;
        }
        writeln!(f)?;
        writeln!(f)?;
        writeln!(f, "TEST:")?;
        writeln!(f, "Files per patient (P):")?;
        for presence in TestPresence::ALL {
            writeln!(f, "- {}: {}", presence.label(), self.test.count(presence))?;
        }
        Ok(())
    }
}
