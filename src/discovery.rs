use itertools::Itertools;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::errors::dataset::{DatasetError, DuplicateCaseSnafu, IOSnafu, MissingDirectorySnafu};
use crate::file::NiftiFileOperations;
use crate::modality::{Modality, NamingConvention, CHANNELS};
use crate::report::{Issue, IssueKind};
use snafu::ResultExt;

/// Where a case sits in the source tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseLayout {
    /// `root/<split>/P<i>/T<j>/P<i>_T<j>_<MOD>`
    Timepoint,
    /// `root/<split>/P<i>/P<i>_<MOD>`
    Patient,
}

impl fmt::Display for CaseLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let layout_str = match self {
            CaseLayout::Timepoint => "timepoint",
            CaseLayout::Patient => "patient",
        };
        write!(f, "{}", layout_str)
    }
}

/// Patient owning a case: the case id up to the first `_`
pub fn patient_id(case_id: &str) -> String {
    case_id.split('_').next().unwrap_or(case_id).to_string()
}

#[derive(Debug, Clone, PartialEq)]
pub struct Case {
    pub id: String,
    pub patient_id: String,
    pub dir: PathBuf,
    pub layout: CaseLayout,
    pub files: BTreeMap<Modality, PathBuf>,
}

impl Case {
    pub fn path(&self, modality: Modality) -> Option<&Path> {
        self.files.get(&modality).map(PathBuf::as_path)
    }

    pub fn mask(&self) -> Option<&Path> {
        self.path(Modality::Mask)
    }

    /// Image channels without a file, in channel order
    pub fn missing_channels(&self) -> Vec<Modality> {
        CHANNELS
            .iter()
            .filter(|m| !self.files.contains_key(m))
            .copied()
            .collect()
    }

    pub fn has_all_channels(&self) -> bool {
        self.missing_channels().is_empty()
    }

    /// Extension of the primary modality file, used for outputs that have no single source
    pub fn extension(&self) -> &'static str {
        self.path(Modality::PRIMARY)
            .and_then(|p| p.nifti_extension())
            .unwrap_or(crate::file::NIFTI_GZ_EXTENSION)
    }
}

/// Cases keyed by id, plus the problems met while grouping files
#[derive(Debug, Clone, Default)]
pub struct Discovery {
    pub cases: BTreeMap<String, Case>,
    pub issues: Vec<Issue>,
}

impl Discovery {
    /// Cases grouped by owning patient
    pub fn patients(&self) -> BTreeMap<String, Vec<&Case>> {
        let mut patients: BTreeMap<String, Vec<&Case>> = BTreeMap::new();
        for case in self.cases.values() {
            patients
                .entry(case.patient_id.clone())
                .or_default()
                .push(case);
        }
        patients
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }
}

/// Groups NIfTI files into cases using the filename suffix of each modality.
#[derive(Debug, Clone, Copy, Default)]
pub struct CaseFinder {
    convention: NamingConvention,
}

impl CaseFinder {
    pub fn new(convention: NamingConvention) -> Self {
        CaseFinder { convention }
    }

    /// Walk `root` and group every NIfTI file into a case.
    ///
    /// Groups without the primary modality are skipped with an issue. A case id found in two
    /// directories is an error.
    pub fn discover<P: AsRef<Path>>(&self, root: P) -> Result<Discovery, DatasetError> {
        let root = root.as_ref();
        if !root.is_dir() {
            return MissingDirectorySnafu { path: root }.fail();
        }
        let files = root
            .find_niftis_with_spinner()
            .context(IOSnafu { path: root })?;
        self.group(files)
    }

    /// Group already listed files. Input order does not matter.
    pub fn group<I>(&self, files: I) -> Result<Discovery, DatasetError>
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let mut groups: BTreeMap<(String, PathBuf), BTreeMap<Modality, PathBuf>> = BTreeMap::new();
        for file in files.into_iter().sorted() {
            let Some(stem) = file.nifti_stem() else {
                continue;
            };
            let Some((case_id, modality)) = self.convention.parse_stem(&stem) else {
                tracing::debug!("Ignoring {}", file.display());
                continue;
            };
            let dir = file.parent().map(Path::to_path_buf).unwrap_or_default();
            let group = groups.entry((case_id, dir)).or_default();
            match group.get(&modality) {
                Some(existing) => tracing::warn!(
                    "Ignoring {}, {} already provides {}",
                    file.display(),
                    existing.display(),
                    modality
                ),
                None => {
                    group.insert(modality, file);
                }
            }
        }

        let mut discovery = Discovery::default();
        let mut seen: BTreeMap<String, PathBuf> = BTreeMap::new();
        for ((case_id, dir), files) in groups {
            if let Some(first) = seen.get(&case_id) {
                return DuplicateCaseSnafu {
                    case_id,
                    first: first.clone(),
                    second: dir,
                }
                .fail();
            }
            seen.insert(case_id.clone(), dir.clone());

            if !files.contains_key(&Modality::PRIMARY) {
                let found = files.keys().map(Modality::name).join(", ");
                discovery.issues.push(Issue::new(
                    case_id,
                    IssueKind::MissingPrimaryModality,
                    format!("no {} in {} (found {})", Modality::PRIMARY, dir.display(), found),
                ));
                continue;
            }

            let layout = match dir.file_name().and_then(|n| n.to_str()) {
                Some(name) if name == case_id => CaseLayout::Patient,
                _ => CaseLayout::Timepoint,
            };
            let case = Case {
                patient_id: patient_id(&case_id),
                id: case_id.clone(),
                dir,
                layout,
                files,
            };

            let missing = case.missing_channels();
            if !missing.is_empty() {
                discovery.issues.push(Issue::new(
                    case_id.clone(),
                    IssueKind::MissingSecondaryModality,
                    format!("missing {}", missing.iter().map(Modality::name).join(", ")),
                ));
            }
            if case.mask().is_none() {
                discovery.issues.push(Issue::new(
                    case_id.clone(),
                    IssueKind::MissingLabel,
                    "no lesion mask",
                ));
            }
            discovery.cases.insert(case_id, case);
        }

        tracing::info!(
            "Discovered {} cases from {} patients",
            discovery.cases.len(),
            discovery.patients().len()
        );
        Ok(discovery)
    }
}
