use indicatif::{ParallelProgressIterator, ProgressFinish};
use itertools::Itertools;
use rayon::prelude::*;
use std::fmt;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::file::default_bar;

/// Per-case problems collected during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IssueKind {
    /// No FLAIR file, the case is skipped
    MissingPrimaryModality,
    /// Some image channels are absent, the case is kept
    MissingSecondaryModality,
    /// No lesion mask
    MissingLabel,
    /// A file could not be read, the case is skipped
    LoadError,
    /// A modality disagrees with the case geometry and is dropped
    ShapeMismatch,
    /// An output could not be written
    SaveError,
    /// A case id referenced by a split file has no slices
    UnknownCase,
}

impl IssueKind {
    /// Kinds that mean work was lost and make the run exit non-zero
    pub fn is_failure(&self) -> bool {
        matches!(self, IssueKind::LoadError | IssueKind::SaveError)
    }

    pub fn name(&self) -> &'static str {
        match self {
            IssueKind::MissingPrimaryModality => "MissingPrimaryModality",
            IssueKind::MissingSecondaryModality => "MissingSecondaryModality",
            IssueKind::MissingLabel => "MissingLabel",
            IssueKind::LoadError => "LoadError",
            IssueKind::ShapeMismatch => "ShapeMismatch",
            IssueKind::SaveError => "SaveError",
            IssueKind::UnknownCase => "UnknownCase",
        }
    }
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Issue {
    pub case_id: String,
    pub kind: IssueKind,
    pub message: String,
}

impl Issue {
    pub fn new<S: Into<String>, M: Into<String>>(case_id: S, kind: IssueKind, message: M) -> Self {
        Issue {
            case_id: case_id.into(),
            kind,
            message: message.into(),
        }
    }

    /// Emit the issue at the level its kind warrants
    pub fn log(&self) {
        match self.kind {
            IssueKind::MissingSecondaryModality | IssueKind::MissingLabel => info!("{}", self),
            _ => warn!("{}", self),
        }
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.kind, self.case_id, self.message)
    }
}

/// Files written and issues raised while processing one case
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaseOutcome {
    pub case_id: String,
    pub written: Vec<PathBuf>,
    pub issues: Vec<Issue>,
}

impl CaseOutcome {
    pub fn new<S: Into<String>>(case_id: S) -> Self {
        CaseOutcome {
            case_id: case_id.into(),
            ..Default::default()
        }
    }

    pub fn issue<M: Into<String>>(&mut self, kind: IssueKind, message: M) {
        self.issues
            .push(Issue::new(self.case_id.clone(), kind, message));
    }

    pub fn first_failure(&self) -> Option<&Issue> {
        self.issues.iter().find(|i| i.kind.is_failure())
    }
}

/// End of run report
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub cases: usize,
    pub written: usize,
    pub issues: Vec<Issue>,
}

impl RunSummary {
    /// Merge case outcomes with run level issues, ordered by case id
    pub fn new(outcomes: &[CaseOutcome], issues: impl IntoIterator<Item = Issue>) -> Self {
        let issues = outcomes
            .iter()
            .flat_map(|o| o.issues.iter().cloned())
            .chain(issues)
            .sorted()
            .collect::<Vec<_>>();
        RunSummary {
            cases: outcomes.len(),
            written: outcomes.iter().map(|o| o.written.len()).sum(),
            issues,
        }
    }

    pub fn count(&self, kind: IssueKind) -> usize {
        self.issues.iter().filter(|i| i.kind == kind).count()
    }

    pub fn has_failures(&self) -> bool {
        self.issues.iter().any(|i| i.kind.is_failure())
    }

    /// 1 if any case lost work, 0 otherwise
    pub fn exit_code(&self) -> i32 {
        if self.has_failures() {
            1
        } else {
            0
        }
    }

    pub fn log(&self) {
        for issue in self.issues.iter() {
            issue.log();
        }
        let counts = self
            .issues
            .iter()
            .counts_by(|i| i.kind)
            .into_iter()
            .sorted()
            .map(|(kind, n)| format!("{}={}", kind, n))
            .join(", ");
        info!(
            "Processed {} cases, wrote {} files, {} issues{}",
            self.cases,
            self.written,
            self.issues.len(),
            if counts.is_empty() {
                String::new()
            } else {
                format!(" ({})", counts)
            }
        );
    }
}

/// Run `func` over every item on the rayon pool with a progress bar. Outcomes come back sorted
/// by case id. In strict mode the first case reporting a failure aborts the run.
pub fn process_cases<T, F>(
    items: Vec<T>,
    message: &'static str,
    strict: bool,
    func: F,
) -> Result<Vec<CaseOutcome>, Issue>
where
    T: Send,
    F: Fn(T) -> CaseOutcome + Sync + Send,
{
    let pb = default_bar(items.len() as u64).with_finish(ProgressFinish::AndLeave);
    pb.set_message(message);

    let mut outcomes = if strict {
        items
            .into_par_iter()
            .progress_with(pb)
            .map(|item| {
                let outcome = func(item);
                match outcome.first_failure() {
                    Some(issue) => Err(issue.clone()),
                    None => Ok(outcome),
                }
            })
            .collect::<Result<Vec<_>, _>>()?
    } else {
        items
            .into_par_iter()
            .progress_with(pb)
            .map(func)
            .collect::<Vec<_>>()
    };
    outcomes.sort_by(|a, b| a.case_id.cmp(&b.case_id));
    Ok(outcomes)
}
