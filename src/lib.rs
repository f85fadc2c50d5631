pub mod analysis;
pub mod discovery;
pub mod errors;
pub mod file;
pub mod folds;
pub mod manifest;
pub mod metadata;
pub mod modality;
pub mod report;
pub mod save;
pub mod split;
pub mod transform;
pub mod volume;

pub use discovery::{Case, CaseFinder, CaseLayout, Discovery};
pub use manifest::{DatasetManifest, ManifestBuilder};
pub use metadata::*;
pub use modality::{Modality, NamingConvention};
pub use report::{CaseOutcome, Issue, IssueKind, RunSummary};
pub use transform::*;
pub use volume::Volume;
