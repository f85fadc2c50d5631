use snafu::Snafu;
use std::path::PathBuf;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum DatasetError {
    #[snafu(display("required directory does not exist: {}", path.display()))]
    MissingDirectory { path: PathBuf },

    #[snafu(display(
        "case {} found in both {} and {}",
        case_id,
        first.display(),
        second.display()
    ))]
    DuplicateCase {
        case_id: String,
        first: PathBuf,
        second: PathBuf,
    },

    #[snafu(display("IO error on {}", path.display()))]
    IOError {
        path: PathBuf,
        #[snafu(source(from(std::io::Error, Box::new)))]
        source: Box<std::io::Error>,
    },

    #[snafu(display("error parsing JSON file {}", path.display()))]
    JsonReadError {
        path: PathBuf,
        #[snafu(source(from(serde_json::Error, Box::new)))]
        source: Box<serde_json::Error>,
    },

    #[snafu(display("error serializing JSON"))]
    JsonWriteError {
        #[snafu(source(from(serde_json::Error, Box::new)))]
        source: Box<serde_json::Error>,
    },

    #[snafu(display("requested {} test patients but only {} are available", requested, available))]
    NotEnoughPatients { requested: usize, available: usize },

    #[snafu(display("no splits file found in any of {:?}", candidates))]
    MissingSplits { candidates: Vec<PathBuf> },
}
