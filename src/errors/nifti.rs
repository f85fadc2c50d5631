use nifti::NiftiError as BaseNiftiError;
use snafu::Snafu;
use std::path::PathBuf;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum NiftiError {
    #[snafu(display("NIfTI file not found: {}", path.display()))]
    NotFound { path: PathBuf },

    #[snafu(display("error reading NIfTI file {}", path.display()))]
    ReadError {
        path: PathBuf,
        #[snafu(source(from(BaseNiftiError, Box::new)))]
        source: Box<BaseNiftiError>,
    },

    #[snafu(display(
        "unsupported dimensionality {} in {} (expected 3 or 4)",
        ndim,
        path.display()
    ))]
    UnsupportedDimensionality { path: PathBuf, ndim: usize },

    #[snafu(display("shape mismatch: expected {:?}, found {:?}", expected, actual))]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[snafu(display("{}", message))]
    Other { message: String },
}
