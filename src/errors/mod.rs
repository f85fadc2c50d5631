pub mod dataset;
pub mod nifti;
pub mod png;

pub use self::dataset::DatasetError;
pub use self::nifti::NiftiError;
pub use self::png::PngError;
