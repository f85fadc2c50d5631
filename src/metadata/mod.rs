use nifti::NiftiHeader;

pub mod affine;
pub use affine::*;

pub mod scaling;
pub use scaling::*;

pub trait WriteHeader {
    /// Write fields describing the metadata to a NIfTI header.
    fn write_header(&self, header: &mut NiftiHeader);
}
