use ndarray::{concatenate, Array2, Array4, ArrayD, Axis, Ix4};
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};
use snafu::{OptionExt, ResultExt};
use std::path::Path;

use crate::errors::nifti::{
    NiftiError, NotFoundSnafu, OtherSnafu, ReadSnafu, ShapeMismatchSnafu,
    UnsupportedDimensionalitySnafu,
};
use crate::metadata::{Affine, Scaling};

pub const Z_AXIS: usize = 2;
pub const CHANNEL_AXIS: usize = 3;

/// Depth axis used for cropping and slicing
pub const DEPTH_AXIS: usize = Z_AXIS;

/// A loaded image with axes `(x, y, z, channel)`, its voxel-to-world transform and the header
/// it was read with. Single volume files get one channel.
#[derive(Debug, Clone)]
pub struct Volume {
    pub data: Array4<f32>,
    pub affine: Affine,
    pub header: NiftiHeader,
}

impl Volume {
    pub fn new(data: Array4<f32>, affine: Affine, header: NiftiHeader) -> Self {
        Volume {
            data,
            affine,
            header,
        }
    }

    /// Read a 3D or 4D NIfTI file. Intensity scaling in the header is applied.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, NiftiError> {
        let path = path.as_ref();
        if !path.is_file() {
            return NotFoundSnafu { path }.fail();
        }
        let obj = ReaderOptions::new()
            .read_file(path)
            .context(ReadSnafu { path })?;
        let header = obj.header().clone();
        let data: ArrayD<f32> = obj
            .into_volume()
            .into_ndarray::<f32>()
            .context(ReadSnafu { path })?;

        let ndim = data.ndim();
        let data = match ndim {
            3 => data.insert_axis(Axis(CHANNEL_AXIS)),
            4 => data,
            _ => return UnsupportedDimensionalitySnafu { path, ndim }.fail(),
        };
        let data = data
            .into_dimensionality::<Ix4>()
            .ok()
            .context(UnsupportedDimensionalitySnafu { path, ndim })?;

        let affine = Affine::from_header(&header);
        let scaling = Scaling::from_header(&header);
        if !scaling.is_identity() {
            tracing::debug!(
                "Applied intensity scaling {} * x + {} to {}",
                scaling.slope,
                scaling.inter,
                path.display()
            );
        }
        tracing::debug!(
            "Loaded {} with shape {:?}",
            path.display(),
            data.shape()
        );
        Ok(Volume::new(data, affine, header))
    }

    /// Join single or multi channel volumes along the channel axis. Geometry is taken from the
    /// first volume.
    pub fn stack(volumes: &[Volume]) -> Result<Self, NiftiError> {
        let first = volumes.first().context(OtherSnafu {
            message: "no volumes to stack",
        })?;
        let expected = first.spatial_shape();
        if let Some(other) = volumes.iter().find(|v| v.spatial_shape() != expected) {
            return ShapeMismatchSnafu {
                expected: expected.to_vec(),
                actual: other.spatial_shape().to_vec(),
            }
            .fail();
        }

        let views = volumes.iter().map(|v| v.data.view()).collect::<Vec<_>>();
        let data = concatenate(Axis(CHANNEL_AXIS), &views).ok().context(OtherSnafu {
            message: "failed to concatenate channels",
        })?;
        Ok(Volume::new(data, first.affine, first.header.clone()))
    }

    pub fn shape(&self) -> [usize; 4] {
        let s = self.data.shape();
        [s[0], s[1], s[2], s[3]]
    }

    pub fn spatial_shape(&self) -> [usize; 3] {
        let s = self.data.shape();
        [s[0], s[1], s[2]]
    }

    pub fn depth(&self) -> usize {
        self.data.len_of(Axis(DEPTH_AXIS))
    }

    pub fn num_channels(&self) -> usize {
        self.data.len_of(Axis(CHANNEL_AXIS))
    }

    /// A single channel as its own volume
    pub fn channel(&self, channel: usize) -> Option<Volume> {
        if channel >= self.num_channels() {
            return None;
        }
        let data = self
            .data
            .index_axis(Axis(CHANNEL_AXIS), channel)
            .insert_axis(Axis(CHANNEL_AXIS))
            .to_owned();
        Some(Volume::new(data, self.affine, self.header.clone()))
    }

    /// The 2D plane at `index` along a spatial `axis`. The remaining two spatial axes keep
    /// their order, so a plane along z is indexed `(x, y)`.
    pub fn plane(&self, axis: usize, index: usize, channel: usize) -> Option<Array2<f32>> {
        if axis >= CHANNEL_AXIS
            || index >= self.data.len_of(Axis(axis))
            || channel >= self.num_channels()
        {
            return None;
        }
        let plane = self
            .data
            .index_axis(Axis(CHANNEL_AXIS), channel)
            .index_axis_move(Axis(axis), index)
            .to_owned();
        Some(plane)
    }
}
