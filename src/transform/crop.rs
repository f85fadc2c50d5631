use ndarray::{Axis, Slice};
use std::ops::Range;

use crate::metadata::Affine;
use crate::transform::Transform;
use crate::volume::{Volume, DEPTH_AXIS};

/// Fractions of the depth kept for training volumes (central 80 %)
pub const TRAINING_CROP_FRACTION: (f64, f64) = (0.10, 0.90);

/// Fractions of the depth kept when dumping display slices (central 60 %)
pub const DISPLAY_CROP_FRACTION: (f64, f64) = (0.20, 0.80);

/// Half-open range `[start, end)` along one axis of a volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisCrop {
    pub axis: usize,
    pub start: usize,
    pub end: usize,
}

impl AxisCrop {
    /// Build a crop clamped to `[0, len]`. An inverted range becomes empty.
    pub fn new(axis: usize, start: usize, end: usize, len: usize) -> Self {
        let start = start.min(len);
        let end = end.clamp(start, len);
        AxisCrop { axis, start, end }
    }

    /// Keep `[floor(lower * len), floor(upper * len))`
    pub fn from_fractions(axis: usize, len: usize, lower: f64, upper: f64) -> Self {
        let start = (lower * len as f64).floor().max(0.0) as usize;
        let end = (upper * len as f64).floor().max(0.0) as usize;
        Self::new(axis, start, end, len)
    }

    pub fn training(depth: usize) -> Self {
        let (lower, upper) = TRAINING_CROP_FRACTION;
        Self::from_fractions(DEPTH_AXIS, depth, lower, upper)
    }

    pub fn display(depth: usize) -> Self {
        let (lower, upper) = DISPLAY_CROP_FRACTION;
        Self::from_fractions(DEPTH_AXIS, depth, lower, upper)
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }
}

impl Transform<Affine> for AxisCrop {
    fn apply(&self, affine: &Affine) -> Affine {
        affine.translated_along(self.axis, self.start)
    }
}

impl Transform<Volume> for AxisCrop {
    /// Panics if `axis` is not an axis of the volume.
    fn apply(&self, volume: &Volume) -> Volume {
        let len = volume.data.len_of(Axis(self.axis));
        let crop = AxisCrop::new(self.axis, self.start, self.end, len);
        let data = volume
            .data
            .slice_axis(Axis(crop.axis), Slice::from(crop.range()))
            .to_owned();
        let affine = crop.apply(&volume.affine);
        Volume::new(data, affine, volume.header.clone())
    }
}
