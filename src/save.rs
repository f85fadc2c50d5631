use image::{GrayImage, ImageError};
use ndarray::{s, Array3, ArrayView2, Axis};
use nifti::writer::WriterOptions;
use nifti::{NiftiError as BaseNiftiError, NiftiHeader};
use snafu::{OptionExt, ResultExt, Snafu};
use std::path::{Path, PathBuf};

use crate::metadata::{Affine, Scaling, WriteHeader};
use crate::modality::Modality;
use crate::transform::normalize_to_u8;
use crate::volume::{Volume, CHANNEL_AXIS, DEPTH_AXIS};

#[derive(Debug, Snafu)]
pub enum SaveError {
    #[snafu(display("could not create directory {}", path.display()))]
    CreateDir {
        #[snafu(source(from(std::io::Error, Box::new)))]
        source: Box<std::io::Error>,
        path: PathBuf,
    },
    #[snafu(display("could not write NIfTI file {}", path.display()))]
    WriteNifti {
        #[snafu(source(from(BaseNiftiError, Box::new)))]
        source: Box<BaseNiftiError>,
        path: PathBuf,
    },
    #[snafu(display("could not write PNG file {}", path.display()))]
    WritePng {
        #[snafu(source(from(ImageError, Box::new)))]
        source: Box<ImageError>,
        path: PathBuf,
    },
    #[snafu(display("raster of {} pixels does not fit {}x{}", len, width, height))]
    RasterSize { len: usize, width: u32, height: u32 },
    #[snafu(display("plane {} of channel {} is out of bounds", index, channel))]
    MissingPlane { index: usize, channel: usize },
}

/// Output name of a 2D sample: `{case}_{slice:03}_{channel:04}{ext}` for image channels and
/// `{case}_{slice:03}{ext}` for labels.
pub fn slice_name(case_id: &str, slice_index: usize, channel: Option<usize>, ext: &str) -> String {
    match channel {
        Some(channel) => format!("{case_id}_{slice_index:03}_{channel:04}{ext}"),
        None => format!("{case_id}_{slice_index:03}{ext}"),
    }
}

/// Slice-level identifier shared by all channels and the label of one 2D sample
pub fn slice_id(case_id: &str, slice_index: usize) -> String {
    format!("{case_id}_{slice_index:03}")
}

fn create_parent(path: &Path) -> Result<(), SaveError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).context(CreateDirSnafu { path: parent })?;
    }
    Ok(())
}

// Trait for writing one depth plane of a volume to a file
pub trait SavePlane {
    fn save_plane(
        &self,
        volume: &Volume,
        index: usize,
        channel: usize,
        path: &Path,
    ) -> Result<(), SaveError>;
}

/// How voxel values are stored on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VoxelKind {
    /// 32 bit float
    #[default]
    Intensity,
    /// Rounded to the nearest integer, 8 bit unsigned
    Label,
}

impl From<Modality> for VoxelKind {
    fn from(modality: Modality) -> Self {
        if modality.is_label() {
            VoxelKind::Label
        } else {
            VoxelKind::Intensity
        }
    }
}

fn to_label(value: f32) -> u8 {
    // `as` saturates and maps NaN to 0
    value.round_ties_even() as u8
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NiftiSaver {
    kind: VoxelKind,
}

impl NiftiSaver {
    pub fn new(kind: VoxelKind) -> Self {
        NiftiSaver { kind }
    }

    /// Header of the written file. The writer fills in dimensions and data type.
    fn output_header(&self, source: &NiftiHeader, affine: &Affine) -> NiftiHeader {
        let mut header = source.clone();
        affine.write_header(&mut header);
        Scaling::IDENTITY.write_header(&mut header);
        header
    }

    fn write<D>(
        &self,
        data: ndarray::Array<f32, D>,
        header: &NiftiHeader,
        path: &Path,
    ) -> Result<(), SaveError>
    where
        D: ndarray::Dimension + ndarray::RemoveAxis,
    {
        create_parent(path)?;
        let writer = WriterOptions::new(path).reference_header(header);
        match self.kind {
            VoxelKind::Intensity => writer.write_nifti(&data),
            VoxelKind::Label => writer.write_nifti(&data.mapv(to_label)),
        }
        .context(WriteNiftiSnafu { path })
    }

    /// Write a whole volume. Single channel volumes are written as 3D.
    pub fn save_volume(&self, volume: &Volume, path: &Path) -> Result<(), SaveError> {
        let header = self.output_header(&volume.header, &volume.affine);
        tracing::debug!("Writing {:?} to {}", volume.shape(), path.display());
        if volume.num_channels() == 1 {
            let data = volume.data.index_axis(Axis(CHANNEL_AXIS), 0).to_owned();
            self.write(data, &header, path)
        } else {
            self.write(volume.data.clone(), &header, path)
        }
    }
}

impl SavePlane for NiftiSaver {
    /// Write the depth plane as an `(x, y, 1)` volume placed at the plane's world position.
    fn save_plane(
        &self,
        volume: &Volume,
        index: usize,
        channel: usize,
        path: &Path,
    ) -> Result<(), SaveError> {
        let plane = volume
            .plane(DEPTH_AXIS, index, channel)
            .context(MissingPlaneSnafu { index, channel })?;
        let data: Array3<f32> = plane.insert_axis(Axis(DEPTH_AXIS));
        let affine = volume.affine.translated_along(DEPTH_AXIS, index);
        let header = self.output_header(&volume.header, &affine);
        self.write(data, &header, path)
    }
}

/// Writes 8 bit grayscale PNGs with `x` along columns and `y` increasing upwards.
#[derive(Debug, Clone, Copy, Default)]
pub struct PngSaver;

impl PngSaver {
    /// Min-max stretch an `(x, y)` plane and orient it for display
    pub fn raster(plane: ArrayView2<f32>) -> Result<GrayImage, SaveError> {
        let (width, height) = plane.dim();
        let normalized = normalize_to_u8(plane);
        // Rows are y, flipped so row 0 holds the largest y
        let oriented = normalized.t();
        let oriented = oriented.slice(s![..;-1, ..]);
        let pixels = oriented.iter().copied().collect::<Vec<u8>>();
        let len = pixels.len();
        let (width, height) = (width as u32, height as u32);
        GrayImage::from_raw(width, height, pixels).context(RasterSizeSnafu { len, width, height })
    }
}

impl SavePlane for PngSaver {
    fn save_plane(
        &self,
        volume: &Volume,
        index: usize,
        channel: usize,
        path: &Path,
    ) -> Result<(), SaveError> {
        let plane = volume
            .plane(DEPTH_AXIS, index, channel)
            .context(MissingPlaneSnafu { index, channel })?;
        let image = Self::raster(plane.view())?;
        create_parent(path)?;
        image.save(path).context(WritePngSnafu { path })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array4};
    use rstest::rstest;
    use tempfile::TempDir;

    fn volume() -> Volume {
        let data = Array4::from_shape_fn((4, 3, 5, 1), |(x, y, z, _)| (x + 4 * y + 12 * z) as f32);
        let header = NiftiHeader {
            sform_code: 1,
            pixdim: [1.0, 1.0, 1.0, 2.0, 0.0, 0.0, 0.0, 0.0],
            srow_x: [1.0, 0.0, 0.0, -10.0],
            srow_y: [0.0, 1.0, 0.0, -20.0],
            srow_z: [0.0, 0.0, 2.0, -30.0],
            scl_slope: 2.0,
            ..Default::default()
        };
        Volume::new(data, Affine::from_header(&header), header)
    }

    #[rstest]
    #[case("P1_T1", 1, Some(0), ".nii.gz", "P1_T1_001_0000.nii.gz")]
    #[case("P1_T1", 12, Some(2), ".nii.gz", "P1_T1_012_0002.nii.gz")]
    #[case("P1_T1", 3, None, ".nii", "P1_T1_003.nii")]
    #[case("P10", 104, Some(1), ".png", "P10_104_0001.png")]
    fn test_slice_name(
        #[case] case_id: &str,
        #[case] slice_index: usize,
        #[case] channel: Option<usize>,
        #[case] ext: &str,
        #[case] expected: &str,
    ) {
        assert_eq!(slice_name(case_id, slice_index, channel, ext), expected);
    }

    #[rstest]
    #[case(1.4, 1)]
    #[case(0.5, 0)]
    #[case(1.5, 2)]
    #[case(-3.0, 0)]
    #[case(f32::NAN, 0)]
    #[case(300.0, 255)]
    fn test_to_label(#[case] value: f32, #[case] expected: u8) {
        assert_eq!(to_label(value), expected);
    }

    #[test]
    fn test_raster_orientation() {
        // x along columns, y upwards
        let plane = array![[0.0, 1.0, 2.0], [3.0, 4.0, 5.0]];
        let image = PngSaver::raster(plane.view()).unwrap();
        assert_eq!(image.dimensions(), (2, 3));
        // Top-left is x = 0, y = max
        assert_eq!(image.get_pixel(0, 0).0[0], 102);
        // Bottom-left is x = 0, y = 0
        assert_eq!(image.get_pixel(0, 2).0[0], 0);
        // Top-right is x = max, y = max
        assert_eq!(image.get_pixel(1, 0).0[0], 255);
    }

    #[test]
    fn test_save_png() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("P1_T1").join("P1_T1_002_0000.png");
        PngSaver.save_plane(&volume(), 2, 0, &path).unwrap();
        assert_eq!(image::image_dimensions(&path).unwrap(), (4, 3));
    }

    #[test]
    fn test_save_plane_nifti() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("P1_T1_003_0000.nii.gz");
        let volume = volume();
        NiftiSaver::new(VoxelKind::Intensity)
            .save_plane(&volume, 3, 0, &path)
            .unwrap();

        let written = Volume::open(&path).unwrap();
        assert_eq!(written.shape(), [4, 3, 1, 1]);
        assert_eq!(written.data[[1, 2, 0, 0]], volume.data[[1, 2, 3, 0]]);
        assert_eq!(written.header.scl_slope, 1.0);
        assert_eq!(written.header.scl_inter, 0.0);
        assert_eq!(written.affine.translation(), [-10.0, -20.0, -24.0]);
    }

    #[test]
    fn test_save_plane_out_of_bounds() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("out.nii");
        let result = NiftiSaver::default().save_plane(&volume(), 5, 0, &path);
        assert!(matches!(result, Err(SaveError::MissingPlane { .. })));
    }

    #[test]
    fn test_save_label_volume() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("P1_T1.nii.gz");
        let mut volume = volume();
        volume.data.mapv_inplace(|v| if v > 20.0 { 0.9 } else { 0.2 });
        NiftiSaver::new(VoxelKind::from(Modality::Mask))
            .save_volume(&volume, &path)
            .unwrap();

        let written = Volume::open(&path).unwrap();
        assert_eq!(written.shape(), [4, 3, 5, 1]);
        assert!(written.data.iter().all(|&v| v == 0.0 || v == 1.0));
        assert_eq!(written.data[[0, 0, 0, 0]], 0.0);
        assert_eq!(written.data[[0, 0, 4, 0]], 1.0);
        // DT_UINT8
        assert_eq!(written.header.datatype, 2);
    }
}
