use nifti::NiftiHeader;

use crate::metadata::WriteHeader;

/// `sform_code` written when a header had no sform: NIFTI_XFORM_ALIGNED_ANAT
pub const ALIGNED_ANAT: i16 = 2;

/// Voxel-to-world transform. Row-major, last row is `[0, 0, 0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Affine(pub [[f64; 4]; 4]);

impl Default for Affine {
    fn default() -> Self {
        Self::identity()
    }
}

impl Affine {
    pub fn identity() -> Self {
        Self::from_spacing([1.0, 1.0, 1.0])
    }

    pub fn from_spacing(spacing: [f64; 3]) -> Self {
        let mut m = [[0.0; 4]; 4];
        for (i, s) in spacing.iter().enumerate() {
            m[i][i] = *s;
        }
        m[3][3] = 1.0;
        Affine(m)
    }

    /// Read the transform from a header, preferring the sform, then the qform quaternion,
    /// then a plain diagonal of voxel sizes.
    pub fn from_header(header: &NiftiHeader) -> Self {
        if header.sform_code > 0 {
            Self::from_sform(header)
        } else if header.qform_code > 0 {
            Self::from_qform(header)
        } else {
            let pixdim = &header.pixdim;
            Self::from_spacing([
                spacing_or_one(pixdim[1]),
                spacing_or_one(pixdim[2]),
                spacing_or_one(pixdim[3]),
            ])
        }
    }

    fn from_sform(header: &NiftiHeader) -> Self {
        let row = |r: &[f32; 4]| [r[0] as f64, r[1] as f64, r[2] as f64, r[3] as f64];
        Affine([
            row(&header.srow_x),
            row(&header.srow_y),
            row(&header.srow_z),
            [0.0, 0.0, 0.0, 1.0],
        ])
    }

    fn from_qform(header: &NiftiHeader) -> Self {
        let b = header.quatern_b as f64;
        let c = header.quatern_c as f64;
        let d = header.quatern_d as f64;
        let a = (1.0 - (b * b + c * c + d * d)).max(0.0).sqrt();

        let qfac = if header.pixdim[0] < 0.0 { -1.0 } else { 1.0 };
        let dx = spacing_or_one(header.pixdim[1]);
        let dy = spacing_or_one(header.pixdim[2]);
        let dz = spacing_or_one(header.pixdim[3]) * qfac;

        let r = [
            [
                a * a + b * b - c * c - d * d,
                2.0 * (b * c - a * d),
                2.0 * (b * d + a * c),
            ],
            [
                2.0 * (b * c + a * d),
                a * a + c * c - b * b - d * d,
                2.0 * (c * d - a * b),
            ],
            [
                2.0 * (b * d - a * c),
                2.0 * (c * d + a * b),
                a * a + d * d - c * c - b * b,
            ],
        ];
        let offset = [
            header.quatern_x as f64,
            header.quatern_y as f64,
            header.quatern_z as f64,
        ];

        let mut m = [[0.0; 4]; 4];
        for i in 0..3 {
            m[i][0] = r[i][0] * dx;
            m[i][1] = r[i][1] * dy;
            m[i][2] = r[i][2] * dz;
            m[i][3] = offset[i];
        }
        m[3][3] = 1.0;
        Affine(m)
    }

    pub fn translation(&self) -> [f64; 3] {
        [self.0[0][3], self.0[1][3], self.0[2][3]]
    }

    /// World-space step of one voxel along `axis`. Axes past the spatial ones do not move.
    pub fn axis_vector(&self, axis: usize) -> [f64; 3] {
        if axis < 3 {
            [self.0[0][axis], self.0[1][axis], self.0[2][axis]]
        } else {
            [0.0; 3]
        }
    }

    /// The transform of a sub-array whose index 0 along `axis` was index `steps` here.
    pub fn translated_along(&self, axis: usize, steps: usize) -> Self {
        let step = self.axis_vector(axis);
        let mut m = self.0;
        for (row, delta) in m.iter_mut().zip(step.iter()) {
            row[3] += delta * steps as f64;
        }
        Affine(m)
    }

    /// Map a voxel index to world coordinates
    pub fn apply(&self, voxel: [f64; 3]) -> [f64; 3] {
        let mut out = [0.0; 3];
        for (i, o) in out.iter_mut().enumerate() {
            let row = &self.0[i];
            *o = row[0] * voxel[0] + row[1] * voxel[1] + row[2] * voxel[2] + row[3];
        }
        out
    }
}

impl WriteHeader for Affine {
    fn write_header(&self, header: &mut NiftiHeader) {
        let row = |r: &[f64; 4]| [r[0] as f32, r[1] as f32, r[2] as f32, r[3] as f32];
        header.srow_x = row(&self.0[0]);
        header.srow_y = row(&self.0[1]);
        header.srow_z = row(&self.0[2]);
        if header.sform_code <= 0 {
            header.sform_code = ALIGNED_ANAT;
        }

        // Only the offset changes under a crop, so the quaternion stays valid
        let [x, y, z] = self.translation();
        header.quatern_x = x as f32;
        header.quatern_y = y as f32;
        header.quatern_z = z as f32;
    }
}

fn spacing_or_one(value: f32) -> f64 {
    if value.is_finite() && value != 0.0 {
        value.abs() as f64
    } else {
        1.0
    }
}
