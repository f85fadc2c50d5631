use nifti::NiftiHeader;

use crate::metadata::WriteHeader;

/// Linear intensity scaling stored in the header as `scl_slope` / `scl_inter`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scaling {
    pub slope: f32,
    pub inter: f32,
}

impl Scaling {
    pub const IDENTITY: Scaling = Scaling {
        slope: 1.0,
        inter: 0.0,
    };

    /// A slope of zero means "no scaling" in the NIfTI format.
    pub fn from_header(header: &NiftiHeader) -> Self {
        if header.scl_slope == 0.0 || !header.scl_slope.is_finite() {
            Self::IDENTITY
        } else {
            Scaling {
                slope: header.scl_slope,
                inter: if header.scl_inter.is_finite() {
                    header.scl_inter
                } else {
                    0.0
                },
            }
        }
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }
}

impl Default for Scaling {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl WriteHeader for Scaling {
    fn write_header(&self, header: &mut NiftiHeader) {
        header.scl_slope = self.slope;
        header.scl_inter = self.inter;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0.0, 5.0, Scaling::IDENTITY)]
    #[case(f32::NAN, 0.0, Scaling::IDENTITY)]
    #[case(2.0, 1.0, Scaling { slope: 2.0, inter: 1.0 })]
    fn test_from_header(#[case] slope: f32, #[case] inter: f32, #[case] expected: Scaling) {
        let header = NiftiHeader {
            scl_slope: slope,
            scl_inter: inter,
            ..Default::default()
        };
        assert_eq!(Scaling::from_header(&header), expected);
    }

    #[test]
    fn test_write_header() {
        let mut header = NiftiHeader {
            scl_slope: 3.0,
            scl_inter: -4.0,
            ..Default::default()
        };
        Scaling::IDENTITY.write_header(&mut header);
        assert_eq!(header.scl_slope, 1.0);
        assert_eq!(header.scl_inter, 0.0);
    }
}
