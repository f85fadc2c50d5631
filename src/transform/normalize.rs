use ndarray::{Array2, ArrayView2};

/// Minimum and maximum over the finite values of an array.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntensityRange {
    pub min: f32,
    pub max: f32,
}

impl IntensityRange {
    /// Returns `None` if there are no finite values.
    pub fn of<'a, I>(values: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a f32>,
    {
        values
            .into_iter()
            .filter(|v| v.is_finite())
            .fold(None, |acc, &v| match acc {
                None => Some(IntensityRange { min: v, max: v }),
                Some(r) => Some(IntensityRange {
                    min: r.min.min(v),
                    max: r.max.max(v),
                }),
            })
    }

    /// A constant plane has nothing to stretch
    pub fn is_degenerate(&self) -> bool {
        self.max <= self.min
    }

    /// `round(clip((v - min) / (max - min), 0, 1) * 255)`. NaN maps to 0, infinities clip.
    pub fn to_u8(&self, value: f32) -> u8 {
        if value.is_nan() || self.is_degenerate() {
            return 0;
        }
        let span = self.max as f64 - self.min as f64;
        let scaled = ((value as f64 - self.min as f64) / span).clamp(0.0, 1.0);
        (scaled * u8::MAX as f64).round() as u8
    }
}

/// Min-max stretch a plane to 8 bit. Planes without a usable range become all zero.
pub fn normalize_to_u8(plane: ArrayView2<f32>) -> Array2<u8> {
    match IntensityRange::of(plane.iter()) {
        Some(range) if !range.is_degenerate() => plane.mapv(|v| range.to_u8(v)),
        _ => {
            tracing::debug!("Degenerate intensity range, writing a zero plane");
            Array2::zeros(plane.raw_dim())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rstest::rstest;

    #[rstest]
    #[case::constant(vec![3.0, 3.0, 3.0, 3.0])]
    #[case::zeros(vec![0.0; 4])]
    #[case::all_nan(vec![f32::NAN; 4])]
    #[case::nan_and_constant(vec![f32::NAN, 1.0, 1.0, f32::INFINITY])]
    fn test_degenerate_plane(#[case] values: Vec<f32>) {
        let plane = Array2::from_shape_vec((2, 2), values).unwrap();
        let result = normalize_to_u8(plane.view());
        assert_eq!(result.dim(), (2, 2));
        assert!(result.iter().all(|&v| v == 0));
    }

    #[test]
    fn test_stretch() {
        let plane = array![[-5.0, 0.0, 5.0], [1.0, 2.0, 15.0]];
        let result = normalize_to_u8(plane.view());
        assert_eq!(result[[0, 0]], 0);
        assert_eq!(result[[1, 2]], 255);
        assert_eq!(*result.iter().min().unwrap(), 0);
        assert_eq!(*result.iter().max().unwrap(), 255);
        for &v in [result[[0, 1]], result[[0, 2]], result[[1, 0]], result[[1, 1]]].iter() {
            assert!(v > 0 && v < 255);
        }
        // (5 - -5) / 20 * 255 = 127.5
        assert_eq!(result[[0, 2]], 128);
    }

    #[test]
    fn test_non_finite() {
        let plane = array![[0.0, 10.0], [f32::NAN, f32::INFINITY]];
        let result = normalize_to_u8(plane.view());
        assert_eq!(result, array![[0u8, 255], [0, 255]]);

        let plane = array![[0.0, 10.0], [f32::NEG_INFINITY, 5.0]];
        let result = normalize_to_u8(plane.view());
        assert_eq!(result, array![[0u8, 255], [0, 128]]);
    }

    #[test]
    fn test_range_ignores_non_finite() {
        let values = [f32::NAN, 2.0, f32::NEG_INFINITY, -1.0, f32::INFINITY];
        let range = IntensityRange::of(values.iter()).unwrap();
        assert_eq!(range, IntensityRange { min: -1.0, max: 2.0 });
        assert!(IntensityRange::of([f32::NAN].iter()).is_none());
    }
}
