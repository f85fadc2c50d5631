use image::ImageError;
use snafu::Snafu;
use std::path::PathBuf;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum PngError {
    #[snafu(display("error reading PNG dimensions of {}", path.display()))]
    DimensionsError {
        path: PathBuf,
        #[snafu(source(from(ImageError, Box::new)))]
        source: Box<ImageError>,
    },
}
