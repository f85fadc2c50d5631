use clap::Parser;
use indicatif::ParallelProgressIterator;
use mslesseg_preprocessing::errors::png::{DimensionsSnafu, PngError};
use mslesseg_preprocessing::file::{default_bar, PngFileOperations};
use rayon::prelude::*;
use snafu::{Report, ResultExt, Snafu, Whatever};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn, Level};

#[derive(Debug, Snafu)]
enum Error {
    #[snafu(display("Invalid source path: {}", path.display()))]
    InvalidSourcePath { path: PathBuf },

    #[snafu(display("No PNG files found in source path: {}", path.display()))]
    NoSources { path: PathBuf },

    #[snafu(display("IO error: {:?}", source))]
    IO {
        #[snafu(source(from(std::io::Error, Box::new)))]
        source: Box<std::io::Error>,
    },
}

#[derive(Parser, Debug)]
#[command(
    author = "Scott Chase Waggener",
    version = env!("CARGO_PKG_VERSION"),
    about = "Check that every PNG file under a directory has the same dimensions",
    long_about = None
)]
struct Args {
    #[arg(help = "Directory containing PNG files, searched recursively")]
    source: PathBuf,

    #[arg(
        help = "Enable verbose logging",
        long = "verbose",
        short = 'v',
        default_value_t = false
    )]
    verbose: bool,
}

/// Distinct `(width, height)` sizes with the number of files of each, plus unreadable files
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct SizeReport {
    sizes: BTreeMap<(u32, u32), usize>,
    unreadable: Vec<PathBuf>,
}

impl SizeReport {
    fn is_uniform(&self) -> bool {
        self.sizes.len() == 1 && self.unreadable.is_empty()
    }

    fn exit_code(&self) -> i32 {
        if self.is_uniform() {
            0
        } else {
            1
        }
    }

    fn log(&self) {
        for path in self.unreadable.iter() {
            warn!("Could not read {}", path.display());
        }
        for ((width, height), count) in self.sizes.iter() {
            info!("{}x{}: {} files", width, height, count);
        }
        if self.is_uniform() {
            info!("All PNG files have the same size");
        } else {
            warn!(
                "Found {} distinct sizes and {} unreadable files",
                self.sizes.len(),
                self.unreadable.len()
            );
        }
    }
}

fn dimensions(path: &Path) -> Result<(u32, u32), PngError> {
    image::image_dimensions(path).context(DimensionsSnafu { path })
}

fn main() {
    let args = Args::parse();

    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(if args.verbose {
                Level::DEBUG
            } else {
                Level::INFO
            })
            .finish(),
    )
    .whatever_context("Could not set up global logging subscriber")
    .unwrap_or_else(|e: Whatever| {
        eprintln!("[ERROR] {}", Report::from_error(e));
    });

    let report = run(args).unwrap_or_else(|e| {
        error!("{}", Report::from_error(e));
        std::process::exit(-1);
    });
    std::process::exit(report.exit_code());
}

fn run(args: Args) -> Result<SizeReport, Error> {
    if !args.source.is_dir() {
        return InvalidSourcePathSnafu { path: args.source }.fail();
    }
    let files = args.source.find_pngs_with_spinner().context(IOSnafu)?;
    info!("Number of PNG files found: {}", files.len());
    if files.is_empty() {
        return NoSourcesSnafu { path: args.source }.fail();
    }

    let pb = default_bar(files.len() as u64);
    pb.set_message("Reading PNG dimensions");
    let results = files
        .par_iter()
        .progress_with(pb)
        .map(|path| (path, dimensions(path)))
        .collect::<Vec<_>>();

    let mut report = SizeReport::default();
    for (path, result) in results {
        match result {
            Ok(size) => *report.sizes.entry(size).or_default() += 1,
            Err(e) => {
                tracing::debug!("{}", Report::from_error(e));
                report.unreadable.push(path.clone());
            }
        }
    }
    report.log();
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GrayImage;
    use rstest::rstest;
    use tempfile::TempDir;

    fn write_png(root: &Path, rel: &str, width: u32, height: u32) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        GrayImage::new(width, height).save(path).unwrap();
    }

    fn args(source: &Path) -> Args {
        Args {
            source: source.to_path_buf(),
            verbose: false,
        }
    }

    #[rstest]
    #[case::uniform(vec![(8, 6), (8, 6), (8, 6)], 0, 1)]
    #[case::mixed(vec![(8, 6), (6, 8), (8, 6)], 1, 2)]
    fn test_main(
        #[case] sizes: Vec<(u32, u32)>,
        #[case] expected_code: i32,
        #[case] expected_distinct: usize,
    ) {
        let temp_dir = TempDir::new().unwrap();
        for (i, (width, height)) in sizes.iter().enumerate() {
            write_png(temp_dir.path(), &format!("P{i}/FLAIR/{i}.png"), *width, *height);
        }
        let report = run(args(temp_dir.path())).unwrap();
        assert_eq!(report.sizes.len(), expected_distinct);
        assert_eq!(report.exit_code(), expected_code);
    }

    #[test]
    fn test_unreadable() {
        let temp_dir = TempDir::new().unwrap();
        write_png(temp_dir.path(), "a.png", 4, 4);
        std::fs::write(temp_dir.path().join("b.png"), b"not a png").unwrap();
        let report = run(args(temp_dir.path())).unwrap();
        assert_eq!(report.unreadable.len(), 1);
        assert!(report.unreadable[0].ends_with("b.png"));
        assert_eq!(report.exit_code(), 1);
    }

    #[test]
    fn test_no_pngs() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("notes.txt"), b"").unwrap();
        assert!(matches!(run(args(temp_dir.path())), Err(Error::NoSources { .. })));
    }
}
