use std::path::{Path, PathBuf};

use clap::Parser;
use snafu::{Report, ResultExt, Snafu, Whatever};
use tracing::{error, warn, Level};

use mslesseg_preprocessing::errors::DatasetError;
use mslesseg_preprocessing::file::{NiftiFileOperations, NIFTI_GZ_EXTENSION};
use mslesseg_preprocessing::report::{process_cases, CaseOutcome, Issue, IssueKind, RunSummary};
use mslesseg_preprocessing::save::{NiftiSaver, VoxelKind};
use mslesseg_preprocessing::transform::{AxisCrop, Transform};
use mslesseg_preprocessing::{Case, CaseFinder, Modality, NamingConvention, Volume};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Invalid source path: {}", path.display()))]
    InvalidSourcePath { path: PathBuf },

    #[snafu(display("No cases found in source path: {}", path.display()))]
    NoSources { path: PathBuf },

    #[snafu(display("Failed to create directory: {}", path.display()))]
    CreateDir {
        path: PathBuf,
        #[snafu(source(from(std::io::Error, Box::new)))]
        source: Box<std::io::Error>,
    },

    #[snafu(display("Error discovering cases in {}", path.display()))]
    Discovery {
        path: PathBuf,
        #[snafu(source(from(DatasetError, Box::new)))]
        source: Box<DatasetError>,
    },

    #[snafu(display("Aborted on {}", issue))]
    Aborted { issue: Issue },
}

#[derive(Parser, Debug)]
#[command(author = "Scott Chase Waggener", version = env!("CARGO_PKG_VERSION"), about = "Crop MSLesSeg volumes to the central 80% of slices and rename them into the nnU-Net channel convention", long_about = None)]
struct Args {
    #[arg(help = "Source root containing one directory per split (e.g. train/, test/)")]
    source: PathBuf,

    #[arg(help = "Output root. The source directory structure is mirrored below it")]
    output: PathBuf,

    #[arg(
        help = "Split directories to process. Missing splits are skipped with a warning",
        long = "splits",
        short = 's',
        value_delimiter = ',',
        default_values_t = vec!["train".to_string(), "test".to_string()]
    )]
    splits: Vec<String>,

    #[arg(
        help = "Abort on the first case that fails to load or save",
        long = "strict",
        default_value_t = false
    )]
    strict: bool,

    #[arg(
        help = "Enable debug logging",
        long = "verbose",
        short = 'v',
        default_value_t = false
    )]
    verbose: bool,
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

    let summary = run(args).unwrap_or_else(|e| {
        error!("{}", Report::from_error(e));
        std::process::exit(-1);
    });
    std::process::exit(summary.exit_code());
}

/// Name of a cropped output, e.g. `P1_T1_0000.nii.gz` or `P1_T1.nii.gz` for the mask
fn output_name(case_id: &str, modality: Modality, extension: &str) -> String {
    format!(
        "{}{}{}",
        case_id,
        NamingConvention::Channel.suffix(modality),
        extension
    )
}

fn process_case(case: &Case, source: &Path, dest: &Path) -> CaseOutcome {
    let mut outcome = CaseOutcome::new(case.id.as_str());
    let out_dir = dest.join(case.dir.strip_prefix(source).unwrap_or(Path::new("")));

    let Some(primary) = case.path(Modality::PRIMARY) else {
        outcome.issue(IssueKind::MissingPrimaryModality, "no FLAIR");
        return outcome;
    };
    let reference = match Volume::open(primary) {
        Ok(volume) => volume,
        Err(e) => {
            outcome.issue(IssueKind::LoadError, Report::from_error(e).to_string());
            return outcome;
        }
    };
    let crop = AxisCrop::training(reference.depth());

    for (&modality, path) in case.files.iter() {
        let loaded;
        let volume = if modality == Modality::PRIMARY {
            &reference
        } else {
            match Volume::open(path) {
                Ok(volume) => {
                    loaded = volume;
                    &loaded
                }
                Err(e) => {
                    outcome.issue(IssueKind::LoadError, Report::from_error(e).to_string());
                    continue;
                }
            }
        };

        if volume.spatial_shape() != reference.spatial_shape() {
            outcome.issue(
                IssueKind::ShapeMismatch,
                format!(
                    "{} has shape {:?}, {} has {:?}; dropping {}",
                    modality,
                    volume.spatial_shape(),
                    Modality::PRIMARY,
                    reference.spatial_shape(),
                    modality
                ),
            );
            continue;
        }

        let cropped = crop.apply(volume);
        let extension = path.nifti_extension().unwrap_or(NIFTI_GZ_EXTENSION);
        let out_path = out_dir.join(output_name(&case.id, modality, extension));
        match NiftiSaver::new(VoxelKind::from(modality)).save_volume(&cropped, &out_path) {
            Ok(()) => outcome.written.push(out_path),
            Err(e) => outcome.issue(IssueKind::SaveError, Report::from_error(e).to_string()),
        }
    }
    outcome
}

fn run(args: Args) -> Result<RunSummary, Error> {
    if !args.source.is_dir() {
        return InvalidSourcePathSnafu { path: args.source }.fail();
    }

    // Discover cases split by split, a missing split is not fatal
    let finder = CaseFinder::new(NamingConvention::Source);
    let mut cases = Vec::new();
    let mut issues = Vec::new();
    for split in args.splits.iter() {
        let split_dir = args.source.join(split);
        if !split_dir.is_dir() {
            warn!("Split directory {} does not exist, skipping", split_dir.display());
            continue;
        }
        let discovery = finder
            .discover(&split_dir)
            .context(DiscoverySnafu { path: &split_dir })?;
        issues.extend(discovery.issues);
        cases.extend(discovery.cases.into_values());
    }
    tracing::info!("Number of cases found: {}", cases.len());
    if cases.is_empty() {
        return NoSourcesSnafu { path: args.source }.fail();
    }

    std::fs::create_dir_all(&args.output).context(CreateDirSnafu {
        path: args.output.clone(),
    })?;

    let source = args.source.as_path();
    let dest = args.output.as_path();
    let outcomes = process_cases(cases, "Cropping volumes", args.strict, |case| {
        process_case(&case, source, dest)
    })
    .map_err(|issue| Error::Aborted { issue })?;

    let summary = RunSummary::new(&outcomes, issues);
    summary.log();
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::{output_name, run, Args, Error};
    use mslesseg_preprocessing::{IssueKind, Modality, Volume};
    use ndarray::Array3;
    use nifti::writer::WriterOptions;
    use nifti::NiftiHeader;
    use rstest::rstest;
    use std::path::Path;
    use tempfile::TempDir;

    fn write_volume(path: &Path, depth: usize, value: f32) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let header = NiftiHeader {
            sform_code: 1,
            srow_x: [1.0, 0.0, 0.0, 0.0],
            srow_y: [0.0, 1.0, 0.0, 0.0],
            srow_z: [0.0, 0.0, 1.5, -10.0],
            ..Default::default()
        };
        let data = Array3::from_shape_fn((6, 5, depth), |(x, _, z)| value + (x + z) as f32);
        WriterOptions::new(path)
            .reference_header(&header)
            .write_nifti(&data)
            .unwrap();
    }

    fn write_case(dir: &Path, case_id: &str, depth: usize) {
        for (name, value) in [("FLAIR", 10.0), ("T1", 20.0), ("T2", 30.0), ("MASK", 0.0)] {
            write_volume(&dir.join(format!("{case_id}_{name}.nii.gz")), depth, value);
        }
    }

    fn args(source: &Path, output: &Path, strict: bool) -> Args {
        Args {
            source: source.to_path_buf(),
            output: output.to_path_buf(),
            splits: vec!["train".to_string(), "test".to_string()],
            strict,
            verbose: false,
        }
    }

    #[rstest]
    #[case(Modality::Flair, ".nii.gz", "P1_T1_0000.nii.gz")]
    #[case(Modality::T2, ".nii", "P1_T1_0002.nii")]
    #[case(Modality::Mask, ".nii.gz", "P1_T1.nii.gz")]
    fn test_output_name(#[case] modality: Modality, #[case] ext: &str, #[case] expected: &str) {
        assert_eq!(output_name("P1_T1", modality, ext), expected);
    }

    #[test]
    fn test_main() {
        let source = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        write_case(&source.path().join("train/P1/T1"), "P1_T1", 10);
        write_case(&source.path().join("train/P2/T1"), "P2_T1", 20);
        write_case(&source.path().join("test/P3"), "P3", 30);

        let summary = run(args(source.path(), output.path(), true)).unwrap();
        assert_eq!(summary.cases, 3);
        assert_eq!(summary.written, 12);
        assert_eq!(summary.exit_code(), 0);

        for (rel, case_id, depth) in [
            ("train/P1/T1", "P1_T1", 8),
            ("train/P2/T1", "P2_T1", 16),
            ("test/P3", "P3", 24),
        ] {
            let dir = output.path().join(rel);
            for suffix in ["_0000", "_0001", "_0002", ""] {
                let path = dir.join(format!("{case_id}{suffix}.nii.gz"));
                let volume = Volume::open(&path).unwrap();
                assert_eq!(volume.shape(), [6, 5, depth, 1], "{}", path.display());
            }
        }

        // Translation moved to the first kept slice: start = 1 for depth 10
        let flair = Volume::open(output.path().join("train/P1/T1/P1_T1_0000.nii.gz")).unwrap();
        assert_eq!(flair.affine.translation(), [0.0, 0.0, -8.5]);
        assert_eq!(flair.data[[0, 0, 0, 0]], 11.0);

        // Masks are written as integers
        let mask = Volume::open(output.path().join("train/P1/T1/P1_T1.nii.gz")).unwrap();
        assert_eq!(mask.header.datatype, 2);
    }

    #[test]
    fn test_missing_split_and_modality() {
        let source = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        let dir = source.path().join("train/P1/T1");
        write_volume(&dir.join("P1_T1_FLAIR.nii.gz"), 10, 0.0);
        write_volume(&dir.join("P1_T1_T1.nii.gz"), 10, 0.0);

        let summary = run(args(source.path(), output.path(), false)).unwrap();
        assert_eq!(summary.written, 2);
        assert_eq!(summary.count(IssueKind::MissingSecondaryModality), 1);
        assert_eq!(summary.exit_code(), 0);
    }

    #[test]
    fn test_shape_mismatch() {
        let source = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        let dir = source.path().join("train/P1/T1");
        write_case(&dir, "P1_T1", 10);
        write_volume(&dir.join("P1_T1_T2.nii.gz"), 12, 0.0);

        let summary = run(args(source.path(), output.path(), false)).unwrap();
        assert_eq!(summary.written, 3);
        assert_eq!(summary.count(IssueKind::ShapeMismatch), 1);
        assert!(!output.path().join("train/P1/T1/P1_T1_0002.nii.gz").exists());
    }

    #[rstest]
    #[case::lenient(false)]
    #[case::strict(true)]
    fn test_load_error(#[case] strict: bool) {
        let source = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        let dir = source.path().join("train/P1/T1");
        write_case(&dir, "P1_T1", 10);
        std::fs::write(dir.join("P1_T1_T1.nii.gz"), b"corrupt").unwrap();

        let result = run(args(source.path(), output.path(), strict));
        if strict {
            assert!(matches!(result, Err(Error::Aborted { .. })));
        } else {
            let summary = result.unwrap();
            assert_eq!(summary.count(IssueKind::LoadError), 1);
            assert_eq!(summary.exit_code(), 1);
        }
    }

    #[test]
    fn test_invalid_source() {
        let output = TempDir::new().unwrap();
        let missing = output.path().join("missing");
        let result = run(args(&missing, output.path(), false));
        assert!(matches!(result, Err(Error::InvalidSourcePath { .. })));
    }

    #[test]
    fn test_no_cases() {
        let source = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        std::fs::create_dir_all(source.path().join("train")).unwrap();
        let result = run(args(source.path(), output.path(), false));
        assert!(matches!(result, Err(Error::NoSources { .. })));
    }
}
