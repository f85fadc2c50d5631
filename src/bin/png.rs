use clap::Parser;
use mslesseg_preprocessing::errors::DatasetError;
use mslesseg_preprocessing::file::PNG_EXTENSION;
use mslesseg_preprocessing::report::{process_cases, CaseOutcome, Issue, IssueKind, RunSummary};
use mslesseg_preprocessing::save::{slice_name, PngSaver, SavePlane};
use mslesseg_preprocessing::transform::AxisCrop;
use mslesseg_preprocessing::{Case, CaseFinder, Modality, NamingConvention, Volume};
use snafu::{Report, ResultExt, Snafu, Whatever};
use std::path::{Path, PathBuf};
use tracing::{error, info, Level};

#[derive(Debug, Snafu)]
enum Error {
    #[snafu(display("Invalid source path: {}", path.display()))]
    InvalidSourcePath { path: PathBuf },

    #[snafu(display("No cases found in source path: {}", path.display()))]
    NoSources { path: PathBuf },

    #[snafu(display("Error discovering cases"))]
    Discovery {
        #[snafu(source(from(DatasetError, Box::new)))]
        source: Box<DatasetError>,
    },

    #[snafu(display("Aborted on {}", issue))]
    Aborted { issue: Issue },
}

#[derive(Parser, Debug)]
#[command(
    author = "Scott Chase Waggener",
    version = env!("CARGO_PKG_VERSION"),
    about = "Dump the central 60% of depth slices of every case as 8-bit PNG",
    long_about = "Writes <output>/<case>/<MODALITY>/<case>_<z>_<channel>.png for image channels and \
                  <output>/<case>/MASK/<case>_<z>.png for masks, where <z> is the slice index in the \
                  source volume. Each plane is min-max stretched to [0, 255]."
)]
struct Args {
    #[arg(help = "Source directory, searched recursively")]
    source: PathBuf,

    #[arg(help = "Output directory")]
    output: PathBuf,

    #[arg(
        help = "File naming convention of the source",
        long = "convention",
        short = 'c',
        value_enum,
        default_value_t = NamingConvention::default()
    )]
    convention: NamingConvention,

    #[arg(
        help = "Abort on the first case that fails to load or save",
        long = "strict",
        default_value_t = false
    )]
    strict: bool,

    #[arg(
        help = "Enable verbose logging",
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

fn process_case(case: &Case, dest: &Path) -> CaseOutcome {
    let mut outcome = CaseOutcome::new(case.id.as_str());
    let case_dir = dest.join(&case.id);

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
    // Every modality shares the FLAIR slice range so the PNGs stay paired by z
    let crop = AxisCrop::display(reference.depth());
    tracing::debug!("{}: slices {:?}", case.id, crop.range());

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

        let modality_dir = case_dir.join(modality.name());
        for index in crop.range() {
            let name = slice_name(&case.id, index, modality.channel_index(), PNG_EXTENSION);
            let path = modality_dir.join(name);
            match PngSaver.save_plane(volume, index, 0, &path) {
                Ok(()) => outcome.written.push(path),
                Err(e) => outcome.issue(IssueKind::SaveError, Report::from_error(e).to_string()),
            }
        }
    }
    outcome
}

fn run(args: Args) -> Result<RunSummary, Error> {
    if !args.source.is_dir() {
        return InvalidSourcePathSnafu { path: args.source }.fail();
    }

    let discovery = CaseFinder::new(args.convention)
        .discover(&args.source)
        .context(DiscoverySnafu)?;
    info!("Number of cases found: {}", discovery.len());
    if discovery.is_empty() {
        return NoSourcesSnafu { path: args.source }.fail();
    }

    let dest = args.output.as_path();
    let cases = discovery.cases.values().collect::<Vec<_>>();
    let outcomes = process_cases(cases, "Writing PNG slices", args.strict, |case| {
        process_case(case, dest)
    })
    .map_err(|issue| Error::Aborted { issue })?;

    let summary = RunSummary::new(&outcomes, discovery.issues);
    summary.log();
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mslesseg_preprocessing::file::PngFileOperations;
    use ndarray::Array3;
    use nifti::writer::WriterOptions;
    use nifti::NiftiHeader;
    use rstest::rstest;
    use tempfile::TempDir;

    fn write_volume(path: &Path, depth: usize) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let data = Array3::from_shape_fn((5, 4, depth), |(x, y, z)| (x + y + z) as f32);
        WriterOptions::new(path)
            .reference_header(&NiftiHeader::default())
            .write_nifti(&data)
            .unwrap();
    }

    fn args(source: &Path, output: &Path, convention: NamingConvention) -> Args {
        Args {
            source: source.to_path_buf(),
            output: output.to_path_buf(),
            convention,
            strict: false,
            verbose: false,
        }
    }

    #[rstest]
    #[case::source(NamingConvention::Source, ["_FLAIR", "_T1", "_T2", "_MASK"])]
    #[case::channel(NamingConvention::Channel, ["_0000", "_0001", "_0002", ""])]
    fn test_main(#[case] convention: NamingConvention, #[case] suffixes: [&str; 4]) {
        let source = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        for suffix in suffixes {
            write_volume(&source.path().join(format!("P1/T1/P1_T1{suffix}.nii.gz")), 10);
        }

        let summary = run(args(source.path(), output.path(), convention)).unwrap();
        // Depth 10 keeps z in [2, 8)
        assert_eq!(summary.written, 4 * 6);
        assert_eq!(summary.exit_code(), 0);

        let case_dir = output.path().join("P1_T1");
        assert!(case_dir.join("FLAIR/P1_T1_002_0000.png").is_file());
        assert!(case_dir.join("T2/P1_T1_007_0002.png").is_file());
        assert!(case_dir.join("MASK/P1_T1_005.png").is_file());
        assert!(!case_dir.join("FLAIR/P1_T1_008_0000.png").exists());
        assert!(!case_dir.join("FLAIR/P1_T1_001_0000.png").exists());

        let pngs = output.path().find_pngs().unwrap();
        assert_eq!(pngs.len(), 24);
        for png in pngs {
            assert_eq!(image::image_dimensions(&png).unwrap(), (5, 4));
        }
    }

    #[test]
    fn test_unreadable_modality() {
        let source = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        write_volume(&source.path().join("P2/P2_FLAIR.nii"), 5);
        std::fs::write(source.path().join("P2/P2_T1.nii"), b"corrupt").unwrap();

        let summary = run(args(source.path(), output.path(), NamingConvention::Source)).unwrap();
        // Depth 5 keeps z in [1, 4)
        assert_eq!(summary.written, 3);
        assert_eq!(summary.count(IssueKind::LoadError), 1);
        assert_eq!(summary.exit_code(), 1);
    }

    #[test]
    fn test_shape_mismatch() {
        let source = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        write_volume(&source.path().join("P1/T1/P1_T1_FLAIR.nii.gz"), 10);
        write_volume(&source.path().join("P1/T1/P1_T1_T1.nii.gz"), 10);
        write_volume(&source.path().join("P1/T1/P1_T1_MASK.nii.gz"), 20);

        let summary = run(args(source.path(), output.path(), NamingConvention::Source)).unwrap();
        assert_eq!(summary.count(IssueKind::ShapeMismatch), 1);
        assert_eq!(summary.written, 2 * 6);

        let case_dir = output.path().join("P1_T1");
        assert!(case_dir.join("T1/P1_T1_007_0001.png").is_file());
        assert!(!case_dir.join("MASK").exists());
    }

    #[test]
    fn test_no_cases() {
        let source = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        let result = run(args(source.path(), output.path(), NamingConvention::Source));
        assert!(matches!(result, Err(Error::NoSources { .. })));
    }
}
