use clap::Parser;
use mslesseg_preprocessing::analysis::{DatasetAnalysis, REPORT_FILENAME};
use mslesseg_preprocessing::errors::DatasetError;
use snafu::{Report, ResultExt, Snafu, Whatever};
use std::path::PathBuf;
use tracing::{error, info, Level};

#[derive(Debug, Snafu)]
enum Error {
    #[snafu(display("Invalid source path: {}", path.display()))]
    InvalidSourcePath { path: PathBuf },

    #[snafu(display("Error analyzing dataset"))]
    Analyze {
        #[snafu(source(from(DatasetError, Box::new)))]
        source: Box<DatasetError>,
    },

    #[snafu(display("Error writing report"))]
    WriteReport {
        #[snafu(source(from(DatasetError, Box::new)))]
        source: Box<DatasetError>,
    },
}

#[derive(Parser, Debug)]
#[command(
    author = "Scott Chase Waggener",
    version = env!("CARGO_PKG_VERSION"),
    about = "Count timepoint combinations and modality presence in the raw MSLesSeg train/ and test/ trees",
    long_about = None
)]
struct Args {
    #[arg(help = "Dataset root containing train/ and test/")]
    source: PathBuf,

    #[arg(
        help = "Report path. Defaults to dataset_analysis.txt in the dataset root",
        long = "output",
        short = 'o'
    )]
    output: Option<PathBuf>,

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

    run(args).unwrap_or_else(|e| {
        error!("{}", Report::from_error(e));
        std::process::exit(-1);
    });
}

fn run(args: Args) -> Result<DatasetAnalysis, Error> {
    if !args.source.is_dir() {
        return InvalidSourcePathSnafu { path: args.source }.fail();
    }

    let analysis = DatasetAnalysis::analyze(&args.source).context(AnalyzeSnafu)?;
    let output = args
        .output
        .unwrap_or_else(|| args.source.join(REPORT_FILENAME));
    analysis.write(&output).context(WriteReportSnafu)?;
    info!("Report written to {}\n{}", output.display(), analysis);
    Ok(analysis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mslesseg_preprocessing::analysis::{SequencePresence, TestPresence, TimepointCombination};
    use rstest::rstest;
    use std::path::Path;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"").unwrap();
    }

    fn dataset() -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        for m in ["FLAIR", "T1", "T2", "MASK"] {
            touch(root, &format!("train/P1/T1/P1_T1_{m}.nii.gz"));
            touch(root, &format!("train/P1/T2/P1_T2_{m}.nii.gz"));
            touch(root, &format!("test/P9/P9_{m}.nii.gz"));
        }
        touch(root, "train/P2/T1/P2_T1_FLAIR.nii.gz");
        touch(root, "train/P2/T1/P2_T1_T1.nii.gz");
        touch(root, "test/P10/P10_FLAIR.nii");
        temp_dir
    }

    #[rstest]
    #[case::default_output(None)]
    #[case::custom_output(Some("report.txt"))]
    fn test_main(#[case] output: Option<&str>) {
        let temp_dir = dataset();
        let out_dir = TempDir::new().unwrap();
        let output = output.map(|name| out_dir.path().join(name));
        let args = Args {
            source: temp_dir.path().to_path_buf(),
            output: output.clone(),
            verbose: false,
        };

        let analysis = run(args).unwrap();
        assert_eq!(analysis.train.timepoint_count(TimepointCombination::T1T2), 1);
        assert_eq!(analysis.train.timepoint_count(TimepointCombination::T1), 1);
        assert_eq!(analysis.train.sequence_count(SequencePresence::Both), 2);
        assert_eq!(analysis.train.sequence_count(SequencePresence::OnlyT1), 1);
        assert_eq!(analysis.test.count(TestPresence::All), 1);
        assert_eq!(analysis.test.count(TestPresence::OnlyFlair), 1);

        let report_path = output.unwrap_or_else(|| temp_dir.path().join(REPORT_FILENAME));
        let report = std::fs::read_to_string(report_path).unwrap();
        assert!(report.starts_with("TRAIN:"));
        assert!(report.contains("TEST:"));
    }

    #[test]
    fn test_missing_test_dir() {
        let temp_dir = TempDir::new().unwrap();
        touch(temp_dir.path(), "train/P1/T1/P1_T1_FLAIR.nii.gz");
        let args = Args {
            source: temp_dir.path().to_path_buf(),
            output: None,
            verbose: false,
        };
        let result = run(args);
        assert!(matches!(result, Err(Error::Analyze { .. })));
    }

    #[test]
    fn test_invalid_source() {
        let temp_dir = TempDir::new().unwrap();
        let args = Args {
            source: temp_dir.path().join("missing"),
            output: None,
            verbose: false,
        };
        assert!(matches!(run(args), Err(Error::InvalidSourcePath { .. })));
    }
}
