use clap::Parser;
use mslesseg_preprocessing::errors::DatasetError;
use mslesseg_preprocessing::manifest::{
    dataset_dir_name, DATASET_NAME, IMAGES_TR, IMAGES_TS, LABELS_TR, LABELS_TS, MANIFEST_FILENAME,
};
use mslesseg_preprocessing::report::{process_cases, CaseOutcome, Issue, IssueKind, RunSummary};
use mslesseg_preprocessing::split::{split_patients, DEFAULT_NUM_TEST_PATIENTS, DEFAULT_SPLIT_SEED};
use mslesseg_preprocessing::{Case, CaseFinder, ManifestBuilder, NamingConvention};
use snafu::{Report, ResultExt, Snafu, Whatever};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn, Level};

#[derive(Debug, Snafu)]
enum Error {
    #[snafu(display("Invalid source path: {}", path.display()))]
    InvalidSourcePath { path: PathBuf },

    #[snafu(display("No complete cases found in source path: {}", path.display()))]
    NoSources { path: PathBuf },

    #[snafu(display("Error discovering cases"))]
    Discovery {
        #[snafu(source(from(DatasetError, Box::new)))]
        source: Box<DatasetError>,
    },

    #[snafu(display("Error splitting patients"))]
    Split {
        #[snafu(source(from(DatasetError, Box::new)))]
        source: Box<DatasetError>,
    },

    #[snafu(display("Failed to create directory: {}", path.display()))]
    CreateDir {
        path: PathBuf,
        #[snafu(source(from(std::io::Error, Box::new)))]
        source: Box<std::io::Error>,
    },

    #[snafu(display("Error writing manifest"))]
    WriteManifest {
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
    about = "Build an nnU-Net raw dataset from cropped and renamed MSLesSeg cases",
    long_about = "Collects cases named in the channel convention (<case>_0000, <case>_0001, <case>_0002 and \
                  <case> for the mask), holds out a seeded set of test patients, copies every case into \
                  imagesTr/labelsTr or imagesTs/labelsTs and writes dataset.json."
)]
struct Args {
    #[arg(help = "Root of the cropped dataset")]
    source: PathBuf,

    #[arg(help = "nnU-Net raw directory. The dataset directory is created below it")]
    output: PathBuf,

    #[arg(
        help = "Split directory below the source root to collect cases from",
        long = "split",
        default_value = "train"
    )]
    split: String,

    #[arg(
        help = "nnU-Net dataset id",
        long = "dataset-id",
        short = 'd',
        default_value_t = 1
    )]
    dataset_id: u32,

    #[arg(help = "Dataset name", long = "name", default_value = DATASET_NAME)]
    name: String,

    #[arg(
        help = "Number of patients held out for testing",
        long = "num-test",
        short = 'n',
        default_value_t = DEFAULT_NUM_TEST_PATIENTS
    )]
    num_test: usize,

    #[arg(
        help = "Seed for the patient shuffle",
        long = "seed",
        default_value_t = DEFAULT_SPLIT_SEED
    )]
    seed: u64,

    #[arg(
        help = "Abort on the first case that fails to copy",
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

fn copy_file(source: &Path, dest_dir: &Path, outcome: &mut CaseOutcome) {
    let Some(name) = source.file_name() else {
        return;
    };
    let dest = dest_dir.join(name);
    match std::fs::copy(source, &dest) {
        Ok(_) => outcome.written.push(dest),
        Err(e) => outcome.issue(
            IssueKind::SaveError,
            format!("could not copy {} to {}: {}", source.display(), dest.display(), e),
        ),
    }
}

/// Copy the channels and mask of a case under their existing channel convention names
fn copy_case(case: &Case, images_dir: &Path, labels_dir: &Path) -> CaseOutcome {
    let mut outcome = CaseOutcome::new(case.id.as_str());
    for (modality, path) in case.files.iter() {
        let dest_dir = if modality.is_label() {
            labels_dir
        } else {
            images_dir
        };
        copy_file(path, dest_dir, &mut outcome);
    }
    outcome
}

fn run(args: Args) -> Result<RunSummary, Error> {
    let source_dir = args.source.join(&args.split);
    if !source_dir.is_dir() {
        return InvalidSourcePathSnafu { path: source_dir }.fail();
    }

    let discovery = CaseFinder::new(NamingConvention::Channel)
        .discover(&source_dir)
        .context(DiscoverySnafu)?;

    // Training cases need every channel and a mask, held out cases are kept to the same standard
    let cases = discovery
        .cases
        .values()
        .filter(|case| case.has_all_channels() && case.mask().is_some())
        .collect::<Vec<_>>();
    info!(
        "{} of {} cases have all channels and a mask",
        cases.len(),
        discovery.len()
    );
    if cases.is_empty() {
        return NoSourcesSnafu { path: source_dir }.fail();
    }

    let file_ending = cases[0].extension();
    for case in cases.iter().filter(|c| c.extension() != file_ending) {
        warn!(
            "Case {} is stored as {} but the dataset uses {}",
            case.id,
            case.extension(),
            file_ending
        );
    }

    let split = split_patients(
        cases.iter().map(|case| case.patient_id.clone()),
        args.num_test,
        args.seed,
    )
    .context(SplitSnafu)?;
    info!("Test patients: {:?}", split.test);

    let dataset_root = args.output.join(dataset_dir_name(args.dataset_id, &args.name));
    let dirs = [IMAGES_TR, LABELS_TR, IMAGES_TS, LABELS_TS].map(|d| dataset_root.join(d));
    for dir in dirs.iter() {
        std::fs::create_dir_all(dir).context(CreateDirSnafu { path: dir })?;
    }
    let [images_tr, labels_tr, images_ts, labels_ts] = &dirs;

    let outcomes = process_cases(cases, "Copying cases", args.strict, |case| {
        if split.is_test(&case.patient_id) {
            copy_case(case, images_ts, labels_ts)
        } else {
            copy_case(case, images_tr, labels_tr)
        }
    })
    .map_err(|issue| Error::Aborted { issue })?;

    // Only fully copied cases are listed
    let mut builder = ManifestBuilder::new().file_ending(file_ending);
    for outcome in outcomes.iter().filter(|o| o.first_failure().is_none()) {
        let case = &discovery.cases[&outcome.case_id];
        if split.is_test(&case.patient_id) {
            builder.add_test(case.id.as_str(), false);
        } else {
            builder.add_training(case.id.as_str());
        }
    }
    let manifest = builder.build();
    info!(
        "Dataset has {} training and {} test cases",
        manifest.num_training, manifest.num_test
    );
    manifest
        .write(dataset_root.join(MANIFEST_FILENAME))
        .context(WriteManifestSnafu)?;

    let summary = RunSummary::new(&outcomes, discovery.issues);
    summary.log();
    Ok(summary)
}
