use clap::Parser;
use mslesseg_preprocessing::errors::DatasetError;
use mslesseg_preprocessing::file::NiftiFileOperations;
use mslesseg_preprocessing::folds::parse_slice_stem;
use mslesseg_preprocessing::manifest::{
    TensorImageSize, IMAGES_TR, IMAGES_TS, LABELS_TR, LABELS_TS, MANIFEST_FILENAME,
};
use mslesseg_preprocessing::report::{process_cases, CaseOutcome, Issue, IssueKind, RunSummary};
use mslesseg_preprocessing::save::{slice_name, NiftiSaver, SavePlane, VoxelKind};
use mslesseg_preprocessing::transform::{
    SelectionPolicy, SliceSelection, DEFAULT_NUM_SLICES, DEFAULT_SEED,
};
use mslesseg_preprocessing::{DatasetManifest, ManifestBuilder, Volume};
use snafu::{Report, ResultExt, Snafu, Whatever};
use std::collections::BTreeSet;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::{error, info, Level};

#[derive(Debug, Snafu)]
enum Error {
    #[snafu(display("Invalid source path: {}", path.display()))]
    InvalidSourcePath { path: PathBuf },

    #[snafu(display("Error reading manifest"))]
    ReadManifest {
        #[snafu(source(from(DatasetError, Box::new)))]
        source: Box<DatasetError>,
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
    about = "Convert a 3D nnU-Net dataset into a 2D dataset of single-slice NIfTI files",
    long_about = None
)]
struct Args {
    #[arg(help = "Source 3D dataset directory containing dataset.json")]
    source: PathBuf,

    #[arg(help = "Output 2D dataset directory")]
    output: PathBuf,

    #[arg(
        help = "Which depth slices to extract",
        long = "policy",
        short = 'p',
        value_enum,
        default_value_t = SelectionPolicy::default()
    )]
    policy: SelectionPolicy,

    #[arg(
        help = "Number of slices per case for the random policy",
        long = "num-slices",
        short = 'n',
        default_value_t = DEFAULT_NUM_SLICES
    )]
    num_slices: usize,

    #[arg(
        help = "Seed for the random policy, mixed with each case id",
        long = "seed",
        default_value_t = DEFAULT_SEED
    )]
    seed: u64,

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

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Subset {
    Training,
    Test,
}

impl Subset {
    fn images_dir(&self) -> &'static str {
        match self {
            Subset::Training => IMAGES_TR,
            Subset::Test => IMAGES_TS,
        }
    }

    fn labels_dir(&self) -> &'static str {
        match self {
            Subset::Training => LABELS_TR,
            Subset::Test => LABELS_TS,
        }
    }
}

/// A 3D case of the source dataset
#[derive(Debug, Clone)]
struct SourceCase {
    id: String,
    subset: Subset,
    channels: Vec<PathBuf>,
    label: Option<PathBuf>,
}

/// Resolve the channel and label files of every manifest entry. Test labels are picked up from
/// `labelsTs` when present even if the manifest lists a bare image.
fn source_cases(manifest: &DatasetManifest, source: &Path) -> Vec<SourceCase> {
    let ending = manifest.file_ending.as_str();
    let num_channels = manifest.channel_names.len();
    let case = |id: &str, subset: Subset, label: Option<PathBuf>| SourceCase {
        id: id.to_string(),
        subset,
        channels: (0..num_channels)
            .map(|c| source.join(subset.images_dir()).join(format!("{id}_{c:04}{ending}")))
            .collect(),
        label,
    };

    let training = manifest.training_ids().map(|id| {
        let label = source.join(LABELS_TR).join(format!("{id}{ending}"));
        case(id, Subset::Training, Some(label))
    });
    let test = manifest.test_ids().map(|id| {
        let label = source.join(LABELS_TS).join(format!("{id}{ending}"));
        case(id, Subset::Test, label.is_file().then_some(label))
    });
    training.chain(test).collect()
}

fn load_images(case: &SourceCase) -> Result<Volume, String> {
    let volumes = case
        .channels
        .iter()
        .map(Volume::open)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| Report::from_error(e).to_string())?;
    Volume::stack(&volumes).map_err(|e| Report::from_error(e).to_string())
}

fn process_case(
    case: &SourceCase,
    dest: &Path,
    selection: SliceSelection,
    ending: &str,
) -> CaseOutcome {
    let mut outcome = CaseOutcome::new(case.id.as_str());
    let images = match load_images(case) {
        Ok(images) => images,
        Err(message) => {
            outcome.issue(IssueKind::LoadError, message);
            return outcome;
        }
    };

    let mut label = match case.label.as_ref().map(Volume::open).transpose() {
        Ok(label) => label,
        Err(e) => {
            outcome.issue(IssueKind::LoadError, Report::from_error(e).to_string());
            return outcome;
        }
    };
    if let Some(shape) = label.as_ref().map(Volume::spatial_shape) {
        if shape != images.spatial_shape() {
            let message = format!(
                "label shape {:?} differs from image shape {:?}",
                shape,
                images.spatial_shape()
            );
            // Training slices need a label, test slices can go without one
            match case.subset {
                Subset::Training => {
                    outcome.issue(IssueKind::ShapeMismatch, format!("{message}; dropping case"));
                    return outcome;
                }
                Subset::Test => {
                    outcome.issue(IssueKind::ShapeMismatch, format!("{message}; dropping label"));
                    label = None;
                }
            }
        }
    }

    let indices = selection.select(&case.id, images.depth());
    tracing::debug!("{}: slices {:?}", case.id, indices);
    let image_saver = NiftiSaver::new(VoxelKind::Intensity);
    let label_saver = NiftiSaver::new(VoxelKind::Label);
    let images_dir = dest.join(case.subset.images_dir());
    let labels_dir = dest.join(case.subset.labels_dir());

    // Slices are numbered by their 1-based position in the selection
    for (ordinal, &index) in indices.iter().enumerate() {
        let number = ordinal + 1;
        for channel in 0..images.num_channels() {
            let path = images_dir.join(slice_name(&case.id, number, Some(channel), ending));
            match image_saver.save_plane(&images, index, channel, &path) {
                Ok(()) => outcome.written.push(path),
                Err(e) => outcome.issue(IssueKind::SaveError, Report::from_error(e).to_string()),
            }
        }
        if let Some(label) = label.as_ref() {
            let path = labels_dir.join(slice_name(&case.id, number, None, ending));
            match label_saver.save_plane(label, index, 0, &path) {
                Ok(()) => outcome.written.push(path),
                Err(e) => outcome.issue(IssueKind::SaveError, Report::from_error(e).to_string()),
            }
        }
    }
    outcome
}

/// Whether a case wrote any label plane
fn wrote_labels(outcome: &CaseOutcome, subset: Subset) -> bool {
    let labels_dir = OsStr::new(subset.labels_dir());
    outcome
        .written
        .iter()
        .filter_map(|path| path.parent()?.file_name())
        .any(|dir| dir == labels_dir)
}

/// Slice ids of the image files a case wrote
fn written_slice_ids(outcome: &CaseOutcome) -> BTreeSet<String> {
    outcome
        .written
        .iter()
        .filter_map(|path| path.nifti_stem())
        .filter_map(|stem| parse_slice_stem(&stem))
        .map(|(_, slice_id)| slice_id)
        .collect()
}

fn run(args: Args) -> Result<RunSummary, Error> {
    if !args.source.is_dir() {
        return InvalidSourcePathSnafu { path: args.source }.fail();
    }
    let manifest =
        DatasetManifest::read(args.source.join(MANIFEST_FILENAME)).context(ReadManifestSnafu)?;
    if !manifest.is_consistent() {
        tracing::warn!("Source manifest counts do not match its entries");
    }

    let cases = source_cases(&manifest, &args.source);
    info!(
        "Converting {} training and {} test cases",
        manifest.training.len(),
        manifest.test.len()
    );

    let selection = args.policy.into_selection(args.num_slices, args.seed);
    let dest = args.output.as_path();
    let ending = manifest.file_ending.as_str();
    let test_ids = cases
        .iter()
        .filter(|c| c.subset == Subset::Test)
        .map(|c| c.id.clone())
        .collect::<BTreeSet<_>>();

    let outcomes = process_cases(cases, "Extracting slices", args.strict, |case| {
        process_case(&case, dest, selection, ending)
    })
    .map_err(|issue| Error::Aborted { issue })?;

    // Only cases written without failures are listed
    let mut builder =
        ManifestBuilder::from_manifest(&manifest).tensor_image_size(TensorImageSize::TwoD);
    for outcome in outcomes.iter().filter(|o| o.first_failure().is_none()) {
        let is_test = test_ids.contains(&outcome.case_id);
        let labeled = is_test && wrote_labels(outcome, Subset::Test);
        for slice_id in written_slice_ids(outcome) {
            if is_test {
                builder.add_test(slice_id, labeled);
            } else {
                builder.add_training(slice_id);
            }
        }
    }
    let new_manifest = builder.build();
    info!(
        "2D dataset has {} training and {} test slices",
        new_manifest.num_training, new_manifest.num_test
    );
    new_manifest
        .write(args.output.join(MANIFEST_FILENAME))
        .context(WriteManifestSnafu)?;

    let summary = RunSummary::new(&outcomes, Vec::new());
    summary.log();
    Ok(summary)
}
