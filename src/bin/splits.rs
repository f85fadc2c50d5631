use clap::Parser;
use mslesseg_preprocessing::errors::DatasetError;
use mslesseg_preprocessing::folds::{
    expand_folds, locate_splits, read_folds, write_folds, SliceIndex, SPLITS_FILENAME,
};
use mslesseg_preprocessing::manifest::{dataset_dir_name, DATASET_NAME, IMAGES_TR};
use mslesseg_preprocessing::RunSummary;
use snafu::{Report, ResultExt, Snafu, Whatever};
use std::path::PathBuf;
use tracing::{error, info, Level};

#[derive(Debug, Snafu)]
enum Error {
    #[snafu(display("Error locating splits"))]
    Locate {
        #[snafu(source(from(DatasetError, Box::new)))]
        source: Box<DatasetError>,
    },

    #[snafu(display("Error reading splits"))]
    ReadSplits {
        #[snafu(source(from(DatasetError, Box::new)))]
        source: Box<DatasetError>,
    },

    #[snafu(display("Error indexing 2D slices"))]
    Index {
        #[snafu(source(from(DatasetError, Box::new)))]
        source: Box<DatasetError>,
    },

    #[snafu(display("Error writing splits"))]
    WriteSplits {
        #[snafu(source(from(DatasetError, Box::new)))]
        source: Box<DatasetError>,
    },

    #[snafu(display("Failed to create directory: {}", path.display()))]
    CreateDir {
        path: PathBuf,
        #[snafu(source(from(std::io::Error, Box::new)))]
        source: Box<std::io::Error>,
    },
}

#[derive(Parser, Debug)]
#[command(
    author = "Scott Chase Waggener",
    version = env!("CARGO_PKG_VERSION"),
    about = "Expand the cross-validation splits of a 3D dataset into the slice ids of its 2D counterpart",
    long_about = None
)]
struct Args {
    #[arg(help = "nnU-Net raw directory")]
    raw: PathBuf,

    #[arg(help = "nnU-Net preprocessed directory")]
    preprocessed: PathBuf,

    #[arg(help = "nnU-Net results directory")]
    results: PathBuf,

    #[arg(
        help = "3D dataset whose splits are expanded",
        long = "src",
        default_value_t = dataset_dir_name(1, DATASET_NAME)
    )]
    src: String,

    #[arg(
        help = "2D dataset receiving the expanded splits",
        long = "dst",
        default_value_t = dataset_dir_name(2, DATASET_NAME)
    )]
    dst: String,

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

fn run(args: Args) -> Result<RunSummary, Error> {
    // Preprocessed splits take precedence over raw ones
    let candidates = vec![
        args.preprocessed.join(&args.src).join(SPLITS_FILENAME),
        args.raw.join(&args.src).join(SPLITS_FILENAME),
    ];
    let splits_path = locate_splits(&candidates).context(LocateSnafu)?;
    info!("Using splits from {}", splits_path.display());
    let folds = read_folds(&splits_path).context(ReadSplitsSnafu)?;

    let index = SliceIndex::from_dir(args.raw.join(&args.dst).join(IMAGES_TR)).context(IndexSnafu)?;
    let (expanded, issues) = expand_folds(&folds, &index);

    let dst_preprocessed = args.preprocessed.join(&args.dst);
    let dst_results = args.results.join(&args.dst);
    for dir in [&dst_preprocessed, &dst_results] {
        std::fs::create_dir_all(dir).context(CreateDirSnafu { path: dir })?;
    }
    let out_path = dst_preprocessed.join(SPLITS_FILENAME);
    write_folds(&expanded, &out_path).context(WriteSplitsSnafu)?;
    info!("Wrote {} folds to {}", expanded.len(), out_path.display());

    let summary = RunSummary::new(&[], issues);
    summary.log();
    Ok(summary)
}
