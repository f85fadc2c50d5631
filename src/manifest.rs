use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::ser::PrettyFormatter;
use serde_json::Value;
use snafu::ResultExt;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;

use crate::errors::dataset::{DatasetError, IOSnafu, JsonReadSnafu, JsonWriteSnafu};
use crate::modality::{channel_names, label_names};

pub const MANIFEST_FILENAME: &str = "dataset.json";
pub const DEFAULT_FILE_ENDING: &str = ".nii.gz";

pub const IMAGES_TR: &str = "imagesTr";
pub const LABELS_TR: &str = "labelsTr";
pub const IMAGES_TS: &str = "imagesTs";
pub const LABELS_TS: &str = "labelsTs";

pub const DATASET_NAME: &str = "MSLesSeg";
pub const DATASET_DESCRIPTION: &str = "Multiple sclerosis lesion segmentation (FLAIR, T1, T2)";
pub const DEFAULT_RELEASE: &str = "1.0";

const JSON_INDENT: &[u8] = b"    ";

/// Name of the nnU-Net dataset directory, e.g. `Dataset001_MSLesSeg`
pub fn dataset_dir_name(dataset_id: u32, name: &str) -> String {
    format!("Dataset{dataset_id:03}_{name}")
}

fn default_file_ending() -> String {
    DEFAULT_FILE_ENDING.to_string()
}

/// Case id of a manifest image path such as `./imagesTr/P1_T1`
fn case_id_of(image: &str) -> &str {
    image.rsplit('/').next().unwrap_or(image)
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TensorImageSize {
    #[serde(rename = "2D")]
    TwoD,
    #[default]
    #[serde(rename = "3D")]
    ThreeD,
}

impl fmt::Display for TensorImageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let size_str = match self {
            TensorImageSize::TwoD => "2D",
            TensorImageSize::ThreeD => "3D",
        };
        write!(f, "{}", size_str)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct TrainingEntry {
    pub image: String,
    pub label: String,
}

impl TrainingEntry {
    pub fn case_id(&self) -> &str {
        case_id_of(&self.image)
    }
}

/// Test entries are a bare image path unless a label is available
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
#[serde(untagged)]
pub enum TestEntry {
    Image(String),
    Labeled { image: String, label: String },
}

impl TestEntry {
    pub fn image(&self) -> &str {
        match self {
            TestEntry::Image(image) => image,
            TestEntry::Labeled { image, .. } => image,
        }
    }

    pub fn label(&self) -> Option<&str> {
        match self {
            TestEntry::Image(_) => None,
            TestEntry::Labeled { label, .. } => Some(label),
        }
    }

    pub fn case_id(&self) -> &str {
        case_id_of(self.image())
    }
}

/// Contents of an nnU-Net `dataset.json`. Keys this type does not know are kept in `extra`
/// and written back after the known ones.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DatasetManifest {
    pub name: String,
    pub description: String,
    #[serde(rename = "tensorImageSize")]
    pub tensor_image_size: TensorImageSize,
    #[serde(default)]
    pub reference: String,
    #[serde(default)]
    pub licence: String,
    #[serde(default)]
    pub release: String,
    pub channel_names: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
    #[serde(rename = "numTraining")]
    pub num_training: usize,
    #[serde(rename = "numTest", default)]
    pub num_test: usize,
    #[serde(default = "default_file_ending")]
    pub file_ending: String,
    pub training: Vec<TrainingEntry>,
    #[serde(default)]
    pub test: Vec<TestEntry>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl DatasetManifest {
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self, DatasetError> {
        read_json(path)
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<(), DatasetError> {
        write_json(self, path)
    }

    /// Counts agree with the entry lists
    pub fn is_consistent(&self) -> bool {
        self.num_training == self.training.len() && self.num_test == self.test.len()
    }

    pub fn training_ids(&self) -> impl Iterator<Item = &str> {
        self.training.iter().map(TrainingEntry::case_id)
    }

    pub fn test_ids(&self) -> impl Iterator<Item = &str> {
        self.test.iter().map(TestEntry::case_id)
    }
}

/// Assembles a manifest from case ids. Ids are kept sorted and unique so the output does not
/// depend on the order cases were added in.
#[derive(Debug, Clone)]
pub struct ManifestBuilder {
    name: String,
    description: String,
    tensor_image_size: TensorImageSize,
    reference: String,
    licence: String,
    release: String,
    channel_names: BTreeMap<String, String>,
    labels: BTreeMap<String, String>,
    file_ending: String,
    extra: BTreeMap<String, Value>,
    training: BTreeSet<String>,
    test: BTreeMap<String, bool>,
}

impl Default for ManifestBuilder {
    fn default() -> Self {
        ManifestBuilder {
            name: DATASET_NAME.to_string(),
            description: DATASET_DESCRIPTION.to_string(),
            tensor_image_size: TensorImageSize::ThreeD,
            reference: String::new(),
            licence: String::new(),
            release: DEFAULT_RELEASE.to_string(),
            channel_names: channel_names(),
            labels: label_names(),
            file_ending: DEFAULT_FILE_ENDING.to_string(),
            extra: BTreeMap::new(),
            training: BTreeSet::new(),
            test: BTreeMap::new(),
        }
    }
}

impl ManifestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from the metadata of an existing manifest, without its cases
    pub fn from_manifest(manifest: &DatasetManifest) -> Self {
        ManifestBuilder {
            name: manifest.name.clone(),
            description: manifest.description.clone(),
            tensor_image_size: manifest.tensor_image_size,
            reference: manifest.reference.clone(),
            licence: manifest.licence.clone(),
            release: manifest.release.clone(),
            channel_names: manifest.channel_names.clone(),
            labels: manifest.labels.clone(),
            file_ending: manifest.file_ending.clone(),
            extra: manifest.extra.clone(),
            training: BTreeSet::new(),
            test: BTreeMap::new(),
        }
    }

    pub fn tensor_image_size(mut self, size: TensorImageSize) -> Self {
        self.tensor_image_size = size;
        self
    }

    pub fn file_ending<S: Into<String>>(mut self, file_ending: S) -> Self {
        self.file_ending = file_ending.into();
        self
    }

    pub fn add_training<S: Into<String>>(&mut self, case_id: S) {
        self.training.insert(case_id.into());
    }

    /// Add a held-out case. A case added twice keeps its label if either addition had one.
    pub fn add_test<S: Into<String>>(&mut self, case_id: S, labeled: bool) {
        let entry = self.test.entry(case_id.into()).or_insert(false);
        *entry |= labeled;
    }

    pub fn training_cases<I, S>(mut self, case_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        case_ids.into_iter().for_each(|id| self.add_training(id));
        self
    }

    pub fn test_cases<I, S>(mut self, case_ids: I, labeled: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        case_ids.into_iter().for_each(|id| self.add_test(id, labeled));
        self
    }

    pub fn build(&self) -> DatasetManifest {
        let ending = &self.file_ending;
        let training = self
            .training
            .iter()
            .map(|id| TrainingEntry {
                image: format!("./{IMAGES_TR}/{id}"),
                label: format!("./{LABELS_TR}/{id}{ending}"),
            })
            .collect::<Vec<_>>();
        let test = self
            .test
            .iter()
            .map(|(id, &labeled)| {
                let image = format!("./{IMAGES_TS}/{id}");
                if labeled {
                    TestEntry::Labeled {
                        image,
                        label: format!("./{LABELS_TS}/{id}{ending}"),
                    }
                } else {
                    TestEntry::Image(image)
                }
            })
            .collect::<Vec<_>>();

        DatasetManifest {
            name: self.name.clone(),
            description: self.description.clone(),
            tensor_image_size: self.tensor_image_size,
            reference: self.reference.clone(),
            licence: self.licence.clone(),
            release: self.release.clone(),
            channel_names: self.channel_names.clone(),
            labels: self.labels.clone(),
            num_training: training.len(),
            num_test: test.len(),
            file_ending: self.file_ending.clone(),
            training,
            test,
            extra: self.extra.clone(),
        }
    }
}

/// Serialize with 4-space indentation
pub fn to_pretty_json<T: Serialize>(value: &T) -> Result<String, DatasetError> {
    let mut buffer = Vec::new();
    let formatter = PrettyFormatter::with_indent(JSON_INDENT);
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
    value
        .serialize(&mut serializer)
        .context(JsonWriteSnafu)?;
    // serde_json only ever emits UTF-8
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

pub fn write_json<T: Serialize, P: AsRef<Path>>(value: &T, path: P) -> Result<(), DatasetError> {
    let path = path.as_ref();
    let json = to_pretty_json(value)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).context(IOSnafu { path: parent })?;
    }
    std::fs::write(path, json).context(IOSnafu { path })
}

pub fn read_json<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> Result<T, DatasetError> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).context(IOSnafu { path })?;
    serde_json::from_str(&contents).context(JsonReadSnafu { path })
}
