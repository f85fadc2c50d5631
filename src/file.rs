use indicatif::{ProgressBar, ProgressStyle};
use rust_search::SearchBuilder;
use std::path::{Path, PathBuf};

type IOResult<T> = Result<T, std::io::Error>;

pub const NIFTI_EXTENSION: &str = ".nii";
pub const NIFTI_GZ_EXTENSION: &str = ".nii.gz";
pub const PNG_EXTENSION: &str = ".png";

pub fn default_bar(len: u64) -> ProgressBar {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{msg} {spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta} @ {per_sec})",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    pb
}

pub fn default_spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.blue} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner
}

fn not_a_directory(dir: &Path) -> std::io::Error {
    std::io::Error::new(
        std::io::ErrorKind::InvalidInput,
        format!("Not a directory: {}", dir.display()),
    )
}

/// Recursively list files under `dir` passing `filter`, sorted so callers never see
/// filesystem enumeration order.
fn search<F>(dir: &Path, filter: F) -> IOResult<Vec<PathBuf>>
where
    F: Fn(&Path) -> bool,
{
    if !dir.is_dir() {
        return Err(not_a_directory(dir));
    }
    let mut result = SearchBuilder::default()
        .location(dir)
        .build()
        .map(PathBuf::from)
        .filter(|file| filter(file.as_path()))
        .collect::<Vec<_>>();
    result.sort();
    Ok(result)
}

/// Immediate children of `dir` passing `filter`, sorted. Hidden entries are skipped.
fn list<F>(dir: &Path, filter: F) -> IOResult<Vec<PathBuf>>
where
    F: Fn(&Path) -> bool,
{
    if !dir.is_dir() {
        return Err(not_a_directory(dir));
    }
    let mut result = SearchBuilder::default()
        .location(dir)
        .depth(1)
        .build()
        .map(PathBuf::from)
        .filter(|entry| entry.as_path() != dir && filter(entry.as_path()))
        .collect::<Vec<_>>();
    result.sort();
    Ok(result)
}

/// Subdirectories directly under `dir`
pub fn find_dirs<P: AsRef<Path>>(dir: P) -> IOResult<Vec<PathBuf>> {
    list(dir.as_ref(), Path::is_dir)
}

/// Files directly under `dir`
pub fn find_files<P: AsRef<Path>>(dir: P) -> IOResult<Vec<PathBuf>> {
    list(dir.as_ref(), Path::is_file)
}

pub trait NiftiFileOperations
where
    Self: AsRef<Path>,
{
    /// The NIfTI extension of a path, `.nii.gz` taking precedence over `.nii`.
    fn nifti_extension(&self) -> Option<&'static str> {
        let name = self.as_ref().file_name()?.to_str()?;
        if name.ends_with(NIFTI_GZ_EXTENSION) {
            Some(NIFTI_GZ_EXTENSION)
        } else if name.ends_with(NIFTI_EXTENSION) {
            Some(NIFTI_EXTENSION)
        } else {
            None
        }
    }

    /// Check if a file has a `.nii` or `.nii.gz` extension.
    fn has_nifti_extension(&self) -> bool {
        self.nifti_extension().is_some()
    }

    /// Check if a path is an existing NIfTI file. Only the extension is inspected.
    fn is_nifti_file(&self) -> bool {
        self.as_ref().is_file() && self.has_nifti_extension()
    }

    /// File name with the NIfTI extension removed.
    fn nifti_stem(&self) -> Option<String> {
        let extension = self.nifti_extension()?;
        let name = self.as_ref().file_name()?.to_str()?;
        name.strip_suffix(extension).map(str::to_string)
    }

    /// Find all NIfTI files in a directory, recursively.
    fn find_niftis(&self) -> IOResult<Vec<PathBuf>> {
        search(self.as_ref(), |file| file.is_nifti_file())
    }

    /// Find all NIfTI files in a directory, with a progress spinner.
    fn find_niftis_with_spinner(&self) -> IOResult<Vec<PathBuf>> {
        let spinner = default_spinner();
        spinner.set_message("Searching for NIfTI files");
        spinner.enable_steady_tick(std::time::Duration::from_millis(100));
        let result = self.find_niftis();
        spinner.finish_and_clear();
        result
    }
}

impl<P: AsRef<Path>> NiftiFileOperations for P {}

pub trait PngFileOperations
where
    Self: AsRef<Path>,
{
    /// Check if a file has a PNG extension.
    fn has_png_extension(&self) -> bool {
        let path = self.as_ref();
        if let Some(ext) = path.extension() {
            return ext == "png" || ext == "PNG";
        }
        false
    }

    fn is_png_file(&self) -> bool {
        self.as_ref().is_file() && self.has_png_extension()
    }

    /// Find all PNG files in a directory, recursively.
    fn find_pngs(&self) -> IOResult<Vec<PathBuf>> {
        search(self.as_ref(), |file| file.is_png_file())
    }

    /// Find all PNG files in a directory, with a progress spinner.
    fn find_pngs_with_spinner(&self) -> IOResult<Vec<PathBuf>> {
        let spinner = default_spinner();
        spinner.set_message("Searching for PNG files");
        spinner.enable_steady_tick(std::time::Duration::from_millis(100));
        let result = self.find_pngs();
        spinner.finish_and_clear();
        result
    }
}

impl<P: AsRef<Path>> PngFileOperations for P {}

#[cfg(test)]
mod tests {
    use super::*;

    use rstest::rstest;
    use tempfile::TempDir;

    #[rstest]
    #[case::no_extension("P1_T1_FLAIR", None)]
    #[case::wrong_extension("P1_T1_FLAIR.txt", None)]
    #[case::nii("P1_T1_FLAIR.nii", Some(".nii"))]
    #[case::nii_gz("P1_T1_FLAIR.nii.gz", Some(".nii.gz"))]
    #[case::gz_only("P1_T1_FLAIR.gz", None)]
    fn test_nifti_extension(#[case] path: &str, #[case] expected: Option<&str>) {
        let path = PathBuf::from(path);
        assert_eq!(path.nifti_extension(), expected);
        assert_eq!(path.has_nifti_extension(), expected.is_some());
    }

    #[rstest]
    #[case("a/b/P1_T1_FLAIR.nii.gz", Some("P1_T1_FLAIR"))]
    #[case("P1.nii", Some("P1"))]
    #[case("P1.png", None)]
    fn test_nifti_stem(#[case] path: &str, #[case] expected: Option<&str>) {
        let path = PathBuf::from(path);
        assert_eq!(path.nifti_stem().as_deref(), expected);
    }

    #[rstest]
    #[case("image.png", true)]
    #[case("image.PNG", true)]
    #[case("image.jpg", false)]
    #[case("image", false)]
    fn test_has_png_extension(#[case] path: &str, #[case] expected: bool) {
        assert_eq!(PathBuf::from(path).has_png_extension(), expected);
    }

    #[test]
    fn test_find_niftis() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("P1").join("T1");
        std::fs::create_dir_all(&nested).unwrap();
        for name in ["P1_T1_T1.nii.gz", "P1_T1_FLAIR.nii.gz", "notes.txt"] {
            std::fs::write(nested.join(name), b"").unwrap();
        }
        std::fs::write(temp_dir.path().join("P2_FLAIR.nii"), b"").unwrap();
        // Directories never match, even with a matching name
        std::fs::create_dir_all(temp_dir.path().join("dir.nii")).unwrap();

        let found = temp_dir.path().find_niftis().unwrap();
        let expected = vec![
            nested.join("P1_T1_FLAIR.nii.gz"),
            nested.join("P1_T1_T1.nii.gz"),
            temp_dir.path().join("P2_FLAIR.nii"),
        ];
        assert_eq!(found, expected);
    }

    #[test]
    fn test_find_pngs() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::create_dir_all(temp_dir.path().join("P1")).unwrap();
        std::fs::write(temp_dir.path().join("P1").join("a.png"), b"").unwrap();
        std::fs::write(temp_dir.path().join("b.txt"), b"").unwrap();
        let found = temp_dir.path().find_pngs().unwrap();
        assert_eq!(found, vec![temp_dir.path().join("P1").join("a.png")]);
    }

    #[test]
    fn test_find_dirs_and_files() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        for dir in ["P2/T1", "P1", ".hidden"] {
            std::fs::create_dir_all(root.join(dir)).unwrap();
        }
        std::fs::write(root.join("b.txt"), b"").unwrap();
        std::fs::write(root.join("P1").join("nested.txt"), b"").unwrap();

        assert_eq!(find_dirs(root).unwrap(), vec![root.join("P1"), root.join("P2")]);
        assert_eq!(find_files(root).unwrap(), vec![root.join("b.txt")]);
        assert!(find_dirs(root.join("b.txt")).is_err());
    }

    #[test]
    fn test_find_not_a_directory() {
        let temp_dir = TempDir::new().unwrap();
        let result = temp_dir.path().join("missing").find_niftis();
        assert!(result.is_err());
    }
}
