//! Image Folder Loader
//!
//! Indexes a labelled image directory where every immediate subdirectory is a
//! class. Class indices follow the sorted subdirectory names so the mapping is
//! stable across runs and machines.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::dataset::class_index::ClassIndex;
use crate::utils::error::{Result, TransferError};

/// File extensions recognised as images (compared case-insensitively)
pub const IMAGE_EXTENSIONS: [&str; 5] = ["bmp", "gif", "jpeg", "jpg", "png"];

/// A single image file with its class label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSample {
    /// Path to the image file
    pub path: PathBuf,
    /// Class label index
    pub label: usize,
}

/// An indexed image directory
#[derive(Debug, Clone)]
pub struct ImageFolder {
    /// Root directory of the dataset
    pub root_dir: PathBuf,
    /// Samples ordered by class, then by path
    pub samples: Vec<ImageSample>,
    /// Index to class name mapping
    pub classes: ClassIndex,
}

impl ImageFolder {
    /// Index a directory laid out as `root/<class>/<images>`.
    ///
    /// Images in nested folders below a class directory belong to that class.
    pub fn open<P: AsRef<Path>>(root_dir: P) -> Result<Self> {
        let root_dir = root_dir.as_ref().to_path_buf();
        info!("Indexing image folder: {:?}", root_dir);

        if !root_dir.is_dir() {
            return Err(TransferError::PathNotFound(root_dir));
        }

        let mut class_dirs: Vec<String> = Vec::new();
        for entry in std::fs::read_dir(&root_dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                match entry.file_name().to_str() {
                    Some(name) => class_dirs.push(name.to_string()),
                    None => {
                        return Err(TransferError::Dataset(format!(
                            "class directory name is not valid UTF-8: {:?}",
                            entry.path()
                        )))
                    }
                }
            }
        }
        class_dirs.sort();

        if class_dirs.len() < 2 {
            return Err(TransferError::TooFewClasses(class_dirs.len()));
        }

        let mut samples = Vec::new();
        for (label, class_name) in class_dirs.iter().enumerate() {
            let class_dir = root_dir.join(class_name);
            let before = samples.len();

            let mut paths: Vec<PathBuf> = WalkDir::new(&class_dir)
                .min_depth(1)
                .follow_links(true)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file() && is_image_path(e.path()))
                .map(|e| e.into_path())
                .collect();
            paths.sort();

            samples.extend(paths.into_iter().map(|path| ImageSample { path, label }));

            let count = samples.len() - before;
            if count == 0 {
                warn!("Class '{}' has no images in {:?}", class_name, class_dir);
            }
            debug!("Class '{}' (label {}): {} images", class_name, label, count);
        }

        if samples.is_empty() {
            return Err(TransferError::Dataset(format!(
                "no images with extensions {:?} found under {:?}",
                IMAGE_EXTENSIONS, root_dir
            )));
        }

        info!(
            "Found {} images belonging to {} classes",
            samples.len(),
            class_dirs.len()
        );

        Ok(Self {
            root_dir,
            samples,
            classes: ClassIndex::new(class_dirs),
        })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }

    /// Sorted class names
    pub fn class_names(&self) -> &[String] {
        self.classes.names()
    }
}

/// Whether a path has one of the supported image extensions
pub fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join(name), b"not decoded during indexing").unwrap();
    }

    #[test]
    fn test_classes_sorted_and_labels_follow() {
        let tmp = TempDir::new().unwrap();
        touch(&tmp.path().join("tulips"), "a.jpg");
        touch(&tmp.path().join("daisy"), "b.png");
        touch(&tmp.path().join("roses"), "c.JPEG");

        let folder = ImageFolder::open(tmp.path()).unwrap();

        assert_eq!(folder.class_names(), &["daisy", "roses", "tulips"]);
        assert_eq!(folder.len(), 3);
        let daisy = folder.samples.iter().find(|s| s.path.ends_with("b.png")).unwrap();
        assert_eq!(daisy.label, 0);
        let tulip = folder.samples.iter().find(|s| s.path.ends_with("a.jpg")).unwrap();
        assert_eq!(tulip.label, 2);
    }

    #[test]
    fn test_non_images_ignored_and_nested_included() {
        let tmp = TempDir::new().unwrap();
        touch(&tmp.path().join("a"), "1.jpg");
        touch(&tmp.path().join("a"), "notes.txt");
        touch(&tmp.path().join("a/nested"), "2.bmp");
        touch(&tmp.path().join("b"), "3.gif");

        let folder = ImageFolder::open(tmp.path()).unwrap();
        assert_eq!(folder.len(), 3);
    }

    #[test]
    fn test_single_class_rejected() {
        let tmp = TempDir::new().unwrap();
        touch(&tmp.path().join("only"), "1.jpg");

        let err = ImageFolder::open(tmp.path()).unwrap_err();
        assert!(matches!(err, TransferError::TooFewClasses(1)));
    }

    #[test]
    fn test_no_images_rejected() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("a")).unwrap();
        fs::create_dir_all(tmp.path().join("b")).unwrap();

        let err = ImageFolder::open(tmp.path()).unwrap_err();
        assert!(matches!(err, TransferError::Dataset(_)));
    }

    #[test]
    fn test_missing_root() {
        let err = ImageFolder::open("/definitely/not/here").unwrap_err();
        assert!(matches!(err, TransferError::PathNotFound(_)));
    }
}
