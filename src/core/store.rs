use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Directory walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Invalid item key: {key}")]
    InvalidKey { key: String },
}

/// Local photo cache laid out as `<root>/<item_number>/<file>`.
///
/// Written by the image-fetch stage; only read here.
#[derive(Debug, Clone)]
pub struct ImageStore {
    root: PathBuf,
}

impl ImageStore {
    pub const EXTENSIONS: [&'static str; 5] = ["jpg", "jpeg", "png", "bmp", "webp"];

    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn item_dir(&self, item_number: &str) -> Result<PathBuf, StoreError> {
        let valid = !item_number.is_empty()
            && item_number != "."
            && item_number != ".."
            && !item_number.contains(['/', '\\']);
        if !valid {
            return Err(StoreError::InvalidKey {
                key: item_number.to_string(),
            });
        }
        Ok(self.root.join(item_number))
    }

    /// Image files of one item, sorted by file name. A missing directory is
    /// an item with no photos.
    pub fn images_for(&self, item_number: &str) -> Result<Vec<PathBuf>, StoreError> {
        let dir = self.item_dir(item_number)?;
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut images = Vec::new();
        for entry in WalkDir::new(&dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry?;
            if entry.file_type().is_file() && Self::is_image(entry.path()) {
                images.push(entry.into_path());
            }
        }
        Ok(images)
    }

    /// Every item directory under the root, sorted.
    pub fn item_numbers(&self) -> Result<Vec<String>, StoreError> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }

        let mut items = Vec::new();
        for entry in WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry?;
            if entry.file_type().is_dir() {
                items.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        Ok(items)
    }

    /// Path relative to the store root, for logs and the raw similarity table.
    pub fn relative_path(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .to_string_lossy()
            .into_owned()
    }

    fn is_image(path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| Self::EXTENSIONS.contains(&ext.to_lowercase().as_str()))
            .unwrap_or(false)
    }
}
