//! Capture source that replays encoded images from a directory
//!
//! Files with a `.jpg`, `.jpeg` or `.png` extension are served in name order.
//! The listing is refreshed each time the cycle wraps, so frames dropped into
//! the directory by an external grabber are picked up.

use super::CaptureSource;
use crate::error::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};

const EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

pub struct DirectorySource {
    dir: PathBuf,
    name: String,
    files: Vec<PathBuf>,
    next: usize,
}

impl DirectorySource {
    /// Open `dir`; fails if it does not exist or holds no images
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let files = list_images(&dir)?;
        if files.is_empty() {
            return Err(Error::Capture(format!("No image files in {}", dir.display())));
        }
        log::info!("Capture directory {}: {} images", dir.display(), files.len());

        Ok(Self {
            name: format!("directory:{}", dir.display()),
            dir,
            files,
            next: 0,
        })
    }
}

fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir)
        .map_err(|e| Error::Capture(format!("Cannot read {}: {}", dir.display(), e)))?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        })
        .collect();
    files.sort();
    Ok(files)
}

impl CaptureSource for DirectorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn capture(&mut self) -> Result<Vec<u8>> {
        if self.next >= self.files.len() {
            self.files = list_images(&self.dir)?;
            self.next = 0;
        }
        let Some(path) = self.files.get(self.next) else {
            return Err(Error::Capture(format!("No image files in {}", self.dir.display())));
        };
        self.next += 1;

        let bytes = fs::read(path)
            .map_err(|e| Error::Capture(format!("Cannot read {}: {}", path.display(), e)))?;
        image::guess_format(&bytes)?;
        Ok(bytes)
    }
}
