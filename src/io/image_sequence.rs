//! Offline replay of a directory of captured frames.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use opencv::imgcodecs::{self, IMREAD_COLOR};
use opencv::prelude::*;
use tracing::{info, warn};

use super::frame::{Frame, FrameRead, FrameSource};

const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "tif"];

/// Replays image files in lexical filename order, then reports `Closed`.
#[derive(Debug)]
pub struct ImageSequenceSource {
    root: PathBuf,
    files: Vec<PathBuf>,
    next: usize,
}

impl ImageSequenceSource {
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let files = list_images(&root)?;
        if files.is_empty() {
            bail!("No images found in {:?}", root);
        }
        info!("Replaying {} images from {:?}", files.len(), root);
        Ok(Self {
            root,
            files,
            next: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FrameSource for ImageSequenceSource {
    fn read(&mut self) -> FrameRead {
        let Some(path) = self.files.get(self.next) else {
            return FrameRead::Closed;
        };
        self.next += 1;

        let Some(path_str) = path.to_str() else {
            warn!("Skipping non UTF-8 path {:?}", path);
            return FrameRead::Unavailable;
        };
        match imgcodecs::imread(path_str, IMREAD_COLOR) {
            Ok(image) if !image.empty() => FrameRead::Ready(Frame::captured_now(image)),
            Ok(_) => {
                warn!("Could not decode {:?}", path);
                FrameRead::Unavailable
            }
            Err(e) => {
                warn!("Failed to read {:?}: {}", path, e);
                FrameRead::Unavailable
            }
        }
    }

    fn describe(&self) -> String {
        format!("images:{}", self.root.display())
    }
}

fn list_images(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(root)
        .with_context(|| format!("Failed to list {:?}", root))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && has_image_extension(path))
        .collect();
    files.sort();
    Ok(files)
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}
