use std::path::{Path, PathBuf};

use image::ImageFormat;

use crate::surface::FrameImage;
use crate::{RenderError, Result};

/// Digits in a staged frame name. Lexical order equals frame order up to
/// [`MAX_STAGED_FRAMES`].
pub const FRAME_INDEX_WIDTH: usize = 6;
pub const MAX_STAGED_FRAMES: u64 = 1_000_000;

/// Destination for frames produced by a capture loop.
pub trait FrameSink {
    fn accept(&mut self, index: u64, frame: &FrameImage) -> Result<()>;
}

/// Directory of lossless PNG frames named `frame-NNNNNN.png`.
///
/// Frames must be staged exactly once each, in index order, and all with the
/// same dimensions.
#[derive(Debug)]
pub struct StagingStore {
    dir: PathBuf,
    next_index: u64,
    dimensions: Option<(u32, u32)>,
}

impl StagingStore {
    /// Clears whatever a previous run left behind and starts empty.
    pub fn recreate(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        if dir.exists() {
            tracing::debug!(dir = %dir.display(), "removing stale staging directory");
            std::fs::remove_dir_all(&dir)?;
        }
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            next_index: 0,
            dimensions: None,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Number of frames staged so far.
    pub fn len(&self) -> u64 {
        self.next_index
    }

    pub fn is_empty(&self) -> bool {
        self.next_index == 0
    }

    pub fn frame_name(index: u64) -> String {
        format!("frame-{index:0width$}.png", width = FRAME_INDEX_WIDTH)
    }

    pub fn frame_path(&self, index: u64) -> PathBuf {
        self.dir.join(Self::frame_name(index))
    }

    /// printf-style pattern the encoder uses to read the sequence back.
    pub fn input_pattern(&self) -> PathBuf {
        self.dir
            .join(format!("frame-%0{FRAME_INDEX_WIDTH}d.png"))
    }

    pub fn stage(&mut self, index: u64, frame: &FrameImage) -> Result<PathBuf> {
        if index != self.next_index {
            return Err(RenderError::msg(format!(
                "frame {index} staged out of order; expected frame {}",
                self.next_index
            )));
        }
        if index >= MAX_STAGED_FRAMES {
            return Err(RenderError::msg(format!(
                "cannot stage more than {MAX_STAGED_FRAMES} frames"
            )));
        }

        let size = (frame.width(), frame.height());
        match self.dimensions {
            Some(expected) if expected != size => {
                return Err(RenderError::protocol(format!(
                    "frame {index} is {}x{}, earlier frames are {}x{}",
                    size.0, size.1, expected.0, expected.1
                )));
            }
            Some(_) => {}
            None => self.dimensions = Some(size),
        }

        let path = self.frame_path(index);
        frame
            .as_image()
            .save_with_format(&path, ImageFormat::Png)?;
        self.next_index += 1;
        Ok(path)
    }

    /// Staged frame paths in lexical order.
    pub fn staged_paths(&self) -> Result<Vec<PathBuf>> {
        let mut paths = std::fs::read_dir(&self.dir)?
            .map(|entry| entry.map(|entry| entry.path()))
            .collect::<std::io::Result<Vec<_>>>()?;
        paths.retain(|path| path.extension().is_some_and(|ext| ext == "png"));
        paths.sort();
        Ok(paths)
    }

    /// Deletes the staging directory and everything in it.
    pub fn remove(self) -> Result<()> {
        std::fs::remove_dir_all(&self.dir)?;
        Ok(())
    }
}

impl FrameSink for StagingStore {
    fn accept(&mut self, index: u64, frame: &FrameImage) -> Result<()> {
        self.stage(index, frame).map(drop)
    }
}

/// Sink that keeps frames in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub frames: Vec<(u64, FrameImage)>,
}

impl FrameSink for MemorySink {
    fn accept(&mut self, index: u64, frame: &FrameImage) -> Result<()> {
        self.frames.push((index, frame.clone()));
        Ok(())
    }
}
