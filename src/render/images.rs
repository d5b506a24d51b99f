use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::foundation::error::{SlowmoError, SlowmoResult};
use crate::render::frame::FrameRGBA;
use crate::render::target::{RenderTarget, TargetConfig};

/// Placeholder replaced by the zero-padded frame number.
pub const FRAME_NUMBER_PLACEHOLDER: &str = "%1";

/// Writes every output frame as an image file; the format follows the pattern's extension.
#[derive(Clone, Debug)]
pub struct ImagesRenderTarget {
    pattern: String,
    dir: PathBuf,
    cfg: Option<TargetConfig>,
}

impl ImagesRenderTarget {
    /// Target writing `dir/<pattern with %1 replaced>`, e.g. `rendered-%1.png`.
    pub fn new(pattern: impl Into<String>, dir: impl Into<PathBuf>) -> SlowmoResult<Self> {
        let pattern = pattern.into();
        let dir = dir.into();
        if pattern.trim().is_empty() {
            return Err(SlowmoError::validation(
                "image sequence filename pattern must not be empty",
            ));
        }
        if !pattern.contains(FRAME_NUMBER_PLACEHOLDER) {
            return Err(SlowmoError::validation(format!(
                "image sequence filename pattern '{pattern}' must contain '{FRAME_NUMBER_PLACEHOLDER}'"
            )));
        }
        if dir.as_os_str().is_empty() {
            return Err(SlowmoError::validation(
                "image sequence target directory must not be empty",
            ));
        }
        Ok(Self {
            pattern,
            dir,
            cfg: None,
        })
    }

    /// Filename pattern.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Destination directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of output frame `index`.
    pub fn frame_path(&self, index: u64) -> PathBuf {
        self.dir.join(
            self.pattern
                .replace(FRAME_NUMBER_PLACEHOLDER, &format!("{index:05}")),
        )
    }
}

impl RenderTarget for ImagesRenderTarget {
    fn describe(&self) -> String {
        self.dir.join(&self.pattern).display().to_string()
    }

    fn begin(&mut self, cfg: TargetConfig) -> SlowmoResult<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("create target directory '{}'", self.dir.display()))?;
        let meta = std::fs::metadata(&self.dir)
            .with_context(|| format!("inspect target directory '{}'", self.dir.display()))?;
        if meta.permissions().readonly() {
            return Err(SlowmoError::render(format!(
                "target directory '{}' is not writable",
                self.dir.display()
            )));
        }
        self.cfg = Some(cfg);
        Ok(())
    }

    fn write_frame(&mut self, index: u64, frame: &FrameRGBA) -> SlowmoResult<()> {
        let cfg = self
            .cfg
            .as_ref()
            .ok_or_else(|| SlowmoError::render("image sequence target not started"))?;
        if frame.width != cfg.width || frame.height != cfg.height {
            return Err(SlowmoError::render(format!(
                "frame size mismatch: got {}x{}, expected {}x{}",
                frame.width, frame.height, cfg.width, cfg.height
            )));
        }
        let img = image::RgbaImage::from_raw(frame.width, frame.height, frame.data.clone())
            .ok_or_else(|| SlowmoError::render("frame buffer does not match its dimensions"))?;
        let path = self.frame_path(index);
        // Output frames are opaque; RGB8 keeps formats without alpha (JPEG) working.
        image::DynamicImage::ImageRgba8(img)
            .to_rgb8()
            .save(&path)
            .with_context(|| format!("write frame '{}'", path.display()))?;
        Ok(())
    }

    fn end(&mut self) -> SlowmoResult<()> {
        self.cfg = None;
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/images.rs"]
mod tests;
