use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::foundation::core::FrameSize;
use crate::foundation::error::{SlowmoError, SlowmoResult};
use crate::render::frame::FrameRGBA;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "tif", "tiff", "bmp"];

/// Provider of the original (pre slow-motion) frames of a project.
///
/// Implementations are shared read-only between the project and a running render task.
pub trait FrameSource: Send + Sync {
    /// Source frame rate.
    fn fps(&self) -> f64;
    /// Number of source frames.
    fn frame_count(&self) -> u64;
    /// Frame dimensions at `size`.
    fn dimensions(&self, size: FrameSize) -> (u32, u32);
    /// Decode frame `index` at `size`.
    fn frame(&self, index: u64, size: FrameSize) -> SlowmoResult<FrameRGBA>;
    /// Human-readable description for logs.
    fn describe(&self) -> String;

    /// Duration of the source in seconds.
    fn duration_secs(&self) -> f64 {
        self.frame_count() as f64 / self.fps()
    }
}

/// Image files in a directory, ordered by file name.
#[derive(Debug)]
pub struct ImagesFrameSource {
    dir: PathBuf,
    files: Vec<PathBuf>,
    fps: f64,
    width: u32,
    height: u32,
}

impl ImagesFrameSource {
    /// Scan `dir` for image files. Fails when the directory holds no readable image.
    pub fn open(dir: impl Into<PathBuf>, fps: f64) -> SlowmoResult<Self> {
        let dir = dir.into();
        if !fps.is_finite() || fps <= 0.0 {
            return Err(SlowmoError::validation(format!(
                "frame source fps must be finite and > 0 (got {fps})"
            )));
        }
        let entries = std::fs::read_dir(&dir)
            .with_context(|| format!("read frame directory '{}'", dir.display()))?;
        let mut files = Vec::new();
        for entry in entries {
            let path = entry
                .with_context(|| format!("list frame directory '{}'", dir.display()))?
                .path();
            if path.is_file() && has_image_extension(&path) {
                files.push(path);
            }
        }
        files.sort();
        let first = files.first().ok_or_else(|| {
            SlowmoError::validation(format!("no image files found in '{}'", dir.display()))
        })?;
        let (width, height) = image::image_dimensions(first)
            .with_context(|| format!("read first image '{}'", first.display()))?;
        Ok(Self {
            dir,
            files,
            fps,
            width,
            height,
        })
    }

    /// Directory the frames were read from.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl FrameSource for ImagesFrameSource {
    fn fps(&self) -> f64 {
        self.fps
    }

    fn frame_count(&self) -> u64 {
        self.files.len() as u64
    }

    fn dimensions(&self, size: FrameSize) -> (u32, u32) {
        size.scale(self.width, self.height)
    }

    fn frame(&self, index: u64, size: FrameSize) -> SlowmoResult<FrameRGBA> {
        let path = self.files.get(index as usize).ok_or_else(|| {
            SlowmoError::render(format!(
                "source frame {index} out of range (0..{})",
                self.files.len()
            ))
        })?;
        let img = image::open(path)
            .with_context(|| format!("decode frame '{}'", path.display()))?
            .to_rgba8();
        let (w, h) = self.dimensions(size);
        let img = if img.dimensions() == (w, h) {
            img
        } else {
            image::imageops::resize(&img, w, h, image::imageops::FilterType::Triangle)
        };
        FrameRGBA::new(w, h, img.into_raw())
    }

    fn describe(&self) -> String {
        format!(
            "{} images in '{}' at {} fps",
            self.files.len(),
            self.dir.display(),
            self.fps
        )
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

/// Deterministic generated footage: a bright bar sweeping across a colour gradient.
#[derive(Clone, Debug, PartialEq)]
pub struct SyntheticFrameSource {
    width: u32,
    height: u32,
    frames: u64,
    fps: f64,
}

impl SyntheticFrameSource {
    /// Create a generator for `frames` frames of `width`x`height` at `fps`.
    pub fn new(width: u32, height: u32, frames: u64, fps: f64) -> SlowmoResult<Self> {
        if width == 0 || height == 0 {
            return Err(SlowmoError::validation(
                "synthetic frame source width/height must be non-zero",
            ));
        }
        if frames == 0 {
            return Err(SlowmoError::validation(
                "synthetic frame source needs at least one frame",
            ));
        }
        if !fps.is_finite() || fps <= 0.0 {
            return Err(SlowmoError::validation(format!(
                "frame source fps must be finite and > 0 (got {fps})"
            )));
        }
        Ok(Self {
            width,
            height,
            frames,
            fps,
        })
    }
}

impl FrameSource for SyntheticFrameSource {
    fn fps(&self) -> f64 {
        self.fps
    }

    fn frame_count(&self) -> u64 {
        self.frames
    }

    fn dimensions(&self, size: FrameSize) -> (u32, u32) {
        size.scale(self.width, self.height)
    }

    fn frame(&self, index: u64, size: FrameSize) -> SlowmoResult<FrameRGBA> {
        if index >= self.frames {
            return Err(SlowmoError::render(format!(
                "source frame {index} out of range (0..{})",
                self.frames
            )));
        }
        let (w, h) = self.dimensions(size);
        let bar_w = (w / 8).max(1) as u64;
        let bar_x = (index * bar_w) % w as u64;
        let mut data = Vec::with_capacity((w as usize) * (h as usize) * 4);
        for y in 0..h {
            for x in 0..w {
                let in_bar = (x as u64) >= bar_x && (x as u64) < bar_x + bar_w;
                if in_bar {
                    data.extend_from_slice(&[255, 255, 255, 255]);
                } else {
                    let r = (x * 255 / w.max(1)) as u8;
                    let g = (y * 255 / h.max(1)) as u8;
                    data.extend_from_slice(&[r, g, 64, 255]);
                }
            }
        }
        FrameRGBA::new(w, h, data)
    }

    fn describe(&self) -> String {
        format!(
            "synthetic {}x{}, {} frames at {} fps",
            self.width, self.height, self.frames, self.fps
        )
    }
}

#[cfg(test)]
#[path = "../../tests/unit/source/frames.rs"]
mod tests;
