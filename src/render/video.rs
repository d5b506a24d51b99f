use std::io::{Read, Write as _};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};

use anyhow::Context as _;

use crate::foundation::error::{SlowmoError, SlowmoResult};
use crate::render::frame::FrameRGBA;
use crate::render::target::{RenderTarget, TargetConfig};

/// Encodes output frames into a video file by streaming raw RGBA into the system `ffmpeg`.
pub struct VideoRenderTarget {
    path: PathBuf,
    codec: String,

    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stderr_drain: Option<std::thread::JoinHandle<std::io::Result<Vec<u8>>>>,

    cfg: Option<TargetConfig>,
    last_idx: Option<u64>,
}

impl VideoRenderTarget {
    /// Target writing `path` with the ffmpeg video codec `codec` (e.g. `libx264`).
    pub fn new(path: impl Into<PathBuf>, codec: impl Into<String>) -> SlowmoResult<Self> {
        let path = path.into();
        let codec = codec.into();
        if path.as_os_str().is_empty() {
            return Err(SlowmoError::validation(
                "video target file path must not be empty",
            ));
        }
        if codec.trim().is_empty() {
            return Err(SlowmoError::validation("video codec must not be empty"));
        }
        Ok(Self {
            path,
            codec,
            child: None,
            stdin: None,
            stderr_drain: None,
            cfg: None,
            last_idx: None,
        })
    }

    /// Output file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// ffmpeg codec identifier.
    pub fn codec(&self) -> &str {
        &self.codec
    }

    fn ffmpeg_command(&self, cfg: &TargetConfig) -> Command {
        let mut cmd = Command::new("ffmpeg");
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        cmd.args([
            "-y",
            "-loglevel",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
            "-s",
            &format!("{}x{}", cfg.width, cfg.height),
            "-r",
            &format!("{}", cfg.fps.get()),
            "-i",
            "pipe:0",
            "-an",
            // yuv420p needs even dimensions; half-size frames may be odd.
            "-vf",
            "pad=ceil(iw/2)*2:ceil(ih/2)*2",
            "-c:v",
            &self.codec,
            "-pix_fmt",
            "yuv420p",
        ]);
        cmd.arg(&self.path);
        cmd
    }
}

impl std::fmt::Debug for VideoRenderTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoRenderTarget")
            .field("path", &self.path)
            .field("codec", &self.codec)
            .field("running", &self.child.is_some())
            .finish()
    }
}

impl RenderTarget for VideoRenderTarget {
    fn describe(&self) -> String {
        format!("{} ({})", self.path.display(), self.codec)
    }

    fn begin(&mut self, cfg: TargetConfig) -> SlowmoResult<()> {
        if cfg.width == 0 || cfg.height == 0 {
            return Err(SlowmoError::validation(
                "video target width/height must be non-zero",
            ));
        }
        ensure_parent_dir(&self.path)?;
        if !is_ffmpeg_on_path() {
            return Err(SlowmoError::render(
                "ffmpeg is required for video output, but was not found on PATH",
            ));
        }

        let mut child = self.ffmpeg_command(&cfg).spawn().map_err(|e| {
            SlowmoError::render(format!(
                "failed to spawn ffmpeg (is it installed and on PATH?): {e}"
            ))
        })?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SlowmoError::render("failed to open ffmpeg stdin (unexpected)"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| SlowmoError::render("failed to open ffmpeg stderr (unexpected)"))?;
        let stderr_drain = std::thread::spawn(move || {
            let mut stderr_bytes = Vec::new();
            stderr.read_to_end(&mut stderr_bytes)?;
            Ok(stderr_bytes)
        });

        self.child = Some(child);
        self.stdin = Some(stdin);
        self.stderr_drain = Some(stderr_drain);
        self.cfg = Some(cfg);
        self.last_idx = None;
        Ok(())
    }

    fn write_frame(&mut self, index: u64, frame: &FrameRGBA) -> SlowmoResult<()> {
        let cfg = self
            .cfg
            .as_ref()
            .ok_or_else(|| SlowmoError::render("video target not started"))?;
        if let Some(last) = self.last_idx
            && index <= last
        {
            return Err(SlowmoError::render(
                "video target received out-of-order frame index",
            ));
        }
        if frame.width != cfg.width || frame.height != cfg.height {
            return Err(SlowmoError::render(format!(
                "frame size mismatch: got {}x{}, expected {}x{}",
                frame.width, frame.height, cfg.width, cfg.height
            )));
        }
        self.last_idx = Some(index);

        let Some(stdin) = self.stdin.as_mut() else {
            return Err(SlowmoError::render("video target is already finalized"));
        };
        stdin.write_all(&frame.data).map_err(|e| {
            SlowmoError::render(format!("failed to write frame to ffmpeg stdin: {e}"))
        })?;
        Ok(())
    }

    fn end(&mut self) -> SlowmoResult<()> {
        drop(self.stdin.take());
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        let status = child.wait().map_err(|e| {
            SlowmoError::render(format!("failed to wait for ffmpeg to finish: {e}"))
        })?;
        let stderr_bytes = match self.stderr_drain.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| SlowmoError::render("ffmpeg stderr drain thread panicked"))?
                .map_err(|e| SlowmoError::render(format!("ffmpeg stderr read failed: {e}")))?,
            None => Vec::new(),
        };
        self.cfg = None;

        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr_bytes);
            return Err(SlowmoError::render(format!(
                "ffmpeg exited with status {}: {}",
                status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}

/// Ensure the parent directory of `path` exists.
pub fn ensure_parent_dir(path: &Path) -> SlowmoResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}

/// Return `true` when `ffmpeg` can be invoked from `PATH`.
pub fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

#[cfg(test)]
#[path = "../../tests/unit/render/video.rs"]
mod tests;
