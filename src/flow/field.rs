//! Dense optical flow fields and the `sVflow` file format.
//!
//! Layout: the ASCII magic `flow_sV`, one version byte, `u32` LE width and height, then
//! `width * height` pairs of `f32` LE `(dx, dy)` in row-major order.

use std::io::{Read, Write};
use std::path::Path;

use anyhow::Context as _;

use crate::foundation::error::{SlowmoError, SlowmoResult};

const MAGIC: &[u8; 7] = b"flow_sV";
const VERSION: u8 = 1;

/// Per-pixel displacement from a left frame to a right frame.
#[derive(Clone, Debug, PartialEq)]
pub struct FlowField {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    data: Vec<f32>,
}

impl FlowField {
    /// A field with zero displacement everywhere.
    pub fn zero(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0.0; (width as usize) * (height as usize) * 2],
        }
    }

    /// Wrap interleaved `(dx, dy)` values.
    pub fn from_vec(width: u32, height: u32, data: Vec<f32>) -> SlowmoResult<Self> {
        if data.len() != (width as usize) * (height as usize) * 2 {
            return Err(SlowmoError::flow(format!(
                "flow buffer holds {} values, expected {} for {width}x{height}",
                data.len(),
                (width as usize) * (height as usize) * 2
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Displacement at `(x, y)`.
    pub fn at(&self, x: u32, y: u32) -> (f32, f32) {
        let i = ((y as usize) * (self.width as usize) + (x as usize)) * 2;
        (self.data[i], self.data[i + 1])
    }

    /// Set the displacement at `(x, y)`.
    pub fn set(&mut self, x: u32, y: u32, d: (f32, f32)) {
        let i = ((y as usize) * (self.width as usize) + (x as usize)) * 2;
        self.data[i] = d.0;
        self.data[i + 1] = d.1;
    }

    /// Parse an `sVflow` stream.
    pub fn read_from(mut r: impl Read) -> SlowmoResult<Self> {
        let mut magic = [0u8; 7];
        r.read_exact(&mut magic).context("read flow magic")?;
        if &magic != MAGIC {
            return Err(SlowmoError::flow("not a flow file (bad magic)"));
        }
        let mut version = [0u8; 1];
        r.read_exact(&mut version).context("read flow version")?;
        if version[0] != VERSION {
            return Err(SlowmoError::flow(format!(
                "unsupported flow file version {}",
                version[0]
            )));
        }
        let width = read_u32(&mut r)?;
        let height = read_u32(&mut r)?;
        let len = (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(2 * 4))
            .ok_or_else(|| {
                SlowmoError::flow(format!("flow dimensions {width}x{height} too large"))
            })?;
        // Sized by the bytes present, not by the header.
        let mut bytes = Vec::new();
        r.take(len as u64)
            .read_to_end(&mut bytes)
            .context("read flow data")?;
        if bytes.len() != len {
            return Err(SlowmoError::flow(format!(
                "flow data truncated: expected {len} bytes for {width}x{height}, found {}",
                bytes.len()
            )));
        }
        let data = bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Self::from_vec(width, height, data)
    }

    /// Serialize as `sVflow`.
    pub fn write_to(&self, mut w: impl Write) -> SlowmoResult<()> {
        w.write_all(MAGIC).context("write flow header")?;
        w.write_all(&[VERSION]).context("write flow header")?;
        w.write_all(&self.width.to_le_bytes())
            .context("write flow header")?;
        w.write_all(&self.height.to_le_bytes())
            .context("write flow header")?;
        let mut bytes = Vec::with_capacity(self.data.len() * 4);
        for v in &self.data {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        w.write_all(&bytes).context("write flow data")?;
        Ok(())
    }

    /// Read an `sVflow` file from disk.
    pub fn load(path: &Path) -> SlowmoResult<Self> {
        let f = std::fs::File::open(path)
            .with_context(|| format!("open flow file '{}'", path.display()))?;
        Self::read_from(std::io::BufReader::new(f))
    }

    /// Write an `sVflow` file to disk.
    pub fn save(&self, path: &Path) -> SlowmoResult<()> {
        let f = std::fs::File::create(path)
            .with_context(|| format!("create flow file '{}'", path.display()))?;
        let mut w = std::io::BufWriter::new(f);
        self.write_to(&mut w)?;
        w.flush()
            .with_context(|| format!("flush flow file '{}'", path.display()))?;
        Ok(())
    }
}

fn read_u32(r: &mut impl Read) -> SlowmoResult<u32> {
    let mut b = [0u8; 4];
    r.read_exact(&mut b).context("read flow dimensions")?;
    Ok(u32::from_le_bytes(b))
}

#[cfg(test)]
#[path = "../../tests/unit/flow/field.rs"]
mod tests;
