//! Pixel interpolation between two neighbouring source frames.

use crate::flow::field::FlowField;
use crate::foundation::error::{SlowmoError, SlowmoResult};
use crate::render::frame::FrameRGBA;

/// Pick the source frame closest to position `t` in `[0, 1]` between `left` and `right`.
pub fn nearest(left: &FrameRGBA, right: &FrameRGBA, t: f64) -> FrameRGBA {
    if t < 0.5 { left.clone() } else { right.clone() }
}

/// Cross-fade: `(1 - t) * left + t * right`.
pub fn blend(left: &FrameRGBA, right: &FrameRGBA, t: f64) -> SlowmoResult<FrameRGBA> {
    if !left.same_size(right) {
        return Err(size_mismatch(left, right));
    }
    let t = t.clamp(0.0, 1.0);
    let data = left
        .data
        .iter()
        .zip(&right.data)
        .map(|(&a, &b)| mix(a, b, t))
        .collect();
    FrameRGBA::new(left.width, left.height, data)
}

/// Flow-compensated interpolation.
///
/// Each output pixel `p` samples `left` at `p - t * f(p)` and `right` at `p + (1 - t) * f(p)`,
/// where `f` is the forward flow from `left` to `right`, then blends the two samples.
pub fn flow_blend(
    left: &FrameRGBA,
    right: &FrameRGBA,
    flow: &FlowField,
    t: f64,
) -> SlowmoResult<FrameRGBA> {
    if !left.same_size(right) {
        return Err(size_mismatch(left, right));
    }
    if flow.width != left.width || flow.height != left.height {
        return Err(SlowmoError::flow(format!(
            "flow field is {}x{}, frames are {}x{}",
            flow.width, flow.height, left.width, left.height
        )));
    }
    let t = t.clamp(0.0, 1.0);
    let mut data = Vec::with_capacity(left.data.len());
    for y in 0..left.height {
        for x in 0..left.width {
            let (dx, dy) = flow.at(x, y);
            let (dx, dy) = (f64::from(dx), f64::from(dy));
            let a = sample(left, x as f64 - t * dx, y as f64 - t * dy);
            let b = sample(right, x as f64 + (1.0 - t) * dx, y as f64 + (1.0 - t) * dy);
            for c in 0..4 {
                data.push(mix(a[c], b[c], t));
            }
        }
    }
    FrameRGBA::new(left.width, left.height, data)
}

fn sample(frame: &FrameRGBA, x: f64, y: f64) -> [u8; 4] {
    let max_x = frame.width.saturating_sub(1) as f64;
    let max_y = frame.height.saturating_sub(1) as f64;
    let sx = x.round().clamp(0.0, max_x) as u32;
    let sy = y.round().clamp(0.0, max_y) as u32;
    frame.pixel(sx, sy)
}

fn mix(a: u8, b: u8, t: f64) -> u8 {
    (f64::from(a) * (1.0 - t) + f64::from(b) * t)
        .round()
        .clamp(0.0, 255.0) as u8
}

fn size_mismatch(left: &FrameRGBA, right: &FrameRGBA) -> SlowmoError {
    SlowmoError::render(format!(
        "cannot interpolate {}x{} with {}x{}",
        left.width, left.height, right.width, right.height
    ))
}

#[cfg(test)]
#[path = "../../tests/unit/render/interpolate.rs"]
mod tests;
