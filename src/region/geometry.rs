//! Mapping between on-screen display coordinates and the natural pixel space
//! of an image.
//!
//! Regions are stored in natural space only. Anything drawn on screen is
//! derived from that stored geometry and the current display size every time
//! it is rendered, so window resizes and zoom changes never touch stored state.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    fn is_degenerate(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }
}

/// Axis aligned rectangle, `x`/`y` is the top left corner.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rectangle spanned by two corner points in any order, as produced by a drag.
    pub fn from_corners(a: (f32, f32), b: (f32, f32)) -> Self {
        let x = a.0.min(b.0);
        let y = a.1.min(b.1);
        Self::new(x, y, (a.0 - b.0).abs(), (a.1 - b.1).abs())
    }

    pub fn is_empty(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }

    fn scale(&self, sx: f32, sy: f32) -> Self {
        Self::new(self.x * sx, self.y * sy, self.width * sx, self.height * sy)
    }
}

/// Natural-space geometry of a region together with the natural size of the
/// image it was captured on.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RegionGeometry {
    pub rect: Rect,
    pub natural_size: Size,
}

impl RegionGeometry {
    /// Where this region has to be drawn when the image is rendered at `display_size`.
    pub fn display_rect(&self, display_size: Size) -> Rect {
        to_display(self.rect, self.natural_size, display_size)
    }
}

/// Scale a rectangle from display pixels into natural pixels.
///
/// A degenerate size on either side falls back to identity scaling.
pub fn to_natural(display_rect: Rect, display_size: Size, natural_size: Size) -> Rect {
    if display_size.is_degenerate() || natural_size.is_degenerate() {
        return display_rect;
    }
    display_rect.scale(
        natural_size.width / display_size.width,
        natural_size.height / display_size.height,
    )
}

/// Inverse of [`to_natural`], used for rendering overlays.
pub fn to_display(natural_rect: Rect, natural_size_at_capture: Size, display_size: Size) -> Rect {
    if natural_size_at_capture.is_degenerate() || display_size.is_degenerate() {
        return natural_rect;
    }
    natural_rect.scale(
        display_size.width / natural_size_at_capture.width,
        display_size.height / natural_size_at_capture.height,
    )
}
