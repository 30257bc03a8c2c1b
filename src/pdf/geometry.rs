//! Raster geometry for cropped page renders
//!
//! A cropped request is served by rendering the whole page into an
//! oversized ("croppable") raster and then cutting the margins away. The
//! oversized width is `w / (1 - l - r)`. The oversized height deliberately
//! uses the same horizontal factor, `h / (1 - l - r)`, while the crop height
//! uses the vertical margins, `raster_height * (1 - t - b)`. Both formulas
//! are part of the rendered output contract; keep them as they are.
//!
//! Margins are single precision and the scale factors are computed in
//! double precision, with every pixel quantity truncated toward zero.

use std::fmt;
use std::str::FromStr;

/// Largest raster edge the calculator will ask a decoder for.
pub const MAX_RASTER_DIMENSION: u32 = 32_768;

/// Pixel size of a requested or rendered raster
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Size {
    type Err = String;

    /// Parses `WIDTHxHEIGHT`, e.g. `800x600`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .split_once(['x', 'X'])
            .ok_or_else(|| format!("expected WIDTHxHEIGHT, got {s:?}"))?;
        let width = w.trim().parse().map_err(|e| format!("bad width {w:?}: {e}"))?;
        let height = h.trim().parse().map_err(|e| format!("bad height {h:?}: {e}"))?;
        Ok(Self { width, height })
    }
}

/// Fractions of the oversized raster to discard on each edge
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Margins {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl Margins {
    pub const NONE: Self = Self::new(0.0, 0.0, 0.0, 0.0);

    #[must_use]
    pub const fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// True when every margin is zero, in which case no crop happens
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.left == 0.0 && self.top == 0.0 && self.right == 0.0 && self.bottom == 0.0
    }

    fn as_array(&self) -> [f32; 4] {
        [self.left, self.top, self.right, self.bottom]
    }

    fn horizontal_factor(&self) -> f64 {
        1.0 - f64::from(self.left) - f64::from(self.right)
    }

    fn vertical_factor(&self) -> f64 {
        1.0 - f64::from(self.top) - f64::from(self.bottom)
    }
}

impl FromStr for Margins {
    type Err = String;

    /// Parses `left,top,right,bottom`, with or without surrounding parentheses.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let inner = s.trim().trim_start_matches('(').trim_end_matches(')');
        let values = inner
            .split(',')
            .map(|v| {
                v.trim()
                    .parse::<f32>()
                    .map_err(|e| format!("bad margin {v:?}: {e}"))
            })
            .collect::<Result<Vec<_>, _>>()?;

        match values.as_slice() {
            &[left, top, right, bottom] => Ok(Self::new(left, top, right, bottom)),
            _ => Err(format!("expected 4 margins, got {}", values.len())),
        }
    }
}

/// Rejected margin/size combinations
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum GeometryError {
    #[error("requested size {0} has no area")]
    EmptySize(Size),

    #[error("margin {value} is outside [0, 1)")]
    MarginOutOfRange { value: f32 },

    #[error("left and right margins cover the whole width ({left} + {right})")]
    HorizontalOverlap { left: f32, right: f32 },

    #[error("top and bottom margins cover the whole height ({top} + {bottom})")]
    VerticalOverlap { top: f32, bottom: f32 },

    #[error("oversized raster {width}x{height} exceeds {MAX_RASTER_DIMENSION}px")]
    TooLarge { width: f64, height: f64 },
}

/// Sub-rectangle of the oversized raster that becomes the final bitmap
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Size of the raster to render so that cropping `margins` away leaves
/// `requested`.
pub fn croppable_size(requested: Size, margins: &Margins) -> Result<Size, GeometryError> {
    if requested.is_empty() {
        return Err(GeometryError::EmptySize(requested));
    }

    if let Some(&value) = margins
        .as_array()
        .iter()
        .find(|m| !m.is_finite() || **m < 0.0 || **m >= 1.0)
    {
        return Err(GeometryError::MarginOutOfRange { value });
    }

    let horizontal = margins.horizontal_factor();
    if horizontal <= 0.0 {
        return Err(GeometryError::HorizontalOverlap {
            left: margins.left,
            right: margins.right,
        });
    }
    if margins.vertical_factor() <= 0.0 {
        return Err(GeometryError::VerticalOverlap {
            top: margins.top,
            bottom: margins.bottom,
        });
    }

    let width = f64::from(requested.width) / horizontal;
    let height = f64::from(requested.height) / horizontal;

    let max = f64::from(MAX_RASTER_DIMENSION);
    if width > max || height > max {
        return Err(GeometryError::TooLarge { width, height });
    }

    Ok(Size::new(width as u32, height as u32))
}

/// Crop rectangle for a raster rendered at `oversized`.
///
/// `raster_height` is the height of the raster the decoder actually
/// produced; the crop height is derived from it rather than from
/// `oversized`.
#[must_use]
pub fn crop_rect(requested: Size, oversized: Size, raster_height: u32, margins: &Margins) -> CropRect {
    let x = oversized.width as f32 * margins.left;
    let y = oversized.height as f32 * margins.top;
    let height = f64::from(raster_height) * margins.vertical_factor();

    CropRect {
        x: x as u32,
        y: y as u32,
        width: requested.width,
        height: height as u32,
    }
}
