//! Pure resize geometry for media nodes.
//!
//! # Invariants
//! - Resolved frames keep the aspect ratio captured at gesture start.
//! - Both resolved dimensions are at least [`MIN_MEDIA_EXTENT`].
//! - The corner opposite the dragged handle stays fixed: west/north handles
//!   shift the origin by `start - final` on their axis.

use thiserror::Error;

/// Smallest width or height a media node can be resized to.
pub const MIN_MEDIA_EXTENT: f64 = 50.0;

/// Resize handle positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Corner {
    NorthWest,
    NorthEast,
    SouthWest,
    SouthEast,
}

impl Corner {
    pub const ALL: [Corner; 4] = [
        Corner::NorthWest,
        Corner::NorthEast,
        Corner::SouthWest,
        Corner::SouthEast,
    ];

    /// Parses handle names `nw`, `ne`, `sw`, `se`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "nw" => Some(Self::NorthWest),
            "ne" => Some(Self::NorthEast),
            "sw" => Some(Self::SouthWest),
            "se" => Some(Self::SouthEast),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NorthWest => "nw",
            Self::NorthEast => "ne",
            Self::SouthWest => "sw",
            Self::SouthEast => "se",
        }
    }

    fn is_west(self) -> bool {
        matches!(self, Self::NorthWest | Self::SouthWest)
    }

    fn is_north(self) -> bool {
        matches!(self, Self::NorthWest | Self::NorthEast)
    }

    /// Sign applied to the raw pointer delta on each axis.
    fn signs(self) -> (f64, f64) {
        (
            if self.is_west() { -1.0 } else { 1.0 },
            if self.is_north() { -1.0 } else { 1.0 },
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum GeometryError {
    #[error("start size {width}x{height} must be finite and positive")]
    InvalidStartSize { width: f64, height: f64 },
    #[error("pointer coordinates must be finite")]
    NonFinitePointer,
}

/// State captured on pointer-down; lives until pointer-up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResizeGesture {
    pub corner: Corner,
    pub start_x: f64,
    pub start_y: f64,
    pub start_width: f64,
    pub start_height: f64,
}

impl ResizeGesture {
    pub fn begin(
        corner: Corner,
        start_x: f64,
        start_y: f64,
        start_width: f64,
        start_height: f64,
    ) -> Result<Self, GeometryError> {
        let valid_size = |value: f64| value.is_finite() && value > 0.0;
        if !valid_size(start_width) || !valid_size(start_height) {
            return Err(GeometryError::InvalidStartSize {
                width: start_width,
                height: start_height,
            });
        }
        if !start_x.is_finite() || !start_y.is_finite() {
            return Err(GeometryError::NonFinitePointer);
        }
        Ok(Self {
            corner,
            start_x,
            start_y,
            start_width,
            start_height,
        })
    }

    pub fn aspect_ratio(&self) -> f64 {
        self.start_width / self.start_height
    }

    /// Frame describing the untouched starting size.
    pub fn initial_frame(&self) -> ResizeFrame {
        ResizeFrame {
            width: self.start_width,
            height: self.start_height,
            offset_x: 0.0,
            offset_y: 0.0,
        }
    }
}

/// Size and origin shift to apply to the live element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResizeFrame {
    pub width: f64,
    pub height: f64,
    pub offset_x: f64,
    pub offset_y: f64,
}

/// Resolves the frame for a pointer at `(pointer_x, pointer_y)`.
pub fn resolve_resize(
    gesture: &ResizeGesture,
    pointer_x: f64,
    pointer_y: f64,
) -> Result<ResizeFrame, GeometryError> {
    if !pointer_x.is_finite() || !pointer_y.is_finite() {
        return Err(GeometryError::NonFinitePointer);
    }
    let (sign_x, sign_y) = gesture.corner.signs();
    let dx = pointer_x - gesture.start_x;
    let dy = pointer_y - gesture.start_y;
    let ratio = gesture.aspect_ratio();

    let mut width = (gesture.start_width + sign_x * dx).max(MIN_MEDIA_EXTENT);
    let mut height = (gesture.start_height + sign_y * dy).max(MIN_MEDIA_EXTENT);

    // Tighter constraint wins.
    if width / ratio <= height {
        height = width / ratio;
    } else {
        width = height * ratio;
    }

    let min_width = MIN_MEDIA_EXTENT.max(MIN_MEDIA_EXTENT * ratio);
    if width < min_width {
        width = min_width;
        height = width / ratio;
    }

    Ok(ResizeFrame {
        width,
        height,
        offset_x: if gesture.corner.is_west() {
            gesture.start_width - width
        } else {
            0.0
        },
        offset_y: if gesture.corner.is_north() {
            gesture.start_height - height
        } else {
            0.0
        },
    })
}

#[cfg(test)]
mod tests {
    use super::{resolve_resize, Corner, GeometryError, ResizeGesture, MIN_MEDIA_EXTENT};
    use rstest::rstest;

    const EPSILON: f64 = 1e-9;

    #[test]
    fn south_east_drag_preserves_two_to_one() {
        let gesture = ResizeGesture::begin(Corner::SouthEast, 300.0, 300.0, 200.0, 100.0)
            .expect("gesture");
        let frame = resolve_resize(&gesture, 340.0, 320.0).expect("frame");
        assert_eq!((frame.width, frame.height), (240.0, 120.0));
        assert_eq!((frame.offset_x, frame.offset_y), (0.0, 0.0));
    }

    #[test]
    fn north_west_drag_shifts_origin_by_the_size_change() {
        let gesture = ResizeGesture::begin(Corner::NorthWest, 0.0, 0.0, 200.0, 100.0)
            .expect("gesture");
        let frame = resolve_resize(&gesture, -40.0, -20.0).expect("frame");
        assert_eq!((frame.width, frame.height), (240.0, 120.0));
        assert_eq!((frame.offset_x, frame.offset_y), (-40.0, -20.0));
    }

    #[test]
    fn shrinking_past_minimum_clamps_at_ratio() {
        let gesture = ResizeGesture::begin(Corner::SouthEast, 0.0, 0.0, 200.0, 100.0)
            .expect("gesture");
        let frame = resolve_resize(&gesture, -500.0, -500.0).expect("frame");
        assert_eq!((frame.width, frame.height), (100.0, 50.0));
    }

    #[test]
    fn rejects_degenerate_input() {
        assert_eq!(
            ResizeGesture::begin(Corner::SouthEast, 0.0, 0.0, 0.0, 10.0),
            Err(GeometryError::InvalidStartSize {
                width: 0.0,
                height: 10.0
            })
        );
        let gesture =
            ResizeGesture::begin(Corner::SouthEast, 0.0, 0.0, 10.0, 10.0).expect("gesture");
        assert_eq!(
            resolve_resize(&gesture, f64::NAN, 0.0),
            Err(GeometryError::NonFinitePointer)
        );
    }

    #[rstest]
    fn ratio_and_minimum_hold_for_every_corner(
        #[values(Corner::NorthWest, Corner::NorthEast, Corner::SouthWest, Corner::SouthEast)]
        corner: Corner,
        #[values((200.0, 100.0), (80.0, 300.0), (60.0, 60.0))] start: (f64, f64),
        #[values((35.0, -12.0), (-400.0, 250.0), (-1000.0, -1000.0), (600.0, 5.0))] delta: (
            f64,
            f64,
        ),
    ) {
        let gesture =
            ResizeGesture::begin(corner, 500.0, 500.0, start.0, start.1).expect("gesture");
        let frame =
            resolve_resize(&gesture, 500.0 + delta.0, 500.0 + delta.1).expect("frame");
        let ratio = start.0 / start.1;
        assert!((frame.width / frame.height - ratio).abs() < EPSILON);
        assert!(frame.width >= MIN_MEDIA_EXTENT - EPSILON);
        assert!(frame.height >= MIN_MEDIA_EXTENT - EPSILON);
    }

    #[test]
    fn parses_handle_names() {
        for corner in Corner::ALL {
            assert_eq!(Corner::parse(corner.as_str()), Some(corner));
        }
        assert_eq!(Corner::parse("n"), None);
    }
}
