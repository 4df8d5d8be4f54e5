//! Geometry transform: EDM node bounds → target widget geometry.
//!
//! EDM bounds are measured from the bottom-left corner of their container;
//! target geometry is top-left based. Each level is placed against the
//! already-transformed position and height of its parent frame, so the
//! transform is applied top-down while walking the tree.

use crate::model::Bounds;

/// Smallest width/height a placed widget can have.
pub const MIN_EXTENT: i32 = 2;

/// Top-left based target geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Geometry {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Geometry {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// The transformed origin and height that children are placed against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContainerContext {
    pub x: i32,
    pub y: i32,
    pub height: i32,
    pub scale: f64,
}

impl ContainerContext {
    /// Context for the top level of a screen `screen_height` tall.
    pub fn root(screen_height: i32, scale: f64, offset_x: i32, offset_y: i32) -> Self {
        Self {
            x: offset_x,
            y: offset_y,
            height: scaled(screen_height, scale),
            scale,
        }
    }

    /// Place a node inside this container.
    #[must_use]
    pub fn place(&self, bounds: Bounds) -> Geometry {
        let bottom = scaled(bounds.y + bounds.height, self.scale);
        Geometry {
            x: self.x + scaled(bounds.x, self.scale),
            y: self.y + self.height - bottom,
            width: scaled(bounds.width, self.scale).max(MIN_EXTENT),
            height: scaled(bounds.height, self.scale).max(MIN_EXTENT),
        }
    }

    /// Context for the children of a frame placed at `frame`.
    #[must_use]
    pub fn enter(&self, frame: Geometry) -> Self {
        Self {
            x: frame.x,
            y: frame.y,
            height: frame.height,
            scale: self.scale,
        }
    }

    /// Inverse of [`place`](Self::place) for unclamped extents.
    #[must_use]
    pub fn restore(&self, placed: Geometry) -> Bounds {
        let unscale = |v: i32| (f64::from(v) / self.scale).round() as i32;
        let width = unscale(placed.width);
        let height = unscale(placed.height);
        let bottom = unscale(self.y + self.height - placed.y);
        Bounds::new(unscale(placed.x - self.x), bottom - height, width, height)
    }
}

fn scaled(value: i32, scale: f64) -> i32 {
    (f64::from(value) * scale).round() as i32
}
