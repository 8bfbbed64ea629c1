use serde::{Deserialize, Serialize};

/// Bounding box of changed pixels, stored as half-open bounds `[x0, x1) x [y0, y1)`.
///
/// The clean state uses inverted bounds, which makes it the identity element
/// of [`DirtyRegion::union`]. A region spanning the whole surface is the
/// "fully dirty" state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DirtyRegion {
    pub x0: i32,
    pub y0: i32,
    pub x1: i32,
    pub y1: i32,
}

impl Default for DirtyRegion {
    fn default() -> Self {
        Self::clean()
    }
}

impl DirtyRegion {
    pub const fn clean() -> Self {
        Self {
            x0: i32::MAX,
            y0: i32::MAX,
            x1: i32::MIN,
            y1: i32::MIN,
        }
    }

    pub fn full(width: u32, height: u32) -> Self {
        if width == 0 || height == 0 {
            return Self::clean();
        }
        Self {
            x0: 0,
            y0: 0,
            x1: dim_to_i32(width),
            y1: dim_to_i32(height),
        }
    }

    pub fn from_rect(x: i32, y: i32, width: i32, height: i32) -> Self {
        if width <= 0 || height <= 0 {
            return Self::clean();
        }
        Self {
            x0: x,
            y0: y,
            x1: x.saturating_add(width),
            y1: y.saturating_add(height),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.x1 <= self.x0 || self.y1 <= self.y0
    }

    pub fn is_full(&self, width: u32, height: u32) -> bool {
        !self.is_clean()
            && self.x0 <= 0
            && self.y0 <= 0
            && self.x1 >= dim_to_i32(width)
            && self.y1 >= dim_to_i32(height)
    }

    pub fn width(&self) -> u32 {
        if self.is_clean() {
            return 0;
        }
        (i64::from(self.x1) - i64::from(self.x0)) as u32
    }

    pub fn height(&self) -> u32 {
        if self.is_clean() {
            return 0;
        }
        (i64::from(self.y1) - i64::from(self.y0)) as u32
    }

    pub fn area(&self) -> u64 {
        u64::from(self.width()) * u64::from(self.height())
    }

    pub fn union(self, other: DirtyRegion) -> DirtyRegion {
        match (self.is_clean(), other.is_clean()) {
            (true, true) => Self::clean(),
            (true, false) => other,
            (false, true) => self,
            (false, false) => DirtyRegion {
                x0: self.x0.min(other.x0),
                y0: self.y0.min(other.y0),
                x1: self.x1.max(other.x1),
                y1: self.y1.max(other.y1),
            },
        }
    }

    pub fn intersects(&self, other: &DirtyRegion) -> bool {
        !self.is_clean()
            && !other.is_clean()
            && self.x0 < other.x1
            && other.x0 < self.x1
            && self.y0 < other.y1
            && other.y0 < self.y1
    }

    /// Intersects the region with a `width` x `height` surface.
    pub fn clamp(self, width: u32, height: u32) -> DirtyRegion {
        if self.is_clean() {
            return Self::clean();
        }
        let max_w = dim_to_i32(width);
        let max_h = dim_to_i32(height);
        let x0 = self.x0.clamp(0, max_w);
        let y0 = self.y0.clamp(0, max_h);
        let x1 = self.x1.clamp(0, max_w);
        let y1 = self.y1.clamp(0, max_h);
        if x1 <= x0 || y1 <= y0 {
            return Self::clean();
        }
        DirtyRegion { x0, y0, x1, y1 }
    }

    /// True when every row touched by the region is touched end to end.
    pub fn covers_full_width(&self, width: u32) -> bool {
        !self.is_clean() && self.x0 <= 0 && self.x1 >= dim_to_i32(width)
    }
}

fn dim_to_i32(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}
