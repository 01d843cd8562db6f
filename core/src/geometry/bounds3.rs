//! 3-D Axis Aligned Bounding Boxes

use super::Point3;
use crate::lumen::{max, min, Float};
use num_traits::Num;

/// A 3-D axis aligned bounding box.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Bounds3<T> {
    /// Minimum bounds.
    pub p_min: Point3<T>,

    /// Maximum bounds.
    pub p_max: Point3<T>,
}

/// 3-D bounding box containing `Float` points.
pub type Bounds3f = Bounds3<Float>;

impl<T: Num + PartialOrd + Copy> Bounds3<T> {
    /// Creates a new bounding box from 2 points. The minimum and maximum bounds
    /// are used for each coordinate axis.
    ///
    /// * `p1` - First point.
    /// * `p2` - Second point.
    pub fn new(p1: Point3<T>, p2: Point3<T>) -> Self {
        Self {
            p_min: Point3::new(min(p1.x, p2.x), min(p1.y, p2.y), min(p1.z, p2.z)),
            p_max: Point3::new(max(p1.x, p2.x), max(p1.y, p2.y), max(p1.z, p2.z)),
        }
    }

    /// Returns the coordinates of one of the eight corners.
    ///
    /// * `corner` - Index in [0, 8).
    pub fn corner(&self, corner: u8) -> Point3<T> {
        debug_assert!(corner < 8);
        let x = if corner & 1 == 0 { self.p_min.x } else { self.p_max.x };
        let y = if corner & 2 == 0 { self.p_min.y } else { self.p_max.y };
        let z = if corner & 4 == 0 { self.p_min.z } else { self.p_max.z };
        Point3::new(x, y, z)
    }

    /// Returns all eight corners of the box.
    pub fn corners(&self) -> [Point3<T>; 8] {
        [
            self.corner(0),
            self.corner(1),
            self.corner(2),
            self.corner(3),
            self.corner(4),
            self.corner(5),
            self.corner(6),
            self.corner(7),
        ]
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
