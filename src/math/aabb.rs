// Copyright 2016 Google Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use super::Vec3;

/// An axis-aligned bounding box in double precision.
///
/// Used both as the bounds of a point cloud or grid cell and as the query
/// rectangle handed to a [`SpatialIndex`](crate::spatial_index::SpatialIndex) -
/// the combiner never needs a box type that isn't axis-aligned, so `Aabb`
/// doubles as the "Rect" the spatial index is queried with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    min: Vec3,
    max: Vec3,
}

/// Which axes should treat their maximum bound as inclusive when testing
/// [`Aabb::contains`]. Grid cells are closed on the min side always, and
/// closed on the max side only along axes where the cell is the last one,
/// so that every point falls into exactly one cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IncludeMax {
    pub x: bool,
    pub y: bool,
    pub z: bool,
}

impl IncludeMax {
    pub const NONE: IncludeMax = IncludeMax {
        x: false,
        y: false,
        z: false,
    };

    pub const ALL: IncludeMax = IncludeMax {
        x: true,
        y: true,
        z: true,
    };
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Aabb { min, max }
    }

    pub fn zero() -> Self {
        Aabb {
            min: Vec3::new(0., 0., 0.),
            max: Vec3::new(0., 0., 0.),
        }
    }

    pub fn min(&self) -> Vec3 {
        self.min
    }

    pub fn max(&self) -> Vec3 {
        self.max
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn extent(&self) -> Vec3 {
        self.max - self.min
    }

    /// Grows the box in place so it also encloses `p`.
    pub fn grow(&mut self, p: Vec3) {
        self.min.x = self.min.x.min(p.x);
        self.min.y = self.min.y.min(p.y);
        self.min.z = self.min.z.min(p.z);
        self.max.x = self.max.x.max(p.x);
        self.max.y = self.max.y.max(p.y);
        self.max.z = self.max.z.max(p.z);
    }

    /// The smallest box enclosing both `self` and `other`.
    pub fn union(&self, other: &Aabb) -> Aabb {
        let mut result = *self;
        result.grow(other.min);
        result.grow(other.max);
        result
    }

    /// Returns a box scaled by `factor` about its own center.
    pub fn scaled_about_center(&self, factor: f64) -> Aabb {
        let center = self.center();
        let half_extent = self.extent() * (factor * 0.5);
        Aabb::new(center - half_extent, center + half_extent)
    }

    /// Whether `other`'s box overlaps `self`'s, using closed intervals on
    /// both ends (used for neighborhood/candidate collection, where
    /// boundary-touching points are intentionally over-included).
    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && other.min.x <= self.max.x
            && self.min.y <= other.max.y
            && other.min.y <= self.max.y
            && self.min.z <= other.max.z
            && other.min.z <= self.max.z
    }

    /// Whether `p` lies inside the box, closed on the min side on every
    /// axis and closed on the max side only where `include_max` says so.
    pub fn contains(&self, p: Vec3, include_max: IncludeMax) -> bool {
        Self::axis_contains(p.x, self.min.x, self.max.x, include_max.x)
            && Self::axis_contains(p.y, self.min.y, self.max.y, include_max.y)
            && Self::axis_contains(p.z, self.min.z, self.max.z, include_max.z)
    }

    /// Whether `p` lies inside the box under closed intervals on every axis.
    /// Used for range queries against the spatial index, where returning a
    /// few boundary-touching extras is acceptable (see [`IncludeMax`]).
    pub fn contains_closed(&self, p: Vec3) -> bool {
        self.contains(p, IncludeMax::ALL)
    }

    fn axis_contains(v: f64, min: f64, max: f64, include_max: bool) -> bool {
        if include_max {
            v >= min && v <= max
        } else {
            v >= min && v < max
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grow_and_union() {
        let mut a = Aabb::new(Vec3::new(0., 0., 0.), Vec3::new(1., 1., 1.));
        a.grow(Vec3::new(-1., 2., 0.5));
        assert_eq!(a.min(), Vec3::new(-1., 0., 0.));
        assert_eq!(a.max(), Vec3::new(1., 2., 1.));

        let b = Aabb::new(Vec3::new(5., 5., 5.), Vec3::new(6., 6., 6.));
        let u = a.union(&b);
        assert_eq!(u.min(), Vec3::new(-1., 0., 0.));
        assert_eq!(u.max(), Vec3::new(6., 6., 6.));
    }

    #[test]
    fn include_max_only_on_last_cell() {
        let cell = Aabb::new(Vec3::new(0., 0., 0.), Vec3::new(1., 1., 1.));
        let on_max_x = Vec3::new(1., 0.5, 0.5);
        assert!(!cell.contains(on_max_x, IncludeMax::NONE));
        assert!(cell.contains(
            on_max_x,
            IncludeMax {
                x: true,
                y: false,
                z: false
            }
        ));
    }

    #[test]
    fn center_and_extent() {
        let a = Aabb::new(Vec3::new(0., 0., 0.), Vec3::new(2., 4., 6.));
        assert_eq!(a.center(), Vec3::new(1., 2., 3.));
        assert_eq!(a.extent(), Vec3::new(2., 4., 6.));
    }

    #[test]
    fn scaled_about_center_preserves_center() {
        use approx::assert_relative_eq;

        let a = Aabb::new(Vec3::new(1., 1., 1.), Vec3::new(2., 3., 4.));
        let scaled = a.scaled_about_center(3.0);
        assert_relative_eq!(scaled.center().x, a.center().x);
        assert_relative_eq!(scaled.center().y, a.center().y);
        assert_relative_eq!(scaled.center().z, a.center().z);
        assert_relative_eq!(scaled.extent().x, a.extent().x * 3.0);
    }
}
