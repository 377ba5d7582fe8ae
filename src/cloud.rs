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

//! The point/mesh data model the combiner operates on. This is deliberately
//! small: face topology, textures and file formats are the concern of
//! collaborators outside this crate.

use crate::math::{Aabb, Vec2, Vec3, Vec4};

/// A single point. Optional channels are only meaningful when the enclosing
/// [`PointCloud`] declares them present; see `has_normals`/`has_uvs`/`has_colors`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Option<Vec3>,
    pub uv: Option<Vec2>,
    pub color: Option<Vec4>,
}

impl Vertex {
    pub fn new(position: Vec3) -> Self {
        Vertex {
            position,
            normal: None,
            uv: None,
            color: None,
        }
    }
}

/// An owning, ordered container of vertices with a cached bounding box.
///
/// The combiner never mutates the clouds it is given; it only reads through
/// shared references and copies surviving vertices into a freshly allocated
/// output cloud.
#[derive(Debug, Clone)]
pub struct PointCloud {
    vertices: Vec<Vertex>,
    has_normals: bool,
    has_uvs: bool,
    has_colors: bool,
    bounds: Option<Aabb>,
}

impl PointCloud {
    pub fn new(has_normals: bool, has_uvs: bool, has_colors: bool) -> Self {
        PointCloud {
            vertices: Vec::new(),
            has_normals,
            has_uvs,
            has_colors,
            bounds: None,
        }
    }

    pub fn with_capacity(capacity: usize, has_normals: bool, has_uvs: bool, has_colors: bool) -> Self {
        PointCloud {
            vertices: Vec::with_capacity(capacity),
            has_normals,
            has_uvs,
            has_colors,
            bounds: None,
        }
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn vertex(&self, index: usize) -> &Vertex {
        &self.vertices[index]
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn has_normals(&self) -> bool {
        self.has_normals
    }

    pub fn has_uvs(&self) -> bool {
        self.has_uvs
    }

    pub fn has_colors(&self) -> bool {
        self.has_colors
    }

    /// Appends a single vertex, invalidating the cached bounds.
    pub fn push(&mut self, vertex: Vertex) {
        self.vertices.push(vertex);
        self.bounds = None;
    }

    /// Appends many vertices at once; cheaper than repeated `push` when the
    /// caller already holds a batch (e.g. a worker's keepers buffer).
    pub fn extend(&mut self, vertices: impl IntoIterator<Item = Vertex>) {
        self.vertices.extend(vertices);
        self.bounds = None;
    }

    /// The axis-aligned box enclosing every vertex position, computed on
    /// first demand and cached afterwards.
    pub fn bounds(&mut self) -> Aabb {
        if let Some(bounds) = self.bounds {
            return bounds;
        }
        let bounds = self.compute_bounds();
        self.bounds = Some(bounds);
        bounds
    }

    /// Same as [`PointCloud::bounds`], but does not require `&mut self` -
    /// useful when the cloud is shared read-only across worker threads and
    /// has already had its bounds computed once up front.
    pub fn bounds_uncached(&self) -> Aabb {
        self.bounds.unwrap_or_else(|| self.compute_bounds())
    }

    fn compute_bounds(&self) -> Aabb {
        let mut iter = self.vertices.iter();
        let mut bounds = match iter.next() {
            Some(v) => Aabb::new(v.position, v.position),
            None => return Aabb::zero(),
        };
        for v in iter {
            bounds.grow(v.position);
        }
        bounds
    }

    /// Every input position must be finite; the combiner rejects clouds
    /// otherwise (see `Error::NonFinitePosition`).
    pub fn all_positions_finite(&self) -> bool {
        self.vertices
            .iter()
            .all(|v| v.position.x.is_finite() && v.position.y.is_finite() && v.position.z.is_finite())
    }
}
