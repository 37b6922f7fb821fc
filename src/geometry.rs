//! Geometry models drawn by filter nodes.
//!
//! The engine only needs CPU-side descriptions; vertex data is synthesized by
//! the backend (a full-screen quad needs none, point grids are generated from
//! their dimensions).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Primitive {
    /// Full-target quad, two triangles (or one oversized triangle, backend's
    /// choice). The default shape for image filters.
    Quad,
    /// A `width * height` grid of points, one per texel.
    Points { width: u32, height: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GeometryModel {
    pub primitive: Primitive,
}

impl GeometryModel {
    pub fn quad() -> Self {
        Self {
            primitive: Primitive::Quad,
        }
    }

    pub fn points(width: u32, height: u32) -> Self {
        Self {
            primitive: Primitive::Points {
                width: width.max(1),
                height: height.max(1),
            },
        }
    }

    /// Number of vertices the backend must emit. `u64` because a full-size
    /// point grid exceeds `u32::MAX` texels.
    pub fn vertex_count(&self) -> u64 {
        match self.primitive {
            Primitive::Quad => 3,
            Primitive::Points { width, height } => u64::from(width) * u64::from(height),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_grid_vertex_count_survives_full_size_grids() {
        let grid = GeometryModel::points(65_536, 65_536);
        assert_eq!(grid.vertex_count(), 1 << 32);
    }

    #[test]
    fn degenerate_grid_dimensions_clamp_to_one() {
        let grid = GeometryModel::points(0, 0);
        assert_eq!(grid.vertex_count(), 1);
    }
}
