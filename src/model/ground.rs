//! Ground height lookups against static map geometry.
//!
//! A probe starts at `PROBE_ALTITUDE` above the queried point and travels
//! straight down for at most `PROBE_RANGE`; the first surface it meets is the
//! ground. Triangles are bucketed into a uniform XZ grid once, when the map is
//! installed, so a query only tests the triangles overlapping one cell.

use glam::{Vec2, Vec3, Vec3Swizzles};

use crate::utils::Bounds;

pub const PROBE_ALTITUDE: f32 = 1000.0;
pub const PROBE_RANGE: f32 = 2000.0;

const MAX_GRID_CELLS_PER_AXIS: usize = 64;
const MIN_CELL_SIZE: f32 = 0.5;
const BARYCENTRIC_TOLERANCE: f32 = 1e-6;

/// One world-space triangle of the map.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Surface {
    pub a: Vec3,
    pub b: Vec3,
    pub c: Vec3,
    /// Single-sided surfaces only stop the probe on their front (counter-clockwise) face.
    pub double_sided: bool,
}

impl Surface {
    pub fn new(a: Vec3, b: Vec3, c: Vec3, double_sided: bool) -> Self {
        Self { a, b, c, double_sided }
    }

    /// Height where the downward probe through (x, z) meets this triangle.
    fn probe(&self, x: f32, z: f32) -> Option<f32> {
        let normal_y = (self.b - self.a).cross(self.c - self.a).y;
        // The probe travels along -Y, so it sees the front face when the normal points up.
        if normal_y == 0.0 || (!self.double_sided && normal_y < 0.0) {
            return None;
        }

        let p = Vec2::new(x, z);
        let (a, b, c) = (self.a.xz(), self.b.xz(), self.c.xz());
        let area = cross2(b - a, c - a);
        if area == 0.0 {
            return None;
        }
        let w_b = cross2(p - a, c - a) / area;
        let w_c = cross2(b - a, p - a) / area;
        let w_a = 1.0 - w_b - w_c;
        if w_a < -BARYCENTRIC_TOLERANCE || w_b < -BARYCENTRIC_TOLERANCE || w_c < -BARYCENTRIC_TOLERANCE {
            return None;
        }

        let y = w_a * self.a.y + w_b * self.b.y + w_c * self.c.y;
        let travelled = PROBE_ALTITUDE - y;
        (0.0..=PROBE_RANGE).contains(&travelled).then_some(y)
    }

    fn bounds(&self) -> Bounds {
        Bounds {
            min: self.a.min(self.b).min(self.c),
            max: self.a.max(self.b).max(self.c),
        }
    }
}

fn cross2(u: Vec2, v: Vec2) -> f32 {
    u.x * v.y - u.y * v.x
}

/// Triangle indices bucketed by XZ cell.
#[derive(Debug, Clone)]
struct SurfaceGrid {
    origin: Vec2,
    cell_size: f32,
    cols: usize,
    rows: usize,
    cells: Vec<Vec<u32>>,
    surfaces: Vec<Surface>,
}

impl SurfaceGrid {
    fn build(surfaces: Vec<Surface>, bounds: &Bounds) -> Self {
        let extent = bounds.size().xz();
        let longest = extent.x.max(extent.y);
        let cell_size = (longest / MAX_GRID_CELLS_PER_AXIS as f32).max(MIN_CELL_SIZE);
        let cols = ((extent.x / cell_size).ceil() as usize).max(1);
        let rows = ((extent.y / cell_size).ceil() as usize).max(1);

        let mut grid = Self {
            origin: bounds.min.xz(),
            cell_size,
            cols,
            rows,
            cells: vec![Vec::new(); cols * rows],
            surfaces: Vec::new(),
        };

        for (i, surface) in surfaces.iter().enumerate() {
            let b = surface.bounds();
            let (c0, r0) = grid.cell_of(b.min.x, b.min.z);
            let (c1, r1) = grid.cell_of(b.max.x, b.max.z);
            for r in r0..=r1 {
                for c in c0..=c1 {
                    grid.cells[r * cols + c].push(i as u32);
                }
            }
        }
        grid.surfaces = surfaces;
        grid
    }

    /// Cell containing (x, z), clamped into the grid.
    fn cell_of(&self, x: f32, z: f32) -> (usize, usize) {
        let local = (Vec2::new(x, z) - self.origin) / self.cell_size;
        let col = (local.x.max(0.0) as usize).min(self.cols - 1);
        let row = (local.y.max(0.0) as usize).min(self.rows - 1);
        (col, row)
    }

    fn contains(&self, x: f32, z: f32) -> bool {
        let max = self.origin + Vec2::new(self.cols as f32, self.rows as f32) * self.cell_size;
        x >= self.origin.x && z >= self.origin.y && x <= max.x && z <= max.y
    }

    /// Highest surface under (x, z), which is the first one the probe reaches.
    fn probe(&self, x: f32, z: f32) -> Option<f32> {
        if !self.contains(x, z) {
            return None;
        }
        let (col, row) = self.cell_of(x, z);
        self.cells[row * self.cols + col]
            .iter()
            .filter_map(|&i| self.surfaces[i as usize].probe(x, z))
            .reduce(f32::max)
    }
}

/// Answers `height_at(x, z)` for the integrator. Immutable once built.
#[derive(Debug, Clone)]
pub struct GroundQuery {
    grid: Option<SurfaceGrid>,
    fallback: f32,
}

impl GroundQuery {
    /// No map geometry: every point reports `height`.
    pub fn flat(height: f32) -> Self {
        Self { grid: None, fallback: height }
    }

    /// Ground from map triangles; misses fall back to the lowest point of the map.
    pub fn from_surfaces(surfaces: Vec<Surface>) -> Self {
        let bounds = Bounds::from_points(surfaces.iter().flat_map(|s| [s.a, s.b, s.c]));
        match bounds {
            Some(bounds) => Self {
                fallback: bounds.min.y,
                grid: Some(SurfaceGrid::build(surfaces, &bounds)),
            },
            None => Self::flat(0.0),
        }
    }

    pub fn height_at(&self, x: f32, z: f32) -> f32 {
        self.grid
            .as_ref()
            .and_then(|g| g.probe(x, z))
            .unwrap_or(self.fallback)
    }

    pub fn fallback_height(&self) -> f32 {
        self.fallback
    }

    pub fn has_surfaces(&self) -> bool {
        self.grid.is_some()
    }

    pub fn surface_count(&self) -> usize {
        self.grid.as_ref().map_or(0, |g| g.surfaces.len())
    }
}

impl Default for GroundQuery {
    fn default() -> Self {
        Self::flat(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Square of two upward-facing triangles at height `y`.
    fn quad(min: f32, max: f32, y: f32) -> Vec<Surface> {
        let p = |x, z| Vec3::new(x, y, z);
        vec![
            Surface::new(p(min, min), p(max, max), p(max, min), false),
            Surface::new(p(min, min), p(min, max), p(max, max), false),
        ]
    }

    #[test]
    fn flat_query_returns_constant() {
        let ground = GroundQuery::flat(0.0);
        assert_eq!(ground.height_at(12.0, -40.0), 0.0);
        assert!(!ground.has_surfaces());
    }

    #[test]
    fn probe_hits_floor() {
        let ground = GroundQuery::from_surfaces(quad(-10.0, 10.0, 2.5));
        assert!((ground.height_at(3.0, -4.0) - 2.5).abs() < 1e-6);
    }

    #[test]
    fn probe_returns_highest_surface() {
        let mut surfaces = quad(-10.0, 10.0, 0.0);
        surfaces.extend(quad(-1.0, 1.0, 3.0));
        let ground = GroundQuery::from_surfaces(surfaces);
        assert!((ground.height_at(0.5, 0.5) - 3.0).abs() < 1e-6);
        assert!(ground.height_at(5.0, 5.0).abs() < 1e-6);
    }

    #[test]
    fn sloped_surface_interpolates() {
        let ground = GroundQuery::from_surfaces(vec![Surface::new(
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(0.0, 0.0, 10.0),
            Vec3::new(10.0, 10.0, 0.0),
            false,
        )]);
        assert!((ground.height_at(5.0, 1.0) - 5.0).abs() < 1e-4);
    }

    #[test]
    fn miss_falls_back_to_lowest_point() {
        let mut surfaces = quad(0.0, 4.0, -2.0);
        surfaces.extend(quad(10.0, 14.0, 1.0));
        let ground = GroundQuery::from_surfaces(surfaces);
        assert_eq!(ground.fallback_height(), -2.0);
        // gap between the two platforms
        assert_eq!(ground.height_at(7.0, 2.0), -2.0);
        // outside the map entirely
        assert_eq!(ground.height_at(100.0, 100.0), -2.0);
    }

    #[test]
    fn back_faces_are_ignored_unless_double_sided() {
        let down = |double_sided| {
            vec![Surface::new(
                Vec3::new(-5.0, 4.0, -5.0),
                Vec3::new(5.0, 4.0, -5.0),
                Vec3::new(5.0, 4.0, 5.0),
                double_sided,
            )]
        };
        let mut single = down(false);
        single.extend(quad(-5.0, 5.0, 0.0));
        assert!(GroundQuery::from_surfaces(single).height_at(2.0, -1.0).abs() < 1e-6);

        let mut double = down(true);
        double.extend(quad(-5.0, 5.0, 0.0));
        assert!((GroundQuery::from_surfaces(double).height_at(2.0, -1.0) - 4.0).abs() < 1e-6);
    }

    #[test]
    fn surfaces_above_probe_start_are_skipped() {
        let mut surfaces = quad(-1.0, 1.0, PROBE_ALTITUDE + 5.0);
        surfaces.extend(quad(-1.0, 1.0, 1.0));
        let ground = GroundQuery::from_surfaces(surfaces);
        assert!((ground.height_at(0.0, 0.0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn repeated_queries_are_identical() {
        let mut surfaces = Vec::new();
        for i in 0..20 {
            let o = i as f32 * 3.0;
            surfaces.extend(quad(o, o + 4.0, (i as f32 * 0.37).sin()));
        }
        let ground = GroundQuery::from_surfaces(surfaces);
        for &(x, z) in &[(1.3, 2.2), (17.0, 18.5), (59.9, 60.1), (-3.0, 4.0)] {
            let first = ground.height_at(x, z);
            for _ in 0..10 {
                assert_eq!(ground.height_at(x, z).to_bits(), first.to_bits());
            }
        }
    }

    #[test]
    fn empty_surface_list_is_flat_zero() {
        let ground = GroundQuery::from_surfaces(Vec::new());
        assert!(!ground.has_surfaces());
        assert_eq!(ground.height_at(1.0, 1.0), 0.0);
    }

    #[test]
    fn query_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<GroundQuery>();
    }
}
