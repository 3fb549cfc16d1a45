//! Polygon geometry: vertex placement and symmetry rotation tables.
//!
//! Vertex order defines index identity for the restriction rules:
//!
//! ```text
//! main₀ [mid₀₁] main₁ [mid₁₂] … main₍N₋₁₎ [mid₍N₋₁₎₀] [center]
//! ```
//!
//! The first `ring_size` vertices form the ring used for neighbor
//! adjacency; the optional center vertex sits outside the ring.

use std::f64::consts::{FRAC_PI_2, TAU};

use rand::Rng;

use crate::types::{EngineError, Point, Settings};

/// A rotation about the polygon center, stored as its cosine and sine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rotation {
    /// Cosine of the rotation angle.
    pub cos: f64,
    /// Sine of the rotation angle.
    pub sin: f64,
}

impl Rotation {
    /// Rotation by `angle` radians.
    #[must_use]
    pub fn from_angle(angle: f64) -> Self {
        let (sin, cos) = angle.sin_cos();
        Self { cos, sin }
    }

    /// Rotate an offset `(dx, dy)` from the center.
    #[must_use]
    pub fn apply(self, dx: f64, dy: f64) -> (f64, f64) {
        (
            dx.mul_add(self.cos, -(dy * self.sin)),
            dx.mul_add(self.sin, dy * self.cos),
        )
    }
}

/// Vertex layout and symmetry tables for one regular polygon.
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    center: Point,
    radius: f64,
    main: Vec<Point>,
    vertices: Vec<Point>,
    ring_size: usize,
    rotations: Vec<Rotation>,
}

impl Geometry {
    /// Build the geometry described by `settings`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConfig`] if `sides < 3` or the
    /// padding leaves a non-positive radius.
    pub fn build(settings: &Settings) -> Result<Self, EngineError> {
        Self::new(
            settings.canvas_size,
            settings.sides as usize,
            settings.padding,
            settings.midpoint_vertex,
            settings.center_vertex,
        )
    }

    /// Build a regular `sides`-gon inscribed in a `canvas_size` square.
    ///
    /// The first vertex points straight up; the rest follow clockwise
    /// (in screen coordinates, where +y points down).
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConfig`] if `sides < 3` or
    /// `canvas_size / 2 - padding <= 0`.
    pub fn new(
        canvas_size: u32,
        sides: usize,
        padding: f64,
        midpoint_vertex: bool,
        center_vertex: bool,
    ) -> Result<Self, EngineError> {
        if sides < 3 {
            return Err(EngineError::InvalidConfig(format!(
                "a polygon needs at least 3 sides, got {sides}",
            )));
        }
        let half = f64::from(canvas_size) / 2.0;
        let radius = half - padding;
        // Negated form so a NaN radius is rejected too.
        if !(radius > 0.0) {
            return Err(EngineError::InvalidConfig(format!(
                "polygon radius must be positive, got {radius}",
            )));
        }
        let center = Point::new(half, half);

        #[allow(clippy::cast_precision_loss)]
        let step = TAU / sides as f64;

        #[allow(clippy::cast_precision_loss)]
        let main: Vec<Point> = (0..sides)
            .map(|i| {
                let angle = (i as f64).mul_add(step, -FRAC_PI_2);
                Point::new(
                    radius.mul_add(angle.cos(), center.x),
                    radius.mul_add(angle.sin(), center.y),
                )
            })
            .collect();

        let mut vertices = Vec::with_capacity(sides * 2 + 1);
        for (i, &vertex) in main.iter().enumerate() {
            vertices.push(vertex);
            if midpoint_vertex {
                vertices.push(vertex.midpoint(main[(i + 1) % sides]));
            }
        }
        let ring_size = vertices.len();
        if center_vertex {
            vertices.push(center);
        }

        #[allow(clippy::cast_precision_loss)]
        let rotations = (0..sides)
            .map(|i| Rotation::from_angle(i as f64 * step))
            .collect();

        Ok(Self {
            center,
            radius,
            main,
            vertices,
            ring_size,
            rotations,
        })
    }

    /// Center of the polygon (and of the canvas).
    #[must_use]
    pub const fn center(&self) -> Point {
        self.center
    }

    /// Circumradius of the polygon.
    #[must_use]
    pub const fn radius(&self) -> f64 {
        self.radius
    }

    /// Number of main polygon vertices.
    #[must_use]
    pub fn sides(&self) -> usize {
        self.main.len()
    }

    /// The main polygon vertices, without midpoints or center.
    #[must_use]
    pub fn main_vertices(&self) -> &[Point] {
        &self.main
    }

    /// Every selectable vertex in index order.
    #[must_use]
    pub fn vertices(&self) -> &[Point] {
        &self.vertices
    }

    /// Number of selectable vertices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    /// Always `false`: a valid geometry has at least three vertices.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Number of vertices taking part in neighbor adjacency.
    #[must_use]
    pub const fn ring_size(&self) -> usize {
        self.ring_size
    }

    /// Whether the center was appended as a selectable vertex.
    #[must_use]
    pub fn has_center_vertex(&self) -> bool {
        self.vertices.len() > self.ring_size
    }

    /// Rotations by `2π·i/N` for `i` in `0..N`.
    #[must_use]
    pub fn rotations(&self) -> &[Rotation] {
        &self.rotations
    }

    /// Sample a point uniformly inside the polygon.
    ///
    /// Picks one triangle of the center-anchored fan (all fan triangles
    /// of a regular polygon have equal area), then samples it with
    /// square-root-weighted barycentric coordinates.
    pub fn sample_interior<R: Rng + ?Sized>(&self, rng: &mut R) -> Point {
        let sides = self.main.len();
        let i = rng.gen_range(0..sides);
        let a = self.center;
        let b = self.main[i];
        let c = self.main[(i + 1) % sides];

        let r1 = rng.gen_range(0.0..1.0_f64).sqrt();
        let r2 = rng.gen_range(0.0..1.0_f64);
        let wa = 1.0 - r1;
        let wb = r1 * (1.0 - r2);
        let wc = r1 * r2;
        Point::new(
            wc.mul_add(c.x, wa.mul_add(a.x, wb * b.x)),
            wc.mul_add(c.y, wa.mul_add(a.y, wb * b.y)),
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rand::SeedableRng;
    use rand_pcg::Pcg32;

    use super::*;

    fn approx(a: Point, b: Point) -> bool {
        a.distance(b) < 1e-9
    }

    #[test]
    fn square_vertices_start_up_and_go_clockwise() {
        let g = Geometry::new(200, 4, 10.0, false, false).unwrap();
        assert_eq!(g.len(), 4);
        assert_eq!(g.ring_size(), 4);
        assert!((g.radius() - 90.0).abs() < f64::EPSILON);
        let v = g.vertices();
        assert!(approx(v[0], Point::new(100.0, 10.0)), "top: {:?}", v[0]);
        assert!(approx(v[1], Point::new(190.0, 100.0)), "right: {:?}", v[1]);
        assert!(approx(v[2], Point::new(100.0, 190.0)), "bottom: {:?}", v[2]);
        assert!(approx(v[3], Point::new(10.0, 100.0)), "left: {:?}", v[3]);
    }

    #[test]
    fn all_main_vertices_on_circumcircle() {
        let g = Geometry::new(500, 7, 25.0, false, false).unwrap();
        for v in g.vertices() {
            assert!((v.distance(g.center()) - 225.0).abs() < 1e-9);
        }
    }

    #[test]
    fn midpoints_follow_their_main_vertex() {
        let g = Geometry::new(200, 3, 0.0, true, false).unwrap();
        assert_eq!(g.len(), 6);
        assert_eq!(g.ring_size(), 6);
        let main = g.main_vertices();
        let v = g.vertices();
        assert_eq!(v[0], main[0]);
        assert!(approx(v[1], main[0].midpoint(main[1])));
        assert_eq!(v[2], main[1]);
        assert!(approx(v[5], main[2].midpoint(main[0])));
    }

    #[test]
    fn center_vertex_is_last_and_outside_ring() {
        let g = Geometry::new(200, 4, 0.0, true, true).unwrap();
        assert_eq!(g.len(), 9);
        assert_eq!(g.ring_size(), 8);
        assert!(g.has_center_vertex());
        assert_eq!(g.vertices()[8], Point::new(100.0, 100.0));
    }

    #[test]
    fn rotation_table_has_one_entry_per_side() {
        let g = Geometry::new(200, 6, 0.0, true, true).unwrap();
        assert_eq!(g.rotations().len(), 6);
        assert!((g.rotations()[0].cos - 1.0).abs() < f64::EPSILON);
        assert!(g.rotations()[0].sin.abs() < f64::EPSILON);
        let (x, y) = g.rotations()[3].apply(1.0, 0.0);
        assert!((x + 1.0).abs() < 1e-12 && y.abs() < 1e-12);
    }

    #[test]
    fn rotation_maps_vertex_to_next_vertex() {
        let g = Geometry::new(300, 5, 10.0, false, false).unwrap();
        let c = g.center();
        let v0 = g.vertices()[0];
        let (dx, dy) = g.rotations()[1].apply(v0.x - c.x, v0.y - c.y);
        assert!(approx(Point::new(c.x + dx, c.y + dy), g.vertices()[1]));
    }

    #[test]
    fn rejects_too_few_sides() {
        assert!(matches!(
            Geometry::new(200, 2, 0.0, false, false),
            Err(EngineError::InvalidConfig(_)),
        ));
    }

    #[test]
    fn rejects_non_positive_radius() {
        assert!(Geometry::new(200, 3, 100.0, false, false).is_err());
        assert!(Geometry::new(200, 3, 150.0, false, false).is_err());
        assert!(Geometry::new(200, 3, f64::NAN, false, false).is_err());
    }

    #[test]
    fn build_uses_settings() {
        let settings = Settings {
            canvas_size: 400,
            sides: 5,
            padding: 0.0,
            center_vertex: true,
            ..Settings::default()
        };
        let g = Geometry::build(&settings).unwrap();
        assert_eq!(g.sides(), 5);
        assert_eq!(g.len(), 6);
        assert!((g.radius() - 200.0).abs() < f64::EPSILON);
    }

    #[test]
    fn interior_samples_stay_inside_square() {
        // Square with vertices at the compass points is the diamond
        // |dx| + |dy| <= r.
        let g = Geometry::new(200, 4, 0.0, false, false).unwrap();
        let mut rng = Pcg32::seed_from_u64(7);
        for _ in 0..10_000 {
            let p = g.sample_interior(&mut rng);
            let (dx, dy) = (p.x - 100.0, p.y - 100.0);
            assert!(dx.abs() + dy.abs() <= 100.0 + 1e-9, "outside: {p:?}");
        }
    }

    #[test]
    fn interior_samples_cover_every_fan_triangle() {
        let g = Geometry::new(200, 4, 0.0, false, false).unwrap();
        let mut rng = Pcg32::seed_from_u64(11);
        let mut quadrants = [0_u32; 4];
        for _ in 0..4_000 {
            let p = g.sample_interior(&mut rng);
            let q = usize::from(p.x >= 100.0) + 2 * usize::from(p.y >= 100.0);
            quadrants[q] += 1;
        }
        for count in quadrants {
            assert!((800..=1200).contains(&count), "skewed: {quadrants:?}");
        }
    }
}
