use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::error::{PhysicsError, Result};

const CONVEXITY_EPSILON: f64 = 1e-12;

/// Geometry of a body, expressed in body coordinates with the centre of mass at
/// the origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Shape {
    Circle { radius: f64 },
    Polygon(Polygon),
}

impl Shape {
    pub fn circle(radius: f64) -> Self {
        Shape::Circle { radius }
    }

    /// Axis-aligned rectangle centred on the origin.
    pub fn block(width: f64, height: f64) -> Result<Self> {
        let (hw, hh) = (0.5 * width, 0.5 * height);
        Polygon::new(vec![
            DVec2::new(-hw, -hh),
            DVec2::new(hw, -hh),
            DVec2::new(hw, hh),
            DVec2::new(-hw, hh),
        ])
        .map(Shape::Polygon)
    }

    /// Regular polygon with `sides` vertices on a circle of `radius`.
    pub fn regular_polygon(sides: usize, radius: f64) -> Result<Self> {
        if sides < 3 {
            return Err(PhysicsError::config(format!(
                "regular polygon needs at least 3 sides, got {sides}"
            )));
        }
        let step = std::f64::consts::TAU / sides as f64;
        let vertices = (0..sides)
            .map(|i| DVec2::from_angle(step * i as f64) * radius)
            .collect();
        Polygon::new(vertices).map(Shape::Polygon)
    }

    pub fn bounding_radius(&self) -> f64 {
        match self {
            Shape::Circle { radius } => *radius,
            Shape::Polygon(polygon) => polygon.bounding_radius(),
        }
    }

    pub fn area(&self) -> f64 {
        match self {
            Shape::Circle { radius } => std::f64::consts::PI * radius * radius,
            Shape::Polygon(polygon) => polygon.area(),
        }
    }

    /// Moment of inertia about the centroid divided by mass, for uniform density.
    pub fn moment_per_mass(&self) -> f64 {
        match self {
            Shape::Circle { radius } => 0.5 * radius * radius,
            Shape::Polygon(polygon) => polygon.moment_per_mass(),
        }
    }

    /// Point containment in body coordinates; boundary points count as inside.
    pub fn contains(&self, local: DVec2) -> bool {
        match self {
            Shape::Circle { radius } => local.length_squared() <= radius * radius,
            Shape::Polygon(polygon) => polygon.contains(local),
        }
    }
}

/// One directed side of a polygon with its outward unit normal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Edge {
    pub index: usize,
    pub start: DVec2,
    pub end: DVec2,
    pub normal: DVec2,
}

impl Edge {
    pub fn length(&self) -> f64 {
        self.start.distance(self.end)
    }

    /// Signed distance of `point` from the edge's supporting line, positive outside.
    pub fn line_distance(&self, point: DVec2) -> f64 {
        (point - self.start).dot(self.normal)
    }

    /// Closest point on the segment and its parameter in `[0, 1]`.
    pub fn closest_point(&self, point: DVec2) -> (DVec2, f64) {
        let dir = self.end - self.start;
        let len_sq = dir.length_squared();
        if len_sq <= f64::EPSILON {
            return (self.start, 0.0);
        }
        let t = ((point - self.start).dot(dir) / len_sq).clamp(0.0, 1.0);
        (self.start + dir * t, t)
    }
}

/// Closed convex polygon, counter-clockwise, re-centred on its centroid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    vertices: Vec<DVec2>,
}

impl Polygon {
    /// Builds a polygon from an ordered vertex loop. Clockwise input is reversed;
    /// the vertices are shifted so the centroid sits at the origin.
    pub fn new(mut vertices: Vec<DVec2>) -> Result<Self> {
        if vertices.len() < 3 {
            return Err(PhysicsError::config(format!(
                "polygon needs at least 3 vertices, got {}",
                vertices.len()
            )));
        }
        if vertices.iter().any(|v| !v.is_finite()) {
            return Err(PhysicsError::config("polygon vertex is not finite"));
        }

        let area = signed_area(&vertices);
        if area.abs() <= f64::EPSILON {
            return Err(PhysicsError::config("polygon has zero area"));
        }
        if area < 0.0 {
            vertices.reverse();
        }

        let n = vertices.len();
        for i in 0..n {
            let a = vertices[i];
            let b = vertices[(i + 1) % n];
            let c = vertices[(i + 2) % n];
            if (b - a).perp_dot(c - b) < -CONVEXITY_EPSILON {
                return Err(PhysicsError::config(format!(
                    "polygon is not convex at vertex {}",
                    (i + 1) % n
                )));
            }
        }

        let centroid = centroid(&vertices, area.abs());
        for v in &mut vertices {
            *v -= centroid;
        }
        Ok(Self { vertices })
    }

    pub fn vertices(&self) -> &[DVec2] {
        &self.vertices
    }

    pub fn edges(&self) -> impl Iterator<Item = Edge> + '_ {
        let n = self.vertices.len();
        (0..n).map(move |index| {
            let start = self.vertices[index];
            let end = self.vertices[(index + 1) % n];
            // Counter-clockwise winding puts the outside on the right.
            let normal = DVec2::new(end.y - start.y, start.x - end.x).normalize_or_zero();
            Edge {
                index,
                start,
                end,
                normal,
            }
        })
    }

    pub fn area(&self) -> f64 {
        signed_area(&self.vertices)
    }

    pub fn bounding_radius(&self) -> f64 {
        self.vertices
            .iter()
            .map(|v| v.length())
            .fold(0.0, f64::max)
    }

    pub fn moment_per_mass(&self) -> f64 {
        let n = self.vertices.len();
        let mut numerator = 0.0;
        for i in 0..n {
            let a = self.vertices[i];
            let b = self.vertices[(i + 1) % n];
            let cross = a.perp_dot(b);
            numerator += cross * (a.dot(a) + a.dot(b) + b.dot(b));
        }
        numerator / 12.0 / self.area()
    }

    pub fn contains(&self, point: DVec2) -> bool {
        self.edges().all(|edge| edge.line_distance(point) <= 0.0)
    }

    /// Largest supporting-line distance and the edge that produced it. Negative
    /// values mean the point is inside, and then the magnitude is the depth.
    pub fn deepest_edge(&self, point: DVec2) -> (f64, Edge) {
        let mut best: Option<(f64, Edge)> = None;
        for edge in self.edges() {
            let d = edge.line_distance(point);
            if best.map_or(true, |(bd, _)| d > bd) {
                best = Some((d, edge));
            }
        }
        // A validated polygon always has at least three edges.
        best.unwrap_or((
            f64::INFINITY,
            Edge {
                index: 0,
                start: DVec2::ZERO,
                end: DVec2::ZERO,
                normal: DVec2::X,
            },
        ))
    }
}

fn signed_area(vertices: &[DVec2]) -> f64 {
    let n = vertices.len();
    0.5 * (0..n)
        .map(|i| vertices[i].perp_dot(vertices[(i + 1) % n]))
        .sum::<f64>()
}

fn centroid(vertices: &[DVec2], area: f64) -> DVec2 {
    let n = vertices.len();
    let mut sum = DVec2::ZERO;
    for i in 0..n {
        let a = vertices[i];
        let b = vertices[(i + 1) % n];
        sum += (a + b) * a.perp_dot(b);
    }
    sum / (6.0 * area)
}
