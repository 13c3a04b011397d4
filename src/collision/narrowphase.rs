#[cfg(feature = "parallel")]
use rayon::prelude::*;

use glam::DVec2;

use super::{
    broadphase,
    contact::{Contact, ContactSet, NormalKind},
};
use crate::{
    core::{
        rigidbody::RigidBody,
        shape::{Polygon, Shape},
        types::MixingMode,
    },
    utils::allocator::{Arena, EntityId},
};

/// Pair count above which the narrow phase fans out over the rayon pool.
#[cfg(feature = "parallel")]
const PARALLEL_PAIR_THRESHOLD: usize = 64;

const INTERIOR_EPSILON: f64 = 1e-9;
const MIN_SEPARATION: f64 = 1e-12;
/// Cosine above which two edge normals count as facing each other.
const FACING_COS: f64 = 0.999;

/// One side of a candidate pair.
#[derive(Clone, Copy)]
struct Side<'a> {
    body: &'a RigidBody,
    slot: usize,
    id: EntityId,
}

/// Where a query point sits relative to a polygon boundary, in body coordinates
/// of the polygon.
struct BoundaryHit {
    gap: f64,
    normal: DVec2,
    surface: DVec2,
    kind: NormalKind,
}

/// Finds every pair of shapes whose gap is below `max_gap`, including
/// penetrating ones. Contacts come out in slot-pair order regardless of
/// whether the pairs were processed in parallel.
pub fn detect_contacts(bodies: &Arena<RigidBody>, max_gap: f64, mixing: MixingMode) -> ContactSet {
    let slice = bodies.as_slice();
    let ids: Vec<EntityId> = bodies.ids().collect();
    let pairs = broadphase::candidate_pairs(slice, max_gap);

    let collide = |&(i, j): &(usize, usize)| {
        let a = Side {
            body: &slice[i],
            slot: i,
            id: ids[i],
        };
        let b = Side {
            body: &slice[j],
            slot: j,
            id: ids[j],
        };
        collide_pair(a, b, max_gap, mixing)
    };

    #[cfg(feature = "parallel")]
    let per_pair: Vec<Vec<Contact>> = if pairs.len() >= PARALLEL_PAIR_THRESHOLD {
        pairs.par_iter().map(collide).collect()
    } else {
        pairs.iter().map(collide).collect()
    };
    #[cfg(not(feature = "parallel"))]
    let per_pair: Vec<Vec<Contact>> = pairs.iter().map(collide).collect();

    ContactSet::new(per_pair.into_iter().flatten().collect())
}

fn collide_pair(a: Side<'_>, b: Side<'_>, max_gap: f64, mixing: MixingMode) -> Vec<Contact> {
    let elasticity = mixing.combine(a.body.elasticity(), b.body.elasticity());
    let mut out = Vec::new();
    match (a.body.shape(), b.body.shape()) {
        (Shape::Circle { radius: ra }, Shape::Circle { radius: rb }) => {
            out.extend(circle_circle(a, *ra, b, *rb, max_gap, elasticity));
        }
        (Shape::Circle { radius }, Shape::Polygon(polygon)) => {
            out.extend(circle_polygon(a, *radius, b, polygon, max_gap, elasticity));
        }
        (Shape::Polygon(polygon), Shape::Circle { radius }) => {
            out.extend(circle_polygon(b, *radius, a, polygon, max_gap, elasticity));
        }
        (Shape::Polygon(pa), Shape::Polygon(pb)) => {
            vertices_against_polygon(a, pa, b, pb, max_gap, elasticity, true, &mut out);
            // Corner-to-corner contacts were already found from the other side,
            // and flush corners show up from both sides at one spot.
            let mut reverse = Vec::new();
            vertices_against_polygon(b, pb, a, pa, max_gap, elasticity, false, &mut reverse);
            reverse.retain(|c| out.iter().all(|found| found.point.distance(c.point) >= max_gap));
            out.extend(reverse);
        }
    }
    out
}

fn circle_circle(
    a: Side<'_>,
    ra: f64,
    b: Side<'_>,
    rb: f64,
    max_gap: f64,
    elasticity: f64,
) -> Option<Contact> {
    let ca = a.body.position();
    let cb = b.body.position();
    let offset = ca - cb;
    let length = offset.length();
    let gap = length - ra - rb;
    if gap >= max_gap {
        return None;
    }
    let normal = if length > MIN_SEPARATION {
        offset / length
    } else {
        DVec2::Y
    };
    let point = cb + normal * (rb + 0.5 * gap);
    Some(build_contact(
        a,
        ca,
        b,
        cb,
        point,
        normal,
        gap,
        NormalKind::PointToPoint {
            length: length.max(MIN_SEPARATION),
        },
        elasticity,
    ))
}

fn circle_polygon(
    circle: Side<'_>,
    radius: f64,
    poly: Side<'_>,
    polygon: &Polygon,
    max_gap: f64,
    elasticity: f64,
) -> Option<Contact> {
    let centre = circle.body.position();
    let local = poly.body.world_to_body(centre);
    if local.length() > polygon.bounding_radius() + radius + max_gap {
        return None;
    }
    let hit = boundary_hit(polygon, local);
    let gap = hit.gap - radius;
    if gap >= max_gap {
        return None;
    }
    let normal = poly.body.rotate_body_to_world(hit.normal);
    let surface = poly.body.body_to_world(hit.surface);
    let point = 0.5 * (surface + centre - normal * radius);
    Some(build_contact(
        circle, centre, poly, surface, point, normal, gap, hit.kind, elasticity,
    ))
}

#[allow(clippy::too_many_arguments)]
fn vertices_against_polygon(
    owner: Side<'_>,
    owner_polygon: &Polygon,
    other: Side<'_>,
    polygon: &Polygon,
    max_gap: f64,
    elasticity: f64,
    allow_corners: bool,
    out: &mut Vec<Contact>,
) {
    let reach = polygon.bounding_radius() + max_gap;
    let owner_normals: Vec<DVec2> = owner_polygon
        .edges()
        .map(|edge| other.body.rotate_world_to_body(owner.body.rotate_body_to_world(edge.normal)))
        .collect();
    let count = owner_normals.len();
    for (index, vertex) in owner_polygon.vertices().iter().enumerate() {
        let world = owner.body.body_to_world(*vertex);
        let local = other.body.world_to_body(world);
        if local.length() > reach {
            continue;
        }
        let mut hit = boundary_hit(polygon, local);
        if hit.gap >= max_gap {
            continue;
        }
        if matches!(hit.kind, NormalKind::PointToPoint { .. }) {
            let adjacent = [owner_normals[(index + count - 1) % count], owner_normals[index]];
            if let Some(face) = facing_edge_hit(polygon, local, adjacent, max_gap) {
                hit = face;
            } else if !allow_corners {
                continue;
            }
        }
        let normal = other.body.rotate_body_to_world(hit.normal);
        let surface = other.body.body_to_world(hit.surface);
        let point = 0.5 * (world + surface);
        out.push(build_contact(
            owner, world, other, surface, point, normal, hit.gap, hit.kind, elasticity,
        ));
    }
}

/// Edge of `polygon` facing one of `own_normals` whose slab, widened by
/// `slack` at both ends, holds the outside point `local`. Lets a corner that
/// sits flush against a face touch along the face normal.
fn facing_edge_hit(
    polygon: &Polygon,
    local: DVec2,
    own_normals: [DVec2; 2],
    slack: f64,
) -> Option<BoundaryHit> {
    polygon
        .edges()
        .filter(|edge| own_normals.iter().any(|n| n.dot(edge.normal) < -FACING_COS))
        .filter_map(|edge| {
            let gap = edge.line_distance(local);
            let along = (local - edge.start).dot((edge.end - edge.start).normalize_or_zero());
            let within = along >= -slack && along <= edge.length() + slack;
            (gap >= 0.0 && within).then_some((gap, edge.normal))
        })
        .min_by(|(a, _), (b, _)| a.total_cmp(b))
        .map(|(gap, normal)| BoundaryHit {
            gap,
            normal,
            surface: local - normal * gap,
            kind: NormalKind::EdgeOfB,
        })
}

/// Locates `local` against the boundary of `polygon`. Inside points report the
/// nearest edge with a negative gap; outside points report the closest boundary
/// feature, which is a corner when the projection lands on an edge end.
fn boundary_hit(polygon: &Polygon, local: DVec2) -> BoundaryHit {
    let (depth, deepest) = polygon.deepest_edge(local);
    if depth <= 0.0 {
        return BoundaryHit {
            gap: depth,
            normal: deepest.normal,
            surface: local - deepest.normal * depth,
            kind: NormalKind::EdgeOfB,
        };
    }

    let mut best: Option<(f64, DVec2, f64, DVec2)> = None;
    for edge in polygon.edges() {
        let (closest, t) = edge.closest_point(local);
        let dist = closest.distance(local);
        if best.map_or(true, |(d, ..)| dist < d) {
            best = Some((dist, closest, t, edge.normal));
        }
    }
    let Some((dist, closest, t, edge_normal)) = best else {
        return BoundaryHit {
            gap: depth,
            normal: deepest.normal,
            surface: local - deepest.normal * depth,
            kind: NormalKind::EdgeOfB,
        };
    };

    if t > INTERIOR_EPSILON && t < 1.0 - INTERIOR_EPSILON {
        BoundaryHit {
            gap: dist,
            normal: edge_normal,
            surface: closest,
            kind: NormalKind::EdgeOfB,
        }
    } else {
        let length = dist.max(MIN_SEPARATION);
        BoundaryHit {
            gap: dist,
            normal: (local - closest) / length,
            surface: closest,
            kind: NormalKind::PointToPoint { length },
        }
    }
}

/// Fills in the kinematic terms of a contact. `track_a` and `track_b` are the
/// material points followed on each body: a circle's centre, a polygon vertex,
/// or the matching point on the opposing surface.
#[allow(clippy::too_many_arguments)]
fn build_contact(
    a: Side<'_>,
    track_a: DVec2,
    b: Side<'_>,
    track_b: DVec2,
    point: DVec2,
    normal: DVec2,
    distance: f64,
    kind: NormalKind,
    elasticity: f64,
) -> Contact {
    let r_a = track_a - a.body.position();
    let r_b = track_b - b.body.position();
    let omega_a = a.body.velocity.angular;
    let omega_b = b.body.velocity.angular;
    let v_rel = a.body.velocity_at(track_a) - b.body.velocity_at(track_b);
    let normal_velocity = v_rel.dot(normal);

    let centripetal = normal.dot(r_b * (omega_b * omega_b) - r_a * (omega_a * omega_a));
    let turning = match kind {
        NormalKind::EdgeOfB => 2.0 * (normal.perp() * omega_b).dot(v_rel),
        NormalKind::PointToPoint { length } => {
            let tangential = v_rel - normal * normal_velocity;
            tangential.length_squared() / length
        }
    };

    Contact {
        body_a: a.id,
        body_b: b.id,
        slot_a: a.slot,
        slot_b: b.slot,
        point,
        normal,
        r_a,
        r_b,
        distance,
        normal_velocity,
        curvature: centripetal + turning,
        normal_kind: kind,
        elasticity,
        force: 0.0,
        impulse: 0.0,
    }
}
