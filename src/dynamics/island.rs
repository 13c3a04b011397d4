use std::collections::{BTreeMap, HashSet};

use super::constraint_solver::ConstraintRow;
use crate::core::rigidbody::RigidBody;

/// Connected set of movable bodies and the contact rows touching them.
/// Static bodies end a traversal, so a shared floor does not merge islands.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Island {
    pub bodies: Vec<usize>,
    pub contacts: Vec<usize>,
}

/// Groups `contacts` (by index) into islands linked through movable bodies.
/// Joints link their bodies too but are not listed in the islands.
pub fn build_islands(
    bodies: &[RigidBody],
    contacts: &[ConstraintRow],
    joints: &[ConstraintRow],
) -> Vec<Island> {
    let movable = |slot: Option<usize>| {
        slot.filter(|s| bodies.get(*s).is_some_and(|b| !b.is_static()))
    };

    let mut adjacency: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for row in contacts.iter().chain(joints) {
        match (movable(row.slot_a), movable(row.slot_b)) {
            (Some(a), Some(b)) => {
                adjacency.entry(a).or_default().push(b);
                adjacency.entry(b).or_default().push(a);
            }
            (Some(a), None) | (None, Some(a)) => {
                adjacency.entry(a).or_default();
            }
            (None, None) => {}
        }
    }

    let mut visited = HashSet::new();
    let mut islands = Vec::new();
    for &start in adjacency.keys() {
        if visited.contains(&start) {
            continue;
        }
        let members = depth_first_collect(&adjacency, start, &mut visited);
        let member_set: HashSet<usize> = members.iter().copied().collect();
        let island_contacts: Vec<usize> = contacts
            .iter()
            .enumerate()
            .filter(|(_, row)| {
                [movable(row.slot_a), movable(row.slot_b)]
                    .into_iter()
                    .flatten()
                    .any(|s| member_set.contains(&s))
            })
            .map(|(index, _)| index)
            .collect();
        if island_contacts.is_empty() {
            continue;
        }
        islands.push(Island {
            bodies: members,
            contacts: island_contacts,
        });
    }
    islands
}

fn depth_first_collect(
    adjacency: &BTreeMap<usize, Vec<usize>>,
    start: usize,
    visited: &mut HashSet<usize>,
) -> Vec<usize> {
    let mut stack = vec![start];
    let mut result = Vec::new();

    while let Some(node) = stack.pop() {
        if visited.insert(node) {
            result.push(node);
            if let Some(neighbors) = adjacency.get(&node) {
                stack.extend(neighbors.iter().copied());
            }
        }
    }

    result.sort_unstable();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        core::shape::Shape,
        dynamics::constraint_solver::RowKind,
    };
    use glam::DVec2;

    fn contact(a: usize, b: usize) -> ConstraintRow {
        ConstraintRow {
            kind: RowKind::Contact,
            slot_a: Some(a),
            slot_b: Some(b),
            normal: DVec2::Y,
            r_a: DVec2::ZERO,
            r_b: DVec2::ZERO,
            gap: 0.0,
            normal_velocity: 0.0,
            curvature: 0.0,
            elasticity: 1.0,
        }
    }

    #[test]
    fn static_floor_does_not_merge_islands() {
        let bodies = vec![
            RigidBody::fixed("floor", Shape::block(10.0, 1.0).unwrap()),
            RigidBody::new("a", Shape::circle(0.5), 1.0),
            RigidBody::new("b", Shape::circle(0.5), 1.0),
            RigidBody::new("c", Shape::circle(0.5), 1.0),
        ];
        let contacts = vec![contact(1, 0), contact(2, 0), contact(3, 2)];
        let islands = build_islands(&bodies, &contacts, &[]);

        assert_eq!(islands.len(), 2);
        assert_eq!(islands[0].bodies, vec![1]);
        assert_eq!(islands[0].contacts, vec![0]);
        assert_eq!(islands[1].bodies, vec![2, 3]);
        assert_eq!(islands[1].contacts, vec![1, 2]);
    }

    #[test]
    fn joints_link_bodies() {
        let bodies = vec![
            RigidBody::new("a", Shape::circle(0.5), 1.0),
            RigidBody::new("b", Shape::circle(0.5), 1.0),
            RigidBody::new("c", Shape::circle(0.5), 1.0),
        ];
        let mut joint = contact(1, 2);
        joint.kind = RowKind::Joint;
        let islands = build_islands(&bodies, &[contact(0, 1)], &[joint]);
        assert_eq!(islands.len(), 1);
        assert_eq!(islands[0].bodies, vec![0, 1, 2]);
    }
}
