use glam::DVec2;

use crate::utils::allocator::EntityId;

/// How the contact normal moves as the bodies move, which determines the
/// velocity-dependent part of the gap's second derivative.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NormalKind {
    /// Normal fixed to an edge of body B.
    EdgeOfB,
    /// Normal along the line joining two material points `length` apart
    /// (circle centres or polygon corners).
    PointToPoint { length: f64 },
}

/// Transient unilateral constraint between two nearly touching shapes.
///
/// The normal points from B toward A, so a positive `distance` is a gap and a
/// negative `normal_velocity` means the bodies approach each other.
#[derive(Debug, Clone, PartialEq)]
pub struct Contact {
    pub body_a: EntityId,
    pub body_b: EntityId,
    pub slot_a: usize,
    pub slot_b: usize,
    /// World point where the contact force acts.
    pub point: DVec2,
    pub normal: DVec2,
    /// Lever arms from each centre of mass to the material point tracked on
    /// that body. A circle tracks its centre, so its arm is zero.
    pub r_a: DVec2,
    pub r_b: DVec2,
    pub distance: f64,
    pub normal_velocity: f64,
    /// Velocity-dependent part of the gap acceleration.
    pub curvature: f64,
    pub normal_kind: NormalKind,
    pub elasticity: f64,
    pub force: f64,
    pub impulse: f64,
}

impl Contact {
    pub fn is_penetrating(&self) -> bool {
        self.distance < 0.0
    }

    pub fn is_approaching(&self, small_velocity: f64) -> bool {
        self.normal_velocity < -small_velocity
    }

    /// Touching and slow enough to be held apart by a contact force.
    pub fn is_resting(&self, distance_tol: f64, velocity_tol: f64) -> bool {
        self.distance < distance_tol && self.normal_velocity.abs() < velocity_tol
    }
}

/// Contacts found in one detection pass. Owned by the step that created it.
#[derive(Debug, Clone, Default)]
pub struct ContactSet {
    contacts: Vec<Contact>,
}

impl ContactSet {
    pub fn new(contacts: Vec<Contact>) -> Self {
        Self { contacts }
    }

    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Contact> {
        self.contacts.iter()
    }

    pub fn as_slice(&self) -> &[Contact] {
        &self.contacts
    }

    pub fn into_vec(self) -> Vec<Contact> {
        self.contacts
    }

    pub fn has_penetration(&self) -> bool {
        self.contacts.iter().any(Contact::is_penetrating)
    }

    /// Most negative gap, if any contact exists.
    pub fn min_distance(&self) -> Option<f64> {
        self.contacts.iter().map(|c| c.distance).reduce(f64::min)
    }

    pub fn resting(&self, distance_tol: f64, velocity_tol: f64) -> Vec<Contact> {
        self.contacts
            .iter()
            .filter(|c| c.is_resting(distance_tol, velocity_tol))
            .cloned()
            .collect()
    }

    /// Touching pairs that are closing faster than `small_velocity`.
    pub fn colliding(&self, distance_tol: f64, small_velocity: f64) -> Vec<Contact> {
        self.contacts
            .iter()
            .filter(|c| c.distance < distance_tol && c.is_approaching(small_velocity))
            .cloned()
            .collect()
    }
}

impl IntoIterator for ContactSet {
    type Item = Contact;
    type IntoIter = std::vec::IntoIter<Contact>;

    fn into_iter(self) -> Self::IntoIter {
        self.contacts.into_iter()
    }
}
