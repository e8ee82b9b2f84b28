//! Object state records.
//!
//! [`ObjectState`] is the unit of replication: the owner tag plus the three
//! kinematic vectors. Both ends of a connection agree on its layout at
//! compile time; see `netsync_net::codec` for the wire form.

use netsync_math::{GRAVITY, Vec3, kinematics};
use serde::{Deserialize, Serialize};

use crate::identity::{Authority, OwnerId, SERVER_OWNER};

/// Kinematic state of one simulated object.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObjectState {
    /// Raw owner tag (0 = server, N = client N).
    pub owner: OwnerId,
    /// World-space position.
    pub position: Vec3,
    /// Linear velocity in world units per second.
    pub velocity: Vec3,
    /// Linear acceleration in world units per second².
    pub acceleration: Vec3,
}

impl ObjectState {
    /// A server-owned object at rest at the origin.
    pub const REST: Self = Self {
        owner: SERVER_OWNER,
        position: Vec3::ZERO,
        velocity: Vec3::ZERO,
        acceleration: Vec3::ZERO,
    };

    /// Spawn position of a freshly connected client's object.
    pub const CLIENT_SPAWN_POSITION: Vec3 = Vec3::new(0.0, 0.0, 20.0);

    /// The state a client resets its own object to after the initial snapshot:
    /// hovering above the origin, at rest, under gravity only.
    #[must_use]
    pub fn client_spawn(owner: OwnerId) -> Self {
        Self {
            owner,
            position: Self::CLIENT_SPAWN_POSITION,
            velocity: Vec3::ZERO,
            acceleration: GRAVITY,
        }
    }

    /// Returns the authority derived from this record's owner tag.
    #[must_use]
    pub fn authority(&self) -> Authority {
        Authority::of(self.owner)
    }

    /// Force acting on the object, assuming unit mass.
    #[must_use]
    pub fn force(&self) -> Vec3 {
        self.acceleration
    }

    /// Advance the object by `dt` seconds.
    pub fn integrate(&mut self, dt: f32) {
        kinematics::step(&mut self.position, &mut self.velocity, self.acceleration, dt);
    }

    /// Copy kinematic fields from `other`, keeping this record's owner tag.
    pub fn copy_kinematics(&mut self, other: &Self) {
        self.position = other.position;
        self.velocity = other.velocity;
        self.acceleration = other.acceleration;
    }
}

impl Default for ObjectState {
    fn default() -> Self {
        Self::REST
    }
}
