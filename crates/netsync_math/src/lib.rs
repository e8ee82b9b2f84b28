//! # netsync_math
//!
//! Math types for the netsync synchronisation layer. Re-exports [`glam`] for
//! linear algebra and provides the [`kinematics`] integrator shared by the
//! server and client update loops.

pub mod kinematics;

// Re-export glam types for convenience.
pub use glam::{Vec2, Vec3};

pub use kinematics::{GRAVITY, integrate_position, integrate_velocity, step};
