//! Kinematics integrator.
//!
//! Rudimentary constant-acceleration kinematics used to advance locally owned
//! objects between network updates. All functions are pure; `dt` is in
//! seconds and is not validated (negative values integrate backwards).

use glam::Vec3;

/// Constant gravitational acceleration applied to every simulated object.
pub const GRAVITY: Vec3 = Vec3::new(0.0, 0.0, -3.0);

/// Returns `velocity + acceleration * dt`, component-wise.
#[must_use]
#[inline]
pub fn integrate_velocity(velocity: Vec3, acceleration: Vec3, dt: f32) -> Vec3 {
    velocity + acceleration * dt
}

/// Returns `position + velocity * dt`, component-wise.
#[must_use]
#[inline]
pub fn integrate_position(position: Vec3, velocity: Vec3, dt: f32) -> Vec3 {
    position + velocity * dt
}

/// Advance a body by one step of semi-implicit Euler.
///
/// Velocity is updated first and the new velocity is then used to move the
/// position, which is the order both update loops rely on.
#[inline]
pub fn step(position: &mut Vec3, velocity: &mut Vec3, acceleration: Vec3, dt: f32) {
    *velocity = integrate_velocity(*velocity, acceleration, dt);
    *position = integrate_position(*position, *velocity, dt);
}
