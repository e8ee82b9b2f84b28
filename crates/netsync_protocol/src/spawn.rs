//! Initial population of the server's table.

use netsync_math::{GRAVITY, Vec3};
use netsync_state::{Authority, ObjectState, ObjectTable};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Objects per grid row.
pub const GRID_WIDTH: usize = 8;

/// Distance between neighbouring grid cells.
pub const GRID_SPACING: f32 = 3.0;

/// How server-owned slots are filled at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SpawnPattern {
    /// Lay objects out on a grid and launch them upward with random velocity.
    #[default]
    Grid,
    /// Leave every slot at rest at the origin.
    Rest,
}

impl SpawnPattern {
    /// State for the object in `slot` under this pattern.
    pub fn state_for(self, slot: usize, rng: &mut impl Rng) -> ObjectState {
        match self {
            Self::Rest => ObjectState::REST,
            Self::Grid => ObjectState {
                position: Vec3::new(
                    (slot % GRID_WIDTH) as f32 * GRID_SPACING,
                    (slot / GRID_WIDTH) as f32 * GRID_SPACING,
                    0.0,
                ),
                velocity: Vec3::new(
                    rng.gen_range(-14..=15) as f32,
                    rng.gen_range(-14..=15) as f32,
                    rng.gen_range(1..=10) as f32,
                ),
                acceleration: GRAVITY,
                ..ObjectState::REST
            },
        }
    }

    /// Fill every server-owned slot of `table`. Returns how many were written.
    pub fn populate(self, table: &mut ObjectTable, rng: &mut impl Rng) -> usize {
        let mut written = 0;
        for (slot, state) in table.owned_by_mut(Authority::Server) {
            *state = self.state_for(usize::from(slot), rng);
            written += 1;
        }
        written
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    #[test]
    fn test_grid_layout() {
        let mut table = ObjectTable::new(20);
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(SpawnPattern::Grid.populate(&mut table, &mut rng), 20);

        let s = table.get(10).unwrap();
        assert_eq!(s.position, Vec3::new(6.0, 3.0, 0.0));
        assert_eq!(s.acceleration, GRAVITY);
        assert_eq!(s.owner, 0);
        for (_, s) in table.iter() {
            assert!((-14.0..=15.0).contains(&s.velocity.x));
            assert!((-14.0..=15.0).contains(&s.velocity.y));
            assert!((1.0..=10.0).contains(&s.velocity.z));
        }
    }

    #[test]
    fn test_grid_is_reproducible() {
        let mut a = ObjectTable::new(16);
        let mut b = ObjectTable::new(16);
        SpawnPattern::Grid.populate(&mut a, &mut StdRng::seed_from_u64(42));
        SpawnPattern::Grid.populate(&mut b, &mut StdRng::seed_from_u64(42));
        for ((_, x), (_, y)) in a.iter().zip(b.iter()) {
            assert_eq!(x, y);
        }
    }

    #[test]
    fn test_rest_pattern() {
        let mut table = ObjectTable::new(4);
        SpawnPattern::Rest.populate(&mut table, &mut StdRng::seed_from_u64(0));
        assert!(table.iter().all(|(_, s)| *s == ObjectState::REST));
    }
}
