//! Unit-unit pushing.
//!
//! After every unit has moved, overlapping pushing units are separated.
//! A moving unit shoves an idle one out of the way; two units in the same
//! situation share the correction. Displacements are accumulated over all
//! pairs before any is applied, so the result does not depend on pair order.

use super::unit::MoveState;
use super::PUSHING_STRENGTH;
use crate::math::{Fixed, Vec2Fixed};
use crate::obstruction::SpatialSubdivision;

const PUSH_DIVISION_SIZE: i32 = 8;

fn shares(a_moving: bool, b_moving: bool) -> (Fixed, Fixed) {
    let half = Fixed::ONE / 2;
    match (a_moving, b_moving) {
        (true, false) => (Fixed::ZERO, Fixed::ONE),
        (false, true) => (Fixed::ONE, Fixed::ZERO),
        _ => (half, half),
    }
}

/// Fill `push` and `pressure` of every state. `width`/`height` are the map
/// extents in world units.
pub(crate) fn compute_pushes(states: &mut [MoveState], width: Fixed, height: Fixed) {
    let mut index = SpatialSubdivision::new(width, height, PUSH_DIVISION_SIZE);
    let mut max_clearance = Fixed::ZERO;
    for (k, s) in states.iter().enumerate() {
        if s.pushing {
            let r = Vec2Fixed::new(s.clearance, s.clearance);
            index.add(k, s.pos - r, s.pos + r);
            max_clearance = max_clearance.max(s.clearance);
        }
    }

    let mut pushes = vec![(Vec2Fixed::ZERO, Fixed::ZERO); states.len()];
    for (a, sa) in states.iter().enumerate() {
        if !sa.pushing {
            continue;
        }
        for b in index.get_near(sa.pos, sa.clearance + max_clearance) {
            if b <= a {
                continue;
            }
            let sb = &states[b];
            let min_dist = sa.clearance + sb.clearance;
            let delta = sb.pos - sa.pos;
            if delta.length_squared() >= min_dist * min_dist {
                continue;
            }
            let dist = delta.length();
            let overlap = min_dist - dist;
            // Coincident units separate along +x, lower id to the west.
            let dir = if dist == Fixed::ZERO {
                Vec2Fixed::new(Fixed::ONE, Fixed::ZERO)
            } else {
                delta.normalize()
            };
            let (wa, wb) = shares(sa.moving, sb.moving);
            let amount = overlap * PUSHING_STRENGTH;
            pushes[a].0 -= dir * (amount * wa);
            pushes[b].0 += dir * (amount * wb);
            pushes[a].1 += overlap;
            pushes[b].1 += overlap;
        }
    }

    for (s, (push, pressure)) in states.iter_mut().zip(pushes) {
        // Never push a unit further than its own size in one turn.
        s.push = if push.length_squared() > s.clearance * s.clearance {
            push.normalize_to(s.clearance)
        } else {
            push
        };
        s.pressure = pressure;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(entity: u64, x: i32, y: i32, moving: bool) -> MoveState {
        let mut s = MoveState::new(entity, Vec2Fixed::from_ints(x, y), Fixed::ZERO, Fixed::ONE, true);
        s.moving = moving;
        s
    }

    fn size() -> Fixed {
        Fixed::from_num(64)
    }

    #[test]
    fn test_separated_units_are_not_pushed() {
        let mut states = vec![state(1, 10, 10, false), state(2, 13, 10, false)];
        compute_pushes(&mut states, size(), size());
        assert!(states.iter().all(|s| s.push == Vec2Fixed::ZERO && s.pressure == Fixed::ZERO));
    }

    #[test]
    fn test_idle_units_share_the_push() {
        let mut states = vec![state(1, 10, 10, false), state(2, 11, 10, false)];
        compute_pushes(&mut states, size(), size());
        // Overlap 1, strength 1/2, split in two.
        assert_eq!(states[0].push, Vec2Fixed::new(Fixed::from_num(-0.25), Fixed::ZERO));
        assert_eq!(states[1].push, Vec2Fixed::new(Fixed::from_num(0.25), Fixed::ZERO));
        assert_eq!(states[0].pressure, Fixed::ONE);
    }

    #[test]
    fn test_moving_unit_shoves_idle_unit() {
        let mut states = vec![state(1, 10, 10, true), state(2, 10, 11, false)];
        compute_pushes(&mut states, size(), size());
        assert_eq!(states[0].push, Vec2Fixed::ZERO);
        assert_eq!(states[1].push, Vec2Fixed::new(Fixed::ZERO, Fixed::from_num(0.5)));
    }

    #[test]
    fn test_non_pushing_units_are_ignored() {
        let mut states = vec![state(1, 10, 10, false), state(2, 10, 10, false)];
        states[1].pushing = false;
        compute_pushes(&mut states, size(), size());
        assert_eq!(states[0].push, Vec2Fixed::ZERO);
    }
}
