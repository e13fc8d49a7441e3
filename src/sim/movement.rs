//! Waypoint movement integration.
//!
//! Headings are quantized into 16 sectors of 22.5° each, measured with
//! `atan2` from the +x axis and normalized into `[0, 16)`.

use crate::sim::mob::{Mob, MovementType, Point};

/// Number of heading sectors
pub const DIRECTION_SECTORS: u8 = 16;

/// Width of one heading sector in degrees
pub const SECTOR_DEGREES: f32 = 360.0 / DIRECTION_SECTORS as f32;

/// Quantize the heading of the vector `(dx, dy)` into a sector in `[0, 16)`.
pub fn direction_sector(dx: f32, dy: f32) -> u8 {
    let mut degrees = dy.atan2(dx).to_degrees();
    if degrees < 0.0 {
        degrees += 360.0;
    }
    sector_for_degrees(degrees)
}

/// Quantize an angle in degrees into a sector in `[0, 16)`.
pub fn sector_for_degrees(degrees: f32) -> u8 {
    let sector = (degrees.rem_euclid(360.0) / SECTOR_DEGREES).floor();
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs
    (sector as u8) % DIRECTION_SECTORS
}

/// Unit vector pointing at the centre-line of a heading sector.
pub fn sector_heading(direction: u8) -> Point {
    let radians = (f32::from(direction % DIRECTION_SECTORS) * SECTOR_DEGREES).to_radians();
    Point::new(radians.cos(), radians.sin())
}

/// Move `mob` along its waypoint queue for `seconds` of simulated time.
///
/// Reaching a waypoint snaps the mob onto it exactly and pops it, so float
/// error never accumulates across a path. When the queue drains the mob
/// stops.
pub fn advance(mob: &mut Mob, seconds: f32) {
    if mob.waypoints.is_empty() {
        return;
    }

    let mut travel = seconds * mob.movement_speed;

    while travel > 0.0 {
        let Some(&target) = mob.waypoints.front() else {
            break;
        };

        if mob.position == target {
            mob.waypoints.pop_front();
            continue;
        }

        let dx = target.x - mob.position.x;
        let dy = target.y - mob.position.y;
        mob.direction = direction_sector(dx, dy);

        let distance = (dx * dx + dy * dy).sqrt();

        if travel >= distance {
            mob.position = target;
            mob.waypoints.pop_front();
            travel -= distance;
            continue;
        }

        mob.position.x += travel * dx / distance;
        mob.position.y += travel * dy / distance;
        travel = 0.0;
    }

    if mob.waypoints.is_empty() {
        mob.movement_type = MovementType::Stopped;
    }
}

/// Move `mob` straight along its stored heading for `seconds`.
pub fn integrate_heading(mob: &mut Mob, seconds: f32) {
    let heading = sector_heading(mob.direction);
    let distance = seconds * mob.movement_speed;
    mob.position.x += heading.x * distance;
    mob.position.y += heading.y * distance;
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::sim::mob::MobId;

    fn walker(position: Point, speed: f32, waypoints: &[Point]) -> Mob {
        let mut mob = Mob::new(MobId::new(1).unwrap(), "walker", position);
        mob.movement_speed = speed;
        mob.movement_type = MovementType::Walking;
        mob.waypoints.extend(waypoints.iter().copied());
        mob
    }

    #[test]
    fn test_reaches_single_waypoint_exactly() {
        let mut mob = walker(Point::new(0.0, 0.0), 5.0, &[Point::new(10.0, 0.0)]);
        advance(&mut mob, 2.0);
        assert_eq!(mob.position, Point::new(10.0, 0.0));
        assert!(mob.waypoints.is_empty());
        assert_eq!(mob.movement_type, MovementType::Stopped);
    }

    #[test]
    fn test_partial_progress_keeps_waypoint() {
        let mut mob = walker(Point::new(0.0, 0.0), 5.0, &[Point::new(10.0, 0.0)]);
        advance(&mut mob, 1.0);
        assert_eq!(mob.position, Point::new(5.0, 0.0));
        assert_eq!(mob.waypoints.len(), 1);
        assert_eq!(mob.movement_type, MovementType::Walking);
        assert_eq!(mob.direction, 0);
    }

    #[test]
    fn test_travel_carries_through_corners() {
        let path = [Point::new(3.0, 0.0), Point::new(3.0, 4.0)];
        let mut mob = walker(Point::new(0.0, 0.0), 1.0, &path);
        advance(&mut mob, 5.0);
        assert_eq!(mob.position, Point::new(3.0, 2.0));
        assert_eq!(mob.waypoints.len(), 1);
        // straight up the y axis: 90°
        assert_eq!(mob.direction, 4);
    }

    #[test]
    fn test_excess_travel_never_overshoots() {
        let path = [Point::new(1.0, 1.0), Point::new(-2.5, 7.25)];
        let mut mob = walker(Point::new(0.0, 0.0), 100.0, &path);
        advance(&mut mob, 10.0);
        assert_eq!(mob.position, Point::new(-2.5, 7.25));
        assert!(mob.waypoints.is_empty());
        assert_eq!(mob.movement_type, MovementType::Stopped);
    }

    #[test]
    fn test_waypoint_under_mob_is_discarded() {
        let mut mob = walker(Point::new(2.0, 2.0), 1.0, &[Point::new(2.0, 2.0)]);
        advance(&mut mob, 0.5);
        assert!(mob.waypoints.is_empty());
        assert_eq!(mob.movement_type, MovementType::Stopped);
    }

    #[test]
    fn test_empty_queue_is_noop() {
        let mut mob = walker(Point::new(1.0, 1.0), 3.0, &[]);
        advance(&mut mob, 1.0);
        assert_eq!(mob.position, Point::new(1.0, 1.0));
        // untouched: the integrator only stops mobs whose queue it drained
        assert_eq!(mob.movement_type, MovementType::Walking);
    }

    #[test]
    fn test_sector_bounds() {
        assert_eq!(sector_for_degrees(0.0), 0);
        assert_eq!(sector_for_degrees(22.4), 0);
        assert_eq!(sector_for_degrees(22.5), 1);
        assert_eq!(sector_for_degrees(180.0), 8);
        assert_eq!(sector_for_degrees(359.999), 15);
        assert_eq!(sector_for_degrees(360.0), 0);
        assert_eq!(sector_for_degrees(-0.01), 15);
        assert!(sector_for_degrees(-1e-9) < DIRECTION_SECTORS);
    }

    #[test]
    fn test_direction_from_vector() {
        assert_eq!(direction_sector(1.0, 0.0), 0);
        assert_eq!(direction_sector(0.0, 1.0), 4);
        assert_eq!(direction_sector(-1.0, 0.0), 8);
        assert_eq!(direction_sector(0.0, -1.0), 12);
        // just below the +x axis wraps into the last sector
        assert_eq!(direction_sector(1.0, -1e-4), 15);
    }

    #[test]
    fn test_heading_integration() {
        let mut mob = walker(Point::new(0.0, 0.0), 2.0, &[]);
        mob.direction = 4;
        integrate_heading(&mut mob, 1.5);
        assert!(mob.position.x.abs() < 1e-5);
        assert!((mob.position.y - 3.0).abs() < 1e-5);
    }
}
