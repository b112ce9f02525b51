use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::utils::math::try_normalize;

/// Result of a narrow-phase test between shape A and shape B.
///
/// `p1` is the point of A reaching deepest into B and `p2` the matching point of B,
/// both in world space. The penetration depth is the distance between them.
/// [`Collision::NULL`] denotes "no collision".
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum Collision {
    #[default]
    Null,
    Hit {
        p1: Vec2,
        p2: Vec2,
    },
}

impl Collision {
    pub const NULL: Collision = Collision::Null;

    pub fn new(p1: Vec2, p2: Vec2) -> Self {
        Collision::Hit { p1, p2 }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Collision::Null)
    }

    pub fn is_hit(&self) -> bool {
        !self.is_null()
    }

    /// Swaps the roles of A and B. NULL stays NULL.
    pub fn inverse(self) -> Self {
        match self {
            Collision::Null => Collision::Null,
            Collision::Hit { p1, p2 } => Collision::Hit { p1: p2, p2: p1 },
        }
    }

    pub fn p1(&self) -> Option<Vec2> {
        match self {
            Collision::Null => None,
            Collision::Hit { p1, .. } => Some(*p1),
        }
    }

    pub fn p2(&self) -> Option<Vec2> {
        match self {
            Collision::Null => None,
            Collision::Hit { p2, .. } => Some(*p2),
        }
    }

    /// Euclidean distance between the two contact points, zero for NULL.
    pub fn penetration_depth(&self) -> f32 {
        match self {
            Collision::Null => 0.0,
            Collision::Hit { p1, p2 } => p1.distance(*p2),
        }
    }

    /// Unit direction from `p2` to `p1`, i.e. from A towards B.
    ///
    /// `None` for NULL and for touching hits whose points coincide.
    pub fn normal(&self) -> Option<Vec2> {
        match self {
            Collision::Null => None,
            Collision::Hit { p1, p2 } => try_normalize(*p1 - *p2),
        }
    }

    /// Midpoint between the two contact points.
    pub fn midpoint(&self) -> Option<Vec2> {
        match self {
            Collision::Null => None,
            Collision::Hit { p1, p2 } => Some((*p1 + *p2) * 0.5),
        }
    }

    /// Keeps whichever of the two collisions penetrates deeper; `self` wins ties.
    pub fn deepest(self, other: Collision) -> Collision {
        match (self.is_null(), other.is_null()) {
            (true, _) => other,
            (false, true) => self,
            (false, false) => {
                if other.penetration_depth() > self.penetration_depth() {
                    other
                } else {
                    self
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn inverting_null_is_null() {
        assert_eq!(Collision::NULL.inverse(), Collision::NULL);
        assert_eq!(Collision::NULL.penetration_depth(), 0.0);
        assert!(Collision::NULL.normal().is_none());
    }

    #[test]
    fn inverse_swaps_points_and_flips_normal() {
        let hit = Collision::new(Vec2::new(1.0, 0.0), Vec2::new(0.0, 0.0));
        let inv = hit.inverse();
        assert_eq!(inv.p1(), Some(Vec2::ZERO));
        assert_eq!(inv.p2(), Some(Vec2::X));
        assert_relative_eq!(inv.penetration_depth(), 1.0);
        assert_eq!(hit.normal(), Some(Vec2::X));
        assert_eq!(inv.normal(), Some(-Vec2::X));
        assert_eq!(inv.inverse(), hit);
    }

    #[test]
    fn deepest_prefers_first_on_ties() {
        let a = Collision::new(Vec2::ZERO, Vec2::X);
        let b = Collision::new(Vec2::Y, Vec2::new(1.0, 1.0));
        assert_eq!(a.deepest(b), a);
        assert_eq!(Collision::NULL.deepest(b), b);
    }
}
