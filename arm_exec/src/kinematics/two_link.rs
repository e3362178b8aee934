//! Closed form inverse kinematics for a two link arm

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::debug;
use nalgebra::{Point2, Vector2};
use std::f64::consts::FRAC_PI_2;

use super::{check_request, relative_angles, IkError, IkSolution, InverseKinematicsSolver};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Law of cosines solver for a shoulder/elbow pair of links.
///
/// Of the two elbow solutions the one whose shoulder angle is closest to the previous solution's
/// is picked, so the arm does not flip between elbow-up and elbow-down on consecutive targets.
/// Targets out of reach are pulled onto the reachable annulus.
#[derive(Debug, Clone)]
pub struct TwoLinkSolver {
    tolerance_mm: f64,

    /// Shoulder angle of the last solution
    prev_shoulder_rad: f64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl TwoLinkSolver {
    pub fn new(tolerance_mm: f64) -> Self {
        Self {
            tolerance_mm,
            prev_shoulder_rad: FRAC_PI_2,
        }
    }
}

impl InverseKinematicsSolver for TwoLinkSolver {
    fn solve(
        &mut self,
        target_mm: Point2<f64>,
        link_lengths_mm: &[f64],
    ) -> Result<IkSolution, IkError> {
        check_request(&target_mm, link_lengths_mm)?;

        let (shoulder_len, elbow_len) = match link_lengths_mm {
            [s, e] => (*s, *e),
            _ => {
                return Err(IkError::UnsupportedLinkCount {
                    expected: 2,
                    found: link_lengths_mm.len(),
                })
            }
        };

        let max_distance_mm = shoulder_len + elbow_len;
        let min_distance_mm = (shoulder_len - elbow_len).abs();

        // Limit target distance to be within range of arm
        let mut head = target_mm.coords;
        let distance = head.norm();
        if distance < f64::EPSILON {
            // No direction to reach in, fold along the x axis
            head = Vector2::new(min_distance_mm, 0.0);
        } else if distance > max_distance_mm {
            head *= max_distance_mm / distance;
        } else if distance < min_distance_mm {
            head *= min_distance_mm / distance;
        }
        let distance = head.norm();

        let cos_elbow = ((distance.powi(2) - shoulder_len.powi(2) - elbow_len.powi(2))
            / (2.0 * shoulder_len * elbow_len))
            .max(-1.0)
            .min(1.0);
        let elbow_mag = cos_elbow.acos();

        let heading = head.y.atan2(head.x);
        let shoulder_for = |elbow: f64| {
            heading - (elbow_len * elbow.sin()).atan2(shoulder_len + elbow_len * elbow.cos())
        };

        let (shoulder, elbow) = [elbow_mag, -elbow_mag]
            .iter()
            .map(|e| (shoulder_for(*e), *e))
            .fold(None, |best: Option<(f64, f64)>, cand| {
                let dist = |s: f64| (s - self.prev_shoulder_rad).abs();
                match best {
                    Some(b) if dist(b.0) <= dist(cand.0) => Some(b),
                    _ => Some(cand),
                }
            })
            .unwrap_or((heading, 0.0));

        self.prev_shoulder_rad = shoulder;

        let elbow_pos = Point2::new(shoulder_len * shoulder.cos(), shoulder_len * shoulder.sin());
        let end_pos = elbow_pos
            + Vector2::new(
                elbow_len * (shoulder + elbow).cos(),
                elbow_len * (shoulder + elbow).sin(),
            );
        let joints_mm = vec![Point2::origin(), elbow_pos, end_pos];

        debug!("Two link solution: shoulder {} rad, elbow {} rad", shoulder, elbow);

        Ok(IkSolution {
            angles_rad: relative_angles(&joints_mm),
            reached: (end_pos - target_mm).norm() <= self.tolerance_mm,
            joints_mm,
        })
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::kinematics::test::forward;

    #[test]
    fn test_exact_solution() {
        let mut solver = TwoLinkSolver::new(0.5);
        let links = [150.0, 150.0];

        for &(x, y) in &[(100.0, 100.0), (200.0, 200.0), (0.0, 300.0), (-50.0, 20.0)] {
            let solution = solver.solve(Point2::new(x, y), &links).unwrap();

            assert!(solution.reached);
            assert!((forward(&solution.angles_rad, &links) - Point2::new(x, y)).norm() < 1e-6);
        }
    }

    #[test]
    fn test_keeps_elbow_side() {
        let mut solver = TwoLinkSolver::new(0.5);
        let links = [150.0, 150.0];

        let first = solver.solve(Point2::new(100.0, 100.0), &links).unwrap();
        let second = solver.solve(Point2::new(110.0, 100.0), &links).unwrap();

        // A small move does not flip the elbow
        assert_eq!(first.angles_rad[1].signum(), second.angles_rad[1].signum());
        assert!((first.angles_rad[0] - second.angles_rad[0]).abs() < 0.2);
    }

    #[test]
    fn test_unreachable_clamped() {
        let mut solver = TwoLinkSolver::new(0.5);

        let far = solver.solve(Point2::new(0.0, 500.0), &[150.0, 150.0]).unwrap();
        assert!(!far.reached);
        assert!((far.joints_mm[2] - Point2::new(0.0, 300.0)).norm() < 1e-6);

        let near = solver.solve(Point2::new(10.0, 0.0), &[150.0, 100.0]).unwrap();
        assert!(!near.reached);
        assert!((near.joints_mm[2].coords.norm() - 50.0).abs() < 1e-6);
    }

    #[test]
    fn test_link_count() {
        let mut solver = TwoLinkSolver::new(0.5);
        assert_eq!(
            solver.solve(Point2::new(1.0, 1.0), &[1.0, 1.0, 1.0]),
            Err(IkError::UnsupportedLinkCount {
                expected: 2,
                found: 3
            })
        );
    }
}
