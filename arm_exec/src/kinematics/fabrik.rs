//! FABRIK solver for planar chains
//!
//! Forward And Backward Reaching Inverse Kinematics (Aristidou & Lasenby, 2011). Each iteration
//! drags the end of the chain onto the target and walks back to the base fixing up link lengths,
//! then pins the base back at the origin and walks out again. Converges in a handful of
//! iterations for reachable targets and never produces undefined angles for unreachable ones.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::trace;
use nalgebra::Point2;

use super::{check_request, relative_angles, IkError, IkSolution, InverseKinematicsSolver};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Allowed mismatch between a stored link and the requested link length before the chain is
/// rebuilt.
const LINK_LENGTH_EPS_MM: f64 = 1e-6;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// FABRIK solver.
///
/// The pose from the previous solve seeds the next one, so consecutive targets give consistent
/// elbow configurations. The first pose is the chain pointing straight up the y axis.
#[derive(Debug, Clone)]
pub struct Fabrik2d {
    tolerance_mm: f64,
    max_iterations: usize,
    joints_mm: Vec<Point2<f64>>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Fabrik2d {
    pub fn new(tolerance_mm: f64, max_iterations: usize) -> Self {
        Self {
            tolerance_mm,
            max_iterations,
            joints_mm: Vec::new(),
        }
    }

    /// Make sure the stored chain matches the requested links, rebuilding it straight up if not.
    fn prepare_chain(&mut self, link_lengths_mm: &[f64]) {
        let matches = self.joints_mm.len() == link_lengths_mm.len() + 1
            && self
                .joints_mm
                .windows(2)
                .zip(link_lengths_mm)
                .all(|(w, l)| ((w[1] - w[0]).norm() - l).abs() < LINK_LENGTH_EPS_MM);

        if matches {
            return;
        }

        let mut y = 0.0;
        self.joints_mm.clear();
        self.joints_mm.push(Point2::origin());
        for l in link_lengths_mm {
            y += l;
            self.joints_mm.push(Point2::new(0.0, y));
        }
    }

    /// Place `joints[to]` on the line from `joints[from]` through its current position, at `length`
    /// from `joints[from]`.
    fn place(&mut self, from: usize, to: usize, length: f64) {
        let (anchor, free) = (self.joints_mm[from], self.joints_mm[to]);
        let r = (free - anchor).norm();

        // Coincident joints give no direction to follow, leave the joint where it is
        if r <= f64::EPSILON {
            return;
        }

        self.joints_mm[to] = anchor + (free - anchor) * (length / r);
    }

    fn end_error(&self, target_mm: &Point2<f64>) -> f64 {
        match self.joints_mm.last() {
            Some(end) => (end - target_mm).norm(),
            None => f64::INFINITY,
        }
    }
}

impl InverseKinematicsSolver for Fabrik2d {
    fn solve(
        &mut self,
        target_mm: Point2<f64>,
        link_lengths_mm: &[f64],
    ) -> Result<IkSolution, IkError> {
        check_request(&target_mm, link_lengths_mm)?;
        self.prepare_chain(link_lengths_mm);

        let num_links = link_lengths_mm.len();
        let base = self.joints_mm[0];
        let reach: f64 = link_lengths_mm.iter().sum();

        if (target_mm - base).norm() > reach {
            // Out of reach, stretch the chain straight towards the target
            for (i, l) in link_lengths_mm.iter().enumerate() {
                self.joints_mm[i + 1] = target_mm;
                self.place(i, i + 1, *l);
            }
        } else {
            let mut iterations = 0;

            while self.end_error(&target_mm) > self.tolerance_mm && iterations < self.max_iterations
            {
                // Forward reaching, end effector onto the target
                self.joints_mm[num_links] = target_mm;
                for i in (0..num_links).rev() {
                    self.place(i + 1, i, link_lengths_mm[i]);
                }

                // Backward reaching, base back onto its anchor
                self.joints_mm[0] = base;
                for i in 0..num_links {
                    self.place(i, i + 1, link_lengths_mm[i]);
                }

                iterations += 1;
            }

            trace!(
                "FABRIK finished after {} iterations, error {} mm",
                iterations,
                self.end_error(&target_mm)
            );
        }

        Ok(IkSolution {
            angles_rad: relative_angles(&self.joints_mm),
            joints_mm: self.joints_mm.clone(),
            reached: self.end_error(&target_mm) <= self.tolerance_mm,
        })
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
