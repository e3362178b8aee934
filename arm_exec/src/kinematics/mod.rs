//! # Kinematics module
//!
//! Translates a target end effector position into per-joint angles. The solving itself is done by
//! an [`InverseKinematicsSolver`], the [`KinematicsAdapter`] only converts the solver's radians
//! into the degrees the axes are commanded in.
//!
//! Positions are in the plane of the arm, with the base joint at the origin, in millimeters.
//! Joint angles are relative: the first is measured from the x axis, each following one from the
//! direction of the previous link.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod fabrik;
mod two_link;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{debug, warn};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use util::maths;

pub use fabrik::Fabrik2d;
pub use two_link::TwoLinkSolver;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Capability of solving the inverse kinematics of a planar serial chain.
pub trait InverseKinematicsSolver {
    /// Find joint angles placing the end of the chain at `target_mm`.
    ///
    /// A target out of reach is not an error, the closest pose found is returned with
    /// `reached == false`.
    fn solve(
        &mut self,
        target_mm: Point2<f64>,
        link_lengths_mm: &[f64],
    ) -> Result<IkSolution, IkError>;
}

impl<T> InverseKinematicsSolver for Box<T>
where
    T: InverseKinematicsSolver + ?Sized,
{
    fn solve(
        &mut self,
        target_mm: Point2<f64>,
        link_lengths_mm: &[f64],
    ) -> Result<IkSolution, IkError> {
        (**self).solve(target_mm, link_lengths_mm)
    }
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Output of an inverse kinematics solve.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IkSolution {
    /// Relative angle of each joint, in [-pi, pi].
    ///
    /// Units: radians
    pub angles_rad: Vec<f64>,

    /// Position of every joint, base first and end effector last (one more than there are links).
    ///
    /// Units: millimeters
    pub joints_mm: Vec<Point2<f64>>,

    /// Whether the end effector is within tolerance of the target.
    pub reached: bool,
}

/// Joint angles ready to be commanded to the axes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JointAngles {
    /// Relative angle of each joint, in [-180, 180].
    ///
    /// Units: degrees
    pub angles_deg: Vec<f64>,

    /// Position of every joint, base first and end effector last.
    ///
    /// Units: millimeters
    pub joints_mm: Vec<Point2<f64>>,

    /// Whether the solver reached the target. If not the angles may describe an arbitrary pose.
    pub reached: bool,
}

/// Adapts a solver's output to the units the axes are commanded in.
pub struct KinematicsAdapter<S> {
    solver: S,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Errors from malformed solve requests.
#[derive(Debug, thiserror::Error, PartialEq, Clone)]
pub enum IkError {
    #[error("At least one link is needed to solve")]
    NoLinks,

    #[error("Link lengths must be positive and finite, found {0}")]
    InvalidLinkLength(f64),

    #[error("The target position ({0}, {1}) is not finite")]
    NonFiniteTarget(f64, f64),

    #[error("This solver only handles chains of {expected} links, found {found}")]
    UnsupportedLinkCount { expected: usize, found: usize },
}

/// Available solvers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverKind {
    /// Forward And Backward Reaching Inverse Kinematics, any number of links.
    Fabrik,

    /// Closed form solution for exactly two links.
    TwoLink,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl IkSolution {
    /// Relative angle of a joint in radians.
    pub fn angle_rad(&self, joint: usize) -> Option<f64> {
        self.angles_rad.get(joint).copied()
    }

    /// Position of a joint, 0 being the base.
    pub fn joint(&self, joint: usize) -> Option<Point2<f64>> {
        self.joints_mm.get(joint).copied()
    }
}

impl JointAngles {
    pub fn angle_deg(&self, joint: usize) -> Option<f64> {
        self.angles_deg.get(joint).copied()
    }

    /// Position of a joint, 0 being the base.
    pub fn joint_location(&self, joint: usize) -> Option<Point2<f64>> {
        self.joints_mm.get(joint).copied()
    }
}

impl<S> KinematicsAdapter<S>
where
    S: InverseKinematicsSolver,
{
    pub fn new(solver: S) -> Self {
        Self { solver }
    }

    /// Solve for the joint angles placing the end effector at `(target_x_mm, target_y_mm)`.
    ///
    /// Reachability is the solver's business: an unreachable target is logged and whatever the
    /// solver produced is passed on.
    pub fn solve(
        &mut self,
        target_x_mm: f64,
        target_y_mm: f64,
        link_lengths_mm: &[f64],
    ) -> Result<JointAngles, IkError> {
        let solution = self
            .solver
            .solve(Point2::new(target_x_mm, target_y_mm), link_lengths_mm)?;

        if !solution.reached {
            warn!(
                "IK could not reach ({}, {}), closest end effector position is {:?}",
                target_x_mm,
                target_y_mm,
                solution.joints_mm.last()
            );
        }

        let angles_deg: Vec<f64> = solution
            .angles_rad
            .iter()
            .map(|a| maths::rad_to_deg(*a))
            .collect();

        debug!("IK solution: {:?} deg", angles_deg);

        Ok(JointAngles {
            angles_deg,
            joints_mm: solution.joints_mm,
            reached: solution.reached,
        })
    }
}

impl SolverKind {
    /// Build a solver of this kind.
    pub fn build(
        self,
        tolerance_mm: f64,
        max_iterations: usize,
    ) -> Box<dyn InverseKinematicsSolver> {
        match self {
            SolverKind::Fabrik => Box::new(Fabrik2d::new(tolerance_mm, max_iterations)),
            SolverKind::TwoLink => Box::new(TwoLinkSolver::new(tolerance_mm)),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Check the common preconditions of a solve request.
pub(crate) fn check_request(target_mm: &Point2<f64>, link_lengths_mm: &[f64]) -> Result<(), IkError> {
    if link_lengths_mm.is_empty() {
        return Err(IkError::NoLinks);
    }

    if let Some(l) = link_lengths_mm
        .iter()
        .find(|l| !(l.is_finite() && **l > 0.0))
    {
        return Err(IkError::InvalidLinkLength(*l));
    }

    if !(target_mm.x.is_finite() && target_mm.y.is_finite()) {
        return Err(IkError::NonFiniteTarget(target_mm.x, target_mm.y));
    }

    Ok(())
}

/// Relative joint angles of a chain given its joint positions.
pub(crate) fn relative_angles(joints_mm: &[Point2<f64>]) -> Vec<f64> {
    let mut prev_heading = 0.0;

    joints_mm
        .windows(2)
        .map(|w| {
            let link = w[1] - w[0];
            let heading = link.y.atan2(link.x);
            let angle = maths::wrap_pi(heading - prev_heading);
            prev_heading = heading;
            angle
        })
        .collect()
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
