//! Reward functions of the two environments.
//!
//! Both are sparse: the glimpse environment pays only for a correct
//! classification on the last step (plus a small per-step cost), the
//! localization environment only for reaching the goal object.

/// Computes rewards for the environments.
pub struct RewardComputer;

impl RewardComputer {
    /// Reward for a correct final classification.
    pub const CORRECT: f64 = 1.0;

    /// Reward for bringing the goal object under the window.
    pub const GOAL_REACHED: f64 = 1.0;

    /// Reward of one glimpse step.
    ///
    /// `+1` when the episode ends on this step and `predicted` equals
    /// `truth`; `-1 / max_steps` otherwise, including a wrong final guess.
    pub fn classification(done: bool, predicted: usize, truth: usize, max_steps: u32) -> f64 {
        if done && predicted == truth {
            Self::CORRECT
        } else {
            -1.0 / f64::from(max_steps.max(1))
        }
    }

    /// Reward of one localization step: `+1` on reaching the goal, else `0`.
    pub fn localization(goal_reached: bool) -> f64 {
        if goal_reached {
            Self::GOAL_REACHED
        } else {
            0.0
        }
    }
}
