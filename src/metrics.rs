//! Evaluation metrics for the image environments.
//!
//! Runs a policy for a number of episodes and aggregates per-episode
//! statistics.

use std::fmt;

use rand::Rng;
use tracing::info;

use crate::env::Environment;
use crate::policy::{Policy, PolicyError};

/// Aggregated evaluation metrics over multiple episodes.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationMetrics {
    /// Mean cumulative reward per episode.
    pub mean_reward: f64,
    /// Fraction of episodes whose final step paid a positive reward
    /// (correct classification, or goal reached).
    pub success_rate: f64,
    /// Mean number of steps per episode.
    pub mean_episode_length: f64,
    /// Number of episodes evaluated.
    pub n_episodes: usize,
}

/// Tracks per-episode statistics during evaluation.
#[derive(Debug, Default)]
struct EpisodeStats {
    cumulative_reward: f64,
    steps: u32,
    success: bool,
}

impl EvaluationMetrics {
    /// Evaluates a policy over multiple episodes and returns aggregated metrics.
    ///
    /// # Arguments
    ///
    /// * `env` - The environment to evaluate in
    /// * `policy` - The policy to evaluate
    /// * `n_episodes` - Number of episodes to run
    /// * `rng` - Source of randomness for resets and the policy
    pub fn evaluate<E, P, R>(
        env: &mut E,
        policy: &mut P,
        n_episodes: usize,
        rng: &mut R,
    ) -> Result<Self, PolicyError>
    where
        E: Environment,
        P: Policy<E::Action> + ?Sized,
        R: Rng,
    {
        let mut all_stats = Vec::with_capacity(n_episodes);

        for _ in 0..n_episodes {
            let mut obs = env.reset(rng)?;
            policy.begin_episode();
            let mut stats = EpisodeStats::default();

            loop {
                let action = policy.select_action(&obs, rng)?;
                let result = env.step(action)?;
                stats.cumulative_reward += result.reward;
                stats.steps = result.time_step;
                obs = result.observation;

                if result.done {
                    stats.success = result.reward > 0.0;
                    break;
                }
            }

            all_stats.push(stats);
        }

        let metrics = Self::aggregate(&all_stats);
        info!(
            policy = policy.name(),
            episodes = metrics.n_episodes,
            mean_reward = metrics.mean_reward,
            success_rate = metrics.success_rate,
            "evaluation finished"
        );
        Ok(metrics)
    }

    fn aggregate(all_stats: &[EpisodeStats]) -> Self {
        let n_episodes = all_stats.len();
        if n_episodes == 0 {
            return Self {
                mean_reward: 0.0,
                success_rate: 0.0,
                mean_episode_length: 0.0,
                n_episodes,
            };
        }
        let n = n_episodes as f64;
        let mean_reward = all_stats.iter().map(|s| s.cumulative_reward).sum::<f64>() / n;
        let success_rate = all_stats.iter().filter(|s| s.success).count() as f64 / n;
        let mean_episode_length = all_stats.iter().map(|s| s.steps as f64).sum::<f64>() / n;
        Self {
            mean_reward,
            success_rate,
            mean_episode_length,
            n_episodes,
        }
    }
}

impl fmt::Display for EvaluationMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "=== Evaluation Metrics ({} episodes) ===",
            self.n_episodes
        )?;
        writeln!(f, "  Mean reward:          {:.3}", self.mean_reward)?;
        writeln!(
            f,
            "  Success rate:         {:.1}%",
            self.success_rate * 100.0
        )?;
        write!(
            f,
            "  Mean episode length:  {:.1}",
            self.mean_episode_length
        )
    }
}
