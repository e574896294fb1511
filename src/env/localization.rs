//! Object localization environment: steer the window onto a goal object.
//!
//! Unlike the glimpse environment the whole image is visible; only the
//! attention mask tells the agent where its window is. Each episode picks a
//! goal object id from the segmentation mask, and the episode succeeds as
//! soon as any pixel of that object lies under the window.

use std::collections::BTreeSet;

use ndarray::s;
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, trace, warn};

use super::observation::{check_image_shape, ObservationBuilder};
use super::reward::RewardComputer;
use super::{EnvError, Environment, Observation, StepResult};
use crate::config::LocalizationConfig;
use crate::data::{DataSource, SegmentationMask};
use crate::types::{Movement, Position};

#[derive(Debug, Clone)]
struct Episode {
    mask: SegmentationMask,
    goal: u32,
    position: Position,
    num_steps: u32,
    observation: Observation,
    done: bool,
}

/// The object localization environment.
///
/// Actions are raw movement indices; anything outside `0..4` is rejected.
#[derive(Debug)]
pub struct LocalizationEnv<S> {
    config: LocalizationConfig,
    source: S,
    episode: Option<Episode>,
    closed: bool,
}

impl<S> LocalizationEnv<S>
where
    S: DataSource<Target = SegmentationMask>,
{
    /// Creates a new environment over `source`.
    pub fn new(config: LocalizationConfig, source: S) -> Result<Self, EnvError> {
        config.validate()?;
        Ok(Self {
            config,
            source,
            episode: None,
            closed: false,
        })
    }

    pub fn config(&self) -> &LocalizationConfig {
        &self.config
    }

    /// Current window position, if an episode has started.
    pub fn position(&self) -> Option<Position> {
        self.episode.as_ref().map(|e| e.position)
    }

    /// Object id the agent has to find.
    pub fn goal(&self) -> Option<u32> {
        self.episode.as_ref().map(|e| e.goal)
    }

    pub fn num_steps(&self) -> u32 {
        self.episode.as_ref().map_or(0, |e| e.num_steps)
    }

    /// True if `goal` occurs anywhere in the window footprint at `position`.
    pub fn goal_in_window(
        mask: &SegmentationMask,
        position: Position,
        window: usize,
        goal: u32,
    ) -> bool {
        mask.slice(s![
            position.row..position.row + window,
            position.col..position.col + window
        ])
        .iter()
        .any(|&id| id == goal)
    }
}

impl<S> Environment for LocalizationEnv<S>
where
    S: DataSource<Target = SegmentationMask>,
{
    type Action = usize;

    fn observation_shape(&self) -> [usize; 3] {
        self.config.observation_shape()
    }

    fn reset<R: Rng>(&mut self, rng: &mut R) -> Result<Observation, EnvError> {
        if self.closed {
            return Err(EnvError::Closed);
        }
        let [channels, height, width] = self.config.observation_shape();
        let window = self.config.window;
        let attempts = self.config.max_goal_attempts;

        for attempt in 1..=attempts {
            let sample = self.source.next_sample(rng)?;
            check_image_shape(&sample.image, channels - 1, height, width)?;
            if sample.target.dim() != (height, width) {
                let (mh, mw) = sample.target.dim();
                return Err(EnvError::ImageShape {
                    expected: vec![height, width],
                    actual: vec![mh, mw],
                });
            }

            let position = Position::new(height / 2, width / 2).clamped(height, width, window);
            let under_window = sample.target[[position.row, position.col]];
            let candidates: Vec<u32> = sample
                .target
                .iter()
                .copied()
                .filter(|&id| id != under_window)
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            let Some(&goal) = candidates.choose(rng) else {
                trace!(attempt, "no goal candidate besides the starting object");
                continue;
            };

            let mut state = ObservationBuilder::blank(channels, height, width, 0.0);
            ObservationBuilder::reveal_all(&mut state, &sample.image);
            ObservationBuilder::draw_window(&mut state, position, window);
            let observation = Observation::new(state);

            debug!(goal, %position, candidates = candidates.len(), "localization episode reset");
            self.episode = Some(Episode {
                mask: sample.target,
                goal,
                position,
                num_steps: 0,
                observation: observation.clone(),
                done: false,
            });
            return Ok(observation);
        }

        warn!(attempts, "goal selection cap reached");
        Err(EnvError::NoGoalObject { attempts })
    }

    fn step(&mut self, action: usize) -> Result<StepResult, EnvError> {
        if self.closed {
            return Err(EnvError::Closed);
        }
        let movement = Movement::try_from(action)?;
        let config = &self.config;
        let episode = self.episode.as_mut().ok_or(EnvError::NotReset)?;
        if episode.done {
            return Err(EnvError::EpisodeFinished);
        }

        let (height, width) = config.image_size;
        episode
            .position
            .apply(movement, config.stride, height, width, config.window);
        ObservationBuilder::draw_window(
            episode.observation.data_mut(),
            episode.position,
            config.window,
        );
        episode.num_steps += 1;

        let reached =
            Self::goal_in_window(&episode.mask, episode.position, config.window, episode.goal);
        episode.done = reached || episode.num_steps >= config.max_steps;
        let reward = RewardComputer::localization(reached);
        if episode.done {
            debug!(reached, steps = episode.num_steps, "localization episode finished");
        }

        Ok(StepResult {
            observation: episode.observation.clone(),
            reward,
            done: episode.done,
            time_step: episode.num_steps,
        })
    }

    fn current_obs(&self) -> Result<&Observation, EnvError> {
        self.episode
            .as_ref()
            .map(|e| &e.observation)
            .ok_or(EnvError::NotReset)
    }

    fn close(&mut self) {
        self.closed = true;
        self.episode = None;
    }
}
