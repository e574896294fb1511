//! Glimpse environment: classify an image seen through a moving window.
//!
//! The agent starts near the image centre and sees only a `window × window`
//! patch. Each step it moves the window by one window length and states a
//! label; after `max_steps` steps the last label is scored.

use rand::Rng;
use tracing::{debug, trace, warn};

use super::observation::{check_image_shape, ObservationBuilder, UNSEEN};
use super::reward::RewardComputer;
use super::{EnvError, Environment, Observation, StepResult};
use crate::config::GlimpseConfig;
use crate::data::{DataSource, Image};
use crate::types::{GlimpseAction, Movement, Position};

/// Per-episode state of a [`GlimpseEnv`].
#[derive(Debug, Clone)]
struct Episode {
    image: Image,
    label: usize,
    position: Position,
    num_steps: u32,
    observation: Observation,
    done: bool,
}

/// The glimpse (windowed classification) environment.
///
/// # Example
///
/// ```
/// use rand::{rngs::StdRng, SeedableRng};
/// use saccade::config::GlimpseConfig;
/// use saccade::data::{synthetic, InMemorySource};
/// use saccade::env::{Environment, GlimpseEnv};
/// use saccade::types::GlimpseAction;
///
/// let mut rng = StdRng::seed_from_u64(0);
/// let config = GlimpseConfig { max_steps: 3, ..GlimpseConfig::default() };
/// let samples = synthetic::labelled_blocks(8, (32, 32), 1, 10, &mut rng);
/// let mut env = GlimpseEnv::new(config, InMemorySource::new(samples)?)?;
///
/// env.reset(&mut rng)?;
/// let mut result = env.step(GlimpseAction::new(3, 0))?;
/// while !result.done {
///     result = env.step(GlimpseAction::new(1, 0))?;
/// }
/// assert_eq!(result.time_step, 3);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct GlimpseEnv<S> {
    config: GlimpseConfig,
    source: S,
    episode: Option<Episode>,
    closed: bool,
}

impl<S> GlimpseEnv<S>
where
    S: DataSource<Target = usize>,
{
    /// Creates a new environment over `source`.
    ///
    /// # Errors
    ///
    /// Returns [`EnvError::Config`] if the configuration is invalid.
    pub fn new(config: GlimpseConfig, source: S) -> Result<Self, EnvError> {
        config.validate()?;
        Ok(Self {
            config,
            source,
            episode: None,
            closed: false,
        })
    }

    /// The environment configuration.
    pub fn config(&self) -> &GlimpseConfig {
        &self.config
    }

    /// Current window position, if an episode has started.
    pub fn position(&self) -> Option<Position> {
        self.episode.as_ref().map(|e| e.position)
    }

    /// Steps taken in the current episode.
    pub fn num_steps(&self) -> u32 {
        self.episode.as_ref().map_or(0, |e| e.num_steps)
    }

    /// True label of the current image.
    pub fn label(&self) -> Option<usize> {
        self.episode.as_ref().map(|e| e.label)
    }

    /// Initial window position for an image of `height × width`.
    ///
    /// The window's top-left corner sits one window length above and left of
    /// the centre, saturating at the image border.
    pub fn start_position(&self, height: usize, width: usize) -> Position {
        let window = self.config.window;
        Position::new(
            (height / 2).saturating_sub(window),
            (width / 2).saturating_sub(window),
        )
        .clamped(height, width, window)
    }

    /// Pulls samples until one has a label below `num_labels`.
    fn draw_sample<R: Rng>(&mut self, rng: &mut R) -> Result<(Image, usize), EnvError> {
        let attempts = self.config.max_resample_attempts;
        for attempt in 1..=attempts {
            let sample = self.source.next_sample(rng)?;
            if sample.target < self.config.num_labels {
                return Ok((sample.image, sample.target));
            }
            trace!(
                attempt,
                label = sample.target,
                "skipping sample outside the label subset"
            );
        }
        warn!(
            attempts,
            num_labels = self.config.num_labels,
            "resample cap reached"
        );
        Err(EnvError::ResampleExhausted {
            attempts,
            num_labels: self.config.num_labels,
        })
    }

    fn check_action(&self, action: GlimpseAction) -> Result<Movement, EnvError> {
        let movement = Movement::try_from(action.movement)?;
        if action.label >= self.config.num_labels {
            return Err(EnvError::InvalidAction {
                kind: "label",
                index: action.label,
                limit: self.config.num_labels,
            });
        }
        Ok(movement)
    }
}

impl<S> Environment for GlimpseEnv<S>
where
    S: DataSource<Target = usize>,
{
    type Action = GlimpseAction;

    fn observation_shape(&self) -> [usize; 3] {
        self.config.observation_shape()
    }

    fn reset<R: Rng>(&mut self, rng: &mut R) -> Result<Observation, EnvError> {
        if self.closed {
            return Err(EnvError::Closed);
        }
        let (image, label) = self.draw_sample(rng)?;
        let [channels, height, width] = self.config.observation_shape();
        check_image_shape(&image, channels - 1, height, width)?;

        let window = self.config.window;
        let position = self.start_position(height, width);
        let mut state = ObservationBuilder::blank(channels, height, width, UNSEEN);
        ObservationBuilder::draw_window(&mut state, position, window);
        ObservationBuilder::reveal(&mut state, &image, position, window);
        let observation = Observation::new(state);

        debug!(label, %position, "glimpse episode reset");
        self.episode = Some(Episode {
            image,
            label,
            position,
            num_steps: 0,
            observation: observation.clone(),
            done: false,
        });
        Ok(observation)
    }

    fn step(&mut self, action: GlimpseAction) -> Result<StepResult, EnvError> {
        if self.closed {
            return Err(EnvError::Closed);
        }
        let movement = self.check_action(action)?;
        let config = &self.config;
        let episode = self.episode.as_mut().ok_or(EnvError::NotReset)?;
        if episode.done {
            return Err(EnvError::EpisodeFinished);
        }

        let (height, width) = config.image_size;
        episode
            .position
            .apply(movement, config.window, height, width, config.window);

        let state = episode.observation.data_mut();
        if !config.retain_visited {
            ObservationBuilder::hide_content(state);
        }
        ObservationBuilder::draw_window(state, episode.position, config.window);
        ObservationBuilder::reveal(state, &episode.image, episode.position, config.window);

        episode.num_steps += 1;
        episode.done = episode.num_steps >= config.max_steps;
        let reward = RewardComputer::classification(
            episode.done,
            action.label,
            episode.label,
            config.max_steps,
        );
        trace!(%movement, position = %episode.position, step = episode.num_steps, "glimpse step");
        if episode.done {
            debug!(
                predicted = action.label,
                label = episode.label,
                reward,
                "glimpse episode finished"
            );
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{InMemorySource, Sample};
    use ndarray::Array3;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn gradient_image() -> Image {
        Array3::from_shape_fn((1, 32, 32), |(_, r, c)| (r * 32 + c) as f32 / 1024.0)
    }

    fn make_env(max_steps: u32, labels: &[usize]) -> GlimpseEnv<InMemorySource<usize>> {
        let samples = labels
            .iter()
            .map(|&l| Sample::new(gradient_image(), l))
            .collect();
        let config = GlimpseConfig {
            max_steps,
            ..GlimpseConfig::default()
        };
        GlimpseEnv::new(config, InMemorySource::new(samples).unwrap()).unwrap()
    }

    #[test]
    fn reset_starts_centered() {
        let mut env = make_env(10, &[4]);
        let mut rng = StdRng::seed_from_u64(0);
        let obs = env.reset(&mut rng).unwrap();
        assert_eq!(env.position(), Some(Position::new(11, 11)));
        assert_eq!(obs.shape(), [2, 32, 32]);
        assert_eq!(obs.visible_pixels(), 25);
        assert_eq!(env.num_steps(), 0);
    }

    #[test]
    fn reset_reveals_only_the_window() {
        let mut env = make_env(10, &[4]);
        let mut rng = StdRng::seed_from_u64(0);
        let obs = env.reset(&mut rng).unwrap();
        let data = obs.data();
        assert_eq!(data[[1, 11, 11]], (11 * 32 + 11) as f32 / 1024.0);
        assert_eq!(data[[1, 0, 0]], UNSEEN);
        assert_eq!(data[[1, 16, 16]], UNSEEN);
    }

    #[test]
    fn moving_right_clamps_at_the_border() {
        let mut env = make_env(10, &[0]);
        let mut rng = StdRng::seed_from_u64(0);
        env.reset(&mut rng).unwrap();
        for _ in 0..5 {
            env.step(GlimpseAction::new(Movement::Right.index(), 0))
                .unwrap();
        }
        assert_eq!(env.position(), Some(Position::new(11, 27)));
    }

    #[test]
    fn window_stays_in_bounds_for_every_direction() {
        let mut env = make_env(40, &[0]);
        let mut rng = StdRng::seed_from_u64(9);
        env.reset(&mut rng).unwrap();
        for _ in 0..40 {
            let m = rng.gen_range(0..4);
            let result = env.step(GlimpseAction::new(m, 0)).unwrap();
            let p = env.position().unwrap();
            assert!(p.row <= 27 && p.col <= 27);
            assert_eq!(result.observation.visible_pixels(), 25);
        }
    }

    #[test]
    fn terminates_after_exactly_max_steps() {
        let mut env = make_env(4, &[2]);
        let mut rng = StdRng::seed_from_u64(1);
        env.reset(&mut rng).unwrap();
        for t in 1..=4 {
            let result = env.step(GlimpseAction::new(t % 4, 0)).unwrap();
            assert_eq!(result.done, t == 4);
            assert_eq!(result.time_step, t as u32);
        }
        assert_eq!(
            env.step(GlimpseAction::new(0, 0)).unwrap_err(),
            EnvError::EpisodeFinished
        );
    }

    #[test]
    fn reward_only_for_final_correct_label() {
        let mut env = make_env(3, &[2]);
        let mut rng = StdRng::seed_from_u64(1);
        env.reset(&mut rng).unwrap();
        let r1 = env.step(GlimpseAction::new(0, 2)).unwrap().reward;
        let r2 = env.step(GlimpseAction::new(0, 2)).unwrap().reward;
        let r3 = env.step(GlimpseAction::new(0, 2)).unwrap().reward;
        assert!((r1 + 1.0 / 3.0).abs() < 1e-12);
        assert!((r2 + 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(r3, 1.0);

        env.reset(&mut rng).unwrap();
        env.step(GlimpseAction::new(0, 1)).unwrap();
        env.step(GlimpseAction::new(0, 1)).unwrap();
        let last = env.step(GlimpseAction::new(0, 1)).unwrap();
        assert!(last.done);
        assert!((last.reward + 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn visited_patches_stay_revealed() {
        let mut env = make_env(5, &[0]);
        let mut rng = StdRng::seed_from_u64(0);
        env.reset(&mut rng).unwrap();
        let obs = env.step(GlimpseAction::new(Movement::Down.index(), 0))
            .unwrap()
            .observation;
        // previous window at (11, 11) is still visible in the content channel
        assert_ne!(obs.data()[[1, 11, 11]], UNSEEN);
        assert_eq!(obs.attention_mask()[[11, 11]], 0.0);
        assert_eq!(obs.attention_mask()[[16, 11]], 1.0);
    }

    #[test]
    fn visited_patches_hidden_when_not_retained() {
        let samples = vec![Sample::new(gradient_image(), 0)];
        let config = GlimpseConfig {
            retain_visited: false,
            ..GlimpseConfig::default()
        };
        let mut env = GlimpseEnv::new(config, InMemorySource::new(samples).unwrap()).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        env.reset(&mut rng).unwrap();
        let obs = env.step(GlimpseAction::new(Movement::Down.index(), 0))
            .unwrap()
            .observation;
        assert_eq!(obs.data()[[1, 11, 11]], UNSEEN);
        assert_ne!(obs.data()[[1, 16, 11]], UNSEEN);
    }

    #[test]
    fn invalid_movement_is_rejected() {
        let mut env = make_env(5, &[0]);
        let mut rng = StdRng::seed_from_u64(0);
        env.reset(&mut rng).unwrap();
        let err = env.step(GlimpseAction::new(4, 0)).unwrap_err();
        assert!(matches!(err, EnvError::InvalidAction { kind: "movement", .. }));
        // rejected actions do not consume a step
        assert_eq!(env.num_steps(), 0);
    }

    #[test]
    fn invalid_label_is_rejected() {
        let mut env = make_env(5, &[0]);
        let mut rng = StdRng::seed_from_u64(0);
        env.reset(&mut rng).unwrap();
        let err = env.step(GlimpseAction::new(0, 10)).unwrap_err();
        assert!(matches!(err, EnvError::InvalidAction { kind: "label", .. }));
    }

    #[test]
    fn labels_outside_subset_are_resampled() {
        let samples = vec![
            Sample::new(gradient_image(), 7),
            Sample::new(gradient_image(), 1),
        ];
        let config = GlimpseConfig {
            num_labels: 2,
            ..GlimpseConfig::default()
        };
        let mut env = GlimpseEnv::new(config, InMemorySource::new(samples).unwrap()).unwrap();
        let mut rng = StdRng::seed_from_u64(4);
        for _ in 0..10 {
            env.reset(&mut rng).unwrap();
            assert_eq!(env.label(), Some(1));
        }
    }

    #[test]
    fn resampling_is_capped() {
        let samples = vec![Sample::new(gradient_image(), 9)];
        let config = GlimpseConfig {
            num_labels: 2,
            max_resample_attempts: 5,
            ..GlimpseConfig::default()
        };
        let mut env = GlimpseEnv::new(config, InMemorySource::new(samples).unwrap()).unwrap();
        let mut rng = StdRng::seed_from_u64(4);
        assert_eq!(
            env.reset(&mut rng).unwrap_err(),
            EnvError::ResampleExhausted {
                attempts: 5,
                num_labels: 2
            }
        );
    }

    #[test]
    fn mismatched_image_is_rejected() {
        let samples = vec![Sample::new(Array3::zeros((3, 32, 32)), 0)];
        let mut env =
            GlimpseEnv::new(GlimpseConfig::default(), InMemorySource::new(samples).unwrap())
                .unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        assert!(matches!(
            env.reset(&mut rng),
            Err(EnvError::ImageShape { .. })
        ));
    }

    #[test]
    fn lifecycle_errors() {
        let mut env = make_env(5, &[0]);
        assert_eq!(
            env.step(GlimpseAction::new(0, 0)).unwrap_err(),
            EnvError::NotReset
        );
        assert_eq!(env.current_obs().unwrap_err(), EnvError::NotReset);

        let mut rng = StdRng::seed_from_u64(0);
        let obs = env.reset(&mut rng).unwrap();
        assert_eq!(env.current_obs().unwrap(), &obs);

        env.close();
        assert_eq!(env.reset(&mut rng).unwrap_err(), EnvError::Closed);
        assert_eq!(
            env.step(GlimpseAction::new(0, 0)).unwrap_err(),
            EnvError::Closed
        );
    }

    #[test]
    fn small_image_start_saturates_at_zero() {
        let samples = vec![Sample::new(Array3::zeros((1, 8, 8)), 0)];
        let config = GlimpseConfig {
            image_size: (8, 8),
            window: 6,
            ..GlimpseConfig::default()
        };
        let mut env = GlimpseEnv::new(config, InMemorySource::new(samples).unwrap()).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        env.reset(&mut rng).unwrap();
        assert_eq!(env.position(), Some(Position::new(0, 0)));
    }
}
