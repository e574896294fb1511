//! Actor-critic policy head.
//!
//! A [`PolicyHead`] chains a feature extractor, a [`Memory`], a movement
//! distribution, a value estimate and, when the config asks for labels, a
//! label distribution whose sample is appended as the last action column.

use ndarray::{concatenate, s, Array1, Array2, Axis};
use rand::Rng;
use tracing::debug;

use super::distribution::{column_indices, index_column, ActionHead, CategoricalHead};
use super::features::{BackboneKind, ConvBase, FeatureExtractor, MlpTower, MLP_HIDDEN};
use super::memory::{Memory, Recurrent, Stateless};
use super::PolicyError;
use crate::config::PolicyConfig;
use crate::nn::{Linear, ShapeError};

/// Value estimate attached to the head.
#[derive(Debug, Clone)]
enum Critic {
    /// Linear layer over the (post-memory) features.
    Features(Linear),
    /// Separate tower over the raw inputs, for flat observations.
    Tower { tower: MlpTower, out: Linear },
}

impl Critic {
    fn value(&self, inputs: &Array2<f32>, features: &Array2<f32>) -> Result<Array1<f32>, PolicyError> {
        let v = match self {
            Critic::Features(linear) => linear.forward(features)?,
            Critic::Tower { tower, out } => out.forward(&tower.forward(inputs)?)?,
        };
        Ok(v.column(0).to_owned())
    }
}

/// Output of [`PolicyHead::act`].
#[derive(Debug, Clone, PartialEq)]
pub struct ActOutput<S> {
    /// Value estimate per row.
    pub value: Array1<f32>,
    /// Action matrix: movement columns, then the label column if any.
    pub action: Array2<f32>,
    /// Joint log-probability of each action row.
    pub log_prob: Array1<f32>,
    /// Memory state after this call.
    pub state: S,
}

/// Output of [`PolicyHead::evaluate_actions`].
#[derive(Debug, Clone, PartialEq)]
pub struct ActionEvaluation<S> {
    pub value: Array1<f32>,
    pub log_prob: Array1<f32>,
    /// Mean entropy over the batch, classification included.
    pub entropy: f32,
    pub state: S,
}

/// The policy network.
pub struct PolicyHead<M: Memory> {
    config: PolicyConfig,
    extractor: Box<dyn FeatureExtractor>,
    memory: M,
    critic: Critic,
    action_head: ActionHead,
    classifier: Option<CategoricalHead>,
}

impl<M: Memory> PolicyHead<M> {
    /// Builds a head with the CPU backbone selected by the observation
    /// rank: a dataset conv stack for `[C, H, W]`, tanh MLPs for `[D]`.
    ///
    /// # Errors
    ///
    /// - [`PolicyError::UnsupportedObservationShape`] for other ranks.
    /// - [`PolicyError::RecurrentMlp`] for a recurrent head over `[D]`.
    /// - [`PolicyError::InputTooSmall`] if the conv stack does not fit.
    /// - [`PolicyError::EmptyActionSpace`].
    /// - [`PolicyError::Config`] if `num_labels` exceeds the dataset's classes.
    pub fn new<R: Rng>(config: PolicyConfig, rng: &mut R) -> Result<Self, PolicyError> {
        let kind = BackboneKind::resolve(&config)?;
        match kind {
            BackboneKind::Conv { dataset, shape } => {
                let base = ConvBase::new(dataset, shape, config.hidden_size, rng)?;
                Self::with_extractor(config, Box::new(base), rng)
            }
            BackboneKind::Mlp { input_dim } => {
                let memory = M::build(MLP_HIDDEN, &kind, rng)?;
                let actor = MlpTower::new(input_dim, rng);
                let critic = Critic::Tower {
                    tower: MlpTower::new(input_dim, rng),
                    out: Linear::new(actor.output_size(), 1, rng),
                };
                Self::assemble(config, Box::new(actor), memory, critic, rng)
            }
        }
    }

    /// Builds a head around an externally supplied image backbone; the
    /// value is read from the post-memory features.
    pub fn with_extractor<R: Rng>(
        config: PolicyConfig,
        extractor: Box<dyn FeatureExtractor>,
        rng: &mut R,
    ) -> Result<Self, PolicyError> {
        let kind = BackboneKind::resolve(&config)?;
        let size = extractor.output_size();
        let memory = M::build(size, &kind, rng)?;
        let critic = Critic::Features(Linear::new(size, 1, rng));
        Self::assemble(config, extractor, memory, critic, rng)
    }

    fn assemble<R: Rng>(
        config: PolicyConfig,
        extractor: Box<dyn FeatureExtractor>,
        memory: M,
        critic: Critic,
        rng: &mut R,
    ) -> Result<Self, PolicyError> {
        config.validate()?;
        let size = extractor.output_size();
        let action_head = ActionHead::new(size, config.action_space, rng)?;
        let classifier = config
            .num_labels
            .map(|labels| CategoricalHead::new(size, labels, rng));
        debug!(
            features = size,
            state_size = memory.state_size(),
            classifier = classifier.is_some(),
            "built policy head"
        );
        Ok(Self {
            config,
            extractor,
            memory,
            critic,
            action_head,
            classifier,
        })
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    /// Width of one environment's memory state; 0 for [`Stateless`].
    pub fn state_size(&self) -> usize {
        self.memory.state_size()
    }

    pub fn initial_state(&self, batch: usize) -> M::State {
        self.memory.initial_state(batch)
    }

    /// Whether actions carry a trailing classification column.
    pub fn classifies(&self) -> bool {
        self.classifier.is_some()
    }

    /// Number of columns of an action row.
    pub fn action_columns(&self) -> usize {
        self.config.action_space.columns() + usize::from(self.classifies())
    }

    fn base(
        &self,
        inputs: &Array2<f32>,
        state: &M::State,
        masks: &Array1<f32>,
    ) -> Result<(Array1<f32>, Array2<f32>, M::State), PolicyError> {
        let features = self.extractor.forward(inputs)?;
        let (features, state) = self.memory.update(features, state, masks)?;
        let value = self.critic.value(inputs, &features)?;
        Ok((value, features, state))
    }

    /// Chooses actions for a batch of flattened observations.
    ///
    /// `deterministic` takes each distribution's mode instead of sampling.
    pub fn act<R: Rng + ?Sized>(
        &self,
        inputs: &Array2<f32>,
        state: &M::State,
        masks: &Array1<f32>,
        deterministic: bool,
        rng: &mut R,
    ) -> Result<ActOutput<M::State>, PolicyError> {
        let (value, features, state) = self.base(inputs, state, masks)?;

        let dist = self.action_head.forward(&features)?;
        let mut action = if deterministic {
            dist.mode()
        } else {
            dist.sample(rng)?
        };
        let mut log_prob = dist.log_probs(action.view())?;

        if let Some(classifier) = &self.classifier {
            let labels_dist = classifier.forward(&features)?;
            let labels = if deterministic {
                labels_dist.mode()
            } else {
                labels_dist.sample(rng)?
            };
            log_prob += &labels_dist.log_probs(labels.view())?;
            let label_column = index_column(&labels);
            action = concatenate(Axis(1), &[action.view(), label_column.view()]).map_err(|_| {
                ShapeError::Batch {
                    layer: "label column",
                    inputs: label_column.nrows(),
                    states: action.nrows(),
                }
            })?;
        }

        Ok(ActOutput {
            value,
            action,
            log_prob,
            state,
        })
    }

    /// Value estimates only; `state` is left as it was.
    pub fn get_value(
        &self,
        inputs: &Array2<f32>,
        state: &M::State,
        masks: &Array1<f32>,
    ) -> Result<Array1<f32>, PolicyError> {
        self.base(inputs, state, masks).map(|(value, _, _)| value)
    }

    /// Log-probabilities and entropy of previously taken `actions`.
    ///
    /// # Errors
    ///
    /// [`PolicyError::ActionColumns`] if `actions` does not have
    /// [`Self::action_columns`] columns.
    pub fn evaluate_actions(
        &self,
        inputs: &Array2<f32>,
        state: &M::State,
        masks: &Array1<f32>,
        actions: &Array2<f32>,
    ) -> Result<ActionEvaluation<M::State>, PolicyError> {
        let expected = self.action_columns();
        if actions.ncols() != expected {
            return Err(PolicyError::ActionColumns {
                expected,
                actual: actions.ncols(),
            });
        }
        let (value, features, state) = self.base(inputs, state, masks)?;

        let movement_cols = self.config.action_space.columns();
        let dist = self.action_head.forward(&features)?;
        let mut log_prob = dist.log_probs(actions.slice(s![.., ..movement_cols]))?;
        let mut entropy = dist.entropy().mean().unwrap_or(0.0);

        if let Some(classifier) = &self.classifier {
            let labels_dist = classifier.forward(&features)?;
            let labels = column_indices(actions.column(expected - 1))?;
            log_prob += &labels_dist.log_probs(labels.view())?;
            entropy += labels_dist.entropy().mean().unwrap_or(0.0);
        }

        Ok(ActionEvaluation {
            value,
            log_prob,
            entropy,
            state,
        })
    }
}

impl PolicyHead<Stateless> {
    /// Feed-forward head.
    pub fn stateless<R: Rng>(config: PolicyConfig, rng: &mut R) -> Result<Self, PolicyError> {
        Self::new(config, rng)
    }
}

impl PolicyHead<Recurrent> {
    /// GRU head; image observations only.
    pub fn recurrent<R: Rng>(config: PolicyConfig, rng: &mut R) -> Result<Self, PolicyError> {
        Self::new(config, rng)
    }
}

impl<M: Memory> std::fmt::Debug for PolicyHead<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyHead")
            .field("config", &self.config)
            .field("features", &self.extractor.output_size())
            .field("state_size", &self.memory.state_size())
            .field("classifies", &self.classifies())
            .finish()
    }
}
