//! Static configuration for the environments and the policy head.
//!
//! Every configuration struct has a `Default` matching the reference setup
//! (MNIST resized to 32×32, a 5-pixel window) and a `validate` method that
//! is called by the constructors, so an unusable configuration fails before
//! the first episode.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Configuration rejected at construction time.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Unknown dataset: {0}")]
    UnknownDataset(String),

    #[error("Invalid configuration: {field} {reason}")]
    Invalid {
        field: &'static str,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// The closed set of datasets the environments and feature extractors know
/// about.
///
/// The dataset decides the convolutional architecture of the policy and
/// whether an auxiliary classification head is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Dataset {
    Mnist,
    Cifar10,
    Cifar100,
    ImageNet,
    Cityscapes,
    /// Any other pixel source (84×84 frames); no classification head.
    Generic,
}

impl Dataset {
    /// Number of classes for image-classification datasets, `None` for
    /// datasets without labels.
    pub fn num_labels(&self) -> Option<usize> {
        match self {
            Dataset::Mnist | Dataset::Cifar10 => Some(10),
            Dataset::Cifar100 => Some(100),
            Dataset::ImageNet => Some(1000),
            Dataset::Cityscapes | Dataset::Generic => None,
        }
    }

    /// True for the datasets played through the glimpse environment, whose
    /// policy emits a classification alongside every movement.
    pub fn is_glimpse_dataset(&self) -> bool {
        self.num_labels().is_some()
    }

    /// Side length of the (square) images this dataset yields.
    pub fn image_size(&self) -> usize {
        match self {
            Dataset::Mnist | Dataset::Cifar10 | Dataset::Cifar100 => 32,
            Dataset::ImageNet => 224,
            Dataset::Cityscapes => 256,
            Dataset::Generic => 84,
        }
    }

    /// Per-channel normalization `(mean, std)` applied to raw `[0, 1]` pixels.
    pub fn normalization(&self) -> (&'static [f32], &'static [f32]) {
        match self {
            Dataset::Mnist => (&[0.1307], &[0.3081]),
            Dataset::ImageNet => (&[0.485, 0.456, 0.406], &[0.229, 0.224, 0.225]),
            _ => (&[0.5, 0.5, 0.5], &[0.5, 0.5, 0.5]),
        }
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Dataset::Mnist => "mnist",
            Dataset::Cifar10 => "cifar10",
            Dataset::Cifar100 => "cifar100",
            Dataset::ImageNet => "imagenet",
            Dataset::Cityscapes => "cityscapes",
            Dataset::Generic => "generic",
        };
        f.write_str(name)
    }
}

impl FromStr for Dataset {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mnist" => Ok(Dataset::Mnist),
            "cifar10" => Ok(Dataset::Cifar10),
            "cifar100" => Ok(Dataset::Cifar100),
            "imagenet" => Ok(Dataset::ImageNet),
            "cityscapes" => Ok(Dataset::Cityscapes),
            "generic" => Ok(Dataset::Generic),
            _ => Err(ConfigError::UnknownDataset(s.to_string())),
        }
    }
}

/// Configuration of the glimpse (windowed classification) environment.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GlimpseConfig {
    /// Dataset the images come from.
    pub dataset: Dataset,
    /// Image height and width in pixels.
    pub image_size: (usize, usize),
    /// Observation channels: the attention mask plus one per image plane.
    pub channels: usize,
    /// Side length of the square window, also the movement stride.
    pub window: usize,
    /// Steps per episode; the classification is scored on the last one.
    pub max_steps: u32,
    /// Labels `>= num_labels` are skipped during `reset`.
    pub num_labels: usize,
    /// Upper bound on samples pulled by one `reset` while skipping labels.
    pub max_resample_attempts: u32,
    /// Keep previously glimpsed patches visible after the window moves on.
    pub retain_visited: bool,
}

impl GlimpseConfig {
    /// Configuration for `dataset`: its image size, one observation plane
    /// per image plane plus the mask, and all of its classes.
    ///
    /// Datasets without labels get a single label.
    pub fn for_dataset(dataset: Dataset) -> Self {
        let side = dataset.image_size();
        Self {
            dataset,
            image_size: (side, side),
            channels: if dataset == Dataset::Mnist { 2 } else { 4 },
            window: 5,
            max_steps: 20,
            num_labels: dataset.num_labels().unwrap_or(1),
            max_resample_attempts: 1000,
            retain_visited: true,
        }
    }

    /// Observation shape `(channels, height, width)`.
    pub fn observation_shape(&self) -> [usize; 3] {
        [self.channels, self.image_size.0, self.image_size.1]
    }

    /// Per-step cost paid on every non-rewarded step.
    pub fn step_penalty(&self) -> f64 {
        -1.0 / f64::from(self.max_steps)
    }

    /// Checks that the configuration describes a playable environment.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let (h, w) = self.image_size;
        if self.channels < 2 {
            return Err(ConfigError::invalid(
                "channels",
                format!("must be at least 2, got {}", self.channels),
            ));
        }
        if self.window == 0 || self.window > h.min(w) {
            return Err(ConfigError::invalid(
                "window",
                format!("must be in 1..={}, got {}", h.min(w), self.window),
            ));
        }
        if self.max_steps == 0 {
            return Err(ConfigError::invalid("max_steps", "must be positive"));
        }
        if self.num_labels == 0 {
            return Err(ConfigError::invalid("num_labels", "must be positive"));
        }
        if let Some(available) = self.dataset.num_labels() {
            if self.num_labels > available {
                return Err(ConfigError::invalid(
                    "num_labels",
                    format!("{} exceeds the {} classes of {}", self.num_labels, available, self.dataset),
                ));
            }
        }
        if self.max_resample_attempts == 0 {
            return Err(ConfigError::invalid(
                "max_resample_attempts",
                "must be positive",
            ));
        }
        Ok(())
    }
}

impl Default for GlimpseConfig {
    fn default() -> Self {
        Self::for_dataset(Dataset::Mnist)
    }
}

/// Configuration of the object localization environment.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LocalizationConfig {
    /// Image height and width in pixels.
    pub image_size: (usize, usize),
    /// Observation channels: the attention mask plus one per image plane.
    pub channels: usize,
    /// Side length of the square window.
    pub window: usize,
    /// Pixels moved per action.
    pub stride: usize,
    /// Steps before an unsuccessful episode is cut off.
    pub max_steps: u32,
    /// Upper bound on samples drawn by one `reset` looking for a goal.
    pub max_goal_attempts: u32,
}

impl LocalizationConfig {
    /// Observation shape `(channels, height, width)`.
    pub fn observation_shape(&self) -> [usize; 3] {
        [self.channels, self.image_size.0, self.image_size.1]
    }

    /// Checks that the configuration describes a playable environment.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let (h, w) = self.image_size;
        if self.channels < 2 {
            return Err(ConfigError::invalid(
                "channels",
                format!("must be at least 2, got {}", self.channels),
            ));
        }
        if self.window == 0 || self.window > h.min(w) {
            return Err(ConfigError::invalid(
                "window",
                format!("must be in 1..={}, got {}", h.min(w), self.window),
            ));
        }
        if self.stride == 0 {
            return Err(ConfigError::invalid("stride", "must be positive"));
        }
        if self.max_steps == 0 {
            return Err(ConfigError::invalid("max_steps", "must be positive"));
        }
        if self.max_goal_attempts == 0 {
            return Err(ConfigError::invalid("max_goal_attempts", "must be positive"));
        }
        Ok(())
    }
}

impl Default for LocalizationConfig {
    fn default() -> Self {
        Self {
            image_size: (256, 256),
            channels: 4,
            window: 10,
            stride: 10,
            max_steps: 200,
            max_goal_attempts: 100,
        }
    }
}

/// Kind and size of the policy's movement action space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ActionSpace {
    /// `n` mutually exclusive actions, sampled from a categorical.
    Discrete(usize),
    /// A real vector of the given dimension, sampled from a diagonal Gaussian.
    Continuous(usize),
}

impl ActionSpace {
    /// Number of action columns this space occupies in an action row.
    pub fn columns(&self) -> usize {
        match self {
            ActionSpace::Discrete(_) => 1,
            ActionSpace::Continuous(dim) => *dim,
        }
    }
}

/// Configuration of a [`PolicyHead`](crate::policy::PolicyHead).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PolicyConfig {
    /// Shape of one observation: `[C, H, W]` for images, `[D]` for vectors.
    pub observation_shape: Vec<usize>,
    /// Movement action space.
    pub action_space: ActionSpace,
    /// Dataset, selecting the convolutional backbone.
    pub dataset: Dataset,
    /// Classes of the auxiliary classification head; `None` for no head.
    pub num_labels: Option<usize>,
    /// Width of the feature vector (and of the recurrent state).
    pub hidden_size: usize,
}

impl PolicyConfig {
    /// Policy configuration matching a glimpse environment; the
    /// classification head covers exactly the environment's label subset.
    pub fn for_glimpse(env: &GlimpseConfig) -> Self {
        Self {
            observation_shape: env.observation_shape().to_vec(),
            action_space: ActionSpace::Discrete(crate::types::Movement::COUNT),
            dataset: env.dataset,
            num_labels: Some(env.num_labels),
            hidden_size: 512,
        }
    }

    /// Policy configuration matching a localization environment.
    pub fn for_localization(env: &LocalizationConfig) -> Self {
        Self {
            observation_shape: env.observation_shape().to_vec(),
            action_space: ActionSpace::Discrete(crate::types::Movement::COUNT),
            dataset: Dataset::Cityscapes,
            num_labels: None,
            hidden_size: 512,
        }
    }

    /// Checks the classification head against the dataset's classes.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hidden_size == 0 {
            return Err(ConfigError::invalid("hidden_size", "must be positive"));
        }
        let Some(labels) = self.num_labels else {
            return Ok(());
        };
        match self.dataset.num_labels() {
            _ if labels == 0 => Err(ConfigError::invalid("num_labels", "must be positive")),
            None => Err(ConfigError::invalid(
                "num_labels",
                format!("{} has no classes", self.dataset),
            )),
            Some(available) if labels > available => Err(ConfigError::invalid(
                "num_labels",
                format!("{labels} exceeds the {available} classes of {}", self.dataset),
            )),
            Some(_) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_glimpse_config_is_valid() {
        let cfg = GlimpseConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.observation_shape(), [2, 32, 32]);
        assert!((cfg.step_penalty() + 0.05).abs() < 1e-12);
    }

    #[test]
    fn default_localization_config_is_valid() {
        assert!(LocalizationConfig::default().validate().is_ok());
    }

    #[test]
    fn window_larger_than_image_rejected() {
        let cfg = GlimpseConfig {
            window: 33,
            ..GlimpseConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Invalid { field: "window", .. })
        ));
    }

    #[test]
    fn num_labels_bounded_by_dataset() {
        let cfg = GlimpseConfig {
            num_labels: 11,
            ..GlimpseConfig::default()
        };
        assert!(cfg.validate().is_err());
        let cfg = GlimpseConfig {
            dataset: Dataset::Cifar100,
            num_labels: 50,
            channels: 4,
            ..GlimpseConfig::default()
        };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn dataset_parses_case_insensitively() {
        assert_eq!("CIFAR10".parse::<Dataset>().unwrap(), Dataset::Cifar10);
        assert_eq!(Dataset::Cifar100.to_string(), "cifar100");
        assert!(matches!(
            "svhn".parse::<Dataset>(),
            Err(ConfigError::UnknownDataset(_))
        ));
    }

    #[test]
    fn classification_datasets() {
        assert!(Dataset::Mnist.is_glimpse_dataset());
        assert_eq!(Dataset::Cifar100.num_labels(), Some(100));
        assert!(!Dataset::Cityscapes.is_glimpse_dataset());
    }

    #[test]
    fn for_dataset_uses_dataset_image_size() {
        let cfg = GlimpseConfig::for_dataset(Dataset::ImageNet);
        assert_eq!(cfg.image_size, (224, 224));
        assert_eq!(cfg.observation_shape(), [4, 224, 224]);
        assert_eq!(cfg.num_labels, 1000);
        assert!(cfg.validate().is_ok());
        assert_eq!(GlimpseConfig::default(), GlimpseConfig::for_dataset(Dataset::Mnist));
    }

    #[test]
    fn policy_labels_follow_the_environment_subset() {
        let env = GlimpseConfig {
            num_labels: 2,
            ..GlimpseConfig::default()
        };
        let cfg = PolicyConfig::for_glimpse(&env);
        assert_eq!(cfg.num_labels, Some(2));
        assert!(cfg.validate().is_ok());
        assert_eq!(PolicyConfig::for_localization(&LocalizationConfig::default()).num_labels, None);
    }

    #[test]
    fn policy_labels_bounded_by_dataset() {
        let mut cfg = PolicyConfig::for_glimpse(&GlimpseConfig::default());
        cfg.num_labels = Some(11);
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Invalid { field: "num_labels", .. })
        ));
        cfg.num_labels = Some(0);
        assert!(cfg.validate().is_err());
        cfg.dataset = Dataset::Generic;
        cfg.num_labels = Some(3);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn action_space_columns() {
        assert_eq!(ActionSpace::Discrete(4).columns(), 1);
        assert_eq!(ActionSpace::Continuous(3).columns(), 3);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn glimpse_config_from_json() {
        let json = r#"{
            "dataset": "cifar10",
            "image_size": [32, 32],
            "channels": 4,
            "window": 8,
            "max_steps": 12,
            "num_labels": 10,
            "max_resample_attempts": 50,
            "retain_visited": false
        }"#;
        let cfg: GlimpseConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.dataset, Dataset::Cifar10);
        assert_eq!(cfg.window, 8);
        assert!(cfg.validate().is_ok());
    }
}
