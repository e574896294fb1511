//! # saccade
//!
//! Runs a policy on one of the image environments over synthetic data and
//! prints the evaluation metrics. Log verbosity follows `RUST_LOG`.

use anyhow::{ensure, Context, Result};
use clap::{Parser, ValueEnum};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;
use tracing_subscriber::EnvFilter;

use saccade::config::{Dataset, GlimpseConfig, LocalizationConfig, PolicyConfig};
use saccade::data::{synthetic, InMemorySource, Normalized};
use saccade::env::{Environment, GlimpseEnv, LocalizationEnv};
use saccade::metrics::EvaluationMetrics;
use saccade::policy::{Memory, NeuralAgent, Policy, PolicyHead, RandomPolicy, Recurrent, Stateless};
use saccade::types::FromActionRow;

#[derive(Parser)]
#[command(name = "saccade")]
#[command(version, about = "Window-based attention environments with actor-critic policies")]
struct Cli {
    /// Environment to run
    #[arg(long, default_value = "glimpse")]
    env: EnvKind,

    /// Policy to evaluate
    #[arg(long, default_value = "random")]
    policy: PolicyKind,

    /// Classification dataset layout for the glimpse environment
    #[arg(long, default_value = "mnist")]
    dataset: Dataset,

    /// Number of evaluation episodes
    #[arg(long, default_value = "10")]
    episodes: usize,

    /// Seed for data generation, resets and sampling
    #[arg(long, default_value = "0")]
    seed: u64,

    /// Override the episode step budget
    #[arg(long)]
    max_steps: Option<u32>,

    /// Override the window side length (also the localization stride)
    #[arg(long)]
    window: Option<usize>,

    /// Give the neural policy GRU memory
    #[arg(long)]
    recurrent: bool,

    /// Number of synthetic samples to draw episodes from
    #[arg(long, default_value = "64")]
    samples: usize,

    /// Run the convolutional backbone on libtorch
    #[cfg(feature = "rl-nn")]
    #[arg(long)]
    tch: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum EnvKind {
    /// Classify an image seen through a moving window
    Glimpse,
    /// Steer the window onto a goal object
    Localize,
}

#[derive(Clone, Copy, ValueEnum)]
enum PolicyKind {
    /// Uniformly random actions
    Random,
    /// Untrained actor-critic network
    Neural,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut rng = StdRng::seed_from_u64(cli.seed);
    let metrics = match cli.env {
        EnvKind::Glimpse => run_glimpse(&cli, &mut rng)?,
        EnvKind::Localize => run_localization(&cli, &mut rng)?,
    };
    println!("{metrics}");
    Ok(())
}

fn run_glimpse(cli: &Cli, rng: &mut StdRng) -> Result<EvaluationMetrics> {
    let dataset = cli.dataset;
    ensure!(
        dataset.is_glimpse_dataset(),
        "{dataset} has no classification labels"
    );
    let mut config = GlimpseConfig::for_dataset(dataset);
    if let Some(window) = cli.window {
        config.window = window;
    }
    if let Some(max_steps) = cli.max_steps {
        config.max_steps = max_steps;
    }

    let samples = synthetic::labelled_blocks(
        cli.samples,
        config.image_size,
        config.channels - 1,
        config.num_labels,
        rng,
    );
    let source = Normalized::for_dataset(InMemorySource::new(samples)?, dataset);
    let mut env =
        GlimpseEnv::new(config.clone(), source).context("building glimpse environment")?;
    info!(%dataset, size = ?config.image_size, window = config.window, max_steps = config.max_steps, "glimpse environment ready");

    let policy_config = PolicyConfig::for_glimpse(&config);
    evaluate(cli, &mut env, policy_config, config.num_labels, rng)
}

fn run_localization(cli: &Cli, rng: &mut StdRng) -> Result<EvaluationMetrics> {
    let mut config = LocalizationConfig::default();
    if let Some(window) = cli.window {
        config.window = window;
        config.stride = window;
    }
    if let Some(max_steps) = cli.max_steps {
        config.max_steps = max_steps;
    }

    let scenes = synthetic::segmented_scenes(cli.samples, config.image_size, config.channels - 1, 4, rng);
    let source = Normalized::for_dataset(InMemorySource::new(scenes)?, Dataset::Cityscapes);
    let mut env = LocalizationEnv::new(config.clone(), source)
        .context("building localization environment")?;
    info!(window = config.window, stride = config.stride, max_steps = config.max_steps, "localization environment ready");

    let policy_config = PolicyConfig::for_localization(&config);
    evaluate(cli, &mut env, policy_config, 0, rng)
}

fn evaluate<E>(
    cli: &Cli,
    env: &mut E,
    policy_config: PolicyConfig,
    num_labels: usize,
    rng: &mut StdRng,
) -> Result<EvaluationMetrics>
where
    E: Environment,
    E::Action: FromActionRow,
    RandomPolicy: Policy<E::Action>,
{
    let mut policy: Box<dyn Policy<E::Action>> = match cli.policy {
        PolicyKind::Random => Box::new(RandomPolicy::new(num_labels)),
        PolicyKind::Neural if cli.recurrent => {
            Box::new(NeuralAgent::new(build_head::<Recurrent>(cli, policy_config, rng)?))
        }
        PolicyKind::Neural => {
            Box::new(NeuralAgent::new(build_head::<Stateless>(cli, policy_config, rng)?))
        }
    };
    info!(policy = policy.name(), episodes = cli.episodes, seed = cli.seed, "evaluating");
    Ok(EvaluationMetrics::evaluate(
        env,
        policy.as_mut(),
        cli.episodes,
        rng,
    )?)
}

#[cfg_attr(not(feature = "rl-nn"), allow(unused_variables))]
fn build_head<M: Memory>(
    cli: &Cli,
    config: PolicyConfig,
    rng: &mut StdRng,
) -> Result<PolicyHead<M>> {
    #[cfg(feature = "rl-nn")]
    {
        use saccade::policy::{BackboneKind, TchConvBase};

        if cli.tch {
            if let BackboneKind::Conv { dataset, shape } = BackboneKind::resolve(&config)? {
                let device = tch::Device::cuda_if_available();
                let base = TchConvBase::new(dataset, shape, config.hidden_size, device)?;
                info!(?device, "using libtorch backbone");
                return Ok(PolicyHead::with_extractor(config, Box::new(base), rng)?);
            }
        }
    }
    Ok(PolicyHead::new(config, rng)?)
}
