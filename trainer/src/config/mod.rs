//! The configuration store: hyperparameters, model shape and dataset section, resolved once
//! at startup and read-only afterwards.

mod args;
mod dataset;

use std::path::PathBuf;

use machine_learning::arch::SegNetConfig;

pub use args::TrainArgs;
pub use dataset::DatasetConfig;

use crate::{Result, TrainErr};

/// The hyperparameters the training driver runs with.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainConfig {
    pub batch_size: usize,
    pub num_epochs: usize,
    pub learning_rate: f32,
    pub momentum: f32,
    pub power: f32,
    pub weight_decay: f32,
    /// Checkpoint cadence in steps.
    pub save_pred_every: usize,
    pub snapshot_dir: PathBuf,
    pub max_to_keep: usize,
    pub restore_from: Option<PathBuf>,
    /// Accepted for compatibility, prediction images are not rendered.
    pub save_num_images: usize,
    pub inspect_every: Option<usize>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            batch_size: 7,
            num_epochs: 10,
            learning_rate: 1e-5,
            momentum: 0.9,
            power: 0.9,
            weight_decay: 2.5e-4,
            save_pred_every: 1000,
            snapshot_dir: PathBuf::from("snapshots/"),
            max_to_keep: 2,
            restore_from: None,
            save_num_images: 2,
            inspect_every: None,
        }
    }
}

impl TrainConfig {
    /// Checks every hyperparameter is within its range.
    pub fn validate(&self) -> Result<()> {
        let checks = [
            (self.batch_size > 0, "batch size must be positive"),
            (self.num_epochs > 0, "the number of epochs must be positive"),
            (
                self.learning_rate.is_finite() && self.learning_rate > 0.,
                "learning rate must be positive",
            ),
            (
                (0.0..1.0).contains(&self.momentum),
                "momentum must be within [0, 1)",
            ),
            (
                self.power > 0. && self.power <= 1.,
                "power must be within (0, 1]",
            ),
            (
                self.weight_decay.is_finite() && self.weight_decay >= 0.,
                "weight decay can't be negative",
            ),
            (self.save_pred_every > 0, "checkpoint cadence must be positive"),
            (self.max_to_keep > 0, "must keep at least one checkpoint"),
            (
                self.inspect_every != Some(0),
                "inspection cadence must be positive",
            ),
        ];

        match checks.iter().find(|(ok, _)| !ok) {
            Some((_, msg)) => Err(TrainErr::InvalidConfig(msg.to_string())),
            None => Ok(()),
        }
    }
}

/// Everything the `train` binary needs, frozen after `Config::resolve`.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub train: TrainConfig,
    pub model: SegNetConfig,
    pub dataset: DatasetConfig,
    pub input_size: (usize, usize),
    pub random_scale: bool,
    pub threads: Option<usize>,
    pub seed: u64,
}

impl Config {
    /// Builds the configuration from the defaults, the optional dataset file and the command
    /// line flags, in that order.
    ///
    /// # Arguments
    /// * `args` - The parsed command line.
    ///
    /// # Returns
    /// The resolved configuration or an error if any value is invalid or the dataset is missing.
    pub fn resolve(args: TrainArgs) -> Result<Self> {
        let dataset = match &args.config {
            Some(path) => DatasetConfig::from_file(path)?,
            None => DatasetConfig::default(),
        };
        dataset.validate()?;
        let input_size = dataset.input_size()?;

        let train = TrainConfig {
            batch_size: args.batch_size,
            num_epochs: args.num_epochs,
            learning_rate: args.learning_rate,
            momentum: args.momentum,
            power: args.power,
            weight_decay: args.weight_decay,
            save_pred_every: args.save_pred_every,
            snapshot_dir: args.snapshot_dir,
            max_to_keep: args.max_to_keep,
            restore_from: args.restore_from,
            save_num_images: args.save_num_images,
            inspect_every: args.inspect_every,
        };
        train.validate()?;

        if args.threads == Some(0) {
            return Err(TrainErr::InvalidConfig(
                "thread count must be positive".to_string(),
            ));
        }

        let model = SegNetConfig {
            in_channels: dataset.channels(),
            hidden_channels: args.hidden_channels,
            residual_blocks: args.residual_blocks,
            output_stride: args.output_stride,
            training: args.is_training,
            ..Default::default()
        };

        if model.hidden_channels == 0 || model.output_stride == 0 {
            return Err(TrainErr::InvalidConfig(
                "hidden channels and output stride must be positive".to_string(),
            ));
        }

        Ok(Self {
            train,
            model,
            dataset,
            input_size,
            random_scale: args.random_scale,
            threads: args.threads,
            seed: args.seed,
        })
    }
}
