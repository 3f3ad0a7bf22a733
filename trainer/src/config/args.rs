use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "train", about = "Interactive segmentation network training")]
pub struct TrainArgs {
    /// Number of images sent to the network in one step.
    #[arg(long, default_value_t = 7)]
    pub batch_size: usize,
    /// Whether to update the running means and variances during training.
    #[arg(long)]
    pub is_training: bool,
    /// Base learning rate for training with decay.
    #[arg(long, default_value_t = 1e-5)]
    pub learning_rate: f32,
    /// Momentum component of the optimizers.
    #[arg(long, default_value_t = 0.9)]
    pub momentum: f32,
    /// Number of passes over the dataset.
    #[arg(long, default_value_t = 10)]
    pub num_epochs: usize,
    /// Decay parameter to compute the learning rate.
    #[arg(long, default_value_t = 0.9)]
    pub power: f32,
    /// Whether to randomly scale the inputs during training.
    #[arg(long)]
    pub random_scale: bool,
    /// Where to restore the model parameters from, a checkpoint file or a snapshot directory.
    #[arg(long)]
    pub restore_from: Option<PathBuf>,
    /// How many images to save.
    #[arg(long, default_value_t = 2)]
    pub save_num_images: usize,
    /// Save a checkpoint every this many steps.
    #[arg(long, default_value_t = 1000)]
    pub save_pred_every: usize,
    /// Where to save snapshots of the model.
    #[arg(long, default_value = "snapshots/")]
    pub snapshot_dir: PathBuf,
    /// Regularisation parameter for the L2 loss.
    #[arg(long, default_value_t = 2.5e-4)]
    pub weight_decay: f32,

    /// JSON file with the dataset section.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Worker threads for the numeric work, all cores when unset.
    #[arg(long)]
    pub threads: Option<usize>,
    /// Log learning rates and gradient norms every this many steps.
    #[arg(long)]
    pub inspect_every: Option<usize>,
    /// How many checkpoints to keep on disk.
    #[arg(long, default_value_t = 2)]
    pub max_to_keep: usize,
    /// Seed for the initial weights and the dataset shuffling.
    #[arg(long, default_value_t = 0)]
    pub seed: u64,
    #[arg(long, default_value_t = 32)]
    pub hidden_channels: usize,
    #[arg(long, default_value_t = 2)]
    pub residual_blocks: usize,
    /// Sub-sampling factor between the input and the score map.
    #[arg(long, default_value_t = 8)]
    pub output_stride: usize,
}
