use std::time::{Duration, Instant};

use log::{debug, info};
use machine_learning::{
    arch::{Model, loss::WeightedSigmoidCrossEntropy},
    optimization::{GroupRates, MomentumConfig, MultiGroupOptimizer},
    params::{ParamGroup, ParamStore, Partition},
    training::{LossComposer, StepLoss},
};

use crate::{
    Result, TrainErr,
    checkpoint::{self, CheckpointManager},
    config::TrainConfig,
    context::ExecutionContext,
    dataset::BatchProvider,
};

/// What happened in a single training step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepRecord {
    pub step: usize,
    pub epoch: usize,
    pub loss: StepLoss,
    pub rates: GroupRates,
    pub duration: Duration,
}

/// The outcome of a whole run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainReport {
    pub steps_run: usize,
    /// The record of the last step taken.
    pub last: Option<StepRecord>,
    /// The steps a checkpoint was written at.
    pub checkpoints: Vec<usize>,
    /// The step of the checkpoint the run started from, if any.
    pub restored_step: Option<usize>,
}

/// The outer training loop: fetches batches, checkpoints, differentiates and updates.
pub struct Trainer<'a, M: Model, P: BatchProvider> {
    cfg: &'a TrainConfig,
    ctx: &'a ExecutionContext,

    model: M,
    params: ParamStore,
    partition: Partition,
    composer: LossComposer<WeightedSigmoidCrossEntropy>,
    optimizer: MultiGroupOptimizer,
    checkpoints: CheckpointManager,
    provider: P,

    num_examples: usize,
    restored_step: Option<usize>,
}

impl<'a, M: Model + Send, P: BatchProvider> Trainer<'a, M, P> {
    /// Creates a new `Trainer`, ready to run its first step.
    ///
    /// # Arguments
    /// * `cfg` - The training hyperparameters.
    /// * `ctx` - Where the numeric work runs.
    /// * `model` - The network to train.
    /// * `params` - The parameters of `model`, restored from `cfg.restore_from` when set.
    /// * `provider` - The source of training batches.
    ///
    /// # Returns
    /// A new `Trainer` or an error if the configuration is invalid, the parameters can't be
    /// partitioned, the dataset is empty or the checkpoint can't be restored.
    pub fn new(
        cfg: &'a TrainConfig,
        ctx: &'a ExecutionContext,
        model: M,
        mut params: ParamStore,
        provider: P,
    ) -> Result<Self> {
        cfg.validate()?;

        let partition = Partition::new(&params)?;
        let [backbone, head, first_layer] = partition.sizes();
        info!(
            "variable groups: backbone={backbone} head={head} first_layer={first_layer}, {} normalization params excluded",
            partition.excluded().len()
        );

        let num_examples = provider.total_examples();
        if num_examples == 0 {
            return Err(TrainErr::EmptyDataset);
        }

        let restored_step = match &cfg.restore_from {
            Some(path) => Some(checkpoint::restore(path, &mut params)?),
            None => None,
        };

        let steps_per_epoch = num_examples.div_ceil(cfg.batch_size);
        let total_steps = cfg.num_epochs * steps_per_epoch;

        let optimizer = MomentumConfig {
            learning_rate: cfg.learning_rate,
            momentum: cfg.momentum,
            power: cfg.power,
        }
        .init(&params, &partition, total_steps)?;

        Ok(Self {
            cfg,
            ctx,
            model,
            params,
            partition,
            composer: LossComposer::weighted_sigmoid(cfg.weight_decay),
            optimizer,
            checkpoints: CheckpointManager::open(&cfg.snapshot_dir, cfg.max_to_keep)?,
            provider,
            num_examples,
            restored_step,
        })
    }

    pub fn total_steps(&self) -> usize {
        self.optimizer.total_steps()
    }

    pub fn params(&self) -> &ParamStore {
        &self.params
    }

    pub fn into_params(self) -> ParamStore {
        self.params
    }

    /// Runs every step of the schedule.
    ///
    /// # Returns
    /// The report of the run or the first error that happened, which aborts it.
    pub fn run(&mut self) -> Result<TrainReport> {
        let total_steps = self.total_steps();
        info!(
            "training on {} examples for {total_steps} steps with {} threads",
            self.num_examples,
            self.ctx.threads()
        );

        let mut report = TrainReport {
            restored_step: self.restored_step,
            ..Default::default()
        };

        for step in 0..total_steps {
            if self.should_checkpoint(step) {
                report.checkpoints.push(step);
            }
            report.last = Some(self.step(step)?);
            report.steps_run += 1;
        }

        info!("training finished after {total_steps} steps");
        Ok(report)
    }

    fn should_checkpoint(&self, step: usize) -> bool {
        step % self.cfg.save_pred_every == 0
    }

    fn should_inspect(&self, step: usize) -> bool {
        self.cfg.inspect_every.is_some_and(|n| step % n == 0)
    }

    /// Runs a single step: fetch, maybe checkpoint, differentiate and update.
    ///
    /// # Arguments
    /// * `step` - The index of the step, drives the learning rate and the checkpoint cadence.
    ///
    /// # Returns
    /// What happened in the step.
    pub fn step(&mut self, step: usize) -> Result<StepRecord> {
        let start = Instant::now();
        let batch = self.provider.next_batch(self.cfg.batch_size)?;

        // Persisted before the update, a checkpoint of step s holds the result of s updates.
        if self.should_checkpoint(step) {
            self.checkpoints.save(&self.params, step)?;
        }

        let inspect = self.should_inspect(step);
        let Self {
            ctx,
            model,
            params,
            partition,
            composer,
            optimizer,
            ..
        } = self;

        let (loss, rates) = ctx.install(|| {
            let (loss, grads) =
                composer.compute(model, params, partition, batch.images(), batch.labels())?;

            if inspect {
                let norms: Vec<_> = ParamGroup::ALL
                    .iter()
                    .map(|&group| format!("{group}={:.4e}", grads.norm(group)))
                    .collect();
                debug!("step {step}: grad norms {}", norms.join(" "));
            }

            let rates = optimizer.step(step, params, partition, grads)?;
            machine_learning::Result::Ok((loss, rates))
        })?;

        if inspect {
            debug!("step {step}: learning rates {rates}");
            debug!(
                "step {step}: data loss {:.4}, l2 loss {:.4}",
                loss.data, loss.l2
            );
        }

        let duration = start.elapsed();
        let epoch = step * self.cfg.batch_size / self.num_examples;
        info!(
            "epoch {epoch} /step {step} \t loss = {:.3}, ({:.3} sec/step)",
            loss.total,
            duration.as_secs_f32()
        );

        Ok(StepRecord {
            step,
            epoch,
            loss,
            rates,
            duration,
        })
    }
}
