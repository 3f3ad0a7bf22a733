use std::{cell::RefCell, rc::Rc};

use clap::Parser;
use log::info;
use machine_learning::{arch::SegNet, params::ParamStore};
use rand::{SeedableRng, rngs::StdRng};

use trainer::{
    config::{Config, TrainArgs},
    context::ExecutionContext,
    dataset::ListDataset,
    driver::Trainer,
};

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cfg = Config::resolve(TrainArgs::parse())?;
    info!("resolved configuration: {cfg:?}");

    let ctx = ExecutionContext::new(cfg.threads)?;
    let rng = Rc::new(RefCell::new(StdRng::seed_from_u64(cfg.seed)));

    let mut params = ParamStore::new();
    let model = SegNet::new(cfg.model, &mut params, rng)?;
    let dataset = ListDataset::open(&cfg.dataset, cfg.input_size, cfg.seed, cfg.random_scale)?;

    let mut trainer = Trainer::new(&cfg.train, &ctx, model, params, dataset)?;
    let report = trainer.run()?;

    info!(
        "ran {} steps, checkpoints at {:?}",
        report.steps_run,
        report.checkpoints
    );
    Ok(())
}
