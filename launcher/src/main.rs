mod cli;

use std::{
    net::{Ipv4Addr, SocketAddr},
    sync::Arc,
};

use anyhow::Context;
use clap::Parser;
use log::info;

use collective::{Backend, GroupConfig, LocalGroup, bootstrap};
use ml::LabeledDataset;
use trainer::{RngStream, run_training};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = cli::Args::parse();

    // One-way switch; everything downstream derives from this seed.
    let det = trainer::determinism::seed(args.seed)?;

    let (train, test) = {
        let mut rng = det.rng(RngStream::Dataset);
        let train = LabeledDataset::synthetic_blobs(
            args.samples,
            args.input_dim.get(),
            args.classes.get(),
            0.5,
            &mut rng,
        )?;
        let test = LabeledDataset::synthetic_blobs(
            args.test_samples,
            args.input_dim.get(),
            args.classes.get(),
            0.5,
            &mut rng,
        )?;
        (Arc::new(train), Arc::new(test))
    };

    let cfg = Arc::new(args.train_config());
    cfg.validate()?;

    let group_cfg = GroupConfig::new(Backend::Local, args.workers)
        .with_rendezvous(SocketAddr::from((Ipv4Addr::LOCALHOST, args.port)));

    info!(
        workers = args.workers.get(),
        seed = args.seed,
        model = format!("{:?}", args.model);
        "launching training group"
    );

    let all = bootstrap(&group_cfg, move |group: LocalGroup| {
        let cfg = Arc::clone(&cfg);
        let train = Arc::clone(&train);
        let test = Arc::clone(&test);
        async move { run_training(&cfg, &group, det, train, test).await }
    })
    .await
    .context("training run failed")?;

    for (rank, m) in all.iter().enumerate() {
        info!(
            rank = rank,
            steps = m.steps,
            samples = m.samples,
            epochs = m.epochs,
            evals = m.evals,
            checkpoints = m.checkpoints,
            grad_snapshots = m.grad_snapshots;
            "worker finished"
        );
    }

    let total: u64 = all.iter().map(|m| m.samples).sum();
    println!("trained on {total} samples across {} workers", all.len());
    Ok(())
}
