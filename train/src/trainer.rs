//! The gradient-accumulation training loop.

use crate::{
    common::*,
    config::{Config, OptimizerKind},
    dataset::{BatchSampler, SegmentationDataset},
    logging::{MetricsRecord, MetricsWriter},
    utils::{self, Checkpointer, MovingAverageMeter, PolyLrScheduler, Throughput},
};

const LOSS_METER_WINDOW: usize = 20;

/// Runs the training loop until `iter_max` iterations have been consumed.
pub fn train<D>(
    config: Arc<Config>,
    mut sampler: BatchSampler<D>,
    device: Device,
    logging_dir: &Path,
    checkpoint_dir: &Path,
) -> Result<()>
where
    D: SegmentationDataset,
{
    let num_classes = config.model.num_classes.get() as i64;
    let iter_max = config.training.iter_max.get();
    let iter_size = config.training.iter_size.get();
    let logging_steps = config.training.logging_steps.get();
    let save_checkpoint_steps = config
        .training
        .save_checkpoint_steps
        .map(|steps| steps.get());
    let weight_decay = config.training.weight_decay.raw();

    // init model
    info!("initializing model");
    let mut vs = nn::VarStore::new(device);
    let root = vs.root();
    let model = {
        let scale = DeepLabV2Init {
            n_classes: num_classes,
            n_blocks: config.model.n_blocks,
            pyramids: config.model.pyramids.clone(),
            freeze_bn: config.model.freeze_bn,
        }
        .build(&root / "scale")?;
        MultiScale::new(scale)
    };

    // load weights
    if let Some(init_weights) = &config.model.init_weights {
        utils::load_pretrained(&mut vs, init_weights)?;
    }
    utils::try_load_checkpoint(&mut vs, &config.logging.dir, &config.training.load_checkpoint)?;

    // init optimizer with per-group learning rates and weight decay
    let mut scheduler = PolyLrScheduler::new(
        config.training.base_lr.raw(),
        config.training.poly_power.raw(),
        config.training.lr_decay.get(),
        iter_max,
        config.training.aspp_weight_lr_mult.raw(),
        config.training.aspp_bias_lr_mult.raw(),
    )?;

    let mut optimizer = match config.training.optimizer {
        OptimizerKind::Sgd => nn::Sgd {
            momentum: config.training.momentum.raw(),
            ..Default::default()
        }
        .build(&vs, config.training.base_lr.raw())?,
    };
    apply_lrs(&mut optimizer, scheduler.lrs());
    optimizer.set_weight_decay_group(BACKBONE_LR_GROUP, weight_decay);
    optimizer.set_weight_decay_group(ASPP_WEIGHT_LR_GROUP, weight_decay);
    optimizer.set_weight_decay_group(
        ASPP_BIAS_LR_GROUP,
        config.training.aspp_bias_weight_decay.raw(),
    );

    let loss_fn = MultiScaleLoss::new(config.dataset.ignore_label);
    let mut loss_meter = MovingAverageMeter::new(LOSS_METER_WINDOW);
    let mut throughput = Throughput::new(Duration::from_secs(1));
    let mut metrics = MetricsWriter::create(logging_dir)?;
    let checkpointer = Checkpointer::new(checkpoint_dir);

    info!("start training");
    for iteration in 1..=iter_max {
        if let Some(lrs) = scheduler.step(iteration - 1) {
            apply_lrs(&mut optimizer, lrs);
        }

        // accumulate gradients over sub-iterations, then update once
        optimizer.zero_grad();
        let mut iter_loss = 0f64;
        for _ in 0..iter_size {
            let (images, labels) = sampler.next_batch()?;
            let images = images.to_device(device);
            let labels = labels.to_device(device);

            let output = model.forward_t(&images, true)?;
            let loss = loss_fn.forward(output.outputs(), &labels)? / iter_size as f64;
            loss.backward();
            iter_loss += f64::from(&loss);
        }
        optimizer.step();

        loss_meter.add(iter_loss);

        if iteration % logging_steps == 0 {
            let loss = loss_meter.value().unwrap_or(f64::NAN);
            let lrs = scheduler.lrs();

            throughput.observe(logging_steps as f64);
            if let Some(rate) = throughput.poll() {
                info!(
                    "step: {}\tloss: {:.5}\tlr: {:.7}\t{:.2} iters/s",
                    iteration, loss, lrs[0], rate
                );
            } else {
                info!("step: {}\tloss: {:.5}\tlr: {:.7}", iteration, loss, lrs[0]);
            }

            metrics.write(&MetricsRecord {
                step: iteration,
                loss,
                lr_backbone: lrs[0],
                lr_aspp_weight: lrs[1],
                lr_aspp_bias: lrs[2],
            })?;
        }

        if let Some(0) = save_checkpoint_steps.map(|steps| iteration % steps) {
            checkpointer.save_step(&vs, iteration, iter_loss)?;
        }
    }

    let final_path = checkpointer.save_final(&vs)?;
    info!("saved final weights to {}", final_path.display());

    Ok(())
}

fn apply_lrs(optimizer: &mut nn::Optimizer, lrs: [f64; 3]) {
    optimizer.set_lr_group(BACKBONE_LR_GROUP, lrs[0]);
    optimizer.set_lr_group(ASPP_WEIGHT_LR_GROUP, lrs[1]);
    optimizer.set_lr_group(ASPP_BIAS_LR_GROUP, lrs[2]);
}
