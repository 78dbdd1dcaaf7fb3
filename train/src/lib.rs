//! The training program for the DeepLab v2 segmentation network.

pub mod common;
pub mod config;
pub mod dataset;
pub mod logging;
pub mod trainer;
pub mod utils;

use crate::{
    common::*,
    dataset::{BatchSampler, DirectoryDataset},
};

/// The entry of training program.
pub fn start(config: Arc<config::Config>, device: Device) -> Result<()> {
    let start_time = Local::now();
    let logging_dir = config
        .logging
        .dir
        .join(format!("{}", start_time.format(utils::FILE_STRFTIME)));
    let checkpoint_dir = logging_dir.join("checkpoints");

    // create dirs and save config
    {
        fs::create_dir_all(&logging_dir)?;
        fs::create_dir_all(&checkpoint_dir)?;
        let path = logging_dir.join("config.json5");
        let text = serde_json::to_string_pretty(&*config)?;
        fs::write(&path, text)?;
    }

    // load dataset
    info!("loading dataset");
    let dataset = DirectoryDataset::new(
        &config.dataset.dataset_dir,
        config.dataset.crop_size.get(),
    )?;
    let sampler = BatchSampler::new(
        dataset,
        config.dataset.batch_size.get(),
        start_time.timestamp() as u64,
    )?;

    trainer::train(config, sampler, device, &logging_dir, &checkpoint_dir)
}
