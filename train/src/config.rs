//! Training program configuration format.

use crate::common::*;

/// The main training configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub dataset: DatasetConfig,
    pub model: ModelConfig,
    pub training: TrainingConfig,
    pub logging: LoggingConfig,
}

impl Config {
    pub fn open<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let text = std::fs::read_to_string(path)?;
        let config = json5::from_str(&text)?;
        Ok(config)
    }
}

/// Dataset options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// The dataset root directory, holding `images/` and `labels/`.
    pub dataset_dir: PathBuf,
    /// Image and label maps are resized to this square size.
    pub crop_size: NonZeroUsize,
    pub batch_size: NonZeroUsize,
    /// The label value excluded from the loss.
    #[serde(default = "default_ignore_label")]
    pub ignore_label: i64,
}

/// Model options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub num_classes: NonZeroUsize,
    /// Optional pretrained weights. The ASPP head may be absent from the
    /// file; its fresh random initialization is kept in that case.
    pub init_weights: Option<PathBuf>,
    #[serde(default = "default_n_blocks")]
    pub n_blocks: [usize; 4],
    #[serde(default = "default_pyramids")]
    pub pyramids: Vec<i64>,
    #[serde(default = "default_true")]
    pub freeze_bn: bool,
}

/// The training options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub optimizer: OptimizerKind,
    /// The base learning rate of the backbone group.
    pub base_lr: R64,
    pub momentum: R64,
    pub weight_decay: R64,
    /// The exponent of the polynomial learning-rate decay.
    pub poly_power: R64,
    /// Decay the learning rate every this many iterations.
    pub lr_decay: NonZeroUsize,
    pub iter_max: NonZeroUsize,
    /// The number of gradient-accumulation sub-iterations per optimizer
    /// step.
    pub iter_size: NonZeroUsize,
    /// Learning-rate multiplier of the ASPP weight group.
    #[serde(default = "default_aspp_weight_lr_mult")]
    pub aspp_weight_lr_mult: R64,
    /// Learning-rate multiplier of the ASPP bias group.
    #[serde(default = "default_aspp_bias_lr_mult")]
    pub aspp_bias_lr_mult: R64,
    /// Weight decay of the ASPP bias group.
    #[serde(default = "default_aspp_bias_weight_decay")]
    pub aspp_bias_weight_decay: R64,
    /// If set, it saves a checkpoint file per this steps.
    pub save_checkpoint_steps: Option<NonZeroUsize>,
    /// Report the smoothed loss and learning rates per this steps.
    pub logging_steps: NonZeroUsize,
    /// Checkpoint file loading method.
    #[serde(default = "default_load_checkpoint")]
    pub load_checkpoint: LoadCheckpoint,
}

/// Variants of supported optimizers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerKind {
    Sgd,
}

/// Checkpoint file loading method.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LoadCheckpoint {
    /// Disable checkpoint file loading.
    Disabled,
    /// Load the most recent checkpoint file.
    FromRecent,
    /// Load the checkpoint file at specified path.
    FromFile { file: PathBuf },
}

/// Data logging options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub dir: PathBuf,
}

fn default_ignore_label() -> i64 {
    255
}

fn default_n_blocks() -> [usize; 4] {
    [3, 4, 23, 3]
}

fn default_pyramids() -> Vec<i64> {
    vec![6, 12, 18, 24]
}

fn default_true() -> bool {
    true
}

fn default_aspp_weight_lr_mult() -> R64 {
    r64(10.0)
}

fn default_aspp_bias_lr_mult() -> R64 {
    r64(20.0)
}

fn default_aspp_bias_weight_decay() -> R64 {
    r64(0.0)
}

fn default_load_checkpoint() -> LoadCheckpoint {
    LoadCheckpoint::Disabled
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_config() -> Result<()> {
        let text = r#"{
            dataset: {
                dataset_dir: "/data/cocostuff",
                crop_size: 321,
                batch_size: 2,
                ignore_label: 255,
            },
            model: {
                num_classes: 183,
                init_weights: "/data/init.ot",
            },
            training: {
                optimizer: "sgd",
                base_lr: 0.00025,
                momentum: 0.9,
                weight_decay: 0.0005,
                poly_power: 0.9,
                lr_decay: 10,
                iter_max: 20000,
                iter_size: 10,
                save_checkpoint_steps: 5000,
                logging_steps: 100,
            },
            logging: {
                dir: "runs",
            },
        }"#;

        let config: Config = json5::from_str(text)?;
        assert_eq!(config.model.n_blocks, [3, 4, 23, 3]);
        assert_eq!(config.training.aspp_weight_lr_mult, r64(10.0));
        assert_eq!(config.training.aspp_bias_lr_mult, r64(20.0));
        assert_eq!(config.training.aspp_bias_weight_decay, r64(0.0));
        assert!(matches!(
            config.training.load_checkpoint,
            LoadCheckpoint::Disabled
        ));
        Ok(())
    }
}
