use crate::{common::*, config::LoadCheckpoint};
use chrono::FixedOffset;
use regex::Regex;

pub const FILE_STRFTIME: &str = "%Y-%m-%d-%H-%M-%S.%3f%z";
const CURRENT_FILENAME: &str = "checkpoint_current.ot";
const FINAL_FILENAME: &str = "checkpoint_final.ot";

/// Writes training snapshots into a checkpoint directory.
///
/// Each periodic save produces a timestamped history file and rewrites a
/// rolling `checkpoint_current.ot` for crash recovery; the final weights go
/// to `checkpoint_final.ot`.
#[derive(Debug)]
pub struct Checkpointer {
    checkpoint_dir: PathBuf,
}

impl Checkpointer {
    pub fn new(checkpoint_dir: impl Into<PathBuf>) -> Self {
        Self {
            checkpoint_dir: checkpoint_dir.into(),
        }
    }

    pub fn save_step(&self, vs: &nn::VarStore, training_step: usize, loss: f64) -> Result<()> {
        let filename = format!(
            "{}_{:06}_{:08.5}.ckpt",
            Local::now().format(FILE_STRFTIME),
            training_step,
            loss
        );
        vs.save(self.checkpoint_dir.join(filename))?;
        self.save_current(vs)
    }

    pub fn save_current(&self, vs: &nn::VarStore) -> Result<()> {
        vs.save(self.checkpoint_dir.join(CURRENT_FILENAME))?;
        Ok(())
    }

    pub fn save_final(&self, vs: &nn::VarStore) -> Result<PathBuf> {
        let path = self.checkpoint_dir.join(FINAL_FILENAME);
        vs.save(&path)?;
        Ok(path)
    }
}

/// Extracts the save time from a history checkpoint filename. Returns `None`
/// for anything else, including the rolling and final files.
fn checkpoint_datetime(file_name: &str) -> Option<DateTime<FixedOffset>> {
    let regex = Regex::new(
        r"^(\d{4}-\d{2}-\d{2}-\d{2}-\d{2}-\d{2}\.\d{3}[+-]\d{4})_\d{6}_\d+\.\d+\.ckpt$",
    )
    .ok()?;
    let captures = regex.captures(file_name)?;
    let datetime = DateTime::parse_from_str(captures.get(1)?.as_str(), FILE_STRFTIME).ok()?;
    Some(datetime)
}

/// Load pretrained weights, tolerating an absent ASPP head.
///
/// The reference pretrained checkpoints carry the backbone only; the head's
/// fresh random initialization is kept in that case. Any other missing
/// variable means the file belongs to a different architecture and is a
/// fatal error.
pub fn load_pretrained(vs: &mut nn::VarStore, weights_file: &Path) -> Result<()> {
    info!("load pretrained weights {}", weights_file.display());
    let missing = vs
        .load_partial(weights_file)
        .with_context(|| format!("failed to load '{}'", weights_file.display()))?;

    let unexpected: Vec<_> = missing
        .iter()
        .filter(|name| !name.contains("aspp"))
        .collect();
    ensure!(
        unexpected.is_empty(),
        "pretrained weights '{}' miss non-ASPP variables: {:?}",
        weights_file.display(),
        unexpected
    );

    if !missing.is_empty() {
        info!(
            "{} ASPP variables keep their fresh initialization",
            missing.len()
        );
    }
    Ok(())
}

/// Load parameters from a directory with specified checkpoint loading method.
pub fn try_load_checkpoint(
    vs: &mut nn::VarStore,
    logging_dir: &Path,
    load_checkpoint: &LoadCheckpoint,
) -> Result<()> {
    let path = match load_checkpoint {
        LoadCheckpoint::Disabled => {
            info!("checkpoint loading is disabled");
            None
        }
        LoadCheckpoint::FromRecent => {
            let paths: Vec<_> =
                glob::glob(&format!("{}/*/checkpoints/*.ckpt", logging_dir.display()))?
                    .try_collect()?;
            let checkpoint_file = paths
                .into_iter()
                .filter_map(|path| {
                    let datetime = checkpoint_datetime(path.file_name()?.to_str()?)?;
                    Some((path, datetime))
                })
                .max_by_key(|(_path, datetime)| *datetime)
                .map(|(path, _datetime)| path);

            if checkpoint_file.is_none() {
                warn!("no checkpoint file found");
            }

            checkpoint_file
        }
        LoadCheckpoint::FromFile { file } => {
            if file.is_file() {
                Some(file.to_owned())
            } else {
                warn!("{} is not a file", file.display());
                None
            }
        }
    };

    if let Some(path) = path {
        info!("load checkpoint file {}", path.display());
        vs.load(&path)
            .with_context(|| format!("failed to load '{}'", path.display()))?;
    }

    Ok(())
}
