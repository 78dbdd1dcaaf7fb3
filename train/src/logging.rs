//! Training metrics sink.

use crate::common::*;

/// One metrics row per logging interval.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsRecord {
    pub step: usize,
    pub loss: f64,
    pub lr_backbone: f64,
    pub lr_aspp_weight: f64,
    pub lr_aspp_bias: f64,
}

/// Push-only CSV metrics writer. The training loop reports smoothed losses
/// and per-group learning rates here; nothing is ever read back.
#[derive(Debug)]
pub struct MetricsWriter {
    writer: csv::Writer<fs::File>,
}

impl MetricsWriter {
    pub fn create(logging_dir: &Path) -> Result<Self> {
        let path = logging_dir.join("metrics.csv");
        let writer = csv::Writer::from_path(&path)
            .with_context(|| format!("failed to create '{}'", path.display()))?;
        Ok(Self { writer })
    }

    pub fn write(&mut self, record: &MetricsRecord) -> Result<()> {
        self.writer.serialize(record)?;
        self.writer.flush()?;
        Ok(())
    }
}
