//! Segmentation dataset loading.

use crate::common::*;

/// A dataset of (image, label map) records with random access.
pub trait SegmentationDataset {
    fn num_records(&self) -> usize;

    /// Returns the nth record as a (3, size, size) float image in [0, 1]
    /// and a (size, size) int64 label map.
    fn nth(&self, index: usize) -> Result<(Tensor, Tensor)>;
}

/// A directory-backed dataset: `<root>/images/<stem>.{jpg,png}` paired with
/// `<root>/labels/<stem>.png` by file stem.
#[derive(Debug)]
pub struct DirectoryDataset {
    records: Vec<(PathBuf, PathBuf)>,
    crop_size: i64,
}

impl DirectoryDataset {
    pub fn new(dataset_dir: impl AsRef<Path>, crop_size: usize) -> Result<Self> {
        let dataset_dir = dataset_dir.as_ref();
        let image_dir = dataset_dir.join("images");
        let label_dir = dataset_dir.join("labels");
        ensure!(
            image_dir.is_dir() && label_dir.is_dir(),
            "'{}' must contain images/ and labels/ directories",
            dataset_dir.display()
        );

        let mut records: Vec<_> = fs::read_dir(&image_dir)?
            .map(|entry| -> Result<_> { Ok(entry?.path()) })
            .filter_map_ok(|image_file| {
                let stem = image_file.file_stem()?.to_str()?;
                let label_file = label_dir.join(format!("{}.png", stem));
                label_file.is_file().then(|| (image_file.clone(), label_file))
            })
            .try_collect()?;
        records.sort();
        ensure!(
            !records.is_empty(),
            "no image/label pairs found under '{}'",
            dataset_dir.display()
        );

        Ok(Self {
            records,
            crop_size: crop_size as i64,
        })
    }
}

impl SegmentationDataset for DirectoryDataset {
    fn num_records(&self) -> usize {
        self.records.len()
    }

    fn nth(&self, index: usize) -> Result<(Tensor, Tensor)> {
        let (image_file, label_file) = self
            .records
            .get(index)
            .ok_or_else(|| format_err!("record index {} out of range", index))?;
        let size = self.crop_size;

        let image = vision::image::load(image_file)
            .with_context(|| format!("failed to load '{}'", image_file.display()))?;
        let image = vision::image::resize(&image, size, size)?;
        let image = image.to_kind(Kind::Float) / 255.0;

        let label = vision::image::load(label_file)
            .with_context(|| format!("failed to load '{}'", label_file.display()))?;
        // class indices live in the first channel; resize nearest so label
        // values stay exact
        let label = label
            .select(0, 0)
            .unsqueeze(0)
            .unsqueeze(0)
            .to_kind(Kind::Float)
            .f_upsample_nearest2d(&[size, size], None, None)?
            .reshape(&[size, size])
            .to_kind(Kind::Int64);

        Ok((image, label))
    }
}

/// Draws shuffled batches from a dataset, re-cycling (and re-shuffling) the
/// record order whenever it runs out. The cycle guards configurations whose
/// accumulation size exceeds the dataset length.
#[derive(Debug)]
pub struct BatchSampler<D>
where
    D: SegmentationDataset,
{
    dataset: D,
    batch_size: usize,
    order: Vec<usize>,
    cursor: usize,
    rng: StdRng,
}

impl<D> BatchSampler<D>
where
    D: SegmentationDataset,
{
    pub fn new(dataset: D, batch_size: usize, seed: u64) -> Result<Self> {
        ensure!(batch_size >= 1, "batch_size must be at least 1");
        ensure!(dataset.num_records() > 0, "the dataset must not be empty");

        let mut rng = StdRng::seed_from_u64(seed);
        let mut order: Vec<_> = (0..dataset.num_records()).collect();
        order.shuffle(&mut rng);

        Ok(Self {
            dataset,
            batch_size,
            order,
            cursor: 0,
            rng,
        })
    }

    pub fn next_batch(&mut self) -> Result<(Tensor, Tensor)> {
        let mut images = Vec::with_capacity(self.batch_size);
        let mut labels = Vec::with_capacity(self.batch_size);

        for _ in 0..self.batch_size {
            if self.cursor == self.order.len() {
                self.order.shuffle(&mut self.rng);
                self.cursor = 0;
            }
            let (image, label) = self.dataset.nth(self.order[self.cursor])?;
            self.cursor += 1;
            images.push(image);
            labels.push(label);
        }

        let images = Tensor::f_stack(&images, 0)?;
        let labels = Tensor::f_stack(&labels, 0)?;
        Ok((images, labels))
    }
}
