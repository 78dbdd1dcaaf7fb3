use crate::{common::*, tensor::TensorExt as _};

/// 2-D cross entropy against an integer label map, with a designated ignore
/// label excluded from the loss.
///
/// When the label map and the score map disagree on spatial size, the label
/// map is resampled with nearest-neighbor interpolation so ignore labels
/// survive the resize unchanged.
#[derive(Debug, Clone)]
pub struct CrossEntropyLoss2D {
    ignore_index: i64,
    reduction: Reduction,
}

impl CrossEntropyLoss2D {
    pub fn new(ignore_index: i64, reduction: Reduction) -> Self {
        Self {
            ignore_index,
            reduction,
        }
    }

    pub fn forward(&self, input: &Tensor, target: &Tensor) -> Result<Tensor> {
        let (batch_size, _n_classes, height, width) = input.size4()?;
        let (target_batch_size, target_height, target_width) = target.size3()?;
        ensure!(
            batch_size == target_batch_size,
            "input and target batch sizes differ: {} vs {}",
            batch_size,
            target_batch_size
        );

        let target = if (target_height, target_width) != (height, width) {
            // integer labels round-trip exactly through a float nearest resize
            target
                .unsqueeze(1)
                .to_kind(Kind::Float)
                .f_upsample_nearest2d(&[height, width], None, None)?
                .reshape(&[batch_size, height, width])
                .to_kind(Kind::Int64)
        } else {
            target.to_kind(Kind::Int64)
        };

        let log_probs = input.f_log_softmax(1, Kind::Float)?;
        let loss = log_probs.f_nll_loss2d(
            &target,
            None::<Tensor>,
            self.reduction,
            self.ignore_index,
        )?;
        Ok(loss)
    }
}

/// Sum of per-output cross entropies over a multi-scale output bundle, each
/// output compared against the label map resized to its own resolution.
#[derive(Debug, Clone)]
pub struct MultiScaleLoss {
    loss: CrossEntropyLoss2D,
}

impl MultiScaleLoss {
    pub fn new(ignore_index: i64) -> Self {
        Self {
            loss: CrossEntropyLoss2D::new(ignore_index, Reduction::Mean),
        }
    }

    pub fn forward(&self, outputs: &[Tensor], target: &Tensor) -> Result<Tensor> {
        ensure!(!outputs.is_empty(), "the output bundle must not be empty");
        let losses: Vec<_> = outputs
            .iter()
            .map(|output| self.loss.forward(output, target))
            .try_collect()?;
        Tensor::f_sum_tensors(&losses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IGNORE: i64 = 255;

    #[test]
    fn ignored_pixels_do_not_contribute() -> Result<()> {
        let loss_fn = CrossEntropyLoss2D::new(IGNORE, Reduction::Mean);

        let input = Tensor::rand(&[1, 3, 4, 4], tch::kind::FLOAT_CPU);
        let target = Tensor::randint(3, &[1, 4, 4], tch::kind::INT64_CPU);
        let _ = target.i((0, 0, ..)).fill_(IGNORE);
        let reference = loss_fn.forward(&input, &target)?;

        // perturbing the scores of ignored pixels must not change the loss
        let perturbed = input.copy();
        let _ = perturbed.i((0, .., 0, ..)).fill_(123.0);
        let loss = loss_fn.forward(&perturbed, &target)?;

        let diff = (f64::from(&loss) - f64::from(&reference)).abs();
        assert!(diff < 1e-6, "diff = {}", diff);
        Ok(())
    }

    #[test]
    fn target_is_resized_to_the_score_map() -> Result<()> {
        let loss_fn = CrossEntropyLoss2D::new(IGNORE, Reduction::Mean);

        let input = Tensor::rand(&[2, 3, 5, 5], tch::kind::FLOAT_CPU);
        let target = Tensor::randint(3, &[2, 10, 10], tch::kind::INT64_CPU);
        let loss = loss_fn.forward(&input, &target)?;
        assert_eq!(loss.size(), Vec::<i64>::new());
        assert!(f64::from(&loss).is_finite());
        Ok(())
    }

    #[test]
    fn multi_scale_loss_is_the_sum_of_per_output_losses() -> Result<()> {
        let loss_fn = MultiScaleLoss::new(IGNORE);
        let ce = CrossEntropyLoss2D::new(IGNORE, Reduction::Mean);

        let outputs = vec![
            Tensor::rand(&[1, 3, 8, 8], tch::kind::FLOAT_CPU),
            Tensor::rand(&[1, 3, 6, 6], tch::kind::FLOAT_CPU),
            Tensor::rand(&[1, 3, 4, 4], tch::kind::FLOAT_CPU),
            Tensor::rand(&[1, 3, 8, 8], tch::kind::FLOAT_CPU),
        ];
        let target = Tensor::randint(3, &[1, 16, 16], tch::kind::INT64_CPU);

        let total = loss_fn.forward(&outputs, &target)?;
        let expect: f64 = outputs
            .iter()
            .map(|output| Ok(f64::from(&ce.forward(output, &target)?)))
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .sum();

        let diff = (f64::from(&total) - expect).abs();
        assert!(diff < 1e-5, "diff = {}", diff);
        Ok(())
    }
}
