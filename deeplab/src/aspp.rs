use crate::{common::*, ASPP_BIAS_LR_GROUP, ASPP_WEIGHT_LR_GROUP};

/// Atrous spatial pyramid pooling head.
///
/// One 3x3 convolution per pyramid rate, padding equal to the dilation so
/// every branch preserves the input spatial size, summed elementwise into the
/// per-class score map.
///
/// Branch weights are drawn from N(0, 0.01) and biases start at zero; the
/// near-null start is part of the reference training recipe and must not be
/// altered. Weights and biases are registered under distinct optimizer
/// groups so the training driver can scale their learning rates
/// independently.
#[derive(Debug, Clone)]
pub struct AsppInit {
    pub in_c: i64,
    pub out_c: i64,
    pub pyramids: Vec<i64>,
}

impl AsppInit {
    pub fn build<'p, P>(self, path: P) -> Result<Aspp>
    where
        P: Borrow<nn::Path<'p>>,
    {
        let path = path.borrow();

        let Self {
            in_c,
            out_c,
            pyramids,
        } = self;

        ensure!(in_c > 0 && out_c > 0, "channel counts must be positive");
        ensure!(!pyramids.is_empty(), "at least one pyramid rate is required");
        ensure!(
            pyramids.iter().all(|&rate| rate >= 1),
            "pyramid rates must be at least 1, got {:?}",
            pyramids
        );

        let branches: Vec<_> = pyramids
            .iter()
            .enumerate()
            .map(|(index, &rate)| {
                let branch_path = path / format!("c{}", index);
                let ws = branch_path.set_group(ASPP_WEIGHT_LR_GROUP).var(
                    "weight",
                    &[out_c, in_c, 3, 3],
                    nn::Init::Randn {
                        mean: 0.0,
                        stdev: 0.01,
                    },
                );
                let bs = branch_path.set_group(ASPP_BIAS_LR_GROUP).var(
                    "bias",
                    &[out_c],
                    nn::Init::Const(0.0),
                );
                AsppBranch { ws, bs, rate }
            })
            .collect();

        Ok(Aspp { branches })
    }
}

#[derive(Debug)]
struct AsppBranch {
    ws: Tensor,
    bs: Tensor,
    rate: i64,
}

impl AsppBranch {
    fn forward(&self, xs: &Tensor) -> Tensor {
        let Self { ref ws, ref bs, rate } = *self;
        xs.conv2d(ws, Some(bs), &[1, 1], &[rate, rate], &[rate, rate], 1)
    }
}

#[derive(Debug)]
pub struct Aspp {
    branches: Vec<AsppBranch>,
}

impl Aspp {
    fn branch_outputs(&self, xs: &Tensor) -> Vec<Tensor> {
        self.branches
            .iter()
            .map(|branch| branch.forward(xs))
            .collect()
    }
}

impl nn::ModuleT for Aspp {
    fn forward_t(&self, xs: &Tensor, _train: bool) -> Tensor {
        let mut outputs = self.branch_outputs(xs).into_iter();
        let first = outputs.next().unwrap();
        outputs.fold(first, |sum, output| sum + output)
    }
}
