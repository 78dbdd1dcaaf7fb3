use crate::common::*;

#[cfg(debug_assertions)]
static SMALL_VARIANCE_WARN: Once = Once::new();

/// Batch normalization with explicit control over the trainability of the
/// affine parameters.
///
/// The segmentation backbone keeps its normalization parameters exactly as
/// loaded from pretrained weights: the affine scale/shift are stored as
/// non-trainable variables so they survive checkpoint round-trips without
/// ever entering an optimizer group.
#[derive(Debug, Clone)]
pub struct BatchNorm2DInit {
    pub cudnn_enabled: bool,
    pub eps: R64,
    pub momentum: R64,
    pub trainable_affine: bool,
}

impl Default for BatchNorm2DInit {
    fn default() -> Self {
        Self {
            cudnn_enabled: true,
            eps: r64(1e-5),
            momentum: r64(0.1),
            trainable_affine: false,
        }
    }
}

impl BatchNorm2DInit {
    pub fn build<'a>(self, path: impl Borrow<nn::Path<'a>>, out_dim: i64) -> BatchNorm2D {
        let path = path.borrow();
        let Self {
            cudnn_enabled,
            eps,
            momentum,
            trainable_affine,
        } = self;

        let (ws, bs) = if trainable_affine {
            (
                path.var("weight", &[out_dim], nn::Init::Const(1.0)),
                path.var("bias", &[out_dim], nn::Init::Const(0.0)),
            )
        } else {
            (
                path.ones_no_train("weight", &[out_dim]),
                path.zeros_no_train("bias", &[out_dim]),
            )
        };

        BatchNorm2D {
            running_mean: path.zeros_no_train("running_mean", &[out_dim]),
            running_var: path.ones_no_train("running_var", &[out_dim]),
            ws,
            bs,
            cudnn_enabled,
            eps: eps.raw(),
            momentum: momentum.raw(),
        }
    }
}

#[derive(Debug)]
pub struct BatchNorm2D {
    running_mean: Tensor,
    running_var: Tensor,
    ws: Tensor,
    bs: Tensor,
    cudnn_enabled: bool,
    eps: f64,
    momentum: f64,
}

impl nn::ModuleT for BatchNorm2D {
    fn forward_t(&self, input: &Tensor, train: bool) -> Tensor {
        let Self {
            ref running_mean,
            ref running_var,
            ref ws,
            ref bs,
            momentum,
            eps,
            cudnn_enabled,
        } = *self;

        let output = Tensor::batch_norm(
            input,
            Some(ws),
            Some(bs),
            Some(running_mean),
            Some(running_var),
            train,
            momentum,
            eps,
            cudnn_enabled,
        );

        #[cfg(debug_assertions)]
        {
            let has_small_var = bool::from(running_var.abs().le(1e-15).any());
            if has_small_var {
                SMALL_VARIANCE_WARN.call_once(|| {
                    warn!(
                        "running variance {} is too small",
                        f64::from(running_var.abs().min())
                    );
                });
            }
        }

        output
    }
}

impl BatchNorm2D {
    pub fn has_nan(&self) -> bool {
        use crate::tensor::TensorExt as _;
        let Self {
            ws,
            bs,
            running_mean,
            running_var,
            ..
        } = self;
        ws.has_nan() || bs.has_nan() || running_mean.has_nan() || running_var.has_nan()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frozen_affine_is_not_trainable() {
        let vs = nn::VarStore::new(Device::Cpu);
        let root = vs.root();
        let _bn = BatchNorm2DInit::default().build(&root / "bn", 8);
        assert!(vs.trainable_variables().is_empty());

        let vs = nn::VarStore::new(Device::Cpu);
        let root = vs.root();
        let _bn = BatchNorm2DInit {
            trainable_affine: true,
            ..Default::default()
        }
        .build(&root / "bn", 8);
        assert_eq!(vs.trainable_variables().len(), 2);
    }

    #[test]
    fn eval_mode_uses_running_statistics() {
        let vs = nn::VarStore::new(Device::Cpu);
        let root = vs.root();
        let bn = BatchNorm2DInit::default().build(&root / "bn", 4);

        // fresh running stats are mean 0 / var 1, so eval mode is an identity
        // up to eps
        let input = Tensor::rand(&[2, 4, 5, 5], tch::kind::FLOAT_CPU);
        let output = bn.forward_t(&input, false);
        let diff = f64::from((&output - &input).abs().max());
        approx::assert_abs_diff_eq!(diff, 0.0, epsilon = 1e-4);
    }
}
