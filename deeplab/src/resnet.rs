use crate::{
    common::*,
    conv_bn_2d::{ConvBn2D, ConvBn2DInit},
};

/// Bottleneck residual unit: 1x1 reduce, 3x3 (carrying the unit's stride and
/// dilation), 1x1 expand, plus a shortcut path.
#[derive(Debug, Clone)]
pub struct BottleneckInit {
    pub in_c: i64,
    pub mid_c: i64,
    pub out_c: i64,
    pub stride: i64,
    pub dilation: i64,
}

impl BottleneckInit {
    pub fn new(in_c: i64, mid_c: i64, out_c: i64) -> Self {
        Self {
            in_c,
            mid_c,
            out_c,
            stride: 1,
            dilation: 1,
        }
    }

    pub fn build<'p, P>(self, path: P) -> Result<Bottleneck>
    where
        P: Borrow<nn::Path<'p>>,
    {
        let path = path.borrow();

        let Self {
            in_c,
            mid_c,
            out_c,
            stride,
            dilation,
        } = self;

        ensure!(
            in_c > 0 && mid_c > 0 && out_c > 0,
            "channel counts must be positive, got in_c={}, mid_c={}, out_c={}",
            in_c,
            mid_c,
            out_c
        );
        ensure!(
            stride >= 1 && dilation >= 1,
            "stride and dilation must be at least 1, got stride={}, dilation={}",
            stride,
            dilation
        );

        let reduce = ConvBn2DInit {
            p: 0,
            ..ConvBn2DInit::new(in_c, mid_c, 1)
        }
        .build(path / "reduce");
        let conv = ConvBn2DInit {
            s: stride,
            p: dilation,
            d: dilation,
            ..ConvBn2DInit::new(mid_c, mid_c, 3)
        }
        .build(path / "conv");
        let expand = ConvBn2DInit {
            p: 0,
            relu: false,
            ..ConvBn2DInit::new(mid_c, out_c, 1)
        }
        .build(path / "expand");

        // the identity shortcut is only shape-compatible when neither the
        // channel count nor the spatial size changes
        let shortcut = if stride != 1 || in_c != out_c {
            let proj = ConvBn2DInit {
                s: stride,
                p: 0,
                relu: false,
                ..ConvBn2DInit::new(in_c, out_c, 1)
            }
            .build(path / "proj");
            Some(proj)
        } else {
            None
        };

        Ok(Bottleneck {
            reduce,
            conv,
            expand,
            shortcut,
        })
    }
}

#[derive(Debug)]
pub struct Bottleneck {
    reduce: ConvBn2D,
    conv: ConvBn2D,
    expand: ConvBn2D,
    shortcut: Option<ConvBn2D>,
}

impl nn::ModuleT for Bottleneck {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Tensor {
        let Self {
            ref reduce,
            ref conv,
            ref expand,
            ref shortcut,
        } = *self;

        let ys = reduce.forward_t(xs, train);
        let ys = conv.forward_t(&ys, train);
        let ys = expand.forward_t(&ys, train);

        let identity = match shortcut {
            Some(proj) => proj.forward_t(xs, train),
            None => xs.shallow_clone(),
        };

        (ys + identity).relu()
    }
}

/// A stack of bottleneck units. The first unit performs the channel/stride
/// transition; the remaining units keep the output width.
#[derive(Debug, Clone)]
pub struct ResStageInit {
    pub num_blocks: usize,
    pub in_c: i64,
    pub mid_c: i64,
    pub out_c: i64,
    pub stride: i64,
    pub dilation: i64,
}

impl ResStageInit {
    pub fn build<'p, P>(self, path: P) -> Result<ResStage>
    where
        P: Borrow<nn::Path<'p>>,
    {
        let path = path.borrow();

        let Self {
            num_blocks,
            in_c,
            mid_c,
            out_c,
            stride,
            dilation,
        } = self;

        ensure!(num_blocks >= 1, "a residual stage needs at least one block");

        let blocks: Vec<_> = (0..num_blocks)
            .map(|index| {
                let init = if index == 0 {
                    BottleneckInit {
                        stride,
                        dilation,
                        ..BottleneckInit::new(in_c, mid_c, out_c)
                    }
                } else {
                    BottleneckInit {
                        dilation,
                        ..BottleneckInit::new(out_c, mid_c, out_c)
                    }
                };
                init.build(path / format!("block{}", index + 1))
            })
            .try_collect()?;

        Ok(ResStage { blocks })
    }
}

#[derive(Debug)]
pub struct ResStage {
    blocks: Vec<Bottleneck>,
}

impl nn::ModuleT for ResStage {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Tensor {
        self.blocks
            .iter()
            .fold(xs.shallow_clone(), |xs, block| block.forward_t(&xs, train))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bottleneck_shortcut_matches_main_path() -> Result<()> {
        let vs = nn::VarStore::new(Device::Cpu);
        let root = vs.root();
        let input = Tensor::rand(&[1, 16, 33, 33], tch::kind::FLOAT_CPU);

        // the reference per-stage stride/dilation policy
        for (index, &(stride, dilation)) in [(1, 1), (2, 1), (1, 2), (1, 4)].iter().enumerate() {
            let block = BottleneckInit {
                stride,
                dilation,
                ..BottleneckInit::new(16, 8, 32)
            }
            .build(&root / format!("block{}", index))?;
            let output = block.forward_t(&input, false);

            let expect_side = (33 - 1) / stride + 1;
            assert_eq!(output.size(), vec![1, 32, expect_side, expect_side]);
        }

        Ok(())
    }

    #[test]
    fn identity_shortcut_when_shapes_agree() -> Result<()> {
        let vs = nn::VarStore::new(Device::Cpu);
        let root = vs.root();

        let block = BottleneckInit::new(32, 8, 32).build(&root / "same")?;
        assert!(block.shortcut.is_none());

        let block = BottleneckInit::new(16, 8, 32).build(&root / "widen")?;
        assert!(block.shortcut.is_some());

        let block = BottleneckInit {
            stride: 2,
            ..BottleneckInit::new(32, 8, 32)
        }
        .build(&root / "strided")?;
        assert!(block.shortcut.is_some());

        Ok(())
    }

    #[test]
    fn stage_rejects_bad_configuration() {
        let vs = nn::VarStore::new(Device::Cpu);
        let root = vs.root();

        let result = ResStageInit {
            num_blocks: 0,
            in_c: 16,
            mid_c: 8,
            out_c: 32,
            stride: 1,
            dilation: 1,
        }
        .build(&root / "empty");
        assert!(result.is_err());

        let result = BottleneckInit::new(16, 0, 32).build(&root / "zero_mid");
        assert!(result.is_err());
    }

    #[test]
    fn stage_chains_blocks() -> Result<()> {
        let vs = nn::VarStore::new(Device::Cpu);
        let root = vs.root();

        let stage = ResStageInit {
            num_blocks: 3,
            in_c: 16,
            mid_c: 8,
            out_c: 32,
            stride: 2,
            dilation: 1,
        }
        .build(&root / "stage")?;
        let input = Tensor::rand(&[2, 16, 32, 32], tch::kind::FLOAT_CPU);
        let output = stage.forward_t(&input, false);
        assert_eq!(output.size(), vec![2, 32, 16, 16]);
        Ok(())
    }
}
