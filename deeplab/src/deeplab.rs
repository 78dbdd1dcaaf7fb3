use crate::{
    aspp::{Aspp, AsppInit},
    common::*,
    conv_bn_2d::{ConvBn2D, ConvBn2DInit},
    resnet::{ResStage, ResStageInit},
    BACKBONE_LR_GROUP,
};

/// DeepLab v2 composite network: 7x7 stem with max-pooling, four residual
/// stages and the ASPP classification head.
///
/// Stages three and four trade stride-2 downsampling for dilation, which
/// keeps the output stride at 8: the score map spatial size is
/// ceil(input / 8).
#[derive(Debug, Clone)]
pub struct DeepLabV2Init {
    pub n_classes: i64,
    pub n_blocks: [usize; 4],
    pub pyramids: Vec<i64>,
    /// Keep batch-norm statistics frozen even in training mode.
    pub freeze_bn: bool,
}

impl DeepLabV2Init {
    /// The reference ResNet-101 configuration.
    pub fn resnet_101(n_classes: i64) -> Self {
        Self {
            n_classes,
            n_blocks: [3, 4, 23, 3],
            pyramids: vec![6, 12, 18, 24],
            freeze_bn: true,
        }
    }

    pub fn build<'p, P>(self, path: P) -> Result<DeepLabV2>
    where
        P: Borrow<nn::Path<'p>>,
    {
        let path = path.borrow().set_group(BACKBONE_LR_GROUP);

        let Self {
            n_classes,
            n_blocks,
            pyramids,
            freeze_bn,
        } = self;

        ensure!(n_classes > 0, "n_classes must be positive, got {}", n_classes);

        let stem = ConvBn2DInit {
            s: 2,
            p: 3,
            ..ConvBn2DInit::new(3, 64, 7)
        }
        .build(&(&path / "layer1") / "conv1");

        // stage policy {stride, dilation}: {1,1} {2,1} {1,2} {1,4}
        let layer2 = ResStageInit {
            num_blocks: n_blocks[0],
            in_c: 64,
            mid_c: 64,
            out_c: 256,
            stride: 1,
            dilation: 1,
        }
        .build(&path / "layer2")?;
        let layer3 = ResStageInit {
            num_blocks: n_blocks[1],
            in_c: 256,
            mid_c: 128,
            out_c: 512,
            stride: 2,
            dilation: 1,
        }
        .build(&path / "layer3")?;
        let layer4 = ResStageInit {
            num_blocks: n_blocks[2],
            in_c: 512,
            mid_c: 256,
            out_c: 1024,
            stride: 1,
            dilation: 2,
        }
        .build(&path / "layer4")?;
        let layer5 = ResStageInit {
            num_blocks: n_blocks[3],
            in_c: 1024,
            mid_c: 512,
            out_c: 2048,
            stride: 1,
            dilation: 4,
        }
        .build(&path / "layer5")?;

        let aspp = AsppInit {
            in_c: 2048,
            out_c: n_classes,
            pyramids,
        }
        .build(&path / "aspp")?;

        Ok(DeepLabV2 {
            stem,
            layer2,
            layer3,
            layer4,
            layer5,
            aspp,
            freeze_bn,
        })
    }
}

#[derive(Debug)]
pub struct DeepLabV2 {
    stem: ConvBn2D,
    layer2: ResStage,
    layer3: ResStage,
    layer4: ResStage,
    layer5: ResStage,
    aspp: Aspp,
    freeze_bn: bool,
}

impl DeepLabV2 {
    pub fn set_freeze_bn(&mut self, freeze_bn: bool) {
        self.freeze_bn = freeze_bn;
    }
}

impl nn::ModuleT for DeepLabV2 {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Tensor {
        let Self {
            ref stem,
            ref layer2,
            ref layer3,
            ref layer4,
            ref layer5,
            ref aspp,
            freeze_bn,
        } = *self;

        // frozen statistics run every batch norm in evaluation mode
        let train = train && !freeze_bn;

        let xs = stem.forward_t(xs, train);
        let xs = xs.max_pool2d(&[3, 3], &[2, 2], &[1, 1], &[1, 1], true);
        let xs = layer2.forward_t(&xs, train);
        let xs = layer3.forward_t(&xs, train);
        let xs = layer4.forward_t(&xs, train);
        let xs = layer5.forward_t(&xs, train);
        aspp.forward_t(&xs, train)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_init(n_classes: i64) -> DeepLabV2Init {
        DeepLabV2Init {
            n_blocks: [1, 1, 1, 1],
            ..DeepLabV2Init::resnet_101(n_classes)
        }
    }

    #[test]
    fn output_stride_is_eight() -> Result<()> {
        let vs = nn::VarStore::new(Device::Cpu);
        let root = vs.root();
        let model = tiny_init(4).build(&root / "scale")?;

        for &side in &[513i64, 321] {
            let input = Tensor::rand(&[1, 3, side, side], tch::kind::FLOAT_CPU);
            let output = model.forward_t(&input, false);
            let expect = (side + 7) / 8;
            assert_eq!(output.size(), vec![1, 4, expect, expect]);
        }
        Ok(())
    }

    #[test]
    fn reference_configuration() {
        let init = DeepLabV2Init::resnet_101(21);
        assert_eq!(init.n_blocks, [3, 4, 23, 3]);
        assert_eq!(init.pyramids, vec![6, 12, 18, 24]);
        assert!(init.freeze_bn);
    }

    #[test]
    fn aspp_parameters_live_in_their_own_namespace() -> Result<()> {
        let vs = nn::VarStore::new(Device::Cpu);
        let root = vs.root();
        let _model = tiny_init(4).build(&root / "scale")?;

        let variables = vs.variables();
        assert!(variables.keys().any(|name| name.contains("aspp")));
        // only ASPP branches contribute trainable biases
        for name in variables.keys() {
            if name.ends_with("bias") && !name.contains("aspp") {
                let tensor = &variables[name];
                assert!(!tensor.requires_grad(), "{} should be frozen", name);
            }
        }
        Ok(())
    }
}
