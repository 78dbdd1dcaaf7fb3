use crate::{
    common::*,
    deeplab::{DeepLabV2, DeepLabV2Init},
    tensor::TensorExt as _,
};

/// Multi-scale fusion wrapper.
///
/// Runs the wrapped network on the input at 100%, 75% and 50% of its
/// resolution, upsamples the reduced-scale score maps back to the 100%-scale
/// output size and fuses them with an elementwise maximum. Training mode
/// returns the ordered bundle [100%, 75%, 50%, fused]; evaluation mode
/// returns the fused map only. The computation is identical in both modes.
#[derive(Debug)]
pub struct MultiScale {
    scale: DeepLabV2,
}

impl MultiScale {
    pub fn new(scale: DeepLabV2) -> Self {
        Self { scale }
    }

    /// Builds the reference DeepLab v2 ResNet-101 network wrapped in
    /// multi-scale fusion. The wrapped network lives under the "scale"
    /// sub-path so parameter names line up with reference checkpoints.
    pub fn deeplab_v2_resnet_101<'p, P>(path: P, n_classes: i64) -> Result<Self>
    where
        P: Borrow<nn::Path<'p>>,
    {
        let path = path.borrow();
        let scale = DeepLabV2Init::resnet_101(n_classes).build(path / "scale")?;
        Ok(Self::new(scale))
    }

    pub fn scale_net(&self) -> &DeepLabV2 {
        &self.scale
    }

    pub fn scale_net_mut(&mut self) -> &mut DeepLabV2 {
        &mut self.scale
    }

    pub fn forward_t(&self, xs: &Tensor, train: bool) -> Result<MultiScaleOutput> {
        let (_b, _c, in_h, in_w) = xs.size4()?;

        let output_full = self.scale.forward_t(xs, train);
        let (out_h, out_w) = output_full.spatial_size()?;

        let h075 = (in_h as f64 * 0.75) as i64;
        let w075 = (in_w as f64 * 0.75) as i64;
        let h050 = (in_h as f64 * 0.5) as i64;
        let w050 = (in_w as f64 * 0.5) as i64;

        let input075 = xs.f_resize2d_bilinear(h075, w075)?;
        let input050 = xs.f_resize2d_bilinear(h050, w050)?;
        let output075 = self.scale.forward_t(&input075, train);
        let output050 = self.scale.forward_t(&input050, train);

        let up075 = output075.f_resize2d_bilinear(out_h, out_w)?;
        let up050 = output050.f_resize2d_bilinear(out_h, out_w)?;

        let fused = Tensor::f_max_tensors([&output_full, &up075, &up050])?;

        let outputs = if train {
            vec![output_full, output075, output050, fused]
        } else {
            vec![fused]
        };
        Ok(MultiScaleOutput { outputs })
    }
}

/// Score maps produced by one forward pass of [MultiScale]. Created fresh
/// per call and meant to be consumed immediately by the loss or decision
/// step.
#[derive(Debug)]
pub struct MultiScaleOutput {
    outputs: Vec<Tensor>,
}

impl MultiScaleOutput {
    /// The score maps in fixed order: [100%, 75%, 50%, fused] in training
    /// mode, [fused] in evaluation mode.
    pub fn outputs(&self) -> &[Tensor] {
        &self.outputs
    }

    /// The fused score map.
    pub fn fused(&self) -> &Tensor {
        self.outputs.last().unwrap()
    }

    pub fn into_outputs(self) -> Vec<Tensor> {
        self.outputs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_model(path: &nn::Path, n_classes: i64) -> Result<MultiScale> {
        let scale = DeepLabV2Init {
            n_blocks: [1, 1, 1, 1],
            ..DeepLabV2Init::resnet_101(n_classes)
        }
        .build(path / "scale")?;
        Ok(MultiScale::new(scale))
    }

    #[test]
    fn output_arity_per_mode() -> Result<()> {
        let vs = nn::VarStore::new(Device::Cpu);
        let root = vs.root();
        let model = tiny_model(&root, 3)?;

        let input = Tensor::rand(&[1, 3, 65, 65], tch::kind::FLOAT_CPU);
        let train_output = model.forward_t(&input, true)?;
        assert_eq!(train_output.outputs().len(), 4);
        let eval_output = model.forward_t(&input, false)?;
        assert_eq!(eval_output.outputs().len(), 1);
        Ok(())
    }

    #[test]
    fn fused_is_elementwise_maximum() -> Result<()> {
        let vs = nn::VarStore::new(Device::Cpu);
        let root = vs.root();
        let model = tiny_model(&root, 3)?;

        let input = Tensor::rand(&[1, 3, 65, 65], tch::kind::FLOAT_CPU);
        let output = model.forward_t(&input, true)?;
        let [output_full, output075, output050, fused]: &[Tensor; 4] =
            output.outputs().try_into()?;

        let (out_h, out_w) = output_full.spatial_size()?;
        let expect = Tensor::f_max_tensors([
            &output_full.shallow_clone(),
            &output075.f_resize2d_bilinear(out_h, out_w)?,
            &output050.f_resize2d_bilinear(out_h, out_w)?,
        ])?;

        assert_eq!(fused.size(), expect.size());
        let diff = f64::from((fused - &expect).abs().max());
        assert!(diff < 1e-6, "diff = {}", diff);
        Ok(())
    }

    #[test]
    fn reduced_scales_have_reduced_outputs() -> Result<()> {
        let vs = nn::VarStore::new(Device::Cpu);
        let root = vs.root();
        let model = tiny_model(&root, 3)?;

        let input = Tensor::rand(&[1, 3, 65, 65], tch::kind::FLOAT_CPU);
        let output = model.forward_t(&input, true)?;
        let outputs = output.outputs();

        // scales run at 65, floor(65*0.75) = 48 and floor(65*0.5) = 32
        assert_eq!(outputs[0].spatial_size()?, (9, 9));
        assert_eq!(outputs[1].spatial_size()?, (7, 7));
        assert_eq!(outputs[2].spatial_size()?, (5, 5));
        assert_eq!(outputs[3].spatial_size()?, (9, 9));
        Ok(())
    }
}
