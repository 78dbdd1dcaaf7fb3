use crate::common::*;

/// Extensions to [Tensor](tch::Tensor) for segmentation workloads.
pub trait TensorExt {
    /// Returns the (height, width) of a batched image tensor.
    fn spatial_size(&self) -> Result<(i64, i64)>;

    /// Resamples a (batch, channel, height, width) tensor with bilinear
    /// interpolation. The operation is differentiable.
    fn f_resize2d_bilinear(&self, new_height: i64, new_width: i64) -> Result<Tensor>;

    /// Resamples a (batch, channel, height, width) tensor with
    /// nearest-neighbor interpolation.
    fn f_resize2d_nearest(&self, new_height: i64, new_width: i64) -> Result<Tensor>;

    fn f_sum_tensors<T>(tensors: impl IntoIterator<Item = T>) -> Result<Tensor>
    where
        T: Borrow<Tensor>,
    {
        let mut iter = tensors.into_iter();
        let first = iter
            .next()
            .ok_or_else(|| format_err!("the input iterator must not be empty"))?
            .borrow()
            .shallow_clone();
        let sum = iter.try_fold(first, |lhs, rhs| lhs.f_add(rhs.borrow()))?;
        Ok(sum)
    }

    /// Computes the elementwise maximum across same-shaped tensors.
    fn f_max_tensors<T>(tensors: impl IntoIterator<Item = T>) -> Result<Tensor>
    where
        T: Borrow<Tensor>,
    {
        let tensors: Vec<_> = tensors
            .into_iter()
            .map(|tensor| tensor.borrow().shallow_clone())
            .collect();
        ensure!(!tensors.is_empty(), "the input iterator must not be empty");
        let stacked = Tensor::f_stack(&tensors, 0)?;
        let (max, _argmax) = stacked.max_dim(0, false);
        Ok(max)
    }

    fn has_nan(&self) -> bool;
}

impl TensorExt for Tensor {
    fn spatial_size(&self) -> Result<(i64, i64)> {
        let (_b, _c, height, width) = self.size4()?;
        Ok((height, width))
    }

    fn f_resize2d_bilinear(&self, new_height: i64, new_width: i64) -> Result<Tensor> {
        self.size4()?;
        ensure!(
            new_height > 0 && new_width > 0,
            "invalid target size ({}, {})",
            new_height,
            new_width
        );
        let resized =
            self.f_upsample_bilinear2d(&[new_height, new_width], true, None, None)?;
        Ok(resized)
    }

    fn f_resize2d_nearest(&self, new_height: i64, new_width: i64) -> Result<Tensor> {
        self.size4()?;
        ensure!(
            new_height > 0 && new_width > 0,
            "invalid target size ({}, {})",
            new_height,
            new_width
        );
        let resized = self.f_upsample_nearest2d(&[new_height, new_width], None, None)?;
        Ok(resized)
    }

    fn has_nan(&self) -> bool {
        bool::from(self.isnan().any())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resize2d_shapes() -> Result<()> {
        let input = Tensor::rand(&[2, 3, 16, 16], tch::kind::FLOAT_CPU);
        let resized = input.f_resize2d_bilinear(12, 8)?;
        assert_eq!(resized.size(), vec![2, 3, 12, 8]);
        let resized = input.f_resize2d_nearest(32, 32)?;
        assert_eq!(resized.size(), vec![2, 3, 32, 32]);
        assert!(input.f_resize2d_bilinear(0, 8).is_err());
        Ok(())
    }

    #[test]
    fn max_tensors_is_elementwise() -> Result<()> {
        let lhs = Tensor::of_slice(&[1f32, 5.0, 3.0]).view([1, 3]);
        let rhs = Tensor::of_slice(&[4f32, 2.0, 3.5]).view([1, 3]);
        let max = Tensor::f_max_tensors([&lhs, &rhs])?;
        let expect = Tensor::of_slice(&[4f32, 5.0, 3.5]).view([1, 3]);
        assert_eq!(f64::from((max - expect).abs().sum(Kind::Float)), 0.0);
        Ok(())
    }
}
