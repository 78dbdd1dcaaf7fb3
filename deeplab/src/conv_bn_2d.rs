use crate::{
    batch_norm::{BatchNorm2D, BatchNorm2DInit},
    common::*,
};

/// Fused convolution + batch normalization + optional ReLU unit.
#[derive(Debug, Clone)]
pub struct ConvBn2DInit {
    pub in_c: i64,
    pub out_c: i64,
    pub k: i64,
    pub s: i64,
    pub p: i64,
    pub d: i64,
    pub bias: bool,
    pub relu: bool,
    pub batch_norm: BatchNorm2DInit,
}

impl ConvBn2DInit {
    pub fn new(in_c: i64, out_c: i64, k: i64) -> Self {
        Self {
            in_c,
            out_c,
            k,
            s: 1,
            p: k / 2,
            d: 1,
            bias: false,
            relu: true,
            batch_norm: Default::default(),
        }
    }

    pub fn build<'p, P>(self, path: P) -> ConvBn2D
    where
        P: Borrow<nn::Path<'p>>,
    {
        let path = path.borrow();

        let Self {
            in_c,
            out_c,
            k,
            s,
            p,
            d,
            bias,
            relu,
            batch_norm,
        } = self;

        let conv = nn::conv2d(
            path / "conv",
            in_c,
            out_c,
            k,
            nn::ConvConfig {
                stride: s,
                padding: p,
                dilation: d,
                bias,
                ..Default::default()
            },
        );
        let bn = batch_norm.build(path / "bn", out_c);

        ConvBn2D { conv, bn, relu }
    }
}

#[derive(Debug)]
pub struct ConvBn2D {
    conv: nn::Conv2D,
    bn: BatchNorm2D,
    relu: bool,
}

impl nn::ModuleT for ConvBn2D {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Tensor {
        let Self {
            ref conv,
            ref bn,
            relu,
        } = *self;

        let xs = xs.apply(conv);
        let xs = bn.forward_t(&xs, train);

        if relu {
            xs.relu()
        } else {
            xs
        }
    }
}
