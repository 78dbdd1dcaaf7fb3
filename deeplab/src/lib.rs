//! DeepLab v2 semantic segmentation network with a ResNet-101 backbone,
//! atrous spatial pyramid pooling and multi-scale fusion, built on tch.

pub mod aspp;
pub mod batch_norm;
pub mod common;
pub mod conv_bn_2d;
pub mod deeplab;
pub mod loss;
pub mod msc;
pub mod resnet;
pub mod tensor;

pub use crate::deeplab::{DeepLabV2, DeepLabV2Init};
pub use aspp::{Aspp, AsppInit};
pub use batch_norm::{BatchNorm2D, BatchNorm2DInit};
pub use conv_bn_2d::{ConvBn2D, ConvBn2DInit};
pub use loss::{CrossEntropyLoss2D, MultiScaleLoss};
pub use msc::{MultiScale, MultiScaleOutput};
pub use resnet::{Bottleneck, BottleneckInit, ResStage, ResStageInit};
pub use tensor::TensorExt;

/// Optimizer group holding the backbone convolution weights.
pub const BACKBONE_LR_GROUP: usize = 0;
/// Optimizer group holding the ASPP branch weights.
pub const ASPP_WEIGHT_LR_GROUP: usize = 1;
/// Optimizer group holding the ASPP branch biases.
pub const ASPP_BIAS_LR_GROUP: usize = 2;
