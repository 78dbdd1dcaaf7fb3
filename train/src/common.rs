//! Common imports from external crates.

pub use anyhow::{bail, ensure, format_err, Context, Error, Result};
pub use chrono::{DateTime, Local};
pub use deeplab::{
    CrossEntropyLoss2D, DeepLabV2, DeepLabV2Init, MultiScale, MultiScaleLoss, MultiScaleOutput,
    TensorExt, ASPP_BIAS_LR_GROUP, ASPP_WEIGHT_LR_GROUP, BACKBONE_LR_GROUP,
};
pub use itertools::{izip, Itertools};
pub use noisy_float::prelude::*;
pub use rand::{prelude::*, rngs::StdRng, seq::SliceRandom};
pub use serde::{Deserialize, Serialize};
pub use std::{
    borrow::Borrow,
    collections::VecDeque,
    fmt::Debug,
    fs,
    num::NonZeroUsize,
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};
pub use tch::{
    nn::{self, ModuleT as _, OptimizerConfig as _},
    vision, Device, IndexOp, Kind, Reduction, Tensor,
};
pub use tracing::{error, info, warn};

pub type Fallible<T> = Result<T, Error>;
