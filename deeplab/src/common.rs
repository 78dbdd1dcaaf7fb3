//! Common imports from external crates.

pub use anyhow::{bail, ensure, format_err, Context, Error, Result};
pub use itertools::{izip, Itertools};
pub use log::warn;
pub use noisy_float::prelude::*;
pub use std::{
    borrow::Borrow,
    fmt::Debug,
    sync::Once,
};
pub use tch::{
    nn::{self, ModuleT as _},
    Device, IndexOp, Kind, Reduction, Tensor,
};

pub type Fallible<T> = Result<T, Error>;
