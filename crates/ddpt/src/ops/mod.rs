//! Operation front-ends: producers of deferred nodes.
//!
//! Each front-end stages IR through the dependency manager and registers the
//! delivery callback that materialises the owning future once the batch ran.

mod creator;
mod ewops;
mod manip;
mod reduce;
mod service;

pub use ewops::{EwBinOp, EwUnyOp};
pub use reduce::ReduceOp;

use std::sync::Arc;

use crate::depman::DepManager;
use crate::error::RtResult;
use crate::ir::ValueId;
use crate::tensor::{ArrayFuture, NdArray};

/// Registers `value` as the staged result of `out` together with the
/// delivery callback that copies the descriptor fields into a materialised
/// array. Every value registration pairs with a delivery callback.
pub(crate) fn deliver_into(
    dm: &mut DepManager,
    out: &ArrayFuture,
    value: ValueId,
) -> RtResult<bool> {
    let target = out.clone();
    let dtype = out.dtype();
    let team = out.team();
    let balanced = out.balanced();
    dm.add_value(
        out.guid(),
        value,
        Box::new(move |delivered| {
            let array = NdArray::from_delivered(dtype, team, balanced, &delivered)?;
            target.set_value(Arc::new(array));
            Ok(())
        }),
    )?;
    Ok(false)
}
