extern crate self as ddpt;

pub mod depman;
pub mod dtype;
mod env;
pub mod error;
pub mod ir;
pub mod ops;
pub mod registry;
pub mod runtime;
pub mod schedule;
pub mod tensor;
pub mod transceiver;

pub mod deferred;

pub use deferred::{Completion, FactoryId, Runnable};
pub use depman::DepManager;
pub use dtype::{DTypeId, Scalar};
pub use error::{RtResult, RuntimeError};
pub use registry::{Registry, NOGUID};
pub use runtime::Runtime;
pub use schedule::{InputBuffer, JitRunner};
pub use tensor::{ArrayFuture, NdArray};
