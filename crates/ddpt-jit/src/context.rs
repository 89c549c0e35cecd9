//! Process-wide compiler context: registered dialects and passes.
//!
//! The underlying compiler framework is single-threaded; the context is only
//! touched from the worker thread and records that invariant explicitly.

use std::collections::HashSet;

/// Threading mode of the compiler context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Threading {
    Disabled,
}

/// Dialects loadable by batch modules.
const DIALECTS: &[&str] = &[
    "func", "arith", "shape", "tensor", "linalg", "memref", "scf", "cf", "ndarray", "dist",
    "gpu", "spirv", "llvm",
];

/// Every pass name that may appear in a pipeline string.
const PASSES: &[&str] = &[
    "ndarray-dist",
    "convert-dist-to-standard",
    "convert-ndarray-to-linalg",
    "convert-shape-to-std",
    "arith-expand",
    "arith-bufferize",
    "linalg-init-tensor-to-alloc-tensor",
    "scf-bufferize",
    "shape-bufferize",
    "linalg-bufferize",
    "tensor-bufferize",
    "func-bufferize",
    "finalizing-bufferize",
    "convert-linalg-to-parallel-loops",
    "canonicalize",
    "cse",
    "lower-affine",
    "fold-memref-alias-ops",
    "gpu-map-parallel-loops",
    "convert-parallel-loops-to-gpu",
    "gpu-kernel-outlining",
    "convert-gpu-to-spirv",
    "serialize-spirv",
    "convert-gpux-to-llvm",
    "convert-scf-to-cf",
    "convert-memref-to-llvm",
    "convert-func-to-llvm",
    "reconcile-unrealized-casts",
];

/// One-per-process registration state.
pub struct Context {
    threading: Threading,
    dialects: Vec<&'static str>,
    passes: HashSet<&'static str>,
}

impl Context {
    pub fn new() -> Self {
        Context {
            threading: Threading::Disabled,
            dialects: DIALECTS.to_vec(),
            passes: PASSES.iter().copied().collect(),
        }
    }

    pub fn threading(&self) -> Threading {
        self.threading
    }

    pub fn dialects(&self) -> &[&'static str] {
        &self.dialects
    }

    pub fn registered_passes(&self) -> &HashSet<&'static str> {
        &self.passes
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
