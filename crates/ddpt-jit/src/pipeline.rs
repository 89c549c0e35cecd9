//! Pass pipeline assembly, parsing and rendering.
//!
//! Two baseline pipelines exist, cpu and gpu, assembled from a fixed ordered
//! sequence of named passes. The ordering is load-bearing: distributed
//! lowering must run before array-to-loop lowering, bufferisation must
//! precede loop-to-CF lowering, and the GPU block splices in between loop
//! generation and the final LLVM lowering.

use std::collections::HashSet;
use std::fmt;

use ddpt::error::{RtResult, RuntimeError};

/// One pipeline step: a pass, or a sequence nested under an op anchor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassSpec {
    Pass(String),
    Nested {
        anchor: String,
        passes: Vec<PassSpec>,
    },
}

/// Ordered, named sequence of compiler passes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PassPipeline {
    steps: Vec<PassSpec>,
}

/// Incremental pipeline builder.
pub struct PipelineBuilder {
    steps: Vec<PassSpec>,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        PipelineBuilder { steps: Vec::new() }
    }

    pub fn pass(&mut self, name: &str) {
        self.steps.push(PassSpec::Pass(name.to_string()));
    }

    pub fn nested<F>(&mut self, anchor: &str, build: F)
    where
        F: FnOnce(&mut PipelineBuilder),
    {
        let mut inner = PipelineBuilder::new();
        build(&mut inner);
        self.steps.push(PassSpec::Nested {
            anchor: anchor.to_string(),
            passes: inner.steps,
        });
    }

    pub fn finish(self) -> PassPipeline {
        PassPipeline { steps: self.steps }
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn shared_prefix(p: &mut PipelineBuilder) {
    p.nested("func.func", |p| p.pass("ndarray-dist"));
    p.pass("convert-dist-to-standard");
    p.pass("convert-ndarray-to-linalg");
    p.pass("convert-shape-to-std");
    p.pass("arith-expand");
    p.pass("arith-bufferize");
    p.nested("func.func", |p| {
        p.pass("linalg-init-tensor-to-alloc-tensor");
        p.pass("scf-bufferize");
        p.pass("shape-bufferize");
        p.pass("linalg-bufferize");
        p.pass("tensor-bufferize");
    });
    p.pass("func-bufferize");
    p.nested("func.func", |p| {
        p.pass("finalizing-bufferize");
        p.pass("convert-linalg-to-parallel-loops");
    });
    p.pass("canonicalize");
    p.nested("func.func", |p| p.pass("lower-affine"));
    p.pass("fold-memref-alias-ops");
}

fn final_lowering(p: &mut PipelineBuilder) {
    p.pass("convert-scf-to-cf");
    p.pass("convert-memref-to-llvm");
    p.pass("convert-func-to-llvm");
    p.pass("reconcile-unrealized-casts");
}

impl PassPipeline {
    /// Baseline host pipeline.
    pub fn cpu() -> Self {
        let mut p = PipelineBuilder::new();
        shared_prefix(&mut p);
        final_lowering(&mut p);
        p.finish()
    }

    /// Baseline accelerator pipeline: kernel outlining, SPIR-V lowering and
    /// GPU runtime binding between loop generation and the final lowering.
    pub fn gpu() -> Self {
        let mut p = PipelineBuilder::new();
        shared_prefix(&mut p);
        p.nested("func.func", |p| p.pass("gpu-map-parallel-loops"));
        p.pass("convert-parallel-loops-to-gpu");
        p.pass("gpu-kernel-outlining");
        p.pass("convert-gpu-to-spirv");
        p.pass("serialize-spirv");
        p.pass("convert-gpux-to-llvm");
        final_lowering(&mut p);
        p.finish()
    }

    pub fn steps(&self) -> &[PassSpec] {
        &self.steps
    }

    /// Pass names in execution order, anchors stripped.
    pub fn flattened(&self) -> Vec<String> {
        fn walk(steps: &[PassSpec], out: &mut Vec<String>) {
            for step in steps {
                match step {
                    PassSpec::Pass(name) => out.push(name.clone()),
                    PassSpec::Nested { passes, .. } => walk(passes, out),
                }
            }
        }
        let mut out = Vec::new();
        walk(&self.steps, &mut out);
        out
    }

    /// Parses the textual pipeline syntax `a,b,anchor(c,d)`.
    pub fn parse(text: &str) -> RtResult<Self> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(RuntimeError::pass_failure("empty pass pipeline"));
        }
        Ok(PassPipeline {
            steps: parse_list(trimmed)?,
        })
    }

    /// Checks every pass name against the registered-pass table.
    pub fn validate(&self, registered: &HashSet<&'static str>) -> RtResult<()> {
        for name in self.flattened() {
            if !registered.contains(name.as_str()) {
                return Err(RuntimeError::pass_failure(format!(
                    "unregistered pass `{name}` in pipeline"
                )));
            }
        }
        Ok(())
    }
}

fn split_top_level(text: &str) -> RtResult<Vec<&str>> {
    let mut items = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (idx, ch) in text.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth = depth.checked_sub(1).ok_or_else(|| {
                    RuntimeError::pass_failure("unbalanced `)` in pass pipeline")
                })?;
            }
            ',' if depth == 0 => {
                items.push(&text[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(RuntimeError::pass_failure(
            "unbalanced `(` in pass pipeline",
        ));
    }
    items.push(&text[start..]);
    Ok(items)
}

fn parse_list(text: &str) -> RtResult<Vec<PassSpec>> {
    let mut steps = Vec::new();
    for item in split_top_level(text)? {
        let item = item.trim();
        if item.is_empty() {
            return Err(RuntimeError::pass_failure(
                "empty step in pass pipeline",
            ));
        }
        match item.find('(') {
            Some(open) => {
                if !item.ends_with(')') {
                    return Err(RuntimeError::pass_failure(format!(
                        "malformed nested step `{item}`"
                    )));
                }
                let anchor = item[..open].trim();
                if anchor.is_empty() {
                    return Err(RuntimeError::pass_failure(format!(
                        "nested step `{item}` is missing its anchor"
                    )));
                }
                let inner = &item[open + 1..item.len() - 1];
                steps.push(PassSpec::Nested {
                    anchor: anchor.to_string(),
                    passes: parse_list(inner)?,
                });
            }
            None => steps.push(PassSpec::Pass(item.to_string())),
        }
    }
    Ok(steps)
}

impl fmt::Display for PassSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PassSpec::Pass(name) => f.write_str(name),
            PassSpec::Nested { anchor, passes } => {
                write!(f, "{anchor}(")?;
                for (i, pass) in passes.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{pass}")?;
                }
                f.write_str(")")
            }
        }
    }
}

impl fmt::Display for PassPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.steps.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{step}")?;
        }
        Ok(())
    }
}
