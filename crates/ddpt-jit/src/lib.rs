//! Native JIT engine.
//!
//! Owns the compiler context, the pass pipeline and the content-addressed
//! engine cache, and implements the scheduler's [`JitRunner`] contract:
//! lower the batch module, reuse or build an execution engine, and invoke
//! the packed entry point once.

mod cache;
mod context;
mod engine;
mod options;
mod pipeline;

pub use cache::{sha1_hex, EngineCache};
pub use context::{Context, Threading};
pub use engine::{runtime_libraries, ExecutionEngine};
pub use options::{host_triple, parse_cache_flag, parse_opt_level, EngineOptions};
pub use pipeline::{PassPipeline, PassSpec, PipelineBuilder};

use std::ffi::c_void;
use std::sync::Arc;

use ddpt::error::RtResult;
use ddpt::ir::Module;
use ddpt::runtime::Runtime;
use ddpt::schedule::{InputBuffer, JitRunner};

pub struct JitEngine {
    context: Context,
    options: EngineOptions,
    // Rendered once at construction; immutable afterwards.
    pipeline: String,
    cache: EngineCache<ExecutionEngine>,
}

impl JitEngine {
    /// Builds the process-wide engine state from the environment.
    pub fn new() -> RtResult<Self> {
        let options = EngineOptions::from_env()?;
        let context = Context::new();
        let pipeline = match &options.pipeline_override {
            Some(text) => PassPipeline::parse(text)?,
            None if options.use_gpu => PassPipeline::gpu(),
            None => PassPipeline::cpu(),
        };
        pipeline.validate(context.registered_passes())?;
        let rendered = pipeline.to_string();
        if options.verbose >= 1 {
            eprintln!("[ddpt-jit] pass pipeline: {rendered}");
        }
        Ok(JitEngine {
            context,
            options,
            pipeline: rendered,
            cache: EngineCache::new(),
        })
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn pipeline(&self) -> &str {
        &self.pipeline
    }

    /// Engines built so far; stays flat across cache hits.
    pub fn engines_built(&self) -> usize {
        self.cache.builds()
    }

    fn compile(&self, text: &str) -> RtResult<Arc<ExecutionEngine>> {
        let key = sha1_hex(text);
        if self.options.use_cache {
            let (engine, _hit) = self.cache.get_or_try_insert_with(&key, || {
                ExecutionEngine::build(text, &key, &self.pipeline, &self.options)
            })?;
            Ok(engine)
        } else {
            Ok(Arc::new(ExecutionEngine::build(
                text,
                &key,
                &self.pipeline,
                &self.options,
            )?))
        }
    }
}

impl JitRunner for JitEngine {
    fn run(
        &mut self,
        module: &Module,
        fname: &str,
        inputs: &[InputBuffer],
        out: &mut [isize],
    ) -> RtResult<()> {
        let text = module.to_string();
        if self.options.verbose >= 2 {
            eprintln!("{text}");
        }
        let engine = self.compile(&text)?;

        // Packed argument vector: the output-buffer slot first (only when
        // the function returns anything), then one slot per input pointer.
        // The slot storage must outlive the call.
        let mut out_ptr: *mut isize = out.as_mut_ptr();
        let mut input_ptrs: Vec<*mut c_void> = inputs
            .iter()
            .map(|buffer| buffer.as_ptr() as *mut c_void)
            .collect();
        let mut packed: Vec<*mut c_void> = Vec::with_capacity(input_ptrs.len() + 1);
        if !out.is_empty() {
            packed.push(&mut out_ptr as *mut *mut isize as *mut c_void);
        }
        for slot in input_ptrs.iter_mut() {
            packed.push(slot as *mut *mut c_void as *mut c_void);
        }
        engine.invoke_packed(&format!("_mlir_ciface_{fname}"), &mut packed)
    }
}

/// Spawns a runtime around a freshly constructed native engine.
pub fn init() -> RtResult<Runtime> {
    Ok(Runtime::init(JitEngine::new()?))
}
