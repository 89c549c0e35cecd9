//! Execution engines built from lowered batch modules.
//!
//! The module text is lowered and compiled to a shared object by the
//! external `ddpt-aot` helper, then loaded with the runtime libraries the
//! generated code links against. Invocation uses the packed C ABI: every
//! argument travels as a `void*` slot.

use std::ffi::c_void;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use ddpt::error::{RtResult, RuntimeError};
use libloading::Library;
use serde::Deserialize;

use crate::options::EngineOptions;

/// Metadata manifest written by the codegen stage.
#[derive(Debug, Deserialize)]
struct AotMeta {
    entry_points: Vec<String>,
}

/// Shared libraries every compiled module needs at runtime: the host runner
/// utilities and the distributed runtime, plus the device runtime on GPU.
pub fn runtime_libraries(options: &EngineOptions) -> Vec<PathBuf> {
    fn mlir_lib(root: &Option<PathBuf>, name: &str) -> PathBuf {
        match root {
            Some(root) => root.join("lib").join(name),
            None => PathBuf::from(name),
        }
    }
    let mut libs = vec![
        mlir_lib(&options.mlir_root, "libmlir_c_runner_utils.so"),
        mlir_lib(&options.mlir_root, "libmlir_runner_utils.so"),
        options.idtr_so.clone(),
    ];
    if let Some(gpux) = &options.gpux_so {
        libs.push(gpux.clone());
    }
    libs
}

type PackedFn = unsafe extern "C" fn(*mut *mut c_void);

/// A loaded, invocable compilation of one batch module.
pub struct ExecutionEngine {
    // Keep the runtime libraries alive for as long as the module object.
    _runtime_libs: Vec<Library>,
    module_lib: Library,
    entry_points: Vec<String>,
}

impl ExecutionEngine {
    /// Lowers, compiles and loads `text`. `key` names the scratch files in
    /// the cache directory.
    pub(crate) fn build(
        text: &str,
        key: &str,
        pipeline: &str,
        options: &EngineOptions,
    ) -> RtResult<Self> {
        fs::create_dir_all(&options.cache_dir).map_err(|err| {
            RuntimeError::compile_failure(format!(
                "cannot create {}: {err}",
                options.cache_dir.display()
            ))
        })?;
        let module_path = options.cache_dir.join(format!("module_{key}.mlir"));
        let lowered_path = options.cache_dir.join(format!("module_{key}.lowered.mlir"));
        let object_path = options.cache_dir.join(format!("module_{key}.so"));
        let meta_path = options.cache_dir.join(format!("module_{key}.meta.json"));

        fs::write(&module_path, text).map_err(|err| {
            RuntimeError::compile_failure(format!("cannot write module text: {err}"))
        })?;

        run_lower(options, pipeline, &module_path, &lowered_path)?;
        if options.verbose >= 3 {
            if let Ok(lowered) = fs::read_to_string(&lowered_path) {
                eprintln!("{lowered}");
            }
        }
        run_codegen(options, &lowered_path, &object_path, &meta_path)?;

        let meta: AotMeta = serde_json::from_str(
            &fs::read_to_string(&meta_path).map_err(|err| {
                RuntimeError::compile_failure(format!("cannot read codegen manifest: {err}"))
            })?,
        )
        .map_err(|err| {
            RuntimeError::compile_failure(format!("malformed codegen manifest: {err}"))
        })?;

        let mut runtime_libs = Vec::new();
        for path in runtime_libraries(options) {
            // SAFETY: loading only; no symbols are invoked until the packed
            // entry point runs.
            let lib = unsafe { Library::new(&path) }.map_err(|err| {
                RuntimeError::compile_failure(format!(
                    "cannot load runtime library {}: {err}",
                    path.display()
                ))
            })?;
            runtime_libs.push(lib);
        }
        // SAFETY: the object was produced by the codegen stage for this
        // process' target; its constructors are trivial.
        let module_lib = unsafe { Library::new(&object_path) }.map_err(|err| {
            RuntimeError::compile_failure(format!(
                "cannot load compiled module {}: {err}",
                object_path.display()
            ))
        })?;

        Ok(ExecutionEngine {
            _runtime_libs: runtime_libs,
            module_lib,
            entry_points: meta.entry_points,
        })
    }

    pub fn entry_points(&self) -> &[String] {
        &self.entry_points
    }

    /// Invokes a packed-ABI entry point.
    ///
    /// `args` is the flat slot array: `[&out_ptr, &in_ptr_0, ..]`; the slots
    /// must stay valid for the duration of the call.
    pub fn invoke_packed(&self, symbol: &str, args: &mut [*mut c_void]) -> RtResult<()> {
        if !self.entry_points.iter().any(|entry| entry == symbol) {
            return Err(RuntimeError::LookupFailure {
                symbol: symbol.to_string(),
            });
        }
        // SAFETY: the symbol was declared by the codegen manifest with the
        // packed signature `void (void**)`.
        let entry: libloading::Symbol<'_, PackedFn> =
            unsafe { self.module_lib.get(symbol.as_bytes()) }.map_err(|_| {
                RuntimeError::LookupFailure {
                    symbol: symbol.to_string(),
                }
            })?;
        // SAFETY: caller guarantees every slot points at storage that lives
        // across the call; the compiled function only reads the slots.
        unsafe { entry(args.as_mut_ptr()) };
        Ok(())
    }
}

fn run_lower(
    options: &EngineOptions,
    pipeline: &str,
    input: &Path,
    output: &Path,
) -> RtResult<()> {
    let mut cmd = Command::new(&options.aot_tool);
    cmd.arg("lower")
        .arg("--pipeline")
        .arg(pipeline)
        .arg("--in")
        .arg(input)
        .arg("--out")
        .arg(output);
    if options.verbose >= 3 {
        cmd.arg("--timing");
    }
    if options.verbose >= 4 {
        cmd.arg("--print-ir-after-all");
    }
    let result = cmd.output().map_err(|err| {
        RuntimeError::pass_failure(format!(
            "failed to run {}: {err}",
            options.aot_tool.display()
        ))
    })?;
    if !result.status.success() {
        let stderr = String::from_utf8_lossy(&result.stderr);
        return Err(RuntimeError::pass_failure(format!(
            "lowering failed (status {}): {}",
            result.status,
            stderr.trim()
        )));
    }
    Ok(())
}

fn run_codegen(
    options: &EngineOptions,
    input: &Path,
    object: &Path,
    meta: &Path,
) -> RtResult<()> {
    let shared_libs = runtime_libraries(options)
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(",");
    let result = Command::new(&options.aot_tool)
        .arg("codegen")
        .arg("--opt-level")
        .arg(options.opt_level.to_string())
        .arg("--size-level")
        .arg("0")
        .arg("--target")
        .arg(&options.target)
        .arg("--shared-libs")
        .arg(shared_libs)
        .arg("--in")
        .arg(input)
        .arg("--out")
        .arg(object)
        .arg("--meta")
        .arg(meta)
        .output()
        .map_err(|err| {
            RuntimeError::compile_failure(format!(
                "failed to run {}: {err}",
                options.aot_tool.display()
            ))
        })?;
    if !result.status.success() {
        let stderr = String::from_utf8_lossy(&result.stderr);
        return Err(RuntimeError::compile_failure(format!(
            "codegen failed (status {}): {}",
            result.status,
            stderr.trim()
        )));
    }
    Ok(())
}
