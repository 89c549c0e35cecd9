//! Engine options resolved from the environment.

use std::env;
use std::path::PathBuf;

use ddpt::error::{RtResult, RuntimeError};

fn env_nonempty(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => Some(value.trim().to_string()),
        _ => None,
    }
}

/// `DDPT_OPT_LEVEL` must be an integer in 0..=3; anything else is fatal.
pub fn parse_opt_level(value: &str) -> RtResult<u8> {
    match value.trim().parse::<u8>() {
        Ok(level) if level <= 3 => Ok(level),
        _ => Err(RuntimeError::compile_failure(format!(
            "DDPT_OPT_LEVEL must be 0..=3, got `{value}`"
        ))),
    }
}

/// `DDPT_USE_CACHE` enables the engine cache only for this value set.
pub fn parse_cache_flag(value: &str) -> bool {
    matches!(value.trim(), "1" | "y" | "Y" | "on" | "ON")
}

/// Host target triple used by the codegen stage.
pub fn host_triple() -> String {
    let arch = env::consts::ARCH;
    match env::consts::OS {
        "linux" => format!("{arch}-unknown-linux-gnu"),
        "macos" => format!("{arch}-apple-darwin"),
        "windows" => format!("{arch}-pc-windows-msvc"),
        other => format!("{arch}-unknown-{other}"),
    }
}

/// Immutable engine configuration, read once at engine construction.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub use_gpu: bool,
    pub use_cache: bool,
    pub opt_level: u8,
    pub verbose: u8,
    pub pipeline_override: Option<String>,
    pub idtr_so: PathBuf,
    pub gpux_so: Option<PathBuf>,
    pub mlir_root: Option<PathBuf>,
    pub imex_root: Option<PathBuf>,
    pub aot_tool: PathBuf,
    pub cache_dir: PathBuf,
    pub target: String,
}

impl EngineOptions {
    pub fn from_env() -> RtResult<Self> {
        let use_gpu = env_nonempty("DDPT_USE_GPU").is_some();
        let use_cache = env_nonempty("DDPT_USE_CACHE")
            .map(|v| parse_cache_flag(&v))
            .unwrap_or(true);
        let opt_level = match env_nonempty("DDPT_OPT_LEVEL") {
            Some(value) => parse_opt_level(&value)?,
            None => 3,
        };
        let verbose = env_nonempty("DDPT_VERBOSE")
            .and_then(|v| v.trim().parse::<u8>().ok())
            .unwrap_or(0);
        let mlir_root = env_nonempty("MLIRROOT").map(PathBuf::from);
        let imex_root = env_nonempty("IMEXROOT").map(PathBuf::from);
        let idtr_so = env_nonempty("DDPT_IDTR_SO")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("libidtr.so"));
        let gpux_so = if use_gpu {
            Some(env_nonempty("DDPT_GPUX_SO").map(PathBuf::from).unwrap_or_else(
                || match &imex_root {
                    Some(root) => root.join("lib").join("liblevel-zero-runtime.so"),
                    None => PathBuf::from("liblevel-zero-runtime.so"),
                },
            ))
        } else {
            None
        };
        let aot_tool = env_nonempty("DDPT_AOT")
            .map(PathBuf::from)
            .unwrap_or_else(|| match &mlir_root {
                Some(root) => root.join("bin").join("ddpt-aot"),
                None => PathBuf::from("ddpt-aot"),
            });
        let cache_dir = env_nonempty("DDPT_CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(".cache/ddpt-jit"));
        Ok(EngineOptions {
            use_gpu,
            use_cache,
            opt_level,
            verbose,
            pipeline_override: env_nonempty("DDPT_PASSES"),
            idtr_so,
            gpux_so,
            mlir_root,
            imex_root,
            aot_tool,
            cache_dir,
            target: host_triple(),
        })
    }
}
