use std::env;
use std::fs;
use std::path::PathBuf;

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let mut args = env::args().skip(1);
    let Some(cmd) = args.next() else {
        print_help();
        return Ok(());
    };

    match cmd.as_str() {
        "--help" | "-h" | "help" => {
            print_help();
            Ok(())
        }
        "version" | "--version" | "-V" => {
            println!("ddpt-aot 0.1.0");
            Ok(())
        }
        "lower" => run_lower(args.collect()),
        "codegen" => run_codegen(args.collect()),
        other => Err(format!("unknown command '{other}'")),
    }
}

struct FlagParser {
    raw: Vec<String>,
    index: usize,
}

impl FlagParser {
    fn new(raw: Vec<String>) -> Self {
        FlagParser { raw, index: 0 }
    }

    fn next(&mut self) -> Option<String> {
        let item = self.raw.get(self.index).cloned();
        self.index += 1;
        item
    }

    fn value(&mut self, flag: &str) -> Result<String, String> {
        self.next()
            .ok_or_else(|| format!("missing value for {flag}"))
    }
}

fn run_lower(raw_args: Vec<String>) -> Result<(), String> {
    let mut pipeline: Option<String> = None;
    let mut input: Option<PathBuf> = None;
    let mut output: Option<PathBuf> = None;
    let mut timing = false;
    let mut print_ir = false;

    let mut parser = FlagParser::new(raw_args);
    while let Some(flag) = parser.next() {
        match flag.as_str() {
            "--pipeline" => pipeline = Some(parser.value("--pipeline")?),
            "--in" => input = Some(PathBuf::from(parser.value("--in")?)),
            "--out" => output = Some(PathBuf::from(parser.value("--out")?)),
            "--timing" => timing = true,
            "--print-ir-after-all" => print_ir = true,
            other => return Err(format!("unknown lower flag '{other}'")),
        }
    }

    let pipeline = pipeline.ok_or_else(|| "missing required --pipeline".to_string())?;
    let input = input.ok_or_else(|| "missing required --in".to_string())?;
    let output = output.ok_or_else(|| "missing required --out".to_string())?;

    let source = fs::read_to_string(&input)
        .map_err(|e| format!("failed to read input {}: {e}", input.display()))?;
    if source.trim().is_empty() {
        return Err(format!("input module {} is empty", input.display()));
    }

    // Placeholder lowering: annotate instead of transforming. The real pass
    // pipeline runs inside the MLIR-based toolchain this tool fronts; this
    // bootstrap locks the CLI contract so the engine can be driven end to
    // end before that toolchain is wired in.
    let mut lowered = String::new();
    lowered.push_str("// ddpt-aot lowered module (bootstrap artifact, non-executable)\n");
    lowered.push_str(&format!("// pipeline: {pipeline}\n"));
    if timing {
        lowered.push_str("// timing: requested\n");
    }
    if print_ir {
        lowered.push_str("// print-ir-after-all: requested\n");
    }
    lowered.push_str(&source);

    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("failed to create output dir {}: {e}", parent.display()))?;
    }
    fs::write(&output, lowered)
        .map_err(|e| format!("failed to write output {}: {e}", output.display()))?;
    println!("lowered {} -> {}", input.display(), output.display());
    Ok(())
}

fn run_codegen(raw_args: Vec<String>) -> Result<(), String> {
    let mut opt_level: Option<String> = None;
    let mut size_level: Option<String> = None;
    let mut target: Option<String> = None;
    let mut shared_libs: Option<String> = None;
    let mut input: Option<PathBuf> = None;
    let mut output: Option<PathBuf> = None;
    let mut meta: Option<PathBuf> = None;

    let mut parser = FlagParser::new(raw_args);
    while let Some(flag) = parser.next() {
        match flag.as_str() {
            "--opt-level" => opt_level = Some(parser.value("--opt-level")?),
            "--size-level" => size_level = Some(parser.value("--size-level")?),
            "--target" => target = Some(parser.value("--target")?),
            "--shared-libs" => shared_libs = Some(parser.value("--shared-libs")?),
            "--in" => input = Some(PathBuf::from(parser.value("--in")?)),
            "--out" => output = Some(PathBuf::from(parser.value("--out")?)),
            "--meta" => meta = Some(PathBuf::from(parser.value("--meta")?)),
            other => return Err(format!("unknown codegen flag '{other}'")),
        }
    }

    let opt_level = opt_level.ok_or_else(|| "missing required --opt-level".to_string())?;
    let target = target.ok_or_else(|| "missing required --target".to_string())?;
    let input = input.ok_or_else(|| "missing required --in".to_string())?;
    let output = output.ok_or_else(|| "missing required --out".to_string())?;
    let meta = meta.ok_or_else(|| "missing required --meta".to_string())?;

    let source = fs::read_to_string(&input)
        .map_err(|e| format!("failed to read input {}: {e}", input.display()))?;

    let entry_points = collect_entry_points(&source);
    if entry_points.is_empty() {
        return Err(format!("no functions found in {}", input.display()));
    }

    let object = format!(
        "// ddpt-aot placeholder shared object (bootstrap artifact, non-executable)\n\
         // target: {target}\n\
         // opt-level: {opt_level}\n\
         // size-level: {size}\n\
         // shared-libs: {libs}\n",
        size = size_level.as_deref().unwrap_or("0"),
        libs = shared_libs.as_deref().unwrap_or("")
    );
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("failed to create output dir {}: {e}", parent.display()))?;
    }
    fs::write(&output, object)
        .map_err(|e| format!("failed to write output {}: {e}", output.display()))?;

    let manifest = encode_meta_json(&entry_points);
    if let Some(parent) = meta.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("failed to create metadata dir {}: {e}", parent.display()))?;
    }
    fs::write(&meta, manifest)
        .map_err(|e| format!("failed to write metadata {}: {e}", meta.display()))?;

    println!("compiled {} -> {}", input.display(), output.display());
    println!("metadata {}", meta.display());
    Ok(())
}

/// Packed-ABI entry symbols, one per function in the module text.
fn collect_entry_points(source: &str) -> Vec<String> {
    let mut symbols = Vec::new();
    for line in source.lines() {
        let trimmed = line.trim_start();
        if let Some(rest) = trimmed.strip_prefix("func @") {
            if let Some(end) = rest.find('(') {
                symbols.push(format!("_mlir_ciface_{}", &rest[..end]));
            }
        }
    }
    symbols
}

fn encode_meta_json(entry_points: &[String]) -> String {
    let entries = entry_points
        .iter()
        .map(|symbol| format!("\"{}\"", json_escape(symbol)))
        .collect::<Vec<_>>()
        .join(", ");
    format!("{{\n  \"entry_points\": [{entries}]\n}}\n")
}

fn json_escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(ch),
        }
    }
    out
}

fn print_help() {
    println!("ddpt-aot 0.1.0");
    println!("Usage:");
    println!("  ddpt-aot lower --pipeline <passes> --in <module.mlir> --out <module.lowered.mlir> [--timing] [--print-ir-after-all]");
    println!("  ddpt-aot codegen --opt-level <0-3> --size-level 0 --target <triple> --shared-libs <a,b> --in <module.lowered.mlir> --out <module.so> --meta <module.meta.json>");
    println!("  ddpt-aot version");
}
