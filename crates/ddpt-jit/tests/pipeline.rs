use ddpt_jit::{Context, PassPipeline};

fn position(flat: &[String], name: &str) -> usize {
    flat.iter()
        .position(|pass| pass == name)
        .unwrap_or_else(|| panic!("pass `{name}` missing from {flat:?}"))
}

#[test]
fn cpu_pipeline_orders_distributed_before_loop_lowering() {
    let flat = PassPipeline::cpu().flattened();
    assert!(position(&flat, "ndarray-dist") < position(&flat, "convert-dist-to-standard"));
    assert!(
        position(&flat, "convert-dist-to-standard")
            < position(&flat, "convert-ndarray-to-linalg")
    );
    assert!(
        position(&flat, "convert-ndarray-to-linalg")
            < position(&flat, "convert-linalg-to-parallel-loops")
    );
}

#[test]
fn cpu_pipeline_bufferizes_before_cf_lowering() {
    let flat = PassPipeline::cpu().flattened();
    let cf = position(&flat, "convert-scf-to-cf");
    for pass in [
        "arith-bufferize",
        "scf-bufferize",
        "linalg-bufferize",
        "tensor-bufferize",
        "func-bufferize",
        "finalizing-bufferize",
    ] {
        assert!(position(&flat, pass) < cf, "{pass} must precede convert-scf-to-cf");
    }
    assert_eq!(flat.last().map(String::as_str), Some("reconcile-unrealized-casts"));
}

#[test]
fn gpu_pipeline_splices_the_device_block_before_final_lowering() {
    let flat = PassPipeline::gpu().flattened();
    let loops = position(&flat, "convert-linalg-to-parallel-loops");
    let cf = position(&flat, "convert-scf-to-cf");
    for pass in [
        "gpu-map-parallel-loops",
        "convert-parallel-loops-to-gpu",
        "gpu-kernel-outlining",
        "convert-gpu-to-spirv",
        "serialize-spirv",
        "convert-gpux-to-llvm",
    ] {
        let at = position(&flat, pass);
        assert!(loops < at && at < cf, "{pass} must sit between loop generation and final lowering");
    }
}

#[test]
fn cpu_pipeline_has_no_device_passes() {
    let flat = PassPipeline::cpu().flattened();
    assert!(!flat.iter().any(|pass| pass.starts_with("gpu-")));
    assert!(!flat.iter().any(|pass| pass.contains("spirv")));
}

#[test]
fn render_and_parse_round_trip() {
    for pipeline in [PassPipeline::cpu(), PassPipeline::gpu()] {
        let rendered = pipeline.to_string();
        let parsed = PassPipeline::parse(&rendered).expect("parse");
        assert_eq!(parsed, pipeline);
    }
}

#[test]
fn rendered_pipeline_nests_function_anchors() {
    let rendered = PassPipeline::cpu().to_string();
    assert!(rendered.starts_with("func.func(ndarray-dist),"));
    assert!(rendered.contains("func.func(finalizing-bufferize,convert-linalg-to-parallel-loops)"));
}

#[test]
fn baseline_pipelines_validate_against_the_context() {
    let context = Context::new();
    PassPipeline::cpu()
        .validate(context.registered_passes())
        .expect("cpu pipeline");
    PassPipeline::gpu()
        .validate(context.registered_passes())
        .expect("gpu pipeline");
}

#[test]
fn unregistered_passes_are_rejected() {
    let context = Context::new();
    let pipeline = PassPipeline::parse("canonicalize,definitely-not-a-pass").expect("parse");
    assert!(pipeline.validate(context.registered_passes()).is_err());
}

#[test]
fn malformed_pipelines_fail_to_parse() {
    assert!(PassPipeline::parse("").is_err());
    assert!(PassPipeline::parse("a,,b").is_err());
    assert!(PassPipeline::parse("func.func(a").is_err());
    assert!(PassPipeline::parse("a)b").is_err());
    assert!(PassPipeline::parse("(a)").is_err());
}

#[test]
fn nested_steps_parse_recursively() {
    let pipeline = PassPipeline::parse("func.func(canonicalize,cse),canonicalize").expect("parse");
    assert_eq!(
        pipeline.flattened(),
        vec!["canonicalize".to_string(), "cse".to_string(), "canonicalize".to_string()]
    );
    assert_eq!(pipeline.to_string(), "func.func(canonicalize,cse),canonicalize");
}
