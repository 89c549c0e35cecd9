use ddpt::dtype::{DTypeId, Scalar};
use ddpt::ir::{array_type, ElemType, EwBinOpId, FuncBuilder, Module, JIT_FN};

fn sample_module() -> Module {
    let mut fb = FuncBuilder::new(JIT_FN);
    let ten = fb.const_index(10);
    let one = fb.const_scalar(Scalar::Int(1), ElemType::I64);
    let full = fb.create(&[ten], Some(one), array_type(DTypeId::I64, 1, 0, ""));
    let sum = fb.ew_bin(EwBinOpId::Add, full, full).expect("add");
    let raw = fb.extract_raw(sum).expect("extract");
    fb.set_return(vec![raw]);
    Module::with_function(fb.finish())
}

#[test]
fn rendering_is_deterministic() {
    let first = sample_module().to_string();
    let second = sample_module().to_string();
    assert_eq!(first, second);
}

#[test]
fn rendering_contains_the_expected_shape() {
    let text = sample_module().to_string();
    assert!(text.contains("module @ddpt"));
    assert!(text.contains("func @jit_main()"));
    assert!(text.contains("ndarray.create"));
    assert!(text.contains("ndarray.ewbin add"));
    assert!(text.contains("ndarray.extract_raw"));
    assert!(text.contains("ndarray<?xi64>"));
    assert!(text.contains("return %4"));
}

#[test]
fn distinct_programs_render_differently() {
    let base = sample_module().to_string();
    let mut fb = FuncBuilder::new(JIT_FN);
    let ten = fb.const_index(11);
    let one = fb.const_scalar(Scalar::Int(1), ElemType::I64);
    let full = fb.create(&[ten], Some(one), array_type(DTypeId::I64, 1, 0, ""));
    let raw = fb.extract_raw(full).expect("extract");
    fb.set_return(vec![raw]);
    let other = Module::with_function(fb.finish()).to_string();
    assert_ne!(base, other);
}

#[test]
fn distributed_types_render_their_environment() {
    let ty = array_type(DTypeId::U32, 2, 3, "xe");
    let text = ty.to_string();
    assert!(text.starts_with("dist.array<i32"));
    assert!(text.contains("team = 3"));
    assert!(text.contains("device = \"xe\""));
    assert!(text.contains("loffs = [2]"));
}
