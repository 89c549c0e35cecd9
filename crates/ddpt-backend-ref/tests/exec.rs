use ddpt::dtype::{DTypeId, Scalar};
use ddpt::error::RuntimeError;
use ddpt::ops::EwUnyOp;
use ddpt::runtime::Runtime;
use ddpt::tensor::{HostBuffer, NdArray};
use ddpt_backend_ref::RefBackend;

fn runtime() -> Runtime {
    Runtime::init(RefBackend::new())
}

#[test]
fn arange_full_add_compose() {
    let rt = runtime();
    let a = rt.arange(0, 10, 1, DTypeId::I64, 0).expect("arange");
    let b = rt.full(&[10], Scalar::Int(1), DTypeId::I64, 0).expect("full");
    let c = rt.add(&a, &b).expect("add");
    rt.drop_array(&a).expect("drop a");
    rt.drop_array(&b).expect("drop b");

    let result = c.get();
    assert_eq!(result.dims(), &[10]);
    assert_eq!(result.strides(), &[1]);
    assert_eq!(result.as_i64().expect("i64"), &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
    // Make sure the drop nodes were processed before checking the registry.
    rt.flush().expect("flush").wait();
    assert!(rt.drain_errors().is_empty());
    assert!(!rt.registry().contains(a.guid()));
    assert!(!rt.registry().contains(b.guid()));
}

#[test]
fn external_input_is_pulled_in() {
    let rt = runtime();
    let source = NdArray::new(
        DTypeId::F32,
        &[2, 3],
        HostBuffer::F32(vec![1.0, -2.0, 3.0, -4.0, 5.0, -6.0]),
    )
    .expect("array");
    let x = rt.import(source, "", 0).expect("import");
    let y = rt.negative(&x).expect("neg");

    let result = y.get();
    assert_eq!(result.dims(), &[2, 3]);
    assert_eq!(
        result.as_f32().expect("f32"),
        &[-1.0, 2.0, -3.0, 4.0, -5.0, 6.0]
    );
    assert!(rt.drain_errors().is_empty());
}

#[test]
fn divide_and_abs_compose() {
    let rt = runtime();
    let a = rt.arange(2, 14, 2, DTypeId::I64, 0).expect("arange");
    let b = rt.full(&[6], Scalar::Int(2), DTypeId::I64, 0).expect("full");
    let q = rt.divide(&a, &b).expect("divide");
    let m = rt.abs(&rt.negative(&q).expect("neg")).expect("abs");

    let result = m.get();
    assert_eq!(result.dims(), &[6]);
    assert_eq!(result.as_i64().expect("i64"), &[1, 2, 3, 4, 5, 6]);
    assert!(rt.drain_errors().is_empty());
}

#[test]
fn float_division_and_signed_zero_abs() {
    let rt = runtime();
    let a = rt.full(&[3], Scalar::Float(1.0), DTypeId::F64, 0).expect("full");
    let b = rt.full(&[3], Scalar::Float(4.0), DTypeId::F64, 0).expect("full");
    let q = rt.divide(&a, &b).expect("divide");
    assert_eq!(q.get().as_f64().expect("f64"), &[0.25, 0.25, 0.25]);

    let z = rt.full(&[2], Scalar::Float(-0.0), DTypeId::F64, 0).expect("full");
    let abs = rt.abs(&z).expect("abs");
    let result = abs.get();
    let values = result.as_f64().expect("f64");
    assert_eq!(values, &[0.0, 0.0]);
    // abs must clear the sign bit, not just compare equal to zero.
    assert_eq!(values[0].to_bits(), 0.0f64.to_bits());
}

#[test]
fn integer_division_by_zero_is_reported() {
    let rt = runtime();
    let a = rt.full(&[4], Scalar::Int(1), DTypeId::I64, 0).expect("full");
    let z = rt.full(&[4], Scalar::Int(0), DTypeId::I64, 0).expect("full");
    rt.divide(&a, &z).expect("enqueue");
    rt.flush().expect("flush").wait();

    let errors = rt.drain_errors();
    assert!(
        errors.iter().any(|err| matches!(
            err,
            RuntimeError::InvariantViolation { message } if message.contains("division by zero")
        )),
        "expected a division-by-zero report, got {errors:?}"
    );
}

#[test]
fn linspace_with_endpoint() {
    let rt = runtime();
    let v = rt
        .linspace(0.0, 1.0, 5, true, DTypeId::F64, 0)
        .expect("linspace");
    let result = v.get();
    assert_eq!(result.dims(), &[5]);
    assert_eq!(result.as_f64().expect("f64"), &[0.0, 0.25, 0.5, 0.75, 1.0]);
}

#[test]
fn full_reduction_yields_rank0() {
    let rt = runtime();
    let a = rt.arange(1, 6, 1, DTypeId::I64, 0).expect("arange");
    let s = rt.sum(&a).expect("sum");
    let result = s.get();
    assert!(result.dims().is_empty());
    assert_eq!(result.as_i64().expect("i64"), &[15]);
}

#[test]
fn reshape_preserves_contents() {
    let rt = runtime();
    let a = rt.arange(0, 6, 1, DTypeId::I64, 0).expect("arange");
    let r = rt.reshape(&a, &[2, 3]).expect("reshape");
    let result = r.get();
    assert_eq!(result.dims(), &[2, 3]);
    assert_eq!(result.strides(), &[3, 1]);
    assert_eq!(result.as_i64().expect("i64"), &[0, 1, 2, 3, 4, 5]);
}

#[test]
fn chained_batches_import_prior_results() {
    let rt = runtime();
    let a = rt.full(&[4], Scalar::Int(3), DTypeId::I64, 0).expect("full");
    // Force a batch boundary so the second operation imports `a` as an
    // argument rather than reusing an in-batch value.
    rt.flush().expect("flush").wait();
    let b = rt.multiply(&a, &a).expect("mul");
    let result = b.get();
    assert_eq!(result.as_i64().expect("i64"), &[9, 9, 9, 9]);
    assert!(rt.drain_errors().is_empty());
}

#[test]
fn run_sentinel_flushes_staged_work() {
    let rt = runtime();
    let a = rt.arange(0, 4, 1, DTypeId::I64, 0).expect("arange");
    let done = rt.flush().expect("flush");
    assert!(done.wait());
    // Everything staged before the sentinel was compiled and delivered.
    assert!(a.try_get().is_some());
    let b = rt.negative(&a).expect("neg");
    assert_eq!(b.get().as_i64().expect("i64"), &[0, -1, -2, -3]);
}

#[test]
fn dropped_guid_fails_later_batches() {
    let rt = runtime();
    let a = rt.full(&[2], Scalar::Int(5), DTypeId::I64, 0).expect("full");
    let guid = a.guid();
    rt.drop_array(&a).expect("drop");
    rt.flush().expect("flush").wait();

    // The handle is gone; resolving it as a dependency must fail.
    rt.ew_uny(EwUnyOp::Neg, &a).expect("enqueue");
    rt.flush().expect("flush").wait();

    let errors = rt.drain_errors();
    assert!(
        errors
            .iter()
            .any(|err| matches!(err, RuntimeError::UnknownGuid { guid: g } if *g == guid)),
        "expected UnknownGuid for {guid}, got {errors:?}"
    );
}

#[test]
fn double_drop_is_reported() {
    let rt = runtime();
    let a = rt.full(&[2], Scalar::Int(5), DTypeId::I64, 0).expect("full");
    rt.drop_array(&a).expect("first drop");
    rt.flush().expect("flush").wait();
    rt.drop_array(&a).expect("second drop enqueued");
    rt.flush().expect("flush").wait();
    let errors = rt.drain_errors();
    assert!(
        errors
            .iter()
            .any(|err| matches!(err, RuntimeError::InvariantViolation { .. })),
        "expected InvariantViolation, got {errors:?}"
    );
}

#[test]
fn replicate_hands_back_the_source_value() {
    let rt = runtime();
    let a = rt.full(&[3], Scalar::Float(2.5), DTypeId::F64, 0).expect("full");
    let r = rt.replicate(&a).expect("replicate");
    let result = r.get();
    assert_eq!(result.as_f64().expect("f64"), &[2.5, 2.5, 2.5]);
}

#[test]
fn fini_is_idempotent() {
    let rt = runtime();
    let a = rt.arange(0, 3, 1, DTypeId::I64, 0).expect("arange");
    assert_eq!(a.get().as_i64().expect("i64"), &[0, 1, 2]);
    rt.fini();
    rt.fini();
    // Deferring after shutdown surfaces an error instead of hanging.
    assert!(rt.arange(0, 3, 1, DTypeId::I64, 0).is_err());
}
