use std::sync::{Arc, Mutex};

use ddpt::depman::{memref_words, ptensor_words, DepManager};
use ddpt::dtype::DTypeId;
use ddpt::error::RuntimeError;
use ddpt::ir::{array_type, ElemType, EwBinOpId, EwUnyOpId, FuncBuilder, Type, JIT_FN};
use ddpt::registry::Registry;
use ddpt::tensor::{ArrayFuture, HostBuffer, NdArray};

fn registered(registry: &Arc<Registry>, dtype: DTypeId, rank: usize, team: u64) -> ArrayFuture {
    let future = ArrayFuture::new(dtype, rank, "", team, true);
    registry.put(&future).expect("put");
    future
}

fn materialize_i64(future: &ArrayFuture, dims: &[usize]) {
    let len: usize = dims.iter().product();
    let array = NdArray::new(
        DTypeId::I64,
        dims,
        HostBuffer::I64((0..len as i64).collect()),
    )
    .expect("array");
    future.set_value(Arc::new(array));
}

#[test]
fn descriptor_word_counts() {
    assert_eq!(memref_words(0), 3);
    assert_eq!(memref_words(2), 7);
    assert_eq!(ptensor_words(2, false), 7);
    assert_eq!(ptensor_words(0, true), 3);
    // Distributed: halo triple plus the rank-1 offsets memref.
    assert_eq!(ptensor_words(1, true), 3 * 5 + 5);
}

#[test]
fn dependency_argument_bijection() {
    let registry = Arc::new(Registry::new());
    let x = registered(&registry, DTypeId::I64, 1, 0);
    let y = registered(&registry, DTypeId::F32, 2, 0);
    let mut dm = DepManager::new(Arc::clone(&registry));
    let mut fb = FuncBuilder::new(JIT_FN);

    let vx = dm.get_dependent(&mut fb, x.guid()).expect("x");
    let vx_again = dm.get_dependent(&mut fb, x.guid()).expect("x again");
    let vy = dm.get_dependent(&mut fb, y.guid()).expect("y");
    assert_eq!(vx, vx_again);
    assert_ne!(vx, vy);

    let function = fb.finish();
    // One synthesised argument per unbound dependency, in import order.
    assert_eq!(function.params.len(), 2);
    assert_eq!(function.params[0].0, vx);
    assert_eq!(function.params[1].0, vy);
}

#[test]
fn unknown_dependency_fails() {
    let registry = Arc::new(Registry::new());
    let mut dm = DepManager::new(registry);
    let mut fb = FuncBuilder::new(JIT_FN);
    match dm.get_dependent(&mut fb, 1234) {
        Err(RuntimeError::UnknownGuid { guid }) => assert_eq!(guid, 1234),
        other => panic!("expected UnknownGuid, got {other:?}"),
    }
}

#[test]
fn synthesized_integer_arguments_are_signless() {
    let registry = Arc::new(Registry::new());
    let cases = [
        (DTypeId::U8, ElemType::I8),
        (DTypeId::U16, ElemType::I16),
        (DTypeId::U32, ElemType::I32),
        (DTypeId::U64, ElemType::I64),
        (DTypeId::I32, ElemType::I32),
        (DTypeId::Bool, ElemType::I1),
    ];
    let mut dm = DepManager::new(Arc::clone(&registry));
    let mut fb = FuncBuilder::new(JIT_FN);
    let mut guids = Vec::new();
    for (dtype, _) in &cases {
        guids.push(registered(&registry, *dtype, 1, 0).guid());
    }
    for guid in &guids {
        dm.get_dependent(&mut fb, *guid).expect("import");
    }
    let function = fb.finish();
    for (idx, (_, expected)) in cases.iter().enumerate() {
        match &function.params[idx].1 {
            Type::Array(a) => assert_eq!(a.elem, *expected),
            other => panic!("expected a local array type, got {other}"),
        }
    }
}

#[test]
fn external_input_signature_and_words() {
    // A rank-2 FLOAT32 array already in the registry; the batch negates it.
    let registry = Arc::new(Registry::new());
    let x = ArrayFuture::new(DTypeId::F32, 2, "", 0, true);
    registry.put(&x).expect("put");
    let data = NdArray::new(
        DTypeId::F32,
        &[2, 3],
        HostBuffer::F32(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]),
    )
    .expect("array");
    x.set_value(Arc::new(data));

    let mut dm = DepManager::new(Arc::clone(&registry));
    let mut fb = FuncBuilder::new(JIT_FN);
    let vx = dm.get_dependent(&mut fb, x.guid()).expect("import");
    let vy = fb.ew_uny(EwUnyOpId::Neg, vx).expect("neg");
    let out = registered(&registry, DTypeId::F32, 2, 0);
    dm.add_value(out.guid(), vy, Box::new(|_| Ok(()))).expect("value");

    let inputs = dm.store_inputs();
    assert_eq!(inputs.len(), 1);
    assert_eq!(inputs[0].words().len(), memref_words(2));
    assert_eq!(&inputs[0].words()[3..5], &[2, 3]);
    assert_eq!(&inputs[0].words()[5..7], &[3, 1]);

    let total = dm.handle_result(&mut fb).expect("finalize");
    assert_eq!(total, 2 * ptensor_words(2, false) as u64);

    let function = fb.finish();
    assert_eq!(function.params.len(), 1);
    assert_eq!(function.results.len(), 1);
    match &function.params[0].1 {
        Type::Array(a) => {
            assert_eq!(a.elem, ElemType::F32);
            assert_eq!(a.shape.rank(), 2);
        }
        other => panic!("expected a local array argument, got {other}"),
    }
}

#[test]
fn distributed_rank1_types_and_buffer_size() {
    let registry = Arc::new(Registry::new());
    let u = registered(&registry, DTypeId::I64, 1, 7);
    materialize_i64(&u, &[4]);

    let mut dm = DepManager::new(Arc::clone(&registry));
    let mut fb = FuncBuilder::new(JIT_FN);
    let vu = dm.get_dependent(&mut fb, u.guid()).expect("import");
    let vv = fb.ew_bin(EwBinOpId::Add, vu, vu).expect("add");

    let seen = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&seen);
    let out = registered(&registry, DTypeId::I64, 1, 7);
    dm.add_value(
        out.guid(),
        vv,
        Box::new(move |delivered| {
            *sink.lock().unwrap() = Some((
                delivered.rank,
                delivered.data.sizes.to_vec(),
                delivered.left_halo.is_some(),
                delivered.right_halo.is_some(),
                delivered.local_offsets.is_some(),
            ));
            Ok(())
        }),
    )
    .expect("value");

    let inputs = dm.store_inputs();
    // Inputs travel as plain memref descriptors even when distributed.
    assert_eq!(inputs[0].words().len(), memref_words(1));

    let total = dm.handle_result(&mut fb).expect("finalize");
    assert_eq!(total, 2 * ptensor_words(1, true) as u64);

    let function = fb.finish();
    match &function.params[0].1 {
        Type::DistArray(d) => {
            assert_eq!(d.team, 7);
            assert_eq!(d.global.rank(), 1);
        }
        other => panic!("expected a distributed argument, got {other}"),
    }

    // Craft a flat buffer: left halo, local data, right halo, offsets.
    let mut out_words = vec![0isize; total as usize];
    out_words[5 + 3] = 4; // data sizes[0]
    out_words[5 + 4] = 1; // data strides[0]
    out_words[15 + 3] = 1; // offsets sizes[0]
    out_words[15 + 4] = 1; // offsets strides[0]
    dm.deliver(&out_words).expect("deliver");

    let seen = seen.lock().unwrap().take().expect("delivered");
    assert_eq!(seen, (1, vec![4], true, true, true));
}

#[test]
fn result_and_delivery_order_follow_insertion() {
    let registry = Arc::new(Registry::new());
    let a = registered(&registry, DTypeId::I64, 1, 0);
    let b = registered(&registry, DTypeId::I64, 2, 0);

    let mut dm = DepManager::new(Arc::clone(&registry));
    let mut fb = FuncBuilder::new(JIT_FN);
    let d0 = fb.const_index(4);
    let va = fb.create(&[d0], None, array_type(DTypeId::I64, 1, 0, ""));
    let vb = fb.create(&[d0, d0], None, array_type(DTypeId::I64, 2, 0, ""));

    let order = Arc::new(Mutex::new(Vec::new()));
    for (future, value) in [(&a, va), (&b, vb)] {
        let sink = Arc::clone(&order);
        let guid = future.guid();
        dm.add_value(
            guid,
            value,
            Box::new(move |_| {
                sink.lock().unwrap().push(guid);
                Ok(())
            }),
        )
        .expect("value");
    }
    let ready_order = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&ready_order);
    dm.add_ready(a.guid(), Box::new(move |guid| sink.lock().unwrap().push(guid)));

    let total = dm.handle_result(&mut fb).expect("finalize");
    assert_eq!(total, 2 * (ptensor_words(1, false) + ptensor_words(2, false)) as u64);

    let function = fb.finish();
    assert_eq!(function.results.len(), 2);
    assert_eq!(function.ret.len(), 2);

    let out_words = vec![0isize; total as usize];
    dm.deliver(&out_words).expect("deliver");
    assert_eq!(*order.lock().unwrap(), vec![a.guid(), b.guid()]);
    assert_eq!(*ready_order.lock().unwrap(), vec![a.guid()]);
}

#[test]
fn drop_clears_value_callbacks_and_registry() {
    let registry = Arc::new(Registry::new());
    let a = registered(&registry, DTypeId::I64, 1, 0);
    let guid = a.guid();

    let mut dm = DepManager::new(Arc::clone(&registry));
    let mut fb = FuncBuilder::new(JIT_FN);
    let d0 = fb.const_index(2);
    let va = fb.create(&[d0], None, array_type(DTypeId::I64, 1, 0, ""));
    dm.add_value(guid, va, Box::new(|_| Ok(()))).expect("value");
    dm.add_ready(guid, Box::new(|_| {}));

    dm.drop(guid).expect("drop");
    assert!(!registry.contains(guid));

    // Nothing survives into the return tuple.
    let total = dm.handle_result(&mut fb).expect("finalize");
    assert_eq!(total, 0);
    dm.deliver(&[]).expect("deliver");

    // Dropping again violates the registry invariant.
    match dm.drop(guid) {
        Err(RuntimeError::InvariantViolation { .. }) => {}
        other => panic!("expected InvariantViolation, got {other:?}"),
    }
}

#[test]
fn dropping_a_guid_without_a_value_still_clears_the_registry() {
    let registry = Arc::new(Registry::new());
    let a = registered(&registry, DTypeId::I64, 1, 0);
    let mut dm = DepManager::new(Arc::clone(&registry));
    dm.drop(a.guid()).expect("drop");
    assert!(!registry.contains(a.guid()));
}

#[test]
fn double_add_value_is_an_invariant_violation() {
    let registry = Arc::new(Registry::new());
    let a = registered(&registry, DTypeId::I64, 1, 0);
    let mut dm = DepManager::new(registry);
    let mut fb = FuncBuilder::new(JIT_FN);
    let d0 = fb.const_index(2);
    let va = fb.create(&[d0], None, array_type(DTypeId::I64, 1, 0, ""));
    dm.add_value(a.guid(), va, Box::new(|_| Ok(()))).expect("first");
    match dm.add_value(a.guid(), va, Box::new(|_| Ok(()))) {
        Err(RuntimeError::InvariantViolation { .. }) => {}
        other => panic!("expected InvariantViolation, got {other:?}"),
    }
}

#[test]
fn arguments_need_no_delivery() {
    let registry = Arc::new(Registry::new());
    let x = registered(&registry, DTypeId::I64, 1, 0);
    materialize_i64(&x, &[3]);

    let mut dm = DepManager::new(Arc::clone(&registry));
    let mut fb = FuncBuilder::new(JIT_FN);
    dm.get_dependent(&mut fb, x.guid()).expect("import");

    let inputs = dm.store_inputs();
    assert_eq!(inputs.len(), 1);
    // The argument entry was cleared, so the function returns nothing.
    let total = dm.handle_result(&mut fb).expect("finalize");
    assert_eq!(total, 0);
    let function = fb.finish();
    assert!(function.results.is_empty());
}
