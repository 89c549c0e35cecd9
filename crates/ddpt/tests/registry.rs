use ddpt::dtype::DTypeId;
use ddpt::error::RuntimeError;
use ddpt::registry::{Registry, NOGUID};
use ddpt::tensor::ArrayFuture;

#[test]
fn put_assigns_fresh_guids() {
    let registry = Registry::new();
    let a = ArrayFuture::new(DTypeId::F64, 1, "", 0, true);
    let b = ArrayFuture::new(DTypeId::I32, 2, "", 0, true);
    let ga = registry.put(&a).expect("put a");
    let gb = registry.put(&b).expect("put b");
    assert_ne!(ga, NOGUID);
    assert_ne!(gb, NOGUID);
    assert_ne!(ga, gb);
    assert_eq!(a.guid(), ga);
    assert_eq!(b.guid(), gb);
}

#[test]
fn get_returns_the_stored_future() {
    let registry = Registry::new();
    let a = ArrayFuture::new(DTypeId::F32, 3, "xe", 5, false);
    let guid = registry.put(&a).expect("put");
    let found = registry.get(guid).expect("get");
    assert_eq!(found.dtype(), DTypeId::F32);
    assert_eq!(found.rank(), 3);
    assert_eq!(found.device(), "xe");
    assert_eq!(found.team(), 5);
}

#[test]
fn lookup_miss_is_unknown_guid() {
    let registry = Registry::new();
    match registry.get(99) {
        Err(RuntimeError::UnknownGuid { guid }) => assert_eq!(guid, 99),
        other => panic!("expected UnknownGuid, got {other:?}"),
    }
}

#[test]
fn double_delete_is_an_error() {
    let registry = Registry::new();
    let a = ArrayFuture::new(DTypeId::I64, 1, "", 0, true);
    let guid = registry.put(&a).expect("put");
    registry.del(guid).expect("first delete");
    match registry.del(guid) {
        Err(RuntimeError::InvariantViolation { .. }) => {}
        other => panic!("expected InvariantViolation, got {other:?}"),
    }
}

#[test]
fn rebinding_a_future_is_an_error() {
    let registry = Registry::new();
    let a = ArrayFuture::new(DTypeId::I64, 1, "", 0, true);
    registry.put(&a).expect("put");
    assert!(registry.put(&a).is_err());
}
