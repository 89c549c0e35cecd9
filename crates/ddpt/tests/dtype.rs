use ddpt::dtype::DTypeId;
use ddpt::error::RuntimeError;
use ddpt::ir::ElemType;

const ALL: [DTypeId; 11] = [
    DTypeId::F64,
    DTypeId::F32,
    DTypeId::I64,
    DTypeId::U64,
    DTypeId::I32,
    DTypeId::U32,
    DTypeId::I16,
    DTypeId::U16,
    DTypeId::I8,
    DTypeId::U8,
    DTypeId::Bool,
];

#[test]
fn tags_round_trip_the_closed_set() {
    for dtype in ALL {
        assert_eq!(DTypeId::from_tag(dtype.tag()).expect("round trip"), dtype);
    }
}

#[test]
fn out_of_range_tags_are_rejected() {
    match DTypeId::from_tag(11) {
        Err(RuntimeError::UnknownDtype { tag }) => assert_eq!(tag, 11),
        other => panic!("expected UnknownDtype, got {other:?}"),
    }
}

#[test]
fn unsigned_widths_share_the_signless_element_type() {
    assert_eq!(ElemType::from_dtype(DTypeId::U64), ElemType::from_dtype(DTypeId::I64));
    assert_eq!(ElemType::from_dtype(DTypeId::U32), ElemType::from_dtype(DTypeId::I32));
    assert_eq!(ElemType::from_dtype(DTypeId::U16), ElemType::from_dtype(DTypeId::I16));
    assert_eq!(ElemType::from_dtype(DTypeId::U8), ElemType::from_dtype(DTypeId::I8));
    assert!(DTypeId::U32.is_unsigned());
    assert!(!DTypeId::I32.is_unsigned());
}

#[test]
fn element_sizes_match_their_width() {
    assert_eq!(DTypeId::F64.size_in_bytes(), 8);
    assert_eq!(DTypeId::U32.size_in_bytes(), 4);
    assert_eq!(DTypeId::I16.size_in_bytes(), 2);
    assert_eq!(DTypeId::Bool.size_in_bytes(), 1);
}
