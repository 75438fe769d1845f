use super::mock::MockRuntime;
use crate::convert::{convert, FALLBACK_TAG};
use crate::diagnostics::CollectingSink;
use crate::error::ConvertError;
use crate::opaque::EPOCH_OFFSET_USECS;
use crate::row::{Cell, Datum};
use crate::value::TaggedValue;

fn run(rt: &mut MockRuntime, v: &TaggedValue) -> (Result<(), ConvertError>, Cell, CollectingSink) {
    let sink = CollectingSink::new();
    let mut cell = Cell::of(Datum::Int64(-1));
    let res = convert(rt, v, &mut cell, &sink);
    (res, cell, sink)
}

fn ok(v: TaggedValue) -> Cell {
    let mut rt = MockRuntime::new();
    let (res, cell, _) = run(&mut rt, &v);
    res.unwrap();
    cell
}

#[test]
fn scalars_are_exact() {
    assert_eq!(ok(TaggedValue::Bool(true)).datum(), Some(&Datum::Bool(true)));
    assert_eq!(ok(TaggedValue::Integer(i64::MIN)).datum(), Some(&Datum::Int64(i64::MIN)));
    assert_eq!(ok(TaggedValue::Integer(i64::MAX)).datum(), Some(&Datum::Int64(i64::MAX)));
    assert_eq!(ok(TaggedValue::Float(0.1 + 0.2)).datum(), Some(&Datum::Float64(0.1 + 0.2)));
    assert_eq!(ok(TaggedValue::text("héllo")).datum(), Some(&Datum::Bytes("héllo".as_bytes().to_vec())));
}

#[test]
fn text_is_never_prefixed() {
    let cell = ok(TaggedValue::Text(b"s-leading".to_vec()));
    assert_eq!(cell.datum(), Some(&Datum::Bytes(b"s-leading".to_vec())));
    let empty = ok(TaggedValue::Text(Vec::new()));
    assert_eq!(empty.datum(), Some(&Datum::Bytes(Vec::new())));
}

#[test]
fn false_null_and_undefined_store_null() {
    assert!(ok(TaggedValue::Bool(false)).is_null());
    assert!(ok(TaggedValue::Null).is_null());
    assert!(ok(TaggedValue::Undefined).is_null());
}

#[test]
fn structured_values_are_inspected_with_tag() {
    let seq = TaggedValue::Sequence(vec![TaggedValue::Integer(1), TaggedValue::text("x")]);
    let cell = ok(seq);
    let mut expected = vec![FALLBACK_TAG];
    expected.extend_from_slice(br#"{1, "x"}"#);
    assert_eq!(cell.datum(), Some(&Datum::Bytes(expected)));

    assert_eq!(ok(TaggedValue::Symbol(b"ready".to_vec())).datum(), Some(&Datum::Bytes(b"s:ready".to_vec())));
    assert_eq!(ok(TaggedValue::Callable).datum(), Some(&Datum::Bytes(b"sfunction".to_vec())));
    let map = TaggedValue::Mapping(vec![(TaggedValue::text("k"), TaggedValue::Bool(false))]);
    assert_eq!(ok(map).datum(), Some(&Datum::Bytes(b"s{k = false}".to_vec())));
}

#[test]
fn typeref_stores_class_of_class() {
    let cell = ok(TaggedValue::TypeRef("Producer".into()));
    assert_eq!(cell.datum(), Some(&Datum::Bytes(b"Class".to_vec())));
}

#[test]
fn timestamp_objects_shift_to_host_epoch() {
    let mut rt = MockRuntime::new();
    let t = rt.object("Time", Ok(TaggedValue::Integer(1_700_000_000)));
    let (res, cell, sink) = run(&mut rt, &t);
    res.unwrap();
    assert_eq!(cell.datum(), Some(&Datum::Int64(1_700_000_000_000_000 - EPOCH_OFFSET_USECS)));
    assert!(sink.warnings().is_empty());
}

#[test]
fn timestamp_overflow_fails_and_leaves_null() {
    let mut rt = MockRuntime::new();
    let t = rt.object("Time", Ok(TaggedValue::Integer(i64::MAX)));
    let (res, cell, _) = run(&mut rt, &t);
    assert_eq!(res, Err(ConvertError::TimestampOutOfRange { seconds: i64::MAX }));
    assert!(cell.is_null());
}

#[test]
fn timestamp_with_non_numeric_seconds_is_unsupported() {
    let mut rt = MockRuntime::new();
    let t = rt.object("Time", Ok(TaggedValue::text("soon")));
    let (res, _, _) = run(&mut rt, &t);
    assert!(matches!(res, Err(ConvertError::UnsupportedOpaqueType { ref type_name, .. }) if type_name == "Time"));
}

#[test]
fn raising_to_i_surfaces_runtime_error() {
    let mut rt = MockRuntime::new();
    let t = rt.object("Time", Err("clock unavailable".into()));
    let (res, cell, _) = run(&mut rt, &t);
    match res {
        Err(ConvertError::Runtime(e)) => assert_eq!(e.message, "clock unavailable"),
        other => panic!("expected runtime error, got {:?}", other),
    }
    assert!(cell.is_null());
}

#[test]
fn other_objects_fall_back_to_type_name_with_one_warning_each() {
    let mut rt = MockRuntime::new();
    let socket = rt.object("Socket", Err("not called".into()));
    let sink = CollectingSink::new();
    for _ in 0..3 {
        let mut cell = Cell::null();
        convert(&mut rt, &socket, &mut cell, &sink).unwrap();
        assert_eq!(cell.datum(), Some(&Datum::Bytes(b"Socket".to_vec())));
    }
    assert_eq!(sink.warnings().len(), 3);
    assert!(sink.warnings()[0].contains("Socket"));
}

#[test]
fn nameless_objects_are_unsupported() {
    let mut rt = MockRuntime::new();
    let anon = rt.object("", Err("not called".into()));
    let (res, cell, sink) = run(&mut rt, &anon);
    assert!(matches!(res, Err(ConvertError::UnsupportedOpaqueType { .. })));
    assert!(cell.is_null());
    assert!(sink.events().is_empty());
}

#[test]
fn error_and_unknown_kinds_fail_loudly() {
    let mut rt = MockRuntime::new();
    let (res, cell, _) = run(&mut rt, &TaggedValue::Error("bad".into()));
    assert_eq!(res, Err(ConvertError::UnsupportedValueKind { kind: "error", detail: "bad".into() }));
    assert!(cell.is_null());

    let (res, cell, _) = run(&mut rt, &TaggedValue::Unknown("cdata".into()));
    assert_eq!(res, Err(ConvertError::UnknownValueKind("cdata".into())));
    assert!(cell.is_null());
}
