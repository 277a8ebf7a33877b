//! Integration tests for reserve-then-finalize naming.
//!
//! These tests verify:
//! - a reserved ID is finalized exactly once
//! - final names must carry the row's own ID
//! - a file cannot be finalized before it exists on disk
//! - batch calls isolate failures per element

mod common;

use common::TestEnv;
use waymark::ErrorKind;
use waymark::models::Reservation;
use waymark::schema::Table;
use waymark::storage::reservation::{
    FileFinalization, FileReservation, FunctionFinalization, FunctionReservation,
    TypeFinalization, TypeReservation,
};

fn reserve(store: &mut waymark::Store, path: &str) -> i64 {
    store
        .reserve_file(&FileReservation {
            path: path.to_string(),
            ..Default::default()
        })
        .unwrap()
}

#[test]
fn test_reserve_then_finalize_file_once() {
    let env = TestEnv::new();
    let mut store = env.init_store();
    for i in 1..=6 {
        reserve(&mut store, &format!("src/filler_{}.py", i));
    }

    let id = reserve(&mut store, "src/x.py");
    assert_eq!(id, 7);
    assert!(store.get_file(id).unwrap().reservation.is_reserved());

    env.write_artifact("src/x-ID_7.py", "print('x')\n");
    let file = store
        .finalize_file(
            id,
            &FileFinalization {
                name: "x-ID_7.py".into(),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(file.path, "src/x-ID_7.py");
    assert_eq!(
        file.reservation,
        Reservation::Finalized {
            final_name: "x-ID_7.py".into()
        }
    );

    let err = store
        .finalize_file(
            id,
            &FileFinalization {
                name: "x-ID_7.py".into(),
                ..Default::default()
            },
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
}

#[test]
fn test_finalize_requires_artifact_on_disk() {
    let env = TestEnv::new();
    let mut store = env.init_store();
    let id = reserve(&mut store, "lib/util.rs");

    let name = format!("util-ID_{}.rs", id);
    let err = store
        .finalize_file(
            id,
            &FileFinalization {
                name: name.clone(),
                ..Default::default()
            },
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PreconditionFailed);
    assert!(store.get_file(id).unwrap().reservation.is_reserved());

    env.write_artifact(&format!("lib/{}", name), "");
    store
        .finalize_file(
            id,
            &FileFinalization {
                name,
                ..Default::default()
            },
        )
        .unwrap();
}

#[test]
fn test_final_name_must_carry_own_id() {
    let env = TestEnv::new();
    let mut store = env.init_store();
    let file_id = env.tracked_file(&mut store, "src", "model", "rs");

    let fn_id = store
        .reserve_function(&FunctionReservation {
            file_id,
            preliminary_name: "parse".into(),
            ..Default::default()
        })
        .unwrap();
    let err = store
        .finalize_function(
            fn_id,
            &FunctionFinalization {
                name: format!("parse_ID_{}", fn_id + 1),
                ..Default::default()
            },
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    let func = store
        .finalize_function(
            fn_id,
            &FunctionFinalization {
                name: format!("parse_ID_{}", fn_id),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(func.reservation.name(), format!("parse_ID_{}", fn_id));
}

#[test]
fn test_type_finalize_reminds_about_links() {
    let env = TestEnv::new();
    let mut store = env.init_store();
    let file_id = env.tracked_file(&mut store, "src", "shapes", "rs");
    let type_id = store
        .reserve_type(&TypeReservation {
            file_id,
            preliminary_name: "Circle".into(),
            ..Default::default()
        })
        .unwrap();
    let finalized = store
        .finalize_type(
            type_id,
            &TypeFinalization {
                name: format!("Circle_ID_{}", type_id),
                ..Default::default()
            },
        )
        .unwrap();
    assert!(!finalized.record.reservation.is_reserved());
    assert_eq!(finalized.reminders.len(), 1);
}

#[test]
fn test_reserved_rows_listed_until_finalized() {
    let env = TestEnv::new();
    let mut store = env.init_store();
    let a = reserve(&mut store, "a.rs");
    let _b = reserve(&mut store, "b.rs");
    assert_eq!(store.get_reserved(Table::Files).unwrap().len(), 2);

    env.write_artifact(&format!("a-ID_{}.rs", a), "");
    store
        .finalize_file(
            a,
            &FileFinalization {
                name: format!("a-ID_{}.rs", a),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(store.get_reserved(Table::Files).unwrap().len(), 1);
}

#[test]
fn test_batch_reserve_isolates_failures() {
    let env = TestEnv::new();
    let mut store = env.init_store();
    let report = store
        .reserve_files(&[
            FileReservation {
                path: "one.rs".into(),
                ..Default::default()
            },
            FileReservation {
                path: "../escape.rs".into(),
                ..Default::default()
            },
            FileReservation {
                path: "one.rs".into(),
                ..Default::default()
            },
            FileReservation {
                path: "two.rs".into(),
                ..Default::default()
            },
        ])
        .unwrap();
    assert_eq!(report.succeeded, 2);
    assert_eq!(report.failed, 2);
    assert_eq!(report.results[1].error.as_ref().unwrap().kind, ErrorKind::InvalidArgument);
    assert_eq!(report.results[2].error.as_ref().unwrap().kind, ErrorKind::InvalidState);
    assert_eq!(report.ids().len(), 2);
    assert_eq!(store.get_reserved(Table::Files).unwrap().len(), 2);
}

#[test]
fn test_reservations_survive_reopen() {
    let env = TestEnv::new();
    let id = {
        let mut store = env.init_store();
        reserve(&mut store, "later.rs")
    };
    let store = env.open_store();
    let file = store.get_file(id).unwrap();
    assert!(file.reservation.is_reserved());
    assert_eq!(file.path, "later.rs");
}
