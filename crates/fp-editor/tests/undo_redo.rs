//! Integration tests: requests driven through the transaction manager.
//!
//! Loads a small room fixture, commits requests built by the registry and
//! checks that undo/redo restores every observable field.

use fp_core::{
    Document, EntityFlag, EntityId, Field, FieldValue, LogGroupType, TransactionConfig,
};
use fp_editor::{
    CommitOptions, CommitOutcome, RequestArgs, SignalKind, StateRequest, TransactionManager,
    TxnSignal,
};
use pretty_assertions::assert_eq;
use std::cell::RefCell;
use std::rc::Rc;

fn make_doc() -> Document {
    Document::from_json(include_str!("fixtures/room.json")).unwrap()
}

fn id(name: &str) -> EntityId {
    EntityId::intern(name)
}

fn field(doc: &Document, name: &str, field: Field) -> Option<FieldValue> {
    doc.get(id(name)).and_then(|e| e.field(field))
}

fn move_to(name: &str, x: f64) -> RequestArgs {
    RequestArgs::SetField {
        entity: id(name),
        field: Field::X,
        value: FieldValue::Number(x),
        description: "Move content".into(),
        category: LogGroupType::ContentOperation,
    }
}

// ─── Symmetry ───────────────────────────────────────────────────────────

#[test]
fn every_request_survives_three_undo_redo_cycles() {
    let mut doc = make_doc();
    let mut txn = TransactionManager::default();
    let args = [
        RequestArgs::ChangeMoldingAutofit {
            molding: Some(id("molding_flush")),
            auto_fit: true,
        },
        RequestArgs::LightSlotState {
            model: Some(id("ceiling_model")),
            checked: true,
        },
        RequestArgs::DeleteFaceMolding {
            face: Some(id("face_north")),
            molding: Some(id("molding_offset")),
        },
        RequestArgs::GroupFlip {
            group: Some(id("living_group")),
        },
        RequestArgs::AutoFitOpening {
            opening: Some(id("door_main")),
            host: Some(id("wall_north")),
        },
    ];

    for a in args {
        let before = doc.to_json().unwrap();
        let request = txn.create_request(a).unwrap();
        txn.commit(&mut doc, request).unwrap();
        let after = doc.to_json().unwrap();
        assert_ne!(before, after);

        for _ in 0..3 {
            txn.undo(&mut doc).unwrap();
            assert_eq!(doc.to_json().unwrap(), before);
            txn.redo(&mut doc).unwrap();
            assert_eq!(doc.to_json().unwrap(), after);
        }
    }
    assert_eq!(txn.undo_depth(), 5);
}

#[test]
fn undo_all_restores_fixture() {
    let mut doc = make_doc();
    let original = doc.to_json().unwrap();
    let mut txn = TransactionManager::default();

    for a in [
        RequestArgs::GroupFlip {
            group: Some(id("living_group")),
        },
        move_to("sofa", 7.5),
        RequestArgs::DeleteFaceMolding {
            face: Some(id("face_north")),
            molding: Some(id("molding_flush")),
        },
    ] {
        let request = txn.create_request(a).unwrap();
        txn.commit(&mut doc, request).unwrap();
    }

    while txn.undo(&mut doc).unwrap().is_some() {}
    assert_eq!(doc.to_json().unwrap(), original);
    assert_eq!(txn.redo_depth(), 3);
}

// ─── Null-entity safety ─────────────────────────────────────────────────

#[test]
fn requests_on_missing_entities_leave_document_untouched() {
    let mut doc = make_doc();
    let original = doc.to_json().unwrap();
    let mut txn = TransactionManager::default();
    let ghost = Some(id("never_loaded"));

    for a in [
        RequestArgs::ChangeMoldingAutofit {
            molding: ghost,
            auto_fit: true,
        },
        RequestArgs::LightSlotState {
            model: None,
            checked: true,
        },
        RequestArgs::DeleteFaceMolding {
            face: Some(id("face_north")),
            molding: ghost,
        },
        RequestArgs::GroupFlip { group: ghost },
        RequestArgs::AutoFitOpening {
            opening: Some(id("door_main")),
            host: None,
        },
    ] {
        let request = txn.create_request(a).unwrap();
        txn.commit(&mut doc, request).unwrap();
        txn.undo(&mut doc).unwrap();
        txn.redo(&mut doc).unwrap();
    }

    assert_eq!(doc.to_json().unwrap(), original);
    assert!(doc.iter().all(|e| e.dirty.invalidations == 0));
}

// ─── Cascade threshold ──────────────────────────────────────────────────

#[test]
fn deleting_offset_molding_removes_its_hole_only() {
    let mut doc = make_doc();
    let mut txn = TransactionManager::default();

    for molding in ["molding_flush", "molding_offset"] {
        let request = txn
            .create_request(RequestArgs::DeleteFaceMolding {
                face: Some(id("face_north")),
                molding: Some(id(molding)),
            })
            .unwrap();
        txn.commit(&mut doc, request).unwrap();
    }

    let face = doc.get(id("face_north")).unwrap();
    assert!(face.has_hole(id("molding_flush")));
    assert!(!face.has_hole(id("molding_offset")));
    assert!(!face.has_molding(id("molding_flush")));
    assert!(!face.has_molding(id("molding_offset")));
    for m in ["molding_flush", "molding_offset"] {
        assert!(doc.get(id(m)).unwrap().is_flag_on(EntityFlag::Removed));
    }
}

// ─── Self-inverse flip ──────────────────────────────────────────────────

#[test]
fn flip_alternates_across_commit_undo_redo() {
    let mut doc = make_doc();
    let mut txn = TransactionManager::default();
    let request = txn
        .create_request(RequestArgs::GroupFlip {
            group: Some(id("living_group")),
        })
        .unwrap();

    txn.commit(&mut doc, request).unwrap();
    assert_eq!(field(&doc, "living_group", Field::Flipped), Some(FieldValue::Bool(true)));
    assert_eq!(field(&doc, "sofa", Field::X), Some(FieldValue::Number(3.0)));

    txn.undo(&mut doc).unwrap();
    assert_eq!(field(&doc, "living_group", Field::Flipped), Some(FieldValue::Bool(false)));
    assert_eq!(field(&doc, "sofa", Field::X), Some(FieldValue::Number(1.0)));

    txn.redo(&mut doc).unwrap();
    assert_eq!(field(&doc, "living_group", Field::Flipped), Some(FieldValue::Bool(true)));
    assert_eq!(doc.get(id("living_group")).unwrap().dirty.invalidations, 3);
}

// ─── Light slot ─────────────────────────────────────────────────────────

#[test]
fn light_slot_on_open_path_records_a_no_op_step() {
    let mut doc = make_doc();
    let mut txn = TransactionManager::default();
    let request = txn
        .create_request(RequestArgs::LightSlotState {
            model: Some(id("open_model")),
            checked: true,
        })
        .unwrap();

    assert_eq!(txn.commit(&mut doc, request).unwrap(), CommitOutcome::Pushed);
    let model = doc.get(id("open_model")).unwrap();
    assert!(model.self_host_light_band().is_none());
    assert!(!model.is_dirty());

    txn.undo(&mut doc).unwrap();
    assert_eq!(doc.get(id("open_model")).unwrap().dirty.invalidations, 0);
}

// ─── Merging ────────────────────────────────────────────────────────────

#[test]
fn field_requests_merge_into_previous_step() {
    let mut doc = make_doc();
    let mut txn = TransactionManager::default();

    let first = txn.create_request(move_to("sofa", 2.0)).unwrap();
    txn.commit(&mut doc, first).unwrap();
    for x in [3.0, 4.0, 5.0] {
        let next = txn.create_request(move_to("sofa", x)).unwrap();
        let outcome = txn.commit_with(&mut doc, next, CommitOptions::merged()).unwrap();
        assert_eq!(outcome, CommitOutcome::Merged);
    }

    assert_eq!(txn.undo_depth(), 1);
    txn.undo(&mut doc).unwrap();
    assert_eq!(field(&doc, "sofa", Field::X), Some(FieldValue::Number(1.0)));
    txn.redo(&mut doc).unwrap();
    assert_eq!(field(&doc, "sofa", Field::X), Some(FieldValue::Number(5.0)));
}

#[test]
fn merge_is_rejected_unless_both_sides_are_field_transactions() {
    let mut doc = make_doc();
    let mut txn = TransactionManager::default();

    let flip = txn
        .create_request(RequestArgs::GroupFlip {
            group: Some(id("living_group")),
        })
        .unwrap();
    txn.commit(&mut doc, flip).unwrap();

    let mv = txn.create_request(move_to("lamp", 9.0)).unwrap();
    let outcome = txn.commit_with(&mut doc, mv, CommitOptions::merged()).unwrap();
    assert_eq!(outcome, CommitOutcome::Pushed);

    let dump = StateRequest::new("Move lamp (dump)", LogGroupType::ContentOperation).transact(
        id("lamp"),
        Field::X,
        FieldValue::Number(10.0),
    );
    let outcome = txn
        .commit_with(&mut doc, Box::new(dump), CommitOptions::merged())
        .unwrap();
    assert_eq!(outcome, CommitOutcome::Pushed);

    assert_eq!(txn.undo_depth(), 3);
    let history: Vec<&str> = txn.undo_descriptions().collect();
    assert_eq!(history, vec!["Move lamp (dump)", "Move content", "Flip group"]);
}

#[test]
fn dump_request_undo_restores_whole_entity() {
    let mut doc = make_doc();
    let mut txn = TransactionManager::default();
    let dump = StateRequest::new("Hide and move", LogGroupType::ViewOperation)
        .transact(id("lamp"), Field::Visible, FieldValue::Bool(false))
        .transact(id("lamp"), Field::X, FieldValue::Number(6.0));

    txn.commit(&mut doc, Box::new(dump)).unwrap();
    assert!(doc.get(id("lamp")).unwrap().is_flag_on(EntityFlag::Hidden));

    txn.undo(&mut doc).unwrap();
    let lamp = doc.get(id("lamp")).unwrap();
    assert!(!lamp.is_flag_on(EntityFlag::Hidden));
    assert_eq!(lamp.field(Field::X), Some(FieldValue::Number(3.0)));
    assert!(lamp.dirty.material);
}

// ─── Signals & configuration ────────────────────────────────────────────

#[test]
fn subscribers_see_commit_undo_redo() {
    let mut doc = make_doc();
    let mut txn = TransactionManager::default();
    let seen: Rc<RefCell<Vec<TxnSignal>>> = Rc::default();
    let sink = Rc::clone(&seen);
    txn.subscribe(move |signal| sink.borrow_mut().push(signal.clone()));

    let request = txn
        .create_request(RequestArgs::ChangeMoldingAutofit {
            molding: Some(id("molding_flush")),
            auto_fit: true,
        })
        .unwrap();
    txn.commit(&mut doc, request).unwrap();
    txn.undo(&mut doc).unwrap();
    txn.redo(&mut doc).unwrap();

    let kinds: Vec<SignalKind> = seen.borrow().iter().map(|s| s.kind).collect();
    assert_eq!(
        kinds,
        vec![SignalKind::Committed, SignalKind::Undone, SignalKind::Redone]
    );
    assert!(
        seen.borrow()
            .iter()
            .all(|s| s.category == LogGroupType::FaceOperation)
    );
}

#[test]
fn category_labels_come_from_config() {
    let config = TransactionConfig::from_json(
        r#"{ "max_depth": 10, "categories": { "WallOperation": "Walls" } }"#,
    )
    .unwrap();
    let txn = TransactionManager::new(config);
    assert_eq!(txn.category_label(LogGroupType::WallOperation), "Walls");
    assert_eq!(txn.category_label(LogGroupType::SlabEdit), "SlabEdit");
}

#[test]
fn session_abort_reverts_pending_requests() {
    let mut doc = make_doc();
    let mut txn = TransactionManager::default();

    txn.begin_session();
    for x in [2.0, 3.0] {
        let request = txn.create_request(move_to("sofa", x)).unwrap();
        txn.commit(&mut doc, request).unwrap();
    }
    let request = txn
        .create_request(RequestArgs::LightSlotState {
            model: Some(id("ceiling_model")),
            checked: true,
        })
        .unwrap();
    txn.commit(&mut doc, request).unwrap();

    txn.abort_session(&mut doc).unwrap();
    assert_eq!(field(&doc, "sofa", Field::X), Some(FieldValue::Number(1.0)));
    assert!(doc.get(id("ceiling_model")).unwrap().self_host_light_band().is_none());
    assert!(!txn.can_undo());
}
