mod common;

use std::sync::Arc;

use cipherdex::{PropagationRule, Record, Result, Trigger, Value};

use common::{date, fixture, user};

fn patient(user_id: &str, height: f64, weight: f64) -> Record {
    Record::new()
        .add_field("height", height)
        .add_field("weight", weight)
        .add_field("user_id", user_id)
}

#[test]
fn test_saving_association_reindexes_owner() -> Result<()> {
    let fixture = fixture()?;
    let user_id = fixture.save("users", user("Alice", "Adams", "F", date(1990, 5, 1)))?;

    let before = fixture.backend.document("users", &user_id).unwrap();
    assert!(!before.contains_key("__patient_height"));

    let patient_id = fixture.store.save("patients", patient(&user_id, 1.72, 61.0))?;
    let after = fixture.backend.document("users", &user_id).unwrap();
    assert_eq!(after.get("__patient_height"), Some(&Value::from(1.72)));
    assert_eq!(after.get("__patient_weight"), Some(&Value::from(61.0)));

    let mut updated = fixture.store.get("patients", &patient_id).unwrap();
    updated.set_field("height", 1.75);
    fixture.store.save("patients", updated)?;
    let after = fixture.backend.document("users", &user_id).unwrap();
    assert_eq!(after.get("__patient_height"), Some(&Value::from(1.75)));
    Ok(())
}

#[test]
fn test_destroying_association_clears_denormalized_fields() -> Result<()> {
    let fixture = fixture()?;
    let user_id = fixture.save("users", user("Bea", "Brown", "F", date(1980, 1, 15)))?;
    let patient_id = fixture.store.save("patients", patient(&user_id, 1.60, 55.0))?;

    fixture.store.destroy("patients", &patient_id)?;
    let document = fixture.backend.document("users", &user_id).unwrap();
    assert!(!document.contains_key("__patient_height"));
    assert_eq!(document.get("first_name"), Some(&Value::from("Bea")));
    Ok(())
}

#[test]
fn test_denormalized_fields_are_queryable() -> Result<()> {
    let fixture = fixture()?;
    let short = fixture.save("users", user("Cat", "Clark", "F", date(1985, 7, 30)))?;
    let tall = fixture.save("users", user("Dan", "Dunn", "M", date(1975, 3, 3)))?;
    fixture.store.save("patients", patient(&short, 1.55, 50.0))?;
    fixture.store.save("patients", patient(&tall, 1.90, 90.0))?;

    let ids = fixture
        .engine
        .query("users")?
        .filter(cipherdex::QueryBuilder::new().gt("patient.height", 1.8))?
        .ids()?;
    assert_eq!(ids, vec![tall]);
    Ok(())
}

#[test]
fn test_notify_without_store_hooks() -> Result<()> {
    let fixture = fixture()?;
    let user_id = fixture.save("users", user("Eve", "Evans", "F", date(1970, 1, 1)))?;

    // Detach the engine so saving fires no propagation.
    let mut row = patient(&user_id, 1.68, 58.0);
    row.ensure_id();
    fixture
        .store
        .set_hook_handler(Arc::new(|_: &PropagationRule, _: &Record| -> Result<usize> {
            Ok(0)
        }));
    fixture.store.save("patients", row.clone())?;
    let document = fixture.backend.document("users", &user_id).unwrap();
    assert!(!document.contains_key("__patient_height"));

    let refreshed = fixture.engine.notify("patients", Trigger::AfterSave, &row)?;
    assert_eq!(refreshed, 1);
    let document = fixture.backend.document("users", &user_id).unwrap();
    assert_eq!(document.get("__patient_height"), Some(&Value::from(1.68)));

    // Unrelated models propagate nowhere.
    assert_eq!(fixture.engine.notify("medicare_cards", Trigger::AfterSave, &row)?, 0);
    Ok(())
}

#[test]
fn test_hooks_are_registered_once() -> Result<()> {
    let fixture = fixture()?;
    fixture.engine.indexes("users")?;
    fixture.engine.query("users")?;

    let hooks = fixture.store.registered_hooks();
    assert_eq!(hooks.len(), 2);
    assert!(hooks.iter().all(|rule| rule.source_model == "patients"
        && rule.owner_model == "users"
        && rule.association == "patient"));
    Ok(())
}
