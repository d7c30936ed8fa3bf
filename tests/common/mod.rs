#![allow(dead_code)]

use std::sync::Arc;

use chrono::NaiveDate;
use cipherdex::engine::config::EngineConfig;
use cipherdex::store::memory::{MemoryRecordStore, MemorySearchBackend};
use cipherdex::{Engine, FieldType, IndexConfig, Record, Result};

pub struct Fixture {
    pub store: Arc<MemoryRecordStore>,
    pub backend: Arc<MemorySearchBackend>,
    pub engine: Arc<Engine>,
}

impl Fixture {
    /// Store a row, then index it.
    pub fn save(&self, model: &str, mut record: Record) -> Result<String> {
        let id = record.ensure_id().to_string();
        self.store.save(model, record.clone())?;
        self.engine.put(model, &mut record)?;
        Ok(id)
    }
}

pub fn define_models(store: &MemoryRecordStore) {
    store.define_model(
        "users",
        [
            ("first_name", FieldType::String),
            ("last_name", FieldType::String),
            ("title", FieldType::String),
            ("gender", FieldType::String),
            ("email", FieldType::String),
            ("description", FieldType::Text),
            ("dob", FieldType::Date),
            ("created_at", FieldType::Datetime),
            ("verified", FieldType::Boolean),
            ("avatar", FieldType::Binary),
        ],
    );
    store.define_model(
        "patients",
        [
            ("height", FieldType::Float),
            ("weight", FieldType::Float),
            ("user_id", FieldType::String),
        ],
    );
    store.define_model(
        "medicare_cards",
        [
            ("number", FieldType::String),
            ("expiry", FieldType::Date),
            ("user_id", FieldType::String),
        ],
    );
    store.define_has_one("users", "patient", "patients", "user_id");
    store.define_has_one("users", "medicare_card", "medicare_cards", "user_id");
    store.define_belongs_to("patients", "user", "users", "user_id");
}

pub fn user_config() -> IndexConfig {
    IndexConfig::builder("users")
        .auto(["first_name", "last_name", "email", "dob", "created_at"])
        .exact(["gender", "title"])
        .match_all(["first_name", "last_name", "email"])
        .index_assoc("patient", |patient| patient.range(["height", "weight"]))
        .unique("email")
        .build()
}

pub fn fixture_with(config: EngineConfig, users: IndexConfig) -> Result<Fixture> {
    let store = Arc::new(MemoryRecordStore::new());
    define_models(&store);
    let backend = Arc::new(MemorySearchBackend::new());
    let engine = Arc::new(Engine::new(config, store.clone(), backend.clone()));
    store.set_hook_handler(engine.propagation_handler());
    engine.register(users)?;
    engine.create_collection("users")?;
    Ok(Fixture {
        store,
        backend,
        engine,
    })
}

pub fn fixture() -> Result<Fixture> {
    fixture_with(EngineConfig::default(), user_config())
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn user(first: &str, last: &str, gender: &str, dob: NaiveDate) -> Record {
    Record::new()
        .add_field("first_name", first)
        .add_field("last_name", last)
        .add_field("gender", gender)
        .add_field(
            "email",
            format!("{}.{}@example.com", first.to_lowercase(), last.to_lowercase()),
        )
        .add_field("dob", dob)
}
