mod common;

use std::sync::Arc;

use cipherdex::engine::config::EngineConfig;
use cipherdex::store::memory::{MemoryRecordStore, MemorySearchBackend};
use cipherdex::{
    ConfigCompiler, Engine, FieldDeclaration, FieldPath, FieldType, IndexConfig, IndexKind,
    MatchOptions, Result, SchemaCompiler,
};

use common::{define_models, user_config};

fn store() -> MemoryRecordStore {
    let store = MemoryRecordStore::new();
    define_models(&store);
    store
}

#[test]
fn test_auto_string_field_end_to_end() -> Result<()> {
    let store = MemoryRecordStore::new();
    store.define_model("people", [("name", FieldType::String)]);

    let finalized = ConfigCompiler::new(&store)
        .compile(&IndexConfig::builder("people").auto(["name"]).build())?;
    let names: Vec<(&str, IndexKind)> = finalized
        .indexes()
        .iter()
        .map(|index| (index.name(), index.kind()))
        .collect();
    assert_eq!(
        names,
        vec![
            ("name", IndexKind::Exact),
            ("name_range", IndexKind::Range),
            ("name_match", IndexKind::Match),
        ]
    );

    let schema = SchemaCompiler::compile_config(&finalized);
    let json = serde_json::to_value(&schema)?;
    assert_eq!(
        json["indexes"]["name"],
        serde_json::json!({"kind": "exact", "field": "name"})
    );
    assert_eq!(json["type"]["name"], "string");
    Ok(())
}

#[test]
fn test_finalize_is_idempotent() -> Result<()> {
    let store = Arc::new(store());
    let engine = Engine::new(
        EngineConfig::default(),
        store.clone(),
        Arc::new(MemorySearchBackend::new()),
    );
    engine.register(user_config())?;

    let first = engine.indexes("users")?;
    let second = engine.indexes("users")?;
    assert!(Arc::ptr_eq(&first, &second));

    let tuples = |set: &cipherdex::IndexSet| -> Vec<(String, String, IndexKind, bool)> {
        set.iter()
            .map(|i| (i.name().to_string(), i.field().to_string(), i.kind(), i.unique()))
            .collect()
    };
    let recompiled = ConfigCompiler::new(store.as_ref()).compile(&user_config())?;
    assert_eq!(tuples(first.indexes()), tuples(recompiled.indexes()));

    // Hooks are registered by the first finalize only.
    assert_eq!(store.registered_hooks().len(), 2);
    Ok(())
}

#[test]
fn test_user_model_indexes() -> Result<()> {
    let store = store();
    let finalized = ConfigCompiler::new(&store).compile(&user_config())?;
    let indexes = finalized.indexes();

    assert_eq!(indexes.count_on("first_name"), 3);
    assert_eq!(indexes.count_on("dob"), 1);
    assert!(indexes.has("dob", IndexKind::Range));
    assert!(indexes.has("gender", IndexKind::Exact));
    assert!(!indexes.has("gender", IndexKind::Range));
    assert!(indexes.get("email", IndexKind::Exact).unwrap().unique());
    assert!(!indexes.get("email", IndexKind::Range).unwrap().unique());

    let height = indexes.get("patient.height", IndexKind::Range).unwrap();
    assert_eq!(height.name(), "patient.height_range");
    assert_eq!(height.field(), &FieldPath::associated("patient", "height"));

    let multi = indexes.match_all().unwrap();
    assert_eq!(multi.fields().len(), 3);
    Ok(())
}

#[test]
fn test_unique_resolution() -> Result<()> {
    let store = store();
    let compiler = ConfigCompiler::new(&store);

    // No index yet: one synthesized unique exact index.
    let finalized = compiler.compile(&IndexConfig::builder("users").unique("title").build())?;
    let on_title = finalized.indexes().on("title");
    assert_eq!(on_title.len(), 1);
    assert_eq!(on_title[0].kind(), IndexKind::Exact);
    assert!(on_title[0].unique());

    // Exact, range and match present: only exact becomes unique.
    let finalized = compiler.compile(
        &IndexConfig::builder("users")
            .auto(["title"])
            .unique("title")
            .build(),
    )?;
    let flags: Vec<(IndexKind, bool)> = finalized
        .indexes()
        .on("title")
        .iter()
        .map(|i| (i.kind(), i.unique()))
        .collect();
    assert_eq!(
        flags,
        vec![
            (IndexKind::Exact, true),
            (IndexKind::Range, false),
            (IndexKind::Match, false)
        ]
    );

    // Non-string types mark their range index.
    let finalized = compiler.compile(
        &IndexConfig::builder("users")
            .auto(["created_at"])
            .unique("created_at")
            .build(),
    )?;
    assert!(finalized.indexes().get("created_at", IndexKind::Range).unwrap().unique());

    // Non-string field with no index yet: range is the only kind it can carry.
    let finalized = compiler.compile(&IndexConfig::builder("users").unique("dob").build())?;
    assert!(finalized.indexes().get("dob", IndexKind::Range).unwrap().unique());
    Ok(())
}

#[test]
fn test_configuration_errors() {
    let store = store();
    let compiler = ConfigCompiler::new(&store);
    let compile = |config: IndexConfig| compiler.compile(&config);

    let err = compile(
        IndexConfig::builder("users")
            .matching(["first_name"])
            .matching(["first_name"])
            .build(),
    )
    .unwrap_err();
    assert!(err.is_config_error());
    assert!(err.to_string().contains(
        "Multiple indexes of the same type on the same attribute: users#first_name, index type: match"
    ));

    let err = compile(
        IndexConfig::builder("users")
            .declare(FieldDeclaration::auto(["first_name"]).only([IndexKind::Match]))
            .unique("first_name")
            .build(),
    )
    .unwrap_err();
    assert!(err.is_config_error());

    let err = compile(IndexConfig::builder("users").matching(["verified"]).build()).unwrap_err();
    assert!(err.is_config_error());

    let err = compile(IndexConfig::builder("users").range(["gender.name"]).build()).unwrap_err();
    assert!(err.to_string().contains("Malformed field identifier"));

    let err = compile(
        IndexConfig::builder("users")
            .match_all(["first_name"])
            .match_all(["email"])
            .build(),
    )
    .unwrap_err();
    assert!(err.is_config_error());

    let err = compile(IndexConfig::builder("nobody").auto(["x"]).build()).unwrap_err();
    assert!(!err.is_config_error());
}

#[test]
fn test_binary_field_is_excluded_from_schema() -> Result<()> {
    let store = store();
    let finalized = ConfigCompiler::new(&store).compile(
        &IndexConfig::builder("users")
            .auto(["avatar", "first_name"])
            .build(),
    )?;
    let schema = SchemaCompiler::compile_config(&finalized);

    assert!(!schema.types.contains_key("avatar"));
    assert!(schema.indexes.keys().all(|name| !name.starts_with("avatar")));
    assert_eq!(schema.types.get("first_name").map(String::as_str), Some("string"));
    assert_eq!(schema.types.get("verified").map(String::as_str), Some("boolean"));
    Ok(())
}

#[test]
fn test_schema_through_engine_is_stable() -> Result<()> {
    let config = EngineConfig::builder()
        .match_defaults(MatchOptions::default().filter_size(256).filter_term_bits(3))
        .build();
    let fixture = common::fixture_with(config, user_config())?;

    let first = fixture.engine.schema("users")?.to_json()?;
    let second = fixture.engine.schema("users")?.to_json()?;
    assert_eq!(first, second);

    let schema = fixture.engine.schema("users")?;
    let json = serde_json::to_value(&schema)?;
    assert_eq!(json["type"]["__patient_height"], "float64");
    assert_eq!(
        json["indexes"]["patient.height_range"]["field"],
        "__patient_height"
    );
    assert_eq!(json["indexes"]["__match_multi"]["filterSize"], 256);
    assert_eq!(
        json["indexes"]["__match_multi"]["fields"],
        serde_json::json!(["first_name", "last_name", "email"])
    );
    Ok(())
}
