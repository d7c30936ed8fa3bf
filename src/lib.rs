//! # Cipherdex
//!
//! Index configuration and query compilation for records whose sensitive
//! fields live encrypted in an external search backend.
//!
//! ## Features
//!
//! - Declarative per-model index configuration with type checking
//! - Denormalized one-to-one association fields with change propagation
//! - Deterministic schema documents for the search backend
//! - Constraint and ordering binding with operator/index validation
//! - Result hydration that preserves backend ordering
//! - Drift detection between declared and deployed indexes

pub mod config;
pub mod data;
pub mod engine;
pub mod error;
pub mod index;
pub mod query;
pub mod store;

// Re-exports for the public API
pub use config::{
    ConfigCompiler, FieldDeclaration, FinalizedIndexConfig, IndexConfig, IndexMode,
    PropagationRule,
};
pub use data::{FieldType, Record, Value};
pub use engine::Engine;
pub use engine::config::EngineConfig;
pub use engine::consistency::{CollectionMetadata, RemoteIndex};
pub use engine::schema::{SchemaCompiler, SchemaDocument};
pub use engine::search::{Query, QueryState};
pub use error::{CipherdexError, Result};
pub use index::{FieldPath, IndexKind, IndexSet, IndexSpec, MatchOptions, Operator};
pub use query::{Direction, QueryBuilder, QueryCompiler, QueryPlan};
pub use store::{AssociationKind, ModelCatalog, RecordStore, SearchBackend, Trigger};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
