//! Error types for index compilation, query binding and collection management.

use thiserror::Error;

/// The main error type for cipherdex.
#[derive(Error, Debug)]
pub enum CipherdexError {
    /// Illegal index configuration. Always fatal to compilation.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A query could not be bound to the model's indexes.
    #[error("Query error: {0}")]
    Query(String),

    /// A free-text query was issued against a model without a match-all index.
    #[error(
        "There is no match-all index defined for the '{collection}' collection; free-text queries require one"
    )]
    NoMatchAllIndex { collection: String },

    #[error("The collection '{name}' does not exist; create it before indexing or querying")]
    NoCollection { name: String },

    #[error("The collection '{name}' already exists")]
    CollectionExists { name: String },

    /// The deployed collection no longer matches the declared indexes.
    #[error(
        "The '{name}' collection has diverged from its index configuration; recreate it and reindex"
    )]
    CollectionDiverged { name: String },

    /// An operation that has no mapping onto the search backend.
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Search backend error: {0}")]
    Backend(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for operations that may fail with [`CipherdexError`].
pub type Result<T> = std::result::Result<T, CipherdexError>;

impl CipherdexError {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        CipherdexError::Config(msg.into())
    }

    pub fn query<S: Into<String>>(msg: S) -> Self {
        CipherdexError::Query(msg.into())
    }

    pub fn no_match_all<S: Into<String>>(collection: S) -> Self {
        CipherdexError::NoMatchAllIndex {
            collection: collection.into(),
        }
    }

    pub fn no_collection<S: Into<String>>(name: S) -> Self {
        CipherdexError::NoCollection { name: name.into() }
    }

    pub fn collection_exists<S: Into<String>>(name: S) -> Self {
        CipherdexError::CollectionExists { name: name.into() }
    }

    pub fn diverged<S: Into<String>>(name: S) -> Self {
        CipherdexError::CollectionDiverged { name: name.into() }
    }

    pub fn unsupported<S: Into<String>>(msg: S) -> Self {
        CipherdexError::Unsupported(msg.into())
    }

    pub fn storage<S: Into<String>>(msg: S) -> Self {
        CipherdexError::Storage(msg.into())
    }

    pub fn backend<S: Into<String>>(msg: S) -> Self {
        CipherdexError::Backend(msg.into())
    }

    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        CipherdexError::NotFound(msg.into())
    }

    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        CipherdexError::InvalidArgument(msg.into())
    }

    /// Returns true for errors raised while compiling an index configuration.
    pub fn is_config_error(&self) -> bool {
        matches!(self, CipherdexError::Config(_))
    }

    /// Returns true for errors raised while binding a query to indexes.
    pub fn is_query_error(&self) -> bool {
        matches!(
            self,
            CipherdexError::Query(_) | CipherdexError::NoMatchAllIndex { .. }
        )
    }

    /// Returns true for collection lifecycle and consistency errors.
    pub fn is_collection_error(&self) -> bool {
        matches!(
            self,
            CipherdexError::NoCollection { .. }
                | CipherdexError::CollectionExists { .. }
                | CipherdexError::CollectionDiverged { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(CipherdexError::config("bad").is_config_error());
        assert!(CipherdexError::query("bad").is_query_error());
        assert!(CipherdexError::no_match_all("users").is_query_error());
        assert!(!CipherdexError::no_match_all("users").is_collection_error());
        assert!(CipherdexError::diverged("users").is_collection_error());
        assert!(!CipherdexError::storage("down").is_query_error());
    }

    #[test]
    fn test_messages_name_the_collection() {
        let err = CipherdexError::diverged("users");
        assert!(err.to_string().contains("'users'"));

        let err = CipherdexError::no_collection("patients");
        assert!(err.to_string().contains("'patients' does not exist"));
    }
}
