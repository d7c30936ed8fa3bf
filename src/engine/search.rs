//! Query execution and result hydration.
//!
//! A [`Query`] starts out unbound and passes straight through to the record
//! store. Adding a constraint or an ordering binds it against the model's
//! indexes, after which terminals run the plan on the search backend, fetch
//! the returned ids from the record store and, when ordering was requested,
//! put the rows back into backend order.

use std::sync::Arc;

use crate::config::FinalizedIndexConfig;
use crate::data::{Record, Value};
use crate::engine::Engine;
use crate::error::{CipherdexError, Result};
use crate::query::{Direction, QueryBuilder, QueryCompiler, QueryPlan};

/// Where a [`Query`] is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryState {
    /// No constraints or ordering. Served by the record store alone.
    Unbound,
    /// Bound to indexes, not yet executed.
    Planned,
    /// Results fetched and cached.
    Loaded,
}

#[derive(Debug, Clone)]
struct Loaded {
    ids: Vec<String>,
    records: Vec<Record>,
}

/// A single-use query against one model.
pub struct Query<'e> {
    engine: &'e Engine,
    config: Arc<FinalizedIndexConfig>,
    collection: String,
    plan: QueryPlan,
    bound: bool,
    loaded: Option<Loaded>,
}

impl<'e> Query<'e> {
    pub(crate) fn new(engine: &'e Engine, config: Arc<FinalizedIndexConfig>, collection: String) -> Self {
        Self {
            engine,
            config,
            collection,
            plan: QueryPlan::default(),
            bound: false,
            loaded: None,
        }
    }

    pub fn state(&self) -> QueryState {
        match (&self.loaded, self.bound) {
            (Some(_), _) => QueryState::Loaded,
            (None, true) => QueryState::Planned,
            (None, false) => QueryState::Unbound,
        }
    }

    pub fn plan(&self) -> &QueryPlan {
        &self.plan
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn compiler(&self) -> QueryCompiler<'_> {
        QueryCompiler::new(self.config.indexes(), &self.collection)
    }

    fn rebind(mut self) -> Self {
        self.bound = true;
        self.loaded = None;
        self
    }

    /// Add constraints.
    pub fn filter(mut self, builder: QueryBuilder) -> Result<Self> {
        for expr in builder.build() {
            let bound = self.compiler().bind(&expr)?;
            self.plan.constraints.push(bound);
        }
        Ok(self.rebind())
    }

    /// Add one equality constraint.
    pub fn where_eq(self, field: &str, value: impl Into<Value>) -> Result<Self> {
        self.filter(QueryBuilder::new().eq(field, value))
    }

    /// Add a free-text search over the match-all index.
    pub fn text(mut self, text: &str) -> Result<Self> {
        let bound = self.compiler().bind_free_text(text)?;
        self.plan.constraints.push(bound);
        Ok(self.rebind())
    }

    pub fn order_by(mut self, field: &str, direction: Direction) -> Result<Self> {
        let binding = self.compiler().bind_order(field, direction)?;
        self.plan.ordering.push(binding);
        Ok(self.rebind())
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.plan.limit = Some(limit);
        self.loaded = None;
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.plan.offset = Some(offset);
        self.loaded = None;
        self
    }

    /// Execute once and cache the results.
    pub fn load(&mut self) -> Result<&[Record]> {
        let loaded = match self.loaded.take() {
            Some(loaded) => loaded,
            None => self.fetch(&self.plan)?,
        };
        Ok(&self.loaded.insert(loaded).records)
    }

    pub fn into_records(mut self) -> Result<Vec<Record>> {
        self.load()?;
        Ok(self.loaded.map(|loaded| loaded.records).unwrap_or_default())
    }

    /// Stash ids in result order.
    pub fn ids(&mut self) -> Result<Vec<String>> {
        self.load()?;
        Ok(self
            .loaded
            .as_ref()
            .map(|loaded| loaded.ids.clone())
            .unwrap_or_default())
    }

    /// The first result. An unloaded query is limited to one row before it
    /// loads, and keeps that limit.
    pub fn first(&mut self) -> Result<Option<Record>> {
        if self.loaded.is_none() {
            self.plan.limit = Some(self.plan.limit.map_or(1, |limit| limit.min(1)));
        }
        Ok(self.load()?.first().cloned())
    }

    pub fn last(&mut self) -> Result<Option<Record>> {
        Ok(self.load()?.last().cloned())
    }

    /// The trailing `n` results, in result order.
    pub fn last_n(&mut self, n: usize) -> Result<Vec<Record>> {
        let records = self.load()?;
        Ok(records[records.len().saturating_sub(n)..].to_vec())
    }

    pub fn count(&mut self) -> Result<usize> {
        Ok(self.load()?.len())
    }

    pub fn exists(&mut self) -> Result<bool> {
        Ok(!self.load()?.is_empty())
    }

    /// Rows matching a store-native predicate. Only an unbound query can
    /// take one.
    pub fn filter_raw(&self, predicate: &str) -> Result<Vec<Record>> {
        self.ensure_unbound("filter_raw")?;
        self.engine.store().fetch_where(self.config.model(), predicate)
    }

    /// Delete every row without running hooks or touching the index.
    pub fn delete_all(&self) -> Result<usize> {
        self.ensure_unbound("delete_all")?;
        self.engine.store().delete_all(self.config.model())
    }

    /// Remove every row's document from the index, then delete the rows.
    pub fn destroy_all(&self) -> Result<usize> {
        self.ensure_unbound("destroy_all")?;
        let model = self.config.model();
        for record in self.engine.store().fetch_page(model, None, None)? {
            if let Some(id) = record.id() {
                self.engine.delete(model, id)?;
            }
        }
        self.engine.store().delete_all(model)
    }

    fn ensure_unbound(&self, operation: &str) -> Result<()> {
        if self.bound {
            return Err(CipherdexError::unsupported(format!(
                "{operation} cannot be combined with an encrypted search on '{}'",
                self.collection
            )));
        }
        Ok(())
    }

    fn fetch_ids(&self, plan: &QueryPlan) -> Result<Vec<String>> {
        self.engine
            .ensure_verified(&self.collection, self.config.indexes())?;
        log::debug!("executing query on '{}': {plan:?}", self.collection);
        self.engine.backend().execute_query(&self.collection, plan)
    }

    fn fetch(&self, plan: &QueryPlan) -> Result<Loaded> {
        let model = self.config.model();
        if !self.bound {
            let records = self
                .engine
                .store()
                .fetch_page(model, plan.limit, plan.offset)?;
            let ids = records
                .iter()
                .filter_map(|record| record.id().map(str::to_string))
                .collect();
            return Ok(Loaded { ids, records });
        }

        let ids = self.fetch_ids(plan)?;
        let store = self.engine.store();
        let records = if plan.is_ordered() {
            store.fetch_ordered(model, &ids)?
        } else {
            store.fetch_by_ids(model, &ids)?
        };
        Ok(Loaded { ids, records })
    }
}
