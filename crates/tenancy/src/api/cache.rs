//! Bound model cache.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::dimension::DimensionId;
use crate::error::TenancyResult;
use crate::model::Model;

/// Identifies one bound model: the model it was derived from, the
/// dimension and the id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct CacheKey {
    model: usize,
    dimension: String,
    dimension_id: DimensionId,
}

impl CacheKey {
    pub(crate) fn new(base: &Model, dimension: &str, dimension_id: &DimensionId) -> Self {
        Self {
            model: base.identity(),
            dimension: dimension.to_string(),
            dimension_id: dimension_id.clone(),
        }
    }
}

/// Process-lifetime map from [`CacheKey`] to bound model.
///
/// Entries are never evicted. The cache holds each base model alive through
/// its bound models, so base identities stay unique for as long as their
/// entries exist.
#[derive(Debug, Default)]
pub struct ModelCache {
    models: RwLock<HashMap<CacheKey, Model>>,
}

impl ModelCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn get(&self, key: &CacheKey) -> Option<Model> {
        self.models.read().get(key).cloned()
    }

    /// Returns the cached model for `key`, building and storing it on a miss.
    ///
    /// The model is built outside the lock. When two callers race, the first
    /// insert wins and both receive the same model.
    pub(crate) fn get_or_try_insert_with<F>(&self, key: CacheKey, build: F) -> TenancyResult<Model>
    where
        F: FnOnce() -> TenancyResult<Model>,
    {
        if let Some(model) = self.get(&key) {
            return Ok(model);
        }
        let model = build()?;
        let mut models = self.models.write();
        Ok(models.entry(key).or_insert(model).clone())
    }

    /// Returns the number of cached models.
    pub fn len(&self) -> usize {
        self.models.read().len()
    }

    /// Returns `true` if nothing has been cached yet.
    pub fn is_empty(&self) -> bool {
        self.models.read().is_empty()
    }
}
