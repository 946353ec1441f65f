//! Per-subject record of applied dimensions.
//!
//! Schemas and models each own a [`DimensionRegistry`]. On a schema the
//! entries carry only the resolved options; on a bound model they also carry
//! the id the model is bound to.

use std::sync::Arc;

use crate::error::ConfigError;

use super::{DimensionId, DimensionOptions};

/// One applied dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct DimensionEntry {
    options: Arc<DimensionOptions>,
    dimension_id: Option<DimensionId>,
}

impl DimensionEntry {
    /// Creates an entry for an applied, unbound dimension.
    pub fn new(options: Arc<DimensionOptions>) -> Self {
        Self {
            options,
            dimension_id: None,
        }
    }

    /// Creates an entry for a dimension bound to `dimension_id`.
    pub fn bound(options: Arc<DimensionOptions>, dimension_id: DimensionId) -> Self {
        Self {
            options,
            dimension_id: Some(dimension_id),
        }
    }

    /// Returns the resolved options.
    pub fn options(&self) -> &Arc<DimensionOptions> {
        &self.options
    }

    /// Returns the bound id, if any.
    pub fn dimension_id(&self) -> Option<&DimensionId> {
        self.dimension_id.as_ref()
    }
}

/// Map of dimension name to entry, in application order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DimensionRegistry {
    entries: Vec<(String, DimensionEntry)>,
}

impl DimensionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `entry` under `dimension`.
    ///
    /// Adding an entry equal to the existing one is a no-op. Adding a
    /// different entry for a dimension that is already present fails with
    /// [`ConfigError::DuplicateDimension`], naming `subject_name` or
    /// `<unknown model>`.
    pub fn add(
        &mut self,
        dimension: &str,
        entry: DimensionEntry,
        subject_name: Option<&str>,
    ) -> Result<(), ConfigError> {
        match self.get(dimension) {
            Some(existing) if *existing == entry => Ok(()),
            Some(_) => Err(ConfigError::DuplicateDimension {
                dimension: dimension.to_string(),
                model: subject_name.unwrap_or("<unknown model>").to_string(),
            }),
            None => {
                self.entries.push((dimension.to_string(), entry));
                Ok(())
            }
        }
    }

    /// Returns the entry for `dimension`.
    pub fn get(&self, dimension: &str) -> Option<&DimensionEntry> {
        self.entries
            .iter()
            .find(|(name, _)| name == dimension)
            .map(|(_, entry)| entry)
    }

    /// Returns `true` if `dimension` has been applied.
    pub fn has(&self, dimension: &str) -> bool {
        self.get(dimension).is_some()
    }

    /// Removes the entry for `dimension`, returning it.
    pub fn remove(&mut self, dimension: &str) -> Option<DimensionEntry> {
        let index = self.entries.iter().position(|(name, _)| name == dimension)?;
        Some(self.entries.remove(index).1)
    }

    /// Iterates over entries in application order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &DimensionEntry)> {
        self.entries.iter().map(|(name, entry)| (name.as_str(), entry))
    }

    /// Returns the number of applied dimensions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no dimension has been applied.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Something that owns a dimension registry.
pub trait DimensionSubject {
    /// Returns the subject's registry.
    fn dimension_registry(&self) -> &DimensionRegistry;

    /// Returns the name used in error messages, if the subject has one.
    fn subject_name(&self) -> Option<&str> {
        None
    }
}

impl DimensionSubject for DimensionRegistry {
    fn dimension_registry(&self) -> &DimensionRegistry {
        self
    }
}

/// Read-only view over a subject's registry.
pub struct Dimensions<'a> {
    subject: &'a dyn DimensionSubject,
}

impl<'a> Dimensions<'a> {
    /// Returns the entry for `dimension`.
    pub fn get(&self, dimension: &str) -> Option<&'a DimensionEntry> {
        self.subject.dimension_registry().get(dimension)
    }

    /// Returns `true` if `dimension` has been applied to the subject.
    pub fn has(&self, dimension: &str) -> bool {
        self.subject.dimension_registry().has(dimension)
    }

    /// Returns the subject's name, or `<unknown model>`.
    pub fn subject_name(&self) -> &'a str {
        self.subject.subject_name().unwrap_or("<unknown model>")
    }
}

/// Opens the dimension interface of `subject`. Plugin application and the
/// dimension-aware db read registries through it.
///
/// Fails with [`ConfigError::InvalidSubject`] when there is no subject.
pub fn dimensions(subject: Option<&dyn DimensionSubject>) -> Result<Dimensions<'_>, ConfigError> {
    subject
        .map(|subject| Dimensions { subject })
        .ok_or(ConfigError::InvalidSubject)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimension::{PluginOptions, resolve};

    struct Named(DimensionRegistry);

    impl DimensionSubject for Named {
        fn dimension_registry(&self) -> &DimensionRegistry {
            &self.0
        }

        fn subject_name(&self) -> Option<&str> {
            Some("User")
        }
    }

    fn tenant_entry() -> DimensionEntry {
        DimensionEntry::new(Arc::new(resolve(&PluginOptions::default())))
    }

    #[test]
    fn test_add_and_get() {
        let mut registry = DimensionRegistry::new();
        registry.add("tenant", tenant_entry(), None).unwrap();
        assert!(registry.has("tenant"));
        assert!(!registry.has("customer"));
        assert_eq!(registry.get("tenant"), Some(&tenant_entry()));
        assert_eq!(registry.get("customer"), None);
    }

    #[test]
    fn test_add_identical_is_noop() {
        let mut registry = DimensionRegistry::new();
        registry.add("tenant", tenant_entry(), None).unwrap();
        registry.add("tenant", tenant_entry(), None).unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_add_conflicting_fails() {
        let mut registry = DimensionRegistry::new();
        registry.add("tenant", tenant_entry(), None).unwrap();

        let other = DimensionEntry::new(Arc::new(resolve(
            &PluginOptions::default().with_id_key("customerId"),
        )));
        let err = registry.add("tenant", other.clone(), None).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Dimension \"tenant\" already applied to model \"<unknown model>\""
        );

        let err = registry.add("tenant", other, Some("User")).unwrap_err();
        assert_eq!(
            err,
            ConfigError::DuplicateDimension {
                dimension: "tenant".to_string(),
                model: "User".to_string(),
            }
        );
    }

    #[test]
    fn test_bound_entry_differs_from_unbound() {
        let options = Arc::new(resolve(&PluginOptions::default()));
        let bound = DimensionEntry::bound(options.clone(), DimensionId::new("a"));
        assert_ne!(bound, DimensionEntry::new(options));
        assert_eq!(bound.dimension_id(), Some(&DimensionId::new("a")));
    }

    #[test]
    fn test_application_order_and_remove() {
        let mut registry = DimensionRegistry::new();
        registry.add("tenant", tenant_entry(), None).unwrap();
        let customer = DimensionEntry::new(Arc::new(resolve(
            &PluginOptions::default().with_dimension("customer"),
        )));
        registry.add("customer", customer, None).unwrap();

        let names: Vec<_> = registry.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["tenant", "customer"]);

        assert!(registry.remove("tenant").is_some());
        assert!(registry.remove("tenant").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_interface_requires_subject() {
        assert!(matches!(dimensions(None), Err(ConfigError::InvalidSubject)));

        let subject = Named(DimensionRegistry::new());
        let interface = dimensions(Some(&subject)).unwrap();
        assert!(!interface.has("tenant"));
        assert_eq!(interface.subject_name(), "User");
    }
}
