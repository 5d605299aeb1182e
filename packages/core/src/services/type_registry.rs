//! Page Type Registry
//!
//! Collaborator seams of the page tree:
//!
//! - [`PageTypeManager`] - per-type defaults and input conversion
//! - [`PageTypeRegistry`] - lookup of managers by type name
//! - [`IdGenerator`] - source of fresh `aposDocId`s
//! - [`TreePermissions`] - create/edit checks
//!
//! The registry follows a plain `HashMap` keyed by type name. Managers are
//! shared behind `Arc` so the registry itself is cheap to clone.

use crate::models::{is_valid_slug, Page, STRUCTURAL_FIELDS};
use crate::services::context::RequestContext;
use crate::services::error::PageTreeError;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Per-type behavior
pub trait PageTypeManager: Send + Sync {
    fn type_name(&self) -> &str;

    /// Singleton types have at most one page per locale
    fn is_singleton(&self) -> bool {
        false
    }

    /// Default field values for a fresh instance
    fn new_instance(&self) -> Map<String, Value>;

    /// Copy user input onto `page`
    ///
    /// Keys starting with `_` and structural field names are ignored.
    fn convert(&self, input: &Map<String, Value>, page: &mut Page) -> Result<(), PageTreeError> {
        for (key, value) in input {
            if key.starts_with('_') || STRUCTURAL_FIELDS.contains(&key.as_str()) {
                continue;
            }
            if key == "slug" {
                match value.as_str() {
                    Some(slug) if is_valid_slug(slug) => {}
                    _ => return Err(PageTreeError::invalid(format!("invalid slug {}", value))),
                }
            }
            page.set_field(key, value.clone())
                .map_err(PageTreeError::invalid)?;
        }
        Ok(())
    }
}

/// Manager with static defaults
#[derive(Debug, Clone)]
pub struct BasicPageType {
    name: String,
    singleton: bool,
    defaults: Map<String, Value>,
}

impl BasicPageType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            singleton: false,
            defaults: Map::new(),
        }
    }

    pub fn singleton(mut self) -> Self {
        self.singleton = true;
        self
    }

    pub fn with_default(mut self, key: impl Into<String>, value: Value) -> Self {
        self.defaults.insert(key.into(), value);
        self
    }
}

impl PageTypeManager for BasicPageType {
    fn type_name(&self) -> &str {
        &self.name
    }

    fn is_singleton(&self) -> bool {
        self.singleton
    }

    fn new_instance(&self) -> Map<String, Value> {
        self.defaults.clone()
    }
}

/// Registry of page type managers keyed by type name
#[derive(Clone, Default)]
pub struct PageTypeRegistry {
    managers: HashMap<String, Arc<dyn PageTypeManager>>,
}

impl PageTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the home, archive and default page types
    pub fn with_defaults(home: &str, archive: &str, default: &str) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(BasicPageType::new(home).singleton()));
        registry.register(Arc::new(BasicPageType::new(archive).singleton()));
        registry.register(Arc::new(BasicPageType::new(default)));
        registry
    }

    /// Register a manager, replacing any previous one with the same name
    pub fn register(&mut self, manager: Arc<dyn PageTypeManager>) {
        self.managers
            .insert(manager.type_name().to_string(), manager);
    }

    pub fn get(&self, type_name: &str) -> Option<Arc<dyn PageTypeManager>> {
        self.managers.get(type_name).cloned()
    }

    /// Look up a manager, failing with `Invalid` for unknown types
    pub fn require(&self, type_name: &str) -> Result<Arc<dyn PageTypeManager>, PageTreeError> {
        self.get(type_name)
            .ok_or_else(|| PageTreeError::invalid(format!("unknown page type '{}'", type_name)))
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.managers.contains_key(type_name)
    }

    pub fn type_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.managers.keys().cloned().collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for PageTypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageTypeRegistry")
            .field("types", &self.type_names())
            .finish()
    }
}

/// Source of fresh `aposDocId`s
pub trait IdGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// UUID v4 ids
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidIdGenerator;

impl IdGenerator for UuidIdGenerator {
    fn generate(&self) -> String {
        uuid::Uuid::new_v4().simple().to_string()
    }
}

/// Permission checks consulted before structural writes
pub trait TreePermissions: Send + Sync {
    fn can_create_child(&self, ctx: &RequestContext, parent: &Page) -> bool;

    fn can_edit(&self, ctx: &RequestContext, page: &Page) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl TreePermissions for AllowAll {
    fn can_create_child(&self, _ctx: &RequestContext, _parent: &Page) -> bool {
        true
    }

    fn can_edit(&self, _ctx: &RequestContext, _page: &Page) -> bool {
        true
    }
}
