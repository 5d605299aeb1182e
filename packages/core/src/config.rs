//! Configuration for the page tree
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Parked id of the tree root
pub const HOME_PARKED_ID: &str = "home";

/// Parked id of the archive root
pub const ARCHIVE_PARKED_ID: &str = "archive";

/// Declarative description of a page pinned by configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParkedPageSpec {
    pub parked_id: String,

    pub slug: String,

    #[serde(rename = "type")]
    pub page_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// `Some(0)` makes this page the tree root
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<u32>,

    /// Slug of the parent page; defaults to `/`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orphan: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived: Option<bool>,

    /// Literal values, parked and re-applied on every reconcile
    #[serde(default)]
    pub fields: Map<String, Value>,

    /// Initial values, used only when the page is created
    #[serde(default)]
    pub defaults: Map<String, Value>,

    #[serde(default)]
    pub children: Vec<ParkedPageSpec>,
}

impl ParkedPageSpec {
    pub fn new(parked_id: &str, slug: &str, page_type: &str) -> Self {
        Self {
            parked_id: parked_id.to_string(),
            slug: slug.to_string(),
            page_type: page_type.to_string(),
            title: None,
            level: None,
            parent: None,
            orphan: None,
            archived: None,
            fields: Map::new(),
            defaults: Map::new(),
            children: Vec::new(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.level == Some(0)
    }

    /// Names of the fields this page pins
    pub fn parked_fields(&self) -> Vec<String> {
        let mut names = vec![
            "parkedId".to_string(),
            "slug".to_string(),
            "type".to_string(),
        ];
        if self.title.is_some() {
            names.push("title".to_string());
        }
        if self.orphan.is_some() {
            names.push("orphan".to_string());
        }
        if self.archived.is_some() {
            names.push("archived".to_string());
        }
        for key in self.fields.keys() {
            if !names.contains(key) {
                names.push(key.clone());
            }
        }
        names
    }

    /// Pinned value of a parked field
    pub fn parked_value(&self, name: &str) -> Option<Value> {
        match name {
            "parkedId" => Some(Value::String(self.parked_id.clone())),
            "slug" => Some(Value::String(self.slug.clone())),
            "type" => Some(Value::String(self.page_type.clone())),
            "title" => self.title.clone().map(Value::String),
            "orphan" => self.orphan.map(Value::Bool),
            "archived" => self.archived.map(Value::Bool),
            other => self.fields.get(other).cloned(),
        }
    }
}

/// Page tree configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TreeConfig {
    pub default_locale: String,

    /// Every configured locale; the default locale is implied
    pub locales: Vec<String>,

    /// Name passed to the lock service
    pub lock_name: String,

    /// Maximum wait for the tree lock
    pub lock_wait_ms: u64,

    pub home_type: String,

    pub archive_type: String,

    /// Type used when an insert names none
    pub default_type: String,

    /// Upper bound on `-2`, `-3`, ... suffixes tried for a taken slug
    pub max_slug_attempts: u32,

    /// Additional parked pages, merged after the home and archive pages
    pub park: Vec<ParkedPageSpec>,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            default_locale: "en".to_string(),
            locales: Vec::new(),
            lock_name: "page-tree".to_string(),
            lock_wait_ms: 30_000,
            home_type: "home-page".to_string(),
            archive_type: "archive-page".to_string(),
            default_type: "default-page".to_string(),
            max_slug_attempts: 100,
            park: Vec::new(),
        }
    }
}

impl TreeConfig {
    pub fn from_json_str(json: &str) -> Result<Self, String> {
        let config: TreeConfig =
            serde_json::from_str(json).map_err(|e| format!("invalid tree config: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.default_locale.is_empty() {
            return Err("default_locale cannot be empty".to_string());
        }

        if self.lock_name.is_empty() {
            return Err("lock_name cannot be empty".to_string());
        }

        if self.lock_wait_ms == 0 {
            return Err("lock_wait_ms must be greater than 0".to_string());
        }

        if self.max_slug_attempts == 0 {
            return Err("max_slug_attempts must be greater than 0".to_string());
        }

        for spec in &self.park {
            validate_spec(spec)?;
        }

        Ok(())
    }

    /// Default locale first, then the other configured locales
    pub fn all_locales(&self) -> Vec<String> {
        let mut locales = vec![self.default_locale.clone()];
        for locale in &self.locales {
            if !locales.contains(locale) {
                locales.push(locale.clone());
            }
        }
        locales
    }

    pub fn home_spec(&self) -> ParkedPageSpec {
        let mut spec = ParkedPageSpec::new(HOME_PARKED_ID, "/", &self.home_type);
        spec.level = Some(0);
        spec.title = Some("Home".to_string());
        spec
    }

    pub fn archive_spec(&self) -> ParkedPageSpec {
        let mut spec = ParkedPageSpec::new(ARCHIVE_PARKED_ID, "/archive", &self.archive_type);
        spec.title = Some("Archive".to_string());
        spec.archived = Some(true);
        spec.orphan = Some(true);
        spec
    }

    /// The minimum parked set merged with the configured one
    pub fn parked_specs(&self) -> Vec<ParkedPageSpec> {
        merge_parked(&[
            vec![self.home_spec(), self.archive_spec()],
            self.park.clone(),
        ])
    }
}

fn validate_spec(spec: &ParkedPageSpec) -> Result<(), String> {
    if spec.parked_id.is_empty() {
        return Err("parked page without parkedId".to_string());
    }
    if !crate::models::is_valid_slug(&spec.slug) {
        return Err(format!(
            "parked page '{}' has invalid slug '{}'",
            spec.parked_id, spec.slug
        ));
    }
    if spec.page_type.is_empty() {
        return Err(format!("parked page '{}' has no type", spec.parked_id));
    }
    for child in &spec.children {
        validate_spec(child)?;
    }
    Ok(())
}

/// Merge parked lists by `parkedId`
///
/// Later lists win for a repeated key; the position of the first occurrence
/// is kept.
pub fn merge_parked(lists: &[Vec<ParkedPageSpec>]) -> Vec<ParkedPageSpec> {
    let mut merged: Vec<ParkedPageSpec> = Vec::new();
    for spec in lists.iter().flatten() {
        match merged.iter_mut().find(|s| s.parked_id == spec.parked_id) {
            Some(existing) => *existing = spec.clone(),
            None => merged.push(spec.clone()),
        }
    }
    merged
}
