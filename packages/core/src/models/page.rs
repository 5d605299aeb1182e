//! Page Data Structures
//!
//! This module defines the `Page` struct, the universal document for every
//! entry in the page tree, plus helpers for composing variant ids and working
//! with materialized paths and slugs.
//!
//! # Identity
//!
//! - **`aposDocId`**: locale/mode independent id shared by every variant
//! - **`_id`**: `"{aposDocId}:{locale}:{mode}"`, one per variant
//! - **`path`**: `/`-joined `aposDocId`s from the root down to the page itself
//!
//! # Examples
//!
//! ```rust
//! use pagetree_core::models::{Mode, PageId};
//!
//! let id = PageId::compose("ck1", "en", Mode::Draft);
//! assert_eq!(id, "ck1:en:draft");
//!
//! let parsed = PageId::parse(&id).unwrap();
//! assert_eq!(parsed.doc_id, "ck1");
//! assert_eq!(parsed.mode, Mode::Draft);
//! ```

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// Temporal variant of a page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Draft,
    Published,
    Previous,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Draft => "draft",
            Mode::Published => "published",
            Mode::Previous => "previous",
        }
    }

    /// Modes that take part in sibling ordering.
    ///
    /// `previous` snapshots are never nudged or cascaded.
    pub fn live() -> [Mode; 2] {
        [Mode::Draft, Mode::Published]
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Mode::Draft),
            "published" => Ok(Mode::Published),
            "previous" => Ok(Mode::Previous),
            other => Err(format!("unknown mode '{}'", other)),
        }
    }
}

/// Parsed form of a variant id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageId {
    pub doc_id: String,
    pub locale: String,
    pub mode: Mode,
}

impl PageId {
    /// Compose a variant id from its parts
    pub fn compose(doc_id: &str, locale: &str, mode: Mode) -> String {
        format!("{}:{}:{}", doc_id, locale, mode)
    }

    /// Parse `"{aposDocId}:{locale}:{mode}"`
    ///
    /// Returns `None` when the id does not carry a locale/mode suffix.
    pub fn parse(id: &str) -> Option<PageId> {
        let mut parts = id.rsplitn(3, ':');
        let mode = parts.next()?.parse::<Mode>().ok()?;
        let locale = parts.next()?;
        let doc_id = parts.next()?;
        if doc_id.is_empty() || locale.is_empty() || doc_id.contains('/') {
            return None;
        }
        Some(PageId {
            doc_id: doc_id.to_string(),
            locale: locale.to_string(),
            mode,
        })
    }

    /// Strip the locale/mode suffix, leaving the `aposDocId`
    pub fn doc_id_of(id: &str) -> &str {
        if PageId::parse(id).is_none() {
            return id;
        }
        id.rsplitn(3, ':').nth(2).unwrap_or(id)
    }
}

/// Universal page document
///
/// Structural fields (`path`, `level`, `rank`, `archived`) are owned by the
/// tree orchestrator; everything type-specific lives in `fields` and is
/// written through the page type manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    #[serde(rename = "_id")]
    pub id: String,

    pub apos_doc_id: String,

    pub apos_locale: String,

    pub apos_mode: Mode,

    #[serde(rename = "type")]
    pub page_type: String,

    #[serde(default)]
    pub title: String,

    pub slug: String,

    pub path: String,

    pub level: u32,

    pub rank: i64,

    #[serde(default)]
    pub archived: bool,

    /// Hidden from navigation (the archive root is always an orphan)
    #[serde(default)]
    pub orphan: bool,

    /// Field names that ordinary edits cannot change
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parked: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parked_id: Option<String>,

    #[serde(default)]
    pub last_published_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    /// Relationship field name → referenced `aposDocId`s
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub relationships: BTreeMap<String, Vec<String>>,

    /// Type-specific content fields
    #[serde(default)]
    pub fields: Map<String, Value>,
}

/// Names of the fields the tree engine owns; ordinary edits never write them.
pub const STRUCTURAL_FIELDS: &[&str] = &[
    "_id",
    "aposDocId",
    "aposLocale",
    "aposMode",
    "path",
    "level",
    "rank",
    "archived",
    "parked",
    "parkedId",
    "lastPublishedAt",
    "createdAt",
    "updatedAt",
];

impl Page {
    /// Create a bare page variant; structural fields are filled in by the tree.
    pub fn new(doc_id: &str, locale: &str, mode: Mode, page_type: &str, title: &str) -> Self {
        let now = Utc::now();
        Self {
            id: PageId::compose(doc_id, locale, mode),
            apos_doc_id: doc_id.to_string(),
            apos_locale: locale.to_string(),
            apos_mode: mode,
            page_type: page_type.to_string(),
            title: title.to_string(),
            slug: String::new(),
            path: doc_id.to_string(),
            level: 0,
            rank: 0,
            archived: false,
            orphan: false,
            parked: Vec::new(),
            parked_id: None,
            last_published_at: None,
            created_at: now,
            updated_at: now,
            relationships: BTreeMap::new(),
            fields: Map::new(),
        }
    }

    /// Copy this page into another locale/mode variant
    pub fn as_variant(&self, locale: &str, mode: Mode) -> Page {
        let mut variant = self.clone();
        variant.id = PageId::compose(&self.apos_doc_id, locale, mode);
        variant.apos_locale = locale.to_string();
        variant.apos_mode = mode;
        variant
    }

    pub fn is_root(&self) -> bool {
        self.level == 0
    }

    /// Parked pages are pinned by configuration and cannot be moved or deleted
    pub fn is_parked(&self) -> bool {
        self.parked_id.is_some() || !self.parked.is_empty()
    }

    /// Path of the parent page, `None` for the root
    pub fn parent_path(&self) -> Option<&str> {
        self.path.rsplit_once('/').map(|(parent, _)| parent)
    }

    /// `aposDocId`s of every ancestor, root first
    pub fn ancestor_doc_ids(&self) -> Vec<&str> {
        let mut segments: Vec<&str> = self.path.split('/').collect();
        segments.pop();
        segments
    }

    /// Read a field by its wire name
    pub fn field_value(&self, name: &str) -> Option<Value> {
        match name {
            "title" => Some(Value::String(self.title.clone())),
            "slug" => Some(Value::String(self.slug.clone())),
            "type" => Some(Value::String(self.page_type.clone())),
            "archived" => Some(Value::Bool(self.archived)),
            "orphan" => Some(Value::Bool(self.orphan)),
            "parkedId" => self.parked_id.clone().map(Value::String),
            "aposDocId" => Some(Value::String(self.apos_doc_id.clone())),
            "path" => Some(Value::String(self.path.clone())),
            "level" => Some(Value::from(self.level)),
            "rank" => Some(Value::from(self.rank)),
            other => self.fields.get(other).cloned(),
        }
    }

    /// Write a field by its wire name
    ///
    /// Typed fields reject values of the wrong JSON type; unknown names land
    /// in `fields`. Structural names other than `archived` and `parkedId`
    /// are refused.
    pub fn set_field(&mut self, name: &str, value: Value) -> Result<(), String> {
        match name {
            "title" => self.title = expect_string(name, value)?,
            "slug" => self.slug = expect_string(name, value)?,
            "type" => self.page_type = expect_string(name, value)?,
            "archived" => self.archived = expect_bool(name, value)?,
            "orphan" => self.orphan = expect_bool(name, value)?,
            "parkedId" => {
                self.parked_id = match value {
                    Value::Null => None,
                    other => Some(expect_string(name, other)?),
                }
            }
            other if STRUCTURAL_FIELDS.contains(&other) => {
                return Err(format!("field '{}' is managed by the page tree", other));
            }
            other => {
                if value.is_null() {
                    self.fields.remove(other);
                } else {
                    self.fields.insert(other.to_string(), value);
                }
            }
        }
        Ok(())
    }

    /// Structural projection used in change sets
    pub fn change(&self) -> crate::models::PageChange {
        crate::models::PageChange::from(self)
    }
}

fn expect_string(name: &str, value: Value) -> Result<String, String> {
    match value {
        Value::String(s) => Ok(s),
        other => Err(format!("field '{}' must be a string, got {}", name, other)),
    }
}

fn expect_bool(name: &str, value: Value) -> Result<bool, String> {
    match value {
        Value::Bool(b) => Ok(b),
        other => Err(format!("field '{}' must be a boolean, got {}", name, other)),
    }
}

/// Level implied by a materialized path
pub fn path_level(path: &str) -> u32 {
    path.matches('/').count() as u32
}

/// Join a parent path and a child `aposDocId`
pub fn child_path(parent_path: &str, doc_id: &str) -> String {
    format!("{}/{}", parent_path, doc_id)
}

/// Join a parent slug and a slug component, collapsing the home slug
pub fn join_slug(parent_slug: &str, component: &str) -> String {
    let component = component.trim_matches('/');
    if parent_slug.ends_with('/') {
        format!("{}{}", parent_slug, component)
    } else {
        format!("{}/{}", parent_slug, component)
    }
}

/// Last component of a slug (`/a/b` → `b`)
pub fn last_slug_component(slug: &str) -> &str {
    slug.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
}

/// Lowercase, hyphen-separated slug component derived from a title
pub fn slugify(title: &str) -> String {
    static NON_WORD: OnceLock<Regex> = OnceLock::new();
    let non_word = NON_WORD.get_or_init(|| Regex::new(r"[^\p{L}\p{N}]+").unwrap());

    let slug = non_word
        .replace_all(&title.to_lowercase(), "-")
        .trim_matches('-')
        .to_string();
    if slug.is_empty() {
        "page".to_string()
    } else {
        slug
    }
}

/// Slugs are root-relative URLs
pub fn is_valid_slug(slug: &str) -> bool {
    slug.starts_with('/') && !slug.contains("//") && !slug.chars().any(char::is_whitespace)
}
