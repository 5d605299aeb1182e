//! Request context
//!
//! A `RequestContext` scopes every tree operation to a locale and mode and
//! carries the reentrant lock depth counters for the logical request. Nested
//! operations on the same request (an archive that moves, a patch that moves,
//! a reconcile that inserts) share the counters, so only the outermost
//! acquisition reaches the lock service.

use crate::models::{Mode, PageId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Request-scoped; derive per-mode/per-locale views with `with_mode`/`with_locale`.
#[derive(Debug)]
pub struct RequestContext {
    locale: String,
    mode: Mode,
    lock_depths: Arc<Mutex<HashMap<String, u32>>>,
}

impl RequestContext {
    pub fn new(locale: impl Into<String>, mode: Mode) -> Self {
        Self {
            locale: locale.into(),
            mode,
            lock_depths: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Draft-mode context for a locale
    pub fn draft(locale: impl Into<String>) -> Self {
        Self::new(locale, Mode::Draft)
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Same request, different mode; lock depths are shared
    pub fn with_mode(&self, mode: Mode) -> Self {
        Self {
            locale: self.locale.clone(),
            mode,
            lock_depths: Arc::clone(&self.lock_depths),
        }
    }

    /// Same request, different locale; lock depths are shared
    pub fn with_locale(&self, locale: impl Into<String>) -> Self {
        Self {
            locale: locale.into(),
            mode: self.mode,
            lock_depths: Arc::clone(&self.lock_depths),
        }
    }

    /// Variant id of a doc in this context's locale and mode
    pub fn page_id(&self, doc_id: &str) -> String {
        PageId::compose(doc_id, &self.locale, self.mode)
    }

    /// Increment the depth for `name`; true when this is the outermost entry
    pub(crate) fn enter_lock(&self, name: &str) -> bool {
        let mut depths = self.lock_depths.lock().unwrap_or_else(|e| e.into_inner());
        let depth = depths.entry(name.to_string()).or_insert(0);
        *depth += 1;
        *depth == 1
    }

    /// Decrement the depth for `name`; true when this was the outermost entry
    pub(crate) fn leave_lock(&self, name: &str) -> bool {
        let mut depths = self.lock_depths.lock().unwrap_or_else(|e| e.into_inner());
        match depths.get_mut(name) {
            Some(depth) if *depth > 1 => {
                *depth -= 1;
                false
            }
            Some(_) => {
                depths.remove(name);
                true
            }
            None => false,
        }
    }

    pub fn lock_depth(&self, name: &str) -> u32 {
        let depths = self.lock_depths.lock().unwrap_or_else(|e| e.into_inner());
        depths.get(name).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_counting() {
        let ctx = RequestContext::draft("en");
        assert!(ctx.enter_lock("tree"));
        assert!(!ctx.enter_lock("tree"));
        assert_eq!(ctx.lock_depth("tree"), 2);
        assert!(!ctx.leave_lock("tree"));
        assert!(ctx.leave_lock("tree"));
        assert_eq!(ctx.lock_depth("tree"), 0);
        assert!(!ctx.leave_lock("tree"));
    }

    #[test]
    fn test_mode_switch_shares_depths() {
        let ctx = RequestContext::draft("en");
        ctx.enter_lock("tree");
        let published = ctx.with_mode(Mode::Published);
        assert_eq!(published.lock_depth("tree"), 1);
        assert_eq!(published.page_id("a"), "a:en:published");
    }
}
