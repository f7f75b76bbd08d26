use std::any::Any;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Arc, PoisonError, RwLock};

type Dynamic = Arc<dyn Any + Send + Sync>;

/// Named values stored on a handle itself.
///
/// Attribute access on a handle never reaches the forced value: setting `x`
/// here does not give the value an `x`, and reading `x` never forces. This
/// keeps the handle's own bookkeeping apart from fields of the eventual value.
/// To change the value, force the handle and work on what it returns.
#[derive(Default)]
pub struct Attributes {
    map: RwLock<HashMap<String, Dynamic>>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` under `name`, returning whether a previous value was
    /// replaced.
    pub fn set<V>(&self, name: impl Into<String>, value: V) -> bool
    where
        V: Any + Send + Sync,
    {
        self.map
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), Arc::new(value))
            .is_some()
    }

    /// Reads `name` if it is set and holds a `V`.
    pub fn get<V>(&self, name: &str) -> Option<Arc<V>>
    where
        V: Any + Send + Sync,
    {
        let item = self
            .map
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()?;

        item.downcast::<V>().ok()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.map
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    pub fn remove(&self, name: &str) -> bool {
        self.map
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .is_some()
    }

    /// Attribute names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self
            .map
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();

        names.sort();
        names
    }
}

impl Debug for Attributes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_remove() {
        let attrs = Attributes::new();

        assert!(!attrs.set("label", "total"));
        assert!(attrs.set("label", "sum"));
        assert_eq!(attrs.get::<&str>("label").as_deref(), Some(&"sum"));

        assert!(attrs.remove("label"));
        assert!(!attrs.contains("label"));
        assert!(!attrs.remove("label"));
    }

    #[test]
    fn test_get_with_wrong_type() {
        let attrs = Attributes::new();
        attrs.set("retries", 3u32);

        assert!(attrs.get::<String>("retries").is_none());
        assert_eq!(*attrs.get::<u32>("retries").unwrap(), 3);
    }

    #[test]
    fn test_names_sorted() {
        let attrs = Attributes::new();
        attrs.set("b", 1);
        attrs.set("a", 2);

        assert_eq!(attrs.names(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(format!("{attrs:?}"), r#"{"a", "b"}"#);
    }
}
