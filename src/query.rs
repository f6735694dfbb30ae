//! Resolving query ids to SQL text.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::QueryManagerError;
use crate::types::ParamMap;

mod template;

pub use template::TemplateQueryManager;

/// Source of rendered queries and raw fragments, keyed by id.
pub trait QueryManager: Send + Sync {
    /// Render the query `id` with `params` substituted.
    ///
    /// # Errors
    /// Unknown ids and rendering failures.
    fn build_query_from_id(&self, id: &str, params: &ParamMap) -> Result<String, QueryManagerError>;

    /// Return the text registered under `id` without substitution.
    ///
    /// # Errors
    /// Unknown ids.
    fn fragment_from_id(&self, id: &str) -> Result<String, QueryManagerError>;
}

/// Per-client resolver: temporary queries first, then the shared manager.
#[derive(Clone)]
pub struct QueryResolver {
    manager: Arc<dyn QueryManager>,
    temp: HashMap<String, String>,
}

impl QueryResolver {
    #[must_use]
    pub fn new(manager: Arc<dyn QueryManager>) -> Self {
        Self {
            manager,
            temp: HashMap::new(),
        }
    }

    /// Resolve `id` to a rendered query. Temporary queries ignore `params`.
    ///
    /// # Errors
    /// Propagates the manager's error unchanged.
    pub fn resolve(&self, id: &str, params: &ParamMap) -> Result<String, QueryManagerError> {
        if let Some(text) = self.temp.get(id) {
            return Ok(text.clone());
        }
        self.manager.build_query_from_id(id, params)
    }

    /// Resolve `id` to a raw fragment.
    ///
    /// # Errors
    /// Propagates the manager's error unchanged.
    pub fn resolve_fragment(&self, id: &str) -> Result<String, QueryManagerError> {
        if let Some(text) = self.temp.get(id) {
            return Ok(text.clone());
        }
        self.manager.fragment_from_id(id)
    }

    /// Register literal SQL under `id`, shadowing the manager for this client.
    pub fn register_temp(&mut self, id: impl Into<String>, text: impl Into<String>) {
        self.temp.insert(id.into(), text.into());
    }

    /// Remove a temporary query; returns its text if one was registered.
    pub fn delete_temp(&mut self, id: &str) -> Option<String> {
        self.temp.remove(id)
    }

    #[must_use]
    pub fn has_temp(&self, id: &str) -> bool {
        self.temp.contains_key(id)
    }
}

impl std::fmt::Debug for QueryResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryResolver")
            .field("temp", &self.temp)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RowValues;

    struct EchoManager;

    impl QueryManager for EchoManager {
        fn build_query_from_id(
            &self,
            id: &str,
            _params: &ParamMap,
        ) -> Result<String, QueryManagerError> {
            if id == "ERROR" {
                return Err(QueryManagerError::UnknownQuery(id.to_owned()));
            }
            Ok(id.to_owned())
        }

        fn fragment_from_id(&self, id: &str) -> Result<String, QueryManagerError> {
            Ok(format!("fragment:{id}"))
        }
    }

    #[test]
    fn temp_query_shadows_manager_until_deleted() {
        let mut resolver = QueryResolver::new(Arc::new(EchoManager));
        resolver.register_temp("QT", "SELECT 123");

        let mut params = ParamMap::new();
        params.insert("ignored".into(), RowValues::Int(1));
        assert_eq!(resolver.resolve("QT", &params).unwrap(), "SELECT 123");
        assert_eq!(resolver.resolve_fragment("QT").unwrap(), "SELECT 123");

        assert_eq!(resolver.delete_temp("QT").as_deref(), Some("SELECT 123"));
        assert_eq!(resolver.resolve("QT", &params).unwrap(), "QT");
        assert!(resolver.delete_temp("QT").is_none());
    }

    #[test]
    fn manager_errors_pass_through() {
        let resolver = QueryResolver::new(Arc::new(EchoManager));
        let err = resolver.resolve("ERROR", &ParamMap::new()).unwrap_err();
        assert_eq!(err, QueryManagerError::UnknownQuery("ERROR".into()));
        assert_eq!(resolver.resolve_fragment("AAA").unwrap(), "fragment:AAA");
    }
}
