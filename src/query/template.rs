use std::collections::HashMap;
use std::fmt::Write;
use std::sync::LazyLock;

use regex::Regex;

use super::QueryManager;
use crate::error::{QueryManagerError, RdbmsError};
use crate::types::{ParamMap, RowValues};

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_.]*)\}").expect("placeholder pattern is valid")
});

/// Query manager rendering `${name}` placeholders as SQL literals.
///
/// ```rust
/// use rdbms_client::prelude::*;
///
/// let qm = TemplateQueryManager::new()
///     .with_query("FIND_USER", "SELECT id FROM users WHERE name = ${name}");
///
/// let mut params = ParamMap::new();
/// params.insert("name".into(), RowValues::Text("O'Hara".into()));
///
/// let sql = qm.build_query_from_id("FIND_USER", &params).unwrap();
/// assert_eq!(sql, "SELECT id FROM users WHERE name = 'O''Hara'");
/// ```
#[derive(Debug, Clone, Default)]
pub struct TemplateQueryManager {
    templates: HashMap<String, String>,
}

impl TemplateQueryManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_query(mut self, id: impl Into<String>, template: impl Into<String>) -> Self {
        self.insert(id, template);
        self
    }

    pub fn insert(&mut self, id: impl Into<String>, template: impl Into<String>) {
        self.templates.insert(id.into(), template.into());
    }

    /// Load templates from a JSON object mapping ids to SQL text.
    ///
    /// # Errors
    /// Returns [`RdbmsError::ConfigError`] if the document is not such an object.
    pub fn from_json_str(json: &str) -> Result<Self, RdbmsError> {
        let templates: HashMap<String, String> = serde_json::from_str(json)?;
        Ok(Self { templates })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    fn template(&self, id: &str) -> Result<&str, QueryManagerError> {
        self.templates
            .get(id)
            .map(String::as_str)
            .ok_or_else(|| QueryManagerError::UnknownQuery(id.to_owned()))
    }
}

impl QueryManager for TemplateQueryManager {
    fn build_query_from_id(&self, id: &str, params: &ParamMap) -> Result<String, QueryManagerError> {
        let template = self.template(id)?;
        let mut rendered = String::with_capacity(template.len());
        let mut last = 0;

        for caps in PLACEHOLDER.captures_iter(template) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let value = params.get(name.as_str()).ok_or_else(|| {
                QueryManagerError::MissingParameter {
                    query_id: id.to_owned(),
                    param: name.as_str().to_owned(),
                }
            })?;
            rendered.push_str(&template[last..whole.start()]);
            render_literal(&mut rendered, value);
            last = whole.end();
        }
        rendered.push_str(&template[last..]);

        Ok(rendered)
    }

    fn fragment_from_id(&self, id: &str) -> Result<String, QueryManagerError> {
        self.template(id).map(str::to_owned)
    }
}

fn render_literal(out: &mut String, value: &RowValues) {
    match value {
        RowValues::Int(i) => {
            let _ = write!(out, "{i}");
        }
        RowValues::Float(f) => {
            let _ = write!(out, "{f}");
        }
        RowValues::Bool(true) => out.push_str("TRUE"),
        RowValues::Bool(false) => out.push_str("FALSE"),
        RowValues::Null => out.push_str("NULL"),
        RowValues::Text(s) => push_quoted(out, s),
        RowValues::Timestamp(dt) => push_quoted(out, &dt.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
        RowValues::JSON(json) => push_quoted(out, &json.to_string()),
        RowValues::Blob(bytes) => {
            out.push_str("X'");
            for b in bytes {
                let _ = write!(out, "{b:02X}");
            }
            out.push('\'');
        }
    }
}

fn push_quoted(out: &mut String, s: &str) {
    out.push('\'');
    for c in s.chars() {
        if c == '\'' {
            out.push('\'');
        }
        out.push(c);
    }
    out.push('\'');
}
