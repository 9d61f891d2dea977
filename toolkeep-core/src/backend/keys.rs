use std::borrow::Cow;

/// Builds the namespaced keys every component writes to the backend.
///
/// ```text
/// {prefix}:session:{id}
/// {prefix}:lock:{id}
/// {prefix}:cache:{namespace}:{hash}
/// ```
///
/// `:` and `%` inside a cache namespace are percent-encoded so one
/// namespace is never a key prefix of another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    prefix: String,
}

impl KeySpace {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn session(&self, id: &str) -> String {
        format!("{}{id}", self.session_prefix())
    }

    pub fn session_prefix(&self) -> String {
        format!("{}:session:", self.prefix)
    }

    pub fn lock(&self, session_id: &str) -> String {
        format!("{}:lock:{session_id}", self.prefix)
    }

    pub fn cache(&self, namespace: &str, hash: &str) -> String {
        format!("{}{hash}", self.cache_namespace_prefix(namespace))
    }

    pub fn cache_namespace_prefix(&self, namespace: &str) -> String {
        format!("{}{}:", self.cache_prefix(), escape_segment(namespace))
    }

    pub fn cache_prefix(&self) -> String {
        format!("{}:cache:", self.prefix)
    }
}

fn escape_segment(segment: &str) -> Cow<'_, str> {
    if !segment.contains([':', '%']) {
        return Cow::Borrowed(segment);
    }
    let mut escaped = String::with_capacity(segment.len() + 4);
    for ch in segment.chars() {
        match ch {
            ':' => escaped.push_str("%3A"),
            '%' => escaped.push_str("%25"),
            other => escaped.push(other),
        }
    }
    Cow::Owned(escaped)
}

impl Default for KeySpace {
    fn default() -> Self {
        Self::new(toolkeep_config::constants::keys::DEFAULT_PREFIX)
    }
}
