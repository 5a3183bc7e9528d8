//! String-keyed configuration handed to components and pipelines.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::error::DomainError;

/// Hint read from a component's pipeline hints to mark its output as a cache point.
pub const CACHING_POINT_HINT: &str = "caching-point";

/// Ordered name/value parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Parameters {
    values: BTreeMap<String, String>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn get_or<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        self.get(name).unwrap_or(default)
    }

    pub fn require(&self, name: &'static str) -> Result<&str, DomainError> {
        self.get(name)
            .ok_or_else(|| DomainError::validation(format!("missing parameter `{name}`")))
    }

    /// Parse a boolean parameter; accepts `true`/`false`, `yes`/`no`, `on`/`off`.
    pub fn get_bool(&self, name: &str) -> Result<Option<bool>, DomainError> {
        let Some(raw) = self.get(name) else {
            return Ok(None);
        };
        match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" => Ok(Some(true)),
            "false" | "no" | "off" => Ok(Some(false)),
            other => Err(DomainError::validation(format!(
                "parameter `{name}` expects a boolean, got `{other}`"
            ))),
        }
    }

    /// True only when the `caching-point` hint is exactly `"true"`.
    pub fn caching_point_hint(&self) -> bool {
        self.get(CACHING_POINT_HINT) == Some("true")
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Deterministic rendering for cache keys.
    ///
    /// Each pair is written as `<len>:<name>=<len>:<value>;`, so no choice of
    /// names or values can make two different maps render alike. The output
    /// never starts with `|`, which lets callers append `|subject`.
    pub fn fingerprint(&self) -> String {
        self.values
            .iter()
            .map(|(name, value)| format!("{}:{name}={}:{value};", name.len(), value.len()))
            .collect()
    }

    /// Fingerprint followed by a free-form subject such as inline text or a path.
    pub fn fingerprint_with(&self, subject: &str) -> String {
        format!("{}|{subject}", self.fingerprint())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Parameters {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caching_point_hint_requires_literal_true() {
        assert!(Parameters::new().with("caching-point", "true").caching_point_hint());
        assert!(!Parameters::new().with("caching-point", "yes").caching_point_hint());
        assert!(!Parameters::new().caching_point_hint());
    }

    #[test]
    fn get_bool_accepts_switch_spellings() {
        let params = Parameters::new().with("a", "on").with("b", "OFF").with("c", "maybe");
        assert_eq!(params.get_bool("a").expect("valid"), Some(true));
        assert_eq!(params.get_bool("b").expect("valid"), Some(false));
        assert_eq!(params.get_bool("missing").expect("valid"), None);
        assert!(params.get_bool("c").is_err());
    }

    #[test]
    fn fingerprint_is_order_independent() {
        let a: Parameters = [("x", "1"), ("y", "2")].into_iter().collect();
        let b: Parameters = [("y", "2"), ("x", "1")].into_iter().collect();
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint(), "1:x=1:1;1:y=1:2;");
    }

    #[test]
    fn fingerprint_separates_values_that_look_like_pairs() {
        let embedded = Parameters::new().with("root", "x;zz=y");
        let split = Parameters::new().with("root", "x").with("zz", "y");
        assert_ne!(embedded.fingerprint(), split.fingerprint());

        let with_equals = Parameters::new().with("a=b", "c");
        let plain = Parameters::new().with("a", "b=c");
        assert_ne!(with_equals.fingerprint(), plain.fingerprint());
    }

    #[test]
    fn subject_cannot_masquerade_as_parameters() {
        let params = Parameters::new().with("root", "x");
        let crafted = format!("|{}", params.fingerprint());
        assert_ne!(
            Parameters::new().fingerprint_with(&crafted),
            params.fingerprint_with("")
        );
        assert_ne!(
            Parameters::new().fingerprint_with("a|b"),
            Parameters::new().with("a", "").fingerprint_with("b")
        );
    }

    #[test]
    fn require_reports_missing_name() {
        let err = Parameters::new().require("src").expect_err("missing");
        assert!(err.to_string().contains("`src`"));
    }
}
