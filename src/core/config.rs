use crate::errors::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub agent: AgentConfig,
    pub navigation: NavigationConfig,
    pub dom: DomConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Base for relative URLs requested straight from the agent.
    pub base_url: String,
    /// Sent with every request.
    pub default_headers: Vec<(String, String)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationConfig {
    pub max_redirects: usize,
    /// Statuses surfaced as `AgentError::HttpStatus` unless the request
    /// expected them.
    pub error_statuses: Vec<u16>,
    pub record_history: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DomConfig {
    /// Value submitted for a checked checkbox without a `value` attribute.
    pub checkbox_default_value: String,
    /// Coordinates reported for a clicked image button.
    pub image_click: (u32, u32),
}

impl Config {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.agent.base_url = base_url.into();
        self
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost/".to_string(),
            default_headers: vec![],
        }
    }
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            max_redirects: 20,
            error_statuses: vec![404, 405, 500],
            record_history: true,
        }
    }
}

impl Default for DomConfig {
    fn default() -> Self {
        Self {
            checkbox_default_value: "On".to_string(),
            image_click: (1, 1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.agent.base_url, "http://localhost/");
        assert_eq!(config.navigation.max_redirects, 20);
        assert!(config.navigation.error_statuses.contains(&404));
        assert_eq!(config.dom.checkbox_default_value, "On");
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = Config::from_json(
            r#"{"agent": {"base_url": "http://example.com/app/"}, "navigation": {"max_redirects": 3}}"#,
        )
        .unwrap();
        assert_eq!(config.agent.base_url, "http://example.com/app/");
        assert_eq!(config.navigation.max_redirects, 3);
        assert!(config.navigation.record_history);
        assert_eq!(config.dom.image_click, (1, 1));
    }

    #[test]
    fn test_bad_json_is_a_serialization_error() {
        let err = Config::from_json("{not json").unwrap_err();
        assert!(matches!(err, crate::errors::AgentError::SerializationError(_)));
    }
}
