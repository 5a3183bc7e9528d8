use crate::application::error::PipelineError;
use crate::cache::DEFAULT_STORE_ROLE;
use crate::config::PipelineSettings;
use crate::domain::parameters::Parameters;

/// Parameter naming the cache store a pipeline uses.
pub const CACHE_ROLE_PARAM: &str = "cache-role";
/// Parameter toggling automatic cache points at branch points (`on`/`off`).
pub const AUTO_CACHING_POINT_PARAM: &str = "autoCachingPoint";

/// Settings read when a pipeline is set up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub cache_role: String,
    pub auto_caching_point: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cache_role: DEFAULT_STORE_ROLE.to_string(),
            auto_caching_point: true,
        }
    }
}

impl PipelineConfig {
    pub fn from_parameters(params: &Parameters) -> Result<Self, PipelineError> {
        Self::default().with_parameters(params)
    }

    /// Apply `cache-role` and `autoCachingPoint` on top of the current values.
    pub fn with_parameters(mut self, params: &Parameters) -> Result<Self, PipelineError> {
        if let Some(role) = params.get(CACHE_ROLE_PARAM) {
            let role = role.trim();
            if role.is_empty() {
                return Err(PipelineError::invalid_parameter(
                    CACHE_ROLE_PARAM,
                    "must not be empty",
                ));
            }
            self.cache_role = role.to_string();
        }
        if let Some(value) = params.get(AUTO_CACHING_POINT_PARAM) {
            self.auto_caching_point = parse_switch(value).ok_or_else(|| {
                PipelineError::invalid_parameter(
                    AUTO_CACHING_POINT_PARAM,
                    format!("expected `on` or `off`, got `{value}`"),
                )
            })?;
        }
        Ok(self)
    }
}

impl From<&PipelineSettings> for PipelineConfig {
    fn from(settings: &PipelineSettings) -> Self {
        Self {
            cache_role: settings.cache_role.clone(),
            auto_caching_point: settings.auto_caching_point,
        }
    }
}

/// Parse an `on`/`off` switch, case-insensitively.
pub fn parse_switch(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "on" => Some(true),
        "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_parameters() {
        let config = PipelineConfig::from_parameters(&Parameters::new()).expect("valid");
        assert_eq!(config, PipelineConfig::default());
        assert!(config.auto_caching_point);
        assert_eq!(config.cache_role, DEFAULT_STORE_ROLE);
    }

    #[test]
    fn parameters_override_defaults() {
        let params = Parameters::new()
            .with("cache-role", "shared")
            .with("autoCachingPoint", "OFF");
        let config = PipelineConfig::from_parameters(&params).expect("valid");
        assert_eq!(config.cache_role, "shared");
        assert!(!config.auto_caching_point);
    }

    #[test]
    fn parameters_layer_over_settings() {
        let base = PipelineConfig {
            cache_role: "from-settings".to_string(),
            auto_caching_point: false,
        };
        let config = base
            .with_parameters(&Parameters::new().with("autoCachingPoint", "on"))
            .expect("valid");
        assert_eq!(config.cache_role, "from-settings");
        assert!(config.auto_caching_point);
    }

    #[test]
    fn bad_switch_is_rejected() {
        let params = Parameters::new().with("autoCachingPoint", "maybe");
        let err = PipelineConfig::from_parameters(&params).expect_err("invalid switch");
        assert!(matches!(err, PipelineError::InvalidParameter { .. }));
    }
}
