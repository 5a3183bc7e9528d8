//! TOML pipeline descriptions for the command-line front end.
//!
//! ```toml
//! [params]
//! cache-role = "default"
//! autoCachingPoint = "on"
//!
//! [generator]
//! role = "file"
//! src = "content/page.txt"
//! hints = { caching-point = "true" }
//!
//! [[transformers]]
//! role = "uppercase"
//!
//! [[transformers]]
//! role = "wrap"
//! params = { element = "page" }
//! branch_point = true
//!
//! [serializer]
//! role = "xml"
//! ```

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::application::error::PipelineError;
use crate::application::pipeline::{CachingPipeline, PipelineConfig};
use crate::config::PipelineSettings;
use crate::domain::parameters::Parameters;

use super::error::InfraError;

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineDescription {
    /// Pipeline-level parameters (`cache-role`, `autoCachingPoint`).
    #[serde(default)]
    pub params: Parameters,
    pub generator: StageDescription,
    #[serde(default)]
    pub transformers: Vec<StageDescription>,
    pub serializer: StageDescription,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StageDescription {
    pub role: String,
    #[serde(default)]
    pub src: Option<String>,
    #[serde(default)]
    pub params: Parameters,
    #[serde(default)]
    pub hints: Parameters,
    /// Output of this stage feeds more than one consumer.
    #[serde(default)]
    pub branch_point: bool,
}

impl PipelineDescription {
    pub fn load(path: &Path) -> Result<Self, InfraError> {
        let raw = fs::read_to_string(path)
            .map_err(|err| InfraError::description(path.display().to_string(), err.to_string()))?;
        Self::parse(&raw).map_err(|err| match err {
            InfraError::Description { message, .. } => {
                InfraError::description(path.display().to_string(), message)
            }
            other => other,
        })
    }

    pub fn parse(raw: &str) -> Result<Self, InfraError> {
        toml::from_str(raw).map_err(|err| InfraError::description("<inline>", err.to_string()))
    }

    /// Pipeline settings with the description's own parameters layered on top.
    pub fn pipeline_config(
        &self,
        settings: &PipelineSettings,
    ) -> Result<PipelineConfig, PipelineError> {
        PipelineConfig::from(settings).with_parameters(&self.params)
    }

    /// Register every stage with `pipeline`, in order.
    pub fn assemble(&self, pipeline: &mut CachingPipeline) -> Result<(), PipelineError> {
        let generator = &self.generator;
        pipeline.set_generator(
            &generator.role,
            generator.src.as_deref(),
            &generator.params,
            &generator.hints,
        )?;
        if generator.branch_point {
            pipeline.inform_branch_point();
        }

        for transformer in &self.transformers {
            pipeline.add_transformer(
                &transformer.role,
                transformer.src.as_deref(),
                &transformer.params,
                &transformer.hints,
            )?;
            if transformer.branch_point {
                pipeline.inform_branch_point();
            }
        }

        pipeline.set_serializer(
            &self.serializer.role,
            self.serializer.src.as_deref(),
            &self.serializer.params,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[params]
autoCachingPoint = "off"

[generator]
role = "inline"
src = "hello"
hints = { caching-point = "true" }

[[transformers]]
role = "uppercase"

[[transformers]]
role = "wrap"
params = { element = "page" }
branch_point = true

[serializer]
role = "xml"
"#;

    #[test]
    fn parses_sample_description() {
        let description = PipelineDescription::parse(SAMPLE).expect("valid description");
        assert_eq!(description.generator.role, "inline");
        assert_eq!(description.generator.src.as_deref(), Some("hello"));
        assert!(description.generator.hints.caching_point_hint());
        assert_eq!(description.transformers.len(), 2);
        assert!(description.transformers[1].branch_point);
        assert_eq!(description.transformers[1].params.get("element"), Some("page"));
        assert_eq!(description.params.get("autoCachingPoint"), Some("off"));
    }

    #[test]
    fn missing_serializer_is_rejected() {
        let err = PipelineDescription::parse("[generator]\nrole = \"inline\"\n")
            .expect_err("serializer is required");
        assert!(matches!(err, InfraError::Description { .. }));
    }

    #[test]
    fn description_parameters_override_settings() {
        let description = PipelineDescription::parse(SAMPLE).expect("valid description");
        let settings = PipelineSettings {
            cache_role: "shared".to_string(),
            auto_caching_point: true,
        };
        let config = description.pipeline_config(&settings).expect("valid config");
        assert_eq!(config.cache_role, "shared");
        assert!(!config.auto_caching_point);
    }

    #[test]
    fn missing_file_reports_the_path() {
        let err = PipelineDescription::load(Path::new("/nonexistent/trellis.toml"))
            .expect_err("missing file");
        assert!(err.to_string().contains("/nonexistent/trellis.toml"));
    }

    #[test]
    fn load_reports_the_path() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("broken.toml");
        fs::write(&path, "not = [valid").expect("write");
        let err = PipelineDescription::load(&path).expect_err("broken toml");
        assert!(err.to_string().contains("broken.toml"));
    }
}
