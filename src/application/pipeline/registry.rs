//! Role-keyed component factories.

use std::collections::HashMap;
use std::sync::Arc;

use crate::application::error::PipelineError;
use crate::domain::key::StageKind;
use crate::domain::parameters::Parameters;

use super::component::{Generator, Serializer, Transformer};

pub type GeneratorFactory = Arc<dyn Fn() -> Box<dyn Generator> + Send + Sync>;
pub type TransformerFactory = Arc<dyn Fn() -> Box<dyn Transformer> + Send + Sync>;
pub type SerializerFactory = Arc<dyn Fn() -> Box<dyn Serializer> + Send + Sync>;

/// Creates and configures pipeline components by role name.
///
/// Populated once at startup and shared read-only between pipelines.
#[derive(Default, Clone)]
pub struct ComponentRegistry {
    generators: HashMap<String, GeneratorFactory>,
    transformers: HashMap<String, TransformerFactory>,
    serializers: HashMap<String, SerializerFactory>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in components.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        crate::components::register_builtin(&mut registry);
        registry
    }

    pub fn register_generator<F>(&mut self, role: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn Generator> + Send + Sync + 'static,
    {
        self.generators.insert(role.into(), Arc::new(factory));
    }

    pub fn register_transformer<F>(&mut self, role: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn Transformer> + Send + Sync + 'static,
    {
        self.transformers.insert(role.into(), Arc::new(factory));
    }

    pub fn register_serializer<F>(&mut self, role: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn Serializer> + Send + Sync + 'static,
    {
        self.serializers.insert(role.into(), Arc::new(factory));
    }

    pub fn generator(
        &self,
        role: &str,
        source: Option<&str>,
        params: &Parameters,
    ) -> Result<Box<dyn Generator>, PipelineError> {
        let factory = self
            .generators
            .get(role)
            .ok_or_else(|| PipelineError::unknown_component(StageKind::Generator, role))?;
        let mut component = factory();
        component
            .setup(source, params)
            .map_err(|source| setup_error(StageKind::Generator, role, source))?;
        Ok(component)
    }

    pub fn transformer(
        &self,
        role: &str,
        source: Option<&str>,
        params: &Parameters,
    ) -> Result<Box<dyn Transformer>, PipelineError> {
        let factory = self
            .transformers
            .get(role)
            .ok_or_else(|| PipelineError::unknown_component(StageKind::Transformer, role))?;
        let mut component = factory();
        component
            .setup(source, params)
            .map_err(|source| setup_error(StageKind::Transformer, role, source))?;
        Ok(component)
    }

    pub fn serializer(
        &self,
        role: &str,
        source: Option<&str>,
        params: &Parameters,
    ) -> Result<Box<dyn Serializer>, PipelineError> {
        let factory = self
            .serializers
            .get(role)
            .ok_or_else(|| PipelineError::unknown_component(StageKind::Serializer, role))?;
        let mut component = factory();
        component
            .setup(source, params)
            .map_err(|source| setup_error(StageKind::Serializer, role, source))?;
        Ok(component)
    }

    /// Registered roles per stage kind, sorted.
    pub fn roles(&self, kind: StageKind) -> Vec<&str> {
        let mut roles: Vec<&str> = match kind {
            StageKind::Generator => self.generators.keys().map(String::as_str).collect(),
            StageKind::Transformer => self.transformers.keys().map(String::as_str).collect(),
            StageKind::Serializer => self.serializers.keys().map(String::as_str).collect(),
        };
        roles.sort_unstable();
        roles
    }
}

fn setup_error(
    kind: StageKind,
    role: &str,
    source: crate::domain::error::DomainError,
) -> PipelineError {
    PipelineError::Setup {
        kind,
        role: role.to_string(),
        source,
    }
}
