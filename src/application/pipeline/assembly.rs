//! Per-request assembly bookkeeping.

use std::fmt;

use crate::domain::parameters::Parameters;

/// Lifecycle of a pipeline instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineState {
    Assembling,
    Resolved,
    Executing,
    Completed,
    Recycled,
}

impl PipelineState {
    pub fn as_str(self) -> &'static str {
        match self {
            PipelineState::Assembling => "assembling",
            PipelineState::Resolved => "resolved",
            PipelineState::Executing => "executing",
            PipelineState::Completed => "completed",
            PipelineState::Recycled => "recycled",
        }
    }

    /// Whether stages may still be registered.
    pub fn accepts_components(self) -> bool {
        matches!(self, PipelineState::Assembling | PipelineState::Recycled)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cache-point flags gathered while stages are registered.
///
/// A flag raised by one stage applies to the fragment of the stage added
/// after it. Positions are fixed once execution starts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineAssemblyState {
    generator_registered: bool,
    next_is_cache_point: bool,
    transformer_cache_points: Vec<bool>,
    serializer_cache_point: bool,
}

impl PipelineAssemblyState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_generator(&mut self, hints: &Parameters) {
        self.generator_registered = true;
        self.next_is_cache_point = hints.caching_point_hint();
    }

    /// Record the flag for the transformer being added and return it.
    pub fn on_transformer(&mut self, hints: &Parameters) -> bool {
        let flagged = self.next_is_cache_point;
        self.transformer_cache_points.push(flagged);
        self.next_is_cache_point = hints.caching_point_hint();
        flagged
    }

    pub fn on_serializer(&mut self) -> bool {
        self.serializer_cache_point = self.next_is_cache_point;
        self.next_is_cache_point = false;
        self.serializer_cache_point
    }

    /// Raise the pending flag for a branch point. Returns whether it took effect.
    pub fn inform_branch_point(&mut self, auto_caching_point: bool) -> bool {
        if !self.generator_registered || !auto_caching_point {
            return false;
        }
        self.next_is_cache_point = true;
        true
    }

    pub fn is_cache_point(&self, transformer: usize) -> bool {
        self.transformer_cache_points
            .get(transformer)
            .copied()
            .unwrap_or(false)
    }

    pub fn serializer_cache_point(&self) -> bool {
        self.serializer_cache_point
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
