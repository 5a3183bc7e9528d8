//! Caching processing pipeline.
//!
//! A request runs through a generator, any number of transformers and a
//! serializer. Before running, the pipeline builds the key of its cacheable
//! prefix and looks for the longest prefix with a fresh cache entry:
//!
//! - a hit on the full key of a complete response is written out as is;
//! - any other hit is replayed into the first stage it does not cover;
//! - a miss runs every stage live.
//!
//! While running, tees copy the events crossing cache points into compilers.
//! After a successful run the captures are stored from the tail back to the
//! head, shortening the key to the previous cache point after each entry.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use metrics::{counter, histogram};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::application::error::PipelineError;
use crate::application::stream::{EventCompiler, EventInterpreter, TeeSink};
use crate::cache::{CacheStore, CachedResponse, StoreRegistry};
use crate::domain::events::EventSink;
use crate::domain::key::{PipelineCacheKey, StageKind};
use crate::domain::parameters::Parameters;
use crate::domain::validity::{Validity, ValidityVerdict};

use super::assembly::{PipelineAssemblyState, PipelineState};
use super::chain::{SerializerStage, TransformerStage};
use super::component::{Cacheable, Generator, Serializer, Transformer};
use super::config::PipelineConfig;
use super::environment::{CachingWriter, Environment};
use super::registry::ComponentRegistry;

const METRIC_CACHE_HIT: &str = "trellis_pipeline_cache_hit_total";
const METRIC_CACHE_MISS: &str = "trellis_pipeline_cache_miss_total";
const METRIC_CACHE_INVALID: &str = "trellis_pipeline_cache_invalid_total";
const METRIC_CACHE_STORE: &str = "trellis_pipeline_cache_store_total";
const METRIC_PROCESS_MS: &str = "trellis_pipeline_process_ms";

/// How the cache lookup went for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheLookup {
    /// The generator is not cacheable; nothing was looked up.
    Uncacheable,
    Miss,
    /// A cached prefix of `prefix_len` fragments was replayed.
    Partial { prefix_len: usize },
    /// The complete response came from the cache.
    Complete,
}

/// Result of [`CachingPipeline::process`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutcome {
    pub lookup: CacheLookup,
    /// Keys written to the store, most downstream first.
    pub stored: Vec<PipelineCacheKey>,
}

struct Stage<C: ?Sized> {
    role: String,
    component: Box<C>,
}

/// Cache key and validities of the cacheable prefix.
#[derive(Debug)]
struct CachePlan {
    key: PipelineCacheKey,
    validities: Vec<Validity>,
    first_not_cacheable: usize,
}

impl CachePlan {
    /// The serializer joined the key, so the whole response is cacheable.
    fn complete_response(&self) -> bool {
        self.key.ends_with_serializer()
    }
}

struct CacheHit {
    len: usize,
    response: CachedResponse,
}

struct Execution {
    captures: BTreeMap<usize, EventCompiler>,
    complete: Option<Vec<u8>>,
    content_type: Option<String>,
}

/// Linear pipeline with partial caching.
///
/// One instance serves one request at a time; call [`recycle`](Self::recycle)
/// before assembling the next one. The cache store is shared.
pub struct CachingPipeline {
    components: Arc<ComponentRegistry>,
    store: Arc<dyn CacheStore>,
    config: PipelineConfig,
    state: PipelineState,
    assembly: PipelineAssemblyState,
    generator: Option<Stage<dyn Generator>>,
    transformers: Vec<Stage<dyn Transformer>>,
    serializer: Option<Stage<dyn Serializer>>,
}

impl CachingPipeline {
    /// Create a pipeline using the store registered under `config.cache_role`.
    pub fn new(
        components: Arc<ComponentRegistry>,
        stores: &StoreRegistry,
        config: PipelineConfig,
    ) -> Result<Self, PipelineError> {
        let store = stores
            .get(&config.cache_role)
            .ok_or_else(|| PipelineError::unknown_cache_role(&config.cache_role))?;
        Ok(Self::with_store(components, store, config))
    }

    pub fn with_store(
        components: Arc<ComponentRegistry>,
        store: Arc<dyn CacheStore>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            components,
            store,
            config,
            state: PipelineState::Assembling,
            assembly: PipelineAssemblyState::new(),
            generator: None,
            transformers: Vec::new(),
            serializer: None,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn assembly(&self) -> &PipelineAssemblyState {
        &self.assembly
    }

    pub fn set_generator(
        &mut self,
        role: &str,
        source: Option<&str>,
        params: &Parameters,
        hints: &Parameters,
    ) -> Result<(), PipelineError> {
        self.begin_assembly("set the generator")?;
        if self.generator.is_some() {
            return Err(PipelineError::invalid_state(
                "replace the generator",
                self.state,
            ));
        }
        let component = self.components.generator(role, source, params)?;
        self.generator = Some(Stage {
            role: role.to_string(),
            component,
        });
        self.assembly.on_generator(hints);
        Ok(())
    }

    pub fn add_transformer(
        &mut self,
        role: &str,
        source: Option<&str>,
        params: &Parameters,
        hints: &Parameters,
    ) -> Result<(), PipelineError> {
        self.begin_assembly("add a transformer")?;
        if self.generator.is_none() {
            return Err(PipelineError::Incomplete(StageKind::Generator));
        }
        if self.serializer.is_some() {
            return Err(PipelineError::invalid_state(
                "add a transformer after the serializer",
                self.state,
            ));
        }
        let component = self.components.transformer(role, source, params)?;
        self.transformers.push(Stage {
            role: role.to_string(),
            component,
        });
        self.assembly.on_transformer(hints);
        Ok(())
    }

    pub fn set_serializer(
        &mut self,
        role: &str,
        source: Option<&str>,
        params: &Parameters,
    ) -> Result<(), PipelineError> {
        self.begin_assembly("set the serializer")?;
        if self.generator.is_none() {
            return Err(PipelineError::Incomplete(StageKind::Generator));
        }
        if self.serializer.is_some() {
            return Err(PipelineError::invalid_state(
                "replace the serializer",
                self.state,
            ));
        }
        let component = self.components.serializer(role, source, params)?;
        self.serializer = Some(Stage {
            role: role.to_string(),
            component,
        });
        self.assembly.on_serializer();
        Ok(())
    }

    /// Note that the output so far feeds more than one downstream path.
    ///
    /// With automatic cache points enabled, the next stage added starts a
    /// cache point. Returns whether a cache point was raised.
    pub fn inform_branch_point(&mut self) -> bool {
        let raised = self
            .assembly
            .inform_branch_point(self.config.auto_caching_point);
        if raised {
            debug!(
                transformers = self.transformers.len(),
                "branch point raised a cache point"
            );
        }
        raised
    }

    /// Key of the cacheable prefix for the current assembly.
    pub fn cache_key(&self) -> Result<PipelineCacheKey, PipelineError> {
        Ok(self.plan()?.key)
    }

    #[instrument(
        name = "pipeline.process",
        skip_all,
        fields(request_id = %Uuid::new_v4(), transformers = self.transformers.len())
    )]
    pub fn process(&mut self, env: &mut dyn Environment) -> Result<ProcessOutcome, PipelineError> {
        if self.state != PipelineState::Assembling {
            return Err(PipelineError::invalid_state("process", self.state));
        }
        let started_at = Instant::now();

        let plan = self.plan()?;
        let hit = if plan.key.is_empty() {
            None
        } else {
            self.lookup(&plan)?
        };
        self.state = PipelineState::Resolved;
        debug!(
            key = %plan.key,
            complete_response = plan.complete_response(),
            first_not_cacheable = plan.first_not_cacheable,
            hit_len = hit.as_ref().map(|hit| hit.len),
            "resolved pipeline cache key"
        );

        self.state = PipelineState::Executing;
        let outcome = match hit {
            Some(hit) if plan.complete_response() && hit.len == plan.key.len() => {
                counter!(METRIC_CACHE_HIT, "kind" => "complete").increment(1);
                if let Some(content_type) = hit.response.content_type.as_deref() {
                    env.set_content_type(content_type);
                }
                let output = env.output();
                output.write_all(&hit.response.content)?;
                output.flush()?;
                ProcessOutcome {
                    lookup: CacheLookup::Complete,
                    stored: Vec::new(),
                }
            }
            hit => {
                let lookup = match &hit {
                    Some(hit) => {
                        counter!(METRIC_CACHE_HIT, "kind" => "partial").increment(1);
                        CacheLookup::Partial {
                            prefix_len: hit.len,
                        }
                    }
                    None if plan.key.is_empty() => CacheLookup::Uncacheable,
                    None => {
                        counter!(METRIC_CACHE_MISS).increment(1);
                        CacheLookup::Miss
                    }
                };
                let execution = self.execute(env, &plan, hit.as_ref())?;
                let stored = self.store_results(&plan, execution)?;
                ProcessOutcome { lookup, stored }
            }
        };

        self.state = PipelineState::Completed;
        histogram!(METRIC_PROCESS_MS).record(started_at.elapsed().as_secs_f64() * 1000.0);
        Ok(outcome)
    }

    /// Drop every stage and all per-request state so the instance can be
    /// assembled again.
    pub fn recycle(&mut self) {
        self.generator = None;
        self.transformers.clear();
        self.serializer = None;
        self.assembly.reset();
        self.state = PipelineState::Recycled;
    }

    fn begin_assembly(&mut self, operation: &'static str) -> Result<(), PipelineError> {
        if !self.state.accepts_components() {
            return Err(PipelineError::invalid_state(operation, self.state));
        }
        self.state = PipelineState::Assembling;
        Ok(())
    }

    fn plan(&self) -> Result<CachePlan, PipelineError> {
        let generator = self
            .generator
            .as_ref()
            .ok_or(PipelineError::Incomplete(StageKind::Generator))?;
        let serializer = self
            .serializer
            .as_ref()
            .ok_or(PipelineError::Incomplete(StageKind::Serializer))?;

        let mut plan = CachePlan {
            key: PipelineCacheKey::new(),
            validities: Vec::new(),
            first_not_cacheable: 0,
        };

        let Some((key, validity)) = cacheability(&*generator.component) else {
            return Ok(plan);
        };
        plan.key
            .append(StageKind::Generator, generator.role.as_str(), key, false);
        plan.validities.push(validity);

        for (index, stage) in self.transformers.iter().enumerate() {
            let Some((key, validity)) = cacheability(&*stage.component) else {
                break;
            };
            plan.key.append(
                StageKind::Transformer,
                stage.role.as_str(),
                key,
                self.assembly.is_cache_point(index),
            );
            plan.validities.push(validity);
            plan.first_not_cacheable = index + 1;
        }

        if plan.first_not_cacheable == self.transformers.len()
            && let Some((key, validity)) = cacheability(&*serializer.component)
        {
            plan.key.append(
                StageKind::Serializer,
                serializer.role.as_str(),
                key,
                self.assembly.serializer_cache_point(),
            );
            plan.validities.push(validity);
        }

        Ok(plan)
    }

    /// Longest prefix of the key with a fresh entry. Stale entries met on the
    /// way are removed from the store.
    fn lookup(&self, plan: &CachePlan) -> Result<Option<CacheHit>, PipelineError> {
        for len in (1..=plan.key.len()).rev() {
            let key = plan.key.prefix(len);
            match self.store.get(&key)? {
                Some(response) => {
                    if validities_hold(&response.validities, &plan.validities[..key.len()]) {
                        debug!(key = %key, "cache hit");
                        return Ok(Some(CacheHit {
                            len: key.len(),
                            response,
                        }));
                    }
                    counter!(METRIC_CACHE_INVALID).increment(1);
                    debug!(key = %key, "removing stale cache entry");
                    self.store.remove(&key)?;
                }
                None => debug!(key = %key, "no cache entry for prefix"),
            }
        }
        Ok(None)
    }

    fn execute(
        &mut self,
        env: &mut dyn Environment,
        plan: &CachePlan,
        hit: Option<&CacheHit>,
    ) -> Result<Execution, PipelineError> {
        let first_processed = hit.map_or(0, |hit| hit.len - 1);
        let mut captures: BTreeMap<usize, EventCompiler> =
            tee_positions(plan, &self.assembly, hit.map(|hit| hit.len - 1))
                .into_iter()
                .map(|position| (position, EventCompiler::new()))
                .collect();

        let Self {
            generator,
            transformers,
            serializer,
            ..
        } = self;
        let generator = generator
            .as_mut()
            .ok_or(PipelineError::Incomplete(StageKind::Generator))?;
        let serializer = serializer
            .as_mut()
            .ok_or(PipelineError::Incomplete(StageKind::Serializer))?;

        let content_type = serializer.component.mime_type();
        if let Some(content_type) = content_type.as_deref() {
            env.set_content_type(content_type);
        }
        let mut writer = CachingWriter::new(env.output(), plan.complete_response());

        {
            let mut taps: BTreeMap<usize, &mut EventCompiler> = captures
                .iter_mut()
                .map(|(position, capture)| (*position, capture))
                .collect();

            let mut chain: Box<dyn EventSink + '_> = Box::new(SerializerStage::new(
                &mut *serializer.component,
                &mut writer,
            ));
            if let Some(capture) = taps.remove(&transformers.len()) {
                chain = Box::new(TeeSink::new(chain, capture));
            }
            for (index, stage) in transformers
                .iter_mut()
                .enumerate()
                .skip(first_processed)
                .rev()
            {
                chain = Box::new(TransformerStage::new(&mut *stage.component, chain));
                if let Some(capture) = taps.remove(&index) {
                    chain = Box::new(TeeSink::new(chain, capture));
                }
            }

            match hit {
                Some(hit) => {
                    EventInterpreter::new(hit.response.content.clone())?.replay(&mut chain)?
                }
                None => generator.component.generate(&mut chain)?,
            }
        }

        Ok(Execution {
            captures,
            complete: writer.into_captured(),
            content_type,
        })
    }

    fn store_results(
        &self,
        plan: &CachePlan,
        execution: Execution,
    ) -> Result<Vec<PipelineCacheKey>, PipelineError> {
        let mut stored = Vec::new();
        if plan.key.is_empty() {
            return Ok(stored);
        }

        let mut key = plan.key.copy();
        let mut validities = plan.validities.clone();

        if plan.complete_response() {
            if let Some(content) = execution.complete {
                self.put(&key, &validities, Bytes::from(content), execution.content_type)?;
                stored.push(key.copy());
            }
            key.remove_until_cache_point();
            validities.truncate(key.len());
        }

        for (position, capture) in execution.captures.into_iter().rev() {
            if key.is_empty() {
                break;
            }
            let prefix_len = position + 1;
            if key.len() != prefix_len {
                warn!(
                    key = %key,
                    prefix_len,
                    "captured prefix does not match cache key, dropping remaining captures"
                );
                break;
            }
            self.put(&key, &validities, capture.sax_fragment()?, None)?;
            stored.push(key.copy());
            key.remove_until_cache_point();
            validities.truncate(key.len());
        }

        Ok(stored)
    }

    fn put(
        &self,
        key: &PipelineCacheKey,
        validities: &[Validity],
        content: Bytes,
        content_type: Option<String>,
    ) -> Result<(), PipelineError> {
        let bytes = content.len();
        self.store.store(
            key.copy(),
            CachedResponse::new(validities.to_vec(), content, content_type),
        )?;
        counter!(METRIC_CACHE_STORE).increment(1);
        info!(key = %key, bytes, "stored pipeline cache entry");
        Ok(())
    }
}

fn cacheability(component: &(impl Cacheable + ?Sized)) -> Option<(String, Validity)> {
    Some((component.cache_key()?, component.validity()?))
}

/// Stored validities must line up with the fresh ones and each must hold.
fn validities_hold(cached: &[Validity], fresh: &[Validity]) -> bool {
    cached.len() == fresh.len()
        && cached
            .iter()
            .zip(fresh)
            .all(|(cached, fresh)| match cached.is_valid() {
                ValidityVerdict::Valid => true,
                ValidityVerdict::Invalid => false,
                ValidityVerdict::Unknown => {
                    cached.is_valid_against(fresh) == ValidityVerdict::Valid
                }
            })
}

/// Positions to tee. Position `i` sits in front of transformer `i`; position
/// `n` (the transformer count) sits in front of the serializer. When resuming
/// from a cached prefix only positions past `resumed_at` are considered.
fn tee_positions(
    plan: &CachePlan,
    assembly: &PipelineAssemblyState,
    resumed_at: Option<usize>,
) -> BTreeSet<usize> {
    let mut positions = BTreeSet::new();
    if plan.key.is_empty() {
        return positions;
    }
    for index in 0..plan.first_not_cacheable {
        if assembly.is_cache_point(index) {
            positions.insert(index);
        }
    }
    if plan.complete_response() {
        if assembly.serializer_cache_point() {
            positions.insert(plan.first_not_cacheable);
        }
    } else {
        positions.insert(plan.first_not_cacheable);
    }
    if let Some(resumed_at) = resumed_at {
        positions.retain(|position| *position > resumed_at);
    }
    positions
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(fragments: &[bool], first_not_cacheable: usize) -> CachePlan {
        let mut key = PipelineCacheKey::new();
        key.append(StageKind::Generator, "g", "g", false);
        for (index, flag) in fragments.iter().enumerate() {
            key.append(StageKind::Transformer, "t", format!("t{index}"), *flag);
        }
        CachePlan {
            validities: vec![Validity::Nop; key.len()],
            key,
            first_not_cacheable,
        }
    }

    fn assembly(generator_hint: bool, transformer_hints: &[bool]) -> PipelineAssemblyState {
        let hint = |flag: bool| {
            if flag {
                Parameters::new().with("caching-point", "true")
            } else {
                Parameters::new()
            }
        };
        let mut state = PipelineAssemblyState::new();
        state.on_generator(&hint(generator_hint));
        for flag in transformer_hints {
            state.on_transformer(&hint(*flag));
        }
        state.on_serializer();
        state
    }

    #[test]
    fn longest_prefix_tee_sits_before_first_uncacheable_stage() {
        let state = assembly(false, &[false, false]);
        let positions = tee_positions(&plan(&[false], 1), &state, None);
        assert_eq!(positions.into_iter().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn cache_points_add_interior_tees() {
        // generator hint flags transformer 0; transformer 0 hint flags transformer 1
        let state = assembly(true, &[true, false, false]);
        let positions = tee_positions(&plan(&[true, true, false], 3), &state, None);
        assert_eq!(positions.into_iter().collect::<Vec<_>>(), vec![0, 1, 3]);
    }

    #[test]
    fn complete_response_skips_longest_prefix_tee() {
        let state = assembly(false, &[false]);
        let mut complete = plan(&[false], 1);
        complete.key.append(StageKind::Serializer, "s", "s", false);
        assert!(tee_positions(&complete, &state, None).is_empty());
    }

    #[test]
    fn resumed_run_only_tees_past_the_replayed_prefix() {
        let state = assembly(true, &[true, false, false]);
        let positions = tee_positions(&plan(&[true, true, false], 3), &state, Some(1));
        assert_eq!(positions.into_iter().collect::<Vec<_>>(), vec![3]);
    }

    #[test]
    fn stale_or_misaligned_validities_do_not_hold() {
        assert!(validities_hold(
            &[Validity::Nop, Validity::TimeStamp(5)],
            &[Validity::Nop, Validity::TimeStamp(5)]
        ));
        assert!(!validities_hold(
            &[Validity::Nop, Validity::TimeStamp(5)],
            &[Validity::Nop, Validity::TimeStamp(6)]
        ));
        assert!(!validities_hold(&[Validity::Nop], &[Validity::Nop, Validity::Nop]));
    }
}
