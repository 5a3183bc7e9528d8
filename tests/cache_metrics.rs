use std::collections::HashSet;
use std::sync::Arc;

use bytes::Bytes;
use metrics_util::debugging::DebuggingRecorder;
use trellis::application::pipeline::{
    BufferedEnvironment, CacheLookup, CachingPipeline, ComponentRegistry, PipelineConfig,
};
use trellis::cache::{CacheConfig, CacheStore, CachedResponse, LruCacheStore, StoreRegistry};
use trellis::domain::key::{PipelineCacheKey, StageKind};
use trellis::domain::parameters::Parameters;
use trellis::domain::validity::Validity;

fn key(name: &str) -> PipelineCacheKey {
    let mut key = PipelineCacheKey::new();
    key.append(StageKind::Generator, "inline", name, false);
    key
}

fn assemble(pipeline: &mut CachingPipeline, text: &str) {
    pipeline
        .set_generator("inline", Some(text), &Parameters::new(), &Parameters::new())
        .expect("generator");
    pipeline
        .add_transformer("uppercase", None, &Parameters::new(), &Parameters::new())
        .expect("transformer");
    pipeline
        .add_transformer("timestamp", None, &Parameters::new(), &Parameters::new())
        .expect("transformer");
    pipeline
        .set_serializer("text", None, &Parameters::new())
        .expect("serializer");
}

#[test]
fn pipeline_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    // Store eviction
    let store = LruCacheStore::new(&CacheConfig { store_limit: 1 });
    for name in ["first", "second"] {
        store
            .store(
                key(name),
                CachedResponse::new(vec![Validity::Nop], Bytes::new(), None),
            )
            .expect("store");
    }
    assert_eq!(store.len(), 1);

    // Miss + store, then partial hit
    let components = Arc::new(ComponentRegistry::with_builtin());
    let stores = StoreRegistry::with_default_store(&CacheConfig::default());
    let mut pipeline =
        CachingPipeline::new(components.clone(), &stores, PipelineConfig::default())
            .ok()
            .expect("pipeline");

    assemble(&mut pipeline, "hello");
    let outcome = pipeline
        .process(&mut BufferedEnvironment::new())
        .expect("first run");
    assert_eq!(outcome.lookup, CacheLookup::Miss);
    pipeline.recycle();

    assemble(&mut pipeline, "hello");
    let outcome = pipeline
        .process(&mut BufferedEnvironment::new())
        .expect("second run");
    assert_eq!(outcome.lookup, CacheLookup::Partial { prefix_len: 2 });
    pipeline.recycle();

    // Complete hit
    for _ in 0..2 {
        pipeline
            .set_generator("inline", Some("bye"), &Parameters::new(), &Parameters::new())
            .expect("generator");
        pipeline
            .set_serializer("text", None, &Parameters::new())
            .expect("serializer");
        pipeline
            .process(&mut BufferedEnvironment::new())
            .expect("complete run");
        pipeline.recycle();
    }

    // Stale entry: a stored response whose validity has expired.
    let shared = stores.get("default").expect("default store");
    let mut stale = PipelineCacheKey::new();
    stale.append(
        StageKind::Generator,
        "inline",
        Parameters::new().fingerprint_with("stale"),
        false,
    );
    shared
        .store(
            stale,
            CachedResponse::new(
                vec![Validity::Expires(time::OffsetDateTime::UNIX_EPOCH)],
                Bytes::new(),
                None,
            ),
        )
        .expect("seed stale entry");
    pipeline
        .set_generator("inline", Some("stale"), &Parameters::new(), &Parameters::new())
        .expect("generator");
    pipeline
        .add_transformer("timestamp", None, &Parameters::new(), &Parameters::new())
        .expect("transformer");
    pipeline
        .set_serializer("text", None, &Parameters::new())
        .expect("serializer");
    let outcome = pipeline
        .process(&mut BufferedEnvironment::new())
        .expect("stale run");
    assert_eq!(outcome.lookup, CacheLookup::Miss);

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        "trellis_cache_store_evict_total",
        "trellis_pipeline_cache_hit_total",
        "trellis_pipeline_cache_miss_total",
        "trellis_pipeline_cache_invalid_total",
        "trellis_pipeline_cache_store_total",
        "trellis_pipeline_process_ms",
    ];

    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}
