use criterion::{black_box, criterion_group, criterion_main, Criterion};
use papa_events::registry::{HandlerRegistry, RoutingPattern};
use papa_events::{
    async_trait, DispatcherConfig, EventApp, EventHandler, HandlerArgs, HandlerError,
    HandlerSignature, Payload,
};
use serde_json::json;
use std::sync::Arc;

struct NoopHandler;

#[async_trait]
impl EventHandler for NoopHandler {
    fn signature(&self) -> HandlerSignature {
        HandlerSignature::new().text("event_name").payload("event")
    }

    async fn handle(&self, args: HandlerArgs) -> Result<(), HandlerError> {
        black_box(args);
        Ok(())
    }
}

fn populated_registry() -> HandlerRegistry {
    let registry = HandlerRegistry::new();
    let plan = HandlerSignature::new()
        .text("event_name")
        .payload("event")
        .inspect()
        .unwrap();
    for n in 0..100 {
        let patterns = vec![
            RoutingPattern::new(format!("service{n}.created")).unwrap(),
            RoutingPattern::new(format!("service{n}.*")).unwrap(),
        ];
        registry
            .register(patterns, &format!("use_case_{n}"), Arc::new(NoopHandler), plan.clone(), 0)
            .unwrap();
    }
    registry
}

fn benchmark_pattern_matching(c: &mut Criterion) {
    let exact = RoutingPattern::new("user.created").unwrap();
    let wildcard = RoutingPattern::new("user.#.v2").unwrap();

    c.bench_function("pattern_exact_match", |b| {
        b.iter(|| exact.matches(black_box("user.created")))
    });
    c.bench_function("pattern_wildcard_match", |b| {
        b.iter(|| wildcard.matches(black_box("user.profile.updated.v2")))
    });
}

fn benchmark_registry_lookup(c: &mut Criterion) {
    let registry = populated_registry();

    c.bench_function("registry_lookup_100_handlers", |b| {
        b.iter(|| registry.lookup(black_box("service42.created")))
    });
}

fn benchmark_publish_and_drain(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let payload = Payload::try_from(json!({"name": "test user", "age": 30})).unwrap();

    c.bench_function("publish_and_drain_1000_events", |b| {
        b.iter(|| {
            runtime.block_on(async {
                let app = EventApp::with_config(DispatcherConfig::default()).unwrap();
                app.on_event(["user.*"], "bench").handler(NoopHandler).unwrap();
                app.start().await.unwrap();
                for _ in 0..1000 {
                    app.new_event("user.created", payload.clone()).await.unwrap();
                }
                app.stop().await.unwrap()
            })
        })
    });
}

criterion_group!(
    benches,
    benchmark_pattern_matching,
    benchmark_registry_lookup,
    benchmark_publish_and_drain
);
criterion_main!(benches);
