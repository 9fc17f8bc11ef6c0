use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use service_health::{
    ChangeDetector, DetectorPolicy, HealthStore, NotificationDispatcher, RawResult,
    SubscriptionHub, Target, TracingToastSink,
};
use std::sync::Arc;
use std::time::Duration;

fn build_detector(store: Arc<HealthStore>) -> ChangeDetector {
    let notifier = Arc::new(NotificationDispatcher::new(
        Arc::new(TracingToastSink),
        Duration::from_secs(60),
    ));
    let hub = Arc::new(SubscriptionHub::new(store.clone()));
    ChangeDetector::new(store, DetectorPolicy::default(), notifier, hub)
}

fn raw(target: &Target, ok: bool) -> RawResult {
    RawResult {
        target: target.clone(),
        ok,
        observed_at: Utc::now(),
        error: if ok { None } else { Some("refused".to_string()) },
    }
}

fn bench_steady_state_evaluate(c: &mut Criterion) {
    let store = Arc::new(HealthStore::new());
    let detector = build_detector(store);
    let target = Target::new("aws", "compute");

    c.bench_function("evaluate_steady_healthy", |b| {
        b.iter(|| {
            let event = detector.evaluate(black_box(&raw(&target, true)));
            let _ = black_box(event);
        })
    });
}

fn bench_flapping_evaluate(c: &mut Criterion) {
    let store = Arc::new(HealthStore::new());
    let detector = build_detector(store);
    let target = Target::new("aws", "compute");
    let mut ok = false;

    c.bench_function("evaluate_flapping", |b| {
        b.iter(|| {
            ok = !ok;
            let event = detector.evaluate(black_box(&raw(&target, ok)));
            let _ = black_box(event);
        })
    });
}

fn bench_provider_summary(c: &mut Criterion) {
    let store = Arc::new(HealthStore::new());
    let detector = build_detector(store.clone());
    for service in ["compute", "storage", "directory", "queue", "dns"] {
        let target = Target::new("aws", service);
        detector.evaluate(&raw(&target, service != "dns"));
    }

    c.bench_function("provider_summary", |b| {
        b.iter(|| {
            let summary = store.provider_summary(black_box("aws"));
            let _ = black_box(summary);
        })
    });
}

criterion_group!(
    benches,
    bench_steady_state_evaluate,
    bench_flapping_evaluate,
    bench_provider_summary
);
criterion_main!(benches);
