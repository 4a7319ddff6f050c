use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use criterion::{Criterion, criterion_group, criterion_main};
use saga::publishing::{self, PublishingSteps};
use saga::{SagaCatalog, SagaCoordinator, SubmitOptions};

fn coordinator(rt: &tokio::runtime::Runtime) -> Arc<SagaCoordinator> {
    rt.block_on(async {
        let mut catalog = SagaCatalog::new();
        catalog
            .register(PublishingSteps::default().definition().unwrap())
            .unwrap();
        let mut builder = SagaCoordinator::builder().catalog(catalog);
        for domain in publishing::in_memory_domains().await.unwrap() {
            builder = builder.domain(domain);
        }
        Arc::new(builder.build().unwrap())
    })
}

fn bench_successful_saga(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let coordinator = coordinator(&rt);
    let next = AtomicUsize::new(0);

    c.bench_function("coordinator/publishing_success", |b| {
        b.iter(|| {
            let correlation = format!("ok-{}", next.fetch_add(1, Ordering::Relaxed));
            rt.block_on(async {
                let outcome = coordinator
                    .submit(publishing::SAGA_TYPE, correlation)
                    .await
                    .unwrap();
                assert!(outcome.success);
            });
        });
    });
}

fn bench_compensated_saga(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let coordinator = coordinator(&rt);
    let next = AtomicUsize::new(0);

    c.bench_function("coordinator/publishing_fail_last_step", |b| {
        b.iter(|| {
            let correlation = format!("fail-{}", next.fetch_add(1, Ordering::Relaxed));
            rt.block_on(async {
                let outcome = coordinator
                    .submit_with(
                        publishing::SAGA_TYPE,
                        correlation,
                        SubmitOptions::new().fail_at_step(3),
                    )
                    .await
                    .unwrap();
                assert_eq!(outcome.compensated_steps().len(), 3);
            });
        });
    });
}

fn bench_concurrent_sagas(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let coordinator = coordinator(&rt);
    let next = AtomicUsize::new(0);

    c.bench_function("coordinator/publishing_x16_concurrent", |b| {
        b.iter(|| {
            let batch = next.fetch_add(1, Ordering::Relaxed);
            rt.block_on(async {
                let submissions = (0..16).map(|i| {
                    coordinator.submit(publishing::SAGA_TYPE, format!("batch-{batch}-{i}"))
                });
                futures_util::future::join_all(submissions).await;
            });
        });
    });
}

criterion_group!(
    benches,
    bench_successful_saga,
    bench_compensated_saga,
    bench_concurrent_sagas
);
criterion_main!(benches);
