use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use std::sync::Arc;
use std::time::Duration;

use tollgate_core::{UserId, UserIdentity};
use tollgate_infra::tickets::{InMemoryTicketStore, TicketBroker, TicketToken};

fn broker() -> TicketBroker {
    TicketBroker::new(Arc::new(InMemoryTicketStore::new()), Duration::from_secs(60)).unwrap()
}

fn bench_token_generation(c: &mut Criterion) {
    let mut group = c.benchmark_group("ticket_token");
    group.throughput(Throughput::Elements(1));
    group.bench_function("generate", |b| b.iter(|| black_box(TicketToken::generate())));
    group.finish();
}

fn bench_issue_redeem_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("ticket_broker");
    group.sample_size(1000);

    let subject = UserIdentity::new(UserId::new(1), "bob");

    group.bench_function("issue_then_redeem", |b| {
        let broker = broker();
        b.iter(|| {
            let token = broker.issue_blocking(&subject).unwrap();
            black_box(broker.redeem_blocking(token.as_str()).unwrap());
        })
    });

    // Redemption cost with many live tickets in the map.
    for live in [1_000usize, 100_000] {
        group.bench_with_input(BenchmarkId::new("redeem_with_live_tickets", live), &live, |b, &live| {
            let broker = broker();
            for _ in 0..live {
                broker.issue_blocking(&subject).unwrap();
            }
            b.iter(|| {
                let token = broker.issue_blocking(&subject).unwrap();
                black_box(broker.redeem_blocking(token.as_str()).unwrap());
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_token_generation, bench_issue_redeem_cycle);
criterion_main!(benches);
