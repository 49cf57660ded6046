//! Criterion benchmarks for the reporting engine.
//!
//! Covers: score histogram, day-bucketed activity, top-performer ranking and
//! the full analytics view over the in-memory store.

use std::sync::Arc;

use chrono::{Duration, Utc};
use criterion::{Criterion, black_box, criterion_group, criterion_main};
use rand::Rng;
use rand::rngs::StdRng;
use rand::SeedableRng;

use karma_core::memory::MemoryStore;
use karma_core::policy::points_for;
use karma_core::reporting::{self, Reporter};
use karma_core::traits::{KarmaStore, LedgerStore, UserStore};
use karma_core::types::{BehaviorDraft, BehaviorType, Metadata, NewUser, Role, UserId};

const USERS: usize = 500;
const EVENTS_PER_USER: usize = 40;

fn populated_store() -> Arc<MemoryStore> {
    let mut rng = StdRng::seed_from_u64(7);
    let store = Arc::new(MemoryStore::new());
    let now = Utc::now();
    for i in 0..USERS {
        let id = UserId::new(format!("user-{i}"));
        store
            .register_user(NewUser {
                id: id.clone(),
                username: format!("user{i}"),
                email: format!("user{i}@example.com"),
                role: Role::User,
            })
            .unwrap();
        for _ in 0..EVENTS_PER_USER {
            let kind = BehaviorType::KNOWN[rng.gen_range(0..BehaviorType::KNOWN.len())].clone();
            store
                .append(BehaviorDraft {
                    user: id.clone(),
                    karma_points: points_for(&kind),
                    kind,
                    description: "bench".into(),
                    date: now - Duration::hours(rng.gen_range(0..24 * 60)),
                    metadata: Metadata::new(),
                })
                .unwrap();
        }
    }
    store
}

fn bench_distribution(c: &mut Criterion) {
    let store = populated_store();
    let users = store.list_users().unwrap();

    c.bench_function("karma_distribution", |b| {
        b.iter(|| reporting::karma_distribution(black_box(&users)))
    });
}

fn bench_activity_and_top(c: &mut Criterion) {
    let store = populated_store();
    let users = store.list_users().unwrap();
    let since = reporting::window_start(Utc::now());
    let events = store.behaviors_since(since).unwrap();

    c.bench_function("recent_activity", |b| {
        b.iter(|| reporting::recent_activity(black_box(&events), since))
    });
    c.bench_function("top_performers", |b| {
        b.iter(|| reporting::top_performers(black_box(&events), &users, since, 5))
    });
}

fn bench_global_analytics(c: &mut Criterion) {
    let store: Arc<dyn KarmaStore> = populated_store();
    let reporter = Reporter::new(store);
    let now = Utc::now();

    c.bench_function("global_analytics", |b| {
        b.iter(|| reporter.global_analytics(black_box(now)).unwrap())
    });
}

criterion_group!(
    benches,
    bench_distribution,
    bench_activity_and_top,
    bench_global_analytics,
);
criterion_main!(benches);
