use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use std::sync::Arc;

use chrono::Utc;
use warden_auth::user::{AccountCommand, LockoutPolicy, RecordFailedLogin, RecordSuccessfulLogin, RegisterUser};
use warden_auth::LegacyRole;
use warden_core::UserId;
use warden_infra::dispatcher::AccountDispatcher;
use warden_infra::store::{AccessStore, IncidentQuery, InMemoryAccessStore};

fn setup() -> (AccountDispatcher<Arc<InMemoryAccessStore>>, UserId) {
    let store = Arc::new(InMemoryAccessStore::new());
    let dispatcher = AccountDispatcher::new(store);
    let id = UserId::new();
    let register = AccountCommand::Register(RegisterUser {
        user_id: id,
        email: format!("{id}@example.com"),
        display_name: "Bench".to_string(),
        password_hash: "$argon2id$bench".to_string(),
        role: LegacyRole::User,
        profile_id: None,
        first_login: false,
        password_expires_at: None,
        occurred_at: Utc::now(),
    });
    dispatcher.register(id, register, None).expect("register");
    (dispatcher, id)
}

fn failed_login() -> AccountCommand {
    AccountCommand::RecordFailedLogin(RecordFailedLogin {
        // High threshold so every iteration takes the same path.
        lockout: LockoutPolicy {
            max_attempts: u32::MAX,
            duration_minutes: 30,
        },
        occurred_at: Utc::now(),
    })
}

fn bench_dispatch_latency(c: &mut Criterion) {
    let (dispatcher, id) = setup();
    let failed = failed_login();
    let success = AccountCommand::RecordSuccessfulLogin(RecordSuccessfulLogin { occurred_at: Utc::now() });

    c.bench_function("dispatch_failed_login", |b| {
        b.iter(|| dispatcher.dispatch(black_box(id), &failed, None).expect("dispatch"))
    });
    c.bench_function("dispatch_successful_login", |b| {
        b.iter(|| dispatcher.dispatch(black_box(id), &success, None).expect("dispatch"))
    });
}

fn bench_incident_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("incident_query");
    for incidents in [100usize, 1_000, 10_000] {
        let (dispatcher, id) = setup();
        let failed = failed_login();
        for _ in 0..incidents {
            dispatcher.dispatch(id, &failed, None).expect("dispatch");
        }
        let query = IncidentQuery {
            user_id: Some(id),
            per_page: 50,
            ..IncidentQuery::default()
        };
        group.throughput(Throughput::Elements(incidents as u64));
        group.bench_with_input(BenchmarkId::from_parameter(incidents), &query, |b, query| {
            b.iter(|| dispatcher.store().list_incidents(black_box(query)).expect("query"))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_dispatch_latency, bench_incident_query);
criterion_main!(benches);
