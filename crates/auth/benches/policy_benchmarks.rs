use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use chrono::Utc;
use warden_auth::password::{self, PasswordPolicy};
use warden_auth::permissions::{self, PermissionKey};
use warden_auth::user::{AccountCommand, RegisterUser};
use warden_auth::{EffectivePermissions, LegacyRole, Profile, User};
use warden_core::{Aggregate, UserId};

fn bench_generate(c: &mut Criterion) {
    let mut group = c.benchmark_group("password_generate");
    for min_length in [8usize, 16, 64] {
        let policy = PasswordPolicy {
            min_length,
            ..PasswordPolicy::default()
        };
        group.bench_with_input(BenchmarkId::from_parameter(min_length), &policy, |b, policy| {
            b.iter(|| password::generate(black_box(policy)))
        });
    }
    group.finish();
}

fn bench_validate(c: &mut Criterion) {
    let policy = PasswordPolicy::default();
    c.bench_function("password_validate_ok", |b| {
        b.iter(|| password::validate(black_box("Correct-Horse-9"), &policy))
    });
    c.bench_function("password_validate_violations", |b| {
        b.iter(|| password::validate(black_box("short"), &policy))
    });
}

fn bench_permission_check(c: &mut Criterion) {
    let profile = Profile::new("Administrator", None, Utc::now()).expect("profile");
    let id = UserId::new();
    let mut user = User::empty(id);
    let register = AccountCommand::Register(RegisterUser {
        user_id: id,
        email: "bench@example.com".to_string(),
        display_name: "Bench".to_string(),
        password_hash: "$argon2id$bench".to_string(),
        role: LegacyRole::User,
        profile_id: Some(profile.id),
        first_login: false,
        password_expires_at: None,
        occurred_at: Utc::now(),
    });
    for event in user.handle(&register).expect("register") {
        user.apply(&event);
    }

    let granted: Vec<PermissionKey> = permissions::catalog().collect();
    let perms = EffectivePermissions::resolve(&user, Some(&profile), granted.clone());

    c.bench_function("rbac_resolve_full_catalog", |b| {
        b.iter(|| EffectivePermissions::resolve(&user, Some(&profile), black_box(granted.clone())))
    });
    c.bench_function("rbac_has_permission", |b| {
        b.iter(|| perms.has(black_box(&permissions::SECURITY_VIEW)))
    });
}

criterion_group!(benches, bench_generate, bench_validate, bench_permission_check);
criterion_main!(benches);
