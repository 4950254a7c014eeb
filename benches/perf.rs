use criterion::{Criterion, black_box, criterion_group, criterion_main};
use permview::query::executor::{QueryDescriptor, QueryLimits, materialize_at};
use permview::query::plan::{SortKey, prop};
use permview::snapshot::Lineage;
use permview::{
    AccessLevel, PermissionEntry, PermviewConfig, PermviewInstance, RefreshScheduler, diff,
};

const SEEDED_ENTRIES: i64 = 10_000;
const CHURN_ENTRIES: i64 = 64;

fn level_for(i: i64) -> AccessLevel {
    match i % 4 {
        0 => AccessLevel::None,
        1 => AccessLevel::Read,
        2 => AccessLevel::ReadWrite,
        _ => AccessLevel::Admin,
    }
}

fn seed(db: &PermviewInstance) {
    let batch: Vec<_> = (0..SEEDED_ENTRIES)
        .map(|i| {
            PermissionEntry::new(
                format!("/bench/{}", i % 500),
                format!("user-{i}"),
                level_for(i),
                i,
            )
        })
        .collect();
    db.commit(batch).expect("seed");
}

fn churn(db: &PermviewInstance, round: i64) {
    let batch: Vec<_> = (0..CHURN_ENTRIES)
        .map(|i| {
            let id = (round * CHURN_ENTRIES + i) % SEEDED_ENTRIES;
            PermissionEntry::new(
                format!("/bench/{}", id % 500),
                format!("user-{id}"),
                level_for(id + round),
                SEEDED_ENTRIES + round,
            )
        })
        .collect();
    db.commit(batch).expect("churn");
}

fn bench_permview_hot_paths(c: &mut Criterion) {
    let config = PermviewConfig::default().with_max_retained_versions(64);
    let db = PermviewInstance::open(config).expect("open");
    seed(&db);
    churn(&db, 1);
    let limits = QueryLimits::from(db.config());

    let identity = QueryDescriptor::identity(limits);
    c.bench_function("materialize_10k_identity", |b| {
        b.iter(|| {
            let snapshot = materialize_at(db.store(), 1, &identity, Lineage::next())
                .expect("materialize");
            black_box(snapshot.len());
        })
    });

    let filtered_sorted = QueryDescriptor::new(
        Some(prop("accessLevel").gte(AccessLevel::ReadWrite)),
        vec![SortKey::desc("updatedAt"), SortKey::asc("path")],
        limits,
    )
    .expect("descriptor");
    c.bench_function("materialize_10k_filtered_sorted", |b| {
        b.iter(|| {
            let snapshot = materialize_at(db.store(), 1, &filtered_sorted, Lineage::next())
                .expect("materialize");
            black_box(snapshot.len());
        })
    });

    let by_updated = QueryDescriptor::new(None, vec![SortKey::desc("updatedAt")], limits)
        .expect("descriptor");
    let lineage = Lineage::next();
    let before = materialize_at(db.store(), 1, &by_updated, lineage).expect("before");
    let after = materialize_at(db.store(), 2, &by_updated, lineage).expect("after");
    c.bench_function("diff_10k_with_64_moves", |b| {
        b.iter(|| {
            let script = diff(black_box(&before), black_box(&after)).expect("diff");
            black_box(script.len());
        })
    });
}

fn bench_refresh_tick(c: &mut Criterion) {
    let db = PermviewInstance::open(PermviewConfig::default()).expect("open");
    seed(&db);
    let scheduler = RefreshScheduler::new();
    let results = db.results(&scheduler).expect("results");
    let _admins = results
        .filtered(prop("accessLevel").eq(AccessLevel::Admin))
        .expect("filtered");
    let _newest = results.sort("updatedAt", false).expect("sorted");
    let _token = results.subscribe(|_, change| {
        black_box(change);
    });

    let mut round = 1_i64;
    c.bench_function("tick_three_collections_after_64_updates", |b| {
        b.iter(|| {
            churn(&db, round);
            round += 1;
            let report = scheduler.tick().expect("tick");
            black_box(report.notifications);
        })
    });
}

criterion_group!(benches, bench_permview_hot_paths, bench_refresh_tick);
criterion_main!(benches);
