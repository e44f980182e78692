//! Aggregate reducer and sandbox benchmarks.
//!
//! Measures the per-branch state merge (which runs once per branch at
//! fan-in) and worktree sandbox create/destroy round-trips.
//!
//! # Running
//!
//! ```bash
//! cargo bench --bench aggregate_merge
//! # With a custom filter:
//! cargo bench --bench aggregate_merge -- merge
//! ```

use std::path::PathBuf;
use std::process::Command;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};

use stomper::model::state::{BranchOutcome, FixRecord, SessionAggregates};
use stomper::model::types::{Revision, SandboxId, SessionId};
use stomper::sandbox::{SandboxBackend, worktree::WorktreeSandbox};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn outcomes(n: usize) -> Vec<BranchOutcome> {
    (0..n)
        .map(|i| {
            BranchOutcome::Fixed(FixRecord {
                file_path: PathBuf::from(format!("src/module_{i}.py")),
                errors_fixed: u32::try_from(i % 5).expect("small"),
                attempts_used: 1,
                revision: None,
            })
        })
        .collect()
}

/// Create a temporary git repository with one commit.
fn make_temp_repo() -> (tempfile::TempDir, Revision) {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path().to_owned();

    let git = |args: &[&str]| {
        let status = Command::new("git")
            .args(args)
            .current_dir(&root)
            .status()
            .expect("git");
        assert!(status.success());
    };

    git(&["init", "-b", "main"]);
    git(&["config", "user.email", "bench@stomper"]);
    git(&["config", "user.name", "bench"]);
    std::fs::write(root.join("a.py"), "x = 1\n").expect("seed file");
    git(&["add", "."]);
    git(&["commit", "-m", "seed"]);

    let out = Command::new("git")
        .args(["rev-parse", "HEAD"])
        .current_dir(&root)
        .output()
        .expect("rev-parse");
    let rev = Revision::new(String::from_utf8_lossy(&out.stdout).trim()).expect("valid oid");
    (dir, rev)
}

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

fn bench_aggregate_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("aggregate_merge");
    for size in [8_usize, 64, 512] {
        group.bench_with_input(BenchmarkId::new("absorb", size), &size, |b, &size| {
            let branch_outcomes = outcomes(size);
            b.iter(|| {
                let mut agg = SessionAggregates::default();
                for outcome in branch_outcomes.clone() {
                    agg.absorb(outcome);
                }
                agg
            });
        });
    }
    group.finish();
}

fn bench_sandbox_round_trip(c: &mut Criterion) {
    let (dir, base) = make_temp_repo();
    let backend = WorktreeSandbox::new(dir.path().to_path_buf());
    let session = SessionId::new("bench-session").expect("valid id");

    c.bench_function("sandbox_create_destroy", |b| {
        b.iter(|| {
            let id = SandboxId::for_file(&session, "a");
            backend.create(&id, &base).expect("create");
            backend.destroy(&id).expect("destroy");
        });
    });
}

criterion_group!(benches, bench_aggregate_merge, bench_sandbox_round_trip);
criterion_main!(benches);
