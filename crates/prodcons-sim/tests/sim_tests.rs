//! End-to-end simulation runs, one per buffer mode.

use std::io::Write;

use prodcons_sim::{run, Mode, SimError, SimOptions};

fn fast(mode: Mode) -> SimOptions {
    SimOptions {
        mode,
        n_prod: 4,
        n_cons: 3,
        buf_sz: 2,
        prod_time_ms: 0,
        cons_time_ms: 1,
        min_prod: 3,
        max_prod: 12,
        k: 3,
        n_copies: 3,
        seed: Some(2024),
    }
}

#[test]
fn test_plain_mode_conserves_items() {
    let report = run(&fast(Mode::Plain)).unwrap();
    assert!(report.passed(), "{report}");
    assert_eq!(report.quotas.len(), 4);
    assert_eq!(
        report.expected,
        report.quotas.iter().sum::<usize>() as u64
    );
}

#[test]
fn test_batch_mode_conserves_items() {
    let report = run(&fast(Mode::Batch)).unwrap();
    assert!(report.passed(), "{report}");
}

#[test]
fn test_fanout_mode_counts_copies() {
    let report = run(&fast(Mode::Fanout)).unwrap();
    assert!(report.passed(), "{report}");
    assert_eq!(
        report.expected,
        report.quotas.iter().sum::<usize>() as u64 * 3
    );
}

#[test]
fn test_executor_mode_runs_every_task() {
    let report = run(&fast(Mode::Executor)).unwrap();
    assert!(report.passed(), "{report}");
}

#[test]
fn test_single_slot_buffer() {
    let opts = SimOptions {
        buf_sz: 1,
        ..fast(Mode::Plain)
    };
    assert!(run(&opts).unwrap().passed());
}

#[test]
fn test_same_seed_same_quotas() {
    let a = run(&fast(Mode::Plain)).unwrap();
    let b = run(&fast(Mode::Plain)).unwrap();
    assert_eq!(a.quotas, b.quotas);
}

#[test]
fn test_fanout_rejects_more_copies_than_consumers() {
    let opts = SimOptions {
        n_copies: 4,
        ..fast(Mode::Fanout)
    };
    assert!(matches!(
        run(&opts),
        Err(SimError::TooManyCopies {
            copies: 4,
            consumers: 3
        })
    ));
}

#[test]
fn test_options_file_round_trip() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{"mode": "batch", "n_prod": 2, "n_cons": 2, "buf_sz": 3, "k": 4,
            "prod_time_ms": 0, "cons_time_ms": 0, "seed": 9}}"#
    )
    .unwrap();

    let opts = SimOptions::from_json_file(file.path()).unwrap();
    assert_eq!(opts.mode, Mode::Batch);
    assert_eq!(opts.k, 4);
    assert!(run(&opts).unwrap().passed());
}

#[test]
fn test_missing_options_file() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent.json");
    assert!(matches!(
        SimOptions::from_json_file(&missing),
        Err(SimError::Io { .. })
    ));
}
