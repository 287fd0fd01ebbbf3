// Sweep planning over synthetic file sets

use std::path::PathBuf;
use std::time::Duration;

use aiimg::cache::{plan_sweep, FileRecord, SweepPolicy};
use rstest::rstest;

fn minutes(m: u64) -> Duration {
    Duration::from_secs(m * 60)
}

fn files(ages_minutes: &[u64]) -> Vec<FileRecord> {
    ages_minutes
        .iter()
        .enumerate()
        .map(|(i, age)| FileRecord {
            path: PathBuf::from(format!("{}.jpg", i)),
            age: minutes(*age),
            size: 100,
        })
        .collect()
}

fn policy(max_age_minutes: u64, max_count: usize) -> SweepPolicy {
    SweepPolicy {
        max_age: minutes(max_age_minutes),
        max_count,
        protect: minutes(5),
    }
}

#[rstest]
#[case(&[10, 20, 30], 60, 10, 0)]
#[case(&[10, 20, 90, 120], 60, 10, 2)]
#[case(&[10, 20, 30, 40], 60, 2, 2)]
#[case(&[10, 20, 90, 120], 60, 1, 3)]
fn test_plan_counts(
    #[case] ages: &[u64],
    #[case] max_age: u64,
    #[case] max_count: usize,
    #[case] expected_deleted: usize,
) {
    let plan = plan_sweep(files(ages), &policy(max_age, max_count));
    assert_eq!(plan.delete.len(), expected_deleted);
    assert_eq!(plan.keep, ages.len() - expected_deleted);
}

#[test]
fn test_protected_files_may_exceed_the_cap() {
    // Three files inside the protection window and a cap of one
    let plan = plan_sweep(files(&[1, 2, 3, 30]), &policy(60, 1));
    assert_eq!(plan.delete.len(), 1);
    assert_eq!(plan.delete[0].age, minutes(30));
    assert_eq!(plan.keep, 3);
}

#[test]
fn test_expired_but_protected_file_is_kept() {
    // A zero max age would expire everything; protection still applies
    let plan = plan_sweep(files(&[2, 10]), &policy(0, 100));
    assert_eq!(plan.delete.len(), 1);
    assert_eq!(plan.delete[0].age, minutes(10));
}

#[test]
fn test_planned_bytes_sum_deleted_sizes() {
    let plan = plan_sweep(files(&[100, 200, 300]), &policy(60, 10));
    assert_eq!(plan.planned_bytes(), 300);
}
