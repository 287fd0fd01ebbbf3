// Admission gate behaviour across users, messages and permit outcomes

use std::sync::Arc;
use std::time::{Duration, Instant};

use aiimg::admission::{edit_key, message_id_or_fallback, AdmissionController, Rejection};

fn controller() -> AdmissionController {
    AdmissionController::new(Duration::from_secs(10), Duration::from_secs(30))
}

#[test]
fn test_users_are_independent() {
    let gate = controller();
    let now = Instant::now();
    let a = gate.admit_at("alice", "m1", now).unwrap();
    let b = gate.admit_at("bob", "m2", now).unwrap();
    assert_eq!(gate.in_flight_count(), 2);
    drop(a);
    drop(b);
    assert_eq!(gate.in_flight_count(), 0);
}

#[test]
fn test_generation_and_edit_keys_do_not_collide() {
    let gate = controller();
    let now = Instant::now();
    let _draw = gate.admit_at("alice", "m1", now).unwrap();
    let edit = gate.admit_at(&edit_key("alice"), "m2", now).unwrap();
    assert_eq!(edit.key(), "edit_alice");
}

#[test]
fn test_failed_request_can_be_retried_after_debounce() {
    let gate = controller();
    let start = Instant::now();
    gate.admit_at("alice", "m1", start).unwrap().fail();

    // Still inside the debounce window
    assert_eq!(
        gate.admit_at("alice", "m1", start + Duration::from_secs(5)).unwrap_err(),
        Rejection::TooFrequent
    );
    // The failed message id was released, so a retry is accepted later
    assert!(gate
        .admit_at("alice", "m1", start + Duration::from_secs(11))
        .is_ok());
}

#[test]
fn test_success_blocks_same_message_and_cools_down_user() {
    let gate = controller();
    let start = Instant::now();
    gate.admit_at("alice", "m1", start).unwrap().succeed();

    let later = start + Duration::from_secs(15);
    assert_eq!(
        gate.admit_at("alice", "m1", later).unwrap_err(),
        Rejection::AlreadyHandled
    );
    assert_eq!(
        gate.admit_at("alice", "m2", later).unwrap_err(),
        Rejection::TooFrequent
    );
    assert!(gate
        .admit_at("alice", "m3", start + Duration::from_secs(31))
        .is_ok());
}

#[test]
fn test_concurrent_admission_admits_exactly_one() {
    let gate = Arc::new(controller());
    let now = Instant::now();
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let gate = Arc::clone(&gate);
            std::thread::spawn(move || {
                gate.admit_at("alice", &format!("m{}", i), now)
                    .map(std::mem::forget)
                    .is_ok()
            })
        })
        .collect();
    let admitted = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|ok| *ok)
        .count();
    assert_eq!(admitted, 1);
}

#[test]
fn test_fallback_message_id_is_stable() {
    let a = message_id_or_fallback(None, "alice", "draw a cat");
    let b = message_id_or_fallback(None, "alice", "draw a cat");
    let c = message_id_or_fallback(None, "bob", "draw a cat");
    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_eq!(message_id_or_fallback(Some("real-id"), "alice", "x"), "real-id");
}
