// ABOUTME: Tests for duplicate-delivery rejection
// ABOUTME: Concurrent attempts for one id admit exactly one; archived ids are rejected after restart

use jarvis_core::store;
use jarvis_core::{Admission, AdmissionFilter, DuplicateReason, MessageArchive};
use std::sync::Arc;

fn filter_with_archive() -> (AdmissionFilter, MessageArchive) {
    let archive = MessageArchive::new(store::open_in_memory().unwrap());
    (AdmissionFilter::new(archive.clone()), archive)
}

#[test]
fn test_in_flight_duplicate_is_rejected() {
    let (filter, _) = filter_with_archive();
    let first = filter.try_admit(Some("wamid.A1"));
    assert!(first.is_admitted());

    match filter.try_admit(Some("wamid.A1")) {
        Admission::Duplicate(reason) => assert_eq!(reason, DuplicateReason::InFlight),
        Admission::Admitted(_) => panic!("second delivery must be rejected"),
    }
}

#[test]
fn test_archived_id_is_rejected() {
    let (filter, archive) = filter_with_archive();
    archive.store("wamid.A1", "hi", "u1").unwrap();

    match filter.try_admit(Some("wamid.A1")) {
        Admission::Duplicate(reason) => assert_eq!(reason, DuplicateReason::AlreadyProcessed),
        Admission::Admitted(_) => panic!("archived id must be rejected"),
    }
    assert_eq!(filter.in_flight_len(), 0);
}

#[test]
fn test_missing_id_is_always_admitted() {
    let (filter, _) = filter_with_archive();
    let a = filter.try_admit(None);
    let b = filter.try_admit(None);
    assert!(a.is_admitted());
    assert!(b.is_admitted());
}

#[test]
fn test_concurrent_attempts_admit_exactly_one() {
    let (filter, _) = filter_with_archive();
    let filter = Arc::new(filter);
    let barrier = Arc::new(std::sync::Barrier::new(16));

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let filter = Arc::clone(&filter);
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                barrier.wait();
                // Keep the guard alive until every thread has tried
                let admission = filter.try_admit(Some("wamid.RACE"));
                let admitted = admission.is_admitted();
                (admitted, admission)
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let admitted = results.iter().filter(|(ok, _)| *ok).count();
    assert_eq!(admitted, 1);
    drop(results);
    assert!(!filter.is_in_flight("wamid.RACE"));
}

#[tokio::test]
async fn test_guard_released_when_task_panics() {
    let (filter, _) = filter_with_archive();
    let filter = Arc::new(filter);

    let task = {
        let filter = Arc::clone(&filter);
        tokio::spawn(async move {
            let _guard = filter.try_admit(Some("wamid.P1"));
            panic!("handler blew up");
        })
    };
    assert!(task.await.is_err());
    assert!(!filter.is_in_flight("wamid.P1"));
}
