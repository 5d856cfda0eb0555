//! Job claiming end to end on the in-process store: exclusivity under
//! concurrency, owner-checked unlock, conditional removal and lease expiry.

use std::collections::HashSet;
use std::time::Duration;

use lib_commons::jobs::lock::lock_key;
use lib_commons::{Job, JobQueue, JobRegistry, JobScanner, KvStore, LockManager, MemoryStore};

const JOB_NS: &str = "jobs";
const LOCK_NS: &str = "lock:";

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_claims_hand_out_a_single_job_once() {
    let store = MemoryStore::new();
    JobRegistry::new(store.clone())
        .add(JOB_NS, &Job::new("user=1", 1))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for i in 0..16 {
        let scanner = JobScanner::new(store.clone());
        handles.push(tokio::spawn(async move {
            scanner
                .find_and_lock(JOB_NS, LOCK_NS, &format!("worker-{}", i), Duration::from_secs(10))
                .await
                .unwrap()
        }));
    }

    let mut winners = 0;
    for handle in handles {
        if let Some(job) = handle.await.unwrap() {
            assert_eq!(job, Job::new("user=1", 1));
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_workers_never_share_a_job() {
    let store = MemoryStore::new().with_scan_page_size(3);
    let queue = JobQueue::new(store, JOB_NS, LOCK_NS);
    for i in 0..20 {
        queue.push(&Job::new(format!("user={}", i), i)).await.unwrap();
    }

    let mut handles = Vec::new();
    for w in 0..6 {
        let queue = queue.clone();
        handles.push(tokio::spawn(async move {
            let owner = format!("worker-{}", w);
            let mut mine = Vec::new();
            while let Some(job) = queue.claim(&owner, Duration::from_secs(10)).await.unwrap() {
                mine.push(job.name);
            }
            mine
        }));
    }

    let mut seen = HashSet::new();
    for handle in handles {
        for name in handle.await.unwrap() {
            assert!(seen.insert(name.clone()), "{} claimed twice", name);
        }
    }
    assert_eq!(seen.len(), 20);
}

#[tokio::test]
async fn unlock_only_by_the_holding_token() {
    let store = MemoryStore::new();
    let locks = LockManager::new(store.clone());
    assert!(locks.acquire(LOCK_NS, "user=7", "tokenB", Duration::from_secs(5)).await.unwrap());

    assert!(!locks.unlock(LOCK_NS, "user=7", "tokenA").await.unwrap());
    assert!(store.exists(&lock_key(LOCK_NS, "user=7")).await.unwrap());

    assert!(locks.unlock(LOCK_NS, "user=7", "tokenB").await.unwrap());
    assert!(!store.exists(&lock_key(LOCK_NS, "user=7")).await.unwrap());
}

#[tokio::test]
async fn remove_loses_to_a_concurrent_reschedule() {
    let registry = JobRegistry::new(MemoryStore::new());
    let claimed = Job::new("user=3", 100);
    registry.add(JOB_NS, &claimed).await.unwrap();
    registry.add(JOB_NS, &Job::new("user=3", 200)).await.unwrap();

    assert!(!registry.remove(JOB_NS, &claimed).await.unwrap());
    assert_eq!(registry.due_time(JOB_NS, "user=3").await.unwrap(), Some(200));

    assert!(registry.remove(JOB_NS, &Job::new("user=3", 200)).await.unwrap());
    assert_eq!(registry.due_time(JOB_NS, "user=3").await.unwrap(), None);
}

#[tokio::test]
async fn expired_lease_is_claimable_by_another_owner() {
    let queue = JobQueue::new(MemoryStore::new(), JOB_NS, LOCK_NS);
    queue.push(&Job::new("user=5", 5)).await.unwrap();

    let first = queue.claim("workerA", Duration::from_millis(50)).await.unwrap();
    assert_eq!(first, Some(Job::new("user=5", 5)));
    assert_eq!(queue.claim("workerB", Duration::from_secs(5)).await.unwrap(), None);

    tokio::time::sleep(Duration::from_millis(120)).await;

    let second = queue.claim("workerB", Duration::from_secs(5)).await.unwrap();
    assert_eq!(second, Some(Job::new("user=5", 5)));
    assert_eq!(queue.lease_owner(&Job::new("user=5", 5)).await.unwrap().as_deref(), Some("workerB"));
}

#[tokio::test]
async fn claim_unlock_reclaim_scenario() {
    let store = MemoryStore::new();
    let registry = JobRegistry::new(store.clone());
    let scanner = JobScanner::new(store.clone());
    let locks = LockManager::new(store.clone());

    registry.add("jobs", &Job::new("user=42", 100)).await.unwrap();

    let found = scanner
        .find_and_lock("jobs", "lock:", "workerA", Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(found, Some(Job::new("user=42", 100)));
    assert_eq!(store.get("lock:user=42").await.unwrap().as_deref(), Some("workerA"));

    let none = scanner
        .find_and_lock("jobs", "lock:", "workerB", Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(none, None);

    assert!(locks.unlock("lock:", "user=42", "workerA").await.unwrap());
    assert!(!store.exists("lock:user=42").await.unwrap());

    let again = scanner
        .find_and_lock("jobs", "lock:", "workerB", Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(again, Some(Job::new("user=42", 100)));
}

#[tokio::test]
async fn tagged_job_names_survive_the_registry() {
    let queue = JobQueue::new(MemoryStore::new(), JOB_NS, LOCK_NS);
    let job = Job::from_tags([("user", "42"), ("kind", "digest")], 300);
    queue.push(&job).await.unwrap();

    let claimed = queue.claim("w", Duration::from_secs(5)).await.unwrap().unwrap();
    assert_eq!(claimed.tags(), vec![("user", "42"), ("kind", "digest")]);
}
