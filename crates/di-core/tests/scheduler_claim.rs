use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use di_core::scheduler::{Scheduler, SubmissionQueue};
use di_core::{Priority, Submission};

fn submission(id: i64, priority: Priority, minute: u32) -> Submission {
    Submission::new(
        id,
        1_000 + id,
        priority,
        Utc.with_ymd_and_hms(2025, 11, 12, 9, minute, 0).unwrap(),
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_workers_never_claim_the_same_submission() {
    let queue = Arc::new(SubmissionQueue::default());
    for id in 0..40 {
        let priority = match id % 3 {
            0 => Priority::High,
            1 => Priority::Medium,
            _ => Priority::Normal,
        };
        queue.enqueue(submission(id, priority, (id % 60) as u32));
    }

    let mut handles = Vec::new();
    for worker in 0..6 {
        let scheduler = Scheduler::new(queue.clone(), format!("worker-{worker}"));
        handles.push(tokio::spawn(async move {
            let mut claimed = Vec::new();
            while let Some(submission) = scheduler.claim_next().await.unwrap() {
                claimed.push(submission.id);
                tokio::task::yield_now().await;
            }
            claimed
        }));
    }

    let mut all = Vec::new();
    for handle in handles {
        all.extend(handle.await.unwrap());
    }

    let unique: BTreeSet<i64> = all.iter().copied().collect();
    assert_eq!(all.len(), 40, "a submission was claimed twice or skipped");
    assert_eq!(unique.len(), 40);
}

#[tokio::test]
async fn claim_order_is_priority_then_received_time_then_id() {
    let queue = Arc::new(SubmissionQueue::default());
    queue.enqueue(submission(7, Priority::Normal, 1));
    queue.enqueue(submission(3, Priority::Medium, 30));
    queue.enqueue(submission(9, Priority::High, 45));
    queue.enqueue(submission(4, Priority::Medium, 30));
    queue.enqueue(submission(2, Priority::High, 50));
    queue.enqueue(submission(1, Priority::Medium, 10));

    let scheduler = Scheduler::new(queue.clone(), "ordered");
    let mut order = Vec::new();
    while let Some(next) = scheduler.claim_next().await.unwrap() {
        order.push(next.id);
    }

    assert_eq!(order, vec![9, 2, 1, 3, 4, 7]);
    let claimed = queue.submission(3).unwrap();
    assert_eq!(claimed.claimed_by.as_deref(), Some("ordered"));
    assert!(claimed.claimed_at.is_some());
}

#[tokio::test]
async fn unreachable_queue_surfaces_as_transient_error() {
    let queue = Arc::new(SubmissionQueue::default());
    queue.enqueue(submission(1, Priority::High, 0));
    queue.set_unavailable(true);
    let scheduler = Scheduler::new(queue.clone(), "w");

    assert!(scheduler.claim_next().await.is_err());
    assert!(!queue.submission(1).unwrap().claimed);

    queue.set_unavailable(false);
    assert_eq!(scheduler.claim_next().await.unwrap().map(|s| s.id), Some(1));
}
