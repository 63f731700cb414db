use std::time::Duration;

use rag_ingest::application::services::{ExponentialBackoff, RetryPolicy, TaskError};
use rag_ingest::domain::TaskMessage;

fn delay(policy: &ExponentialBackoff, retried: u32) -> Duration {
    policy.retry_delay(
        retried,
        &TaskError::failed("boom"),
        &TaskMessage::new("test:task", vec![]),
    )
}

#[test]
fn given_default_policy_when_computing_delays_then_doubles_each_minute_until_cap() {
    let policy = ExponentialBackoff::default();

    let delays: Vec<u64> = (0..6).map(|n| delay(&policy, n).as_secs()).collect();

    assert_eq!(delays, vec![60, 120, 240, 480, 600, 600]);
}

#[test]
fn given_huge_retry_count_when_computing_delay_then_capped_without_overflow() {
    let policy = ExponentialBackoff::new(Duration::from_secs(90));

    assert_eq!(delay(&policy, 200), Duration::from_secs(90));
    assert_eq!(delay(&policy, 0), Duration::from_secs(60));
}
