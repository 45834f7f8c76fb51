mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{PROFILE_URL, StubPages, harness, page_without_bio, profile_page};
use jike_roast::error::AppError;

const HOUR: Duration = Duration::from_secs(3600);

#[tokio::test]
async fn miss_computes_and_second_request_hits_cache() {
    let h = harness(
        StubPages::default().with_page(PROFILE_URL, profile_page("小明")),
        &["modelA", "modelB"],
        HOUR,
        Duration::ZERO,
    );

    let first = h.service.roast(PROFILE_URL).await.unwrap();
    assert!(!first.cached);
    assert_eq!(first.entry.profile.nickname, "小明");
    assert_eq!(first.entry.profile.posts, vec!["又是开会的一天", "新买的键盘到了"]);
    assert_eq!(first.entry.outcomes.len(), 2);

    h.clock.advance(chrono::Duration::seconds(10));
    let second = h.service.roast(PROFILE_URL).await.unwrap();
    assert!(second.cached);
    assert!(Arc::ptr_eq(&first.entry, &second.entry));

    assert_eq!(h.pages.fetch_count(), 1);
    assert_eq!(h.models.call_count(), 2);
}

#[tokio::test]
async fn requests_past_the_ttl_recompute() {
    let h = harness(
        StubPages::default().with_page(PROFILE_URL, profile_page("小明")),
        &["modelA"],
        HOUR,
        Duration::ZERO,
    );

    let first = h.service.roast(PROFILE_URL).await.unwrap();
    h.clock.advance(chrono::Duration::seconds(3601));
    let second = h.service.roast(PROFILE_URL).await.unwrap();

    assert!(!first.cached);
    assert!(!second.cached);
    assert!(second.entry.created_at > first.entry.created_at);
    assert_eq!(h.pages.fetch_count(), 2);
    assert_eq!(h.models.call_count(), 2);
    assert_eq!(h.service.cache().stats().expirations, 1);
}

#[tokio::test]
async fn failing_model_is_reported_alongside_successes() {
    let h = harness(
        StubPages::default().with_page(PROFILE_URL, profile_page("小明")),
        &["modelA", "broken-modelB", "modelC"],
        HOUR,
        Duration::ZERO,
    );

    let result = h.service.roast(PROFILE_URL).await.unwrap();
    let outcomes = &result.entry.outcomes;

    assert_eq!(outcomes.len(), 3);
    assert!(!outcomes[0].is_error);
    assert!(outcomes[1].is_error);
    assert!(outcomes[1].text.contains("model overloaded"));
    assert!(!outcomes[2].is_error);
    assert_eq!(outcomes[2].text, "modelC says: nice keyboard");
}

#[tokio::test]
async fn extraction_failure_is_terminal_and_not_cached() {
    let h = harness(
        StubPages::default().with_page(PROFILE_URL, page_without_bio()),
        &["modelA"],
        HOUR,
        Duration::ZERO,
    );

    let err = h.service.roast(PROFILE_URL).await.unwrap_err();
    assert!(matches!(err, AppError::ExtractionError(_)));
    assert!(h.service.cache().is_empty());
    assert_eq!(h.models.call_count(), 0);

    // Nothing was cached, so the next request tries again.
    assert!(h.service.roast(PROFILE_URL).await.is_err());
    assert_eq!(h.pages.fetch_count(), 2);
}

#[tokio::test]
async fn fetch_failure_is_terminal() {
    let h = harness(StubPages::default(), &["modelA"], HOUR, Duration::ZERO);

    let err = h.service.roast("https://x/missing").await.unwrap_err();
    assert!(matches!(err, AppError::FetchError(_)));
    assert!(h.service.cache().is_empty());
    assert_eq!(h.service.in_flight_keys(), 0);
}

#[tokio::test]
async fn concurrent_requests_for_one_url_share_a_computation() {
    let h = harness(
        StubPages::default().with_page(PROFILE_URL, profile_page("小明")),
        &["modelA", "modelB"],
        HOUR,
        Duration::from_millis(100),
    );

    let requests: Vec<_> = (0..4)
        .map(|_| {
            let service = Arc::clone(&h.service);
            tokio::spawn(async move { service.roast(PROFILE_URL).await })
        })
        .collect();

    let mut computed = 0;
    for request in requests {
        let result = request.await.unwrap().unwrap();
        if !result.cached {
            computed += 1;
        }
    }

    assert_eq!(computed, 1);
    assert_eq!(h.pages.fetch_count(), 1);
    assert_eq!(h.models.call_count(), 2);
    assert_eq!(h.service.in_flight_keys(), 0);
}

#[tokio::test]
async fn concurrent_failures_for_one_url_leave_nothing_behind() {
    let h = harness(
        StubPages::default().with_page(PROFILE_URL, page_without_bio()),
        &["modelA", "modelB"],
        HOUR,
        Duration::from_millis(100),
    );

    let requests: Vec<_> = (0..4)
        .map(|_| {
            let service = Arc::clone(&h.service);
            tokio::spawn(async move { service.roast(PROFILE_URL).await })
        })
        .collect();

    for request in requests {
        let err = request.await.unwrap().unwrap_err();
        assert!(matches!(err, AppError::ExtractionError(_)));
    }

    // Each waiter finds nothing cached and tries for itself.
    assert_eq!(h.pages.fetch_count(), 4);
    assert_eq!(h.models.call_count(), 0);
    assert!(h.service.cache().is_empty());
    assert_eq!(h.service.in_flight_keys(), 0);
}

#[tokio::test]
async fn distinct_urls_are_cached_independently() {
    let other = "https://x/z";
    let h = harness(
        StubPages::default()
            .with_page(PROFILE_URL, profile_page("小明"))
            .with_page(other, profile_page("小红")),
        &["modelA"],
        HOUR,
        Duration::ZERO,
    );

    let (a, b) = tokio::join!(h.service.roast(PROFILE_URL), h.service.roast(other));
    assert_eq!(a.unwrap().entry.profile.nickname, "小明");
    assert_eq!(b.unwrap().entry.profile.nickname, "小红");
    assert_eq!(h.service.cache().len(), 2);
}

#[tokio::test]
async fn surrounding_whitespace_does_not_split_the_cache_key() {
    let h = harness(
        StubPages::default().with_page(PROFILE_URL, profile_page("小明")),
        &["modelA"],
        HOUR,
        Duration::ZERO,
    );

    h.service.roast(PROFILE_URL).await.unwrap();
    let again = h.service.roast("  https://x/y \n").await.unwrap();
    assert!(again.cached);
}
