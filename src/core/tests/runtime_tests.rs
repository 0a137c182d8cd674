// src/core/tests/runtime_tests.rs

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use super::fakes::{item, keys, FakePlatform, FakeText, Harness, HarnessOptions, ImageBehavior};
use crate::core::runtime::{CycleOutcome, CycleReport};
use crate::memory::DurableCache;

fn completed(outcome: CycleOutcome) -> CycleReport {
    match outcome {
        CycleOutcome::Completed(report) => report,
        CycleOutcome::Skipped => panic!("cycle was skipped"),
    }
}

#[tokio::test]
async fn image_mention_gets_an_image_reply() {
    let platform =
        FakePlatform::with_items(vec![item("42", "alice", "@agentbot generate image of a sunset")]);
    let harness = Harness::new(Arc::clone(&platform), HarnessOptions::default());

    let report = completed(harness.orchestrator.run_cycle().await);

    assert_eq!(
        report,
        CycleReport {
            accepted: 1,
            replied: 1,
            ignored: 0,
            failed: 0,
        }
    );
    let replies = platform.replies();
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].reply_to.as_deref(), Some("42"));
    assert_eq!(replies[0].text, "what a view!");
    assert_eq!(replies[0].media.as_ref().unwrap().url, "https://cdn/x.png");
    assert_eq!(harness.images.requests.lock().unwrap()[0].prompt, "sunset");
    assert!(harness
        .cache
        .get(&keys().last_post())
        .await
        .unwrap()
        .is_some());

    // The same fetch next cycle brings nothing new
    let again = completed(harness.orchestrator.run_cycle().await);
    assert_eq!(again.accepted, 0);
    assert_eq!(platform.replies().len(), 1);
}

#[tokio::test]
async fn stale_mentions_cost_nothing() {
    let mut old = item("1", "alice", "@agentbot are you awake?");
    old.created_at_epoch_secs = Some(Utc::now().timestamp() - 3600);
    let platform = FakePlatform::with_items(vec![old]);
    let harness = Harness::new(Arc::clone(&platform), HarnessOptions::default());

    let report = completed(harness.orchestrator.run_cycle().await);

    assert_eq!(report.accepted, 0);
    assert!(platform.replies().is_empty());
    assert_eq!(harness.text.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn overlapping_fetch_replies_once() {
    let mention = item("7", "bob", "@agentbot hi there");
    let platform = FakePlatform::with_items(vec![mention.clone(), mention]);
    let harness = Harness::new(Arc::clone(&platform), HarnessOptions::default());

    let report = completed(harness.orchestrator.run_cycle().await);

    assert_eq!(report.accepted, 1);
    assert_eq!(platform.replies().len(), 1);
}

#[tokio::test]
async fn one_failing_item_does_not_stop_the_rest() {
    let platform = FakePlatform::with_items(vec![
        item("1", "alice", "@agentbot first"),
        item("2", "bob", "@agentbot second"),
        item("3", "carol", "@agentbot third"),
    ]);
    platform
        .fail_replies_to
        .lock()
        .unwrap()
        .insert("2".to_string());
    let harness = Harness::new(Arc::clone(&platform), HarnessOptions::default());

    let report = completed(harness.orchestrator.run_cycle().await);

    assert_eq!(report.accepted, 3);
    assert_eq!(report.replied, 2);
    assert_eq!(report.failed, 1);
    let targets: Vec<_> = platform
        .replies()
        .into_iter()
        .filter_map(|r| r.reply_to)
        .collect();
    assert_eq!(targets, vec!["1", "3"]);

    // Failed items are not retried
    let again = completed(harness.orchestrator.run_cycle().await);
    assert_eq!(again.accepted, 0);
}

#[tokio::test]
async fn image_failure_still_answers_with_text() {
    let platform = FakePlatform::with_items(vec![item("9", "dave", "@agentbot draw a whale")]);
    let harness = Harness::new(
        Arc::clone(&platform),
        HarnessOptions {
            images: ImageBehavior::Fail,
            ..HarnessOptions::default()
        },
    );

    let report = completed(harness.orchestrator.run_cycle().await);

    assert_eq!(report.replied, 1);
    let replies = platform.replies();
    assert!(replies[0].media.is_none());
    assert!(replies[0]
        .text
        .starts_with("Sorry, I couldn't make that image right now."));
    assert!(harness.storage.uploads.lock().unwrap().is_empty());
}

#[tokio::test]
async fn ignored_topical_item_is_not_reconsidered() {
    let platform = FakePlatform::with_items(vec![item("11", "erin", "gorgeous sunset tonight")]);
    let harness = Harness::new(
        Arc::clone(&platform),
        HarnessOptions {
            rolls: vec![0.99, 0.0],
            ..HarnessOptions::default()
        },
    );

    let report = completed(harness.orchestrator.run_cycle().await);
    assert_eq!(report.ignored, 1);

    // A winning roll would be next, but the item is already processed
    let again = completed(harness.orchestrator.run_cycle().await);
    assert_eq!(again.accepted, 0);
    assert!(platform.replies().is_empty());
    assert_eq!(harness.rng.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn text_failure_posts_the_apology() {
    let platform = FakePlatform::with_items(vec![item("12", "frank", "@agentbot you up?")]);
    let harness = Harness::new(
        Arc::clone(&platform),
        HarnessOptions {
            text: FakeText::failing(),
            ..HarnessOptions::default()
        },
    );

    completed(harness.orchestrator.run_cycle().await);

    let replies = platform.replies();
    assert_eq!(replies.len(), 1);
    assert!(!replies[0].text.trim().is_empty());
}

#[tokio::test]
async fn fetch_failure_is_an_empty_cycle() {
    let platform = FakePlatform::with_items(vec![item("13", "gina", "@agentbot hello")]);
    *platform.search_status.lock().unwrap() = Some(500);
    let harness = Harness::new(Arc::clone(&platform), HarnessOptions::default());

    let report = completed(harness.orchestrator.run_cycle().await);
    assert_eq!(report, CycleReport::default());

    *platform.search_status.lock().unwrap() = None;
    let report = completed(harness.orchestrator.run_cycle().await);
    assert_eq!(report.replied, 1);
}

#[tokio::test(start_paused = true)]
async fn overlapping_cycle_is_skipped() {
    let platform = FakePlatform::with_items(vec![item("14", "hal", "@agentbot slow day")]);
    *platform.search_delay.lock().unwrap() = Some(Duration::from_secs(5));
    let harness = Harness::new(
        Arc::clone(&platform),
        HarnessOptions {
            poll_timeout: Duration::from_secs(30),
            ..HarnessOptions::default()
        },
    );

    let orchestrator = Arc::clone(&harness.orchestrator);
    let first = tokio::spawn(async move { orchestrator.run_cycle().await });
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert!(harness.orchestrator.is_running());
    assert_eq!(harness.orchestrator.run_cycle().await, CycleOutcome::Skipped);

    let report = completed(first.await.unwrap());
    assert_eq!(report.replied, 1);
    assert!(!harness.orchestrator.is_running());
    assert_eq!(platform.searches.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn periodic_loop_keeps_polling() {
    let platform = FakePlatform::with_items(vec![item("15", "ivy", "@agentbot tick tock")]);
    let harness = Harness::new(Arc::clone(&platform), HarnessOptions::default());

    let runner = tokio::spawn(
        Arc::clone(&harness.orchestrator).run_periodically(Duration::from_secs(60)),
    );
    tokio::time::sleep(Duration::from_secs(150)).await;
    runner.abort();

    assert_eq!(platform.searches.load(Ordering::SeqCst), 3);
    assert_eq!(platform.replies().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn slow_cycle_turns_later_ticks_into_no_ops() {
    let platform = FakePlatform::with_items(vec![item("16", "jo", "@agentbot take your time")]);
    *platform.search_delay.lock().unwrap() = Some(Duration::from_secs(90));
    let harness = Harness::new(
        Arc::clone(&platform),
        HarnessOptions {
            poll_timeout: Duration::from_secs(120),
            ..HarnessOptions::default()
        },
    );

    let runner = tokio::spawn(
        Arc::clone(&harness.orchestrator).run_periodically(Duration::from_secs(60)),
    );
    // Ticks at 0s and 120s run; the 60s tick lands mid-cycle
    tokio::time::sleep(Duration::from_secs(150)).await;
    runner.abort();

    assert_eq!(platform.searches.load(Ordering::SeqCst), 2);
    assert_eq!(platform.replies().len(), 1);
}
