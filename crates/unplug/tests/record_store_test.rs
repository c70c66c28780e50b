//! End-to-end tests of the incremental record store against the in-memory
//! backend: initial load, confirmed writes, change-event merging, teardown.

mod common;

use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tokio::time::sleep;

use common::{harness, object, RecordingRemote};
use unplug::{Phase, RealityCheckStore};
use unplug_api::{
    NewRealityCheck, OwnedRecord, RealityCheck, RealityCheckPatch, RemoteClient, Row, RowMatch,
    SyncError,
};

async fn seed_check(remote: &RecordingRemote, id: &str, owner: &str, days_ago: i64) -> Result<()> {
    let created = Utc::now() - chrono::Duration::days(days_ago);
    remote
        .insert_row(
            RealityCheck::TABLE,
            object(serde_json::json!({
                "id": id,
                "user_id": owner,
                "created_at": created,
                "title": format!("check {id}"),
                "mood": 3,
            })),
        )
        .await?;
    Ok(())
}

fn mood(mood: i32) -> RealityCheckPatch {
    RealityCheckPatch {
        mood: Some(mood),
        ..Default::default()
    }
}

#[tokio::test]
async fn load_orders_records_newest_first_and_derives_counts() -> Result<()> {
    let (remote, auth, ctx) = harness();
    auth.sign_in("u1");
    seed_check(&remote, "old", "u1", 10).await?;
    seed_check(&remote, "new", "u1", 0).await?;
    seed_check(&remote, "mid", "u1", 2).await?;
    seed_check(&remote, "theirs", "u2", 0).await?;

    let store = RealityCheckStore::new(ctx);
    store.load().await;

    assert_eq!(store.phase(), Phase::Ready);
    let snapshot = store.snapshot();
    let ids: Vec<_> = snapshot.records.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["new", "mid", "old"]);
    assert_eq!(snapshot.counts.week, 2);
    assert_eq!(snapshot.counts.month, 3);
    assert_eq!(snapshot.counts.total, 3);
    assert_eq!(snapshot.error, None);
    Ok(())
}

#[tokio::test]
async fn load_when_signed_out_resets_without_requests() {
    let (remote, _auth, ctx) = harness();
    let store = RealityCheckStore::new(ctx);
    store.load().await;

    assert_eq!(store.phase(), Phase::Uninitialized);
    assert!(store.snapshot().records.is_empty());
    assert_eq!(remote.fetch_count(), 0);
}

#[tokio::test]
async fn add_prepends_the_confirmed_record() -> Result<()> {
    let (remote, auth, ctx) = harness();
    auth.sign_in("u1");
    seed_check(&remote, "existing", "u1", 1).await?;

    let store = RealityCheckStore::new(ctx);
    store.load().await;

    let record = store
        .add(&NewRealityCheck {
            title: "late night scroll".to_string(),
            mood: 2,
            note: None,
        })
        .await?;
    assert!(!record.id.is_empty());
    assert_eq!(record.user_id, "u1");

    let snapshot = store.snapshot();
    assert_eq!(
        snapshot.records.first().map(|r| r.id.as_str()),
        Some(record.id.as_str())
    );
    assert_eq!(snapshot.counts.today, 1);
    assert_eq!(snapshot.counts.total, 2);
    assert_eq!(snapshot.error, None);

    // Our own write echoes back over the subscription; it must not duplicate.
    sleep(Duration::from_millis(50)).await;
    assert_eq!(store.snapshot().records.len(), 2);
    Ok(())
}

#[tokio::test]
async fn add_when_signed_out_fails_and_preserves_state() -> Result<()> {
    let (remote, auth, ctx) = harness();
    auth.sign_in("u1");
    seed_check(&remote, "a", "u1", 0).await?;

    let store = RealityCheckStore::new(ctx);
    store.load().await;
    auth.sign_out();

    let err = store
        .add(&NewRealityCheck::default())
        .await
        .expect_err("add without a user must fail");
    assert!(matches!(err, SyncError::AuthRequired));

    let snapshot = store.snapshot();
    assert_eq!(snapshot.records.len(), 1);
    assert!(snapshot.error.is_some());
    Ok(())
}

#[tokio::test]
async fn update_merges_the_patch_in_place() -> Result<()> {
    let (remote, auth, ctx) = harness();
    auth.sign_in("u1");
    seed_check(&remote, "a", "u1", 0).await?;
    seed_check(&remote, "b", "u1", 1).await?;

    let store = RealityCheckStore::new(ctx);
    store.load().await;

    assert!(store.update("b", &mood(5)).await?);

    let snapshot = store.snapshot();
    let ids: Vec<_> = snapshot.records.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b"]);
    let updated = &snapshot.records[1];
    assert_eq!(updated.mood, 5);
    assert_eq!(updated.title, "check b");
    assert_eq!(snapshot.error, None);
    Ok(())
}

#[tokio::test]
async fn update_of_a_missing_record_is_benign() -> Result<()> {
    let (remote, auth, ctx) = harness();
    auth.sign_in("u1");
    seed_check(&remote, "a", "u1", 0).await?;

    let store = RealityCheckStore::new(ctx);
    store.load().await;

    assert!(!store.update("ghost", &mood(5)).await?);

    let snapshot = store.snapshot();
    assert_eq!(snapshot.records.len(), 1);
    assert_eq!(snapshot.error, None);
    Ok(())
}

#[tokio::test]
async fn failed_update_keeps_the_previous_value() -> Result<()> {
    let (remote, auth, ctx) = harness();
    auth.sign_in("u1");
    seed_check(&remote, "a", "u1", 0).await?;

    let store = RealityCheckStore::new(ctx);
    store.load().await;

    remote.fail_updates(true);
    store
        .update("a", &mood(5))
        .await
        .expect_err("scripted failure must surface");

    let snapshot = store.snapshot();
    assert_eq!(snapshot.records[0].mood, 3);
    assert!(snapshot.error.is_some());
    Ok(())
}

#[tokio::test]
async fn mutations_are_scoped_to_the_signed_in_user() -> Result<()> {
    let (remote, auth, ctx) = harness();
    auth.sign_in("u1");
    seed_check(&remote, "mine", "u1", 0).await?;
    seed_check(&remote, "theirs", "u2", 0).await?;

    let store = RealityCheckStore::new(ctx);
    store.load().await;

    assert!(store.update("mine", &mood(5)).await?);
    assert_eq!(remote.last_matcher(), Some(RowMatch::new("mine", "u1")));

    // Another user's id only ever goes out with our own owner id attached,
    // so the backend matches nothing.
    assert!(!store.update("theirs", &mood(1)).await?);
    assert_eq!(remote.last_matcher(), Some(RowMatch::new("theirs", "u1")));

    assert!(store.remove("mine").await?);
    assert_eq!(remote.last_matcher(), Some(RowMatch::new("mine", "u1")));
    assert!(store.snapshot().records.is_empty());
    Ok(())
}

#[tokio::test]
async fn remote_changes_merge_in_arrival_order() -> Result<()> {
    let (remote, auth, ctx) = harness();
    auth.sign_in("u1");

    let store = RealityCheckStore::new(ctx);
    store.load().await;
    assert_eq!(store.phase(), Phase::Ready);

    // Insert from another session.
    seed_check(&remote, "r1", "u1", 0).await?;
    seed_check(&remote, "other", "u2", 0).await?;
    sleep(Duration::from_millis(50)).await;

    let snapshot = store.snapshot();
    assert_eq!(snapshot.records.len(), 1);
    assert_eq!(snapshot.records[0].id, "r1");
    assert_eq!(snapshot.counts.total, 1);

    // Update, then delete.
    let mut patch = Row::new();
    patch.insert("mood".to_string(), serde_json::json!(5));
    remote
        .update_rows(RealityCheck::TABLE, &RowMatch::new("r1", "u1"), patch)
        .await?;
    sleep(Duration::from_millis(50)).await;
    assert_eq!(store.snapshot().records[0].mood, 5);

    remote
        .delete_rows(RealityCheck::TABLE, &RowMatch::new("r1", "u1"))
        .await?;
    sleep(Duration::from_millis(50)).await;

    let snapshot = store.snapshot();
    assert!(snapshot.records.is_empty());
    assert_eq!(snapshot.counts.total, 0);
    Ok(())
}

#[tokio::test]
async fn dispose_stops_event_delivery() -> Result<()> {
    let (remote, auth, ctx) = harness();
    auth.sign_in("u1");

    let store = RealityCheckStore::new(ctx);
    store.load().await;
    store.dispose();
    assert_eq!(store.phase(), Phase::Disposed);

    seed_check(&remote, "late", "u1", 0).await?;
    sleep(Duration::from_millis(50)).await;
    assert!(store.snapshot().records.is_empty());

    // A disposed store stays disposed.
    store.load().await;
    assert_eq!(store.phase(), Phase::Disposed);
    Ok(())
}

#[tokio::test]
async fn user_switch_with_a_failed_load_drops_the_old_subscription() -> Result<()> {
    let (remote, auth, ctx) = harness();
    auth.sign_in("u1");

    let store = RealityCheckStore::new(ctx);
    store.load().await;
    assert_eq!(store.phase(), Phase::Ready);

    auth.sign_in("u2");
    remote.fail_fetches(true);
    store.load().await;
    assert_eq!(store.phase(), Phase::Error);
    assert!(store.snapshot().records.is_empty());

    // The previous user's channel is released even though the reload failed,
    // so their writes never reach the new session.
    seed_check(&remote, "leak", "u1", 0).await?;
    sleep(Duration::from_millis(50)).await;
    assert!(store.snapshot().records.is_empty());
    Ok(())
}

#[tokio::test]
async fn refresh_recovers_from_a_failed_load() -> Result<()> {
    let (remote, auth, ctx) = harness();
    auth.sign_in("u1");
    seed_check(&remote, "a", "u1", 0).await?;

    let store = RealityCheckStore::new(ctx);
    remote.fail_fetches(true);
    store.load().await;

    assert_eq!(store.phase(), Phase::Error);
    let snapshot = store.snapshot();
    assert!(snapshot.records.is_empty());
    assert!(snapshot.error.is_some());

    remote.fail_fetches(false);
    store.refresh().await;

    assert_eq!(store.phase(), Phase::Ready);
    let snapshot = store.snapshot();
    assert_eq!(snapshot.records.len(), 1);
    assert_eq!(snapshot.error, None);
    Ok(())
}
