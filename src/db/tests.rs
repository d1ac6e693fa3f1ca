//! Database layer tests over a temporary SQLite file.

use super::*;
use crate::types::CampaignStatus;

async fn test_db() -> (Database, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = Database::new(&dir.path().join("test.db"))
        .await
        .expect("database");
    (db, dir)
}

fn text_campaign(text: &str) -> NewCampaign {
    NewCampaign {
        content_type: "text".into(),
        text: text.into(),
        media_ref: None,
    }
}

#[tokio::test]
async fn insert_and_get_campaign() {
    let (db, _dir) = test_db().await;
    let id = db.insert_campaign(&text_campaign("hello")).await.unwrap();
    let campaign = db.get_campaign(id).await.unwrap().expect("campaign");
    assert_eq!(campaign.text, "hello");
    assert_eq!(campaign.content_type, "text");
    assert_eq!(CampaignStatus::from_i32(campaign.status), CampaignStatus::Pending);
    assert_eq!(campaign.sent_count, 0);
    assert!(campaign.completed_at.is_none());
}

#[tokio::test]
async fn get_missing_campaign_returns_none() {
    let (db, _dir) = test_db().await;
    assert!(db.get_campaign(999).await.unwrap().is_none());
}

#[tokio::test]
async fn require_missing_campaign_fails() {
    let (db, _dir) = test_db().await;
    let err = db.require_campaign(999).await.unwrap_err();
    assert!(err.to_string().contains("999"), "got: {err}");
}

#[tokio::test]
async fn campaign_lifecycle_pending_processing_completed() {
    let (db, _dir) = test_db().await;
    let id = db.insert_campaign(&text_campaign("x")).await.unwrap();

    db.start_campaign(id, 50).await.unwrap();
    let campaign = db.require_campaign(id).await.unwrap();
    assert_eq!(
        CampaignStatus::from_i32(campaign.status),
        CampaignStatus::Processing
    );
    assert_eq!(campaign.total_recipients, 50);

    db.checkpoint_campaign(id, 20, 2).await.unwrap();
    let campaign = db.require_campaign(id).await.unwrap();
    assert_eq!(campaign.sent_count, 20);
    assert_eq!(campaign.failed_count, 2);

    db.complete_campaign(id, 47, 3).await.unwrap();
    let campaign = db.require_campaign(id).await.unwrap();
    assert_eq!(
        CampaignStatus::from_i32(campaign.status),
        CampaignStatus::Completed
    );
    assert_eq!(campaign.sent_count, 47);
    assert_eq!(campaign.failed_count, 3);
    assert!(campaign.completed_at.is_some());
}

#[tokio::test]
async fn interrupted_campaigns_are_listed_for_resume() {
    let (db, _dir) = test_db().await;
    let a = db.insert_campaign(&text_campaign("a")).await.unwrap();
    let b = db.insert_campaign(&text_campaign("b")).await.unwrap();
    let c = db.insert_campaign(&text_campaign("c")).await.unwrap();

    db.start_campaign(a, 10).await.unwrap();
    db.start_campaign(b, 10).await.unwrap();
    db.complete_campaign(b, 10, 0).await.unwrap();
    // c stays pending

    let interrupted = db.list_interrupted_campaigns().await.unwrap();
    let ids: Vec<i64> = interrupted.iter().map(|x| x.id).collect();
    assert_eq!(ids, vec![a], "only processing campaigns resume, not {c}");
}

#[tokio::test]
async fn update_campaign_content_replaces_media() {
    let (db, _dir) = test_db().await;
    let id = db.insert_campaign(&text_campaign("old")).await.unwrap();
    db.update_campaign_content(id, "photo", "new caption", Some(r#"{"kind":"remote","value":"f1"}"#))
        .await
        .unwrap();
    let campaign = db.require_campaign(id).await.unwrap();
    assert_eq!(campaign.content_type, "photo");
    assert_eq!(campaign.text, "new caption");
    assert!(campaign.media_ref.as_deref().unwrap().contains("f1"));
}

#[tokio::test]
async fn delivery_ledger_records_and_lists() {
    let (db, _dir) = test_db().await;
    let id = db.insert_campaign(&text_campaign("x")).await.unwrap();

    db.record_delivery(id, 100, 5001).await.unwrap();
    db.record_delivery(id, 101, 5002).await.unwrap();

    let delivered = db.delivered_recipients(id).await.unwrap();
    assert_eq!(delivered.len(), 2);
    assert!(delivered.contains(&100));
    assert!(delivered.contains(&101));

    let ledger = db.list_deliveries(id).await.unwrap();
    assert_eq!(ledger.len(), 2);
    assert!(ledger.iter().any(|d| d.recipient == 100 && d.message_id == 5001));
}

#[tokio::test]
async fn re_recording_a_delivery_is_idempotent() {
    let (db, _dir) = test_db().await;
    let id = db.insert_campaign(&text_campaign("x")).await.unwrap();

    db.record_delivery(id, 100, 5001).await.unwrap();
    db.record_delivery(id, 100, 5009).await.unwrap();

    let ledger = db.list_deliveries(id).await.unwrap();
    assert_eq!(ledger.len(), 1, "one row per (campaign, recipient)");
    assert_eq!(ledger[0].message_id, 5009, "latest message id wins");
}

#[tokio::test]
async fn deliveries_are_scoped_per_campaign() {
    let (db, _dir) = test_db().await;
    let a = db.insert_campaign(&text_campaign("a")).await.unwrap();
    let b = db.insert_campaign(&text_campaign("b")).await.unwrap();

    db.record_delivery(a, 100, 1).await.unwrap();
    db.record_delivery(b, 100, 2).await.unwrap();
    db.record_delivery(b, 200, 3).await.unwrap();

    assert_eq!(db.delivered_recipients(a).await.unwrap().len(), 1);
    assert_eq!(db.delivered_recipients(b).await.unwrap().len(), 2);
}

#[tokio::test]
async fn remove_and_clear_deliveries() {
    let (db, _dir) = test_db().await;
    let id = db.insert_campaign(&text_campaign("x")).await.unwrap();
    db.record_delivery(id, 100, 1).await.unwrap();
    db.record_delivery(id, 101, 2).await.unwrap();

    db.remove_delivery(id, 100).await.unwrap();
    assert_eq!(db.list_deliveries(id).await.unwrap().len(), 1);

    let cleared = db.clear_deliveries(id).await.unwrap();
    assert_eq!(cleared, 1);
    assert!(db.list_deliveries(id).await.unwrap().is_empty());
}

#[tokio::test]
async fn deleting_a_campaign_cascades_to_its_ledger() {
    let (db, _dir) = test_db().await;
    let id = db.insert_campaign(&text_campaign("x")).await.unwrap();
    db.record_delivery(id, 100, 1).await.unwrap();

    sqlx::query("DELETE FROM campaigns WHERE id = ?")
        .bind(id)
        .execute(db.pool())
        .await
        .unwrap();

    assert!(db.list_deliveries(id).await.unwrap().is_empty());
}

#[tokio::test]
async fn recipient_registry_is_idempotent_and_ordered() {
    let (db, _dir) = test_db().await;
    db.register_recipient(300).await.unwrap();
    db.register_recipient(100).await.unwrap();
    db.register_recipient(300).await.unwrap(); // duplicate

    assert_eq!(db.count_recipients().await.unwrap(), 2);
    let recipients = db.list_recipients().await.unwrap();
    assert_eq!(recipients.len(), 2);
    assert!(recipients.contains(&100));
    assert!(recipients.contains(&300));
}

#[tokio::test]
async fn removed_recipient_disappears_from_listing() {
    let (db, _dir) = test_db().await;
    db.register_recipient(100).await.unwrap();
    db.register_recipient(200).await.unwrap();
    db.remove_recipient(100).await.unwrap();

    let recipients = db.list_recipients().await.unwrap();
    assert_eq!(recipients, vec![200]);
}

#[tokio::test]
async fn migrations_are_idempotent_across_reopens() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("reopen.db");

    let db = Database::new(&path).await.unwrap();
    let id = db.insert_campaign(&text_campaign("survives")).await.unwrap();
    db.close().await;

    let db = Database::new(&path).await.unwrap();
    let campaign = db.require_campaign(id).await.unwrap();
    assert_eq!(campaign.text, "survives");
}
