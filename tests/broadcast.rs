//! End-to-end broadcast campaign tests
//!
//! Covers fan-out through the job queue: full sends, per-recipient failure
//! isolation, delete-all idempotence, and crash resume via the delivery
//! ledger.

mod common;

use std::sync::Arc;

use common::{RecordingTransport, StubExtractor, start_orchestrator, test_config, wait_for_event};
use mediaq::progress::NullSink;
use mediaq::store::MemoryStore;
use mediaq::{Database, Event, Job, NewCampaign, Orchestrator, SubmitResult};

fn text_campaign(text: &str) -> NewCampaign {
    NewCampaign {
        content_type: "text".into(),
        text: text.into(),
        media_ref: None,
    }
}

#[tokio::test]
async fn broadcast_send_reaches_every_recipient() {
    let dir = tempfile::tempdir().unwrap();
    let transport = RecordingTransport::new();
    let orchestrator =
        start_orchestrator(dir.path(), StubExtractor::instant(), transport.clone()).await;
    let mut events = orchestrator.subscribe();

    for recipient in [100, 101, 102] {
        orchestrator.register_recipient(recipient).await.unwrap();
    }
    let id = orchestrator
        .create_campaign(&text_campaign("big news"))
        .await
        .unwrap();

    orchestrator
        .submit(Job::BroadcastSend { campaign_id: id }, Arc::new(NullSink))
        .await
        .unwrap();

    let completed = wait_for_event(&mut events, "campaign completion", |e| {
        matches!(e, Event::CampaignCompleted { .. })
    })
    .await;
    match completed {
        Event::CampaignCompleted {
            campaign_id,
            sent,
            failed,
        } => {
            assert_eq!(campaign_id, id);
            assert_eq!(sent, 3);
            assert_eq!(failed, 0);
        }
        _ => unreachable!(),
    }

    let sends = transport.sends.lock().unwrap();
    assert_eq!(sends.len(), 3);
    assert!(sends.iter().all(|(_, text)| text == "big news"));
}

#[tokio::test]
async fn one_unreachable_recipient_does_not_abort_the_campaign() {
    let dir = tempfile::tempdir().unwrap();
    let transport = RecordingTransport::new();
    transport.unreachable.lock().unwrap().insert(101);
    let orchestrator =
        start_orchestrator(dir.path(), StubExtractor::instant(), transport.clone()).await;
    let mut events = orchestrator.subscribe();

    for recipient in [100, 101, 102] {
        orchestrator.register_recipient(recipient).await.unwrap();
    }
    let id = orchestrator
        .create_campaign(&text_campaign("partial"))
        .await
        .unwrap();
    orchestrator
        .submit(Job::BroadcastSend { campaign_id: id }, Arc::new(NullSink))
        .await
        .unwrap();

    let completed = wait_for_event(&mut events, "campaign completion", |e| {
        matches!(e, Event::CampaignCompleted { .. })
    })
    .await;
    match completed {
        Event::CampaignCompleted { sent, failed, .. } => {
            assert_eq!(sent, 2);
            assert_eq!(failed, 1);
        }
        _ => unreachable!(),
    }

    // the blocked recipient is dropped from the registry for future campaigns
    let remaining = orchestrator.database().list_recipients().await.unwrap();
    assert_eq!(remaining, vec![100, 102]);
}

#[tokio::test]
async fn delete_all_is_idempotent_through_the_job_queue() {
    let dir = tempfile::tempdir().unwrap();
    let transport = RecordingTransport::new();
    let orchestrator =
        start_orchestrator(dir.path(), StubExtractor::instant(), transport.clone()).await;
    let mut events = orchestrator.subscribe();

    for recipient in [100, 101] {
        orchestrator.register_recipient(recipient).await.unwrap();
    }
    let id = orchestrator
        .create_campaign(&text_campaign("to be deleted"))
        .await
        .unwrap();
    orchestrator
        .submit(Job::BroadcastSend { campaign_id: id }, Arc::new(NullSink))
        .await
        .unwrap();
    wait_for_event(&mut events, "campaign completion", |e| {
        matches!(e, Event::CampaignCompleted { .. })
    })
    .await;

    let submitted = orchestrator
        .submit(Job::BroadcastDelete { campaign_id: id }, Arc::new(NullSink))
        .await
        .unwrap();
    let SubmitResult::Accepted(first_delete_id) = submitted else {
        panic!("delete submission must be accepted");
    };
    wait_for_event(&mut events, "first delete", |e| {
        matches!(e, Event::JobFinished { id: fid, outcome } if *fid == first_delete_id && outcome == "succeeded")
    })
    .await;
    assert_eq!(transport.deletes.lock().unwrap().len(), 2);
    assert!(
        orchestrator
            .database()
            .list_deliveries(id)
            .await
            .unwrap()
            .is_empty()
    );

    // a second delete pass finds an empty ledger and does nothing
    let submitted = orchestrator
        .submit(Job::BroadcastDelete { campaign_id: id }, Arc::new(NullSink))
        .await
        .unwrap();
    let SubmitResult::Accepted(second_delete_id) = submitted else {
        panic!("delete submission must be accepted");
    };
    wait_for_event(&mut events, "second delete", |e| {
        matches!(e, Event::JobFinished { id: fid, outcome } if *fid == second_delete_id && outcome == "succeeded")
    })
    .await;
    assert_eq!(transport.deletes.lock().unwrap().len(), 2, "no re-deletes");
}

#[tokio::test]
async fn edit_updates_stored_campaign_content() {
    let dir = tempfile::tempdir().unwrap();
    let transport = RecordingTransport::new();
    let orchestrator =
        start_orchestrator(dir.path(), StubExtractor::instant(), transport.clone()).await;
    let mut events = orchestrator.subscribe();

    orchestrator.register_recipient(100).await.unwrap();
    let id = orchestrator
        .create_campaign(&text_campaign("draft wording"))
        .await
        .unwrap();
    orchestrator
        .submit(Job::BroadcastSend { campaign_id: id }, Arc::new(NullSink))
        .await
        .unwrap();
    wait_for_event(&mut events, "campaign completion", |e| {
        matches!(e, Event::CampaignCompleted { .. })
    })
    .await;

    let submitted = orchestrator
        .submit(
            Job::BroadcastEdit {
                campaign_id: id,
                new_text: "final wording".into(),
                new_media: None,
            },
            Arc::new(NullSink),
        )
        .await
        .unwrap();
    let SubmitResult::Accepted(edit_id) = submitted else {
        panic!("edit submission must be accepted");
    };
    wait_for_event(&mut events, "edit finish", |e| {
        matches!(e, Event::JobFinished { id: fid, outcome } if *fid == edit_id && outcome == "succeeded")
    })
    .await;

    let campaign = orchestrator.database().require_campaign(id).await.unwrap();
    assert_eq!(campaign.text, "final wording");
}

#[tokio::test]
async fn interrupted_campaign_resumes_on_startup() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());

    // simulate a previous process that crashed mid-dispatch: campaign in
    // Processing with one recipient already served
    let campaign_id = {
        let db = Database::new(&config.storage.database_path).await.unwrap();
        for recipient in [100, 101, 102] {
            db.register_recipient(recipient).await.unwrap();
        }
        let id = db.insert_campaign(&text_campaign("resumed")).await.unwrap();
        db.start_campaign(id, 3).await.unwrap();
        db.record_delivery(id, 100, 900).await.unwrap();
        db.checkpoint_campaign(id, 1, 0).await.unwrap();
        db.close().await;
        id
    };

    let transport = RecordingTransport::new();
    let orchestrator = Orchestrator::with_store(
        config,
        StubExtractor::instant(),
        transport.clone(),
        Some(Arc::new(MemoryStore::new())),
    )
    .await
    .unwrap();
    let mut events = orchestrator.subscribe();
    orchestrator.start().await.unwrap();

    let completed = wait_for_event(&mut events, "resumed completion", |e| {
        matches!(e, Event::CampaignCompleted { .. })
    })
    .await;
    match completed {
        Event::CampaignCompleted {
            campaign_id: id,
            sent,
            failed,
        } => {
            assert_eq!(id, campaign_id);
            assert_eq!(sent, 3, "final counters include pre-crash progress");
            assert_eq!(failed, 0);
        }
        _ => unreachable!(),
    }

    let resent: Vec<i64> = transport.sends.lock().unwrap().iter().map(|s| s.0).collect();
    assert_eq!(resent, vec![101, 102], "served recipient must not get a second copy");
}
