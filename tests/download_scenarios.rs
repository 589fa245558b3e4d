// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! End-to-end download scenarios over a real data directory.
//!
//! Machine-level tests drive ticks by hand through `ManualScheduler`; the
//! manager tests run real tokio timers on a paused clock, so a ten tick
//! download takes no wall time.

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use grameen::catalog::discovery::parse_listing_at;
use grameen::catalog::SeedCatalog;
use grameen::download::{
    DownloadMachine, DownloadManager, DownloadStatus, ManualScheduler, ProgressStore, TickOutcome,
    TickSettings, WriteThrough, PROGRESS_KEY,
};
use grameen::error::Rejection;
use grameen::types::Language;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::time::{sleep, Instant};

fn machine_over(store: ProgressStore) -> (DownloadMachine, ManualScheduler) {
    let timers = ManualScheduler::new();
    let machine = DownloadMachine::new(
        Arc::new(SeedCatalog),
        store,
        Box::new(timers.clone()),
        TickSettings::default(),
    );
    (machine, timers)
}

fn stored_document(dir: &TempDir) -> Value {
    let path = dir.path().join(format!("{}.json", PROGRESS_KEY));
    let raw = fs::read_to_string(path).expect("progress document written");
    serde_json::from_str(&raw).expect("progress document is JSON")
}

async fn signed_in_manager(dir: &TempDir, user: &str) -> DownloadManager {
    let manager = DownloadManager::new(ProgressStore::open(dir.path()), TickSettings::default());
    manager
        .switch_session(Language::English, Some(user.to_string()))
        .await
        .unwrap();
    manager
}

// =============================================================================
// Machine over the file medium
// =============================================================================

#[test]
fn test_completed_download_lands_on_disk() {
    let temp = TempDir::new().unwrap();
    let (mut machine, timers) = machine_over(ProgressStore::open(temp.path()));
    machine.sign_in("asha");

    machine.start("1").unwrap();
    for _ in 0..9 {
        assert!(matches!(machine.tick("1"), TickOutcome::Progressed { .. }));
    }
    match machine.tick("1") {
        TickOutcome::Completed(t) => assert_eq!(t.write, WriteThrough::Persisted),
        other => panic!("expected completion, got {:?}", other),
    }
    assert_eq!(timers.active_count(), 0);

    assert_eq!(
        stored_document(&temp),
        json!({
            "asha": {
                "1": { "resourceId": "1", "downloadStatus": "downloaded", "progress": 100 }
            }
        })
    );
}

#[test]
fn test_cancel_persists_idle_record() {
    let temp = TempDir::new().unwrap();
    let (mut machine, timers) = machine_over(ProgressStore::open(temp.path()));
    machine.sign_in("asha");

    machine.start("2").unwrap();
    assert_eq!(machine.tick("2"), TickOutcome::Progressed { progress: 10 });
    machine.cancel("2").unwrap();
    assert_eq!(timers.active_for("2"), 0);

    // A tick that was already queued when the cancel ran.
    assert_eq!(machine.tick("2"), TickOutcome::Ignored);
    let item = machine.resource("2").unwrap();
    assert_eq!((item.status, item.progress), (DownloadStatus::Idle, 0));

    assert_eq!(
        stored_document(&temp)["asha"]["2"],
        json!({ "resourceId": "2", "downloadStatus": "idle", "progress": 0 })
    );
}

#[test]
fn test_progress_survives_restart_and_language_switch() {
    let temp = TempDir::new().unwrap();
    {
        let (mut machine, _timers) = machine_over(ProgressStore::open(temp.path()));
        machine.sign_in("asha");
        machine.start("3").unwrap();
        while !matches!(machine.tick("3"), TickOutcome::Completed(_)) {}
    }

    let (mut machine, _timers) = machine_over(ProgressStore::open(temp.path()));
    machine.switch_session(Language::Telugu, Some("asha".to_string()));
    let item = machine.resource("3").unwrap();
    assert_eq!((item.status, item.progress), (DownloadStatus::Downloaded, 100));
    assert_ne!(item.title, english_title("3"));

    // Another user on the same directory sees nothing.
    machine.switch_session(Language::Telugu, Some("ravi".to_string()));
    assert_eq!(machine.resource("3").unwrap().status, DownloadStatus::Idle);
}

fn english_title(id: &str) -> String {
    grameen::catalog::seed_resources(Language::English)
        .into_iter()
        .find(|r| r.id == id)
        .map(|r| r.title)
        .unwrap_or_default()
}

#[test]
fn test_stale_downloading_record_loads_as_idle() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join(format!("{}.json", PROGRESS_KEY));
    fs::write(
        &path,
        json!({
            "asha": {
                "5": { "resourceId": "5", "downloadStatus": "downloading", "progress": 40 },
                "6": { "resourceId": "6", "downloadStatus": "downloaded", "progress": 100 }
            }
        })
        .to_string(),
    )
    .unwrap();

    let (mut machine, timers) = machine_over(ProgressStore::open(temp.path()));
    machine.sign_in("asha");

    let five = machine.resource("5").unwrap();
    assert_eq!((five.status, five.progress), (DownloadStatus::Idle, 0));
    assert_eq!(machine.resource("6").unwrap().status, DownloadStatus::Downloaded);
    assert_eq!(timers.active_count(), 0);
    assert!(machine.start("5").is_ok());
}

#[test]
fn test_unauthenticated_start_writes_nothing() {
    let temp = TempDir::new().unwrap();
    let (mut machine, timers) = machine_over(ProgressStore::open(temp.path()));

    assert_eq!(machine.start("4"), Err(Rejection::AuthenticationRequired));
    assert_eq!(timers.active_count(), 0);
    assert!(!temp.path().join(format!("{}.json", PROGRESS_KEY)).exists());
}

// =============================================================================
// Manager with real timers (paused clock)
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_manager_completes_after_ten_ticks() {
    let temp = TempDir::new().unwrap();
    let manager = signed_in_manager(&temp, "asha").await;

    let began = Instant::now();
    let mut handle = manager.start("1").await.unwrap();
    assert_eq!(
        manager.get_progress("1").map(|r| r.status),
        Some(DownloadStatus::Downloading)
    );

    let done = handle.wait().await.unwrap();
    assert_eq!((done.status, done.progress), (DownloadStatus::Downloaded, 100));
    assert!(handle.is_complete());

    let elapsed = began.elapsed();
    assert!(elapsed >= Duration::from_millis(5000), "finished early: {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(5500), "finished late: {:?}", elapsed);

    let records = ProgressStore::open(temp.path()).get("asha");
    assert_eq!(records["1"].status, DownloadStatus::Downloaded);
    assert_eq!(records["1"].progress, 100);
    assert_eq!(manager.snapshot().counts().downloaded, 1);
}

#[tokio::test(start_paused = true)]
async fn test_manager_progress_updates_are_monotonic() {
    let temp = TempDir::new().unwrap();
    let manager = signed_in_manager(&temp, "asha").await;
    let mut handle = manager.start("6").await.unwrap();

    let mut seen = Vec::new();
    while let Some(item) = handle.next_update().await {
        assert!(item.is_consistent(), "inconsistent: {:?}", item);
        seen.push(item.progress);
        if item.status == DownloadStatus::Downloaded {
            break;
        }
    }
    assert!(seen.windows(2).all(|w| w[0] < w[1]), "progress went backwards: {:?}", seen);
    assert_eq!(seen.last(), Some(&100));
}

#[tokio::test(start_paused = true)]
async fn test_manager_cancel_after_one_tick() {
    let temp = TempDir::new().unwrap();
    let manager = signed_in_manager(&temp, "asha").await;
    manager.start("2").await.unwrap();

    sleep(Duration::from_millis(750)).await;
    assert_eq!(manager.get_progress("2").unwrap().progress, 10);

    let cancelled = manager.cancel("2").await.unwrap();
    assert_eq!(cancelled.status, DownloadStatus::Idle);
    assert_eq!(cancelled.write, WriteThrough::Persisted);
    assert!(manager.cancel("2").await.is_none(), "second cancel is a no-op");

    sleep(Duration::from_secs(3)).await;
    let item = manager.get_progress("2").unwrap();
    assert_eq!((item.status, item.progress), (DownloadStatus::Idle, 0));

    let record = &ProgressStore::open(temp.path()).get("asha")["2"];
    assert_eq!((record.status, record.progress), (DownloadStatus::Idle, 0));
}

#[tokio::test(start_paused = true)]
async fn test_manager_rejections() {
    let temp = TempDir::new().unwrap();
    let manager = DownloadManager::new(ProgressStore::open(temp.path()), TickSettings::default());

    assert_eq!(manager.start("4").await.unwrap_err(), Rejection::AuthenticationRequired);
    assert!(ProgressStore::open(temp.path()).users().is_empty());

    manager
        .switch_session(Language::English, Some("asha".to_string()))
        .await
        .unwrap();
    assert_eq!(
        manager.start("99").await.unwrap_err(),
        Rejection::UnknownResource("99".to_string())
    );

    manager.start("4").await.unwrap();
    assert_eq!(
        manager.start("4").await.unwrap_err(),
        Rejection::AlreadyDownloading("4".to_string())
    );

    manager.shutdown().await.unwrap();
    sleep(Duration::from_millis(10)).await;
    assert_eq!(manager.start("5").await.unwrap_err(), Rejection::WorkerStopped);
}

#[tokio::test(start_paused = true)]
async fn test_manager_language_switch_keeps_downloads() {
    let temp = TempDir::new().unwrap();
    let manager = signed_in_manager(&temp, "asha").await;
    let english_title = manager.get_progress("4").unwrap().title;

    manager.start("4").await.unwrap().wait().await;
    manager.set_language(Language::Hindi).await.unwrap();

    let snapshot = manager.snapshot();
    assert_eq!(snapshot.language, Language::Hindi);
    assert_eq!(snapshot.identity.as_deref(), Some("asha"));
    let item = snapshot.resource("4").unwrap();
    assert_eq!((item.status, item.progress), (DownloadStatus::Downloaded, 100));
    assert_ne!(item.title, english_title);
}

#[tokio::test(start_paused = true)]
async fn test_manager_session_switch_stops_running_download() {
    let temp = TempDir::new().unwrap();
    let manager = signed_in_manager(&temp, "asha").await;
    let mut handle = manager.start("3").await.unwrap();

    sleep(Duration::from_millis(1100)).await;
    assert_eq!(manager.get_progress("3").unwrap().progress, 20);

    manager.sign_out().await.unwrap();
    let ended = handle.wait().await.unwrap();
    assert_eq!((ended.status, ended.progress), (DownloadStatus::Idle, 0));

    sleep(Duration::from_secs(10)).await;
    assert!(manager.snapshot().resources.iter().all(|r| r.status == DownloadStatus::Idle));
    // Intermediate progress is never written.
    assert!(!ProgressStore::open(temp.path()).get("asha").contains_key("3"));
}

#[tokio::test(start_paused = true)]
async fn test_manager_remove_then_download_again() {
    let temp = TempDir::new().unwrap();
    let manager = signed_in_manager(&temp, "asha").await;

    manager.start("5").await.unwrap().wait().await;
    assert_eq!(
        manager.start("5").await.unwrap_err(),
        Rejection::AlreadyDownloaded("5".to_string())
    );

    let removed = manager.remove("5").await.unwrap();
    assert_eq!(removed.status, DownloadStatus::Idle);
    assert!(manager.remove("5").await.is_none());
    assert_eq!(
        ProgressStore::open(temp.path()).get("asha")["5"].status,
        DownloadStatus::Idle
    );

    let done = manager.start("5").await.unwrap().wait().await.unwrap();
    assert_eq!(done.status, DownloadStatus::Downloaded);
}

#[tokio::test(start_paused = true)]
async fn test_manager_downloads_discovered_resource() {
    let temp = TempDir::new().unwrap();
    let manager = signed_in_manager(&temp, "asha").await;

    let listing = "---\nTitle: e-Shram\nDescription: Registration for unorganised workers.\nCategory: Government\nLink: https://eshram.gov.in\n---";
    let items = parse_listing_at(listing, 7).items().to_vec();
    assert_eq!(manager.add_discovered(items.clone()).await.unwrap(), 1);
    assert_eq!(manager.add_discovered(items).await.unwrap(), 0, "duplicates skipped");

    let snapshot = manager.snapshot();
    assert_eq!(snapshot.resources.len(), 7);
    assert_eq!(snapshot.resources[0].id, "web-7-0");

    let done = manager.start("web-7-0").await.unwrap().wait().await.unwrap();
    assert_eq!(done.status, DownloadStatus::Downloaded);

    // Discovered items do not survive a reload; their records do.
    manager.set_language(Language::Tamil).await.unwrap();
    assert!(manager.get_progress("web-7-0").is_none());
    assert_eq!(
        ProgressStore::open(temp.path()).get("asha")["web-7-0"].status,
        DownloadStatus::Downloaded
    );
}

#[tokio::test(start_paused = true)]
async fn test_subscriber_sees_every_tick() {
    let temp = TempDir::new().unwrap();
    let manager = signed_in_manager(&temp, "asha").await;
    let mut updates = manager.subscribe();
    updates.borrow_and_update();

    manager.start("5").await.unwrap();
    let mut steps = Vec::new();
    loop {
        updates.changed().await.unwrap();
        let item = updates.borrow_and_update().resource("5").cloned().unwrap();
        steps.push(item.progress);
        if item.status == DownloadStatus::Downloaded {
            break;
        }
    }
    assert_eq!(steps, vec![0, 10, 20, 30, 40, 50, 60, 70, 80, 90, 100]);
}

#[tokio::test(start_paused = true)]
async fn test_dropping_manager_stops_running_downloads() {
    let temp = TempDir::new().unwrap();
    let manager = signed_in_manager(&temp, "asha").await;
    let mut handle = manager.start("1").await.unwrap();
    sleep(Duration::from_millis(1200)).await;

    drop(manager);

    // A worker kept alive by its tick timers would finish the download
    // about four seconds later.
    let stopped = tokio::time::timeout(Duration::from_secs(1), handle.wait())
        .await
        .expect("worker kept running after the manager was dropped");
    assert_eq!(stopped, None);
    assert!(!handle.is_complete());
    assert!(ProgressStore::open(temp.path()).get("asha").get("1").is_none());
}
