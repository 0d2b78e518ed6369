use listing_uploads::config::SafetyMode;
use listing_uploads::entities::uploads::{self, UploadKind};
use listing_uploads::infrastructure::database;
use listing_uploads::services::attachment::AttachmentTracker;
use listing_uploads::services::reclaim::{ReclaimOutcome, SafeDeletePolicy};
use listing_uploads::services::scheduler::{DeferredDeletionScheduler, FireOutcome};
use listing_uploads::services::storage::{LocalStorageService, StorageService};
use listing_uploads::services::sweep::StrayReconciliationSweep;
use listing_uploads::services::upload_store::{UploadError, UploadStore};
use listing_uploads::entities::prelude::Uploads;
use sea_orm::{Database, EntityTrait, Set};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

struct Harness {
    _dir: tempfile::TempDir,
    storage: Arc<LocalStorageService>,
    store: UploadStore,
    policy: SafeDeletePolicy,
    scheduler: DeferredDeletionScheduler,
    tracker: AttachmentTracker,
}

impl Harness {
    async fn new(mode: SafetyMode, delay: Duration) -> Self {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        database::run_migrations(&db).await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(LocalStorageService::new(
            dir.path().join("uploaded"),
            dir.path().join("reclaimed"),
        ));
        storage.init().await.unwrap();

        let store = UploadStore::new(db);
        let policy = SafeDeletePolicy::new(storage.clone(), mode);
        let scheduler = DeferredDeletionScheduler::new(store.clone(), policy.clone(), delay);
        let tracker = AttachmentTracker::new(store.clone()).with_scheduler(scheduler.clone());

        Self {
            _dir: dir,
            storage,
            store,
            policy,
            scheduler,
            tracker,
        }
    }

    fn sweep(
        &self,
        interval: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> StrayReconciliationSweep {
        StrayReconciliationSweep::new(
            self.store.clone(),
            self.storage.clone(),
            self.policy.clone(),
            interval,
            shutdown,
        )
    }

    /// What the ingest handler does: write the file, then record it
    async fn ingest(&self, file_name: &str) -> uploads::Model {
        self.storage.save_file(file_name, b"image bytes").await.unwrap();
        self.store
            .create(&format!("/uploaded/{}", file_name), UploadKind::Picture, "user_1")
            .await
            .unwrap()
    }

    fn on_disk(&self, file_name: &str) -> bool {
        self.storage.upload_dir().join(file_name).exists()
    }

    fn in_holding(&self, file_name: &str) -> bool {
        self.storage.holding_dir().join(file_name).exists()
    }
}

#[tokio::test]
async fn test_sweep_reclaims_everything_not_attached() {
    let h = Harness::new(SafetyMode::Off, Duration::from_secs(1800)).await;

    // a.jpg has no record at all, c.jpg has an unattached one
    h.storage.save_file("a.jpg", b"a").await.unwrap();
    let b = h.ingest("b.jpg").await;
    let c = h.ingest("c.jpg").await;
    h.tracker.attach(&[b.path.clone()]).await.unwrap();

    let (_tx, rx) = watch::channel(false);
    let report = h.sweep(Duration::from_secs(1800), rx).run_cycle().await.unwrap();

    assert_eq!(report.scanned, 3);
    assert_eq!(report.kept, 1);
    assert_eq!(report.reclaimed, 2);
    assert_eq!(report.purged, 1);
    assert_eq!(report.failed, 0);

    assert!(!h.on_disk("a.jpg"));
    assert!(h.on_disk("b.jpg"));
    assert!(!h.on_disk("c.jpg"));
    assert!(h.store.find_by_id(&b.id).await.unwrap().is_some());
    assert!(h.store.find_by_id(&c.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_attached_upload_is_never_reclaimed() {
    let h = Harness::new(SafetyMode::On, Duration::from_secs(1800)).await;
    let upload = h.ingest("kept.png").await;
    h.tracker.attach(&[upload.path.clone()]).await.unwrap();

    let (_tx, rx) = watch::channel(false);
    let sweep = h.sweep(Duration::from_secs(1800), rx);
    for _ in 0..3 {
        sweep.run_cycle().await.unwrap();
    }
    assert_eq!(h.scheduler.fire(&upload.id).await, FireOutcome::Attached);
    assert_eq!(h.scheduler.fire(&upload.id).await, FireOutcome::Attached);

    let record = h.store.find_by_id(&upload.id).await.unwrap().unwrap();
    assert!(record.attached);
    assert!(h.on_disk("kept.png"));
    assert!(!h.in_holding("kept.png"));
}

#[tokio::test]
async fn test_timer_reclaims_unattached_upload() {
    let h = Harness::new(SafetyMode::On, Duration::from_millis(50)).await;
    let upload = h.ingest("orphan.png").await;

    h.scheduler.schedule(&upload.id);
    assert_eq!(h.scheduler.pending(), 1);

    tokio::time::sleep(Duration::from_millis(400)).await;

    assert_eq!(h.scheduler.pending(), 0);
    assert!(h.store.find_by_id(&upload.id).await.unwrap().is_none());
    assert!(!h.on_disk("orphan.png"));
    assert!(h.in_holding("orphan.png"));
}

#[tokio::test]
async fn test_attach_disarms_timer() {
    let h = Harness::new(SafetyMode::Off, Duration::from_millis(100)).await;
    let upload = h.ingest("claimed.png").await;

    h.scheduler.schedule(&upload.id);
    h.tracker.attach(&[upload.path.clone()]).await.unwrap();
    assert_eq!(h.scheduler.pending(), 0);

    tokio::time::sleep(Duration::from_millis(300)).await;

    assert!(h.store.find_by_id(&upload.id).await.unwrap().is_some());
    assert!(h.on_disk("claimed.png"));
}

#[tokio::test]
async fn test_timer_after_sweep_is_a_no_op() {
    let h = Harness::new(SafetyMode::On, Duration::from_secs(1800)).await;
    let upload = h.ingest("raced.png").await;

    let (_tx, rx) = watch::channel(false);
    let report = h.sweep(Duration::from_secs(1800), rx).run_cycle().await.unwrap();
    assert_eq!(report.reclaimed, 1);
    assert!(h.in_holding("raced.png"));

    assert_eq!(h.scheduler.fire(&upload.id).await, FireOutcome::Missing);
    assert!(!h.on_disk("raced.png"));
}

#[tokio::test]
async fn test_sweep_after_timer_finds_nothing() {
    let h = Harness::new(SafetyMode::On, Duration::from_secs(1800)).await;
    let upload = h.ingest("first.png").await;

    assert_eq!(
        h.scheduler.fire(&upload.id).await,
        FireOutcome::Reclaimed(ReclaimOutcome::Quarantined)
    );

    let (_tx, rx) = watch::channel(false);
    let report = h.sweep(Duration::from_secs(1800), rx).run_cycle().await.unwrap();
    assert_eq!(report.scanned, 0);
    assert_eq!(report.purged, 0);
    assert_eq!(report.reclaimed, 0);
}

#[tokio::test]
async fn test_safety_mode_decides_between_move_and_unlink() {
    for mode in [SafetyMode::Off, SafetyMode::On] {
        let h = Harness::new(mode, Duration::from_secs(1800)).await;
        let upload = h.ingest("photo.jpg").await;

        let outcome = h.scheduler.fire(&upload.id).await;

        assert!(!h.on_disk("photo.jpg"));
        match mode {
            SafetyMode::Off => {
                assert_eq!(outcome, FireOutcome::Reclaimed(ReclaimOutcome::Removed));
                assert!(!h.in_holding("photo.jpg"));
            }
            SafetyMode::On => {
                assert_eq!(outcome, FireOutcome::Reclaimed(ReclaimOutcome::Quarantined));
                assert!(h.in_holding("photo.jpg"));
            }
        }
    }
}

#[tokio::test]
async fn test_attach_is_all_or_nothing() {
    let h = Harness::new(SafetyMode::On, Duration::from_secs(1800)).await;
    let taken = h.ingest("taken.png").await;
    let free = h.ingest("free.png").await;
    h.tracker.attach(&[taken.path.clone()]).await.unwrap();

    let err = h
        .tracker
        .attach(&[free.path.clone(), taken.path.clone()])
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::AlreadyAttached(_)));

    let free = h.store.find_by_id(&free.id).await.unwrap().unwrap();
    assert!(!free.attached);
}

#[tokio::test]
async fn test_attach_unknown_path_fails() {
    let h = Harness::new(SafetyMode::On, Duration::from_secs(1800)).await;
    let upload = h.ingest("real.png").await;

    let err = h
        .tracker
        .attach(&[upload.path.clone(), "/uploaded/expired.png".to_string()])
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::NotFound(_)));

    let upload = h.store.find_by_id(&upload.id).await.unwrap().unwrap();
    assert!(!upload.attached);
}

#[tokio::test]
async fn test_attach_collapses_duplicate_paths() {
    let h = Harness::new(SafetyMode::On, Duration::from_secs(1800)).await;
    let upload = h.ingest("twice.png").await;

    let attached = h
        .tracker
        .attach(&[upload.path.clone(), upload.path.clone()])
        .await
        .unwrap();
    assert_eq!(attached.len(), 1);
    assert!(attached[0].attached);

    assert!(h.tracker.attach(&[]).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_store_operations() {
    let h = Harness::new(SafetyMode::On, Duration::from_secs(1800)).await;
    let one = h.ingest("one.png").await;
    let two = h.ingest("two.png").await;

    assert_eq!(one.file_name, "one.png");
    assert!(!one.attached);
    assert_eq!(
        h.store.find_by_path("/uploaded/one.png").await.unwrap().unwrap().id,
        one.id
    );

    let marked = h.store.mark_attached(&one.id).await.unwrap();
    assert!(marked.attached);
    assert!(matches!(
        h.store.mark_attached(&one.id).await,
        Err(UploadError::AlreadyAttached(_))
    ));
    assert!(matches!(
        h.store.mark_attached("missing").await,
        Err(UploadError::NotFound(_))
    ));

    assert_eq!(
        h.store.list_attached_paths().await.unwrap(),
        vec!["/uploaded/one.png".to_string()]
    );
    assert!(h.store.is_file_attached("one.png").await.unwrap());
    assert!(!h.store.is_file_attached("two.png").await.unwrap());

    // Attached records are out of reach of the conditional delete
    assert!(!h.store.delete_if_unattached(&one.id).await.unwrap());
    assert!(h.store.delete_if_unattached(&two.id).await.unwrap());
    assert!(!h.store.delete_if_unattached(&two.id).await.unwrap());

    h.store.delete(&one.id).await.unwrap();
    h.store.delete(&one.id).await.unwrap();
    assert!(h.store.find_by_id(&one.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_sweep_without_timers_still_reclaims() {
    // Simulates a restart: the record exists but its timer was lost
    let h = Harness::new(SafetyMode::Off, Duration::from_secs(1800)).await;
    let upload = h.ingest("lost_timer.png").await;
    assert_eq!(h.scheduler.pending(), 0);

    let (tx, rx) = watch::channel(false);
    let handle = h.sweep(Duration::from_millis(50), rx).start();

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(h.store.find_by_id(&upload.id).await.unwrap().is_none());
    assert!(!h.on_disk("lost_timer.png"));

    tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_shutdown_drops_pending_timers() {
    let h = Harness::new(SafetyMode::Off, Duration::from_millis(100)).await;
    let upload = h.ingest("pending.png").await;

    h.scheduler.schedule(&upload.id);
    h.scheduler.shutdown();
    assert_eq!(h.scheduler.pending(), 0);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(h.store.find_by_id(&upload.id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_sweep_survives_large_unattached_backlog() {
    let h = Harness::new(SafetyMode::Off, Duration::from_secs(1800)).await;

    // More rows than SQLite allows bind variables in one statement
    let total = 40_000;
    let rows: Vec<uploads::ActiveModel> = (0..total)
        .map(|i| uploads::ActiveModel {
            id: Set(format!("stale-{}", i)),
            path: Set(format!("/uploaded/stale-{}.png", i)),
            file_name: Set(format!("stale-{}.png", i)),
            upload_kind: Set(UploadKind::Picture),
            attached: Set(false),
            uploaded_by: Set("user_1".to_string()),
            created_at: Set(chrono::Utc::now()),
        })
        .collect();
    for chunk in rows.chunks(1000) {
        Uploads::insert_many(chunk.to_vec())
            .exec(h.store.connection())
            .await
            .unwrap();
    }

    let kept = h.ingest("kept.png").await;
    h.tracker.attach(&[kept.path.clone()]).await.unwrap();
    h.storage.save_file("stray.png", b"stray").await.unwrap();

    let (_tx, rx) = watch::channel(false);
    let report = h.sweep(Duration::from_secs(1800), rx).run_cycle().await.unwrap();

    assert_eq!(report.purged, total);
    assert_eq!(report.reclaimed, 1);
    assert_eq!(report.kept, 1);
    assert!(!h.on_disk("stray.png"));
    assert!(h.on_disk("kept.png"));
    assert!(h.store.find_by_id("stale-0").await.unwrap().is_none());
    assert!(h.store.find_by_id(&kept.id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_unreadable_directory_abandons_cycle_and_next_tick_retries() {
    let h = Harness::new(SafetyMode::Off, Duration::from_secs(1800)).await;
    let upload_dir = h.storage.upload_dir().to_path_buf();
    std::fs::remove_dir_all(&upload_dir).unwrap();

    let (tx, rx) = watch::channel(false);
    let sweep = h.sweep(Duration::from_millis(50), rx);
    assert!(sweep.run_cycle().await.is_err());

    let handle = sweep.start();
    // A few failing ticks
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(!handle.is_finished());

    std::fs::create_dir_all(&upload_dir).unwrap();
    h.storage.save_file("stray.png", b"stray").await.unwrap();
    tokio::time::sleep(Duration::from_millis(400)).await;

    assert!(!h.on_disk("stray.png"));

    tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .unwrap()
        .unwrap();
}
