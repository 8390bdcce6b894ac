mod common;

use std::sync::Arc;
use std::time::Duration;

use common::TestHarness;
use isovault::sync::scheduler::SyncScheduler;

const CLIENT_ID: i64 = 1;
const ROOT: &str = "root-folder";

// Long enough that only the immediate startup pass runs during a test.
const QUIET_INTERVAL: Duration = Duration::from_secs(3600);

fn scheduler_for(harness: &TestHarness) -> Arc<SyncScheduler> {
    Arc::new(SyncScheduler::new(harness.engine.clone(), QUIET_INTERVAL))
}

async fn wait_for_ingest(harness: &TestHarness, expected: usize) {
    for _ in 0..100 {
        if harness.repo.documents().len() >= expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!(
        "timed out waiting for {expected} ingested documents, have {}",
        harness.repo.documents().len()
    );
}

#[tokio::test]
async fn starting_a_timer_runs_an_immediate_pass() {
    let harness = TestHarness::new();
    harness.seed_tenant(CLIENT_ID, ROOT);
    harness.store.add_file(
        ROOT,
        "f1",
        "3.1_Manuale Operativo_Rev.1_2024-02-01.pdf",
        b"manual body",
    );

    let scheduler = scheduler_for(&harness);
    scheduler.start(CLIENT_ID).await;
    assert!(scheduler.is_running(CLIENT_ID).await);

    wait_for_ingest(&harness, 1).await;
    scheduler.stop(CLIENT_ID).await;
}

#[tokio::test]
async fn stop_is_idempotent() {
    let harness = TestHarness::new();
    harness.seed_tenant(CLIENT_ID, ROOT);

    let scheduler = scheduler_for(&harness);
    scheduler.start(CLIENT_ID).await;
    scheduler.stop(CLIENT_ID).await;
    assert!(!scheduler.is_running(CLIENT_ID).await);

    // Stopping an already stopped tenant must be a no-op.
    scheduler.stop(CLIENT_ID).await;
    assert!(!scheduler.is_running(CLIENT_ID).await);

    // So must stopping a tenant that never had a timer.
    scheduler.stop(999).await;
}

#[tokio::test]
async fn restart_replaces_the_existing_timer() {
    let harness = TestHarness::new();
    harness.seed_tenant(CLIENT_ID, ROOT);
    harness.store.add_file(
        ROOT,
        "f1",
        "3.1_Manuale Operativo_Rev.1_2024-02-01.pdf",
        b"manual body",
    );

    let scheduler = scheduler_for(&harness);
    scheduler.start(CLIENT_ID).await;
    scheduler.start(CLIENT_ID).await;
    assert!(scheduler.is_running(CLIENT_ID).await);

    // Both startup passes may run, but ingestion stays idempotent.
    wait_for_ingest(&harness, 1).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(harness.repo.documents().len(), 1);

    scheduler.stop(CLIENT_ID).await;
}

#[tokio::test]
async fn start_all_skips_tenants_without_an_admin() {
    let harness = TestHarness::new();
    harness.seed_tenant(1, ROOT);
    // Tenant 2 has no admin user and must not get a timer.
    harness.repo.add_client(common::make_client(2, Some(ROOT)));

    let scheduler = scheduler_for(&harness);
    scheduler.start_all().await;

    assert!(scheduler.is_running(1).await);
    assert!(!scheduler.is_running(2).await);

    scheduler.stop_all().await;
    assert!(!scheduler.is_running(1).await);
}
