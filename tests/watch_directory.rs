//! End-to-end tests watching a real directory.

use async_trait::async_trait;
use hotswap_connections::prelude::*;
use parking_lot::Mutex;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;

#[derive(Default)]
struct Closes(AtomicUsize);

struct RecordingClient(Arc<Closes>);

#[async_trait]
impl DownstreamClient for RecordingClient {
    async fn refresh_connections_and_search_paths(&self) -> Result<RefreshResult> {
        Ok(RefreshResult::ok())
    }

    async fn close(&self) -> Result<()> {
        self.0.0.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct RecordingFactory(Arc<Closes>);

#[async_trait]
impl ClientFactory for RecordingFactory {
    async fn create(&self) -> Result<Box<dyn DownstreamClient>> {
        Ok(Box::new(RecordingClient(Arc::clone(&self.0))))
    }
}

fn write_connection(dir: &Path, name: &str, plugin: &str) {
    fs::write(
        dir.join(format!("{}.toml", name)),
        format!("[connection.{}]\nplugin = \"{}\"\n", name, plugin),
    )
    .unwrap();
}

async fn wait_for<F: Fn() -> bool>(condition: F, limit: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    condition()
}

struct Fixture {
    _temp_dir: TempDir,
    dir: std::path::PathBuf,
    watcher: ConnectionWatcher,
    maps: Arc<Mutex<Vec<ConnectionConfigMap>>>,
    global: Arc<GlobalConfig>,
    closes: Arc<Closes>,
}

fn start_watching() -> Fixture {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path().to_path_buf();
    write_connection(&dir, "aws", "acme/aws@latest");
    write_connection(&dir, "gcp", "acme/gcp@latest");

    let maps = Arc::new(Mutex::new(Vec::new()));
    let maps_clone = Arc::clone(&maps);
    let global = Arc::new(GlobalConfig::new());
    let closes = Arc::new(Closes::default());

    let watcher = ConnectionWatcher::builder()
        .with_config_dir(&dir)
        .with_debounce(Duration::from_millis(50))
        .with_global_config(Arc::clone(&global))
        .with_client_factory(Arc::new(RecordingFactory(Arc::clone(&closes))))
        .build(move |map| maps_clone.lock().push(map))
        .unwrap();

    Fixture {
        _temp_dir: temp_dir,
        dir,
        watcher,
        maps,
        global,
        closes,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_startup_does_not_reload() {
    let fixture = start_watching();

    // Startup batch is delivered and swallowed.
    assert!(
        wait_for(
            || fixture.watcher.orchestrator().past_first_event(),
            Duration::from_secs(5)
        )
        .await
    );
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(fixture.maps.lock().is_empty());
    assert!(fixture.global.current().is_none());
    fixture.watcher.close();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_file_change_reloads_connections() {
    let fixture = start_watching();
    assert!(
        wait_for(
            || fixture.watcher.orchestrator().past_first_event(),
            Duration::from_secs(5)
        )
        .await
    );

    write_connection(&fixture.dir, "gcp", "acme/gcp@v2");

    let maps = Arc::clone(&fixture.maps);
    assert!(wait_for(|| !maps.lock().is_empty(), Duration::from_secs(10)).await);

    let latest = fixture.maps.lock().last().cloned().unwrap();
    assert_eq!(latest.len(), 2);
    assert_eq!(latest["gcp"].plugin, "acme/gcp@v2");
    assert_eq!(latest["gcp"].plugin_short_name, "gcp");
    assert_eq!(latest["aws"].kind, "plugin");

    let global = Arc::clone(&fixture.global);
    assert!(wait_for(|| global.current().is_some(), Duration::from_secs(5)).await);

    let closes = Arc::clone(&fixture.closes);
    assert!(wait_for(|| closes.0.load(Ordering::SeqCst) >= 1, Duration::from_secs(5)).await);

    fixture.watcher.close();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unrelated_files_are_ignored() {
    let fixture = start_watching();
    assert!(
        wait_for(
            || fixture.watcher.orchestrator().past_first_event(),
            Duration::from_secs(5)
        )
        .await
    );

    fs::write(fixture.dir.join("notes.txt"), "not a config file").unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert!(fixture.maps.lock().is_empty());
    assert_eq!(fixture.watcher.orchestrator().batches_seen(), 1);
    fixture.watcher.close();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_close_stops_reloads() {
    let fixture = start_watching();
    assert!(
        wait_for(
            || fixture.watcher.orchestrator().past_first_event(),
            Duration::from_secs(5)
        )
        .await
    );

    fixture.watcher.close();
    fixture.watcher.close();
    assert!(!fixture.watcher.subscription().is_running());

    write_connection(&fixture.dir, "azure", "acme/azure");
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert!(fixture.maps.lock().is_empty());
    assert!(fixture.global.current().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_broken_file_keeps_watching() {
    let fixture = start_watching();
    assert!(
        wait_for(
            || fixture.watcher.orchestrator().past_first_event(),
            Duration::from_secs(5)
        )
        .await
    );

    fs::write(fixture.dir.join("aws.toml"), "[connection.aws\nplugin = ").unwrap();
    let orchestrator = fixture.watcher.orchestrator().clone();
    assert!(wait_for(|| orchestrator.batches_seen() >= 2, Duration::from_secs(10)).await);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(fixture.maps.lock().is_empty());

    // Fixing the file recovers on the next change.
    write_connection(&fixture.dir, "aws", "acme/aws@v3");
    let maps = Arc::clone(&fixture.maps);
    assert!(wait_for(|| !maps.lock().is_empty(), Duration::from_secs(10)).await);
    assert_eq!(fixture.maps.lock().last().unwrap()["aws"].plugin, "acme/aws@v3");

    fixture.watcher.close();
}
