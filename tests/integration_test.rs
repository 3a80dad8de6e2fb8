use async_trait::async_trait;
use botvisor::core::{
    ChangeEvent, EventKind, LaunchSpec, Launcher, ProcessBox, WorkerInbox, WorkerInput,
    WorkerProcess, WorkerState,
};
use botvisor::ipc::{DownMessage, UpMessage};
use botvisor::{ChannelError, Config, LaunchOptions, Supervisor, SupervisorError};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::{tempdir, NamedTempFile, TempDir};
use tokio::time::timeout;

#[derive(Default, Clone)]
struct FakeBots {
    sent: Arc<Mutex<Vec<DownMessage>>>,
    kills: Arc<AtomicUsize>,
    inboxes: Arc<Mutex<Vec<WorkerInbox>>>,
}

struct FakeBot {
    bots: FakeBots,
}

#[async_trait]
impl WorkerProcess for FakeBot {
    fn pid(&self) -> Option<u32> {
        Some(1)
    }

    async fn send(&mut self, message: &DownMessage) -> Result<(), ChannelError> {
        self.bots.sent.lock().unwrap().push(message.clone());
        Ok(())
    }

    fn interrupt(&mut self) -> anyhow::Result<()> {
        self.bots.kills.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl Launcher for FakeBots {
    async fn launch(
        &self,
        _spec: &LaunchSpec,
        inbox: WorkerInbox,
    ) -> Result<ProcessBox, SupervisorError> {
        self.inboxes.lock().unwrap().push(inbox);
        Ok(Box::new(FakeBot { bots: self.clone() }))
    }
}

impl FakeBots {
    fn sent(&self) -> Vec<DownMessage> {
        self.sent.lock().unwrap().clone()
    }

    fn kills(&self) -> usize {
        self.kills.load(Ordering::SeqCst)
    }

    fn launches(&self) -> usize {
        self.inboxes.lock().unwrap().len()
    }

    /// Plays the child side of the latest launch
    fn child(&self) -> WorkerInbox {
        self.inboxes.lock().unwrap().last().unwrap().clone()
    }
}

struct Harness {
    dir: TempDir,
    bots: FakeBots,
    supervisor: Supervisor,
    restarts: Arc<Mutex<Vec<String>>>,
}

impl Harness {
    fn new(names: &[&str]) -> Self {
        let dir = tempdir().unwrap();
        for name in names {
            std::fs::create_dir_all(dir.path().join("bots").join(name).join("plugins/foo"))
                .unwrap();
        }

        // relative bots dir anchored at the tempdir, the way main does it with cwd
        let mut config = Config::default();
        config.supervisor.bots_dir = PathBuf::from("bots");
        config.resolve_bots_dir(dir.path());
        config.watch.debounce_ms = 0;

        let bots = FakeBots::default();
        let mut supervisor = Supervisor::new(config, Arc::new(bots.clone()));

        let restarts = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&restarts);
        supervisor.bus_mut().on(EventKind::Restart, move |event| {
            seen.lock().unwrap().push(event.worker().to_string());
            Ok(())
        });

        Self {
            dir,
            bots,
            supervisor,
            restarts,
        }
    }

    fn path(&self, relative: &str) -> PathBuf {
        self.dir.path().join(relative)
    }

    async fn step(&mut self) {
        timeout(Duration::from_secs(5), self.supervisor.step())
            .await
            .expect("supervisor step timed out")
            .unwrap();
    }
}

fn apply(resolver: &Path) -> WorkerInput {
    WorkerInput::Message(UpMessage::PluginApply {
        resolver: resolver.to_string_lossy().into_owned(),
    })
}

fn dev() -> LaunchOptions {
    LaunchOptions {
        port: 8080,
        watch: true,
    }
}

#[tokio::test]
async fn scenario_a_plugin_change_is_hot_reloaded() {
    let mut h = Harness::new(&["alice"]);
    h.supervisor.start("alice", dev()).await.unwrap();

    let resolver = h.path("bots/alice/plugins/foo/index.js");
    h.bots.child().deliver(apply(&resolver));
    h.step().await;

    let worker = h.supervisor.worker("alice").unwrap();
    assert_eq!(worker.registry().len(), 1);
    assert_eq!(
        worker.registry().get(&resolver.to_string_lossy()),
        Some(h.path("bots/alice/plugins/foo").as_path())
    );

    h.bots
        .child()
        .deliver(WorkerInput::Changed(ChangeEvent::new(&resolver)));
    h.step().await;

    assert_eq!(
        h.bots.sent(),
        vec![DownMessage::PluginReload {
            resolver: resolver.to_string_lossy().into_owned()
        }]
    );
    assert_eq!(h.bots.kills(), 0);
    assert!(h.restarts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn scenario_b_tree_change_restarts_the_bot() {
    let mut h = Harness::new(&["alice"]);
    h.supervisor.start("alice", dev()).await.unwrap();

    h.bots
        .child()
        .deliver(apply(&h.path("bots/alice/plugins/foo/index.js")));
    h.step().await;

    h.bots.child().deliver(WorkerInput::Changed(ChangeEvent::new(
        h.path("bots/alice/package.json"),
    )));
    h.step().await;

    assert_eq!(h.bots.kills(), 1);
    assert!(h.bots.sent().is_empty());
    assert_eq!(*h.restarts.lock().unwrap(), vec!["alice".to_string()]);
    let worker = h.supervisor.worker("alice").unwrap();
    assert!(worker.registry().is_empty());
    assert_eq!(worker.state(), WorkerState::TornDown);

    // the subscription relaunches it with a clean registry
    h.step().await;
    assert_eq!(h.bots.launches(), 2);
    let worker = h.supervisor.worker("alice").unwrap();
    assert_eq!(worker.state(), WorkerState::Watching);
    assert!(worker.registry().is_empty());
}

#[tokio::test]
async fn scenario_c_no_watch_means_no_reaction() {
    let mut h = Harness::new(&["bob"]);
    h.supervisor
        .start("bob", LaunchOptions::default())
        .await
        .unwrap();

    let resolver = h.path("bots/bob/plugins/foo/index.js");
    h.bots.child().deliver(apply(&resolver));
    h.step().await;
    h.bots
        .child()
        .deliver(WorkerInput::Changed(ChangeEvent::new(&resolver)));
    h.step().await;
    h.bots.child().deliver(WorkerInput::Changed(ChangeEvent::new(
        h.path("bots/bob/package.json"),
    )));
    h.step().await;

    let worker = h.supervisor.worker("bob").unwrap();
    assert!(worker.watcher().is_none());
    assert!(worker.registry().is_empty());
    assert_eq!(worker.state(), WorkerState::NoWatcher);
    assert!(h.bots.sent().is_empty());
    assert_eq!(h.bots.kills(), 0);
    assert!(h.restarts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn change_inside_plugin_root_never_restarts() {
    let mut h = Harness::new(&["alice"]);
    h.supervisor.start("alice", dev()).await.unwrap();

    let first = h.path("bots/alice/plugins/foo/index.js");
    let second = h.path("bots/alice/plugins/foo/extra.js");
    h.bots.child().deliver(apply(&first));
    h.bots.child().deliver(apply(&second));
    h.step().await;
    h.step().await;

    h.bots.child().deliver(WorkerInput::Changed(ChangeEvent::new(
        h.path("bots/alice/plugins/foo/helpers/strings.js"),
    )));
    h.step().await;

    assert_eq!(h.bots.sent().len(), 2);
    assert_eq!(h.bots.kills(), 0);
    assert!(h.restarts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn missing_bot_is_not_found() {
    let mut h = Harness::new(&["alice"]);

    let err = h.supervisor.start("mallory", dev()).await.unwrap_err();
    assert!(matches!(err, SupervisorError::NotFound { .. }));
    assert!(err.to_string().contains("mallory"));
    assert_eq!(h.bots.launches(), 0);
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn real_file_write_triggers_reload() {
    let mut h = Harness::new(&["alice"]);
    let resolver = h.path("bots/alice/plugins/foo/index.js");
    std::fs::write(&resolver, "module.exports = 1\n").unwrap();

    h.supervisor.start("alice", dev()).await.unwrap();
    h.bots.child().deliver(apply(&resolver));
    h.step().await;

    std::fs::write(&resolver, "module.exports = 2\n").unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while h.bots.sent().is_empty() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "no reload after writing {:?}",
            resolver
        );
        h.step().await;
    }

    let expected = DownMessage::PluginReload {
        resolver: resolver.to_string_lossy().into_owned(),
    };
    assert!(h.bots.sent().iter().all(|m| *m == expected));
    assert_eq!(h.bots.kills(), 0);
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn relative_resolver_with_real_write_reloads() {
    let mut h = Harness::new(&["alice"]);
    let resolver = "bots/alice/plugins/foo/index.js";
    std::fs::write(h.path(resolver), "module.exports = 1\n").unwrap();

    h.supervisor.start("alice", dev()).await.unwrap();
    h.bots.child().deliver(WorkerInput::Message(UpMessage::PluginApply {
        resolver: resolver.to_string(),
    }));
    h.step().await;

    std::fs::write(h.path(resolver), "module.exports = 2\n").unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while h.bots.sent().is_empty() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "no reload after writing {}",
            resolver
        );
        h.step().await;
    }

    assert_eq!(
        h.bots.sent(),
        vec![DownMessage::PluginReload {
            resolver: resolver.to_string()
        }]
    );
    assert_eq!(h.bots.kills(), 0);
    assert!(h.restarts.lock().unwrap().is_empty());
    assert_eq!(
        h.supervisor.worker("alice").unwrap().state(),
        WorkerState::Watching
    );
}

#[tokio::test]
async fn test_config_from_file() {
    let config_content = r#"
[supervisor]
bots_dir = "workers"
program = "node"
args = []
dev_args = ["--watch-plugins"]
entry = "index.js"

[watch]
debounce_ms = 250
"#;

    let mut temp_file = NamedTempFile::new().expect("Failed to create temp file");
    temp_file
        .write_all(config_content.as_bytes())
        .expect("Failed to write to temp file");
    let temp_path = temp_file.path().to_str().unwrap();

    let config = Config::load(temp_path).await.expect("Failed to load config");

    assert_eq!(config.supervisor.bots_dir, PathBuf::from("workers"));
    assert_eq!(config.supervisor.program, "node");
    assert_eq!(config.launch_args(true), vec!["--watch-plugins", "index.js"]);
    assert_eq!(config.watch.debounce(), Duration::from_millis(250));
}

#[tokio::test]
async fn test_config_parse_error_is_reported() {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(b"[watch]\ndebounce_ms = \"soon\"\n").unwrap();

    let result = Config::load(temp_file.path().to_str().unwrap()).await;
    assert!(result.is_err());
}
