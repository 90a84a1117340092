use assert_cmd::Command;
use predicates::prelude::*;
use std::fs::write;
use tempfile::NamedTempFile;

#[test]
fn help_lists_every_subcommand() {
    let mut cmd = Command::cargo_bin("fileset-sync").expect("Binary exists");
    cmd.arg("--help");
    cmd.assert().success().stdout(
        predicate::str::contains("apply")
            .and(predicate::str::contains("refresh"))
            .and(predicate::str::contains("destroy"))
            .and(predicate::str::contains("import")),
    );
}

#[test]
fn apply_fails_for_missing_config_file() {
    let mut cmd = Command::cargo_bin("fileset-sync").expect("Binary exists");
    cmd.arg("apply")
        .arg("--config")
        .arg("/definitely/not/here.yaml");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read config file"));
}

#[test]
fn apply_rejects_invalid_resource() {
    let config = NamedTempFile::new().expect("Creating temp config file failed");
    write(
        config.path(),
        b"resources:\n  site:\n    bucket: \"\"\n    glob: \"**/*\"\n",
    )
    .expect("Writing temp config failed");

    let mut cmd = Command::cargo_bin("fileset-sync").expect("Binary exists");
    cmd.arg("apply").arg("--config").arg(config.path());
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Resource `site` is invalid"));
}

#[test]
fn import_requires_identity_argument() {
    let mut cmd = Command::cargo_bin("fileset-sync").expect("Binary exists");
    cmd.args(["import", "site", "--config", "cfg.yaml"]);
    cmd.assert().failure();
}

use std::sync::{Arc, Mutex};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{layer::Context, Layer, Registry};

/// Custom Layer to collect emitted event messages.
struct EventCollector {
    events: Arc<Mutex<Vec<String>>>,
}

impl<S> Layer<S> for EventCollector
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        use std::fmt::Write as FmtWrite;
        let mut msg = String::new();
        let _ = write!(&mut msg, "{:?}", event);
        self.events.lock().unwrap().push(msg);
    }
}

#[tokio::test]
async fn emits_trace_initialised_event() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let collector = EventCollector {
        events: events.clone(),
    };
    let subscriber = Registry::default().with(collector);
    let _guard = tracing::subscriber::set_default(subscriber);

    use fileset_sync::cli::{run, Cli, Commands, Paths};

    let cli = Cli {
        command: Commands::Refresh {
            paths: Paths {
                config: std::path::PathBuf::from("dummy.yaml"),
                state: std::path::PathBuf::from("dummy.state.json"),
            },
        },
    };

    let _ = run(cli).await;

    let event_msgs = events.lock().unwrap();
    assert!(
        event_msgs.iter().any(|msg| msg.contains("trace_initialised")),
        "Expected a 'trace_initialised' trace event, got: {:?}",
        event_msgs
    );
}
