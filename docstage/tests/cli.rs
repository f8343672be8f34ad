use assert_cmd::Command;
use clap::Parser;
use docstage::cli::{build_stage_config, run, Cli, Commands};
use docstage_core::config::{RedirectSource, StageMode};
use predicates::prelude::*;
use std::fs::{read_to_string, write};
use tempfile::{tempdir, NamedTempFile};

fn docstage() -> Command {
    Command::cargo_bin("docstage").expect("Binary exists")
}

#[test]
fn help_lists_the_subcommands() {
    docstage()
        .arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("publish")
                .and(predicate::str::contains("redirects"))
                .and(predicate::str::contains("convert-redirects")),
        );
}

#[test]
fn redirects_subcommand_writes_compiled_rules() {
    let dir = tempdir().unwrap();
    let rules = dir.path().join("redirects.rules");
    let output = dir.path().join("compiled.htaccess");
    write(
        &rules,
        "define: versions v1 v2\n[*]: /${version}/a -> /${version}/b\ntemporary [v2]: /x -> /y\n",
    )
    .unwrap();

    docstage()
        .arg("redirects")
        .arg(&rules)
        .arg("-o")
        .arg(&output)
        .assert()
        .success();

    let compiled = read_to_string(&output).unwrap();
    assert!(compiled.contains("Redirect 301 /v1/a /v1/b"), "{compiled}");
    assert!(compiled.contains("Redirect 301 /v2/a /v2/b"), "{compiled}");
    assert!(compiled.contains("Redirect 302 /x /y"), "{compiled}");
}

#[test]
fn redirects_subcommand_reports_compilation_errors() {
    let dir = tempdir().unwrap();
    let rules = dir.path().join("redirects.rules");
    write(&rules, "[*]: /a -> /b\n").unwrap();

    docstage()
        .arg("redirects")
        .arg(&rules)
        .arg("-o")
        .arg(dir.path().join("out"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("line 1"));
    assert!(!dir.path().join("out").exists());
}

#[test]
fn convert_redirects_prints_rule_lines() {
    let input = NamedTempFile::new().expect("temp file");
    write(
        input.path(),
        "from: /old.txt\nto: /new.txt\noutputs:\n  - 'after-v2.6': 'manual'\n",
    )
    .unwrap();

    docstage()
        .arg("convert-redirects")
        .arg(input.path())
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "(v2.6-*]: manual/${version}/old.txt -> manual/${version}/new.txt",
        ));
}

#[test]
fn publish_requires_exactly_one_mode() {
    let dir = tempdir().unwrap();
    docstage()
        .arg("publish")
        .arg(dir.path())
        .arg("bucket")
        .assert()
        .failure();

    docstage()
        .arg("publish")
        .arg(dir.path())
        .arg("bucket")
        .arg("--stage")
        .arg("--deploy")
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be used with"));
}

#[test]
fn invalid_redirect_prefix_fails_before_contacting_the_store() {
    let dir = tempdir().unwrap();
    docstage()
        .arg("publish")
        .arg(dir.path())
        .arg("bucket")
        .arg("--deploy")
        .arg("--branch")
        .arg("master")
        .arg("--redirect-prefix")
        .arg("docs/(unclosed")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid --redirect-prefix pattern"));
}

#[test]
fn stage_config_reflects_flags() {
    let dir = tempdir().unwrap();
    let rules = dir.path().join("redirects.rules");
    let cli = Cli::try_parse_from([
        "docstage",
        "publish",
        dir.path().to_str().unwrap(),
        "docs-bucket",
        "--prefix",
        "manual",
        "--stage",
        "--branch",
        "feature",
        "--username",
        "alice",
        "--redirect-rules",
        rules.to_str().unwrap(),
        "--redirect-prefix",
        "manual/v[0-9]+",
    ])
    .unwrap();

    let Commands::Publish(args) = cli.command else {
        panic!("expected publish");
    };
    let config = build_stage_config(&args).unwrap();
    assert_eq!(config.mode, StageMode::Stage);
    assert_eq!(config.namespace(), "manual/alice/feature");
    assert_eq!(config.redirects, Some(RedirectSource::Rules(rules)));
    assert!(config.owns_redirect("manual/anything"));
    assert!(config.owns_redirect("manual/v5/page"));
    assert!(!config.owns_redirect("other/page"));
}

#[test]
fn htaccess_and_rule_sources_are_mutually_exclusive() {
    let result = Cli::try_parse_from([
        "docstage",
        "publish",
        ".",
        "bucket",
        "--deploy",
        "--redirects",
        ".htaccess",
        "--redirect-rules",
        "redirects.rules",
    ]);
    assert!(result.is_err());
}

use std::sync::{Arc, Mutex};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{layer::Context, Layer, Registry};

/// Collects emitted event messages.
struct EventCollector {
    events: Arc<Mutex<Vec<String>>>,
}

impl<S> Layer<S> for EventCollector
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        self.events.lock().unwrap().push(format!("{:?}", event));
    }
}

#[tokio::test]
async fn compiling_redirects_emits_a_trace_event() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let subscriber = Registry::default().with(EventCollector {
        events: events.clone(),
    });
    let _guard = tracing::subscriber::set_default(subscriber);

    let dir = tempdir().unwrap();
    let rules = dir.path().join("redirects.rules");
    write(&rules, "define: versions v1\n[v1]: /a -> /b\n").unwrap();

    let cli = Cli {
        verbose: false,
        command: Commands::Redirects {
            rules,
            output: dir.path().join("out"),
        },
    };
    run(cli).await.unwrap();

    let event_msgs = events.lock().unwrap();
    assert!(
        event_msgs.iter().any(|msg| msg.contains("Wrote redirects")),
        "Expected a 'Wrote redirects' trace event, got: {:?}",
        event_msgs
    );
}
