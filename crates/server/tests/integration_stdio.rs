use anyhow::Context as _;
use model_relay_test_support::{KillOnDrop, MockChatBackend, MockReply, chat_reply};
use serde_json::{Value, json};
use std::io::{Read as _, Write as _};
use std::process::{Command, Stdio};

const CATALOG: &str = r"
defaults:
  apiKeyEnv: RELAY_IT_KEY
  timeoutSecs: 5
backends:
  - tool: ask_mock
    label: Mock
    description: Ask the mock model.
    urlEnv: RELAY_IT_URL
  - tool: ask_unset
    label: Unset
    urlEnv: RELAY_IT_UNSET_URL
";

fn relay_command(workdir: &std::path::Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_model-relay"));
    cmd.current_dir(workdir)
        .env_remove("TRANSPORT")
        .env_remove("MODEL_RELAY_CATALOG")
        .env_remove("RELAY_IT_UNSET_URL")
        .env("RUST_LOG", "warn");
    cmd
}

#[tokio::test]
async fn stdio_session_lists_and_calls_tools() -> anyhow::Result<()> {
    let backend = MockChatBackend::start(MockReply::json(&chat_reply("relayed answer"))).await?;

    let workdir = tempfile::tempdir().context("create workdir")?;
    let catalog = workdir.path().join("catalog.yaml");
    std::fs::write(&catalog, CATALOG).context("write catalog")?;

    let mut child = relay_command(workdir.path())
        .arg("--catalog")
        .arg(&catalog)
        .env("RELAY_IT_URL", backend.url())
        .env("RELAY_IT_KEY", "it-secret")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .context("spawn model-relay")?;
    let mut stdin = child.stdin.take().context("child stdin")?;
    let mut stdout = child.stdout.take().context("child stdout")?;
    let _child = KillOnDrop(child);

    let requests = [
        json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {
            "protocolVersion": "2024-11-05",
            "capabilities": {},
            "clientInfo": {"name": "it", "version": "0"}
        }}),
        json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
        json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}),
        json!({"jsonrpc": "2.0", "id": 3, "method": "tools/call",
            "params": {"name": "ask_mock", "arguments": {"prompt": "hello there"}}}),
        json!({"jsonrpc": "2.0", "id": 4, "method": "tools/call",
            "params": {"name": "ask_unset", "arguments": {"prompt": "hello there"}}}),
    ];
    for r in &requests {
        writeln!(stdin, "{r}").context("write request")?;
    }
    drop(stdin);

    let out = tokio::task::spawn_blocking(move || {
        let mut out = String::new();
        stdout.read_to_string(&mut out).map(|_| out)
    })
    .await
    .context("join reader")?
    .context("read stdout")?;

    let replies: Vec<Value> = out
        .lines()
        .map(serde_json::from_str)
        .collect::<Result<_, _>>()
        .context("parse replies")?;
    assert_eq!(replies.len(), 4, "unexpected replies: {replies:?}");

    let reply = |id: i64| {
        replies
            .iter()
            .find(|r| r["id"] == json!(id))
            .cloned()
            .with_context(|| format!("missing reply {id}"))
    };

    assert_eq!(reply(1)?["result"]["protocolVersion"], json!("2024-11-05"));

    let listed = reply(2)?;
    let names: Vec<&str> = listed["result"]["tools"]
        .as_array()
        .context("tools array")?
        .iter()
        .filter_map(|t| t["name"].as_str())
        .collect();
    assert_eq!(names, vec!["convert_csv_to_json", "ask_mock", "ask_unset"]);

    let called = reply(3)?;
    assert_eq!(called["result"]["content"][0]["text"], json!("relayed answer"));
    let sent = backend.last_request().context("backend saw no request")?;
    assert_eq!(sent.authorization.as_deref(), Some("Bearer it-secret"));
    assert_eq!(
        sent.body,
        json!({"messages": [{"role": "user", "content": "hello there"}]})
    );

    let unset = reply(4)?;
    assert_eq!(unset["result"]["isError"], json!(true));
    assert_eq!(
        unset["result"]["content"][0]["text"],
        json!("Error: Unset API configuration missing on server (RELAY_IT_UNSET_URL not set).")
    );
    assert_eq!(backend.hits(), 1);

    Ok(())
}

#[test]
fn unsupported_transport_exits_with_failure() -> anyhow::Result<()> {
    let workdir = tempfile::tempdir().context("create workdir")?;
    let status = relay_command(workdir.path())
        .env("TRANSPORT", "sse")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .context("run model-relay")?;
    assert!(!status.success());
    Ok(())
}
