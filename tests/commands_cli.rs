use std::sync::Arc;

use clap::Parser;
use insta::assert_snapshot;
use pretty_assertions::assert_eq;

#[derive(Debug, Default)]
struct FakeTerminalClient;

impl wawico::TerminalClient for FakeTerminalClient {
    fn stdout_is_terminal(&self) -> bool {
        false
    }

    fn stderr_is_terminal(&self) -> bool {
        false
    }
}

async fn run_with_parsed_args(args: wawico::Args) -> anyhow::Result<String> {
    let output_format = args.output_format().unwrap_or(wawico::OutputFormat::Pretty);
    let config = args.session_config()?;
    let (command, maybe_fake_args) = args.into_command_and_fake_args()?;
    let launcher: Arc<dyn wawico::ShellLauncher> = match maybe_fake_args {
        Some(fake_args) => Arc::new(wawico::fake_shell_launcher(fake_args)),
        None => wawico::real_shell_launcher(),
    };

    let mut output = Vec::new();
    wawico::run_with_clients(
        command,
        config,
        &mut output,
        &FakeTerminalClient,
        launcher,
        output_format,
    )
    .await?;
    Ok(String::from_utf8(output)?)
}

async fn run_with_argv<const N: usize>(argv: [&str; N]) -> anyhow::Result<String> {
    run_with_parsed_args(wawico::Args::try_parse_from(argv)?).await
}

#[tokio::test]
async fn stream_command_prints_progress_frames_and_summary() -> anyhow::Result<()> {
    let fake = wawico::FakeArgs::builder()
        .devices("11:22:33:44:55:66|Kitchen Speaker;AA:BB:CC:DD:EE:FF|WaWiCo")?
        .build();
    let args = wawico::Args::new(wawico::Command::Stream(wawico::StreamArgs::new(Some(2))))
        .with_fake(fake);

    let stdout = run_with_parsed_args(args).await?;

    assert_snapshot!(stdout.trim_end(), @r"
    Found WaWiCo (AA:BB:CC:DD:EE:FF)
    Connecting to WaWiCo (AA:BB:CC:DD:EE:FF)
    Connected to WaWiCo (AA:BB:CC:DD:EE:FF), listening for data
    [0001] 0a1b2c3d4e5f6071
    [0002] 0010203040506070
    Disconnected from WaWiCo (AA:BB:CC:DD:EE:FF)

    Stopped: reached max frames (2) - decoded 2 frame(s) from WaWiCo
    ");
    Ok(())
}

#[tokio::test]
async fn stream_command_writes_json_lines() -> anyhow::Result<()> {
    let stdout = run_with_argv([
        "wawico",
        "--fake",
        "--fake-devices",
        "AA:BB:CC:DD:EE:FF|WaWiCo",
        "--fake-frames",
        "0a 1b 2c 3d 4e 5f 60 71",
        "--format",
        "json",
        "stream",
    ])
    .await?;

    let documents = stdout
        .lines()
        .map(serde_json::from_str::<serde_json::Value>)
        .collect::<Result<Vec<_>, _>>()?;
    let events: Vec<&str> = documents
        .iter()
        .filter_map(|document| document["event"].as_str())
        .collect();
    assert_eq!(
        vec!["device_found", "connecting", "connected", "frame", "disconnected"],
        events
    );
    assert_eq!("0a1b2c3d4e5f6071", documents[3]["frame"]["payload"]);
    let summary = documents.last().expect("summary line should be written");
    assert_eq!("disconnected", summary["stop_reason"]);
    assert_eq!(1, summary["frames"]);
    Ok(())
}

#[tokio::test]
async fn devices_command_renders_bond_state() -> anyhow::Result<()> {
    let stdout = run_with_argv([
        "wawico",
        "--fake",
        "--fake-devices",
        "AA:BB:CC:DD:EE:FF|WaWiCo;11:22:33:44:55:66|Kitchen Speaker",
        "--fake-paired",
        "11:22:33:44:55:66|Kitchen Speaker",
        "devices",
    ])
    .await?;

    assert_snapshot!(stdout.trim_end(), @r"
    Devices:
    ╭─────────────────┬───────────────────┬──────────────╮
    │ name            │ address           │ state        │
    ├─────────────────┼───────────────────┼──────────────┤
    │ WaWiCo          │ AA:BB:CC:DD:EE:FF │ discoverable │
    │ Kitchen Speaker │ 11:22:33:44:55:66 │ paired       │
    ╰─────────────────┴───────────────────┴──────────────╯
    ");
    Ok(())
}

#[tokio::test]
async fn devices_command_json_lists_discoverable_set() -> anyhow::Result<()> {
    let stdout = run_with_argv([
        "wawico",
        "--fake",
        "--fake-devices",
        "AA:BB:CC:DD:EE:FF|WaWiCo;11:22:33:44:55:66|Kitchen Speaker",
        "--fake-paired",
        "11:22:33:44:55:66|Kitchen Speaker",
        "--format",
        "json",
        "devices",
    ])
    .await?;

    let listing: serde_json::Value = serde_json::from_str(&stdout)?;
    assert_eq!(2, listing["available"].as_array().map_or(0, Vec::len));
    assert_eq!("WaWiCo", listing["discoverable"][0]["name"]);
    assert_eq!(1, listing["discoverable"].as_array().map_or(0, Vec::len));
    Ok(())
}

#[tokio::test]
async fn info_command_prints_shell_lines() -> anyhow::Result<()> {
    let stdout = run_with_argv([
        "wawico",
        "--fake",
        "--fake-devices",
        "AA:BB:CC:DD:EE:FF|WaWiCo",
        "info",
        "AA:BB:CC:DD:EE:FF",
    ])
    .await?;

    assert_snapshot!(stdout.trim_end(), @r"
    Device info: AA:BB:CC:DD:EE:FF
      Device AA:BB:CC:DD:EE:FF (public)
      Name: WaWiCo
      Alias: WaWiCo
      Paired: no
      Connected: no
    ");
    Ok(())
}

#[test]
fn info_command_rejects_malformed_address() {
    let result = wawico::Args::try_parse_from(["wawico", "info", "not-an-address"]);

    assert!(result.is_err());
}

#[tokio::test]
async fn stream_command_fails_when_target_is_missing() -> anyhow::Result<()> {
    let fake = wawico::FakeArgs::builder()
        .devices("11:22:33:44:55:66|Kitchen Speaker")?
        .build();
    let args = wawico::Args::new(wawico::Command::Stream(wawico::StreamArgs::new(None)))
        .with_fake(fake)
        .with_discovery_timeout(std::time::Duration::from_millis(100));

    let error = run_with_parsed_args(args)
        .await
        .expect_err("missing target should fail the run");

    assert!(error.to_string().contains("WaWiCo"));
    Ok(())
}

#[test]
fn fake_devices_reject_malformed_records() {
    let result = wawico::FakeArgs::builder().devices("invalid-record");

    assert!(matches!(
        result,
        Err(wawico::FixtureError::InvalidRecordFieldCount { .. })
    ));
}
