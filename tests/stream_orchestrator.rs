use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

const TARGET: &str = "AA:BB:CC:DD:EE:FF";
const TWO_DEVICES: &str = "AA:BB:CC:DD:EE:FF|WaWiCo;11:22:33:44:55:66|Kitchen Speaker";
const PAIRING_SHELL: usize = 0;
const GATT_SHELL: usize = 1;

fn orchestrator(launcher: &wawico::FakeShellLauncher) -> wawico::Orchestrator {
    let config = wawico::SessionConfig::builder()
        .discovery_timeout(Duration::from_secs(2))
        .build();
    wawico::Orchestrator::new(Arc::new(launcher.clone()), config)
}

async fn run_collecting(
    launcher: &wawico::FakeShellLauncher,
    max_frames: Option<usize>,
    cancel: &CancellationToken,
) -> (
    Result<wawico::StreamSummary, wawico::InteractionError>,
    Vec<wawico::StreamEvent>,
) {
    let mut events = Vec::new();
    let result = orchestrator(launcher)
        .run(max_frames, cancel, &mut |event: wawico::StreamEvent| {
            events.push(event)
        })
        .await;
    (result, events)
}

fn payloads(events: &[wawico::StreamEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            wawico::StreamEvent::Frame { frame, .. } => Some(frame.payload().to_string()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn streams_three_frames_then_disconnects_on_end_of_stream() -> anyhow::Result<()> {
    let launcher = wawico::fake_shell_launcher(
        wawico::FakeArgs::builder()
            .devices(TWO_DEVICES)?
            .frames("0a1b2c3d4e5f6071,0010203040506070,ffeeddccbbaa9988")?
            .build(),
    );

    let (result, events) = run_collecting(&launcher, None, &CancellationToken::new()).await;
    let summary = result?;

    let target = wawico::Device::new("WaWiCo", TARGET);
    assert_eq!(&target, summary.device());
    assert_eq!(3, summary.frames());
    assert_eq!(&wawico::StreamStopReason::Disconnected, summary.stop_reason());
    assert_eq!(
        vec!["0a1b2c3d4e5f6071", "0010203040506070", "ffeeddccbbaa9988"],
        payloads(&events)
    );
    assert!(payloads(&events).iter().all(|payload| payload.len() == 16));
    assert_eq!(
        Some(&wawico::StreamEvent::DeviceFound(target.clone())),
        events.first()
    );
    assert!(events.contains(&wawico::StreamEvent::Connected(target.clone())));
    assert_eq!(
        Some(&wawico::StreamEvent::Disconnected(target)),
        events.last()
    );

    let gatt = launcher.commands(GATT_SHELL);
    let tail: Vec<&str> = gatt.iter().rev().take(2).rev().map(String::as_str).collect();
    assert_eq!(vec!["back", "disconnect"], tail);
    assert!(launcher
        .commands(PAIRING_SHELL)
        .contains(&format!("connect {TARGET}")));
    Ok(())
}

#[tokio::test]
async fn closed_gatt_shell_hands_disconnect_to_pairing_shell() -> anyhow::Result<()> {
    let launcher = wawico::fake_shell_launcher(
        wawico::FakeArgs::builder()
            .devices(TWO_DEVICES)?
            .frames("0a1b2c3d4e5f6071")?
            .build(),
    );

    let (result, _events) = run_collecting(&launcher, None, &CancellationToken::new()).await;
    let summary = result?;

    assert_eq!(&wawico::StreamStopReason::Disconnected, summary.stop_reason());
    assert_eq!(None, launcher.connected());
    let pairing = launcher.commands(PAIRING_SHELL);
    assert_eq!(Some(&format!("disconnect {TARGET}")), pairing.last());
    Ok(())
}

#[tokio::test]
async fn non_frame_polls_are_skipped() -> anyhow::Result<()> {
    let launcher = wawico::fake_shell_launcher(
        wawico::FakeArgs::builder()
            .devices(TWO_DEVICES)?
            .noisy_polls(true)
            .build(),
    );

    let (result, events) = run_collecting(&launcher, None, &CancellationToken::new()).await;
    let summary = result?;

    assert_eq!(3, summary.frames());
    assert_eq!(&wawico::StreamStopReason::Disconnected, summary.stop_reason());
    assert_eq!(
        vec!["0a1b2c3d4e5f6071", "0010203040506070", "ffeeddccbbaa9988"],
        payloads(&events)
    );
    let polls = launcher
        .commands(GATT_SHELL)
        .iter()
        .filter(|line| line.is_empty())
        .count();
    assert_eq!(8, polls);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn cancellation_waits_for_the_poll_in_flight() -> anyhow::Result<()> {
    let launcher = wawico::fake_shell_launcher(
        wawico::FakeArgs::builder()
            .devices(TWO_DEVICES)?
            .poll_delay(Duration::from_secs(1))
            .build(),
    );
    let cancel = CancellationToken::new();
    let canceller = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            cancel.cancel();
        }
    });

    let (result, events) = run_collecting(&launcher, None, &cancel).await;
    canceller.await?;
    let summary = result?;

    assert_eq!(&wawico::StreamStopReason::Interrupted, summary.stop_reason());
    assert_eq!(vec!["0a1b2c3d4e5f6071"], payloads(&events));
    let gatt = launcher.commands(GATT_SHELL);
    let tail: Vec<&str> = gatt.iter().rev().take(3).rev().map(String::as_str).collect();
    assert_eq!(vec!["", "back", "disconnect"], tail);
    assert_eq!(None, launcher.connected());
    assert!(!launcher
        .commands(PAIRING_SHELL)
        .contains(&format!("disconnect {TARGET}")));
    Ok(())
}

#[tokio::test]
async fn blocked_radio_is_fatal() -> anyhow::Result<()> {
    let launcher = wawico::fake_shell_launcher(
        wawico::FakeArgs::builder()
            .devices(TWO_DEVICES)?
            .radio_blocked(true)
            .build(),
    );

    let (result, events) = run_collecting(&launcher, None, &CancellationToken::new()).await;

    assert_matches!(
        result,
        Err(wawico::InteractionError::Shell(
            wawico::ShellError::RadioUnblockStatus { .. }
        ))
    );
    assert!(events.is_empty());
    assert_eq!(1, launcher.radio_unblocks());
    assert_eq!(0, launcher.spawned());
    Ok(())
}

#[tokio::test]
async fn frame_limit_stops_and_disconnects_cleanly() -> anyhow::Result<()> {
    let launcher = wawico::fake_shell_launcher(
        wawico::FakeArgs::builder().devices(TWO_DEVICES)?.build(),
    );

    let (result, events) = run_collecting(&launcher, Some(2), &CancellationToken::new()).await;
    let summary = result?;

    assert_eq!(&wawico::StreamStopReason::ReachedLimit(2), summary.stop_reason());
    assert_eq!(2, payloads(&events).len());
    assert_eq!(None, launcher.connected());
    Ok(())
}

#[tokio::test]
async fn cancellation_interrupts_the_stream() -> anyhow::Result<()> {
    let launcher = wawico::fake_shell_launcher(
        wawico::FakeArgs::builder().devices(TWO_DEVICES)?.build(),
    );
    let cancel = CancellationToken::new();
    cancel.cancel();

    let (result, events) = run_collecting(&launcher, None, &cancel).await;
    let summary = result?;

    assert_eq!(&wawico::StreamStopReason::Interrupted, summary.stop_reason());
    assert_eq!(0, summary.frames());
    assert!(payloads(&events).is_empty());
    assert!(launcher.commands(GATT_SHELL).contains(&"disconnect".to_string()));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn missing_target_fails_after_discovery_window() -> anyhow::Result<()> {
    let launcher = wawico::fake_shell_launcher(
        wawico::FakeArgs::builder()
            .devices("11:22:33:44:55:66|Kitchen Speaker")?
            .build(),
    );

    let (result, events) = run_collecting(&launcher, None, &CancellationToken::new()).await;

    assert_matches!(
        result,
        Err(wawico::InteractionError::TargetNotFound { name, window })
            if name == "WaWiCo" && window == Duration::from_secs(2)
    );
    assert!(events.is_empty());
    assert_eq!(1, launcher.spawned());
    let listings = launcher
        .commands(PAIRING_SHELL)
        .iter()
        .filter(|line| *line == "devices")
        .count();
    assert!(listings > 1, "discovery should re-list devices, got {listings}");
    Ok(())
}

#[tokio::test]
async fn refused_connect_never_opens_gatt_shell() -> anyhow::Result<()> {
    let launcher = wawico::fake_shell_launcher(
        wawico::FakeArgs::builder()
            .devices(TWO_DEVICES)?
            .connect_fails(true)
            .build(),
    );

    let (result, events) = run_collecting(&launcher, None, &CancellationToken::new()).await;

    assert_matches!(
        result,
        Err(wawico::InteractionError::ConnectFailed { address, outcome, .. })
            if address == TARGET && outcome == wawico::CommandOutcome::Rejected
    );
    assert_eq!(1, launcher.spawned());
    assert!(!events.iter().any(|event| matches!(event, wawico::StreamEvent::Connected(_))));
    Ok(())
}

#[tokio::test]
async fn existing_bond_is_evicted_before_connecting() -> anyhow::Result<()> {
    let launcher = wawico::fake_shell_launcher(
        wawico::FakeArgs::builder()
            .devices(TWO_DEVICES)?
            .paired("AA:BB:CC:DD:EE:FF|WaWiCo")?
            .build(),
    );

    let (result, _events) = run_collecting(&launcher, Some(1), &CancellationToken::new()).await;
    result?;

    let pairing = launcher.commands(PAIRING_SHELL);
    let remove = pairing
        .iter()
        .position(|line| *line == format!("remove {TARGET}"))
        .expect("stale bond should be removed");
    let connect = pairing
        .iter()
        .position(|line| *line == format!("connect {TARGET}"))
        .expect("target should be connected");
    assert!(remove < connect);
    Ok(())
}

#[tokio::test]
async fn each_shell_unblocks_the_radio_without_error() -> anyhow::Result<()> {
    let launcher = wawico::fake_shell_launcher(
        wawico::FakeArgs::builder().devices(TWO_DEVICES)?.build(),
    );

    let (result, _events) = run_collecting(&launcher, Some(1), &CancellationToken::new()).await;
    result?;

    assert_eq!(2, launcher.spawned());
    assert_eq!(2, launcher.radio_unblocks());
    Ok(())
}
