//! Console View
//!
//! Line based presentation of the heart rate session. Reads commands from
//! stdin and publishes them as intents, prints the updates it receives.

use anyhow::Result;
use log::{trace, warn};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::{self, error::RecvError, Sender};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::core::events::{AppEvent, UiIntent, ViewUpdate};
use crate::model::bluetooth::{DeviceDescriptor, DeviceId};
use crate::model::session::AnimationCue;

pub const HELP: &str = "commands: scan | select <n|id> | start | pause | quit";

/// Parses a command line into an intent.
///
/// `select` accepts the 1-based position in the last printed device list or
/// a device id. Blank lines yield `Ok(None)`.
pub fn parse_command(line: &str, devices: &[DeviceDescriptor]) -> Result<Option<UiIntent>, String> {
    let mut words = line.split_whitespace();
    let Some(command) = words.next() else {
        return Ok(None);
    };
    let intent = match command.to_ascii_lowercase().as_str() {
        "scan" => UiIntent::OpenDiscovery,
        "start" => UiIntent::Start,
        "pause" => UiIntent::Pause,
        "quit" | "exit" => UiIntent::Shutdown,
        "select" => {
            let arg = words.next().ok_or("select needs a device number or id")?;
            let id = match arg.parse::<usize>() {
                Ok(n) => devices
                    .get(n.wrapping_sub(1))
                    .map(|d| d.id.clone())
                    .ok_or_else(|| format!("no device number {}", n))?,
                Err(_) => DeviceId::new(arg),
            };
            UiIntent::SelectDevice(id)
        }
        other => return Err(format!("unknown command '{}'", other)),
    };
    Ok(Some(intent))
}

/// Formats an update for the console.
pub fn render(update: &ViewUpdate) -> String {
    match update {
        ViewUpdate::DevicesDiscovered(devices) if devices.is_empty() => {
            "no devices discovered".to_owned()
        }
        ViewUpdate::DevicesDiscovered(devices) => devices
            .iter()
            .enumerate()
            .map(|(i, d)| format!("  {}) {}", i + 1, d))
            .collect::<Vec<_>>()
            .join("\n"),
        ViewUpdate::HeartRate(measurement) => match measurement.beat_interval() {
            Some(interval) => format!("{} (beat every {} ms)", measurement, interval.as_millis()),
            None => measurement.to_string(),
        },
        ViewUpdate::SessionState(state) => format!("session {}", state),
        ViewUpdate::Cue(AnimationCue::StartCue) => "pulse started".to_owned(),
        ViewUpdate::Cue(AnimationCue::StopCue) => "pulse stopped".to_owned(),
    }
}

pub struct ConsoleView {
    e_tx: Sender<AppEvent>,
    devices: Arc<RwLock<Vec<DeviceDescriptor>>>,
    printer: Option<JoinHandle<()>>,
}

impl ConsoleView {
    /// Creates the view and starts printing the updates of `view_rx`.
    pub fn new(e_tx: Sender<AppEvent>, mut view_rx: broadcast::Receiver<ViewUpdate>) -> Self {
        let devices = Arc::new(RwLock::new(Vec::new()));
        let known = devices.clone();
        let printer = tokio::spawn(async move {
            loop {
                let update = match view_rx.recv().await {
                    Ok(update) => update,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("View lagging, skipped {} updates.", skipped);
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };
                if let ViewUpdate::DevicesDiscovered(list) = &update {
                    *known.write().await = list.clone();
                }
                println!("{}", render(&update));
            }
        });
        Self {
            e_tx,
            devices,
            printer: Some(printer),
        }
    }

    fn publish(&self, intent: UiIntent) {
        trace!("Publishing {:?}.", intent);
        if let Err(e) = self.e_tx.send(AppEvent::Ui(intent)) {
            warn!("No event handler listening: {}", e);
        }
    }

    /// Reads commands until quit, end of input or ctrl-c. Always ends with a
    /// shutdown intent.
    pub async fn run(&self) -> Result<()> {
        println!("{}", HELP);
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            let line = tokio::select! {
                signal = tokio::signal::ctrl_c() => {
                    signal?;
                    break;
                }
                line = lines.next_line() => line?,
            };
            let Some(line) = line else { break };
            let devices = self.devices.read().await.clone();
            match parse_command(&line, &devices) {
                Ok(Some(UiIntent::Shutdown)) => break,
                Ok(Some(intent)) => self.publish(intent),
                Ok(None) => {}
                Err(e) => println!("{}\n{}", e, HELP),
            }
        }
        self.publish(UiIntent::Shutdown);
        Ok(())
    }

    /// Prints the remaining updates. Returns once every publisher is gone.
    pub async fn close(mut self) {
        if let Some(printer) = self.printer.take() {
            if let Err(e) = printer.await {
                warn!("View printer failed: {}", e);
            }
        }
    }
}

impl Drop for ConsoleView {
    fn drop(&mut self) {
        if let Some(printer) = &self.printer {
            printer.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::heartrate::HeartRateMeasurement;
    use crate::model::session::SessionState;

    fn devices() -> Vec<DeviceDescriptor> {
        vec![DeviceDescriptor {
            id: DeviceId::new("AA:BB:CC:DD:EE:FF"),
            name: Some("HRM-Sensor".into()),
            advertises_heart_rate: true,
        }]
    }

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!(parse_command("scan", &[]), Ok(Some(UiIntent::OpenDiscovery)));
        assert_eq!(parse_command(" START ", &[]), Ok(Some(UiIntent::Start)));
        assert_eq!(parse_command("pause", &[]), Ok(Some(UiIntent::Pause)));
        assert_eq!(parse_command("exit", &[]), Ok(Some(UiIntent::Shutdown)));
        assert_eq!(parse_command("   ", &[]), Ok(None));
        assert!(parse_command("connect", &[]).is_err());
    }

    #[test]
    fn test_parse_select() {
        let id = DeviceId::new("AA:BB:CC:DD:EE:FF");
        assert_eq!(
            parse_command("select 1", &devices()),
            Ok(Some(UiIntent::SelectDevice(id.clone())))
        );
        assert_eq!(
            parse_command("select AA:BB:CC:DD:EE:FF", &[]),
            Ok(Some(UiIntent::SelectDevice(id)))
        );
        assert!(parse_command("select 0", &devices()).is_err());
        assert!(parse_command("select 2", &devices()).is_err());
        assert!(parse_command("select", &devices()).is_err());
    }

    #[tokio::test]
    async fn test_close_drains_remaining_updates() {
        let (e_tx, _) = broadcast::channel(4);
        let (view_tx, view_rx) = broadcast::channel(4);
        let view = ConsoleView::new(e_tx, view_rx);
        let known = view.devices.clone();

        view_tx.send(ViewUpdate::DevicesDiscovered(devices())).unwrap();
        view_tx
            .send(ViewUpdate::SessionState(SessionState::Idle))
            .unwrap();
        drop(view_tx);

        view.close().await;
        assert_eq!(*known.read().await, devices());
    }

    #[test]
    fn test_render() {
        assert_eq!(
            render(&ViewUpdate::DevicesDiscovered(devices())),
            "  1) HRM-Sensor [AA:BB:CC:DD:EE:FF]"
        );
        assert_eq!(
            render(&ViewUpdate::SessionState(SessionState::Subscribed)),
            "session connected"
        );
        let hr = HeartRateMeasurement::decode(&[0x00, 0x50]).unwrap();
        assert_eq!(
            render(&ViewUpdate::HeartRate(hr)),
            "80 bpm (beat every 750 ms)"
        );
    }
}
