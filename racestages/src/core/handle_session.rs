use crate::core::chat_dispatcher::ChatDispatcher;
use crate::core::stage_tracker::{process_tick, StageState, TickStatus};
use crate::core::telemetry::{TelemetryEvent, TelemetryProvider};
use crate::interfaces::chat_interface::ChatTransport;
use crate::interfaces::status_interface::{ConnectionState, StatusReport};
use crate::post::stage_result::{ResultsRecorder, StageRecord};
use crate::pre::stage_config::ConfigSource;
use anyhow::Context;
use flume::{Receiver, Sender};
use log::{debug, error, info, warn};
use std::thread::sleep;
use std::time::Duration;

/// Pause between a stopped telemetry connection and its restart.
pub const RESTART_DELAY: Duration = Duration::from_millis(100);

/// SessionSummary is returned once the session loop ends.
#[derive(Debug, Clone, Default)]
pub struct SessionSummary {
    pub state: StageState,
    pub records: Vec<StageRecord>,
    pub terminated: bool,
    pub restarts: u32,
    pub ticks: u64,
}

/// handle_session consumes telemetry ticks until the provider runs out of data or termination was
/// requested and all chat lines are sent. Per tick, the chat dispatcher is serviced first, then the
/// stage tracker runs on the configuration that is current for this tick.
///
/// Failing connections are stopped and restarted until they work again, failing results files are
/// logged and ignored. Only a failing first start is returned as an error.
pub fn handle_session<P, C, T, R>(
    provider: &mut P,
    config_source: &mut C,
    transport: &mut T,
    recorder: &mut R,
    tx: Option<&Sender<StatusReport>>,
) -> anyhow::Result<SessionSummary>
where
    P: TelemetryProvider + ?Sized,
    C: ConfigSource + ?Sized,
    T: ChatTransport + ?Sized,
    R: ResultsRecorder + ?Sized,
{
    let mut summary = SessionSummary::default();
    let mut state = StageState::new();
    let mut dispatcher = ChatDispatcher::new();
    let mut shutting_down = false;

    let mut rx = provider
        .start()
        .context("Failed to start the telemetry connection!")?;
    info!("Telemetry connection started");

    loop {
        let event = rx.recv().unwrap_or(TelemetryEvent::Stopped);

        match event {
            TelemetryEvent::Data(snapshot) => {
                summary.ticks += 1;
                dispatcher.service(transport);

                let config = config_source.current();
                let outcome = process_tick(&state, &snapshot, &config, dispatcher.is_idle());

                for line in outcome.chat_lines.iter() {
                    dispatcher.enqueue(line);
                }

                if let Some(record) = outcome.stage_record {
                    if let Err(e) = recorder.record(&record) {
                        error!("Failed to save the stage {} winners: {:#}", record.stage, e);
                    }
                    summary.records.push(record);
                }

                if outcome.terminate {
                    shutting_down = true;
                }
                state = outcome.state;

                if outcome.status != TickStatus::NotReady {
                    publish_status(
                        tx,
                        ConnectionState::Connected,
                        snapshot.session_type().map(str::to_owned),
                        &state,
                    );
                }

                if shutting_down && dispatcher.is_idle() {
                    info!("Stage tracking finished, closing the telemetry connection");
                    provider.stop();
                    summary.terminated = true;
                    break;
                }
            }

            TelemetryEvent::Ended => {
                info!("Telemetry source has no more data");
                provider.stop();
                break;
            }

            TelemetryEvent::Exception(_) | TelemetryEvent::Stopped if shutting_down => {
                debug!("Telemetry connection closed during shutdown");
                break;
            }

            event => {
                if let TelemetryEvent::Exception(msg) = &event {
                    warn!("Telemetry connection failed: {}", msg);
                    provider.stop();
                }
                publish_status(tx, ConnectionState::Disconnected, None, &state);

                rx = restart(provider);
                summary.restarts += 1;
            }
        }
    }

    if dispatcher.pending() > 0 {
        warn!("{} chat line(s) were not sent", dispatcher.pending());
    }

    summary.state = state;
    Ok(summary)
}

/// restart starts the provider again after RESTART_DELAY, retrying until a start succeeds.
fn restart<P: TelemetryProvider + ?Sized>(provider: &mut P) -> Receiver<TelemetryEvent> {
    loop {
        info!("Restarting the telemetry connection");
        sleep(RESTART_DELAY);

        match provider.start() {
            Ok(rx) => return rx,
            Err(e) => warn!("Failed to restart the telemetry connection: {:#}", e),
        }
    }
}

fn publish_status(
    tx: Option<&Sender<StatusReport>>,
    connection: ConnectionState,
    session_type: Option<String>,
    state: &StageState,
) {
    if let Some(tx) = tx {
        if tx
            .send(StatusReport::new(connection, session_type, state))
            .is_err()
        {
            debug!("Status receiver is gone");
        }
    }
}
