use flume::Receiver;
use log::warn;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{sleep, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Number of car slots delivered by the simulator per telemetry array.
pub const MAX_CARS: usize = 64;

/// Session type string of the racing session.
pub const RACE_SESSION_TYPE: &str = "Race";

/// SessionFlags wraps the session flag bitfield of a telemetry snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionFlags(pub u32);

impl SessionFlags {
    pub const CHECKERED: u32 = 0x0000_0001;
    pub const GREEN: u32 = 0x0000_0004;
    pub const CAUTION: u32 = 0x0000_4000;
    pub const CAUTION_WAVING: u32 = 0x0000_8000;

    /// is_caution returns true if either of the caution bits is set.
    pub fn is_caution(&self) -> bool {
        self.0 & (SessionFlags::CAUTION | SessionFlags::CAUTION_WAVING) != 0
    }
}

/// * `car_idx` - Car slot the roster entry refers to
/// * `car_number` - Displayed car number, e.g. 07 (kept as text to preserve leading zeros)
/// * `user_name` - Displayed driver name
/// * `is_pace_car` - True for the pace car slot
/// * `is_spectator` - True for spectating entries that occupy a slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Driver {
    pub car_idx: usize,
    pub car_number: String,
    pub user_name: String,
    #[serde(default)]
    pub is_pace_car: bool,
    #[serde(default)]
    pub is_spectator: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEntry {
    pub session_type: String,
}

/// SessionInfo is the slowly changing part of the telemetry: the list of sessions of the event and
/// the driver roster.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SessionInfo {
    pub sessions: Vec<SessionEntry>,
    pub drivers: Vec<Driver>,
}

impl SessionInfo {
    pub fn driver(&self, car_idx: usize) -> Option<&Driver> {
        self.drivers.iter().find(|driver| driver.car_idx == car_idx)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum TelemetryError {
    #[error("session info is not available yet")]
    MissingSessionInfo,
    #[error("session index {0} is not part of the session info")]
    UnknownSession(usize),
    #[error("per-car arrays have inconsistent lengths")]
    InconsistentCarArrays,
}

/// TelemetrySnapshot holds everything delivered by the simulator for one tick. The per-car arrays
/// are indexed by car slot.
#[derive(Debug, Clone, Default)]
pub struct TelemetrySnapshot {
    pub session_info: Option<SessionInfo>,
    pub session_num: usize,
    pub session_flags: SessionFlags,
    pub session_unique_id: i64,
    pub car_idx_lap: Vec<i32>,
    pub car_idx_lap_completed: Vec<i32>,
    pub car_idx_lap_dist_pct: Vec<f32>,
    pub car_idx_on_pit_road: Vec<bool>,
    pub car_idx_position: Vec<i32>,
}

impl TelemetrySnapshot {
    /// Creates a snapshot with `no_cars` empty car slots (not in world).
    pub fn with_car_slots(no_cars: usize) -> TelemetrySnapshot {
        TelemetrySnapshot {
            car_idx_lap: vec![-1; no_cars],
            car_idx_lap_completed: vec![-1; no_cars],
            car_idx_lap_dist_pct: vec![-1.0; no_cars],
            car_idx_on_pit_road: vec![false; no_cars],
            car_idx_position: vec![0; no_cars],
            ..TelemetrySnapshot::default()
        }
    }

    /// session_info returns the session info if it is complete enough to work with, i.e. the
    /// active session exists and all per-car arrays have the same length.
    pub fn session_info(&self) -> Result<&SessionInfo, TelemetryError> {
        let session_info = self
            .session_info
            .as_ref()
            .ok_or(TelemetryError::MissingSessionInfo)?;

        if session_info.sessions.get(self.session_num).is_none() {
            return Err(TelemetryError::UnknownSession(self.session_num));
        }

        let no_cars = self.car_idx_lap.len();
        if self.car_idx_lap_completed.len() != no_cars
            || self.car_idx_lap_dist_pct.len() != no_cars
            || self.car_idx_on_pit_road.len() != no_cars
            || self.car_idx_position.len() != no_cars
        {
            return Err(TelemetryError::InconsistentCarArrays);
        }

        Ok(session_info)
    }

    pub fn session_type(&self) -> Option<&str> {
        self.session_info
            .as_ref()?
            .sessions
            .get(self.session_num)
            .map(|session| session.session_type.as_str())
    }

    pub fn is_race_session(&self) -> bool {
        self.session_type() == Some(RACE_SESSION_TYPE)
    }

    pub fn no_cars(&self) -> usize {
        self.car_idx_lap.len()
    }

    /// race_started returns true as soon as any car has started its first lap.
    pub fn race_started(&self) -> bool {
        self.car_idx_lap.iter().any(|&lap| lap >= 1)
    }

    /// car_idx_at_position performs a linear search for the car holding the given race position.
    pub fn car_idx_at_position(&self, position: i32) -> Option<usize> {
        self.car_idx_position.iter().position(|&pos| pos == position)
    }
}

/// TelemetryEvent is a message of the telemetry connection.
#[derive(Debug, Clone)]
pub enum TelemetryEvent {
    /// A new telemetry tick.
    Data(TelemetrySnapshot),
    /// The connection failed; the provider should be stopped.
    Exception(String),
    /// The connection was stopped and may be restarted.
    Stopped,
    /// The source has no more data (recordings, synthetic races).
    Ended,
}

/// TelemetryProvider is the connection to the simulator. Ticks are delivered in order through the
/// returned channel, never concurrently.
pub trait TelemetryProvider {
    fn start(&mut self) -> anyhow::Result<Receiver<TelemetryEvent>>;
    fn stop(&mut self);
}

/// TickThread delivers snapshots from a worker thread at a fixed tick interval until the source
/// returns None (then `Ended` is sent) or the thread is stopped.
#[derive(Debug)]
pub struct TickThread {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl TickThread {
    pub fn spawn<F>(
        tick_interval: Duration,
        mut next_snapshot: F,
    ) -> (TickThread, Receiver<TelemetryEvent>)
    where
        F: FnMut() -> Option<TelemetrySnapshot> + Send + 'static,
    {
        let (tx, rx) = flume::unbounded();
        let stop = Arc::new(AtomicBool::new(false));
        let stop_thread = Arc::clone(&stop);

        let handle = std::thread::spawn(move || {
            while !stop_thread.load(Ordering::Relaxed) {
                let t_start = Instant::now();

                let event = match next_snapshot() {
                    Some(snapshot) => TelemetryEvent::Data(snapshot),
                    None => {
                        let _ = tx.send(TelemetryEvent::Ended);
                        return;
                    }
                };
                if tx.send(event).is_err() {
                    return;
                }

                // sleep until the tick interval is over
                if let Some(t_sleep) = tick_interval.checked_sub(t_start.elapsed()) {
                    sleep(t_sleep);
                }
            }
        });

        (
            TickThread {
                stop,
                handle: Some(handle),
            },
            rx,
        )
    }

    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);

        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Telemetry thread panicked!");
            }
        }
    }
}

impl Drop for TickThread {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn race_snapshot() -> TelemetrySnapshot {
        let mut snapshot = TelemetrySnapshot::with_car_slots(4);
        snapshot.session_info = Some(SessionInfo {
            sessions: vec![
                SessionEntry {
                    session_type: "Practice".to_owned(),
                },
                SessionEntry {
                    session_type: RACE_SESSION_TYPE.to_owned(),
                },
            ],
            drivers: vec![],
        });
        snapshot.session_num = 1;
        snapshot
    }

    #[test]
    fn caution_bits() {
        assert!(!SessionFlags(SessionFlags::GREEN).is_caution());
        assert!(SessionFlags(SessionFlags::CAUTION).is_caution());
        assert!(SessionFlags(SessionFlags::CAUTION_WAVING | SessionFlags::GREEN).is_caution());
    }

    #[test]
    fn session_info_requires_known_session() {
        let mut snapshot = race_snapshot();
        assert!(snapshot.session_info().is_ok());
        assert!(snapshot.is_race_session());

        snapshot.session_num = 5;
        assert_eq!(
            snapshot.session_info().unwrap_err(),
            TelemetryError::UnknownSession(5)
        );

        snapshot.session_info = None;
        assert_eq!(
            snapshot.session_info().unwrap_err(),
            TelemetryError::MissingSessionInfo
        );
    }

    #[test]
    fn session_info_rejects_inconsistent_arrays() {
        let mut snapshot = race_snapshot();
        snapshot.car_idx_position.pop();
        assert_eq!(
            snapshot.session_info().unwrap_err(),
            TelemetryError::InconsistentCarArrays
        );
    }

    #[test]
    fn tick_thread_ends_when_source_is_empty() {
        let mut remaining = 3;
        let (mut thread, rx) = TickThread::spawn(Duration::from_millis(0), move || {
            if remaining == 0 {
                return None;
            }
            remaining -= 1;
            Some(TelemetrySnapshot::with_car_slots(2))
        });

        let events: Vec<TelemetryEvent> = rx.iter().collect();
        thread.stop();

        assert_eq!(events.len(), 4);
        assert!(matches!(events[3], TelemetryEvent::Ended));
    }

    #[test]
    fn position_lookup_scans_all_cars() {
        let mut snapshot = race_snapshot();
        snapshot.car_idx_position = vec![3, 0, 1, 2];
        assert_eq!(snapshot.car_idx_at_position(1), Some(2));
        assert_eq!(snapshot.car_idx_at_position(3), Some(0));
        assert_eq!(snapshot.car_idx_at_position(4), None);
    }
}
