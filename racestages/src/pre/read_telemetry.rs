use crate::core::telemetry::{
    Driver, SessionEntry, SessionFlags, SessionInfo, TelemetryEvent, TelemetryProvider,
    TelemetrySnapshot, TickThread, MAX_CARS,
};
use anyhow::Context;
use flume::Receiver;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// RecordedSession is the JSON header of a recorded telemetry session.
/// * `session_unique_id` - Unique id of the race, used to name the results file
/// * `session_num` - Index of the recorded session in `sessions`
/// * `sessions` - All sessions of the event
/// * `drivers` - Driver roster
#[derive(Debug, Deserialize, Clone)]
pub struct RecordedSession {
    pub session_unique_id: i64,
    pub session_num: usize,
    pub sessions: Vec<SessionEntry>,
    pub drivers: Vec<Driver>,
}

/// CsvFrameEl is one row of a recorded telemetry frames file, i.e. the state of one car in one
/// tick. The session flags are taken from the last row of a tick.
#[derive(Debug, Deserialize, Clone)]
pub struct CsvFrameEl {
    pub tick: u64,
    pub car_idx: usize,
    pub lap: i32,
    pub lap_completed: i32,
    pub lap_dist_pct: f32,
    pub on_pit_road: bool,
    pub position: i32,
    pub session_flags: u32,
}

/// read_recorded_session reads the JSON session header.
pub fn read_recorded_session(filepath: &Path) -> anyhow::Result<RecordedSession> {
    let fh = OpenOptions::new()
        .read(true)
        .open(filepath)
        .context(format!("Failed to open session file {:?}!", filepath))?;
    let session = serde_json::from_reader(&fh)
        .context(format!("Failed to parse session file {:?}!", filepath))?;
    Ok(session)
}

/// read_recorded_frames reads the CSV frames file and builds one snapshot per tick (in tick order)
/// on the basis of the session header.
pub fn read_recorded_frames(
    filepath: &Path,
    session: &RecordedSession,
) -> anyhow::Result<Vec<TelemetrySnapshot>> {
    let fh = OpenOptions::new()
        .read(true)
        .open(filepath)
        .context(format!("Failed to open frames file {:?}!", filepath))?;

    let session_info = SessionInfo {
        sessions: session.sessions.to_owned(),
        drivers: session.drivers.to_owned(),
    };

    let mut csv_reader = csv::Reader::from_reader(&fh);
    let mut snapshots: BTreeMap<u64, TelemetrySnapshot> = BTreeMap::new();

    for result in csv_reader.deserialize() {
        let el: CsvFrameEl =
            result.context(format!("Failed to parse frames file {:?}!", filepath))?;

        if el.car_idx >= MAX_CARS {
            anyhow::bail!(
                "Car index {} in tick {} exceeds the maximum of {} cars!",
                el.car_idx,
                el.tick,
                MAX_CARS
            );
        }

        let snapshot = snapshots.entry(el.tick).or_insert_with(|| {
            let mut snapshot = TelemetrySnapshot::with_car_slots(MAX_CARS);
            snapshot.session_info = Some(session_info.clone());
            snapshot.session_num = session.session_num;
            snapshot.session_unique_id = session.session_unique_id;
            snapshot
        });

        snapshot.session_flags = SessionFlags(el.session_flags);
        snapshot.car_idx_lap[el.car_idx] = el.lap;
        snapshot.car_idx_lap_completed[el.car_idx] = el.lap_completed;
        snapshot.car_idx_lap_dist_pct[el.car_idx] = el.lap_dist_pct;
        snapshot.car_idx_on_pit_road[el.car_idx] = el.on_pit_road;
        snapshot.car_idx_position[el.car_idx] = el.position;
    }

    Ok(snapshots.into_values().collect())
}

/// ReplayProvider replays recorded snapshots at a fixed tick interval. A restarted replay continues
/// behind the last delivered tick.
#[derive(Debug)]
pub struct ReplayProvider {
    snapshots: Arc<Vec<TelemetrySnapshot>>,
    next_idx: Arc<AtomicUsize>,
    tick_interval: Duration,
    thread: Option<TickThread>,
}

impl ReplayProvider {
    pub fn new(snapshots: Vec<TelemetrySnapshot>, tick_interval: Duration) -> ReplayProvider {
        ReplayProvider {
            snapshots: Arc::new(snapshots),
            next_idx: Arc::new(AtomicUsize::new(0)),
            tick_interval,
            thread: None,
        }
    }

    /// from_files reads a recorded session from its JSON header and CSV frames.
    pub fn from_files(
        session_path: &Path,
        frames_path: &Path,
        tick_interval: Duration,
    ) -> anyhow::Result<ReplayProvider> {
        let session = read_recorded_session(session_path)?;
        let snapshots = read_recorded_frames(frames_path, &session)?;
        Ok(ReplayProvider::new(snapshots, tick_interval))
    }

    pub fn no_ticks(&self) -> usize {
        self.snapshots.len()
    }
}

impl TelemetryProvider for ReplayProvider {
    fn start(&mut self) -> anyhow::Result<Receiver<TelemetryEvent>> {
        self.stop();

        let snapshots = Arc::clone(&self.snapshots);
        let next_idx = Arc::clone(&self.next_idx);

        let (thread, rx) = TickThread::spawn(self.tick_interval, move || {
            let idx = next_idx.fetch_add(1, Ordering::Relaxed);
            snapshots.get(idx).cloned()
        });
        self.thread = Some(thread);

        Ok(rx)
    }

    fn stop(&mut self) {
        if let Some(mut thread) = self.thread.take() {
            thread.stop();
        }
    }
}
