#![allow(dead_code)]

use racestages::core::telemetry::{
    Driver, SessionEntry, SessionFlags, SessionInfo, TelemetrySnapshot, RACE_SESSION_TYPE,
};
use racestages::interfaces::chat_interface::ChatTransport;
use racestages::pre::stage_config::StageConfig;

pub const PACE_CAR_IDX: usize = 3;
pub const SPECTATOR_IDX: usize = 4;
pub const NO_SLOTS: usize = 5;

/// Car numbers of the racing cars 0, 1 and 2.
pub const CAR_NUMBERS: [&str; 3] = ["10", "11", "12"];

pub fn roster() -> Vec<Driver> {
    let mut drivers: Vec<Driver> = CAR_NUMBERS
        .iter()
        .enumerate()
        .map(|(car_idx, number)| Driver {
            car_idx,
            car_number: number.to_string(),
            user_name: format!("Driver {}", number),
            is_pace_car: false,
            is_spectator: false,
        })
        .collect();
    drivers.push(Driver {
        car_idx: PACE_CAR_IDX,
        car_number: "0".to_owned(),
        user_name: "Pace Car".to_owned(),
        is_pace_car: true,
        is_spectator: false,
    });
    drivers.push(Driver {
        car_idx: SPECTATOR_IDX,
        car_number: String::new(),
        user_name: "Spectator".to_owned(),
        is_pace_car: false,
        is_spectator: true,
    });
    drivers
}

/// race_snapshot returns a race session tick in which every car completed `laps` laps.
pub fn race_snapshot(laps: i32) -> TelemetrySnapshot {
    let mut snapshot = TelemetrySnapshot::with_car_slots(NO_SLOTS);
    snapshot.session_info = Some(SessionInfo {
        sessions: vec![
            SessionEntry {
                session_type: "Qualify".to_owned(),
            },
            SessionEntry {
                session_type: RACE_SESSION_TYPE.to_owned(),
            },
        ],
        drivers: roster(),
    });
    snapshot.session_num = 1;
    snapshot.session_unique_id = 4711;
    snapshot.session_flags = SessionFlags(SessionFlags::GREEN);

    for car_idx in 0..NO_SLOTS {
        set_car(&mut snapshot, car_idx, laps, 0.0);
        snapshot.car_idx_position[car_idx] = if car_idx < CAR_NUMBERS.len() {
            car_idx as i32 + 1
        } else {
            0
        };
    }
    snapshot
}

pub fn set_car(snapshot: &mut TelemetrySnapshot, car_idx: usize, lap_completed: i32, pct: f32) {
    snapshot.car_idx_lap_completed[car_idx] = lap_completed;
    snapshot.car_idx_lap[car_idx] = lap_completed + 1;
    snapshot.car_idx_lap_dist_pct[car_idx] = pct;
}

pub fn config(stage_lap_counts: [u32; 3], num_cars_to_wait_for: usize) -> StageConfig {
    StageConfig {
        stage_lap_counts,
        num_cars_to_wait_for,
        ..StageConfig::default()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChatCall {
    Open,
    Transmit(String),
    Cancel,
}

#[derive(Debug, Default)]
pub struct RecordingTransport {
    pub calls: Vec<ChatCall>,
}

impl RecordingTransport {
    pub fn transmitted(&self) -> Vec<String> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                ChatCall::Transmit(line) => Some(line.to_owned()),
                _ => None,
            })
            .collect()
    }
}

impl ChatTransport for RecordingTransport {
    fn open_session(&mut self) -> anyhow::Result<()> {
        self.calls.push(ChatCall::Open);
        Ok(())
    }

    fn transmit(&mut self, line: &str) -> anyhow::Result<()> {
        self.calls.push(ChatCall::Transmit(line.to_owned()));
        Ok(())
    }

    fn cancel_session(&mut self) -> anyhow::Result<()> {
        self.calls.push(ChatCall::Cancel);
        Ok(())
    }
}
