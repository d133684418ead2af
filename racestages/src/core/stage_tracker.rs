use crate::core::telemetry::{SessionInfo, TelemetrySnapshot};
use crate::core::winner_resolver::{resolve_winners, winners_by_position};
use crate::interfaces::chat_interface::{BROADCAST_COMMAND, CAUTION_COMMAND};
use crate::post::stage_result::{StageRecord, StageResultEntry};
use crate::pre::stage_config::{StageConfig, NUM_STAGES};
use log::{debug, info, warn};

/// Stage index that marks a finished race (all stages done or skipped).
pub const TERMINAL_STAGE: usize = NUM_STAGES;

/// * `current_stage` - Active stage (0-based), TERMINAL_STAGE once all stages are done
/// * `completed_laps` - Highest laps-completed value of all eligible cars (display only)
/// * `num_winners_so_far` - Number of cars that completed the active stage
/// * `stage_winners` - Cars that completed the active stage, in crossing order
/// * `last_lap_warning_shown` - Final lap of the active stage was announced
/// * `termination_signaled` - Termination was requested after the final stage
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageState {
    pub current_stage: usize,
    pub completed_laps: i32,
    pub num_winners_so_far: usize,
    pub stage_winners: Vec<usize>,
    pub last_lap_warning_shown: bool,
    pub termination_signaled: bool,
}

impl StageState {
    pub fn new() -> StageState {
        StageState::default()
    }

    pub fn is_finished(&self) -> bool {
        self.current_stage >= TERMINAL_STAGE
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickStatus {
    /// Session info missing or incomplete, tick skipped.
    NotReady,
    /// Not in the race session, tick skipped.
    NotRaceSession,
    /// No car has started lap 1 yet, state was reset.
    RaceNotStarted,
    /// The active stage has no laps configured and was skipped.
    StageSkipped,
    /// Waiting for cars to complete the active stage.
    Detecting,
    /// The active stage was completed in this tick.
    StageCompleted,
    /// All stages are done.
    Finished,
}

/// TickOutcome is the result of processing one telemetry tick.
#[derive(Debug, Clone)]
pub struct TickOutcome {
    pub state: StageState,
    pub status: TickStatus,
    pub chat_lines: Vec<String>,
    pub stage_record: Option<StageRecord>,
    pub terminate: bool,
}

impl TickOutcome {
    fn new(state: StageState, status: TickStatus) -> TickOutcome {
        TickOutcome {
            state,
            status,
            chat_lines: Vec::new(),
            stage_record: None,
            terminate: false,
        }
    }
}

/// process_tick runs the stage detection for one telemetry tick and returns the updated state
/// together with the chat lines to send and the stage results to record. The incoming state is
/// never modified; skipped ticks return it unchanged.
///
/// `chat_idle` must be true if no chat line is queued or being sent, termination is only requested
/// in that case.
pub fn process_tick(
    state: &StageState,
    snapshot: &TelemetrySnapshot,
    config: &StageConfig,
    chat_idle: bool,
) -> TickOutcome {
    let session_info = match snapshot.session_info() {
        Ok(session_info) => session_info,
        Err(e) => {
            debug!("Skipping tick: {}", e);
            return TickOutcome::new(state.clone(), TickStatus::NotReady);
        }
    };

    if !snapshot.is_race_session() {
        return TickOutcome::new(state.clone(), TickStatus::NotRaceSession);
    }

    // reset everything as long as nobody started lap 1, e.g. after a restart of the race
    if !snapshot.race_started() {
        if *state != StageState::default() {
            info!("Race has not started (yet), resetting stage tracking");
        }
        return TickOutcome::new(StageState::default(), TickStatus::RaceNotStarted);
    }

    let lap_completed = eligible_laps_completed(snapshot, session_info);
    let mut outcome = TickOutcome::new(state.clone(), TickStatus::Detecting);

    if outcome.state.is_finished() {
        outcome.status = TickStatus::Finished;

        if config.auto_terminate && chat_idle && !outcome.state.termination_signaled {
            info!("All stages are done, requesting termination");
            outcome.state.termination_signaled = true;
            outcome.terminate = true;
        }
        return outcome;
    }

    let stage = outcome.state.current_stage;

    if config.stage_lap_count(stage) == 0 {
        info!("Stage {} has no laps configured, skipping it", stage + 1);
        outcome.state.current_stage += 1;
        outcome.status = TickStatus::StageSkipped;
        return outcome;
    }

    let target_lap = config.target_lap(stage);

    // add the cars that completed the stage since the last tick
    let slots = config
        .num_cars_to_wait_for
        .saturating_sub(outcome.state.num_winners_so_far);
    let new_winners = resolve_winners(
        &lap_completed,
        &snapshot.car_idx_lap_dist_pct,
        target_lap,
        &outcome.state.stage_winners,
        slots,
    );

    for car_idx in new_winners {
        outcome.state.stage_winners.push(car_idx);
        outcome.state.num_winners_so_far += 1;
        debug!(
            "Position {} stage winner = car {}",
            outcome.state.num_winners_so_far, car_idx
        );
    }

    outcome.state.completed_laps = lap_completed.iter().flatten().copied().max().unwrap_or(0);

    if outcome.state.completed_laps == target_lap - 1 && !outcome.state.last_lap_warning_shown {
        info!("Final lap of stage {}", stage + 1);
        outcome
            .chat_lines
            .push(format!("{} Final lap of stage {}!", BROADCAST_COMMAND, stage + 1));
        outcome.state.last_lap_warning_shown = true;
    }

    if outcome.state.num_winners_so_far >= config.num_cars_to_wait_for {
        complete_stage(&mut outcome, snapshot, session_info, config);
    }

    outcome
}

/// eligible_laps_completed returns the laps-completed value of every car that may win a stage and
/// None for the pace car, spectators and cars on pit road.
pub fn eligible_laps_completed(
    snapshot: &TelemetrySnapshot,
    session_info: &SessionInfo,
) -> Vec<Option<i32>> {
    snapshot
        .car_idx_lap_completed
        .iter()
        .zip(snapshot.car_idx_on_pit_road.iter())
        .enumerate()
        .map(|(car_idx, (&laps, &on_pit_road))| {
            let excluded = session_info
                .driver(car_idx)
                .map_or(false, |driver| driver.is_pace_car || driver.is_spectator);

            if on_pit_road || excluded {
                None
            } else {
                Some(laps)
            }
        })
        .collect()
}

fn complete_stage(
    outcome: &mut TickOutcome,
    snapshot: &TelemetrySnapshot,
    session_info: &SessionInfo,
    config: &StageConfig,
) {
    outcome.state.current_stage += 1;
    let stage_no = outcome.state.current_stage;
    info!("Stage {} complete!", stage_no);

    let mut winners = std::mem::take(&mut outcome.state.stage_winners);
    winners.truncate(config.num_cars_to_wait_for);

    if snapshot.session_flags.is_caution() {
        // the simulator threw the caution itself, its positions are more reliable than ours
        warn!("Already under caution, using race positions for the stage {} winners", stage_no);
        winners = winners_by_position(snapshot, config.num_cars_to_wait_for);
        outcome
            .chat_lines
            .push(format!("{} Stage {} complete!", BROADCAST_COMMAND, stage_no));
    } else if config.throw_caution {
        info!("Throwing caution flag");
        outcome
            .chat_lines
            .push(format!("{} Stage {} complete!", CAUTION_COMMAND, stage_no));
    } else {
        outcome
            .chat_lines
            .push(format!("{} Stage {} complete!", BROADCAST_COMMAND, stage_no));
    }

    let entries: Vec<StageResultEntry> = winners
        .iter()
        .enumerate()
        .map(|(i, &car_idx)| {
            let driver = session_info.driver(car_idx);
            StageResultEntry {
                position: i + 1,
                car_idx,
                car_number: driver.map_or_else(|| "?".to_owned(), |d| d.car_number.to_owned()),
                driver_name: driver
                    .map_or_else(|| "unknown driver".to_owned(), |d| d.user_name.to_owned()),
            }
        })
        .collect();

    let winners_text: String = entries
        .iter()
        .map(|entry| format!(" {}-{}", entry.position, entry.car_number))
        .collect();
    info!("Stage {} winners are:{}", stage_no, winners_text);
    outcome.chat_lines.push(format!(
        "{} Stage {}:{}",
        BROADCAST_COMMAND, stage_no, winners_text
    ));

    outcome.stage_record = Some(StageRecord {
        stage: stage_no,
        session_unique_id: snapshot.session_unique_id,
        entries,
    });

    outcome.state.num_winners_so_far = 0;
    outcome.state.last_lap_warning_shown = false;
    outcome.status = TickStatus::StageCompleted;
}
