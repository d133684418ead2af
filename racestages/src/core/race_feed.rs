use crate::core::telemetry::{
    Driver, SessionEntry, SessionFlags, SessionInfo, TelemetryEvent, TelemetryProvider,
    TelemetrySnapshot, TickThread, RACE_SESSION_TYPE,
};
use anyhow::Context;
use flume::Receiver;
use helpers::general::{argsort, SortOrder};
use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::Deserialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Car slot of the pace car in synthetic races.
pub const PACE_CAR_IDX: usize = 0;

/// Lap time factor while the caution flag is out.
const CAUTION_LAPTIME_FACTOR: f64 = 1.4;

/// Lap time factor while driving through the pit lane.
const PIT_LAPTIME_FACTOR: f64 = 2.0;

/// * `no_cars` - Number of racing cars (the pace car and a spectator slot are added)
/// * `tot_no_laps` - Race distance
/// * `t_lap` - (s) Average lap time
/// * `consistency` - Driver consistency in [0, 1], 1 means no lap time noise
/// * `p_pit_per_lap` - Probability that a car visits the pit lane on a lap
/// * `t_pit` - (s) Time spent on pit road per visit
/// * `p_caution_per_lap` - Probability of a random caution per lap of the leader
/// * `t_caution` - (s) Duration of a random caution
/// * `t_pre_race` - (s) Time before the start (the first half outside the race session)
/// * `timestep_size` - (s) Simulated time per tick
/// * `session_unique_id` - Unique id reported for the synthetic race
/// * `seed` - Optional seed for reproducible races
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RaceFeedPars {
    pub no_cars: usize,
    pub tot_no_laps: u32,
    pub t_lap: f64,
    pub consistency: f64,
    pub p_pit_per_lap: f64,
    pub t_pit: f64,
    pub p_caution_per_lap: f64,
    pub t_caution: f64,
    pub t_pre_race: f64,
    pub timestep_size: f64,
    pub session_unique_id: i64,
    pub seed: Option<u64>,
}

impl Default for RaceFeedPars {
    fn default() -> Self {
        RaceFeedPars {
            no_cars: 20,
            tot_no_laps: 70,
            t_lap: 20.0,
            consistency: 0.8,
            p_pit_per_lap: 0.02,
            t_pit: 15.0,
            p_caution_per_lap: 0.01,
            t_caution: 40.0,
            t_pre_race: 4.0,
            timestep_size: 0.1,
            session_unique_id: 1,
            seed: None,
        }
    }
}

/// SyntheticRace is a minimal time-discrete race: every car progresses with its own noisy lap time,
/// occasionally visits the pit lane and slows down under caution.
#[derive(Debug)]
pub struct SyntheticRace {
    pars: RaceFeedPars,
    rng: StdRng,
    lap_time_noise: Normal<f64>,
    session_info: SessionInfo,
    pub cur_racetime: f64,
    race_progs: Vec<f64>,
    th_laptimes: Vec<f64>,
    t_pit_left: Vec<f64>,
    t_caution_left: f64,
}

impl SyntheticRace {
    pub fn new(pars: &RaceFeedPars) -> anyhow::Result<SyntheticRace> {
        let std_dev = ((1.0 - pars.consistency) * 2.0).max(0.0);
        let lap_time_noise =
            Normal::new(0.0, std_dev).context("Invalid driver consistency for the race feed!")?;
        let rng = match pars.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        // pace car first, then the racing cars, then one spectator slot
        let no_slots = pars.no_cars + 2;
        let mut drivers = Vec::with_capacity(no_slots);
        drivers.push(Driver {
            car_idx: PACE_CAR_IDX,
            car_number: "0".to_owned(),
            user_name: "Pace Car".to_owned(),
            is_pace_car: true,
            is_spectator: false,
        });
        for car_idx in 1..=pars.no_cars {
            drivers.push(Driver {
                car_idx,
                car_number: format!("{}", car_idx * 3 % 100),
                user_name: format!("Driver {}", car_idx),
                is_pace_car: false,
                is_spectator: false,
            });
        }
        drivers.push(Driver {
            car_idx: no_slots - 1,
            car_number: String::new(),
            user_name: "Spectator".to_owned(),
            is_pace_car: false,
            is_spectator: true,
        });

        let session_info = SessionInfo {
            sessions: vec![
                SessionEntry {
                    session_type: "Warmup".to_owned(),
                },
                SessionEntry {
                    session_type: RACE_SESSION_TYPE.to_owned(),
                },
            ],
            drivers,
        };

        // grid: every car starts a bit behind the line
        let race_progs = (0..no_slots)
            .map(|car_idx| -0.005 * (car_idx + 1) as f64)
            .collect();

        let mut race = SyntheticRace {
            pars: pars.to_owned(),
            rng,
            lap_time_noise,
            session_info,
            cur_racetime: 0.0,
            race_progs,
            th_laptimes: vec![pars.t_lap; no_slots],
            t_pit_left: vec![0.0; no_slots],
            t_caution_left: 0.0,
        };
        for car_idx in 0..no_slots {
            race.calc_th_laptime(car_idx);
        }

        Ok(race)
    }

    fn no_slots(&self) -> usize {
        self.race_progs.len()
    }

    fn spectator_idx(&self) -> usize {
        self.no_slots() - 1
    }

    fn is_racing_car(&self, car_idx: usize) -> bool {
        car_idx != PACE_CAR_IDX && car_idx != self.spectator_idx()
    }

    fn caution_active(&self) -> bool {
        self.t_caution_left > 0.0
    }

    fn leader_prog(&self) -> f64 {
        (0..self.no_slots())
            .filter(|&car_idx| self.is_racing_car(car_idx))
            .map(|car_idx| self.race_progs[car_idx])
            .fold(f64::NEG_INFINITY, f64::max)
    }

    /// get_finished returns true once the leader is half a lap behind the finish line.
    pub fn get_finished(&self) -> bool {
        self.leader_prog() >= self.pars.tot_no_laps as f64 + 0.5
    }

    fn calc_th_laptime(&mut self, car_idx: usize) {
        let random_factor = self.lap_time_noise.sample(&mut self.rng);
        self.th_laptimes[car_idx] = (self.pars.t_lap + random_factor).max(0.5 * self.pars.t_lap);
    }

    /// simulate_timestep advances the race by one time step.
    pub fn simulate_timestep(&mut self) {
        let dt = self.pars.timestep_size;
        self.cur_racetime += dt;

        if self.cur_racetime < self.pars.t_pre_race {
            return;
        }

        // random caution periods
        if self.caution_active() {
            self.t_caution_left -= dt;
            if !self.caution_active() {
                info!("Synthetic race: caution period over");
            }
        } else if self
            .rng
            .gen_bool((self.pars.p_caution_per_lap * dt / self.pars.t_lap).clamp(0.0, 1.0))
        {
            info!("Synthetic race: caution at {:.1}s", self.cur_racetime);
            self.t_caution_left = self.pars.t_caution;
        }

        for car_idx in 0..self.no_slots() {
            if car_idx == self.spectator_idx() {
                continue;
            }

            let mut laptime = self.th_laptimes[car_idx];
            if self.caution_active() {
                laptime *= CAUTION_LAPTIME_FACTOR;
            }
            if self.t_pit_left[car_idx] > 0.0 {
                self.t_pit_left[car_idx] -= dt;
                laptime *= PIT_LAPTIME_FACTOR;
            }

            let compl_lap_prev = self.race_progs[car_idx].floor();
            self.race_progs[car_idx] += dt / laptime;

            // new lap -> new lap time, maybe a pit stop
            if self.race_progs[car_idx].floor() > compl_lap_prev {
                self.calc_th_laptime(car_idx);

                if self.is_racing_car(car_idx)
                    && self.rng.gen_bool(self.pars.p_pit_per_lap.clamp(0.0, 1.0))
                {
                    debug!("Synthetic race: car {} enters pit road", car_idx);
                    self.t_pit_left[car_idx] = self.pars.t_pit;
                }
            }
        }

        // the pace car leads the field under caution and waits in the pits otherwise
        let leader_prog = self.leader_prog();
        if self.caution_active() {
            self.race_progs[PACE_CAR_IDX] = leader_prog + 0.02;
        } else {
            self.race_progs[PACE_CAR_IDX] = leader_prog.floor();
        }
    }

    /// get_snapshot returns the telemetry of the current time step.
    pub fn get_snapshot(&self) -> TelemetrySnapshot {
        let no_slots = self.no_slots();
        let mut snapshot = TelemetrySnapshot::with_car_slots(no_slots);

        snapshot.session_info = Some(self.session_info.clone());
        snapshot.session_num = if self.cur_racetime < 0.5 * self.pars.t_pre_race {
            0
        } else {
            1
        };
        snapshot.session_unique_id = self.pars.session_unique_id;
        snapshot.session_flags = SessionFlags(if self.caution_active() {
            SessionFlags::CAUTION
        } else if self.leader_prog() >= self.pars.tot_no_laps as f64 {
            SessionFlags::CHECKERED
        } else {
            SessionFlags::GREEN
        });

        for car_idx in 0..no_slots {
            if car_idx == self.spectator_idx() {
                continue;
            }

            let race_prog = self.race_progs[car_idx];
            let compl_laps = race_prog.floor();
            snapshot.car_idx_lap_completed[car_idx] = compl_laps as i32;
            snapshot.car_idx_lap[car_idx] = if race_prog < 0.0 {
                0
            } else {
                compl_laps as i32 + 1
            };
            snapshot.car_idx_lap_dist_pct[car_idx] = (race_prog - compl_laps) as f32;
            snapshot.car_idx_on_pit_road[car_idx] = self.t_pit_left[car_idx] > 0.0
                || (car_idx == PACE_CAR_IDX && !self.caution_active());
        }

        // race positions of the racing cars
        let racing_idxs: Vec<usize> = (0..no_slots)
            .filter(|&car_idx| self.is_racing_car(car_idx))
            .collect();
        let racing_progs: Vec<f64> = racing_idxs
            .iter()
            .map(|&car_idx| self.race_progs[car_idx])
            .collect();

        for (i, sorted_idx) in argsort(&racing_progs, SortOrder::Descending)
            .into_iter()
            .enumerate()
        {
            snapshot.car_idx_position[racing_idxs[sorted_idx]] = i as i32 + 1;
        }

        snapshot
    }
}

/// RaceFeed provides the telemetry of a synthetic race, paced by a real-time factor.
#[derive(Debug)]
pub struct RaceFeed {
    race: Arc<Mutex<SyntheticRace>>,
    tick_interval: Duration,
    thread: Option<TickThread>,
}

impl RaceFeed {
    pub fn new(pars: &RaceFeedPars, realtime_factor: f64) -> anyhow::Result<RaceFeed> {
        if !(realtime_factor > 0.0) {
            anyhow::bail!("Real-time factor must be positive, but is {}!", realtime_factor);
        }

        Ok(RaceFeed {
            race: Arc::new(Mutex::new(SyntheticRace::new(pars)?)),
            tick_interval: Duration::from_secs_f64(pars.timestep_size / realtime_factor),
            thread: None,
        })
    }
}

impl TelemetryProvider for RaceFeed {
    fn start(&mut self) -> anyhow::Result<Receiver<TelemetryEvent>> {
        self.stop();

        let race = Arc::clone(&self.race);
        let (thread, rx) = TickThread::spawn(self.tick_interval, move || {
            let mut race = race.lock().ok()?;
            if race.get_finished() {
                return None;
            }
            race.simulate_timestep();
            Some(race.get_snapshot())
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

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet_pars() -> RaceFeedPars {
        RaceFeedPars {
            no_cars: 5,
            tot_no_laps: 3,
            t_lap: 2.0,
            p_pit_per_lap: 0.0,
            p_caution_per_lap: 0.0,
            t_pre_race: 1.0,
            seed: Some(3),
            ..RaceFeedPars::default()
        }
    }

    #[test]
    fn roster_contains_pace_car_and_spectator() {
        let race = SyntheticRace::new(&quiet_pars()).unwrap();
        let snapshot = race.get_snapshot();
        let session_info = snapshot.session_info().unwrap();

        assert_eq!(snapshot.no_cars(), 7);
        assert!(session_info.driver(PACE_CAR_IDX).unwrap().is_pace_car);
        assert!(session_info.driver(6).unwrap().is_spectator);
        assert!(!snapshot.is_race_session());
        assert!(!snapshot.race_started());
    }

    #[test]
    fn race_starts_and_finishes() {
        let mut race = SyntheticRace::new(&quiet_pars()).unwrap();
        let mut started = false;

        for _ in 0..10_000 {
            if race.get_finished() {
                break;
            }
            race.simulate_timestep();
            started |= race.get_snapshot().race_started();
        }

        let snapshot = race.get_snapshot();
        assert!(started);
        assert!(race.get_finished());
        assert!(snapshot.is_race_session());
        assert!(snapshot.car_idx_on_pit_road[PACE_CAR_IDX]);

        let mut positions: Vec<i32> = snapshot.car_idx_position[1..=5].to_vec();
        positions.sort_unstable();
        assert_eq!(positions, vec![1, 2, 3, 4, 5]);
        assert_eq!(snapshot.car_idx_position[PACE_CAR_IDX], 0);
    }
}
