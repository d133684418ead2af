use crate::pre::stage_config::{ConfigSource, StageConfig, WatchedConfigFile};
use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser, Clone)]
#[clap(
    version = "0.1.0",
    name = "racestages",
    about = "Watches race telemetry, announces stage completions and records the stage winners"
)]
pub struct RunOpts {
    // FLAGS ---------------------------------------------------------------------------------------
    /// Activate debug logging
    #[clap(short, long)]
    pub debug: bool,

    /// Only announce completed stages, do not throw a caution flag
    #[clap(long, conflicts_with = "config")]
    pub no_caution: bool,

    /// Keep running after the final stage
    #[clap(long, conflicts_with = "config")]
    pub no_auto_terminate: bool,

    /// Run a synthetic race instead of a recorded one
    #[clap(long, conflicts_with = "replay")]
    pub demo: bool,

    /// Print a status line after every tick
    #[clap(short, long)]
    pub status: bool,

    // OPTIONS -------------------------------------------------------------------------------------
    /// Set path to a stage config file (JSON), it is re-read whenever it changes and replaces the
    /// stage options
    #[clap(short, long)]
    pub config: Option<PathBuf>,

    /// Set laps of stage 1 (invalid input falls back to 30)
    #[clap(long, conflicts_with = "config")]
    pub stage1_laps: Option<String>,

    /// Set laps of stage 2 (invalid input falls back to 30)
    #[clap(long, conflicts_with = "config")]
    pub stage2_laps: Option<String>,

    /// Set laps of stage 3, 0 skips the stage (invalid input falls back to 0)
    #[clap(long, conflicts_with = "config")]
    pub stage3_laps: Option<String>,

    /// Set number of cars that must complete a stage (invalid input falls back to 10)
    #[clap(long, conflicts_with = "config")]
    pub cars: Option<String>,

    /// Set folder for the stage results (default: RaceStages in the documents folder)
    #[clap(short, long)]
    pub results_dir: Option<PathBuf>,

    /// Set path to a recorded session header (JSON)
    #[clap(long, requires = "frames")]
    pub replay: Option<PathBuf>,

    /// Set path to the recorded telemetry frames (CSV)
    #[clap(long)]
    pub frames: Option<PathBuf>,

    /// Set telemetry tick interval in milliseconds for replays
    #[clap(short, long, default_value = "10")]
    pub tick_interval_ms: u64,

    /// Set real-time factor of the synthetic race
    #[clap(long, default_value = "1.0")]
    pub realtime_factor: f64,
}

impl RunOpts {
    /// stage_config builds the configuration given on the command line on top of the defaults.
    pub fn stage_config(&self) -> StageConfig {
        let mut config = StageConfig::default();

        for (stage, laps) in [&self.stage1_laps, &self.stage2_laps, &self.stage3_laps]
            .iter()
            .enumerate()
        {
            if let Some(laps) = laps {
                config.set_stage_lap_count_text(stage, laps);
            }
        }
        if let Some(cars) = &self.cars {
            config.set_num_cars_to_wait_for_text(cars);
        }
        config.throw_caution = !self.no_caution;
        config.auto_terminate = !self.no_auto_terminate;

        config
    }

    /// config_source returns the watched config file if one was given, the command line
    /// configuration otherwise.
    pub fn config_source(&self) -> anyhow::Result<Box<dyn ConfigSource>> {
        Ok(match &self.config {
            Some(path) => Box::new(WatchedConfigFile::open(path)?),
            None => Box::new(self.stage_config()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_line_config() {
        let opts = RunOpts::parse_from(&[
            "racestages",
            "--stage1-laps",
            "12",
            "--stage2-laps",
            "abc",
            "--stage3-laps",
            "5",
            "--cars",
            "0",
            "--no-caution",
        ]);
        let config = opts.stage_config();

        assert_eq!(config.stage_lap_counts, [12, 30, 5]);
        assert_eq!(config.num_cars_to_wait_for, 10);
        assert!(!config.throw_caution);
        assert!(config.auto_terminate);
    }

    #[test]
    fn stage_options_conflict_with_config_file() {
        for args in [
            ["--no-caution", ""],
            ["--no-auto-terminate", ""],
            ["--stage1-laps", "12"],
            ["--stage3-laps", "5"],
            ["--cars", "3"],
        ] {
            let mut argv = vec!["racestages", "--config", "stages.json"];
            argv.extend(args.iter().filter(|arg| !arg.is_empty()));
            assert!(RunOpts::try_parse_from(&argv).is_err(), "{:?}", args);
        }

        let opts = RunOpts::try_parse_from(&["racestages", "--config", "stages.json"]).unwrap();
        assert!(opts.config.is_some());
    }

    #[test]
    fn replay_requires_frames() {
        assert!(RunOpts::try_parse_from(&["racestages", "--replay", "session.json"]).is_err());
        assert!(RunOpts::try_parse_from(&[
            "racestages",
            "--demo",
            "--replay",
            "a",
            "--frames",
            "b"
        ])
        .is_err());
    }
}
