pub mod read_telemetry;
pub mod run_opts;
pub mod stage_config;
