use clap::Parser;
use log::{error, info, warn};
use racestages::core::handle_session::handle_session;
use racestages::core::race_feed::{RaceFeed, RaceFeedPars};
use racestages::core::telemetry::TelemetryProvider;
use racestages::interfaces::chat_interface::ConsoleTransport;
use racestages::interfaces::status_interface::StatusReport;
use racestages::post::stage_result::FileRecorder;
use racestages::pre::read_telemetry::ReplayProvider;
use racestages::pre::run_opts::RunOpts;
use std::thread;
use std::time::Duration;

fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_millis()
        .init();
}

fn main() -> anyhow::Result<()> {
    // PRE-PROCESSING ------------------------------------------------------------------------------
    // get run options from the command line arguments
    let run_opts: RunOpts = RunOpts::parse();
    init_logging(run_opts.debug);

    let mut config_source = run_opts.config_source()?;

    let mut provider: Box<dyn TelemetryProvider> = match (&run_opts.replay, &run_opts.frames) {
        (Some(session_path), Some(frames_path)) => {
            info!("Replaying session {:?} with frames {:?}", session_path, frames_path);
            Box::new(ReplayProvider::from_files(
                session_path,
                frames_path,
                Duration::from_millis(run_opts.tick_interval_ms),
            )?)
        }
        _ if run_opts.demo => {
            info!(
                "Running a synthetic race with a real-time factor of {:.1}",
                run_opts.realtime_factor
            );
            Box::new(RaceFeed::new(
                &RaceFeedPars::default(),
                run_opts.realtime_factor,
            )?)
        }
        _ => anyhow::bail!(
            "No telemetry source provided! Use --replay <session.json> --frames <frames.csv> or --demo."
        ),
    };

    let results_dir = run_opts
        .results_dir
        .clone()
        .unwrap_or_else(FileRecorder::default_dir);
    info!("Stage results are saved in {:?}", results_dir);
    let mut recorder = FileRecorder::new(&results_dir);
    let mut transport = ConsoleTransport::stdout();

    // status lines are printed by a separate thread so that ticks are never delayed by the output
    let (tx, rx) = flume::unbounded::<StatusReport>();
    let status_printer = if run_opts.status {
        Some(thread::spawn(move || {
            let mut last_report: Option<StatusReport> = None;
            for report in rx.iter() {
                if last_report.as_ref() != Some(&report) {
                    println!("STATUS: {}", report);
                    last_report = Some(report);
                }
            }
        }))
    } else {
        drop(rx);
        None
    };

    // EXECUTION -----------------------------------------------------------------------------------
    let summary = handle_session(
        provider.as_mut(),
        config_source.as_mut(),
        &mut transport,
        &mut recorder,
        if run_opts.status { Some(&tx) } else { None },
    )?;
    drop(tx);

    if let Some(status_printer) = status_printer {
        if status_printer.join().is_err() {
            error!("Status printer panicked!");
        }
    }

    // POST-PROCESSING -----------------------------------------------------------------------------
    info!(
        "Processed {} ticks ({} connection restarts), {} stage(s) recorded",
        summary.ticks,
        summary.restarts,
        summary.records.len()
    );
    for record in summary.records.iter() {
        println!("RESULT: {}", record.format_block()?.trim_end());
    }
    if !summary.state.is_finished() {
        warn!(
            "Telemetry ended in stage {} before all stages were completed",
            summary.state.current_stage + 1
        );
    }

    Ok(())
}
