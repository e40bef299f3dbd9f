mod devices;

use chrono::{DateTime, Local};
use clap::{Parser, Subcommand};
use devices::{LoggedHaptics, SimulatedSensor, TerminalAudio};
use interval_core::cues::{AudioDevice, AudioOutput, NoDisplayWake};
use interval_core::hr::DEFAULT_DANGER_BPM;
use interval_core::poll::{CsvFetcher, PollSchedule, PollSource};
use interval_core::*;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver};
use std::time::Duration;
use uuid::Uuid;

/// Real time between loop iterations
const FRAME: Duration = Duration::from_millis(20);

#[derive(Parser)]
#[command(name = "fourby")]
#[command(about = "4x4 interval workout timer with heart-rate zones", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Read configuration from this file instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// More log output on stderr (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the phase plan for the configured workout (default)
    Plan {
        /// Estimate max heart rate from age instead of the configured value
        #[arg(long)]
        age: Option<u32>,
    },

    /// Run a workout in the terminal
    Run {
        /// Run the clock this many times faster than real time
        #[arg(long, default_value_t = 1.0)]
        time_scale: f64,

        /// Stream synthetic heart rate from a simulated sensor
        #[arg(long)]
        simulate_hr: bool,

        /// Poll heart rate from a CSV file with `time,bpm` rows
        #[arg(long)]
        hr_csv: Option<PathBuf>,

        /// End the workout early after this many seconds of workout time
        #[arg(long)]
        finish_after: Option<f64>,

        /// Only print the final summary
        #[arg(long)]
        quiet: bool,

        /// Do not save the workout
        #[arg(long)]
        dry_run: bool,

        /// Estimate max heart rate from age instead of the configured value
        #[arg(long)]
        age: Option<u32>,
    },

    /// List saved workouts, newest first
    History,

    /// Show per-interval statistics for one workout
    Show {
        /// Workout id
        id: String,
    },

    /// Delete a saved workout
    Delete {
        /// Workout id
        id: String,
    },

    /// Export workout history to CSV
    Export {
        /// Destination file
        path: PathBuf,
    },
}

struct RunOptions {
    zones: HrZoneConfig,
    simulate_hr: bool,
    hr_csv: Option<PathBuf>,
    finish_after: Option<f64>,
    quiet: bool,
    dry_run: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    interval_core::logging::init_with_level(interval_core::logging::level_for_verbosity(
        cli.verbose,
    ));

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let data_dir = cli.data_dir.unwrap_or_else(|| config.data.data_dir.clone());
    let mut store = JsonlWorkoutStore::in_dir(&data_dir);

    match cli.command {
        Some(Commands::Plan { age }) => cmd_plan(&config, age),
        None => cmd_plan(&config, None),
        Some(Commands::Run {
            time_scale,
            simulate_hr,
            hr_csv,
            finish_after,
            quiet,
            dry_run,
            age,
        }) => {
            let opts = RunOptions {
                zones: zone_config(&config, age),
                simulate_hr,
                hr_csv,
                finish_after,
                quiet,
                dry_run,
            };
            // Real-time runs read the system clock directly
            if time_scale == 1.0 {
                cmd_run(SystemClock, &config, &mut store, opts)
            } else {
                cmd_run(ScaledClock::new(time_scale), &config, &mut store, opts)
            }
        }
        Some(Commands::History) => cmd_history(&store),
        Some(Commands::Show { id }) => cmd_show(&store, &id),
        Some(Commands::Delete { id }) => cmd_delete(&mut store, &id),
        Some(Commands::Export { path }) => cmd_export(&store, &path),
    }
}

/// Configured zones, with max HR estimated from `age` when given
fn zone_config(config: &Config, age: Option<u32>) -> HrZoneConfig {
    let zones = config.zone_config();
    match age {
        Some(age) => HrZoneConfig {
            max_hr: max_hr_from_age(age),
            ..zones
        }
        .clamped(),
        None => zones,
    }
}

fn cmd_plan(config: &Config, age: Option<u32>) -> Result<()> {
    let phases = build_phases(&config.timer_settings());
    let zones = zone_config(config, age);
    let (low, high) = target_bounds(&zones);

    println!("\n╭─────────────────────────────────────────╮");
    println!("│  WORKOUT PLAN");
    println!("╰─────────────────────────────────────────╯");
    println!();
    let mut offset = 0u32;
    for phase in phases.iter() {
        println!(
            "  {:>6}  {:<12} {:>6}",
            format_time(f64::from(offset)),
            phase.label,
            format_time(f64::from(phase.duration_sec))
        );
        offset += phase.duration_sec;
    }
    println!();
    println!("  Total: {} ({} phases)", format_time(f64::from(phases.total_duration())), phases.len());
    println!("  Target zone: {:.0}-{:.0} bpm (max HR {})", low, high, zones.max_hr);
    println!();
    Ok(())
}

fn cmd_run<C: Clock + Clone + Send + 'static>(
    clock: C,
    config: &Config,
    store: &mut dyn WorkoutStore,
    opts: RunOptions,
) -> Result<()> {
    let phases = build_phases(&config.timer_settings());

    let audio = AudioOutput::new(Box::new(|| Some(Box::new(TerminalAudio) as Box<dyn AudioDevice>)));
    let cues = CueDispatcher::new(
        config.cues,
        audio,
        Box::new(LoggedHaptics),
        Box::new(NoDisplayWake),
    );
    let mut session = WorkoutSession::new(phases, opts.zones, cues);

    if let Some(path) = &opts.hr_csv {
        session.set_poll_source(Some(PollSource::new(
            Box::new(CsvFetcher::new(path)),
            PollSchedule::new(&config.polling),
        )));
    }
    if opts.simulate_hr {
        // One reading per second of workout time
        let period = Duration::from_secs_f64(1.0 / clock.scale()).max(Duration::from_millis(1));
        let mut sensor = SimulatedSensor::new(period, clock.clone());
        if !session.connect_sensor(&mut sensor) {
            eprintln!("Sensor unavailable, continuing without it");
        }
    }

    let commands = spawn_command_reader();
    if !opts.quiet {
        println!("Commands: p + Enter to pause/resume, m to mute/unmute, q to finish early\n");
    }

    let started = clock.now_ms();
    session.start(started);
    let mut shown_phase = None;

    let record = loop {
        let now = clock.now_ms();

        match commands.try_recv() {
            Ok(UserCommand::TogglePause) => match session.status() {
                TimerStatus::Running => {
                    session.pause(now);
                    if !opts.quiet {
                        println!(
                            "  ⏸ Paused at {}",
                            format_time_tenths(session.timer_state().total_elapsed)
                        );
                    }
                }
                TimerStatus::Paused => {
                    session.resume(now);
                    if !opts.quiet {
                        println!("  ▶ Resumed");
                    }
                }
                TimerStatus::Idle | TimerStatus::Finished => {}
            },
            Ok(UserCommand::ToggleSound) => {
                let gates = *session.cues_mut().gates();
                let audio_enabled = !gates.audio_enabled;
                session.cues_mut().set_gates(CueConfig {
                    audio_enabled,
                    ..gates
                });
                if !opts.quiet {
                    println!("  {}", if audio_enabled { "🔔 Sound on" } else { "🔕 Muted" });
                }
            }
            Ok(UserCommand::Finish) => break session.finish_early(now),
            Err(_) => {}
        }

        if let Some(record) = session.pump(now) {
            break Some(record);
        }

        if !opts.quiet {
            let state = session.timer_state();
            if shown_phase != Some(state.current_phase_index) {
                shown_phase = Some(state.current_phase_index);
                display_phase(state, &session.hr_snapshot());
            }
        }

        if let Some(limit) = opts.finish_after {
            if session.status() == TimerStatus::Running
                && session.timer_state().total_elapsed >= limit
            {
                break session.finish_early(now);
            }
        }

        std::thread::sleep(FRAME);
    };

    session.shutdown();

    let Some(record) = record else {
        println!("Workout ended with nothing to record.");
        return Ok(());
    };

    display_summary(&record);
    if opts.dry_run {
        println!("\n[Dry run - not saving workout]");
    } else {
        store.save(&record)?;
        println!("\n✓ Workout saved: {}", record.id);
    }
    Ok(())
}

fn cmd_history(store: &dyn WorkoutStore) -> Result<()> {
    let records = store.list_all()?;
    if records.is_empty() {
        println!("No workouts recorded yet.");
        return Ok(());
    }

    for record in &records {
        println!(
            "{}  {:>6}  {}  avg {:>5}  max {:>4}  {}",
            local_time(record.started_at),
            format_time(record.duration_sec),
            if record.completed { "✓" } else { "✗" },
            record.avg_hr.map(|hr| format!("{:.0}", hr)).unwrap_or_else(|| "-".into()),
            record.max_hr.map(|hr| hr.to_string()).unwrap_or_else(|| "-".into()),
            record.id
        );
    }
    Ok(())
}

fn cmd_show(store: &JsonlWorkoutStore, id: &str) -> Result<()> {
    let id = parse_id(id)?;
    let record = store
        .get(id)?
        .ok_or_else(|| Error::Storage(format!("No workout with id {}", id)))?;
    display_summary(&record);
    Ok(())
}

fn cmd_delete(store: &mut dyn WorkoutStore, id: &str) -> Result<()> {
    let id = parse_id(id)?;
    if !store.delete_by_id(id)? {
        return Err(Error::Storage(format!("No workout with id {}", id)));
    }
    println!("✓ Deleted workout {}", id);
    Ok(())
}

fn cmd_export(store: &dyn WorkoutStore, path: &Path) -> Result<()> {
    let records = store.list_all()?;
    let count = export_csv(&records, path)?;
    println!("✓ Exported {} workouts to {}", count, path.display());
    Ok(())
}

fn parse_id(id: &str) -> Result<Uuid> {
    Uuid::parse_str(id.trim()).map_err(|e| Error::Other(format!("Invalid workout id {:?}: {}", id, e)))
}

fn local_time(ms: i64) -> String {
    DateTime::from_timestamp_millis(ms)
        .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "?".into())
}

fn display_phase(state: &TimerState, heart_rate: &HrSnapshot) {
    let Some(phase) = state.current_phase() else {
        return;
    };

    let heart = match (heart_rate.current_bpm, heart_rate.zone) {
        (Some(bpm), Some(zone)) => {
            let danger = if heart_rate.is_danger(DEFAULT_DANGER_BPM) { " ⚠" } else { "" };
            format!("  ♥ {} bpm ({}){}", bpm, zone_label(zone), danger)
        }
        _ => String::new(),
    };
    println!(
        "  {:>8} / {}  {:<12} {}{}",
        format_time_tenths(state.total_elapsed),
        format_time(state.total_duration()),
        phase.label,
        format_time(state.remaining_in_phase()),
        heart
    );
}

fn display_summary(record: &WorkoutRecord) {
    println!("\n╭─────────────────────────────────────────╮");
    println!(
        "│  WORKOUT {}",
        if record.completed { "COMPLETE" } else { "ENDED EARLY" }
    );
    println!("╰─────────────────────────────────────────╯");
    println!();
    println!("  Started:  {}", local_time(record.started_at));
    println!("  Duration: {}", format_time(record.duration_sec));
    println!(
        "  Heart rate: avg {} / max {} ({} readings)",
        record.avg_hr.map(|hr| format!("{:.0}", hr)).unwrap_or_else(|| "-".into()),
        record.max_hr.map(|hr| hr.to_string()).unwrap_or_else(|| "-".into()),
        record.all_readings.len()
    );

    if !record.intervals.is_empty() {
        println!();
        for interval in &record.intervals {
            println!(
                "  Interval {}: avg {:>4}  max {:>4}  in zone {}",
                interval.interval_number,
                interval.avg_hr.map(|hr| format!("{:.0}", hr)).unwrap_or_else(|| "-".into()),
                interval.max_hr.map(|hr| hr.to_string()).unwrap_or_else(|| "-".into()),
                format_time(interval.time_in_zone_sec)
            );
        }
    }
}

enum UserCommand {
    TogglePause,
    ToggleSound,
    Finish,
}

/// Read commands from stdin on a background thread.
///
/// The thread ends quietly when stdin closes, so a non-interactive run just
/// never receives a command.
fn spawn_command_reader() -> Receiver<UserCommand> {
    let (tx, rx) = mpsc::channel();
    let spawned = std::thread::Builder::new()
        .name("stdin-commands".into())
        .spawn(move || {
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                let command = match line.trim().to_lowercase().as_str() {
                    "p" => UserCommand::TogglePause,
                    "m" => UserCommand::ToggleSound,
                    "q" => UserCommand::Finish,
                    _ => continue,
                };
                if tx.send(command).is_err() {
                    break;
                }
            }
        });
    if let Err(e) = spawned {
        tracing::warn!("Keyboard commands unavailable: {}", e);
    }
    rx
}
