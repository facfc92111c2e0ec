use std::cell::Cell;
use std::io::{self, Write};
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand, ValueEnum};
use log::warn;

use horo::alarm::model::parse_weekdays;
use horo::diagnostics;
use horo::format::{TimeDisplayMode, format_date_line, format_stopwatch};
use horo::notifier::TerminalNotifier;
use horo::preferences::{JsonFileStore, Preferences, ThemeMode, system_prefers_dark};
use horo::runtime::{Runtime, RuntimeEvent};
use horo::time_source::{SystemTimeSource, to_local_datetime};

#[derive(Parser, Debug)]
#[command(
    name = "horo",
    version,
    about = "Aligned terminal clock, stopwatch and alarm list"
)]
struct Cli {
    /// Increase log verbosity (-d info, -dd debug, -ddd trace). RUST_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    debug: u8,

    /// Settings file holding the theme and time-format preferences.
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the live clock and ring alarms as they come due.
    Clock {
        /// Stop after this many aligned ticks (runs until interrupted otherwise).
        #[arg(long)]
        ticks: Option<u64>,

        /// Alarm as HH:MM, HH:MM=LABEL or HH:MM=LABEL@Mon,Tue (repeatable).
        #[arg(long = "alarm")]
        alarms: Vec<String>,

        /// Print events as JSON lines.
        #[arg(long)]
        json: bool,
    },
    /// Run the stopwatch for a fixed time, lapping on a cadence.
    Stopwatch {
        #[arg(long, default_value = "3s")]
        duration: String,

        #[arg(long)]
        lap_every: Option<String>,

        #[arg(long)]
        json: bool,
    },
    /// Show or change the colour theme.
    Theme {
        #[arg(value_enum, default_value_t = ThemeAction::Show)]
        action: ThemeAction,
    },
    /// Show or change the 12/24-hour clock format.
    TimeFormat {
        #[arg(value_enum, default_value_t = FormatAction::Show)]
        action: FormatAction,
    },
    /// Format an elapsed millisecond count the way the stopwatch shows it.
    Elapsed { ms: u64 },
    /// Measure how closely aligned ticks land on second boundaries.
    Diagnostics {
        #[arg(long, default_value_t = 3)]
        ticks: u32,
    },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum ThemeAction {
    Show,
    Dark,
    Light,
    Toggle,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum FormatAction {
    Show,
    #[value(name = "12")]
    Hour12,
    #[value(name = "24")]
    Hour24,
    Toggle,
}

fn main() {
    let cli = Cli::parse();
    let log_level = match cli.debug {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    if let Err(err) = run(cli) {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Elapsed { ms } => {
            println!("{}", format_stopwatch(ms));
            Ok(())
        }
        Command::Diagnostics { ticks } => {
            if ticks == 0 {
                bail!("--ticks must be greater than zero");
            }
            let stdout = io::stdout();
            diagnostics::run_diagnostics(&SystemTimeSource, ticks, &mut stdout.lock())
        }
        Command::Theme { action } => {
            let mut preferences = load_preferences(cli.settings)?;
            let theme = match action {
                ThemeAction::Show => preferences.theme(),
                ThemeAction::Dark => preferences.set_theme(ThemeMode::Dark),
                ThemeAction::Light => preferences.set_theme(ThemeMode::Light),
                ThemeAction::Toggle => preferences.toggle_theme(),
            };
            println!("{}", theme.as_store_value());
            Ok(())
        }
        Command::TimeFormat { action } => {
            let mut preferences = load_preferences(cli.settings)?;
            let format = match action {
                FormatAction::Show => preferences.clock_format(),
                FormatAction::Hour12 => preferences.set_clock_format(TimeDisplayMode::Hour12),
                FormatAction::Hour24 => preferences.set_clock_format(TimeDisplayMode::Hour24),
                FormatAction::Toggle => preferences.toggle_clock_format(),
            };
            println!("{}h", format.as_store_value());
            Ok(())
        }
        Command::Clock {
            ticks,
            alarms,
            json,
        } => run_clock(cli.settings, ticks, &alarms, json),
        Command::Stopwatch {
            duration,
            lap_every,
            json,
        } => run_stopwatch(cli.settings, &duration, lap_every.as_deref(), json),
    }
}

fn default_settings_path() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("", "", "horo")
        .ok_or_else(|| anyhow!("unable to determine a config directory; pass --settings"))?;
    Ok(dirs.config_dir().join("settings.json"))
}

fn load_preferences(settings: Option<PathBuf>) -> Result<Preferences> {
    let path = match settings {
        Some(path) => path,
        None => default_settings_path()?,
    };
    let prefers_dark = system_prefers_dark(std::env::var("COLORFGBG").ok().as_deref());
    let store = Box::new(JsonFileStore::new(path));
    Ok(Preferences::load(store, prefers_dark))
}

fn build_runtime(settings: Option<PathBuf>) -> Result<Runtime> {
    let preferences = load_preferences(settings)?;
    Ok(Runtime::new(
        Box::new(SystemTimeSource),
        preferences,
        Box::new(TerminalNotifier::new(io::stdout())),
    ))
}

fn print_event(event: &RuntimeEvent, json: bool) {
    if json {
        match serde_json::to_string(event) {
            Ok(line) => println!("{line}"),
            Err(err) => warn!("failed to serialize event: {err}"),
        }
        return;
    }
    if let RuntimeEvent::ClockTick { display, .. } = event {
        println!("{display}");
    }
}

fn run_clock(
    settings: Option<PathBuf>,
    ticks: Option<u64>,
    alarms: &[String],
    json: bool,
) -> Result<()> {
    let mut runtime = build_runtime(settings)?;
    for raw in alarms {
        let (time, label, days) = split_alarm_arg(raw);
        let days = match days.map(parse_weekdays).transpose() {
            Ok(days) => days.unwrap_or_default(),
            Err(err) => {
                warn!("ignoring alarm '{raw}': {err}");
                continue;
            }
        };
        if let Err(err) = runtime.add_alarm(time, label, days) {
            warn!("ignoring alarm '{raw}': {err}");
        }
    }

    if !json {
        let today = to_local_datetime(runtime.now_ms())?;
        println!("{}", format_date_line(&today));
    }

    let seen = Rc::new(Cell::new(0_u64));
    let counter = Rc::clone(&seen);
    runtime.subscribe(move |event| {
        if matches!(event, RuntimeEvent::ClockTick { .. }) {
            counter.set(counter.get() + 1);
        }
        print_event(event, json);
    });

    log::info!("clock running on {}", runtime.source_label());
    runtime.mount()?;
    // The mount tick shows the current time; `--ticks` counts aligned ticks after it.
    let limit = ticks.map(|n| n.saturating_add(1));
    runtime.run_until(|_| limit.is_some_and(|limit| seen.get() >= limit))?;
    runtime.unmount();
    io::stdout().flush().context("failed to flush stdout")?;
    Ok(())
}

fn run_stopwatch(
    settings: Option<PathBuf>,
    duration: &str,
    lap_every: Option<&str>,
    json: bool,
) -> Result<()> {
    let duration = parse_duration_token(duration)?;
    let lap_every = lap_every.map(parse_duration_token).transpose()?;
    let mut runtime = build_runtime(settings)?;
    runtime.subscribe(move |event| {
        if json && matches!(event, RuntimeEvent::Stopwatch(_)) {
            print_event(event, json);
        }
    });

    let started_at = runtime.now_ms();
    let end_at = deadline_after(started_at, duration);
    let mut next_lap_at = lap_every.map(|every| deadline_after(started_at, every));
    runtime.start_stopwatch();
    loop {
        runtime.run_until(|rt| {
            rt.now_ms() >= end_at || next_lap_at.is_some_and(|at| rt.now_ms() >= at)
        })?;
        if runtime.now_ms() >= end_at {
            break;
        }
        if let (Some(at), Some(every)) = (next_lap_at, lap_every) {
            runtime.lap();
            next_lap_at = Some(deadline_after(at, every));
        }
    }
    runtime.pause_stopwatch();

    if !json {
        let stopwatch = runtime.stopwatch();
        println!("{}", format_stopwatch(stopwatch.elapsed_ms()));
        for lap in stopwatch.laps_newest_first() {
            println!(
                "Lap {}  {}  {}",
                lap.number,
                format_stopwatch(lap.split_ms),
                format_stopwatch(lap.cumulative_ms)
            );
        }
    }
    runtime.unmount();
    Ok(())
}

/// Splits `HH:MM[=LABEL][@DAYS]`.
fn split_alarm_arg(arg: &str) -> (&str, Option<&str>, Option<&str>) {
    let (rest, days) = match arg.split_once('@') {
        Some((rest, days)) => (rest, Some(days)),
        None => (arg, None),
    };
    match rest.split_once('=') {
        Some((time, label)) => (time, Some(label), days),
        None => (rest, None, days),
    }
}

/// `start_ms + duration`, pinned at `i64::MAX` for absurdly long durations.
fn deadline_after(start_ms: i64, duration: Duration) -> i64 {
    let duration_ms = i64::try_from(duration.as_millis()).unwrap_or(i64::MAX);
    start_ms.saturating_add(duration_ms)
}

fn parse_duration_token(token: &str) -> Result<Duration> {
    let token = token.trim();
    let (raw, scale_ms) = if let Some(raw) = token.strip_suffix("ms") {
        (raw, 1)
    } else if let Some(raw) = token.strip_suffix('s') {
        (raw, 1_000)
    } else if let Some(raw) = token.strip_suffix('m') {
        (raw, 60_000)
    } else if let Some(raw) = token.strip_suffix('h') {
        (raw, 3_600_000)
    } else {
        (token, 1_000)
    };
    let value: u64 = raw
        .parse()
        .with_context(|| format!("invalid duration '{token}'"))?;
    if value == 0 {
        bail!("duration must be > 0");
    }
    Ok(Duration::from_millis(value.saturating_mul(scale_ms)))
}
