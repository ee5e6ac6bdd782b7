use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;

use typesim::assistant::openrouter::OpenRouterAssistant;
use typesim::assistant::{Offline, RephraseAssistant};
use typesim::config::{
    base_config, default_config_path, save_config, validate_config, Preset, TypingConfig,
};
use typesim::control::Control;
use typesim::engine::{self, Outcome, SessionOptions, ThreadClock};
use typesim::keyboard::find_first_unsupported_char;
use typesim::model::{Action, Journal};
use typesim::playback::{self, PlaybackBackend};
use typesim::sim::{self, RecordingActuator, VirtualClock};

const DEFAULT_AI_MODEL: &str = typesim::assistant::openrouter::DEFAULT_MODEL;
const JOURNAL_VERSION: u32 = 1;

#[derive(Debug, Args, Clone)]
struct TypingArgs {
    /// Behaviour preset used as the base configuration. Without one, saved
    /// settings are used if present, else `realistic`.
    #[arg(long, value_enum)]
    preset: Option<Preset>,

    /// JSON configuration file (replaces the preset). Missing keys use defaults.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Per-character typo probability (0.0-1.0)
    #[arg(long)]
    typo_rate: Option<f64>,

    /// Per-word-boundary edit probability (0.0-1.0)
    #[arg(long)]
    edit_rate: Option<f64>,

    /// Share of edits that rephrase part of an earlier sentence (0.0-1.0)
    #[arg(long)]
    rephrase_rate: Option<f64>,

    /// Starting speed multiplier (0.1-5.0)
    #[arg(long)]
    speed: Option<f64>,

    /// Never consult the rephrase assistant.
    #[arg(long)]
    no_ai: bool,

    /// OpenRouter model name.
    #[arg(long, default_value_t = DEFAULT_AI_MODEL.to_string())]
    ai_model: String,

    /// Give up on an assistant request after this many milliseconds.
    #[arg(long, default_value_t = 4000)]
    ai_timeout_ms: u64,

    /// How often pauses re-check for stop and pause requests.
    #[arg(long, default_value_t = 100)]
    poll_ms: u64,
}

#[derive(Debug, Parser)]
#[command(name = "typesim")]
#[command(about = "Human-like typing simulator for Wayland and X11", long_about = None)]
struct Cli {
    /// More log output (-v info, -vv debug). RUST_LOG overrides.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Type a text into the currently focused window
    Run {
        /// Input text file, or '-' for stdin
        #[arg(long, value_name = "PATH")]
        input: PathBuf,

        /// Keystroke backend.
        ///
        /// - auto: choose a backend based on the runtime environment
        /// - wayland: force Wayland (virtual keyboard)
        /// - x11: force X11 (XTEST)
        #[arg(long, value_enum, default_value_t = PlaybackBackend::Auto)]
        backend: PlaybackBackend,

        /// Wayland seat name to attach the virtual keyboard to (e.g. seat0, seat1).
        #[arg(long, value_name = "NAME")]
        seat: Option<String>,

        /// Countdown seconds before typing starts (defaults to the config value)
        #[arg(long)]
        countdown: Option<u64>,

        /// Disable console typing trace output
        #[arg(long)]
        no_trace: bool,

        /// Do not listen for F9 / Esc / Ctrl+= / Ctrl+- hotkeys
        #[arg(long)]
        no_hotkeys: bool,

        /// Save the session journal (JSON) for later replay
        #[arg(long, value_name = "PATH")]
        record: Option<PathBuf>,

        /// Optional RNG seed (for debugging)
        #[arg(long)]
        seed: Option<u64>,

        #[command(flatten)]
        typing: TypingArgs,
    },

    /// Type into an in-memory buffer and print the journal
    Simulate {
        /// Input text file, or '-' for stdin
        #[arg(long, value_name = "PATH")]
        input: PathBuf,

        /// Output journal file (defaults to stdout)
        #[arg(long, value_name = "PATH")]
        output: Option<PathBuf>,

        /// Optional RNG seed (for debugging)
        #[arg(long)]
        seed: Option<u64>,

        #[command(flatten)]
        typing: TypingArgs,
    },

    /// Re-type a recorded journal into the focused window
    Replay {
        /// Journal file (JSON)
        #[arg(long, value_name = "PATH")]
        journal: PathBuf,

        #[arg(long, value_enum, default_value_t = PlaybackBackend::Auto)]
        backend: PlaybackBackend,

        /// Wayland seat name to attach the virtual keyboard to.
        #[arg(long, value_name = "NAME")]
        seat: Option<String>,

        /// Countdown seconds before playback starts (defaults to the journal's config)
        #[arg(long)]
        countdown: Option<u64>,

        /// Disable console typing trace output
        #[arg(long)]
        no_trace: bool,

        /// Do not listen for F9 / Esc / Ctrl+= / Ctrl+- hotkeys
        #[arg(long)]
        no_hotkeys: bool,

        #[arg(long, default_value_t = 100)]
        poll_ms: u64,
    },

    /// Print or export the effective configuration
    Config {
        /// Write the configuration here instead of stdout
        #[arg(long, value_name = "PATH")]
        output: Option<PathBuf>,

        /// List the presets and exit
        #[arg(long)]
        list_presets: bool,

        /// Save the effective configuration as the default settings
        #[arg(long, conflicts_with_all = ["output", "reset"])]
        save: bool,

        /// Overwrite the saved settings with the built-in defaults
        #[arg(long, conflicts_with = "output")]
        reset: bool,

        #[command(flatten)]
        typing: TypingArgs,
    },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn read_input(path: &Path) -> Result<String> {
    if path.as_os_str() == std::ffi::OsStr::new("-") {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read stdin")?;
        return Ok(buf);
    }

    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn write_output(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))
}

/// Reject text that cannot be typed on a US layout before anything is sent.
fn validate_text(text: &str) -> Result<()> {
    let Some((byte_idx, c)) = find_first_unsupported_char(text) else {
        return Ok(());
    };

    let before = &text[..byte_idx];
    let line = before.matches('\n').count() + 1;
    let col = before
        .rsplit('\n')
        .next()
        .map(|s| s.chars().count())
        .unwrap_or(0)
        + 1;
    Err(anyhow!(
        "unsupported character {c:?} (U+{:04X}) at line {line}, column {col}; only US-QWERTY ASCII text can be typed",
        c as u32
    ))
}

fn build_config(args: &TypingArgs) -> Result<TypingConfig> {
    let saved = default_config_path();
    let mut cfg = base_config(args.config.as_deref(), args.preset, saved.as_deref())?;

    if let Some(p) = args.typo_rate {
        cfg.typo_probability = p;
    }
    if let Some(p) = args.edit_rate {
        cfg.edit_probability = p;
    }
    if let Some(p) = args.rephrase_rate {
        cfg.sentence_rephrase_probability = p;
    }
    if let Some(speed) = args.speed {
        cfg.speed_multiplier = speed;
    }
    if args.no_ai {
        cfg.use_ai = false;
    }

    validate_config(&cfg).context("invalid typing configuration")?;
    Ok(cfg)
}

fn build_assistant(cfg: &TypingConfig, args: &TypingArgs) -> Box<dyn RephraseAssistant> {
    if !cfg.use_ai {
        return Box::new(Offline);
    }

    let assistant = OpenRouterAssistant::from_env().map(|a| {
        a.with_model(args.ai_model.clone())
            .with_timeout(Duration::from_millis(args.ai_timeout_ms))
    });
    match assistant {
        Ok(assistant) => Box::new(assistant),
        Err(err) => {
            if cfg!(feature = "llm") {
                log::warn!("rephrase assistant unavailable ({err:#}); using local fallbacks");
            } else {
                log::info!("rephrase assistant unavailable ({err:#}); using local fallbacks");
            }
            Box::new(Offline)
        }
    }
}

fn rng_from_seed(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

fn install_ctrlc(control: &Control) -> Result<()> {
    let control = control.clone();
    ctrlc::set_handler(move || {
        eprintln!("\nStopping...");
        control.request_stop();
    })
    .context("failed to install Ctrl+C handler")
}

#[cfg(feature = "x11")]
type Hotkeys = typesim::hotkeys::HotkeyListener;

#[cfg(not(feature = "x11"))]
type Hotkeys = ();

#[cfg(feature = "x11")]
fn start_hotkeys(control: &Control) -> Option<Hotkeys> {
    match typesim::hotkeys::HotkeyListener::spawn(control.clone()) {
        Ok(listener) => {
            eprintln!("Hotkeys: F9 pause/resume, Esc stop, Ctrl+= faster, Ctrl+- slower");
            Some(listener)
        }
        Err(err) => {
            log::warn!("hotkeys unavailable ({err:#}); use Ctrl+C to stop");
            None
        }
    }
}

#[cfg(not(feature = "x11"))]
fn start_hotkeys(_control: &Control) -> Option<Hotkeys> {
    log::warn!("hotkeys need the x11 feature; use Ctrl+C to stop");
    None
}

fn print_stats(label: &str, actions: &[Action]) {
    let stats = sim::stats(actions);
    eprintln!(
        "{label}: {} actions, {} chars typed, {} backspaces, ~{:.1} min ({:.1}s thinking)",
        stats.actions,
        stats.chars_typed,
        stats.backspaces,
        (stats.total_wait_ms as f64) / 1000.0 / 60.0,
        (stats.thinking_ms as f64) / 1000.0,
    );
}

fn journal_json(journal: &Journal) -> Result<String> {
    serde_json::to_string_pretty(journal).context("failed to serialize journal")
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Run {
            input,
            backend,
            seat,
            countdown,
            no_trace,
            no_hotkeys,
            record,
            seed,
            typing,
        } => {
            // Fail fast on unsupported environments/backends.
            playback::preflight_backend(backend, seat.as_deref())?;

            let text = read_input(&input)?;
            validate_text(&text)?;
            let cfg = build_config(&typing)?;
            let assistant = build_assistant(&cfg, &typing);

            let control = Control::new();
            install_ctrlc(&control)?;

            if !playback::countdown(countdown.unwrap_or(cfg.countdown_seconds), &control) {
                eprintln!("Aborted before typing started.");
                return Ok(());
            }

            let actuator = playback::open_actuator(backend, seat.as_deref(), &control)?;
            let _hotkeys = if no_hotkeys {
                None
            } else {
                start_hotkeys(&control)
            };

            let options = SessionOptions {
                poll_interval: Duration::from_millis(typing.poll_ms),
                trace: !no_trace,
            };
            let mut session = engine::Session::new(
                actuator,
                ThreadClock,
                rng_from_seed(seed),
                cfg.clone(),
                control,
            )
            .with_assistant(assistant)
            .with_options(options);

            let report = session.run_unless_stopped(&text)?;
            match report.outcome {
                Outcome::Completed => eprintln!("Done."),
                Outcome::Stopped => eprintln!(
                    "Stopped after {}/{} chars.",
                    report.cursor,
                    text.chars().count()
                ),
            }
            eprintln!(
                "{} typos, {} edits, {} sentence rephrases",
                report.typos,
                report.edits,
                report.rephrased.len()
            );
            print_stats("Session", &report.journal);

            if let Some(path) = record {
                let journal = Journal {
                    version: JOURNAL_VERSION,
                    config: cfg,
                    seed,
                    actions: report.journal,
                };
                write_output(&path, &journal_json(&journal)?)?;
                log::info!("journal written to {}", path.display());
            }
        }
        Command::Simulate {
            input,
            output,
            seed,
            typing,
        } => {
            let text = read_input(&input)?;
            validate_text(&text)?;
            let cfg = build_config(&typing)?;
            let assistant = build_assistant(&cfg, &typing);

            let mut session = engine::Session::new(
                RecordingActuator::new(),
                VirtualClock::new(),
                rng_from_seed(seed),
                cfg.clone(),
                Control::new(),
            )
            .with_assistant(assistant)
            .with_options(SessionOptions {
                poll_interval: Duration::ZERO,
                trace: false,
            });

            let report = session.run(&text)?;
            let visible = session.actuator().visible_text();
            if visible != text {
                return Err(anyhow!(
                    "simulated output diverged from the input ({} vs {} chars)",
                    visible.chars().count(),
                    text.chars().count()
                ));
            }

            eprintln!(
                "Simulated: {} typos, {} edits, {} sentence rephrases",
                report.typos,
                report.edits,
                report.rephrased.len()
            );
            print_stats("Journal", &report.journal);

            let journal = Journal {
                version: JOURNAL_VERSION,
                config: cfg,
                seed,
                actions: report.journal,
            };
            let json = journal_json(&journal)?;
            match output {
                Some(path) => write_output(&path, &json)?,
                None => println!("{json}"),
            }
        }
        Command::Replay {
            journal,
            backend,
            seat,
            countdown,
            no_trace,
            no_hotkeys,
            poll_ms,
        } => {
            playback::preflight_backend(backend, seat.as_deref())?;

            let json = fs::read_to_string(&journal)
                .with_context(|| format!("failed to read {}", journal.display()))?;
            let journal: Journal =
                serde_json::from_str(&json).context("failed to parse journal JSON")?;
            if journal.version != JOURNAL_VERSION {
                return Err(anyhow!(
                    "unsupported journal version {}; expected {JOURNAL_VERSION}",
                    journal.version
                ));
            }
            print_stats("Replaying", &journal.actions);

            let control = Control::new();
            install_ctrlc(&control)?;

            let secs = countdown.unwrap_or(journal.config.countdown_seconds);
            if !playback::countdown(secs, &control) {
                eprintln!("Aborted before typing started.");
                return Ok(());
            }

            let mut actuator = playback::open_actuator(backend, seat.as_deref(), &control)?;
            let _hotkeys = if no_hotkeys {
                None
            } else {
                start_hotkeys(&control)
            };

            let options = SessionOptions {
                poll_interval: Duration::from_millis(poll_ms),
                trace: !no_trace,
            };
            match engine::replay(
                &journal.actions,
                actuator.as_mut(),
                ThreadClock,
                control,
                &options,
            )? {
                Outcome::Completed => eprintln!("Done."),
                Outcome::Stopped => eprintln!("Stopped."),
            }
        }
        Command::Config {
            output,
            list_presets,
            save,
            reset,
            typing,
        } => {
            if list_presets {
                for preset in Preset::ALL {
                    let name = clap::ValueEnum::to_possible_value(&preset)
                        .map(|v| v.get_name().to_string())
                        .unwrap_or_default();
                    println!("{name:<14}{}", preset.description());
                }
                return Ok(());
            }

            if save || reset {
                let path = default_config_path()
                    .ok_or_else(|| anyhow!("no home directory to save settings in"))?;
                let cfg = if reset {
                    TypingConfig::default()
                } else {
                    build_config(&typing)?
                };
                save_config(&path, &cfg)?;
                eprintln!("Saved settings to {}", path.display());
                return Ok(());
            }

            let cfg = build_config(&typing)?;
            match output {
                Some(path) => {
                    save_config(&path, &cfg)?;
                    eprintln!("Wrote {}", path.display());
                }
                None => {
                    let json =
                        serde_json::to_string_pretty(&cfg).context("failed to serialize config")?;
                    println!("{json}");
                }
            }
        }
    }

    Ok(())
}
