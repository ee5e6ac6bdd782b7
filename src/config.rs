use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{ensure, Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::control::{MAX_SPEED, MIN_SPEED};

/// Inclusive millisecond range a randomized pause is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PauseRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl PauseRange {
    pub const fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    pub fn scaled(self, factor: u64) -> Self {
        Self {
            min_ms: self.min_ms.saturating_mul(factor),
            max_ms: self.max_ms.saturating_mul(factor),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TypingConfig {
    /// Chance of hitting a neighbouring key, per character.
    pub typo_probability: f64,
    /// Chance of going back to revise something, per eligible word boundary.
    pub edit_probability: f64,
    /// Share of revisions that try to rephrase part of an earlier sentence.
    pub sentence_rephrase_probability: f64,
    pub base_delay: PauseRange,
    pub thinking_pause: PauseRange,
    pub sentence_pause: PauseRange,
    pub comma_pause: PauseRange,
    /// Consult the rephrase assistant (when one is available).
    pub use_ai: bool,
    pub countdown_seconds: u64,
    pub speed_multiplier: f64,
}

impl Default for TypingConfig {
    fn default() -> Self {
        Preset::Realistic.config()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preset {
    /// Quick typing with minimal pauses.
    Fast,
    /// Deliberate typing with lots of thinking.
    Slow,
    /// Most human-like behavior.
    Realistic,
    /// Lots of typos and corrections.
    Chaotic,
    /// Clean, fast typing with few mistakes.
    Professional,
}

impl Preset {
    pub const ALL: [Preset; 5] = [
        Preset::Fast,
        Preset::Slow,
        Preset::Realistic,
        Preset::Chaotic,
        Preset::Professional,
    ];

    pub fn config(self) -> TypingConfig {
        let (probs, ranges, use_ai, speed_multiplier) = match self {
            Preset::Fast => (
                (0.03, 0.10, 0.15),
                [(20, 80), (200, 800), (400, 1200), (100, 300)],
                false,
                1.5,
            ),
            Preset::Slow => (
                (0.12, 0.25, 0.40),
                [(50, 200), (1000, 3000), (1500, 4000), (400, 1000)],
                true,
                0.7,
            ),
            Preset::Realistic => (
                (0.08, 0.18, 0.30),
                [(30, 150), (500, 2000), (800, 2500), (200, 600)],
                true,
                1.0,
            ),
            Preset::Chaotic => (
                (0.20, 0.35, 0.50),
                [(25, 180), (300, 1500), (600, 2000), (150, 500)],
                true,
                1.2,
            ),
            Preset::Professional => (
                (0.04, 0.12, 0.20),
                [(25, 120), (400, 1500), (600, 2000), (150, 400)],
                true,
                1.3,
            ),
        };

        let [base, thinking, sentence, comma] = ranges.map(|(lo, hi)| PauseRange::new(lo, hi));
        TypingConfig {
            typo_probability: probs.0,
            edit_probability: probs.1,
            sentence_rephrase_probability: probs.2,
            base_delay: base,
            thinking_pause: thinking,
            sentence_pause: sentence,
            comma_pause: comma,
            use_ai,
            countdown_seconds: 3,
            speed_multiplier,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Preset::Fast => "Quick typing with minimal pauses",
            Preset::Slow => "Deliberate typing with lots of thinking",
            Preset::Realistic => "Most human-like typing behavior",
            Preset::Chaotic => "Lots of typos and corrections",
            Preset::Professional => "Clean, fast typing with few mistakes",
        }
    }
}

fn validate_range(name: &str, range: PauseRange) -> Result<()> {
    ensure!(
        range.min_ms <= range.max_ms,
        "{name}: min_ms ({}) must be <= max_ms ({})",
        range.min_ms,
        range.max_ms
    );
    ensure!(range.max_ms <= 60_000, "{name}: max_ms must be <= 60000");
    Ok(())
}

pub fn validate_config(cfg: &TypingConfig) -> Result<()> {
    for (name, p) in [
        ("typo_probability", cfg.typo_probability),
        ("edit_probability", cfg.edit_probability),
        ("sentence_rephrase_probability", cfg.sentence_rephrase_probability),
    ] {
        ensure!(
            (0.0..=1.0).contains(&p),
            "{name} must be between 0.0 and 1.0"
        );
    }

    validate_range("base_delay", cfg.base_delay)?;
    validate_range("thinking_pause", cfg.thinking_pause)?;
    validate_range("sentence_pause", cfg.sentence_pause)?;
    validate_range("comma_pause", cfg.comma_pause)?;

    ensure!(
        cfg.speed_multiplier.is_finite(),
        "speed_multiplier must be finite"
    );
    ensure!(
        (MIN_SPEED..=MAX_SPEED).contains(&cfg.speed_multiplier),
        "speed_multiplier must be between {MIN_SPEED} and {MAX_SPEED}"
    );

    Ok(())
}

/// Load a configuration file. Missing keys take their default value.
pub fn load_config(path: &Path) -> Result<TypingConfig> {
    let json =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let cfg: TypingConfig = serde_json::from_str(&json)
        .with_context(|| format!("failed to parse config JSON in {}", path.display()))?;
    validate_config(&cfg).with_context(|| format!("invalid config in {}", path.display()))?;
    Ok(cfg)
}

/// Where saved settings live when no `--config` is given:
/// `~/.typesim/config.json`, or the platform config dir without `HOME`.
pub fn default_config_path() -> Option<PathBuf> {
    match std::env::var_os("HOME").filter(|home| !home.is_empty()) {
        Some(home) => Some(PathBuf::from(home).join(".typesim").join("config.json")),
        None => ProjectDirs::from("", "", "typesim")
            .map(|dirs| dirs.config_dir().join("config.json")),
    }
}

/// Like [`load_config`], but a file that does not exist yet is `None`.
pub fn load_saved_config(path: &Path) -> Result<Option<TypingConfig>> {
    if !path.exists() {
        return Ok(None);
    }
    load_config(path).map(Some)
}

/// Pick the base settings: an explicit file, then an explicit preset, then
/// the saved settings at `saved`, then the realistic preset.
pub fn base_config(
    explicit: Option<&Path>,
    preset: Option<Preset>,
    saved: Option<&Path>,
) -> Result<TypingConfig> {
    if let Some(path) = explicit {
        return load_config(path);
    }
    if let Some(preset) = preset {
        return Ok(preset.config());
    }
    if let Some(path) = saved {
        if let Some(cfg) = load_saved_config(path)? {
            log::info!("using saved settings from {}", path.display());
            return Ok(cfg);
        }
    }
    Ok(Preset::Realistic.config())
}

pub fn save_config(path: &Path, cfg: &TypingConfig) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(cfg).context("failed to serialize config")?;
    fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))
}
