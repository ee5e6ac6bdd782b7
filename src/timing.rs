use std::time::Duration;

use rand::Rng;

use crate::config::{PauseRange, TypingConfig};
use crate::control::{MAX_SPEED, MIN_SPEED};
use crate::model::PauseKind;

impl TypingConfig {
    pub fn range_for(&self, kind: PauseKind) -> PauseRange {
        match kind {
            PauseKind::Keystroke => self.base_delay,
            PauseKind::Thinking => self.thinking_pause,
            PauseKind::Sentence => self.sentence_pause,
            PauseKind::Comma => self.comma_pause,
            PauseKind::Paragraph => self.sentence_pause.scaled(2),
        }
    }
}

/// Draw a pause for `kind` (or `range_override`) and scale it by the speed
/// multiplier. Pure: the caller does the sleeping.
pub fn delay(
    cfg: &TypingConfig,
    kind: PauseKind,
    range_override: Option<PauseRange>,
    speed: f64,
    rng: &mut impl Rng,
) -> Duration {
    let range = range_override.unwrap_or_else(|| cfg.range_for(kind));
    Duration::from_secs_f64(delay_ms(range, speed, rng) / 1000.0)
}

/// Uniform draw in `range`, divided by `speed`. Reversed ranges are swapped.
pub fn delay_ms(range: PauseRange, speed: f64, rng: &mut impl Rng) -> f64 {
    let lo = range.min_ms.min(range.max_ms) as f64;
    let hi = range.min_ms.max(range.max_ms) as f64;
    let base = if lo == hi { lo } else { rng.gen_range(lo..=hi) };

    let speed = if speed.is_finite() {
        speed.clamp(MIN_SPEED, MAX_SPEED)
    } else {
        1.0
    };
    base / speed
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn mean_ms(range: PauseRange, speed: f64, seed: u64) -> f64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let n = 2000;
        (0..n).map(|_| delay_ms(range, speed, &mut rng)).sum::<f64>() / n as f64
    }

    #[test]
    fn stays_inside_scaled_range() {
        let mut rng = StdRng::seed_from_u64(7);
        let range = PauseRange::new(30, 150);
        for _ in 0..500 {
            let ms = delay_ms(range, 2.0, &mut rng);
            assert!((15.0..=75.0).contains(&ms), "{ms}");
        }
    }

    #[test]
    fn faster_speed_means_shorter_delays() {
        let range = PauseRange::new(100, 300);
        let slow = mean_ms(range, 1.0, 11);
        let fast = mean_ms(range, 2.0, 11);

        assert!(fast < slow);
        // Same seed, same draws: the ratio is exactly the speed ratio.
        assert!((slow / fast - 2.0).abs() < 1e-9, "{slow} / {fast}");
        assert!((slow - 200.0).abs() < 10.0, "mean {slow}");
    }

    #[test]
    fn reversed_range_is_swapped() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..100 {
            let ms = delay_ms(PauseRange::new(500, 200), 1.0, &mut rng);
            assert!((200.0..=500.0).contains(&ms));
        }
    }

    #[test]
    fn paragraph_pause_doubles_sentence_range() {
        let cfg = TypingConfig::default();
        assert_eq!(
            cfg.range_for(PauseKind::Paragraph),
            PauseRange::new(cfg.sentence_pause.min_ms * 2, cfg.sentence_pause.max_ms * 2)
        );
    }

    #[test]
    fn override_wins_over_kind() {
        let cfg = TypingConfig::default();
        let mut rng = StdRng::seed_from_u64(1);
        let d = delay(
            &cfg,
            PauseKind::Sentence,
            Some(PauseRange::new(40, 40)),
            4.0,
            &mut rng,
        );
        assert_eq!(d, Duration::from_millis(10));
    }
}
