//! Backward revisions: the detours a writer takes through text they have
//! already typed.
//!
//! A plan is a value. The engine replays its steps against the actuator; the
//! source text is never edited. Every plan leaves the visible buffer equal to
//! `text[..plan.resume_at]` once all steps have run.

use std::collections::HashSet;

use rand::Rng;

use crate::assistant::{accept_rephrase, RephraseAssistant, FALLBACK_FILLERS};
use crate::config::{PauseRange, TypingConfig};
use crate::keyboard::is_typeable;
use crate::typo::neighbor_key;

/// Minimum progress before a sentence rephrase is considered.
pub const REPHRASE_MIN_POSITION: usize = 50;
const REPHRASE_LOOKBACK_MIN: usize = 50;
const REPHRASE_LOOKBACK_MAX: usize = 200;
const REPHRASE_MIN_SENTENCE_CHARS: usize = 10;
const REPHRASE_MIN_WORDS: usize = 3;
const REPHRASE_MAX_WORDS: usize = 8;

const LOOKBACK_BANDS: [(usize, usize); 3] = [(0, 20), (20, 50), (50, 150)];
const SIMILAR_WORD_COUNT: usize = 3;
const SIMILAR_WORD_SHARE: f64 = 0.6;
const SUFFIX_PROBABILITY: f64 = 0.3;
const SUFFIXES: [&str; 3] = ["er", "ly", "ing"];

const SENTENCE_END: [char; 3] = ['.', '!', '?'];

pub fn is_boundary_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\n' | '\t')
}

/// Sentence spans already picked for a rephrase attempt in this session.
#[derive(Debug, Clone, Default)]
pub struct RephrasedSpans {
    spans: HashSet<(usize, usize)>,
}

impl RephrasedSpans {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `span`. Returns `false` if it was already present.
    pub fn insert(&mut self, span: (usize, usize)) -> bool {
        self.spans.insert(span)
    }

    pub fn contains(&self, span: (usize, usize)) -> bool {
        self.spans.contains(&span)
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    pub fn sorted(&self) -> Vec<(usize, usize)> {
        let mut spans: Vec<_> = self.spans.iter().copied().collect();
        spans.sort_unstable();
        spans
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditKind {
    Change,
    Insert,
    Improve,
    Rephrase,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EditStep {
    Type(String),
    Backspace(usize),
    Think(PauseRange),
}

#[derive(Debug, Clone, PartialEq)]
pub struct EditPlan {
    pub kind: EditKind,
    /// Where the backspacing stops.
    pub start: usize,
    pub resume_at: usize,
    pub steps: Vec<EditStep>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordAction {
    Change,
    Insert,
    Improve,
}

impl WordAction {
    pub const ALL: [WordAction; 3] = [WordAction::Change, WordAction::Insert, WordAction::Improve];
}

/// Enclosing sentence of `position`: from just after the previous `.!?`
/// (leading whitespace skipped) through the next `.!?` inclusive, or the end
/// of the text.
pub fn sentence_bounds(text: &[char], position: usize) -> (usize, usize) {
    let position = position.min(text.len());

    let mut start = text[..position]
        .iter()
        .rposition(|c| SENTENCE_END.contains(c))
        .map_or(0, |i| i + 1);
    if start > 0 {
        while start < text.len() && is_boundary_whitespace(text[start]) {
            start += 1;
        }
    }

    let end = text[position..]
        .iter()
        .position(|c| SENTENCE_END.contains(c))
        .map_or(text.len(), |i| position + i + 1);

    (start, end)
}

/// Start of the word containing `idx`: the index just after the nearest
/// whitespace before it, or 0.
pub fn word_start_at(text: &[char], idx: usize) -> usize {
    let idx = idx.min(text.len());
    text[..idx]
        .iter()
        .rposition(|&c| is_boundary_whitespace(c))
        .map_or(0, |i| i + 1)
}

fn word_spans(text: &[char], start: usize, end: usize) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut word_start = None;
    for i in start..end {
        match (word_start, text[i].is_whitespace()) {
            (None, false) => word_start = Some(i),
            (Some(ws), true) => {
                spans.push((ws, i));
                word_start = None;
            }
            _ => {}
        }
    }
    if let Some(ws) = word_start {
        spans.push((ws, end));
    }
    spans
}

fn collect(text: &[char], start: usize, end: usize) -> String {
    text[start..end].iter().collect()
}

/// Decide on a backward edit at `position`. Returns `None` when the planner
/// chose not to touch the text.
pub fn plan_edit(
    text: &[char],
    position: usize,
    cfg: &TypingConfig,
    assistant: &dyn RephraseAssistant,
    rephrased: &mut RephrasedSpans,
    rng: &mut impl Rng,
) -> Option<EditPlan> {
    let position = position.min(text.len());

    if rng.gen_bool(cfg.sentence_rephrase_probability) && position > REPHRASE_MIN_POSITION {
        let lookback =
            rng.gen_range(REPHRASE_LOOKBACK_MIN..=REPHRASE_LOOKBACK_MAX.min(position));
        let lookback_start = position - lookback;
        let span = sentence_bounds(text, lookback_start);

        if span.1 > lookback_start && span.1 <= position && !rephrased.contains(span) {
            rephrased.insert(span);
            return plan_sentence_rephrase(text, position, span, cfg, assistant, rng);
        }
    }

    plan_word_edit(text, position, cfg, assistant, rng)
}

/// Try to rephrase part of the already-typed sentence `span`.
pub fn plan_sentence_rephrase(
    text: &[char],
    position: usize,
    span: (usize, usize),
    cfg: &TypingConfig,
    assistant: &dyn RephraseAssistant,
    rng: &mut impl Rng,
) -> Option<EditPlan> {
    let (start, end) = span;
    let end = end.min(position);
    if start >= end {
        return None;
    }

    let sentence = collect(text, start, end);
    if sentence.trim().chars().count() < REPHRASE_MIN_SENTENCE_CHARS || !cfg.use_ai {
        return None;
    }

    let words = word_spans(text, start, end);
    if words.is_empty() {
        return None;
    }
    let num_words = if words.len() <= REPHRASE_MIN_WORDS {
        words.len()
    } else {
        rng.gen_range(REPHRASE_MIN_WORDS..=REPHRASE_MAX_WORDS.min(words.len()))
    };
    let offset = rng.gen_range(0..=words.len() - num_words);
    let sub_start = words[offset].0;
    let sub_end = words[offset + num_words - 1].1;
    if position <= sub_start {
        return None;
    }

    let original = collect(text, sub_start, sub_end);
    let alternative = match assistant.rephrase(&original) {
        Ok(raw) => accept_rephrase(&original, &raw)?,
        Err(err) => {
            log::debug!("rephrase unavailable: {err:#}");
            return None;
        }
    };
    log::debug!("rephrasing {original:?} as {alternative:?}");

    let alternative_len = alternative.chars().count();
    Some(EditPlan {
        kind: EditKind::Rephrase,
        start: sub_start,
        resume_at: sub_end,
        steps: vec![
            EditStep::Backspace(position - sub_start),
            EditStep::Think(PauseRange::new(300, 600)),
            EditStep::Type(alternative),
            EditStep::Think(PauseRange::new(500, 1200)),
            EditStep::Backspace(alternative_len),
            EditStep::Think(PauseRange::new(200, 500)),
            EditStep::Type(original),
        ],
    })
}

/// Revisit the word(s) between a random lookback point and `position`.
pub fn plan_word_edit(
    text: &[char],
    position: usize,
    cfg: &TypingConfig,
    assistant: &dyn RephraseAssistant,
    rng: &mut impl Rng,
) -> Option<EditPlan> {
    let (lo, hi) = LOOKBACK_BANDS[rng.gen_range(0..LOOKBACK_BANDS.len())];
    let distance = rng.gen_range(lo..=hi).min(position);
    let edit_start = word_start_at(text, position - distance);

    let action = WordAction::ALL[rng.gen_range(0..WordAction::ALL.len())];
    plan_word_edit_with(text, position, edit_start, action, cfg, assistant, rng)
}

/// Build a word edit with the boundary and action already chosen.
pub fn plan_word_edit_with(
    text: &[char],
    position: usize,
    edit_start: usize,
    action: WordAction,
    cfg: &TypingConfig,
    assistant: &dyn RephraseAssistant,
    rng: &mut impl Rng,
) -> Option<EditPlan> {
    let position = position.min(text.len());
    if edit_start >= position {
        return None;
    }
    let word = collect(text, edit_start, position);
    let word_len = position - edit_start;
    if word_len < 2 {
        return None;
    }

    let mut steps = vec![
        EditStep::Backspace(word_len),
        EditStep::Think(PauseRange::new(100, 300)),
    ];

    let kind = match action {
        WordAction::Change if word_len > 3 => {
            let substitute = changed_word(&word, cfg, assistant, rng);
            let substitute_len = substitute.chars().count();
            steps.extend([
                EditStep::Type(substitute),
                EditStep::Think(PauseRange::new(200, 500)),
                EditStep::Backspace(substitute_len),
                EditStep::Think(PauseRange::new(100, 300)),
                EditStep::Type(word),
            ]);
            EditKind::Change
        }
        WordAction::Insert => {
            let filler = pick_filler(cfg, assistant, rng);
            let insertion = if filler.starts_with(' ') {
                filler
            } else {
                format!(" {filler}")
            };
            let insertion_len = insertion.chars().count();
            steps.extend([
                EditStep::Type(insertion),
                EditStep::Think(PauseRange::new(300, 700)),
                EditStep::Backspace(insertion_len),
                EditStep::Think(PauseRange::new(100, 300)),
                EditStep::Type(word),
            ]);
            EditKind::Insert
        }
        WordAction::Change | WordAction::Improve => {
            steps.extend([
                EditStep::Type(word),
                EditStep::Think(PauseRange::new(200, 600)),
            ]);
            if rng.gen_bool(SUFFIX_PROBABILITY) {
                let suffix = SUFFIXES[rng.gen_range(0..SUFFIXES.len())];
                steps.extend([
                    EditStep::Type(suffix.to_string()),
                    EditStep::Think(PauseRange::new(200, 500)),
                    EditStep::Backspace(suffix.len()),
                    EditStep::Think(PauseRange::new(100, 300)),
                ]);
            }
            EditKind::Improve
        }
    };

    Some(EditPlan {
        kind,
        start: edit_start,
        resume_at: edit_start + word_len,
        steps,
    })
}

fn changed_word(
    word: &str,
    cfg: &TypingConfig,
    assistant: &dyn RephraseAssistant,
    rng: &mut impl Rng,
) -> String {
    let similar: Vec<String> = if cfg.use_ai {
        match assistant.similar_words(word, SIMILAR_WORD_COUNT) {
            Ok(words) => words
                .into_iter()
                .filter(|w| !w.is_empty() && w != word && !w.contains('\n') && is_typeable(w))
                .collect(),
            Err(err) => {
                log::debug!("similar words unavailable for {word:?}: {err:#}");
                Vec::new()
            }
        }
    } else {
        Vec::new()
    };

    if !similar.is_empty() && rng.gen_bool(SIMILAR_WORD_SHARE) {
        return similar[rng.gen_range(0..similar.len())].clone();
    }

    let mut chars: Vec<char> = word.chars().collect();
    let idx = rng.gen_range(0..chars.len());
    if let Some(neighbor) = neighbor_key(chars[idx], rng) {
        chars[idx] = neighbor;
    }
    chars.into_iter().collect()
}

fn pick_filler(cfg: &TypingConfig, assistant: &dyn RephraseAssistant, rng: &mut impl Rng) -> String {
    let suggested: Vec<String> = if cfg.use_ai {
        match assistant.insertion_words() {
            Ok(words) => words
                .into_iter()
                .filter(|w| !w.trim().is_empty() && !w.contains('\n') && is_typeable(w))
                .collect(),
            Err(err) => {
                log::debug!("insertion words unavailable: {err:#}");
                Vec::new()
            }
        }
    } else {
        Vec::new()
    };

    if suggested.is_empty() {
        FALLBACK_FILLERS[rng.gen_range(0..FALLBACK_FILLERS.len())].to_string()
    } else {
        suggested[rng.gen_range(0..suggested.len())].clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::Offline;
    use pretty_assertions::assert_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn chars(s: &str) -> Vec<char> {
        s.chars().collect()
    }

    /// Visible buffer after running `plan` on `text[..position]`.
    fn apply(text: &[char], position: usize, plan: &EditPlan) -> String {
        let mut buf: Vec<char> = text[..position].to_vec();
        for step in &plan.steps {
            match step {
                EditStep::Type(s) => buf.extend(s.chars()),
                EditStep::Backspace(n) => {
                    let keep = buf.len().saturating_sub(*n);
                    buf.truncate(keep);
                }
                EditStep::Think(_) => {}
            }
        }
        buf.into_iter().collect()
    }

    #[test]
    fn sentence_bounds_skip_leading_whitespace() {
        let text = chars("First one. Second one! Third");
        assert_eq!(sentence_bounds(&text, 3), (0, 10));
        assert_eq!(sentence_bounds(&text, 14), (11, 22));
        assert_eq!(sentence_bounds(&text, 25), (23, 28));
    }

    #[test]
    fn word_start_scans_back_to_whitespace() {
        let text = chars("hello big world");
        assert_eq!(word_start_at(&text, 12), 10);
        assert_eq!(word_start_at(&text, 10), 10);
        assert_eq!(word_start_at(&text, 3), 0);
    }

    #[test]
    fn word_edits_restore_the_prefix() {
        let text = chars("the quick brown fox jumps over the lazy dog");
        let position = 19;
        let cfg = TypingConfig::default();
        let mut rng = StdRng::seed_from_u64(17);

        for action in WordAction::ALL {
            for edit_start in [0, 4, 10, 16] {
                let plan = plan_word_edit_with(
                    &text, position, edit_start, action, &cfg, &Offline, &mut rng,
                )
                .unwrap();
                assert_eq!(plan.resume_at, position);
                assert_eq!(apply(&text, position, &plan), collect(&text, 0, position));
            }
        }
    }

    #[test]
    fn short_words_are_left_alone() {
        let text = chars("a b c d e");
        let mut rng = StdRng::seed_from_u64(1);
        let plan = plan_word_edit_with(
            &text,
            3,
            2,
            WordAction::Change,
            &TypingConfig::default(),
            &Offline,
            &mut rng,
        );
        assert_eq!(plan, None);
    }

    #[test]
    fn change_on_short_word_acts_as_improve() {
        let text = chars("so the end");
        let mut rng = StdRng::seed_from_u64(4);
        let plan = plan_word_edit_with(
            &text,
            6,
            3,
            WordAction::Change,
            &TypingConfig::default(),
            &Offline,
            &mut rng,
        )
        .unwrap();
        assert_eq!(plan.kind, EditKind::Improve);
        assert_eq!(plan.steps[2], EditStep::Type("the".to_string()));
    }

    #[test]
    fn insert_falls_back_to_fixed_fillers() {
        let text = chars("we should go home now");
        let mut rng = StdRng::seed_from_u64(8);
        let plan = plan_word_edit_with(
            &text,
            12,
            10,
            WordAction::Insert,
            &TypingConfig::default(),
            &Offline,
            &mut rng,
        )
        .unwrap();

        let EditStep::Type(insertion) = &plan.steps[2] else {
            panic!("expected a typed insertion, got {:?}", plan.steps[2]);
        };
        assert!(insertion.starts_with(' '));
        assert!(FALLBACK_FILLERS.contains(&&insertion[1..]));
    }

    #[test]
    fn rephrase_without_assistant_is_a_no_op() {
        let text = chars("This sentence is long enough to rephrase. Next part");
        let mut rng = StdRng::seed_from_u64(3);
        let plan = plan_sentence_rephrase(
            &text,
            48,
            (0, 41),
            &TypingConfig::default(),
            &Offline,
            &mut rng,
        );
        assert_eq!(plan, None);
    }

    fn always_rephrase() -> TypingConfig {
        TypingConfig {
            sentence_rephrase_probability: 1.0,
            use_ai: true,
            ..TypingConfig::default()
        }
    }

    #[test]
    fn failed_rephrase_still_marks_the_sentence() {
        let text = chars(
            "The committee finally agreed on a plan for the summer. \
             Everyone went home early to pack their bags and rest.",
        );
        let first_sentence = sentence_bounds(&text, 0);
        assert_eq!(first_sentence, (0, 54));
        let cfg = always_rephrase();

        for seed in 0..16 {
            let mut rephrased = RephrasedSpans::new();
            let first = plan_edit(
                &text,
                85,
                &cfg,
                &Offline,
                &mut rephrased,
                &mut StdRng::seed_from_u64(seed),
            );
            assert_eq!(first, None, "seed {seed}");
            assert!(rephrased.contains(first_sentence), "seed {seed}");
            assert_eq!(rephrased.len(), 1);

            let second = plan_edit(
                &text,
                85,
                &cfg,
                &Offline,
                &mut rephrased,
                &mut StdRng::seed_from_u64(seed),
            )
            .unwrap_or_else(|| panic!("seed {seed}: expected a word edit"));
            assert_ne!(second.kind, EditKind::Rephrase);
            assert_eq!(second.resume_at, 85);
            assert_eq!(rephrased.len(), 1);
        }
    }

    #[test]
    fn unfinished_sentence_falls_through_to_a_word_edit() {
        let text = chars(
            "this is one long sentence that keeps going without any full stop \
             at all because it never ends here",
        );
        let cfg = always_rephrase();

        for seed in 0..16 {
            let mut rephrased = RephrasedSpans::new();
            let plan = plan_edit(
                &text,
                60,
                &cfg,
                &Offline,
                &mut rephrased,
                &mut StdRng::seed_from_u64(seed),
            );
            assert!(rephrased.is_empty(), "seed {seed}");
            assert_ne!(plan.map(|p| p.kind), Some(EditKind::Rephrase));
        }
    }
}
