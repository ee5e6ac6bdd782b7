use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use pretty_assertions::assert_eq;
use rand::rngs::StdRng;
use rand::SeedableRng;

use typesim::assistant::{Offline, RephraseAssistant};
use typesim::config::{PauseRange, TypingConfig};
use typesim::control::Control;
use typesim::engine::{Outcome, Session, SessionOptions, ThreadClock};
use typesim::model::{Action, PauseKind};
use typesim::playback::Actuator;
use typesim::sim::{simulate_typed_text, RecordingActuator, VirtualClock};

fn zero_poll() -> SessionOptions {
    SessionOptions {
        poll_interval: Duration::ZERO,
        trace: false,
    }
}

fn quiet_config() -> TypingConfig {
    TypingConfig {
        typo_probability: 0.0,
        edit_probability: 0.0,
        sentence_rephrase_probability: 0.0,
        use_ai: false,
        ..TypingConfig::default()
    }
}

fn session(
    cfg: TypingConfig,
    seed: u64,
) -> Session<RecordingActuator, VirtualClock, StdRng> {
    Session::new(
        RecordingActuator::new(),
        VirtualClock::new(),
        StdRng::seed_from_u64(seed),
        cfg,
        Control::new(),
    )
    .with_options(zero_poll())
}

/// Waits are recorded in whole milliseconds, so allow one below the range.
fn in_range(ms: u64, range: PauseRange) -> bool {
    (range.min_ms.saturating_sub(1)..=range.max_ms).contains(&ms)
}

const PROSE: &str = "The morning was quiet and the streets were still wet from the rain. \
Nobody had opened the bakery yet, so the smell of bread was missing. \
A dog wandered past the fountain, sniffing at every corner it found. \
Later the sun came out and people started to fill the square again. \
By noon the whole town felt awake, loud, and a little bit warmer.";

#[test]
fn every_typo_is_corrected_in_place() {
    let cfg = TypingConfig {
        typo_probability: 1.0,
        ..quiet_config()
    };
    let text = "Typing is fun, right?";
    let mut session = session(cfg.clone(), 5);
    let report = session.run(text).unwrap();

    assert_eq!(report.outcome, Outcome::Completed);
    assert_eq!(session.actuator().visible_text(), text);
    assert_eq!(
        report.typos,
        text.chars().filter(|c| c.is_ascii_alphabetic()).count()
    );

    let journal = &report.journal;
    let mut at = 0usize;
    let mut next = || {
        let action = journal[at].clone();
        at += 1;
        action
    };
    let keystroke_wait = |action: Action| match action {
        Action::Wait {
            kind: PauseKind::Keystroke,
            ms,
        } => assert!(in_range(ms, cfg.base_delay), "keystroke wait {ms}ms"),
        other => panic!("expected keystroke wait, got {other:?}"),
    };

    for c in text.chars() {
        if c.is_ascii_alphabetic() {
            match next() {
                Action::Type { ch } => {
                    assert_ne!(ch, c);
                    assert_eq!(ch.is_ascii_uppercase(), c.is_ascii_uppercase());
                }
                other => panic!("expected wrong key for {c:?}, got {other:?}"),
            }
            keystroke_wait(next());
            match next() {
                Action::Wait {
                    kind: PauseKind::Thinking,
                    ms,
                } => assert!(in_range(ms, PauseRange::new(150, 400)), "notice pause {ms}ms"),
                other => panic!("expected notice pause, got {other:?}"),
            }
            assert_eq!(next(), Action::Backspace { count: 1 });
            keystroke_wait(next());
        }

        assert_eq!(next(), Action::Type { ch: c });
        keystroke_wait(next());
        match c {
            ',' => assert!(matches!(
                next(),
                Action::Wait {
                    kind: PauseKind::Comma,
                    ..
                }
            )),
            '?' => assert!(matches!(
                next(),
                Action::Wait {
                    kind: PauseKind::Sentence,
                    ..
                }
            )),
            _ => {}
        }
    }
    assert_eq!(at, journal.len());
}

#[test]
fn hi_there_types_straight_through() {
    let cfg = quiet_config();
    let text = "Hi there. Ok bye.";
    let clock = VirtualClock::new();
    let mut session = Session::new(
        RecordingActuator::new(),
        clock.clone(),
        StdRng::seed_from_u64(11),
        cfg.clone(),
        Control::new(),
    )
    .with_options(zero_poll());

    let report = session.run(text).unwrap();
    assert_eq!(report.outcome, Outcome::Completed);
    assert_eq!(report.cursor, text.chars().count());
    assert_eq!(session.actuator().visible_text(), text);
    assert!(!report
        .journal
        .iter()
        .any(|a| matches!(a, Action::Backspace { .. })));

    let typed: String = report
        .journal
        .iter()
        .filter_map(|a| match a {
            Action::Type { ch } => Some(*ch),
            _ => None,
        })
        .collect();
    assert_eq!(typed, text);

    let mut actions = report.journal.iter();
    for c in text.chars() {
        assert_eq!(actions.next(), Some(&Action::Type { ch: c }));
        match actions.next() {
            Some(&Action::Wait {
                kind: PauseKind::Keystroke,
                ms,
            }) => assert!(in_range(ms, cfg.base_delay)),
            other => panic!("expected keystroke wait after {c:?}, got {other:?}"),
        }
        if c == '.' {
            match actions.next() {
                Some(&Action::Wait {
                    kind: PauseKind::Sentence,
                    ms,
                }) => assert!(in_range(ms, cfg.sentence_pause)),
                other => panic!("expected sentence pause, got {other:?}"),
            }
        }
    }
    assert_eq!(actions.next(), None);

    let recorded_ms: u64 = report
        .journal
        .iter()
        .map(|a| match a {
            Action::Wait { ms, .. } => *ms,
            _ => 0,
        })
        .sum();
    assert!(clock.elapsed() >= Duration::from_millis(recorded_ms));
}

#[test]
fn revisions_never_change_the_final_text() {
    let mut total_edits = 0;
    for seed in 0..12 {
        let cfg = TypingConfig {
            typo_probability: 0.1,
            edit_probability: 0.6,
            sentence_rephrase_probability: 0.3,
            use_ai: true,
            ..TypingConfig::default()
        };
        let mut session = session(cfg, seed).with_assistant(Box::new(Offline));
        let report = session.run(PROSE).unwrap();

        assert_eq!(report.outcome, Outcome::Completed, "seed {seed}");
        assert_eq!(session.actuator().visible_text(), PROSE, "seed {seed}");
        assert_eq!(simulate_typed_text("", &report.journal), PROSE, "seed {seed}");
        total_edits += report.edits;
    }
    assert!(total_edits > 0);
}

#[test]
fn tab_separated_text_survives_typos_and_edits() {
    let text = "name\tquantity\tprice\napples\ttwelve\tthree dollars\npears\tfour\tone dollar";
    for seed in 0..6 {
        let cfg = TypingConfig {
            typo_probability: 0.1,
            edit_probability: 0.5,
            ..quiet_config()
        };
        let mut session = session(cfg, seed);
        let report = session.run(text).unwrap();

        assert_eq!(report.outcome, Outcome::Completed, "seed {seed}");
        assert_eq!(session.actuator().visible_text(), text, "seed {seed}");
    }
}

#[test]
fn session_keeps_text_already_in_the_target() {
    let mut session = Session::new(
        RecordingActuator::with_text("Dear team,\n"),
        VirtualClock::new(),
        StdRng::seed_from_u64(2),
        TypingConfig {
            edit_probability: 0.8,
            use_ai: false,
            ..TypingConfig::default()
        },
        Control::new(),
    )
    .with_options(zero_poll());

    let body = "the release went out this morning and everything looks fine so far.";
    session.run(body).unwrap();
    assert_eq!(
        session.actuator().visible_text(),
        format!("Dear team,\n{body}")
    );
}

/// Rephrases by appending a word; counts every sentence it is shown.
#[derive(Clone, Default)]
struct ScriptedAssistant {
    asked: Rc<RefCell<Vec<String>>>,
}

impl RephraseAssistant for ScriptedAssistant {
    fn similar_words(&self, _word: &str, _count: usize) -> Result<Vec<String>> {
        Err(anyhow!("not scripted"))
    }

    fn rephrase(&self, text: &str) -> Result<String> {
        self.asked.borrow_mut().push(text.to_string());
        Ok(format!("{text} instead"))
    }

    fn insertion_words(&self) -> Result<Vec<String>> {
        Ok(vec!["honestly".to_string()])
    }
}

#[test]
fn each_sentence_is_rephrased_at_most_once() {
    let assistant = ScriptedAssistant::default();
    let asked = assistant.asked.clone();
    let cfg = TypingConfig {
        typo_probability: 0.0,
        edit_probability: 1.0,
        sentence_rephrase_probability: 1.0,
        use_ai: true,
        ..TypingConfig::default()
    };
    let mut session = session(cfg, 9).with_assistant(Box::new(assistant));

    let report = session.run(PROSE).unwrap();
    assert_eq!(session.actuator().visible_text(), PROSE);

    let text: Vec<char> = PROSE.chars().collect();
    let spans: HashSet<_> = report.rephrased.iter().copied().collect();
    assert_eq!(spans.len(), report.rephrased.len());
    for &(start, end) in &report.rephrased {
        assert!(start < end && end <= text.len());
        assert_eq!(text[end - 1], '.');
    }

    let asked = asked.borrow();
    assert!(!asked.is_empty());
    assert!(asked.len() <= report.rephrased.len());
    for original in asked.iter() {
        assert!(PROSE.contains(original.as_str()), "{original:?}");
    }
}

#[test]
fn assistant_suggestions_show_up_in_the_journal() {
    let cfg = TypingConfig {
        typo_probability: 0.0,
        edit_probability: 1.0,
        sentence_rephrase_probability: 1.0,
        use_ai: true,
        ..TypingConfig::default()
    };
    let mut session = session(cfg, 9).with_assistant(Box::new(ScriptedAssistant::default()));
    let report = session.run(PROSE).unwrap();

    let typed: String = report
        .journal
        .iter()
        .filter_map(|a| match a {
            Action::Type { ch } => Some(*ch),
            _ => None,
        })
        .collect();
    assert!(typed.contains(" instead"));
}

/// Requests a stop from inside the actuator after `limit` characters.
struct StopAfter {
    inner: RecordingActuator,
    control: Control,
    limit: usize,
    typed: usize,
}

impl Actuator for StopAfter {
    fn type_char(&mut self, c: char) -> Result<()> {
        self.inner.type_char(c)?;
        self.typed += 1;
        if self.typed == self.limit {
            self.control.request_stop();
        }
        Ok(())
    }

    fn backspace(&mut self, count: usize) -> Result<usize> {
        self.inner.backspace(count)
    }

    fn release_all(&mut self) {
        self.inner.release_all();
    }
}

#[test]
fn stop_takes_effect_before_the_next_keystroke() {
    let control = Control::new();
    let actuator = StopAfter {
        inner: RecordingActuator::new(),
        control: control.clone(),
        limit: 7,
        typed: 0,
    };
    let mut session = Session::new(
        actuator,
        VirtualClock::new(),
        StdRng::seed_from_u64(3),
        quiet_config(),
        control.clone(),
    )
    .with_options(zero_poll());

    let report = session.run("a long enough line of text").unwrap();
    assert_eq!(report.outcome, Outcome::Stopped);
    assert!(control.is_stopped());

    let actuator = session.into_actuator();
    assert_eq!(actuator.inner.actions().len(), 7);
    assert_eq!(actuator.inner.visible_text(), "a long ");
    assert_eq!(actuator.inner.release_count(), 1);
}

#[test]
fn faster_speed_shortens_every_wait() {
    let run_at = |speed: f64| {
        let cfg = TypingConfig {
            speed_multiplier: speed,
            ..quiet_config()
        };
        session(cfg, 42).run(PROSE).unwrap().journal
    };
    let normal = run_at(1.0);
    let double = run_at(2.0);
    assert_eq!(normal.len(), double.len());

    for (a, b) in normal.iter().zip(&double) {
        match (a, b) {
            (Action::Wait { kind: ka, ms: slow }, Action::Wait { kind: kb, ms: fast }) => {
                assert_eq!(ka, kb);
                let diff = *slow as i64 - 2 * *fast as i64;
                assert!((-1..=2).contains(&diff), "{slow}ms at 1x vs {fast}ms at 2x");
            }
            _ => assert_eq!(a, b),
        }
    }
}

/// Counts characters and pauses the session after the first one.
struct PauseAfterFirst {
    control: Control,
    typed: Arc<AtomicUsize>,
}

impl Actuator for PauseAfterFirst {
    fn type_char(&mut self, _c: char) -> Result<()> {
        if self.typed.fetch_add(1, Ordering::SeqCst) == 0 {
            self.control.set_paused(true);
        }
        Ok(())
    }

    fn backspace(&mut self, count: usize) -> Result<usize> {
        Ok(count)
    }
}

fn wait_until(deadline: Duration, mut done: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if done() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    done()
}

#[test]
fn pause_holds_the_engine_until_resumed() {
    let control = Control::new();
    let typed = Arc::new(AtomicUsize::new(0));
    let text = "pause me";

    let worker = {
        let control = control.clone();
        let typed = typed.clone();
        std::thread::spawn(move || {
            let cfg = TypingConfig {
                base_delay: PauseRange::new(1, 2),
                ..quiet_config()
            };
            let actuator = PauseAfterFirst {
                control: control.clone(),
                typed,
            };
            let mut session = Session::new(
                actuator,
                ThreadClock,
                StdRng::seed_from_u64(1),
                cfg,
                control,
            )
            .with_options(SessionOptions {
                poll_interval: Duration::from_millis(1),
                trace: false,
            });
            session.run(text).map(|r| r.outcome)
        })
    };

    assert!(wait_until(Duration::from_secs(5), || typed.load(Ordering::SeqCst) >= 1));
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(typed.load(Ordering::SeqCst), 1);
    assert!(control.is_paused());

    control.set_paused(false);
    let outcome = worker.join().unwrap().unwrap();
    assert_eq!(outcome, Outcome::Completed);
    assert_eq!(typed.load(Ordering::SeqCst), text.chars().count());
}

#[test]
fn stop_while_paused_ends_the_session() {
    let control = Control::new();
    let typed = Arc::new(AtomicUsize::new(0));

    let worker = {
        let control = control.clone();
        let typed = typed.clone();
        std::thread::spawn(move || {
            let actuator = PauseAfterFirst {
                control: control.clone(),
                typed,
            };
            let mut session = Session::new(
                actuator,
                ThreadClock,
                StdRng::seed_from_u64(1),
                TypingConfig {
                    base_delay: PauseRange::new(1, 2),
                    ..quiet_config()
                },
                control,
            )
            .with_options(SessionOptions {
                poll_interval: Duration::from_millis(1),
                trace: false,
            });
            session.run("never finished").map(|r| r.outcome)
        })
    };

    assert!(wait_until(Duration::from_secs(5), || typed.load(Ordering::SeqCst) >= 1));
    control.request_stop();
    let outcome = worker.join().unwrap().unwrap();
    assert_eq!(outcome, Outcome::Stopped);
    assert_eq!(typed.load(Ordering::SeqCst), 1);
}
