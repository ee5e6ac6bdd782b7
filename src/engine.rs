//! The typing loop: walks the source text with a single cursor and turns it
//! into actuator commands, pauses, typos and backward edits.

use std::cmp::Ordering;
use std::time::Duration;

use anyhow::Result;
use rand::Rng;

use crate::assistant::{Offline, RephraseAssistant};
use crate::config::{PauseRange, TypingConfig};
use crate::control::Control;
use crate::model::{Action, PauseKind};
use crate::planner::{is_boundary_whitespace, plan_edit, EditPlan, EditStep, RephrasedSpans};
use crate::playback::Actuator;
use crate::timing;
use crate::trace::{print_trace_line, ActionTracer};
use crate::typo::maybe_typo;

/// Pause between typing a wrong key and noticing it.
const TYPO_NOTICE: PauseRange = PauseRange::new(150, 400);

/// Edits are only considered this many chars past the last word boundary...
const EDIT_MIN_PROGRESS: usize = 3;
/// ...and never within this many chars of the end of the text.
const EDIT_END_MARGIN: usize = 5;

/// Lower bound on the pause poll so a zero interval does not spin.
const MIN_PAUSE_POLL: Duration = Duration::from_millis(1);

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub trait Clock {
    fn sleep(&mut self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadClock;

impl Clock for ThreadClock {
    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// How often a pause re-checks the stop flag. Zero sleeps each pause in one go.
    pub poll_interval: Duration,
    /// Print `Typing`/`Replace` lines to stderr as the session progresses.
    pub trace: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            trace: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct Report {
    pub outcome: Outcome,
    /// Cursor when the session ended. Equals the text length on completion.
    pub cursor: usize,
    pub typos: usize,
    pub edits: usize,
    pub rephrased: Vec<(usize, usize)>,
    pub journal: Vec<Action>,
}

/// Why the loop unwound early.
enum Halt {
    Stopped,
    Failed(anyhow::Error),
}

impl From<anyhow::Error> for Halt {
    fn from(err: anyhow::Error) -> Self {
        Halt::Failed(err)
    }
}

type Step = std::result::Result<(), Halt>;

/// Sleeps on behalf of the engine while honouring pause and stop.
struct Pacer<C> {
    clock: C,
    control: Control,
    poll_interval: Duration,
}

impl<C: Clock> Pacer<C> {
    fn checkpoint(&self) -> Step {
        if self.control.is_stopped() {
            Err(Halt::Stopped)
        } else {
            Ok(())
        }
    }

    fn pause(&mut self, duration: Duration) -> Step {
        self.sleep(duration)?;
        self.hold_while_paused()
    }

    fn sleep(&mut self, duration: Duration) -> Step {
        if self.poll_interval.is_zero() {
            self.checkpoint()?;
            self.clock.sleep(duration);
            return self.checkpoint();
        }

        let mut remaining = duration;
        while !remaining.is_zero() {
            self.checkpoint()?;
            let step = remaining.min(self.poll_interval);
            self.clock.sleep(step);
            remaining -= step;
        }
        self.checkpoint()
    }

    fn hold_while_paused(&mut self) -> Step {
        let poll = self.poll_interval.max(MIN_PAUSE_POLL);
        while self.control.is_paused() {
            self.checkpoint()?;
            self.clock.sleep(poll);
        }
        self.checkpoint()
    }
}

pub struct Session<A, C, R> {
    actuator: A,
    pacer: Pacer<C>,
    rng: R,
    cfg: TypingConfig,
    assistant: Box<dyn RephraseAssistant>,
    trace: bool,

    last_word_end: usize,
    typos: usize,
    edits: usize,
    rephrased: RephrasedSpans,
    journal: Vec<Action>,
    tracer: Option<ActionTracer>,
}

impl<A: Actuator, C: Clock, R: Rng> Session<A, C, R> {
    pub fn new(actuator: A, clock: C, rng: R, cfg: TypingConfig, control: Control) -> Self {
        let options = SessionOptions::default();
        Self {
            actuator,
            pacer: Pacer {
                clock,
                control,
                poll_interval: options.poll_interval,
            },
            rng,
            cfg,
            assistant: Box::new(Offline),
            trace: options.trace,
            last_word_end: 0,
            typos: 0,
            edits: 0,
            rephrased: RephrasedSpans::new(),
            journal: Vec::new(),
            tracer: None,
        }
    }

    pub fn with_assistant(mut self, assistant: Box<dyn RephraseAssistant>) -> Self {
        self.assistant = assistant;
        self
    }

    pub fn with_options(mut self, options: SessionOptions) -> Self {
        self.pacer.poll_interval = options.poll_interval;
        self.trace = options.trace;
        self
    }

    pub fn actuator(&self) -> &A {
        &self.actuator
    }

    pub fn into_actuator(self) -> A {
        self.actuator
    }

    pub fn control(&self) -> &Control {
        &self.pacer.control
    }

    /// [`Session::run`] for a control the user could already reach, e.g. while
    /// the actuator was being opened. A stop requested before this call ends
    /// the session untouched instead of being cleared by the reset.
    pub fn run_unless_stopped(&mut self, text: &str) -> Result<Report> {
        if self.pacer.control.is_stopped() {
            log::info!("stop requested before typing started");
            return Ok(Report {
                outcome: Outcome::Stopped,
                cursor: 0,
                typos: 0,
                edits: 0,
                rephrased: Vec::new(),
                journal: Vec::new(),
            });
        }
        self.run(text)
    }

    /// Type `text` from the beginning. A stop request ends the session with
    /// [`Outcome::Stopped`]; only actuator failures are errors.
    pub fn run(&mut self, text: &str) -> Result<Report> {
        self.pacer.control.reset();
        self.pacer
            .control
            .set_speed_multiplier(self.cfg.speed_multiplier);

        self.last_word_end = 0;
        self.typos = 0;
        self.edits = 0;
        self.rephrased = RephrasedSpans::new();
        self.journal.clear();
        self.tracer = self.trace.then(ActionTracer::new);

        let chars: Vec<char> = text.chars().collect();
        let mut cursor = 0usize;
        let result = self.type_all(&chars, &mut cursor);
        self.finish_trace();

        let outcome = match result {
            Ok(()) => Outcome::Completed,
            Err(Halt::Stopped) => {
                log::info!("stop requested at char {cursor}/{}", chars.len());
                self.actuator.release_all();
                Outcome::Stopped
            }
            Err(Halt::Failed(err)) => {
                self.actuator.release_all();
                return Err(err);
            }
        };

        Ok(Report {
            outcome,
            cursor,
            typos: self.typos,
            edits: self.edits,
            rephrased: self.rephrased.sorted(),
            journal: std::mem::take(&mut self.journal),
        })
    }

    fn type_all(&mut self, text: &[char], cursor: &mut usize) -> Step {
        let len = text.len();

        while *cursor < len {
            self.pacer.checkpoint()?;
            let i = *cursor;
            let c = text[i];

            if is_boundary_whitespace(c)
                && i > self.last_word_end + EDIT_MIN_PROGRESS
                && i + EDIT_END_MARGIN < len
                && self.rng.gen_bool(self.cfg.edit_probability)
            {
                let plan = plan_edit(
                    text,
                    i,
                    &self.cfg,
                    self.assistant.as_ref(),
                    &mut self.rephrased,
                    &mut self.rng,
                );
                if let Some(plan) = plan {
                    log::debug!(
                        "{:?} edit at {i}: chars {}..{}",
                        plan.kind,
                        plan.start,
                        plan.resume_at
                    );
                    self.edits += 1;
                    self.apply_plan(&plan)?;

                    match plan.resume_at.cmp(&i) {
                        Ordering::Less => {
                            *cursor = plan.resume_at;
                            continue;
                        }
                        Ordering::Greater => {
                            *cursor = plan.resume_at;
                            self.last_word_end = plan.resume_at;
                            continue;
                        }
                        Ordering::Equal => {}
                    }
                }
            }

            let (emitted, is_typo) = maybe_typo(c, self.cfg.typo_probability, &mut self.rng);
            if is_typo {
                self.typos += 1;
                self.type_char(emitted)?;
                self.wait(PauseKind::Keystroke, None)?;
                self.wait(PauseKind::Thinking, Some(TYPO_NOTICE))?;
                self.backspace(1)?;
                self.wait(PauseKind::Keystroke, None)?;
                self.type_char(c)?;
                self.wait(PauseKind::Keystroke, None)?;
            } else {
                self.type_char(c)?;
                self.wait(PauseKind::Keystroke, None)?;
                match c {
                    '.' | '!' | '?' => self.wait(PauseKind::Sentence, None)?,
                    ',' | ';' => self.wait(PauseKind::Comma, None)?,
                    '\n' => self.wait(PauseKind::Paragraph, None)?,
                    _ => {}
                }
            }

            *cursor = i + 1;
            if is_boundary_whitespace(c) {
                self.last_word_end = *cursor;
            }
        }

        Ok(())
    }

    fn apply_plan(&mut self, plan: &EditPlan) -> Step {
        for step in &plan.steps {
            match step {
                EditStep::Type(s) => {
                    for c in s.chars() {
                        self.type_char(c)?;
                        self.wait(PauseKind::Keystroke, None)?;
                    }
                }
                EditStep::Backspace(count) => self.backspace(*count)?,
                EditStep::Think(range) => self.wait(PauseKind::Thinking, Some(*range))?,
            }
        }
        Ok(())
    }

    fn type_char(&mut self, c: char) -> Step {
        self.pacer.checkpoint()?;
        self.actuator.type_char(c)?;
        self.record(Action::Type { ch: c });
        Ok(())
    }

    fn backspace(&mut self, count: usize) -> Step {
        if count == 0 {
            return Ok(());
        }
        self.pacer.checkpoint()?;
        let pressed = self.actuator.backspace(count)?;
        if pressed > 0 {
            self.record(Action::Backspace { count: pressed });
        }
        if pressed < count && self.pacer.control.is_stopped() {
            return Err(Halt::Stopped);
        }
        Ok(())
    }

    fn wait(&mut self, kind: PauseKind, range: Option<PauseRange>) -> Step {
        let speed = self.pacer.control.speed_multiplier();
        let duration = timing::delay(&self.cfg, kind, range, speed, &mut self.rng);
        self.record(Action::Wait {
            kind,
            ms: duration.as_millis() as u64,
        });
        self.pacer.pause(duration)
    }

    fn record(&mut self, action: Action) {
        if let Some(tracer) = &mut self.tracer {
            tracer.observe_action(&action);
            for line in tracer.drain_lines() {
                print_trace_line(&line);
            }
        }
        self.journal.push(action);
    }

    fn finish_trace(&mut self) {
        if let Some(tracer) = &mut self.tracer {
            for line in tracer.finish() {
                print_trace_line(&line);
            }
        }
    }
}

/// Re-emit a recorded action stream. Waits are divided by the live speed
/// multiplier, so hotkeys work the same as in a live session.
pub fn replay(
    actions: &[Action],
    actuator: &mut dyn Actuator,
    clock: impl Clock,
    control: Control,
    options: &SessionOptions,
) -> Result<Outcome> {
    control.reset();
    let mut pacer = Pacer {
        clock,
        control,
        poll_interval: options.poll_interval,
    };
    let mut tracer = options.trace.then(ActionTracer::new);

    let mut run = || -> Step {
        for action in actions {
            pacer.checkpoint()?;
            match *action {
                Action::Type { ch } => actuator.type_char(ch)?,
                Action::Backspace { count } => {
                    actuator.backspace(count)?;
                }
                Action::Wait { ms, .. } => {
                    let speed = pacer.control.speed_multiplier();
                    let scaled = Duration::from_secs_f64(ms as f64 / speed / 1000.0);
                    pacer.pause(scaled)?;
                }
            }
            if let Some(tracer) = &mut tracer {
                tracer.observe_action(action);
                for line in tracer.drain_lines() {
                    print_trace_line(&line);
                }
            }
        }
        Ok(())
    };
    let result = run();

    if let Some(tracer) = &mut tracer {
        for line in tracer.finish() {
            print_trace_line(&line);
        }
    }

    match result {
        Ok(()) => Ok(Outcome::Completed),
        Err(Halt::Stopped) => {
            actuator.release_all();
            Ok(Outcome::Stopped)
        }
        Err(Halt::Failed(err)) => {
            actuator.release_all();
            Err(err)
        }
    }
}
