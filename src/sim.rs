use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use crate::engine::Clock;
use crate::model::{Action, PauseKind};
use crate::playback::Actuator;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JournalStats {
    pub actions: usize,
    pub chars_typed: usize,
    pub backspaces: usize,
    pub waits: usize,
    pub total_wait_ms: u64,
    pub thinking_ms: u64,
}

pub fn stats(actions: &[Action]) -> JournalStats {
    let mut out = JournalStats {
        actions: actions.len(),
        ..Default::default()
    };

    for a in actions {
        match a {
            Action::Type { .. } => out.chars_typed += 1,
            Action::Backspace { count } => out.backspaces += count,
            Action::Wait { kind, ms } => {
                out.waits += 1;
                out.total_wait_ms = out.total_wait_ms.saturating_add(*ms);
                if *kind == PauseKind::Thinking {
                    out.thinking_ms = out.thinking_ms.saturating_add(*ms);
                }
            }
        }
    }

    out
}

/// Text left in the target after `actions`, starting from `prefix`.
///
/// Models a plain editor with the caret always at the end. Backspacing an
/// empty buffer does nothing.
pub fn simulate_typed_text(prefix: &str, actions: &[Action]) -> String {
    let mut buf: Vec<char> = prefix.chars().collect();
    for action in actions {
        match *action {
            Action::Type { ch } => buf.push(ch),
            Action::Backspace { count } => {
                let keep = buf.len().saturating_sub(count);
                buf.truncate(keep);
            }
            Action::Wait { .. } => {}
        }
    }
    buf.into_iter().collect()
}

/// In-memory actuator standing in for the focused application.
#[derive(Debug, Default, Clone)]
pub struct RecordingActuator {
    buf: Vec<char>,
    actions: Vec<Action>,
    releases: usize,
}

impl RecordingActuator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with `prefix` already in the buffer.
    pub fn with_text(prefix: &str) -> Self {
        Self {
            buf: prefix.chars().collect(),
            ..Default::default()
        }
    }

    pub fn visible_text(&self) -> String {
        self.buf.iter().collect()
    }

    /// Type and backspace commands received, in order.
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn release_count(&self) -> usize {
        self.releases
    }
}

impl Actuator for RecordingActuator {
    fn type_char(&mut self, c: char) -> Result<()> {
        self.buf.push(c);
        self.actions.push(Action::Type { ch: c });
        Ok(())
    }

    fn backspace(&mut self, count: usize) -> Result<usize> {
        let keep = self.buf.len().saturating_sub(count);
        self.buf.truncate(keep);
        self.actions.push(Action::Backspace { count });
        Ok(count)
    }

    fn release_all(&mut self) {
        self.releases += 1;
    }
}

/// Clock that only adds up the time it was asked to sleep. Clones share the
/// same totals.
#[derive(Debug, Clone, Default)]
pub struct VirtualClock {
    elapsed_nanos: Arc<AtomicU64>,
    sleeps: Arc<AtomicU64>,
}

impl VirtualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.elapsed_nanos.load(Ordering::SeqCst))
    }

    pub fn sleeps(&self) -> u64 {
        self.sleeps.load(Ordering::SeqCst)
    }
}

impl Clock for VirtualClock {
    fn sleep(&mut self, duration: Duration) {
        let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        self.elapsed_nanos.fetch_add(nanos, Ordering::SeqCst);
        self.sleeps.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn stats_count_each_kind() {
        let actions = vec![
            Action::Type { ch: 'a' },
            Action::Wait {
                kind: PauseKind::Keystroke,
                ms: 40,
            },
            Action::Backspace { count: 3 },
            Action::Wait {
                kind: PauseKind::Thinking,
                ms: 250,
            },
        ];
        assert_eq!(
            stats(&actions),
            JournalStats {
                actions: 4,
                chars_typed: 1,
                backspaces: 3,
                waits: 2,
                total_wait_ms: 290,
                thinking_ms: 250,
            }
        );
    }

    #[test]
    fn typed_text_honours_backspace() {
        let actions = [
            Action::Type { ch: 'c' },
            Action::Type { ch: 'x' },
            Action::Backspace { count: 1 },
            Action::Type { ch: 't' },
            Action::Backspace { count: 10 },
            Action::Type { ch: 'k' },
        ];
        assert_eq!(simulate_typed_text("", &actions), "k");
        assert_eq!(simulate_typed_text("ab", &actions[..4]), "abct");
    }

    #[test]
    fn recording_actuator_tracks_buffer() {
        let mut target = RecordingActuator::with_text("hello ");
        target.type_char('w').unwrap();
        target.backspace(2).unwrap();
        assert_eq!(target.visible_text(), "hello");
        assert_eq!(target.actions().len(), 2);
    }

    #[test]
    fn virtual_clock_clones_share_time() {
        let clock = VirtualClock::new();
        let mut handle = clock.clone();
        handle.sleep(Duration::from_millis(30));
        handle.sleep(Duration::from_millis(12));
        assert_eq!(clock.elapsed(), Duration::from_millis(42));
        assert_eq!(clock.sleeps(), 2);
    }
}
