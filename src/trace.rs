use crate::model::Action;

#[derive(Debug, Default, Clone)]
struct Correction {
    /// Chars removed by backspace, most recent first.
    deleted: Vec<char>,
    inserted: String,
}

impl Correction {
    fn deleted_string(&self) -> String {
        self.deleted.iter().rev().collect()
    }
}

/// Turns the action stream into console lines:
/// `Typing "..."...` for forward runs, `Replace "a" with "b"...` for
/// corrections and `Delete "a"...` for plain deletions.
#[derive(Debug, Default, Clone)]
pub struct ActionTracer {
    buf: Vec<char>,
    typing_run: String,
    correction: Option<Correction>,
    pending_lines: Vec<String>,
}

impl ActionTracer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe_action(&mut self, action: &Action) {
        match *action {
            Action::Type { ch } => self.handle_type(ch),
            Action::Backspace { count } => self.handle_backspace(count),
            Action::Wait { .. } => {}
        }
    }

    pub fn drain_lines(&mut self) -> Vec<String> {
        std::mem::take(&mut self.pending_lines)
    }

    pub fn finish(&mut self) -> Vec<String> {
        self.finish_correction();
        self.flush_typing_run();
        self.drain_lines()
    }

    fn handle_type(&mut self, c: char) {
        if self.correction.is_some() && !is_word_char(c) {
            self.finish_correction();
        }

        self.buf.push(c);
        match &mut self.correction {
            Some(correction) => correction.inserted.push(c),
            None => self.typing_run.push(c),
        }
    }

    fn handle_backspace(&mut self, count: usize) {
        let restarts = self
            .correction
            .as_ref()
            .is_some_and(|c| !c.inserted.is_empty());
        if restarts {
            self.finish_correction();
        }
        self.flush_typing_run();

        let correction = self.correction.get_or_insert_with(Correction::default);
        for _ in 0..count {
            match self.buf.pop() {
                Some(c) => correction.deleted.push(c),
                None => break,
            }
        }
    }

    fn flush_typing_run(&mut self) {
        if self.typing_run.is_empty() {
            return;
        }
        let line = format!("Typing \"{}\"...", escape_for_log(&self.typing_run));
        self.pending_lines.push(line);
        self.typing_run.clear();
    }

    fn finish_correction(&mut self) {
        let Some(correction) = self.correction.take() else {
            return;
        };
        if correction.deleted.is_empty() {
            self.typing_run.push_str(&correction.inserted);
            return;
        }

        let wrong = correction.deleted_string();
        let line = if correction.inserted.is_empty() {
            format!("Delete \"{}\"...", escape_for_log(&wrong))
        } else {
            format!(
                "Replace \"{}\" with \"{}\"...",
                escape_for_log(&wrong),
                escape_for_log(&correction.inserted)
            )
        };
        self.pending_lines.push(line);
    }
}

/// Trace lines for a whole recorded session.
pub fn trace_lines(actions: &[Action]) -> Vec<String> {
    let mut tracer = ActionTracer::new();
    for action in actions {
        tracer.observe_action(action);
    }
    tracer.finish()
}

pub fn print_trace_line(line: &str) {
    const RESET: &str = "\x1b[0m";
    const TYPING: &str = "\x1b[34m";
    const REPLACE: &str = "\x1b[33m";
    const DELETE: &str = "\x1b[31m";

    if let Some(rest) = line.strip_prefix("Typing") {
        eprintln!("{TYPING}Typing{RESET}{rest}");
    } else if let Some(rest) = line.strip_prefix("Replace") {
        eprintln!("{REPLACE}Replace{RESET}{rest}");
    } else if let Some(rest) = line.strip_prefix("Delete") {
        eprintln!("{DELETE}Delete{RESET}{rest}");
    } else {
        eprintln!("{line}");
    }
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '\''
}

fn escape_for_log(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out
}
