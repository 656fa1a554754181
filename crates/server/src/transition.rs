//! Pure login transition planning
//!
//! Maps (current step, admin text) to the single action the login flow must
//! execute. No IO, no async; the async side lives in `login.rs`.

use joinwarden_protocol::EntityRef;

use crate::session::LoginStep;

const START_COMMAND: &str = "/start";

/// Admin text, classified
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Start,
    Text(String),
}

impl Input {
    /// `/start`, `/start@SomeBot` and `/start <payload>` all reset.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        let command = trimmed.split_whitespace().next().unwrap_or("");
        let command = command.split('@').next().unwrap_or("");
        if command == START_COMMAND {
            Input::Start
        } else {
            Input::Text(trimmed.to_string())
        }
    }
}

/// What the login flow should do next
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Restart,
    SubmitPhone(String),
    SubmitCode(String),
    SubmitPassword(String),
    SelectChannel(EntityRef),
    /// No matching input shape for the current step
    Nudge,
}

pub fn plan(step: LoginStep, input: Input) -> Action {
    let text = match input {
        Input::Start => return Action::Restart,
        Input::Text(text) => text,
    };

    match step {
        LoginStep::Idle => Action::Nudge,
        LoginStep::AwaitingPhone => normalize_phone(&text)
            .map(Action::SubmitPhone)
            .unwrap_or(Action::Nudge),
        LoginStep::AwaitingCode => normalize_code(&text)
            .map(Action::SubmitCode)
            .unwrap_or(Action::Nudge),
        LoginStep::Awaiting2fa => {
            if text.is_empty() {
                Action::Nudge
            } else {
                Action::SubmitPassword(text)
            }
        }
        LoginStep::AwaitingChannel => EntityRef::parse(&text)
            .map(Action::SelectChannel)
            .unwrap_or(Action::Nudge),
    }
}

/// `+1 (555) 123-4567` → `+15551234567`
fn normalize_phone(text: &str) -> Option<String> {
    let mut out = String::with_capacity(text.len());
    for (i, c) in text.chars().enumerate() {
        match c {
            '+' if i == 0 => out.push(c),
            '0'..='9' => out.push(c),
            ' ' | '-' | '(' | ')' | '.' => {}
            _ => return None,
        }
    }
    let digits = out.trim_start_matches('+').len();
    (5..=15).contains(&digits).then_some(out)
}

/// Codes may be typed with separators (`1 2 3 4 5`, `12-345`).
fn normalize_code(text: &str) -> Option<String> {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '0'..='9' => out.push(c),
            ' ' | '-' | '.' => {}
            _ => return None,
        }
    }
    (3..=10).contains(&out.len()).then_some(out)
}
