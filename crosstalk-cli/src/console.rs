//! Line-oriented terminal front end: parses commands from stdin, prints state and messages.

use std::collections::HashSet;

use crosstalk_core::{Message, MessageId, SessionState};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;

use crate::coordinator::CoordinatorHandle;

/// One parsed input line.
#[derive(Debug, PartialEq)]
pub enum Input {
    Host,
    Join,
    Disconnect,
    Translate(bool),
    Language(String),
    Clear,
    Quit,
    Help,
    /// Text that continues the draft (line ended with `\`).
    Continue(String),
    /// Text that completes the draft and sends it.
    Text(String),
    Unknown(String),
}

pub fn parse(line: &str) -> Input {
    let trimmed = line.trim_end_matches(['\r', '\n']);
    if let Some(cmd) = trimmed.strip_prefix('/') {
        let mut parts = cmd.split_whitespace();
        let name = parts.next().unwrap_or("");
        let arg = parts.next();
        return match (name, arg) {
            ("host", None) => Input::Host,
            ("join", None) => Input::Join,
            ("disconnect" | "leave", None) => Input::Disconnect,
            ("translate", Some("on")) => Input::Translate(true),
            ("translate", Some("off")) => Input::Translate(false),
            ("lang", Some(code)) => Input::Language(code.to_string()),
            ("clear", None) => Input::Clear,
            ("quit" | "exit", None) => Input::Quit,
            ("help", _) => Input::Help,
            _ => Input::Unknown(trimmed.to_string()),
        };
    }
    match trimmed.strip_suffix('\\') {
        Some(part) => Input::Continue(part.to_string()),
        None => Input::Text(trimmed.to_string()),
    }
}

const HELP: &str = "commands: /host  /join  /disconnect  /translate on|off  /lang <code>  /clear  /quit
end a line with \\ to keep composing; any other line sends";

/// Read stdin until EOF or /quit.
pub async fn run_input(handle: CoordinatorHandle) -> std::io::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut draft = String::new();
    println!("{}", HELP);
    while let Some(line) = lines.next_line().await? {
        match parse(&line) {
            Input::Host => handle.start_hosting(),
            Input::Join => handle.start_joining(),
            Input::Disconnect => handle.disconnect(),
            Input::Translate(on) => handle.set_translating(on),
            Input::Language(code) => handle.set_translation_language(code),
            Input::Clear => {
                draft.clear();
                handle.clear();
            }
            Input::Quit => break,
            Input::Help => println!("{}", HELP),
            Input::Continue(part) => {
                draft.push_str(&part);
                draft.push('\n');
                handle.set_draft(draft.clone());
            }
            Input::Text(part) => {
                draft.push_str(&part);
                handle.set_draft(std::mem::take(&mut draft));
                handle.send_draft();
            }
            Input::Unknown(s) => println!("unknown command: {}", s),
        }
    }
    Ok(())
}

/// Print state changes and newly inserted messages until the coordinator stops.
pub async fn run_output(
    local_name: String,
    mut state: watch::Receiver<SessionState>,
    mut messages: watch::Receiver<Vec<Message>>,
) {
    let mut shown: HashSet<MessageId> = HashSet::new();
    println!("[{}]", *state.borrow());
    loop {
        tokio::select! {
            r = state.changed() => {
                if r.is_err() {
                    break;
                }
                println!("[{}]", *state.borrow_and_update());
            }
            r = messages.changed() => {
                if r.is_err() {
                    break;
                }
                let list = messages.borrow_and_update().clone();
                // Newest first; print unseen ones oldest first.
                for m in list.iter().rev() {
                    if shown.insert(m.id()) {
                        println!("{}", render(m, &local_name));
                    }
                }
            }
        }
    }
}

fn render(m: &Message, local_name: &str) -> String {
    let who = if m.is_from(local_name) {
        "me".to_string()
    } else {
        m.username().to_string()
    };
    let mut out = format!("{} - {}: {}", m.timestamp(), who, m.value());
    if m.has_translation() {
        out.push_str(&format!("\n    [{}] {}", m.translation_language_code(), m.translated_value()));
    }
    out
}
