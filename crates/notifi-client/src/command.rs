//! Slash-command parsing for the line-based client.
//!
//! Plain lines are messages; lines starting with `/` are commands.

use std::path::PathBuf;

use notifi_app::BatchSize;

/// A parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `/login <email> <password>`
    Login {
        /// Account email
        email: String,
        /// Account password
        password: String,
    },
    /// `/register <email> <password>`
    Register {
        /// Account email
        email: String,
        /// Account password
        password: String,
    },
    /// `/logout`
    Logout,
    /// `/batch <10|20|50>`
    Batch(BatchSize),
    /// `/older`: scroll to the top, loading earlier history
    Older,
    /// `/bottom`: jump to the newest message
    Bottom,
    /// `/attach <path>`: queue a file for the next message
    Attach(PathBuf),
    /// `/hide`: the client went to the background
    Hide,
    /// `/show`: the client is visible again
    Show,
    /// `/quit`
    Quit,
    /// Message text
    Message {
        /// Body to send
        body: String,
    },
    /// Unrecognised command
    Unknown {
        /// The command as typed
        input: String,
    },
    /// Known command with bad arguments
    InvalidArgs {
        /// Command name without the slash
        command: &'static str,
        /// What is wrong
        error: String,
    },
}

/// Parse one input line. Blank lines parse to `None`.
pub fn parse(line: &str) -> Option<Command> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Some(Command::Message { body: line.to_string() });
    };

    let (name, args) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    let args = args.trim();
    let command = match name {
        "login" => credentials("login", args, |email, password| Command::Login { email, password }),
        "register" => {
            credentials("register", args, |email, password| Command::Register { email, password })
        },
        "logout" => Command::Logout,
        "batch" => match args.parse::<u32>().ok().and_then(|n| BatchSize::try_from(n).ok()) {
            Some(size) => Command::Batch(size),
            None => Command::InvalidArgs { command: "batch", error: "expected 10, 20 or 50".into() },
        },
        "older" => Command::Older,
        "bottom" => Command::Bottom,
        "attach" if args.is_empty() => {
            Command::InvalidArgs { command: "attach", error: "expected a file path".into() }
        },
        "attach" => Command::Attach(PathBuf::from(args)),
        "hide" => Command::Hide,
        "show" => Command::Show,
        "quit" | "exit" => Command::Quit,
        _ => Command::Unknown { input: line.to_string() },
    };
    Some(command)
}

fn credentials(
    command: &'static str,
    args: &str,
    build: impl FnOnce(String, String) -> Command,
) -> Command {
    let mut parts = args.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(email), Some(password), None) => build(email.to_string(), password.to_string()),
        _ => Command::InvalidArgs { command, error: "expected <email> <password>".into() },
    }
}

/// MIME type for an attachment, from its extension.
pub fn mime_type_for(path: &std::path::Path) -> &'static str {
    let extension = path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("pdf") => "application/pdf",
        Some("txt" | "log") => "text/plain",
        Some("json") => "application/json",
        _ => "application/octet-stream",
    }
}
