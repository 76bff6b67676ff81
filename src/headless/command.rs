//! Stdin command parsing

/// Commands accepted on stdin, one per line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Start the worker (`start`, `s`)
    Start,
    /// Stop the worker (`stop`, `x`)
    Stop,
    /// Re-emit the current status and device state (`status`, `?`)
    Status,
    /// Stop the worker and exit (`quit`, `q`)
    Quit,
}

/// Parse one line of input. Surrounding whitespace and case are ignored.
///
/// Returns `None` for blank lines, `Some(Err(input))` for anything that is
/// not a command.
pub fn parse_command(line: &str) -> Option<Result<Command, String>> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    let command = match trimmed.to_ascii_lowercase().as_str() {
        "start" | "s" => Command::Start,
        "stop" | "x" => Command::Stop,
        "status" | "?" => Command::Status,
        "quit" | "q" | "exit" => Command::Quit,
        _ => return Some(Err(trimmed.to_string())),
    };
    Some(Ok(command))
}
