//! Output formatting utilities for the CLI

use af_core::types::{ConnectionState, ToggleState, UiState};

/// Format a UI snapshot for the status display
pub fn format_state(state: &UiState) -> String {
    let mut out = String::new();
    out.push_str(&format!("Toggle:     {}\n", state.toggle));
    out.push_str(&format!(
        "Switch:     {} ({})\n",
        if state.switch_on { "on" } else { "off" },
        if state.switch_enabled {
            "enabled"
        } else {
            "disabled"
        }
    ));
    out.push_str(&format!("Broker:     {}\n", state.connection));
    out.push_str(&format!("Targets:    {}", state.selection_len));
    if let Some(message) = &state.message {
        out.push_str(&format!("\nMessage:    {}", message));
    }
    out
}

/// One-line rendition of a snapshot, for watch mode
pub fn format_state_line(state: &UiState) -> String {
    format!(
        "toggle={} switch={} broker={} targets={}{}",
        state.toggle,
        if state.switch_on { "on" } else { "off" },
        state.connection,
        state.selection_len,
        state
            .message
            .as_deref()
            .map(|m| format!(" message={:?}", m))
            .unwrap_or_default()
    )
}

/// Hint printed when the broker cannot be reached
pub fn broker_hint(state: &UiState) -> Option<&'static str> {
    match (state.connection, &state.toggle) {
        (ConnectionState::Disconnected, _) => {
            Some("Broker is unreachable. Is the broker daemon running?")
        }
        (ConnectionState::PermissionDenied, ToggleState::Inactive) => {
            Some("Broker permission was denied; re-run to request it again.")
        }
        _ => None,
    }
}

/// Print a success message with a green checkmark
pub fn print_success(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Green),
        Print("✓ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an error message with a red cross
pub fn print_error(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Red),
        Print("✗ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print a warning message with a yellow marker
pub fn print_warning(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Yellow),
        Print("! "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an informational message
pub fn print_info(msg: &str) {
    println!("  {}", msg);
}
