//! Input events for the interactive browser and user-facing error text.

use client_core::CoreError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowseEvent {
    /// Debounced search text, applied once typing pauses.
    Query(String),
    StatusFilter(String),
    NextPage,
    PrevPage,
    Refresh,
    Quit,
}

/// Parses one line of browser input. Plain text is a search query.
pub fn parse_command(line: &str) -> Option<BrowseEvent> {
    let line = line.trim_end_matches(['\r', '\n']);
    let event = match line.trim() {
        ":n" | ":next" => BrowseEvent::NextPage,
        ":p" | ":prev" => BrowseEvent::PrevPage,
        ":r" | ":refresh" => BrowseEvent::Refresh,
        ":q" | ":quit" => BrowseEvent::Quit,
        other => match other.strip_prefix(":s") {
            Some(status) => BrowseEvent::StatusFilter(status.trim().to_ascii_uppercase()),
            None if other.starts_with(':') => return None,
            None => BrowseEvent::Query(line.trim().to_string()),
        },
    };
    Some(event)
}

pub fn describe(err: &CoreError) -> String {
    match err {
        CoreError::NetworkFailure(_) => {
            "Server unreachable; check --server-url and retry.".to_string()
        }
        CoreError::Unauthorized(_) => "Session is no longer valid; sign in again.".to_string(),
        CoreError::Forbidden(message) => format!("Not allowed for your role: {message}"),
        CoreError::AlreadyPending(_) => {
            "A conversion request is already waiting for a manager.".to_string()
        }
        CoreError::NotPending(_) => {
            "There is no pending conversion request for this lead; it may already be decided."
                .to_string()
        }
        CoreError::InvalidTransition(_) => {
            "CONVERTED can only be reached through an approved conversion request.".to_string()
        }
        CoreError::DependencyConflict(message) => {
            format!("Cannot delete while related records exist: {message}")
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
#[path = "tests/events_tests.rs"]
mod tests;
