//! Alert detection for log lines.

/// Returns `true` when a log line should raise an alert.
///
/// The match is a case-insensitive substring search for `err`, which also
/// covers `error`. It is deliberately crude: `"terrific"` and `"stderr"`
/// match too.
pub fn is_alert(line: &str) -> bool {
    let lowered = line.to_lowercase();
    lowered.contains("error") || lowered.contains("err")
}
