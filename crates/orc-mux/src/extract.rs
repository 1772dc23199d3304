//! Strips interactive-UI chrome from a captured pane so callers get a clean
//! rendering of the assistant's textual reply (SPEC_FULL.md §4.9).

use regex::Regex;

fn is_border_line(line: &str) -> bool {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return false;
    }
    trimmed
        .chars()
        .all(|c| matches!(c, '╭' | '╮' | '╰' | '╯' | '─' | '│' | '┌' | '┐' | '└' | '┘' | '━' | '┃'))
}

fn unwrap_vertical_borders(line: &str) -> &str {
    let trimmed = line.trim();
    if trimmed.starts_with('│') && trimmed.ends_with('│') && trimmed.len() > 1 {
        trimmed[1..trimmed.len() - 1].trim_end()
    } else {
        line
    }
}

fn is_status_bar_line(line: &str) -> bool {
    let lower = line.to_lowercase();
    lower.contains('%') && (lower.contains("tokens") || lower.contains("usage"))
}

fn collapse_blank_runs(text: &str) -> String {
    let re = Regex::new(r"\n{3,}").expect("static regex");
    re.replace_all(text, "\n\n").to_string()
}

/// Removes the tail occurrence of `echoed` (typically the just-sent user
/// message) from `text`, if present.
fn remove_echoed_message(text: &str, echoed: &str) -> String {
    if echoed.is_empty() {
        return text.to_string();
    }
    if let Some(pos) = text.rfind(echoed) {
        let mut out = String::with_capacity(text.len() - echoed.len());
        out.push_str(&text[..pos]);
        out.push_str(&text[pos + echoed.len()..]);
        out
    } else {
        text.to_string()
    }
}

/// Full extraction pipeline: border-stripping, status-bar removal, blank-line
/// collapsing, and (if given) stripping the echoed outbound message.
pub fn extract_response(pane_text: &str, echoed_message: Option<&str>) -> String {
    let mut lines: Vec<String> = Vec::new();
    for raw in pane_text.lines() {
        if is_border_line(raw) {
            continue;
        }
        if is_status_bar_line(raw) {
            continue;
        }
        lines.push(unwrap_vertical_borders(raw).to_string());
    }
    let mut joined = lines.join("\n");
    if let Some(echoed) = echoed_message {
        joined = remove_echoed_message(&joined, echoed);
    }
    collapse_blank_runs(joined.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_box_drawing_border_lines() {
        let pane = "╭─────╮\n│ hi  │\n╰─────╯\n";
        let out = extract_response(pane, None);
        assert_eq!(out, "hi");
    }

    #[test]
    fn strips_status_bar_lines() {
        let pane = "answer text\n42% tokens used\n";
        let out = extract_response(pane, None);
        assert!(out.contains("answer text"));
        assert!(!out.contains("tokens used"));
    }

    #[test]
    fn collapses_long_blank_runs() {
        let pane = "a\n\n\n\n\nb";
        let out = extract_response(pane, None);
        assert_eq!(out, "a\n\nb");
    }

    #[test]
    fn removes_echoed_user_message() {
        let pane = "hello agent\nagent's reply here";
        let out = extract_response(pane, Some("hello agent"));
        assert_eq!(out, "agent's reply here");
    }
}
