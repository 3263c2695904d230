// ctx-assist-core/src/utils.rs
//! General utility functions.

const PREVIEW_LINE_CHARS: usize = 120;

/// Truncates a string to a maximum character count, adding an ellipsis if truncated.
/// Handles multi-byte characters correctly.
pub fn truncate_string(input: &str, max_chars: usize) -> String {
    if input.chars().count() <= max_chars {
        return input.to_string();
    }
    if max_chars < 3 {
        return input.chars().take(max_chars).collect();
    }
    format!("{}...", input.chars().take(max_chars - 3).collect::<String>())
}

/// First `max_lines` lines of `text` for log output, each capped in width.
/// Returns `<no output>` for empty text.
pub fn preview_lines(text: &str, max_lines: usize) -> String {
    if text.trim().is_empty() {
        return "<no output>".to_string();
    }
    let mut preview: Vec<String> = text
        .lines()
        .take(max_lines)
        .map(|line| truncate_string(line, PREVIEW_LINE_CHARS))
        .collect();
    if text.lines().count() > max_lines {
        preview.push("...".to_string());
    }
    preview.join("\n")
}
