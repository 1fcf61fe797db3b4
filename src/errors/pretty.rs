use super::Diagnostic;

pub fn underline(line: &str, column: usize) -> String {
    let mut marker = String::new();
    for _ in 1..column {
        marker.push(' ');
    }
    marker.push('^');
    format!("{}\n{}", line, marker)
}

/// The diagnostic message followed by the offending source line and a caret.
pub fn render(source: &str, diagnostic: &Diagnostic) -> String {
    match source.lines().nth(diagnostic.line.saturating_sub(1)) {
        Some(line) => format!(
            "{}\n{}",
            diagnostic,
            underline(line, diagnostic.column)
        ),
        None => diagnostic.to_string(),
    }
}
