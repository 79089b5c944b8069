//! "Next Steps" normalization.
//!
//! A next-steps heading is a markdown ATX heading (`## Next Steps`), a line
//! that is bold from start to end (`**Next steps:**`), or a bare
//! `Next Steps:` line. Everything from the first such heading to the end of
//! the model's answer is dropped, including any sub-headings or bold step
//! titles under it, and the canonical block is appended once.

/// Canonical closing block appended to answers grounded in the knowledge base.
pub const CANONICAL_NEXT_STEPS: &str = "**Next Steps**\n\
1. Save the programs or roles that caught your eye and compare their requirements.\n\
2. Contact a training provider or employer on your list to ask about openings and start dates.\n\
3. Come back anytime with questions. I can help you plan each step.";

const NEXT_STEPS_MARKER: &str = "next steps";

/// Normalized heading text if `line` is a heading.
fn heading_text(line: &str) -> Option<String> {
    let trimmed = line.trim();

    let raw = if let Some(rest) = trimmed.strip_prefix('#') {
        rest.trim_start_matches('#')
    } else if trimmed.len() > 4
        && trimmed.starts_with("**")
        && (trimmed.ends_with("**") || trimmed.ends_with("**:"))
    {
        trimmed
    } else {
        let bare = trimmed.trim_end_matches(':').trim();
        if bare.eq_ignore_ascii_case(NEXT_STEPS_MARKER) {
            bare
        } else {
            return None;
        }
    };

    let text = raw
        .trim()
        .trim_matches(|c: char| c == '*' || c == '_' || c == ':' || c.is_whitespace())
        .to_lowercase();
    Some(text)
}

fn is_next_steps_heading(line: &str) -> bool {
    heading_text(line).is_some_and(|t| t.contains(NEXT_STEPS_MARKER))
}

/// Cut `text` at its first "Next Steps" heading.
pub fn strip_next_steps(text: &str) -> String {
    let kept: Vec<&str> = text
        .lines()
        .take_while(|line| !is_next_steps_heading(line))
        .collect();

    kept.join("\n").trim_end().to_string()
}

/// Append the canonical block to an already stripped body.
pub fn append_next_steps(body: &str) -> String {
    let body = body.trim_end();
    if body.is_empty() {
        CANONICAL_NEXT_STEPS.to_string()
    } else {
        format!("{body}\n\n{CANONICAL_NEXT_STEPS}")
    }
}

/// Strip any existing next-steps text and append the canonical block.
pub fn normalize_next_steps(answer: &str) -> String {
    append_next_steps(&strip_next_steps(answer))
}

/// Number of "Next Steps" headings in `text`.
pub fn count_next_steps_sections(text: &str) -> usize {
    text.lines().filter(|l| is_next_steps_heading(l)).count()
}
