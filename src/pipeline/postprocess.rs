//! Post-processing: turn a raw model reply into clean page Markdown.
//!
//! The prompt asks the model to return the page inside a fenced block, and
//! models routinely wrap that block in chatter ("Sure! Here is the page…").
//! [`extract_code_blocks`] keeps only the bodies of fenced blocks; a reply
//! with no fenced block yields an empty page.
//!
//! By default the bodies are returned untouched. With tidying on (opt-in),
//! each block goes through a few deterministic rules that fix model quirks.
//! They do rewrite text: trailing spaces (and so Markdown hard breaks) are
//! dropped and tables are restructured.
//!
//! 1. Normalise line endings (CRLF → LF)
//! 2. Trim trailing whitespace per line
//! 3. Collapse 3+ consecutive blank lines down to 2
//! 4. Insert a missing GFM table separator row after a header row
//! 5. Remove spurious mid-table separator rows
//! 6. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens, …)
//!
//! Line endings must be normalised before trimming, and table repair runs
//! before separator removal so the inserted header separator is kept.

use once_cell::sync::Lazy;
use regex::Regex;

/// Separator placed between blocks of one reply, and between pages.
pub const BLOCK_SEPARATOR: &str = "\n\n";

static RE_FENCED_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```[^\n]*\n(.*?)```").unwrap());

/// Bodies of every fenced block in `text`, each stripped of surrounding whitespace.
pub fn fenced_blocks(text: &str) -> Vec<String> {
    RE_FENCED_BLOCK
        .captures_iter(text)
        .map(|caps| caps[1].trim().to_string())
        .collect()
}

/// Extract every fenced block and join them with a blank line.
///
/// Returns `""` when the text contains no fenced block.
pub fn extract_code_blocks(text: &str, tidy_blocks: bool) -> String {
    let blocks = fenced_blocks(text);
    if blocks.is_empty() {
        return String::new();
    }

    if tidy_blocks {
        blocks
            .iter()
            .map(|b| tidy(b))
            .collect::<Vec<_>>()
            .join(BLOCK_SEPARATOR)
    } else {
        blocks.join(BLOCK_SEPARATOR)
    }
}

/// Apply the tidy rules to one block.
pub fn tidy(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    let s = fix_broken_tables(&s);
    let s = remove_mid_table_separators(&s);
    remove_invisible_chars(&s).trim().to_string()
}

// ── Rule 1: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 2: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 3: Collapse excessive blank lines ───────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{4,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n\n").into_owned()
}

// ── Rule 4: Fix broken GFM tables ────────────────────────────────────────────

/// A header row immediately followed by a data row gets a separator row.
fn fix_broken_tables(input: &str) -> String {
    let lines: Vec<&str> = input.lines().collect();
    let mut result: Vec<String> = Vec::with_capacity(lines.len() + 4);
    let mut in_table = false;

    for (i, line) in lines.iter().enumerate() {
        let row = is_table_row(line);
        let starts_table = row && !in_table && !is_separator_row(line);
        in_table = row;
        result.push(line.to_string());

        if starts_table {
            let next = lines.get(i + 1).copied().unwrap_or("");
            if is_table_row(next) && !is_separator_row(next) {
                let cols = line.trim().matches('|').count().saturating_sub(1).max(1);
                result.push(format!("|{}", " --- |".repeat(cols)));
            }
        }
    }

    result.join("\n")
}

fn is_table_row(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with('|') && trimmed.ends_with('|') && trimmed.len() > 2
}

fn is_separator_row(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with('|')
        && trimmed.contains('-')
        && trimmed
            .chars()
            .all(|c| matches!(c, '|' | '-' | ':' | ' '))
}

// ── Rule 5: Remove spurious mid-table separator rows ────────────────────────

/// GFM allows a separator only as the second row of a table.
fn remove_mid_table_separators(input: &str) -> String {
    let mut result: Vec<&str> = Vec::new();
    let mut table_row = 0usize;

    for line in input.lines() {
        if is_table_row(line) {
            table_row += 1;
            if is_separator_row(line) && table_row != 2 {
                continue;
            }
        } else {
            table_row = 0;
        }
        result.push(line);
    }

    result.join("\n")
}

// ── Rule 6: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        ['\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}'],
        "",
    )
}
