//! Post-processing: deterministic cleanup of model-generated script text.
//!
//! Two passes run on the collected reply, in this order:
//!
//! 1. [`sanitize_output`] removes markdown emphasis and heading markers the
//!    model sprinkles through its answer (`###`, `***`, `**`) and trims.
//! 2. [`normalize_markdown_table`] re-flows the pipe-delimited cells into a
//!    proper three-column table. Models often collapse the whole table onto
//!    one line (`| a | b | c || d | e | f |`), which renders as garbage.
//!
//! Both passes are pure `&str → String` functions. The normalizer never
//! fails: when the cells cannot form whole single-line rows it hands back
//! its input.

use crate::config::SeparatorPolicy;
use crate::error::TableShapeMismatch;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

/// Columns in a script table: Time, Voice Over, Visuals.
pub const COLUMNS: usize = 3;

/// Fixed alignment row placed after the header.
pub const SEPARATOR_ROW: &str = "| :------- | :--------- | :--------- |";

// ── Pass 1: Sanitize ─────────────────────────────────────────────────────────

/// Longest first, so `***` never leaves a stray `*` behind.
const NOISE_MARKERS: [&str; 3] = ["###", "***", "**"];

/// Strip `###`, `***` and `**`, then trim surrounding whitespace.
///
/// Removal repeats until nothing changes: deleting `**` from `#**##` would
/// otherwise leave a fresh `###`. This keeps the function idempotent.
pub fn sanitize_output(input: &str) -> String {
    let mut text = input.to_string();
    loop {
        let stripped = NOISE_MARKERS
            .iter()
            .fold(text.clone(), |acc, marker| acc.replace(marker, ""));
        if stripped == text {
            break;
        }
        text = stripped;
    }
    text.trim().to_string()
}

// ── Pass 2: Normalize table ──────────────────────────────────────────────────

/// One alignment cell such as `---`, `:-------` or `:---:`.
static RE_ALIGNMENT_CELL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^:?-{3,}:?$").unwrap());

/// A three-column table: header, fixed separator, data rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedTable {
    pub header: [String; COLUMNS],
    pub rows: Vec<[String; COLUMNS]>,
}

impl NormalizedTable {
    /// Render as newline-joined markdown rows (no trailing newline).
    pub fn render(&self) -> String {
        let mut lines = Vec::with_capacity(self.rows.len() + 2);
        lines.push(render_row(&self.header));
        lines.push(SEPARATOR_ROW.to_string());
        lines.extend(self.rows.iter().map(render_row));
        lines.join("\n")
    }
}

fn render_row(cells: &[String; COLUMNS]) -> String {
    format!("| {} | {} | {} |", cells[0], cells[1], cells[2])
}

/// Split pipe-delimited text into its non-empty, trimmed cells, in order.
///
/// Doubled pipes (`||`, the row boundary in a collapsed table) are folded to
/// one first, and any leftover `**` is dropped.
pub fn split_cells(text: &str) -> Vec<String> {
    let mut collapsed = text.replace("**", "");
    while collapsed.contains("||") {
        collapsed = collapsed.replace("||", "|");
    }
    collapsed
        .split('|')
        .map(str::trim)
        .filter(|cell| !cell.is_empty())
        .map(str::to_string)
        .collect()
}

fn is_alignment_row(cells: &[String; COLUMNS]) -> bool {
    cells.iter().all(|c| RE_ALIGNMENT_CELL.is_match(c))
}

/// Group the cells of `text` into a [`NormalizedTable`].
///
/// # Errors
/// [`TableShapeMismatch`] when there are fewer than three cells, a cell
/// contains a line break, or the count is not a multiple of three.
pub fn normalize_table(
    text: &str,
    policy: SeparatorPolicy,
) -> Result<NormalizedTable, TableShapeMismatch> {
    let cells = split_cells(text);
    if cells.len() < COLUMNS {
        return Err(TableShapeMismatch::TooFewCells {
            cells: cells.len(),
            columns: COLUMNS,
        });
    }
    if let Some(index) = cells.iter().position(|cell| cell.contains('\n')) {
        return Err(TableShapeMismatch::MultilineCell { index });
    }
    let remainder = cells.len() % COLUMNS;
    if remainder != 0 {
        return Err(TableShapeMismatch::Ragged {
            cells: cells.len(),
            columns: COLUMNS,
            remainder,
        });
    }

    let mut groups = cells.into_iter();
    let mut next_row = || -> Option<[String; COLUMNS]> {
        Some([groups.next()?, groups.next()?, groups.next()?])
    };

    let header = next_row().ok_or(TableShapeMismatch::TooFewCells {
        cells: 0,
        columns: COLUMNS,
    })?;
    let mut rows = Vec::new();
    while let Some(row) = next_row() {
        if policy == SeparatorPolicy::DropExisting && is_alignment_row(&row) {
            continue;
        }
        rows.push(row);
    }
    Ok(NormalizedTable { header, rows })
}

/// Normalize `text` into a table, or return it unchanged if it has the wrong shape.
pub fn normalize_markdown_table(text: &str, policy: SeparatorPolicy) -> String {
    match normalize_table(text, policy) {
        Ok(table) => table.render(),
        Err(mismatch) => {
            debug!("Table normalization skipped: {}", mismatch);
            text.to_string()
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const DEFAULT: SeparatorPolicy = SeparatorPolicy::AlwaysInsert;

    #[test]
    fn test_sanitize_strips_markers_and_trims() {
        let input = "  ### Title\n**Bold** and ***very*** bold  \n";
        assert_eq!(sanitize_output(input), "Title\nBold and very bold");
    }

    #[test]
    fn test_sanitize_longest_marker_first() {
        assert_eq!(sanitize_output("***x***"), "x");
        assert_eq!(sanitize_output("****"), "*");
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        for input in [
            "#**##",
            "  **a** ",
            "*#*##*",
            "### ** ***",
            "plain",
            "",
            "|| ** || ###",
        ] {
            let once = sanitize_output(input);
            assert_eq!(sanitize_output(&once), once, "input: {input:?}");
        }
    }

    #[test]
    fn test_split_cells_collapsed_rows() {
        let cells = split_cells("| Time | VO | Visuals || 0 | Hello | Wide shot |");
        assert_eq!(cells, ["Time", "VO", "Visuals", "0", "Hello", "Wide shot"]);
    }

    #[test]
    fn test_split_cells_drops_blank_and_bold() {
        let cells = split_cells("|||  | **a** |\n| b |");
        assert_eq!(cells, ["a", "b"]);
    }

    #[test]
    fn test_six_cells_make_header_and_one_row() {
        let out = normalize_markdown_table("| Time | VO | Visuals || 0 | Hello | Wide shot |", DEFAULT);
        assert_eq!(
            out,
            "| Time | VO | Visuals |\n| :------- | :--------- | :--------- |\n| 0 | Hello | Wide shot |"
        );
    }

    #[test]
    fn test_multiline_table_is_reflowed() {
        let input = "| Time | VO | Visuals |\n| 0 | Hi | Shot |\n| 5 | Bye | Fade |";
        let table = normalize_table(input, DEFAULT).unwrap();
        assert_eq!(table.header, ["Time", "VO", "Visuals"].map(String::from));
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[1], ["5", "Bye", "Fade"].map(String::from));
    }

    #[test]
    fn test_row_count_is_cells_over_three_plus_one() {
        for n in [3, 6, 9, 30] {
            let input: String = (0..n).map(|i| format!("| c{i} ")).collect::<String>() + "|";
            let out = normalize_markdown_table(&input, DEFAULT);
            assert_eq!(out.lines().count(), n / 3 + 1, "n = {n}");
            assert_eq!(out.lines().nth(1), Some(SEPARATOR_ROW));
        }
    }

    #[test]
    fn test_four_cells_fall_back_verbatim() {
        let input = "| a | b | c | d |";
        assert_eq!(normalize_markdown_table(input, DEFAULT), input);
        assert_eq!(
            normalize_table(input, DEFAULT),
            Err(TableShapeMismatch::Ragged {
                cells: 4,
                columns: 3,
                remainder: 1
            })
        );
    }

    #[test]
    fn test_too_few_cells_fall_back_verbatim() {
        assert_eq!(normalize_markdown_table("just prose", DEFAULT), "just prose");
        assert_eq!(normalize_markdown_table("", DEFAULT), "");
        assert!(matches!(
            normalize_table("| a | b |", DEFAULT),
            Err(TableShapeMismatch::TooFewCells { cells: 2, .. })
        ));
    }

    #[test]
    fn test_existing_separator_is_kept_by_default() {
        let input = "| Time | VO | Visuals |\n| :--- | :--- | :--- |\n| 0 | Hi | Shot |";
        let out = normalize_markdown_table(input, DEFAULT);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[1], SEPARATOR_ROW);
        assert_eq!(lines[2], "| :--- | :--- | :--- |");
    }

    #[test]
    fn test_existing_separator_dropped_on_request() {
        let input = "| Time | VO | Visuals |\n| :--- | --- | ---: |\n| 0 | Hi | Shot |";
        let out = normalize_markdown_table(input, SeparatorPolicy::DropExisting);
        assert_eq!(
            out,
            "| Time | VO | Visuals |\n| :------- | :--------- | :--------- |\n| 0 | Hi | Shot |"
        );
    }

    #[test]
    fn test_drop_existing_keeps_rows_with_dashes_in_text() {
        let input = "| a | b | c || --- | not a rule | --- |";
        let table = normalize_table(input, SeparatorPolicy::DropExisting).unwrap();
        assert_eq!(table.rows.len(), 1);
    }

    #[test]
    fn test_normalizer_is_total() {
        let inputs = [
            "",
            "|",
            "||||",
            "no pipes here",
            "| a | b | c |",
            "| a | b | c | d | e |",
            "Title\nSome description\n| Time (s) | Voice Over | Visuals |\n| 0 | Hi | Shot |",
            "| é | ü | 日本 || 1 | 2 | 3 |",
            "| Time | VO | Visuals |\n| 0 | Hello\nworld | Wide shot |",
            "Title\nDescription\n| a | b |\n| c | d |\nEnd",
        ];
        for input in inputs {
            let out = normalize_markdown_table(input, DEFAULT);
            if out != input {
                assert!(out.lines().count() >= 2, "input: {input:?}");
                for line in out.lines() {
                    assert!(line.starts_with("| ") && line.ends_with(" |"), "line: {line:?}");
                    assert_eq!(line.matches('|').count(), COLUMNS + 1, "line: {line:?}");
                }
            }
        }
    }

    #[test]
    fn test_multiline_cell_falls_back() {
        let wrapped = "| Time | VO | Visuals |\n| 0 | Hello\nworld | Wide shot |";
        assert_eq!(
            normalize_table(wrapped, DEFAULT),
            Err(TableShapeMismatch::MultilineCell { index: 4 })
        );
        assert_eq!(normalize_markdown_table(wrapped, DEFAULT), wrapped);

        let framed = "Title\nDescription\n| a | b |\n| c | d |\nEnd";
        assert_eq!(
            normalize_table(framed, DEFAULT),
            Err(TableShapeMismatch::MultilineCell { index: 0 })
        );
        assert_eq!(normalize_markdown_table(framed, DEFAULT), framed);
    }

    #[test]
    fn test_sanitize_then_normalize() {
        let raw = "  **| Time | VO | Visuals |** \n| 0 | ### Hello | Wide |  ";
        let out = normalize_markdown_table(&sanitize_output(raw), DEFAULT);
        assert!(out.ends_with("| 0 | Hello | Wide |"));
    }
}
