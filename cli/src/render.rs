//! Plain-text rendering of lists and the live timer line.

use std::fmt::Write;
use std::io;

use quadtodo_core::{humanize, Category, ItemView};

/// Width of the id column; ids are shown as a short prefix.
const ID_WIDTH: usize = 8;

/// Renders one quadrant: a header with the item count, then numbered rows.
pub fn render_list(category: Category, rows: &[ItemView]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} ({})", category.label(), rows.len());

    if rows.is_empty() {
        out.push_str("    (empty)\n");
        return out;
    }

    for (index, row) in rows.iter().enumerate() {
        let _ = writeln!(out, "{}", render_row(index + 1, row));
    }
    out
}

/// Renders one row, e.g. ` 1. [ ] > Write report   a minute (65s)   [3f2a9c1d]`.
pub fn render_row(number: usize, row: &ItemView) -> String {
    let check = if row.done { "[x]" } else { "[ ]" };
    let marker = if row.active { ">" } else { " " };
    let id: String = row.id.as_str().chars().take(ID_WIDTH).collect();

    let mut line = format!("{number:>2}. {check} {marker} {}", row.name);
    if let Some(label) = &row.label {
        let _ = write!(line, "   {label}");
    }
    let _ = write!(line, "   [{id}]");
    line
}

/// The single line redrawn on every tick while tracking.
pub fn render_tick(name: &str, seconds: u64) -> String {
    format!("\r> {name}  {} ({seconds}s)", humanize(seconds))
}

/// Redraws the tick line on `out` and flushes it.
pub fn write_tick(out: &mut impl io::Write, name: &str, seconds: u64) -> io::Result<()> {
    out.write_all(render_tick(name, seconds).as_bytes())?;
    out.flush()
}
