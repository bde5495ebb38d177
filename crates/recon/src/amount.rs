//! Numeric cleaning for amounts arriving as formatted text.

use reconcheck_tabular::Cell;

/// Parse an amount cell the way uploads actually arrive: currency symbols,
/// thousands separators, stray whitespace. Numeric cells pass through
/// untouched; text is stripped to digits, `.`, and `-`, then parsed.
/// Unparseable values degrade to 0.0 rather than failing the row.
pub fn clean_number(cell: &Cell) -> f64 {
    match cell {
        Cell::Number(n) => *n,
        Cell::Empty => 0.0,
        Cell::Text(s) => clean_str(s),
        Cell::Bool(_) => 0.0,
    }
}

/// String form of [`clean_number`], used for source-table TEXT columns too.
pub fn clean_str(raw: &str) -> f64 {
    let filtered: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    filtered.parse().unwrap_or(0.0)
}
