//! Report rendering
//!
//! Both pipelines print a structured text report to stdout. The helpers
//! here keep section banners and fixed-width tables consistent across the
//! two reports.

pub mod peak_exit;
pub mod win;

const RULE_WIDTH: usize = 70;

/// Banner around a report or section title.
pub fn banner(title: &str) {
    println!("{}", "=".repeat(RULE_WIDTH));
    println!("{title}");
    println!("{}", "=".repeat(RULE_WIDTH));
}

/// Banner preceded by a blank line, for mid-report sections.
pub fn section(title: &str) {
    println!();
    banner(title);
}

#[derive(Debug, Clone, Copy)]
enum Align {
    Left,
    Right,
}

#[derive(Debug, Clone)]
struct Column {
    header: String,
    width: usize,
    align: Align,
}

/// Fixed-width text table.
///
/// Collects cells as strings and yields formatted lines on demand; `lines`
/// can be called any number of times and always walks the rows from the
/// start.
#[derive(Debug, Clone, Default)]
pub struct Table {
    columns: Vec<Column>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a left-aligned column.
    pub fn col(mut self, header: &str, width: usize) -> Self {
        self.columns.push(Column {
            header: header.to_string(),
            width,
            align: Align::Left,
        });
        self
    }

    /// Append a right-aligned column.
    pub fn col_right(mut self, header: &str, width: usize) -> Self {
        self.columns.push(Column {
            header: header.to_string(),
            width,
            align: Align::Right,
        });
        self
    }

    pub fn row<I>(&mut self, cells: I)
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.rows.push(cells.into_iter().map(Into::into).collect());
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Header, rule, then one line per row.
    pub fn lines(&self) -> impl Iterator<Item = String> + '_ {
        let header: Vec<String> = self.columns.iter().map(|c| c.header.clone()).collect();
        let rule_width = self.columns.iter().map(|c| c.width).sum::<usize>()
            + self.columns.len().saturating_sub(1);
        std::iter::once(self.format_row(&header))
            .chain(std::iter::once("-".repeat(rule_width)))
            .chain(self.rows.iter().map(|r| self.format_row(r)))
    }

    /// Print every line with the given indent.
    pub fn print(&self, indent: &str) {
        for line in self.lines() {
            println!("{indent}{line}");
        }
    }

    fn format_row(&self, cells: &[String]) -> String {
        let mut out = String::new();
        for (i, column) in self.columns.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            let cell = cells.get(i).map(String::as_str).unwrap_or("");
            match column.align {
                Align::Left => out.push_str(&format!("{:<1$}", cell, column.width)),
                Align::Right => out.push_str(&format!("{:>1$}", cell, column.width)),
            }
        }
        out.trim_end().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_formats_aligned_columns() {
        let mut table = Table::new().col("City", 8).col_right("Count", 6);
        assert!(table.is_empty());
        table.row(["seoul".to_string(), "12".to_string()]);
        let lines: Vec<String> = table.lines().collect();
        assert_eq!(lines[0], format!("{:<8} {:>6}", "City", "Count").trim_end());
        assert_eq!(lines[1], "-".repeat(15));
        assert_eq!(lines[2], format!("{:<8} {:>6}", "seoul", "12"));
    }

    #[test]
    fn test_table_lines_are_restartable() {
        let mut table = Table::new().col("A", 3).col_right("B", 3);
        table.row(["x".to_string(), "1".to_string()]);
        table.row(["y".to_string(), "2".to_string()]);
        let first: Vec<String> = table.lines().collect();
        let second: Vec<String> = table.lines().collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 4);
    }

    #[test]
    fn test_overlong_cells_are_not_truncated() {
        let mut table = Table::new().col("H", 2);
        table.row(["a-very-long-cell".to_string()]);
        let lines: Vec<String> = table.lines().collect();
        assert_eq!(lines[2], "a-very-long-cell");
    }
}
