use crate::bench::ResultTable;
use crate::{Precision, Result};
use std::io::{IsTerminal, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
}

pub fn render(table: &ResultTable, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Table => Ok(render_table(table)),
        OutputFormat::Json => render_json(table),
    }
}

/// `{"n=<size>": {"<precision>": tflops}}` with two space indentation.
pub fn render_json(table: &ResultTable) -> Result<String> {
    Ok(serde_json::to_string_pretty(table)?)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Align {
    Left,
    Right,
}

/// Grid table with one row per precision and one column per size.
pub fn render_table(table: &ResultTable) -> String {
    let sizes: Vec<usize> = table.sizes().collect();
    let mut headers = vec![String::new()];
    headers.extend(sizes.iter().map(|n| n.to_string()));
    let rows: Vec<Vec<String>> = table
        .precisions()
        .into_iter()
        .map(|precision| {
            let mut row = vec![precision.name().to_string()];
            row.extend(sizes.iter().map(|&n| match table.get(n, precision) {
                Some(v) => format!("{v:.2}"),
                None => String::new(),
            }));
            row
        })
        .collect();
    let mut align = vec![Align::Left];
    align.resize(headers.len(), Align::Right);
    grid(&headers, &rows, &align)
}

// Columns are at least two characters wider than their header.
fn grid(headers: &[String], rows: &[Vec<String>], align: &[Align]) -> String {
    let widths: Vec<usize> = headers
        .iter()
        .enumerate()
        .map(|(c, header)| {
            rows.iter()
                .map(|row| row[c].chars().count())
                .fold(header.chars().count() + 2, usize::max)
        })
        .collect();
    let rule = |fill: char| {
        let mut line = String::from("+");
        for &w in widths.iter() {
            line.extend(std::iter::repeat(fill).take(w + 2));
            line.push('+');
        }
        line
    };
    let line = |cells: &[String]| {
        let mut line = String::from("|");
        for ((cell, &w), &a) in cells.iter().zip(widths.iter()).zip(align.iter()) {
            let cell = match a {
                Align::Left => format!(" {cell:<w$} "),
                Align::Right => format!(" {cell:>w$} "),
            };
            line.push_str(&cell);
            line.push('|');
        }
        line
    };

    let mut lines = vec![rule('-'), line(headers), rule('=')];
    for row in rows.iter() {
        lines.push(line(row.as_slice()));
        lines.push(rule('-'));
    }
    if rows.is_empty() {
        lines.pop();
        lines.push(rule('-'));
    }
    lines.join("\n")
}

/// Single line progress indicator, rewritten in place with a carriage return.
///
/// Nothing is written when the output is not a terminal.
pub struct Progress<W: Write> {
    out: W,
    enabled: bool,
}

impl Progress<std::io::Stdout> {
    pub fn stdout() -> Self {
        let out = std::io::stdout();
        let enabled = out.is_terminal();
        Self::new(out, enabled)
    }
}

impl<W: Write> Progress<W> {
    pub fn new(out: W, enabled: bool) -> Self {
        Self { out, enabled }
    }

    pub fn update(&mut self, size: usize, precision: Precision) -> Result<()> {
        if self.enabled {
            write!(self.out, "Running\t\t: {precision} ({size}, {size})    \r")?;
            self.out.flush()?;
        }
        Ok(())
    }

    /// Clears the progress line so that the report starts on a fresh line.
    pub fn finish(&mut self) -> Result<()> {
        if self.enabled {
            write!(self.out, "\x1b[K\n")?;
            self.out.flush()?;
        }
        Ok(())
    }
}
