use std::fmt;

use crate::errors::*;

/// One physical line of the input, cells trimmed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    pub line: u64,
    cells: Vec<String>,
}

impl Row {
    pub fn new<I, S>(line: u64, cells: I) -> Row
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Row {
            line,
            cells: cells.into_iter().map(|c| c.into().trim().to_owned()).collect(),
        }
    }

    fn blank(line: u64) -> Row {
        Row {
            line,
            cells: Vec::new(),
        }
    }

    /// Empty string for cells past the end of the row.
    pub fn cell(&self, idx: usize) -> &str {
        self.cells.get(idx).map_or("", |c| &c[..])
    }

    pub fn cells(&self) -> &[String] {
        &self.cells
    }

    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(|c| c.is_empty())
    }

    pub fn first_non_empty(&self) -> Option<&str> {
        self.cells.iter().map(|c| &c[..]).find(|c| !c.is_empty())
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "line {}: [{}]", self.line, self.cells.join(", "))
    }
}

fn count_newlines(bytes: &[u8]) -> u64 {
    bytes.iter().filter(|b| **b == b'\n').count() as u64
}

/// Splits the whole export into rows, blank lines included.
pub fn read_rows(text: &str) -> Result<Vec<Row>> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let bytes = text.as_bytes();

    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let mut rows = Vec::new();
    let mut raw_record = csv::StringRecord::new();
    let mut newlines = 0;
    let mut scanned = 0;

    loop {
        let start = rdr.position().byte() as usize;
        let more = rdr
            .read_record(&mut raw_record)
            .chain_err(|| format!("Csv not well formed after line {}", newlines + 1))?;
        if !more {
            break;
        }
        let end = rdr.position().byte() as usize;

        // The csv reader swallows empty lines, but they end sections, so
        // recover the ones sitting in front of this record.
        let content = start
            + bytes[start..end]
                .iter()
                .take_while(|b| **b == b'\r' || **b == b'\n')
                .count();
        let mut blank = count_newlines(&bytes[start..content]);
        if start > 0 && bytes[start - 1] != b'\n' && blank > 0 {
            // the previous record's line break, left unconsumed
            blank -= 1;
        }

        newlines += count_newlines(&bytes[scanned..content]);
        scanned = content;
        let line = newlines + 1;

        for i in (1..=blank).rev() {
            rows.push(Row::blank(line - i));
        }
        rows.push(Row::new(line, raw_record.iter()));
    }

    Ok(rows)
}
