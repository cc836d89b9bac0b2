use std::fmt;

use log::debug;

use crate::rows::Row;
use crate::txf::RefNumber;

/// The first cell of the detailed 1099-B column header. It both opens the
/// section and names its columns.
pub const FORM_1099B_HEADER: &str = "description of property";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
    ShortTerm,
    LongTerm,
    Form1099B,
    Interest,
    Dividends,
    QualifiedDividends,
}

// Lower case, matched as prefixes of the first cell. "total ..." rows are
// terminators and are checked before these.
const SECTION_LABELS: &[(&str, Section)] = &[
    ("short term", Section::ShortTerm),
    ("short-term", Section::ShortTerm),
    ("long term", Section::LongTerm),
    ("long-term", Section::LongTerm),
    ("interest income", Section::Interest),
    ("qualified dividends", Section::QualifiedDividends),
    ("ordinary dividends", Section::Dividends),
    ("dividends", Section::Dividends),
];

const COLUMN_LABELS: &[&str] = &[
    "date acquired",
    "date sold",
    "date sold or disposed",
    "proceeds",
    "cost basis",
    "cost or other basis",
    "amount",
    "gain/loss",
    "gain or loss",
];

const TERMINATORS: &[&str] = &["total", "subtotal", "sub-total"];

// "Total:" and "Total Long Term" count, "TotalEnergies" does not.
fn starts_with_word(cell: &str, word: &str) -> bool {
    cell.strip_prefix(word)
        .map_or(false, |rest| !rest.starts_with(char::is_alphanumeric))
}

impl Section {
    pub fn recognize(row: &Row) -> Option<Section> {
        let first = row.cell(0).to_lowercase();
        if first.is_empty() || row.cells().iter().skip(1).any(|c| !c.is_empty()) {
            return None;
        }
        if TERMINATORS.iter().any(|t| starts_with_word(&first, t)) {
            return None;
        }
        SECTION_LABELS
            .iter()
            .find(|(label, _)| starts_with_word(&first, label))
            .map(|(_, section)| *section)
    }

    /// Reference number for rows that carry no Form 8949 code.
    pub fn ref_number(self) -> RefNumber {
        match self {
            Section::ShortTerm => RefNumber::ShortTermCovered,
            Section::LongTerm => RefNumber::LongTermCovered,
            Section::Form1099B => RefNumber::ShortTermNoncovered,
            Section::Interest => RefNumber::Interest,
            Section::Dividends => RefNumber::Dividends,
            Section::QualifiedDividends => RefNumber::QualifiedDividends,
        }
    }

    pub fn is_sale(self) -> bool {
        matches!(
            self,
            Section::ShortTerm | Section::LongTerm | Section::Form1099B
        )
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Section::ShortTerm => "Short Term",
                Section::LongTerm => "Long Term",
                Section::Form1099B => "Form 1099-B",
                Section::Interest => "Interest Income",
                Section::Dividends => "Dividends",
                Section::QualifiedDividends => "Qualified Dividends",
            }
        )
    }
}

fn is_form_1099b_header(row: &Row) -> bool {
    row.cell(0).to_lowercase().starts_with(FORM_1099B_HEADER)
}

fn is_column_header(row: &Row) -> bool {
    row.cells().iter().map(|c| c.to_lowercase()).any(|c| {
        c.starts_with("description") || COLUMN_LABELS.iter().any(|l| c == *l)
    })
}

fn is_terminator(row: &Row) -> bool {
    row.is_blank()
        || row.first_non_empty().map_or(false, |c| {
            let c = c.to_lowercase();
            TERMINATORS.iter().any(|t| starts_with_word(&c, t))
        })
}

/// A section with the rows that belong to it, in file order.
#[derive(Debug, Clone, PartialEq)]
pub struct SectionBlock {
    pub section: Section,
    pub columns: Option<Row>,
    pub rows: Vec<Row>,
}

impl SectionBlock {
    fn new(section: Section, columns: Option<Row>) -> SectionBlock {
        SectionBlock {
            section,
            columns,
            rows: Vec::new(),
        }
    }
}

enum ScanState {
    Idle,
    Active(SectionBlock),
}

/// Groups rows into sections. Rows outside any recognized section are
/// dropped; an export without sections gives an empty list.
pub fn scan(rows: &[Row]) -> Vec<SectionBlock> {
    let mut blocks = Vec::new();
    let mut state = ScanState::Idle;

    for row in rows {
        state = match state {
            ScanState::Active(mut block) => {
                if let Some(section) = Section::recognize(row) {
                    debug!("{}: closing {}, opening {}", row.line, block.section, section);
                    blocks.push(block);
                    ScanState::Active(SectionBlock::new(section, None))
                } else if block.columns.is_none()
                    && block.rows.is_empty()
                    && is_column_header(row)
                {
                    block.columns = Some(row.clone());
                    ScanState::Active(block)
                } else if is_form_1099b_header(row) {
                    debug!("{}: closing {}, opening detailed 1099-B", row.line, block.section);
                    blocks.push(block);
                    ScanState::Active(SectionBlock::new(Section::Form1099B, Some(row.clone())))
                } else if is_terminator(row) {
                    debug!("{}: end of {}", row.line, block.section);
                    blocks.push(block);
                    ScanState::Idle
                } else {
                    block.rows.push(row.clone());
                    ScanState::Active(block)
                }
            }
            ScanState::Idle => {
                if let Some(section) = Section::recognize(row) {
                    debug!("{}: opening {}", row.line, section);
                    ScanState::Active(SectionBlock::new(section, None))
                } else if is_form_1099b_header(row) {
                    debug!("{}: opening detailed 1099-B", row.line);
                    ScanState::Active(SectionBlock::new(Section::Form1099B, Some(row.clone())))
                } else {
                    if !row.is_blank() {
                        debug!("{}: outside any section, ignored", row.line);
                    }
                    ScanState::Idle
                }
            }
        }
    }

    if let ScanState::Active(block) = state {
        blocks.push(block);
    }
    blocks
}
