use std::str::FromStr;

use chrono::NaiveDate;
use log::warn;
use rust_decimal::Decimal;

use crate::errors::*;
use crate::rows::Row;
use crate::scan::{Section, SectionBlock};
use crate::txf::{Acquired, Entry, RefNumber, TxfRecord, DATE_FORMAT};

/// Where each field lives in the rows of one section.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnLayout {
    Sale {
        description: usize,
        acquired: usize,
        sold: usize,
        proceeds: usize,
        cost_basis: usize,
        gain: Option<usize>,
        wash_sale: Option<usize>,
        form_8949: Option<usize>,
    },
    Income {
        description: usize,
        amount: usize,
    },
}

fn find_column(columns: &Row, matches: impl Fn(&str) -> bool) -> Option<usize> {
    columns
        .cells()
        .iter()
        .position(|c| matches(&c.to_lowercase()))
}

fn require(idx: Option<usize>, name: &'static str) -> Result<usize> {
    idx.ok_or_else(|| ErrorKind::MissingColumn(name).into())
}

impl ColumnLayout {
    /// Layout used when a section has no column header row.
    pub fn positional(section: Section) -> ColumnLayout {
        if section.is_sale() {
            ColumnLayout::Sale {
                description: 0,
                acquired: 1,
                sold: 2,
                proceeds: 3,
                cost_basis: 4,
                gain: Some(5),
                wash_sale: Some(6),
                form_8949: None,
            }
        } else {
            ColumnLayout::Income {
                description: 0,
                amount: 1,
            }
        }
    }

    pub fn from_columns(section: Section, columns: &Row) -> Result<ColumnLayout> {
        let description = find_column(columns, |c| {
            c.starts_with("description") || c.starts_with("security") || c.starts_with("payer")
        })
        .unwrap_or(0);

        if section.is_sale() {
            Ok(ColumnLayout::Sale {
                description,
                acquired: require(find_column(columns, |c| c.contains("acquired")), "date acquired")?,
                sold: require(
                    find_column(columns, |c| c.contains("sold") || c.contains("disposed")),
                    "date sold",
                )?,
                proceeds: require(find_column(columns, |c| c.contains("proceeds")), "proceeds")?,
                cost_basis: require(
                    find_column(columns, |c| c.contains("basis") || c.starts_with("cost")),
                    "cost basis",
                )?,
                gain: find_column(columns, |c| c.contains("gain") && !c.contains("wash")),
                wash_sale: find_column(columns, |c| c.contains("wash")),
                form_8949: find_column(columns, |c| c.contains("8949")),
            })
        } else {
            Ok(ColumnLayout::Income {
                description,
                amount: require(
                    find_column(columns, |c| c.contains("amount") || c.contains("income")),
                    "amount",
                )?,
            })
        }
    }
}

// Far above any 1099 line, far below where decimal sums overflow.
const MAX_AMOUNT: i64 = 1_000_000_000_000_000;

/// Parses a currency cell: `$`, thousands separators and blanks are dropped,
/// `(1.00)` is negative. The result is rounded to cents.
pub fn parse_amount(cell: &str) -> Result<Decimal> {
    let cleaned: String = cell
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | ' '))
        .collect();
    let (negative, digits) = match cleaned
        .strip_prefix('(')
        .and_then(|c| c.strip_suffix(')'))
    {
        Some(inner) => (true, inner),
        None => (false, &cleaned[..]),
    };

    let value = Decimal::from_str(digits)
        .chain_err(|| ErrorKind::InvalidAmount(cell.to_owned()))?
        .round_dp(2);
    if value.abs() > Decimal::new(MAX_AMOUNT, 0) {
        error_chain::bail!(ErrorKind::InvalidAmount(cell.to_owned()));
    }
    Ok(if negative { -value } else { value })
}

/// Like `parse_amount`, but an empty cell counts as zero.
fn parse_optional_amount(cell: &str) -> Result<Decimal> {
    if cell.is_empty() {
        Ok(Decimal::ZERO)
    } else {
        parse_amount(cell)
    }
}

pub fn parse_date(cell: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(cell, DATE_FORMAT)
        .chain_err(|| ErrorKind::InvalidDate(cell.to_owned()))
}

fn parse_acquired(cell: &str, sold: NaiveDate) -> Result<Acquired> {
    if cell.is_empty() {
        Ok(Acquired::On(sold))
    } else if cell.eq_ignore_ascii_case("various") {
        Ok(Acquired::Various)
    } else {
        parse_date(cell).map(Acquired::On)
    }
}

// TXF is line based; a multi-line cell would break the record.
fn clean_description(cell: &str) -> String {
    cell.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn map_sale(section: Section, layout: &ColumnLayout, row: &Row) -> Result<Option<TxfRecord>> {
    let (description, acquired, sold, proceeds, cost_basis, gain, wash_sale, form_8949) =
        match *layout {
            ColumnLayout::Sale {
                description,
                acquired,
                sold,
                proceeds,
                cost_basis,
                gain,
                wash_sale,
                form_8949,
            } => (
                description,
                acquired,
                sold,
                proceeds,
                cost_basis,
                gain,
                wash_sale,
                form_8949,
            ),
            ColumnLayout::Income { .. } => error_chain::bail!("{} rows need a sale layout", section),
        };

    let description = clean_description(row.cell(description));
    if description.is_empty() {
        error_chain::bail!(ErrorKind::MissingField("description"));
    }
    if row.cell(sold).is_empty() {
        error_chain::bail!(ErrorKind::MissingField("date sold"));
    }
    let sold = parse_date(row.cell(sold))?;
    let acquired = parse_acquired(row.cell(acquired), sold)?;
    let proceeds = parse_amount(row.cell(proceeds))?;
    let cost_basis = parse_amount(row.cell(cost_basis))?;
    let wash_sale = match wash_sale {
        Some(idx) => parse_optional_amount(row.cell(idx))?,
        None => Decimal::ZERO,
    };

    if proceeds.is_zero() && cost_basis.is_zero() {
        return Ok(None);
    }

    let ref_number = form_8949
        .and_then(|idx| RefNumber::from_form_8949(row.cell(idx)))
        .unwrap_or_else(|| section.ref_number());

    let record = TxfRecord {
        ref_number,
        description,
        entry: Entry::Sale {
            acquired,
            sold,
            proceeds,
            cost_basis,
            wash_sale,
        },
    };

    // The broker's own gain column is only a cross-check.
    if let Some(reported) = gain.map(|idx| row.cell(idx)).filter(|c| !c.is_empty()) {
        match parse_amount(reported) {
            Ok(g) if g == record.gain() || g == record.adjusted_gain() => (),
            Ok(g) => warn!(
                "{}: reported gain {} differs from computed {}",
                row, g, record.gain()
            ),
            Err(_) => warn!("{}: cannot read reported gain '{}'", row, reported),
        }
    }

    Ok(Some(record))
}

fn map_income(section: Section, layout: &ColumnLayout, row: &Row) -> Result<Option<TxfRecord>> {
    let (description, amount) = match *layout {
        ColumnLayout::Income {
            description,
            amount,
        } => (description, amount),
        ColumnLayout::Sale { .. } => error_chain::bail!("{} rows need an income layout", section),
    };

    let description = clean_description(row.cell(description));
    if description.is_empty() {
        error_chain::bail!(ErrorKind::MissingField("description"));
    }
    let amount = parse_amount(row.cell(amount))?;
    if amount.is_zero() {
        return Ok(None);
    }

    Ok(Some(TxfRecord {
        ref_number: section.ref_number(),
        description,
        entry: Entry::Income { amount },
    }))
}

/// Turns one data row into a record. `Ok(None)` means the row carries no
/// amount worth reporting; an error means the row is malformed.
pub fn map_row(section: Section, layout: &ColumnLayout, row: &Row) -> Result<Option<TxfRecord>> {
    if section.is_sale() {
        map_sale(section, layout, row)
    } else {
        map_income(section, layout, row)
    }
}

/// Records of a whole section plus the number of rows skipped as malformed.
pub fn map_block(block: &SectionBlock) -> (Vec<TxfRecord>, usize) {
    let layout = match &block.columns {
        Some(columns) => match ColumnLayout::from_columns(block.section, columns) {
            Ok(layout) => layout,
            Err(e) => {
                warn!(
                    "{}: skipping {} section ({} rows): {}",
                    columns,
                    block.section,
                    block.rows.len(),
                    e
                );
                return (Vec::new(), block.rows.len());
            }
        },
        None => ColumnLayout::positional(block.section),
    };

    let mut records = Vec::new();
    let mut skipped = 0;
    for row in &block.rows {
        match map_row(block.section, &layout, row) {
            Ok(Some(record)) => records.push(record),
            Ok(None) => (),
            Err(e) => {
                warn!("{}: skipped: {}", row, e);
                skipped += 1;
            }
        }
    }
    (records, skipped)
}
