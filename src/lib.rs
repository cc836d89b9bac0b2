#![recursion_limit = "1024"]
use std::{fmt, fs, path};

use chrono::NaiveDate;
use itertools::Itertools;
use log::info;
use rust_decimal::Decimal;

use crate::errors::*;
use crate::txf::{Entry, Header, RefNumber, TxfDocument, TxfRecord};

pub mod args;
pub mod mapper;
pub mod rows;
pub mod scan;
pub mod txf;

pub mod errors {
    error_chain::error_chain! {
        foreign_links {
            Io(::std::io::Error);
            Csv(::csv::Error);
        }

        errors {
            InvalidAmount(cell: String) {
                description("invalid amount")
                display("invalid amount '{}'", cell)
            }
            InvalidDate(cell: String) {
                description("invalid date")
                display("invalid date '{}', expected MM/DD/YYYY", cell)
            }
            MissingField(name: &'static str) {
                description("missing field")
                display("missing {}", name)
            }
            MissingColumn(name: &'static str) {
                description("missing column")
                display("no '{}' column", name)
            }
            MalformedTxf(line: usize, msg: String) {
                description("malformed txf")
                display("txf line {}: {}", line, msg)
            }
        }
    }
}

pub const TXF_EXTENSION: &str = "TXF";
pub const APPLICATION: &str = concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION"));

/// Output goes next to the input, with the extension swapped.
pub fn output_path(input: &path::Path) -> Result<path::PathBuf> {
    let is_txf = input
        .extension()
        .map_or(false, |e| e.eq_ignore_ascii_case(TXF_EXTENSION));
    if is_txf {
        error_chain::bail!(
            "Input {} already has the {} extension",
            input.to_string_lossy(),
            TXF_EXTENSION
        );
    }
    Ok(input.with_extension(TXF_EXTENSION))
}

/// The result of one run, before anything touches the disk.
#[derive(Debug, Clone, PartialEq)]
pub struct Conversion {
    pub document: TxfDocument,
    pub skipped: usize,
}

pub struct Converter {
    header: Header,
}

impl Converter {
    pub fn new(date: NaiveDate) -> Converter {
        Converter {
            header: Header::new(APPLICATION, date),
        }
    }

    /// Converts a whole CSV export held in memory. Bad rows are logged and
    /// counted, never fatal.
    pub fn convert_str(&self, text: &str) -> Result<Conversion> {
        let rows = rows::read_rows(text)?;
        let blocks = scan::scan(&rows);
        if blocks.is_empty() {
            info!("no known sections found, output will have no records");
        }

        let mut records = Vec::new();
        let mut skipped = 0;
        for block in &blocks {
            let (mut block_records, block_skipped) = mapper::map_block(block);
            info!(
                "{}: {} records, {} rows skipped",
                block.section,
                block_records.len(),
                block_skipped
            );
            records.append(&mut block_records);
            skipped += block_skipped;
        }

        Ok(Conversion {
            document: TxfDocument {
                header: self.header.clone(),
                records,
            },
            skipped,
        })
    }

    /// Reads `input`, converts it and writes the TXF to `output` in one go.
    pub fn convert_file(&self, input: &path::Path, output: &path::Path) -> Result<Conversion> {
        let input_str = input.to_string_lossy();
        let text = fs::read_to_string(input)
            .chain_err(|| format!("Cannot read input file {}", input_str))?;

        let conversion = self
            .convert_str(&text)
            .chain_err(|| format!("Cannot convert {}", input_str))?;

        fs::write(output, conversion.document.to_string())
            .chain_err(|| format!("Cannot write output file {}", output.to_string_lossy()))?;
        info!("{}: {} records written", output.to_string_lossy(), conversion.document.records.len());

        Ok(conversion)
    }
}

/// Totals to check against the broker's own 1099 summary.
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub records: usize,
    pub skipped: usize,
    pub proceeds: Decimal,
    pub cost_basis: Decimal,
    pub wash_sale: Decimal,
    pub gain: Decimal,
    pub adjusted_gain: Decimal,
    pub income: Vec<(RefNumber, Decimal)>,
}

impl Conversion {
    pub fn summary(&self) -> Summary {
        let records = &self.document.records;
        let sales = || records.iter().filter(|r| r.ref_number.is_sale());
        let total = |f: fn(&TxfRecord) -> Decimal| sales().map(f).sum::<Decimal>();

        let income = records
            .iter()
            .filter_map(|r| match r.entry {
                Entry::Income { amount } => Some((r.ref_number, amount)),
                Entry::Sale { .. } => None,
            })
            .into_group_map()
            .into_iter()
            .map(|(ref_number, amounts)| (ref_number, amounts.into_iter().sum::<Decimal>()))
            .sorted()
            .collect();

        Summary {
            records: records.len(),
            skipped: self.skipped,
            proceeds: total(|r| match r.entry {
                Entry::Sale { proceeds, .. } => proceeds,
                Entry::Income { .. } => Decimal::ZERO,
            }),
            cost_basis: total(|r| match r.entry {
                Entry::Sale { cost_basis, .. } => cost_basis,
                Entry::Income { .. } => Decimal::ZERO,
            }),
            wash_sale: total(|r| match r.entry {
                Entry::Sale { wash_sale, .. } => wash_sale,
                Entry::Income { .. } => Decimal::ZERO,
            }),
            gain: total(TxfRecord::gain),
            adjusted_gain: total(TxfRecord::adjusted_gain),
            income,
        }
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "Records written:\t{}", self.records)?;
        writeln!(f, "Rows skipped:\t\t{}", self.skipped)?;
        writeln!(f, "Verify these totals with your 1099 summary:")?;
        writeln!(f, "Total Proceeds:\t\t${:.2}", self.proceeds)?;
        writeln!(f, "Total Basis:\t\t${:.2}", self.cost_basis)?;
        writeln!(f, "Total Wash Sale:\t${:.2}", self.wash_sale)?;
        writeln!(f, "Total Gain/Loss:\t${:.2}", self.gain)?;
        write!(f, "Wash-Adjusted Gain/Loss:\t${:.2}", self.adjusted_gain)?;
        for (ref_number, amount) in &self.income {
            write!(f, "\nTotal {}:\t\t${:.2}", ref_number, amount)?;
        }
        Ok(())
    }
}
