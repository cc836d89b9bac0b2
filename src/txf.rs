use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::errors::*;

pub const TXF_VERSION: &str = "V042";
pub const DATE_FORMAT: &str = "%m/%d/%Y";

/// TXF reference numbers ("N" codes) this tool knows how to emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RefNumber {
    /// Form 8949 box A
    ShortTermCovered,
    /// Form 8949 box B
    ShortTermNoncovered,
    /// Form 8949 box C
    ShortTermNo1099B,
    /// Form 8949 box D
    LongTermCovered,
    /// Form 8949 box E
    LongTermNoncovered,
    /// Form 8949 box F
    LongTermNo1099B,
    Interest,
    Dividends,
    QualifiedDividends,
}

const REF_NUMBERS: &[(RefNumber, u16)] = &[
    (RefNumber::ShortTermCovered, 321),
    (RefNumber::ShortTermNoncovered, 711),
    (RefNumber::ShortTermNo1099B, 712),
    (RefNumber::LongTermCovered, 323),
    (RefNumber::LongTermNoncovered, 713),
    (RefNumber::LongTermNo1099B, 714),
    (RefNumber::Interest, 287),
    (RefNumber::Dividends, 286),
    (RefNumber::QualifiedDividends, 488),
];

impl RefNumber {
    pub fn code(self) -> u16 {
        REF_NUMBERS
            .iter()
            .find(|(r, _)| *r == self)
            .map_or(0, |(_, code)| *code)
    }

    pub fn from_code(code: u16) -> Option<RefNumber> {
        REF_NUMBERS
            .iter()
            .find(|(_, c)| *c == code)
            .map(|(r, _)| *r)
    }

    /// Maps the "Form 8949 Code" column of a 1099-B row. Unknown codes give
    /// `None` and the caller falls back to the section's own number.
    pub fn from_form_8949(code: &str) -> Option<RefNumber> {
        match code.trim().to_uppercase().as_str() {
            "A" => Some(RefNumber::ShortTermCovered),
            "B" | "X" => Some(RefNumber::ShortTermNoncovered),
            "C" => Some(RefNumber::ShortTermNo1099B),
            "D" => Some(RefNumber::LongTermCovered),
            "E" => Some(RefNumber::LongTermNoncovered),
            "F" => Some(RefNumber::LongTermNo1099B),
            _ => None,
        }
    }

    pub fn is_sale(self) -> bool {
        !matches!(
            self,
            RefNumber::Interest | RefNumber::Dividends | RefNumber::QualifiedDividends
        )
    }
}

impl fmt::Display for RefNumber {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "N{}", self.code())
    }
}

/// Date a lot was bought. Brokers report `VARIOUS` for merged lots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquired {
    On(NaiveDate),
    Various,
}

impl fmt::Display for Acquired {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Acquired::On(date) => write!(f, "{}", date.format(DATE_FORMAT)),
            Acquired::Various => write!(f, "VARIOUS"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    Sale {
        acquired: Acquired,
        sold: NaiveDate,
        proceeds: Decimal,
        cost_basis: Decimal,
        wash_sale: Decimal,
    },
    Income {
        amount: Decimal,
    },
}

/// One TD record of the output.
#[derive(Debug, Clone, PartialEq)]
pub struct TxfRecord {
    pub ref_number: RefNumber,
    pub description: String,
    pub entry: Entry,
}

impl TxfRecord {
    /// Proceeds minus cost basis; zero for income records.
    pub fn gain(&self) -> Decimal {
        match &self.entry {
            Entry::Sale {
                proceeds,
                cost_basis,
                ..
            } => proceeds - cost_basis,
            Entry::Income { .. } => Decimal::ZERO,
        }
    }

    /// Gain with the disallowed wash sale loss added back.
    pub fn adjusted_gain(&self) -> Decimal {
        match &self.entry {
            Entry::Sale { wash_sale, .. } => self.gain() + wash_sale,
            Entry::Income { .. } => Decimal::ZERO,
        }
    }
}

struct Money(Decimal);

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "${:.2}", self.0.round_dp(2))
    }
}

impl fmt::Display for TxfRecord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "TD")?;
        writeln!(f, "{}", self.ref_number)?;
        // copy and line number, always 1 for a single 1099
        writeln!(f, "C1")?;
        writeln!(f, "L1")?;
        writeln!(f, "P{}", self.description)?;
        match &self.entry {
            Entry::Sale {
                acquired,
                sold,
                proceeds,
                cost_basis,
                wash_sale,
            } => {
                writeln!(f, "D{}", acquired)?;
                writeln!(f, "D{}", sold.format(DATE_FORMAT))?;
                writeln!(f, "{}", Money(*cost_basis))?;
                writeln!(f, "{}", Money(*proceeds))?;
                if !wash_sale.is_zero() {
                    writeln!(f, "{}", Money(*wash_sale))?;
                }
            }
            Entry::Income { amount } => writeln!(f, "{}", Money(*amount))?,
        }
        writeln!(f, "^")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    pub application: String,
    pub date: NaiveDate,
}

impl Header {
    pub fn new(application: &str, date: NaiveDate) -> Header {
        Header {
            application: application.to_owned(),
            date,
        }
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "{}", TXF_VERSION)?;
        writeln!(f, "A{}", self.application)?;
        writeln!(f, "D{}", self.date.format(DATE_FORMAT))?;
        writeln!(f, "^")
    }
}

/// A complete TXF file.
#[derive(Debug, Clone, PartialEq)]
pub struct TxfDocument {
    pub header: Header,
    pub records: Vec<TxfRecord>,
}

impl fmt::Display for TxfDocument {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.header)?;
        self.records.iter().try_for_each(|r| write!(f, "{}", r))
    }
}

// Every TXF line is a one character tag followed by its value.
fn split_tag(l: &str) -> (&str, &str) {
    let at = l.chars().next().map_or(0, char::len_utf8);
    l.split_at(at)
}

fn malformed<T>(line: usize, msg: &str) -> Result<T> {
    Err(ErrorKind::MalformedTxf(line, msg.to_owned()).into())
}

fn parse_date(line: usize, s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FORMAT)
        .chain_err(|| ErrorKind::MalformedTxf(line, format!("bad date '{}'", s)))
}

fn parse_money(line: usize, s: &str) -> Result<Decimal> {
    Decimal::from_str(s)
        .chain_err(|| ErrorKind::MalformedTxf(line, format!("bad amount '{}'", s)))
}

impl TxfDocument {
    /// Reads back a file written by this tool. Only the record shapes the
    /// writer produces are understood.
    pub fn parse(text: &str) -> Result<TxfDocument> {
        let mut lines = text.lines().enumerate().map(|(i, l)| (i + 1, l.trim_end()));

        match lines.next() {
            Some((_, v)) if v == TXF_VERSION => (),
            Some((n, v)) => return malformed(n, &format!("unsupported version '{}'", v)),
            None => return malformed(1, "empty file"),
        }
        let mut application = None;
        let mut date = None;
        for (n, l) in &mut lines {
            match split_tag(l) {
                ("^", _) => break,
                ("A", a) => application = Some(a.to_owned()),
                ("D", d) => date = Some(parse_date(n, d)?),
                _ => return malformed(n, &format!("unexpected header line '{}'", l)),
            }
        }
        let header = match (application, date) {
            (Some(a), Some(d)) => Header::new(&a, d),
            _ => return malformed(1, "incomplete header"),
        };

        let mut records = Vec::new();
        let mut fields: Vec<(usize, &str)> = Vec::new();
        for (n, l) in lines {
            if l.is_empty() {
                continue;
            }
            if l == "^" {
                records.push(TxfDocument::parse_record(n, &fields)?);
                fields.clear();
            } else {
                fields.push((n, l));
            }
        }
        if let Some((n, _)) = fields.first() {
            return malformed(*n, "record without terminator");
        }

        Ok(TxfDocument { header, records })
    }

    fn parse_record(end: usize, fields: &[(usize, &str)]) -> Result<TxfRecord> {
        let mut ref_number = None;
        let mut description = String::new();
        let mut dates = Vec::new();
        let mut amounts = Vec::new();

        for (n, l) in fields {
            let (tag, value) = split_tag(l);
            match tag {
                "T" | "C" | "L" => (),
                "N" => {
                    let code = value
                        .parse::<u16>()
                        .chain_err(|| ErrorKind::MalformedTxf(*n, format!("bad ref '{}'", l)))?;
                    ref_number = RefNumber::from_code(code);
                    if ref_number.is_none() {
                        return malformed(*n, &format!("unknown ref '{}'", l));
                    }
                }
                "P" => description = value.to_owned(),
                "D" => dates.push((*n, value)),
                "$" => amounts.push(parse_money(*n, value)?),
                _ => return malformed(*n, &format!("unexpected line '{}'", l)),
            }
        }

        let ref_number = match ref_number {
            Some(r) => r,
            None => return malformed(end, "record without ref number"),
        };
        let entry = if ref_number.is_sale() {
            let (acquired, sold) = match &dates[..] {
                [(na, a), (ns, s)] => {
                    let acquired = if *a == "VARIOUS" {
                        Acquired::Various
                    } else {
                        Acquired::On(parse_date(*na, a)?)
                    };
                    (acquired, parse_date(*ns, s)?)
                }
                _ => return malformed(end, "sale needs two dates"),
            };
            let (cost_basis, proceeds, wash_sale) = match amounts[..] {
                [c, p] => (c, p, Decimal::ZERO),
                [c, p, w] => (c, p, w),
                _ => return malformed(end, "sale needs cost and proceeds"),
            };
            Entry::Sale {
                acquired,
                sold,
                proceeds,
                cost_basis,
                wash_sale,
            }
        } else {
            match amounts[..] {
                [amount] => Entry::Income { amount },
                _ => return malformed(end, "income needs one amount"),
            }
        };

        Ok(TxfRecord {
            ref_number,
            description,
            entry,
        })
    }
}
