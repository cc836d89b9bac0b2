use csv2txf::errors::*;
use csv2txf::txf::{Entry, RefNumber, TxfDocument};
use csv2txf::Converter;
use std::fs;
use std::str::FromStr;

use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use tempfile::tempdir;

// Writes `$csv` into a fresh temp dir and binds the input path and the
// derived output path.
macro_rules! temp_export {
    ($home:ident, $input:ident, $output:ident, $csv:expr) => {
        let $home = tempdir().chain_err(|| "Can't create temporary dir")?;
        let $input = $home.path().join("1099.csv");
        fs::write(&$input, $csv).chain_err(|| "Can't write the csv export")?;
        let $output = csv2txf::output_path(&$input)?;
    };
}

fn converter() -> Converter {
    Converter::new(NaiveDate::from_ymd_opt(2025, 2, 23).unwrap())
}

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

const COMPOSITE: &str = "\
\"Acme Brokerage 2024 Form 1099 Composite\"
\"Account 1234-5678\",\"Tax year 2024\"

\"Short Term\"
\"Description\",\"Date acquired\",\"Date sold\",\"Proceeds\",\"Cost basis\",\"Gain/Loss\"
\"100 sh. XYZ\",\"01/02/2024\",\"03/04/2024\",\"$1,500.00\",\"$1,000.00\",\"$500.00\"
\"10 sh. QQQ\",\"Various\",\"05/06/2024\",\"$300.00\",\"$350.00\",\"($50.00)\"
\"Subtotal\",\"\",\"\",\"$1,800.00\",\"$1,350.00\",\"$450.00\"

\"Long Term\"
\"ABC Corp\",\"01/01/2023\",\"01/01/2024\",\"1000.00\",\"800.00\"
\"DEF Inc\",\"01/01/2020\",\"02/01/2024\",\"N/A\",\"800.00\"
\"Total Long Term\",\"\",\"\",\"1000.00\",\"800.00\"

\"Interest Income\"
\"Payer\",\"Amount\"
\"Acme Bank\",\"$12.34\"
\"Total\",\"$12.34\"

\"Dividends\"
\"Vanguard Total Stock\",\"$45.67\"
\"Zero Fund\",\"$0.00\"
\"Qualified Dividends\"
\"Vanguard Total Stock\",\"$40.00\"
";

#[test]
fn converts_a_composite_export() -> Result<()> {
    temp_export!(home, input, output, COMPOSITE);
    let conversion = converter().convert_file(&input, &output)?;

    let refs: Vec<_> = conversion
        .document
        .records
        .iter()
        .map(|r| r.ref_number)
        .collect();
    assert_eq!(
        vec![
            RefNumber::ShortTermCovered,
            RefNumber::ShortTermCovered,
            RefNumber::LongTermCovered,
            RefNumber::Interest,
            RefNumber::Dividends,
            RefNumber::QualifiedDividends,
        ],
        refs
    );
    assert_eq!(1, conversion.skipped);

    let summary = conversion.summary();
    assert_eq!(dec("2800.00"), summary.proceeds);
    assert_eq!(dec("2150.00"), summary.cost_basis);
    assert_eq!(dec("650.00"), summary.gain);
    assert_eq!(
        vec![
            (RefNumber::Interest, dec("12.34")),
            (RefNumber::Dividends, dec("45.67")),
            (RefNumber::QualifiedDividends, dec("40.00")),
        ],
        summary.income
    );
    Ok(())
}

#[test]
fn long_term_scenario() -> Result<()> {
    let csv = "Long Term\nABC Corp,01/01/2023,01/01/2024,1000.00,800.00\nSubtotal,,,1000.00,800.00\n";
    temp_export!(home, input, output, csv);
    converter().convert_file(&input, &output)?;

    let text = fs::read_to_string(&output).chain_err(|| "Can't read the txf")?;
    assert_eq!(
        format!(
            "V042\nA{}\nD02/23/2025\n^\n\
             TD\nN323\nC1\nL1\nPABC Corp\nD01/01/2023\nD01/01/2024\n$800.00\n$1000.00\n^\n",
            csv2txf::APPLICATION
        ),
        text
    );

    let doc = TxfDocument::parse(&text)?;
    assert_eq!(1, doc.records.len());
    let record = &doc.records[0];
    assert_eq!(RefNumber::LongTermCovered, record.ref_number);
    assert_eq!(dec("200.00"), record.gain());
    match record.entry {
        Entry::Sale {
            proceeds,
            cost_basis,
            ..
        } => {
            assert_eq!(dec("1000.00"), proceeds);
            assert_eq!(dec("800.00"), cost_basis);
        }
        Entry::Income { .. } => panic!("expected a sale"),
    }
    Ok(())
}

#[test]
fn no_sections_gives_header_only() -> Result<()> {
    temp_export!(home, input, output, "name,value\nfoo,1.00\nbar,2.00\n");
    let conversion = converter().convert_file(&input, &output)?;

    assert_eq!(0, conversion.document.records.len());
    let text = fs::read_to_string(&output).chain_err(|| "Can't read the txf")?;
    assert_eq!(
        format!("V042\nA{}\nD02/23/2025\n^\n", csv2txf::APPLICATION),
        text
    );
    Ok(())
}

#[test]
fn unparseable_amount_skips_only_that_row() -> Result<()> {
    let csv = "\
Short Term
A,01/01/2024,02/01/2024,10.00,5.00
B,01/01/2024,02/01/2024,N/A,5.00
C,01/01/2024,02/01/2024,20.00,5.00
Total,,,30.00,15.00
";
    let conversion = converter().convert_str(csv)?;
    let descriptions: Vec<_> = conversion
        .document
        .records
        .iter()
        .map(|r| &r.description[..])
        .collect();
    assert_eq!(vec!["A", "C"], descriptions);
    assert_eq!(1, conversion.skipped);
    Ok(())
}

#[test]
fn security_named_total_stays_in_section() -> Result<()> {
    let csv = "\
Long Term
ABC Corp,01/01/2023,01/01/2024,1000.00,800.00
TOTALENERGIES SE ADR,01/01/2023,01/01/2024,500.00,400.00
XYZ,01/01/2023,01/01/2024,300.00,200.00
Total,,,1800.00,1400.00
";
    let conversion = converter().convert_str(csv)?;
    assert_eq!(3, conversion.document.records.len());
    assert_eq!(0, conversion.skipped);
    assert_eq!("TOTALENERGIES SE ADR", conversion.document.records[1].description);
    Ok(())
}

#[test]
fn oversized_amounts_are_skipped_not_fatal() -> Result<()> {
    let csv = "\
Short Term
A,01/01/2024,02/01/2024,50000000000000000000000000000,5.00
B,01/01/2024,02/01/2024,50000000000000000000000000000,5.00
C,01/01/2024,02/01/2024,20.00,5.00
";
    let conversion = converter().convert_str(csv)?;
    assert_eq!(1, conversion.document.records.len());
    assert_eq!(2, conversion.skipped);
    assert_eq!(dec("15.00"), conversion.summary().gain);
    Ok(())
}

#[test]
fn record_count_round_trips() -> Result<()> {
    let conversion = converter().convert_str(COMPOSITE)?;
    let parsed = TxfDocument::parse(&conversion.document.to_string())?;
    assert_eq!(6, parsed.records.len());
    assert_eq!(conversion.document, parsed);
    Ok(())
}

#[test]
fn conversion_is_idempotent() -> Result<()> {
    temp_export!(home, input, output, COMPOSITE);
    converter().convert_file(&input, &output)?;
    let first = fs::read(&output).chain_err(|| "Can't read the txf")?;
    converter().convert_file(&input, &output)?;
    let second = fs::read(&output).chain_err(|| "Can't read the txf")?;
    assert_eq!(first, second);
    Ok(())
}

#[test]
fn detailed_1099b_uses_form_8949_codes() -> Result<()> {
    let csv = "\
\"Form 1099-B Proceeds From Broker and Barter Exchange Transactions\"
\"Description of property (Example 100 sh. XYZ Co.)\",\"Date acquired\",\"Date sold or disposed\",\"Proceeds\",\"Cost or other basis\",\"Wash sale loss disallowed\",\"Form 8949 Code\"
\"5 sh. AAA\",\"01/02/2024\",\"02/03/2024\",\"$100.00\",\"$150.00\",\"$25.00\",\"A\"
\"5 sh. BBB\",\"\",\"02/03/2024\",\"$100.00\",\"$90.00\",\"\",\"E\"
\"5 sh. CCC\",\"01/02/2020\",\"02/03/2024\",\"$100.00\",\"$90.00\",\"\",\"\"
";
    let conversion = converter().convert_str(csv)?;
    let records = &conversion.document.records;
    assert_eq!(3, records.len());
    assert_eq!(RefNumber::ShortTermCovered, records[0].ref_number);
    assert_eq!(RefNumber::LongTermNoncovered, records[1].ref_number);
    assert_eq!(RefNumber::ShortTermNoncovered, records[2].ref_number);

    let text = conversion.document.to_string();
    assert!(text.contains("P5 sh. AAA\n"));
    assert!(text.contains("$150.00\n$100.00\n$25.00\n^\n"));
    assert!(text.contains("D02/03/2024\nD02/03/2024\n"));

    let summary = conversion.summary();
    assert_eq!(dec("25.00"), summary.wash_sale);
    assert_eq!(dec("-30.00"), summary.gain);
    assert_eq!(dec("-5.00"), summary.adjusted_gain);
    Ok(())
}

#[test]
fn missing_input_is_an_error() -> Result<()> {
    let home = tempdir().chain_err(|| "Can't create temporary dir")?;
    let input = home.path().join("missing.csv");
    let output = csv2txf::output_path(&input)?;

    assert!(converter().convert_file(&input, &output).is_err());
    assert!(!output.exists());
    Ok(())
}

#[test]
fn unwritable_output_is_an_error() -> Result<()> {
    temp_export!(home, input, _output, COMPOSITE);
    let output = home.path().join("no-such-dir").join("1099.TXF");
    assert!(converter().convert_file(&input, &output).is_err());
    Ok(())
}

#[test]
fn output_path_swaps_extension() -> Result<()> {
    let output = csv2txf::output_path(std::path::Path::new("dir/1099-2024.csv"))?;
    assert_eq!(std::path::Path::new("dir/1099-2024.TXF"), output.as_path());
    assert!(csv2txf::output_path(std::path::Path::new("dir/1099.txf")).is_err());
    Ok(())
}
