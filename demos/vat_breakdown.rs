//! VAT breakdown and matching heuristics examples

use bigdecimal::BigDecimal;
use reconciliation_core::vat::breakdown_from_gross;
use reconciliation_core::{similarity, Mt940Parser, StatementParser};
use std::str::FromStr;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("🧾 Reconciliation Core - VAT and Matching Examples\n");

    // 1. Reverse-calculate VAT from gross bank amounts
    println!("💶 VAT Breakdown from Gross (Dutch rates):");
    let rates = [
        ("21", "High rate (most goods and services)"),
        ("9", "Low rate (food, books, medicine)"),
        ("0", "Zero rated / exempt"),
    ];
    let gross = BigDecimal::from_str("121.00")?;

    for (rate, description) in rates.iter() {
        let breakdown = breakdown_from_gross(&gross, &BigDecimal::from_str(rate)?);
        println!("  {}% - {}", rate, description);
        println!("    Gross: €{}", breakdown.gross_amount);
        println!("    Net:   €{}", breakdown.net_amount);
        println!("    VAT:   €{}", breakdown.vat_amount);
    }
    println!();

    // 2. Counterparty name similarity used by the commitment matcher
    println!("🔤 Counterparty Name Similarity:");
    let pairs = [
        ("Gym-Fit B.V.", "GYM FIT BV"),
        ("Gym-Fit B.V.", "Gym Fit Amsterdam BV"),
        ("Gym-Fit B.V.", "Bakkerij Jansen"),
    ];
    for (provider, statement_name) in pairs.iter() {
        println!(
            "  \"{}\" vs \"{}\" -> {:.2}",
            provider,
            statement_name,
            similarity(provider, statement_name)
        );
    }
    println!();

    // 3. Parse a raw MT940 fragment without any storage involved
    println!("📄 Parsing an MT940 fragment:");
    let fragment = "\
:20:STMT-1
:25:NL91ABNA0417164300
:60F:C240114EUR1000,00
:61:2401150115D123,45NMSCNONREF//FEE-JAN
:86:/NAME/ACME Supplies BV/REMI/Invoice 2024-007/EREF/E2E-42
:62F:C240115EUR876,55
";
    let statement = Mt940Parser.parse(fragment.as_bytes())?;
    println!("  Account: {}", statement.account_iban.as_deref().unwrap_or("?"));
    for transaction in &statement.transactions {
        println!(
            "  {} {} \"{}\" ({})",
            transaction.booking_date,
            transaction.amount,
            transaction.description,
            transaction.reference.as_deref().unwrap_or("no reference")
        );
    }

    println!("\n🎉 Example completed successfully!");
    Ok(())
}
