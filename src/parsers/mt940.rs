//! MT940 (SWIFT customer statement message) parser

use bigdecimal::BigDecimal;
use chrono::{Datelike, NaiveDate};
use regex::Regex;
use std::str::FromStr;
use tracing::warn;

use crate::parsers::StatementParser;
use crate::types::{ParsedStatement, ParsedTransaction, ReconcileError, ReconcileResult};
use crate::utils::validation::normalize_iban;

/// Structured sub-tags that can appear in `:86:` information fields
const SUBTAGS: [&str; 10] = [
    "TRTP", "IBAN", "BIC", "NAME", "REMI", "EREF", "BENM", "ORDP", "CSID", "MARF",
];

/// Parser for SWIFT MT940 plain-text statements
///
/// Handles the common tag subset: `:20:`, `:25:`, `:60F:`/`:60M:`, `:61:`,
/// `:86:` (with continuation lines), `:62F:`/`:62M:`. Statement currency is
/// taken from the opening balance.
pub struct Mt940Parser;

impl StatementParser for Mt940Parser {
    fn format_name(&self) -> &'static str {
        "mt940"
    }

    fn can_parse(&self, bytes: &[u8], filename: Option<&str>) -> bool {
        if let Some(name) = filename {
            let lower = name.to_ascii_lowercase();
            if lower.ends_with(".sta") || lower.ends_with(".mt940") || lower.ends_with(".940") {
                return true;
            }
        }
        let Ok(text) = std::str::from_utf8(bytes) else {
            return false;
        };
        text.lines().any(|line| {
            let line = line.trim_start();
            line.starts_with(":20:") || line.starts_with(":25:") || line.starts_with(":61:")
        })
    }

    fn parse(&self, bytes: &[u8]) -> ReconcileResult<ParsedStatement> {
        let text = std::str::from_utf8(bytes)
            .map_err(|_| ReconcileError::Parse("MT940 statement is not valid UTF-8".to_string()))?;

        // :61: value date, optional booking date, optional reversal flag,
        // debit/credit indicator, optional funds code, amount, free-form tail
        let line61 = Regex::new(
            r"^(?P<value>\d{6})(?P<booking>\d{4})?(?P<reversal>R)?(?P<dc>[CD])(?P<funds>[A-Z])?(?P<amount>\d+(?:,\d*)?)(?P<rest>.*)$",
        )
        .map_err(|e| ReconcileError::Parse(e.to_string()))?;

        let mut statement = ParsedStatement::new();
        let mut currency = String::from("EUR");
        let mut pending: Option<TxDraft> = None;
        let mut in_info = false;
        let mut saw_tag = false;

        for (index, line) in text.lines().enumerate() {
            let number = index + 1;
            if line.starts_with(":61:") {
                saw_tag = true;
                in_info = false;
                if let Some(draft) = pending.take() {
                    statement.transactions.push(draft.finish(&currency));
                }
                match parse_line_61(&line61, &line[4..]) {
                    Ok(draft) => pending = Some(draft),
                    Err(message) => {
                        let message = format!("line {number}: {message}");
                        warn!("Skipping MT940 statement line: {message}");
                        statement.errors.push(message);
                    }
                }
            } else if line.starts_with(":86:") {
                saw_tag = true;
                if let Some(draft) = pending.as_mut() {
                    draft.info_lines.push(line[4..].trim().to_string());
                    in_info = true;
                }
            } else if line.starts_with(':') {
                saw_tag = true;
                in_info = false;
                // A closing balance or a new statement message ends the
                // running transaction
                if line.starts_with(":62") || line.starts_with(":20:") {
                    if let Some(draft) = pending.take() {
                        statement.transactions.push(draft.finish(&currency));
                    }
                }
                if let Some(value) = line.strip_prefix(":25:") {
                    if statement.account_iban.is_none() {
                        statement.account_iban = extract_account_iban(value);
                    }
                } else if let Some(value) = line
                    .strip_prefix(":60F:")
                    .or_else(|| line.strip_prefix(":60M:"))
                {
                    if let Some(code) = balance_currency(value) {
                        currency = code;
                    }
                }
            } else if in_info && !line.trim().is_empty() {
                // Continuation of the :86: information field
                if let Some(draft) = pending.as_mut() {
                    draft.info_lines.push(line.trim().to_string());
                }
            }
        }

        if let Some(draft) = pending.take() {
            statement.transactions.push(draft.finish(&currency));
        }

        if !saw_tag {
            return Err(ReconcileError::Parse(
                "Not an MT940 statement: no SWIFT tags found".to_string(),
            ));
        }

        Ok(statement)
    }
}

/// One `:61:` statement line plus its accumulated `:86:` information
#[derive(Debug)]
struct TxDraft {
    booking_date: NaiveDate,
    value_date: NaiveDate,
    amount: BigDecimal,
    reference: Option<String>,
    info_lines: Vec<String>,
}

impl TxDraft {
    fn finish(self, currency: &str) -> ParsedTransaction {
        let info = self.info_lines.join(" ");
        let remittance = extract_subtag(&info, "REMI");
        let name = extract_subtag(&info, "NAME").or_else(|| extract_subtag(&info, "BENM"));
        let iban = extract_subtag(&info, "IBAN");
        let bic = extract_subtag(&info, "BIC");
        let end_to_end = extract_subtag(&info, "EREF").and_then(|r| usable_reference(&r));

        let description = remittance.unwrap_or_else(|| info.trim().to_string());

        let mut parsed = ParsedTransaction::new(
            self.booking_date,
            self.amount,
            currency.to_string(),
            description,
        )
        .with_value_date(self.value_date);

        if let Some(name) = name {
            parsed = parsed.with_counterparty_name(name);
        }
        if let Some(iban) = iban {
            parsed = parsed.with_counterparty_iban(&iban);
        }
        if let Some(bic) = bic {
            parsed = parsed.with_counterparty_bic(&bic);
        }
        // The structured end-to-end reference wins over the :61: reference
        if let Some(reference) = end_to_end.or(self.reference) {
            parsed = parsed.with_reference(reference);
        }

        parsed
    }
}

fn parse_line_61(line61: &Regex, value: &str) -> Result<TxDraft, String> {
    let caps = line61
        .captures(value.trim())
        .ok_or_else(|| format!("malformed :61: line '{value}'"))?;

    let value_date = parse_swift_date(&caps["value"])?;
    let booking_date = match caps.name("booking") {
        Some(m) => booking_override(value_date, m.as_str())?,
        None => value_date,
    };

    let raw_amount = caps["amount"].replace(',', ".");
    let amount = BigDecimal::from_str(raw_amount.trim_end_matches('.'))
        .map_err(|_| format!("invalid amount '{}'", &caps["amount"]))?;

    // D negates; a reversal flips the effective direction back
    let debit = &caps["dc"] == "D";
    let reversal = caps.name("reversal").is_some();
    let amount = match (debit, reversal) {
        (true, false) | (false, true) => -amount,
        _ => amount,
    };

    let rest = caps.name("rest").map(|m| m.as_str()).unwrap_or("");
    let reference = tail_reference(rest);

    Ok(TxDraft {
        booking_date,
        value_date,
        amount,
        reference,
        info_lines: Vec::new(),
    })
}

/// Date in SWIFT YYMMDD form; two-digit years pivot at 50
fn parse_swift_date(yymmdd: &str) -> Result<NaiveDate, String> {
    let yy: i32 = yymmdd[0..2]
        .parse()
        .map_err(|_| format!("invalid date '{yymmdd}'"))?;
    let month: u32 = yymmdd[2..4]
        .parse()
        .map_err(|_| format!("invalid date '{yymmdd}'"))?;
    let day: u32 = yymmdd[4..6]
        .parse()
        .map_err(|_| format!("invalid date '{yymmdd}'"))?;
    let year = if yy < 50 { 2000 + yy } else { 1900 + yy };
    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| format!("invalid date '{yymmdd}'"))
}

/// Booking month/day override, in the value date's year
fn booking_override(value_date: NaiveDate, mmdd: &str) -> Result<NaiveDate, String> {
    let month: u32 = mmdd[0..2]
        .parse()
        .map_err(|_| format!("invalid booking date '{mmdd}'"))?;
    let day: u32 = mmdd[2..4]
        .parse()
        .map_err(|_| format!("invalid booking date '{mmdd}'"))?;
    NaiveDate::from_ymd_opt(value_date.year(), month, day)
        .ok_or_else(|| format!("invalid booking date '{mmdd}'"))
}

/// Reference from the :61: tail: the bank reference after `//` when
/// present, otherwise the customer reference after the type code
fn tail_reference(rest: &str) -> Option<String> {
    let refs = if rest.len() >= 4 && is_type_code(&rest[..4]) {
        &rest[4..]
    } else {
        rest
    };
    match refs.split_once("//") {
        Some((customer, bank)) => {
            usable_reference(bank).or_else(|| usable_reference(customer))
        }
        None => usable_reference(refs),
    }
}

fn is_type_code(code: &str) -> bool {
    let mut chars = code.chars();
    chars.next().map(|c| c.is_ascii_uppercase()).unwrap_or(false)
        && chars.all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
}

/// Drop empty references and the SWIFT `NONREF` sentinel
fn usable_reference(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() || value == "NONREF" {
        None
    } else {
        Some(value.to_string())
    }
}

/// Value of a structured `/TAG/` sub-tag, delimited by the next known tag
fn extract_subtag(info: &str, tag: &str) -> Option<String> {
    let marker = format!("/{tag}/");
    let start = info.find(&marker)? + marker.len();
    let rest = &info[start..];
    let end = SUBTAGS
        .iter()
        .filter_map(|t| rest.find(&format!("/{t}/")))
        .min()
        .unwrap_or(rest.len());
    let value = rest[..end].trim().trim_end_matches('/').trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Account identification from :25:, the first alphanumeric token of at
/// least 10 characters starting with two letters
fn extract_account_iban(value: &str) -> Option<String> {
    value
        .split(|c: char| c == '/' || c.is_whitespace())
        .map(str::trim)
        .find(|token| {
            token.len() >= 10
                && token.chars().all(|c| c.is_ascii_alphanumeric())
                && token.chars().take(2).all(|c| c.is_ascii_alphabetic())
        })
        .map(normalize_iban)
}

/// Currency code of a :60F:/:60M: balance (D/C + YYMMDD + CCY + amount)
fn balance_currency(value: &str) -> Option<String> {
    let rest = value.get(7..)?;
    let code: String = rest.chars().take(3).collect();
    if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) {
        Some(code.to_ascii_uppercase())
    } else {
        None
    }
}
