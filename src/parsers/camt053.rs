//! CAMT.053 (ISO 20022 bank-to-customer statement) parser

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::str::FromStr;
use tracing::warn;

use crate::parsers::StatementParser;
use crate::types::{ParsedStatement, ParsedTransaction, ReconcileError, ReconcileResult};
use crate::utils::validation::normalize_iban;

/// Parser for ISO 20022 CAMT.053 bank-to-customer statements
///
/// Matches on local element names only and on path suffixes rather than
/// absolute paths, so it survives namespace changes and version drift
/// across camt.053.001.02/04/06/08.
pub struct Camt053Parser;

impl StatementParser for Camt053Parser {
    fn format_name(&self) -> &'static str {
        "camt.053"
    }

    fn can_parse(&self, bytes: &[u8], _filename: Option<&str>) -> bool {
        let content = String::from_utf8_lossy(bytes);
        let head = content.trim_start_matches('\u{feff}').trim_start();
        (head.starts_with("<?xml") || head.starts_with("<Document"))
            && (content.contains("BkToCstmrStmt") || content.contains("camt.053"))
    }

    fn parse(&self, bytes: &[u8]) -> ReconcileResult<ParsedStatement> {
        let mut reader = Reader::from_reader(bytes);
        reader.trim_text(true);

        let mut statement = ParsedStatement::new();
        let mut path: Vec<String> = Vec::new();
        let mut entry: Option<EntryDraft> = None;
        let mut entry_index = 0usize;
        let mut amount_currency = String::new();
        let mut saw_statement = false;

        let mut buf = Vec::new();
        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) => {
                    let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                    if name == "BkToCstmrStmt" {
                        saw_statement = true;
                    }
                    if name == "Amt" && path.last().map(String::as_str) == Some("Ntry") {
                        amount_currency.clear();
                        for attribute in e.attributes().flatten() {
                            if attribute.key.as_ref() == b"Ccy" {
                                if let Ok(value) = String::from_utf8(attribute.value.into_owned())
                                {
                                    amount_currency = value;
                                }
                            }
                        }
                    }
                    if name == "Ntry" {
                        entry_index += 1;
                        entry = Some(EntryDraft::default());
                    }
                    path.push(name);
                }
                Ok(Event::End(e)) => {
                    let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                    if name == "Ntry" {
                        if let Some(draft) = entry.take() {
                            match draft.finish(entry_index) {
                                Ok(parsed) => statement.transactions.push(parsed),
                                Err(message) => {
                                    warn!("Skipping CAMT.053 entry: {message}");
                                    statement.errors.push(message);
                                }
                            }
                        }
                    }
                    path.pop();
                }
                Ok(Event::Text(t)) => {
                    let text = t
                        .unescape()
                        .map_err(|e| ReconcileError::Parse(format!("Invalid XML text: {e}")))?;
                    let text = text.trim();
                    if !text.is_empty() {
                        apply_text(&path, text, &mut statement, &mut entry, &amount_currency);
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(ReconcileError::Parse(format!(
                        "Invalid CAMT.053 document: {e}"
                    )))
                }
                _ => {}
            }
            buf.clear();
        }

        if !saw_statement {
            return Err(ReconcileError::Parse(
                "Not a CAMT.053 document: missing BkToCstmrStmt".to_string(),
            ));
        }

        Ok(statement)
    }
}

fn apply_text(
    path: &[String],
    text: &str,
    statement: &mut ParsedStatement,
    entry: &mut Option<EntryDraft>,
    amount_currency: &str,
) {
    if !in_element(path, "Ntry") {
        // Statement-level account identification; the first hit wins when a
        // file carries several Stmt blocks for the same account
        if statement.account_iban.is_none() && path_ends_with(path, &["Acct", "Id", "IBAN"]) {
            statement.account_iban = Some(normalize_iban(text));
        } else if statement.account_iban.is_none()
            && path_ends_with(path, &["Acct", "Id", "Othr", "Id"])
        {
            let normalized = normalize_iban(text);
            if looks_like_iban(&normalized) {
                statement.account_iban = Some(normalized);
            }
        }
        return;
    }

    let Some(draft) = entry.as_mut() else {
        return;
    };
    let last = path.last().map(String::as_str).unwrap_or("");

    if path_ends_with(path, &["Ntry", "Amt"]) {
        if !amount_currency.is_empty() {
            draft.currency = Some(amount_currency.to_string());
        }
        match BigDecimal::from_str(text) {
            Ok(amount) => draft.amount = Some(amount),
            Err(_) => draft.mark_invalid(format!("invalid amount '{text}'")),
        }
    } else if last == "CdtDbtInd" {
        // Entry-level indicator wins over the per-transaction-details one
        if path_ends_with(path, &["Ntry", "CdtDbtInd"]) || draft.direction.is_none() {
            draft.direction = Some(text.to_string());
        }
    } else if path_ends_with(path, &["BookgDt", "Dt"]) || path_ends_with(path, &["BookgDt", "DtTm"])
    {
        match parse_iso_date(text) {
            Some(date) => draft.booking_date = Some(date),
            None => draft.mark_invalid(format!("invalid booking date '{text}'")),
        }
    } else if path_ends_with(path, &["ValDt", "Dt"]) || path_ends_with(path, &["ValDt", "DtTm"]) {
        draft.value_date = parse_iso_date(text);
    } else if path_ends_with(path, &["RmtInf", "Ustrd"]) {
        draft.remittance.push(text.to_string());
    } else if path_ends_with(path, &["Ntry", "AddtlNtryInf"]) {
        draft.additional_info.push(text.to_string());
    } else if in_element(path, "RltdPties") && last == "Nm" {
        if in_element(path, "Dbtr") {
            draft.debtor_name.get_or_insert_with(|| text.to_string());
        } else if in_element(path, "Cdtr") {
            draft.creditor_name.get_or_insert_with(|| text.to_string());
        }
    } else if in_element(path, "DbtrAcct") && last == "IBAN" {
        draft.debtor_iban = Some(text.to_string());
    } else if in_element(path, "CdtrAcct") && last == "IBAN" {
        draft.creditor_iban = Some(text.to_string());
    } else if in_element(path, "DbtrAgt") && (last == "BIC" || last == "BICFI") {
        draft.debtor_bic = Some(text.to_string());
    } else if in_element(path, "CdtrAgt") && (last == "BIC" || last == "BICFI") {
        draft.creditor_bic = Some(text.to_string());
    } else if in_element(path, "Refs") {
        match last {
            "EndToEndId" => draft.end_to_end_id = Some(text.to_string()),
            "TxId" => draft.tx_id = Some(text.to_string()),
            "AcctSvcrRef" => draft.account_servicer_ref = Some(text.to_string()),
            _ => {}
        }
    }
}

/// Accumulates the fields of one `Ntry` element while it is being read
#[derive(Debug, Default)]
struct EntryDraft {
    booking_date: Option<NaiveDate>,
    value_date: Option<NaiveDate>,
    amount: Option<BigDecimal>,
    currency: Option<String>,
    direction: Option<String>,
    debtor_name: Option<String>,
    creditor_name: Option<String>,
    debtor_iban: Option<String>,
    creditor_iban: Option<String>,
    debtor_bic: Option<String>,
    creditor_bic: Option<String>,
    remittance: Vec<String>,
    additional_info: Vec<String>,
    end_to_end_id: Option<String>,
    tx_id: Option<String>,
    account_servicer_ref: Option<String>,
    invalid: Option<String>,
}

impl EntryDraft {
    fn mark_invalid(&mut self, reason: String) {
        if self.invalid.is_none() {
            self.invalid = Some(reason);
        }
    }

    fn finish(self, index: usize) -> Result<ParsedTransaction, String> {
        if let Some(reason) = self.invalid {
            return Err(format!("entry {index}: {reason}"));
        }
        let booking_date = self
            .booking_date
            .ok_or_else(|| format!("entry {index}: missing booking date"))?;
        let amount = self
            .amount
            .ok_or_else(|| format!("entry {index}: missing amount"))?;
        let currency = self
            .currency
            .ok_or_else(|| format!("entry {index}: missing currency"))?;

        let is_debit = self.direction.as_deref() == Some("DBIT");
        let amount = if is_debit { -amount } else { amount };

        let mut parts = self.remittance;
        parts.extend(self.additional_info);
        let description = parts.join(" ");

        let mut parsed = ParsedTransaction::new(booking_date, amount, currency, description);
        if let Some(value_date) = self.value_date {
            parsed = parsed.with_value_date(value_date);
        }

        // The counterparty is the other side of the movement
        let (name, iban, bic) = if is_debit {
            (self.creditor_name, self.creditor_iban, self.creditor_bic)
        } else {
            (self.debtor_name, self.debtor_iban, self.debtor_bic)
        };
        if let Some(name) = name {
            parsed = parsed.with_counterparty_name(name);
        }
        if let Some(iban) = iban {
            parsed = parsed.with_counterparty_iban(&iban);
        }
        if let Some(bic) = bic {
            parsed = parsed.with_counterparty_bic(&bic);
        }

        if let Some(reference) = usable_reference(self.end_to_end_id)
            .or_else(|| usable_reference(self.tx_id))
        {
            parsed = parsed.with_reference(reference);
        }
        if let Some(id) = self.account_servicer_ref {
            parsed = parsed.with_transaction_id(id);
        }

        Ok(parsed)
    }
}

/// Drop empty references and the ISO 20022 `NOTPROVIDED` sentinel
fn usable_reference(reference: Option<String>) -> Option<String> {
    reference
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty() && r != "NOTPROVIDED")
}

fn parse_iso_date(text: &str) -> Option<NaiveDate> {
    let date_part = text.get(..10).unwrap_or(text);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

fn path_ends_with(path: &[String], suffix: &[&str]) -> bool {
    path.len() >= suffix.len()
        && path[path.len() - suffix.len()..]
            .iter()
            .zip(suffix)
            .all(|(a, b)| a == b)
}

fn in_element(path: &[String], name: &str) -> bool {
    path.iter().any(|p| p == name)
}

fn looks_like_iban(value: &str) -> bool {
    value.len() >= 10 && value.chars().take(2).all(|c| c.is_ascii_alphabetic())
}
