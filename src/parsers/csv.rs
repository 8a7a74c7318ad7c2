//! Configurable CSV bank-export parser

use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord, Trim};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::parsers::amount::parse_amount;
use crate::parsers::StatementParser;
use crate::types::{ParsedStatement, ParsedTransaction, ReconcileError, ReconcileResult};

/// Date formats tried after the configured hint fails
const DATE_FORMATS: [&str; 6] = [
    "%Y-%m-%d", "%d-%m-%Y", "%d/%m/%Y", "%m/%d/%Y", "%Y/%m/%d", "%d.%m.%Y",
];

/// Maps statement fields to the column names of a bank's CSV export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CsvColumnMapping {
    /// Column holding the booking date
    pub date_column: String,
    /// Column holding the signed amount
    pub amount_column: String,
    /// Column holding the description
    pub description_column: String,
    /// Column holding the counterparty name
    pub name_column: Option<String>,
    /// Column holding the counterparty IBAN
    pub iban_column: Option<String>,
    /// Column holding the payment reference
    pub reference_column: Option<String>,
}

/// Parser for delimited bank exports with a per-bank column mapping
///
/// The delimiter is sniffed from the header row (`;`, `,` or tab). Rows
/// that fail to parse are reported individually and skipped.
pub struct CsvParser {
    mapping: CsvColumnMapping,
    date_format: String,
    currency: String,
}

impl CsvParser {
    /// Create a parser for the given mapping and preferred date format
    pub fn new(mapping: CsvColumnMapping, date_format: String) -> Self {
        Self {
            mapping,
            date_format,
            currency: "EUR".to_string(),
        }
    }

    /// Override the currency assigned to parsed rows
    pub fn with_currency(mut self, currency: String) -> Self {
        self.currency = currency;
        self
    }

    fn parse_date(&self, raw: &str) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(raw, &self.date_format)
            .ok()
            .or_else(|| {
                DATE_FORMATS
                    .iter()
                    .find_map(|format| NaiveDate::parse_from_str(raw, format).ok())
            })
    }

    fn parse_record(
        &self,
        record: &StringRecord,
        columns: &ColumnIndexes,
    ) -> Result<ParsedTransaction, String> {
        let raw_date = record.get(columns.date).unwrap_or("").trim();
        let booking_date = self
            .parse_date(raw_date)
            .ok_or_else(|| format!("unparseable date '{raw_date}'"))?;

        let raw_amount = record.get(columns.amount).unwrap_or("");
        let amount =
            parse_amount(raw_amount).map_err(|_| format!("invalid amount '{raw_amount}'"))?;

        let description = record
            .get(columns.description)
            .unwrap_or("")
            .trim()
            .to_string();

        let mut parsed =
            ParsedTransaction::new(booking_date, amount, self.currency.clone(), description);

        if let Some(value) = optional_field(record, columns.name) {
            parsed = parsed.with_counterparty_name(value.to_string());
        }
        if let Some(value) = optional_field(record, columns.iban) {
            parsed = parsed.with_counterparty_iban(value);
        }
        if let Some(value) = optional_field(record, columns.reference) {
            parsed = parsed.with_reference(value.to_string());
        }

        Ok(parsed)
    }
}

impl StatementParser for CsvParser {
    fn format_name(&self) -> &'static str {
        "csv"
    }

    fn can_parse(&self, bytes: &[u8], filename: Option<&str>) -> bool {
        let Ok(text) = std::str::from_utf8(bytes) else {
            return false;
        };
        let first_line = text.lines().next().unwrap_or("");
        let delimiter = sniff_delimiter(first_line) as char;
        let headers: Vec<&str> = first_line.split(delimiter).map(str::trim).collect();
        if headers
            .iter()
            .any(|h| h.eq_ignore_ascii_case(&self.mapping.date_column))
            && headers
                .iter()
                .any(|h| h.eq_ignore_ascii_case(&self.mapping.amount_column))
        {
            return true;
        }
        filename
            .map(|name| name.to_ascii_lowercase().ends_with(".csv"))
            .unwrap_or(false)
    }

    fn parse(&self, bytes: &[u8]) -> ReconcileResult<ParsedStatement> {
        let text = std::str::from_utf8(bytes)
            .map_err(|_| ReconcileError::Parse("CSV file is not valid UTF-8".to_string()))?;
        let delimiter = sniff_delimiter(text.lines().next().unwrap_or(""));

        let mut reader = ReaderBuilder::new()
            .delimiter(delimiter)
            .trim(Trim::All)
            .flexible(true)
            .from_reader(text.as_bytes());

        let headers = reader
            .headers()
            .map_err(|e| ReconcileError::Parse(format!("Invalid CSV header: {e}")))?
            .clone();
        let columns = ColumnIndexes::resolve(&headers, &self.mapping)?;

        let mut statement = ParsedStatement::new();
        for (index, record) in reader.records().enumerate() {
            let row = index + 2; // 1-based, after the header row
            let outcome = match record {
                Ok(record) => self.parse_record(&record, &columns),
                Err(e) => Err(e.to_string()),
            };
            match outcome {
                Ok(parsed) => statement.transactions.push(parsed),
                Err(message) => {
                    let message = format!("row {row}: {message}");
                    warn!("Skipping CSV row: {message}");
                    statement.errors.push(message);
                }
            }
        }

        Ok(statement)
    }
}

/// Resolved positions of the mapped columns within the header row
struct ColumnIndexes {
    date: usize,
    amount: usize,
    description: usize,
    name: Option<usize>,
    iban: Option<usize>,
    reference: Option<usize>,
}

impl ColumnIndexes {
    fn resolve(headers: &StringRecord, mapping: &CsvColumnMapping) -> ReconcileResult<Self> {
        let find =
            |column: &str| headers.iter().position(|h| h.eq_ignore_ascii_case(column));
        let required = |column: &str| {
            find(column).ok_or_else(|| {
                ReconcileError::Parse(format!("CSV is missing mapped column '{column}'"))
            })
        };

        Ok(Self {
            date: required(&mapping.date_column)?,
            amount: required(&mapping.amount_column)?,
            description: required(&mapping.description_column)?,
            name: mapping.name_column.as_deref().and_then(find),
            iban: mapping.iban_column.as_deref().and_then(find),
            reference: mapping.reference_column.as_deref().and_then(find),
        })
    }
}

fn optional_field(record: &StringRecord, index: Option<usize>) -> Option<&str> {
    let value = record.get(index?)?.trim();
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Pick the separator that occurs most often in the header row
fn sniff_delimiter(first_line: &str) -> u8 {
    let mut best = b',';
    let mut best_count = 0;
    for candidate in [b';', b',', b'\t'] {
        let count = first_line.matches(candidate as char).count();
        if count > best_count {
            best = candidate;
            best_count = count;
        }
    }
    best
}
