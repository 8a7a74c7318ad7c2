//! Statement import with fingerprint-based duplicate detection

use bigdecimal::rounding::RoundingMode;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::parsers::ParserRegistry;
use crate::traits::ReconciliationStorage;
use crate::types::*;

/// Cap on the per-entry errors carried back in an import summary
const MAX_REPORTED_ERRORS: usize = 10;

/// Outcome of a single statement import
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportSummary {
    /// Transactions written to storage
    pub imported_count: usize,
    /// Transactions skipped because their fingerprint was already known
    pub skipped_duplicates: usize,
    /// Transactions the parser extracted from the file
    pub total_in_file: usize,
    /// Per-entry parse errors, capped at the first ten
    pub errors: Vec<String>,
    /// One-line human-readable outcome
    pub message: String,
}

/// Compute the deduplication fingerprint of a parsed transaction.
///
/// SHA-256 over administration, booking date, amount at two decimals,
/// trimmed description, and trimmed reference, joined with `|`. Value date
/// and counterparty fields are not part of the identity, so re-exports
/// where the bank enriches those fields still deduplicate.
pub fn transaction_fingerprint(administration_id: &str, parsed: &ParsedTransaction) -> String {
    let amount = parsed.amount.with_scale_round(2, RoundingMode::HalfUp);
    let reference = parsed.reference.as_deref().unwrap_or("").trim();
    let input = format!(
        "{}|{}|{}|{}|{}",
        administration_id,
        parsed.booking_date.format("%Y-%m-%d"),
        amount,
        parsed.description.trim(),
        reference
    );

    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Imports statement files into a bank account, skipping known fingerprints
///
/// The registry starts with the self-describing formats (CAMT.053, MT940).
/// CSV needs a column mapping, so callers register a configured `CsvParser`
/// through `registry_mut` before importing CSV files.
pub struct TransactionImporter<S: ReconciliationStorage> {
    storage: S,
    registry: ParserRegistry,
}

impl<S: ReconciliationStorage> TransactionImporter<S> {
    /// Create an importer with the standard parser registry
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            registry: ParserRegistry::standard(),
        }
    }

    /// Create an importer with a custom parser registry
    pub fn with_registry(storage: S, registry: ParserRegistry) -> Self {
        Self { storage, registry }
    }

    /// Mutable access to the parser registry
    pub fn registry_mut(&mut self) -> &mut ParserRegistry {
        &mut self.registry
    }

    /// Import a raw statement file into a bank account.
    ///
    /// Resolves a parser, parses the file, and stores every transaction
    /// whose fingerprint is not yet known to the administration. Duplicates
    /// are counted and skipped, never overwritten, so re-importing the same
    /// or an overlapping file is safe. Entries the parser could not read are
    /// reported in the summary without failing the import.
    pub async fn import_file(
        &mut self,
        administration_id: &str,
        bank_account_id: &str,
        bytes: &[u8],
        filename: Option<&str>,
    ) -> ReconcileResult<ImportSummary> {
        let account = self
            .storage
            .get_bank_account(bank_account_id)
            .await?
            .ok_or_else(|| ReconcileError::AccountNotFound(bank_account_id.to_string()))?;

        if account.administration_id != administration_id {
            return Err(ReconcileError::Validation(format!(
                "Bank account {} does not belong to administration {}",
                bank_account_id, administration_id
            )));
        }

        let parser = self.registry.resolve(bytes, filename).ok_or_else(|| {
            ReconcileError::UnsupportedFormat(filename.unwrap_or("<unnamed>").to_string())
        })?;
        let format = parser.format_name();
        let statement = parser.parse(bytes)?;

        // A statement naming a different account than the import target is
        // a caller mistake, not a partial failure.
        if let Some(statement_iban) = &statement.account_iban {
            if *statement_iban != account.iban {
                return Err(ReconcileError::Validation(format!(
                    "Statement is for account {} but the import targets {}",
                    statement_iban, account.iban
                )));
            }
        }

        let mut seen = self
            .storage
            .list_transaction_hashes(administration_id)
            .await?;

        let total_in_file = statement.transactions.len();
        let mut imported_count = 0;
        let mut skipped_duplicates = 0;

        for parsed in statement.transactions {
            let fingerprint = transaction_fingerprint(administration_id, &parsed);
            // Also catches duplicates within the file itself.
            if !seen.insert(fingerprint.clone()) {
                skipped_duplicates += 1;
                continue;
            }

            let transaction = BankTransaction::from_parsed(
                administration_id.to_string(),
                bank_account_id.to_string(),
                parsed,
                fingerprint,
            );
            self.storage.save_bank_transaction(&transaction).await?;
            imported_count += 1;
        }

        let error_count = statement.errors.len();
        let mut errors = statement.errors;
        errors.truncate(MAX_REPORTED_ERRORS);

        let message = format!(
            "Imported {} of {} transactions ({} duplicates skipped, {} entries unreadable)",
            imported_count, total_in_file, skipped_duplicates, error_count
        );
        info!("{format} import for account {bank_account_id}: {message}");

        Ok(ImportSummary {
            imported_count,
            skipped_duplicates,
            total_in_file,
            errors,
            message,
        })
    }
}
