//! Traits for storage abstraction and external collaborators

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::types::*;

/// Storage abstraction for the reconciliation system
///
/// This trait allows the reconciliation core to work with any storage backend
/// (PostgreSQL, MySQL, SQLite, in-memory, etc.) by implementing these methods.
/// Operations that the processor performs as one logical step (status change,
/// proposal transition, action append) are expected to commit together; the
/// backend is responsible for wrapping them in a transaction.
#[async_trait]
pub trait ReconciliationStorage: Send + Sync {
    /// Save a bank account to storage
    async fn save_bank_account(&mut self, account: &BankAccount) -> ReconcileResult<()>;

    /// Get a bank account by ID
    async fn get_bank_account(&self, account_id: &str) -> ReconcileResult<Option<BankAccount>>;

    /// Save a newly imported bank transaction
    async fn save_bank_transaction(&mut self, transaction: &BankTransaction)
        -> ReconcileResult<()>;

    /// Get a bank transaction by ID
    async fn get_bank_transaction(
        &self,
        transaction_id: &str,
    ) -> ReconcileResult<Option<BankTransaction>>;

    /// Update an existing bank transaction
    async fn update_bank_transaction(
        &mut self,
        transaction: &BankTransaction,
    ) -> ReconcileResult<()>;

    /// List transactions for an administration, optionally filtered by status
    /// and booking date range, ordered by booking date then ID
    async fn list_bank_transactions(
        &self,
        administration_id: &str,
        status: Option<TransactionStatus>,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> ReconcileResult<Vec<BankTransaction>>;

    /// All deduplication fingerprints already stored for an administration
    async fn list_transaction_hashes(
        &self,
        administration_id: &str,
    ) -> ReconcileResult<HashSet<String>>;

    /// Save a new match proposal
    async fn save_proposal(&mut self, proposal: &MatchProposal) -> ReconcileResult<()>;

    /// Update an existing match proposal
    async fn update_proposal(&mut self, proposal: &MatchProposal) -> ReconcileResult<()>;

    /// Get a match proposal by ID
    async fn get_proposal(&self, proposal_id: &str) -> ReconcileResult<Option<MatchProposal>>;

    /// List proposals for a transaction, optionally filtered by status,
    /// ordered by confidence score descending
    async fn list_proposals_for_transaction(
        &self,
        transaction_id: &str,
        status: Option<ProposalStatus>,
    ) -> ReconcileResult<Vec<MatchProposal>>;

    /// Append a reconciliation action to the audit trail
    async fn append_action(&mut self, action: &ReconciliationAction) -> ReconcileResult<()>;

    /// List the actions recorded for a transaction, oldest first
    async fn list_actions_for_transaction(
        &self,
        transaction_id: &str,
    ) -> ReconcileResult<Vec<ReconciliationAction>>;

    /// Replace all splits of a transaction with the given set
    async fn replace_splits(
        &mut self,
        transaction_id: &str,
        splits: &[BankTransactionSplit],
    ) -> ReconcileResult<()>;

    /// List the current splits of a transaction, in index order
    async fn list_splits(&self, transaction_id: &str)
        -> ReconcileResult<Vec<BankTransactionSplit>>;

    /// List enabled match rules for an administration, in priority order
    async fn list_match_rules(&self, administration_id: &str) -> ReconcileResult<Vec<MatchRule>>;
}

/// Read access to open receivables and payables, owned by the invoicing side
#[async_trait]
pub trait OpenItemRepository: Send + Sync {
    /// List unsettled items (status OPEN or PARTIAL) of the given type
    async fn list_open_items(
        &self,
        administration_id: &str,
        item_type: OpenItemType,
    ) -> ReconcileResult<Vec<OpenItem>>;

    /// Get a single open item by ID
    async fn get_open_item(
        &self,
        administration_id: &str,
        item_id: &str,
    ) -> ReconcileResult<Option<OpenItem>>;
}

/// Read access to recurring financial commitments
#[async_trait]
pub trait CommitmentRepository: Send + Sync {
    /// List commitments with status ACTIVE
    async fn list_active_commitments(
        &self,
        administration_id: &str,
    ) -> ReconcileResult<Vec<FinancialCommitment>>;

    /// Get a single commitment by ID
    async fn get_commitment(
        &self,
        administration_id: &str,
        commitment_id: &str,
    ) -> ReconcileResult<Option<FinancialCommitment>>;
}

/// Lookup into the chart of accounts and VAT code table
#[async_trait]
pub trait LedgerLookup: Send + Sync {
    /// Resolve a ledger account by code
    async fn get_ledger_account(
        &self,
        administration_id: &str,
        code: &str,
    ) -> ReconcileResult<Option<LedgerAccountRef>>;

    /// Resolve a VAT code
    async fn get_vat_code(
        &self,
        administration_id: &str,
        code: &str,
    ) -> ReconcileResult<Option<VatCode>>;
}

/// Posting service for balanced journal entries
#[async_trait]
pub trait JournalPoster: Send + Sync {
    /// Post a balanced entry; returns the ID assigned to it
    async fn post_entry(&mut self, entry: &JournalEntry) -> ReconcileResult<String>;
}

/// Sink for generic audit-log events
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Record one audit event
    async fn record(&mut self, event: &AuditEvent) -> ReconcileResult<()>;
}

/// Whether an open item is money owed to us or by us
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpenItemType {
    /// Customer invoice awaiting payment
    Receivable,
    /// Vendor bill awaiting payment
    Payable,
}

/// Settlement status of an open item
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpenItemStatus {
    /// Nothing paid yet
    Open,
    /// Partially paid
    Partial,
    /// Fully paid
    Settled,
}

/// An unsettled receivable or payable, owned by the invoicing side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenItem {
    /// Unique identifier for the item
    pub id: String,
    /// Administration (tenant) the item belongs to
    pub administration_id: String,
    /// Receivable or payable
    pub item_type: OpenItemType,
    /// Settlement status
    pub status: OpenItemStatus,
    /// Amount still outstanding
    pub open_amount: BigDecimal,
    /// Invoice or bill number
    pub document_number: Option<String>,
    /// Payment due date
    pub due_date: Option<NaiveDate>,
    /// Customer or vendor the item belongs to
    pub party_id: Option<String>,
}

/// Lifecycle status of a financial commitment
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommitmentStatus {
    /// Currently running
    Active,
    /// Terminated; no longer expected on statements
    Ended,
}

/// How often a commitment recurs
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecurringFrequency {
    Monthly,
    Quarterly,
    Yearly,
}

/// A recurring financial obligation (lease, loan, subscription)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialCommitment {
    /// Unique identifier for the commitment
    pub id: String,
    /// Administration (tenant) the commitment belongs to
    pub administration_id: String,
    /// Name of the provider being paid
    pub provider: String,
    /// Periodic amount in whole cents
    pub amount_cents: i64,
    /// Recurrence cadence, when known
    pub recurring_frequency: Option<RecurringFrequency>,
    /// Lifecycle status
    pub status: CommitmentStatus,
    /// Expense ledger account to post periodic payments against
    pub expense_account_code: Option<String>,
}

/// A ledger account as seen through the chart-of-accounts lookup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerAccountRef {
    /// Account code within the chart of accounts
    pub code: String,
    /// Human-readable account name
    pub name: String,
}

/// A VAT code as seen through the VAT-code lookup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VatCode {
    /// Code identifying the VAT regime (e.g. "NL-21")
    pub code: String,
    /// Human-readable description
    pub description: Option<String>,
    /// Rate as a percentage (21 means 21%)
    pub rate: BigDecimal,
    /// Ledger account the VAT portion posts against
    pub ledger_account_code: String,
}

/// One line of a journal entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalLine {
    /// Ledger account code being affected
    pub ledger_code: String,
    /// Type of entry (Debit or Credit)
    pub entry_type: EntryType,
    /// Amount of the line, always positive
    pub amount: BigDecimal,
    /// Optional description for this specific line
    pub description: Option<String>,
}

impl JournalLine {
    /// Create a new journal line
    pub fn new(
        ledger_code: String,
        entry_type: EntryType,
        amount: BigDecimal,
        description: Option<String>,
    ) -> Self {
        Self {
            ledger_code,
            entry_type,
            amount,
            description,
        }
    }

    /// Create a debit line
    pub fn debit(ledger_code: String, amount: BigDecimal, description: Option<String>) -> Self {
        Self::new(ledger_code, EntryType::Debit, amount, description)
    }

    /// Create a credit line
    pub fn credit(ledger_code: String, amount: BigDecimal, description: Option<String>) -> Self {
        Self::new(ledger_code, EntryType::Credit, amount, description)
    }
}

/// A balanced set of debit/credit lines handed to the journal poster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Administration (tenant) the entry belongs to
    pub administration_id: String,
    /// Booking date of the entry
    pub date: NaiveDate,
    /// Description of the entry
    pub description: String,
    /// Optional reference (payment reference, invoice number, etc.)
    pub reference: Option<String>,
    /// Lines that make up the entry
    pub lines: Vec<JournalLine>,
}

impl JournalEntry {
    /// Create a new journal entry without lines
    pub fn new(
        administration_id: String,
        date: NaiveDate,
        description: String,
        reference: Option<String>,
    ) -> Self {
        Self {
            administration_id,
            date,
            description,
            reference,
            lines: Vec::new(),
        }
    }

    /// Add a line to the entry
    pub fn add_line(&mut self, line: JournalLine) {
        self.lines.push(line);
    }

    /// Calculate total debits
    pub fn total_debits(&self) -> BigDecimal {
        self.lines
            .iter()
            .filter(|l| l.entry_type == EntryType::Debit)
            .map(|l| &l.amount)
            .sum()
    }

    /// Calculate total credits
    pub fn total_credits(&self) -> BigDecimal {
        self.lines
            .iter()
            .filter(|l| l.entry_type == EntryType::Credit)
            .map(|l| &l.amount)
            .sum()
    }

    /// Check if the entry is balanced (debits = credits)
    pub fn is_balanced(&self) -> bool {
        self.total_debits() == self.total_credits()
    }

    /// Validate the entry before posting
    pub fn validate(&self) -> ReconcileResult<()> {
        if self.lines.len() < 2 {
            return Err(ReconcileError::Validation(
                "Journal entry must have at least two lines".to_string(),
            ));
        }

        if !self.is_balanced() {
            return Err(ReconcileError::Validation(format!(
                "Journal entry is not balanced: debits = {}, credits = {}",
                self.total_debits(),
                self.total_credits()
            )));
        }

        for line in &self.lines {
            if line.amount <= BigDecimal::from(0) {
                return Err(ReconcileError::Validation(
                    "Journal line amounts must be positive".to_string(),
                ));
            }
        }

        Ok(())
    }
}

/// A generic audit-log event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Kind of entity the event is about (e.g. "bank_transaction")
    pub entity_type: String,
    /// Identifier of the entity
    pub entity_id: String,
    /// Action performed, in wire form (e.g. "APPLY_MATCH")
    pub action: String,
    /// Who performed the action
    pub actor_id: String,
    /// State before the action, when meaningful
    pub old_value: Option<serde_json::Value>,
    /// State after the action, when meaningful
    pub new_value: Option<serde_json::Value>,
    /// When the event was recorded
    pub created_at: NaiveDateTime,
}

impl AuditEvent {
    /// Create a new audit event
    pub fn new(
        entity_type: String,
        entity_id: String,
        action: String,
        actor_id: String,
        old_value: Option<serde_json::Value>,
        new_value: Option<serde_json::Value>,
    ) -> Self {
        Self {
            entity_type,
            entity_id,
            action,
            actor_id,
            old_value,
            new_value,
            created_at: chrono::Utc::now().naive_utc(),
        }
    }
}
