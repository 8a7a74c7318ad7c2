//! Core types and data structures for bank statement reconciliation

use bigdecimal::BigDecimal;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::utils::validation::{normalize_bic, normalize_iban};

/// Lifecycle states of an imported bank transaction
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionStatus {
    /// Imported but not yet reconciled
    New,
    /// Reconciled against an invoice, expense, commitment, or manual booking
    Matched,
    /// Explicitly marked as not requiring reconciliation
    Ignored,
}

/// Kind of entity a transaction can be matched against
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    /// Outstanding customer invoice (receivable)
    Invoice,
    /// Outstanding vendor bill (payable)
    Expense,
    /// Recurring financial commitment (lease, loan, subscription)
    Commitment,
    /// Manual booking, e.g. a journal entry created from the transaction
    Manual,
}

/// Lifecycle states of a match proposal
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProposalStatus {
    /// Produced by the matching engine, awaiting a user decision
    Suggested,
    /// Accepted by a user; the transaction was matched to the entity
    Accepted,
    /// Rejected by a user; never suggested again for this pair
    Rejected,
    /// Dropped out of the engine's current top ranking; kept for history
    Expired,
}

/// Which matcher produced a proposal
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchRuleKind {
    /// Incoming payment matched against a receivable open item
    InvoiceMatch,
    /// Outgoing payment matched against a payable open item
    ExpenseMatch,
    /// Outgoing payment matched against a recurring commitment
    CommitmentMatch,
}

/// Types of entries in a double-entry journal line
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryType {
    /// Debit entry
    Debit,
    /// Credit entry
    Credit,
}

/// A single transaction as extracted from a statement file, before persistence
///
/// Amounts are signed: credits (money in) are positive, debits (money out)
/// are negative. IBAN and BIC fields are normalized (uppercase, no spaces)
/// on construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedTransaction {
    /// Date the bank booked the transaction
    pub booking_date: NaiveDate,
    /// Value date, when the statement provides one
    pub value_date: Option<NaiveDate>,
    /// Signed amount (credit positive, debit negative)
    pub amount: BigDecimal,
    /// ISO 4217 currency code
    pub currency: String,
    /// Free-text description / remittance information
    pub description: String,
    /// Name of the counterparty
    pub counterparty_name: Option<String>,
    /// IBAN of the counterparty, normalized
    pub counterparty_iban: Option<String>,
    /// BIC of the counterparty, normalized
    pub counterparty_bic: Option<String>,
    /// End-to-end or bank reference usable for matching
    pub reference: Option<String>,
    /// Bank-assigned transaction identifier, when present
    pub transaction_id: Option<String>,
}

impl ParsedTransaction {
    /// Create a parsed transaction with the required fields
    pub fn new(
        booking_date: NaiveDate,
        amount: BigDecimal,
        currency: String,
        description: String,
    ) -> Self {
        Self {
            booking_date,
            value_date: None,
            amount,
            currency,
            description,
            counterparty_name: None,
            counterparty_iban: None,
            counterparty_bic: None,
            reference: None,
            transaction_id: None,
        }
    }

    /// Set the value date
    pub fn with_value_date(mut self, value_date: NaiveDate) -> Self {
        self.value_date = Some(value_date);
        self
    }

    /// Set the counterparty name
    pub fn with_counterparty_name(mut self, name: String) -> Self {
        self.counterparty_name = Some(name);
        self
    }

    /// Set the counterparty IBAN, normalizing it
    pub fn with_counterparty_iban(mut self, iban: &str) -> Self {
        let normalized = normalize_iban(iban);
        if !normalized.is_empty() {
            self.counterparty_iban = Some(normalized);
        }
        self
    }

    /// Set the counterparty BIC, normalizing it
    pub fn with_counterparty_bic(mut self, bic: &str) -> Self {
        let normalized = normalize_bic(bic);
        if !normalized.is_empty() {
            self.counterparty_bic = Some(normalized);
        }
        self
    }

    /// Set the payment reference
    pub fn with_reference(mut self, reference: String) -> Self {
        self.reference = Some(reference);
        self
    }

    /// Set the bank-assigned transaction identifier
    pub fn with_transaction_id(mut self, transaction_id: String) -> Self {
        self.transaction_id = Some(transaction_id);
        self
    }
}

/// Result of parsing one statement file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedStatement {
    /// IBAN of the statement's own account, when the format carries it
    pub account_iban: Option<String>,
    /// Successfully parsed transactions, in file order
    pub transactions: Vec<ParsedTransaction>,
    /// Per-row/per-entry errors for the rows that were skipped
    pub errors: Vec<String>,
}

impl ParsedStatement {
    /// Create an empty statement result
    pub fn new() -> Self {
        Self::default()
    }
}

/// A bank account owned by one administration (tenant)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankAccount {
    /// Unique identifier for the account
    pub id: String,
    /// Administration (tenant) the account belongs to
    pub administration_id: String,
    /// Human-readable account name
    pub name: String,
    /// IBAN of the account, normalized
    pub iban: String,
    /// ISO 4217 currency code
    pub currency: String,
    /// Ledger account code this bank account posts against
    pub ledger_account_code: String,
    /// When the account was created
    pub created_at: NaiveDateTime,
    /// When the account was last updated
    pub updated_at: NaiveDateTime,
}

impl BankAccount {
    /// Create a new bank account
    pub fn new(
        administration_id: String,
        name: String,
        iban: &str,
        currency: String,
        ledger_account_code: String,
    ) -> Self {
        let now = chrono::Utc::now().naive_utc();
        Self {
            id: Uuid::new_v4().to_string(),
            administration_id,
            name,
            iban: normalize_iban(iban),
            currency,
            ledger_account_code,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A persisted bank transaction
///
/// Created by the importer, mutated only by the reconciliation processor,
/// never physically deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankTransaction {
    /// Unique identifier for the transaction
    pub id: String,
    /// Administration (tenant) the transaction belongs to
    pub administration_id: String,
    /// Bank account the transaction was imported into
    pub bank_account_id: String,
    /// Date the bank booked the transaction
    pub booking_date: NaiveDate,
    /// Value date, when the statement provided one
    pub value_date: Option<NaiveDate>,
    /// Signed amount (credit positive, debit negative)
    pub amount: BigDecimal,
    /// ISO 4217 currency code
    pub currency: String,
    /// Free-text description / remittance information
    pub description: String,
    /// Name of the counterparty
    pub counterparty_name: Option<String>,
    /// IBAN of the counterparty, normalized
    pub counterparty_iban: Option<String>,
    /// BIC of the counterparty, normalized
    pub counterparty_bic: Option<String>,
    /// End-to-end or bank reference usable for matching
    pub reference: Option<String>,
    /// Deduplication fingerprint, unique per administration
    pub raw_hash: String,
    /// Current reconciliation status
    pub status: TransactionStatus,
    /// Kind of entity the transaction is matched to, when matched
    pub matched_entity_type: Option<EntityKind>,
    /// Identifier of the matched entity, when matched
    pub matched_entity_id: Option<String>,
    /// When the transaction was imported
    pub created_at: NaiveDateTime,
    /// When the transaction was last updated
    pub updated_at: NaiveDateTime,
}

impl BankTransaction {
    /// Build a persistable transaction from a parsed one
    pub fn from_parsed(
        administration_id: String,
        bank_account_id: String,
        parsed: ParsedTransaction,
        raw_hash: String,
    ) -> Self {
        let now = chrono::Utc::now().naive_utc();
        Self {
            id: Uuid::new_v4().to_string(),
            administration_id,
            bank_account_id,
            booking_date: parsed.booking_date,
            value_date: parsed.value_date,
            amount: parsed.amount,
            currency: parsed.currency,
            description: parsed.description,
            counterparty_name: parsed.counterparty_name,
            counterparty_iban: parsed.counterparty_iban,
            counterparty_bic: parsed.counterparty_bic,
            reference: parsed.reference,
            raw_hash,
            status: TransactionStatus::New,
            matched_entity_type: None,
            matched_entity_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether this is an outgoing payment (negative amount)
    pub fn is_debit(&self) -> bool {
        self.amount < BigDecimal::from(0)
    }

    /// Whether the transaction is currently matched to the given entity
    pub fn is_matched_to(&self, entity_type: &EntityKind, entity_id: &str) -> bool {
        self.status == TransactionStatus::Matched
            && self.matched_entity_type.as_ref() == Some(entity_type)
            && self.matched_entity_id.as_deref() == Some(entity_id)
    }
}

/// A scored suggestion to match a bank transaction against an entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchProposal {
    /// Unique identifier for the proposal
    pub id: String,
    /// Transaction the proposal belongs to
    pub bank_transaction_id: String,
    /// Kind of entity being proposed
    pub entity_type: EntityKind,
    /// Identifier of the proposed entity
    pub entity_id: String,
    /// Confidence in the match, 0-100
    pub confidence_score: u8,
    /// Human-readable explanation of why the match was proposed
    pub reason: String,
    /// Amount of the proposed entity, for display
    pub matched_amount: Option<BigDecimal>,
    /// Relevant date of the proposed entity (e.g. invoice due date)
    pub matched_date: Option<NaiveDate>,
    /// Document number or reference of the proposed entity
    pub matched_reference: Option<String>,
    /// Which matcher produced the proposal
    pub rule_type: MatchRuleKind,
    /// Current lifecycle status
    pub status: ProposalStatus,
    /// When the proposal was first created
    pub created_at: NaiveDateTime,
    /// When the proposal was last refreshed or transitioned
    pub updated_at: NaiveDateTime,
}

impl MatchProposal {
    /// Create a new suggested proposal
    pub fn new(
        bank_transaction_id: String,
        entity_type: EntityKind,
        entity_id: String,
        confidence_score: u8,
        reason: String,
        rule_type: MatchRuleKind,
    ) -> Self {
        let now = chrono::Utc::now().naive_utc();
        Self {
            id: Uuid::new_v4().to_string(),
            bank_transaction_id,
            entity_type,
            entity_id,
            confidence_score,
            reason,
            matched_amount: None,
            matched_date: None,
            matched_reference: None,
            rule_type,
            status: ProposalStatus::Suggested,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the matched entity's amount
    pub fn with_matched_amount(mut self, amount: BigDecimal) -> Self {
        self.matched_amount = Some(amount);
        self
    }

    /// Set the matched entity's relevant date
    pub fn with_matched_date(mut self, date: NaiveDate) -> Self {
        self.matched_date = Some(date);
        self
    }

    /// Set the matched entity's document number or reference
    pub fn with_matched_reference(mut self, reference: String) -> Self {
        self.matched_reference = Some(reference);
        self
    }
}

/// One part of a transaction split across multiple bookings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankTransactionSplit {
    /// Transaction the split belongs to
    pub transaction_id: String,
    /// Position within the split set, starting at 0
    pub split_index: u32,
    /// Signed amount of this part
    pub amount: BigDecimal,
    /// Description of this part
    pub description: String,
}

/// Caller-supplied part of a split request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitInput {
    /// Signed amount of this part
    pub amount: BigDecimal,
    /// Description of this part
    pub description: String,
}

/// Typed payload of a reconciliation action, one variant per action type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionPayload {
    /// A suggested proposal was accepted
    ApplyMatch {
        proposal_id: String,
        entity_type: EntityKind,
        entity_id: String,
        confidence_score: u8,
    },
    /// A suggested proposal was rejected
    RejectProposal {
        proposal_id: String,
        entity_type: EntityKind,
        entity_id: String,
    },
    /// A matched transaction was reverted to NEW
    Unmatch {
        previous_entity_type: Option<EntityKind>,
        previous_entity_id: Option<String>,
    },
    /// The transaction was split into parts
    Split { splits: Vec<BankTransactionSplit> },
    /// The transaction was marked as not requiring reconciliation
    Ignore { notes: Option<String> },
    /// The transaction was linked directly to an open invoice
    LinkInvoice { invoice_id: String },
    /// A manual expense booking was created from the transaction
    CreateExpense {
        journal_entry_id: String,
        ledger_code: String,
        vat_code: Option<String>,
        gross_amount: BigDecimal,
        net_amount: BigDecimal,
        vat_amount: BigDecimal,
        notes: Option<String>,
    },
}

impl ActionPayload {
    /// Wire name of the action type
    pub fn action_type(&self) -> &'static str {
        match self {
            ActionPayload::ApplyMatch { .. } => "APPLY_MATCH",
            ActionPayload::RejectProposal { .. } => "REJECT_PROPOSAL",
            ActionPayload::Unmatch { .. } => "UNMATCH",
            ActionPayload::Split { .. } => "SPLIT",
            ActionPayload::Ignore { .. } => "IGNORE",
            ActionPayload::LinkInvoice { .. } => "LINK_INVOICE",
            ActionPayload::CreateExpense { .. } => "CREATE_EXPENSE",
        }
    }
}

/// Append-only record of a reconciliation decision
///
/// Never updated or deleted; the system of record for what happened and why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationAction {
    /// Unique identifier for the action
    pub id: String,
    /// Transaction the action was applied to
    pub bank_transaction_id: String,
    /// Typed action payload
    pub payload: ActionPayload,
    /// Who performed the action
    pub actor_id: String,
    /// When the action was performed
    pub created_at: NaiveDateTime,
}

impl ReconciliationAction {
    /// Create a new action record
    pub fn new(bank_transaction_id: String, payload: ActionPayload, actor_id: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            bank_transaction_id,
            payload,
            actor_id,
            created_at: chrono::Utc::now().naive_utc(),
        }
    }
}

/// A user/ops-defined matching rule, evaluated before heuristic scoring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRule {
    /// Unique identifier for the rule
    pub id: String,
    /// Administration (tenant) the rule belongs to
    pub administration_id: String,
    /// Human-readable rule name
    pub name: String,
    /// Evaluation order; lower numbers are evaluated first
    pub priority: i32,
    /// Whether the rule is active
    pub enabled: bool,
    /// Conditions that must all hold for the rule to match
    pub conditions: RuleConditions,
}

/// Conditions of a match rule; `None` means "not constrained"
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleConditions {
    /// Counterparty IBAN must equal this value (compared normalized)
    pub counterparty_iban: Option<String>,
    /// Description must contain this substring (case-insensitive)
    pub description_contains: Option<String>,
    /// Absolute amount must be at least this value
    pub min_amount: Option<BigDecimal>,
    /// Absolute amount must be at most this value
    pub max_amount: Option<BigDecimal>,
    /// Currency must equal this code
    pub currency: Option<String>,
}

/// Errors that can occur in the reconciliation system
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Unsupported statement format: {0}")]
    UnsupportedFormat(String),
    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),
    #[error("Proposal not found: {0}")]
    ProposalNotFound(String),
    #[error("Account not found: {0}")]
    AccountNotFound(String),
    #[error("Entity not found: {0}")]
    EntityNotFound(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Conflict: {0}")]
    Conflict(String),
}

/// Result type for reconciliation operations
pub type ReconcileResult<T> = Result<T, ReconcileError>;
