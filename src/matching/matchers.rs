//! Heuristic matchers scoring transactions against open items and commitments

use bigdecimal::rounding::RoundingMode;
use bigdecimal::{BigDecimal, ToPrimitive};
use chrono::NaiveDate;

use crate::matching::similarity::similarity;
use crate::traits::{FinancialCommitment, OpenItem, RecurringFrequency};
use crate::types::{BankTransaction, EntityKind, MatchProposal, MatchRuleKind, ProposalStatus};
use crate::utils::validation::one_cent;

const INVOICE_AMOUNT_WEIGHT: u8 = 40;
const INVOICE_REFERENCE_WEIGHT: u8 = 35;
const INVOICE_DUE_DATE_WEIGHT: u8 = 15;
const INVOICE_CAP: u8 = 95;

const EXPENSE_AMOUNT_WEIGHT: u8 = 40;
const EXPENSE_REFERENCE_WEIGHT: u8 = 30;
const EXPENSE_CAP: u8 = 90;

const COMMITMENT_AMOUNT_WEIGHT: u8 = 35;
const COMMITMENT_STRONG_NAME_WEIGHT: u8 = 30;
const COMMITMENT_WEAK_NAME_WEIGHT: u8 = 15;
const COMMITMENT_CADENCE_WEIGHT: u8 = 10;
const COMMITMENT_CAP: u8 = 85;

/// Days after the due date within which a payment still earns the date bonus
const DUE_DATE_WINDOW_DAYS: i64 = 30;

/// A scored candidate produced by one matcher, before persistence
#[derive(Debug, Clone, PartialEq)]
pub struct ProposalDraft {
    /// Kind of entity being proposed
    pub entity_type: EntityKind,
    /// Identifier of the proposed entity
    pub entity_id: String,
    /// Confidence in the match, 0-100
    pub confidence_score: u8,
    /// Human-readable explanation of the score
    pub reason: String,
    /// Amount of the proposed entity, for display
    pub matched_amount: Option<BigDecimal>,
    /// Relevant date of the proposed entity
    pub matched_date: Option<NaiveDate>,
    /// Document number or reference of the proposed entity
    pub matched_reference: Option<String>,
    /// Which matcher produced the draft
    pub rule_type: MatchRuleKind,
}

impl ProposalDraft {
    /// Materialize the draft as a new suggested proposal.
    pub fn to_proposal(&self, bank_transaction_id: &str) -> MatchProposal {
        let mut proposal = MatchProposal::new(
            bank_transaction_id.to_string(),
            self.entity_type.clone(),
            self.entity_id.clone(),
            self.confidence_score,
            self.reason.clone(),
            self.rule_type.clone(),
        );
        proposal.matched_amount = self.matched_amount.clone();
        proposal.matched_date = self.matched_date;
        proposal.matched_reference = self.matched_reference.clone();
        proposal
    }

    /// Refresh an existing proposal with this draft's scoring, reviving it
    /// to SUGGESTED if it had expired.
    pub fn apply_to(&self, proposal: &mut MatchProposal) {
        proposal.confidence_score = self.confidence_score;
        proposal.reason = self.reason.clone();
        proposal.matched_amount = self.matched_amount.clone();
        proposal.matched_date = self.matched_date;
        proposal.matched_reference = self.matched_reference.clone();
        proposal.rule_type = self.rule_type.clone();
        proposal.status = ProposalStatus::Suggested;
        proposal.updated_at = chrono::Utc::now().naive_utc();
    }
}

/// Score an incoming payment against open receivables.
pub fn match_invoices(
    transaction: &BankTransaction,
    open_items: &[OpenItem],
) -> Vec<ProposalDraft> {
    if transaction.amount <= BigDecimal::from(0) {
        return Vec::new();
    }

    let mut drafts = Vec::new();
    for item in open_items {
        let mut score: u8 = 0;
        let mut reasons: Vec<String> = Vec::new();

        if amounts_match(&transaction.amount, &item.open_amount) {
            score += INVOICE_AMOUNT_WEIGHT;
            reasons.push(format!("amount matches open amount {}", item.open_amount));
        }
        if let Some(document_number) = &item.document_number {
            if mentions_document(transaction, document_number) {
                score += INVOICE_REFERENCE_WEIGHT;
                reasons.push(format!("document number {document_number} found in payment"));
            }
        }
        if let Some(due_date) = item.due_date {
            if within_due_window(transaction.booking_date, due_date) {
                score += INVOICE_DUE_DATE_WEIGHT;
                reasons.push(format!("booked shortly after due date {due_date}"));
            }
        }

        if score == 0 {
            continue;
        }
        drafts.push(ProposalDraft {
            entity_type: EntityKind::Invoice,
            entity_id: item.id.clone(),
            confidence_score: score.min(INVOICE_CAP),
            reason: reasons.join("; "),
            matched_amount: Some(item.open_amount.clone()),
            matched_date: item.due_date,
            matched_reference: item.document_number.clone(),
            rule_type: MatchRuleKind::InvoiceMatch,
        });
    }
    drafts
}

/// Score an outgoing payment against open payables.
pub fn match_expenses(
    transaction: &BankTransaction,
    open_items: &[OpenItem],
) -> Vec<ProposalDraft> {
    if transaction.amount >= BigDecimal::from(0) {
        return Vec::new();
    }

    let mut drafts = Vec::new();
    for item in open_items {
        let mut score: u8 = 0;
        let mut reasons: Vec<String> = Vec::new();

        if amounts_match(&transaction.amount, &item.open_amount) {
            score += EXPENSE_AMOUNT_WEIGHT;
            reasons.push(format!("amount matches open amount {}", item.open_amount));
        }
        if let Some(document_number) = &item.document_number {
            if mentions_document(transaction, document_number) {
                score += EXPENSE_REFERENCE_WEIGHT;
                reasons.push(format!("document number {document_number} found in payment"));
            }
        }

        if score == 0 {
            continue;
        }
        drafts.push(ProposalDraft {
            entity_type: EntityKind::Expense,
            entity_id: item.id.clone(),
            confidence_score: score.min(EXPENSE_CAP),
            reason: reasons.join("; "),
            matched_amount: Some(item.open_amount.clone()),
            matched_date: item.due_date,
            matched_reference: item.document_number.clone(),
            rule_type: MatchRuleKind::ExpenseMatch,
        });
    }
    drafts
}

/// Score an outgoing payment against active recurring commitments.
pub fn match_commitments(
    transaction: &BankTransaction,
    commitments: &[FinancialCommitment],
    strong_name_threshold: f64,
    weak_name_threshold: f64,
) -> Vec<ProposalDraft> {
    if transaction.amount >= BigDecimal::from(0) {
        return Vec::new();
    }

    let transaction_cents = amount_in_cents(&transaction.amount);

    let mut drafts = Vec::new();
    for commitment in commitments {
        let mut score: u8 = 0;
        let mut reasons: Vec<String> = Vec::new();

        if transaction_cents == Some(commitment.amount_cents) {
            score += COMMITMENT_AMOUNT_WEIGHT;
            reasons.push("amount matches the commitment exactly".to_string());
        }

        let name_score = provider_similarity(transaction, &commitment.provider);
        if name_score > strong_name_threshold {
            score += COMMITMENT_STRONG_NAME_WEIGHT;
            reasons.push(format!(
                "counterparty closely matches provider {} ({:.2})",
                commitment.provider, name_score
            ));
        } else if name_score > weak_name_threshold {
            score += COMMITMENT_WEAK_NAME_WEIGHT;
            reasons.push(format!(
                "counterparty resembles provider {} ({:.2})",
                commitment.provider, name_score
            ));
        }

        if matches!(
            commitment.recurring_frequency,
            Some(RecurringFrequency::Monthly) | Some(RecurringFrequency::Yearly)
        ) {
            score += COMMITMENT_CADENCE_WEIGHT;
            reasons.push("recurring on a regular cadence".to_string());
        }

        if score == 0 {
            continue;
        }
        drafts.push(ProposalDraft {
            entity_type: EntityKind::Commitment,
            entity_id: commitment.id.clone(),
            confidence_score: score.min(COMMITMENT_CAP),
            reason: reasons.join("; "),
            matched_amount: Some(BigDecimal::new(commitment.amount_cents.into(), 2)),
            matched_date: None,
            matched_reference: None,
            rule_type: MatchRuleKind::CommitmentMatch,
        });
    }
    drafts
}

/// Whether two amounts agree within `max(1% of the payment, one cent)`.
fn amounts_match(transaction_amount: &BigDecimal, open_amount: &BigDecimal) -> bool {
    let magnitude = transaction_amount.abs();
    let percent = &magnitude / BigDecimal::from(100);
    let cent = one_cent();
    let tolerance = if percent > cent { percent } else { cent };
    (&magnitude - open_amount.abs()).abs() <= tolerance
}

/// Whether the document number appears in the description or reference,
/// ignoring case and punctuation.
fn mentions_document(transaction: &BankTransaction, document_number: &str) -> bool {
    let needle = normalize_token(document_number);
    if needle.is_empty() {
        return false;
    }
    let mut haystack = normalize_token(&transaction.description);
    if let Some(reference) = &transaction.reference {
        // Separator keeps the needle from spanning the two fields.
        haystack.push('|');
        haystack.push_str(&normalize_token(reference));
    }
    haystack.contains(&needle)
}

fn normalize_token(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

fn within_due_window(booking_date: NaiveDate, due_date: NaiveDate) -> bool {
    let days = booking_date.signed_duration_since(due_date).num_days();
    (0..=DUE_DATE_WINDOW_DAYS).contains(&days)
}

/// Best similarity of the provider name against the counterparty name,
/// falling back to the description when the bank sent no name.
fn provider_similarity(transaction: &BankTransaction, provider: &str) -> f64 {
    let name_score = transaction
        .counterparty_name
        .as_deref()
        .map(|name| similarity(name, provider))
        .unwrap_or(0.0);
    let description_score = similarity(&transaction.description, provider);
    name_score.max(description_score)
}

/// Magnitude of an amount in whole cents, rounded half-up.
fn amount_in_cents(amount: &BigDecimal) -> Option<i64> {
    (amount.abs() * BigDecimal::from(100))
        .with_scale_round(0, RoundingMode::HalfUp)
        .to_i64()
}
