//! Match proposal generation and lifecycle maintenance

pub mod matchers;
pub mod rules;
pub mod similarity;

pub use matchers::ProposalDraft;
pub use rules::RuleFlag;
pub use similarity::similarity;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::traits::*;
use crate::types::*;

/// Tuning knobs for the matching engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchingConfig {
    /// Proposals scoring below this are discarded
    pub min_confidence: u8,
    /// Keep at most this many proposals per transaction
    pub max_proposals: usize,
    /// Name similarity above this earns the strong commitment bonus
    pub strong_name_threshold: f64,
    /// Name similarity above this earns the weak commitment bonus
    pub weak_name_threshold: f64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            min_confidence: 30,
            max_proposals: 5,
            strong_name_threshold: 0.7,
            weak_name_threshold: 0.5,
        }
    }
}

/// Which transactions a matching run covers; an empty scope means all
/// NEW transactions of the administration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchScope {
    /// Restrict to these transaction IDs
    pub transaction_ids: Option<Vec<String>>,
    /// Restrict to bookings on or after this date
    pub start_date: Option<NaiveDate>,
    /// Restrict to bookings on or before this date
    pub end_date: Option<NaiveDate>,
}

/// Outcome of one matching run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchRunReport {
    /// Transactions examined
    pub transactions_scanned: usize,
    /// Proposals created for the first time
    pub proposals_created: usize,
    /// Existing proposals refreshed in place
    pub proposals_updated: usize,
    /// Suggested proposals that dropped out of the ranking
    pub proposals_expired: usize,
    /// Transactions flagged by a user-defined rule
    pub rule_flags: Vec<RuleFlag>,
}

/// Scores NEW transactions against open items and commitments and keeps
/// the stored proposal set in sync with the latest ranking
///
/// Re-running the engine over unchanged data is idempotent: existing
/// suggestions are refreshed in place, nothing is duplicated, and only
/// pairs that fell out of the ranking are expired.
pub struct MatchingEngine<S: ReconciliationStorage> {
    storage: S,
    open_items: Box<dyn OpenItemRepository>,
    commitments: Box<dyn CommitmentRepository>,
    config: MatchingConfig,
}

impl<S: ReconciliationStorage> MatchingEngine<S> {
    /// Create an engine with the default configuration
    pub fn new(
        storage: S,
        open_items: Box<dyn OpenItemRepository>,
        commitments: Box<dyn CommitmentRepository>,
    ) -> Self {
        Self {
            storage,
            open_items,
            commitments,
            config: MatchingConfig::default(),
        }
    }

    /// Replace the configuration
    pub fn with_config(mut self, config: MatchingConfig) -> Self {
        self.config = config;
        self
    }

    /// Run all matchers over the NEW transactions in scope.
    ///
    /// Matching never fails on data quality: a transaction with no usable
    /// counterparty or reference simply scores low. Only storage and
    /// repository errors propagate.
    pub async fn run(
        &mut self,
        administration_id: &str,
        scope: &MatchScope,
    ) -> ReconcileResult<MatchRunReport> {
        let transactions = self
            .storage
            .list_bank_transactions(
                administration_id,
                Some(TransactionStatus::New),
                scope.start_date,
                scope.end_date,
            )
            .await?;
        let transactions: Vec<BankTransaction> = match &scope.transaction_ids {
            Some(ids) => transactions
                .into_iter()
                .filter(|t| ids.contains(&t.id))
                .collect(),
            None => transactions,
        };

        let receivables = self
            .open_items
            .list_open_items(administration_id, OpenItemType::Receivable)
            .await?;
        let payables = self
            .open_items
            .list_open_items(administration_id, OpenItemType::Payable)
            .await?;
        let active_commitments = self
            .commitments
            .list_active_commitments(administration_id)
            .await?;
        let match_rules = self.storage.list_match_rules(administration_id).await?;

        let mut report = MatchRunReport {
            transactions_scanned: transactions.len(),
            ..MatchRunReport::default()
        };

        for transaction in &transactions {
            if let Some(rule) = rules::first_matching_rule(&match_rules, transaction) {
                info!(
                    "Rule '{}' flagged transaction {}",
                    rule.name, transaction.id
                );
                report.rule_flags.push(RuleFlag {
                    bank_transaction_id: transaction.id.clone(),
                    rule_id: rule.id.clone(),
                    rule_name: rule.name.clone(),
                });
            }

            let mut drafts = matchers::match_invoices(transaction, &receivables);
            drafts.extend(matchers::match_expenses(transaction, &payables));
            drafts.extend(matchers::match_commitments(
                transaction,
                &active_commitments,
                self.config.strong_name_threshold,
                self.config.weak_name_threshold,
            ));

            drafts.retain(|d| d.confidence_score >= self.config.min_confidence);
            drafts.sort_by(|a, b| {
                b.confidence_score
                    .cmp(&a.confidence_score)
                    .then_with(|| a.entity_id.cmp(&b.entity_id))
            });
            drafts.truncate(self.config.max_proposals);

            self.sync_proposals(transaction, &drafts, &mut report)
                .await?;
        }

        info!(
            "Matching run for {}: {} transactions, {} proposals created, {} updated, {} expired",
            administration_id,
            report.transactions_scanned,
            report.proposals_created,
            report.proposals_updated,
            report.proposals_expired
        );
        Ok(report)
    }

    /// Upsert the drafts by (entity_type, entity_id) and expire stale
    /// suggestions, leaving accepted and rejected proposals untouched.
    async fn sync_proposals(
        &mut self,
        transaction: &BankTransaction,
        drafts: &[ProposalDraft],
        report: &mut MatchRunReport,
    ) -> ReconcileResult<()> {
        let existing = self
            .storage
            .list_proposals_for_transaction(&transaction.id, None)
            .await?;

        for draft in drafts {
            let found = existing
                .iter()
                .find(|p| p.entity_type == draft.entity_type && p.entity_id == draft.entity_id);
            match found {
                // Pairs the user already decided on are final.
                Some(p)
                    if p.status == ProposalStatus::Accepted
                        || p.status == ProposalStatus::Rejected => {}
                Some(p) => {
                    let mut refreshed = p.clone();
                    draft.apply_to(&mut refreshed);
                    self.storage.update_proposal(&refreshed).await?;
                    report.proposals_updated += 1;
                }
                None => {
                    let proposal = draft.to_proposal(&transaction.id);
                    self.storage.save_proposal(&proposal).await?;
                    report.proposals_created += 1;
                }
            }
        }

        for proposal in &existing {
            if proposal.status != ProposalStatus::Suggested {
                continue;
            }
            let still_ranked = drafts
                .iter()
                .any(|d| d.entity_type == proposal.entity_type && d.entity_id == proposal.entity_id);
            if !still_ranked {
                let mut expired = proposal.clone();
                expired.status = ProposalStatus::Expired;
                expired.updated_at = chrono::Utc::now().naive_utc();
                self.storage.update_proposal(&expired).await?;
                report.proposals_expired += 1;
            }
        }

        Ok(())
    }
}
