//! Reconciliation workflow: accept, reject, unmatch, split, manual booking

pub mod vat;

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};

use self::vat::breakdown_from_gross;
use crate::traits::*;
use crate::types::*;
use crate::utils::validation::validate_splits;

/// One reconciliation decision applied to a transaction
///
/// The flat shape mirrors the reconciliation surface: one verb plus the
/// few fields that verb needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatementAction {
    /// Mark the transaction as not requiring reconciliation
    Ignore { notes: Option<String> },
    /// Accept a suggested proposal
    AcceptMatch { proposal_id: String },
    /// Link the transaction directly to an open invoice
    LinkInvoice { invoice_id: String },
    /// Book the transaction as a manual expense
    CreateExpense {
        ledger_code: String,
        vat_code: Option<String>,
        notes: Option<String>,
    },
    /// Revert a matched transaction to NEW
    Unmatch,
}

/// Applies reconciliation decisions to transactions and proposals
///
/// State machine: NEW to MATCHED (accept, link, create expense), MATCHED
/// back to NEW (unmatch), NEW to IGNORED (ignore). Every mutating operation
/// records exactly one `ReconciliationAction` and one audit event; the
/// storage backend must commit each operation's writes together.
pub struct ReconciliationProcessor<S: ReconciliationStorage> {
    storage: S,
    open_items: Box<dyn OpenItemRepository>,
    commitments: Box<dyn CommitmentRepository>,
    ledger: Box<dyn LedgerLookup>,
    journal: Box<dyn JournalPoster>,
    audit: Box<dyn AuditSink>,
}

impl<S: ReconciliationStorage> ReconciliationProcessor<S> {
    /// Create a processor over the given storage and collaborators
    pub fn new(
        storage: S,
        open_items: Box<dyn OpenItemRepository>,
        commitments: Box<dyn CommitmentRepository>,
        ledger: Box<dyn LedgerLookup>,
        journal: Box<dyn JournalPoster>,
        audit: Box<dyn AuditSink>,
    ) -> Self {
        Self {
            storage,
            open_items,
            commitments,
            ledger,
            journal,
            audit,
        }
    }

    /// Accept a suggested proposal, matching the transaction to its entity.
    ///
    /// Idempotent: accepting a proposal whose pair the transaction is
    /// already matched to succeeds without writing anything.
    pub async fn accept_proposal(
        &mut self,
        transaction_id: &str,
        proposal_id: &str,
        actor_id: &str,
    ) -> ReconcileResult<()> {
        let mut transaction = self.get_transaction_required(transaction_id).await?;
        let mut proposal = self.get_proposal_required(proposal_id).await?;

        if proposal.bank_transaction_id != transaction.id {
            return Err(ReconcileError::Validation(format!(
                "Proposal {} does not belong to transaction {}",
                proposal.id, transaction.id
            )));
        }
        if transaction.is_matched_to(&proposal.entity_type, &proposal.entity_id) {
            return Ok(());
        }
        if transaction.status == TransactionStatus::Matched {
            return Err(ReconcileError::Conflict(format!(
                "Transaction {} is already matched; unmatch it first",
                transaction.id
            )));
        }
        if transaction.status == TransactionStatus::Ignored {
            return Err(ReconcileError::Conflict(format!(
                "Transaction {} is ignored",
                transaction.id
            )));
        }
        if proposal.status != ProposalStatus::Suggested {
            return Err(ReconcileError::Conflict(format!(
                "Proposal {} is no longer open for acceptance",
                proposal.id
            )));
        }

        let old_value = status_snapshot(&transaction);
        let now = chrono::Utc::now().naive_utc();

        transaction.status = TransactionStatus::Matched;
        transaction.matched_entity_type = Some(proposal.entity_type.clone());
        transaction.matched_entity_id = Some(proposal.entity_id.clone());
        transaction.updated_at = now;
        self.storage.update_bank_transaction(&transaction).await?;

        proposal.status = ProposalStatus::Accepted;
        proposal.updated_at = now;
        self.storage.update_proposal(&proposal).await?;

        let payload = ActionPayload::ApplyMatch {
            proposal_id: proposal.id.clone(),
            entity_type: proposal.entity_type.clone(),
            entity_id: proposal.entity_id.clone(),
            confidence_score: proposal.confidence_score,
        };
        self.record(
            &transaction.id,
            payload,
            actor_id,
            Some(old_value),
            Some(status_snapshot(&transaction)),
        )
        .await?;

        info!(
            "Accepted proposal {} for transaction {}",
            proposal.id, transaction.id
        );

        if proposal.entity_type == EntityKind::Commitment {
            // TODO: surface failed commitment postings as a manual booking
            // task instead of only logging them.
            if let Err(e) = self.post_commitment_expense(&transaction, &proposal).await {
                error!(
                    "Journal posting for commitment {} failed: {e}",
                    proposal.entity_id
                );
            }
        }

        Ok(())
    }

    /// Reject a proposal without touching the transaction.
    ///
    /// Rejecting an already rejected proposal is a no-op.
    pub async fn reject_proposal(
        &mut self,
        transaction_id: &str,
        proposal_id: &str,
        actor_id: &str,
    ) -> ReconcileResult<()> {
        let transaction = self.get_transaction_required(transaction_id).await?;
        let mut proposal = self.get_proposal_required(proposal_id).await?;

        if proposal.bank_transaction_id != transaction.id {
            return Err(ReconcileError::Validation(format!(
                "Proposal {} does not belong to transaction {}",
                proposal.id, transaction.id
            )));
        }
        if proposal.status == ProposalStatus::Rejected {
            return Ok(());
        }
        if proposal.status == ProposalStatus::Accepted {
            return Err(ReconcileError::Conflict(format!(
                "Proposal {} was accepted; unmatch the transaction instead",
                proposal.id
            )));
        }

        proposal.status = ProposalStatus::Rejected;
        proposal.updated_at = chrono::Utc::now().naive_utc();
        self.storage.update_proposal(&proposal).await?;

        let payload = ActionPayload::RejectProposal {
            proposal_id: proposal.id.clone(),
            entity_type: proposal.entity_type.clone(),
            entity_id: proposal.entity_id.clone(),
        };
        self.record(&transaction.id, payload, actor_id, None, None)
            .await?;

        info!(
            "Rejected proposal {} for transaction {}",
            proposal.id, transaction.id
        );
        Ok(())
    }

    /// Revert a matched transaction to NEW, clearing its entity reference.
    ///
    /// The prior entity is recorded in the action payload so history stays
    /// reconstructable. A proposal accepted for that pair reverts to
    /// SUGGESTED so it can be accepted again later.
    pub async fn unmatch_transaction(
        &mut self,
        transaction_id: &str,
        actor_id: &str,
    ) -> ReconcileResult<()> {
        let mut transaction = self.get_transaction_required(transaction_id).await?;

        if transaction.status != TransactionStatus::Matched {
            return Err(ReconcileError::Conflict(format!(
                "Transaction {} is not matched",
                transaction.id
            )));
        }

        let old_value = status_snapshot(&transaction);
        let previous_entity_type = transaction.matched_entity_type.take();
        let previous_entity_id = transaction.matched_entity_id.take();
        let now = chrono::Utc::now().naive_utc();

        transaction.status = TransactionStatus::New;
        transaction.updated_at = now;
        self.storage.update_bank_transaction(&transaction).await?;

        if let (Some(entity_type), Some(entity_id)) = (&previous_entity_type, &previous_entity_id)
        {
            let accepted = self
                .storage
                .list_proposals_for_transaction(&transaction.id, Some(ProposalStatus::Accepted))
                .await?;
            for mut proposal in accepted {
                if &proposal.entity_type == entity_type && &proposal.entity_id == entity_id {
                    proposal.status = ProposalStatus::Suggested;
                    proposal.updated_at = now;
                    self.storage.update_proposal(&proposal).await?;
                }
            }
        }

        let payload = ActionPayload::Unmatch {
            previous_entity_type,
            previous_entity_id,
        };
        self.record(
            &transaction.id,
            payload,
            actor_id,
            Some(old_value),
            Some(status_snapshot(&transaction)),
        )
        .await?;

        info!("Unmatched transaction {}", transaction.id);
        Ok(())
    }

    /// Replace the transaction's splits with a validated new set.
    ///
    /// The split amounts must sum to the transaction amount within one cent.
    pub async fn split_transaction(
        &mut self,
        transaction_id: &str,
        splits: &[SplitInput],
        actor_id: &str,
    ) -> ReconcileResult<Vec<BankTransactionSplit>> {
        let transaction = self.get_transaction_required(transaction_id).await?;
        validate_splits(&transaction.amount, splits)?;

        let rows: Vec<BankTransactionSplit> = splits
            .iter()
            .enumerate()
            .map(|(index, input)| BankTransactionSplit {
                transaction_id: transaction.id.clone(),
                split_index: index as u32,
                amount: input.amount.clone(),
                description: input.description.clone(),
            })
            .collect();

        self.storage.replace_splits(&transaction.id, &rows).await?;

        let payload = ActionPayload::Split {
            splits: rows.clone(),
        };
        let new_value = serde_json::to_value(&rows).ok();
        self.record(&transaction.id, payload, actor_id, None, new_value)
            .await?;

        info!(
            "Split transaction {} into {} parts",
            transaction.id,
            rows.len()
        );
        Ok(rows)
    }

    /// Apply one flat reconciliation action to a transaction.
    pub async fn apply_action(
        &mut self,
        transaction_id: &str,
        action: StatementAction,
        actor_id: &str,
    ) -> ReconcileResult<()> {
        match action {
            StatementAction::Ignore { notes } => {
                self.ignore_transaction(transaction_id, notes, actor_id).await
            }
            StatementAction::AcceptMatch { proposal_id } => {
                self.accept_proposal(transaction_id, &proposal_id, actor_id)
                    .await
            }
            StatementAction::LinkInvoice { invoice_id } => {
                self.link_invoice(transaction_id, &invoice_id, actor_id).await
            }
            StatementAction::CreateExpense {
                ledger_code,
                vat_code,
                notes,
            } => {
                self.create_expense(transaction_id, &ledger_code, vat_code, notes, actor_id)
                    .await
            }
            StatementAction::Unmatch => self.unmatch_transaction(transaction_id, actor_id).await,
        }
    }

    /// Mark a NEW transaction as not requiring reconciliation.
    async fn ignore_transaction(
        &mut self,
        transaction_id: &str,
        notes: Option<String>,
        actor_id: &str,
    ) -> ReconcileResult<()> {
        let mut transaction = self.get_transaction_required(transaction_id).await?;

        if transaction.status == TransactionStatus::Ignored {
            return Ok(());
        }
        if transaction.status == TransactionStatus::Matched {
            return Err(ReconcileError::Conflict(format!(
                "Transaction {} is matched; unmatch it before ignoring",
                transaction.id
            )));
        }

        let old_value = status_snapshot(&transaction);
        transaction.status = TransactionStatus::Ignored;
        transaction.updated_at = chrono::Utc::now().naive_utc();
        self.storage.update_bank_transaction(&transaction).await?;

        self.record(
            &transaction.id,
            ActionPayload::Ignore { notes },
            actor_id,
            Some(old_value),
            Some(status_snapshot(&transaction)),
        )
        .await?;

        info!("Ignored transaction {}", transaction.id);
        Ok(())
    }

    /// Match a NEW transaction directly to an open invoice.
    async fn link_invoice(
        &mut self,
        transaction_id: &str,
        invoice_id: &str,
        actor_id: &str,
    ) -> ReconcileResult<()> {
        let mut transaction = self.get_transaction_required(transaction_id).await?;

        if transaction.is_matched_to(&EntityKind::Invoice, invoice_id) {
            return Ok(());
        }
        if transaction.status != TransactionStatus::New {
            return Err(ReconcileError::Conflict(format!(
                "Transaction {} is not open for reconciliation",
                transaction.id
            )));
        }

        self.open_items
            .get_open_item(&transaction.administration_id, invoice_id)
            .await?
            .ok_or_else(|| ReconcileError::EntityNotFound(format!("Open item {invoice_id}")))?;

        let old_value = status_snapshot(&transaction);
        transaction.status = TransactionStatus::Matched;
        transaction.matched_entity_type = Some(EntityKind::Invoice);
        transaction.matched_entity_id = Some(invoice_id.to_string());
        transaction.updated_at = chrono::Utc::now().naive_utc();
        self.storage.update_bank_transaction(&transaction).await?;

        self.record(
            &transaction.id,
            ActionPayload::LinkInvoice {
                invoice_id: invoice_id.to_string(),
            },
            actor_id,
            Some(old_value),
            Some(status_snapshot(&transaction)),
        )
        .await?;

        info!(
            "Linked transaction {} to invoice {}",
            transaction.id, invoice_id
        );
        Ok(())
    }

    /// Book a debit transaction as a manual expense via the journal poster.
    ///
    /// Synthesizes a balanced entry: debit the expense account with the net
    /// amount, debit the VAT account with the reverse-calculated VAT when a
    /// VAT code is given, credit the bank control account with the gross.
    async fn create_expense(
        &mut self,
        transaction_id: &str,
        ledger_code: &str,
        vat_code: Option<String>,
        notes: Option<String>,
        actor_id: &str,
    ) -> ReconcileResult<()> {
        let mut transaction = self.get_transaction_required(transaction_id).await?;

        if transaction.status != TransactionStatus::New {
            return Err(ReconcileError::Conflict(format!(
                "Transaction {} is not open for reconciliation",
                transaction.id
            )));
        }
        if !transaction.is_debit() {
            return Err(ReconcileError::Validation(
                "Only debit transactions can be booked as an expense".to_string(),
            ));
        }

        let account = self
            .storage
            .get_bank_account(&transaction.bank_account_id)
            .await?
            .ok_or_else(|| {
                ReconcileError::AccountNotFound(transaction.bank_account_id.clone())
            })?;
        self.ledger
            .get_ledger_account(&transaction.administration_id, ledger_code)
            .await?
            .ok_or_else(|| {
                ReconcileError::EntityNotFound(format!("Ledger account {ledger_code}"))
            })?;

        let gross = transaction.amount.abs();
        let (net, vat_amount, vat_line) = match &vat_code {
            Some(code) => {
                let vat = self
                    .ledger
                    .get_vat_code(&transaction.administration_id, code)
                    .await?
                    .ok_or_else(|| {
                        ReconcileError::EntityNotFound(format!("VAT code {code}"))
                    })?;
                let breakdown = breakdown_from_gross(&gross, &vat.rate);
                let line = (breakdown.vat_amount > BigDecimal::from(0)).then(|| {
                    JournalLine::debit(
                        vat.ledger_account_code.clone(),
                        breakdown.vat_amount.clone(),
                        Some(format!("VAT {}", vat.code)),
                    )
                });
                (breakdown.net_amount, breakdown.vat_amount, line)
            }
            None => (gross.clone(), BigDecimal::from(0), None),
        };

        let description = notes
            .clone()
            .unwrap_or_else(|| transaction.description.clone());
        let mut entry = JournalEntry::new(
            transaction.administration_id.clone(),
            transaction.booking_date,
            description,
            transaction.reference.clone(),
        );
        entry.add_line(JournalLine::debit(ledger_code.to_string(), net.clone(), None));
        if let Some(line) = vat_line {
            entry.add_line(line);
        }
        entry.add_line(JournalLine::credit(
            account.ledger_account_code.clone(),
            gross.clone(),
            None,
        ));
        entry.validate()?;

        let journal_entry_id = self.journal.post_entry(&entry).await?;

        let old_value = status_snapshot(&transaction);
        transaction.status = TransactionStatus::Matched;
        transaction.matched_entity_type = Some(EntityKind::Manual);
        transaction.matched_entity_id = Some(journal_entry_id.clone());
        transaction.updated_at = chrono::Utc::now().naive_utc();
        self.storage.update_bank_transaction(&transaction).await?;

        self.record(
            &transaction.id,
            ActionPayload::CreateExpense {
                journal_entry_id: journal_entry_id.clone(),
                ledger_code: ledger_code.to_string(),
                vat_code,
                gross_amount: gross,
                net_amount: net,
                vat_amount,
                notes,
            },
            actor_id,
            Some(old_value),
            Some(status_snapshot(&transaction)),
        )
        .await?;

        info!(
            "Booked transaction {} as expense in journal entry {}",
            transaction.id, journal_entry_id
        );
        Ok(())
    }

    /// Post the periodic expense entry for an accepted commitment match.
    ///
    /// Best effort: the caller logs failures without unwinding the accept.
    async fn post_commitment_expense(
        &mut self,
        transaction: &BankTransaction,
        proposal: &MatchProposal,
    ) -> ReconcileResult<()> {
        let commitment = self
            .commitments
            .get_commitment(&transaction.administration_id, &proposal.entity_id)
            .await?
            .ok_or_else(|| {
                ReconcileError::EntityNotFound(format!("Commitment {}", proposal.entity_id))
            })?;
        let Some(expense_code) = commitment.expense_account_code.clone() else {
            return Ok(());
        };
        let account = self
            .storage
            .get_bank_account(&transaction.bank_account_id)
            .await?
            .ok_or_else(|| {
                ReconcileError::AccountNotFound(transaction.bank_account_id.clone())
            })?;

        let amount = transaction.amount.abs();
        let mut entry = JournalEntry::new(
            transaction.administration_id.clone(),
            transaction.booking_date,
            format!("Recurring payment {}", commitment.provider),
            transaction.reference.clone(),
        );
        entry.add_line(JournalLine::debit(expense_code, amount.clone(), None));
        entry.add_line(JournalLine::credit(
            account.ledger_account_code.clone(),
            amount,
            None,
        ));
        entry.validate()?;

        let journal_entry_id = self.journal.post_entry(&entry).await?;
        info!(
            "Posted recurring expense for commitment {} in journal entry {}",
            commitment.id, journal_entry_id
        );
        Ok(())
    }

    /// Append the action row and its audit event.
    async fn record(
        &mut self,
        transaction_id: &str,
        payload: ActionPayload,
        actor_id: &str,
        old_value: Option<serde_json::Value>,
        new_value: Option<serde_json::Value>,
    ) -> ReconcileResult<()> {
        let action =
            ReconciliationAction::new(transaction_id.to_string(), payload, actor_id.to_string());
        self.storage.append_action(&action).await?;

        let event = AuditEvent::new(
            "bank_transaction".to_string(),
            transaction_id.to_string(),
            action.payload.action_type().to_string(),
            actor_id.to_string(),
            old_value,
            new_value,
        );
        self.audit.record(&event).await
    }

    async fn get_transaction_required(
        &self,
        transaction_id: &str,
    ) -> ReconcileResult<BankTransaction> {
        self.storage
            .get_bank_transaction(transaction_id)
            .await?
            .ok_or_else(|| ReconcileError::TransactionNotFound(transaction_id.to_string()))
    }

    async fn get_proposal_required(&self, proposal_id: &str) -> ReconcileResult<MatchProposal> {
        self.storage
            .get_proposal(proposal_id)
            .await?
            .ok_or_else(|| ReconcileError::ProposalNotFound(proposal_id.to_string()))
    }
}

fn status_snapshot(transaction: &BankTransaction) -> serde_json::Value {
    json!({
        "status": transaction.status,
        "matched_entity_type": transaction.matched_entity_type,
        "matched_entity_id": transaction.matched_entity_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::{
        MemoryAuditSink, MemoryCommitments, MemoryLedgerLookup, MemoryOpenItems, MemoryStorage,
        RecordingJournalPoster,
    };
    use chrono::NaiveDate;
    use std::str::FromStr;

    const ADMIN: &str = "admin-1";
    const ACTOR: &str = "user-1";

    fn dec(value: &str) -> BigDecimal {
        BigDecimal::from_str(value).unwrap()
    }

    struct Fixture {
        storage: MemoryStorage,
        open_items: MemoryOpenItems,
        commitments: MemoryCommitments,
        ledger: MemoryLedgerLookup,
        journal: RecordingJournalPoster,
        audit: MemoryAuditSink,
        account: BankAccount,
    }

    impl Fixture {
        async fn new() -> Self {
            Self::with_journal(RecordingJournalPoster::new()).await
        }

        async fn with_journal(journal: RecordingJournalPoster) -> Self {
            let mut storage = MemoryStorage::new();
            let account = BankAccount::new(
                ADMIN.to_string(),
                "Business current".to_string(),
                "NL91ABNA0417164300",
                "EUR".to_string(),
                "1100".to_string(),
            );
            storage.save_bank_account(&account).await.unwrap();
            let ledger = MemoryLedgerLookup::new();
            ledger.add_account("4500", "Office supplies");
            Self {
                storage,
                open_items: MemoryOpenItems::new(),
                commitments: MemoryCommitments::new(),
                ledger,
                journal,
                audit: MemoryAuditSink::new(),
                account,
            }
        }

        fn processor(&self) -> ReconciliationProcessor<MemoryStorage> {
            ReconciliationProcessor::new(
                self.storage.clone(),
                Box::new(self.open_items.clone()),
                Box::new(self.commitments.clone()),
                Box::new(self.ledger.clone()),
                Box::new(self.journal.clone()),
                Box::new(self.audit.clone()),
            )
        }

        async fn transaction(&mut self, amount: &str, description: &str) -> BankTransaction {
            let parsed = ParsedTransaction::new(
                NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
                dec(amount),
                "EUR".to_string(),
                description.to_string(),
            );
            let transaction = BankTransaction::from_parsed(
                ADMIN.to_string(),
                self.account.id.clone(),
                parsed,
                format!("hash-{description}"),
            );
            self.storage.save_bank_transaction(&transaction).await.unwrap();
            transaction
        }

        async fn proposal(
            &mut self,
            transaction: &BankTransaction,
            entity_type: EntityKind,
            entity_id: &str,
            confidence_score: u8,
        ) -> MatchProposal {
            let rule_type = match entity_type {
                EntityKind::Commitment => MatchRuleKind::CommitmentMatch,
                _ => MatchRuleKind::InvoiceMatch,
            };
            let proposal = MatchProposal::new(
                transaction.id.clone(),
                entity_type,
                entity_id.to_string(),
                confidence_score,
                "amount within tolerance".to_string(),
                rule_type,
            );
            self.storage.save_proposal(&proposal).await.unwrap();
            proposal
        }

        async fn stored_transaction(&self, id: &str) -> BankTransaction {
            self.storage.get_bank_transaction(id).await.unwrap().unwrap()
        }

        async fn stored_proposal(&self, id: &str) -> MatchProposal {
            self.storage.get_proposal(id).await.unwrap().unwrap()
        }

        async fn actions(&self, transaction_id: &str) -> Vec<ReconciliationAction> {
            self.storage
                .list_actions_for_transaction(transaction_id)
                .await
                .unwrap()
        }
    }

    #[tokio::test]
    async fn test_accept_proposal_matches_transaction() {
        let mut fixture = Fixture::new().await;
        let transaction = fixture.transaction("250.00", "Payment INV-100").await;
        let proposal = fixture
            .proposal(&transaction, EntityKind::Invoice, "inv-100", 90)
            .await;
        let mut processor = fixture.processor();

        processor
            .accept_proposal(&transaction.id, &proposal.id, ACTOR)
            .await
            .unwrap();

        let stored = fixture.stored_transaction(&transaction.id).await;
        assert_eq!(stored.status, TransactionStatus::Matched);
        assert_eq!(stored.matched_entity_type, Some(EntityKind::Invoice));
        assert_eq!(stored.matched_entity_id, Some("inv-100".to_string()));
        assert_eq!(
            fixture.stored_proposal(&proposal.id).await.status,
            ProposalStatus::Accepted
        );

        let actions = fixture.actions(&transaction.id).await;
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].payload.action_type(), "APPLY_MATCH");
        assert_eq!(actions[0].actor_id, ACTOR);

        let events = fixture.audit.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, "APPLY_MATCH");
        assert_eq!(events[0].entity_id, transaction.id);
    }

    #[tokio::test]
    async fn test_accept_same_pair_twice_is_idempotent() {
        let mut fixture = Fixture::new().await;
        let transaction = fixture.transaction("250.00", "Payment INV-100").await;
        let proposal = fixture
            .proposal(&transaction, EntityKind::Invoice, "inv-100", 90)
            .await;
        let mut processor = fixture.processor();

        processor
            .accept_proposal(&transaction.id, &proposal.id, ACTOR)
            .await
            .unwrap();
        processor
            .accept_proposal(&transaction.id, &proposal.id, ACTOR)
            .await
            .unwrap();

        assert_eq!(fixture.actions(&transaction.id).await.len(), 1);
        assert_eq!(fixture.audit.events().len(), 1);
    }

    #[tokio::test]
    async fn test_accept_conflicts_when_matched_elsewhere() {
        let mut fixture = Fixture::new().await;
        let transaction = fixture.transaction("250.00", "Payment INV-100").await;
        let first = fixture
            .proposal(&transaction, EntityKind::Invoice, "inv-100", 90)
            .await;
        let second = fixture
            .proposal(&transaction, EntityKind::Invoice, "inv-101", 55)
            .await;
        let mut processor = fixture.processor();

        processor
            .accept_proposal(&transaction.id, &first.id, ACTOR)
            .await
            .unwrap();
        let err = processor
            .accept_proposal(&transaction.id, &second.id, ACTOR)
            .await
            .unwrap_err();

        assert!(matches!(err, ReconcileError::Conflict(_)));
        let stored = fixture.stored_transaction(&transaction.id).await;
        assert_eq!(stored.matched_entity_id, Some("inv-100".to_string()));
    }

    #[tokio::test]
    async fn test_accept_rejected_proposal_conflicts() {
        let mut fixture = Fixture::new().await;
        let transaction = fixture.transaction("250.00", "Payment INV-100").await;
        let proposal = fixture
            .proposal(&transaction, EntityKind::Invoice, "inv-100", 90)
            .await;
        let mut processor = fixture.processor();

        processor
            .reject_proposal(&transaction.id, &proposal.id, ACTOR)
            .await
            .unwrap();
        let err = processor
            .accept_proposal(&transaction.id, &proposal.id, ACTOR)
            .await
            .unwrap_err();

        assert!(matches!(err, ReconcileError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_accept_proposal_of_other_transaction_fails() {
        let mut fixture = Fixture::new().await;
        let transaction = fixture.transaction("250.00", "Payment INV-100").await;
        let other = fixture.transaction("99.00", "Payment INV-200").await;
        let proposal = fixture
            .proposal(&other, EntityKind::Invoice, "inv-200", 75)
            .await;
        let mut processor = fixture.processor();

        let err = processor
            .accept_proposal(&transaction.id, &proposal.id, ACTOR)
            .await
            .unwrap_err();

        assert!(matches!(err, ReconcileError::Validation(_)));
        assert!(fixture.actions(&transaction.id).await.is_empty());
    }

    #[tokio::test]
    async fn test_reject_leaves_transaction_untouched() {
        let mut fixture = Fixture::new().await;
        let transaction = fixture.transaction("250.00", "Payment INV-100").await;
        let proposal = fixture
            .proposal(&transaction, EntityKind::Invoice, "inv-100", 90)
            .await;
        let mut processor = fixture.processor();

        processor
            .reject_proposal(&transaction.id, &proposal.id, ACTOR)
            .await
            .unwrap();
        processor
            .reject_proposal(&transaction.id, &proposal.id, ACTOR)
            .await
            .unwrap();

        let stored = fixture.stored_transaction(&transaction.id).await;
        assert_eq!(stored.status, TransactionStatus::New);
        assert_eq!(
            fixture.stored_proposal(&proposal.id).await.status,
            ProposalStatus::Rejected
        );
        let actions = fixture.actions(&transaction.id).await;
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].payload.action_type(), "REJECT_PROPOSAL");
    }

    #[tokio::test]
    async fn test_reject_accepted_proposal_conflicts() {
        let mut fixture = Fixture::new().await;
        let transaction = fixture.transaction("250.00", "Payment INV-100").await;
        let proposal = fixture
            .proposal(&transaction, EntityKind::Invoice, "inv-100", 90)
            .await;
        let mut processor = fixture.processor();

        processor
            .accept_proposal(&transaction.id, &proposal.id, ACTOR)
            .await
            .unwrap();
        let err = processor
            .reject_proposal(&transaction.id, &proposal.id, ACTOR)
            .await
            .unwrap_err();

        assert!(matches!(err, ReconcileError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_unmatch_reverts_to_new_and_records_previous_entity() {
        let mut fixture = Fixture::new().await;
        let transaction = fixture.transaction("250.00", "Payment INV-100").await;
        let proposal = fixture
            .proposal(&transaction, EntityKind::Invoice, "inv-100", 90)
            .await;
        let mut processor = fixture.processor();

        processor
            .accept_proposal(&transaction.id, &proposal.id, ACTOR)
            .await
            .unwrap();
        processor
            .unmatch_transaction(&transaction.id, ACTOR)
            .await
            .unwrap();

        let stored = fixture.stored_transaction(&transaction.id).await;
        assert_eq!(stored.status, TransactionStatus::New);
        assert_eq!(stored.matched_entity_type, None);
        assert_eq!(stored.matched_entity_id, None);
        // The accepted proposal reopens so it can be accepted again.
        assert_eq!(
            fixture.stored_proposal(&proposal.id).await.status,
            ProposalStatus::Suggested
        );

        let actions = fixture.actions(&transaction.id).await;
        assert_eq!(actions.len(), 2);
        match &actions[1].payload {
            ActionPayload::Unmatch {
                previous_entity_type,
                previous_entity_id,
            } => {
                assert_eq!(previous_entity_type, &Some(EntityKind::Invoice));
                assert_eq!(previous_entity_id, &Some("inv-100".to_string()));
            }
            other => panic!("expected UNMATCH payload, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unmatch_requires_matched_status() {
        let mut fixture = Fixture::new().await;
        let transaction = fixture.transaction("250.00", "Payment INV-100").await;
        let mut processor = fixture.processor();

        let err = processor
            .unmatch_transaction(&transaction.id, ACTOR)
            .await
            .unwrap_err();

        assert!(matches!(err, ReconcileError::Conflict(_)));
        assert!(fixture.actions(&transaction.id).await.is_empty());
    }

    #[tokio::test]
    async fn test_unmatch_then_accept_other_proposal() {
        let mut fixture = Fixture::new().await;
        let transaction = fixture.transaction("250.00", "Payment INV-100").await;
        let first = fixture
            .proposal(&transaction, EntityKind::Invoice, "inv-100", 90)
            .await;
        let second = fixture
            .proposal(&transaction, EntityKind::Invoice, "inv-101", 55)
            .await;
        let mut processor = fixture.processor();

        processor
            .accept_proposal(&transaction.id, &first.id, ACTOR)
            .await
            .unwrap();
        processor
            .unmatch_transaction(&transaction.id, ACTOR)
            .await
            .unwrap();
        processor
            .accept_proposal(&transaction.id, &second.id, ACTOR)
            .await
            .unwrap();

        let stored = fixture.stored_transaction(&transaction.id).await;
        assert_eq!(stored.matched_entity_id, Some("inv-101".to_string()));

        let types: Vec<&str> = fixture
            .actions(&transaction.id)
            .await
            .iter()
            .map(|a| a.payload.action_type())
            .collect();
        assert_eq!(types, vec!["APPLY_MATCH", "UNMATCH", "APPLY_MATCH"]);
    }

    #[tokio::test]
    async fn test_ignore_is_idempotent_and_keeps_notes() {
        let mut fixture = Fixture::new().await;
        let transaction = fixture.transaction("-3.50", "Card fee").await;
        let mut processor = fixture.processor();

        processor
            .apply_action(
                &transaction.id,
                StatementAction::Ignore {
                    notes: Some("bank charge".to_string()),
                },
                ACTOR,
            )
            .await
            .unwrap();
        processor
            .apply_action(&transaction.id, StatementAction::Ignore { notes: None }, ACTOR)
            .await
            .unwrap();

        let stored = fixture.stored_transaction(&transaction.id).await;
        assert_eq!(stored.status, TransactionStatus::Ignored);

        let actions = fixture.actions(&transaction.id).await;
        assert_eq!(actions.len(), 1);
        assert_eq!(
            actions[0].payload,
            ActionPayload::Ignore {
                notes: Some("bank charge".to_string())
            }
        );
    }

    #[tokio::test]
    async fn test_accept_ignored_transaction_conflicts() {
        let mut fixture = Fixture::new().await;
        let transaction = fixture.transaction("250.00", "Payment INV-100").await;
        let proposal = fixture
            .proposal(&transaction, EntityKind::Invoice, "inv-100", 90)
            .await;
        let mut processor = fixture.processor();

        processor
            .apply_action(&transaction.id, StatementAction::Ignore { notes: None }, ACTOR)
            .await
            .unwrap();
        let err = processor
            .accept_proposal(&transaction.id, &proposal.id, ACTOR)
            .await
            .unwrap_err();

        assert!(matches!(err, ReconcileError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_ignore_matched_transaction_conflicts() {
        let mut fixture = Fixture::new().await;
        let transaction = fixture.transaction("250.00", "Payment INV-100").await;
        let proposal = fixture
            .proposal(&transaction, EntityKind::Invoice, "inv-100", 90)
            .await;
        let mut processor = fixture.processor();

        processor
            .accept_proposal(&transaction.id, &proposal.id, ACTOR)
            .await
            .unwrap();
        let err = processor
            .apply_action(&transaction.id, StatementAction::Ignore { notes: None }, ACTOR)
            .await
            .unwrap_err();

        assert!(matches!(err, ReconcileError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_link_invoice_matches_directly() {
        let mut fixture = Fixture::new().await;
        fixture.open_items.add(OpenItem {
            id: "inv-300".to_string(),
            administration_id: ADMIN.to_string(),
            item_type: OpenItemType::Receivable,
            status: OpenItemStatus::Open,
            open_amount: dec("250.00"),
            document_number: Some("INV-300".to_string()),
            due_date: None,
            party_id: None,
        });
        let transaction = fixture.transaction("250.00", "Payment thanks").await;
        let mut processor = fixture.processor();

        processor
            .apply_action(
                &transaction.id,
                StatementAction::LinkInvoice {
                    invoice_id: "inv-300".to_string(),
                },
                ACTOR,
            )
            .await
            .unwrap();

        let stored = fixture.stored_transaction(&transaction.id).await;
        assert_eq!(stored.status, TransactionStatus::Matched);
        assert_eq!(stored.matched_entity_type, Some(EntityKind::Invoice));
        assert_eq!(stored.matched_entity_id, Some("inv-300".to_string()));
        let actions = fixture.actions(&transaction.id).await;
        assert_eq!(actions[0].payload.action_type(), "LINK_INVOICE");
    }

    #[tokio::test]
    async fn test_link_unknown_invoice_fails() {
        let mut fixture = Fixture::new().await;
        let transaction = fixture.transaction("250.00", "Payment thanks").await;
        let mut processor = fixture.processor();

        let err = processor
            .apply_action(
                &transaction.id,
                StatementAction::LinkInvoice {
                    invoice_id: "missing".to_string(),
                },
                ACTOR,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ReconcileError::EntityNotFound(_)));
        let stored = fixture.stored_transaction(&transaction.id).await;
        assert_eq!(stored.status, TransactionStatus::New);
    }

    #[tokio::test]
    async fn test_split_replaces_previous_set() {
        let mut fixture = Fixture::new().await;
        let transaction = fixture.transaction("-100.00", "Mixed purchase").await;
        let mut processor = fixture.processor();

        processor
            .split_transaction(
                &transaction.id,
                &[
                    SplitInput {
                        amount: dec("-60.00"),
                        description: "Supplies".to_string(),
                    },
                    SplitInput {
                        amount: dec("-40.00"),
                        description: "Snacks".to_string(),
                    },
                ],
                ACTOR,
            )
            .await
            .unwrap();
        processor
            .split_transaction(
                &transaction.id,
                &[
                    SplitInput {
                        amount: dec("-70.00"),
                        description: "Supplies".to_string(),
                    },
                    SplitInput {
                        amount: dec("-20.00"),
                        description: "Snacks".to_string(),
                    },
                    SplitInput {
                        amount: dec("-10.00"),
                        description: "Postage".to_string(),
                    },
                ],
                ACTOR,
            )
            .await
            .unwrap();

        let splits = fixture.storage.list_splits(&transaction.id).await.unwrap();
        assert_eq!(splits.len(), 3);
        assert_eq!(splits[0].split_index, 0);
        assert_eq!(splits[2].amount, dec("-10.00"));
        assert_eq!(fixture.actions(&transaction.id).await.len(), 2);
    }

    #[tokio::test]
    async fn test_split_rejects_mismatched_sum() {
        let mut fixture = Fixture::new().await;
        let transaction = fixture.transaction("-100.00", "Mixed purchase").await;
        let mut processor = fixture.processor();

        let err = processor
            .split_transaction(
                &transaction.id,
                &[
                    SplitInput {
                        amount: dec("-60.00"),
                        description: "Supplies".to_string(),
                    },
                    SplitInput {
                        amount: dec("-30.00"),
                        description: "Snacks".to_string(),
                    },
                ],
                ACTOR,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ReconcileError::Validation(_)));
        assert!(fixture.storage.list_splits(&transaction.id).await.unwrap().is_empty());
        assert!(fixture.actions(&transaction.id).await.is_empty());
    }

    #[tokio::test]
    async fn test_create_expense_with_vat_posts_balanced_entry() {
        let mut fixture = Fixture::new().await;
        fixture.ledger.add_vat_code(VatCode {
            code: "NL-21".to_string(),
            description: Some("High rate".to_string()),
            rate: dec("21"),
            ledger_account_code: "1520".to_string(),
        });
        let transaction = fixture.transaction("-121.00", "Office chair").await;
        let mut processor = fixture.processor();

        processor
            .apply_action(
                &transaction.id,
                StatementAction::CreateExpense {
                    ledger_code: "4500".to_string(),
                    vat_code: Some("NL-21".to_string()),
                    notes: Some("Desk chair".to_string()),
                },
                ACTOR,
            )
            .await
            .unwrap();

        let posted = fixture.journal.posted();
        assert_eq!(posted.len(), 1);
        let entry = &posted[0];
        assert!(entry.is_balanced());
        assert_eq!(entry.lines.len(), 3);
        assert_eq!(entry.lines[0].ledger_code, "4500");
        assert_eq!(entry.lines[0].amount, dec("100.00"));
        assert_eq!(entry.lines[1].ledger_code, "1520");
        assert_eq!(entry.lines[1].amount, dec("21.00"));
        assert_eq!(entry.lines[2].ledger_code, "1100");
        assert_eq!(entry.lines[2].amount, dec("121.00"));
        assert_eq!(entry.lines[2].entry_type, EntryType::Credit);

        let stored = fixture.stored_transaction(&transaction.id).await;
        assert_eq!(stored.status, TransactionStatus::Matched);
        assert_eq!(stored.matched_entity_type, Some(EntityKind::Manual));
        assert!(stored.matched_entity_id.is_some());

        let actions = fixture.actions(&transaction.id).await;
        match &actions[0].payload {
            ActionPayload::CreateExpense {
                journal_entry_id,
                net_amount,
                vat_amount,
                ..
            } => {
                assert_eq!(Some(journal_entry_id.clone()), stored.matched_entity_id);
                assert_eq!(net_amount, &dec("100.00"));
                assert_eq!(vat_amount, &dec("21.00"));
            }
            other => panic!("expected CREATE_EXPENSE payload, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_create_expense_without_vat_books_gross() {
        let mut fixture = Fixture::new().await;
        let transaction = fixture.transaction("-45.00", "Stamps").await;
        let mut processor = fixture.processor();

        processor
            .apply_action(
                &transaction.id,
                StatementAction::CreateExpense {
                    ledger_code: "4500".to_string(),
                    vat_code: None,
                    notes: None,
                },
                ACTOR,
            )
            .await
            .unwrap();

        let posted = fixture.journal.posted();
        assert_eq!(posted[0].lines.len(), 2);
        assert_eq!(posted[0].lines[0].amount, dec("45.00"));
        assert_eq!(posted[0].description, "Stamps");
    }

    #[tokio::test]
    async fn test_create_expense_requires_debit() {
        let mut fixture = Fixture::new().await;
        let transaction = fixture.transaction("45.00", "Refund").await;
        let mut processor = fixture.processor();

        let err = processor
            .apply_action(
                &transaction.id,
                StatementAction::CreateExpense {
                    ledger_code: "4500".to_string(),
                    vat_code: None,
                    notes: None,
                },
                ACTOR,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ReconcileError::Validation(_)));
        assert!(fixture.journal.posted().is_empty());
    }

    #[tokio::test]
    async fn test_create_expense_unknown_ledger_code_fails() {
        let mut fixture = Fixture::new().await;
        let transaction = fixture.transaction("-45.00", "Stamps").await;
        let mut processor = fixture.processor();

        let err = processor
            .apply_action(
                &transaction.id,
                StatementAction::CreateExpense {
                    ledger_code: "9999".to_string(),
                    vat_code: None,
                    notes: None,
                },
                ACTOR,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ReconcileError::EntityNotFound(_)));
        assert!(fixture.journal.posted().is_empty());
        let stored = fixture.stored_transaction(&transaction.id).await;
        assert_eq!(stored.status, TransactionStatus::New);
    }

    #[tokio::test]
    async fn test_accept_commitment_posts_recurring_expense() {
        let mut fixture = Fixture::new().await;
        fixture.commitments.add(FinancialCommitment {
            id: "com-1".to_string(),
            administration_id: ADMIN.to_string(),
            provider: "Gym-Fit B.V.".to_string(),
            amount_cents: 2999,
            recurring_frequency: Some(RecurringFrequency::Monthly),
            status: CommitmentStatus::Active,
            expense_account_code: Some("4200".to_string()),
        });
        let transaction = fixture.transaction("-29.99", "Gym-Fit monthly").await;
        let proposal = fixture
            .proposal(&transaction, EntityKind::Commitment, "com-1", 75)
            .await;
        let mut processor = fixture.processor();

        processor
            .accept_proposal(&transaction.id, &proposal.id, ACTOR)
            .await
            .unwrap();

        let posted = fixture.journal.posted();
        assert_eq!(posted.len(), 1);
        assert_eq!(posted[0].lines[0].ledger_code, "4200");
        assert_eq!(posted[0].lines[0].amount, dec("29.99"));
        assert_eq!(posted[0].lines[1].ledger_code, "1100");
        assert!(posted[0].is_balanced());
    }

    #[tokio::test]
    async fn test_commitment_journal_failure_does_not_block_accept() {
        let mut fixture = Fixture::with_journal(RecordingJournalPoster::failing()).await;
        fixture.commitments.add(FinancialCommitment {
            id: "com-1".to_string(),
            administration_id: ADMIN.to_string(),
            provider: "Gym-Fit B.V.".to_string(),
            amount_cents: 2999,
            recurring_frequency: Some(RecurringFrequency::Monthly),
            status: CommitmentStatus::Active,
            expense_account_code: Some("4200".to_string()),
        });
        let transaction = fixture.transaction("-29.99", "Gym-Fit monthly").await;
        let proposal = fixture
            .proposal(&transaction, EntityKind::Commitment, "com-1", 75)
            .await;
        let mut processor = fixture.processor();

        processor
            .accept_proposal(&transaction.id, &proposal.id, ACTOR)
            .await
            .unwrap();

        let stored = fixture.stored_transaction(&transaction.id).await;
        assert_eq!(stored.status, TransactionStatus::Matched);
        assert!(fixture.journal.posted().is_empty());
        assert_eq!(fixture.actions(&transaction.id).await.len(), 1);
    }
}
