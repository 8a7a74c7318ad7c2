//! In-memory storage implementation for testing

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use crate::traits::*;
use crate::types::*;

/// In-memory storage implementation for testing and development
///
/// Not transactional: multi-step writes are applied one by one, which is
/// fine for tests but not a model for a production backend.
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    accounts: Arc<RwLock<HashMap<String, BankAccount>>>,
    transactions: Arc<RwLock<HashMap<String, BankTransaction>>>,
    proposals: Arc<RwLock<HashMap<String, MatchProposal>>>,
    actions: Arc<RwLock<Vec<ReconciliationAction>>>,
    splits: Arc<RwLock<HashMap<String, Vec<BankTransactionSplit>>>>,
    rules: Arc<RwLock<HashMap<String, MatchRule>>>,
}

impl MemoryStorage {
    /// Create a new memory storage instance
    pub fn new() -> Self {
        Self {
            accounts: Arc::new(RwLock::new(HashMap::new())),
            transactions: Arc::new(RwLock::new(HashMap::new())),
            proposals: Arc::new(RwLock::new(HashMap::new())),
            actions: Arc::new(RwLock::new(Vec::new())),
            splits: Arc::new(RwLock::new(HashMap::new())),
            rules: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Clear all data (useful for testing)
    pub fn clear(&self) {
        self.accounts.write().unwrap().clear();
        self.transactions.write().unwrap().clear();
        self.proposals.write().unwrap().clear();
        self.actions.write().unwrap().clear();
        self.splits.write().unwrap().clear();
        self.rules.write().unwrap().clear();
    }

    /// Insert a match rule; rule management sits outside the storage trait
    pub fn add_match_rule(&self, rule: MatchRule) {
        self.rules.write().unwrap().insert(rule.id.clone(), rule);
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReconciliationStorage for MemoryStorage {
    async fn save_bank_account(&mut self, account: &BankAccount) -> ReconcileResult<()> {
        self.accounts
            .write()
            .unwrap()
            .insert(account.id.clone(), account.clone());
        Ok(())
    }

    async fn get_bank_account(&self, account_id: &str) -> ReconcileResult<Option<BankAccount>> {
        Ok(self.accounts.read().unwrap().get(account_id).cloned())
    }

    async fn save_bank_transaction(
        &mut self,
        transaction: &BankTransaction,
    ) -> ReconcileResult<()> {
        self.transactions
            .write()
            .unwrap()
            .insert(transaction.id.clone(), transaction.clone());
        Ok(())
    }

    async fn get_bank_transaction(
        &self,
        transaction_id: &str,
    ) -> ReconcileResult<Option<BankTransaction>> {
        Ok(self
            .transactions
            .read()
            .unwrap()
            .get(transaction_id)
            .cloned())
    }

    async fn update_bank_transaction(
        &mut self,
        transaction: &BankTransaction,
    ) -> ReconcileResult<()> {
        if self
            .transactions
            .read()
            .unwrap()
            .contains_key(&transaction.id)
        {
            self.transactions
                .write()
                .unwrap()
                .insert(transaction.id.clone(), transaction.clone());
            Ok(())
        } else {
            Err(ReconcileError::TransactionNotFound(transaction.id.clone()))
        }
    }

    async fn list_bank_transactions(
        &self,
        administration_id: &str,
        status: Option<TransactionStatus>,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> ReconcileResult<Vec<BankTransaction>> {
        let transactions = self.transactions.read().unwrap();
        let mut filtered: Vec<BankTransaction> = transactions
            .values()
            .filter(|txn| {
                if txn.administration_id != administration_id {
                    return false;
                }
                if !status.as_ref().is_none_or(|s| &txn.status == s) {
                    return false;
                }
                if let Some(start) = start_date {
                    if txn.booking_date < start {
                        return false;
                    }
                }
                if let Some(end) = end_date {
                    if txn.booking_date > end {
                        return false;
                    }
                }
                true
            })
            .cloned()
            .collect();
        filtered.sort_by(|a, b| {
            a.booking_date
                .cmp(&b.booking_date)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(filtered)
    }

    async fn list_transaction_hashes(
        &self,
        administration_id: &str,
    ) -> ReconcileResult<HashSet<String>> {
        let transactions = self.transactions.read().unwrap();
        Ok(transactions
            .values()
            .filter(|txn| txn.administration_id == administration_id)
            .map(|txn| txn.raw_hash.clone())
            .collect())
    }

    async fn save_proposal(&mut self, proposal: &MatchProposal) -> ReconcileResult<()> {
        self.proposals
            .write()
            .unwrap()
            .insert(proposal.id.clone(), proposal.clone());
        Ok(())
    }

    async fn update_proposal(&mut self, proposal: &MatchProposal) -> ReconcileResult<()> {
        if self.proposals.read().unwrap().contains_key(&proposal.id) {
            self.proposals
                .write()
                .unwrap()
                .insert(proposal.id.clone(), proposal.clone());
            Ok(())
        } else {
            Err(ReconcileError::ProposalNotFound(proposal.id.clone()))
        }
    }

    async fn get_proposal(&self, proposal_id: &str) -> ReconcileResult<Option<MatchProposal>> {
        Ok(self.proposals.read().unwrap().get(proposal_id).cloned())
    }

    async fn list_proposals_for_transaction(
        &self,
        transaction_id: &str,
        status: Option<ProposalStatus>,
    ) -> ReconcileResult<Vec<MatchProposal>> {
        let proposals = self.proposals.read().unwrap();
        let mut filtered: Vec<MatchProposal> = proposals
            .values()
            .filter(|p| {
                p.bank_transaction_id == transaction_id
                    && status.as_ref().is_none_or(|s| &p.status == s)
            })
            .cloned()
            .collect();
        filtered.sort_by(|a, b| {
            b.confidence_score
                .cmp(&a.confidence_score)
                .then_with(|| a.entity_id.cmp(&b.entity_id))
        });
        Ok(filtered)
    }

    async fn append_action(&mut self, action: &ReconciliationAction) -> ReconcileResult<()> {
        self.actions.write().unwrap().push(action.clone());
        Ok(())
    }

    async fn list_actions_for_transaction(
        &self,
        transaction_id: &str,
    ) -> ReconcileResult<Vec<ReconciliationAction>> {
        let actions = self.actions.read().unwrap();
        Ok(actions
            .iter()
            .filter(|a| a.bank_transaction_id == transaction_id)
            .cloned()
            .collect())
    }

    async fn replace_splits(
        &mut self,
        transaction_id: &str,
        splits: &[BankTransactionSplit],
    ) -> ReconcileResult<()> {
        self.splits
            .write()
            .unwrap()
            .insert(transaction_id.to_string(), splits.to_vec());
        Ok(())
    }

    async fn list_splits(
        &self,
        transaction_id: &str,
    ) -> ReconcileResult<Vec<BankTransactionSplit>> {
        let mut splits = self
            .splits
            .read()
            .unwrap()
            .get(transaction_id)
            .cloned()
            .unwrap_or_default();
        splits.sort_by_key(|s| s.split_index);
        Ok(splits)
    }

    async fn list_match_rules(&self, administration_id: &str) -> ReconcileResult<Vec<MatchRule>> {
        let rules = self.rules.read().unwrap();
        let mut filtered: Vec<MatchRule> = rules
            .values()
            .filter(|r| r.administration_id == administration_id && r.enabled)
            .cloned()
            .collect();
        filtered.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.id.cmp(&b.id)));
        Ok(filtered)
    }
}
