//! In-memory collaborator fakes for testing and development

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

use crate::traits::*;
use crate::types::*;

/// In-memory open item repository
#[derive(Debug, Clone)]
pub struct MemoryOpenItems {
    items: Arc<RwLock<Vec<OpenItem>>>,
}

impl MemoryOpenItems {
    /// Create an empty repository
    pub fn new() -> Self {
        Self {
            items: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Add an open item
    pub fn add(&self, item: OpenItem) {
        self.items.write().unwrap().push(item);
    }

    /// Change the status of a stored item, e.g. to settle it mid-test
    pub fn set_status(&self, item_id: &str, status: OpenItemStatus) {
        let mut items = self.items.write().unwrap();
        if let Some(item) = items.iter_mut().find(|i| i.id == item_id) {
            item.status = status;
        }
    }
}

impl Default for MemoryOpenItems {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OpenItemRepository for MemoryOpenItems {
    async fn list_open_items(
        &self,
        administration_id: &str,
        item_type: OpenItemType,
    ) -> ReconcileResult<Vec<OpenItem>> {
        let items = self.items.read().unwrap();
        Ok(items
            .iter()
            .filter(|i| {
                i.administration_id == administration_id
                    && i.item_type == item_type
                    && i.status != OpenItemStatus::Settled
            })
            .cloned()
            .collect())
    }

    async fn get_open_item(
        &self,
        administration_id: &str,
        item_id: &str,
    ) -> ReconcileResult<Option<OpenItem>> {
        let items = self.items.read().unwrap();
        Ok(items
            .iter()
            .find(|i| i.administration_id == administration_id && i.id == item_id)
            .cloned())
    }
}

/// In-memory commitment repository
#[derive(Debug, Clone)]
pub struct MemoryCommitments {
    commitments: Arc<RwLock<Vec<FinancialCommitment>>>,
}

impl MemoryCommitments {
    /// Create an empty repository
    pub fn new() -> Self {
        Self {
            commitments: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Add a commitment
    pub fn add(&self, commitment: FinancialCommitment) {
        self.commitments.write().unwrap().push(commitment);
    }
}

impl Default for MemoryCommitments {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommitmentRepository for MemoryCommitments {
    async fn list_active_commitments(
        &self,
        administration_id: &str,
    ) -> ReconcileResult<Vec<FinancialCommitment>> {
        let commitments = self.commitments.read().unwrap();
        Ok(commitments
            .iter()
            .filter(|c| {
                c.administration_id == administration_id && c.status == CommitmentStatus::Active
            })
            .cloned()
            .collect())
    }

    async fn get_commitment(
        &self,
        administration_id: &str,
        commitment_id: &str,
    ) -> ReconcileResult<Option<FinancialCommitment>> {
        let commitments = self.commitments.read().unwrap();
        Ok(commitments
            .iter()
            .find(|c| c.administration_id == administration_id && c.id == commitment_id)
            .cloned())
    }
}

/// In-memory chart-of-accounts and VAT code lookup
///
/// Keyed by code only; administration scoping is ignored, which is enough
/// for single-tenant tests.
#[derive(Debug, Clone)]
pub struct MemoryLedgerLookup {
    accounts: Arc<RwLock<HashMap<String, LedgerAccountRef>>>,
    vat_codes: Arc<RwLock<HashMap<String, VatCode>>>,
}

impl MemoryLedgerLookup {
    /// Create an empty lookup
    pub fn new() -> Self {
        Self {
            accounts: Arc::new(RwLock::new(HashMap::new())),
            vat_codes: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a ledger account
    pub fn add_account(&self, code: &str, name: &str) {
        self.accounts.write().unwrap().insert(
            code.to_string(),
            LedgerAccountRef {
                code: code.to_string(),
                name: name.to_string(),
            },
        );
    }

    /// Register a VAT code
    pub fn add_vat_code(&self, vat_code: VatCode) {
        self.vat_codes
            .write()
            .unwrap()
            .insert(vat_code.code.clone(), vat_code);
    }
}

impl Default for MemoryLedgerLookup {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerLookup for MemoryLedgerLookup {
    async fn get_ledger_account(
        &self,
        _administration_id: &str,
        code: &str,
    ) -> ReconcileResult<Option<LedgerAccountRef>> {
        Ok(self.accounts.read().unwrap().get(code).cloned())
    }

    async fn get_vat_code(
        &self,
        _administration_id: &str,
        code: &str,
    ) -> ReconcileResult<Option<VatCode>> {
        Ok(self.vat_codes.read().unwrap().get(code).cloned())
    }
}

/// Journal poster that records entries instead of posting them
#[derive(Debug, Clone)]
pub struct RecordingJournalPoster {
    entries: Arc<RwLock<Vec<JournalEntry>>>,
    fail: bool,
}

impl RecordingJournalPoster {
    /// Create a poster that accepts every entry
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(Vec::new())),
            fail: false,
        }
    }

    /// Create a poster that rejects every entry
    pub fn failing() -> Self {
        Self {
            entries: Arc::new(RwLock::new(Vec::new())),
            fail: true,
        }
    }

    /// Entries recorded so far
    pub fn posted(&self) -> Vec<JournalEntry> {
        self.entries.read().unwrap().clone()
    }
}

impl Default for RecordingJournalPoster {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JournalPoster for RecordingJournalPoster {
    async fn post_entry(&mut self, entry: &JournalEntry) -> ReconcileResult<String> {
        if self.fail {
            return Err(ReconcileError::Storage(
                "journal poster unavailable".to_string(),
            ));
        }
        self.entries.write().unwrap().push(entry.clone());
        Ok(Uuid::new_v4().to_string())
    }
}

/// Audit sink that collects events in memory
#[derive(Debug, Clone)]
pub struct MemoryAuditSink {
    events: Arc<RwLock<Vec<AuditEvent>>>,
}

impl MemoryAuditSink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self {
            events: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Events recorded so far
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.read().unwrap().clone()
    }
}

impl Default for MemoryAuditSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&mut self, event: &AuditEvent) -> ReconcileResult<()> {
        self.events.write().unwrap().push(event.clone());
        Ok(())
    }
}
