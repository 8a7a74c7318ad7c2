//! # Reconciliation Core
//!
//! A bank reconciliation library covering statement import, duplicate
//! detection, heuristic match proposals, and the accept/reject workflow
//! that turns bank transactions into bookkeeping.
//!
//! ## Features
//!
//! - **Statement parsing**: CAMT.053 (ISO 20022), MT940, and configurable CSV
//! - **Idempotent import**: fingerprint-based duplicate detection per administration
//! - **Match proposals**: scored suggestions against invoices, bills, and recurring commitments
//! - **Match rules**: user-defined IBAN, description, and amount rules evaluated before scoring
//! - **Reconciliation workflow**: accept, reject, unmatch, split, ignore, manual expense booking
//! - **Storage abstraction**: database-agnostic design with trait-based storage
//!
//! ## Quick Start
//!
//! ```rust
//! use reconciliation_core::{MatchingEngine, ReconciliationProcessor, TransactionImporter};
//!
//! // This example shows basic wiring - you need to implement the
//! // ReconciliationStorage trait and the collaborator traits.
//! // let storage = YourStorageImplementation::new();
//! // let mut importer = TransactionImporter::new(storage.clone());
//! ```

pub mod import;
pub mod matching;
pub mod parsers;
pub mod reconciliation;
pub mod traits;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use import::*;
pub use matching::*;
pub use parsers::*;
pub use reconciliation::*;
pub use traits::*;
pub use types::*;
