//! Basic reconciliation flow: import, match, accept

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use reconciliation_core::utils::{
    MemoryAuditSink, MemoryCommitments, MemoryLedgerLookup, MemoryOpenItems, MemoryStorage,
    RecordingJournalPoster,
};
use reconciliation_core::{
    BankAccount, CommitmentStatus, FinancialCommitment, MatchScope, MatchingEngine, OpenItem,
    OpenItemStatus, OpenItemType, ReconciliationProcessor, ReconciliationStorage,
    RecurringFrequency, TransactionImporter,
};
use std::str::FromStr;

const STATEMENT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Document xmlns="urn:iso:std:iso:20022:tech:xsd:camt.053.001.02">
  <BkToCstmrStmt>
    <Stmt>
      <Id>STMT-2024-010</Id>
      <Acct><Id><IBAN>NL91 ABNA 0417 1643 00</IBAN></Id></Acct>
      <Ntry>
        <Amt Ccy="EUR">250.00</Amt>
        <CdtDbtInd>CRDT</CdtDbtInd>
        <BookgDt><Dt>2024-01-20</Dt></BookgDt>
        <NtryDtls>
          <TxDtls>
            <Refs><EndToEndId>E2E-1001</EndToEndId></Refs>
            <RltdPties>
              <Dbtr><Nm>Jansen Consulting BV</Nm></Dbtr>
            </RltdPties>
            <RmtInf><Ustrd>Payment invoice INV-2024-001</Ustrd></RmtInf>
          </TxDtls>
        </NtryDtls>
      </Ntry>
      <Ntry>
        <Amt Ccy="EUR">29.99</Amt>
        <CdtDbtInd>DBIT</CdtDbtInd>
        <BookgDt><Dt>2024-01-20</Dt></BookgDt>
        <NtryDtls>
          <TxDtls>
            <RltdPties>
              <Cdtr><Nm>Gym-Fit B.V.</Nm></Cdtr>
            </RltdPties>
            <RmtInf><Ustrd>Subscription january</Ustrd></RmtInf>
          </TxDtls>
        </NtryDtls>
      </Ntry>
    </Stmt>
  </BkToCstmrStmt>
</Document>"#;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    println!("🏦 Reconciliation Core - Basic Workflow Example\n");

    // 1. Register a bank account and import a CAMT.053 statement
    println!("📥 Importing bank statement...");
    let mut storage = MemoryStorage::new();
    let account = BankAccount::new(
        "demo-admin".to_string(),
        "Business current".to_string(),
        "NL91ABNA0417164300",
        "EUR".to_string(),
        "1100".to_string(),
    );
    storage.save_bank_account(&account).await?;

    let mut importer = TransactionImporter::new(storage.clone());
    let summary = importer
        .import_file("demo-admin", &account.id, STATEMENT.as_bytes(), None)
        .await?;
    println!("  ✓ {}\n", summary.message);

    // 2. Provide the open bookkeeping data to match against
    println!("📚 Loading open items and commitments...");
    let open_items = MemoryOpenItems::new();
    open_items.add(OpenItem {
        id: "inv-1".to_string(),
        administration_id: "demo-admin".to_string(),
        item_type: OpenItemType::Receivable,
        status: OpenItemStatus::Open,
        open_amount: BigDecimal::from_str("250.00")?,
        document_number: Some("INV-2024-001".to_string()),
        due_date: NaiveDate::from_ymd_opt(2024, 1, 10),
        party_id: None,
    });
    let commitments = MemoryCommitments::new();
    commitments.add(FinancialCommitment {
        id: "com-1".to_string(),
        administration_id: "demo-admin".to_string(),
        provider: "Gym-Fit B.V.".to_string(),
        amount_cents: 2999,
        recurring_frequency: Some(RecurringFrequency::Monthly),
        status: CommitmentStatus::Active,
        expense_account_code: Some("4200".to_string()),
    });
    println!("  ✓ 1 open invoice, 1 recurring commitment\n");

    // 3. Run the matching engine
    println!("🔍 Running matching engine...");
    let mut engine = MatchingEngine::new(
        storage.clone(),
        Box::new(open_items.clone()),
        Box::new(commitments.clone()),
    );
    let report = engine.run("demo-admin", &MatchScope::default()).await?;
    println!(
        "  ✓ Scanned {} transactions, created {} proposals\n",
        report.transactions_scanned, report.proposals_created
    );

    // 4. Show the suggestions
    println!("💡 Match proposals:");
    let transactions = storage
        .list_bank_transactions("demo-admin", None, None, None)
        .await?;
    for transaction in &transactions {
        let proposals = storage
            .list_proposals_for_transaction(&transaction.id, None)
            .await?;
        println!(
            "  {} {} \"{}\"",
            transaction.booking_date, transaction.amount, transaction.description
        );
        for proposal in &proposals {
            println!(
                "    -> {:?} {} at {}% ({})",
                proposal.entity_type, proposal.entity_id, proposal.confidence_score,
                proposal.reason
            );
        }
    }
    println!();

    // 5. Accept every top proposal
    println!("✅ Accepting proposals...");
    let journal = RecordingJournalPoster::new();
    let audit = MemoryAuditSink::new();
    let mut processor = ReconciliationProcessor::new(
        storage.clone(),
        Box::new(open_items),
        Box::new(commitments),
        Box::new(MemoryLedgerLookup::new()),
        Box::new(journal.clone()),
        Box::new(audit.clone()),
    );
    for transaction in &transactions {
        let proposals = storage
            .list_proposals_for_transaction(&transaction.id, None)
            .await?;
        if let Some(best) = proposals.first() {
            processor
                .accept_proposal(&transaction.id, &best.id, "demo-user")
                .await?;
            println!(
                "  ✓ Matched {} to {:?} {}",
                transaction.description, best.entity_type, best.entity_id
            );
        }
    }
    println!();

    // 6. Show what was booked and logged along the way
    println!("📒 Journal entries posted: {}", journal.posted().len());
    for entry in journal.posted() {
        println!("  {} \"{}\"", entry.date, entry.description);
        for line in &entry.lines {
            println!("    {:?} {} -> {}", line.entry_type, line.amount, line.ledger_code);
        }
    }
    println!("🗒  Audit events recorded: {}", audit.events().len());

    println!("\n🎉 Example completed successfully!");
    Ok(())
}
