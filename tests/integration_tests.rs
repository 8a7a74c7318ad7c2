//! Integration tests for reconciliation-core

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use reconciliation_core::{
    utils::{
        MemoryAuditSink, MemoryCommitments, MemoryLedgerLookup, MemoryOpenItems, MemoryStorage,
        RecordingJournalPoster,
    },
    BankAccount, CommitmentStatus, CsvColumnMapping, CsvParser, EntityKind, FinancialCommitment,
    MatchScope, MatchingEngine, OpenItem, OpenItemStatus, OpenItemType, ProposalStatus,
    ReconciliationProcessor, ReconciliationStorage, RecurringFrequency, StatementAction,
    TransactionImporter, TransactionStatus, VatCode,
};
use std::str::FromStr;

const ADMIN: &str = "admin-1";

const CAMT_SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
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
              <DbtrAcct><Id><IBAN>NL02RABO0123456789</IBAN></Id></DbtrAcct>
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

async fn account_with(storage: &mut MemoryStorage) -> BankAccount {
    let account = BankAccount::new(
        ADMIN.to_string(),
        "Business current".to_string(),
        "NL91ABNA0417164300",
        "EUR".to_string(),
        "1100".to_string(),
    );
    storage.save_bank_account(&account).await.unwrap();
    account
}

fn receivable(id: &str, amount: &str, document_number: &str, due: Option<NaiveDate>) -> OpenItem {
    OpenItem {
        id: id.to_string(),
        administration_id: ADMIN.to_string(),
        item_type: OpenItemType::Receivable,
        status: OpenItemStatus::Open,
        open_amount: BigDecimal::from_str(amount).unwrap(),
        document_number: Some(document_number.to_string()),
        due_date: due,
        party_id: None,
    }
}

#[tokio::test]
async fn test_complete_reconciliation_workflow() {
    let mut storage = MemoryStorage::new();
    let account = account_with(&mut storage).await;

    // Import a CAMT.053 statement with one credit and one debit
    let mut importer = TransactionImporter::new(storage.clone());
    let summary = importer
        .import_file(ADMIN, &account.id, CAMT_SAMPLE.as_bytes(), None)
        .await
        .unwrap();
    assert_eq!(summary.imported_count, 2);
    assert_eq!(summary.skipped_duplicates, 0);

    // The credit should match the open invoice, the debit the gym commitment
    let open_items = MemoryOpenItems::new();
    open_items.add(receivable(
        "inv-1",
        "250.00",
        "INV-2024-001",
        NaiveDate::from_ymd_opt(2024, 1, 10),
    ));
    let commitments = MemoryCommitments::new();
    commitments.add(FinancialCommitment {
        id: "com-1".to_string(),
        administration_id: ADMIN.to_string(),
        provider: "Gym-Fit B.V.".to_string(),
        amount_cents: 2999,
        recurring_frequency: Some(RecurringFrequency::Monthly),
        status: CommitmentStatus::Active,
        expense_account_code: Some("4200".to_string()),
    });

    let mut engine = MatchingEngine::new(
        storage.clone(),
        Box::new(open_items.clone()),
        Box::new(commitments.clone()),
    );
    let report = engine.run(ADMIN, &MatchScope::default()).await.unwrap();
    assert_eq!(report.transactions_scanned, 2);
    assert_eq!(report.proposals_created, 2);

    let transactions = storage
        .list_bank_transactions(ADMIN, None, None, None)
        .await
        .unwrap();
    let credit = transactions
        .iter()
        .find(|t| t.amount > BigDecimal::from(0))
        .unwrap();
    let debit = transactions
        .iter()
        .find(|t| t.amount < BigDecimal::from(0))
        .unwrap();

    // Exact amount + document number + due window scores the full 90
    let credit_proposals = storage
        .list_proposals_for_transaction(&credit.id, None)
        .await
        .unwrap();
    assert_eq!(credit_proposals.len(), 1);
    assert_eq!(credit_proposals[0].entity_type, EntityKind::Invoice);
    assert_eq!(credit_proposals[0].entity_id, "inv-1");
    assert_eq!(credit_proposals[0].confidence_score, 90);

    let debit_proposals = storage
        .list_proposals_for_transaction(&debit.id, None)
        .await
        .unwrap();
    assert_eq!(debit_proposals.len(), 1);
    assert_eq!(debit_proposals[0].entity_type, EntityKind::Commitment);
    assert_eq!(debit_proposals[0].confidence_score, 75);

    // Accept both proposals
    let journal = RecordingJournalPoster::new();
    let audit = MemoryAuditSink::new();
    let mut processor = ReconciliationProcessor::new(
        storage.clone(),
        Box::new(open_items.clone()),
        Box::new(commitments.clone()),
        Box::new(MemoryLedgerLookup::new()),
        Box::new(journal.clone()),
        Box::new(audit.clone()),
    );
    processor
        .accept_proposal(&credit.id, &credit_proposals[0].id, "user-7")
        .await
        .unwrap();
    processor
        .accept_proposal(&debit.id, &debit_proposals[0].id, "user-7")
        .await
        .unwrap();

    let credit = storage
        .get_bank_transaction(&credit.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(credit.status, TransactionStatus::Matched);
    assert_eq!(credit.matched_entity_id, Some("inv-1".to_string()));

    // Accepting the commitment also books its recurring expense
    let posted = journal.posted();
    assert_eq!(posted.len(), 1);
    assert_eq!(posted[0].lines[0].ledger_code, "4200");
    assert_eq!(posted[0].lines[1].ledger_code, "1100");
    assert!(posted[0].is_balanced());

    // One audit event per accepted proposal
    let events = audit.events();
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|e| e.action == "APPLY_MATCH"));
}

#[tokio::test]
async fn test_reimport_is_idempotent() {
    let mut storage = MemoryStorage::new();
    let account = account_with(&mut storage).await;
    let mut importer = TransactionImporter::new(storage.clone());

    let first = importer
        .import_file(ADMIN, &account.id, CAMT_SAMPLE.as_bytes(), None)
        .await
        .unwrap();
    assert_eq!(first.imported_count, 2);

    // The same file again only skips duplicates
    let second = importer
        .import_file(ADMIN, &account.id, CAMT_SAMPLE.as_bytes(), None)
        .await
        .unwrap();
    assert_eq!(second.imported_count, 0);
    assert_eq!(second.skipped_duplicates, 2);
    assert!(second.message.contains("2 duplicates skipped"));

    let transactions = storage
        .list_bank_transactions(ADMIN, None, None, None)
        .await
        .unwrap();
    assert_eq!(transactions.len(), 2);

    // Re-running the engine updates proposals in place instead of duplicating
    let open_items = MemoryOpenItems::new();
    open_items.add(receivable(
        "inv-1",
        "250.00",
        "INV-2024-001",
        NaiveDate::from_ymd_opt(2024, 1, 10),
    ));
    let mut engine = MatchingEngine::new(
        storage.clone(),
        Box::new(open_items),
        Box::new(MemoryCommitments::new()),
    );
    let first_run = engine.run(ADMIN, &MatchScope::default()).await.unwrap();
    assert_eq!(first_run.proposals_created, 1);

    let second_run = engine.run(ADMIN, &MatchScope::default()).await.unwrap();
    assert_eq!(second_run.proposals_created, 0);
    assert_eq!(second_run.proposals_updated, 1);
}

#[tokio::test]
async fn test_csv_import_and_manual_expense_booking() {
    let mut storage = MemoryStorage::new();
    let account = account_with(&mut storage).await;

    // CSV needs a per-bank column mapping, so it is registered explicitly
    let mut importer = TransactionImporter::new(storage.clone());
    importer.registry_mut().register(Box::new(CsvParser::new(
        CsvColumnMapping {
            date_column: "datum".to_string(),
            amount_column: "bedrag".to_string(),
            description_column: "omschrijving".to_string(),
            name_column: Some("naam".to_string()),
            iban_column: None,
            reference_column: None,
        },
        "%d-%m-%Y".to_string(),
    )));

    let csv = "datum;bedrag;omschrijving;naam\n\
               15-01-2024;-121,00;Office chair;ACME Supplies BV\n";
    let summary = importer
        .import_file(ADMIN, &account.id, csv.as_bytes(), Some("export.csv"))
        .await
        .unwrap();
    assert_eq!(summary.imported_count, 1);

    let transactions = storage
        .list_bank_transactions(ADMIN, None, None, None)
        .await
        .unwrap();
    let transaction = &transactions[0];
    assert_eq!(transaction.amount, BigDecimal::from_str("-121.00").unwrap());

    // Book the debit as an expense with 21% VAT reverse-calculated
    let ledger = MemoryLedgerLookup::new();
    ledger.add_account("4500", "Office supplies");
    ledger.add_vat_code(VatCode {
        code: "NL-21".to_string(),
        description: Some("High rate".to_string()),
        rate: BigDecimal::from(21),
        ledger_account_code: "1520".to_string(),
    });
    let journal = RecordingJournalPoster::new();
    let audit = MemoryAuditSink::new();
    let mut processor = ReconciliationProcessor::new(
        storage.clone(),
        Box::new(MemoryOpenItems::new()),
        Box::new(MemoryCommitments::new()),
        Box::new(ledger),
        Box::new(journal.clone()),
        Box::new(audit.clone()),
    );
    processor
        .apply_action(
            &transaction.id,
            StatementAction::CreateExpense {
                ledger_code: "4500".to_string(),
                vat_code: Some("NL-21".to_string()),
                notes: None,
            },
            "user-7",
        )
        .await
        .unwrap();

    let posted = journal.posted();
    assert_eq!(posted.len(), 1);
    assert_eq!(posted[0].lines.len(), 3);
    assert_eq!(posted[0].lines[0].amount, BigDecimal::from_str("100.00").unwrap());
    assert_eq!(posted[0].lines[1].amount, BigDecimal::from_str("21.00").unwrap());
    assert_eq!(posted[0].lines[2].amount, BigDecimal::from_str("121.00").unwrap());
    assert!(posted[0].is_balanced());

    let stored = storage
        .get_bank_transaction(&transaction.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, TransactionStatus::Matched);
    assert_eq!(stored.matched_entity_type, Some(EntityKind::Manual));
    assert_eq!(audit.events()[0].action, "CREATE_EXPENSE");
}

#[tokio::test]
async fn test_unmatch_and_rematch_keeps_history() {
    let mut storage = MemoryStorage::new();
    let account = account_with(&mut storage).await;

    let mt940 = "\
:20:STMT-2024-02
:25:NL91ABNA0417164300
:28C:2/1
:60F:C240119EUR1000,00
:61:2401200120C250,00NTRFNONREF
:86:Payment invoice INV-A thanks
:62F:C240120EUR1250,00
";
    let mut importer = TransactionImporter::new(storage.clone());
    importer
        .import_file(ADMIN, &account.id, mt940.as_bytes(), None)
        .await
        .unwrap();
    let transactions = storage
        .list_bank_transactions(ADMIN, None, None, None)
        .await
        .unwrap();
    let transaction = &transactions[0];

    // Two candidate invoices over the same amount
    let open_items = MemoryOpenItems::new();
    open_items.add(receivable(
        "inv-a",
        "250.00",
        "INV-A",
        NaiveDate::from_ymd_opt(2024, 1, 15),
    ));
    open_items.add(receivable("inv-b", "250.00", "INV-B", None));
    let mut engine = MatchingEngine::new(
        storage.clone(),
        Box::new(open_items.clone()),
        Box::new(MemoryCommitments::new()),
    );
    engine.run(ADMIN, &MatchScope::default()).await.unwrap();

    let proposals = storage
        .list_proposals_for_transaction(&transaction.id, None)
        .await
        .unwrap();
    assert_eq!(proposals.len(), 2);
    assert_eq!(proposals[0].entity_id, "inv-a");

    let mut processor = ReconciliationProcessor::new(
        storage.clone(),
        Box::new(open_items),
        Box::new(MemoryCommitments::new()),
        Box::new(MemoryLedgerLookup::new()),
        Box::new(RecordingJournalPoster::new()),
        Box::new(MemoryAuditSink::new()),
    );

    // Accept the best proposal, change our mind, take the other one
    processor
        .accept_proposal(&transaction.id, &proposals[0].id, "user-7")
        .await
        .unwrap();
    processor
        .unmatch_transaction(&transaction.id, "user-7")
        .await
        .unwrap();
    processor
        .accept_proposal(&transaction.id, &proposals[1].id, "user-7")
        .await
        .unwrap();

    let stored = storage
        .get_bank_transaction(&transaction.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, TransactionStatus::Matched);
    assert_eq!(stored.matched_entity_id, Some("inv-b".to_string()));

    // The first proposal reopened when the match was undone
    assert_eq!(
        storage
            .get_proposal(&proposals[0].id)
            .await
            .unwrap()
            .unwrap()
            .status,
        ProposalStatus::Suggested
    );

    let actions = storage
        .list_actions_for_transaction(&transaction.id)
        .await
        .unwrap();
    let types: Vec<&str> = actions.iter().map(|a| a.payload.action_type()).collect();
    assert_eq!(types, vec!["APPLY_MATCH", "UNMATCH", "APPLY_MATCH"]);
}
