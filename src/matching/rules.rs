//! User-defined match rules, evaluated ahead of heuristic scoring

use serde::{Deserialize, Serialize};

use crate::types::{BankTransaction, MatchRule, RuleConditions};
use crate::utils::validation::normalize_iban;

/// A rule that fired for a transaction during a matching run
///
/// Rules currently only flag transactions for review; auto-accept wiring
/// is left to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleFlag {
    /// Transaction the rule fired for
    pub bank_transaction_id: String,
    /// Rule that fired
    pub rule_id: String,
    /// Name of the rule, for display
    pub rule_name: String,
}

/// Whether all of a rule's declared conditions hold for a transaction.
///
/// A rule with no conditions at all never matches.
pub fn rule_matches(rule: &MatchRule, transaction: &BankTransaction) -> bool {
    let conditions = &rule.conditions;
    if !has_any_condition(conditions) {
        return false;
    }

    if let Some(iban) = &conditions.counterparty_iban {
        let wanted = normalize_iban(iban);
        if transaction.counterparty_iban.as_deref() != Some(wanted.as_str()) {
            return false;
        }
    }

    if let Some(needle) = &conditions.description_contains {
        if !transaction
            .description
            .to_lowercase()
            .contains(&needle.to_lowercase())
        {
            return false;
        }
    }

    let magnitude = transaction.amount.abs();
    if let Some(min) = &conditions.min_amount {
        if &magnitude < min {
            return false;
        }
    }
    if let Some(max) = &conditions.max_amount {
        if &magnitude > max {
            return false;
        }
    }

    if let Some(currency) = &conditions.currency {
        if &transaction.currency != currency {
            return false;
        }
    }

    true
}

/// First rule in the (priority-ordered) slice that matches the transaction.
pub fn first_matching_rule<'a>(
    rules: &'a [MatchRule],
    transaction: &BankTransaction,
) -> Option<&'a MatchRule> {
    rules.iter().find(|rule| rule_matches(rule, transaction))
}

fn has_any_condition(conditions: &RuleConditions) -> bool {
    conditions.counterparty_iban.is_some()
        || conditions.description_contains.is_some()
        || conditions.min_amount.is_some()
        || conditions.max_amount.is_some()
        || conditions.currency.is_some()
}
