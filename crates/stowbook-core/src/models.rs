//! Core data models for the ledger

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use super::types::{AccountKind, AmountTone, EntryType, RowSide, Stripe};

/// Cash or entity account
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    /// Document id
    #[serde(default)]
    pub id: String,
    /// Display name, unique case-insensitively
    #[serde(default)]
    pub name: String,
    /// Capability set: cash, entity, or both
    #[serde(rename = "type", default)]
    pub kind: AccountKind,
    /// Starting balance represented by the virtual opening entry
    #[serde(default)]
    pub opening_balance: Decimal,
    /// Date the opening balance applies from
    #[serde(default)]
    pub opening_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// At most one account may carry each default flag
    #[serde(default)]
    pub default_cash: bool,
    #[serde(default)]
    pub default_entity: bool,
}

impl Account {
    /// Opening date falls back to the creation timestamp, then the epoch,
    /// so synthesized opening rows always sort to a defined position.
    pub fn resolved_opening_date(&self) -> DateTime<Utc> {
        self.opening_date
            .or(self.created_at)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }
}

/// One physical ledger entry (one leg-pair of a logical transaction)
///
/// A transfer between two cash accounts is exactly two entries (one expense,
/// one income) sharing a `transaction_id` with equal amounts. A combined
/// account entry sets `account_id` and `entity_id` to the same account.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    #[serde(default)]
    pub id: String,
    /// Groups 1-2 physical entries into one logical transaction
    #[serde(default)]
    pub transaction_id: Option<String>,
    /// Cash leg account
    #[serde(default)]
    pub account_id: String,
    /// Entity leg account, if any
    #[serde(default)]
    pub entity_id: Option<String>,
    #[serde(default)]
    pub entry_type: EntryType,
    /// Positive amount; sign comes from entry type and the return flag
    #[serde(default)]
    pub amount: Decimal,
    /// Inverts the sign: a returned expense credits back, a returned income debits
    #[serde(default)]
    pub is_return: bool,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub description: Option<String>,
    /// Case-normalized, "#"-stripped
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub vendor_tag: Option<String>,
    #[serde(default)]
    pub receipt_url: Option<String>,
    #[serde(default)]
    pub receipt_storage_path: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    /// Set on synthesized opening rows for entity-only accounts; the renderer
    /// skips the cash-side row and emits the entity-side row instead
    #[serde(default)]
    pub entity_only: bool,
    /// Synthesized opening-balance rows only; never persisted
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_virtual_opening: bool,
}

impl Default for LedgerEntry {
    fn default() -> Self {
        Self {
            id: String::new(),
            transaction_id: None,
            account_id: String::new(),
            entity_id: None,
            entry_type: EntryType::Expense,
            amount: Decimal::ZERO,
            is_return: false,
            category: None,
            category_id: None,
            date: None,
            description: None,
            tags: Vec::new(),
            client_id: None,
            vendor_tag: None,
            receipt_url: None,
            receipt_storage_path: None,
            created_at: None,
            updated_at: None,
            entity_only: false,
            is_virtual_opening: false,
        }
    }
}

impl LedgerEntry {
    /// Key grouping this entry with its sibling legs; unlinked entries act
    /// as singleton groups keyed by their own id.
    pub fn txn_key(&self) -> &str {
        self.transaction_id.as_deref().unwrap_or(&self.id)
    }

    /// Millisecond timestamp used for sorting; undated entries sort as epoch.
    pub fn date_millis(&self) -> i64 {
        self.date.map(|d| d.timestamp_millis()).unwrap_or(0)
    }

    /// Best-effort activity timestamp for recent-transaction summaries
    pub fn recorded_millis(&self) -> i64 {
        self.date
            .or(self.updated_at)
            .or(self.created_at)
            .map(|d| d.timestamp_millis())
            .unwrap_or(0)
    }
}

/// Strip leading '#' characters and surrounding whitespace from a tag
pub fn normalize_tag(tag: &str) -> String {
    tag.trim_start_matches('#').trim().to_string()
}

/// Active ledger view filters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LedgerFilters {
    /// `Some` when the user picked a custom account subset. A selection that
    /// covers every account behaves like no filter at all.
    pub account_selection: Option<HashSet<String>>,
    /// Lowercased tag filters, AND semantics
    pub tags: Vec<String>,
}

impl LedgerFilters {
    /// Replace the tag filters, normalizing case and stripping '#'
    pub fn set_tags<I: IntoIterator<Item = String>>(&mut self, tags: I) {
        self.tags = tags
            .into_iter()
            .map(|t| normalize_tag(&t).to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
    }
}

/// Cumulative adjustment per account relative to its opening balance,
/// tracked separately for the cash and entity roles
#[derive(Debug, Clone, Default)]
pub struct Adjustments {
    pub cash: HashMap<String, Decimal>,
    pub entity: HashMap<String, Decimal>,
}

impl Adjustments {
    pub fn cash_for(&self, account_id: &str) -> Decimal {
        self.cash.get(account_id).copied().unwrap_or(Decimal::ZERO)
    }

    pub fn entity_for(&self, account_id: &str) -> Decimal {
        self.entity
            .get(account_id)
            .copied()
            .unwrap_or(Decimal::ZERO)
    }
}

/// Per-transaction grouping metadata driving shared-cell layout
#[derive(Debug, Clone, Default)]
pub struct TxnGroup {
    /// Included cash rows in the group
    pub cash: usize,
    /// Included entity rows in the group
    pub entity: usize,
    /// Any member categorized as "Transfer"
    pub is_transfer: bool,
    /// Deltas of all transfer legs, for the shared debit/credit cell
    pub transfer_deltas: Vec<Decimal>,
}

/// Amount cell content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum AmountCell {
    /// Signed display amount
    Plain { value: Decimal },
    /// Combined debit/credit cell shared across a transfer's cash legs
    Transfer { debit: Decimal, credit: Decimal },
}

/// Edit/delete controls, emitted exactly once per visible transaction group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowActions {
    /// Entry targeted by the edit control
    pub entry_id: String,
    /// Transaction targeted by the delete control
    pub txn_key: String,
}

/// Leading cells (date, description, amount, actions) of a rendered row
///
/// Absent on rows that are covered by a `rowspan` from the group's primary
/// row: the entity row of a shared cash+entity pair, and the non-primary
/// cash siblings of a multi-leg transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowLead {
    pub date: Option<DateTime<Utc>>,
    pub description: String,
    pub amount: AmountCell,
    pub tone: AmountTone,
    /// Rows spanned by the leading cells (1 = no sharing)
    pub rowspan: usize,
    /// `None` on virtual opening rows and on groups that already rendered
    /// their controls
    pub actions: Option<RowActions>,
}

/// One display row of the ledger table, newest date first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerRow {
    pub side: RowSide,
    pub txn_key: String,
    pub stripe: Stripe,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lead: Option<RowLead>,
    pub account_name: String,
    /// Running balance the account held after this entry landed
    pub balance: Decimal,
}

/// Balance summary for one account, as shown on the accounts dashboard
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountBalance {
    pub id: String,
    pub name: String,
    pub kind: AccountKind,
    pub opening_balance: Decimal,
    /// Opening plus the adjustment map matching the account's role
    pub balance: Decimal,
    /// Cash-side balance, present for combined accounts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cash_balance: Option<Decimal>,
    /// Entity-side balance, present for combined accounts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_balance: Option<Decimal>,
    pub default_cash: bool,
    pub default_entity: bool,
}

/// One leg's effect inside a recent-transaction summary
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionImpact {
    pub label: String,
    pub side: RowSide,
    pub amount: Decimal,
}

/// Dashboard timeline item: one logical transaction, newest first
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionSummary {
    pub txn_key: String,
    pub date_millis: i64,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub impacts: Vec<TransactionImpact>,
    /// Exactly two cash impacts and nothing else
    pub is_transfer: bool,
    pub amount: Decimal,
    pub is_positive: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_txn_key_falls_back_to_id() {
        let mut entry = LedgerEntry {
            id: "e1".to_string(),
            ..Default::default()
        };
        assert_eq!(entry.txn_key(), "e1");
        entry.transaction_id = Some("txn-9".to_string());
        assert_eq!(entry.txn_key(), "txn-9");
    }

    #[test]
    fn test_normalize_tag() {
        assert_eq!(normalize_tag("#winter"), "winter");
        assert_eq!(normalize_tag("##Boat "), "Boat");
        assert_eq!(normalize_tag("  plain"), "plain");
    }

    #[test]
    fn test_filters_normalize_tags() {
        let mut filters = LedgerFilters::default();
        filters.set_tags(vec!["#Winter".to_string(), " ".to_string(), "BOAT".to_string()]);
        assert_eq!(filters.tags, vec!["winter".to_string(), "boat".to_string()]);
    }

    #[test]
    fn test_entry_tolerates_sparse_documents() {
        // One bad document must not take down the whole ledger view.
        let entry: LedgerEntry = serde_json::from_str("{}").unwrap();
        assert_eq!(entry.amount, Decimal::ZERO);
        assert_eq!(entry.account_id, "");
        assert!(entry.date.is_none());
    }

    #[test]
    fn test_resolved_opening_date_fallbacks() {
        let mut account = Account {
            id: "a".to_string(),
            name: "Checking".to_string(),
            kind: AccountKind::Cash,
            opening_balance: Decimal::ZERO,
            opening_date: None,
            created_at: None,
            default_cash: false,
            default_entity: false,
        };
        assert_eq!(account.resolved_opening_date(), DateTime::<Utc>::UNIX_EPOCH);
        let created = "2024-03-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap();
        account.created_at = Some(created);
        assert_eq!(account.resolved_opening_date(), created);
        let opened = "2023-11-15T00:00:00Z".parse::<DateTime<Utc>>().unwrap();
        account.opening_date = Some(opened);
        assert_eq!(account.resolved_opening_date(), opened);
    }
}
