//! Core ledger processing and business logic
//!
//! The ledger view derives running balances for cash and entity accounts
//! from a flat, unordered stream of signed entries delivered by document
//! store snapshots. Rendering is a pure recompute over the full entry list:
//! filter, synthesize opening rows, sort, group by transaction, then walk
//! newest-to-oldest subtracting each entry's delta from the account's known
//! final balance.

pub mod error;
pub mod models;
pub mod pricing;
pub mod types;

use rust_decimal::Decimal;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

pub use error::{CoreError, ErrorCode};
pub use models::{
    normalize_tag, Account, AccountBalance, Adjustments, AmountCell, LedgerEntry, LedgerFilters,
    LedgerRow, RowActions, RowLead, TransactionImpact, TransactionSummary, TxnGroup,
};
pub use types::{AccountKind, AmountTone, EntryType, RowSide, Stripe};

// ==================== Delta Calculator ====================

/// Signed monetary effect of one entry on one account.
///
/// Virtual opening entries always yield zero: their effect is baked into the
/// base balance, not accumulated. A return inverts the sign, so a returned
/// expense credits back and a returned income debits.
pub fn entry_delta(entry: &LedgerEntry) -> Decimal {
    if entry.is_virtual_opening {
        return Decimal::ZERO;
    }
    let direction = match entry.entry_type {
        EntryType::Expense => Decimal::NEGATIVE_ONE,
        EntryType::Income => Decimal::ONE,
    };
    let return_factor = if entry.is_return {
        Decimal::NEGATIVE_ONE
    } else {
        Decimal::ONE
    };
    direction * entry.amount * return_factor
}

/// Round an amount to cents, the precision entries are persisted with
pub fn quantize(amount: Decimal) -> Decimal {
    amount.round_dp(2)
}

// ==================== Adjustment Aggregator ====================

/// Fold all entries into cumulative per-account adjustments, relative to
/// each account's opening balance.
///
/// The cash and entity roles accumulate independently: a single entry on a
/// combined account contributes to both maps under the same key.
pub fn calculate_adjustments(entries: &[LedgerEntry]) -> Adjustments {
    let mut adjustments = Adjustments::default();
    for entry in entries {
        let delta = entry_delta(entry);
        *adjustments
            .cash
            .entry(entry.account_id.clone())
            .or_insert(Decimal::ZERO) += delta;
        if let Some(entity_id) = &entry.entity_id {
            *adjustments
                .entity
                .entry(entity_id.clone())
                .or_insert(Decimal::ZERO) += delta;
        }
    }
    adjustments
}

// ==================== Virtual Opening Synthesizer ====================

/// Materialize one non-persisted entry per visible account representing its
/// opening balance, so the render pipeline has a uniform starting point.
///
/// Tag-filtered views never include these rows; the caller is responsible
/// for skipping synthesis when a tag filter is active.
fn synthesize_opening_entries(
    accounts: &[Account],
    selection: Option<&HashSet<String>>,
) -> Vec<LedgerEntry> {
    accounts
        .iter()
        .filter(|account| selection.map_or(true, |set| set.contains(&account.id)))
        .map(|account| {
            let is_cash = account.kind.supports_cash();
            let is_entity = account.kind.supports_entity();
            LedgerEntry {
                id: format!("opening-{}", account.id),
                transaction_id: Some(format!("opening-{}", account.id)),
                account_id: account.id.clone(),
                entity_id: if is_entity {
                    Some(account.id.clone())
                } else {
                    None
                },
                entry_type: EntryType::Income,
                amount: account.opening_balance,
                category: Some("Opening balance".to_string()),
                description: Some("Opening balance".to_string()),
                date: Some(account.resolved_opening_date()),
                entity_only: !is_cash && is_entity,
                is_virtual_opening: true,
                ..Default::default()
            }
        })
        .collect()
}

// ==================== Ledger View ====================

/// Application state for the ledger: accounts, entries, active filters, and
/// the adjustment maps recomputed from the full (unfiltered) entry list on
/// every snapshot.
#[derive(Debug, Default)]
pub struct LedgerView {
    accounts: Vec<Account>,
    entries: Vec<LedgerEntry>,
    filters: LedgerFilters,
    adjustments: Adjustments,
}

/// Intermediate per-entry render decision
struct RenderPlan {
    include_cash: bool,
    include_entity: bool,
    txn_key: String,
    delta: Decimal,
}

/// Pending default-flag clear on another account, produced by the
/// default-account fan-out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultClear {
    pub account_id: String,
    pub clear_cash: bool,
    pub clear_entity: bool,
}

impl LedgerView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accounts(&self) -> &[Account] {
        &self.accounts
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn filters(&self) -> &LedgerFilters {
        &self.filters
    }

    pub fn adjustments(&self) -> &Adjustments {
        &self.adjustments
    }

    pub fn set_filters(&mut self, filters: LedgerFilters) {
        self.filters = filters;
    }

    /// Replace the account list from a store snapshot
    pub fn apply_accounts_snapshot(&mut self, accounts: Vec<Account>) {
        log::debug!("accounts snapshot: {} documents", accounts.len());
        self.accounts = accounts;
    }

    /// Replace the entry list from a store snapshot and recompute the
    /// adjustment maps from scratch
    pub fn apply_entries_snapshot(&mut self, entries: Vec<LedgerEntry>) {
        log::debug!("entries snapshot: {} documents", entries.len());
        self.adjustments = calculate_adjustments(&entries);
        self.entries = entries;
    }

    pub fn account_by_id(&self, id: &str) -> Option<&Account> {
        self.accounts.iter().find(|a| a.id == id)
    }

    /// Case-insensitive name lookup, optionally excluding one account
    /// (the one being edited)
    pub fn account_name_taken(&self, name: &str, exclude_id: Option<&str>) -> bool {
        let lowered = name.to_lowercase();
        self.accounts.iter().any(|account| {
            exclude_id != Some(account.id.as_str()) && account.name.to_lowercase() == lowered
        })
    }

    /// If either leg points at a combined account, both legs collapse onto it
    pub fn coerce_combined_legs(&self, account_id: String, entity_id: String) -> (String, String) {
        let account_combined = self
            .account_by_id(&account_id)
            .map_or(false, |a| a.kind.is_combined());
        let entity_combined = self
            .account_by_id(&entity_id)
            .map_or(false, |a| a.kind.is_combined());
        if account_combined {
            (account_id.clone(), account_id)
        } else if entity_combined {
            (entity_id.clone(), entity_id)
        } else {
            (account_id, entity_id)
        }
    }

    /// True final balance for one account: opening plus the adjustment map
    /// matching the account's role
    pub fn account_balance(&self, account: &Account) -> Decimal {
        let adjustment = if account.kind.supports_cash() {
            self.adjustments.cash_for(&account.id)
        } else {
            self.adjustments.entity_for(&account.id)
        };
        account.opening_balance + adjustment
    }

    /// Balance summaries for the accounts dashboard; combined accounts
    /// expose both role balances
    pub fn account_balances(&self) -> Vec<AccountBalance> {
        self.accounts
            .iter()
            .map(|account| {
                let (cash_balance, entity_balance) = if account.kind.is_combined() {
                    (
                        Some(account.opening_balance + self.adjustments.cash_for(&account.id)),
                        Some(account.opening_balance + self.adjustments.entity_for(&account.id)),
                    )
                } else {
                    (None, None)
                };
                AccountBalance {
                    id: account.id.clone(),
                    name: account.name.clone(),
                    kind: account.kind,
                    opening_balance: account.opening_balance,
                    balance: self.account_balance(account),
                    cash_balance,
                    entity_balance,
                    default_cash: account.default_cash,
                    default_entity: account.default_entity,
                }
            })
            .collect()
    }

    /// Fan-out required to keep "at most one default cash/entity account":
    /// every other account currently holding a claimed flag gets it cleared.
    /// Enforced by read-then-batch-write; last write wins under concurrency.
    pub fn default_flag_clears(
        &self,
        account_id: &str,
        default_cash: bool,
        default_entity: bool,
    ) -> Vec<DefaultClear> {
        if !default_cash && !default_entity {
            return Vec::new();
        }
        let mut clears: Vec<DefaultClear> = Vec::new();
        for account in &self.accounts {
            if account.id == account_id {
                continue;
            }
            let clear_cash = default_cash && account.default_cash;
            let clear_entity = default_entity && account.default_entity;
            if clear_cash || clear_entity {
                clears.push(DefaultClear {
                    account_id: account.id.clone(),
                    clear_cash,
                    clear_entity,
                });
            }
        }
        clears
    }

    /// Every entry belonging to a logical transaction: siblings sharing the
    /// transaction id, or the single entry whose own id matches
    pub fn transaction_entries(&self, key: &str) -> Vec<&LedgerEntry> {
        self.entries
            .iter()
            .filter(|entry| entry.transaction_id.as_deref() == Some(key) || entry.id == key)
            .collect()
    }

    /// Locate the expense and income legs of a transfer for atomic editing.
    /// Returns `None` when a sibling leg is missing, in which case the
    /// caller falls back to single-entry edit mode.
    pub fn transfer_legs(&self, transaction_id: &str) -> Option<(&LedgerEntry, &LedgerEntry)> {
        let members: Vec<&LedgerEntry> = self
            .entries
            .iter()
            .filter(|entry| entry.transaction_id.as_deref() == Some(transaction_id))
            .collect();
        if members.len() < 2 {
            return None;
        }
        let expense = members
            .iter()
            .find(|e| e.entry_type == EntryType::Expense)
            .copied()
            .unwrap_or(members[0]);
        let income = members
            .iter()
            .find(|e| e.entry_type == EntryType::Income)
            .copied()
            .or_else(|| members.iter().find(|e| e.id != expense.id).copied())?;
        if expense.account_id.is_empty() || income.account_id.is_empty() {
            return None;
        }
        Some((expense, income))
    }

    /// Render ledger rows using the view's stored filters
    pub fn render_rows(&self) -> Vec<LedgerRow> {
        self.render_rows_with(&self.filters)
    }

    /// Render ledger rows with explicit filters (one-off views)
    pub fn render_rows_with(&self, filters: &LedgerFilters) -> Vec<LedgerRow> {
        let selection = filters.account_selection.as_ref();
        let use_filter = selection
            .map(|set| !set.is_empty() && set.len() < self.accounts.len())
            .unwrap_or(false);
        let selection = if use_filter { selection } else { None };

        let mut visible: Vec<LedgerEntry> = self
            .entries
            .iter()
            .filter(|entry| {
                selection.map_or(true, |set| {
                    set.contains(&entry.account_id)
                        || entry
                            .entity_id
                            .as_ref()
                            .map_or(false, |entity| set.contains(entity))
                })
            })
            .cloned()
            .collect();

        if !filters.tags.is_empty() {
            visible.retain(|entry| {
                if entry.tags.is_empty() {
                    return false;
                }
                let lowered: Vec<String> =
                    entry.tags.iter().map(|t| t.to_lowercase()).collect();
                filters.tags.iter().all(|tag| lowered.contains(tag))
            });
        } else {
            // Opening rows are never shown under a tag filter: they carry no
            // tags, so they could never match one (documented quirk).
            let mut openings = synthesize_opening_entries(&self.accounts, selection);
            openings.append(&mut visible);
            visible = openings;
        }

        if visible.is_empty() {
            return Vec::new();
        }

        visible.sort_by(compare_entries);

        let plans: Vec<RenderPlan> = visible
            .iter()
            .map(|entry| {
                let include_cash = !entry.entity_only
                    && selection.map_or(true, |set| set.contains(&entry.account_id));
                let include_entity = entry.entity_id.as_ref().map_or(false, |entity| {
                    selection.map_or(true, |set| set.contains(entity))
                        && (*entity != entry.account_id || entry.entity_only)
                });
                RenderPlan {
                    include_cash,
                    include_entity,
                    txn_key: entry.txn_key().to_string(),
                    delta: entry_delta(entry),
                }
            })
            .collect();

        let groups = group_transactions(&visible, &plans);

        let mut rows: Vec<LedgerRow> = Vec::new();
        let mut cash_running: HashMap<String, Decimal> = HashMap::new();
        let mut entity_running: HashMap<String, Decimal> = HashMap::new();
        let mut stripes: HashMap<String, Stripe> = HashMap::new();
        let mut stripe_toggle = false;
        let mut actions_rendered: HashSet<String> = HashSet::new();
        let mut render_state: HashMap<String, (usize, usize)> = HashMap::new();

        for (entry, plan) in visible.iter().zip(plans.iter()) {
            let group = groups.get(&plan.txn_key).cloned().unwrap_or_default();
            let state = render_state
                .entry(plan.txn_key.clone())
                .or_insert((0, 0));

            let account = self.accounts.iter().find(|a| a.id == entry.account_id);
            let opening = account.map_or(Decimal::ZERO, |a| a.opening_balance);
            let account_final = self.adjustments.cash_for(&entry.account_id) + opening;
            let previous_cash = cash_running
                .get(&entry.account_id)
                .copied()
                .unwrap_or(account_final);
            let display_amount = if entry.is_virtual_opening {
                opening
            } else {
                plan.delta
            };
            let balance = if entry.is_virtual_opening {
                opening
            } else {
                previous_cash
            };
            cash_running.insert(entry.account_id.clone(), previous_cash - plan.delta);

            let stripe = *stripes.entry(plan.txn_key.clone()).or_insert_with(|| {
                let assigned = if stripe_toggle { Stripe::B } else { Stripe::A };
                stripe_toggle = !stripe_toggle;
                assigned
            });

            let share_cells = plan.include_cash && plan.include_entity;
            let share_transfer_rows = !share_cells && group.is_transfer && group.cash > 1;

            if plan.include_cash {
                let is_primary = !share_transfer_rows || state.0 == 0;
                let lead = if is_primary {
                    let rowspan = if share_cells {
                        2
                    } else if share_transfer_rows {
                        group.cash
                    } else {
                        1
                    };
                    let amount = if share_transfer_rows {
                        transfer_amount_cell(&group)
                    } else {
                        AmountCell::Plain {
                            value: display_amount,
                        }
                    };
                    Some(RowLead {
                        date: entry.date,
                        description: describe_entry(entry),
                        amount,
                        tone: tone_for(display_amount),
                        rowspan,
                        actions: take_actions(entry, &plan.txn_key, &mut actions_rendered),
                    })
                } else {
                    None
                };
                rows.push(LedgerRow {
                    side: RowSide::Cash,
                    txn_key: plan.txn_key.clone(),
                    stripe,
                    lead,
                    account_name: account
                        .map(|a| a.name.clone())
                        .unwrap_or_else(|| "Unknown".to_string()),
                    balance,
                });
                state.0 += 1;
            }

            if plan.include_entity {
                if let Some(entity_id) = &entry.entity_id {
                    let entity = self.accounts.iter().find(|a| &a.id == entity_id);
                    let entity_opening = entity.map_or(Decimal::ZERO, |a| a.opening_balance);
                    let entity_final = self.adjustments.entity_for(entity_id) + entity_opening;
                    let previous_entity = entity_running
                        .get(entity_id)
                        .copied()
                        .unwrap_or(entity_final);
                    let entity_delta = if entry.is_virtual_opening {
                        Decimal::ZERO
                    } else {
                        plan.delta
                    };
                    let entity_display = if entry.is_virtual_opening {
                        entity_opening
                    } else {
                        entity_delta
                    };
                    let entity_balance = if entry.is_virtual_opening {
                        entity_opening
                    } else {
                        previous_entity
                    };
                    entity_running.insert(entity_id.clone(), previous_entity - entity_delta);

                    let actions = take_actions(entry, &plan.txn_key, &mut actions_rendered);
                    let lead = if share_cells {
                        // Covered by the cash row's rowspan.
                        None
                    } else {
                        Some(RowLead {
                            date: entry.date,
                            description: describe_entry(entry),
                            amount: AmountCell::Plain {
                                value: entity_display,
                            },
                            tone: tone_for(entity_display),
                            rowspan: 1,
                            actions,
                        })
                    };
                    rows.push(LedgerRow {
                        side: RowSide::Entity,
                        txn_key: plan.txn_key.clone(),
                        stripe,
                        lead,
                        account_name: entity
                            .map(|a| a.name.clone())
                            .unwrap_or_else(|| "Entity".to_string()),
                        balance: entity_balance,
                    });
                    state.1 += 1;
                }
            }
        }

        rows
    }

    /// Dashboard timeline: the latest logical transactions, skipping groups
    /// that touch combined accounts (their two roles would double-count)
    pub fn recent_transactions(&self, limit: usize) -> Vec<TransactionSummary> {
        struct Group<'a> {
            entries: Vec<&'a LedgerEntry>,
            date_millis: i64,
            description: String,
        }

        let mut grouped: HashMap<String, Group<'_>> = HashMap::new();
        let mut blocked: HashSet<String> = HashSet::new();

        for entry in &self.entries {
            if entry.is_virtual_opening {
                continue;
            }
            let key = entry.txn_key().to_string();
            if key.is_empty() || blocked.contains(&key) {
                continue;
            }
            let account = self.account_by_id(&entry.account_id);
            let entity = entry
                .entity_id
                .as_ref()
                .and_then(|id| self.account_by_id(id));
            if account.map_or(false, |a| a.kind.is_combined())
                || entity.map_or(false, |a| a.kind.is_combined())
            {
                blocked.insert(key.clone());
                grouped.remove(&key);
                continue;
            }
            let millis = entry.recorded_millis();
            let description = entry
                .description
                .clone()
                .filter(|d| !d.is_empty())
                .or_else(|| entry.category.clone())
                .unwrap_or_else(|| "Ledger entry".to_string());
            let group = grouped.entry(key).or_insert_with(|| Group {
                entries: Vec::new(),
                date_millis: millis,
                description: description.clone(),
            });
            group.entries.push(entry);
            if millis > group.date_millis {
                group.date_millis = millis;
                group.description = description;
            }
        }

        let mut summaries: Vec<TransactionSummary> = grouped
            .into_iter()
            .map(|(key, group)| self.summarize_group(key, group.entries, group.date_millis, group.description))
            .collect();
        summaries.sort_by(|a, b| b.date_millis.cmp(&a.date_millis));
        summaries.truncate(limit);
        summaries
    }

    fn summarize_group(
        &self,
        txn_key: String,
        entries: Vec<&LedgerEntry>,
        date_millis: i64,
        description: String,
    ) -> TransactionSummary {
        let mut impacts: Vec<TransactionImpact> = Vec::new();
        for entry in &entries {
            if !entry.entity_only {
                if let Some(account) = self.account_by_id(&entry.account_id) {
                    if !account.kind.is_combined() {
                        impacts.push(TransactionImpact {
                            label: account.name.clone(),
                            side: RowSide::Cash,
                            amount: entry_delta(entry),
                        });
                    }
                }
            }
            if let Some(entity_id) = &entry.entity_id {
                if let Some(entity) = self.account_by_id(entity_id) {
                    if !entity.kind.is_combined() {
                        impacts.push(TransactionImpact {
                            label: entity.name.clone(),
                            side: RowSide::Entity,
                            amount: entry_delta(entry),
                        });
                    }
                }
            }
        }
        let is_transfer =
            impacts.len() == 2 && impacts.iter().all(|impact| impact.side == RowSide::Cash);
        let category = entries.iter().find_map(|e| e.category.clone());
        let amount = impacts
            .iter()
            .find(|impact| impact.amount != Decimal::ZERO)
            .or_else(|| impacts.first())
            .map(|impact| impact.amount)
            .unwrap_or(Decimal::ZERO);
        TransactionSummary {
            txn_key,
            date_millis,
            description,
            category,
            impacts,
            is_transfer,
            amount,
            is_positive: amount >= Decimal::ZERO,
        }
    }
}

// ==================== Transaction Grouper ====================

/// Group entries by transaction key, counting included legs and collecting
/// transfer deltas for the shared debit/credit cell
fn group_transactions(entries: &[LedgerEntry], plans: &[RenderPlan]) -> HashMap<String, TxnGroup> {
    let mut groups: HashMap<String, TxnGroup> = HashMap::new();
    for (entry, plan) in entries.iter().zip(plans.iter()) {
        let group = groups.entry(plan.txn_key.clone()).or_default();
        if plan.include_cash {
            group.cash += 1;
        }
        if plan.include_entity {
            group.entity += 1;
        }
        if entry.category.as_deref() == Some("Transfer") {
            group.is_transfer = true;
            group.transfer_deltas.push(plan.delta);
        }
    }
    groups
}

/// Combined debit/credit cell for a multi-leg cash transfer: the negative
/// member renders as "out", the positive as "in". When only one is present
/// (transiently malformed data) the other mirrors its magnitude.
fn transfer_amount_cell(group: &TxnGroup) -> AmountCell {
    let debit = group
        .transfer_deltas
        .iter()
        .copied()
        .find(|d| *d < Decimal::ZERO)
        .unwrap_or(Decimal::ZERO);
    let credit = group
        .transfer_deltas
        .iter()
        .copied()
        .find(|d| *d > Decimal::ZERO)
        .unwrap_or(Decimal::ZERO);
    let magnitude_out = if debit != Decimal::ZERO { debit } else { credit };
    let magnitude_in = if credit != Decimal::ZERO { credit } else { debit };
    AmountCell::Transfer {
        debit: -magnitude_out.abs(),
        credit: magnitude_in.abs(),
    }
}

// ==================== Running-Balance Renderer helpers ====================

/// Ordering is load-bearing: it determines which row sees which running
/// balance first. Date descending, then transaction key, then cash rows
/// before entity-only rows, then account id.
fn compare_entries(a: &LedgerEntry, b: &LedgerEntry) -> Ordering {
    match b.date_millis().cmp(&a.date_millis()) {
        Ordering::Equal => {}
        other => return other,
    }
    match a.txn_key().cmp(b.txn_key()) {
        Ordering::Equal => {}
        other => return other,
    }
    let a_cash = !a.entity_only;
    let b_cash = !b.entity_only;
    if a_cash != b_cash {
        return if a_cash { Ordering::Less } else { Ordering::Greater };
    }
    a.account_id.cmp(&b.account_id)
}

fn tone_for(amount: Decimal) -> AmountTone {
    match amount.cmp(&Decimal::ZERO) {
        Ordering::Greater => AmountTone::Positive,
        Ordering::Less => AmountTone::Negative,
        Ordering::Equal => AmountTone::Neutral,
    }
}

fn describe_entry(entry: &LedgerEntry) -> String {
    entry
        .description
        .clone()
        .filter(|d| !d.is_empty())
        .or_else(|| entry.category.clone())
        .unwrap_or_else(|| "Entry".to_string())
}

/// Edit/delete controls render once per visible transaction group and never
/// on virtual opening rows
fn take_actions(
    entry: &LedgerEntry,
    txn_key: &str,
    rendered: &mut HashSet<String>,
) -> Option<RowActions> {
    if entry.is_virtual_opening {
        return None;
    }
    if !rendered.insert(txn_key.to_string()) {
        return None;
    }
    Some(RowActions {
        entry_id: entry.id.clone(),
        txn_key: txn_key.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn date(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn account(id: &str, name: &str, kind: AccountKind, opening: &str) -> Account {
        Account {
            id: id.to_string(),
            name: name.to_string(),
            kind,
            opening_balance: dec(opening),
            opening_date: Some(date(2024, 1, 1)),
            created_at: None,
            default_cash: false,
            default_entity: false,
        }
    }

    fn entry(
        id: &str,
        txn: &str,
        account_id: &str,
        entity_id: Option<&str>,
        entry_type: EntryType,
        amount: &str,
        day: u32,
    ) -> LedgerEntry {
        LedgerEntry {
            id: id.to_string(),
            transaction_id: Some(txn.to_string()),
            account_id: account_id.to_string(),
            entity_id: entity_id.map(|s| s.to_string()),
            entry_type,
            amount: dec(amount),
            date: Some(date(2024, 6, day)),
            ..Default::default()
        }
    }

    fn view(accounts: Vec<Account>, entries: Vec<LedgerEntry>) -> LedgerView {
        let mut view = LedgerView::new();
        view.apply_accounts_snapshot(accounts);
        view.apply_entries_snapshot(entries);
        view
    }

    #[test]
    fn test_delta_sign_combinations() {
        let mut e = entry("e", "t", "a", None, EntryType::Expense, "40", 1);
        assert_eq!(entry_delta(&e), dec("-40"));
        e.entry_type = EntryType::Income;
        assert_eq!(entry_delta(&e), dec("40"));
        e.is_return = true;
        assert_eq!(entry_delta(&e), dec("-40"));
        e.entry_type = EntryType::Expense;
        assert_eq!(entry_delta(&e), dec("40"));
    }

    #[test]
    fn test_virtual_opening_delta_is_zero() {
        let mut e = entry("opening-a", "opening-a", "a", None, EntryType::Income, "500", 1);
        e.is_virtual_opening = true;
        assert_eq!(entry_delta(&e), Decimal::ZERO);
    }

    #[test]
    fn test_transfer_neutrality() {
        let out = entry("e1", "t1", "a", None, EntryType::Expense, "75.50", 2);
        let into = entry("e2", "t1", "b", None, EntryType::Income, "75.50", 2);
        assert_eq!(entry_delta(&out) + entry_delta(&into), Decimal::ZERO);
    }

    #[test]
    fn test_combined_account_feeds_both_maps() {
        let e = entry("e1", "t1", "c", Some("c"), EntryType::Income, "30", 1);
        let adjustments = calculate_adjustments(&[e]);
        assert_eq!(adjustments.cash_for("c"), dec("30"));
        assert_eq!(adjustments.entity_for("c"), dec("30"));
    }

    #[test]
    fn test_balance_reconstruction_order_independent() {
        let accounts = vec![account("a", "Checking", AccountKind::Cash, "100")];
        let entries = vec![
            entry("e1", "t1", "a", None, EntryType::Expense, "25", 3),
            entry("e2", "t2", "a", None, EntryType::Income, "10", 1),
            entry("e3", "t3", "a", None, EntryType::Expense, "5", 2),
        ];
        let forward = view(accounts.clone(), entries.clone());
        let mut reversed_entries = entries;
        reversed_entries.reverse();
        let reversed = view(accounts, reversed_entries);
        let expected = dec("80");
        assert_eq!(
            forward.account_balance(forward.account_by_id("a").unwrap()),
            expected
        );
        assert_eq!(
            reversed.account_balance(reversed.account_by_id("a").unwrap()),
            expected
        );
    }

    #[test]
    fn test_tag_filter_and_semantics() {
        let mut e = entry("e1", "t1", "a", None, EntryType::Expense, "10", 1);
        e.tags = vec!["a".to_string(), "B".to_string(), "c".to_string()];
        let v = view(vec![account("a", "Checking", AccountKind::Cash, "0")], vec![e]);

        let mut filters = LedgerFilters::default();
        filters.set_tags(vec!["#A".to_string(), "b".to_string()]);
        assert_eq!(v.render_rows_with(&filters).len(), 1);

        filters.set_tags(vec!["a".to_string(), "d".to_string()]);
        assert!(v.render_rows_with(&filters).is_empty());
    }

    #[test]
    fn test_tag_filter_suppresses_opening_rows() {
        // Documented quirk: opening rows carry no tags so any tag filter
        // hides them, even for accounts the filter would otherwise show.
        let mut e = entry("e1", "t1", "a", None, EntryType::Expense, "10", 1);
        e.tags = vec!["boat".to_string()];
        let v = view(vec![account("a", "Checking", AccountKind::Cash, "500")], vec![e]);

        let unfiltered = v.render_rows();
        assert!(unfiltered
            .iter()
            .any(|row| row.txn_key.starts_with("opening-")));

        let mut filters = LedgerFilters::default();
        filters.set_tags(vec!["boat".to_string()]);
        let filtered = v.render_rows_with(&filters);
        assert_eq!(filtered.len(), 1);
        assert!(!filtered[0].txn_key.starts_with("opening-"));
    }

    #[test]
    fn test_render_order_deterministic() {
        let accounts = vec![
            account("a", "Checking", AccountKind::Cash, "0"),
            account("b", "Savings", AccountKind::Cash, "0"),
        ];
        let entries = vec![
            entry("e1", "t2", "b", None, EntryType::Income, "10", 5),
            entry("e2", "t1", "a", None, EntryType::Expense, "20", 5),
            entry("e3", "t3", "a", None, EntryType::Income, "30", 7),
        ];
        let v = view(accounts, entries);
        let first = v.render_rows();
        for _ in 0..5 {
            assert_eq!(v.render_rows(), first);
        }
        // Newest date first; equal dates break ties on transaction key.
        let keys: Vec<&str> = first
            .iter()
            .filter(|r| !r.txn_key.starts_with("opening-"))
            .map(|r| r.txn_key.as_str())
            .collect();
        assert_eq!(keys, vec!["t3", "t1", "t2"]);
    }

    #[test]
    fn test_end_to_end_running_balance() {
        // Opening $500, expense $120, income $50 marked as a return:
        // final balance 500 - 120 - 50 = 330, shown before the expense row.
        let accounts = vec![account("a", "Checking", AccountKind::Cash, "500")];
        let mut refund = entry("e2", "t2", "a", None, EntryType::Income, "50", 3);
        refund.is_return = true;
        let entries = vec![
            entry("e1", "t1", "a", None, EntryType::Expense, "120", 5),
            refund,
        ];
        let v = view(accounts, entries);
        assert_eq!(
            v.account_balance(v.account_by_id("a").unwrap()),
            dec("330")
        );

        let rows = v.render_rows();
        assert_eq!(rows.len(), 3);
        // Newest first: the expense row sees the true final balance.
        assert_eq!(rows[0].txn_key, "t1");
        assert_eq!(rows[0].balance, dec("330"));
        // The return row sees the balance before the expense landed.
        assert_eq!(rows[1].txn_key, "t2");
        assert_eq!(rows[1].balance, dec("450"));
        // Opening row sits oldest with the opening balance.
        assert_eq!(rows[2].txn_key, "opening-a");
        assert_eq!(rows[2].balance, dec("500"));
    }

    #[test]
    fn test_shared_cell_rowspan_for_cash_entity_pair() {
        let accounts = vec![
            account("a", "Checking", AccountKind::Cash, "0"),
            account("o", "Owner", AccountKind::Entity, "0"),
        ];
        let entries = vec![entry(
            "e1",
            "t1",
            "a",
            Some("o"),
            EntryType::Expense,
            "40",
            2,
        )];
        let v = view(accounts, entries);
        let rows: Vec<LedgerRow> = v
            .render_rows()
            .into_iter()
            .filter(|r| r.txn_key == "t1")
            .collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].side, RowSide::Cash);
        let lead = rows[0].lead.as_ref().unwrap();
        assert_eq!(lead.rowspan, 2);
        assert!(lead.actions.is_some());
        // Entity row is covered by the cash row's rowspan.
        assert_eq!(rows[1].side, RowSide::Entity);
        assert!(rows[1].lead.is_none());
        // Both rows share the transaction stripe.
        assert_eq!(rows[0].stripe, rows[1].stripe);
    }

    #[test]
    fn test_transfer_sibling_rows_share_amount_cell() {
        let accounts = vec![
            account("a", "Checking", AccountKind::Cash, "0"),
            account("b", "Savings", AccountKind::Cash, "0"),
        ];
        let mut out = entry("e1", "t1", "a", None, EntryType::Expense, "200", 2);
        out.category = Some("Transfer".to_string());
        let mut into = entry("e2", "t1", "b", None, EntryType::Income, "200", 2);
        into.category = Some("Transfer".to_string());
        let v = view(accounts, vec![out, into]);
        let rows: Vec<LedgerRow> = v
            .render_rows()
            .into_iter()
            .filter(|r| r.txn_key == "t1")
            .collect();
        assert_eq!(rows.len(), 2);
        let lead = rows[0].lead.as_ref().unwrap();
        assert_eq!(lead.rowspan, 2);
        assert_eq!(
            lead.amount,
            AmountCell::Transfer {
                debit: dec("-200"),
                credit: dec("200"),
            }
        );
        // Sibling leg renders under the shared description.
        assert!(rows[1].lead.is_none());
    }

    #[test]
    fn test_actions_emitted_once_per_transaction() {
        let accounts = vec![
            account("a", "Checking", AccountKind::Cash, "0"),
            account("o", "Owner", AccountKind::Entity, "0"),
        ];
        let entries = vec![entry(
            "e1",
            "t1",
            "a",
            Some("o"),
            EntryType::Income,
            "10",
            2,
        )];
        let v = view(accounts, entries);
        let rows = v.render_rows();
        let action_count = rows
            .iter()
            .filter_map(|r| r.lead.as_ref())
            .filter(|lead| lead.actions.is_some())
            .count();
        assert_eq!(action_count, 1);
        // Opening rows never carry actions.
        assert!(rows
            .iter()
            .filter(|r| r.txn_key.starts_with("opening-"))
            .all(|r| r.lead.as_ref().map_or(true, |l| l.actions.is_none())));
    }

    #[test]
    fn test_group_delete_targets() {
        let accounts = vec![
            account("a", "Checking", AccountKind::Cash, "100"),
            account("b", "Savings", AccountKind::Cash, "50"),
        ];
        let mut out = entry("e1", "t1", "a", None, EntryType::Expense, "20", 2);
        out.category = Some("Transfer".to_string());
        let mut into = entry("e2", "t1", "b", None, EntryType::Income, "20", 2);
        into.category = Some("Transfer".to_string());
        let other = entry("e3", "t2", "a", None, EntryType::Income, "5", 3);
        let v = view(accounts.clone(), vec![out, into, other.clone()]);

        let targets = v.transaction_entries("t1");
        let ids: Vec<&str> = targets.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["e1", "e2"]);

        // After deleting the group, balances equal the pre-transfer state.
        let after = view(accounts, vec![other]);
        assert_eq!(
            after.account_balance(after.account_by_id("a").unwrap()),
            dec("105")
        );
        assert_eq!(
            after.account_balance(after.account_by_id("b").unwrap()),
            dec("50")
        );
    }

    #[test]
    fn test_transfer_legs_lookup_and_fallback() {
        let out = entry("e1", "t1", "a", None, EntryType::Expense, "20", 2);
        let into = entry("e2", "t1", "b", None, EntryType::Income, "20", 2);
        let lonely = entry("e3", "t2", "a", None, EntryType::Expense, "9", 2);
        let v = view(
            vec![account("a", "Checking", AccountKind::Cash, "0")],
            vec![out, into, lonely],
        );
        let (expense, income) = v.transfer_legs("t1").unwrap();
        assert_eq!(expense.id, "e1");
        assert_eq!(income.id, "e2");
        // Missing sibling leg falls back to single-entry editing.
        assert!(v.transfer_legs("t2").is_none());
    }

    #[test]
    fn test_combined_leg_coercion() {
        let v = view(
            vec![
                account("a", "Checking", AccountKind::Cash, "0"),
                account("c", "Shop till", AccountKind::CashEntity, "0"),
            ],
            Vec::new(),
        );
        assert_eq!(
            v.coerce_combined_legs("c".to_string(), "a".to_string()),
            ("c".to_string(), "c".to_string())
        );
        assert_eq!(
            v.coerce_combined_legs("a".to_string(), "c".to_string()),
            ("c".to_string(), "c".to_string())
        );
    }

    #[test]
    fn test_default_flag_fanout() {
        let mut a = account("a", "Checking", AccountKind::Cash, "0");
        a.default_cash = true;
        let mut o = account("o", "Owner", AccountKind::Entity, "0");
        o.default_entity = true;
        let b = account("b", "Savings", AccountKind::Cash, "0");
        let v = view(vec![a, o, b], Vec::new());

        let clears = v.default_flag_clears("b", true, true);
        assert_eq!(clears.len(), 2);
        assert!(clears.contains(&DefaultClear {
            account_id: "a".to_string(),
            clear_cash: true,
            clear_entity: false,
        }));
        assert!(clears.contains(&DefaultClear {
            account_id: "o".to_string(),
            clear_cash: false,
            clear_entity: true,
        }));
        assert!(v.default_flag_clears("b", false, false).is_empty());
    }

    #[test]
    fn test_account_selection_filter_keeps_either_leg() {
        let accounts = vec![
            account("a", "Checking", AccountKind::Cash, "0"),
            account("b", "Savings", AccountKind::Cash, "0"),
            account("o", "Owner", AccountKind::Entity, "0"),
        ];
        let entries = vec![
            entry("e1", "t1", "a", Some("o"), EntryType::Expense, "10", 2),
            entry("e2", "t2", "b", None, EntryType::Income, "5", 3),
        ];
        let v = view(accounts, entries);
        let mut filters = LedgerFilters::default();
        filters.account_selection = Some(["o".to_string()].into_iter().collect());
        let rows = v.render_rows_with(&filters);
        // Only the entity leg of e1 and Owner's opening row survive.
        assert!(rows.iter().all(|r| r.account_name == "Owner"));
        assert!(rows.iter().any(|r| r.txn_key == "t1"));
        assert!(!rows.iter().any(|r| r.txn_key == "t2"));
    }

    #[test]
    fn test_recent_transactions_skip_combined_and_sort() {
        let accounts = vec![
            account("a", "Checking", AccountKind::Cash, "0"),
            account("b", "Savings", AccountKind::Cash, "0"),
            account("c", "Till", AccountKind::CashEntity, "0"),
        ];
        let mut t1a = entry("e1", "t1", "a", None, EntryType::Expense, "30", 2);
        t1a.category = Some("Transfer".to_string());
        let mut t1b = entry("e2", "t1", "b", None, EntryType::Income, "30", 2);
        t1b.category = Some("Transfer".to_string());
        let combined = entry("e3", "t2", "c", Some("c"), EntryType::Income, "99", 5);
        let newest = entry("e4", "t3", "a", None, EntryType::Income, "12", 9);
        let v = view(accounts, vec![t1a, t1b, combined, newest]);

        let recent = v.recent_transactions(10);
        let keys: Vec<&str> = recent.iter().map(|s| s.txn_key.as_str()).collect();
        assert_eq!(keys, vec!["t3", "t1"]);
        assert!(recent[1].is_transfer);
        assert_eq!(recent[1].impacts.len(), 2);
    }
}
