//! Basic types for the core ledger module

use serde::{Deserialize, Serialize};

/// Account capability enumeration
///
/// A combined account acts as cash and entity at the same time: a single
/// entry on it contributes to both adjustment maps under the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountKind {
    /// Physical/bank money movement
    Cash,
    /// Logical owner/beneficiary ledger (not cash-backed)
    Entity,
    /// Both roles simultaneously
    CashEntity,
}

impl AccountKind {
    /// Whether entries on this account affect the cash adjustment map
    pub fn supports_cash(&self) -> bool {
        matches!(self, AccountKind::Cash | AccountKind::CashEntity)
    }

    /// Whether entries on this account affect the entity adjustment map
    pub fn supports_entity(&self) -> bool {
        matches!(self, AccountKind::Entity | AccountKind::CashEntity)
    }

    /// Whether this account carries both roles
    pub fn is_combined(&self) -> bool {
        matches!(self, AccountKind::CashEntity)
    }
}

impl Default for AccountKind {
    fn default() -> Self {
        AccountKind::Cash
    }
}

impl std::str::FromStr for AccountKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cash" => Ok(AccountKind::Cash),
            "entity" => Ok(AccountKind::Entity),
            "cash_entity" => Ok(AccountKind::CashEntity),
            _ => Err(format!("Invalid account kind: {}", s)),
        }
    }
}

impl std::fmt::Display for AccountKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccountKind::Cash => write!(f, "cash"),
            AccountKind::Entity => write!(f, "entity"),
            AccountKind::CashEntity => write!(f, "cash_entity"),
        }
    }
}

/// Ledger entry direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    /// Money in (positive delta unless marked as a return)
    Income,
    /// Money out (negative delta unless marked as a return)
    Expense,
}

impl Default for EntryType {
    fn default() -> Self {
        EntryType::Expense
    }
}

impl std::str::FromStr for EntryType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "income" => Ok(EntryType::Income),
            "expense" => Ok(EntryType::Expense),
            _ => Err(format!("Invalid entry type: {}", s)),
        }
    }
}

impl std::fmt::Display for EntryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryType::Income => write!(f, "income"),
            EntryType::Expense => write!(f, "expense"),
        }
    }
}

/// Which leg of an entry a rendered row represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowSide {
    Cash,
    Entity,
}

/// Two-color stripe assigned per transaction group, not per row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stripe {
    A,
    B,
}

impl Stripe {
    /// CSS class used by the table renderer
    pub fn css_class(&self) -> &'static str {
        match self {
            Stripe::A => "txn-stripe-a",
            Stripe::B => "txn-stripe-b",
        }
    }
}

/// Foreground tone for the amount cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AmountTone {
    Positive,
    Negative,
    /// Zero amounts inherit the stripe foreground
    Neutral,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_kind_capabilities() {
        assert!(AccountKind::Cash.supports_cash());
        assert!(!AccountKind::Cash.supports_entity());
        assert!(!AccountKind::Entity.supports_cash());
        assert!(AccountKind::Entity.supports_entity());
        assert!(AccountKind::CashEntity.supports_cash());
        assert!(AccountKind::CashEntity.supports_entity());
        assert!(AccountKind::CashEntity.is_combined());
    }

    #[test]
    fn test_account_kind_round_trip() {
        for kind in [AccountKind::Cash, AccountKind::Entity, AccountKind::CashEntity] {
            let parsed: AccountKind = kind.to_string().parse().unwrap();
            assert_eq!(parsed, kind);
        }
        assert!("savings".parse::<AccountKind>().is_err());
    }

    #[test]
    fn test_entry_type_serde_names() {
        let json = serde_json::to_string(&EntryType::Expense).unwrap();
        assert_eq!(json, "\"expense\"");
        let kind: AccountKind = serde_json::from_str("\"cash_entity\"").unwrap();
        assert_eq!(kind, AccountKind::CashEntity);
    }
}
