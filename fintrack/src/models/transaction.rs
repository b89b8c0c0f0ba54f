//! Transaction records returned by `/api/v3/users/{id}/transactions`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::envelope::null_as_default;

/// Direction of a transaction as reported by the service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionType {
    Incoming,
    Outgoing,
    #[default]
    #[serde(other)]
    Unknown,
}

impl TransactionType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Incoming => "INCOMING",
            Self::Outgoing => "OUTGOING",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionCategory {
    pub id: Option<String>,
    pub subcategory_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionMerchant {
    pub id: Option<String>,
    pub name: Option<String>,
    #[serde(rename = "type")]
    #[serde(deserialize_with = "null_as_default")]
    pub kind: String,
    pub logo: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionRefund {
    /// e.g. `NONE`.
    #[serde(deserialize_with = "null_as_default")]
    pub status: String,
    #[serde(deserialize_with = "null_as_default")]
    pub notify: bool,
    pub received_on: Option<DateTime<Utc>>,
}

/// A single transaction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
#[allow(clippy::struct_excessive_bools)]
pub struct Transaction {
    #[serde(deserialize_with = "null_as_default")]
    pub uuid: String,
    #[serde(deserialize_with = "null_as_default")]
    pub amount: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub currency: String,
    pub txn_timestamp: Option<DateTime<Utc>>,
    #[serde(rename = "type")]
    #[serde(deserialize_with = "null_as_default")]
    pub direction: TransactionType,
    #[serde(deserialize_with = "null_as_default")]
    pub narration: String,
    /// Payment rail (UPI, FT, CARD, ...).
    #[serde(deserialize_with = "null_as_default")]
    pub mode: String,
    #[serde(deserialize_with = "null_as_default")]
    pub kind: String,

    #[serde(deserialize_with = "null_as_default")]
    pub source_amount: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub source_currency: String,

    #[serde(deserialize_with = "null_as_default")]
    pub account_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub financial_information_provider_id: String,

    pub category: Option<TransactionCategory>,
    pub merchant: Option<TransactionMerchant>,

    #[serde(deserialize_with = "null_as_default")]
    pub transaction_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub reference: String,
    #[serde(deserialize_with = "null_as_default")]
    pub summary: String,
    pub notes: Option<String>,
    pub extracted_time: Option<DateTime<Utc>>,

    #[serde(deserialize_with = "null_as_default")]
    pub excluded_from_cash_flow: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub is_bookmarked: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub is_hidden: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub is_possible_duplicate: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub is_cc_manual_or_bank_linked: bool,

    pub via: Option<String>,
    pub account_in: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub refund: TransactionRefund,
    #[serde(deserialize_with = "null_as_default")]
    pub receipts: Vec<serde_json::Value>,
    pub group_ids: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub source: String,
    pub linked_cc_account_id_for_bill: Option<String>,
    pub linked_cc_transaction_id: Option<String>,
    pub user_manual_added: Option<bool>,
    pub split_type: Option<String>,
    pub remaining_amount: Option<f64>,
    pub parent_transaction_id: Option<String>,
}

impl Transaction {
    /// Merchant name when known, otherwise the bank narration.
    pub fn display_name(&self) -> &str {
        self.merchant
            .as_ref()
            .and_then(|m| m.name.as_deref())
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.narration)
    }

    /// Amount signed by direction: outgoing transactions are negative.
    pub fn signed_amount(&self) -> f64 {
        match self.direction {
            TransactionType::Outgoing => -self.amount,
            _ => self.amount,
        }
    }
}

/// Per-period aggregate returned alongside transactions when `count_by` is set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionCount {
    /// Period key, e.g. `2025-08`.
    #[serde(deserialize_with = "null_as_default")]
    pub date: String,
    #[serde(deserialize_with = "null_as_default")]
    pub total_incoming: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub total_outgoing: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub incoming_count: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub outgoing_count: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub total: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub before_account: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub after_account: i64,
}

/// `data` section of a transaction listing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionPage {
    #[serde(deserialize_with = "null_as_default")]
    pub transactions: Vec<Transaction>,
    #[serde(deserialize_with = "null_as_default")]
    pub counts: Vec<TransactionCount>,
    /// Total matching transactions reported by the server.
    #[serde(deserialize_with = "null_as_default")]
    pub total: u64,
    pub search_summary: Option<String>,
    /// Opaque pagination cursor; empty on the last page.
    #[serde(deserialize_with = "null_as_default")]
    pub after: String,
    pub parent_transactions: Option<serde_json::Value>,
}
