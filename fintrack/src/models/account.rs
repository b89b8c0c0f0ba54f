//! Account records returned by `/api/v1/aa/data`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::envelope::null_as_default;

/// Bank behind an account.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FinancialInformationProvider {
    #[serde(deserialize_with = "null_as_default")]
    pub uuid: String,
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub fip_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub is_valid_time: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub invalid_txn_id: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub logo_url: String,
}

/// A linked bank account.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Account {
    #[serde(deserialize_with = "null_as_default")]
    pub uuid: String,
    #[serde(deserialize_with = "null_as_default")]
    pub holder_name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub masked_account_number: String,
    /// e.g. `deposit`.
    #[serde(rename = "type")]
    #[serde(deserialize_with = "null_as_default")]
    pub kind: String,

    pub account_number: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub account_number_verified: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub ifsc_code: String,
    #[serde(deserialize_with = "null_as_default")]
    pub swift_code: String,
    pub nickname: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub track: String,
    #[serde(deserialize_with = "null_as_default")]
    pub first_pull_completed: bool,

    #[serde(deserialize_with = "null_as_default")]
    pub current_balance: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub currency: String,
    pub last_fetched_at: Option<DateTime<Utc>>,

    #[serde(deserialize_with = "null_as_default")]
    pub financial_information_provider: FinancialInformationProvider,
}

impl Account {
    /// Nickname if set, otherwise the bank name.
    pub fn display_name(&self) -> &str {
        self.nickname
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.financial_information_provider.name)
    }
}

/// `data` section of `/api/v1/aa/data`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountData {
    #[serde(deserialize_with = "null_as_default")]
    pub accounts: Vec<Account>,
}
