//! User profile returned by `/api/v2/users/me`.

use serde::{Deserialize, Serialize};

use super::envelope::null_as_default;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
#[allow(clippy::struct_excessive_bools)]
pub struct UserInfo {
    #[serde(deserialize_with = "null_as_default")]
    pub uuid: String,
    #[serde(deserialize_with = "null_as_default")]
    pub first_name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub last_name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub email: String,
    #[serde(deserialize_with = "null_as_default")]
    pub phone: String,
    #[serde(deserialize_with = "null_as_default")]
    pub username: String,

    pub middle_name: Option<String>,
    pub profile_pic: Option<String>,

    #[serde(deserialize_with = "null_as_default")]
    pub email_verified: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub phone_verified: bool,

    #[serde(deserialize_with = "null_as_default")]
    pub google_linked: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub apple_linked: bool,

    #[serde(deserialize_with = "null_as_default")]
    pub role: String,
    #[serde(deserialize_with = "null_as_default")]
    pub is_internal_user: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub beta_access: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub web_beta_access: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub cc_enabled: bool,

    #[serde(deserialize_with = "null_as_default")]
    pub timezone: String,
    #[serde(deserialize_with = "null_as_default")]
    pub created_at: String,
    #[serde(deserialize_with = "null_as_default")]
    pub updated_at: String,
}

impl UserInfo {
    pub fn full_name(&self) -> String {
        let mut name = self.first_name.clone();
        if let Some(middle) = self.middle_name.as_deref().filter(|m| !m.is_empty()) {
            name.push(' ');
            name.push_str(middle);
        }
        if !self.last_name.is_empty() {
            name.push(' ');
            name.push_str(&self.last_name);
        }
        name
    }
}

/// `data` section of `/api/v2/users/me`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UserData {
    #[serde(deserialize_with = "null_as_default")]
    pub user: UserInfo,
    #[serde(deserialize_with = "null_as_default")]
    pub route: String,
}
