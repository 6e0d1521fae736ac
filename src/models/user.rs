use serde::{Deserialize, Serialize};

/// Contact details the fulfillment core reads about a customer or driver.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserContact {
    #[serde(rename = "_id")]
    pub user_id: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub device_token: Option<String>,
}

impl UserContact {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    pub fn push_token(&self) -> Option<&str> {
        self.device_token
            .as_deref()
            .filter(|token| !token.trim().is_empty())
    }
}

/// Identity resolved from the bearer token at the HTTP boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub role: Option<String>,
}

const STAFF_ROLES: [&str; 3] = ["admin", "driver", "refinery"];

impl Principal {
    /// Staff may act on and read any customer's orders and payments.
    pub fn is_staff(&self) -> bool {
        self.role
            .as_deref()
            .map(|role| STAFF_ROLES.contains(&role))
            .unwrap_or(false)
    }
}
