use serde::{Deserialize, Serialize};

/// The authenticated principal of a request.
///
/// Inserted into request extensions by the authentication layer in front of
/// [`super::AuthzLayer`]. An empty `account_id` means no account scope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: String,
    #[serde(default)]
    pub account_id: String,
}

impl Actor {
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            account_id: String::new(),
        }
    }

    pub fn in_account(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = account_id.into();
        self
    }
}
