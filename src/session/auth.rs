//! Resume-token authentication.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use super::Shared;
use crate::{
    message::ejson,
    registry::{CallError, MethodCall},
};

/// Method used to log in.
pub const LOGIN_METHOD: &str = "login";
/// Method used to log out.
pub const LOGOUT_METHOD: &str = "logout";

/// Result of a successful `login` call.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct LoginResult {
    /// User id.
    pub id: String,
    /// Fresh resume token.
    pub token: String,
    /// Token expiry as extended JSON.
    #[serde(default, rename = "tokenExpires")]
    pub token_expires: Option<Value>,
}

impl LoginResult {
    /// Token expiry, when the server sent a `$date`.
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.token_expires.as_ref().and_then(ejson::as_date)
    }
}

/// Parameters of a resume login.
///
/// ```
/// use ddpwire::session::resume_params;
/// use serde_json::json;
///
/// assert_eq!(resume_params("abc"), vec![json!({"resume": "abc"})]);
/// ```
#[must_use]
pub fn resume_params(token: &str) -> Vec<Value> { vec![json!({ "resume": token })] }

/// Track a login call and keep the stored token in step with its outcome.
pub(crate) fn watch_login(shared: &Arc<Shared>, call: MethodCall) {
    let shared = Arc::downgrade(shared);
    tokio::spawn(async move {
        let outcome = call.result_as::<LoginResult>().await;
        let Some(shared) = shared.upgrade() else {
            return;
        };
        match outcome {
            Ok(login) => {
                info!(user_id = %login.id, expires = ?login.expires_at(), "logged in");
                shared.set_resume_token(Some(login.token));
            }
            Err(CallError::Method(err)) => {
                warn!(error = %err, "login rejected; resume token discarded");
                shared.set_resume_token(None);
            }
            Err(err) => debug!(error = %err, "login outcome unavailable"),
        }
    });
}
