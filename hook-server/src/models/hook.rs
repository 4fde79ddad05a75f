//! Token hook wire format exchanged with the token issuer

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use utoipa::ToSchema;

pub const CLIENT_CREDENTIALS_GRANT: &str = "client_credentials";
pub const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Claim key the group names are published under
pub const GROUPS_CLAIM: &str = "groups";

/// Payload posted by the token issuer before it mints a token
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq)]
pub struct TokenHookRequest {
    /// The session being turned into tokens
    #[serde(default)]
    pub session: HookSession,
    /// The token request itself
    pub request: HookRequest,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq, Default)]
pub struct HookSession {
    /// Subject the session was established for
    #[serde(default)]
    pub subject: String,
    /// Identity claims collected at login
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub claims: HashMap<String, Value>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq)]
pub struct HookRequest {
    /// Client the token is requested by
    pub client_id: String,
    /// Grant types used for this request
    #[serde(default)]
    pub grant_types: Vec<String>,
    /// Audiences granted to the token
    #[serde(default)]
    pub granted_audience: Vec<String>,
    /// Scopes granted to the token
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub granted_scopes: Vec<String>,
}

/// Successful hook response carrying the claims to merge into the session
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq)]
pub struct TokenHookResponse {
    pub session: SessionAugmentation,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq, Default)]
pub struct SessionAugmentation {
    /// Claims added to the access token
    pub access_token: HashMap<String, Value>,
    /// Claims added to the ID token
    pub id_token: HashMap<String, Value>,
}

impl TokenHookResponse {
    /// Publish the group names under the `groups` claim of both tokens
    pub fn with_groups(groups: Vec<String>) -> Self {
        let groups = Value::from(groups);
        let mut session = SessionAugmentation::default();
        session
            .access_token
            .insert(GROUPS_CLAIM.to_string(), groups.clone());
        session.id_token.insert(GROUPS_CLAIM.to_string(), groups);
        Self { session }
    }
}
