use crate::engine::{
    application_object, membership_tuples, EngineClient, EngineError, TupleKey, TupleKeys,
    CAN_ACCESS_RELATION,
};
use log::debug;
use serde::{Deserialize, Serialize};

/// Request body of a single relationship check
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct CheckRequest {
    pub tuple_key: TupleKey,
    pub contextual_tuples: TupleKeys,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization_model_id: Option<String>,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct CheckResponse {
    pub allowed: bool,
}

impl EngineClient {
    /// Check whether `subject` may access the application `app_client_id`,
    /// asserting its membership in `group_ids` for this evaluation only.
    pub async fn can_access(
        &self,
        subject: &str,
        app_client_id: &str,
        group_ids: &[String],
    ) -> Result<bool, EngineError> {
        let request = CheckRequest {
            tuple_key: TupleKey::new(
                subject,
                CAN_ACCESS_RELATION,
                application_object(app_client_id),
            ),
            contextual_tuples: membership_tuples(subject, group_ids),
            authorization_model_id: self.model_id().map(str::to_string),
        };

        let response: CheckResponse = self.send_request("/check", &request).await?;
        debug!(
            "Engine check for {} on {}: allowed={}",
            subject, app_client_id, response.allowed
        );
        Ok(response.allowed)
    }
}
