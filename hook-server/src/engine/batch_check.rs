use crate::engine::{
    application_object, membership_tuples, EngineClient, EngineError, TupleKey, TupleKeys,
    CAN_ACCESS_RELATION,
};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct BatchCheckItem {
    pub tuple_key: TupleKey,
    pub contextual_tuples: TupleKeys,
    pub correlation_id: String,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct BatchCheckRequest {
    pub checks: Vec<BatchCheckItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization_model_id: Option<String>,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct BatchCheckSingleResult {
    #[serde(default)]
    pub allowed: bool,
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct BatchCheckResponse {
    #[serde(default)]
    pub result: HashMap<String, BatchCheckSingleResult>,
}

impl EngineClient {
    /// Check `subject` against every audience in one round trip.
    ///
    /// The result is the conjunction of the individual checks. An empty
    /// audience list is never allowed, and any check the engine could not
    /// evaluate is reported as an error.
    pub async fn batch_can_access(
        &self,
        subject: &str,
        audiences: &[String],
        group_ids: &[String],
    ) -> Result<bool, EngineError> {
        if audiences.is_empty() {
            debug!("Batch check for {} has no audiences, denying", subject);
            return Ok(false);
        }

        let contextual_tuples = membership_tuples(subject, group_ids);
        let checks = audiences
            .iter()
            .enumerate()
            .map(|(index, audience)| BatchCheckItem {
                tuple_key: TupleKey::new(
                    subject,
                    CAN_ACCESS_RELATION,
                    application_object(audience),
                ),
                contextual_tuples: contextual_tuples.clone(),
                correlation_id: index.to_string(),
            })
            .collect();
        let request = BatchCheckRequest {
            checks,
            authorization_model_id: self.model_id().map(str::to_string),
        };

        let response: BatchCheckResponse = self.send_request("/batch-check", &request).await?;

        let mut allowed = true;
        for (index, audience) in audiences.iter().enumerate() {
            let correlation_id = index.to_string();
            let result = response.result.get(&correlation_id).ok_or_else(|| {
                EngineError::CheckFailed(audience.clone(), "missing from response".to_string())
            })?;
            if let Some(error) = &result.error {
                warn!("Engine failed to evaluate {} for {}: {}", audience, subject, error);
                return Err(EngineError::CheckFailed(audience.clone(), error.to_string()));
            }
            allowed &= result.allowed;
        }

        debug!(
            "Engine batch check for {} on {:?}: allowed={}",
            subject, audiences, allowed
        );
        Ok(allowed)
    }
}
