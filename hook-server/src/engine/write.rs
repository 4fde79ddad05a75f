use crate::engine::{
    application_object, group_members, EngineClient, EngineError, TupleKey, TupleKeys,
    CAN_ACCESS_RELATION,
};
use crate::models::AppAllowlistEntry;
use log::debug;
use serde::Serialize;

#[derive(Debug, Serialize, Clone, PartialEq, Default)]
pub struct WriteRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub writes: Option<TupleKeys>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deletes: Option<TupleKeys>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization_model_id: Option<String>,
}

/// Tuple granting every member of the entry's group access to its application
pub fn allowlist_tuple(entry: &AppAllowlistEntry) -> TupleKey {
    TupleKey::new(
        group_members(&entry.group_id),
        CAN_ACCESS_RELATION,
        application_object(&entry.app_client_id),
    )
}

fn tuple_keys(entries: &[AppAllowlistEntry]) -> Option<TupleKeys> {
    if entries.is_empty() {
        return None;
    }
    Some(TupleKeys {
        tuple_keys: entries.iter().map(allowlist_tuple).collect(),
    })
}

impl EngineClient {
    async fn write(&self, request: WriteRequest) -> Result<(), EngineError> {
        // The engine answers writes with an empty object; the body is not needed.
        self.post("/write", &request).await?;
        Ok(())
    }

    /// Mirror newly allowed applications into the engine
    pub async fn allow_apps(&self, entries: &[AppAllowlistEntry]) -> Result<(), EngineError> {
        let Some(writes) = tuple_keys(entries) else {
            return Ok(());
        };
        debug!("Writing {} allow-list tuples to engine", writes.tuple_keys.len());
        self.write(WriteRequest {
            writes: Some(writes),
            authorization_model_id: self.model_id().map(str::to_string),
            ..Default::default()
        })
        .await
    }

    /// Remove allow-list tuples from the engine
    pub async fn disallow_apps(&self, entries: &[AppAllowlistEntry]) -> Result<(), EngineError> {
        let Some(deletes) = tuple_keys(entries) else {
            return Ok(());
        };
        debug!("Deleting {} allow-list tuples from engine", deletes.tuple_keys.len());
        self.write(WriteRequest {
            deletes: Some(deletes),
            authorization_model_id: self.model_id().map(str::to_string),
            ..Default::default()
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestFixture;
    use http::{Method, StatusCode};
    use serde_json::json;
    use wiremock::{matchers, Mock, ResponseTemplate};

    #[test]
    fn test_allowlist_tuple() {
        let tuple = allowlist_tuple(&AppAllowlistEntry::new("g1", "console"));
        assert_eq!(tuple.user, "group:g1#member");
        assert_eq!(tuple.relation, "can_access");
        assert_eq!(tuple.object, "application:console");
    }

    #[tokio::test]
    async fn test_allow_apps_writes_tuples() {
        let fixture = TestFixture::new().await;

        Mock::given(matchers::method("POST"))
            .and(matchers::path("/stores/test-store/write"))
            .and(matchers::body_json(json!({
                "writes": {
                    "tuple_keys": [
                        {
                            "user": "group:g1#member",
                            "relation": "can_access",
                            "object": "application:console"
                        }
                    ]
                },
                "authorization_model_id": "test-model"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&fixture.engine_mock)
            .await;

        fixture
            .state
            .engine
            .allow_apps(&[AppAllowlistEntry::new("g1", "console")])
            .await
            .unwrap();
        fixture.engine_mock.verify().await;
    }

    #[tokio::test]
    async fn test_disallow_apps_deletes_tuples() {
        let fixture = TestFixture::new().await;

        Mock::given(matchers::method("POST"))
            .and(matchers::path("/stores/test-store/write"))
            .and(matchers::body_partial_json(json!({
                "deletes": {
                    "tuple_keys": [
                        { "user": "group:g1#member", "object": "application:a" },
                        { "user": "group:g1#member", "object": "application:b" }
                    ]
                }
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&fixture.engine_mock)
            .await;

        fixture
            .state
            .engine
            .disallow_apps(&[
                AppAllowlistEntry::new("g1", "a"),
                AppAllowlistEntry::new("g1", "b"),
            ])
            .await
            .unwrap();
        fixture.engine_mock.verify().await;
    }

    #[tokio::test]
    async fn test_empty_write_skips_engine() {
        let fixture = TestFixture::new().await;
        fixture
            .add_engine_mock(Method::POST, "/stores/test-store/write", json!({}), StatusCode::OK, 0)
            .await;

        fixture.state.engine.allow_apps(&[]).await.unwrap();
        fixture.state.engine.disallow_apps(&[]).await.unwrap();
        fixture.engine_mock.verify().await;
    }

    #[tokio::test]
    async fn test_write_failure_is_reported() {
        let fixture = TestFixture::new().await;
        fixture
            .add_engine_mock(
                Method::POST,
                "/stores/test-store/write",
                json!({ "code": "write_failed_due_to_invalid_input" }),
                StatusCode::BAD_REQUEST,
                1,
            )
            .await;

        let result = fixture
            .state
            .engine
            .allow_apps(&[AppAllowlistEntry::new("g1", "console")])
            .await;
        assert!(matches!(
            result,
            Err(EngineError::InvalidStatus(StatusCode::BAD_REQUEST))
        ));
    }
}
