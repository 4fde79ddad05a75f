use crate::engine::{EngineClient, EngineError};
use crate::models::hook::{TokenHookRequest, CLIENT_CREDENTIALS_GRANT, JWT_BEARER_GRANT};
use crate::models::{Group, Principal, TokenHookContext};
use crate::providers::{GroupsProvider, ProviderError};
use futures::future::try_join_all;
use log::{debug, info, warn};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use validator::ValidateEmail;

const EMAIL_CLAIM: &str = "email";

/// Verdict for one token request
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Issue the token with these group names added to its claims
    Allow { groups: Vec<String> },
    Deny,
}

#[derive(Debug, Error)]
enum PipelineError {
    #[error("group provider {provider} failed: {source}")]
    Provider {
        provider: &'static str,
        source: ProviderError,
    },
    #[error("access evaluation failed: {0}")]
    Engine(#[from] EngineError),
}

fn is_machine_grant(grant_type: &str) -> bool {
    grant_type == CLIENT_CREDENTIALS_GRANT || grant_type == JWT_BEARER_GRANT
}

/// Turns token hook calls into allow or deny verdicts.
///
/// Read-only over the directory; every failure ends in [`Decision::Deny`].
#[derive(Clone)]
pub struct TokenHookPipeline {
    providers: Vec<Arc<dyn GroupsProvider>>,
    engine: EngineClient,
}

impl TokenHookPipeline {
    pub fn new(providers: Vec<Arc<dyn GroupsProvider>>, engine: EngineClient) -> Self {
        Self { providers, engine }
    }

    /// Work out who the token is for.
    ///
    /// A request made with exactly one machine grant is a service account;
    /// anything else is an interactive user whose email comes from the
    /// session claims when present and well formed.
    pub fn derive_principal(request: &TokenHookRequest) -> Principal {
        let grant_types = &request.request.grant_types;
        if let [grant_type] = grant_types.as_slice() {
            if is_machine_grant(grant_type) {
                return Principal::ServiceAccount {
                    client_id: request.request.client_id.clone(),
                };
            }
        }

        let email = request
            .session
            .claims
            .get(EMAIL_CLAIM)
            .and_then(|value| value.as_str())
            .map(str::trim)
            .filter(|email| email.validate_email())
            .map(str::to_string);

        Principal::InteractiveUser {
            subject_id: request.session.subject.clone(),
            email,
        }
    }

    pub fn context(request: &TokenHookRequest) -> TokenHookContext {
        TokenHookContext {
            principal: Self::derive_principal(request),
            requested_client_id: request.request.client_id.clone(),
            grant_types: request.request.grant_types.clone(),
            granted_audiences: request.request.granted_audience.clone(),
        }
    }

    /// Query every provider concurrently and merge the results.
    ///
    /// Groups are deduplicated by name, keeping the first occurrence in
    /// provider order. Any provider error fails the whole aggregation.
    async fn aggregate_groups(&self, principal: &Principal) -> Result<Vec<Group>, PipelineError> {
        let lookups = self.providers.iter().map(|provider| async move {
            provider
                .fetch_groups(principal)
                .await
                .map_err(|source| PipelineError::Provider {
                    provider: provider.name(),
                    source,
                })
        });
        let results = try_join_all(lookups).await?;

        let mut seen = HashSet::new();
        Ok(results
            .into_iter()
            .flatten()
            .filter(|group| seen.insert(group.name.clone()))
            .collect())
    }

    async fn evaluate(
        &self,
        context: &TokenHookContext,
        groups: &[Group],
    ) -> Result<bool, EngineError> {
        let subject = context.principal.to_string();
        let group_ids: Vec<String> = groups.iter().map(|g| g.id.clone()).collect();

        match &context.principal {
            Principal::InteractiveUser { .. } => {
                self.engine
                    .can_access(&subject, &context.requested_client_id, &group_ids)
                    .await
            }
            Principal::ServiceAccount { .. } => {
                self.engine
                    .batch_can_access(&subject, &context.granted_audiences, &group_ids)
                    .await
            }
        }
    }

    async fn run(&self, context: &TokenHookContext) -> Result<Decision, PipelineError> {
        let groups = self.aggregate_groups(&context.principal).await?;
        debug!(
            "{} belongs to {} groups",
            context.principal,
            groups.len()
        );

        if !self.evaluate(context, &groups).await? {
            return Ok(Decision::Deny);
        }
        Ok(Decision::Allow {
            groups: groups.into_iter().map(|g| g.name).collect(),
        })
    }

    /// Decide a token request. Never fails: errors become [`Decision::Deny`].
    pub async fn decide(&self, request: &TokenHookRequest) -> Decision {
        let context = Self::context(request);

        match self.run(&context).await {
            Ok(Decision::Allow { groups }) => {
                info!(
                    "Allowed token for {} on {}",
                    context.principal, context.requested_client_id
                );
                Decision::Allow { groups }
            }
            Ok(Decision::Deny) => {
                warn!(
                    "Denied token for {} on {}: not allowed",
                    context.principal, context.requested_client_id
                );
                Decision::Deny
            }
            Err(err) => {
                warn!(
                    "Denied token for {} on {}: {}",
                    context.principal, context.requested_client_id, err
                );
                Decision::Deny
            }
        }
    }
}
