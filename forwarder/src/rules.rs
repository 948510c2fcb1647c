//! Rule Resolver: inbound recipient → forwarding rule.

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::ForwardError;
use crate::model::ForwardingRule;
use crate::store::RecordStore;

#[derive(Clone)]
pub struct RuleResolver {
    store: Arc<dyn RecordStore>,
}

impl RuleResolver {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Rule whose alias equals `recipient`. First match wins.
    pub async fn resolve(&self, recipient: &str) -> Result<ForwardingRule, ForwardError> {
        match self.store.find_rule_by_email(recipient).await? {
            Some(rule) => {
                info!(
                    recipient = %recipient,
                    rule_id = %rule.id,
                    owner = %rule.owner,
                    "forwarding_rule_resolved"
                );
                Ok(rule)
            }
            None => {
                warn!(recipient = %recipient, "forwarding_rule_not_found");
                Err(ForwardError::NotFound {
                    reason: None,
                    message: "forwarding rule not found".to_string(),
                })
            }
        }
    }
}
