//! Seed file loading.
//!
//! Rules and secrets arrive in plaintext and are encrypted by the Secret
//! Vault before they reach the store, so the store never holds plaintext.

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::info;

use super::RecordStore;
use crate::model::{ForwardingRule, SecretKind, StoredSecret};
use crate::vault::SecretVault;

/// On-disk seed format.
#[derive(Debug, Default, Deserialize)]
pub struct SeedFile {
    #[serde(default)]
    pub rules: Vec<SeedRule>,
    #[serde(default)]
    pub webhook_secrets: Vec<SeedWebhookSecret>,
    #[serde(default)]
    pub api_keys: Vec<SeedApiKey>,
}

#[derive(Debug, Deserialize)]
pub struct SeedRule {
    #[serde(default)]
    pub id: String,
    pub owner: String,
    pub rule_email: String,
    pub forward_to_email: String,
    pub send_from_email: String,
}

#[derive(Debug, Deserialize)]
pub struct SeedWebhookSecret {
    pub owner: String,
    pub secret: String,
}

#[derive(Debug, Deserialize)]
pub struct SeedApiKey {
    pub owner: String,
    pub key: String,
}

/// Counts of records loaded from a seed.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub rules: usize,
    pub webhook_secrets: usize,
    pub api_keys: usize,
}

/// Read a seed file from disk and load it into `store`.
pub async fn load_seed(
    path: impl AsRef<Path>,
    vault: &SecretVault,
    store: &dyn RecordStore,
) -> Result<SeedSummary> {
    let path = path.as_ref();
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read seed file {}", path.display()))?;

    let seed: SeedFile = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse seed file {}", path.display()))?;

    apply_seed(seed, vault, store).await
}

/// Encrypt secrets and insert every seeded record.
pub async fn apply_seed(
    seed: SeedFile,
    vault: &SecretVault,
    store: &dyn RecordStore,
) -> Result<SeedSummary> {
    let mut summary = SeedSummary::default();

    for rule in seed.rules {
        store
            .insert_rule(ForwardingRule {
                id: rule.id,
                owner: rule.owner,
                rule_email: rule.rule_email,
                forward_to_email: rule.forward_to_email,
                send_from_email: rule.send_from_email,
            })
            .await
            .context("Failed to insert forwarding rule")?;
        summary.rules += 1;
    }

    for secret in seed.webhook_secrets {
        seal_and_insert(vault, store, secret.owner, SecretKind::WebhookSecret, &secret.secret)
            .await?;
        summary.webhook_secrets += 1;
    }

    for key in seed.api_keys {
        seal_and_insert(vault, store, key.owner, SecretKind::ApiKey, &key.key).await?;
        summary.api_keys += 1;
    }

    info!(
        rules = summary.rules,
        webhook_secrets = summary.webhook_secrets,
        api_keys = summary.api_keys,
        "seed_loaded"
    );

    Ok(summary)
}

/// Encrypt-on-write for a single secret.
async fn seal_and_insert(
    vault: &SecretVault,
    store: &dyn RecordStore,
    owner: String,
    kind: SecretKind,
    plaintext: &str,
) -> Result<()> {
    if plaintext.trim().is_empty() {
        bail!("empty {} for owner {}", kind.as_str(), owner);
    }

    let ciphertext = vault
        .encrypt(plaintext.as_bytes())
        .with_context(|| format!("Failed to encrypt {} for owner {}", kind.as_str(), owner))?;

    store
        .insert_secret(StoredSecret {
            id: String::new(),
            owner,
            kind,
            ciphertext,
        })
        .await
        .context("Failed to insert secret")?;

    Ok(())
}
