//! Identity resolution across the two systems.
//!
//! Remote and local records share no primary keys; the only stable
//! identity is the (normalized) email address. Resolution must be
//! deterministic (the same email always yields the same local account,
//! across repeated runs and across submissions) and race-free under
//! concurrent imports.

use crate::error::{SyncError, SyncResult};
use crate::keyed_lock::KeyedLocks;
use chrono::Utc;
use ojs_client::{RemoteParticipant, RemoteUser};
use ojs_core::SyncStore;
use ojs_core::types::{NewUser, UserAccount, UserProfile, normalize_email};
use std::sync::Arc;
use tracing::debug;

/// Details of one person as seen on the remote side.
#[derive(Debug, Clone)]
pub struct RemoteIdentity {
    pub email: String,
    pub given_name: String,
    pub family_name: String,
    pub affiliation: Option<String>,
    pub orcid: Option<String>,
    pub country: Option<String>,
}

impl RemoteIdentity {
    pub fn from_user(user: &RemoteUser) -> SyncResult<Self> {
        let email = required_email(user.email.as_deref(), "user", user.id)?;
        Ok(Self {
            email,
            given_name: user.given_name.clone(),
            family_name: user.family_name.clone(),
            affiliation: user.affiliation.clone(),
            orcid: user.orcid.clone(),
            country: user.country.clone(),
        })
    }

    pub fn from_participant(p: &RemoteParticipant, role: &str) -> SyncResult<Self> {
        let email = required_email(p.email.as_deref(), role, 0)?;
        Ok(Self {
            email,
            given_name: p.given_name.clone(),
            family_name: p.family_name.clone(),
            affiliation: None,
            orcid: None,
            country: None,
        })
    }
}

fn required_email(email: Option<&str>, kind: &str, id: i64) -> SyncResult<String> {
    match email {
        Some(e) if !e.trim().is_empty() => Ok(normalize_email(e)),
        _ => Err(SyncError::Validation(format!(
            "{} {} has no email address",
            kind, id
        ))),
    }
}

/// Resolves remote identities to local accounts.
///
/// The find-or-create is doubly guarded: the store enforces a uniqueness
/// constraint on the email, and a keyed mutex serializes resolution per
/// email so concurrent imports do not both take the "create" branch.
/// Accounts created here carry no usable login credential; the profile
/// is refreshed from the remote details on every resolution.
pub struct UserResolver {
    store: Arc<dyn SyncStore>,
    email_locks: Arc<KeyedLocks>,
}

impl UserResolver {
    pub fn new(store: Arc<dyn SyncStore>, email_locks: Arc<KeyedLocks>) -> Self {
        Self { store, email_locks }
    }

    /// Returns the local account and whether it was created by this call.
    pub async fn resolve(&self, identity: &RemoteIdentity) -> SyncResult<(UserAccount, bool)> {
        let _guard = self.email_locks.acquire(&identity.email).await;

        let new = NewUser {
            email: identity.email.clone(),
            username: username_for(&identity.email),
            given_name: identity.given_name.clone(),
            family_name: identity.family_name.clone(),
            affiliation: identity.affiliation.clone(),
            orcid: identity.orcid.clone(),
            country: identity.country.clone(),
        }
        .normalized();

        let (account, created) = self.store.find_or_create_user(&new).await?;
        if created {
            debug!(email = %account.email, user_id = account.id, "Created local account for remote identity");
        }

        self.store
            .upsert_profile(&UserProfile {
                user_id: account.id,
                given_name: identity.given_name.clone(),
                family_name: identity.family_name.clone(),
                affiliation: identity.affiliation.clone(),
                orcid: identity.orcid.clone(),
                country: identity.country.clone(),
                updated_at: Utc::now(),
            })
            .await?;

        Ok((account, created))
    }
}

fn username_for(email: &str) -> String {
    email.split('@').next().unwrap_or(email).to_string()
}
