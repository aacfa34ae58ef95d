// Just-in-time provisioning of users who first sign in through an SSO provider.

use uuid::Uuid;

use crate::database::models::{User, UserCredentials};
use crate::database::{DatabaseError, Store};
use crate::providers::VerifiedIdentity;
use crate::types::AuthMethod;

/// Create the local user for `identity` in `org_id`.
///
/// Two first logins racing for the same email both end up with the same row:
/// the loser of the insert re-reads the winner's user.
pub async fn provision_user(
    store: &dyn Store,
    org_id: Uuid,
    identity: &VerifiedIdentity,
    method: AuthMethod,
) -> Result<User, DatabaseError> {
    let full_name = identity
        .full_name
        .clone()
        .unwrap_or_else(|| identity.email.split('@').next().unwrap_or_default().to_string());
    let user = User::new(org_id, &identity.email, &full_name);

    match store.create_user(&user).await {
        Ok(()) => {
            store.save_credentials(&UserCredentials::new(user.id)).await?;
            tracing::info!(user_id = %user.id, %org_id, %method, "Provisioned user on first SSO login");
            Ok(user)
        }
        Err(DatabaseError::Conflict(_)) => {
            tracing::debug!("User {} was provisioned concurrently, re-reading", identity.email);
            store
                .find_user_by_email(&identity.email)
                .await?
                .ok_or_else(|| DatabaseError::NotFound(format!("user {}", identity.email)))
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{CredentialStore, MemoryStore, UserStore};

    fn identity(name: Option<&str>) -> VerifiedIdentity {
        VerifiedIdentity::new("new.hire@acme.test", name.map(str::to_string))
    }

    #[tokio::test]
    async fn creates_user_with_empty_credentials() {
        let store = MemoryStore::new();
        let org_id = Uuid::new_v4();

        let user = provision_user(&store, org_id, &identity(Some("New Hire")), AuthMethod::Google)
            .await
            .unwrap();
        assert_eq!(user.org_id, org_id);
        assert_eq!(user.full_name, "New Hire");
        assert!(!user.is_admin);

        let creds = store.get_credentials(user.id).await.unwrap().unwrap();
        assert!(creds.password_hash.is_none());
        assert!(!creds.is_blocked);
    }

    #[tokio::test]
    async fn falls_back_to_local_part_for_name() {
        let store = MemoryStore::new();
        let user = provision_user(&store, Uuid::new_v4(), &identity(None), AuthMethod::SamlSso)
            .await
            .unwrap();
        assert_eq!(user.full_name, "new.hire");
    }

    #[tokio::test]
    async fn second_provisioning_returns_existing_user() {
        let store = MemoryStore::new();
        let org_id = Uuid::new_v4();
        let first = provision_user(&store, org_id, &identity(None), AuthMethod::Google).await.unwrap();
        let second = provision_user(&store, org_id, &identity(None), AuthMethod::Google).await.unwrap();
        assert_eq!(first.id, second.id);
        assert!(store.find_user_by_email("new.hire@acme.test").await.unwrap().is_some());
    }
}
