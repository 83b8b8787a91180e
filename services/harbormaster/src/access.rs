//! Fleet-wide account access
//!
//! [`AccountAccessManager`] keeps the principal set of every repository's
//! policy document consistent with the granted-accounts ledger. Grants and
//! revocations fan out over the whole fleet as a sequential loop; the ledger
//! is committed only after every repository write succeeds, so a partial
//! failure never records success. Repositories already updated in a failed
//! pass are not rolled back: the per-repository mutation is a set operation,
//! and a retried call converges.

use kvstore::{Item, StoreTable};
use tokio::sync::Mutex;

use crate::error::{HarbormasterError, HarbormasterResult};
use crate::policy::PolicyDocument;
use crate::registry::{Fleet, RepositoryName};

/// Attribute holding the account identifier in a ledger item.
const ACCOUNT_ATTRIBUTE: &str = "account";

/// Orchestrates grant/revoke fan-out across the repository fleet and owns
/// the granted-accounts ledger.
#[derive(Debug)]
pub struct AccountAccessManager {
    fleet: Fleet,
    ledger: StoreTable,

    /// Serializes whole grant/revoke passes within this process, closing the
    /// ledger read-modify-write race between overlapping calls.
    fleet_lock: Mutex<()>,
}

impl AccountAccessManager {
    /// Create a new access manager over the given fleet and ledger table.
    pub fn new(fleet: Fleet, ledger: StoreTable) -> Self {
        Self {
            fleet,
            ledger,
            fleet_lock: Mutex::new(()),
        }
    }

    /// The accounts currently granted fleet-wide access, in sorted order.
    #[tracing::instrument(skip(self))]
    pub async fn accounts(&self) -> HarbormasterResult<Vec<String>> {
        let mut accounts = self.ledger.list_keys().await?;
        accounts.sort();
        Ok(accounts)
    }

    /// Grant an account access to every repository in the fleet.
    ///
    /// Enumerates the whole fleet (draining every page), adds the account to
    /// each repository's policy, and records the account in the ledger last.
    /// The first repository failure aborts the remaining fan-out; see the
    /// module docs for the partial-failure contract.
    #[tracing::instrument(skip(self))]
    pub async fn grant_access(&self, account: &str) -> HarbormasterResult<()> {
        validate_account(account)?;

        let _guard = self.fleet_lock.lock().await;

        let repositories = self.fleet.repositories().await?;
        for repository in &repositories {
            self.apply_principals(repository, std::slice::from_ref(&account))
                .await
                .map_err(|source| fan_out_error(repository, source))?;
        }

        let mut item = Item::new();
        item.insert(ACCOUNT_ATTRIBUTE.to_string(), account.to_string());
        self.ledger.put_item(account, item).await?;

        tracing::debug!(%account, repositories = repositories.len(), "Granted access");
        Ok(())
    }

    /// Revoke an account's access from every repository in the fleet.
    ///
    /// Symmetric to [`grant_access`](Self::grant_access): removes the
    /// principal from every policy (an emptied policy is written back as an
    /// explicit clear, not skipped), then removes the ledger entry.
    #[tracing::instrument(skip(self))]
    pub async fn revoke_access(&self, account: &str) -> HarbormasterResult<()> {
        validate_account(account)?;

        let _guard = self.fleet_lock.lock().await;

        let repositories = self.fleet.repositories().await?;
        for repository in &repositories {
            self.retract_principal(repository, account)
                .await
                .map_err(|source| fan_out_error(repository, source))?;
        }

        self.ledger.delete_item(account).await?;

        tracing::debug!(%account, repositories = repositories.len(), "Revoked access");
        Ok(())
    }

    /// Seed a newly created repository's policy with the full current ledger.
    ///
    /// Must run before the repository is considered ready. This reuses the
    /// same policy mutation as the grant fan-out, so the two cannot drift.
    /// Takes the same lock as grant and revoke: a seed that read the ledger
    /// mid-grant would miss the in-flight account for good, since the grant's
    /// enumeration has already passed the new repository by.
    #[tracing::instrument(skip(self))]
    pub async fn seed_repository(&self, repository: &RepositoryName) -> HarbormasterResult<()> {
        let _guard = self.fleet_lock.lock().await;

        let accounts = self.accounts().await?;
        let accounts: Vec<&str> = accounts.iter().map(String::as_str).collect();

        self.apply_principals(repository, &accounts)
            .await
            .map_err(|source| fan_out_error(repository, source))
    }

    /// Read-modify-write one repository's policy, adding the given accounts
    /// as principals.
    async fn apply_principals(
        &self,
        repository: &RepositoryName,
        accounts: &[&str],
    ) -> HarbormasterResult<()> {
        let text = self.fleet.get_policy(repository).await?;
        let mut document = PolicyDocument::parse(text.as_deref().unwrap_or_default())?;

        for account in accounts {
            document.add_principal(*account);
        }

        let rendered = document.render()?;
        self.fleet.set_policy(repository, &rendered).await?;
        Ok(())
    }

    /// Read-modify-write one repository's policy, removing the given account.
    ///
    /// The write happens even when the principal was absent, so a revoke pass
    /// touches every repository uniformly.
    async fn retract_principal(
        &self,
        repository: &RepositoryName,
        account: &str,
    ) -> HarbormasterResult<()> {
        let text = self.fleet.get_policy(repository).await?;
        let mut document = PolicyDocument::parse(text.as_deref().unwrap_or_default())?;

        document.remove_principal(account);

        let rendered = document.render()?;
        self.fleet.set_policy(repository, &rendered).await?;
        Ok(())
    }
}

fn validate_account(account: &str) -> HarbormasterResult<()> {
    if account.is_empty() {
        return Err(HarbormasterError::InvalidAccount(account.to_string()));
    }
    Ok(())
}

fn fan_out_error(repository: &RepositoryName, source: HarbormasterError) -> HarbormasterError {
    HarbormasterError::FanOut {
        repository: repository.clone(),
        source: Box::new(source),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use tokio::sync::Notify;

    use super::*;
    use crate::registry::{FleetError, MemoryFleet, RegistryFleet, RepositoryPage};
    use kvstore::{MemoryDriver, Store};

    fn repo(s: &str) -> RepositoryName {
        s.parse().unwrap()
    }

    fn ledger_table() -> StoreTable {
        let store: Store = MemoryDriver::with_tables(&["accounts"]).into();
        store.table("accounts")
    }

    async fn fleet_with_repositories(names: &[&str]) -> (Fleet, MemoryFleetProbe) {
        let memory = MemoryFleet::new().with_page_size(2);
        for name in names {
            memory.create_repository(&repo(name)).await.unwrap();
        }
        let fleet = Fleet::new(memory);
        (fleet.clone(), MemoryFleetProbe { fleet })
    }

    /// Reads policies back through the fleet handle for assertions.
    struct MemoryFleetProbe {
        fleet: Fleet,
    }

    impl MemoryFleetProbe {
        async fn principals(&self, name: &str) -> Vec<String> {
            let text = self.fleet.get_policy(&repo(name)).await.unwrap();
            PolicyDocument::parse(text.as_deref().unwrap_or_default())
                .unwrap()
                .principals()
                .map(String::from)
                .collect()
        }

        async fn policy_text(&self, name: &str) -> Option<String> {
            self.fleet.get_policy(&repo(name)).await.unwrap()
        }
    }

    #[tokio::test]
    async fn test_grant_then_revoke_scenario() {
        let (fleet, probe) = fleet_with_repositories(&["acme/api", "acme/web"]).await;
        let access = AccountAccessManager::new(fleet, ledger_table());

        access.grant_access("111").await.unwrap();
        access.grant_access("222").await.unwrap();

        assert_eq!(access.accounts().await.unwrap(), vec!["111", "222"]);
        assert_eq!(probe.principals("acme/api").await, vec!["111", "222"]);
        assert_eq!(probe.principals("acme/web").await, vec!["111", "222"]);

        access.revoke_access("111").await.unwrap();

        assert_eq!(access.accounts().await.unwrap(), vec!["222"]);
        assert_eq!(probe.principals("acme/api").await, vec!["222"]);
        assert_eq!(probe.principals("acme/web").await, vec!["222"]);
    }

    #[tokio::test]
    async fn test_grant_is_idempotent() {
        let (fleet, probe) = fleet_with_repositories(&["acme/api"]).await;
        let access = AccountAccessManager::new(fleet, ledger_table());

        access.grant_access("111").await.unwrap();
        access.grant_access("111").await.unwrap();

        assert_eq!(access.accounts().await.unwrap(), vec!["111"]);
        assert_eq!(probe.principals("acme/api").await, vec!["111"]);
    }

    #[tokio::test]
    async fn test_grant_rejects_empty_account() {
        let (fleet, _probe) = fleet_with_repositories(&[]).await;
        let access = AccountAccessManager::new(fleet, ledger_table());

        assert!(matches!(
            access.grant_access("").await,
            Err(HarbormasterError::InvalidAccount(_))
        ));
    }

    #[tokio::test]
    async fn test_revoke_absent_principal_leaves_policy_unchanged() {
        let (fleet, probe) = fleet_with_repositories(&["acme/api"]).await;
        let access = AccountAccessManager::new(fleet, ledger_table());

        access.grant_access("111").await.unwrap();
        let before = probe.policy_text("acme/api").await;

        access.revoke_access("999").await.unwrap();
        assert_eq!(probe.policy_text("acme/api").await, before);
    }

    #[tokio::test]
    async fn test_revoking_last_principal_clears_the_policy() {
        let (fleet, probe) = fleet_with_repositories(&["acme/api"]).await;
        let access = AccountAccessManager::new(fleet, ledger_table());

        access.grant_access("111").await.unwrap();
        access.revoke_access("111").await.unwrap();

        // An emptied policy is written back as an explicit clear.
        assert_eq!(probe.policy_text("acme/api").await, None);
    }

    #[tokio::test]
    async fn test_seed_repository_applies_full_ledger() {
        let (fleet, probe) = fleet_with_repositories(&[]).await;
        let access = AccountAccessManager::new(fleet.clone(), ledger_table());

        access.grant_access("111").await.unwrap();
        access.grant_access("222").await.unwrap();

        let name = repo("acme/new");
        fleet.create_repository(&name).await.unwrap();
        access.seed_repository(&name).await.unwrap();

        assert_eq!(probe.principals("acme/new").await, vec!["111", "222"]);
    }

    #[tokio::test]
    async fn test_grant_drains_every_page() {
        let names: Vec<String> = (0..7).map(|i| format!("acme/repo-{i}")).collect();
        let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let (fleet, probe) = fleet_with_repositories(&name_refs).await;
        let access = AccountAccessManager::new(fleet, ledger_table());

        access.grant_access("111").await.unwrap();

        for name in &names {
            assert_eq!(probe.principals(name).await, vec!["111"]);
        }
    }

    /// Fleet wrapper that fails every policy write to one repository.
    #[derive(Debug)]
    struct FailingFleet {
        inner: MemoryFleet,
        fail_on: RepositoryName,
    }

    #[async_trait::async_trait]
    impl RegistryFleet for FailingFleet {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn list_repositories(
            &self,
            page: Option<String>,
        ) -> Result<RepositoryPage, FleetError> {
            self.inner.list_repositories(page).await
        }

        async fn get_policy(
            &self,
            repository: &RepositoryName,
        ) -> Result<Option<String>, FleetError> {
            self.inner.get_policy(repository).await
        }

        async fn set_policy(
            &self,
            repository: &RepositoryName,
            text: &str,
        ) -> Result<(), FleetError> {
            if repository == &self.fail_on {
                return Err(FleetError::Request {
                    context: "set policy".to_string(),
                    source: "injected failure".into(),
                });
            }
            self.inner.set_policy(repository, text).await
        }

        async fn create_repository(&self, repository: &RepositoryName) -> Result<(), FleetError> {
            self.inner.create_repository(repository).await
        }

        async fn delete_repository(
            &self,
            repository: &RepositoryName,
            force: bool,
        ) -> Result<(), FleetError> {
            self.inner.delete_repository(repository, force).await
        }

        async fn list_images(
            &self,
            repository: &RepositoryName,
        ) -> Result<Vec<String>, FleetError> {
            self.inner.list_images(repository).await
        }

        async fn delete_image(
            &self,
            repository: &RepositoryName,
            tag: &str,
        ) -> Result<(), FleetError> {
            self.inner.delete_image(repository, tag).await
        }
    }

    /// Fleet wrapper that parks the first policy write until released, so a
    /// test can hold a grant mid-fan-out.
    #[derive(Debug)]
    struct GatedFleet {
        inner: MemoryFleet,
        entered: Arc<Notify>,
        release: Arc<Notify>,
        gate_armed: AtomicBool,
    }

    #[async_trait::async_trait]
    impl RegistryFleet for GatedFleet {
        fn name(&self) -> &'static str {
            "gated"
        }

        async fn list_repositories(
            &self,
            page: Option<String>,
        ) -> Result<RepositoryPage, FleetError> {
            self.inner.list_repositories(page).await
        }

        async fn get_policy(
            &self,
            repository: &RepositoryName,
        ) -> Result<Option<String>, FleetError> {
            self.inner.get_policy(repository).await
        }

        async fn set_policy(
            &self,
            repository: &RepositoryName,
            text: &str,
        ) -> Result<(), FleetError> {
            if self.gate_armed.swap(false, Ordering::SeqCst) {
                self.entered.notify_one();
                self.release.notified().await;
            }
            self.inner.set_policy(repository, text).await
        }

        async fn create_repository(&self, repository: &RepositoryName) -> Result<(), FleetError> {
            self.inner.create_repository(repository).await
        }

        async fn delete_repository(
            &self,
            repository: &RepositoryName,
            force: bool,
        ) -> Result<(), FleetError> {
            self.inner.delete_repository(repository, force).await
        }

        async fn list_images(
            &self,
            repository: &RepositoryName,
        ) -> Result<Vec<String>, FleetError> {
            self.inner.list_images(repository).await
        }

        async fn delete_image(
            &self,
            repository: &RepositoryName,
            tag: &str,
        ) -> Result<(), FleetError> {
            self.inner.delete_image(repository, tag).await
        }
    }

    #[tokio::test]
    async fn test_seed_waits_for_in_flight_grant() {
        let memory = MemoryFleet::new();
        memory.create_repository(&repo("acme/api")).await.unwrap();

        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let fleet = Fleet::new(GatedFleet {
            inner: memory,
            entered: entered.clone(),
            release: release.clone(),
            gate_armed: AtomicBool::new(true),
        });

        let access = Arc::new(AccountAccessManager::new(fleet.clone(), ledger_table()));
        let probe = MemoryFleetProbe {
            fleet: fleet.clone(),
        };

        let granting = {
            let access = access.clone();
            tokio::spawn(async move { access.grant_access("111").await })
        };

        // The grant is now parked inside its first policy write: the fleet is
        // enumerated, the ledger is not yet committed.
        entered.notified().await;

        let name = repo("acme/new");
        fleet.create_repository(&name).await.unwrap();

        let seeding = {
            let access = access.clone();
            let name = name.clone();
            tokio::spawn(async move { access.seed_repository(&name).await })
        };

        // Give the seed every chance to run early; it must wait for the grant
        // to commit rather than read the not-yet-written ledger.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        release.notify_one();

        granting.await.unwrap().unwrap();
        seeding.await.unwrap().unwrap();

        assert_eq!(access.accounts().await.unwrap(), vec!["111"]);
        assert_eq!(probe.principals("acme/new").await, vec!["111"]);
    }

    #[tokio::test]
    async fn test_partial_fan_out_failure() {
        let memory = MemoryFleet::new();
        for name in ["acme/api", "acme/db", "acme/web"] {
            memory.create_repository(&repo(name)).await.unwrap();
        }

        let fleet = Fleet::new(FailingFleet {
            inner: memory,
            fail_on: repo("acme/db"),
        });
        let access = AccountAccessManager::new(fleet.clone(), ledger_table());
        let probe = MemoryFleetProbe {
            fleet: fleet.clone(),
        };

        let err = access.grant_access("111").await.unwrap_err();
        match err {
            HarbormasterError::FanOut { repository, .. } => {
                assert_eq!(repository, repo("acme/db"));
            }
            other => panic!("expected fan-out error, got {other:?}"),
        }

        // The first repository was updated before the failure; it stays
        // updated, and the failure is the caller's signal to retry.
        assert_eq!(probe.principals("acme/api").await, vec!["111"]);
        assert_eq!(probe.policy_text("acme/web").await, None);

        // The ledger never recorded the failed grant.
        assert!(access.accounts().await.unwrap().is_empty());

        // A retry against a healed fleet would converge; simulate it here by
        // re-running against the repositories that remain reachable.
        let err = access.grant_access("111").await.unwrap_err();
        assert!(matches!(err, HarbormasterError::FanOut { .. }));
        assert_eq!(probe.principals("acme/api").await, vec!["111"]);
    }
}
