//! Registry fleet capability
//!
//! The managed registry's control plane is consumed through the
//! [`RegistryFleet`] trait, so the access-control core never talks to a
//! concrete backend directly. [`Fleet`] wraps a driver behind an `Arc` and
//! adds tracing, and [`MemoryFleet`] is the in-memory backend used for tests
//! and demos.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tokio::sync::RwLock;

/// Separator between the owner segment and the base name of a repository.
pub const REPOSITORY_SEPARATOR: char = '/';

/// A repository name was empty or contained the owner/name separator in the
/// wrong place.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid repository name: {0}")]
pub struct InvalidRepositoryName(pub String);

/// An owner-qualified repository name (`owner/name`).
///
/// The owner and base name are disjoint tokens joined by a single `/`; the
/// base name must not itself contain `/`, since that would be ambiguous with
/// the join.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RepositoryName {
    owner: String,
    name: String,
}

impl RepositoryName {
    /// Create a repository name from its owner and base name.
    pub fn new(
        owner: impl Into<String>,
        name: impl Into<String>,
    ) -> Result<Self, InvalidRepositoryName> {
        let owner = owner.into();
        let name = name.into();

        if owner.is_empty() || owner.contains(REPOSITORY_SEPARATOR) {
            return Err(InvalidRepositoryName(format!(
                "{owner}{REPOSITORY_SEPARATOR}{name}"
            )));
        }

        if name.is_empty() || name.contains(REPOSITORY_SEPARATOR) {
            return Err(InvalidRepositoryName(format!(
                "{owner}{REPOSITORY_SEPARATOR}{name}"
            )));
        }

        Ok(Self { owner, name })
    }

    /// The owner segment.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// The base name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for RepositoryName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.owner, REPOSITORY_SEPARATOR, self.name)
    }
}

impl FromStr for RepositoryName {
    type Err = InvalidRepositoryName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (owner, name) = s
            .split_once(REPOSITORY_SEPARATOR)
            .ok_or_else(|| InvalidRepositoryName(s.to_string()))?;
        Self::new(owner, name)
    }
}

impl serde::Serialize for RepositoryName {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for RepositoryName {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = <String as serde::Deserialize>::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Error types for registry control-plane operations.
#[derive(Debug, thiserror::Error)]
pub enum FleetError {
    /// The repository does not exist.
    #[error("repository not found: {0}")]
    RepositoryNotFound(String),

    /// The repository already exists.
    #[error("repository already exists: {0}")]
    RepositoryExists(String),

    /// The repository still holds images and was not deleted with force.
    #[error("repository is not empty: {0}")]
    RepositoryNotEmpty(String),

    /// The image tag does not exist in the repository.
    #[error("image not found: {0}")]
    ImageNotFound(String),

    /// The registry control plane call failed.
    #[error("registry request failed ({context}): {source}")]
    Request {
        /// What operation was being performed.
        context: String,
        /// The underlying error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// One page of a repository enumeration.
#[derive(Debug, Clone)]
pub struct RepositoryPage {
    /// The repositories in this page.
    pub repositories: Vec<RepositoryName>,

    /// Opaque token for the next page, if any.
    pub next: Option<String>,
}

/// A registry fleet driver, which provides the control-plane operations of
/// the managed registry hosting the repositories.
#[async_trait::async_trait]
pub trait RegistryFleet: fmt::Debug {
    /// The name of the driver.
    fn name(&self) -> &'static str;

    /// List one page of repositories, starting from the given page token.
    async fn list_repositories(&self, page: Option<String>)
        -> Result<RepositoryPage, FleetError>;

    /// Read the policy text attached to a repository.
    ///
    /// `None` means the repository has no policy attached.
    async fn get_policy(&self, repository: &RepositoryName)
        -> Result<Option<String>, FleetError>;

    /// Attach policy text to a repository.
    ///
    /// Empty text is an explicit clear, not a no-op.
    async fn set_policy(&self, repository: &RepositoryName, text: &str)
        -> Result<(), FleetError>;

    /// Create a repository.
    async fn create_repository(&self, repository: &RepositoryName) -> Result<(), FleetError>;

    /// Delete a repository. Without `force`, a repository that still holds
    /// images is not deleted.
    async fn delete_repository(
        &self,
        repository: &RepositoryName,
        force: bool,
    ) -> Result<(), FleetError>;

    /// List the image tags in a repository.
    async fn list_images(&self, repository: &RepositoryName) -> Result<Vec<String>, FleetError>;

    /// Delete an image tag from a repository.
    async fn delete_image(&self, repository: &RepositoryName, tag: &str)
        -> Result<(), FleetError>;
}

/// A cloneable handle to a registry fleet driver.
#[derive(Debug, Clone)]
pub struct Fleet {
    driver: Arc<dyn RegistryFleet + Send + Sync>,
}

impl<F> From<F> for Fleet
where
    F: RegistryFleet + Send + Sync + 'static,
{
    fn from(value: F) -> Self {
        Fleet::new(value)
    }
}

impl Fleet {
    /// Create a new fleet handle from a driver.
    pub fn new<F: RegistryFleet + Send + Sync + 'static>(driver: F) -> Self {
        Self {
            driver: Arc::new(driver),
        }
    }

    /// The name of the underlying driver.
    pub fn name(&self) -> &str {
        self.driver.name()
    }

    /// Enumerate every repository in the fleet.
    ///
    /// Drains every page before returning: callers mutating the fleet must
    /// see the complete enumeration, or the mutation would under-cover it.
    #[tracing::instrument(skip(self), fields(driver = self.driver.name()))]
    pub async fn repositories(&self) -> Result<Vec<RepositoryName>, FleetError> {
        let mut repositories = Vec::new();
        let mut page = None;

        loop {
            let batch = self.driver.list_repositories(page).await?;
            repositories.extend(batch.repositories);
            match batch.next {
                Some(next) => page = Some(next),
                None => break,
            }
        }

        tracing::trace!(count = repositories.len(), "Enumerated fleet repositories");
        Ok(repositories)
    }

    /// Read the policy text attached to a repository.
    #[tracing::instrument(skip(self), fields(driver = self.driver.name()))]
    pub async fn get_policy(
        &self,
        repository: &RepositoryName,
    ) -> Result<Option<String>, FleetError> {
        self.driver.get_policy(repository).await
    }

    /// Attach policy text to a repository. Empty text clears the policy.
    #[tracing::instrument(skip(self, text), fields(driver = self.driver.name()))]
    pub async fn set_policy(
        &self,
        repository: &RepositoryName,
        text: &str,
    ) -> Result<(), FleetError> {
        tracing::trace!(%repository, "Setting repository policy");
        self.driver.set_policy(repository, text).await
    }

    /// Create a repository.
    #[tracing::instrument(skip(self), fields(driver = self.driver.name()))]
    pub async fn create_repository(&self, repository: &RepositoryName) -> Result<(), FleetError> {
        tracing::trace!(%repository, "Creating repository");
        self.driver.create_repository(repository).await
    }

    /// Delete a repository.
    #[tracing::instrument(skip(self), fields(driver = self.driver.name()))]
    pub async fn delete_repository(
        &self,
        repository: &RepositoryName,
        force: bool,
    ) -> Result<(), FleetError> {
        tracing::trace!(%repository, force, "Deleting repository");
        self.driver.delete_repository(repository, force).await
    }

    /// List the image tags in a repository.
    #[tracing::instrument(skip(self), fields(driver = self.driver.name()))]
    pub async fn list_images(
        &self,
        repository: &RepositoryName,
    ) -> Result<Vec<String>, FleetError> {
        self.driver.list_images(repository).await
    }

    /// Delete an image tag from a repository.
    #[tracing::instrument(skip(self), fields(driver = self.driver.name()))]
    pub async fn delete_image(
        &self,
        repository: &RepositoryName,
        tag: &str,
    ) -> Result<(), FleetError> {
        tracing::trace!(%repository, %tag, "Deleting image");
        self.driver.delete_image(repository, tag).await
    }
}

#[derive(Debug, Default)]
struct RepositoryState {
    policy: Option<String>,
    images: BTreeSet<String>,
}

/// Registry fleet driver that keeps repositories in memory.
///
/// Enumeration is paginated with a configurable page size so callers that
/// must drain every page actually exercise that path.
#[derive(Debug)]
pub struct MemoryFleet {
    repositories: RwLock<BTreeMap<RepositoryName, RepositoryState>>,
    page_size: usize,
}

impl Default for MemoryFleet {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryFleet {
    /// Create a new empty fleet.
    pub fn new() -> Self {
        Self {
            repositories: RwLock::new(BTreeMap::new()),
            page_size: 100,
        }
    }

    /// Set the enumeration page size.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        assert!(page_size > 0, "page size must be positive");
        self.page_size = page_size;
        self
    }

    /// Add an image tag to a repository, creating the repository if needed.
    pub async fn add_image(&self, repository: &RepositoryName, tag: impl Into<String>) {
        let mut repositories = self.repositories.write().await;
        repositories
            .entry(repository.clone())
            .or_default()
            .images
            .insert(tag.into());
    }
}

#[async_trait::async_trait]
impl RegistryFleet for MemoryFleet {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn list_repositories(
        &self,
        page: Option<String>,
    ) -> Result<RepositoryPage, FleetError> {
        let offset: usize = match page {
            Some(token) => token.parse().map_err(|err| FleetError::Request {
                context: format!("invalid page token {token:?}"),
                source: Box::new(err),
            })?,
            None => 0,
        };

        let repositories = self.repositories.read().await;
        let names: Vec<RepositoryName> = repositories
            .keys()
            .skip(offset)
            .take(self.page_size)
            .cloned()
            .collect();

        let next = if offset + names.len() < repositories.len() {
            Some((offset + names.len()).to_string())
        } else {
            None
        };

        Ok(RepositoryPage {
            repositories: names,
            next,
        })
    }

    async fn get_policy(
        &self,
        repository: &RepositoryName,
    ) -> Result<Option<String>, FleetError> {
        let repositories = self.repositories.read().await;
        let state = repositories
            .get(repository)
            .ok_or_else(|| FleetError::RepositoryNotFound(repository.to_string()))?;
        Ok(state.policy.clone())
    }

    async fn set_policy(
        &self,
        repository: &RepositoryName,
        text: &str,
    ) -> Result<(), FleetError> {
        let mut repositories = self.repositories.write().await;
        let state = repositories
            .get_mut(repository)
            .ok_or_else(|| FleetError::RepositoryNotFound(repository.to_string()))?;

        state.policy = if text.is_empty() {
            None
        } else {
            Some(text.to_string())
        };
        Ok(())
    }

    async fn create_repository(&self, repository: &RepositoryName) -> Result<(), FleetError> {
        let mut repositories = self.repositories.write().await;
        if repositories.contains_key(repository) {
            return Err(FleetError::RepositoryExists(repository.to_string()));
        }

        repositories.insert(repository.clone(), RepositoryState::default());
        Ok(())
    }

    async fn delete_repository(
        &self,
        repository: &RepositoryName,
        force: bool,
    ) -> Result<(), FleetError> {
        let mut repositories = self.repositories.write().await;
        let state = repositories
            .get(repository)
            .ok_or_else(|| FleetError::RepositoryNotFound(repository.to_string()))?;

        if !state.images.is_empty() && !force {
            return Err(FleetError::RepositoryNotEmpty(repository.to_string()));
        }

        repositories.remove(repository);
        Ok(())
    }

    async fn list_images(&self, repository: &RepositoryName) -> Result<Vec<String>, FleetError> {
        let repositories = self.repositories.read().await;
        let state = repositories
            .get(repository)
            .ok_or_else(|| FleetError::RepositoryNotFound(repository.to_string()))?;
        Ok(state.images.iter().cloned().collect())
    }

    async fn delete_image(
        &self,
        repository: &RepositoryName,
        tag: &str,
    ) -> Result<(), FleetError> {
        let mut repositories = self.repositories.write().await;
        let state = repositories
            .get_mut(repository)
            .ok_or_else(|| FleetError::RepositoryNotFound(repository.to_string()))?;

        if !state.images.remove(tag) {
            return Err(FleetError::ImageNotFound(format!("{repository}:{tag}")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static_assertions::assert_obj_safe!(RegistryFleet);

    fn repo(s: &str) -> RepositoryName {
        s.parse().unwrap()
    }

    #[test]
    fn test_repository_name_parsing() {
        let name = repo("acme/api");
        assert_eq!(name.owner(), "acme");
        assert_eq!(name.name(), "api");
        assert_eq!(name.to_string(), "acme/api");

        assert!("acme".parse::<RepositoryName>().is_err());
        assert!("acme/api/extra".parse::<RepositoryName>().is_err());
        assert!("/api".parse::<RepositoryName>().is_err());
        assert!("acme/".parse::<RepositoryName>().is_err());
    }

    #[test]
    fn test_repository_name_rejects_separator_in_base_name() {
        assert!(RepositoryName::new("acme", "api/v2").is_err());
        assert!(RepositoryName::new("acme", "api").is_ok());
    }

    #[tokio::test]
    async fn test_create_and_enumerate() {
        let fleet = Fleet::new(MemoryFleet::new());
        fleet.create_repository(&repo("acme/api")).await.unwrap();
        fleet.create_repository(&repo("acme/web")).await.unwrap();

        let repositories = fleet.repositories().await.unwrap();
        assert_eq!(repositories, vec![repo("acme/api"), repo("acme/web")]);
    }

    #[tokio::test]
    async fn test_enumeration_drains_every_page() {
        let fleet = Fleet::new(MemoryFleet::new().with_page_size(2));
        for i in 0..5 {
            fleet
                .create_repository(&repo(&format!("acme/repo-{i}")))
                .await
                .unwrap();
        }

        let repositories = fleet.repositories().await.unwrap();
        assert_eq!(repositories.len(), 5);
    }

    #[tokio::test]
    async fn test_create_existing_repository() {
        let fleet = Fleet::new(MemoryFleet::new());
        fleet.create_repository(&repo("acme/api")).await.unwrap();

        let err = fleet.create_repository(&repo("acme/api")).await.unwrap_err();
        assert!(matches!(err, FleetError::RepositoryExists(_)));
    }

    #[tokio::test]
    async fn test_policy_set_and_clear() {
        let fleet = Fleet::new(MemoryFleet::new());
        let name = repo("acme/api");
        fleet.create_repository(&name).await.unwrap();

        assert_eq!(fleet.get_policy(&name).await.unwrap(), None);

        fleet.set_policy(&name, "{\"v\":1}").await.unwrap();
        assert_eq!(
            fleet.get_policy(&name).await.unwrap().as_deref(),
            Some("{\"v\":1}")
        );

        // An empty write is an explicit clear.
        fleet.set_policy(&name, "").await.unwrap();
        assert_eq!(fleet.get_policy(&name).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_delete_repository_with_images_requires_force() {
        let memory = MemoryFleet::new();
        let name = repo("acme/api");
        memory.create_repository(&name).await.unwrap();
        memory.add_image(&name, "latest").await;

        let fleet = Fleet::new(memory);
        let err = fleet.delete_repository(&name, false).await.unwrap_err();
        assert!(matches!(err, FleetError::RepositoryNotEmpty(_)));

        fleet.delete_repository(&name, true).await.unwrap();
        assert!(fleet.repositories().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_image_listing_and_deletion() {
        let memory = MemoryFleet::new();
        let name = repo("acme/api");
        memory.create_repository(&name).await.unwrap();
        memory.add_image(&name, "v1.0").await;
        memory.add_image(&name, "latest").await;

        let fleet = Fleet::new(memory);
        assert_eq!(
            fleet.list_images(&name).await.unwrap(),
            vec!["latest", "v1.0"]
        );

        fleet.delete_image(&name, "latest").await.unwrap();
        assert_eq!(fleet.list_images(&name).await.unwrap(), vec!["v1.0"]);

        let err = fleet.delete_image(&name, "latest").await.unwrap_err();
        assert!(matches!(err, FleetError::ImageNotFound(_)));
    }
}
