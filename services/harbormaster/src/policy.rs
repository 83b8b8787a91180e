//! Repository policy documents
//!
//! A policy document is the per-repository statement of which accounts may
//! pull and push images. The registry control plane stores it as text; this
//! module owns the canonical serialized form and the principal-set semantics.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// The fixed action set granted to every principal in a policy.
pub const POLICY_ACTIONS: [&str; 2] = ["repository:pull", "repository:push"];

/// Version marker written into every rendered policy document.
const POLICY_VERSION: &str = "2023-10-01";

/// Error type for policy (de)serialization failures.
///
/// These are fatal for the single operation that produced them and are never
/// retried internally.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    /// The policy text could not be parsed.
    #[error("malformed policy document: {0}")]
    Malformed(#[source] serde_json::Error),

    /// The policy document could not be encoded.
    #[error("failed to encode policy document: {0}")]
    Encoding(#[source] serde_json::Error),
}

/// The result of policy operations.
pub type PolicyResult<T> = Result<T, PolicyError>;

/// A permission statement granting the fixed action set to a set of
/// principal accounts.
///
/// Principals are kept in a sorted set, so rendering is deterministic and
/// adding a principal twice yields byte-identical text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyDocument {
    principals: BTreeSet<String>,
}

/// Wire form of a policy document.
#[derive(Debug, Serialize, Deserialize)]
struct PolicyText {
    version: String,
    statement: Statement,
}

#[derive(Debug, Serialize, Deserialize)]
struct Statement {
    effect: String,
    principals: Vec<String>,
    actions: Vec<String>,
}

impl PolicyDocument {
    /// Create a policy document with no principals.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an account to the principal set.
    ///
    /// Adding an account that is already present is a no-op.
    pub fn add_principal(&mut self, account: impl Into<String>) {
        self.principals.insert(account.into());
    }

    /// Remove an account from the principal set.
    ///
    /// Removing an absent account is a no-op.
    pub fn remove_principal(&mut self, account: &str) {
        self.principals.remove(account);
    }

    /// Check whether an account is listed as a principal.
    pub fn has_principal(&self, account: &str) -> bool {
        self.principals.contains(account)
    }

    /// The principal accounts, in sorted order.
    pub fn principals(&self) -> impl Iterator<Item = &str> {
        self.principals.iter().map(String::as_str)
    }

    /// Whether the document grants access to no one.
    pub fn is_empty(&self) -> bool {
        self.principals.is_empty()
    }

    /// Serialize the document to its canonical text form.
    ///
    /// A document with no principals renders to the empty string, matching
    /// the registry's "no explicit policy" convention.
    pub fn render(&self) -> PolicyResult<String> {
        if self.principals.is_empty() {
            return Ok(String::new());
        }

        let text = PolicyText {
            version: POLICY_VERSION.to_string(),
            statement: Statement {
                effect: "Allow".to_string(),
                principals: self.principals.iter().cloned().collect(),
                actions: POLICY_ACTIONS.iter().map(|a| a.to_string()).collect(),
            },
        };

        serde_json::to_string(&text).map_err(PolicyError::Encoding)
    }

    /// Parse a policy document from its text form.
    ///
    /// Blank input parses to a document with no principals, because a
    /// repository may have no policy attached yet.
    pub fn parse(text: &str) -> PolicyResult<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }

        let text: PolicyText = serde_json::from_str(text).map_err(PolicyError::Malformed)?;
        Ok(Self {
            principals: text.statement.principals.into_iter().collect(),
        })
    }
}
