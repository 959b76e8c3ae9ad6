
use async_trait::async_trait;
use std::collections::BTreeSet;
use tracing::debug;

use crate::Result;
use crate::index::{RetrievalResult, RetrievedChunk};

/// Category that grants unrestricted visibility
pub const ALL_CATEGORIES: &str = "all";

/// Document categories a role may see
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermittedCategories(BTreeSet<String>);

impl PermittedCategories {
    #[inline]
    pub fn new<I, S>(categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(categories.into_iter().map(Into::into).collect())
    }

    #[inline]
    pub fn is_unrestricted(&self) -> bool {
        self.0.contains(ALL_CATEGORIES)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether a chunk with `category` is visible. Uncategorised chunks are
    /// visible only to unrestricted roles.
    #[inline]
    pub fn permits(&self, category: Option<&str>) -> bool {
        if self.is_unrestricted() {
            return true;
        }
        category.is_some_and(|c| self.0.contains(c))
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for PermittedCategories {
    #[inline]
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter)
    }
}

/// Source of role permissions.
///
/// A role with no stored permissions, including a role that does not exist,
/// yields an empty set.
#[async_trait]
pub trait PermissionStore: Send + Sync {
    async fn permitted_categories(&self, role_id: i64) -> Result<PermittedCategories>;
}

/// Keep only the chunks `permitted` allows, in their original order
#[inline]
pub fn filter_by_permissions(
    permitted: &PermittedCategories,
    retrieved: RetrievalResult,
) -> Vec<RetrievedChunk> {
    if permitted.is_unrestricted() {
        return retrieved;
    }

    retrieved
        .into_iter()
        .filter(|hit| permitted.permits(hit.chunk.category.as_deref()))
        .collect()
}

/// Look up `role_id` in `store` and filter `retrieved` by its categories
pub async fn filter(
    store: &dyn PermissionStore,
    role_id: i64,
    retrieved: RetrievalResult,
) -> Result<Vec<RetrievedChunk>> {
    let permitted = store.permitted_categories(role_id).await?;
    let total = retrieved.len();
    let kept = filter_by_permissions(&permitted, retrieved);

    debug!(
        "Role {} [{}] kept {}/{} retrieved chunks",
        role_id,
        permitted.iter().collect::<Vec<_>>().join(", "),
        kept.len(),
        total
    );
    Ok(kept)
}
