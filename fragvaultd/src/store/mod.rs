pub mod memory;
pub mod sqlite;

use fragvault_core::{Fragment, FragmentVersion, PathError, PolicyPair, PolicyParseError};
use thiserror::Error;

pub use memory::MemoryFragmentStore;
pub use sqlite::SqliteFragmentStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid policy: {0}")]
    InvalidPolicy(#[from] PolicyParseError),
    #[error("invalid path: {0}")]
    InvalidPath(#[from] PathError),
    #[error("fragment already exists at {0}")]
    PathConflict(String),
    #[error("fragment not found: {0}")]
    MissingFragment(i64),
}

/// Path-keyed fragment storage. `append_version` must assign the next
/// sequence number and move the latest pointer in one transaction.
#[allow(async_fn_in_trait)]
pub trait FragmentStore {
    async fn create_fragment(&self, path: &str, policy: &PolicyPair)
    -> Result<Fragment, StoreError>;

    async fn fragment_by_path(&self, path: &str) -> Result<Option<Fragment>, StoreError>;

    async fn query_by_paths(&self, paths: &[String]) -> Result<Vec<Fragment>, StoreError>;

    /// Strict descendants of `base`, ordered by path.
    async fn query_by_prefix(&self, base: &str) -> Result<Vec<Fragment>, StoreError>;

    async fn append_version(
        &self,
        fragment_id: i64,
        content: Option<&[u8]>,
    ) -> Result<FragmentVersion, StoreError>;

    /// All versions of a fragment, lowest sequence first.
    async fn versions(&self, fragment_id: i64) -> Result<Vec<FragmentVersion>, StoreError>;

    async fn load_content(&self, digest: &str) -> Result<Option<Vec<u8>>, StoreError>;
}
