use std::{fs, path::Path};

use fragvault_core::{Fragment, FragmentVersion, PolicyPair, content_digest, path_depth};
use sqlx::sqlite::{SqliteConnectOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool, migrate::Migrator};
use tracing::debug;

use super::{FragmentStore, StoreError};

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

// SQLite caps bound parameters per statement.
const PATH_QUERY_CHUNK: usize = 500;

const SELECT_FRAGMENT: &str = "SELECT f.id, f.path, f.depth, f.view_policy, f.edit_policy,
        v.id AS version_id, v.sequence, v.content_digest
     FROM fragments f
     LEFT JOIN fragment_versions v ON v.id = f.latest_version_id";

#[derive(Clone)]
pub struct SqliteFragmentStore {
    pool: SqlitePool,
}

impl SqliteFragmentStore {
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn new(database_url: &str) -> Result<Self, StoreError> {
        let pool = SqlitePool::connect(database_url).await?;
        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    pub async fn open(db_path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePool::connect_with(options).await?;
        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    pub async fn init(&self) -> Result<(), StoreError> {
        MIGRATOR.run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn fragment_from_row(row: &SqliteRow) -> Result<Fragment, StoreError> {
    let id: i64 = row.try_get("id")?;
    let view: String = row.try_get("view_policy")?;
    let edit: String = row.try_get("edit_policy")?;
    let version_id: Option<i64> = row.try_get("version_id")?;
    let latest_version = match version_id {
        Some(version_id) => Some(FragmentVersion {
            id: version_id,
            fragment_id: id,
            sequence: row.try_get("sequence")?,
            content_digest: row.try_get("content_digest")?,
        }),
        None => None,
    };
    Ok(Fragment {
        id,
        path: row.try_get("path")?,
        depth: row.try_get("depth")?,
        latest_version,
        policy: PolicyPair::new(view.parse()?, edit.parse()?),
    })
}

impl FragmentStore for SqliteFragmentStore {
    async fn create_fragment(
        &self,
        path: &str,
        policy: &PolicyPair,
    ) -> Result<Fragment, StoreError> {
        let result = sqlx::query(
            "INSERT INTO fragments (path, depth, latest_version_id, view_policy, edit_policy)
             VALUES (?1, ?2, NULL, ?3, ?4)
             ON CONFLICT(path) DO NOTHING",
        )
        .bind(path)
        .bind(path_depth(path))
        .bind(policy.view.as_string())
        .bind(policy.edit.as_string())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::PathConflict(path.to_string()));
        }

        Ok(Fragment {
            id: result.last_insert_rowid(),
            path: path.to_string(),
            depth: path_depth(path),
            latest_version: None,
            policy: policy.clone(),
        })
    }

    async fn fragment_by_path(&self, path: &str) -> Result<Option<Fragment>, StoreError> {
        let row = sqlx::query(&format!("{SELECT_FRAGMENT} WHERE f.path = ?1"))
            .bind(path)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(fragment_from_row).transpose()
    }

    async fn query_by_paths(&self, paths: &[String]) -> Result<Vec<Fragment>, StoreError> {
        let mut out = Vec::with_capacity(paths.len());
        for chunk in paths.chunks(PATH_QUERY_CHUNK) {
            let mut builder = QueryBuilder::<Sqlite>::new(SELECT_FRAGMENT);
            builder.push(" WHERE f.path IN (");
            let mut separated = builder.separated(", ");
            for path in chunk {
                separated.push_bind(path);
            }
            separated.push_unseparated(")");
            let rows = builder.build().fetch_all(&self.pool).await?;
            for row in &rows {
                out.push(fragment_from_row(row)?);
            }
        }
        out.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(out)
    }

    async fn query_by_prefix(&self, base: &str) -> Result<Vec<Fragment>, StoreError> {
        // substr() keeps `%` and `_` in paths literal, unlike LIKE.
        let prefix = format!("{}/", base.trim_end_matches('/'));
        let rows = sqlx::query(&format!(
            "{SELECT_FRAGMENT}
             WHERE substr(f.path, 1, length(?1)) = ?1
             ORDER BY f.path ASC"
        ))
        .bind(prefix)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(fragment_from_row).collect()
    }

    async fn append_version(
        &self,
        fragment_id: i64,
        content: Option<&[u8]>,
    ) -> Result<FragmentVersion, StoreError> {
        let mut tx = self.pool.begin().await?;

        let exists = sqlx::query("SELECT id FROM fragments WHERE id = ?1")
            .bind(fragment_id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(StoreError::MissingFragment(fragment_id));
        }

        let sequence: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM fragment_versions WHERE fragment_id = ?1")
                .bind(fragment_id)
                .fetch_one(&mut *tx)
                .await?;

        let digest = match content {
            Some(data) => {
                let digest = content_digest(data);
                sqlx::query(
                    "INSERT INTO contents (digest, size, data) VALUES (?1, ?2, ?3)
                     ON CONFLICT(digest) DO NOTHING",
                )
                .bind(&digest)
                .bind(data.len() as i64)
                .bind(data)
                .execute(&mut *tx)
                .await?;
                Some(digest)
            }
            None => None,
        };

        let version_id = sqlx::query(
            "INSERT INTO fragment_versions (fragment_id, sequence, content_digest)
             VALUES (?1, ?2, ?3)",
        )
        .bind(fragment_id)
        .bind(sequence)
        .bind(&digest)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        sqlx::query("UPDATE fragments SET latest_version_id = ?1 WHERE id = ?2")
            .bind(version_id)
            .bind(fragment_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        debug!(fragment_id, sequence, "appended fragment version");

        Ok(FragmentVersion {
            id: version_id,
            fragment_id,
            sequence,
            content_digest: digest,
        })
    }

    async fn versions(&self, fragment_id: i64) -> Result<Vec<FragmentVersion>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, fragment_id, sequence, content_digest
             FROM fragment_versions
             WHERE fragment_id = ?1
             ORDER BY sequence ASC",
        )
        .bind(fragment_id)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(FragmentVersion {
                id: row.try_get("id")?,
                fragment_id: row.try_get("fragment_id")?,
                sequence: row.try_get("sequence")?,
                content_digest: row.try_get("content_digest")?,
            });
        }
        Ok(out)
    }

    async fn load_content(&self, digest: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let data = sqlx::query_scalar("SELECT data FROM contents WHERE digest = ?1")
            .bind(digest)
            .fetch_optional(&self.pool)
            .await?;
        Ok(data)
    }
}

#[cfg(test)]
#[path = "sqlite_tests.rs"]
mod tests;
