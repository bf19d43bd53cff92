use std::collections::BTreeMap;

use fragvault_integrations::ids::SETTINGS_PANEL_URI_BASE;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::store::StoreError;

pub const PREFERENCE_DIFF_FILETREE: &str = "diff-filetree";
pub const PREFERENCE_NAV_COLLAPSED: &str = "nav-collapsed";

/// Per-user key/value preferences, stored next to the fragment tables.
#[derive(Clone)]
pub struct PreferencesStore {
    pool: SqlitePool,
}

impl PreferencesStore {
    /// Expects a pool that has already been migrated by the fragment store.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, user_id: &str, key: &str) -> Result<Option<String>, StoreError> {
        let value = sqlx::query_scalar(
            "SELECT value FROM user_preferences WHERE user_id = ?1 AND key = ?2",
        )
        .bind(user_id)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(value)
    }

    pub async fn load_all(&self, user_id: &str) -> Result<BTreeMap<String, String>, StoreError> {
        let rows = sqlx::query("SELECT key, value FROM user_preferences WHERE user_id = ?1")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        let mut out = BTreeMap::new();
        for row in rows {
            out.insert(row.try_get("key")?, row.try_get("value")?);
        }
        Ok(out)
    }

    /// Writes all values in one transaction.
    pub async fn save(&self, user_id: &str, values: &[(&str, &str)]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for (key, value) in values {
            sqlx::query(
                "INSERT INTO user_preferences (user_id, key, value) VALUES (?1, ?2, ?3)
                 ON CONFLICT(user_id, key) DO UPDATE SET value = excluded.value",
            )
            .bind(user_id)
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DiffPreferences {
    pub filetree: bool,
    pub nav_collapsed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedPanel {
    pub preferences: DiffPreferences,
    pub redirect_uri: String,
}

fn parse_flag(value: Option<&str>) -> bool {
    matches!(value.map(str::trim), Some("1" | "true"))
}

fn flag(value: bool) -> &'static str {
    if value { "1" } else { "0" }
}

pub struct DiffPreferencesPanel {
    store: PreferencesStore,
}

impl DiffPreferencesPanel {
    pub const KEY: &'static str = "diff";
    pub const NAME: &'static str = "Diff Preferences";
    pub const GROUP: &'static str = "Application Settings";
    pub const FILETREE_CAPTION: &'static str = "When looking at a revision or commit, enable a \
        sidebar showing affected files. You can press f to show or hide the sidebar.";

    pub fn new(store: PreferencesStore) -> Self {
        Self { store }
    }

    pub fn filetree_options() -> [(u8, &'static str); 2] {
        [(0, "Disable Filetree"), (1, "Enable Filetree")]
    }

    pub fn panel_uri() -> String {
        format!("{SETTINGS_PANEL_URI_BASE}{}/", Self::KEY)
    }

    pub async fn load(&self, user_id: &str) -> Result<DiffPreferences, StoreError> {
        let values = self.store.load_all(user_id).await?;
        Ok(DiffPreferences {
            filetree: parse_flag(values.get(PREFERENCE_DIFF_FILETREE).map(String::as_str)),
            nav_collapsed: parse_flag(values.get(PREFERENCE_NAV_COLLAPSED).map(String::as_str)),
        })
    }

    /// Turning the filetree on also expands a collapsed navigation sidebar,
    /// otherwise the tree would open hidden.
    pub async fn save(&self, user_id: &str, filetree: bool) -> Result<SavedPanel, StoreError> {
        let current = self.load(user_id).await?;
        let mut preferences = current;
        let mut values = Vec::with_capacity(2);
        if filetree && !current.filetree {
            preferences.nav_collapsed = false;
            values.push((PREFERENCE_NAV_COLLAPSED, flag(false)));
        }
        preferences.filetree = filetree;
        values.push((PREFERENCE_DIFF_FILETREE, flag(filetree)));

        self.store.save(user_id, &values).await?;
        debug!(user_id, filetree, "saved diff preferences");
        Ok(SavedPanel {
            preferences,
            redirect_uri: format!("{}?saved=true", Self::panel_uri()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteFragmentStore;

    async fn make_panel() -> DiffPreferencesPanel {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        SqliteFragmentStore::from_pool(pool.clone()).init().await.unwrap();
        DiffPreferencesPanel::new(PreferencesStore::from_pool(pool))
    }

    #[tokio::test]
    async fn defaults_to_disabled_filetree() {
        let panel = make_panel().await;
        assert_eq!(panel.load("alice").await.unwrap(), DiffPreferences::default());
    }

    #[tokio::test]
    async fn enabling_filetree_expands_navigation() {
        let panel = make_panel().await;
        panel
            .store
            .save("alice", &[(PREFERENCE_NAV_COLLAPSED, "1")])
            .await
            .unwrap();

        let saved = panel.save("alice", true).await.unwrap();

        assert_eq!(
            saved.preferences,
            DiffPreferences {
                filetree: true,
                nav_collapsed: false,
            }
        );
        assert_eq!(saved.redirect_uri, "/settings/panel/diff/?saved=true");
        assert_eq!(panel.load("alice").await.unwrap(), saved.preferences);
    }

    #[tokio::test]
    async fn keeping_filetree_enabled_leaves_navigation_alone() {
        let panel = make_panel().await;
        panel.save("alice", true).await.unwrap();
        panel
            .store
            .save("alice", &[(PREFERENCE_NAV_COLLAPSED, "1")])
            .await
            .unwrap();

        panel.save("alice", true).await.unwrap();
        assert!(panel.load("alice").await.unwrap().nav_collapsed);

        let saved = panel.save("alice", false).await.unwrap();
        assert!(!saved.preferences.filetree);
        assert!(saved.preferences.nav_collapsed);
    }

    #[tokio::test]
    async fn preferences_are_per_user() {
        let panel = make_panel().await;
        panel.save("alice", true).await.unwrap();
        assert!(!panel.load("bob").await.unwrap().filetree);
        assert_eq!(
            panel.store.get("alice", PREFERENCE_DIFF_FILETREE).await.unwrap().as_deref(),
            Some("1")
        );
    }

    #[test]
    fn panel_metadata() {
        assert_eq!(DiffPreferencesPanel::KEY, "diff");
        assert_eq!(DiffPreferencesPanel::GROUP, "Application Settings");
        assert!(DiffPreferencesPanel::FILETREE_CAPTION.contains("press f"));
        assert_eq!(DiffPreferencesPanel::panel_uri(), "/settings/panel/diff/");
        assert_eq!(DiffPreferencesPanel::filetree_options()[1].1, "Enable Filetree");
    }
}
