use std::collections::{BTreeMap, HashMap};

use fragvault_core::{Fragment, FragmentVersion, PolicyPair, content_digest, path_depth};
use tokio::sync::Mutex;

use super::{FragmentStore, StoreError};

#[derive(Default)]
struct MemoryState {
    next_fragment_id: i64,
    next_version_id: i64,
    fragments: BTreeMap<String, Fragment>,
    paths_by_id: HashMap<i64, String>,
    versions: HashMap<i64, Vec<FragmentVersion>>,
    contents: HashMap<String, Vec<u8>>,
}

/// In-process store with the same contract as the SQLite one. The single
/// mutex makes every append atomic.
#[derive(Default)]
pub struct MemoryFragmentStore {
    state: Mutex<MemoryState>,
}

impl MemoryFragmentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FragmentStore for MemoryFragmentStore {
    async fn create_fragment(
        &self,
        path: &str,
        policy: &PolicyPair,
    ) -> Result<Fragment, StoreError> {
        let mut state = self.state.lock().await;
        if state.fragments.contains_key(path) {
            return Err(StoreError::PathConflict(path.to_string()));
        }
        state.next_fragment_id += 1;
        let fragment = Fragment {
            id: state.next_fragment_id,
            path: path.to_string(),
            depth: path_depth(path),
            latest_version: None,
            policy: policy.clone(),
        };
        state.paths_by_id.insert(fragment.id, fragment.path.clone());
        state.fragments.insert(fragment.path.clone(), fragment.clone());
        Ok(fragment)
    }

    async fn fragment_by_path(&self, path: &str) -> Result<Option<Fragment>, StoreError> {
        Ok(self.state.lock().await.fragments.get(path).cloned())
    }

    async fn query_by_paths(&self, paths: &[String]) -> Result<Vec<Fragment>, StoreError> {
        let state = self.state.lock().await;
        let mut out: Vec<Fragment> = paths
            .iter()
            .filter_map(|path| state.fragments.get(path).cloned())
            .collect();
        out.sort_by(|a, b| a.path.cmp(&b.path));
        out.dedup_by(|a, b| a.id == b.id);
        Ok(out)
    }

    async fn query_by_prefix(&self, base: &str) -> Result<Vec<Fragment>, StoreError> {
        let prefix = format!("{}/", base.trim_end_matches('/'));
        let state = self.state.lock().await;
        Ok(state
            .fragments
            .range(prefix.clone()..)
            .take_while(|(path, _)| path.starts_with(&prefix))
            .map(|(_, fragment)| fragment.clone())
            .collect())
    }

    async fn append_version(
        &self,
        fragment_id: i64,
        content: Option<&[u8]>,
    ) -> Result<FragmentVersion, StoreError> {
        let mut state = self.state.lock().await;
        let path = state
            .paths_by_id
            .get(&fragment_id)
            .cloned()
            .ok_or(StoreError::MissingFragment(fragment_id))?;

        let digest = content.map(|data| {
            let digest = content_digest(data);
            state
                .contents
                .entry(digest.clone())
                .or_insert_with(|| data.to_vec());
            digest
        });

        state.next_version_id += 1;
        let version_id = state.next_version_id;
        let history = state.versions.entry(fragment_id).or_default();
        let version = FragmentVersion {
            id: version_id,
            fragment_id,
            sequence: history.len() as i64,
            content_digest: digest,
        };
        history.push(version.clone());

        if let Some(fragment) = state.fragments.get_mut(&path) {
            fragment.latest_version = Some(version.clone());
        }
        Ok(version)
    }

    async fn versions(&self, fragment_id: i64) -> Result<Vec<FragmentVersion>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.versions.get(&fragment_id).cloned().unwrap_or_default())
    }

    async fn load_content(&self, digest: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.state.lock().await.contents.get(digest).cloned())
    }
}
