//! Favorite products.
//!
//! The store keeps the favorited product ids in the order they were added,
//! together with a best-effort cache of the last seen details of each
//! product. The cache only ever grows: unfavoriting a product keeps its
//! details, listings filter by current membership instead.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use shoppo_catalog::{ClientTrait, Product, ProductId};
use tracing::{debug, instrument, warn};

use crate::utils::{JsonFileError, acquire_lock, read_json_file, traceable_path, write_json_file};

pub const FAVORITES_FILENAME: &str = "favorites.json";
const FAVORITES_VERSION: u64 = 1;

/// The store as shared between views.
pub type SharedFavorites = Arc<Mutex<FavoritesStore>>;

#[derive(Debug, thiserror::Error)]
pub enum FavoritesError {
    #[error(transparent)]
    Storage(#[from] JsonFileError),
    #[error("unsupported favorites file version {0}")]
    UnsupportedVersion(u64),
}

/// A favorited product id and when it was added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Favorite {
    pub id: ProductId,
    pub added_at: DateTime<Utc>,
}

/// Which favorites [sync_favorites] should fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Only favorites without cached details
    MissingOnly,
    /// All favorites, replacing cached details
    ReplaceAll,
}

/// On-disk representation of a [FavoritesStore].
#[derive(Debug, Serialize, Deserialize)]
struct FavoritesFile {
    version: u64,
    favorites: Vec<Favorite>,
    #[serde(default)]
    cached_products: BTreeMap<ProductId, Product>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FavoritesStore {
    /// Favorited ids in insertion order, with non-decreasing timestamps
    favorites: IndexMap<ProductId, DateTime<Utc>>,
    cached_products: BTreeMap<ProductId, Product>,
    /// Where the store is persisted, `None` for an in-memory store
    path: Option<PathBuf>,
    pending: PendingChanges,
}

/// Membership changes made since the store was loaded or last saved.
#[derive(Debug, Clone, Default, PartialEq)]
struct PendingChanges {
    /// Favorites stored before the changes in `membership` were removed
    cleared: bool,
    /// Last change per id in the order they were made, `None` for a removal
    membership: IndexMap<ProductId, Option<DateTime<Utc>>>,
}

impl FavoritesStore {
    /// Create an empty store that is not persisted.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the store persisted in `data_dir`.
    ///
    /// A missing favorites file yields an empty store that is saved there.
    pub fn load(data_dir: impl AsRef<Path>) -> Result<Self, FavoritesError> {
        let path = data_dir.as_ref().join(FAVORITES_FILENAME);

        let lock = acquire_lock(&path)?;
        let file = read_favorites_file(&path)?;
        drop(lock);

        Ok(Self::from_file(file, path))
    }

    fn from_file(file: Option<FavoritesFile>, path: PathBuf) -> Self {
        let Some(file) = file else {
            return Self {
                path: Some(path),
                ..Self::default()
            };
        };

        Self {
            favorites: file
                .favorites
                .into_iter()
                .map(|favorite| (favorite.id, favorite.added_at))
                .collect(),
            cached_products: file.cached_products,
            path: Some(path),
            pending: PendingChanges::default(),
        }
    }

    /// Persist the store, a no-op for in-memory stores.
    ///
    /// The membership changes made through this store are applied to the
    /// file as it is on disk now, so changes saved by other processes in
    /// the meantime are kept. Afterwards the store reflects the saved file.
    pub fn save(&mut self) -> Result<(), FavoritesError> {
        let Some(path) = self.path.clone() else {
            return Ok(());
        };

        let lock = acquire_lock(&path)?;
        let mut merged = Self::from_file(read_favorites_file(&path)?, path.clone());
        merged.apply_pending(&self.pending);
        merged.update_cache(self.cached_products.values().cloned());

        let file = FavoritesFile {
            version: FAVORITES_VERSION,
            favorites: merged.favorites().collect(),
            cached_products: merged.cached_products.clone(),
        };
        write_json_file(&file, &path, &lock)?;

        debug!(
            path = traceable_path(&path),
            n_changes = self.pending.membership.len(),
            n_favorites = merged.len(),
            "saved favorites"
        );
        *self = merged;
        Ok(())
    }

    fn apply_pending(&mut self, pending: &PendingChanges) {
        if pending.cleared {
            self.favorites.clear();
        }
        for (id, change) in &pending.membership {
            self.favorites.shift_remove(id);
            if let Some(added_at) = change {
                let added_at = match self.favorites.last() {
                    Some((_, last)) if last > added_at => *last,
                    _ => *added_at,
                };
                self.favorites.insert(id.clone(), added_at);
            }
        }
    }

    /// Flip the membership of `id` and return the new membership.
    ///
    /// Adding records the current time, removing keeps the cached details.
    pub fn toggle_favorite(&mut self, id: &ProductId) -> bool {
        self.pending.membership.shift_remove(id);
        if self.favorites.shift_remove(id).is_some() {
            self.pending.membership.insert(id.clone(), None);
            debug!(%id, "removed favorite");
            return false;
        }

        let now = Utc::now();
        let added_at = match self.favorites.last() {
            Some((_, last)) if *last > now => *last,
            _ => now,
        };
        self.favorites.insert(id.clone(), added_at);
        self.pending.membership.insert(id.clone(), Some(added_at));
        debug!(%id, "added favorite");
        true
    }

    pub fn is_favorite(&self, id: &ProductId) -> bool {
        self.favorites.contains_key(id)
    }

    /// Remove all favorites. Cached details are kept.
    pub fn remove_all(&mut self) {
        self.favorites.clear();
        self.pending = PendingChanges {
            cleared: true,
            membership: IndexMap::new(),
        };
    }

    pub fn len(&self) -> usize {
        self.favorites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.favorites.is_empty()
    }

    /// Favorites in the order they were added.
    pub fn favorites(&self) -> impl Iterator<Item = Favorite> + '_ {
        self.favorites.iter().map(|(id, added_at)| Favorite {
            id: id.clone(),
            added_at: *added_at,
        })
    }

    /// Favorited ids, most recently added first.
    pub fn ordered_ids_by_date_added_descending(&self) -> Vec<ProductId> {
        self.favorites.keys().rev().cloned().collect()
    }

    /// Merge `products` into the cache, replacing existing details.
    pub fn update_cache(&mut self, products: impl IntoIterator<Item = Product>) {
        for product in products {
            self.cached_products.insert(product.id(), product);
        }
    }

    /// Merge the favorited subset of `products` into the cache
    /// and return how many products were cached.
    pub fn cache_favorited<'a>(&mut self, products: impl IntoIterator<Item = &'a Product>) -> usize {
        let favorited = products
            .into_iter()
            .filter(|product| self.is_favorite(&product.id()))
            .cloned()
            .collect::<Vec<_>>();
        let n_cached = favorited.len();
        self.update_cache(favorited);
        n_cached
    }

    pub fn cached_product(&self, id: &ProductId) -> Option<&Product> {
        self.cached_products.get(id)
    }

    /// Favorites without cached details, most recently added first.
    pub fn missing_ids(&self) -> Vec<ProductId> {
        self.ordered_ids_by_date_added_descending()
            .into_iter()
            .filter(|id| !self.cached_products.contains_key(id))
            .collect()
    }

    /// Products to list as favorites.
    ///
    /// Cached favorites come first, most recently added first, followed by
    /// favorited `loaded` products that are not cached.
    pub fn merged_favorites(&self, loaded: &[Product]) -> Vec<Product> {
        let mut merged = self
            .ordered_ids_by_date_added_descending()
            .iter()
            .filter_map(|id| self.cached_products.get(id).cloned())
            .collect::<Vec<_>>();
        let mut listed = merged.iter().map(Product::id).collect::<HashSet<_>>();

        for product in loaded {
            let id = product.id();
            if self.is_favorite(&id) && listed.insert(id) {
                merged.push(product.clone());
            }
        }
        merged
    }
}

/// Read the favorites file at `path`, `None` if there is none.
fn read_favorites_file(path: &Path) -> Result<Option<FavoritesFile>, FavoritesError> {
    let Some(document) = read_json_file::<serde_json::Value>(path)? else {
        return Ok(None);
    };

    let version = document
        .get("version")
        .and_then(serde_json::Value::as_u64)
        .unwrap_or_default();
    if version != FAVORITES_VERSION {
        return Err(FavoritesError::UnsupportedVersion(version));
    }

    let file: FavoritesFile = serde_json::from_value(document)
        .map_err(|e| JsonFileError::Parse(path.to_path_buf(), e))?;

    debug!(
        path = traceable_path(path),
        n_favorites = file.favorites.len(),
        n_cached = file.cached_products.len(),
        "read favorites"
    );
    Ok(Some(file))
}

/// Lock a shared store.
///
/// A poisoned lock is recovered, the store has no invariants spanning a panic.
pub fn lock_favorites(favorites: &SharedFavorites) -> MutexGuard<'_, FavoritesStore> {
    favorites.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Fetch current details of favorited products and merge them into the cache.
///
/// Failures leave the cache untouched and are only logged.
/// Returns the number of products that were cached.
#[instrument(skip_all, fields(mode = ?mode))]
pub async fn sync_favorites(
    favorites: &SharedFavorites,
    client: &impl ClientTrait,
    mode: SyncMode,
) -> usize {
    let ids = {
        let store = lock_favorites(favorites);
        match mode {
            SyncMode::MissingOnly => store.missing_ids(),
            SyncMode::ReplaceAll => store.ordered_ids_by_date_added_descending(),
        }
    };

    if ids.is_empty() {
        debug!("no favorites to sync");
        return 0;
    }

    let page = match client.fetch_products_by_id(&ids).await {
        Ok(page) => page,
        Err(err) => {
            warn!(%err, n_ids = ids.len(), "could not sync favorites");
            return 0;
        },
    };

    let n_cached = lock_favorites(favorites).cache_favorited(&page.results);
    debug!(n_requested = ids.len(), n_cached, "synced favorites");
    n_cached
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use proptest::collection::vec;
    use proptest::prelude::*;

    use super::*;
    use crate::utils::test_helpers::{CannedClient, product};

    fn id(s: &str) -> ProductId {
        ProductId::from(s)
    }

    fn store_with(ids: &[&str]) -> FavoritesStore {
        let mut store = FavoritesStore::new();
        for favorite in ids {
            store.toggle_favorite(&id(favorite));
        }
        store
    }

    #[test]
    fn toggle_adds_and_removes() {
        let mut store = FavoritesStore::new();

        assert!(store.toggle_favorite(&id("1.1")));
        assert!(store.is_favorite(&id("1.1")));
        assert!(!store.toggle_favorite(&id("1.1")));
        assert!(!store.is_favorite(&id("1.1")));
    }

    #[test]
    fn ids_are_listed_most_recent_first() {
        let store = store_with(&["1.1", "2.2", "3.3"]);
        assert_eq!(store.ordered_ids_by_date_added_descending(), vec![
            id("3.3"),
            id("2.2"),
            id("1.1")
        ]);
    }

    #[test]
    fn re_adding_moves_to_most_recent() {
        let mut store = store_with(&["1.1", "2.2"]);
        store.toggle_favorite(&id("1.1"));
        store.toggle_favorite(&id("1.1"));

        assert_eq!(store.ordered_ids_by_date_added_descending(), vec![
            id("1.1"),
            id("2.2")
        ]);
    }

    #[test]
    fn unfavoriting_keeps_cached_details() {
        let mut store = store_with(&["1.1"]);
        store.update_cache([product("1", "1")]);

        store.toggle_favorite(&id("1.1"));

        assert!(store.cached_product(&id("1.1")).is_some());
        assert_eq!(store.merged_favorites(&[]), vec![]);
    }

    #[test]
    fn remove_all_keeps_cache() {
        let mut store = store_with(&["1.1", "2.2"]);
        store.update_cache([product("1", "1")]);

        store.remove_all();

        assert!(store.is_empty());
        assert!(store.cached_product(&id("1.1")).is_some());
    }

    #[test]
    fn cache_is_last_write_wins() {
        let mut store = FavoritesStore::new();
        let mut updated = product("1", "1");
        updated.price = "$5.00".to_string();

        store.update_cache([product("1", "1")]);
        store.update_cache([updated.clone()]);

        assert_eq!(store.cached_product(&id("1.1")), Some(&updated));
    }

    #[test]
    fn only_favorited_products_are_cached_from_pages() {
        let mut store = store_with(&["1.2"]);
        let n_cached = store.cache_favorited(&[product("1", "1"), product("1", "2")]);

        assert_eq!(n_cached, 1);
        assert!(store.cached_product(&id("1.1")).is_none());
        assert!(store.cached_product(&id("1.2")).is_some());
    }

    #[test]
    fn missing_ids_lists_uncached_favorites() {
        let mut store = store_with(&["1.1", "1.2", "1.3"]);
        store.update_cache([product("1", "2")]);

        assert_eq!(store.missing_ids(), vec![id("1.3"), id("1.1")]);
    }

    #[test]
    fn merged_favorites_prefers_cache_then_loaded() {
        let mut store = store_with(&["1.1", "1.2", "1.3"]);
        store.update_cache([product("1", "1"), product("1", "3")]);

        let loaded = [product("1", "2"), product("1", "3"), product("9", "9")];
        let merged = store
            .merged_favorites(&loaded)
            .iter()
            .map(Product::id)
            .collect::<Vec<_>>();

        assert_eq!(merged, vec![id("1.3"), id("1.1"), id("1.2")]);
    }

    #[test]
    fn missing_file_loads_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FavoritesStore::load(dir.path()).unwrap();

        assert!(store.is_empty());
        store.save().unwrap();
        assert!(dir.path().join(FAVORITES_FILENAME).exists());
    }

    #[test]
    fn saved_store_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FavoritesStore::load(dir.path()).unwrap();
        store.toggle_favorite(&id("1.1"));
        store.toggle_favorite(&id("2.2"));
        store.update_cache([product("2", "2")]);
        store.save().unwrap();

        let loaded = FavoritesStore::load(dir.path()).unwrap();
        assert_eq!(loaded, store);
    }

    #[test]
    fn unknown_version_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(FAVORITES_FILENAME),
            r#"{"version": 2, "favorites": []}"#,
        )
        .unwrap();

        let err = FavoritesStore::load(dir.path()).unwrap_err();
        assert!(matches!(err, FavoritesError::UnsupportedVersion(2)));
    }

    #[test]
    fn saves_keep_changes_of_concurrently_loaded_stores() {
        let dir = tempfile::tempdir().unwrap();
        let mut first = FavoritesStore::load(dir.path()).unwrap();
        let mut second = FavoritesStore::load(dir.path()).unwrap();

        first.toggle_favorite(&id("1.1"));
        first.save().unwrap();
        second.toggle_favorite(&id("2.2"));
        second.update_cache([product("2", "2")]);
        second.save().unwrap();

        let on_disk = FavoritesStore::load(dir.path()).unwrap();
        assert_eq!(on_disk.ordered_ids_by_date_added_descending(), vec![
            id("2.2"),
            id("1.1")
        ]);
        assert!(on_disk.cached_product(&id("2.2")).is_some());
        // the saving store now reflects the file
        assert_eq!(second, on_disk);
    }

    #[test]
    fn removals_and_clears_apply_to_the_stored_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut setup = FavoritesStore::load(dir.path()).unwrap();
        setup.toggle_favorite(&id("1.1"));
        setup.toggle_favorite(&id("2.2"));
        setup.save().unwrap();

        let mut remover = FavoritesStore::load(dir.path()).unwrap();
        let mut adder = FavoritesStore::load(dir.path()).unwrap();
        remover.toggle_favorite(&id("1.1"));
        remover.save().unwrap();
        adder.toggle_favorite(&id("3.3"));
        adder.save().unwrap();

        assert_eq!(adder.ordered_ids_by_date_added_descending(), vec![
            id("3.3"),
            id("2.2")
        ]);

        let mut clearer = FavoritesStore::load(dir.path()).unwrap();
        let mut late_adder = FavoritesStore::load(dir.path()).unwrap();
        clearer.remove_all();
        clearer.toggle_favorite(&id("4.4"));
        late_adder.toggle_favorite(&id("5.5"));
        late_adder.save().unwrap();
        clearer.save().unwrap();

        assert_eq!(
            FavoritesStore::load(dir.path())
                .unwrap()
                .ordered_ids_by_date_added_descending(),
            vec![id("4.4")]
        );
    }

    #[test]
    fn in_memory_store_is_not_saved() {
        let mut store = store_with(&["1.1"]);
        store.save().unwrap();
        assert!(store.is_favorite(&id("1.1")));
    }

    #[tokio::test]
    async fn sync_fetches_missing_only() {
        let mut store = store_with(&["1.1", "1.2"]);
        store.update_cache([product("1", "1")]);
        let favorites: SharedFavorites = Arc::new(Mutex::new(store));
        let client = CannedClient::default().with_products([product("1", "1"), product("1", "2")]);

        let n_cached = sync_favorites(&favorites, &client, SyncMode::MissingOnly).await;

        assert_eq!(n_cached, 1);
        assert_eq!(client.requests(), vec!["ids:1.2".to_string()]);
        assert!(lock_favorites(&favorites).missing_ids().is_empty());
    }

    #[tokio::test]
    async fn sync_all_refreshes_every_favorite() {
        let favorites: SharedFavorites = Arc::new(Mutex::new(store_with(&["1.1", "1.2"])));
        let client = CannedClient::default().with_products([product("1", "1"), product("1", "2")]);

        let n_cached = sync_favorites(&favorites, &client, SyncMode::ReplaceAll).await;

        assert_eq!(n_cached, 2);
        assert_eq!(client.requests(), vec!["ids:1.2,1.1".to_string()]);
    }

    #[tokio::test]
    async fn sync_without_favorites_does_not_fetch() {
        let favorites: SharedFavorites = Arc::default();
        let client = CannedClient::default();

        assert_eq!(sync_favorites(&favorites, &client, SyncMode::ReplaceAll).await, 0);
        assert!(client.requests().is_empty());
    }

    #[tokio::test]
    async fn failed_sync_leaves_cache_untouched() {
        let mut store = store_with(&["1.1"]);
        store.update_cache([product("1", "1")]);
        let before = store.clone();
        let favorites: SharedFavorites = Arc::new(Mutex::new(store));

        let n_cached =
            sync_favorites(&favorites, &CannedClient::default().failing(), SyncMode::ReplaceAll)
                .await;

        assert_eq!(n_cached, 0);
        assert_eq!(*lock_favorites(&favorites), before);
    }

    fn product_id() -> impl Strategy<Value = ProductId> {
        ("[0-9]{1,3}", "[0-9]{1,3}").prop_map(|(vendor, product)| ProductId::new(vendor, product))
    }

    proptest! {
        #[test]
        fn toggling_twice_restores_membership(initial in vec(product_id(), 0..8), toggled in product_id()) {
            let mut store = FavoritesStore::new();
            for favorite in &initial {
                if !store.is_favorite(favorite) {
                    store.toggle_favorite(favorite);
                }
            }
            let was_favorite = store.is_favorite(&toggled);

            prop_assert_eq!(store.toggle_favorite(&toggled), !was_favorite);
            prop_assert_eq!(store.is_favorite(&toggled), !was_favorite);
            prop_assert_eq!(store.toggle_favorite(&toggled), was_favorite);
            prop_assert_eq!(store.is_favorite(&toggled), was_favorite);
        }

        #[test]
        fn added_at_is_non_decreasing(toggles in vec(product_id(), 0..16)) {
            let mut store = FavoritesStore::new();
            for toggled in &toggles {
                store.toggle_favorite(toggled);
            }
            let timestamps = store.favorites().map(|favorite| favorite.added_at).collect::<Vec<_>>();
            prop_assert!(timestamps.windows(2).all(|pair| pair[0] <= pair[1]));
        }
    }
}
