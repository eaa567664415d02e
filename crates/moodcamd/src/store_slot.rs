use moodcam_store::HistoryStore;
use std::path::PathBuf;
use tokio::sync::OnceCell;

/// The daemon's handle on the history store.
///
/// A store that failed to open at startup is retried on each use until an
/// open succeeds; after that the same connection is reused.
pub struct StoreSlot {
    path: Option<PathBuf>,
    cell: OnceCell<HistoryStore>,
}

impl StoreSlot {
    pub fn ready(store: HistoryStore) -> Self {
        Self {
            path: None,
            cell: OnceCell::new_with(Some(store)),
        }
    }

    /// Not open yet; `get` will try to open `path`.
    pub fn deferred(path: PathBuf) -> Self {
        Self {
            path: Some(path),
            cell: OnceCell::new(),
        }
    }

    /// No store at all. Every `get` fails.
    #[cfg(test)]
    pub fn absent() -> Self {
        Self {
            path: None,
            cell: OnceCell::new(),
        }
    }

    /// The open store, if any, without attempting to open it.
    pub fn open_store(&self) -> Option<&HistoryStore> {
        self.cell.get()
    }

    /// The open store, opening it first if needed.
    pub async fn get(&self) -> Result<&HistoryStore, String> {
        let Some(path) = &self.path else {
            return self
                .cell
                .get()
                .ok_or_else(|| "history store unavailable".to_string());
        };
        self.cell
            .get_or_try_init(|| async move {
                let store = HistoryStore::open(path).await.map_err(|e| e.to_string())?;
                tracing::info!(path = %path.display(), "history store reopened");
                Ok::<_, String>(store)
            })
            .await
    }
}
