//! Article link corpus access.
//!
//! The [`LinkStore`] trait decouples the game engine from the corpus backend
//! (currently SQLite). Tests and small corpora use [`MemoryLinkStore`].

use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Entries kept by [`ArticleCache`] unless configured otherwise.
pub const DEFAULT_CACHE_CAPACITY: usize = 8192;

/// An article and its outgoing links, in corpus order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    /// Canonical title as stored in the corpus.
    pub title: String,
    pub links: Vec<String>,
}

/// Read-only title → article lookup, shared by concurrent games.
#[async_trait]
pub trait LinkStore: Send + Sync {
    /// Look up an article by title. `Ok(None)` means the title is not in the
    /// corpus; `Err` is reserved for storage faults.
    async fn lookup(&self, title: &str) -> Result<Option<Arc<Article>>>;
}

/// Bounded title → article memo.
///
/// Eviction is first-in-first-out once `capacity` entries are held. Misses are
/// never cached, and a capacity of zero disables caching.
#[derive(Debug)]
pub struct ArticleCache {
    capacity: usize,
    inner: Mutex<CacheInner>,
}

#[derive(Debug, Default)]
struct CacheInner {
    entries: HashMap<String, Arc<Article>>,
    order: VecDeque<String>,
}

impl ArticleCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(CacheInner::default()),
        }
    }

    pub fn get(&self, title: &str) -> Option<Arc<Article>> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.entries.get(title).cloned()
    }

    pub fn insert(&self, title: &str, article: Arc<Article>) {
        if self.capacity == 0 {
            return;
        }
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.entries.contains_key(title) {
            return;
        }
        while inner.entries.len() >= self.capacity {
            let Some(oldest) = inner.order.pop_front() else {
                break;
            };
            inner.entries.remove(&oldest);
        }
        inner.order.push_back(title.to_string());
        inner.entries.insert(title.to_string(), article);
    }

    pub fn len(&self) -> usize {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ArticleCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

/// SQLite corpus with a `core_articles(title, links_json)` table.
pub struct SqliteLinkStore {
    path: PathBuf,
    conn: Arc<Mutex<Connection>>,
    cache: ArticleCache,
    article_count: u64,
}

impl SqliteLinkStore {
    /// Open the corpus read-only and verify it has the expected table.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_cache(path, ArticleCache::default())
    }

    pub fn open_with_cache(path: &Path, cache: ArticleCache) -> Result<Self> {
        if !path.is_file() {
            bail!("corpus database not found at {}", path.display());
        }
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .with_context(|| format!("open corpus {}", path.display()))?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM core_articles", [], |row| row.get(0))
            .with_context(|| format!("count articles in {}", path.display()))?;
        let article_count = u64::try_from(count).unwrap_or_default();
        info!(path = %path.display(), article_count, "connected to corpus");
        Ok(Self {
            path: path.to_path_buf(),
            conn: Arc::new(Mutex::new(conn)),
            cache,
            article_count,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn article_count(&self) -> u64 {
        self.article_count
    }

    /// All article titles in corpus order. Blocks the calling thread.
    pub fn list_titles(&self) -> Result<Vec<String>> {
        let conn = lock_connection(&self.conn)?;
        let mut stmt = conn
            .prepare("SELECT title FROM core_articles")
            .context("prepare title listing")?;
        let titles = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .context("list titles")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("read title row")?;
        Ok(titles)
    }
}

#[async_trait]
impl LinkStore for SqliteLinkStore {
    async fn lookup(&self, title: &str) -> Result<Option<Arc<Article>>> {
        if let Some(hit) = self.cache.get(title) {
            return Ok(Some(hit));
        }
        let conn = Arc::clone(&self.conn);
        let key = title.to_string();
        let found = tokio::task::spawn_blocking(move || query_article(&conn, &key))
            .await
            .context("join lookup task")??;
        let Some(article) = found else {
            debug!(title, "article not found");
            return Ok(None);
        };
        let article = Arc::new(article);
        self.cache.insert(title, Arc::clone(&article));
        Ok(Some(article))
    }
}

fn lock_connection(conn: &Mutex<Connection>) -> Result<std::sync::MutexGuard<'_, Connection>> {
    conn.lock()
        .map_err(|_| anyhow!("corpus connection poisoned by an earlier panic"))
}

fn query_article(conn: &Mutex<Connection>, title: &str) -> Result<Option<Article>> {
    let conn = lock_connection(conn)?;
    let row = conn
        .query_row(
            "SELECT title, links_json FROM core_articles WHERE title = ?1",
            params![title],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
        )
        .optional()
        .with_context(|| format!("query article {title:?}"))?;
    let Some((canonical, links_json)) = row else {
        return Ok(None);
    };
    let links: Vec<String> = serde_json::from_str(&links_json)
        .with_context(|| format!("parse links_json for {canonical:?}"))?;
    Ok(Some(Article {
        title: canonical,
        links,
    }))
}

/// Immutable in-memory corpus.
#[derive(Debug, Clone, Default)]
pub struct MemoryLinkStore {
    articles: HashMap<String, Arc<Article>>,
}

impl MemoryLinkStore {
    pub fn from_links<I, T, L>(entries: I) -> Self
    where
        I: IntoIterator<Item = (T, L)>,
        T: Into<String>,
        L: IntoIterator,
        L::Item: Into<String>,
    {
        let articles = entries
            .into_iter()
            .map(|(title, links)| {
                let title = title.into();
                let article = Article {
                    title: title.clone(),
                    links: links.into_iter().map(Into::into).collect(),
                };
                (title, Arc::new(article))
            })
            .collect();
        Self { articles }
    }

    /// Load a JSON object mapping titles to link arrays.
    pub fn load_json(path: &Path) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("read corpus {}", path.display()))?;
        let map: HashMap<String, Vec<String>> = serde_json::from_str(&contents)
            .with_context(|| format!("parse corpus {}", path.display()))?;
        Ok(Self::from_links(map))
    }

    pub fn len(&self) -> usize {
        self.articles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.articles.is_empty()
    }
}

#[async_trait]
impl LinkStore for MemoryLinkStore {
    async fn lookup(&self, title: &str) -> Result<Option<Arc<Article>>> {
        Ok(self.articles.get(title).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestCorpus;

    fn article(title: &str) -> Arc<Article> {
        Arc::new(Article {
            title: title.to_string(),
            links: Vec::new(),
        })
    }

    #[test]
    fn cache_evicts_oldest_first() {
        let cache = ArticleCache::new(2);
        cache.insert("a", article("a"));
        cache.insert("b", article("b"));
        cache.insert("c", article("c"));

        assert_eq!(cache.len(), 2);
        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn zero_capacity_disables_cache() {
        let cache = ArticleCache::new(0);
        cache.insert("a", article("a"));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn sqlite_lookup_hits_and_misses() {
        let corpus = TestCorpus::new(&[("A", &["B", "C"]), ("B", &[])]).expect("corpus");

        let store = SqliteLinkStore::open(corpus.path()).expect("open");
        assert_eq!(store.article_count(), 2);

        let a = store.lookup("A").await.expect("lookup").expect("found");
        assert_eq!(a.links, vec!["B".to_string(), "C".to_string()]);
        assert!(store.lookup("Missing").await.expect("lookup").is_none());
        assert_eq!(store.cache.len(), 1);

        let again = store.lookup("A").await.expect("lookup").expect("found");
        assert!(Arc::ptr_eq(&a, &again));
        assert_eq!(store.list_titles().expect("titles").len(), 2);
    }

    #[tokio::test]
    async fn sqlite_malformed_links_is_an_error() {
        let corpus = TestCorpus::with_raw_rows(&[("A".to_string(), "not json".to_string())])
            .expect("corpus");

        let store = SqliteLinkStore::open(corpus.path()).expect("open");
        let err = store.lookup("A").await.unwrap_err();
        assert!(format!("{err:#}").contains("links_json"));
    }

    #[test]
    fn open_missing_corpus_fails() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = SqliteLinkStore::open(&temp.path().join("nope.db"))
            .err()
            .expect("missing corpus");
        assert!(err.to_string().contains("corpus database not found"));
    }

    #[tokio::test]
    async fn memory_store_loads_json() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("corpus.json");
        fs::write(&path, r#"{"A": ["B"], "B": []}"#).expect("write");

        let store = MemoryLinkStore::load_json(&path).expect("load");
        assert_eq!(store.len(), 2);
        let b = store.lookup("B").await.expect("lookup").expect("found");
        assert!(b.links.is_empty());
    }
}
