//! Problem storage and the "today's problem" cache.
//!
//! The store is read-only. The cache keeps the most recent problem for
//! `invalidate_after` and guarantees a single reload when concurrent callers
//! hit an expired entry.

use async_trait::async_trait;
use dailybug_common::types::Problem;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::error::ProblemError;

#[async_trait]
pub trait ProblemStore: Send + Sync {
    async fn load_all(&self) -> Result<Vec<Problem>, ProblemError>;
}

/// Problems from a JSON file holding an array, or a directory of `*.json`
/// files holding one problem each
#[derive(Debug, Clone)]
pub struct FileProblemStore {
    path: PathBuf,
}

impl FileProblemStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(path: &Path) -> Result<String, ProblemError> {
        tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ProblemError::Io {
                path: path.to_path_buf(),
                source,
            })
    }

    async fn load_file(path: &Path) -> Result<Vec<Problem>, ProblemError> {
        let content = Self::read(path).await?;
        serde_json::from_str(&content).map_err(|source| ProblemError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    async fn load_dir(dir: &Path) -> Result<Vec<Problem>, ProblemError> {
        let io_err = |source| ProblemError::Io {
            path: dir.to_path_buf(),
            source,
        };

        let mut entries = tokio::fs::read_dir(dir).await.map_err(io_err)?;
        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) == Some("json") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut problems = Vec::with_capacity(paths.len());
        for path in paths {
            let content = Self::read(&path).await?;
            let problem = serde_json::from_str(&content)
                .map_err(|source| ProblemError::Parse { path, source })?;
            problems.push(problem);
        }
        Ok(problems)
    }
}

#[async_trait]
impl ProblemStore for FileProblemStore {
    async fn load_all(&self) -> Result<Vec<Problem>, ProblemError> {
        let is_dir = tokio::fs::metadata(&self.path)
            .await
            .map_err(|source| ProblemError::Io {
                path: self.path.clone(),
                source,
            })?
            .is_dir();

        if is_dir {
            Self::load_dir(&self.path).await
        } else {
            Self::load_file(&self.path).await
        }
    }
}

/// Most recently published problem
pub fn latest_problem(mut problems: Vec<Problem>) -> Result<Problem, ProblemError> {
    problems.sort_by(|a, b| b.date_published.cmp(&a.date_published));
    problems.into_iter().next().ok_or(ProblemError::NoProblemFound)
}

struct CachedProblem {
    problem: Arc<Problem>,
    loaded_at: Instant,
}

/// TTL cache for today's problem with single-flight reload
pub struct ProblemCache {
    store: Arc<dyn ProblemStore>,
    invalidate_after: Duration,
    current: RwLock<Option<CachedProblem>>,
    reload: Mutex<()>,
}

impl ProblemCache {
    pub fn new(store: Arc<dyn ProblemStore>, invalidate_after: Duration) -> Self {
        Self {
            store,
            invalidate_after,
            current: RwLock::new(None),
            reload: Mutex::new(()),
        }
    }

    pub fn invalidate_after(&self) -> Duration {
        self.invalidate_after
    }

    async fn fresh(&self) -> Option<Arc<Problem>> {
        let current = self.current.read().await;
        current
            .as_ref()
            .filter(|cached| cached.loaded_at.elapsed() < self.invalidate_after)
            .map(|cached| Arc::clone(&cached.problem))
    }

    /// Today's problem, reloading from the store once the entry is stale
    pub async fn today(&self) -> Result<Arc<Problem>, ProblemError> {
        if let Some(problem) = self.fresh().await {
            return Ok(problem);
        }

        let _reload = self.reload.lock().await;
        // Another caller may have reloaded while we waited
        if let Some(problem) = self.fresh().await {
            debug!("Problem cache refreshed by a concurrent caller");
            return Ok(problem);
        }

        let problems = self.store.load_all().await?;
        let count = problems.len();
        let problem = Arc::new(latest_problem(problems)?);
        info!(
            problem_id = %problem.id,
            date_published = %problem.date_published,
            problems = count,
            "Problem cache reloaded"
        );

        *self.current.write().await = Some(CachedProblem {
            problem: Arc::clone(&problem),
            loaded_at: Instant::now(),
        });
        Ok(problem)
    }

    /// Drop the cached entry so the next call reloads
    pub async fn invalidate(&self) {
        *self.current.write().await = None;
    }
}
