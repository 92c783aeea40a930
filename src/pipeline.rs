//! The analyze and chat pipelines around one current repository.
//!
//! ```text
//! analyze(url):  prepare workspace → clone → load → chunk → embed → persist
//! chat(q):       embed q → top-k similarity → prompt → generate
//! ```
//!
//! A [`Companion`] owns the workspace, the collaborators and the handle to
//! the current index. The handle is `None` until an analyze run has fully
//! succeeded, which is what makes chat refuse to run against a missing or
//! half-built index.
//!
//! Analyze runs are serialized. Chats run concurrently with each other and
//! only hold the index read lock during retrieval.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};

use crate::answer::AnswerComposer;
use crate::chunk::{self, ChunkParams};
use crate::clone::{Cloner, GitCli};
use crate::config::Config;
use crate::embedding::{self, EmbeddingProvider};
use crate::error::{CompanionError, Result};
use crate::index::{BuildOptions, VectorIndex};
use crate::llm::{self, GenerativeModel};
use crate::loader::{load_documents, LoadRules};
use crate::models::{AnalyzeReport, Answer};
use crate::status::Status;
use crate::workspace::Workspace;

pub const ANALYZE_SUCCESS_MESSAGE: &str =
    "Repository analyzed and indexed successfully. Ready to chat.";
pub const NOT_ANALYZED_MESSAGE: &str =
    "Repository not analyzed yet. Please analyze a repository first.";
pub const ANALYSIS_IN_PROGRESS_MESSAGE: &str = "Analysis in progress, try again shortly.";

pub struct Companion {
    workspace: Workspace,
    rules: LoadRules,
    chunking: ChunkParams,
    build_options: BuildOptions,
    composer: AnswerComposer,
    cloner: Arc<dyn Cloner>,
    embedder: Arc<dyn EmbeddingProvider>,
    model: Arc<dyn GenerativeModel>,
    analyze_lock: Mutex<()>,
    index: RwLock<Option<VectorIndex>>,
}

impl Companion {
    /// Assemble a companion from explicit collaborators. No index is attached;
    /// call [`attach_existing`](Self::attach_existing) to pick up one left by
    /// a previous process.
    pub fn new(
        config: &Config,
        cloner: Arc<dyn Cloner>,
        embedder: Arc<dyn EmbeddingProvider>,
        model: Arc<dyn GenerativeModel>,
    ) -> Result<Self> {
        Ok(Self {
            workspace: Workspace::from_config(&config.workspace),
            rules: LoadRules::from_config(&config.loader)?,
            chunking: ChunkParams::new(config.chunking.chunk_size, config.chunking.overlap)?,
            build_options: BuildOptions {
                batch_size: config.embedding.batch_size,
                concurrency: config.embedding.concurrency,
                repository_url: None,
            },
            composer: AnswerComposer::new(
                config.retrieval.top_k,
                Duration::from_secs(config.llm.timeout_secs),
            ),
            cloner,
            embedder,
            model,
            analyze_lock: Mutex::new(()),
            index: RwLock::new(None),
        })
    }

    /// Production wiring: `git` for cloning, providers from `[embedding]`
    /// and `[llm]`, and whatever index the workspace already holds.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let companion = Self::new(
            config,
            Arc::new(GitCli::new(&config.clone)),
            embedding::create_provider(&config.embedding)?,
            llm::create_model(&config.llm)?,
        )?;
        companion.attach_existing().await?;
        Ok(companion)
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// Open the index at the workspace's index directory, if a complete one
    /// is there. Returns whether an index is now attached.
    pub async fn attach_existing(&self) -> Result<bool> {
        match VectorIndex::open(self.workspace.index_dir()).await {
            Ok(index) => {
                tracing::info!(
                    location = %index.location().display(),
                    model = index.model(),
                    "attached existing index"
                );
                *self.index.write().await = Some(index);
                Ok(true)
            }
            Err(CompanionError::NotFound(path)) => {
                tracing::info!(location = %path.display(), "no index yet, analyze a repository first");
                Ok(false)
            }
            Err(e) => {
                tracing::warn!(
                    location = %self.workspace.index_dir().display(),
                    error = %e,
                    "existing index unreadable, ignoring it until the next analyze"
                );
                Ok(false)
            }
        }
    }

    pub async fn is_ready(&self) -> bool {
        self.index.read().await.is_some()
    }

    /// Replace the current index with one built from `url`.
    ///
    /// The previous index is discarded before cloning starts; if any step
    /// fails the companion is left without an index.
    pub async fn analyze(&self, url: &str) -> Result<AnalyzeReport> {
        let url = url.trim();
        if url.is_empty() {
            return Err(CompanionError::InvalidRequest(
                "repository URL must not be empty".into(),
            ));
        }

        let _guard = self.analyze_lock.lock().await;
        tracing::info!(url, "analyzing repository");

        if let Some(previous) = self.index.write().await.take() {
            previous.close().await;
        }
        self.workspace.prepare()?;

        self.cloner
            .clone_repo(url, self.workspace.clone_dir())
            .await?;

        let root = self.workspace.clone_dir().to_path_buf();
        let rules = self.rules.clone();
        let report = tokio::task::spawn_blocking(move || load_documents(&root, &rules))
            .await
            .map_err(|e| CompanionError::Io(std::io::Error::other(e)))??;

        let chunks = chunk::split(&report.documents, self.chunking);
        let documents = report.documents.len();
        let chunk_count = chunks.len();
        tracing::info!(documents, chunks = chunk_count, "split documents");

        let options = BuildOptions {
            repository_url: Some(url.to_string()),
            ..self.build_options.clone()
        };
        let index = VectorIndex::build(
            self.workspace.index_dir(),
            chunks,
            self.embedder.as_ref(),
            &options,
        )
        .await?;
        *self.index.write().await = Some(index);

        tracing::info!(url, documents, chunks = chunk_count, "repository ready");
        Ok(AnalyzeReport {
            message: ANALYZE_SUCCESS_MESSAGE.to_string(),
            repository_url: url.to_string(),
            documents,
            skipped: report.skipped,
            chunks: chunk_count,
        })
    }

    /// Answer `question` from the current index.
    pub async fn chat(&self, question: &str) -> Result<Answer> {
        let retrieved = {
            let guard = self.index.read().await;
            let Some(index) = guard.as_ref() else {
                let message = if self.analyze_lock.try_lock().is_err() {
                    ANALYSIS_IN_PROGRESS_MESSAGE
                } else {
                    NOT_ANALYZED_MESSAGE
                };
                return Err(CompanionError::Precondition(message.into()));
            };
            self.composer
                .retrieve(index, question, self.embedder.as_ref())
                .await?
        };

        self.composer
            .compose(question, retrieved, self.model.as_ref())
            .await
    }

    pub async fn status(&self) -> Result<Status> {
        let analyzing = self.analyze_lock.try_lock().is_err();
        let guard = self.index.read().await;
        let index = match guard.as_ref() {
            Some(index) => Some(index.stats().await?),
            None => None,
        };
        Ok(Status {
            ready: index.is_some(),
            analyzing,
            index,
            embedding_model: self.embedder.model_name().to_string(),
            llm: self.model.name().to_string(),
            top_k: self.composer.top_k(),
        })
    }
}
