//! Repository cloning.
//!
//! The pipeline only needs "give me a working tree of this URL at this
//! path", so cloning sits behind the [`Cloner`] trait. [`GitCli`] shells out
//! to the `git` binary; tests substitute a cloner that copies a fixture tree.

use async_trait::async_trait;
use std::path::Path;
use tokio::process::Command;

use crate::config::CloneConfig;
use crate::error::{CompanionError, Result};

#[async_trait]
pub trait Cloner: Send + Sync {
    /// Materialize `url` as a working tree at `dest`.
    ///
    /// `dest` exists and is empty when this is called.
    async fn clone_repo(&self, url: &str, dest: &Path) -> Result<()>;
}

/// Clones with the system `git` binary.
#[derive(Debug, Clone, Default)]
pub struct GitCli {
    depth: u32,
    branch: Option<String>,
}

impl GitCli {
    pub fn new(config: &CloneConfig) -> Self {
        Self {
            depth: config.depth,
            branch: config.branch.clone(),
        }
    }

    fn args(&self, url: &str, dest: &Path) -> Vec<String> {
        let mut args = vec!["clone".to_string()];
        if let Some(branch) = &self.branch {
            args.extend(["--branch".to_string(), branch.clone(), "--single-branch".to_string()]);
        }
        if self.depth > 0 {
            args.extend(["--depth".to_string(), self.depth.to_string()]);
        }
        args.push("--".to_string());
        args.push(url.to_string());
        args.push(dest.to_string_lossy().to_string());
        args
    }
}

#[async_trait]
impl Cloner for GitCli {
    async fn clone_repo(&self, url: &str, dest: &Path) -> Result<()> {
        validate_url(url)?;
        tracing::info!(url, dest = %dest.display(), "cloning repository");

        let output = Command::new("git")
            .args(self.args(url, dest))
            // Never block on a credential prompt inside a server.
            .env("GIT_TERMINAL_PROMPT", "0")
            .output()
            .await
            .map_err(|e| CompanionError::Clone {
                url: url.to_string(),
                message: format!("failed to execute 'git clone'. Is git installed? ({e})"),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CompanionError::Clone {
                url: url.to_string(),
                message: stderr.trim().to_string(),
            });
        }

        tracing::info!(url, "repository cloned");
        Ok(())
    }
}

/// Reject obviously unusable URLs before spawning git.
fn validate_url(url: &str) -> Result<()> {
    let url = url.trim();
    if url.is_empty() {
        return Err(CompanionError::InvalidRequest(
            "repository url must not be empty".to_string(),
        ));
    }
    if url.starts_with('-') {
        return Err(CompanionError::Clone {
            url: url.to_string(),
            message: "repository url must not start with '-'".to_string(),
        });
    }
    Ok(())
}
