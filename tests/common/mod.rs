#![allow(dead_code)]

use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use walkdir::WalkDir;

use codebase_companion::clone::Cloner;
use codebase_companion::config::Config;
use codebase_companion::embedding::HashingProvider;
use codebase_companion::error::{CompanionError, Result};
use codebase_companion::llm::MockModel;
use codebase_companion::pipeline::Companion;

/// "Clones" by copying a local fixture tree. The URL names a subdirectory
/// of `fixtures`; an unknown name fails like a missing remote would.
pub struct FixtureCloner {
    pub fixtures: PathBuf,
}

#[async_trait]
impl Cloner for FixtureCloner {
    async fn clone_repo(&self, url: &str, dest: &Path) -> Result<()> {
        let name = url.rsplit('/').next().unwrap_or(url).trim_end_matches(".git");
        let src = self.fixtures.join(name);
        if !src.is_dir() {
            return Err(CompanionError::Clone {
                url: url.to_string(),
                message: "repository not found".into(),
            });
        }
        for entry in WalkDir::new(&src) {
            let entry = entry.map_err(|e| CompanionError::Io(e.into()))?;
            let target = dest.join(entry.path().strip_prefix(&src).unwrap());
            if entry.file_type().is_dir() {
                fs::create_dir_all(&target)?;
            } else {
                fs::copy(entry.path(), &target)?;
            }
        }
        Ok(())
    }
}

pub fn write(root: &Path, rel: &str, content: &[u8]) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

/// Two small fake repositories under `<tmp>/fixtures`.
pub fn fixtures(tmp: &TempDir) -> PathBuf {
    let root = tmp.path().join("fixtures");

    write(
        &root,
        "billing/src/invoice.py",
        b"def compute_invoice_total(items, tax_rate):\n    subtotal = sum(i.price for i in items)\n    return subtotal * (1 + tax_rate)\n",
    );
    write(
        &root,
        "billing/README.md",
        b"# Billing\n\nGenerates invoices and applies tax rates.\n",
    );
    write(&root, "billing/node_modules/left-pad/index.js", b"module.exports = pad;");
    write(&root, "billing/assets/logo.png", b"\x89PNG\r\n");
    write(&root, "billing/src/legacy.py", &[0xff, 0xfe, 0x41, 0x00]);

    write(
        &root,
        "weather/app.js",
        b"function fetchForecast(city) {\n  return http.get(`/forecast/${city}`);\n}\n",
    );
    write(
        &root,
        "weather/styles.css",
        b".forecast-card { border-radius: 4px; }\n",
    );

    root
}

pub fn test_config(tmp: &TempDir) -> Config {
    let mut config = Config::default();
    config.workspace.clone_dir = tmp.path().join("temp_repo");
    config.workspace.index_dir = tmp.path().join("vector_index");
    config.embedding.provider = "hash".into();
    config.embedding.dims = Some(256);
    config.embedding.batch_size = 2;
    config.llm.provider = "mock".into();
    config
}

pub fn companion(tmp: &TempDir, model: MockModel) -> Companion {
    Companion::new(
        &test_config(tmp),
        Arc::new(FixtureCloner {
            fixtures: fixtures(tmp),
        }),
        Arc::new(HashingProvider::new(256)),
        Arc::new(model),
    )
    .unwrap()
}
