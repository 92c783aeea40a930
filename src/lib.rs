//! # Codebase Companion
//!
//! Clone a Git repository, index its source files as embedded chunks, and
//! answer natural-language questions about the code with a generative model
//! grounded in the retrieved chunks.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌──────────┐   ┌───────────┐   ┌────────────┐
//! │ git clone │──▶│  Loader  │──▶│  Chunker  │──▶│  Embedder  │
//! └───────────┘   └──────────┘   └───────────┘   └─────┬──────┘
//!                                                      ▼
//!  question ──▶ embed ──▶ top-k ◀───────────── ┌──────────────┐
//!                          │                   │ SQLite index │
//!                          ▼                   └──────────────┘
//!                    prompt ──▶ LLM ──▶ answer + sources
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! companion analyze https://github.com/user/repo.git
//! companion chat "Where is the request router defined?"
//! companion serve                # HTTP API on 127.0.0.1:8000
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Error taxonomy |
//! | [`models`] | Core data types |
//! | [`workspace`] | Clone and index directories |
//! | [`clone`] | Repository cloning |
//! | [`loader`] | Eligible-file discovery and reading |
//! | [`chunk`] | Overlapping character windows |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`retry`] | HTTP retry with backoff |
//! | [`index`] | Persistent vector index |
//! | [`prompt`] | Grounding prompt template |
//! | [`llm`] | Generative model backends |
//! | [`answer`] | Retrieval-augmented answering |
//! | [`pipeline`] | Analyze and chat orchestration |
//! | [`status`] | Readiness report |
//! | [`server`] | HTTP API |
//! | [`db`] | Database connection |
//! | [`migrate`] | Index schema |

pub mod answer;
pub mod chunk;
pub mod clone;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod index;
pub mod llm;
pub mod loader;
pub mod migrate;
pub mod models;
pub mod pipeline;
pub mod prompt;
pub mod retry;
pub mod server;
pub mod status;
pub mod workspace;
