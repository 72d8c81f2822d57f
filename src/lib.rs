//! # repo-chat
//!
//! Chat with a source code repository over HTTP.
//!
//! A client submits a repository URL; the service clones it, splits the
//! recognised source files into overlapping chunks, embeds them into a
//! SQLite-backed vector index and answers questions by retrieving relevant
//! chunks and handing them, with a running conversation summary, to a
//! chat-completion API.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌───────────┐   ┌───────────┐
//! │   Fetch   │──▶│  Chunker  │──▶│  Vector   │
//! │ git clone │   │ window/ts │   │  index    │
//! └───────────┘   └───────────┘   └─────┬─────┘
//!                                       │
//!                 ┌───────────┐   ┌─────▼─────┐
//!                 │   HTTP    │──▶│   Agent   │──▶ chat model
//!                 │  (axum)   │   │ + memory  │
//!                 └───────────┘   └───────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Error types per pipeline stage |
//! | [`models`] | Core data types |
//! | [`fetch`] | Repository cloning |
//! | [`chunker`] | File discovery and chunk production |
//! | [`splitter`] | Window and syntax-aware text splitting |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`retry`] | Shared HTTP retry policy |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`search`] | Similarity and MMR selection |
//! | [`index`] | Persistent vector index |
//! | [`llm`] | Chat-completion client |
//! | [`memory`] | Conversation summary memory |
//! | [`agent`] | Retrieval-augmented question answering |
//! | [`session`] | The active session |
//! | [`service`] | initialize / chat / status operations |
//! | [`server`] | HTTP server |

pub mod agent;
pub mod chunker;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod fetch;
pub mod index;
pub mod llm;
pub mod memory;
pub mod migrate;
pub mod models;
pub mod retry;
pub mod search;
pub mod server;
pub mod service;
pub mod session;
pub mod splitter;
