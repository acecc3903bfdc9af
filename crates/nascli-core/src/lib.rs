//! # nascli-core
//!
//! Core library for the nascli storage administration shell.
//!
//! The shell speaks a small scripting language mixed with hierarchical
//! commands: users move through a tree of namespaces (`storage volume`,
//! `..`, `/network`), read and change properties, invoke commands, and
//! post-process tabular results with pipelines (`show | sort(name) | limit 5`).
//! Everything remote goes through a [`remote::Collaborator`], so the crate
//! itself never talks to an appliance directly.
//!
//! ## Modules
//!
//! - [`lexer`] - Source text to tokens, including size literals and `${}` interpolation
//! - [`parser`] - Tokens to the [`ast`], with positions for every error
//! - [`eval`] - Async tree-walking evaluator with cancellation checkpoints
//! - [`namespace`] - The command tree, path resolution and navigation history
//! - [`pipeline`] - `select`, `sort` and `limit` over [`output::ResultSet`]s
//! - [`complete`] - Context-sensitive, fuzzy-ranked completion
//! - [`session`] - Ties the above together for one user
//! - [`memory`] - In-memory collaborator for demos and tests
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use nascli_core::config::ShellConfig;
//! use nascli_core::console::Console;
//! use nascli_core::memory::MemoryCollaborator;
//! use nascli_core::session::Session;
//!
//! # async fn demo(console: Box<dyn Console>) {
//! let backend = Arc::new(MemoryCollaborator::load("fixture.json".as_ref()).unwrap());
//! let mut session = Session::new(backend, console, ShellConfig::load()).await;
//!
//! // Navigate, then list volumes sorted by size
//! session.execute("storage volume").await;
//! for result in session.execute("show | sort(-size) | limit(3)").await {
//!     println!("{:?}", result);
//! }
//! # }
//! ```

pub mod ast;
pub mod complete;
pub mod config;
pub mod console;
pub mod env;
pub mod error;
pub mod eval;
pub mod lexer;
pub mod memory;
pub mod namespace;
pub mod output;
pub mod parser;
pub mod pipeline;
pub mod remote;
pub mod session;
pub mod value;
