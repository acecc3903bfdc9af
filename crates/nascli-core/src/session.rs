//! One interactive session: variables, navigation, console and the shared tree.
//!
//! A [`Session`] parses a whole input first, then runs its statements in
//! order against a root snapshot taken per statement. State survives between
//! calls to [`Session::execute`]. When a statement fails, scopes it opened are
//! dropped; when it is interrupted, variables and navigation go back to how
//! they were before it started.
//!
//! ```no_run
//! use std::sync::Arc;
//! use nascli_core::config::ShellConfig;
//! use nascli_core::console::Console;
//! use nascli_core::memory::MemoryCollaborator;
//! use nascli_core::session::Session;
//!
//! # async fn demo(console: Box<dyn Console>) {
//! let backend = Arc::new(MemoryCollaborator::from_json(r#"{"children": []}"#).unwrap());
//! let mut session = Session::new(backend, console, ShellConfig::default()).await;
//! for result in session.execute("x = 6 * 7; print(x)").await {
//!     if let Err(e) = result {
//!         eprintln!("{}: {}", e.kind(), e);
//!     }
//! }
//! # }
//! ```

use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::complete::{self, Candidate};
use crate::config::ShellConfig;
use crate::console::Console;
use crate::env::Environment;
use crate::error::ShellError;
use crate::eval::Evaluator;
use crate::namespace::resolve::Navigator;
use crate::namespace::tree::{NamespaceTree, TreeWatcher, WatcherHandle};
use crate::output::Output;
use crate::parser;
use crate::remote::{Collaborator, NodePath};

/// Cancels whatever the session is running. Cheap to clone and safe to use
/// from a signal handler task.
#[derive(Clone, Default)]
pub struct Interrupter {
    token: Arc<Mutex<CancellationToken>>,
}

impl Interrupter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn interrupt(&self) {
        let token = self.token.lock().unwrap_or_else(|e| e.into_inner());
        token.cancel();
    }

    pub fn is_interrupted(&self) -> bool {
        self.token
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_cancelled()
    }

    /// Install a fresh token for the next input and return it.
    fn arm(&self) -> CancellationToken {
        let mut token = self.token.lock().unwrap_or_else(|e| e.into_inner());
        *token = CancellationToken::new();
        token.clone()
    }
}

pub struct Session {
    id: Uuid,
    config: ShellConfig,
    tree: Arc<NamespaceTree>,
    env: Environment,
    nav: Navigator,
    console: Box<dyn Console>,
    interrupter: Interrupter,
}

impl Session {
    pub async fn new(
        collaborator: Arc<dyn Collaborator>,
        console: Box<dyn Console>,
        config: ShellConfig,
    ) -> Self {
        let tree = Arc::new(NamespaceTree::new(collaborator, config.remote_timeout()));
        Self::with_tree(tree, console, config).await
    }

    /// A session over an existing, possibly shared, tree.
    pub async fn with_tree(
        tree: Arc<NamespaceTree>,
        console: Box<dyn Console>,
        config: ShellConfig,
    ) -> Self {
        let nav = Navigator::new(tree.root().await, config.history_depth);
        let id = Uuid::new_v4();
        info!(session = %id, "session started");
        Self {
            id,
            config,
            tree,
            env: Environment::new(),
            nav,
            console,
            interrupter: Interrupter::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &ShellConfig {
        &self.config
    }

    pub fn tree(&self) -> &Arc<NamespaceTree> {
        &self.tree
    }

    pub fn environment(&self) -> &Environment {
        &self.env
    }

    pub fn navigator(&self) -> &Navigator {
        &self.nav
    }

    pub fn cwd(&self) -> &NodePath {
        self.nav.current().path()
    }

    pub fn prompt(&self) -> String {
        self.config.render_prompt(&self.cwd().to_string())
    }

    pub fn console_mut(&mut self) -> &mut dyn Console {
        self.console.as_mut()
    }

    /// Handle for interrupting the running input from another task.
    pub fn interrupter(&self) -> Interrupter {
        self.interrupter.clone()
    }

    /// Start following collaborator events, if it publishes any.
    pub fn watch(&self) -> Option<WatcherHandle> {
        TreeWatcher::spawn(Arc::clone(&self.tree))
    }

    /// Parse and run `source`. Returns one result per statement run. A
    /// syntax error anywhere means nothing runs. Execution stops at the first
    /// error (unless configured otherwise), at an interrupt, or at `exit`.
    pub async fn execute(&mut self, source: &str) -> Vec<Result<Output, ShellError>> {
        let span = info_span!("execute", session = %self.id);
        async move {
            let script = match parser::parse(source) {
                Ok(script) => script,
                Err(e) => {
                    debug!(error = %e, "input rejected");
                    return vec![Err(e)];
                }
            };
            let cancel = self.interrupter.arm();
            let mut results = Vec::with_capacity(script.statements.len());
            for statement in &script.statements {
                let result = self.run_statement(statement, cancel.clone()).await;
                let stop = match &result {
                    Ok(Output::Exit) => true,
                    Ok(_) => false,
                    Err(ShellError::Interrupted) => true,
                    Err(_) => self.config.abort_on_error,
                };
                results.push(result);
                if stop {
                    break;
                }
            }
            results
        }
        .instrument(span)
        .await
    }

    async fn run_statement(
        &mut self,
        statement: &crate::ast::Statement,
        cancel: CancellationToken,
    ) -> Result<Output, ShellError> {
        let root = self.tree.root().await;
        let saved_env = self.env.clone();
        let saved_nav = self.nav.clone();
        let depth = self.env.depth();

        let result = {
            let mut evaluator = Evaluator::new(
                &mut self.env,
                &mut self.nav,
                root,
                self.console.as_mut(),
                cancel,
            );
            evaluator.run(statement).await
        };

        match &result {
            Err(ShellError::Interrupted) => {
                self.env = saved_env;
                self.nav = saved_nav;
                warn!("statement interrupted, state restored");
            }
            Err(e) => {
                self.env.truncate(depth);
                debug!(kind = e.kind(), error = %e, "statement failed");
            }
            Ok(_) => {}
        }
        result
    }

    /// Completion candidates for `partial_line` in the current namespace.
    pub async fn complete(&self, partial_line: &str) -> Vec<Candidate> {
        complete::complete(self.nav.current(), partial_line).await
    }
}
