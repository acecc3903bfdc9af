//! Shared helpers for the nascli-core integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::broadcast;

use nascli_core::config::ShellConfig;
use nascli_core::console::Console;
use nascli_core::error::{RemoteError, ShellError};
use nascli_core::memory::MemoryCollaborator;
use nascli_core::output::Output;
use nascli_core::remote::{
    ChildEntry, Collaborator, CommandArgs, CommandDescriptor, NodePath, PropertyDescriptor,
    RemoteEvent,
};
use nascli_core::session::Session;
use nascli_core::value::Value;

pub const FIXTURE: &str = include_str!("../fixtures/appliance.json");

/// Console that records output and replays scripted input.
pub struct BufferConsole {
    lines: Arc<Mutex<Vec<String>>>,
    input: VecDeque<String>,
    /// Block forever once scripted input runs out, instead of reporting EOF.
    hang: bool,
}

impl BufferConsole {
    pub fn new(lines: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            lines,
            input: VecDeque::new(),
            hang: false,
        }
    }

    pub fn with_input(mut self, input: &[&str]) -> Self {
        self.input = input.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn hanging(mut self) -> Self {
        self.hang = true;
        self
    }
}

#[async_trait]
impl Console for BufferConsole {
    fn write_line(&mut self, line: &str) {
        self.lines.lock().unwrap().push(line.to_string());
    }

    async fn read_line(&mut self, _prompt: &str) -> Result<Option<String>, ShellError> {
        match self.input.pop_front() {
            Some(line) => Ok(Some(line)),
            None if self.hang => std::future::pending().await,
            None => Ok(None),
        }
    }
}

/// Counts collaborator calls by operation before delegating.
pub struct CountingCollaborator {
    pub inner: MemoryCollaborator,
    pub list_children: AtomicUsize,
    pub list_commands: AtomicUsize,
    pub list_properties: AtomicUsize,
    pub gets: AtomicUsize,
    pub sets: AtomicUsize,
    pub invokes: AtomicUsize,
}

impl CountingCollaborator {
    pub fn new(inner: MemoryCollaborator) -> Self {
        Self {
            inner,
            list_children: AtomicUsize::new(0),
            list_commands: AtomicUsize::new(0),
            list_properties: AtomicUsize::new(0),
            gets: AtomicUsize::new(0),
            sets: AtomicUsize::new(0),
            invokes: AtomicUsize::new(0),
        }
    }

    pub fn sets(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }

    pub fn invokes(&self) -> usize {
        self.invokes.load(Ordering::SeqCst)
    }

    pub fn listings(&self) -> usize {
        self.list_children.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        for counter in [
            &self.list_children,
            &self.list_commands,
            &self.list_properties,
            &self.gets,
            &self.sets,
            &self.invokes,
        ] {
            counter.store(0, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl Collaborator for CountingCollaborator {
    async fn list_children(&self, path: &NodePath) -> Result<Vec<ChildEntry>, RemoteError> {
        self.list_children.fetch_add(1, Ordering::SeqCst);
        self.inner.list_children(path).await
    }

    async fn list_commands(&self, path: &NodePath) -> Result<Vec<CommandDescriptor>, RemoteError> {
        self.list_commands.fetch_add(1, Ordering::SeqCst);
        self.inner.list_commands(path).await
    }

    async fn list_properties(
        &self,
        path: &NodePath,
    ) -> Result<Vec<PropertyDescriptor>, RemoteError> {
        self.list_properties.fetch_add(1, Ordering::SeqCst);
        self.inner.list_properties(path).await
    }

    async fn get(&self, path: &NodePath, name: &str) -> Result<Value, RemoteError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(path, name).await
    }

    async fn set(&self, path: &NodePath, name: &str, value: Value) -> Result<(), RemoteError> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.inner.set(path, name, value).await
    }

    async fn invoke(
        &self,
        path: &NodePath,
        name: &str,
        args: CommandArgs,
    ) -> Result<Output, RemoteError> {
        self.invokes.fetch_add(1, Ordering::SeqCst);
        self.inner.invoke(path, name, args).await
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<RemoteEvent>> {
        self.inner.subscribe()
    }
}

/// A session over the fixture plus handles to its backend and output.
pub struct Harness {
    pub session: Session,
    pub backend: Arc<CountingCollaborator>,
    pub lines: Arc<Mutex<Vec<String>>>,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_console(|lines| BufferConsole::new(lines)).await
    }

    pub async fn with_console(
        console: impl FnOnce(Arc<Mutex<Vec<String>>>) -> BufferConsole,
    ) -> Self {
        let backend = Arc::new(CountingCollaborator::new(
            MemoryCollaborator::from_json(FIXTURE).unwrap(),
        ));
        let lines = Arc::new(Mutex::new(Vec::new()));
        let session = Session::new(
            backend.clone(),
            Box::new(console(lines.clone())),
            ShellConfig::default(),
        )
        .await;
        Self {
            session,
            backend,
            lines,
        }
    }

    /// Run `source`, panicking on the first error.
    pub async fn ok(&mut self, source: &str) -> Vec<Output> {
        self.session
            .execute(source)
            .await
            .into_iter()
            .map(|r| r.unwrap_or_else(|e| panic!("{:?} failed: {} ({})", source, e, e.kind())))
            .collect()
    }

    /// Run `source` and return the error it ends with.
    pub async fn err(&mut self, source: &str) -> ShellError {
        match self.session.execute(source).await.pop() {
            Some(Err(e)) => e,
            other => panic!("{:?} should fail, got {:?}", source, other),
        }
    }

    /// Printed lines so far, clearing the buffer.
    pub fn take_lines(&self) -> Vec<String> {
        std::mem::take(&mut *self.lines.lock().unwrap())
    }

    pub fn cwd(&self) -> String {
        self.session.cwd().to_string()
    }

    pub fn var(&self, name: &str) -> Option<Value> {
        self.session.environment().get(name).cloned()
    }
}
