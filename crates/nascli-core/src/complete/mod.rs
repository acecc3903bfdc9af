//! Context-sensitive completion of a partially typed line.
//!
//! Completion never fails: anything it cannot make sense of (an open
//! string, an unknown path, a collaborator error) yields fewer candidates
//! rather than an error.
//!
//! The line is read syntactically. Words before the one being typed are
//! taken as a path from the current namespace, and that node is queried with
//! at most one `list_children` and one `list_commands` call, or one
//! `list_properties` call after `get`/`set`. Candidates come back in groups
//! (children, commands, properties, keywords), each ordered by match score.

pub mod fuzzy;

use serde::Serialize;
use tracing::debug;

use crate::eval::builtins::{BuiltinCommand, FUNCTIONS};
use crate::lexer::TokenKind;
use crate::namespace::{object, NamespaceRef, RemoteNode};
use crate::parser::STAGES;
use crate::remote::{ChildKind, CommandDescriptor, NodePath};

use self::fuzzy::Ranker;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateKind {
    Child,
    Command,
    Property,
    Keyword,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Candidate {
    /// Replacement for the word being typed.
    pub text: String,
    pub kind: CandidateKind,
    pub description: String,
}

impl Candidate {
    fn new(text: impl Into<String>, kind: CandidateKind, description: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind,
            description: description.into(),
        }
    }
}

/// What the last statement of the line looks like.
#[derive(Debug, PartialEq, Eq)]
struct Context {
    /// Words already complete.
    words: Vec<String>,
    /// The word under the cursor, possibly empty.
    partial: String,
    /// Typing after a `|`.
    in_pipeline: bool,
}

/// Split off the last statement and its words. `None` inside an open string.
fn context(line: &str) -> Option<Context> {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut start = 0;
    let mut pipe = None;
    for (i, c) in line.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '#' => return None,
            ';' | '\n' | '{' | '}' => {
                start = i + c.len_utf8();
                pipe = None;
            }
            '|' => pipe = Some(i + 1),
            _ => {}
        }
    }
    if quote.is_some() {
        return None;
    }
    let tail = &line[pipe.unwrap_or(start)..];
    let mut words: Vec<String> = tail.split_whitespace().map(str::to_string).collect();
    let partial = if tail.ends_with(char::is_whitespace) || words.is_empty() {
        String::new()
    } else {
        words.pop().unwrap_or_default()
    };
    Some(Context {
        words,
        partial,
        in_pipeline: pipe.is_some(),
    })
}

/// Apply navigation words to `base`. `None` when a word cannot be read as a
/// path segment without asking the collaborator.
fn walk_path(base: &NodePath, words: &[&str]) -> Option<NodePath> {
    let mut path = base.clone();
    for word in words {
        if let Some(rest) = word.strip_prefix('/') {
            path = NodePath::root();
            if rest.is_empty() {
                continue;
            }
        }
        for segment in word.split('/').filter(|s| !s.is_empty()) {
            match segment {
                ".." => path = path.parent().unwrap_or_else(NodePath::root),
                "." => {}
                name if name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-')
                    && !name.starts_with('-') =>
                {
                    path = path.child(name)
                }
                _ => return None,
            }
        }
    }
    Some(path)
}

fn keyword_candidates() -> Vec<Candidate> {
    TokenKind::KEYWORDS
        .iter()
        .map(|k| Candidate::new(*k, CandidateKind::Keyword, "keyword"))
        .chain(
            FUNCTIONS
                .iter()
                .map(|f| Candidate::new(format!("{}(", f), CandidateKind::Keyword, "function")),
        )
        .collect()
}

fn command_candidates(commands: Vec<CommandDescriptor>) -> Vec<Candidate> {
    let mut out: Vec<Candidate> = commands
        .into_iter()
        .map(|c| Candidate::new(c.name, CandidateKind::Command, c.description))
        .collect();
    for builtin in BuiltinCommand::ALL {
        if !out.iter().any(|c| c.text == builtin.name()) {
            out.push(Candidate::new(
                builtin.name(),
                CandidateKind::Command,
                builtin.description(),
            ));
        }
    }
    out
}

/// Commands of the node at `path`. The current node knows its own local
/// commands; any other node is assumed to carry the property commands.
async fn commands_at(current: &NamespaceRef, node: &RemoteNode) -> Vec<CommandDescriptor> {
    if node.path() == current.path() {
        return current.list_commands().await.unwrap_or_default();
    }
    let mut commands = match node.list_commands().await {
        Ok(commands) => commands,
        Err(e) => {
            debug!(path = %node.path(), error = %e, "completion lookup failed");
            return Vec::new();
        }
    };
    for local in object::property_commands() {
        if !commands.iter().any(|c| c.name == local.name) {
            commands.push(local);
        }
    }
    commands
}

fn candidate_text(candidate: &Candidate) -> &str {
    &candidate.text
}

/// Candidates for the last word of `line`, typed in `current`.
pub async fn complete(current: &NamespaceRef, line: &str) -> Vec<Candidate> {
    let Some(ctx) = context(line) else {
        return Vec::new();
    };
    let ranker = Ranker::new();

    if ctx.in_pipeline && ctx.words.is_empty() {
        let stages = STAGES
            .iter()
            .map(|s| Candidate::new(*s, CandidateKind::Command, "pipeline stage"))
            .collect();
        return ranker.rank(&ctx.partial, stages, candidate_text);
    }
    if ctx.in_pipeline {
        return Vec::new();
    }

    let words: Vec<&str> = ctx.words.iter().map(String::as_str).collect();

    // property names after get/set
    if let Some(at) = words.iter().rposition(|w| *w == "get" || *w == "set") {
        let Some(path) = walk_path(current.path(), &words[..at]) else {
            return Vec::new();
        };
        let writing = words[at] == "set";
        let properties = match current.node().relocate(path).list_properties().await {
            Ok(properties) => properties,
            Err(_) => return Vec::new(),
        };
        let candidates = properties
            .into_iter()
            .filter(|p| !writing || !p.is_read_only())
            .map(|p| {
                let text = if writing { format!("{}=", p.name) } else { p.name.clone() };
                Candidate::new(text, CandidateKind::Property, p.description)
            })
            .collect();
        return ranker.rank(&ctx.partial, candidates, candidate_text);
    }

    let (dir, partial) = match ctx.partial.rfind('/') {
        Some(i) => (Some(&ctx.partial[..=i]), &ctx.partial[i + 1..]),
        None => (None, ctx.partial.as_str()),
    };
    let mut nav_words = words.clone();
    if let Some(dir) = dir {
        nav_words.push(dir);
    }
    let Some(path) = walk_path(current.path(), &nav_words) else {
        return Vec::new();
    };
    let node = current.node().relocate(path);

    let children: Vec<Candidate> = match node.list_children().await {
        Ok(entries) => entries
            .into_iter()
            .map(|entry| {
                let text = format!("{}{}", dir.unwrap_or(""), entry.name);
                let description = match entry.kind {
                    ChildKind::Config => "config",
                    ChildKind::Collection => "collection",
                    ChildKind::Entity => "item",
                };
                Candidate::new(text, CandidateKind::Child, description)
            })
            .collect(),
        Err(e) => {
            debug!(path = %node.path(), error = %e, "completion lookup failed");
            Vec::new()
        }
    };
    let mut out = ranker.rank(partial, children, candidate_text);
    if dir.is_some() {
        return out;
    }

    let commands = command_candidates(commands_at(current, &node).await);
    out.extend(ranker.rank(partial, commands, candidate_text));

    if words.is_empty() {
        out.extend(ranker.rank(partial, keyword_candidates(), candidate_text));
    }
    out
}
