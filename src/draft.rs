//! Drafting replacement documentation from a code diff.
//!
//! The retriever picks candidate files, the LLM rewrites each one against the
//! combined diff, and only files whose text actually changed are returned.
//! Drafts can then be reviewed against the diff by a second prompt.

use std::path::Path;

use docsmith_index::store::ChunkStore;
use docsmith_index::retriever::Retriever;
use docsmith_llm::LlmError;
use docsmith_llm::provider::{LlmProvider, Message, Role};

const SYSTEM_PROMPT: &str = "You are a surgical documentation editor. \
Given a code DIFF and the CURRENT content of a documentation file, return the \
full updated file. Change only the parts the diff makes inaccurate or \
incomplete; keep headings, badges, tables of contents, tone and licence text \
as they are. Return valid Markdown only, with no commentary about what you \
changed. If nothing needs to change, return the current content unchanged.";

const JUDGE_PROMPT: &str = "You review a documentation update against the code diff it \
is meant to reflect. It fails if it introduces information the diff does not support, or if \
it leaves out a new parameter, option or endpoint the diff adds. Reply with PASS, or with \
FAIL: followed by a one-line reason. Nothing else.";

/// Fallback target when retrieval yields no updated file.
pub const README: &str = "README.md";

/// One changed file of a pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffFile {
    pub filename: String,
    pub patch: String,
}

/// Split a unified diff (`git diff` output) into per-file patches.
///
/// Text without any `diff --git` header is returned as a single file named
/// `unknown`.
#[must_use]
pub fn parse_unified_diff(text: &str) -> Vec<DiffFile> {
    let mut files: Vec<DiffFile> = Vec::new();
    for line in text.split_inclusive('\n') {
        if let Some(header) = line.strip_prefix("diff --git ") {
            files.push(DiffFile {
                filename: header_target(header.trim_end()),
                patch: String::new(),
            });
            continue;
        }
        match files.last_mut() {
            Some(file) => {
                if let Some(target) = line.strip_prefix("+++ b/") {
                    file.filename = target.trim_end().to_owned();
                }
                file.patch.push_str(line);
            }
            None if !line.trim().is_empty() => files.push(DiffFile {
                filename: "unknown".into(),
                patch: line.to_owned(),
            }),
            None => {}
        }
    }
    files
}

fn header_target(header: &str) -> String {
    header
        .rsplit_once(" b/")
        .map_or(header, |(_, target)| target)
        .to_owned()
}

/// Render the diff as `FILE:` / `PATCH:` blocks for retrieval and prompting.
#[must_use]
pub fn build_combined_diff(files: &[DiffFile]) -> String {
    files
        .iter()
        .map(|f| format!("FILE: {}\nPATCH:\n{}\n---\n", f.filename, f.patch))
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DraftOutcome {
    Unchanged,
    Rewritten(String),
}

pub struct Drafter<'a, P: LlmProvider> {
    provider: &'a P,
}

impl<'a, P: LlmProvider> Drafter<'a, P> {
    pub fn new(provider: &'a P) -> Self {
        Self { provider }
    }

    /// Ask the model for an updated version of `current`.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider call fails.
    pub async fn draft(&self, diff: &str, current: &str) -> Result<DraftOutcome, LlmError> {
        let messages = [
            Message::new(Role::System, SYSTEM_PROMPT),
            Message::new(
                Role::User,
                format!("DIFF:\n{diff}\n\nCURRENT SECTION:\n{current}"),
            ),
        ];
        let reply = self.provider.chat(&messages).await?;
        let reply = reply.trim();
        if reply.is_empty() || reply == current.trim() {
            return Ok(DraftOutcome::Unchanged);
        }
        Ok(DraftOutcome::Rewritten(reply.to_owned()))
    }
}

/// Review outcome for one draft.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Fail(String),
}

impl Verdict {
    /// Anything other than a reply starting with `PASS` is a failure.
    #[must_use]
    pub fn from_reply(reply: &str) -> Self {
        let reply = reply.trim();
        if reply.starts_with("PASS") {
            return Self::Pass;
        }
        let reason = reply
            .strip_prefix("FAIL")
            .map_or(reply, |rest| rest.trim_start_matches(':'))
            .trim();
        if reason.is_empty() {
            Self::Fail("no reason given".into())
        } else {
            Self::Fail(reason.to_owned())
        }
    }
}

impl<P: LlmProvider> Drafter<'_, P> {
    /// Ask the model whether `draft` faithfully reflects `diff`.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider call fails.
    pub async fn verify(&self, diff: &str, draft: &str) -> Result<Verdict, LlmError> {
        let messages = [
            Message::new(Role::System, JUDGE_PROMPT),
            Message::new(Role::User, format!("DIFF:\n{diff}\n\nDRAFT:\n{draft}")),
        ];
        let reply = self.provider.chat(&messages).await?;
        let verdict = Verdict::from_reply(&reply);
        tracing::debug!(?verdict, "draft reviewed");
        Ok(verdict)
    }
}

/// Proposed replacement for one documentation file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpdate {
    pub file_path: String,
    pub content: String,
}

pub struct DraftRequest<'a> {
    pub repo: &'a str,
    pub docs_root: &'a Path,
    pub diff: &'a str,
    pub top_k: usize,
    pub min_score: Option<f32>,
}

/// Rank candidate files for `diff` and draft a replacement for each.
///
/// Retrieval and per-file drafting failures are logged and skipped. When no
/// candidate changes, the top-level README is tried once.
pub async fn draft_updates<S, P>(
    retriever: &Retriever<S>,
    drafter: &Drafter<'_, P>,
    request: &DraftRequest<'_>,
) -> Vec<FileUpdate>
where
    S: ChunkStore,
    P: LlmProvider,
{
    let hits = match retriever
        .find_relevant(request.diff, request.repo, request.top_k, request.min_score)
        .await
    {
        Ok(hits) => hits,
        Err(e) => {
            tracing::warn!(repo = request.repo, "retrieval failed, no files to update: {e:#}");
            Vec::new()
        }
    };

    let mut updates = Vec::new();
    for hit in &hits {
        tracing::info!(file = %hit.file_path, score = hit.score, "drafting candidate");
        if let Some(update) = draft_file(drafter, request, &hit.file_path).await {
            updates.push(update);
        }
    }

    if updates.is_empty() && !hits.iter().any(|h| h.file_path == README) {
        tracing::info!("no file-level updates, trying {README}");
        if let Some(update) = draft_file(drafter, request, README).await {
            updates.push(update);
        }
    }
    updates
}

/// Drop drafts the reviewer rejects.
///
/// A draft whose review call fails is kept and logged as unverified.
pub async fn keep_verified<P: LlmProvider>(
    drafter: &Drafter<'_, P>,
    diff: &str,
    updates: Vec<FileUpdate>,
) -> Vec<FileUpdate> {
    let mut kept = Vec::with_capacity(updates.len());
    for update in updates {
        match drafter.verify(diff, &update.content).await {
            Ok(Verdict::Pass) => kept.push(update),
            Ok(Verdict::Fail(reason)) => {
                tracing::warn!(file = %update.file_path, %reason, "draft rejected by review");
            }
            Err(e) => {
                tracing::warn!(file = %update.file_path, "draft review failed, keeping unverified: {e}");
                kept.push(update);
            }
        }
    }
    kept
}

async fn draft_file<P: LlmProvider>(
    drafter: &Drafter<'_, P>,
    request: &DraftRequest<'_>,
    file_path: &str,
) -> Option<FileUpdate> {
    let path = request.docs_root.join(file_path);
    let current = match tokio::fs::read_to_string(&path).await {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => {
            tracing::warn!(file = file_path, "failed to read documentation file: {e}");
            return None;
        }
    };
    match drafter.draft(request.diff, &current).await {
        Ok(DraftOutcome::Rewritten(content)) => Some(FileUpdate {
            file_path: file_path.to_owned(),
            content,
        }),
        Ok(DraftOutcome::Unchanged) => {
            tracing::info!(file = file_path, "no change returned, skipping");
            None
        }
        Err(e) => {
            tracing::warn!(file = file_path, "drafting failed, skipping: {e}");
            None
        }
    }
}
