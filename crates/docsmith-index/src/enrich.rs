//! LLM-extracted section metadata used to enrich embedding text.

use docsmith_llm::LlmProvider;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::section_prompt::{SectionPrompt, string_or_list};

/// Summary used when extraction is disabled or fails.
pub const FALLBACK_SUMMARY: &str = "General section";

const METADATA_TASK: &str = "You index one section of project documentation for a search \
engine. Set summary to one sentence saying what the section covers. Set keywords to at most \
eight function names, endpoints, commands or configuration keys it mentions, written exactly \
as in the text. Set clean_text to the section text with Markdown decoration and boilerplate \
removed.";

/// Summary, keywords and cleaned text for one section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SectionMetadata {
    #[serde(default)]
    pub summary: String,
    #[serde(default, deserialize_with = "string_or_list")]
    #[schemars(with = "Vec<String>")]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub clean_text: String,
}

impl SectionMetadata {
    /// Metadata carrying no extracted information.
    #[must_use]
    pub fn fallback(content: &str) -> Self {
        Self {
            summary: FALLBACK_SUMMARY.to_owned(),
            keywords: Vec::new(),
            clean_text: content.to_owned(),
        }
    }

    /// Fill blanks from `content` and tidy keywords.
    fn normalized(mut self, content: &str) -> Self {
        self.summary = self.summary.trim().to_owned();
        if self.summary.is_empty() {
            FALLBACK_SUMMARY.clone_into(&mut self.summary);
        }
        if self.clean_text.trim().is_empty() {
            content.clone_into(&mut self.clean_text);
        }
        let mut keywords: Vec<String> = Vec::with_capacity(self.keywords.len());
        for keyword in self.keywords {
            let keyword = keyword.trim();
            if !keyword.is_empty() && !keywords.iter().any(|k| k == keyword) {
                keywords.push(keyword.to_owned());
            }
        }
        self.keywords = keywords;
        self
    }
}

/// Ask `provider` for the metadata of one section.
///
/// Never fails: provider and parse errors are logged and yield
/// [`SectionMetadata::fallback`].
pub async fn extract_section_metadata<P: LlmProvider>(
    provider: &P,
    file_path: &str,
    header: &str,
    content: &str,
) -> SectionMetadata {
    match SectionPrompt::new(METADATA_TASK, header, content)
        .in_file(file_path)
        .ask::<SectionMetadata, _>(provider)
        .await
    {
        Ok(meta) => meta.normalized(content),
        Err(e) => {
            tracing::warn!(file_path, header, "section metadata extraction failed: {e:#}");
            SectionMetadata::fallback(content)
        }
    }
}

/// Text handed to the embedding provider for a section.
///
/// With metadata: `File: {path}. Summary: {summary}. Keywords: {k1, k2}. Content: {text}`;
/// without: `File: {path}. Content: {content}`.
#[must_use]
pub fn enriched_text(file_path: &str, content: &str, metadata: Option<&SectionMetadata>) -> String {
    match metadata {
        Some(meta) => format!(
            "File: {file_path}. Summary: {}. Keywords: {}. Content: {}",
            meta.summary,
            meta.keywords.join(", "),
            meta.clean_text
        ),
        None => format!("File: {file_path}. Content: {content}"),
    }
}
