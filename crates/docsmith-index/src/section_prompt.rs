//! Structured questions about a single documentation section.

use docsmith_llm::provider::{Message, Role};
use docsmith_llm::{LlmError, LlmProvider};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};

/// Section text beyond this many characters is not sent to the model.
pub(crate) const MAX_SECTION_CHARS: usize = 12_000;

/// One section framed for a chat model, with the task it should perform.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SectionPrompt<'a> {
    task: &'static str,
    file_path: Option<&'a str>,
    header: &'a str,
    content: &'a str,
}

impl<'a> SectionPrompt<'a> {
    pub(crate) fn new(task: &'static str, header: &'a str, content: &'a str) -> Self {
        Self {
            task,
            file_path: None,
            header,
            content,
        }
    }

    pub(crate) fn in_file(mut self, file_path: &'a str) -> Self {
        self.file_path = Some(file_path);
        self
    }

    fn render(&self) -> String {
        let mut out = String::new();
        if let Some(file_path) = self.file_path {
            out.push_str("FILE: ");
            out.push_str(file_path);
            out.push('\n');
        }
        out.push_str("SECTION: ");
        out.push_str(if self.header.is_empty() {
            "(untitled)"
        } else {
            self.header
        });
        out.push_str("\nTEXT:\n\"\"\"\n");
        match self.content.char_indices().nth(MAX_SECTION_CHARS) {
            Some((cut, _)) => {
                out.push_str(&self.content[..cut]);
                out.push_str("\n[truncated]");
            }
            None => out.push_str(self.content.trim_end()),
        }
        out.push_str("\n\"\"\"");
        out
    }

    /// Ask `provider` to answer with a `T` for this section.
    pub(crate) async fn ask<T, P>(&self, provider: &P) -> Result<T, LlmError>
    where
        T: DeserializeOwned + JsonSchema + Send + 'static,
        P: LlmProvider,
    {
        let messages = [
            Message::new(Role::System, self.task),
            Message::new(Role::User, self.render()),
        ];
        provider.chat_typed::<T>(&messages).await
    }
}

/// Accept a list of names, a single name, or `null` for a list field.
pub(crate) fn string_or_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(name)) => vec![name],
        Some(OneOrMany::Many(names)) => names,
    })
}
