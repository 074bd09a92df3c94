//! Markdown sectioning on level-2 headers.

/// Header synthesized for the text preceding the first `## ` line.
pub const INTRODUCTION: &str = "Introduction";

const SECTION_MARKER: &str = "## ";

/// One header-delimited slice of a Markdown document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// Header text without the marker, or [`INTRODUCTION`] for the first slice.
    pub header: String,
    /// Raw text of the slice. Non-introduction sections start with their `## ` line.
    pub content: String,
    /// 0-based position in the document.
    pub index: usize,
}

impl Section {
    /// True when the section holds nothing but whitespace.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.content.trim().is_empty()
    }
}

/// Split a Markdown document into ordered sections.
///
/// Every line that starts with `## ` opens a new section; everything before
/// the first such line becomes the introduction, which is always emitted,
/// even when empty. Sections own their trailing newline, so concatenating
/// `content` in order reproduces `text` byte for byte.
#[must_use]
pub fn chunk_markdown(text: &str) -> Vec<Section> {
    let mut sections = vec![Section {
        header: INTRODUCTION.to_owned(),
        content: String::new(),
        index: 0,
    }];

    for line in text.split_inclusive('\n') {
        if let Some(rest) = line.strip_prefix(SECTION_MARKER) {
            let index = sections.len();
            sections.push(Section {
                header: rest.trim().to_owned(),
                content: String::new(),
                index,
            });
        }
        // Safe: `sections` is never empty.
        if let Some(current) = sections.last_mut() {
            current.content.push_str(line);
        }
    }

    sections
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn concat(sections: &[Section]) -> String {
        sections.iter().map(|s| s.content.as_str()).collect()
    }

    #[test]
    fn splits_on_level_two_headers() {
        let doc = "Intro text\n## Setup\nInstall steps\n## API\nEndpoint list";
        let sections = chunk_markdown(doc);
        let headers: Vec<_> = sections.iter().map(|s| s.header.as_str()).collect();
        assert_eq!(headers, ["Introduction", "Setup", "API"]);
        assert_eq!(sections[0].content, "Intro text\n");
        assert_eq!(sections[1].content, "## Setup\nInstall steps\n");
        assert_eq!(sections[2].content, "## API\nEndpoint list");
        assert_eq!(concat(&sections), doc);
    }

    #[test]
    fn indexes_are_contiguous() {
        let sections = chunk_markdown("a\n## b\n## c\n## d\n");
        let idx: Vec<_> = sections.iter().map(|s| s.index).collect();
        assert_eq!(idx, [0, 1, 2, 3]);
    }

    #[test]
    fn empty_introduction_still_emitted() {
        let sections = chunk_markdown("## Only\nbody\n");
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].header, INTRODUCTION);
        assert!(sections[0].is_blank());
        assert_eq!(sections[1].header, "Only");
    }

    #[test]
    fn empty_document_is_single_blank_introduction() {
        let sections = chunk_markdown("");
        assert_eq!(sections.len(), 1);
        assert!(sections[0].is_blank());
    }

    #[test]
    fn deeper_headers_do_not_split() {
        let sections = chunk_markdown("# Title\n### Sub\ntext\n####Not\n##NoSpace\n");
        assert_eq!(sections.len(), 1);
    }

    #[test]
    fn header_trims_crlf_and_spaces() {
        let sections = chunk_markdown("x\r\n##   Spaced out  \r\nbody\r\n");
        assert_eq!(sections[1].header, "Spaced out");
        assert_eq!(sections[1].content, "##   Spaced out  \r\nbody\r\n");
    }

    #[test]
    fn duplicate_headers_kept_separately() {
        let sections = chunk_markdown("## Notes\na\n## Notes\nb\n");
        assert_eq!(sections.len(), 3);
        assert_eq!(sections[1].header, "Notes");
        assert_eq!(sections[2].header, "Notes");
        assert_ne!(sections[1].content, sections[2].content);
    }

    proptest! {
        #[test]
        fn round_trip_reconstructs_document(
            intro in "[a-z \n]{0,40}",
            bodies in proptest::collection::vec(("[A-Za-z ]{0,12}", "[a-z \n#]{0,40}"), 0..6),
        ) {
            let mut doc = intro.clone();
            if !doc.is_empty() && !doc.ends_with('\n') {
                doc.push('\n');
            }
            for (header, body) in &bodies {
                doc.push_str("## ");
                doc.push_str(header);
                doc.push('\n');
                doc.push_str(body);
                if !doc.ends_with('\n') {
                    doc.push('\n');
                }
            }

            let sections = chunk_markdown(&doc);
            prop_assert_eq!(concat(&sections), doc.clone());

            let expected = 1 + doc
                .split_inclusive('\n')
                .filter(|l| l.starts_with("## "))
                .count();
            prop_assert_eq!(sections.len(), expected);
            for (i, s) in sections.iter().enumerate() {
                prop_assert_eq!(s.index, i);
                if i > 0 {
                    prop_assert!(s.content.starts_with("## "));
                }
            }
        }
    }
}
