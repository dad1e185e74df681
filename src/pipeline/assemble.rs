//! Prompt assembly: order the segments sent to the model.
//!
//! The order is fixed:
//!
//! ```text
//! Instruction ─▶ DocumentContext(text + task)       text-bearing upload
//! Instruction ─▶ Media ─▶ UserText                  image / video upload
//! Instruction ─▶ UserText                           no usable upload
//! ```

use super::document::ExtractedDocument;
use crate::prompts::{document_context, SYSTEM_INSTRUCTIONS};

/// One unit of model input.
#[derive(Debug, Clone, PartialEq)]
pub enum PromptSegment {
    /// The fixed system instruction.
    Instruction(String),
    /// Extracted document text and the user's task, wrapped under labelled headers.
    DocumentContext(String),
    /// Raw media bytes forwarded as inline data.
    Media { mime_type: String, data: Vec<u8> },
    /// The user's prompt on its own.
    UserText(String),
}

impl PromptSegment {
    /// Text carried by this segment, `None` for media.
    pub fn text(&self) -> Option<&str> {
        match self {
            PromptSegment::Instruction(t)
            | PromptSegment::DocumentContext(t)
            | PromptSegment::UserText(t) => Some(t),
            PromptSegment::Media { .. } => None,
        }
    }
}

/// Build the ordered segment list for one request.
///
/// Consumes the extracted document; its bytes move into the media segment
/// without a copy.
pub fn assemble(document: Option<ExtractedDocument>, prompt: &str) -> Vec<PromptSegment> {
    let mut segments = vec![PromptSegment::Instruction(SYSTEM_INSTRUCTIONS.to_string())];

    match document {
        Some(ExtractedDocument::Text { kind, text }) => {
            segments.push(PromptSegment::DocumentContext(document_context(
                kind.label(),
                &text,
                prompt,
            )));
        }
        Some(ExtractedDocument::Media {
            mime_type, data, ..
        }) => {
            segments.push(PromptSegment::Media { mime_type, data });
            segments.push(PromptSegment::UserText(prompt.to_string()));
        }
        None => segments.push(PromptSegment::UserText(prompt.to_string())),
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::document::DocumentKind;

    #[test]
    fn bare_prompt() {
        let segments = assemble(None, "write a script");
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0], PromptSegment::Instruction(SYSTEM_INSTRUCTIONS.to_string()));
        assert_eq!(segments[1], PromptSegment::UserText("write a script".into()));
    }

    #[test]
    fn text_document_embeds_task() {
        let doc = ExtractedDocument::Text {
            kind: DocumentKind::Xlsx,
            text: "\nSHEET: S\na, b\n".into(),
        };
        let segments = assemble(Some(doc), "summarise");
        assert_eq!(segments.len(), 2);
        let ctx = segments[1].text().unwrap();
        assert!(ctx.starts_with("\nDOCUMENT (EXCEL):\n"));
        assert!(ctx.ends_with("USER TASK:\nsummarise\n"));
        assert!(matches!(segments[1], PromptSegment::DocumentContext(_)));
    }

    #[test]
    fn media_document_is_followed_by_prompt() {
        let doc = ExtractedDocument::Media {
            kind: DocumentKind::Image,
            mime_type: "image/png".into(),
            data: vec![0x89, b'P'],
        };
        let segments = assemble(Some(doc), "describe it");
        assert_eq!(segments.len(), 3);
        assert!(matches!(segments[0], PromptSegment::Instruction(_)));
        assert_eq!(
            segments[1],
            PromptSegment::Media {
                mime_type: "image/png".into(),
                data: vec![0x89, b'P']
            }
        );
        assert_eq!(segments[2], PromptSegment::UserText("describe it".into()));
        assert_eq!(segments[1].text(), None);
    }

    #[test]
    fn instruction_is_always_first() {
        let docs = [
            None,
            Some(ExtractedDocument::Text {
                kind: DocumentKind::Pdf,
                text: String::new(),
            }),
            Some(ExtractedDocument::Media {
                kind: DocumentKind::Video,
                mime_type: "video/mp4".into(),
                data: Vec::new(),
            }),
        ];
        for doc in docs {
            let segments = assemble(doc, "");
            assert!(matches!(segments.first(), Some(PromptSegment::Instruction(_))));
        }
    }
}
