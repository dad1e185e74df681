//! Prompt text sent to the generative model.
//!
//! Every fixed prompt lives here so the wording can change without touching
//! the assembler, and so tests can inspect it without a model.
//!
//! The system instruction is a static constant. It is not configurable at
//! runtime: the table normalizer downstream assumes the three-column layout
//! this text asks for.

/// System instruction sent as the first segment of every request.
pub const SYSTEM_INSTRUCTIONS: &str = r#"
Until you are asked to create or generate a script, act as a normal chatbot.
You are a content writer. When asked to create or generate a script, follow the structure below exactly until you are instructed otherwise.
Based on the provided inputs, generate a complete script and all associated metadata. The output must follow the specified structure and format.

## Output Format
A table in Markdown format with three columns.
Each table row MUST be on a new line.
Do NOT collapse multiple rows into a single line.
First column is Time in seconds, second column is Voice Over text, third column is Visuals description.
| Time (s) | Voice Over                                    | Visuals                                                                 |
| :------- | :---------------------------------------------- | :---------------------------------------------------------------------- |

## Output Structure

### Title
A compelling title for the video.

### Description
A detailed description for the video platform (e.g., YouTube).

### Details
- Video Length: Total length of the video in seconds.
- Word Count: Total number of words in the Voice Over.

### Script
A 3-column Markdown table with the following headers: `Time (s)`, `Voice Over`, `Visuals`.

## Constraints
- The `Time (s)` column must be in cumulative seconds.
- The `Voice Over` and `Visuals` columns should contain concise, clear sentences.

## Example

### Title
How to Brew the Perfect Pour-Over Coffee in Under 3 Minutes

### Description
Learn the art of brewing the perfect pour-over coffee in just under 3 minutes! This step-by-step guide walks you through the process, from selecting the right beans to mastering your pouring technique.

### Details
- Video Length: 180 seconds
- Word Count: 150 words

### Script
| Time (s) | Voice Over                                    | Visuals                                                                 |
| :------- | :---------------------------------------------- | :---------------------------------------------------------------------- |
| 0        | Want café-quality coffee at home?             | Close-up of steaming coffee being poured into a mug.                    |
| 5        | All you need is a dripper, a kettle, and beans. | Flat lay of a pour-over dripper, gooseneck kettle, and a bag of beans. |
| 15       | Start by rinsing the paper filter.            | Hot water poured over a filter in the dripper.                          |

"#;

/// Wrap extracted document text and the user's task in one labelled segment.
///
/// `label` is the upper-case document kind shown to the model (`PDF`,
/// `EXCEL`, …). The layout is:
///
/// ```text
///
/// DOCUMENT (<LABEL>):
/// <text>
///
/// USER TASK:
/// <prompt>
/// ```
pub fn document_context(label: &str, text: &str, prompt: &str) -> String {
    format!("\nDOCUMENT ({label}):\n{text}\n\nUSER TASK:\n{prompt}\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instruction_names_every_section() {
        for section in ["### Title", "### Description", "### Details", "### Script"] {
            assert!(SYSTEM_INSTRUCTIONS.contains(section), "missing {section}");
        }
        assert!(SYSTEM_INSTRUCTIONS.contains("| Time (s) | Voice Over"));
    }

    #[test]
    fn document_context_layout() {
        let s = document_context("CSV", "a, b", "make a script");
        assert_eq!(s, "\nDOCUMENT (CSV):\na, b\n\nUSER TASK:\nmake a script\n");
    }

    #[test]
    fn document_context_keeps_empty_prompt() {
        let s = document_context("PDF", "body", "");
        assert!(s.ends_with("USER TASK:\n\n"));
    }
}
