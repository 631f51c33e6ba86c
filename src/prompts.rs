//! Prompt templates for page extraction.
//!
//! Templates are resolved by name. A configured templates directory wins
//! (`<dir>/<name>.txt`), so prompt wording can be changed without a rebuild;
//! otherwise the built-in text compiled into the binary is used.
//!
//! The built-in prompt asks the model to return the page inside a single
//! fenced block. [`crate::pipeline::postprocess::extract_code_blocks`] relies
//! on that convention to drop any conversational text around the answer.

use crate::error::ScribeError;
use std::path::Path;
use tracing::debug;

/// Name of the default page-extraction template.
pub const EXTRACT_TEXT_TEMPLATE: &str = "extract_text_from_image";

/// Built-in text of [`EXTRACT_TEXT_TEMPLATE`].
pub const EXTRACT_TEXT_PROMPT: &str = r#"You are an expert document transcriber. The attached image is one page of a PDF document. Transcribe it into clean, well-structured Markdown.

Follow these rules precisely:

1. TEXT PRESERVATION
   - Transcribe ALL text on the page, completely and accurately
   - Keep the reading order a human would follow (columns left to right)
   - Do not summarise, translate, or paraphrase

2. STRUCTURE
   - Use #, ##, ### for headings that match the visual hierarchy
   - Use - for bullet lists and 1. 2. 3. for numbered lists
   - Use **bold** and *italic* to match visual emphasis

3. TABLES
   - Convert tables to GFM pipe tables with a header separator row

4. FORMULAS
   - Write mathematical expressions in LaTeX: $inline$ and $$display$$

5. WHAT TO IGNORE
   - Page numbers, running headers and footers, decorative lines

6. OUTPUT FORMAT
   - Return the whole page inside ONE fenced code block: ```markdown ... ```
   - Put nothing else inside the block
   - If the page has no text, return an empty fenced block"#;

fn builtin(name: &str) -> Option<&'static str> {
    match name {
        EXTRACT_TEXT_TEMPLATE => Some(EXTRACT_TEXT_PROMPT),
        _ => None,
    }
}

/// Resolve the named template to its instruction text.
///
/// # Errors
/// [`ScribeError::InvalidConfiguration`] when the name is unknown and no
/// templates directory provides it; [`ScribeError::Io`] when the template
/// file exists but cannot be read.
pub fn resolve_prompt(name: &str, templates_dir: Option<&Path>) -> Result<String, ScribeError> {
    if let Some(dir) = templates_dir {
        let path = dir.join(format!("{name}.txt"));
        match std::fs::read_to_string(&path) {
            Ok(text) => {
                debug!("Loaded prompt template {}", path.display());
                return Ok(text);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No template at {}, falling back to built-in", path.display());
            }
            Err(source) => return Err(ScribeError::Io { path, source }),
        }
    }

    builtin(name)
        .map(str::to_string)
        .ok_or_else(|| ScribeError::InvalidConfiguration(format!("unknown prompt template '{name}'")))
}
