//! Prompt text sent to the remote parser and the generative model.
//!
//! Every prompt lives here so wording changes touch exactly one place and
//! unit tests can inspect prompts without calling a model.

use crate::config::EnhanceTask;

/// Guidance that asks the remote model to paraphrase instead of quoting.
///
/// Used by default: verbatim reproduction of journal text is the main
/// trigger for recitation rejections.
pub const PARAPHRASE_GUIDANCE: &str = r#"IMPORTANT: To avoid content policy issues, DO NOT copy text verbatim. Instead:

1. SUMMARIZE and PARAPHRASE all text content using your own words
2. Extract STRUCTURE and DATA, not exact wording:
   - Create bullet points of main concepts
   - Identify key themes and topics
   - Focus on factual information (numbers, dates, names)
3. For TABLES: Extract as structured markdown tables with all data
4. For FIGURES: Describe the visual content, data trends, and key observations
5. For EQUATIONS: Preserve mathematical formulas exactly
6. For REFERENCES: List authors, titles, and publication info
7. Output format:
   - Use hierarchical headings (##, ###)
   - Create summaries for each section
   - Use bullet points for key information
   - DO NOT reproduce full paragraphs of original text
8. Focus on creating an ANALYTICAL SUMMARY rather than text extraction"#;

/// Guidance for a faithful structural parse of a medical journal article.
pub const FAITHFUL_GUIDANCE: &str = r#"You are parsing a medical journal article. Pay special attention to:
1. Tables - extract all data into markdown tables with proper headers
2. Figures - describe each figure in detail including axes, data points, and trends
3. References - extract all references in proper citation format
4. Sections - maintain proper section hierarchy (Abstract, Introduction, Methods, Results, Discussion)
5. Medical terms - preserve exact terminology and units
6. Equations - convert to proper markdown math notation"#;

/// Instruction sent with each rasterised page during the OCR fallback.
pub const OCR_PROMPT: &str = "Extract all text from this image.
Format it as clean Markdown with proper structure.
Preserve all content including tables, formulas, and technical terms.
Output ONLY the Markdown content, without ```markdown fences or commentary.";

const FORMAT_TEMPLATE: &str = "Format the following text as clean Markdown:
- Preserve all content
- Add proper headers (##, ###) for sections
- Format lists properly
- Clean up spacing and line breaks
- Preserve technical terms and numbers exactly

Text:
";

const SUMMARIZE_TEMPLATE: &str = "Create a detailed summary of the following text in Markdown format:
- Include all key points
- Maintain section structure
- Preserve important data and numbers
- Use bullet points for clarity

Text:
";

const MEDICAL_TEMPLATE: &str = "Format this medical/scientific document as structured Markdown:
- Identify and format sections (Abstract, Introduction, Methods, Results, Discussion)
- Preserve all medical terminology exactly
- Format data and statistics clearly
- Extract key findings as bullet points

Text:
";

/// Build the enhancement prompt for `task` around already-truncated text.
pub fn enhance_prompt(task: EnhanceTask, text: &str) -> String {
    let template = match task {
        EnhanceTask::Format => FORMAT_TEMPLATE,
        EnhanceTask::Summarize => SUMMARIZE_TEMPLATE,
        EnhanceTask::MedicalStructure => MEDICAL_TEMPLATE,
    };
    format!("{template}{text}")
}
