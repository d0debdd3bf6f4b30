//! Local multi-method extraction with length scoring.
//!
//! Each requested [`LocalMethod`] runs independently against the same
//! document; a failing method is logged and skipped. The longest output
//! wins, ties going to the method listed first.

use super::{join_pages, AttemptOptions, Backend, Extracted, Extractor, Outcome};
use crate::config::LocalMethod;
use crate::error::ExtractionError;
use crate::pipeline::input::Document;
use crate::pipeline::{layout, text};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Returned when every local method failed.
pub const LOCAL_FAILURE_SENTINEL: &str =
    "Failed to extract content from PDF using all available methods.";

/// Text produced by one local method.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodText {
    pub text: String,
    pub page_count: usize,
}

/// Runs one local method. [`PdfMethodRunner`] is the real implementation.
#[async_trait]
pub trait MethodRunner: Send + Sync {
    async fn run(
        &self,
        document: &Document,
        method: LocalMethod,
    ) -> Result<MethodText, ExtractionError>;
}

/// lopdf for plain text, pdfium for the layout-aware methods.
#[derive(Debug, Clone, Default)]
pub struct PdfMethodRunner {
    pub password: Option<String>,
}

impl PdfMethodRunner {
    pub fn new(password: Option<String>) -> Self {
        Self { password }
    }
}

#[async_trait]
impl MethodRunner for PdfMethodRunner {
    async fn run(
        &self,
        document: &Document,
        method: LocalMethod,
    ) -> Result<MethodText, ExtractionError> {
        let password = self.password.as_deref();
        match method {
            LocalMethod::PlainText => {
                let pages = text::page_texts(document.path(), password).await?;
                Ok(MethodText {
                    text: join_pages(pages.iter().enumerate().map(|(i, t)| (i + 1, t.as_str()))),
                    page_count: pages.len(),
                })
            }
            LocalMethod::TextTables => {
                let pages = layout::read_layout(document.path(), password).await?;
                Ok(MethodText {
                    text: render_text_tables(&pages),
                    page_count: pages.len(),
                })
            }
            LocalMethod::TextImages => {
                let pages = layout::read_layout(document.path(), password).await?;
                Ok(MethodText {
                    text: render_text_images(&pages),
                    page_count: pages.len(),
                })
            }
        }
    }
}

fn render_text_tables(pages: &[layout::PageLayout]) -> String {
    let mut parts = vec![join_pages(
        pages.iter().enumerate().map(|(i, p)| (i + 1, p.text.as_str())),
    )];
    for (i, page) in pages.iter().enumerate() {
        for table in layout::detect_tables(&page.text) {
            let md = table_to_markdown(&table);
            if !md.is_empty() {
                parts.push(format!("\n### Table (Page {})\n\n{}\n", i + 1, md));
            }
        }
    }
    parts.join("\n")
}

fn render_text_images(pages: &[layout::PageLayout]) -> String {
    let bodies: Vec<String> = pages
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let mut body = p.text.trim().to_string();
            for k in 1..=p.image_count {
                body.push_str(&format!("\n\n*[Image {k} on page {}]*", i + 1));
            }
            body
        })
        .collect();
    join_pages(bodies.iter().enumerate().map(|(i, b)| (i + 1, b.as_str())))
}

/// Render rows as a GFM table: header, `|---|` separator, data rows.
///
/// Missing cells are padded with empty strings; `|` inside a cell is
/// escaped. Fewer than two rows renders as an empty string.
pub fn table_to_markdown<S: AsRef<str>>(rows: &[Vec<S>]) -> String {
    if rows.len() < 2 {
        return String::new();
    }
    let width = rows[0].len();
    let render_row = |row: &Vec<S>| {
        let mut cells: Vec<String> = row
            .iter()
            .map(|c| c.as_ref().replace('|', "\\|"))
            .collect();
        if cells.len() < width {
            cells.resize(width, String::new());
        }
        format!("| {} |", cells.join(" | "))
    };

    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(render_row(&rows[0]));
    lines.push(format!("|{}", "---|".repeat(width)));
    lines.extend(rows[1..].iter().map(render_row));
    lines.join("\n")
}

/// Outcome of every requested method, in request order.
#[derive(Debug, Clone)]
pub struct LocalExtraction {
    pub results: Vec<(LocalMethod, Result<MethodText, String>)>,
}

impl LocalExtraction {
    /// Longest successful output; the first listed method wins ties.
    pub fn best(&self) -> Option<(LocalMethod, &MethodText)> {
        let mut best: Option<(LocalMethod, &MethodText, usize)> = None;
        for (method, result) in &self.results {
            if let Ok(text) = result {
                let len = text.text.chars().count();
                if best.is_none_or(|(_, _, l)| len > l) {
                    best = Some((*method, text, len));
                }
            }
        }
        best.map(|(m, t, _)| (m, t))
    }

    /// Best text, or [`LOCAL_FAILURE_SENTINEL`] when every method failed.
    pub fn content(&self) -> &str {
        self.best()
            .map(|(_, t)| t.text.as_str())
            .unwrap_or(LOCAL_FAILURE_SENTINEL)
    }

    fn failure_summary(&self) -> String {
        let details: Vec<String> = self
            .results
            .iter()
            .filter_map(|(m, r)| r.as_ref().err().map(|e| format!("{m}: {e}")))
            .collect();
        if details.is_empty() {
            LOCAL_FAILURE_SENTINEL.to_string()
        } else {
            format!("{LOCAL_FAILURE_SENTINEL} ({})", details.join("; "))
        }
    }
}

/// Run `methods` one after another; a failing method never stops the rest.
pub async fn extract_local(
    document: &Document,
    methods: &[LocalMethod],
    runner: &dyn MethodRunner,
) -> LocalExtraction {
    let mut results = Vec::with_capacity(methods.len());
    for &method in methods {
        match runner.run(document, method).await {
            Ok(text) => {
                debug!(
                    "Local method {}: {} chars over {} pages",
                    method,
                    text.text.chars().count(),
                    text.page_count
                );
                results.push((method, Ok(text)));
            }
            Err(e) => {
                warn!("Local method {} failed: {}", method, e);
                results.push((method, Err(e.to_string())));
            }
        }
    }
    LocalExtraction { results }
}

/// [`Extractor`] over [`extract_local`].
pub struct LocalMultiExtractor {
    runner: Arc<dyn MethodRunner>,
    methods: Vec<LocalMethod>,
}

impl LocalMultiExtractor {
    pub fn new(runner: Arc<dyn MethodRunner>, methods: Vec<LocalMethod>) -> Self {
        Self { runner, methods }
    }
}

#[async_trait]
impl Extractor for LocalMultiExtractor {
    fn backend(&self) -> Backend {
        Backend::LocalMultiMethod
    }

    async fn attempt(&self, document: &Document, _options: &AttemptOptions) -> Outcome {
        let extraction = extract_local(document, &self.methods, self.runner.as_ref()).await;
        match extraction.best() {
            Some((method, text)) => {
                info!("Local extraction: best method {}", method);
                Outcome::Extracted(
                    Extracted::new(text.text.clone(), format!("local:{method}"))
                        .with_page_count(text.page_count),
                )
            }
            None => Outcome::Failed(extraction.failure_summary()),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted [`MethodRunner`] for unit tests.

    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    pub struct FakeRunner {
        pub outputs: HashMap<LocalMethod, Result<String, String>>,
        pub calls: AtomicUsize,
    }

    impl FakeRunner {
        pub fn with(mut self, method: LocalMethod, out: Result<&str, &str>) -> Self {
            self.outputs
                .insert(method, out.map(str::to_string).map_err(str::to_string));
            self
        }
    }

    #[async_trait]
    impl MethodRunner for FakeRunner {
        async fn run(
            &self,
            _document: &Document,
            method: LocalMethod,
        ) -> Result<MethodText, ExtractionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.outputs.get(&method) {
                Some(Ok(text)) => Ok(MethodText {
                    text: text.clone(),
                    page_count: 1,
                }),
                Some(Err(e)) => Err(ExtractionError::MethodFailed {
                    method: method.to_string(),
                    detail: e.clone(),
                }),
                None => Err(ExtractionError::MethodFailed {
                    method: method.to_string(),
                    detail: "not scripted".into(),
                }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::FakeRunner;
    use super::*;
    use std::sync::atomic::Ordering;

    fn doc() -> Document {
        Document::from_path("/unused.pdf")
    }

    #[test]
    fn table_with_empty_cell() {
        let rows = vec![
            vec!["Drug", "Dose", "Effect"],
            vec!["A", "", "Lower BP"],
            vec!["B", "20mg", "None"],
        ];
        let md = table_to_markdown(&rows);
        let lines: Vec<&str> = md.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "| Drug | Dose | Effect |");
        assert_eq!(lines[1], "|---|---|---|");
        assert_eq!(lines[1].matches("---").count(), 3);
        assert_eq!(lines[2], "| A |  | Lower BP |");
        assert_eq!(lines[3], "| B | 20mg | None |");
    }

    #[test]
    fn short_rows_are_padded_and_pipes_escaped() {
        let rows = vec![vec!["a", "b", "c"], vec!["x|y"]];
        let md = table_to_markdown(&rows);
        assert_eq!(md.lines().nth(2), Some("| x\\|y |  |  |"));
    }

    #[test]
    fn single_row_table_is_empty() {
        assert_eq!(table_to_markdown(&[vec!["only", "header"]]), "");
        assert_eq!(table_to_markdown::<&str>(&[]), "");
    }

    #[test]
    fn text_tables_appends_table_blocks() {
        let pages = vec![layout::PageLayout {
            text: "Intro\nArm    N\nA      10\nB      12".into(),
            image_count: 0,
        }];
        let out = render_text_tables(&pages);
        assert!(out.starts_with("## Page 1\n\n"));
        assert!(out.contains("\n### Table (Page 1)\n\n| Arm | N |\n|---|---|\n| A | 10 |\n| B | 12 |\n"));
    }

    #[test]
    fn text_images_adds_markers() {
        let pages = vec![
            layout::PageLayout {
                text: "Figure page".into(),
                image_count: 2,
            },
            layout::PageLayout {
                text: "Plain".into(),
                image_count: 0,
            },
        ];
        let out = render_text_images(&pages);
        assert!(out.contains("*[Image 1 on page 1]*"));
        assert!(out.contains("*[Image 2 on page 1]*"));
        assert!(!out.contains("on page 2]*"));
    }

    #[tokio::test]
    async fn longest_output_wins() {
        let runner = FakeRunner::default()
            .with(LocalMethod::TextTables, Ok("short"))
            .with(LocalMethod::TextImages, Ok("much longer output"))
            .with(LocalMethod::PlainText, Ok("mid length"));
        let ex = extract_local(&doc(), &LocalMethod::default_order(), &runner).await;

        let (method, best) = ex.best().unwrap();
        assert_eq!(method, LocalMethod::TextImages);
        for (_, r) in &ex.results {
            let len = r.as_ref().unwrap().text.chars().count();
            assert!(best.text.chars().count() >= len);
        }
    }

    #[tokio::test]
    async fn ties_go_to_first_listed() {
        let runner = FakeRunner::default()
            .with(LocalMethod::PlainText, Ok("abcd"))
            .with(LocalMethod::TextTables, Ok("wxyz"));
        let order = vec![LocalMethod::PlainText, LocalMethod::TextTables];
        let ex = extract_local(&doc(), &order, &runner).await;
        assert_eq!(ex.best().unwrap().0, LocalMethod::PlainText);

        let reversed = vec![LocalMethod::TextTables, LocalMethod::PlainText];
        let ex = extract_local(&doc(), &reversed, &runner).await;
        assert_eq!(ex.best().unwrap().0, LocalMethod::TextTables);
    }

    #[tokio::test]
    async fn length_is_counted_in_chars() {
        // 4 chars but 8 bytes vs 5 ASCII chars.
        let runner = FakeRunner::default()
            .with(LocalMethod::TextTables, Ok("éééé"))
            .with(LocalMethod::PlainText, Ok("abcde"));
        let order = vec![LocalMethod::TextTables, LocalMethod::PlainText];
        let ex = extract_local(&doc(), &order, &runner).await;
        assert_eq!(ex.best().unwrap().0, LocalMethod::PlainText);
    }

    #[tokio::test]
    async fn failing_method_does_not_stop_others() {
        let runner = FakeRunner::default()
            .with(LocalMethod::TextTables, Err("pdfium missing"))
            .with(LocalMethod::PlainText, Ok("text"));
        let order = vec![LocalMethod::TextTables, LocalMethod::PlainText];
        let ex = extract_local(&doc(), &order, &runner).await;

        assert_eq!(runner.calls.load(Ordering::SeqCst), 2);
        assert_eq!(ex.best().unwrap().0, LocalMethod::PlainText);
    }

    #[tokio::test]
    async fn all_failed_yields_sentinel() {
        let runner = FakeRunner::default();
        let ex = extract_local(&doc(), &LocalMethod::default_order(), &runner).await;
        assert!(ex.best().is_none());
        assert_eq!(ex.content(), LOCAL_FAILURE_SENTINEL);

        let extractor = LocalMultiExtractor::new(Arc::new(runner), LocalMethod::default_order());
        let options = AttemptOptions {
            model_id: "m".into(),
            guidance: Default::default(),
        };
        match extractor.attempt(&doc(), &options).await {
            Outcome::Failed(msg) => assert!(msg.starts_with(LOCAL_FAILURE_SENTINEL)),
            other => panic!("expected failure, got {other:?}"),
        }
    }
}
