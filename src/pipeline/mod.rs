//! Low-level document stages used by the extractors.
//!
//! Each submodule implements exactly one step and knows nothing about the
//! cascade; the extractors in [`crate::extractor`] compose them.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ text / layout ──▶ (extractor) ──▶ postprocess
//!   │                                              ▲
//!   └────▶ render ──▶ encode ──▶ (OCR model) ──────┘
//! ```
//!
//! 1. [`input`]: canonicalise a path, URL or byte buffer to a local file
//! 2. [`text`]: lopdf page count and plain text (pure Rust)
//! 3. [`layout`]: pdfium page text, image counts and table heuristic
//! 4. [`render`]: rasterise leading pages for the OCR fallback
//! 5. [`encode`]: PNG + base64 for the vision model
//! 6. [`postprocess`]: deterministic cleanup of the winning content

pub mod encode;
pub mod input;
pub mod layout;
pub mod postprocess;
pub mod render;
pub mod text;
