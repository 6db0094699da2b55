//! Pipeline stages for file-to-JSON extraction.
//!
//! Each submodule implements one step. A file moves through them inside its
//! own failure boundary; [`crate::batch`] drives many files at once.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ classify ──▶ orchestrate ──▶ encode ──▶ llm ──▶ validate
//! (URL/path) (category)   (→ PDF?)      (payload)  (call)  (JSON object)
//! ```
//!
//! 1. [`input`]: canonicalise the user-supplied path or URL to a local file
//! 2. [`classify`]: extension first, magic bytes when the extension is missing
//!    or unknown
//! 3. [`orchestrate`]: send native files as-is; run the [`registry`]'s
//!    converter ([`excel`], [`word`], or the [`text`] fallback) on the
//!    blocking pool for the rest, writing into [`scratch`] space
//! 4. [`encode`]: base64 attachment, inlined text, or pages rendered via
//!    [`render`]
//! 5. [`llm`]: one extraction call behind the [`llm::ExtractionClient`]
//!    trait; the only stage with network I/O besides URL downloads
//! 6. [`validate`]: parse the reply into a JSON object, re-asking with the
//!    parse error when it is not one

pub mod classify;
pub mod encode;
#[cfg(feature = "excel")]
pub mod excel;
pub mod input;
pub mod llm;
pub mod orchestrate;
pub mod pdf_writer;
pub mod registry;
pub mod render;
pub mod scratch;
pub mod text;
pub mod validate;
#[cfg(feature = "word")]
pub mod word;
