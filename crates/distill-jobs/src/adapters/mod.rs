//! Built-in extractors.
//!
//! Source-specific extraction (HTML readability, transcripts, document
//! parsing) lives outside this crate; these cover plain text files and
//! plain web pages.

mod http_text;
mod text_file;

pub use http_text::HttpTextExtractor;
pub use text_file::TextFileExtractor;
