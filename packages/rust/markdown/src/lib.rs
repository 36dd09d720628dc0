//! Skill document parsing.
//!
//! Splits a `SKILL.md` into YAML frontmatter and Markdown body, and provides
//! the text helpers validators and the catalog writer share.

mod frontmatter;
mod text;

pub use frontmatter::{FrontmatterError, ParsedDocument, parse_document};
pub use text::{MAX_SLUG_LEN, excerpt, first_paragraph, line_count, slugify, squash_whitespace};
