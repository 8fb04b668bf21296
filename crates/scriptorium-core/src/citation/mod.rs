//! Citation parsing, formatting and ordering.
//!
//! Classical texts are addressed by canonical references (`Iliad 1.2`,
//! `Republic 327a`). A [`CitationSchema`] names the levels a work uses and
//! what each level's locators look like; a [`CitationPath`] is a parsed,
//! totally ordered reference under one schema.
//!
//! ```
//! use scriptorium_core::citation::CitationSchema;
//!
//! let schema = CitationSchema::numeric(&["book", "line"]);
//! let path = schema.parse("1.10").unwrap();
//! assert_eq!(schema.format(&path), "1.10");
//! assert!(schema.parse("1.2").unwrap() < path);
//! ```

mod path;
mod schema;

pub use path::{CitationPath, Locator};
pub use schema::{CitationLevel, CitationSchema, LevelKind, DEFAULT_SEPARATOR};
