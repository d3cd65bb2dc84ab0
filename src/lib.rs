//! Docstamp - a DOCX template substitution engine.
//!
//! Load a `.docx` template, declare variables (scalar text, images, bullet
//! lists, tables), and fill every placeholder in the main document, headers
//! and footers while preserving the surrounding formatting.
//!
//! Placeholders are delimiter-wrapped tokens (default `${name}`) located in
//! run-level text. A token may span several adjacent runs; replacement keeps
//! the formatting of the run in which the token starts.
//!
//! # Examples
//!
//! ```rust,no_run
//! use docstamp::{Docx, Variables};
//!
//! let mut doc = Docx::open("invoice.docx")?;
//! let mut vars = Variables::new();
//! vars.add_text("${customer}", "Acme Corp");
//! vars.add_bullet_list("${lines}", ["First item", "Second item"]);
//! let outcome = doc.fill_template(&vars);
//! assert!(outcome.is_ok());
//! doc.save_as("invoice-filled.docx")?;
//! # Ok::<(), docstamp::TemplateError>(())
//! ```

pub mod docx;
pub mod error;
pub mod opc;
pub mod xml;

pub use docx::pattern::VariablePattern;
pub use docx::variables::{CellValue, TableColumnError, TableVariable, Variable, Variables};
pub use docx::{Docx, FillOutcome};
pub use error::{Result, TemplateError};
pub use opc::package::Package;
