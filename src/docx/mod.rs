//! Template-filling engine for WordprocessingML documents.
//!
//! [`Docx`] wraps an OPC package and drives the four placeholder replacers
//! over the main document, headers and footers.

pub mod numbering;
pub mod pattern;
pub mod replace;
pub mod runtext;
pub mod scan;
pub mod variables;

use std::io::{Read, Seek, Write};
use std::path::Path;

use crate::docx::pattern::VariablePattern;
use crate::docx::replace::{replace_bullet_lists, replace_images, replace_tables, replace_text};
use crate::docx::runtext::RunText;
use crate::docx::scan::PlaceholderScanner;
use crate::docx::variables::{Variable, Variables};
use crate::error::{Result, TemplateError};
use crate::opc::Package;
use crate::opc::constants::part_name;
use crate::xml::{NodeId, XmlTree};

/// Result of one fill pass over a document.
///
/// The fill keeps going when an individual part fails; every failure is
/// collected here along with the part it came from.
#[derive(Debug, Default)]
pub struct FillOutcome {
    /// Parts that could not be processed, with the error each one raised.
    pub part_errors: Vec<(String, TemplateError)>,
    /// Whether any table variable had columns of unequal length (rows were
    /// truncated to the shortest column).
    pub column_mismatch: bool,
}

impl FillOutcome {
    /// Whether the fill completed with no part errors and no truncation.
    pub fn is_clean(&self) -> bool {
        self.part_errors.is_empty() && !self.column_mismatch
    }
}

/// A WordprocessingML document opened for template filling.
pub struct Docx {
    package: Package,
    pattern: VariablePattern,
}

impl Docx {
    /// Open a `.docx` file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::from_package(Package::open(path)?))
    }

    /// Load a document from a reader.
    pub fn from_reader<R: Read + Seek>(reader: R) -> Result<Self> {
        Ok(Self::from_package(Package::from_reader(reader)?))
    }

    /// Wrap an already-loaded package.
    pub fn from_package(package: Package) -> Self {
        Self {
            package,
            pattern: VariablePattern::default(),
        }
    }

    /// Change the placeholder delimiter pair (default `${` / `}`).
    pub fn set_variable_pattern(&mut self, pattern: VariablePattern) {
        self.pattern = pattern;
    }

    /// The active placeholder delimiter pair.
    #[inline]
    pub fn variable_pattern(&self) -> &VariablePattern {
        &self.pattern
    }

    /// The underlying package.
    #[inline]
    pub fn package(&self) -> &Package {
        &self.package
    }

    /// Mutable access to the underlying package.
    #[inline]
    pub fn package_mut(&mut self) -> &mut Package {
        &mut self.package
    }

    /// Consume the document, yielding the package.
    pub fn into_package(self) -> Package {
        self.package
    }

    /// Parts subject to template filling: the main document plus every
    /// header and footer present in the container.
    fn template_parts(&self) -> Vec<String> {
        let mut parts = Vec::new();
        if self.package.contains_part(part_name::DOCUMENT) {
            parts.push(part_name::DOCUMENT.to_string());
        }
        for prefix in ["word/header", "word/footer"] {
            for name in self.package.part_names() {
                if name.starts_with(prefix) && name.ends_with(".xml") {
                    parts.push(name.to_string());
                }
            }
        }
        parts
    }

    /// Plain text of the main document: paragraph texts joined by `\n`.
    pub fn read_text_content(&self) -> Result<String> {
        let tree = self.parse_part(part_name::DOCUMENT)?;
        let Some(root) = tree.root_element() else {
            return Ok(String::new());
        };
        let lines: Vec<String> = tree
            .descendants_named(root, "p")
            .into_iter()
            .map(|p| RunText::build(&tree, p).text().to_string())
            .collect();
        Ok(lines.join("\n"))
    }

    /// Every placeholder token in the template, wrapped form, deduplicated
    /// in first-appearance order (main document first, then headers, then
    /// footers).
    pub fn find_variables(&self) -> Result<Vec<String>> {
        let scanner = PlaceholderScanner::new(&self.pattern)?;
        let mut seen = Vec::new();
        for part in self.template_parts() {
            let tree = self.parse_part(&part)?;
            let Some(root) = tree.root_element() else {
                continue;
            };
            for paragraph in tree.descendants_named(root, "p") {
                let view = RunText::build(&tree, paragraph);
                for m in scanner.find(view.text()) {
                    if !seen.contains(&m.token) {
                        seen.push(m.token);
                    }
                }
            }
        }
        Ok(seen)
    }

    /// Declared table tokens (wrapped form) that appear in no scanned part.
    ///
    /// A non-empty result means a fill would leave those columns unused;
    /// callers can surface this before committing to a fill.
    pub fn validate_table_placeholders(&self, vars: &Variables) -> Result<Vec<String>> {
        let present = self.find_variables()?;
        let mut missing = Vec::new();
        for var in vars.iter() {
            if let Variable::Table(table) = var {
                for token in table.tokens() {
                    let wrapped = self.pattern.ensure_wrapped(token);
                    if !present.contains(&wrapped) && !missing.contains(&wrapped) {
                        missing.push(wrapped);
                    }
                }
            }
        }
        Ok(missing)
    }

    /// Fill every placeholder the catalog knows about, across the main
    /// document, headers and footers.
    ///
    /// Replacers run in a fixed order per part: scalars, images, bullet
    /// lists, tables. A part that fails is recorded in the outcome and the
    /// remaining parts are still processed. Unknown tokens stay verbatim.
    pub fn fill_template(&mut self, vars: &Variables) -> Result<FillOutcome> {
        if !self.package.contains_part(part_name::DOCUMENT) {
            return Err(TemplateError::PartNotFound(part_name::DOCUMENT.to_string()));
        }
        let mut outcome = FillOutcome::default();
        for part in self.template_parts() {
            match self.fill_part(&part, vars) {
                Ok(mismatch) => outcome.column_mismatch |= mismatch,
                Err(e) => outcome.part_errors.push((part, e)),
            }
        }
        Ok(outcome)
    }

    fn fill_part(&mut self, part: &str, vars: &Variables) -> Result<bool> {
        let bytes = self
            .package
            .read_part(part)
            .ok_or_else(|| TemplateError::PartNotFound(part.to_string()))?;
        let mut tree = XmlTree::parse(bytes).map_err(|e| TemplateError::Xml(e.to_string()))?;

        let root = tree
            .root_element()
            .ok_or_else(|| TemplateError::MissingBody(part.to_string()))?;
        // Headers and footers have their own root elements; only the main
        // document is required to carry a body.
        if part == part_name::DOCUMENT && !has_child(&tree, root, "body") {
            return Err(TemplateError::MissingBody(part.to_string()));
        }

        let baseline = tree.serialize();
        replace_text(&mut tree, &self.pattern, vars)?;
        replace_images(&mut tree, &mut self.package, part, &self.pattern, vars)?;
        replace_bullet_lists(&mut tree, &mut self.package, &self.pattern, vars)?;
        let mismatch = replace_tables(&mut tree, &mut self.package, part, &self.pattern, vars)?;

        // An untouched part keeps its original bytes.
        let filled = tree.serialize();
        if filled != baseline {
            self.package.write_part(part, filled);
        }
        Ok(mismatch)
    }

    fn parse_part(&self, part: &str) -> Result<XmlTree> {
        let bytes = self
            .package
            .read_part(part)
            .ok_or_else(|| TemplateError::PartNotFound(part.to_string()))?;
        XmlTree::parse(bytes).map_err(|e| TemplateError::Xml(e.to_string()))
    }

    /// Write the filled document to a file.
    pub fn save_as<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.package.save_as(path)?;
        Ok(())
    }

    /// Write the filled document to any writer.
    pub fn write_to<W: Write + Seek>(&self, writer: W) -> Result<()> {
        self.package.write_to(writer)?;
        Ok(())
    }
}

fn has_child(tree: &XmlTree, id: NodeId, local: &str) -> bool {
    tree.children_named(id, local).next().is_some()
}
