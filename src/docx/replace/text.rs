use std::collections::HashMap;

use crate::docx::pattern::VariablePattern;
use crate::docx::replace::make_text_run;
use crate::docx::runtext::RunText;
use crate::docx::scan::PlaceholderScanner;
use crate::docx::variables::{Variable, Variables};
use crate::error::Result;
use crate::xml::{NodeId, XmlTree};

/// Replace every known scalar placeholder in the part tree.
///
/// Paragraphs are processed independently; within a paragraph, matches are
/// applied in decreasing start order so offsets of pending matches survive
/// each splice. Tokens with no matching variable are left untouched.
pub fn replace_text(tree: &mut XmlTree, pattern: &VariablePattern, vars: &Variables) -> Result<()> {
    let mut values: HashMap<String, &str> = HashMap::new();
    for var in vars.iter() {
        if let Variable::Text { token, value } = var {
            values
                .entry(pattern.ensure_wrapped(token))
                .or_insert(value.as_str());
        }
    }
    if values.is_empty() {
        return Ok(());
    }

    let scanner = PlaceholderScanner::new(pattern)?;
    let Some(root) = tree.root_element() else {
        return Ok(());
    };

    let paragraphs: Vec<NodeId> = tree.descendants_named(root, "p");
    for paragraph in paragraphs {
        let view = RunText::build(tree, paragraph);
        let mut matches: Vec<(usize, usize, &str)> = scanner
            .find(view.text())
            .into_iter()
            .filter_map(|m| {
                values
                    .get(m.token.as_str())
                    .map(|&value| (m.start, m.end, value))
            })
            .collect();
        matches.sort_by(|a, b| b.0.cmp(&a.0));

        // The view built for scanning serves the first splice; later
        // splices need a fresh one.
        let mut view = Some(view);
        for (start, end, value) in matches {
            let current = view
                .take()
                .unwrap_or_else(|| RunText::build(tree, paragraph));
            current.replace_range(
                tree,
                start,
                end,
                Box::new(move |tree, _paragraph, donor| {
                    vec![make_text_run(tree, donor, value)]
                }),
            );
        }
    }
    Ok(())
}
