use std::collections::HashMap;

use crate::docx::numbering::ensure_bullet_numbering;
use crate::docx::pattern::VariablePattern;
use crate::docx::replace::make_text_run;
use crate::docx::runtext::RunText;
use crate::docx::scan::PlaceholderScanner;
use crate::docx::variables::{Variable, Variables};
use crate::error::Result;
use crate::opc::Package;
use crate::xml::{NodeId, XmlTree};

/// Expand bullet-list placeholders into sequences of bulleted paragraphs.
///
/// A paragraph whose text contains a bullet-list token is treated as a
/// template: one paragraph per item replaces it, each carrying the
/// template's paragraph properties plus bullet numbering, and the template
/// itself is removed. An empty list removes the paragraph without leaving
/// anything behind. Only the first bullet token in a paragraph is honored;
/// the template paragraph's remaining content does not survive expansion.
///
/// The numbering part is bootstrapped lazily, only when a token actually
/// matches.
pub fn replace_bullet_lists(
    tree: &mut XmlTree,
    pkg: &mut Package,
    pattern: &VariablePattern,
    vars: &Variables,
) -> Result<()> {
    let mut lists: HashMap<String, &[String]> = HashMap::new();
    for var in vars.iter() {
        if let Variable::BulletList { token, items } = var {
            lists
                .entry(pattern.ensure_wrapped(token))
                .or_insert(items.as_slice());
        }
    }
    if lists.is_empty() {
        return Ok(());
    }

    let scanner = PlaceholderScanner::new(pattern)?;
    let Some(root) = tree.root_element() else {
        return Ok(());
    };

    let mut num_id: Option<String> = None;
    let mut bootstrap_tried = false;
    let paragraphs: Vec<NodeId> = tree.descendants_named(root, "p");
    for paragraph in paragraphs {
        let view = RunText::build(tree, paragraph);
        let Some(items) = scanner
            .find(view.text())
            .into_iter()
            .find_map(|m| lists.get(m.token.as_str()).copied())
        else {
            continue;
        };

        // A failed bootstrap degrades to plain paragraphs rather than
        // aborting the fill.
        if !bootstrap_tried {
            bootstrap_tried = true;
            num_id = ensure_bullet_numbering(pkg).ok();
        }

        for item in items {
            let bullet = build_bullet_paragraph(tree, paragraph, num_id.as_deref(), item);
            tree.insert_before(paragraph, bullet);
        }
        tree.detach(paragraph);
    }
    Ok(())
}

/// Clone the template paragraph, drop its runs, and turn the clone into a
/// single-run bulleted paragraph holding `text`. The item run is plain;
/// only paragraph-level properties are inherited.
fn build_bullet_paragraph(
    tree: &mut XmlTree,
    template: NodeId,
    num_id: Option<&str>,
    text: &str,
) -> NodeId {
    let paragraph = tree.clone_subtree(template);
    let runs: Vec<NodeId> = tree.children_named(paragraph, "r").collect();
    for run in runs {
        tree.detach(run);
    }

    if let Some(num_id) = num_id {
        let existing_ppr = tree.children_named(paragraph, "pPr").next();
        let ppr = match existing_ppr {
            Some(ppr) => ppr,
            None => {
                let ppr = tree.create_element("w:pPr");
                tree.insert_child(paragraph, 0, ppr);
                ppr
            },
        };
        // Replace any numbering the template carried.
        let stale: Vec<NodeId> = tree.children_named(ppr, "numPr").collect();
        for old in stale {
            tree.detach(old);
        }
        let num_pr = tree.create_element("w:numPr");
        let ilvl = tree.create_element("w:ilvl");
        tree.set_attr(ilvl, "w:val", "0");
        tree.append_child(num_pr, ilvl);
        let num_ref = tree.create_element("w:numId");
        tree.set_attr(num_ref, "w:val", num_id);
        tree.append_child(num_pr, num_ref);
        tree.append_child(ppr, num_pr);
    }

    let run = make_text_run(tree, None, text);
    tree.append_child(paragraph, run);
    paragraph
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opc::constants::part_name;

    const WML: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";

    fn document(body: &str) -> XmlTree {
        let xml = format!(
            r#"<w:document xmlns:w="{}"><w:body>{}</w:body></w:document>"#,
            WML, body
        );
        XmlTree::parse(xml.as_bytes()).unwrap()
    }

    fn body_paragraph_texts(tree: &XmlTree) -> Vec<String> {
        let root = tree.root_element().unwrap();
        tree.descendants_named(root, "p")
            .into_iter()
            .map(|p| RunText::build(tree, p).text().to_string())
            .collect()
    }

    #[test]
    fn test_expansion_in_order_and_template_removed() {
        let mut tree = document(
            "<w:p><w:r><w:t>before</w:t></w:r></w:p>\
             <w:p><w:r><w:t>${items}</w:t></w:r></w:p>\
             <w:p><w:r><w:t>after</w:t></w:r></w:p>",
        );
        let mut pkg = Package::new();
        let mut vars = Variables::new();
        vars.add_bullet_list("items", ["first", "second"]);

        replace_bullet_lists(&mut tree, &mut pkg, &VariablePattern::default(), &vars).unwrap();

        assert_eq!(
            body_paragraph_texts(&tree),
            vec!["before", "first", "second", "after"]
        );
        let xml = String::from_utf8(tree.serialize()).unwrap();
        assert!(!xml.contains("${items}"));
        assert_eq!(xml.matches("<w:numPr>").count(), 2);
    }

    #[test]
    fn test_numbering_bootstrapped_lazily() {
        let mut pkg = Package::new();
        let mut vars = Variables::new();
        vars.add_bullet_list("items", ["a"]);

        // No match: the numbering part must not appear.
        let mut tree = document("<w:p><w:r><w:t>plain</w:t></w:r></w:p>");
        replace_bullet_lists(&mut tree, &mut pkg, &VariablePattern::default(), &vars).unwrap();
        assert!(!pkg.contains_part(part_name::NUMBERING));

        let mut tree = document("<w:p><w:r><w:t>${items}</w:t></w:r></w:p>");
        replace_bullet_lists(&mut tree, &mut pkg, &VariablePattern::default(), &vars).unwrap();
        assert!(pkg.contains_part(part_name::NUMBERING));

        let xml = String::from_utf8(tree.serialize()).unwrap();
        assert!(xml.contains(r#"<w:numId w:val="0""#));
    }

    #[test]
    fn test_empty_list_removes_paragraph() {
        let mut tree = document(
            "<w:p><w:r><w:t>keep</w:t></w:r></w:p>\
             <w:p><w:r><w:t>${items}</w:t></w:r></w:p>",
        );
        let mut pkg = Package::new();
        let mut vars = Variables::new();
        vars.add_bullet_list("items", Vec::<String>::new());

        replace_bullet_lists(&mut tree, &mut pkg, &VariablePattern::default(), &vars).unwrap();
        assert_eq!(body_paragraph_texts(&tree), vec!["keep"]);
    }

    #[test]
    fn test_template_paragraph_properties_survive() {
        let mut tree = document(
            "<w:p><w:pPr><w:jc w:val=\"center\"/></w:pPr><w:r><w:t>${items}</w:t></w:r></w:p>",
        );
        let mut pkg = Package::new();
        let mut vars = Variables::new();
        vars.add_bullet_list("items", ["x", "y"]);

        replace_bullet_lists(&mut tree, &mut pkg, &VariablePattern::default(), &vars).unwrap();
        let xml = String::from_utf8(tree.serialize()).unwrap();
        assert_eq!(xml.matches(r#"<w:jc w:val="center"/>"#).count(), 2);
    }

    #[test]
    fn test_cross_run_bullet_token() {
        let mut tree = document(
            "<w:p><w:r><w:t>${ite</w:t></w:r><w:r><w:t>ms}</w:t></w:r></w:p>",
        );
        let mut pkg = Package::new();
        let mut vars = Variables::new();
        vars.add_bullet_list("items", ["only"]);

        replace_bullet_lists(&mut tree, &mut pkg, &VariablePattern::default(), &vars).unwrap();
        assert_eq!(body_paragraph_texts(&tree), vec!["only"]);
    }
}
