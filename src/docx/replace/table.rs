use std::collections::{HashMap, HashSet};
use std::io::Cursor;

use image::ImageFormat;

use crate::docx::pattern::VariablePattern;
use crate::docx::replace::image::build_drawing_run;
use crate::docx::replace::{make_text_run, register_image};
use crate::docx::runtext::RunText;
use crate::docx::scan::PlaceholderScanner;
use crate::docx::variables::{CellValue, TableVariable, Variable, Variables};
use crate::error::Result;
use crate::opc::Package;
use crate::xml::{NodeId, XmlTree};

/// Expand table placeholders by replicating template rows.
///
/// For each `w:tbl`, the first row containing every column token of some
/// table variable (variables checked in declaration order) becomes the
/// template row. It is cloned once per data row, each clone's tokens
/// replaced by that row's cell values, and then removed. One template row
/// is expanded per table.
///
/// Columns of unequal length are reconciled to the shortest; the returned
/// flag reports whether any truncation happened. A reconciled length of
/// zero deletes the template row outright.
pub fn replace_tables(
    tree: &mut XmlTree,
    pkg: &mut Package,
    part: &str,
    pattern: &VariablePattern,
    vars: &Variables,
) -> Result<bool> {
    let tables: Vec<&TableVariable> = vars
        .iter()
        .filter_map(|v| match v {
            Variable::Table(t) => Some(t),
            _ => None,
        })
        .collect();
    if tables.is_empty() {
        return Ok(false);
    }

    let scanner = PlaceholderScanner::new(pattern)?;
    let Some(root) = tree.root_element() else {
        return Ok(false);
    };

    let mut mismatch = false;
    let table_nodes: Vec<NodeId> = tree.descendants_named(root, "tbl");
    for tbl in table_nodes {
        let Some((template, table)) = find_template_row(tree, tbl, &scanner, pattern, &tables)
        else {
            continue;
        };

        let (row_count, truncated) = table.validated_row_count();
        mismatch |= truncated;

        let mut cells_by_token: HashMap<String, &[CellValue]> = HashMap::new();
        for column in table.columns() {
            cells_by_token
                .entry(pattern.ensure_wrapped(column.token()))
                .or_insert(column.cells());
        }

        // Reverse insertion after the template keeps the data order.
        for row_index in (0..row_count).rev() {
            let clone = tree.clone_subtree(template);
            tree.insert_after(template, clone);
            fill_row(tree, pkg, part, &scanner, &cells_by_token, row_index, clone)?;
        }
        tree.detach(template);
    }
    Ok(mismatch)
}

/// The first row whose text contains every column token of some table
/// variable, paired with that variable.
fn find_template_row<'a>(
    tree: &XmlTree,
    tbl: NodeId,
    scanner: &PlaceholderScanner,
    pattern: &VariablePattern,
    tables: &[&'a TableVariable],
) -> Option<(NodeId, &'a TableVariable)> {
    let rows: Vec<NodeId> = tree.children_named(tbl, "tr").collect();
    for row in rows {
        let mut present: HashSet<String> = HashSet::new();
        for paragraph in tree.descendants_named(row, "p") {
            let view = RunText::build(tree, paragraph);
            for m in scanner.find(view.text()) {
                present.insert(m.token);
            }
        }
        if present.is_empty() {
            continue;
        }
        for &table in tables {
            let mut tokens = table.tokens().peekable();
            if tokens.peek().is_none() {
                continue;
            }
            if tokens.all(|t| present.contains(&pattern.ensure_wrapped(t))) {
                return Some((row, table));
            }
        }
    }
    None
}

/// Substitute one data row's values into a cloned template row.
fn fill_row(
    tree: &mut XmlTree,
    pkg: &mut Package,
    part: &str,
    scanner: &PlaceholderScanner,
    cells_by_token: &HashMap<String, &[CellValue]>,
    row_index: usize,
    row: NodeId,
) -> Result<()> {
    let paragraphs: Vec<NodeId> = tree.descendants_named(row, "p");
    for paragraph in paragraphs {
        let view = RunText::build(tree, paragraph);
        // Only the first occurrence of each token is substituted; a repeat
        // of the same token within one cell stays as-is.
        let mut taken: HashSet<&str> = HashSet::new();
        let mut matches: Vec<(usize, usize, &CellValue)> = scanner
            .find(view.text())
            .into_iter()
            .filter_map(|m| {
                let (token, cells) = cells_by_token.get_key_value(m.token.as_str())?;
                if !taken.insert(token.as_str()) {
                    return None;
                }
                cells.get(row_index).map(|value| (m.start, m.end, value))
            })
            .collect();
        matches.sort_by(|a, b| b.0.cmp(&a.0));

        let mut view = Some(view);
        for (start, end, value) in matches {
            let current = view
                .take()
                .unwrap_or_else(|| RunText::build(tree, paragraph));
            match value {
                CellValue::Text(text) => {
                    current.replace_range(
                        tree,
                        start,
                        end,
                        Box::new(move |tree, _paragraph, donor| {
                            vec![make_text_run(tree, donor, text)]
                        }),
                    );
                },
                CellValue::Image {
                    image,
                    width_px,
                    height_px,
                } => {
                    let mut png = Vec::new();
                    image.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
                    let rid = register_image(pkg, part, png, "png")?;
                    let (width_px, height_px) = (*width_px, *height_px);
                    current.replace_range_structural(
                        tree,
                        start,
                        end,
                        Box::new(move |tree, _paragraph, donor| {
                            vec![build_drawing_run(tree, donor, &rid, width_px, height_px)]
                        }),
                    );
                },
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const WML: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";

    fn cell(text: &str) -> String {
        format!("<w:tc><w:p><w:r><w:t>{}</w:t></w:r></w:p></w:tc>", text)
    }

    fn table_document(rows: &[&[&str]]) -> XmlTree {
        let body: String = rows
            .iter()
            .map(|cells| {
                let tr: String = cells.iter().map(|c| cell(c)).collect();
                format!("<w:tr>{}</w:tr>", tr)
            })
            .collect();
        let xml = format!(
            r#"<w:document xmlns:w="{}"><w:body><w:tbl>{}</w:tbl></w:body></w:document>"#,
            WML, body
        );
        XmlTree::parse(xml.as_bytes()).unwrap()
    }

    fn row_texts(tree: &XmlTree) -> Vec<Vec<String>> {
        let root = tree.root_element().unwrap();
        let tbl = tree.descendants_named(root, "tbl")[0];
        tree.children_named(tbl, "tr")
            .map(|tr| {
                tree.children_named(tr, "tc")
                    .map(|tc| {
                        let p = tree.descendants_named(tc, "p")[0];
                        RunText::build(tree, p).text().to_string()
                    })
                    .collect()
            })
            .collect()
    }

    fn run(tree: &mut XmlTree, vars: &Variables) -> bool {
        let mut pkg = Package::new();
        replace_tables(
            tree,
            &mut pkg,
            "word/document.xml",
            &VariablePattern::default(),
            vars,
        )
        .unwrap()
    }

    #[test]
    fn test_template_row_expansion() {
        let mut tree = table_document(&[
            &["Name", "Age"],
            &["${name}", "${age}"],
        ]);
        let mut table = TableVariable::new();
        table.add_text_column("name", ["Alice", "Bob"]);
        table.add_text_column("age", ["30", "25"]);
        let mut vars = Variables::new();
        vars.add_table(table);

        let mismatch = run(&mut tree, &vars);
        assert!(!mismatch);
        assert_eq!(
            row_texts(&tree),
            vec![
                vec!["Name".to_string(), "Age".to_string()],
                vec!["Alice".to_string(), "30".to_string()],
                vec!["Bob".to_string(), "25".to_string()],
            ]
        );
        // The template row is gone entirely.
        let xml = String::from_utf8(tree.serialize()).unwrap();
        assert!(!xml.contains("${name}"));
    }

    #[test]
    fn test_column_length_mismatch_truncates() {
        let mut tree = table_document(&[&["${a}", "${b}"]]);
        let mut table = TableVariable::new();
        table.add_text_column("a", ["1", "2", "3"]);
        table.add_text_column("b", ["x"]);
        let mut vars = Variables::new();
        vars.add_table(table);

        let mismatch = run(&mut tree, &vars);
        assert!(mismatch);
        assert_eq!(row_texts(&tree), vec![vec!["1".to_string(), "x".to_string()]]);
    }

    #[test]
    fn test_only_first_template_row_expanded() {
        let mut tree = table_document(&[&["${a}"], &["${a}"]]);
        let mut table = TableVariable::new();
        table.add_text_column("a", ["1", "2"]);
        let mut vars = Variables::new();
        vars.add_table(table);

        run(&mut tree, &vars);
        // The second token row is left as-is.
        assert_eq!(
            row_texts(&tree),
            vec![
                vec!["1".to_string()],
                vec!["2".to_string()],
                vec!["${a}".to_string()],
            ]
        );
    }

    #[test]
    fn test_partial_token_row_not_a_template() {
        // The row carries only one of the two column tokens, so the
        // variable does not match and nothing changes.
        let mut tree = table_document(&[&["${name}", "fixed"]]);
        let mut table = TableVariable::new();
        table.add_text_column("name", ["Alice"]);
        table.add_text_column("age", ["30"]);
        let mut vars = Variables::new();
        vars.add_table(table);

        run(&mut tree, &vars);
        assert_eq!(
            row_texts(&tree),
            vec![vec!["${name}".to_string(), "fixed".to_string()]]
        );
    }

    #[test]
    fn test_first_declared_variable_wins() {
        let mut tree = table_document(&[&["${v}"]]);
        let mut first = TableVariable::new();
        first.add_text_column("v", ["from-first"]);
        let mut second = TableVariable::new();
        second.add_text_column("v", ["from-second"]);
        let mut vars = Variables::new();
        vars.add_table(first);
        vars.add_table(second);

        run(&mut tree, &vars);
        assert_eq!(row_texts(&tree), vec![vec!["from-first".to_string()]]);
    }

    #[test]
    fn test_image_cell_becomes_drawing() {
        use image::{DynamicImage, RgbaImage};

        let mut tree = table_document(&[&["${shot}"]]);
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            1,
            1,
            image::Rgba([0, 0, 255, 255]),
        ));
        let mut table = TableVariable::new();
        table
            .add_column([(
                "${shot}".to_string(),
                CellValue::Image {
                    image: img,
                    width_px: 20,
                    height_px: 20,
                },
            )])
            .unwrap();
        let mut vars = Variables::new();
        vars.add_table(table);

        let mut pkg = Package::new();
        replace_tables(
            &mut tree,
            &mut pkg,
            "word/document.xml",
            &VariablePattern::default(),
            &vars,
        )
        .unwrap();

        assert!(pkg.contains_part("word/media/image1.png"));
        let xml = String::from_utf8(tree.serialize()).unwrap();
        assert!(xml.contains(r#"r:embed="rId1""#));
        assert!(!xml.contains("${shot}"));
    }

    #[test]
    fn test_surrounding_cell_text_preserved() {
        let mut tree = table_document(&[&["Mr. ${name}!"]]);
        let mut table = TableVariable::new();
        table.add_text_column("name", ["Smith"]);
        let mut vars = Variables::new();
        vars.add_table(table);

        run(&mut tree, &vars);
        assert_eq!(row_texts(&tree), vec![vec!["Mr. Smith!".to_string()]]);
    }
}
