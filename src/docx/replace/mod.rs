/// Placeholder replacers, one per variable kind.
///
/// Each replacer walks an already-parsed part tree and rewrites it in
/// place. They share the run-splicing machinery in
/// [`crate::docx::runtext`] and the helpers below for building runs and
/// registering image relationships.
use crate::error::{Result, TemplateError};
use crate::opc::Package;
use crate::opc::constants::{namespace, relationship_type};
use crate::xml::{NodeId, XmlTree};

mod bullet;
mod image;
mod table;
mod text;

pub use bullet::replace_bullet_lists;
pub use image::replace_images;
pub use table::replace_tables;
pub use text::replace_text;

/// Build a detached `w:r` carrying `text`, copying the donor run's `w:rPr`
/// so the replacement keeps the placeholder's character formatting.
pub(crate) fn make_text_run(
    tree: &mut XmlTree,
    style_donor: Option<NodeId>,
    text: &str,
) -> NodeId {
    let run = tree.create_element("w:r");
    if let Some(donor) = style_donor {
        let rpr = tree.children_named(donor, "rPr").next();
        if let Some(rpr) = rpr {
            let copy = tree.clone_subtree(rpr);
            tree.append_child(run, copy);
        }
    }
    let t = tree.create_element("w:t");
    tree.set_attr(t, "xml:space", "preserve");
    let content = tree.create_text(text);
    tree.append_child(t, content);
    tree.append_child(run, t);
    run
}

/// Relationship part name for a given part, e.g. `word/document.xml` maps
/// to `word/_rels/document.xml.rels`.
pub(crate) fn rels_part_name(part: &str) -> String {
    match part.rfind('/') {
        Some(i) => format!("{}/_rels/{}.rels", &part[..i], &part[i + 1..]),
        None => format!("_rels/{}.rels", part),
    }
}

/// Store image bytes as a media part and wire it to `part` through an
/// image relationship, returning the allocated relationship id.
///
/// The relationship part is rewritten immediately so a later call sees the
/// id as taken.
pub(crate) fn register_image(
    pkg: &mut Package,
    part: &str,
    data: Vec<u8>,
    ext: &str,
) -> Result<String> {
    let media_name = pkg.add_media(data, ext)?;
    let rels_name = rels_part_name(part);

    let mut tree = match pkg.read_part(&rels_name) {
        Some(bytes) => XmlTree::parse(bytes).map_err(|e| TemplateError::Xml(e.to_string()))?,
        None => XmlTree::new(),
    };
    let relationships = match tree.root_element() {
        Some(root) => root,
        None => {
            let root = tree.create_element("Relationships");
            tree.set_attr(root, "xmlns", namespace::PKG_RELATIONSHIPS);
            tree.append_root(root);
            root
        },
    };

    let mut max_n = 0u32;
    let existing: Vec<NodeId> = tree.children_named(relationships, "Relationship").collect();
    for rel in existing {
        if let Some(id) = tree.attr(rel, "Id") {
            if let Some(digits) = id.strip_prefix("rId") {
                if let Ok(n) = atoi_simd::parse::<u32>(digits.as_bytes()) {
                    max_n = max_n.max(n);
                }
            }
        }
    }
    let rid = format!("rId{}", max_n + 1);

    // Relationship targets are resolved against the part's directory.
    let target = media_name
        .strip_prefix("word/")
        .unwrap_or(&media_name)
        .to_string();

    let rel = tree.create_element("Relationship");
    tree.set_attr(rel, "Id", &rid);
    tree.set_attr(rel, "Type", relationship_type::IMAGE);
    tree.set_attr(rel, "Target", &target);
    tree.append_child(relationships, rel);

    pkg.write_part(&rels_name, tree.serialize());
    Ok(rid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rels_part_name() {
        assert_eq!(
            rels_part_name("word/document.xml"),
            "word/_rels/document.xml.rels"
        );
        assert_eq!(
            rels_part_name("word/header1.xml"),
            "word/_rels/header1.xml.rels"
        );
    }

    #[test]
    fn test_register_image_allocates_sequential_ids() {
        let mut pkg = Package::new();
        let first = register_image(&mut pkg, "word/document.xml", vec![1, 2], "png").unwrap();
        assert_eq!(first, "rId1");
        let second = register_image(&mut pkg, "word/document.xml", vec![3], "png").unwrap();
        assert_eq!(second, "rId2");

        let rels = String::from_utf8(
            pkg.read_part("word/_rels/document.xml.rels").unwrap().to_vec(),
        )
        .unwrap();
        assert!(rels.contains(r#"Target="media/image1.png""#));
        assert!(rels.contains(r#"Target="media/image2.png""#));
    }

    #[test]
    fn test_register_image_skips_taken_ids() {
        let mut pkg = Package::new();
        pkg.write_part(
            "word/_rels/document.xml.rels",
            br#"<?xml version="1.0"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId7" Type="t" Target="styles.xml"/>
</Relationships>"#
                .to_vec(),
        );
        let rid = register_image(&mut pkg, "word/document.xml", vec![1], "png").unwrap();
        assert_eq!(rid, "rId8");
    }

    #[test]
    fn test_make_text_run_copies_donor_style() {
        let mut tree = XmlTree::parse(
            br#"<w:p xmlns:w="x"><w:r><w:rPr><w:i/></w:rPr><w:t>a</w:t></w:r></w:p>"#,
        )
        .unwrap();
        let paragraph = tree.root_element().unwrap();
        let donor = tree.children_named(paragraph, "r").next().unwrap();

        let run = make_text_run(&mut tree, Some(donor), "hello  ");
        let rpr = tree.children_named(run, "rPr").next().unwrap();
        assert_eq!(tree.children_named(rpr, "i").count(), 1);
        let t = tree.children_named(run, "t").next().unwrap();
        assert_eq!(tree.element_text(t), "hello  ");
        assert_eq!(tree.attr(t, "xml:space"), Some("preserve"));
    }
}
