/// Bullet-numbering bootstrap for list substitution.
///
/// A bulleted paragraph needs a concrete numbering instance (`w:num`)
/// referencing an abstract definition (`w:abstractNum`) whose level 0 uses
/// the `bullet` format. Templates may or may not ship a `word/numbering.xml`
/// part; this module converges it to a usable state without ever
/// duplicating definitions.
use crate::error::{Result, TemplateError};
use crate::opc::Package;
use crate::opc::constants::{namespace, part_name};
use crate::xml::{NodeId, XmlTree};

/// Ensure a bullet numbering definition exists and return the concrete
/// numbering id as text.
///
/// Loads `word/numbering.xml` (creating an empty `w:numbering` root if the
/// part is absent), appends an abstract bullet definition and a concrete
/// instance only where missing, and persists the part on every call.
/// Idempotent: repeat calls yield the same id and add nothing.
pub fn ensure_bullet_numbering(pkg: &mut Package) -> Result<String> {
    let mut tree = match pkg.read_part(part_name::NUMBERING) {
        Some(bytes) => {
            XmlTree::parse(bytes).map_err(|e| TemplateError::Xml(e.to_string()))?
        },
        None => XmlTree::new(),
    };

    let numbering = match tree.root_element() {
        Some(root) if tree.local_name(root) == "numbering" => root,
        Some(_) => return Err(TemplateError::MissingBody(part_name::NUMBERING.to_string())),
        None => {
            let root = tree.create_element("w:numbering");
            tree.set_attr(root, "xmlns:w", namespace::WML_MAIN);
            tree.append_root(root);
            root
        },
    };

    let mut max_abstract_id = -1i64;
    let mut bullet_abstract_id: Option<i64> = None;
    let abstract_nums: Vec<NodeId> = tree.children_named(numbering, "abstractNum").collect();
    for abstract_num in abstract_nums {
        let id = numeric_attr(&tree, abstract_num, "abstractNumId");
        if let Some(id) = id {
            max_abstract_id = max_abstract_id.max(id);
        }
        let is_bullet = tree.children_named(abstract_num, "lvl").any(|lvl| {
            tree.children_named(lvl, "numFmt")
                .next()
                .and_then(|fmt| tree.attr(fmt, "w:val"))
                == Some("bullet")
        });
        if is_bullet && bullet_abstract_id.is_none() {
            bullet_abstract_id = id;
        }
    }

    let bullet_abstract_id = match bullet_abstract_id {
        Some(id) => id,
        None => {
            let id = max_abstract_id + 1;
            append_abstract_bullet(&mut tree, numbering, id);
            id
        },
    };

    let mut max_num_id = -1i64;
    let mut bullet_num_id: Option<i64> = None;
    let nums: Vec<NodeId> = tree.children_named(numbering, "num").collect();
    for num in nums {
        let id = numeric_attr(&tree, num, "numId");
        if let Some(id) = id {
            max_num_id = max_num_id.max(id);
        }
        let references_bullet = tree
            .children_named(num, "abstractNumId")
            .next()
            .and_then(|r| tree.attr(r, "w:val"))
            .and_then(|v| atoi_simd::parse::<i64>(v.as_bytes()).ok())
            == Some(bullet_abstract_id);
        if references_bullet && bullet_num_id.is_none() {
            bullet_num_id = id;
        }
    }

    let bullet_num_id = match bullet_num_id {
        Some(id) => id,
        None => {
            let id = max_num_id + 1;
            let num = tree.create_element("w:num");
            tree.set_attr(num, "w:numId", &id.to_string());
            let reference = tree.create_element("w:abstractNumId");
            tree.set_attr(reference, "w:val", &bullet_abstract_id.to_string());
            tree.append_child(num, reference);
            tree.append_child(numbering, num);
            id
        },
    };

    pkg.write_part(part_name::NUMBERING, tree.serialize());
    Ok(bullet_num_id.to_string())
}

fn numeric_attr(tree: &XmlTree, id: NodeId, name: &str) -> Option<i64> {
    tree.attr(id, name)
        .and_then(|v| atoi_simd::parse::<i64>(v.as_bytes()).ok())
}

fn append_abstract_bullet(tree: &mut XmlTree, numbering: NodeId, id: i64) {
    let abstract_num = tree.create_element("w:abstractNum");
    tree.set_attr(abstract_num, "w:abstractNumId", &id.to_string());

    let lvl = tree.create_element("w:lvl");
    tree.set_attr(lvl, "w:ilvl", "0");

    let start = tree.create_element("w:start");
    tree.set_attr(start, "w:val", "1");
    tree.append_child(lvl, start);

    let num_fmt = tree.create_element("w:numFmt");
    tree.set_attr(num_fmt, "w:val", "bullet");
    tree.append_child(lvl, num_fmt);

    let lvl_text = tree.create_element("w:lvlText");
    tree.set_attr(lvl_text, "w:val", "\u{2022}");
    tree.append_child(lvl, lvl_text);

    tree.append_child(abstract_num, lvl);
    tree.append_child(numbering, abstract_num);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opc::Package;

    #[test]
    fn test_bootstrap_from_empty_package() {
        let mut pkg = Package::new();
        let num_id = ensure_bullet_numbering(&mut pkg).unwrap();
        assert_eq!(num_id, "0");

        let xml =
            String::from_utf8(pkg.read_part(part_name::NUMBERING).unwrap().to_vec()).unwrap();
        assert!(xml.contains("w:abstractNum"));
        assert!(xml.contains(r#"w:val="bullet""#));
        assert!(xml.contains("\u{2022}"));
    }

    #[test]
    fn test_idempotent() {
        let mut pkg = Package::new();
        let first = ensure_bullet_numbering(&mut pkg).unwrap();
        let after_first = pkg.read_part(part_name::NUMBERING).unwrap().to_vec();

        let second = ensure_bullet_numbering(&mut pkg).unwrap();
        let after_second = pkg.read_part(part_name::NUMBERING).unwrap().to_vec();

        assert_eq!(first, second);
        assert_eq!(after_first, after_second);
    }

    #[test]
    fn test_reuses_existing_bullet_definition() {
        let mut pkg = Package::new();
        pkg.write_part(
            part_name::NUMBERING,
            br#"<?xml version="1.0"?>
<w:numbering xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:abstractNum w:abstractNumId="3">
    <w:lvl w:ilvl="0"><w:numFmt w:val="bullet"/></w:lvl>
  </w:abstractNum>
  <w:num w:numId="7"><w:abstractNumId w:val="3"/></w:num>
</w:numbering>"#
                .to_vec(),
        );
        let num_id = ensure_bullet_numbering(&mut pkg).unwrap();
        assert_eq!(num_id, "7");

        let xml =
            String::from_utf8(pkg.read_part(part_name::NUMBERING).unwrap().to_vec()).unwrap();
        assert_eq!(xml.matches("w:abstractNum ").count(), 1);
    }

    #[test]
    fn test_allocates_past_existing_ids() {
        let mut pkg = Package::new();
        pkg.write_part(
            part_name::NUMBERING,
            br#"<?xml version="1.0"?>
<w:numbering xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:abstractNum w:abstractNumId="5">
    <w:lvl w:ilvl="0"><w:numFmt w:val="decimal"/></w:lvl>
  </w:abstractNum>
  <w:num w:numId="2"><w:abstractNumId w:val="5"/></w:num>
</w:numbering>"#
                .to_vec(),
        );
        let num_id = ensure_bullet_numbering(&mut pkg).unwrap();
        // New abstract id 6, new concrete id 3
        assert_eq!(num_id, "3");
        let xml =
            String::from_utf8(pkg.read_part(part_name::NUMBERING).unwrap().to_vec()).unwrap();
        assert!(xml.contains(r#"w:abstractNumId="6""#));
    }

    #[test]
    fn test_unexpected_root_is_structural_error() {
        let mut pkg = Package::new();
        pkg.write_part(part_name::NUMBERING, b"<wrong/>".to_vec());
        assert!(ensure_bullet_numbering(&mut pkg).is_err());
    }
}
