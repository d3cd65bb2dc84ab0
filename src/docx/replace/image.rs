use std::collections::HashMap;
use std::io::Cursor;

use image::{DynamicImage, ImageFormat};

use crate::docx::pattern::VariablePattern;
use crate::docx::replace::register_image;
use crate::docx::runtext::RunText;
use crate::docx::scan::PlaceholderScanner;
use crate::docx::variables::{Variable, Variables};
use crate::error::Result;
use crate::opc::Package;
use crate::opc::constants::namespace;
use crate::xml::{NodeId, XmlTree};

/// Office sizes drawings in English Metric Units; 9525 EMU per pixel at
/// the reference 96 dpi.
const EMU_PER_PIXEL: u64 = 9525;

/// Replace every known image placeholder in the part tree with an inline
/// drawing run.
///
/// Each occurrence gets its own media part and relationship id, scoped to
/// `part`'s own relationship part. Images are re-encoded as PNG regardless
/// of their source format.
pub fn replace_images(
    tree: &mut XmlTree,
    pkg: &mut Package,
    part: &str,
    pattern: &VariablePattern,
    vars: &Variables,
) -> Result<()> {
    let mut images: HashMap<String, (&DynamicImage, u32, u32)> = HashMap::new();
    for var in vars.iter() {
        if let Variable::Image {
            token,
            image,
            width_px,
            height_px,
        } = var
        {
            images
                .entry(pattern.ensure_wrapped(token))
                .or_insert((image, *width_px, *height_px));
        }
    }
    if images.is_empty() {
        return Ok(());
    }

    let scanner = PlaceholderScanner::new(pattern)?;
    let Some(root) = tree.root_element() else {
        return Ok(());
    };

    let paragraphs: Vec<NodeId> = tree.descendants_named(root, "p");
    for paragraph in paragraphs {
        let view = RunText::build(tree, paragraph);
        let mut matches: Vec<(usize, usize, &(&DynamicImage, u32, u32))> = scanner
            .find(view.text())
            .into_iter()
            .filter_map(|m| {
                images
                    .get(m.token.as_str())
                    .map(|entry| (m.start, m.end, entry))
            })
            .collect();
        matches.sort_by(|a, b| b.0.cmp(&a.0));

        let mut view = Some(view);
        for (start, end, &(img, width_px, height_px)) in matches {
            let mut png = Vec::new();
            img.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
            let rid = register_image(pkg, part, png, "png")?;

            let current = view
                .take()
                .unwrap_or_else(|| RunText::build(tree, paragraph));
            current.replace_range_structural(
                tree,
                start,
                end,
                Box::new(move |tree, _paragraph, donor| {
                    vec![build_drawing_run(tree, donor, &rid, width_px, height_px)]
                }),
            );
        }
    }
    Ok(())
}

/// Build a detached `w:r` holding one inline drawing referencing the media
/// part behind `rid`.
pub(super) fn build_drawing_run(
    tree: &mut XmlTree,
    style_donor: Option<NodeId>,
    rid: &str,
    width_px: u32,
    height_px: u32,
) -> NodeId {
    let cx = (width_px as u64 * EMU_PER_PIXEL).to_string();
    let cy = (height_px as u64 * EMU_PER_PIXEL).to_string();

    let run = tree.create_element("w:r");
    if let Some(donor) = style_donor {
        let rpr = tree.children_named(donor, "rPr").next();
        if let Some(rpr) = rpr {
            let copy = tree.clone_subtree(rpr);
            tree.append_child(run, copy);
        }
    }

    let drawing = tree.create_element("w:drawing");
    let inline = tree.create_element("wp:inline");
    tree.set_attr(inline, "xmlns:wp", namespace::DRAWINGML_WORDPROCESSING);
    tree.set_attr(inline, "distT", "0");
    tree.set_attr(inline, "distB", "0");
    tree.set_attr(inline, "distL", "0");
    tree.set_attr(inline, "distR", "0");

    let extent = tree.create_element("wp:extent");
    tree.set_attr(extent, "cx", &cx);
    tree.set_attr(extent, "cy", &cy);
    tree.append_child(inline, extent);

    let doc_pr = tree.create_element("wp:docPr");
    tree.set_attr(doc_pr, "id", "1");
    tree.set_attr(doc_pr, "name", "Picture");
    tree.append_child(inline, doc_pr);

    let graphic = tree.create_element("a:graphic");
    tree.set_attr(graphic, "xmlns:a", namespace::DRAWINGML_MAIN);
    let graphic_data = tree.create_element("a:graphicData");
    tree.set_attr(graphic_data, "uri", namespace::DRAWINGML_PICTURE);

    let pic = tree.create_element("pic:pic");
    tree.set_attr(pic, "xmlns:pic", namespace::DRAWINGML_PICTURE);

    let nv_pic_pr = tree.create_element("pic:nvPicPr");
    let c_nv_pr = tree.create_element("pic:cNvPr");
    tree.set_attr(c_nv_pr, "id", "0");
    tree.set_attr(c_nv_pr, "name", "Picture");
    tree.append_child(nv_pic_pr, c_nv_pr);
    let c_nv_pic_pr = tree.create_element("pic:cNvPicPr");
    tree.append_child(nv_pic_pr, c_nv_pic_pr);
    tree.append_child(pic, nv_pic_pr);

    let blip_fill = tree.create_element("pic:blipFill");
    let blip = tree.create_element("a:blip");
    tree.set_attr(blip, "xmlns:r", namespace::OFC_RELATIONSHIPS);
    tree.set_attr(blip, "r:embed", rid);
    tree.append_child(blip_fill, blip);
    let stretch = tree.create_element("a:stretch");
    let fill_rect = tree.create_element("a:fillRect");
    tree.append_child(stretch, fill_rect);
    tree.append_child(blip_fill, stretch);
    tree.append_child(pic, blip_fill);

    let sp_pr = tree.create_element("pic:spPr");
    let xfrm = tree.create_element("a:xfrm");
    let off = tree.create_element("a:off");
    tree.set_attr(off, "x", "0");
    tree.set_attr(off, "y", "0");
    tree.append_child(xfrm, off);
    let ext = tree.create_element("a:ext");
    tree.set_attr(ext, "cx", &cx);
    tree.set_attr(ext, "cy", &cy);
    tree.append_child(xfrm, ext);
    tree.append_child(sp_pr, xfrm);
    let prst_geom = tree.create_element("a:prstGeom");
    tree.set_attr(prst_geom, "prst", "rect");
    let av_lst = tree.create_element("a:avLst");
    tree.append_child(prst_geom, av_lst);
    tree.append_child(sp_pr, prst_geom);
    tree.append_child(pic, sp_pr);

    tree.append_child(graphic_data, pic);
    tree.append_child(graphic, graphic_data);
    tree.append_child(inline, graphic);
    tree.append_child(drawing, inline);
    tree.append_child(run, drawing);
    run
}
