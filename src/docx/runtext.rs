/// Flattened-text view of one paragraph.
///
/// WordprocessingML splits a paragraph's text across runs at formatting
/// boundaries, and Word splits runs freely (spell-check state, revision
/// saves), so a placeholder token routinely spans several `w:t` fragments.
/// `RunText` concatenates every fragment into one string and keeps an
/// offset map back to the owning nodes, so a match found in the flattened
/// string can be spliced out of the tree precisely.
///
/// The view is ephemeral: any structural edit invalidates it, which is why
/// the editing methods consume the view. Callers apply edits in strictly
/// decreasing start-offset order and rebuild between edits, keeping the
/// offsets of not-yet-applied matches valid.
use crate::xml::{NodeId, XmlTree};

/// One `w:t` fragment's slice of the flattened string.
#[derive(Debug, Clone, Copy)]
struct Fragment {
    run: NodeId,
    text_node: NodeId,
    start: usize,
    len: usize,
}

impl Fragment {
    #[inline]
    fn end(&self) -> usize {
        self.start + self.len
    }
}

/// Factory invoked by the splice methods: builds the replacement run(s),
/// given the paragraph and the style-donor run (the run owning the first
/// byte of the replaced range).
pub type RunFactory<'a> = dyn FnOnce(&mut XmlTree, NodeId, Option<NodeId>) -> Vec<NodeId> + 'a;

pub struct RunText {
    paragraph: NodeId,
    text: String,
    fragments: Vec<Fragment>,
}

impl RunText {
    /// Build the view over a paragraph's direct runs.
    ///
    /// Explicit whitespace is preserved verbatim; empty fragments are kept
    /// (zero length) so every `w:t` stays addressable.
    pub fn build(tree: &XmlTree, paragraph: NodeId) -> Self {
        let mut text = String::new();
        let mut fragments = Vec::new();
        let runs: Vec<NodeId> = tree.children_named(paragraph, "r").collect();
        for run in runs {
            let texts: Vec<NodeId> = tree.children_named(run, "t").collect();
            for text_node in texts {
                let fragment_text = tree.element_text(text_node);
                fragments.push(Fragment {
                    run,
                    text_node,
                    start: text.len(),
                    len: fragment_text.len(),
                });
                text.push_str(&fragment_text);
            }
        }
        Self {
            paragraph,
            text,
            fragments,
        }
    }

    /// The flattened paragraph text.
    #[inline]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The paragraph this view was built over.
    #[inline]
    pub fn paragraph(&self) -> NodeId {
        self.paragraph
    }

    /// Replace `[start, end)` of the flattened text with the runs produced
    /// by `factory`. The run owning offset `start` is the style donor.
    ///
    /// Consumes the view: it is stale once the tree has been edited.
    pub fn replace_range(
        self,
        tree: &mut XmlTree,
        start: usize,
        end: usize,
        factory: Box<RunFactory<'_>>,
    ) {
        self.splice(tree, start, end, factory);
    }

    /// Same splice mechanism for runs carrying non-text content such as
    /// inline drawings, whose replacement run has no `w:t` child.
    pub fn replace_range_structural(
        self,
        tree: &mut XmlTree,
        start: usize,
        end: usize,
        factory: Box<RunFactory<'_>>,
    ) {
        self.splice(tree, start, end, factory);
    }

    fn splice(self, tree: &mut XmlTree, start: usize, end: usize, factory: Box<RunFactory<'_>>) {
        let overlapped: Vec<usize> = (0..self.fragments.len())
            .filter(|&i| {
                let f = &self.fragments[i];
                f.start < end && f.end() > start
            })
            .collect();
        let Some(&head_i) = overlapped.first() else {
            return;
        };
        let tail_i = *overlapped.last().unwrap_or(&head_i);

        let head_run = self.fragments[head_i].run;
        let tail_run = self.fragments[tail_i].run;

        // Build the replacement while the donor run is still intact.
        let new_runs = factory(tree, self.paragraph, Some(head_run));

        let insert_at = if head_run == tail_run {
            self.splice_single_run(tree, head_run, start, end)
        } else {
            self.splice_across_runs(tree, head_run, start, end)
        };

        for (offset, run) in new_runs.into_iter().enumerate() {
            tree.insert_child(self.paragraph, insert_at + offset, run);
        }
    }

    /// Match confined to one run: keep the head side in the original run,
    /// move the tail side (suffix plus any later fragments) into a
    /// style-identical clone inserted after the replacement. Returns the
    /// paragraph index at which replacement runs go.
    fn splice_single_run(
        &self,
        tree: &mut XmlTree,
        run: NodeId,
        start: usize,
        end: usize,
    ) -> usize {
        let run_fragments: Vec<&Fragment> =
            self.fragments.iter().filter(|f| f.run == run).collect();
        let needs_tail = run_fragments
            .iter()
            .any(|f| f.start >= end && f.len > 0 || (f.start < end && f.end() > end));

        let clone = if needs_tail {
            Some(tree.clone_subtree(run))
        } else {
            None
        };
        // Fragment order matches `w:t` child order, for the clone too.
        let clone_texts: Vec<NodeId> = match clone {
            Some(c) => tree.children_named(c, "t").collect(),
            None => Vec::new(),
        };

        for (k, fragment) in run_fragments.iter().enumerate() {
            let clone_text = clone_texts.get(k).copied();
            if fragment.end() <= start {
                // Head side: stays in the original, leaves the clone.
                if let Some(ct) = clone_text {
                    tree.detach(ct);
                }
            } else if fragment.start >= end {
                // Tail side: leaves the original, stays in the clone.
                tree.detach(fragment.text_node);
            } else {
                let fragment_text = tree.element_text(fragment.text_node);
                let prefix = &fragment_text[..start.saturating_sub(fragment.start)];
                let suffix = if end > fragment.end() {
                    ""
                } else {
                    &fragment_text[end - fragment.start..]
                };
                if prefix.is_empty() {
                    tree.detach(fragment.text_node);
                } else {
                    set_fragment_text(tree, fragment.text_node, prefix);
                }
                if let Some(ct) = clone_text {
                    if suffix.is_empty() {
                        tree.detach(ct);
                    } else {
                        set_fragment_text(tree, ct, suffix);
                    }
                }
            }
        }

        let run_index = tree.position_in_parent(run).unwrap_or(0);
        let insert_at = if run_has_content(tree, run) {
            run_index + 1
        } else {
            tree.detach(run);
            run_index
        };
        if let Some(clone) = clone {
            if run_has_content(tree, clone) {
                tree.insert_child(self.paragraph, insert_at, clone);
            }
        }
        insert_at
    }

    /// Match spanning several runs: truncate the boundary fragments, drop
    /// fully covered fragments, and detach runs left without content.
    fn splice_across_runs(
        &self,
        tree: &mut XmlTree,
        head_run: NodeId,
        start: usize,
        end: usize,
    ) -> usize {
        let mut emptied: Vec<NodeId> = Vec::new();
        for fragment in &self.fragments {
            if fragment.end() <= start || fragment.start >= end {
                continue;
            }
            let fragment_text = tree.element_text(fragment.text_node);
            if fragment.start < start {
                // Head boundary.
                let prefix = &fragment_text[..start - fragment.start];
                if prefix.is_empty() {
                    tree.detach(fragment.text_node);
                } else {
                    set_fragment_text(tree, fragment.text_node, prefix);
                }
            } else if fragment.end() > end {
                // Tail boundary.
                let suffix = &fragment_text[end - fragment.start..];
                if suffix.is_empty() {
                    tree.detach(fragment.text_node);
                } else {
                    set_fragment_text(tree, fragment.text_node, suffix);
                }
            } else {
                tree.detach(fragment.text_node);
            }
            if !emptied.contains(&fragment.run) {
                emptied.push(fragment.run);
            }
        }

        // Runs other than the head sit after the insertion point, so
        // detaching them never shifts it.
        let head_index = tree.position_in_parent(head_run).unwrap_or(0);
        let mut insert_at = head_index + 1;
        for run in emptied {
            if run_has_content(tree, run) {
                continue;
            }
            tree.detach(run);
            if run == head_run {
                insert_at = head_index;
            }
        }
        insert_at
    }
}

/// A run still carries content if any child other than `w:rPr` remains.
fn run_has_content(tree: &XmlTree, run: NodeId) -> bool {
    tree.children(run)
        .iter()
        .any(|&c| tree.is_element(c) && tree.local_name(c) != "rPr")
}

/// Rewrite a `w:t` fragment, preserving explicit whitespace when the new
/// text begins or ends with it.
fn set_fragment_text(tree: &mut XmlTree, text_node: NodeId, text: &str) {
    tree.set_element_text(text_node, text);
    if text.starts_with(char::is_whitespace) || text.ends_with(char::is_whitespace) {
        tree.set_attr(text_node, "xml:space", "preserve");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::XmlTree;

    const WML: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";

    fn paragraph_tree(runs: &[&str]) -> (XmlTree, NodeId) {
        let body: String = runs.concat();
        let xml = format!(
            r#"<w:document xmlns:w="{}"><w:body><w:p>{}</w:p></w:body></w:document>"#,
            WML, body
        );
        let tree = XmlTree::parse(xml.as_bytes()).unwrap();
        let root = tree.root_element().unwrap();
        let paragraph = tree.descendants_named(root, "p")[0];
        (tree, paragraph)
    }

    fn plain_run(tree: &mut XmlTree, text: &str) -> Vec<NodeId> {
        let run = tree.create_element("w:r");
        let t = tree.create_element("w:t");
        let content = tree.create_text(text);
        tree.append_child(t, content);
        tree.append_child(run, t);
        vec![run]
    }

    #[test]
    fn test_build_flattens_across_runs() {
        let (tree, paragraph) = paragraph_tree(&[
            "<w:r><w:t xml:space=\"preserve\">Hello ${na</w:t></w:r>",
            "<w:r><w:t>me}!</w:t></w:r>",
        ]);
        let view = RunText::build(&tree, paragraph);
        assert_eq!(view.text(), "Hello ${name}!");
    }

    #[test]
    fn test_replace_range_within_single_fragment() {
        let (mut tree, paragraph) = paragraph_tree(&["<w:r><w:t>Dear ${name}, hi</w:t></w:r>"]);
        let view = RunText::build(&tree, paragraph);
        let start = view.text().find("${name}").unwrap();
        let end = start + "${name}".len();
        view.replace_range(
            &mut tree,
            start,
            end,
            Box::new(|tree, _p, _donor| plain_run(tree, "Alice")),
        );

        let view = RunText::build(&tree, paragraph);
        assert_eq!(view.text(), "Dear Alice, hi");
        // Three runs now: prefix, replacement, suffix
        assert_eq!(tree.children_named(paragraph, "r").count(), 3);
    }

    #[test]
    fn test_replace_range_spanning_runs() {
        let (mut tree, paragraph) = paragraph_tree(&[
            "<w:r><w:t>A ${to</w:t></w:r>",
            "<w:r><w:t>k</w:t></w:r>",
            "<w:r><w:t>en} B</w:t></w:r>",
        ]);
        let view = RunText::build(&tree, paragraph);
        let start = view.text().find("${token}").unwrap();
        let end = start + "${token}".len();
        view.replace_range(
            &mut tree,
            start,
            end,
            Box::new(|tree, _p, _donor| plain_run(tree, "X")),
        );

        let view = RunText::build(&tree, paragraph);
        assert_eq!(view.text(), "A X B");
        // The fully covered middle run is gone
        assert_eq!(tree.children_named(paragraph, "r").count(), 3);
    }

    #[test]
    fn test_replace_whole_paragraph_text() {
        let (mut tree, paragraph) = paragraph_tree(&["<w:r><w:t>${only}</w:t></w:r>"]);
        let view = RunText::build(&tree, paragraph);
        let end = view.text().len();
        view.replace_range(
            &mut tree,
            0,
            end,
            Box::new(|tree, _p, _donor| plain_run(tree, "done")),
        );

        let view = RunText::build(&tree, paragraph);
        assert_eq!(view.text(), "done");
        assert_eq!(tree.children_named(paragraph, "r").count(), 1);
    }

    #[test]
    fn test_style_donor_is_run_at_start() {
        let (mut tree, paragraph) = paragraph_tree(&[
            "<w:r><w:rPr><w:b/></w:rPr><w:t>${bo</w:t></w:r>",
            "<w:r><w:t>ld}</w:t></w:r>",
        ]);
        let view = RunText::build(&tree, paragraph);
        let end = view.text().len();
        let mut donor_had_bold = false;
        view.replace_range(
            &mut tree,
            0,
            end,
            Box::new(|tree, _p, donor| {
                let donor = donor.unwrap();
                donor_had_bold = tree
                    .children_named(donor, "rPr")
                    .next()
                    .map(|rpr| tree.children_named(rpr, "b").count() == 1)
                    .unwrap_or(false);
                plain_run(tree, "bold")
            }),
        );
        assert!(donor_had_bold);
    }

    #[test]
    fn test_descending_order_multi_match() {
        let (mut tree, paragraph) =
            paragraph_tree(&["<w:r><w:t>${a} mid ${b} tail</w:t></w:r>"]);

        let view = RunText::build(&tree, paragraph);
        let text = view.text().to_string();
        let mut positions: Vec<(usize, usize, &str)> = vec![
            (text.find("${a}").unwrap(), "${a}".len(), "1"),
            (text.find("${b}").unwrap(), "${b}".len(), "2"),
        ];
        positions.sort_by(|a, b| b.0.cmp(&a.0));

        for (start, len, replacement) in positions {
            let view = RunText::build(&tree, paragraph);
            view.replace_range(
                &mut tree,
                start,
                start + len,
                Box::new(move |tree, _p, _donor| plain_run(tree, replacement)),
            );
        }

        let view = RunText::build(&tree, paragraph);
        assert_eq!(view.text(), "1 mid 2 tail");
    }

    #[test]
    fn test_untouched_without_overlap() {
        let (mut tree, paragraph) = paragraph_tree(&["<w:r><w:t>abc</w:t></w:r>"]);
        let view = RunText::build(&tree, paragraph);
        view.replace_range(
            &mut tree,
            10,
            12,
            Box::new(|tree, _p, _donor| plain_run(tree, "nope")),
        );
        let view = RunText::build(&tree, paragraph);
        assert_eq!(view.text(), "abc");
    }
}
