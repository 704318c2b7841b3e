// Format Toggle Engine
// Decides between wrapping and unwrapping a sliced selection and rewrites the tree accordingly

use super::document_tree::{DocumentTree, MarkerKind, NodeId, Side};
use super::error::{EditError, EditResult};
use super::format::Format;
use super::markers::{self, Slice};
use super::selection_descriptor::SelectionDescriptor;
use super::tree_walker::walk_a_to_b;
use serde::{Deserialize, Serialize};

/// Rule deciding whether a selection counts as "already formatted"
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToggleRule {
    /// Both selection boundaries sit under the format
    #[default]
    Boundary,
    /// At least `threshold` of the selected bytes sit under the format
    Coverage { threshold: f32 },
}

/// What a toggle did to the document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleAction {
    Wrap,
    Unwrap,
    Insert,
    Split,
    ExitLeft,
    ExitRight,
    Discard,
    Noop,
}

/// Result of one toggle request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToggleOutcome {
    pub action: ToggleAction,
    /// Number of per-line fragments the engine processed
    pub fragments: usize,
}

/// Everything one toggle request works on
pub struct EngineContext<'a> {
    pub tree: &'a mut DocumentTree,
    pub format: &'a Format,
    pub descriptor: &'a SelectionDescriptor,
    pub slice: Slice,
    pub rule: ToggleRule,
}

/// A single-line stretch of the selection, bracketed by two markers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fragment {
    pub start: NodeId,
    pub end: NodeId,
    pub line: NodeId,
}

/// Where new formatting goes when a neighbour already carries the format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MergeBias {
    Append(NodeId),
    Prepend(NodeId),
    Coalesce { prev: NodeId, next: NodeId },
}

/// Pick wrap or unwrap for the whole selection
pub fn decide(descriptor: &SelectionDescriptor, format: &Format, rule: ToggleRule) -> ToggleAction {
    let covered = match rule {
        ToggleRule::Boundary => {
            descriptor.start_format.is_format(format) && descriptor.end_format.is_format(format)
        }
        ToggleRule::Coverage { threshold } => descriptor.coverage > 0.0 && descriptor.coverage >= threshold,
    };
    if covered {
        ToggleAction::Unwrap
    } else {
        ToggleAction::Wrap
    }
}

/// Toggle the context's format over its sliced selection
pub fn toggle_range(ctx: &mut EngineContext) -> EditResult<ToggleOutcome> {
    let action = decide(ctx.descriptor, ctx.format, ctx.rule);
    log::debug!(
        "toggle {} over {} line(s): {:?} (start {:?}, end {:?}, coverage {:.2})",
        ctx.format,
        if ctx.descriptor.is_multiline { "several" } else { "one" },
        action,
        ctx.descriptor.start_format,
        ctx.descriptor.end_format,
        ctx.descriptor.coverage
    );

    let mut changed = false;
    let fragments = for_each_fragment(ctx, |ctx, fragment| {
        let done = match action {
            ToggleAction::Unwrap => unwrap_fragment(ctx, fragment)?,
            _ => wrap_fragment(ctx, fragment)?,
        };
        changed |= done;
        Ok(())
    })?;

    Ok(ToggleOutcome {
        action: if changed { action } else { ToggleAction::Noop },
        fragments,
    })
}

/// Run `apply` once per line of the selection, returning how many lines it visited
///
/// Lines other than the first get a temporary start marker at their head,
/// lines other than the last a temporary end marker at their tail.
pub fn for_each_fragment<F>(ctx: &mut EngineContext, mut apply: F) -> EditResult<usize>
where
    F: FnMut(&mut EngineContext, Fragment) -> EditResult,
{
    let (start_line, end_line) = (ctx.descriptor.start_line, ctx.descriptor.end_line);
    if !ctx.descriptor.is_multiline {
        let fragment = Fragment {
            start: ctx.slice.start,
            end: ctx.slice.end,
            line: start_line,
        };
        apply(ctx, fragment)?;
        cleanup_marker(ctx.tree, fragment.start)?;
        cleanup_marker(ctx.tree, fragment.end)?;
        return Ok(1);
    }

    let lines: Vec<NodeId> = walk_a_to_b(ctx.tree, start_line, end_line)
        .map(|step| step.current)
        .collect();
    if lines.last() != Some(&end_line) {
        return Err(EditError::UnreachableLine);
    }

    for &line in &lines {
        let start = if line == start_line {
            ctx.slice.start
        } else {
            let marker = ctx.tree.create_marker(MarkerKind::Start);
            ctx.tree.insert_child(line, 0, marker);
            marker
        };
        let end = if line == end_line {
            ctx.slice.end
        } else {
            let marker = ctx.tree.create_marker(MarkerKind::End);
            ctx.tree.append_child(line, marker);
            marker
        };

        let fragment = Fragment { start, end, line };
        apply(ctx, fragment)?;
        cleanup_marker(ctx.tree, start)?;
        cleanup_marker(ctx.tree, end)?;

        if start != ctx.slice.start {
            ctx.tree.remove(start);
        }
        if end != ctx.slice.end {
            ctx.tree.remove(end);
        }
    }
    log::debug!("processed {} line fragment(s)", lines.len());
    Ok(lines.len())
}

/// Put the fragment under the format, reusing a neighbouring format node when there is one
pub fn wrap_fragment(ctx: &mut EngineContext, fragment: Fragment) -> EditResult<bool> {
    let tree = &mut *ctx.tree;
    let format = ctx.format;
    let Fragment { start, end, line } = fragment;

    let container = markers::common_ancestor(tree, start, end)?;
    markers::lift_to(tree, start, container)?;
    markers::lift_to(tree, end, container)?;

    let content = markers::nodes_between(tree, start, end)?;
    if !content.iter().any(|&n| tree.has_text(n)) {
        return Ok(false);
    }

    let select = markers::enclose_between(tree, start, end)?;
    strip_format(tree, select, format)?;

    let already_formatted = std::iter::once(container)
        .chain(tree.ancestors(container))
        .take_while(|&n| n != line)
        .any(|n| tree.is_format(n, format));
    if already_formatted {
        tree.unwrap_node(select)?;
        return Ok(false);
    }

    markers::sweep_empty_around(tree, start);
    markers::sweep_empty_around(tree, end);
    let prev = tree.prev_sibling(start).filter(|&n| tree.is_format(n, format));
    let next = tree.next_sibling(end).filter(|&n| tree.is_format(n, format));
    let bias = match (prev, next) {
        (Some(prev), Some(next)) => Some(MergeBias::Coalesce { prev, next }),
        (Some(prev), None) => Some(MergeBias::Append(prev)),
        (None, Some(next)) => Some(MergeBias::Prepend(next)),
        (None, None) => None,
    };
    log::debug!("wrapping with {:?}", bias);

    match bias {
        Some(MergeBias::Append(target)) => merge_into(tree, target, Side::After, &[start, select, end]),
        Some(MergeBias::Prepend(target)) => merge_into(tree, target, Side::Before, &[start, select, end]),
        Some(MergeBias::Coalesce { prev, next }) => {
            merge_into(tree, prev, Side::After, &[start, select, end]);
            tree.move_children(next, prev, Side::After);
            tree.remove(next);
        }
        None => {
            let wrapper = tree.create_format(format.clone());
            tree.insert_after(start, wrapper)?;
            tree.detach(select);
            tree.append_child(wrapper, select);
        }
    }

    tree.unwrap_node(select)?;
    Ok(true)
}

/// Move `nodes`, in order, to one end of `target`'s children
fn merge_into(tree: &mut DocumentTree, target: NodeId, side: Side, nodes: &[NodeId]) {
    for (i, &node) in nodes.iter().enumerate() {
        tree.detach(node);
        match side {
            Side::Before => tree.insert_child(target, i, node),
            Side::After => tree.append_child(target, node),
        }
    }
}

/// Take the format off the fragment, leaving the content around it formatted
pub fn unwrap_fragment(ctx: &mut EngineContext, fragment: Fragment) -> EditResult<bool> {
    let tree = &mut *ctx.tree;
    let format = ctx.format;
    let Fragment { start, end, line } = fragment;

    if let Some(node) = exact_match(tree, format, start, end, line) {
        log::debug!("unwrap: exact match");
        tree.move_before(node, start)?;
        tree.move_after(node, end)?;
        strip_format(tree, node, format)?;
        tree.unwrap_node(node)?;
        return Ok(true);
    }

    let lca = markers::common_ancestor(tree, start, end)?;
    let outermost = std::iter::once(lca)
        .chain(tree.ancestors(lca))
        .take_while(|&n| n != line)
        .filter(|&n| tree.is_format(n, format))
        .last();
    let container = match outermost {
        Some(node) => tree.parent(node).ok_or(EditError::DetachedNode)?,
        None => lca,
    };
    log::debug!("unwrap: partial, splitting at {:?}", tree.node_type(container));

    markers::lift_to(tree, start, container)?;
    markers::lift_to(tree, end, container)?;

    let mut changed = false;
    for node in markers::nodes_between(tree, start, end)? {
        changed |= strip_format(tree, node, format)?;
        if tree.is_format(node, format) {
            tree.unwrap_node(node)?;
            changed = true;
        }
    }
    Ok(changed)
}

/// The single format node the markers fill exactly, if any
fn exact_match(tree: &DocumentTree, format: &Format, start: NodeId, end: NodeId, line: NodeId) -> Option<NodeId> {
    let enclosing = |marker: NodeId| {
        tree.ancestors(marker)
            .take_while(|&n| n != line)
            .find(|&n| tree.is_format(n, format))
    };

    let from_start = enclosing(start)
        .filter(|&n| tree.text_offset_in(n, start) == Some(0))
        .or_else(|| tree.next_sibling(start).filter(|&n| tree.is_format(n, format)))?;
    let from_end = enclosing(end)
        .filter(|&n| tree.text_after_in(n, end) == Some(0))
        .or_else(|| tree.prev_sibling(end).filter(|&n| tree.is_format(n, format)))?;

    (from_start == from_end).then_some(from_start)
}

/// Remove every node of `format` below `node`, keeping their content in place
pub fn strip_format(tree: &mut DocumentTree, node: NodeId, format: &Format) -> EditResult<bool> {
    let mut changed = false;
    for child in tree.children(node).to_vec() {
        changed |= strip_format(tree, child, format)?;
        if tree.is_format(child, format) {
            tree.unwrap_node(child)?;
            changed = true;
        }
    }
    Ok(changed)
}

/// Restore the cleanup invariant around a marker
///
/// Empty runs and content-free formats next to the marker are dropped, and
/// same-format nodes meeting at the marker are merged with the marker moved
/// to the seam. Running it again changes nothing.
pub fn cleanup_marker(tree: &mut DocumentTree, marker: NodeId) -> EditResult {
    loop {
        markers::sweep_empty_around(tree, marker);
        let (Some(prev), Some(next)) = (tree.prev_sibling(marker), tree.next_sibling(marker)) else {
            return Ok(());
        };
        let same = matches!(
            (tree.format_of(prev), tree.format_of(next)),
            (Some(a), Some(b)) if a == b
        );
        if !same {
            return Ok(());
        }

        log::trace!("merging {:?} across marker", tree.format_of(prev));
        let seam = tree.children(prev).len();
        tree.move_children(next, prev, Side::After);
        tree.remove(next);
        tree.detach(marker);
        tree.insert_child(prev, seam, marker);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::richtext::document_tree::{DocumentPosition, Selection};
    use crate::richtext::markers::{Sliced, release, slice};
    use crate::richtext::markup::{parse, to_markup};
    use crate::richtext::selection_descriptor::classify;

    fn run(markup: &str, from: (usize, usize), to: (usize, usize), format: Format, rule: ToggleRule) -> (String, ToggleOutcome) {
        let mut tree = parse(markup).unwrap().tree;
        let selection = Selection::new(
            tree.locate(DocumentPosition::new(from.0, from.1)).unwrap(),
            tree.locate(DocumentPosition::new(to.0, to.1)).unwrap(),
        );
        let Sliced::Range(slice) = slice(&mut tree, selection).unwrap() else {
            panic!("expected a range");
        };
        let descriptor = classify(&tree, &slice, &format).unwrap();
        let mut ctx = EngineContext {
            tree: &mut tree,
            format: &format,
            descriptor: &descriptor,
            slice,
            rule,
        };
        let outcome = toggle_range(&mut ctx).unwrap();
        release(&mut tree, slice).unwrap();
        tree.normalize(None);
        (to_markup(&tree), outcome)
    }

    fn bold(markup: &str, from: (usize, usize), to: (usize, usize)) -> (String, ToggleOutcome) {
        run(markup, from, to, Format::bold(), ToggleRule::Boundary)
    }

    #[test]
    fn test_wrap_plain_text() {
        let (out, outcome) = bold("<p>hello world</p>", (0, 6), (0, 11));
        assert_eq!(out, "<p>hello <strong>world</strong></p>");
        assert_eq!(outcome.action, ToggleAction::Wrap);
        assert_eq!(outcome.fragments, 1);
    }

    #[test]
    fn test_unwrap_exact_match() {
        let (out, outcome) = bold("<p>hello <strong>world</strong></p>", (0, 6), (0, 11));
        assert_eq!(out, "<p>hello world</p>");
        assert_eq!(outcome.action, ToggleAction::Unwrap);
    }

    #[test]
    fn test_unwrap_partial_splits_wrapper() {
        let (out, _) = bold("<p><strong>hello world</strong></p>", (0, 2), (0, 7));
        assert_eq!(out, "<p><strong>he</strong>llo w<strong>orld</strong></p>");
    }

    #[test]
    fn test_unwrap_keeps_outer_formats() {
        let (out, _) = bold("<p><em><strong>hello world</strong></em></p>", (0, 6), (0, 11));
        assert_eq!(out, "<p><em><strong>hello </strong>world</em></p>");
    }

    #[test]
    fn test_wrap_appends_to_previous_node() {
        let (out, _) = bold("<p><strong>hel</strong>lo</p>", (0, 1), (0, 5));
        assert_eq!(out, "<p><strong>hello</strong></p>");
    }

    #[test]
    fn test_wrap_prepends_to_next_node() {
        let (out, _) = bold("<p>hel<strong>lo</strong></p>", (0, 0), (0, 3));
        assert_eq!(out, "<p><strong>hello</strong></p>");
    }

    #[test]
    fn test_wrap_coalesces_both_neighbours() {
        let (out, _) = bold("<p><strong>a</strong>b<strong>c</strong></p>", (0, 1), (0, 2));
        assert_eq!(out, "<p><strong>abc</strong></p>");
    }

    #[test]
    fn test_wrap_strips_nested_same_format() {
        let (out, _) = bold("<p>ab<strong>cd</strong>ef</p>", (0, 1), (0, 5));
        assert_eq!(out, "<p>a<strong>bcde</strong>f</p>");
    }

    #[test]
    fn test_wrap_respects_other_formats() {
        let (out, _) = bold("<p><em>hello world</em></p>", (0, 6), (0, 11));
        assert_eq!(out, "<p><em>hello <strong>world</strong></em></p>");
    }

    #[test]
    fn test_wrap_multiline() {
        let (out, outcome) = bold("<p>first line</p><p>second line</p>", (0, 6), (1, 6));
        assert_eq!(
            out,
            "<p>first <strong>line</strong></p><p><strong>second</strong> line</p>"
        );
        assert_eq!(outcome.fragments, 2);
    }

    #[test]
    fn test_wrap_multiline_middle_line_fully() {
        let (out, outcome) = bold("<p>ab</p><p>cd</p><p>ef</p>", (0, 1), (2, 1));
        assert_eq!(
            out,
            "<p>a<strong>b</strong></p><p><strong>cd</strong></p><p><strong>e</strong>f</p>"
        );
        assert_eq!(outcome.fragments, 3);
    }

    #[test]
    fn test_empty_line_fragment_is_noop() {
        let (out, outcome) = bold("<p>ab</p><p></p><p>cd</p>", (0, 0), (2, 2));
        assert_eq!(
            out,
            "<p><strong>ab</strong></p><p></p><p><strong>cd</strong></p>"
        );
        assert_eq!(outcome.fragments, 3);
    }

    #[test]
    fn test_coverage_rule() {
        let markup = "<p><strong>abc</strong>d</p>";
        let (out, outcome) = run(markup, (0, 0), (0, 4), Format::bold(), ToggleRule::Coverage { threshold: 0.5 });
        assert_eq!(outcome.action, ToggleAction::Unwrap);
        assert_eq!(out, "<p>abcd</p>");

        let (out, outcome) = run(markup, (0, 0), (0, 4), Format::bold(), ToggleRule::Boundary);
        assert_eq!(outcome.action, ToggleAction::Wrap);
        assert_eq!(out, "<p><strong>abcd</strong></p>");
    }

    #[test]
    fn test_already_formatted_is_noop() {
        let (out, outcome) = run(
            "<p><strong>abc</strong></p>",
            (0, 1),
            (0, 2),
            Format::bold(),
            ToggleRule::Coverage { threshold: 1.5 },
        );
        assert_eq!(outcome.action, ToggleAction::Noop);
        assert_eq!(out, "<p><strong>abc</strong></p>");
    }

    #[test]
    fn test_cleanup_merges_across_marker() {
        let mut tree = parse("<p><strong>a</strong><ctx-caret/><strong>b</strong></p>")
            .unwrap()
            .tree;
        let block = tree.block(0).unwrap();
        let marker = tree.children(block)[1];

        cleanup_marker(&mut tree, marker).unwrap();
        assert_eq!(to_markup(&tree), "<p><strong>a<ctx-caret/>b</strong></p>");

        cleanup_marker(&mut tree, marker).unwrap();
        assert_eq!(to_markup(&tree), "<p><strong>a<ctx-caret/>b</strong></p>");
    }

    #[test]
    fn test_decide() {
        let mut tree = parse("<p>ab</p>").unwrap().tree;
        let selection = Selection::new(
            tree.locate(DocumentPosition::new(0, 0)).unwrap(),
            tree.locate(DocumentPosition::new(0, 2)).unwrap(),
        );
        let Sliced::Range(slice) = slice(&mut tree, selection).unwrap() else {
            panic!("expected a range");
        };
        let mut descriptor = classify(&tree, &slice, &Format::bold()).unwrap();
        assert_eq!(decide(&descriptor, &Format::bold(), ToggleRule::Boundary), ToggleAction::Wrap);

        descriptor.coverage = 0.75;
        let rule = ToggleRule::Coverage { threshold: 0.5 };
        assert_eq!(decide(&descriptor, &Format::bold(), rule), ToggleAction::Unwrap);
    }
}
