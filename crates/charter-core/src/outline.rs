//! Outline snapshot: derivation from flat rows and in-place patching.
//!
//! [`build_outline`] is the only function that derives the nested forest from
//! section rows. The remaining functions patch an existing forest the way the
//! insert and delete paths need it. All walks use explicit stacks so deep
//! templates cannot exhaust the call stack.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use uuid::Uuid;

use charter_db::models::{OutlineNode, Section};

/// Deepest chain of nodes a stored outline may hold.
///
/// Each level nests an object and a `children` array in the `jsonb`
/// column, and the JSON decoder refuses input nested past 128.
pub const MAX_OUTLINE_DEPTH: usize = 60;

/// Build the nested outline for one template's rows.
///
/// `sections` must be in stable insertion order; sibling order in the output
/// follows it. Root rows get keys `"0"`, `"1"`, …; a child's key is its
/// parent's key plus `_<index>`. Rows whose `parent_id` is not among
/// `sections` are left out together with their subtrees.
pub fn build_outline(sections: &[Section]) -> Vec<OutlineNode> {
    let mut groups: HashMap<Option<i32>, Vec<&Section>> = HashMap::new();
    for section in sections {
        groups.entry(section.parent_id).or_default().push(section);
    }

    let Some(roots) = groups.get(&None) else {
        return Vec::new();
    };

    // Top-down pass: assign level and key, recording pre-order.
    let mut placed: Vec<(&Section, u32, String)> = Vec::with_capacity(sections.len());
    let mut stack: Vec<(&Section, u32, String)> = roots
        .iter()
        .enumerate()
        .rev()
        .map(|(i, s)| (*s, 0, i.to_string()))
        .collect();
    let mut seen: HashSet<i32> = HashSet::with_capacity(sections.len());

    while let Some((section, level, key)) = stack.pop() {
        if !seen.insert(section.id) {
            continue;
        }
        if let Some(children) = groups.get(&Some(section.id)) {
            for (i, child) in children.iter().enumerate().rev() {
                stack.push((*child, level + 1, format!("{key}_{i}")));
            }
        }
        placed.push((section, level, key));
    }

    // Bottom-up pass: reverse pre-order visits every child before its parent.
    let mut built: HashMap<i32, OutlineNode> = HashMap::with_capacity(placed.len());
    for (section, level, key) in placed.into_iter().rev() {
        let children: Vec<OutlineNode> = groups
            .get(&Some(section.id))
            .map(|group| group.iter().filter_map(|c| built.remove(&c.id)).collect())
            .unwrap_or_default();
        built.insert(
            section.id,
            OutlineNode {
                section_id: section.section_id,
                children,
                level,
                search_key: key,
                version: 0,
            },
        );
    }

    roots.iter().filter_map(|s| built.remove(&s.id)).collect()
}

/// Index path (root index, then child indices) of the first node carrying
/// `section_id` in depth-first pre-order.
fn find_path(forest: &[OutlineNode], section_id: Uuid) -> Option<Vec<usize>> {
    let mut stack: Vec<(Vec<usize>, &OutlineNode)> = forest
        .iter()
        .enumerate()
        .rev()
        .map(|(i, node)| (vec![i], node))
        .collect();

    while let Some((path, node)) = stack.pop() {
        if node.section_id == section_id {
            return Some(path);
        }
        for (i, child) in node.children.iter().enumerate().rev() {
            let mut child_path = Vec::with_capacity(path.len() + 1);
            child_path.extend_from_slice(&path);
            child_path.push(i);
            stack.push((child_path, child));
        }
    }
    None
}

/// Find the node for `section_id` at any depth.
pub fn find_node(forest: &[OutlineNode], section_id: Uuid) -> Option<&OutlineNode> {
    let path = find_path(forest, section_id)?;
    let (first, rest) = path.split_first()?;
    let mut node = forest.get(*first)?;
    for &i in rest {
        node = node.children.get(i)?;
    }
    Some(node)
}

fn find_node_mut(forest: &mut [OutlineNode], section_id: Uuid) -> Option<&mut OutlineNode> {
    let path = find_path(forest, section_id)?;
    let (first, rest) = path.split_first()?;
    let mut node = forest.get_mut(*first)?;
    for &i in rest {
        node = node.children.get_mut(i)?;
    }
    Some(node)
}

/// Append a new leaf under the node for `parent_section_id`.
///
/// Returns a copy of the appended node, or `None` when the parent is not in
/// the forest (the forest is then left untouched).
pub fn append_child(
    forest: &mut [OutlineNode],
    parent_section_id: Uuid,
    section_id: Uuid,
) -> Option<OutlineNode> {
    let parent = find_node_mut(forest, parent_section_id)?;
    let key = format!("{}_{}", parent.search_key, parent.children.len());
    let node = OutlineNode::leaf(section_id, parent.level + 1, key);
    parent.children.push(node.clone());
    Some(node)
}

/// Append a new root leaf. Returns a copy of the appended node.
pub fn append_root(forest: &mut Vec<OutlineNode>, section_id: Uuid) -> OutlineNode {
    let node = OutlineNode::leaf(section_id, 0, forest.len().to_string());
    forest.push(node.clone());
    node
}

/// Remove every node carrying `section_id`, wherever it sits. A removed
/// node's children go with it. Returns how many nodes matched.
pub fn prune(forest: &mut Vec<OutlineNode>, section_id: Uuid) -> usize {
    let mut removed = 0;
    let mut stack: Vec<&mut Vec<OutlineNode>> = vec![forest];

    while let Some(group) = stack.pop() {
        let before = group.len();
        group.retain(|node| node.section_id != section_id);
        removed += before - group.len();
        for node in group {
            stack.push(&mut node.children);
        }
    }
    removed
}

/// Recompute `level` and `search_key` of every node from its position.
/// Versions are left alone.
pub fn reindex(forest: &mut [OutlineNode]) {
    let mut stack: Vec<(&mut OutlineNode, u32, String)> = forest
        .iter_mut()
        .enumerate()
        .map(|(i, node)| (node, 0, i.to_string()))
        .collect();

    while let Some((node, level, key)) = stack.pop() {
        let OutlineNode {
            children,
            level: node_level,
            search_key,
            ..
        } = node;
        *node_level = level;
        for (i, child) in children.iter_mut().enumerate() {
            stack.push((child, level + 1, format!("{key}_{i}")));
        }
        *search_key = key;
    }
}

/// Number of nodes on the longest root-to-leaf path. Zero for an empty
/// forest.
pub fn depth(forest: &[OutlineNode]) -> usize {
    let mut deepest = 0;
    let mut stack: Vec<(&OutlineNode, usize)> = forest.iter().map(|node| (node, 1)).collect();

    while let Some((node, d)) = stack.pop() {
        deepest = deepest.max(d);
        stack.extend(node.children.iter().map(|child| (child, d + 1)));
    }
    deepest
}

/// Every node in depth-first pre-order, paired with its parent's
/// `section_id` (`None` for roots).
pub fn flatten(forest: &[OutlineNode]) -> Vec<(&OutlineNode, Option<Uuid>)> {
    let mut out = Vec::new();
    let mut stack: Vec<(&OutlineNode, Option<Uuid>)> =
        forest.iter().rev().map(|node| (node, None)).collect();

    while let Some((node, parent)) = stack.pop() {
        out.push((node, parent));
        for child in node.children.iter().rev() {
            stack.push((child, Some(node.section_id)));
        }
    }
    out
}

/// Differences between a stored outline and the rows it should mirror.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OutlineDrift {
    /// Rows with no node in the outline.
    pub missing: Vec<Uuid>,
    /// Nodes with no row.
    pub unknown: Vec<Uuid>,
    /// Nodes nested under a different parent than their row names.
    pub misplaced: Vec<Uuid>,
}

impl OutlineDrift {
    pub fn is_clean(&self) -> bool {
        self.missing.is_empty() && self.unknown.is_empty() && self.misplaced.is_empty()
    }
}

/// Compare a stored outline with the template's rows.
pub fn diff_outline(stored: &[OutlineNode], sections: &[Section]) -> OutlineDrift {
    let external_by_row: HashMap<i32, Uuid> =
        sections.iter().map(|s| (s.id, s.section_id)).collect();
    let row_parent: HashMap<Uuid, Option<Uuid>> = sections
        .iter()
        .map(|s| {
            let parent = s.parent_id.and_then(|p| external_by_row.get(&p).copied());
            (s.section_id, parent)
        })
        .collect();

    let nodes = flatten(stored);
    let in_outline: HashSet<Uuid> = nodes.iter().map(|(node, _)| node.section_id).collect();

    let mut drift = OutlineDrift::default();
    for section in sections {
        if !in_outline.contains(&section.section_id) {
            drift.missing.push(section.section_id);
        }
    }
    for (node, stored_parent) in &nodes {
        match row_parent.get(&node.section_id) {
            None => drift.unknown.push(node.section_id),
            Some(expected) if expected != stored_parent => drift.misplaced.push(node.section_id),
            Some(_) => {}
        }
    }
    drift
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ext, section};

    /// A(1) -> B(2) -> D(4); A -> C(3); E(5) is a second root.
    fn sample() -> Vec<Section> {
        vec![
            section(1, None),
            section(2, Some(1)),
            section(3, Some(1)),
            section(4, Some(2)),
            section(5, None),
        ]
    }

    fn keys(forest: &[OutlineNode]) -> Vec<(Uuid, u32, String)> {
        flatten(forest)
            .into_iter()
            .map(|(n, _)| (n.section_id, n.level, n.search_key.clone()))
            .collect()
    }

    /// Level and key invariants over a whole forest.
    fn assert_well_formed(forest: &[OutlineNode]) {
        let mut stack: Vec<(&OutlineNode, Option<&OutlineNode>)> =
            forest.iter().map(|n| (n, None)).collect();
        let root_keys: HashSet<&str> = forest.iter().map(|n| n.search_key.as_str()).collect();
        assert_eq!(root_keys.len(), forest.len(), "root keys must be unique");

        while let Some((node, parent)) = stack.pop() {
            match parent {
                None => assert_eq!(node.level, 0),
                Some(p) => {
                    assert_eq!(node.level, p.level + 1);
                    assert!(node.search_key.starts_with(&format!("{}_", p.search_key)));
                    assert_ne!(node.search_key, p.search_key);
                }
            }
            let sibling_keys: HashSet<&str> =
                node.children.iter().map(|c| c.search_key.as_str()).collect();
            assert_eq!(sibling_keys.len(), node.children.len());
            for child in &node.children {
                stack.push((child, Some(node)));
            }
        }
    }

    #[test]
    fn builds_nested_forest_with_keys_and_levels() {
        let forest = build_outline(&sample());

        assert_eq!(
            keys(&forest),
            vec![
                (ext(1), 0, "0".to_owned()),
                (ext(2), 1, "0_0".to_owned()),
                (ext(4), 2, "0_0_0".to_owned()),
                (ext(3), 1, "0_1".to_owned()),
                (ext(5), 0, "1".to_owned()),
            ]
        );
        assert!(flatten(&forest).iter().all(|(n, _)| n.version == 0));
        assert_well_formed(&forest);
    }

    #[test]
    fn build_is_deterministic() {
        let rows = sample();
        let first = serde_json::to_string(&build_outline(&rows)).unwrap();
        let second = serde_json::to_string(&build_outline(&rows)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn sibling_order_follows_input_order() {
        let rows = vec![section(1, None), section(3, Some(1)), section(2, Some(1))];
        let forest = build_outline(&rows);
        let children: Vec<Uuid> = forest[0].children.iter().map(|c| c.section_id).collect();
        assert_eq!(children, vec![ext(3), ext(2)]);
    }

    #[test]
    fn rows_with_foreign_parent_are_dropped() {
        let rows = vec![section(1, None), section(7, Some(99)), section(8, Some(7))];
        let forest = build_outline(&rows);
        assert_eq!(forest.len(), 1);
        assert!(find_node(&forest, ext(7)).is_none());
        assert!(find_node(&forest, ext(8)).is_none());
    }

    #[test]
    fn empty_input_builds_empty_forest() {
        assert!(build_outline(&[]).is_empty());
    }

    #[test]
    fn deep_chain_does_not_recurse() {
        let mut rows = vec![section(1, None)];
        for id in 2..=5_000 {
            rows.push(section(id, Some(id - 1)));
        }
        let forest = build_outline(&rows);
        let deepest = find_node(&forest, ext(5_000)).expect("deepest node present");
        assert_eq!(deepest.level, 4_999);
        assert!(diff_outline(&forest, &rows).is_clean());
        // Nested drop of a deep forest is recursive in std; unwind it first.
        let mut forest = forest;
        let mut pending: Vec<OutlineNode> = forest.drain(..).collect();
        while let Some(mut node) = pending.pop() {
            pending.append(&mut node.children);
        }
    }

    #[test]
    fn depth_counts_nodes_on_longest_path() {
        assert_eq!(depth(&[]), 0);
        assert_eq!(depth(&build_outline(&sample())), 3);
        assert_eq!(depth(&build_outline(&[section(5, None)])), 1);
    }

    #[test]
    fn outline_at_depth_limit_decodes() {
        let mut rows = vec![section(1, None)];
        for id in 2..=MAX_OUTLINE_DEPTH as i32 {
            rows.push(section(id, Some(id - 1)));
        }
        let forest = build_outline(&rows);
        assert_eq!(depth(&forest), MAX_OUTLINE_DEPTH);

        let bytes = serde_json::to_vec(&forest).unwrap();
        let decoded: Vec<OutlineNode> = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(decoded, forest);
    }

    #[test]
    fn append_child_uses_child_count_for_key() {
        let mut forest = build_outline(&sample());
        let node = append_child(&mut forest, ext(1), ext(9)).expect("parent exists");

        assert_eq!(node.level, 1);
        assert_eq!(node.search_key, "0_2");
        assert_eq!(forest[0].children.len(), 3);
        assert_well_formed(&forest);
    }

    #[test]
    fn append_child_finds_nested_parent() {
        let mut forest = build_outline(&sample());
        let node = append_child(&mut forest, ext(4), ext(9)).expect("parent exists");
        assert_eq!(node.level, 3);
        assert_eq!(node.search_key, "0_0_0_0");
    }

    #[test]
    fn append_child_missing_parent_leaves_forest_untouched() {
        let mut forest = build_outline(&sample());
        let before = forest.clone();
        assert!(append_child(&mut forest, ext(77), ext(9)).is_none());
        assert_eq!(forest, before);
    }

    #[test]
    fn append_root_uses_forest_length() {
        let mut forest = build_outline(&sample());
        let node = append_root(&mut forest, ext(9));
        assert_eq!(node.level, 0);
        assert_eq!(node.search_key, "2");
        assert_eq!(forest.len(), 3);
    }

    #[test]
    fn prune_removes_node_and_nested_children() {
        let mut forest = build_outline(&sample());
        let removed = prune(&mut forest, ext(2));

        assert_eq!(removed, 1);
        assert!(find_node(&forest, ext(2)).is_none());
        assert!(find_node(&forest, ext(4)).is_none());
        let children: Vec<Uuid> = forest[0].children.iter().map(|c| c.section_id).collect();
        assert_eq!(children, vec![ext(3)]);
    }

    #[test]
    fn prune_unknown_id_is_noop() {
        let mut forest = build_outline(&sample());
        let before = forest.clone();
        assert_eq!(prune(&mut forest, ext(77)), 0);
        assert_eq!(forest, before);
    }

    #[test]
    fn reindex_closes_gaps_left_by_prune() {
        let mut forest = build_outline(&sample());
        forest[0].children[1].version = 3;
        prune(&mut forest, ext(2));
        reindex(&mut forest);

        let c = find_node(&forest, ext(3)).unwrap();
        assert_eq!(c.search_key, "0_0");
        assert_eq!(c.version, 3);
        assert_well_formed(&forest);

        // The next insert under A must not collide with C's key.
        let node = append_child(&mut forest, ext(1), ext(9)).unwrap();
        assert_eq!(node.search_key, "0_1");
        assert_well_formed(&forest);
    }

    #[test]
    fn diff_reports_missing_unknown_and_misplaced() {
        let rows = sample();
        let mut stored = build_outline(&rows);
        assert!(diff_outline(&stored, &rows).is_clean());

        // Row 4 moves under C in the table only.
        let mut moved = rows.clone();
        moved[3].parent_id = Some(3);
        let drift = diff_outline(&stored, &moved);
        assert_eq!(drift.misplaced, vec![ext(4)]);
        assert!(drift.missing.is_empty());

        // Extra node without a row, and a row without a node.
        append_root(&mut stored, ext(77));
        let mut extra_row = rows.clone();
        extra_row.push(section(6, None));
        let drift = diff_outline(&stored, &extra_row);
        assert_eq!(drift.unknown, vec![ext(77)]);
        assert_eq!(drift.missing, vec![ext(6)]);
    }
}
