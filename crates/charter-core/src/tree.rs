//! Parent-pointer walks over section rows.

use std::collections::{HashMap, HashSet, VecDeque};

/// Ids of every strict descendant of `root`, breadth-first.
///
/// `edges` are `(id, parent_id)` pairs for one template. A corrupt table
/// with a parent cycle terminates because each id is visited at most once.
pub fn collect_descendants<I>(edges: I, root: i32) -> Vec<i32>
where
    I: IntoIterator<Item = (i32, Option<i32>)>,
{
    let mut children: HashMap<i32, Vec<i32>> = HashMap::new();
    for (id, parent) in edges {
        if let Some(parent) = parent {
            children.entry(parent).or_default().push(id);
        }
    }

    let mut out = Vec::new();
    let mut visited: HashSet<i32> = HashSet::from([root]);
    let mut queue: VecDeque<i32> = VecDeque::from([root]);

    while let Some(current) = queue.pop_front() {
        let Some(kids) = children.get(&current) else {
            continue;
        };
        for &kid in kids {
            if visited.insert(kid) {
                out.push(kid);
                queue.push_back(kid);
            }
        }
    }
    out
}

/// Whether walking parent pointers upward from `start` comes back to it.
///
/// `parent_of` maps every id of the template to its parent. Missing ids are
/// treated as roots.
pub fn creates_cycle(parent_of: &HashMap<i32, Option<i32>>, start: i32) -> bool {
    let mut visited: HashSet<i32> = HashSet::new();
    let mut current = parent_of.get(&start).copied().flatten();

    while let Some(id) = current {
        if id == start {
            return true;
        }
        if !visited.insert(id) {
            // A loop above `start` that does not include it.
            return false;
        }
        current = parent_of.get(&id).copied().flatten();
    }
    false
}

/// Number of rows on the path from the root down to `id`, `id` included.
///
/// Stops at a missing parent or a loop, counting what was walked so far.
pub fn depth(parent_of: &HashMap<i32, Option<i32>>, id: i32) -> usize {
    let mut visited: HashSet<i32> = HashSet::from([id]);
    let mut current = parent_of.get(&id).copied().flatten();
    let mut count = 1;

    while let Some(parent) = current {
        if !visited.insert(parent) || !parent_of.contains_key(&parent) {
            break;
        }
        count += 1;
        current = parent_of.get(&parent).copied().flatten();
    }
    count
}

/// Largest [`depth`] over every row in `parent_of`.
pub fn max_depth(parent_of: &HashMap<i32, Option<i32>>) -> usize {
    parent_of
        .keys()
        .map(|id| depth(parent_of, *id))
        .max()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edges() -> Vec<(i32, Option<i32>)> {
        vec![
            (1, None),
            (2, Some(1)),
            (3, Some(1)),
            (4, Some(2)),
            (5, Some(4)),
            (6, None),
        ]
    }

    #[test]
    fn descendants_at_every_depth() {
        let mut found = collect_descendants(edges(), 1);
        found.sort_unstable();
        assert_eq!(found, vec![2, 3, 4, 5]);
    }

    #[test]
    fn leaf_has_no_descendants() {
        assert!(collect_descendants(edges(), 5).is_empty());
        assert!(collect_descendants(edges(), 99).is_empty());
    }

    #[test]
    fn descendants_terminate_on_corrupt_loop() {
        let looped = vec![(1, Some(3)), (2, Some(1)), (3, Some(2))];
        let mut found = collect_descendants(looped, 1);
        found.sort_unstable();
        assert_eq!(found, vec![2, 3]);
    }

    #[test]
    fn detects_cycle_through_new_parent() {
        let mut parent_of: HashMap<i32, Option<i32>> = edges().into_iter().collect();
        assert!(!creates_cycle(&parent_of, 2));

        // Move 1 under its grandchild 4.
        parent_of.insert(1, Some(4));
        assert!(creates_cycle(&parent_of, 1));
        assert!(creates_cycle(&parent_of, 2));
        assert!(!creates_cycle(&parent_of, 6));
    }

    #[test]
    fn self_parent_is_a_cycle() {
        let parent_of = HashMap::from([(1, Some(1))]);
        assert!(creates_cycle(&parent_of, 1));
    }

    #[test]
    fn depth_walks_to_root() {
        let parent_of: HashMap<i32, Option<i32>> = edges().into_iter().collect();
        assert_eq!(depth(&parent_of, 1), 1);
        assert_eq!(depth(&parent_of, 4), 3);
        assert_eq!(depth(&parent_of, 5), 4);
        assert_eq!(max_depth(&parent_of), 4);
        assert_eq!(max_depth(&HashMap::new()), 0);
    }

    #[test]
    fn depth_stops_at_loops_and_foreign_parents() {
        let looped = HashMap::from([(1, Some(2)), (2, Some(1))]);
        assert_eq!(depth(&looped, 1), 2);

        let foreign = HashMap::from([(1, Some(99))]);
        assert_eq!(depth(&foreign, 1), 1);
    }
}
