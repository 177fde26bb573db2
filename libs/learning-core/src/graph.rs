//! Content graph: prerequisite unlock predicate and cycle detection.

use std::collections::HashMap;

use crate::store::{ProgressStore, StoreResult};
use crate::types::{Card, CardId, ProgressStatus, UserId};

/// Whether every prerequisite of `card` is mastered by `user`.
///
/// Nothing is cached: prerequisite mastery can change between calls, so
/// callers checking several candidates must call this once per candidate.
/// Prerequisite cycles are not detected here; cards on a cycle simply never
/// unlock. Reject cycles when content is edited, see [`find_cycle`].
pub async fn is_unlocked<S: ProgressStore>(store: &S, card: &Card, user: UserId) -> StoreResult<bool> {
    for prerequisite in &card.prerequisites {
        let mastered = store
            .find_record(user, *prerequisite)
            .await?
            .is_some_and(|record| record.status() == ProgressStatus::Mastered);

        if !mastered {
            return Ok(false);
        }
    }

    Ok(true)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Find a prerequisite cycle in `edges` (card -> its prerequisites).
///
/// Returns the cards on the first cycle found, starting and ending with the
/// same card, or `None` when the graph is acyclic. Traversal follows the
/// sorted key order so the result is deterministic.
pub fn find_cycle(edges: &HashMap<CardId, Vec<CardId>>) -> Option<Vec<CardId>> {
    let mut marks: HashMap<CardId, Mark> = HashMap::new();
    let mut roots: Vec<&CardId> = edges.keys().collect();
    roots.sort();

    for root in roots {
        if marks.contains_key(root) {
            continue;
        }

        let mut path = Vec::new();
        if let Some(cycle) = visit(*root, edges, &mut marks, &mut path) {
            return Some(cycle);
        }
    }

    None
}

fn visit(
    node: CardId,
    edges: &HashMap<CardId, Vec<CardId>>,
    marks: &mut HashMap<CardId, Mark>,
    path: &mut Vec<CardId>,
) -> Option<Vec<CardId>> {
    marks.insert(node, Mark::Visiting);
    path.push(node);

    for next in edges.get(&node).into_iter().flatten() {
        match marks.get(next) {
            Some(Mark::Visiting) => {
                let start = path.iter().position(|id| id == next).unwrap_or(0);
                let mut cycle = path[start..].to_vec();
                cycle.push(*next);
                return Some(cycle);
            }
            Some(Mark::Done) => {}
            None => {
                if let Some(cycle) = visit(*next, edges, marks, path) {
                    return Some(cycle);
                }
            }
        }
    }

    path.pop();
    marks.insert(node, Mark::Done);
    None
}
