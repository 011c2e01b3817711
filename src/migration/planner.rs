// ABOUTME: Computes a foreign-key safe copy order for the tables of one database
// ABOUTME: Kahn topological sort that reports tables it could not order

use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};

/// A foreign key reduced to the pair of tables it connects.
///
/// `child` holds the referencing column(s), `parent` is the referenced table,
/// so `parent` has to be copied before `child`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct DependencyEdge {
    pub child: String,
    pub parent: String,
}

impl DependencyEdge {
    pub fn new(child: impl Into<String>, parent: impl Into<String>) -> Self {
        Self {
            child: child.into(),
            parent: parent.into(),
        }
    }

    pub fn is_self_reference(&self) -> bool {
        self.child == self.parent
    }
}

/// Result of planning one database.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferPlan {
    order: Vec<String>,
    unordered: Vec<String>,
    cyclic: Vec<String>,
}

impl TransferPlan {
    /// Tables in dependency order (parents before children)
    pub fn order(&self) -> &[String] {
        &self.order
    }

    /// Tables that never became free of dependencies, in discovery order.
    ///
    /// This is every table of [`TransferPlan::cyclic`] plus the tables that
    /// only wait on a cycle, directly or through other tables.
    pub fn unordered(&self) -> &[String] {
        &self.unordered
    }

    /// The part of [`TransferPlan::unordered`] that keeps the cycles closed.
    ///
    /// Tables on a foreign-key cycle, plus any table linking one cycle to
    /// another, in discovery order. Tables merely blocked behind a cycle are
    /// left out.
    pub fn cyclic(&self) -> &[String] {
        &self.cyclic
    }

    /// Unordered tables that are blocked by a cycle without being part of one
    pub fn blocked(&self) -> impl Iterator<Item = &String> {
        self.unordered.iter().filter(move |t| !self.cyclic.contains(*t))
    }

    pub fn is_complete(&self) -> bool {
        self.unordered.is_empty()
    }

    pub fn len(&self) -> usize {
        self.order.len() + self.unordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tables to copy, in copy order.
    ///
    /// With `include_unordered`, tables left out of the topological order are
    /// appended after every ordered table.
    pub fn copy_sequence(&self, include_unordered: bool) -> Vec<&str> {
        let mut sequence: Vec<&str> = self.order.iter().map(String::as_str).collect();
        if include_unordered {
            sequence.extend(self.unordered.iter().map(String::as_str));
        }
        sequence
    }
}

/// Plan the order in which `tables` must be copied given their foreign keys.
///
/// Every distinct table ends up in exactly one of [`TransferPlan::order`] or
/// [`TransferPlan::unordered`]. Edges naming a table outside `tables` are
/// ignored, self references never block a table, and repeated edges count once.
/// Ties are broken by the position of the table in `tables`, so the result is
/// deterministic.
///
/// # Examples
///
/// ```
/// # use db_migrator::migration::planner::{plan_transfer_order, DependencyEdge};
/// let tables = vec!["orders".to_string(), "customers".to_string()];
/// let edges = vec![DependencyEdge::new("orders", "customers")];
/// let plan = plan_transfer_order(&tables, &edges);
/// assert_eq!(plan.order(), ["customers", "orders"]);
/// assert!(plan.is_complete());
/// ```
pub fn plan_transfer_order(tables: &[String], edges: &[DependencyEdge]) -> TransferPlan {
    let mut names: Vec<&str> = Vec::with_capacity(tables.len());
    let mut index: HashMap<&str, usize> = HashMap::with_capacity(tables.len());
    for table in tables {
        if !index.contains_key(table.as_str()) {
            index.insert(table.as_str(), names.len());
            names.push(table.as_str());
        }
    }

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); names.len()];
    let mut parents: Vec<Vec<usize>> = vec![Vec::new(); names.len()];
    let mut in_degree: Vec<usize> = vec![0; names.len()];
    let mut seen: HashSet<(usize, usize)> = HashSet::with_capacity(edges.len());

    for edge in edges {
        if edge.is_self_reference() {
            continue;
        }
        let (Some(&child), Some(&parent)) = (
            index.get(edge.child.as_str()),
            index.get(edge.parent.as_str()),
        ) else {
            tracing::debug!(
                "Ignoring foreign key {} -> {}: table not in transfer set",
                edge.child,
                edge.parent
            );
            continue;
        };
        if seen.insert((child, parent)) {
            children[parent].push(child);
            parents[child].push(parent);
            in_degree[child] += 1;
        }
    }

    let mut frontier: VecDeque<usize> =
        (0..names.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(names.len());

    while let Some(current) = frontier.pop_front() {
        order.push(names[current].to_string());
        for &child in &children[current] {
            in_degree[child] -= 1;
            if in_degree[child] == 0 {
                frontier.push_back(child);
            }
        }
    }

    let stuck: Vec<bool> = in_degree.iter().map(|&d| d > 0).collect();
    let on_cycle = cycle_members(&stuck, &children, &parents);

    let unordered = (0..names.len())
        .filter(|&i| stuck[i])
        .map(|i| names[i].to_string())
        .collect();
    let cyclic = (0..names.len())
        .filter(|&i| on_cycle[i])
        .map(|i| names[i].to_string())
        .collect();

    TransferPlan {
        order,
        unordered,
        cyclic,
    }
}

/// Narrow the stuck tables down to those that lead back into a cycle.
///
/// Every stuck table waits on a cycle. Repeatedly dropping stuck tables that
/// no remaining stuck table depends on peels off the tables hanging below the
/// cycles and leaves the cycles themselves.
fn cycle_members(stuck: &[bool], children: &[Vec<usize>], parents: &[Vec<usize>]) -> Vec<bool> {
    let mut remaining = stuck.to_vec();
    let mut dependents: Vec<usize> = (0..stuck.len())
        .map(|i| {
            if stuck[i] {
                children[i].iter().filter(|&&c| stuck[c]).count()
            } else {
                0
            }
        })
        .collect();

    let mut leaves: VecDeque<usize> = (0..stuck.len())
        .filter(|&i| stuck[i] && dependents[i] == 0)
        .collect();
    while let Some(leaf) = leaves.pop_front() {
        remaining[leaf] = false;
        for &parent in &parents[leaf] {
            if remaining[parent] {
                dependents[parent] -= 1;
                if dependents[parent] == 0 {
                    leaves.push_back(parent);
                }
            }
        }
    }

    remaining
}
