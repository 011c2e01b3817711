// ABOUTME: Property and scenario tests for the transfer order planner
// ABOUTME: Checks parent-before-child ordering, completeness, and cycle reporting

use db_migrator::migration::{plan_transfer_order, DependencyEdge};
use proptest::prelude::*;
use std::collections::HashSet;

fn names(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("t{}", i)).collect()
}

fn position(order: &[String], table: &str) -> Option<usize> {
    order.iter().position(|t| t == table)
}

// ── Strategies ──────────────────────────────────────────────────────────

/// Table count plus arbitrary index pairs, cycles allowed
fn graph_strategy() -> impl Strategy<Value = (usize, Vec<(usize, usize)>)> {
    (1usize..12).prop_flat_map(|n| (Just(n), prop::collection::vec((0..n, 0..n), 0..30)))
}

/// Edges always point from a higher index to a lower one, so no cycle exists
fn acyclic_strategy() -> impl Strategy<Value = (usize, Vec<DependencyEdge>)> {
    graph_strategy().prop_map(|(n, pairs)| {
        let edges = pairs
            .into_iter()
            .filter(|(a, b)| a != b)
            .map(|(a, b)| {
                let (child, parent) = if a > b { (a, b) } else { (b, a) };
                DependencyEdge::new(format!("t{}", child), format!("t{}", parent))
            })
            .collect();
        (n, edges)
    })
}

fn to_edges(pairs: &[(usize, usize)]) -> Vec<DependencyEdge> {
    pairs
        .iter()
        .map(|(c, p)| DependencyEdge::new(format!("t{}", c), format!("t{}", p)))
        .collect()
}

proptest! {
    /// Every table lands in exactly one of order / unordered
    #[test]
    fn prop_every_table_accounted_once((n, pairs) in graph_strategy()) {
        let tables = names(n);
        let plan = plan_transfer_order(&tables, &to_edges(&pairs));

        let mut seen = HashSet::new();
        for table in plan.order().iter().chain(plan.unordered()) {
            prop_assert!(seen.insert(table.clone()), "{} appears twice", table);
        }
        prop_assert_eq!(seen.len(), n);
        prop_assert_eq!(plan.len(), n);
    }

    /// Parents come before children for every edge between ordered tables
    #[test]
    fn prop_parents_precede_children((n, pairs) in graph_strategy()) {
        let tables = names(n);
        let edges = to_edges(&pairs);
        let plan = plan_transfer_order(&tables, &edges);

        for edge in edges.iter().filter(|e| !e.is_self_reference()) {
            if let (Some(c), Some(p)) = (
                position(plan.order(), &edge.child),
                position(plan.order(), &edge.parent),
            ) {
                prop_assert!(p < c, "{} copied before its parent {}", edge.child, edge.parent);
            }
        }
    }

    /// A child of an unordered table can never be ordered
    #[test]
    fn prop_unordered_blocks_children((n, pairs) in graph_strategy()) {
        let tables = names(n);
        let edges = to_edges(&pairs);
        let plan = plan_transfer_order(&tables, &edges);
        let unordered: HashSet<&String> = plan.unordered().iter().collect();

        for edge in edges.iter().filter(|e| !e.is_self_reference()) {
            if unordered.contains(&edge.parent) {
                prop_assert!(unordered.contains(&edge.child));
            }
        }
    }

    /// Cycle members are unordered, and nothing unordered depends on a blocked table
    #[test]
    fn prop_blocked_tables_hang_below_cycles((n, pairs) in graph_strategy()) {
        let tables = names(n);
        let edges = to_edges(&pairs);
        let plan = plan_transfer_order(&tables, &edges);
        let unordered: HashSet<&String> = plan.unordered().iter().collect();
        let blocked: HashSet<&String> = plan.blocked().collect();

        prop_assert_eq!(plan.cyclic().len() + blocked.len(), unordered.len());
        prop_assert!(plan.cyclic().iter().all(|t| unordered.contains(t)));
        prop_assert_eq!(plan.is_complete(), plan.cyclic().is_empty());
        for edge in edges.iter().filter(|e| !e.is_self_reference()) {
            if blocked.contains(&edge.parent) {
                prop_assert!(blocked.contains(&edge.child));
            }
        }
    }

    /// Without cycles the plan is always complete
    #[test]
    fn prop_acyclic_graph_is_complete((n, edges) in acyclic_strategy()) {
        let plan = plan_transfer_order(&names(n), &edges);
        prop_assert!(plan.is_complete());
        prop_assert_eq!(plan.order().len(), n);
    }

    /// Without edges the order is the table list itself
    #[test]
    fn prop_no_edges_keeps_every_table(n in 0usize..20) {
        let tables = names(n);
        let plan = plan_transfer_order(&tables, &[]);
        prop_assert_eq!(plan.order(), tables.as_slice());
    }

    /// A pure cycle reports exactly its members
    #[test]
    fn prop_ring_is_fully_unordered(n in 2usize..10, free in 0usize..5) {
        let ring = names(n);
        let edges: Vec<DependencyEdge> = (0..n)
            .map(|i| DependencyEdge::new(ring[i].clone(), ring[(i + 1) % n].clone()))
            .collect();
        let mut tables = ring.clone();
        tables.extend((0..free).map(|i| format!("free{}", i)));

        let plan = plan_transfer_order(&tables, &edges);

        prop_assert_eq!(plan.unordered(), ring.as_slice());
        prop_assert_eq!(plan.cyclic(), ring.as_slice());
        prop_assert_eq!(plan.unordered().len(), tables.len() - plan.order().len());
    }

    /// Repeating every edge does not change the result
    #[test]
    fn prop_duplicate_edges_are_collapsed((n, pairs) in graph_strategy()) {
        let tables = names(n);
        let edges = to_edges(&pairs);
        let doubled: Vec<DependencyEdge> = edges.iter().chain(edges.iter()).cloned().collect();

        prop_assert_eq!(
            plan_transfer_order(&tables, &edges),
            plan_transfer_order(&tables, &doubled)
        );
    }
}

// ── Scenarios ───────────────────────────────────────────────────────────

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_shop_schema() {
    let tables = strings(&["order_items", "orders", "products", "customers", "categories"]);
    let edges = vec![
        DependencyEdge::new("order_items", "orders"),
        DependencyEdge::new("order_items", "products"),
        DependencyEdge::new("orders", "customers"),
        DependencyEdge::new("products", "categories"),
    ];

    let plan = plan_transfer_order(&tables, &edges);

    assert!(plan.is_complete());
    assert_eq!(
        plan.order(),
        ["customers", "categories", "orders", "products", "order_items"]
    );
}

#[test]
fn test_orders_customers_items() {
    let tables = strings(&["orders", "customers", "order_items"]);
    let edges = vec![
        DependencyEdge::new("orders", "customers"),
        DependencyEdge::new("order_items", "orders"),
    ];

    let plan = plan_transfer_order(&tables, &edges);
    assert_eq!(plan.order(), ["customers", "orders", "order_items"]);
}

#[test]
fn test_full_cycle_orders_nothing() {
    let tables = strings(&["a", "b", "c"]);
    let edges = vec![
        DependencyEdge::new("a", "b"),
        DependencyEdge::new("b", "c"),
        DependencyEdge::new("c", "a"),
    ];

    let plan = plan_transfer_order(&tables, &edges);
    assert!(plan.order().is_empty());
    assert_eq!(plan.unordered(), ["a", "b", "c"]);
}

#[test]
fn test_cycle_and_its_dependents_are_unordered() {
    let tables = strings(&["users", "teams", "memberships", "audit"]);
    let edges = vec![
        DependencyEdge::new("users", "teams"),
        DependencyEdge::new("teams", "users"),
        DependencyEdge::new("memberships", "users"),
    ];

    let plan = plan_transfer_order(&tables, &edges);

    assert_eq!(plan.order(), ["audit"]);
    assert_eq!(plan.unordered(), ["users", "teams", "memberships"]);
    assert_eq!(plan.cyclic(), ["users", "teams"]);
    assert_eq!(
        plan.copy_sequence(true),
        vec!["audit", "users", "teams", "memberships"]
    );
    assert_eq!(plan.copy_sequence(false), vec!["audit"]);
}

#[test]
fn test_self_reference_does_not_block() {
    let tables = strings(&["employees"]);
    let edges = vec![DependencyEdge::new("employees", "employees")];

    let plan = plan_transfer_order(&tables, &edges);
    assert_eq!(plan.order(), ["employees"]);
    assert!(plan.is_complete());
}

#[test]
fn test_empty_database() {
    let plan = plan_transfer_order(&[], &[DependencyEdge::new("a", "b")]);
    assert!(plan.is_empty());
    assert!(plan.is_complete());
}
