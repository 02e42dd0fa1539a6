//! Dependency Graph & Creation Order
//!
//! Builds the table-to-table reference graph out of a snapshot's foreign keys
//! and linearizes it into a creation order that is safe to execute. Foreign
//! keys themselves are emitted as deferred ALTER statements by the
//! synthesizer, so a reference cycle only degrades ordering for the tables
//! inside the cycle, never the validity of the script.

use std::collections::HashMap;

use crate::error::SchemaResult;
use crate::snapshot::SchemaSnapshot;

/// Directed graph of table references: an edge `a -> b` means table `a`
/// declares a foreign key into table `b`.
#[derive(Debug)]
pub struct DependencyGraph {
    /// Table names in snapshot declaration order
    nodes: Vec<String>,
    /// Adjacency by node index; deduplicated, self-loops kept
    edges: Vec<Vec<usize>>,
}

impl DependencyGraph {
    /// Build the graph from a snapshot. References to tables absent from the
    /// snapshot cannot constrain ordering and are dropped here.
    pub fn build(snapshot: &SchemaSnapshot) -> Self {
        let nodes: Vec<String> = snapshot.tables.iter().map(|t| t.name.clone()).collect();
        let index: HashMap<&str, usize> = nodes
            .iter()
            .enumerate()
            .map(|(i, name)| (name.as_str(), i))
            .collect();

        let mut edges: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
        for (i, table) in snapshot.tables.iter().enumerate() {
            for group in table.foreign_key_groups() {
                let referenced = &group[0].referenced_table;
                if let Some(&j) = index.get(referenced.as_str()) {
                    if !edges[i].contains(&j) {
                        edges[i].push(j);
                    }
                }
            }
        }

        Self { nodes, edges }
    }

    /// Referenced table names for one table, in first-seen order.
    #[cfg(test)]
    fn references(&self, table: &str) -> Vec<&str> {
        self.nodes
            .iter()
            .position(|n| n == table)
            .map(|i| {
                self.edges[i]
                    .iter()
                    .map(|&j| self.nodes[j].as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Linearize the graph into a creation order covering every table exactly
    /// once.
    ///
    /// Kahn's algorithm over the dependency edges, with two deterministic
    /// rules:
    /// - ties among simultaneously available tables go to the lowest
    ///   snapshot declaration index;
    /// - when no table is available but unplaced tables remain (a reference
    ///   cycle), the unplaced table with the lowest declaration index is
    ///   placed anyway and its remaining dependencies are forgotten.
    ///
    /// The second rule guarantees termination for every input.
    pub fn creation_order(&self) -> Vec<String> {
        let n = self.nodes.len();

        // pending[i] = number of unsatisfied tables that i references
        let mut pending: Vec<usize> = self.edges.iter().map(|e| e.len()).collect();

        // dependents[j] = tables that reference j
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (i, refs) in self.edges.iter().enumerate() {
            for &j in refs {
                dependents[j].push(i);
            }
        }

        let mut placed = vec![false; n];
        let mut order = Vec::with_capacity(n);

        while order.len() < n {
            // Lowest declaration index among satisfied, unplaced tables;
            // on a cycle, force the lowest unplaced index instead.
            let satisfied = (0..n).find(|&i| !placed[i] && pending[i] == 0);
            let next = match satisfied.or_else(|| (0..n).find(|&i| !placed[i])) {
                Some(i) => i,
                None => break,
            };

            placed[next] = true;
            order.push(self.nodes[next].clone());
            for &d in &dependents[next] {
                if !placed[d] && pending[d] > 0 {
                    pending[d] -= 1;
                }
            }
        }

        order
    }
}

/// Validate the snapshot's ordering precondition, then produce the creation
/// order for its tables.
pub fn creation_order(snapshot: &SchemaSnapshot) -> SchemaResult<Vec<String>> {
    snapshot.validate()?;
    Ok(DependencyGraph::build(snapshot).creation_order())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{ForeignKey, Table};

    fn fk(group_id: i64, referenced: &str, local: &str) -> ForeignKey {
        ForeignKey {
            group_id,
            seq: 0,
            referenced_table: referenced.to_string(),
            local_column: local.to_string(),
            referenced_column: Some("id".to_string()),
            on_update: "NO ACTION".to_string(),
            on_delete: "NO ACTION".to_string(),
            match_mode: "NONE".to_string(),
        }
    }

    fn table(name: &str, fks: Vec<ForeignKey>) -> Table {
        Table {
            name: name.to_string(),
            sql: format!("CREATE TABLE {name} (id INTEGER PRIMARY KEY)"),
            columns: vec![],
            foreign_keys: fks,
            indexes: vec![],
        }
    }

    fn snapshot(tables: Vec<Table>) -> SchemaSnapshot {
        SchemaSnapshot::new("test.db", tables, vec![], vec![])
    }

    #[test]
    fn referenced_tables_come_first() {
        // Declaration order deliberately inverted relative to dependencies.
        let snap = snapshot(vec![
            table("order_items", vec![fk(0, "orders", "order_id")]),
            table("orders", vec![fk(0, "users", "user_id")]),
            table("users", vec![]),
        ]);
        let order = creation_order(&snap).unwrap();
        assert_eq!(order, vec!["users", "orders", "order_items"]);
    }

    #[test]
    fn order_is_a_permutation_of_the_table_set() {
        let snap = snapshot(vec![
            table("a", vec![fk(0, "c", "x")]),
            table("b", vec![]),
            table("c", vec![fk(0, "b", "y")]),
            table("d", vec![fk(0, "a", "z"), fk(1, "b", "w")]),
        ]);
        let order = creation_order(&snap).unwrap();
        let mut sorted = order.clone();
        sorted.sort();
        assert_eq!(sorted, vec!["a", "b", "c", "d"]);
        assert_eq!(order.len(), 4);
    }

    #[test]
    fn declaration_order_breaks_ties() {
        let snap = snapshot(vec![
            table("zebra", vec![]),
            table("apple", vec![]),
            table("mango", vec![]),
        ]);
        let order = creation_order(&snap).unwrap();
        assert_eq!(order, vec!["zebra", "apple", "mango"]);
    }

    #[test]
    fn two_table_cycle_terminates_and_is_deterministic() {
        let snap = snapshot(vec![
            table("a", vec![fk(0, "b", "b_id")]),
            table("b", vec![fk(0, "a", "a_id")]),
        ]);
        let first = creation_order(&snap).unwrap();
        // The forced placement takes the lowest declaration index.
        assert_eq!(first, vec!["a", "b"]);
        for _ in 0..10 {
            assert_eq!(creation_order(&snap).unwrap(), first);
        }
    }

    #[test]
    fn cycle_does_not_stall_tables_outside_it() {
        let snap = snapshot(vec![
            table("x", vec![fk(0, "y", "y_id")]),
            table("y", vec![fk(0, "x", "x_id")]),
            table("standalone", vec![]),
            table("child", vec![fk(0, "standalone", "s_id")]),
        ]);
        let order = creation_order(&snap).unwrap();
        assert_eq!(order.len(), 4);
        let pos = |name: &str| order.iter().position(|n| n == name).unwrap();
        assert!(pos("standalone") < pos("child"));
    }

    #[test]
    fn self_reference_keeps_its_table_in_the_order() {
        let snap = snapshot(vec![
            table("employees", vec![fk(0, "employees", "manager_id")]),
            table("teams", vec![]),
        ]);
        let order = creation_order(&snap).unwrap();
        assert_eq!(order.len(), 2);
        assert!(order.contains(&"employees".to_string()));
    }

    #[test]
    fn dangling_reference_is_dropped() {
        let snap = snapshot(vec![
            table("logs", vec![fk(0, "archived_users", "user_id")]),
            table("events", vec![]),
        ]);
        let graph = DependencyGraph::build(&snap);
        assert!(graph.references("logs").is_empty());
        let order = creation_order(&snap).unwrap();
        assert_eq!(order, vec!["logs", "events"]);
    }

    #[test]
    fn duplicate_table_name_is_reported_before_ordering() {
        let snap = snapshot(vec![table("t", vec![]), table("t", vec![])]);
        assert!(creation_order(&snap).is_err());
    }
}
