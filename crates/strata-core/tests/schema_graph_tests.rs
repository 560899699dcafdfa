#![allow(clippy::unwrap_used, clippy::expect_used)]

use proptest::prelude::*;
use strata_core::dialect::Sqlite;
use strata_core::errors::StrataError;
use strata_core::model::{Field, FieldType};
use strata_core::schema::{SchemaGraph, SchemaObject};

fn table(name: &str) -> SchemaObject {
    SchemaObject::table(name)
        .field(Field::new("id", FieldType::Integer).generated())
        .primary_key(&["id"])
}

fn position(order: &[String], name: &str) -> usize {
    order.iter().position(|n| n == name).expect("object in order")
}

#[test]
fn test_dependency_precedes_dependant_regardless_of_insertion_order() {
    // Given a view over two tables, inserted dependants first
    let mut graph = SchemaGraph::new();
    graph
        .insert(SchemaObject::view("totals", "SELECT * FROM lines").depends_on("lines"))
        .unwrap();
    graph
        .insert(
            table("lines")
                .field(Field::new("order_id", FieldType::Integer).not_null())
                .foreign_key(&["order_id"], "orders", &["id"], None),
        )
        .unwrap();
    graph.insert(table("orders")).unwrap();

    // When the creation order is computed
    let order = graph.topological_order().unwrap();

    // Then every object comes after what it depends on
    assert_eq!(order, vec!["orders", "lines", "totals"]);
    assert_eq!(graph.drop_order().unwrap(), vec!["totals", "lines", "orders"]);
}

#[test]
fn test_cycle_is_rejected_and_graph_unchanged() {
    let mut graph = SchemaGraph::new();
    graph.insert(table("a").depends_on("b")).unwrap();
    graph.insert(table("b").depends_on("c")).unwrap();

    let err = graph.insert(table("c").depends_on("a")).unwrap_err();

    match err {
        StrataError::CyclicDependency { objects } => {
            assert!(objects.contains(&"c".to_string()));
            assert!(objects.contains(&"a".to_string()));
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert!(!graph.contains("c"));
    assert_eq!(graph.len(), 2);
}

#[test]
fn test_removal_closure_lists_dependants_first() {
    let mut graph = SchemaGraph::new();
    graph.insert(table("customers")).unwrap();
    graph.insert(table("orders").depends_on("customers")).unwrap();
    graph.insert(table("lines").depends_on("orders")).unwrap();
    graph.insert(table("products")).unwrap();

    let closure = graph.removal_closure("customers").unwrap();

    assert_eq!(closure, vec!["lines", "orders", "customers"]);
    assert_eq!(
        graph.creation_closure("lines").unwrap(),
        vec!["customers", "orders", "lines"]
    );
}

#[test]
fn test_unknown_dependency_reported_on_ordering() {
    let mut graph = SchemaGraph::new();
    graph.insert(table("orders").depends_on("ghost")).unwrap();

    assert_eq!(
        graph.topological_order().unwrap_err(),
        StrataError::UnknownDependency {
            object: "orders".to_string(),
            dependency: "ghost".to_string(),
        }
    );
}

#[test]
fn test_rendered_ddl_is_stable() {
    let object = table("orders").field(Field::new("customer", FieldType::Text(Some(80))).not_null());
    let sql = object.create_sql(&Sqlite).unwrap();

    assert_eq!(
        sql,
        "CREATE TABLE \"orders\" (\n  \"id\" INTEGER PRIMARY KEY AUTOINCREMENT,\n  \"customer\" TEXT NOT NULL\n)"
    );
    assert_eq!(object.checksum(&Sqlite).unwrap(), object.checksum(&Sqlite).unwrap());
}

proptest! {
    // Edges only point from a higher index to a lower one, so every generated
    // graph is acyclic; insertion order is shuffled by reversing.
    #[test]
    fn prop_topological_order_respects_every_edge(
        edges in proptest::collection::vec((1usize..12, 0usize..11), 0..40),
        reverse in any::<bool>(),
    ) {
        let names: Vec<String> = (0..12).map(|i| format!("t{}", i)).collect();
        let mut objects: Vec<SchemaObject> = names.iter().map(|n| table(n)).collect();
        for (from, to) in &edges {
            if to < from {
                objects[*from] = objects[*from].clone().depends_on(&names[*to]);
            }
        }
        if reverse {
            objects.reverse();
        }

        let mut graph = SchemaGraph::new();
        for object in objects {
            graph.insert(object).unwrap();
        }
        let order = graph.topological_order().unwrap();

        prop_assert_eq!(order.len(), names.len());
        for (from, to) in &edges {
            if to < from {
                prop_assert!(position(&order, &names[*to]) < position(&order, &names[*from]));
            }
        }
    }

    #[test]
    fn prop_closing_edge_is_always_rejected(len in 2usize..10) {
        let mut graph = SchemaGraph::new();
        for i in 0..len {
            let mut object = table(&format!("t{}", i));
            if i > 0 {
                object = object.depends_on(&format!("t{}", i - 1));
            }
            graph.insert(object).unwrap();
        }

        let closing = graph.add_dependency("t0", &format!("t{}", len - 1));

        let is_cycle = matches!(closing, Err(StrataError::CyclicDependency { .. }));
        prop_assert!(is_cycle);
        prop_assert!(graph.topological_order().is_ok());
    }
}
