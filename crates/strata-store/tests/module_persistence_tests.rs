#![allow(clippy::unwrap_used, clippy::expect_used)]

// Integration tests for master-detail modules
// Covers key propagation on insert, level-ordered deletes, rollback on
// failure, save hooks, reference tables and typed models

use rusqlite::Transaction;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use strata_core::model::{Record, Value};
use strata_core::schema::SchemaDefinition;
use strata_store::errors::from_rusqlite;
use strata_store::persist::{NoopSaveHooks, RejectSaveHooks, SaveHooks};
use strata_store::{Database, KeyFilter, Module, SavePhase, SaveSummary, Schema};

const SHOP: &str = r#"
id: shop
objects:
  - name: orders
    fields:
      - { name: id, type: integer, generated: true }
      - { name: customer, type: text(80), nullable: false }
    primary_key: [id]
  - name: order_lines
    fields:
      - { name: id, type: integer, generated: true }
      - { name: order_id, type: integer, nullable: false }
      - { name: product, type: text, nullable: false }
      - { name: quantity, type: integer }
    primary_key: [id]
    foreign_keys:
      - { fields: [order_id], references: orders, referenced_fields: [id] }
  - name: line_notes
    fields:
      - { name: id, type: integer, generated: true }
      - { name: line_id, type: integer, nullable: false }
      - { name: body, type: text }
    primary_key: [id]
    foreign_keys:
      - { fields: [line_id], references: order_lines, referenced_fields: [id] }
  - name: products
    fields:
      - { name: code, type: text, nullable: false }
      - { name: title, type: text }
    primary_key: [code]
  - name: save_audit
    fields:
      - { name: id, type: integer, generated: true }
      - { name: note, type: text }
    primary_key: [id]
modules:
  - name: order_entry
    main: orders
    details:
      - { table: line_notes, master: order_lines, keys: { line_id: id } }
      - { table: order_lines, master: orders, keys: { order_id: id } }
    references: [products]
"#;

struct Fixture {
    db: Database,
    schema: Schema,
    definition: SchemaDefinition,
}

impl Fixture {
    fn new() -> Self {
        let definition = SchemaDefinition::from_yaml_str(SHOP).unwrap();
        let mut schema = Schema::from_definition(&definition).unwrap();
        let mut db = Database::open_in_memory().unwrap();
        schema.execute(&mut db).unwrap();
        Self {
            db,
            schema,
            definition,
        }
    }

    fn module(&self) -> Module {
        let module = self.definition.module("order_entry").unwrap();
        Module::from_definition(module, &self.schema).unwrap()
    }

    fn count(&self, table: &str) -> i64 {
        self.db
            .connection()
            .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                row.get(0)
            })
            .unwrap()
    }
}

/// One order with two lines, the first line carrying a note
fn add_order(module: &mut Module, customer: &str) -> Value {
    let order = module
        .add("orders", Record::new().with("customer", customer))
        .unwrap();
    let line = module
        .add_detail_row(
            "order_lines",
            order,
            Record::new().with("product", "P-1").with("quantity", 2),
        )
        .unwrap();
    module
        .add_detail_row(
            "order_lines",
            order,
            Record::new().with("product", "P-2").with("quantity", 5),
        )
        .unwrap();
    module
        .add_detail_row("line_notes", line, Record::new().with("body", "gift wrap"))
        .unwrap();
    module.table("orders").unwrap().row(order).unwrap().get("id").clone()
}

#[test]
fn test_descriptor_builds_levels_regardless_of_listing_order() {
    // Given/When: a module whose details are listed before their masters
    let fixture = Fixture::new();
    let module = fixture.module();

    // Then: levels follow the master chain
    assert_eq!(
        module.level_order(),
        vec!["orders", "order_lines", "line_notes"]
    );
    assert_eq!(module.table("line_notes").unwrap().level(), 2);
    assert_eq!(module.references().len(), 1);
}

#[test]
fn test_save_propagates_generated_keys_to_details() {
    // Given: a new order with lines and a note
    let mut fixture = Fixture::new();
    let mut module = fixture.module();
    let unsaved_id = add_order(&mut module, "ada");
    assert!(unsaved_id.is_null());

    // When: the module is saved
    let summary = module.save(&mut fixture.db).unwrap();

    // Then: inserts run master first and details carry the generated keys
    assert_eq!(
        summary.tables(SavePhase::Insert),
        vec!["orders", "order_lines", "line_notes"]
    );
    assert_eq!(summary.count(SavePhase::Insert), 4);
    let order_id = module.table("orders").unwrap().rows()[0].get("id").clone();
    assert!(order_id.as_i64().is_some());
    for line in module.table("order_lines").unwrap().rows() {
        assert_eq!(line.get("order_id"), &order_id);
    }
    let first_line_id = module.table("order_lines").unwrap().rows()[0].get("id").clone();
    assert_eq!(
        module.table("line_notes").unwrap().rows()[0].get("line_id"),
        &first_line_id
    );
    assert!(!module.has_pending());
    assert_eq!(fixture.count("order_lines"), 2);
}

#[test]
fn test_load_restores_the_hierarchy() {
    // Given: two saved orders
    let mut fixture = Fixture::new();
    let mut writer = fixture.module();
    add_order(&mut writer, "ada");
    add_order(&mut writer, "grace");
    writer.save(&mut fixture.db).unwrap();
    let wanted = writer.table("orders").unwrap().rows()[1].get("id").clone();

    // When: a fresh module loads one of them by key
    let mut reader = fixture.module();
    let loaded = reader.load(&fixture.db, &[wanted.clone()]).unwrap();

    // Then: only that order and its details are loaded and linked
    assert_eq!(loaded, 4);
    let orders = reader.table("orders").unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders.rows()[0].get("customer"), &Value::from("grace"));
    let order_row = orders.rows()[0].id();
    let lines = reader.table("order_lines").unwrap();
    assert_eq!(lines.linked_rows(order_row).len(), 2);
    let notes = reader.table("line_notes").unwrap();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes.rows()[0].get("body"), &Value::from("gift wrap"));
    assert!(!reader.has_pending());
}

#[test]
fn test_delete_runs_highest_level_first() {
    // Given: a saved order loaded into a module
    let mut fixture = Fixture::new();
    let mut writer = fixture.module();
    add_order(&mut writer, "ada");
    writer.save(&mut fixture.db).unwrap();
    let id = writer.table("orders").unwrap().rows()[0].get("id").clone();
    let mut module = fixture.module();
    module.load(&fixture.db, &[id]).unwrap();

    // When: the order is deleted and saved
    let order_row = module.table("orders").unwrap().rows()[0].id();
    assert_eq!(module.delete("orders", order_row).unwrap(), 4);
    let summary = module.save(&mut fixture.db).unwrap();

    // Then: deletes ran notes, lines, orders and nothing is left
    assert_eq!(
        summary.tables(SavePhase::Delete),
        vec!["line_notes", "order_lines", "orders"]
    );
    assert_eq!(fixture.count("orders"), 0);
    assert_eq!(fixture.count("order_lines"), 0);
    assert_eq!(fixture.count("line_notes"), 0);
}

#[test]
fn test_update_writes_changed_rows() {
    // Given: a saved and reloaded order
    let mut fixture = Fixture::new();
    let mut module = fixture.module();
    let _ = add_order(&mut module, "ada");
    module.save(&mut fixture.db).unwrap();

    // When: a line quantity changes
    let line = module.table("order_lines").unwrap().rows()[0].id();
    module.set("order_lines", line, "quantity", 9).unwrap();
    let summary = module.save(&mut fixture.db).unwrap();

    // Then: one update is issued and the value is stored
    assert_eq!(summary.count(SavePhase::Update), 1);
    assert_eq!(summary.count(SavePhase::Insert), 0);
    let stored: i64 = fixture
        .db
        .connection()
        .query_row("SELECT MAX(quantity) FROM order_lines", [], |row| row.get(0))
        .unwrap();
    assert_eq!(stored, 9);
}

#[test]
fn test_updates_run_highest_level_first() {
    // Given: a saved order with a change queued at every level
    let mut fixture = Fixture::new();
    let mut module = fixture.module();
    add_order(&mut module, "ada");
    module.save(&mut fixture.db).unwrap();
    let order = module.table("orders").unwrap().rows()[0].id();
    let line = module.table("order_lines").unwrap().rows()[0].id();
    let note = module.table("line_notes").unwrap().rows()[0].id();
    module.set("orders", order, "customer", "ada lovelace").unwrap();
    module.set("order_lines", line, "quantity", 3).unwrap();
    module.set("line_notes", note, "body", "no wrap").unwrap();

    // When: the module is saved
    let summary = module.save(&mut fixture.db).unwrap();

    // Then: updates ran notes, lines, orders
    assert_eq!(
        summary.tables(SavePhase::Update),
        vec!["line_notes", "order_lines", "orders"]
    );
    assert_eq!(summary.count(SavePhase::Update), 3);
}

#[test]
fn test_update_of_a_vanished_row_is_not_counted() {
    // Given: a saved order whose row is removed behind the module's back
    let mut fixture = Fixture::new();
    let mut module = fixture.module();
    add_order(&mut module, "ada");
    module.save(&mut fixture.db).unwrap();
    fixture
        .db
        .connection()
        .execute_batch("DELETE FROM line_notes; DELETE FROM order_lines; DELETE FROM orders;")
        .unwrap();

    // When: the order is changed and saved
    let order = module.table("orders").unwrap().rows()[0].id();
    module.set("orders", order, "customer", "grace").unwrap();
    let summary = module.save(&mut fixture.db).unwrap();

    // Then: the summary reports no rows written
    assert_eq!(summary.count(SavePhase::Update), 0);
    assert!(summary.is_empty());
}

#[test]
fn test_unlinked_detail_without_master_key_is_rejected() {
    // Given: an order and a line added without linking it to the order
    let mut fixture = Fixture::new();
    let mut module = fixture.module();
    module
        .add("orders", Record::new().with("customer", "ada"))
        .unwrap();
    module
        .add("order_lines", Record::new().with("product", "P-1"))
        .unwrap();

    // When: the module is saved
    let err = module.save(&mut fixture.db).unwrap_err();

    // Then: the missing master key is reported before the driver sees it
    assert_eq!(err.code(), "ERR_REFERENTIAL_ORDER_VIOLATION");
    assert_eq!(err.object(), Some("order_lines"));
    assert_eq!(fixture.count("orders"), 0);
    assert_eq!(module.table("order_lines").unwrap().pending_inserts().len(), 1);
}

#[test]
fn test_unlinked_detail_keeps_a_supplied_master_key() {
    // Given: a saved order and a new line that names the order's key itself
    let mut fixture = Fixture::new();
    let mut module = fixture.module();
    let order_id = {
        let order = module
            .add("orders", Record::new().with("customer", "ada"))
            .unwrap();
        module.save(&mut fixture.db).unwrap();
        module.table("orders").unwrap().row(order).unwrap().get("id").clone()
    };
    module
        .add(
            "order_lines",
            Record::new()
                .with("order_id", order_id.clone())
                .with("product", "P-9"),
        )
        .unwrap();

    // When: the module is saved
    module.save(&mut fixture.db).unwrap();

    // Then: the line is stored against that order
    let stored: i64 = fixture
        .db
        .connection()
        .query_row("SELECT order_id FROM order_lines", [], |row| row.get(0))
        .unwrap();
    assert_eq!(Some(stored), order_id.as_i64());
}

#[test]
fn test_empty_save_skips_transaction_and_hooks() {
    // Given: a module with no changes whose hooks would reject any save
    let mut fixture = Fixture::new();
    let mut module = fixture.module().with_hooks(Box::new(RejectSaveHooks));

    // When: it is saved
    let summary = module.save(&mut fixture.db).unwrap();

    // Then: nothing happens
    assert!(summary.is_empty());
}

#[test]
fn test_rejecting_hook_rolls_back_and_keeps_pending_changes() {
    // Given: pending inserts and a hook that refuses the save
    let mut fixture = Fixture::new();
    let mut module = fixture.module().with_hooks(Box::new(RejectSaveHooks));
    add_order(&mut module, "ada");

    // When: the module is saved
    let err = module.save(&mut fixture.db).unwrap_err();

    // Then: nothing is written and the changes are still pending
    assert_eq!(err.code(), "ERR_PERSISTENCE");
    assert!(err.request_id().is_some());
    assert_eq!(fixture.count("orders"), 0);
    assert_eq!(module.table("orders").unwrap().pending_inserts().len(), 1);
    assert_eq!(module.table("order_lines").unwrap().pending_inserts().len(), 2);

    // When: the hook is replaced and the save retried
    module.set_hooks(Box::new(NoopSaveHooks));
    module.save(&mut fixture.db).unwrap();

    // Then: everything is written once
    assert_eq!(fixture.count("orders"), 1);
    assert_eq!(fixture.count("order_lines"), 2);
    assert_eq!(fixture.count("line_notes"), 1);
}

#[test]
fn test_statement_failure_leaves_module_untouched() {
    // Given: an order whose second line violates NOT NULL
    let mut fixture = Fixture::new();
    let mut module = fixture.module();
    let order = module
        .add("orders", Record::new().with("customer", "ada"))
        .unwrap();
    module
        .add_detail_row("order_lines", order, Record::new().with("product", "P-1"))
        .unwrap();
    module
        .add_detail_row("order_lines", order, Record::new().with("quantity", 1))
        .unwrap();

    // When: the module is saved
    let err = module.save(&mut fixture.db).unwrap_err();

    // Then: the master insert was rolled back with the rest
    assert_eq!(err.code(), "ERR_PERSISTENCE");
    assert_eq!(err.object(), Some("order_lines"));
    assert_eq!(fixture.count("orders"), 0);
    let orders = module.table("orders").unwrap();
    assert!(orders.rows()[0].get("id").is_null());
    assert_eq!(orders.pending_inserts().len(), 1);
}

struct AuditHooks {
    seen: Arc<Mutex<Vec<SaveSummary>>>,
}

impl SaveHooks for AuditHooks {
    fn before_save(&self, tx: &Transaction<'_>) -> strata_store::Result<()> {
        tx.execute("INSERT INTO save_audit (note) VALUES ('order_entry')", [])
            .map_err(from_rusqlite)?;
        Ok(())
    }

    fn after_save(&self, summary: &SaveSummary) {
        self.seen.lock().unwrap().push(summary.clone());
    }
}

#[test]
fn test_hooks_write_in_the_save_transaction_and_see_the_summary() {
    // Given: hooks that audit inside the transaction and record summaries
    let mut fixture = Fixture::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut module = fixture.module().with_hooks(Box::new(AuditHooks { seen: seen.clone() }));
    add_order(&mut module, "ada");

    // When: the module is saved
    let summary = module.save(&mut fixture.db).unwrap();

    // Then: the audit row committed with the save and the summary was passed on
    assert_eq!(fixture.count("save_audit"), 1);
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0], summary);
}

#[test]
fn test_reference_tables_are_saved_but_not_loaded() {
    // Given: a saved product and order
    let mut fixture = Fixture::new();
    let mut writer = fixture.module();
    writer
        .add(
            "products",
            Record::new().with("code", "P-1").with("title", "Teapot"),
        )
        .unwrap();
    add_order(&mut writer, "ada");
    writer.save(&mut fixture.db).unwrap();
    assert_eq!(fixture.count("products"), 1);
    let id = writer.table("orders").unwrap().rows()[0].get("id").clone();

    // When: a fresh module loads the order
    let mut reader = fixture.module();
    reader.load(&fixture.db, &[id]).unwrap();

    // Then: the reference table stays empty until loaded explicitly
    assert!(reader.table("products").unwrap().is_empty());
    let loaded = reader
        .load_reference(&fixture.db, "products", &KeyFilter::new())
        .unwrap();
    assert_eq!(loaded, 1);
    assert_eq!(
        reader.table("products").unwrap().rows()[0].get("title"),
        &Value::from("Teapot")
    );
}

#[test]
fn test_load_without_main_table_fails() {
    let fixture = Fixture::new();
    let mut module = Module::new("headless");

    let err = module.load(&fixture.db, &[Value::from(1)]).unwrap_err();

    assert_eq!(err.code(), "ERR_MISSING_MAIN_TABLE");
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Order {
    id: Option<i64>,
    customer: String,
}

#[test]
fn test_typed_models_round_trip() {
    // Given: orders added as typed models
    let mut fixture = Fixture::new();
    let mut module = fixture.module();
    for customer in ["ada", "grace"] {
        module
            .add_model(
                "orders",
                &Order {
                    id: None,
                    customer: customer.to_string(),
                },
            )
            .unwrap();
    }
    module.save(&mut fixture.db).unwrap();

    // When: they are loaded back
    let mut reader = fixture.module();
    let mut filter = KeyFilter::new();
    filter.insert(
        "customer".to_string(),
        vec![Value::from("ada"), Value::from("grace")],
    );
    reader.load_where(&fixture.db, &filter).unwrap();

    // Then: the models carry their generated ids
    let orders: Vec<Order> = reader.table("orders").unwrap().models().unwrap();
    assert_eq!(orders.len(), 2);
    assert_eq!(orders[0].customer, "ada");
    assert!(orders.iter().all(|o| o.id.is_some()));
}
