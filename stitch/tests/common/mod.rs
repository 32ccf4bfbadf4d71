//! Shared fixtures: a small education domain exercising every reader
//! variant, with schools holding polymorphic employees (teachers and
//! administrators) and teachers holding students.

// Not every scenario file uses every helper.
#![allow(dead_code)]

use std::sync::{Arc, Once};

use stitch::schema::{
    ColumnSchema, ColumnType, EntitySchema, Relationship, SchemaRegistry,
};
use stitch::types::{Cell, Entity};

static INIT_TRACING: Once = Once::new();

/// Routes engine logs (skipped rows, orphans, retries) into the test
/// harness output, once per process.
pub fn init_test_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub fn education_registry() -> Arc<SchemaRegistry> {
    let school = EntitySchema::builder("school")
        .column(ColumnSchema::new("id", ColumnType::Integer))
        .column(ColumnSchema::new("name", ColumnType::text()))
        .identity_key(["id"])
        .sort_key(["id"])
        .relationship(Relationship::to_many("employees", "employee"))
        .build()
        .unwrap();

    let teacher = EntitySchema::builder("teacher")
        .column(ColumnSchema::new("school_id", ColumnType::Integer))
        .column(ColumnSchema::new("id", ColumnType::Integer))
        .column(ColumnSchema::new("name", ColumnType::text()))
        .identity_key(["school_id", "id"])
        .container_key(["school_id"])
        .sort_key(["school_id", "id"])
        .relationship(Relationship::to_many("students", "student"))
        .build()
        .unwrap();

    let administrator = EntitySchema::builder("administrator")
        .column(ColumnSchema::new("school_id", ColumnType::Integer))
        .column(ColumnSchema::new("id", ColumnType::Integer))
        .column(ColumnSchema::new("name", ColumnType::text()))
        .identity_key(["school_id", "id"])
        .container_key(["school_id"])
        .sort_key(["school_id", "id"])
        .build()
        .unwrap();

    let student = EntitySchema::builder("student")
        .column(ColumnSchema::new("school_id", ColumnType::Integer))
        .column(ColumnSchema::new("teacher_id", ColumnType::Integer))
        .column(ColumnSchema::new("id", ColumnType::Integer))
        .column(ColumnSchema::new("name", ColumnType::text()))
        .identity_key(["school_id", "teacher_id", "id"])
        .container_key(["school_id", "teacher_id"])
        .sort_key(["school_id", "teacher_id", "id"])
        .build()
        .unwrap();

    Arc::new(
        SchemaRegistry::builder()
            .schema(school)
            .schema(teacher)
            .schema(administrator)
            .schema(student)
            .abstract_type("employee", ["teacher", "administrator"])
            .finalize()
            .unwrap(),
    )
}

pub fn entity(registry: &SchemaRegistry, type_name: &str, cells: Vec<Cell>) -> Entity {
    registry
        .schema(type_name)
        .expect("fixture type registered")
        .decode_row(cells)
        .expect("fixture row decodes")
}

pub fn int(value: i64) -> Cell {
    Cell::Int(value)
}

pub fn text(value: &str) -> Cell {
    Cell::Text(value.to_string())
}
