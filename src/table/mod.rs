//! # In-Memory Object Store Model
//!
//! The minimal table/group model the query engine binds to: groups of tables,
//! typed columns (scalar, list, link), and rows of owned cells. The model is
//! deliberately small; persistence and transactions live elsewhere and reach
//! storage through the slab allocator, not through this module.
//!
//! ## Shape
//!
//! ```text
//! Group
//!   └── Table ("class_Person")
//!         ├── ColumnDef { name, DataType, nullable, is_list, target }
//!         └── Row { ObjKey, cells: [Cell] }
//!               Cell::Scalar(Value) | Cell::List(Vec<Value>) | Cell::Links(Vec<ObjKey>)
//! ```
//!
//! Link columns name a target table; a scalar link holds zero or one key, a
//! link list holds any number. Backlink traversal is derived by scanning the
//! origin table, it is not materialized.
//!
//! ## Naming
//!
//! Object-store table names carry a `class_` prefix as an implementation
//! detail. `Table::printable_name` strips it for user-facing messages.

mod descriptor;
mod expr;

pub use descriptor::{Descriptor, DescriptorOrdering};
pub use expr::{
    AggrOp, CompareOp, ExpressionComparisonType, LinkStep, Query, QueryNode, Subexpr,
};
pub(crate) use expr::LinkChain;

use eyre::{ensure, Result};
use hashbrown::HashMap;

use crate::error::CoreError;
use crate::query::Arguments;
use crate::types::{DataType, ObjKey, Value};

/// Index of a table within its group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TableKey(pub(crate) u32);

/// Index of a column within its table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColKey(pub(crate) u32);

#[derive(Debug, Clone)]
pub struct ColumnDef {
    name: String,
    data_type: DataType,
    nullable: bool,
    is_list: bool,
    target_table: Option<TableKey>,
}

impl ColumnDef {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn is_list(&self) -> bool {
        self.is_list
    }

    pub fn target_table(&self) -> Option<TableKey> {
        self.target_table
    }
}

/// One stored cell. Scalar columns hold `Scalar`, list columns hold `List`,
/// link columns (scalar or list) hold `Links`.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Scalar(Value),
    List(Vec<Value>),
    Links(Vec<ObjKey>),
}

#[derive(Debug, Clone)]
struct Row {
    key: ObjKey,
    cells: Vec<Cell>,
}

#[derive(Debug)]
pub struct Table {
    key: TableKey,
    name: String,
    columns: Vec<ColumnDef>,
    col_by_name: HashMap<String, ColKey>,
    rows: Vec<Row>,
    next_obj_key: u64,
}

impl Table {
    fn new(key: TableKey, name: &str) -> Self {
        Self {
            key,
            name: name.to_string(),
            columns: Vec::new(),
            col_by_name: HashMap::new(),
            rows: Vec::new(),
            next_obj_key: 1,
        }
    }

    pub fn key(&self) -> TableKey {
        self.key
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Table name with the object-store `class_` prefix stripped.
    pub fn printable_name(&self) -> &str {
        self.name.strip_prefix("class_").unwrap_or(&self.name)
    }

    pub fn add_column(&mut self, name: &str, data_type: DataType, nullable: bool) -> ColKey {
        self.insert_column(ColumnDef {
            name: name.to_string(),
            data_type,
            nullable,
            is_list: false,
            target_table: None,
        })
    }

    pub fn add_list_column(&mut self, name: &str, data_type: DataType) -> ColKey {
        self.insert_column(ColumnDef {
            name: name.to_string(),
            data_type,
            nullable: false,
            is_list: true,
            target_table: None,
        })
    }

    pub fn add_link_column(&mut self, name: &str, target: TableKey, is_list: bool) -> ColKey {
        self.insert_column(ColumnDef {
            name: name.to_string(),
            data_type: DataType::Link,
            nullable: true,
            is_list,
            target_table: Some(target),
        })
    }

    fn insert_column(&mut self, def: ColumnDef) -> ColKey {
        debug_assert!(
            !self.col_by_name.contains_key(&def.name),
            "duplicate column '{}'",
            def.name
        );
        let col = ColKey(self.columns.len() as u32);
        self.col_by_name.insert(def.name.clone(), col);
        self.columns.push(def);
        for row in &mut self.rows {
            row.cells.push(empty_cell(self.columns.last().unwrap()));
        }
        col
    }

    pub fn column_key(&self, name: &str) -> Option<ColKey> {
        self.col_by_name.get(name).copied()
    }

    pub fn column(&self, key: ColKey) -> &ColumnDef {
        &self.columns[key.0 as usize]
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn create_object(&mut self) -> ObjKey {
        let key = ObjKey(self.next_obj_key);
        self.next_obj_key += 1;
        let cells = self.columns.iter().map(empty_cell).collect();
        self.rows.push(Row { key, cells });
        key
    }

    pub fn object_keys(&self) -> impl Iterator<Item = ObjKey> + '_ {
        self.rows.iter().map(|r| r.key)
    }

    fn row_index(&self, obj: ObjKey) -> Option<usize> {
        self.rows.iter().position(|r| r.key == obj)
    }

    pub fn set(&mut self, obj: ObjKey, col: ColKey, value: Value) -> Result<()> {
        let def = self.columns[col.0 as usize].clone();
        ensure!(
            !def.is_list && def.data_type != DataType::Link,
            "column '{}' does not hold scalar values",
            def.name
        );
        if let Some(ty) = value.data_type() {
            ensure!(
                ty == def.data_type,
                "cannot store a {} value in {} column '{}'",
                ty,
                def.data_type,
                def.name
            );
        }
        let idx = self
            .row_index(obj)
            .ok_or_else(|| eyre::eyre!("unknown object key {:?}", obj))?;
        self.rows[idx].cells[col.0 as usize] = Cell::Scalar(value);
        Ok(())
    }

    pub fn set_list(&mut self, obj: ObjKey, col: ColKey, values: Vec<Value>) -> Result<()> {
        let def = self.columns[col.0 as usize].clone();
        ensure!(
            def.is_list && def.data_type != DataType::Link,
            "column '{}' is not a value list",
            def.name
        );
        let idx = self
            .row_index(obj)
            .ok_or_else(|| eyre::eyre!("unknown object key {:?}", obj))?;
        self.rows[idx].cells[col.0 as usize] = Cell::List(values);
        Ok(())
    }

    pub fn set_links(&mut self, obj: ObjKey, col: ColKey, targets: Vec<ObjKey>) -> Result<()> {
        let def = self.columns[col.0 as usize].clone();
        ensure!(
            def.data_type == DataType::Link,
            "column '{}' is not a link column",
            def.name
        );
        ensure!(
            def.is_list || targets.len() <= 1,
            "column '{}' holds at most one link",
            def.name
        );
        let idx = self
            .row_index(obj)
            .ok_or_else(|| eyre::eyre!("unknown object key {:?}", obj))?;
        self.rows[idx].cells[col.0 as usize] = Cell::Links(targets);
        Ok(())
    }

    pub fn get(&self, obj: ObjKey, col: ColKey) -> Option<&Cell> {
        let idx = self.row_index(obj)?;
        Some(&self.rows[idx].cells[col.0 as usize])
    }

    pub(crate) fn cell(&self, obj: ObjKey, col: ColKey) -> &Cell {
        let idx = self.row_index(obj).expect("object key belongs to table");
        &self.rows[idx].cells[col.0 as usize]
    }
}

fn empty_cell(def: &ColumnDef) -> Cell {
    if def.data_type == DataType::Link {
        Cell::Links(Vec::new())
    } else if def.is_list {
        Cell::List(Vec::new())
    } else {
        Cell::Scalar(Value::Null)
    }
}

/// A set of tables forming one object graph. Backlink resolution and query
/// building go through the group because they may touch several tables.
#[derive(Debug, Default)]
pub struct Group {
    tables: Vec<Table>,
    by_name: HashMap<String, TableKey>,
}

impl Group {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_table(&mut self, name: &str) -> TableKey {
        debug_assert!(!self.by_name.contains_key(name), "duplicate table '{}'", name);
        let key = TableKey(self.tables.len() as u32);
        self.tables.push(Table::new(key, name));
        self.by_name.insert(name.to_string(), key);
        key
    }

    pub fn table(&self, key: TableKey) -> &Table {
        &self.tables[key.0 as usize]
    }

    pub fn table_mut(&mut self, key: TableKey) -> &mut Table {
        &mut self.tables[key.0 as usize]
    }

    pub fn table_by_name(&self, name: &str) -> Option<TableKey> {
        self.by_name.get(name).copied()
    }

    /// Objects in `origin` whose link column `col` points at `target`.
    pub(crate) fn backlinks(
        &self,
        origin: TableKey,
        col: ColKey,
        target: ObjKey,
    ) -> Vec<ObjKey> {
        let table = self.table(origin);
        table
            .rows
            .iter()
            .filter(|row| match &row.cells[col.0 as usize] {
                Cell::Links(links) => links.contains(&target),
                _ => false,
            })
            .map(|row| row.key)
            .collect()
    }

    /// Compiles a textual predicate against `table` into an executable query.
    pub fn query<'g>(&'g self, table: TableKey, text: &str) -> Result<Query<'g>> {
        self.query_with_args(table, text, &crate::query::NoArguments)
    }

    pub fn query_with_args<'g>(
        &'g self,
        table: TableKey,
        text: &str,
        args: &dyn Arguments,
    ) -> Result<Query<'g>> {
        crate::query::build_query(self, table, text, args)
    }

    pub(crate) fn unknown_property(&self, table: TableKey, name: &str) -> CoreError {
        CoreError::UnknownProperty(format!(
            "'{}' has no property: '{}'",
            self.table(table).printable_name(),
            name
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn printable_name_strips_class_prefix() {
        let mut group = Group::new();
        let key = group.add_table("class_Person");
        assert_eq!(group.table(key).printable_name(), "Person");
        let raw = group.add_table("Plain");
        assert_eq!(group.table(raw).printable_name(), "Plain");
    }

    #[test]
    fn scalar_cells_default_to_null() {
        let mut group = Group::new();
        let key = group.add_table("class_Person");
        let t = group.table_mut(key);
        let age = t.add_column("age", DataType::Int, false);
        let obj = t.create_object();
        assert_eq!(t.get(obj, age), Some(&Cell::Scalar(Value::Null)));
    }

    #[test]
    fn set_rejects_type_mismatch() {
        let mut group = Group::new();
        let key = group.add_table("class_Person");
        let t = group.table_mut(key);
        let age = t.add_column("age", DataType::Int, false);
        let obj = t.create_object();
        assert!(t.set(obj, age, Value::String("x".into())).is_err());
        assert!(t.set(obj, age, Value::Int(7)).is_ok());
    }

    #[test]
    fn backlinks_find_origin_rows() {
        let mut group = Group::new();
        let person = group.add_table("class_Person");
        let dog = group.add_table("class_Dog");
        let owner = group.table_mut(dog).add_link_column("owner", person, false);

        let alice = group.table_mut(person).create_object();
        let rex = group.table_mut(dog).create_object();
        let fido = group.table_mut(dog).create_object();
        group.table_mut(dog).set_links(rex, owner, vec![alice]).unwrap();
        group.table_mut(dog).set_links(fido, owner, vec![]).unwrap();

        let back = group.backlinks(dog, owner, alice);
        assert_eq!(back, vec![rex]);
    }

    #[test]
    fn adding_a_column_backfills_existing_rows() {
        let mut group = Group::new();
        let key = group.add_table("class_Person");
        let t = group.table_mut(key);
        let obj = t.create_object();
        let age = t.add_column("age", DataType::Int, false);
        assert_eq!(t.get(obj, age), Some(&Cell::Scalar(Value::Null)));
    }
}
