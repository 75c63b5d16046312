//! # RefDB - Embedded Object Database Core
//!
//! RefDB is the storage and query core of an embedded, single-file object
//! database. It provides two tightly engineered subsystems:
//!
//! - **Slab allocator**: unifies a memory-mapped read-only file region with
//!   dynamically allocated mutable memory under a single "ref" (offset)
//!   address space, so every inter-node link in a database is a plain 64-bit
//!   file offset.
//! - **Query engine**: compiles a textual predicate language into an
//!   executable query tree bound to typed columns, with a column-vs-constant
//!   fast path and SORT/DISTINCT/LIMIT ordering descriptors.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────┐
//! │   Table / Group model (typed columns)      │
//! ├──────────────────────┬────────────────────┤
//! │  Query Engine        │  Slab Allocator    │
//! │  lexer → parser →    │  refs ⇆ addresses  │
//! │  semantic pass →     │  free lists        │
//! │  Query + ordering    │  file header/footer│
//! ├──────────────────────┴────────────────────┤
//! │        Memory-Mapped File I/O              │
//! └───────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```
//! use refdb::table::Group;
//! use refdb::types::{DataType, Value};
//!
//! # fn main() -> eyre::Result<()> {
//! let mut group = Group::new();
//! let people = group.add_table("class_Person");
//! let t = group.table_mut(people);
//! let name = t.add_column("name", DataType::String, true);
//! let obj = t.create_object();
//! t.set(obj, name, Value::String("ferris".into()))?;
//!
//! let query = group.query(people, "name BEGINSWITH[c] 'FER'")?;
//! assert_eq!(query.count(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Storage Addressing
//!
//! A *ref* is a 64-bit offset into virtual storage: offsets below the
//! attached file's size address the read-only mapping, offsets above it
//! address heap slabs owned by the allocator. The allocator is the only
//! component that converts refs to pointers; see [`alloc::SlabAlloc`].
//!
//! ## Query Language
//!
//! ```text
//! name == 'ferris'                    // equality, case-sensitive
//! name CONTAINS[c] 'fer'              // case-insensitive string op
//! age > 21 && (score >= 4.5 || vip == TRUE)
//! dogs.@count > 2                     // link count
//! scores.@sum > 10                    // list aggregate
//! @links.Dog.owner.name == 'rex'      // backlink traversal
//! TRUEPREDICATE SORT(name ASC) LIMIT(10)
//! ```
//!
//! ## Module Overview
//!
//! - [`alloc`]: ref address space, slab allocator, file header validation
//! - [`query`]: lexer, parser, semantic pass, arguments
//! - [`table`]: in-memory group/table/column model and query execution
//! - [`types`]: data types and owned values
//! - [`error`]: typed error kinds carried inside `eyre` reports

pub mod alloc;
pub mod error;
pub mod query;
pub mod table;
pub mod types;

pub use alloc::{AttachOptions, DetachGuard, MemRef, Ref, SlabAlloc, REF_NONE};
pub use error::CoreError;
pub use query::{Arguments, MixedArguments, NoArguments};
pub use table::{ColKey, Group, Query, Table, TableKey};
pub use types::{DataType, ObjKey, Timestamp, Value};
