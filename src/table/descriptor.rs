//! # Ordering Descriptors
//!
//! SORT / DISTINCT / LIMIT clauses compiled to column-key chains. Sort keys
//! may reach through forward links; the chain is every hop's link column
//! followed by the terminal scalar column. Descriptors apply in the order
//! they were written: each SORT is a stable re-sort (so the last one written
//! is the primary key of the final order), DISTINCT keeps the first
//! occurrence of each key tuple, LIMIT truncates.

use smallvec::SmallVec;

use super::{Cell, ColKey, Group, TableKey};
use crate::types::{ObjKey, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum Descriptor {
    Sort {
        columns: Vec<Vec<ColKey>>,
        ascending: Vec<bool>,
    },
    Distinct { columns: Vec<Vec<ColKey>> },
    Limit(usize),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DescriptorOrdering {
    descriptors: Vec<Descriptor>,
}

impl DescriptorOrdering {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn descriptors(&self) -> &[Descriptor] {
        &self.descriptors
    }

    pub fn append_sort(&mut self, columns: Vec<Vec<ColKey>>, ascending: Vec<bool>) {
        debug_assert_eq!(columns.len(), ascending.len());
        self.descriptors.push(Descriptor::Sort { columns, ascending });
    }

    pub fn append_distinct(&mut self, columns: Vec<Vec<ColKey>>) {
        self.descriptors.push(Descriptor::Distinct { columns });
    }

    pub fn append_limit(&mut self, limit: usize) {
        self.descriptors.push(Descriptor::Limit(limit));
    }

    pub(crate) fn apply(&self, group: &Group, table: TableKey, keys: &mut Vec<ObjKey>) {
        for descriptor in &self.descriptors {
            match descriptor {
                Descriptor::Sort { columns, ascending } => {
                    keys.sort_by(|&a, &b| {
                        for (chain, &asc) in columns.iter().zip(ascending.iter()) {
                            let va = chain_value(group, table, a, chain);
                            let vb = chain_value(group, table, b, chain);
                            let ord = va.cmp_for_sort(&vb);
                            if ord != std::cmp::Ordering::Equal {
                                return if asc { ord } else { ord.reverse() };
                            }
                        }
                        std::cmp::Ordering::Equal
                    });
                }
                Descriptor::Distinct { columns } => {
                    let mut seen: Vec<SmallVec<[Value; 2]>> = Vec::new();
                    keys.retain(|&k| {
                        let tuple: SmallVec<[Value; 2]> = columns
                            .iter()
                            .map(|chain| chain_value(group, table, k, chain))
                            .collect();
                        let duplicate = seen.iter().any(|prev| {
                            prev.iter().zip(tuple.iter()).all(|(a, b)| {
                                a.cmp_for_sort(b) == std::cmp::Ordering::Equal
                            })
                        });
                        if duplicate {
                            false
                        } else {
                            seen.push(tuple);
                            true
                        }
                    });
                }
                Descriptor::Limit(limit) => {
                    keys.truncate(*limit);
                }
            }
        }
    }
}

/// Value of a column-key chain for one row: walk scalar links, then read the
/// terminal cell. A broken hop (empty link) yields null.
fn chain_value(group: &Group, table: TableKey, obj: ObjKey, chain: &[ColKey]) -> Value {
    let mut current_table = table;
    let mut current_obj = obj;
    for (i, &col) in chain.iter().enumerate() {
        let t = group.table(current_table);
        if i + 1 == chain.len() {
            return match t.cell(current_obj, col) {
                Cell::Scalar(v) => v.clone(),
                _ => Value::Null,
            };
        }
        match t.cell(current_obj, col) {
            Cell::Links(links) if !links.is_empty() => {
                current_table = t.column(col).target_table().unwrap();
                current_obj = links[0];
            }
            _ => return Value::Null,
        }
    }
    Value::Null
}
