//! # Typed Subexpressions and Query Evaluation
//!
//! The executable form a parsed predicate compiles into. Instead of a
//! trait-object hierarchy, every subexpression is one variant of the
//! [`Subexpr`] enum carrying a typed handle; dispatch is a `match`, and the
//! column-vs-constant fast path stays visible as a dedicated `SimpleCmp`
//! query node.
//!
//! ## Candidate semantics
//!
//! A subexpression evaluates to a small vector of candidate values per row:
//! a scalar column yields one value, a list column yields its elements, and
//! a link chain fans out to one value per reached object. The property's
//! comparison type (`ANY`/`ALL`/`NONE`) decides how candidates combine; a
//! constant always yields exactly one candidate.
//!
//! ## Null rules
//!
//! `==`/`!=` treat two nulls as equal and null/non-null as unequal; every
//! relational and string operator is false as soon as either side is null.

use eyre::Result;
use smallvec::SmallVec;
use std::cmp::Ordering;

use super::descriptor::DescriptorOrdering;
use super::{Cell, ColKey, Group, TableKey};
use crate::error::CoreError;
use crate::types::{DataType, Decimal, ObjKey, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Equal,
    NotEqual,
    Greater,
    Less,
    GreaterEqual,
    LessEqual,
    BeginsWith,
    EndsWith,
    Contains,
    Like,
}

impl CompareOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            CompareOp::Equal => "==",
            CompareOp::NotEqual => "!=",
            CompareOp::Greater => ">",
            CompareOp::Less => "<",
            CompareOp::GreaterEqual => ">=",
            CompareOp::LessEqual => "<=",
            CompareOp::BeginsWith => "BEGINSWITH",
            CompareOp::EndsWith => "ENDSWITH",
            CompareOp::Contains => "CONTAINS",
            CompareOp::Like => "LIKE",
        }
    }

    pub fn is_string_op(&self) -> bool {
        matches!(
            self,
            CompareOp::BeginsWith | CompareOp::EndsWith | CompareOp::Contains | CompareOp::Like
        )
    }
}

/// How a property's candidate values combine into one match decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExpressionComparisonType {
    #[default]
    Any,
    All,
    None,
}

/// One hop of a link chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStep {
    Forward(ColKey),
    Backward { table: TableKey, column: ColKey },
}

pub type LinkSteps = SmallVec<[LinkStep; 2]>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggrOp {
    Max,
    Min,
    Sum,
    Avg,
}

impl AggrOp {
    pub fn suffix(&self) -> &'static str {
        match self {
            AggrOp::Max => ".@max",
            AggrOp::Min => ".@min",
            AggrOp::Sum => ".@sum",
            AggrOp::Avg => ".@avg",
        }
    }
}

fn aggr_result_type(op: AggrOp, elem: DataType) -> DataType {
    match op {
        AggrOp::Max | AggrOp::Min => elem,
        AggrOp::Sum => match elem {
            DataType::Float | DataType::Double => DataType::Double,
            other => other,
        },
        AggrOp::Avg => match elem {
            DataType::Decimal => DataType::Decimal,
            _ => DataType::Double,
        },
    }
}

/// Builder that accumulates link hops and terminates into a typed
/// subexpression for a named column.
pub(crate) struct LinkChain<'g> {
    group: &'g Group,
    current_table: TableKey,
    steps: LinkSteps,
    comparison_type: ExpressionComparisonType,
}

impl<'g> LinkChain<'g> {
    pub fn new(
        group: &'g Group,
        base_table: TableKey,
        comparison_type: ExpressionComparisonType,
    ) -> Self {
        Self {
            group,
            current_table: base_table,
            steps: SmallVec::new(),
            comparison_type,
        }
    }

    /// Appends a forward hop through the named link column.
    pub fn link(&mut self, name: &str) -> Result<()> {
        let table = self.group.table(self.current_table);
        let col = table
            .column_key(name)
            .ok_or_else(|| self.group.unknown_property(self.current_table, name))?;
        let def = table.column(col);
        if def.data_type() != DataType::Link {
            return Err(CoreError::Type(format!(
                "Property '{}' in '{}' is not a link",
                name,
                table.printable_name()
            ))
            .into());
        }
        self.current_table = def.target_table().expect("link column has a target");
        self.steps.push(LinkStep::Forward(col));
        Ok(())
    }

    /// Appends a backward hop: rows of `table_name` whose link column
    /// `column_name` points at the current object.
    pub fn backlink(&mut self, table_name: &str, column_name: &str) -> Result<()> {
        let origin = self
            .group
            .table_by_name(table_name)
            .or_else(|| self.group.table_by_name(&format!("class_{}", table_name)));
        let origin_col = origin.and_then(|t| {
            let col = self.group.table(t).column_key(column_name)?;
            let def = self.group.table(t).column(col);
            (def.data_type() == DataType::Link && def.target_table() == Some(self.current_table))
                .then_some(col)
        });
        let (origin, origin_col) = match (origin, origin_col) {
            (Some(t), Some(c)) => (t, c),
            _ => {
                let current = self.group.table(self.current_table).printable_name();
                let shown = table_name.strip_prefix("class_").unwrap_or(table_name);
                return Err(CoreError::UnknownProperty(format!(
                    "No property '{}' found in type '{}' which links to type '{}'",
                    column_name, shown, current
                ))
                .into());
            }
        };
        self.steps.push(LinkStep::Backward {
            table: origin,
            column: origin_col,
        });
        self.current_table = origin;
        Ok(())
    }

    /// Terminates the chain into a typed subexpression for `name`.
    pub fn column(mut self, name: &str) -> Result<Subexpr> {
        let table = self.group.table(self.current_table);
        let col = table
            .column_key(name)
            .ok_or_else(|| self.group.unknown_property(self.current_table, name))?;
        let def = table.column(col);
        if def.data_type() == DataType::Link {
            self.steps.push(LinkStep::Forward(col));
            return Ok(Subexpr::Links {
                steps: self.steps,
                cmp_type: self.comparison_type,
            });
        }
        Ok(Subexpr::Column {
            steps: self.steps,
            column: col,
            data_type: def.data_type(),
            is_list: def.is_list(),
            cmp_type: self.comparison_type,
        })
    }

    /// Terminates into the untyped link expression for the chain itself,
    /// used when a path ends in a `@links` element.
    pub fn into_links(self) -> Subexpr {
        Subexpr::Links {
            steps: self.steps,
            cmp_type: self.comparison_type,
        }
    }

    /// Terminates into an aggregate over the elements of the numeric list
    /// column `name`.
    pub fn list_aggregate(self, name: &str, op: AggrOp) -> Result<Subexpr> {
        match self.column(name)? {
            Subexpr::Column {
                steps,
                column,
                data_type,
                is_list: true,
                ..
            } => {
                if !data_type.is_numeric() {
                    return Err(CoreError::Type(format!(
                        "collection aggregate not supported for type '{}'",
                        data_type
                    ))
                    .into());
                }
                Ok(Subexpr::ListAggregate {
                    steps,
                    column,
                    op,
                    elem_type: data_type,
                })
            }
            _ => Err(CoreError::Type("Cannot aggregate".into()).into()),
        }
    }

    /// Terminates into an aggregate over the scalar numeric property `prop`
    /// of the objects behind the link column `link`.
    pub fn link_aggregate(self, link: &str, prop: &str, op: AggrOp) -> Result<Subexpr> {
        let table = self.group.table(self.current_table);
        let link_col = table
            .column_key(link)
            .ok_or_else(|| self.group.unknown_property(self.current_table, link))?;
        let link_def = table.column(link_col);
        if link_def.data_type() != DataType::Link {
            return Err(CoreError::Type(format!(
                "Operation '{}' cannot apply to property '{}' because it is not a list",
                op.suffix(),
                link
            ))
            .into());
        }
        let target = link_def.target_table().expect("link column has a target");
        let prop_col = self
            .group
            .table(target)
            .column_key(prop)
            .ok_or_else(|| self.group.unknown_property(target, prop))?;
        let prop_def = self.group.table(target).column(prop_col);
        if !prop_def.data_type().is_numeric() || prop_def.is_list() {
            return Err(CoreError::Type(format!(
                "collection aggregate not supported for type '{}'",
                prop_def.data_type()
            ))
            .into());
        }
        Ok(Subexpr::LinkAggregate {
            steps: self.steps,
            link_column: link_col,
            prop_column: prop_col,
            op,
            elem_type: prop_def.data_type(),
        })
    }
}

/// A typed, executable subexpression.
#[derive(Debug, Clone, PartialEq)]
pub enum Subexpr {
    /// A constant value; the only variant with constant evaluation.
    Constant(Value),
    /// A non-link column at the end of a (possibly empty) link chain.
    Column {
        steps: LinkSteps,
        column: ColKey,
        data_type: DataType,
        is_list: bool,
        cmp_type: ExpressionComparisonType,
    },
    /// The objects reached through a link chain.
    Links {
        steps: LinkSteps,
        cmp_type: ExpressionComparisonType,
    },
    /// `.@count` over a link chain.
    LinkCount { steps: LinkSteps },
    /// `.@size` over a list, string or binary column.
    Size {
        steps: LinkSteps,
        column: ColKey,
        data_type: DataType,
        is_list: bool,
    },
    /// `.@max/.@min/.@sum/.@avg` over a numeric list column.
    ListAggregate {
        steps: LinkSteps,
        column: ColKey,
        op: AggrOp,
        elem_type: DataType,
    },
    /// Aggregate over a scalar property of the objects behind a link column.
    LinkAggregate {
        steps: LinkSteps,
        link_column: ColKey,
        prop_column: ColKey,
        op: AggrOp,
        elem_type: DataType,
    },
}

impl Subexpr {
    /// Runtime type, or `None` for a typeless (null) constant.
    pub fn get_type(&self) -> Option<DataType> {
        match self {
            Subexpr::Constant(v) => v.data_type(),
            Subexpr::Column { data_type, .. } => Some(*data_type),
            Subexpr::Links { .. } => Some(DataType::Link),
            Subexpr::LinkCount { .. } => Some(DataType::Int),
            Subexpr::Size { .. } => Some(DataType::Int),
            Subexpr::ListAggregate { op, elem_type, .. }
            | Subexpr::LinkAggregate { op, elem_type, .. } => {
                Some(aggr_result_type(*op, *elem_type))
            }
        }
    }

    pub fn has_constant_evaluation(&self) -> bool {
        matches!(self, Subexpr::Constant(_))
    }

    pub fn constant_value(&self) -> Option<&Value> {
        match self {
            Subexpr::Constant(v) => Some(v),
            _ => None,
        }
    }

    /// `Some((column, type))` when this is a plain column of the base table:
    /// no link hops, not a list. This is the fast-path shape.
    pub fn property_column(&self) -> Option<(ColKey, DataType)> {
        match self {
            Subexpr::Column {
                steps,
                column,
                data_type,
                is_list: false,
                ..
            } if steps.is_empty() => Some((*column, *data_type)),
            _ => None,
        }
    }

    pub fn links_exist(&self) -> bool {
        match self {
            Subexpr::Column { steps, .. }
            | Subexpr::Links { steps, .. }
            | Subexpr::LinkCount { steps }
            | Subexpr::Size { steps, .. }
            | Subexpr::ListAggregate { steps, .. }
            | Subexpr::LinkAggregate { steps, .. } => !steps.is_empty(),
            Subexpr::Constant(_) => false,
        }
    }

    /// A list-of-values expression (the shape ordered comparison rejects).
    pub fn is_primitive_list(&self) -> bool {
        matches!(self, Subexpr::Column { is_list: true, .. })
    }

    pub fn comparison_type(&self) -> ExpressionComparisonType {
        match self {
            Subexpr::Column { cmp_type, .. } | Subexpr::Links { cmp_type, .. } => *cmp_type,
            _ => ExpressionComparisonType::Any,
        }
    }

    /// Candidate values of this expression for one row of the base table.
    pub(crate) fn evaluate(
        &self,
        group: &Group,
        base: TableKey,
        obj: ObjKey,
    ) -> SmallVec<[Value; 4]> {
        let mut out = SmallVec::new();
        match self {
            Subexpr::Constant(v) => out.push(v.clone()),
            Subexpr::Column { steps, column, .. } => {
                for (t, o) in reach(group, base, obj, steps) {
                    match group.table(t).cell(o, *column) {
                        Cell::Scalar(v) => out.push(v.clone()),
                        Cell::List(vs) => out.extend(vs.iter().cloned()),
                        Cell::Links(_) => {}
                    }
                }
            }
            Subexpr::Links { steps, .. } => {
                for (_, o) in reach(group, base, obj, steps) {
                    out.push(Value::Link(o));
                }
            }
            Subexpr::LinkCount { steps } => {
                out.push(Value::Int(reach(group, base, obj, steps).len() as i64));
            }
            Subexpr::Size { steps, column, .. } => {
                for (t, o) in reach(group, base, obj, steps) {
                    match group.table(t).cell(o, *column) {
                        Cell::List(vs) => out.push(Value::Int(vs.len() as i64)),
                        Cell::Scalar(Value::String(s)) => out.push(Value::Int(s.len() as i64)),
                        Cell::Scalar(Value::Binary(b)) => out.push(Value::Int(b.len() as i64)),
                        Cell::Scalar(Value::Null) => out.push(Value::Null),
                        _ => {}
                    }
                }
            }
            Subexpr::ListAggregate {
                steps, column, op, ..
            } => {
                for (t, o) in reach(group, base, obj, steps) {
                    if let Cell::List(vs) = group.table(t).cell(o, *column) {
                        out.push(aggregate(vs, *op));
                    }
                }
            }
            Subexpr::LinkAggregate {
                steps,
                link_column,
                prop_column,
                op,
                ..
            } => {
                for (t, o) in reach(group, base, obj, steps) {
                    let table = group.table(t);
                    if let Cell::Links(links) = table.cell(o, *link_column) {
                        let target = table
                            .column(*link_column)
                            .target_table()
                            .expect("link column has a target");
                        let values: Vec<Value> = links
                            .iter()
                            .filter_map(|&k| match group.table(target).cell(k, *prop_column) {
                                Cell::Scalar(v) if !v.is_null() => Some(v.clone()),
                                _ => None,
                            })
                            .collect();
                        out.push(aggregate(&values, *op));
                    }
                }
            }
        }
        out
    }
}

/// Objects reached from `obj` by walking `steps`.
fn reach(
    group: &Group,
    base: TableKey,
    obj: ObjKey,
    steps: &[LinkStep],
) -> SmallVec<[(TableKey, ObjKey); 4]> {
    let mut current: SmallVec<[(TableKey, ObjKey); 4]> = SmallVec::new();
    current.push((base, obj));
    for step in steps {
        let mut next = SmallVec::new();
        for (t, o) in current {
            match step {
                LinkStep::Forward(col) => {
                    let table = group.table(t);
                    if let Cell::Links(links) = table.cell(o, *col) {
                        let target = table
                            .column(*col)
                            .target_table()
                            .expect("link column has a target");
                        next.extend(links.iter().map(|&k| (target, k)));
                    }
                }
                LinkStep::Backward { table, column } => {
                    next.extend(
                        group
                            .backlinks(*table, *column, o)
                            .into_iter()
                            .map(|k| (*table, k)),
                    );
                }
            }
        }
        current = next;
    }
    current
}

fn aggregate(values: &[Value], op: AggrOp) -> Value {
    let non_null: Vec<&Value> = values.iter().filter(|v| !v.is_null()).collect();
    if non_null.is_empty() {
        return match op {
            AggrOp::Sum => Value::Int(0),
            _ => Value::Null,
        };
    }
    match op {
        AggrOp::Max => non_null
            .iter()
            .max_by(|a, b| a.cmp_for_sort(b))
            .map(|v| (*v).clone())
            .unwrap_or(Value::Null),
        AggrOp::Min => non_null
            .iter()
            .min_by(|a, b| a.cmp_for_sort(b))
            .map(|v| (*v).clone())
            .unwrap_or(Value::Null),
        AggrOp::Sum => sum_values(&non_null),
        AggrOp::Avg => match sum_values(&non_null) {
            Value::Decimal(d) => Value::Decimal(d / Decimal::from(non_null.len() as i64)),
            other => {
                let total = match other {
                    Value::Int(i) => i as f64,
                    Value::Double(d) => d,
                    _ => return Value::Null,
                };
                Value::Double(total / non_null.len() as f64)
            }
        },
    }
}

fn sum_values(values: &[&Value]) -> Value {
    match values.first() {
        Some(Value::Int(_)) => Value::Int(
            values
                .iter()
                .map(|v| match v {
                    Value::Int(i) => *i,
                    _ => 0,
                })
                .sum(),
        ),
        Some(Value::Decimal(_)) => Value::Decimal(
            values
                .iter()
                .map(|v| match v {
                    Value::Decimal(d) => *d,
                    _ => Decimal::ZERO,
                })
                .sum(),
        ),
        _ => Value::Double(
            values
                .iter()
                .map(|v| match v {
                    Value::Float(f) => *f as f64,
                    Value::Double(d) => *d,
                    _ => 0.0,
                })
                .sum(),
        ),
    }
}

/// One scalar-vs-scalar comparison, null rules included.
pub(crate) fn compare_values(
    op: CompareOp,
    left: &Value,
    right: &Value,
    case_sensitive: bool,
) -> bool {
    match op {
        CompareOp::Equal => values_equal(left, right, case_sensitive),
        CompareOp::NotEqual => !values_equal(left, right, case_sensitive),
        CompareOp::Greater | CompareOp::Less | CompareOp::GreaterEqual | CompareOp::LessEqual => {
            if left.is_null() || right.is_null() {
                return false;
            }
            match left.partial_cmp_with(right) {
                Some(ord) => match op {
                    CompareOp::Greater => ord == Ordering::Greater,
                    CompareOp::Less => ord == Ordering::Less,
                    CompareOp::GreaterEqual => ord != Ordering::Less,
                    CompareOp::LessEqual => ord != Ordering::Greater,
                    _ => unreachable!(),
                },
                None => false,
            }
        }
        CompareOp::BeginsWith | CompareOp::EndsWith | CompareOp::Contains | CompareOp::Like => {
            let (Some(l), Some(r)) = (value_bytes(left), value_bytes(right)) else {
                return false;
            };
            match op {
                CompareOp::BeginsWith => bytes_begins_with(l, r, case_sensitive),
                CompareOp::EndsWith => bytes_ends_with(l, r, case_sensitive),
                CompareOp::Contains => bytes_contains(l, r, case_sensitive),
                CompareOp::Like => like_match(l, r, case_sensitive),
                _ => unreachable!(),
            }
        }
    }
}

fn values_equal(left: &Value, right: &Value, case_sensitive: bool) -> bool {
    match (left, right) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::String(a), Value::String(b)) if !case_sensitive => a.eq_ignore_ascii_case(b),
        _ => {
            if !case_sensitive {
                if let (Some(a), Some(b)) = (value_bytes(left), value_bytes(right)) {
                    return a.eq_ignore_ascii_case(b);
                }
            }
            left.partial_cmp_with(right) == Some(Ordering::Equal)
        }
    }
}

fn value_bytes(v: &Value) -> Option<&[u8]> {
    match v {
        Value::String(s) => Some(s.as_bytes()),
        Value::Binary(b) => Some(b),
        _ => None,
    }
}

fn eq_bytes(a: u8, b: u8, case_sensitive: bool) -> bool {
    if case_sensitive {
        a == b
    } else {
        a.eq_ignore_ascii_case(&b)
    }
}

fn bytes_begins_with(hay: &[u8], needle: &[u8], cs: bool) -> bool {
    hay.len() >= needle.len()
        && hay
            .iter()
            .zip(needle.iter())
            .all(|(&a, &b)| eq_bytes(a, b, cs))
}

fn bytes_ends_with(hay: &[u8], needle: &[u8], cs: bool) -> bool {
    hay.len() >= needle.len()
        && hay[hay.len() - needle.len()..]
            .iter()
            .zip(needle.iter())
            .all(|(&a, &b)| eq_bytes(a, b, cs))
}

fn bytes_contains(hay: &[u8], needle: &[u8], cs: bool) -> bool {
    if needle.is_empty() {
        return true;
    }
    if needle.len() > hay.len() {
        return false;
    }
    hay.windows(needle.len())
        .any(|w| w.iter().zip(needle.iter()).all(|(&a, &b)| eq_bytes(a, b, cs)))
}

/// `LIKE` wildcard match: `*` for any run, `?` for one byte.
fn like_match(text: &[u8], pattern: &[u8], cs: bool) -> bool {
    match pattern.first() {
        None => text.is_empty(),
        Some(b'*') => {
            (0..=text.len()).any(|skip| like_match(&text[skip..], &pattern[1..], cs))
        }
        Some(b'?') => !text.is_empty() && like_match(&text[1..], &pattern[1..], cs),
        Some(&p) => {
            !text.is_empty() && eq_bytes(text[0], p, cs) && like_match(&text[1..], &pattern[1..], cs)
        }
    }
}

fn combine(
    semantics: ExpressionComparisonType,
    values: &[Value],
    mut f: impl FnMut(&Value) -> bool,
) -> bool {
    match semantics {
        ExpressionComparisonType::Any => values.iter().any(&mut f),
        ExpressionComparisonType::All => values.iter().all(&mut f),
        ExpressionComparisonType::None => !values.iter().any(&mut f),
    }
}

/// One node of an executable predicate tree.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryNode {
    True,
    False,
    And(Vec<QueryNode>),
    Or(Vec<QueryNode>),
    Not(Box<QueryNode>),
    /// Generic comparison over two subexpressions.
    Compare {
        op: CompareOp,
        case_sensitive: bool,
        left: Subexpr,
        right: Subexpr,
    },
    /// Column-vs-constant fast path bound straight to a column key.
    SimpleCmp {
        op: CompareOp,
        case_sensitive: bool,
        column: ColKey,
        value: Value,
    },
}

impl QueryNode {
    pub(crate) fn matches(&self, group: &Group, table: TableKey, obj: ObjKey) -> bool {
        match self {
            QueryNode::True => true,
            QueryNode::False => false,
            QueryNode::And(children) => children.iter().all(|c| c.matches(group, table, obj)),
            QueryNode::Or(children) => children.iter().any(|c| c.matches(group, table, obj)),
            QueryNode::Not(inner) => !inner.matches(group, table, obj),
            QueryNode::Compare {
                op,
                case_sensitive,
                left,
                right,
            } => {
                let lvals = left.evaluate(group, table, obj);
                let rvals = right.evaluate(group, table, obj);
                combine(left.comparison_type(), &lvals, |lv| {
                    combine(right.comparison_type(), &rvals, |rv| {
                        compare_values(*op, lv, rv, *case_sensitive)
                    })
                })
            }
            QueryNode::SimpleCmp {
                op,
                case_sensitive,
                column,
                value,
            } => match group.table(table).cell(obj, *column) {
                Cell::Scalar(v) => compare_values(*op, v, value, *case_sensitive),
                _ => false,
            },
        }
    }
}

/// An executable query over one table: a predicate tree plus an optional
/// ordering descriptor.
#[derive(Debug)]
pub struct Query<'g> {
    group: &'g Group,
    table: TableKey,
    root: QueryNode,
    ordering: DescriptorOrdering,
}

impl<'g> Query<'g> {
    pub(crate) fn new(
        group: &'g Group,
        table: TableKey,
        root: QueryNode,
        ordering: DescriptorOrdering,
    ) -> Self {
        Self {
            group,
            table,
            root,
            ordering,
        }
    }

    pub fn root(&self) -> &QueryNode {
        &self.root
    }

    pub fn ordering(&self) -> &DescriptorOrdering {
        &self.ordering
    }

    /// Keys of all matching rows, with ordering descriptors applied.
    pub fn find_all(&self) -> Vec<ObjKey> {
        let table = self.group.table(self.table);
        let mut keys: Vec<ObjKey> = table
            .object_keys()
            .filter(|&k| self.root.matches(self.group, self.table, k))
            .collect();
        self.ordering.apply(self.group, self.table, &mut keys);
        keys
    }

    pub fn count(&self) -> usize {
        self.find_all().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Group;

    fn people() -> (Group, TableKey, ColKey) {
        let mut group = Group::new();
        let key = group.add_table("class_Person");
        let t = group.table_mut(key);
        let name = t.add_column("name", DataType::String, true);
        for n in ["foo", "bar", "Foobar"] {
            let obj = t.create_object();
            t.set(obj, name, Value::String(n.into())).unwrap();
        }
        (group, key, name)
    }

    #[test]
    fn simple_cmp_matches_exact_string() {
        let (group, table, name) = people();
        let node = QueryNode::SimpleCmp {
            op: CompareOp::Equal,
            case_sensitive: true,
            column: name,
            value: Value::String("foo".into()),
        };
        let hits: Vec<ObjKey> = group
            .table(table)
            .object_keys()
            .filter(|&k| node.matches(&group, table, k))
            .collect();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn contains_case_insensitive() {
        assert!(compare_values(
            CompareOp::Contains,
            &Value::String("Foobar".into()),
            &Value::String("FO".into()),
            false,
        ));
        assert!(!compare_values(
            CompareOp::Contains,
            &Value::String("bar".into()),
            &Value::String("FO".into()),
            false,
        ));
    }

    #[test]
    fn like_wildcards() {
        let m = |t: &str, p: &str| {
            compare_values(
                CompareOp::Like,
                &Value::String(t.into()),
                &Value::String(p.into()),
                true,
            )
        };
        assert!(m("hello", "h*o"));
        assert!(m("hello", "h?llo"));
        assert!(m("hello", "*"));
        assert!(!m("hello", "h?o"));
    }

    #[test]
    fn null_equality_rules() {
        assert!(compare_values(
            CompareOp::Equal,
            &Value::Null,
            &Value::Null,
            true
        ));
        assert!(!compare_values(
            CompareOp::Equal,
            &Value::Null,
            &Value::Int(1),
            true
        ));
        assert!(compare_values(
            CompareOp::NotEqual,
            &Value::Null,
            &Value::Int(1),
            true
        ));
        assert!(!compare_values(
            CompareOp::Less,
            &Value::Null,
            &Value::Int(1),
            true
        ));
    }

    #[test]
    fn comparison_symmetry() {
        let a = Value::Int(3);
        let b = Value::Double(4.5);
        assert_eq!(
            compare_values(CompareOp::Equal, &a, &b, true),
            compare_values(CompareOp::Equal, &b, &a, true)
        );
        assert_eq!(
            compare_values(CompareOp::Less, &a, &b, true),
            compare_values(CompareOp::Greater, &b, &a, true)
        );
        assert_eq!(
            compare_values(CompareOp::LessEqual, &a, &b, true),
            compare_values(CompareOp::GreaterEqual, &b, &a, true)
        );
    }

    #[test]
    fn list_aggregate_sums_elements() {
        let mut group = Group::new();
        let key = group.add_table("class_Game");
        let scores = group.table_mut(key).add_list_column("scores", DataType::Int);
        let obj = group.table_mut(key).create_object();
        group
            .table_mut(key)
            .set_list(obj, scores, vec![Value::Int(3), Value::Int(4)])
            .unwrap();

        let sum = Subexpr::ListAggregate {
            steps: SmallVec::new(),
            column: scores,
            op: AggrOp::Sum,
            elem_type: DataType::Int,
        };
        assert_eq!(sum.evaluate(&group, key, obj).as_slice(), &[Value::Int(7)]);

        let avg = Subexpr::ListAggregate {
            steps: SmallVec::new(),
            column: scores,
            op: AggrOp::Avg,
            elem_type: DataType::Int,
        };
        assert_eq!(
            avg.evaluate(&group, key, obj).as_slice(),
            &[Value::Double(3.5)]
        );
    }

    #[test]
    fn link_count_follows_chain() {
        let mut group = Group::new();
        let person = group.add_table("class_Person");
        let dog = group.add_table("class_Dog");
        let dogs = group.table_mut(person).add_link_column("dogs", dog, true);

        let alice = group.table_mut(person).create_object();
        let a = group.table_mut(dog).create_object();
        let b = group.table_mut(dog).create_object();
        group
            .table_mut(person)
            .set_links(alice, dogs, vec![a, b])
            .unwrap();

        let mut steps = SmallVec::new();
        steps.push(LinkStep::Forward(dogs));
        let count = Subexpr::LinkCount { steps };
        assert_eq!(
            count.evaluate(&group, person, alice).as_slice(),
            &[Value::Int(2)]
        );
    }
}
