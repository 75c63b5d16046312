//! # Semantic Pass
//!
//! Translates a parse tree into an executable predicate tree bound to a base
//! table: identifiers resolve to column keys, constants materialize with the
//! other side's runtime type as a hint, comparisons type-check, and the
//! column-vs-constant fast path is selected where it applies. The ordering
//! suffix compiles to column-key chains in the same pass.
//!
//! ## Comparison Resolution
//!
//! For every comparison, `cmp` resolves the two sides:
//!
//! 1. Two constants cannot be compared.
//! 2. The non-constant side resolves first; its runtime type becomes the
//!    *hint* for materializing the constant (so a literal `1` against a
//!    double column becomes a double).
//! 3. Two list-valued sides reject ordered comparison.
//!
//! Dispatch then picks `SimpleCmp` — the typed column scanner — when the
//! left side is a plain column of the base table, the right side evaluates
//! to a constant and the types match exactly; everything else becomes a
//! generic `Compare` over the two subexpressions.

use bumpalo::Bump;
use eyre::{bail, Result};

use super::args::Arguments;
use super::ast::*;
use super::parser;
use crate::error::CoreError;
use crate::table::{
    CompareOp, DescriptorOrdering, ExpressionComparisonType, Group, LinkChain, Query, QueryNode,
    Subexpr, TableKey,
};
use crate::types::{decode_base64, DataType, Decimal, ObjectId, Timestamp, Uuid, Value};

pub(crate) fn build_query<'g>(
    group: &'g Group,
    table: TableKey,
    text: &str,
    args: &dyn Arguments,
) -> Result<Query<'g>> {
    let arena = Bump::new();
    let parsed = parser::parse(text, &arena)?;
    let builder = QueryBuilder {
        group,
        base_table: table,
        args,
    };
    let root = builder.visit_or(parsed.pred)?;
    let mut ordering = DescriptorOrdering::new();
    if let Some(node) = parsed.ordering {
        builder.visit_ordering(node, &mut ordering)?;
    }
    Ok(Query::new(group, table, root, ordering))
}

struct QueryBuilder<'g, 'q> {
    group: &'g Group,
    base_table: TableKey,
    args: &'q dyn Arguments,
}

fn type_name(ty: Option<DataType>) -> &'static str {
    ty.map(|t| t.name()).unwrap_or("null")
}

fn string_op_name(op: CompareOp) -> &'static str {
    match op {
        CompareOp::BeginsWith => "beginswith",
        CompareOp::EndsWith => "endswith",
        CompareOp::Contains => "contains",
        CompareOp::Like => "like",
        other => other.symbol(),
    }
}

/// Column types the equality fast path covers. Object ids always take the
/// generic comparison.
fn equality_fast_path(ty: DataType) -> bool {
    !matches!(ty, DataType::ObjectId | DataType::Link)
}

/// Column types the relational fast path covers.
fn relational_fast_path(ty: DataType) -> bool {
    matches!(
        ty,
        DataType::Int | DataType::Timestamp | DataType::Float | DataType::Double | DataType::Decimal
    )
}

impl<'g> QueryBuilder<'g, '_> {
    fn visit_or(&self, node: &OrNode<'_>) -> Result<QueryNode> {
        let mut children = Vec::with_capacity(node.and_preds.len());
        for and in node.and_preds {
            children.push(self.visit_and(and)?);
        }
        if children.len() == 1 {
            return Ok(children.pop().unwrap());
        }
        Ok(QueryNode::Or(children))
    }

    fn visit_and(&self, node: &AndNode<'_>) -> Result<QueryNode> {
        let mut children = Vec::with_capacity(node.atom_preds.len());
        for atom in node.atom_preds {
            children.push(self.visit_atom(atom)?);
        }
        if children.len() == 1 {
            return Ok(children.pop().unwrap());
        }
        Ok(QueryNode::And(children))
    }

    fn visit_atom(&self, node: &AtomPred<'_>) -> Result<QueryNode> {
        match node {
            AtomPred::Not(inner) => Ok(QueryNode::Not(Box::new(self.visit_atom(inner)?))),
            AtomPred::Parens(pred) => self.visit_or(pred),
            AtomPred::TrueOrFalse(true) => Ok(QueryNode::True),
            AtomPred::TrueOrFalse(false) => Ok(QueryNode::False),
            AtomPred::Equality(eq) => self.visit_equality(eq),
            AtomPred::Relational(rel) => self.visit_relational(rel),
            AtomPred::StringOps(ops) => self.visit_string_ops(ops),
        }
    }

    fn visit_equality(&self, node: &EqualityNode<'_>) -> Result<QueryNode> {
        let (left, right) = self.cmp(&node.left, &node.right)?;
        let left_type = left.get_type();
        let right_type = right.get_type();

        if let (Some(a), Some(b)) = (left_type, right_type) {
            if !DataType::are_comparable(a, b) {
                bail!(CoreError::Type(format!(
                    "Unsupported comparison between type '{}' and type '{}'",
                    a, b
                )));
            }
        }

        if let Some((column, column_type)) = left.property_column() {
            if left.comparison_type() == ExpressionComparisonType::Any
                && right.has_constant_evaluation()
            {
                let value = right.constant_value().expect("checked constant evaluation");
                if value.is_null()
                    || (Some(column_type) == right_type && equality_fast_path(column_type))
                {
                    return Ok(QueryNode::SimpleCmp {
                        op: node.op,
                        case_sensitive: node.case_sensitive,
                        column,
                        value: value.clone(),
                    });
                }
            }
        }

        Ok(QueryNode::Compare {
            op: node.op,
            case_sensitive: node.case_sensitive,
            left,
            right,
        })
    }

    fn visit_relational(&self, node: &RelationalNode<'_>) -> Result<QueryNode> {
        let (left, right) = self.cmp(&node.left, &node.right)?;
        let left_type = left.get_type();
        let right_type = right.get_type();

        if left_type == Some(DataType::Uuid) {
            bail!(CoreError::Type(format!(
                "Unsupported operator {} in query. Only equal (==) and not equal (!=) are supported for this type.",
                node.op.symbol()
            )));
        }

        let comparable = match (left_type, right_type) {
            (Some(a), Some(b)) => DataType::are_comparable(a, b),
            _ => false,
        };
        if !comparable {
            bail!(CoreError::Type(format!(
                "Unsupported comparison between type '{}' and type '{}'",
                type_name(left_type),
                type_name(right_type)
            )));
        }

        if let Some((column, column_type)) = left.property_column() {
            if left.comparison_type() == ExpressionComparisonType::Any
                && right.has_constant_evaluation()
                && Some(column_type) == right_type
                && relational_fast_path(column_type)
            {
                return Ok(QueryNode::SimpleCmp {
                    op: node.op,
                    case_sensitive: true,
                    column,
                    value: right.constant_value().expect("checked constant evaluation").clone(),
                });
            }
        }

        Ok(QueryNode::Compare {
            op: node.op,
            case_sensitive: true,
            left,
            right,
        })
    }

    fn visit_string_ops(&self, node: &StringOpsNode<'_>) -> Result<QueryNode> {
        let (left, right) = self.cmp(&node.left, &node.right)?;
        let right_type = right.get_type();

        if right_type != Some(DataType::String) && right_type != Some(DataType::Binary) {
            bail!(CoreError::Type(format!(
                "Unsupported comparison operator '{}' against type '{}', right side must be a string or binary type",
                string_op_name(node.op),
                type_name(right_type)
            )));
        }

        if let Some((column, column_type)) = left.property_column() {
            if left.comparison_type() == ExpressionComparisonType::Any
                && right.has_constant_evaluation()
                && Some(column_type) == right_type
            {
                return Ok(QueryNode::SimpleCmp {
                    op: node.op,
                    case_sensitive: node.case_sensitive,
                    column,
                    value: right.constant_value().expect("checked constant evaluation").clone(),
                });
            }
        }

        Ok(QueryNode::Compare {
            op: node.op,
            case_sensitive: node.case_sensitive,
            left,
            right,
        })
    }

    /// Resolves the two sides of a comparison. The non-constant side goes
    /// first so its runtime type can hint the constant's materialization.
    fn cmp(&self, left: &ValueNode<'_>, right: &ValueNode<'_>) -> Result<(Subexpr, Subexpr)> {
        let (left, right) = match (left, right) {
            (ValueNode::Constant(_), ValueNode::Constant(_)) => {
                bail!(CoreError::Type("Cannot compare two constants".into()))
            }
            (ValueNode::Prop(lp), ValueNode::Constant(rc)) => {
                let l = self.visit_property(lp)?;
                let r = self.visit_constant(rc, l.get_type())?;
                (l, r)
            }
            (ValueNode::Constant(lc), ValueNode::Prop(rp)) => {
                let r = self.visit_property(rp)?;
                let l = self.visit_constant(lc, r.get_type())?;
                (l, r)
            }
            (ValueNode::Prop(lp), ValueNode::Prop(rp)) => {
                let r = self.visit_property(rp)?;
                let l = self.visit_property(lp)?;
                (l, r)
            }
        };

        if left.is_primitive_list() && right.is_primitive_list() {
            bail!(CoreError::Type(
                "Ordered comparison between two primitive lists is not implemented yet".into()
            ));
        }
        Ok((left, right))
    }

    fn visit_property(&self, node: &PropertyNode<'_>) -> Result<Subexpr> {
        match node {
            PropertyNode::Prop(prop) => self.visit_prop(prop),
            PropertyNode::ListAggr(node) => self
                .build_chain(node.path, ExpressionComparisonType::Any)?
                .list_aggregate(node.identifier, node.aggr),
            PropertyNode::LinkAggr(node) => self
                .build_chain(node.path, ExpressionComparisonType::Any)?
                .link_aggregate(node.link, node.prop, node.aggr),
        }
    }

    fn build_chain(
        &self,
        path: &PathNode<'_>,
        comp_type: ExpressionComparisonType,
    ) -> Result<LinkChain<'g>> {
        let mut chain = LinkChain::new(self.group, self.base_table, comp_type);
        for elem in path.elems {
            match elem {
                PathElem::Ident(name) => chain.link(name)?,
                PathElem::Backlink { table, column } => chain.backlink(table, column)?,
            }
        }
        Ok(chain)
    }

    fn visit_prop(&self, node: &PropNode<'_>) -> Result<Subexpr> {
        let mut chain = self.build_chain(node.path, node.comp_type)?;
        let subexpr = match node.target {
            PathElem::Ident(name) => chain.column(name)?,
            PathElem::Backlink { table, column } => {
                chain.backlink(table, column)?;
                chain.into_links()
            }
        };
        match node.post_op {
            None => Ok(subexpr),
            Some(PostOp::Count) => match subexpr {
                Subexpr::Links { steps, .. } => Ok(Subexpr::LinkCount { steps }),
                other => bail!(CoreError::Type(format!(
                    "Operation '.@count' is not supported on property of type '{}'",
                    type_name(other.get_type())
                ))),
            },
            Some(PostOp::Size) => match subexpr {
                Subexpr::Column {
                    steps,
                    column,
                    data_type,
                    is_list,
                    ..
                } if is_list
                    || matches!(data_type, DataType::String | DataType::Binary) =>
                {
                    Ok(Subexpr::Size {
                        steps,
                        column,
                        data_type,
                        is_list,
                    })
                }
                other => bail!(CoreError::Type(format!(
                    "Operation '.@size' is not supported on property of type '{}'",
                    type_name(other.get_type())
                ))),
            },
        }
    }

    /// Materializes a constant, using the other side's type as a hint.
    fn visit_constant(&self, node: &ConstantNode<'_>, hint: Option<DataType>) -> Result<Subexpr> {
        let text = node.text;
        let value = match node.kind {
            ConstantKind::Number => match hint {
                Some(DataType::Decimal) => Value::Decimal(parse_decimal(text)?),
                Some(DataType::Float) => Value::Float(parse_int(text)? as f32),
                Some(DataType::Double) => Value::Double(parse_int(text)? as f64),
                _ => Value::Int(parse_int(text)?),
            },
            ConstantKind::Float => match hint {
                Some(DataType::Float) => Value::Float(
                    text.parse::<f32>()
                        .map_err(|_| CoreError::Type(format!("Invalid number '{}'", text)))?,
                ),
                Some(DataType::Decimal) => Value::Decimal(parse_decimal(text)?),
                _ => Value::Double(
                    text.parse::<f64>()
                        .map_err(|_| CoreError::Type(format!("Invalid number '{}'", text)))?,
                ),
            },
            ConstantKind::Infinity => {
                let negative = text.starts_with('-');
                match hint {
                    Some(DataType::Float) => {
                        let inf = f32::INFINITY;
                        Value::Float(if negative { -inf } else { inf })
                    }
                    Some(DataType::Double) => {
                        let inf = f64::INFINITY;
                        Value::Double(if negative { -inf } else { inf })
                    }
                    other => bail!(CoreError::Type(format!(
                        "Infinity not supported for type '{}'",
                        type_name(other)
                    ))),
                }
            }
            ConstantKind::Nan => match hint {
                Some(DataType::Float) => Value::Float(f32::from_bits(0x7fc0_0000)),
                Some(DataType::Double) => Value::Double(f64::from_bits(0x7ff8_0000_0000_0000)),
                other => bail!(CoreError::Type(format!(
                    "NaN not supported for type '{}'",
                    type_name(other)
                ))),
            },
            ConstantKind::String => Value::String(unescape_string(text)?),
            ConstantKind::Base64 => {
                let payload = &text[4..text.len() - 1];
                let bytes = decode_base64(payload)
                    .ok_or_else(|| CoreError::Type("Invalid base64 value".into()))?;
                match hint {
                    Some(DataType::String) => Value::String(
                        String::from_utf8(bytes)
                            .map_err(|_| CoreError::Type("Invalid base64 value".into()))?,
                    ),
                    Some(DataType::Binary) => Value::Binary(bytes),
                    other => bail!(CoreError::Type(format!(
                        "Unsupported comparison between property of type '{}' and constant value '{}'",
                        type_name(other),
                        text
                    ))),
                }
            }
            ConstantKind::Timestamp => Value::Timestamp(Timestamp::parse(text)?),
            ConstantKind::Uuid => Value::Uuid(Uuid::parse(&text[5..text.len() - 1])?),
            ConstantKind::Oid => Value::ObjectId(ObjectId::parse(&text[4..text.len() - 1])?),
            ConstantKind::Null => {
                if hint == Some(DataType::Link) {
                    bail!(CoreError::Type("Cannot compare linklist with NULL".into()));
                }
                Value::Null
            }
            ConstantKind::True => Value::Bool(true),
            ConstantKind::False => Value::Bool(false),
            ConstantKind::Arg => {
                let index: usize = text[1..].parse().map_err(|_| {
                    CoreError::Argument(format!("invalid argument token '{}'", text))
                })?;
                self.resolve_argument(index)?
            }
        };
        Ok(Subexpr::Constant(value))
    }

    fn resolve_argument(&self, n: usize) -> Result<Value> {
        if self.args.is_null(n)? {
            return Ok(Value::Null);
        }
        let value = match self.args.type_for(n)? {
            DataType::Int => Value::Int(self.args.long_for(n)?),
            DataType::Bool => Value::Bool(self.args.bool_for(n)?),
            DataType::String => Value::String(self.args.string_for(n)?),
            DataType::Binary => Value::Binary(self.args.binary_for(n)?),
            DataType::Float => Value::Float(self.args.float_for(n)?),
            DataType::Double => Value::Double(self.args.double_for(n)?),
            DataType::Decimal => Value::Decimal(self.args.decimal128_for(n)?),
            DataType::Uuid => Value::Uuid(self.args.uuid_for(n)?),
            // Timestamps and object ids share a lexical form in some client
            // APIs: try the declared accessor, fall back to the other.
            DataType::Timestamp => match self.args.timestamp_for(n) {
                Ok(ts) => Value::Timestamp(ts),
                Err(_) => Value::ObjectId(self.args.object_id_for(n)?),
            },
            DataType::ObjectId => match self.args.object_id_for(n) {
                Ok(oid) => Value::ObjectId(oid),
                Err(_) => Value::Timestamp(self.args.timestamp_for(n)?),
            },
            DataType::Link => Value::Link(self.args.object_index_for(n)?),
        };
        Ok(value)
    }

    fn visit_ordering(
        &self,
        node: &DescriptorOrderingNode<'_>,
        ordering: &mut DescriptorOrdering,
    ) -> Result<()> {
        for descriptor in node.orderings {
            match descriptor.kind {
                DescriptorKind::Limit => ordering.append_limit(descriptor.limit),
                DescriptorKind::Sort | DescriptorKind::Distinct => {
                    let is_distinct = descriptor.kind == DescriptorKind::Distinct;
                    let clause = if is_distinct { "distinct" } else { "sort" };
                    let mut property_columns = Vec::with_capacity(descriptor.columns.len());
                    for col_names in descriptor.columns {
                        let mut chain = Vec::with_capacity(col_names.len());
                        let mut current = self.base_table;
                        for (i, name) in col_names.iter().enumerate() {
                            let table = self.group.table(current);
                            let col = table.column_key(name).ok_or_else(|| {
                                CoreError::UnknownProperty(format!(
                                    "No property '{}' found on object type '{}' specified in '{}' clause",
                                    name,
                                    table.printable_name(),
                                    clause
                                ))
                            })?;
                            chain.push(col);
                            if i + 1 < col_names.len() {
                                let def = table.column(col);
                                if def.data_type() != DataType::Link {
                                    bail!(CoreError::Type(format!(
                                        "Property '{}' in '{}' is not a link",
                                        name,
                                        table.printable_name()
                                    )));
                                }
                                current = def.target_table().expect("link column has a target");
                            }
                        }
                        property_columns.push(chain);
                    }
                    if is_distinct {
                        ordering.append_distinct(property_columns);
                    } else {
                        ordering.append_sort(property_columns, descriptor.ascending.to_vec());
                    }
                }
            }
        }
        Ok(())
    }
}

fn parse_int(text: &str) -> Result<i64> {
    let (negative, rest) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let value = if let Some(hex) = rest.strip_prefix("0x").or_else(|| rest.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16)
    } else {
        rest.parse::<i64>()
    }
    .map_err(|_| CoreError::Type(format!("Invalid number '{}'", text)))?;
    Ok(if negative { -value } else { value })
}

fn parse_decimal(text: &str) -> Result<Decimal> {
    use std::str::FromStr;
    Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .map_err(|_| CoreError::Type(format!("Invalid decimal '{}'", text)).into())
}

/// Strips the surrounding quotes and processes backslash escapes.
fn unescape_string(lexeme: &str) -> Result<String> {
    let inner = &lexeme[1..lexeme.len() - 1];
    if !inner.contains('\\') {
        return Ok(inner.to_string());
    }
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('0') => out.push('\0'),
            Some(other) => out.push(other),
            None => bail!(CoreError::Type(format!("Invalid string literal {}", lexeme))),
        }
    }
    Ok(out)
}
