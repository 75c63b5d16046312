//! # Parse Tree Nodes
//!
//! Arena-allocated parse nodes produced by the predicate parser. All nodes
//! are allocated in a `bumpalo` arena and connected with plain `&'a`
//! references, so the tree is cycle-free by construction, traversal never
//! allocates, and the whole tree is dropped by dropping the arena.
//!
//! Nodes are created by the parser, never mutated afterwards, visited once
//! by the semantic pass and then discarded.
//!
//! ## Canonical Printing
//!
//! Every node implements `Display`, printing the canonical textual form of
//! the predicate. For the canonical subset of the language, parsing the
//! printed form yields a tree equal to the original
//! (`parse(print(parse(s))) == parse(s)`).

use std::fmt;

use crate::table::{AggrOp, CompareOp, ExpressionComparisonType};

/// Root of a parsed query: the predicate plus an optional ordering suffix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParsedQuery<'a> {
    pub pred: &'a OrNode<'a>,
    pub ordering: Option<&'a DescriptorOrderingNode<'a>>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrNode<'a> {
    pub and_preds: &'a [&'a AndNode<'a>],
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AndNode<'a> {
    pub atom_preds: &'a [AtomPred<'a>],
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AtomPred<'a> {
    Not(&'a AtomPred<'a>),
    Parens(&'a OrNode<'a>),
    TrueOrFalse(bool),
    Equality(&'a EqualityNode<'a>),
    Relational(&'a RelationalNode<'a>),
    StringOps(&'a StringOpsNode<'a>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EqualityNode<'a> {
    pub left: ValueNode<'a>,
    pub right: ValueNode<'a>,
    pub op: CompareOp,
    pub case_sensitive: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelationalNode<'a> {
    pub left: ValueNode<'a>,
    pub right: ValueNode<'a>,
    pub op: CompareOp,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StringOpsNode<'a> {
    pub left: ValueNode<'a>,
    pub right: ValueNode<'a>,
    pub op: CompareOp,
    pub case_sensitive: bool,
}

/// Either side of a comparison.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ValueNode<'a> {
    Constant(&'a ConstantNode<'a>),
    Prop(&'a PropertyNode<'a>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PropertyNode<'a> {
    Prop(&'a PropNode<'a>),
    LinkAggr(&'a LinkAggrNode<'a>),
    ListAggr(&'a ListAggrNode<'a>),
}

/// A property reference: link path, terminal element, optional post-op.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PropNode<'a> {
    pub path: &'a PathNode<'a>,
    pub target: PathElem<'a>,
    pub post_op: Option<PostOp>,
    pub comp_type: ExpressionComparisonType,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathNode<'a> {
    pub elems: &'a [PathElem<'a>],
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PathElem<'a> {
    Ident(&'a str),
    Backlink { table: &'a str, column: &'a str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostOp {
    Count,
    Size,
}

impl PostOp {
    pub fn suffix(&self) -> &'static str {
        match self {
            PostOp::Count => ".@count",
            PostOp::Size => ".@size",
        }
    }
}

/// `links.@max.age` — aggregate over a property of linked objects.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkAggrNode<'a> {
    pub path: &'a PathNode<'a>,
    pub link: &'a str,
    pub aggr: AggrOp,
    pub prop: &'a str,
}

/// `scores.@sum` — aggregate over a list column's elements.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ListAggrNode<'a> {
    pub path: &'a PathNode<'a>,
    pub identifier: &'a str,
    pub aggr: AggrOp,
}

/// A constant literal. `text` is the full lexeme, wrappers and quotes
/// included; the semantic pass slices out the payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstantNode<'a> {
    pub kind: ConstantKind,
    pub text: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstantKind {
    Number,
    Float,
    Infinity,
    Nan,
    String,
    Base64,
    Timestamp,
    Uuid,
    Oid,
    Null,
    True,
    False,
    Arg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorKind {
    Sort,
    Distinct,
    Limit,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DescriptorNode<'a> {
    pub kind: DescriptorKind,
    /// Dotted column paths, one inner slice per key.
    pub columns: &'a [&'a [&'a str]],
    /// Parallel to `columns` for SORT; empty otherwise.
    pub ascending: &'a [bool],
    pub limit: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DescriptorOrderingNode<'a> {
    pub orderings: &'a [&'a DescriptorNode<'a>],
}

impl fmt::Display for ParsedQuery<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.pred)?;
        if let Some(ordering) = self.ordering {
            write!(f, "{}", ordering)?;
        }
        Ok(())
    }
}

impl fmt::Display for OrNode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, and) in self.and_preds.iter().enumerate() {
            if i > 0 {
                write!(f, " || ")?;
            }
            write!(f, "{}", and)?;
        }
        Ok(())
    }
}

impl fmt::Display for AndNode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, atom) in self.atom_preds.iter().enumerate() {
            if i > 0 {
                write!(f, " && ")?;
            }
            write!(f, "{}", atom)?;
        }
        Ok(())
    }
}

impl fmt::Display for AtomPred<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AtomPred::Not(inner) => write!(f, "NOT {}", inner),
            AtomPred::Parens(pred) => write!(f, "({})", pred),
            AtomPred::TrueOrFalse(true) => write!(f, "TRUEPREDICATE"),
            AtomPred::TrueOrFalse(false) => write!(f, "FALSEPREDICATE"),
            AtomPred::Equality(node) => write!(f, "{}", node),
            AtomPred::Relational(node) => write!(f, "{}", node),
            AtomPred::StringOps(node) => write!(f, "{}", node),
        }
    }
}

fn write_op(f: &mut fmt::Formatter<'_>, op: CompareOp, case_sensitive: bool) -> fmt::Result {
    write!(f, " {}", op.symbol())?;
    if !case_sensitive {
        write!(f, "[c]")?;
    }
    write!(f, " ")
}

impl fmt::Display for EqualityNode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.left)?;
        write_op(f, self.op, self.case_sensitive)?;
        write!(f, "{}", self.right)
    }
}

impl fmt::Display for RelationalNode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.left)?;
        write_op(f, self.op, true)?;
        write!(f, "{}", self.right)
    }
}

impl fmt::Display for StringOpsNode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.left)?;
        write_op(f, self.op, self.case_sensitive)?;
        write!(f, "{}", self.right)
    }
}

impl fmt::Display for ValueNode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueNode::Constant(c) => write!(f, "{}", c.text),
            ValueNode::Prop(p) => write!(f, "{}", p),
        }
    }
}

impl fmt::Display for PropertyNode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyNode::Prop(p) => write!(f, "{}", p),
            PropertyNode::LinkAggr(n) => {
                write_path(f, n.path)?;
                write!(f, "{}{}.{}", n.link, n.aggr.suffix(), n.prop)
            }
            PropertyNode::ListAggr(n) => {
                write_path(f, n.path)?;
                write!(f, "{}{}", n.identifier, n.aggr.suffix())
            }
        }
    }
}

fn write_path(f: &mut fmt::Formatter<'_>, path: &PathNode<'_>) -> fmt::Result {
    for elem in path.elems {
        write!(f, "{}.", elem)?;
    }
    Ok(())
}

impl fmt::Display for PathElem<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathElem::Ident(name) => write!(f, "{}", name),
            PathElem::Backlink { table, column } => write!(f, "@links.{}.{}", table, column),
        }
    }
}

impl fmt::Display for PropNode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.comp_type {
            ExpressionComparisonType::Any => {}
            ExpressionComparisonType::All => write!(f, "ALL ")?,
            ExpressionComparisonType::None => write!(f, "NONE ")?,
        }
        write_path(f, self.path)?;
        write!(f, "{}", self.target)?;
        if let Some(post_op) = self.post_op {
            write!(f, "{}", post_op.suffix())?;
        }
        Ok(())
    }
}

impl fmt::Display for DescriptorOrderingNode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for descriptor in self.orderings {
            write!(f, " {}", descriptor)?;
        }
        Ok(())
    }
}

impl fmt::Display for DescriptorNode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            DescriptorKind::Limit => write!(f, "LIMIT({})", self.limit),
            DescriptorKind::Sort | DescriptorKind::Distinct => {
                write!(
                    f,
                    "{}(",
                    if self.kind == DescriptorKind::Sort {
                        "SORT"
                    } else {
                        "DISTINCT"
                    }
                )?;
                for (i, column) in self.columns.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", column.join("."))?;
                    if self.kind == DescriptorKind::Sort {
                        write!(
                            f,
                            " {}",
                            if self.ascending[i] { "ASC" } else { "DESC" }
                        )?;
                    }
                }
                write!(f, ")")
            }
        }
    }
}
