//! # Predicate Parser
//!
//! Recursive descent parser for the predicate language, producing an
//! arena-allocated parse tree. Statement structure is plain descent; the
//! boolean connectives use precedence climbing (`||` lowest, then `&&`,
//! then unary `NOT`). Comparisons are deliberately non-associative: chaining
//! them without parentheses is a parse error.
//!
//! ```text
//! input text → Lexer → Parser → ParsedQuery (arena-allocated)
//! ```
//!
//! ## Grammar
//!
//! ```text
//! query     ::= pred ordering*
//! pred      ::= and_pred ("||" and_pred)*
//! and_pred  ::= atom_pred ("&&" atom_pred)*
//! atom_pred ::= "NOT" atom_pred | "(" pred ")"
//!             | "TRUEPREDICATE" | "FALSEPREDICATE"
//!             | value cmp_op "[c]"? value
//! value     ::= constant | [ANY|SOME|ALL|NONE] prop
//! prop      ::= path ("." path)* (".@count" | ".@size" | ".@aggr" ["." IDENT])?
//! path      ::= IDENT | "@links" "." IDENT "." IDENT
//! ordering  ::= SORT "(" ... ")" | DISTINCT "(" ... ")" | LIMIT "(" NUM ")"
//! ```
//!
//! ## Error Handling
//!
//! Every failure — lexical or syntactic — surfaces as
//! `CoreError::InvalidPredicate` carrying the original query text, the
//! lexer's line/column at the point of failure, and the parser's message.

use bumpalo::Bump;
use eyre::{bail, Result};

use super::ast::*;
use super::lexer::Lexer;
use super::token::{Keyword, Token};
use crate::error::CoreError;
use crate::table::{CompareOp, ExpressionComparisonType};

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok<'a>(input: &'a str, arena: &'a Bump) -> ParsedQuery<'a> {
        parse(input, arena).unwrap()
    }

    #[test]
    fn parses_simple_comparison() {
        let arena = Bump::new();
        let q = parse_ok("age > 42", &arena);
        assert_eq!(q.pred.and_preds.len(), 1);
        let atom = &q.pred.and_preds[0].atom_preds[0];
        assert!(matches!(atom, AtomPred::Relational(_)));
    }

    #[test]
    fn or_binds_weaker_than_and() {
        let arena = Bump::new();
        let q = parse_ok("a == 1 && b == 2 || c == 3", &arena);
        assert_eq!(q.pred.and_preds.len(), 2);
        assert_eq!(q.pred.and_preds[0].atom_preds.len(), 2);
        assert_eq!(q.pred.and_preds[1].atom_preds.len(), 1);
    }

    #[test]
    fn keyword_connectives_work() {
        let arena = Bump::new();
        let q = parse_ok("a == 1 AND NOT b == 2 OR c == 3", &arena);
        assert_eq!(q.pred.and_preds.len(), 2);
        assert!(matches!(
            q.pred.and_preds[0].atom_preds[1],
            AtomPred::Not(_)
        ));
    }

    #[test]
    fn parses_parenthesized_predicate() {
        let arena = Bump::new();
        let q = parse_ok("a == 1 && (b == 2 || c == 3)", &arena);
        assert!(matches!(
            q.pred.and_preds[0].atom_preds[1],
            AtomPred::Parens(_)
        ));
    }

    #[test]
    fn parses_true_and_false_predicates() {
        let arena = Bump::new();
        let q = parse_ok("TRUEPREDICATE", &arena);
        assert!(matches!(
            q.pred.and_preds[0].atom_preds[0],
            AtomPred::TrueOrFalse(true)
        ));
        let q = parse_ok("falsepredicate", &arena);
        assert!(matches!(
            q.pred.and_preds[0].atom_preds[0],
            AtomPred::TrueOrFalse(false)
        ));
    }

    #[test]
    fn case_modifier_flips_sensitivity() {
        let arena = Bump::new();
        let q = parse_ok("name ==[c] 'foo'", &arena);
        if let AtomPred::Equality(eq) = &q.pred.and_preds[0].atom_preds[0] {
            assert!(!eq.case_sensitive);
        } else {
            panic!("expected equality");
        }
        let q = parse_ok("name CONTAINS[c] 'foo'", &arena);
        if let AtomPred::StringOps(op) = &q.pred.and_preds[0].atom_preds[0] {
            assert!(!op.case_sensitive);
            assert_eq!(op.op, CompareOp::Contains);
        } else {
            panic!("expected string op");
        }
    }

    #[test]
    fn constant_text_keeps_full_lexeme() {
        let arena = Bump::new();
        let q = parse_ok("name == 'foo'", &arena);
        if let AtomPred::Equality(eq) = &q.pred.and_preds[0].atom_preds[0] {
            if let ValueNode::Constant(c) = eq.right {
                assert_eq!(c.kind, ConstantKind::String);
                assert_eq!(c.text, "'foo'");
                return;
            }
        }
        panic!("expected string constant");
    }

    #[test]
    fn parses_dotted_path() {
        let arena = Bump::new();
        let q = parse_ok("dog.owner.name == 'alice'", &arena);
        if let AtomPred::Equality(eq) = &q.pred.and_preds[0].atom_preds[0] {
            if let ValueNode::Prop(PropertyNode::Prop(p)) = eq.left {
                assert_eq!(p.path.elems.len(), 2);
                assert_eq!(p.target, PathElem::Ident("name"));
                return;
            }
        }
        panic!("expected property");
    }

    #[test]
    fn parses_backlink_path() {
        let arena = Bump::new();
        let q = parse_ok("@links.Dog.owner.name == 'rex'", &arena);
        if let AtomPred::Equality(eq) = &q.pred.and_preds[0].atom_preds[0] {
            if let ValueNode::Prop(PropertyNode::Prop(p)) = eq.left {
                assert_eq!(
                    p.path.elems[0],
                    PathElem::Backlink {
                        table: "Dog",
                        column: "owner"
                    }
                );
                return;
            }
        }
        panic!("expected backlink property");
    }

    #[test]
    fn parses_post_ops() {
        let arena = Bump::new();
        let q = parse_ok("dogs.@count > 2", &arena);
        if let AtomPred::Relational(rel) = &q.pred.and_preds[0].atom_preds[0] {
            if let ValueNode::Prop(PropertyNode::Prop(p)) = rel.left {
                assert_eq!(p.post_op, Some(PostOp::Count));
                assert_eq!(p.target, PathElem::Ident("dogs"));
                return;
            }
        }
        panic!("expected post-op property");
    }

    #[test]
    fn parses_list_aggregate() {
        let arena = Bump::new();
        let q = parse_ok("scores.@sum > 10", &arena);
        if let AtomPred::Relational(rel) = &q.pred.and_preds[0].atom_preds[0] {
            if let ValueNode::Prop(PropertyNode::ListAggr(agg)) = rel.left {
                assert_eq!(agg.identifier, "scores");
                assert_eq!(agg.aggr, crate::table::AggrOp::Sum);
                return;
            }
        }
        panic!("expected list aggregate");
    }

    #[test]
    fn parses_link_aggregate() {
        let arena = Bump::new();
        let q = parse_ok("dogs.@max.age > 7", &arena);
        if let AtomPred::Relational(rel) = &q.pred.and_preds[0].atom_preds[0] {
            if let ValueNode::Prop(PropertyNode::LinkAggr(agg)) = rel.left {
                assert_eq!(agg.link, "dogs");
                assert_eq!(agg.prop, "age");
                return;
            }
        }
        panic!("expected link aggregate");
    }

    #[test]
    fn parses_comparison_type_prefix() {
        let arena = Bump::new();
        let q = parse_ok("ALL scores == 10", &arena);
        if let AtomPred::Equality(eq) = &q.pred.and_preds[0].atom_preds[0] {
            if let ValueNode::Prop(PropertyNode::Prop(p)) = eq.left {
                assert_eq!(p.comp_type, ExpressionComparisonType::All);
                return;
            }
        }
        panic!("expected ALL property");
    }

    #[test]
    fn parses_ordering_suffix() {
        let arena = Bump::new();
        let q = parse_ok("TRUEPREDICATE SORT(name ASC, age DESC) DISTINCT(name) LIMIT(2)", &arena);
        let ordering = q.ordering.unwrap();
        assert_eq!(ordering.orderings.len(), 3);
        assert_eq!(ordering.orderings[0].kind, DescriptorKind::Sort);
        assert_eq!(ordering.orderings[0].columns.len(), 2);
        assert_eq!(ordering.orderings[0].ascending, &[true, false]);
        assert_eq!(ordering.orderings[1].kind, DescriptorKind::Distinct);
        assert_eq!(ordering.orderings[2].limit, 2);
    }

    #[test]
    fn rejects_chained_comparisons() {
        let arena = Bump::new();
        assert!(parse("1 < age < 10", &arena).is_err());
    }

    #[test]
    fn rejects_garbage_and_reports_location() {
        let arena = Bump::new();
        let err = parse("age >", &arena).unwrap_err();
        let kind = err.downcast_ref::<CoreError>().unwrap();
        assert!(matches!(kind, CoreError::InvalidPredicate { .. }));
        if let CoreError::InvalidPredicate { query, .. } = kind {
            assert_eq!(query, "age >");
        }
    }

    #[test]
    fn rejects_unterminated_string() {
        let arena = Bump::new();
        assert!(parse("name == 'foo", &arena).is_err());
    }

    #[test]
    fn rejects_case_modifier_on_relational() {
        let arena = Bump::new();
        assert!(parse("age >[c] 2", &arena).is_err());
    }

    #[test]
    fn print_parse_round_trip() {
        let arena = Bump::new();
        for text in [
            "age > 42",
            "name ==[c] 'foo' && age <= 10 || NOT alive == TRUE",
            "dog.owner.name BEGINSWITH 'al'",
            "scores.@sum > 10",
            "dogs.@count == 0",
            "TRUEPREDICATE SORT(name ASC) LIMIT(2)",
            "@links.Dog.owner.@count > 1",
        ] {
            let first = parse_ok(text, &arena);
            let printed = format!("{}", first);
            let reparsed = parse_ok(arena.alloc_str(&printed), &arena);
            assert_eq!(first, reparsed, "round trip failed for {:?}", text);
        }
    }
}

/// Parses `input` into a tree allocated in `arena`. Every failure is an
/// `InvalidPredicate` error carrying the query text and failure location.
pub fn parse<'a>(input: &'a str, arena: &'a Bump) -> Result<ParsedQuery<'a>> {
    let mut parser = Parser::new(input, arena);
    match parser.parse_query() {
        Ok(query) => Ok(query),
        Err(e) => bail!(CoreError::InvalidPredicate {
            query: input.to_string(),
            line: parser.lexer.line(),
            column: parser.lexer.column(),
            message: e.to_string(),
        }),
    }
}

pub struct Parser<'a> {
    lexer: Lexer<'a>,
    arena: &'a Bump,
    current: Token<'a>,
}

impl<'a> Parser<'a> {
    pub fn new(input: &'a str, arena: &'a Bump) -> Self {
        let mut lexer = Lexer::new(input);
        let current = lexer.next_token();
        Self {
            lexer,
            arena,
            current,
        }
    }

    fn advance(&mut self) -> Token<'a> {
        std::mem::replace(&mut self.current, self.lexer.next_token())
    }

    fn check_keyword(&self, keyword: Keyword) -> bool {
        matches!(&self.current, Token::Keyword(k) if *k == keyword)
    }

    fn consume_keyword(&mut self, keyword: Keyword) -> bool {
        if self.check_keyword(keyword) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_token(&mut self, expected: &Token<'_>, what: &str) -> Result<()> {
        if std::mem::discriminant(&self.current) == std::mem::discriminant(expected) {
            self.advance();
            Ok(())
        } else {
            bail!("expected {}, found {:?}", what, self.current)
        }
    }

    fn expect_ident(&mut self) -> Result<&'a str> {
        match self.current {
            Token::Ident(name) => {
                self.advance();
                Ok(name)
            }
            _ => bail!("expected an identifier, found {:?}", self.current),
        }
    }

    fn fail_on_lex_error(&self) -> Result<()> {
        if let Token::Error(message) = self.current {
            bail!("{}", message);
        }
        Ok(())
    }

    fn parse_query(&mut self) -> Result<ParsedQuery<'a>> {
        let pred = self.parse_or_pred()?;
        let ordering = self.parse_ordering()?;
        self.fail_on_lex_error()?;
        if !matches!(self.current, Token::Eof) {
            bail!("unexpected {:?} after the predicate", self.current);
        }
        Ok(ParsedQuery { pred, ordering })
    }

    fn parse_or_pred(&mut self) -> Result<&'a OrNode<'a>> {
        let mut and_preds = vec![self.parse_and_pred()?];
        while matches!(self.current, Token::OrOr) || self.check_keyword(Keyword::Or) {
            self.advance();
            and_preds.push(self.parse_and_pred()?);
        }
        Ok(self.arena.alloc(OrNode {
            and_preds: self.arena.alloc_slice_copy(&and_preds),
        }))
    }

    fn parse_and_pred(&mut self) -> Result<&'a AndNode<'a>> {
        let mut atom_preds = vec![self.parse_atom_pred()?];
        while matches!(self.current, Token::AndAnd) || self.check_keyword(Keyword::And) {
            self.advance();
            atom_preds.push(self.parse_atom_pred()?);
        }
        Ok(self.arena.alloc(AndNode {
            atom_preds: self.arena.alloc_slice_copy(&atom_preds),
        }))
    }

    fn parse_atom_pred(&mut self) -> Result<AtomPred<'a>> {
        self.fail_on_lex_error()?;
        if matches!(self.current, Token::Bang) || self.check_keyword(Keyword::Not) {
            self.advance();
            let inner = self.parse_atom_pred()?;
            return Ok(AtomPred::Not(self.arena.alloc(inner)));
        }
        if matches!(self.current, Token::LParen) {
            self.advance();
            let pred = self.parse_or_pred()?;
            self.expect_token(&Token::RParen, "')'")?;
            return Ok(AtomPred::Parens(pred));
        }
        if self.consume_keyword(Keyword::TruePredicate) {
            return Ok(AtomPred::TrueOrFalse(true));
        }
        if self.consume_keyword(Keyword::FalsePredicate) {
            return Ok(AtomPred::TrueOrFalse(false));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<AtomPred<'a>> {
        let left = self.parse_value()?;
        let op = match self.compare_op() {
            Some(op) => op,
            None => bail!("expected a comparison operator, found {:?}", self.current),
        };
        self.advance();
        let case_sensitive = if matches!(self.current, Token::CaseInsensitive) {
            self.advance();
            false
        } else {
            true
        };
        let right = self.parse_value()?;

        if self.compare_op().is_some() {
            bail!("comparisons are not associative, use parentheses");
        }

        Ok(match op {
            CompareOp::Equal | CompareOp::NotEqual => {
                AtomPred::Equality(self.arena.alloc(EqualityNode {
                    left,
                    right,
                    op,
                    case_sensitive,
                }))
            }
            CompareOp::Greater | CompareOp::Less | CompareOp::GreaterEqual | CompareOp::LessEqual => {
                if !case_sensitive {
                    bail!("the [c] modifier is not supported on '{}'", op.symbol());
                }
                AtomPred::Relational(self.arena.alloc(RelationalNode { left, right, op }))
            }
            _ => AtomPred::StringOps(self.arena.alloc(StringOpsNode {
                left,
                right,
                op,
                case_sensitive,
            })),
        })
    }

    fn compare_op(&self) -> Option<CompareOp> {
        match self.current {
            Token::Equal => Some(CompareOp::Equal),
            Token::NotEqual => Some(CompareOp::NotEqual),
            Token::Greater => Some(CompareOp::Greater),
            Token::Less => Some(CompareOp::Less),
            Token::GreaterEqual => Some(CompareOp::GreaterEqual),
            Token::LessEqual => Some(CompareOp::LessEqual),
            Token::Keyword(Keyword::BeginsWith) => Some(CompareOp::BeginsWith),
            Token::Keyword(Keyword::EndsWith) => Some(CompareOp::EndsWith),
            Token::Keyword(Keyword::Contains) => Some(CompareOp::Contains),
            Token::Keyword(Keyword::Like) => Some(CompareOp::Like),
            _ => None,
        }
    }

    fn parse_value(&mut self) -> Result<ValueNode<'a>> {
        self.fail_on_lex_error()?;
        if self.current.starts_constant() {
            let (kind, text) = match self.current {
                Token::Number(t) => (ConstantKind::Number, t),
                Token::Float(t) => (ConstantKind::Float, t),
                Token::Infinity(t) => (ConstantKind::Infinity, t),
                Token::NaN => (ConstantKind::Nan, "NaN"),
                Token::String(t) => (ConstantKind::String, t),
                Token::Base64(t) => (ConstantKind::Base64, t),
                Token::Timestamp(t) => (ConstantKind::Timestamp, t),
                Token::UuidLiteral(t) => (ConstantKind::Uuid, t),
                Token::OidLiteral(t) => (ConstantKind::Oid, t),
                Token::Arg(t) => (ConstantKind::Arg, t),
                Token::Keyword(Keyword::True) => (ConstantKind::True, "TRUE"),
                Token::Keyword(Keyword::False) => (ConstantKind::False, "FALSE"),
                Token::Keyword(Keyword::Null) => (ConstantKind::Null, "NULL"),
                _ => unreachable!("starts_constant covers these tokens"),
            };
            self.advance();
            return Ok(ValueNode::Constant(
                self.arena.alloc(ConstantNode { kind, text }),
            ));
        }
        Ok(ValueNode::Prop(self.parse_property()?))
    }

    fn parse_property(&mut self) -> Result<&'a PropertyNode<'a>> {
        let comp_type = if self.consume_keyword(Keyword::Any) || self.consume_keyword(Keyword::Some)
        {
            ExpressionComparisonType::Any
        } else if self.consume_keyword(Keyword::All) {
            ExpressionComparisonType::All
        } else if self.consume_keyword(Keyword::None) {
            ExpressionComparisonType::None
        } else {
            ExpressionComparisonType::Any
        };

        let mut elems = vec![self.parse_path_elem()?];
        loop {
            if !matches!(self.current, Token::Dot) {
                break;
            }
            self.advance();
            match self.current {
                Token::AtCount | Token::AtSize => {
                    let post_op = if matches!(self.current, Token::AtCount) {
                        PostOp::Count
                    } else {
                        PostOp::Size
                    };
                    self.advance();
                    let (path, target) = self.split_path(elems)?;
                    return Ok(self.arena.alloc(PropertyNode::Prop(self.arena.alloc(
                        PropNode {
                            path,
                            target,
                            post_op: Some(post_op),
                            comp_type,
                        },
                    ))));
                }
                Token::AtMax | Token::AtMin | Token::AtSum | Token::AtAvg => {
                    let aggr = match self.current {
                        Token::AtMax => crate::table::AggrOp::Max,
                        Token::AtMin => crate::table::AggrOp::Min,
                        Token::AtSum => crate::table::AggrOp::Sum,
                        _ => crate::table::AggrOp::Avg,
                    };
                    self.advance();
                    let (path, target) = self.split_path(elems)?;
                    let PathElem::Ident(identifier) = target else {
                        bail!("aggregate operators cannot follow a backlink element");
                    };
                    if matches!(self.current, Token::Dot) {
                        self.advance();
                        let prop = self.expect_ident()?;
                        return Ok(self.arena.alloc(PropertyNode::LinkAggr(self.arena.alloc(
                            LinkAggrNode {
                                path,
                                link: identifier,
                                aggr,
                                prop,
                            },
                        ))));
                    }
                    return Ok(self.arena.alloc(PropertyNode::ListAggr(self.arena.alloc(
                        ListAggrNode {
                            path,
                            identifier,
                            aggr,
                        },
                    ))));
                }
                _ => elems.push(self.parse_path_elem()?),
            }
        }

        let (path, target) = self.split_path(elems)?;
        Ok(self.arena.alloc(PropertyNode::Prop(self.arena.alloc(
            PropNode {
                path,
                target,
                post_op: None,
                comp_type,
            },
        ))))
    }

    fn split_path(
        &mut self,
        elems: Vec<PathElem<'a>>,
    ) -> Result<(&'a PathNode<'a>, PathElem<'a>)> {
        let (target, path_elems) = elems.split_last().expect("path is never empty");
        let path = self.arena.alloc(PathNode {
            elems: self.arena.alloc_slice_copy(path_elems),
        });
        Ok((path, *target))
    }

    fn parse_path_elem(&mut self) -> Result<PathElem<'a>> {
        self.fail_on_lex_error()?;
        match self.current {
            Token::Ident(name) => {
                self.advance();
                Ok(PathElem::Ident(name))
            }
            Token::AtLinks => {
                self.advance();
                self.expect_token(&Token::Dot, "'.' after @links")?;
                let table = self.expect_ident()?;
                self.expect_token(&Token::Dot, "'.' in @links path")?;
                let column = self.expect_ident()?;
                Ok(PathElem::Backlink { table, column })
            }
            _ => bail!("expected a property name, found {:?}", self.current),
        }
    }

    fn parse_ordering(&mut self) -> Result<Option<&'a DescriptorOrderingNode<'a>>> {
        let mut orderings: Vec<&'a DescriptorNode<'a>> = Vec::new();
        loop {
            if self.consume_keyword(Keyword::Sort) {
                orderings.push(self.parse_sort_descriptor()?);
            } else if self.consume_keyword(Keyword::Distinct) {
                orderings.push(self.parse_distinct_descriptor()?);
            } else if self.consume_keyword(Keyword::Limit) {
                orderings.push(self.parse_limit_descriptor()?);
            } else {
                break;
            }
        }
        if orderings.is_empty() {
            return Ok(None);
        }
        Ok(Some(self.arena.alloc(DescriptorOrderingNode {
            orderings: self.arena.alloc_slice_copy(&orderings),
        })))
    }

    fn parse_dotted_column(&mut self) -> Result<&'a [&'a str]> {
        let mut parts = vec![self.expect_ident()?];
        while matches!(self.current, Token::Dot) {
            self.advance();
            parts.push(self.expect_ident()?);
        }
        Ok(self.arena.alloc_slice_copy(&parts))
    }

    fn parse_sort_descriptor(&mut self) -> Result<&'a DescriptorNode<'a>> {
        self.expect_token(&Token::LParen, "'(' after SORT")?;
        let mut columns = Vec::new();
        let mut ascending = Vec::new();
        loop {
            columns.push(self.parse_dotted_column()?);
            if self.consume_keyword(Keyword::Asc) || self.consume_keyword(Keyword::Ascending) {
                ascending.push(true);
            } else if self.consume_keyword(Keyword::Desc)
                || self.consume_keyword(Keyword::Descending)
            {
                ascending.push(false);
            } else {
                ascending.push(true);
            }
            if !matches!(self.current, Token::Comma) {
                break;
            }
            self.advance();
        }
        self.expect_token(&Token::RParen, "')' after SORT keys")?;
        Ok(self.arena.alloc(DescriptorNode {
            kind: DescriptorKind::Sort,
            columns: self.arena.alloc_slice_copy(&columns),
            ascending: self.arena.alloc_slice_copy(&ascending),
            limit: 0,
        }))
    }

    fn parse_distinct_descriptor(&mut self) -> Result<&'a DescriptorNode<'a>> {
        self.expect_token(&Token::LParen, "'(' after DISTINCT")?;
        let mut columns = Vec::new();
        loop {
            columns.push(self.parse_dotted_column()?);
            if !matches!(self.current, Token::Comma) {
                break;
            }
            self.advance();
        }
        self.expect_token(&Token::RParen, "')' after DISTINCT columns")?;
        Ok(self.arena.alloc(DescriptorNode {
            kind: DescriptorKind::Distinct,
            columns: self.arena.alloc_slice_copy(&columns),
            ascending: &[],
            limit: 0,
        }))
    }

    fn parse_limit_descriptor(&mut self) -> Result<&'a DescriptorNode<'a>> {
        self.expect_token(&Token::LParen, "'(' after LIMIT")?;
        let limit = match self.current {
            Token::Number(text) => text
                .parse::<usize>()
                .map_err(|_| eyre::eyre!("LIMIT requires a non-negative integer, got '{}'", text))?,
            _ => bail!("LIMIT requires a non-negative integer, found {:?}", self.current),
        };
        self.advance();
        self.expect_token(&Token::RParen, "')' after LIMIT")?;
        Ok(self.arena.alloc(DescriptorNode {
            kind: DescriptorKind::Limit,
            columns: &[],
            ascending: &[],
            limit,
        }))
    }
}
