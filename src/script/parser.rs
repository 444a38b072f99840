//! Recursive descent parser: tokens → function definitions.
//!
//! Hand-rolled over the token stream from [`lexer`](super::lexer); the grammar
//! is small and fixed, and owning the parser keeps error positions precise.

use super::ast::{BinOp, Expr, Function, Stmt, UnaryOp};
use super::error::{CompileError, CompileResult};
use super::lexer::{self, Pos, Tok, Token};
use super::value::Value;

/// Parse every top-level function definition in `src`.
///
/// Anything other than `fn` definitions at the top level is a syntax error.
/// Counting the definitions is left to the caller.
pub fn parse_program(src: &str) -> CompileResult<Vec<Function>> {
    let tokens = lexer::tokenize(src)?;
    let mut parser = Parser {
        tokens,
        idx: 0,
        depth: 0,
    };
    let mut functions = Vec::new();
    while !parser.at(&Tok::Eof) {
        functions.push(parser.function()?);
    }
    Ok(functions)
}

const BINARY_LEVELS: usize = 6;

/// Deepest nesting of blocks, parentheses, calls and operators a function may
/// use. Every later pass walks the tree recursively, so this also bounds
/// their stack use.
pub const MAX_DEPTH: usize = 64;

fn binary_op(level: usize, tok: &Tok) -> Option<BinOp> {
    Some(match (level, tok) {
        (0, Tok::OrOr) => BinOp::Or,
        (1, Tok::AndAnd) => BinOp::And,
        (2, Tok::EqEq) => BinOp::Eq,
        (2, Tok::NotEq) => BinOp::Ne,
        (3, Tok::Lt) => BinOp::Lt,
        (3, Tok::Le) => BinOp::Le,
        (3, Tok::Gt) => BinOp::Gt,
        (3, Tok::Ge) => BinOp::Ge,
        (4, Tok::Plus) => BinOp::Add,
        (4, Tok::Minus) => BinOp::Sub,
        (5, Tok::Star) => BinOp::Mul,
        (5, Tok::Slash) => BinOp::Div,
        (5, Tok::Percent) => BinOp::Rem,
        _ => return None,
    })
}

struct Parser {
    tokens: Vec<Token>,
    idx: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        // tokenize() always ends with Eof, and we never advance past it.
        &self.tokens[self.idx.min(self.tokens.len() - 1)]
    }

    fn peek_nth(&self, n: usize) -> &Tok {
        &self.tokens[(self.idx + n).min(self.tokens.len() - 1)].tok
    }

    fn at(&self, tok: &Tok) -> bool {
        &self.peek().tok == tok
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token.tok != Tok::Eof {
            self.idx += 1;
        }
        token
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.at(tok) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn error(&self, expected: &str) -> CompileError {
        let token = self.peek();
        CompileError::Syntax {
            line: token.pos.line,
            column: token.pos.column,
            message: format!("expected {expected}, found {}", token.tok.describe()),
        }
    }

    /// Enter one nesting level. Pair with `self.depth -= 1` on success; a
    /// failed parse is abandoned, so the counter need not be restored.
    fn descend(&mut self) -> CompileResult<()> {
        if self.depth >= MAX_DEPTH {
            let pos = self.peek().pos;
            return Err(CompileError::Syntax {
                line: pos.line,
                column: pos.column,
                message: format!("expression nested too deeply (limit {MAX_DEPTH})"),
            });
        }
        self.depth += 1;
        Ok(())
    }

    fn expect(&mut self, tok: Tok, expected: &str) -> CompileResult<Pos> {
        if self.at(&tok) {
            Ok(self.advance().pos)
        } else {
            Err(self.error(expected))
        }
    }

    fn ident(&mut self, expected: &str) -> CompileResult<(String, Pos)> {
        match self.peek().tok.clone() {
            Tok::Ident(name) => {
                let pos = self.advance().pos;
                Ok((name, pos))
            }
            _ => Err(self.error(expected)),
        }
    }

    fn function(&mut self) -> CompileResult<Function> {
        let pos = self.expect(Tok::Fn, "`fn`")?;
        let (name, _) = self.ident("function name")?;
        self.expect(Tok::LParen, "`(`")?;

        let mut params = Vec::new();
        while !self.at(&Tok::RParen) {
            let (param, _) = self.ident("parameter name")?;
            params.push(param);
            if !self.eat(&Tok::Comma) {
                break;
            }
        }
        self.expect(Tok::RParen, "`,` or `)`")?;

        let body = if self.eat(&Tok::Assign) {
            let expr = self.expr()?;
            self.eat(&Tok::Semi);
            vec![Stmt::Return(Some(expr))]
        } else {
            self.block()?
        };

        Ok(Function {
            name,
            params,
            body,
            pos,
        })
    }

    fn block(&mut self) -> CompileResult<Vec<Stmt>> {
        self.expect(Tok::LBrace, "`{`")?;
        self.descend()?;
        let mut stmts = Vec::new();
        while !self.at(&Tok::RBrace) {
            if self.at(&Tok::Eof) {
                return Err(self.error("`}`"));
            }
            stmts.push(self.stmt()?);
        }
        self.advance();
        self.depth -= 1;
        Ok(stmts)
    }

    /// Statement terminator: `;`, or nothing before a closing `}`.
    fn terminator(&mut self) -> CompileResult<()> {
        if self.eat(&Tok::Semi) || self.at(&Tok::RBrace) {
            Ok(())
        } else {
            Err(self.error("`;`"))
        }
    }

    fn stmt(&mut self) -> CompileResult<Stmt> {
        match self.peek().tok {
            Tok::Let => {
                self.advance();
                let (name, pos) = self.ident("variable name")?;
                self.expect(Tok::Assign, "`=`")?;
                let value = self.expr()?;
                self.terminator()?;
                Ok(Stmt::Let { name, value, pos })
            }
            Tok::Return => {
                self.advance();
                let value = if self.at(&Tok::Semi) || self.at(&Tok::RBrace) {
                    None
                } else {
                    Some(self.expr()?)
                };
                self.terminator()?;
                Ok(Stmt::Return(value))
            }
            Tok::If => self.if_stmt(),
            Tok::While => {
                self.advance();
                let cond = self.expr()?;
                let body = self.block()?;
                Ok(Stmt::While { cond, body })
            }
            Tok::Ident(_) if *self.peek_nth(1) == Tok::Assign => {
                let (name, pos) = self.ident("variable name")?;
                self.advance();
                let value = self.expr()?;
                self.terminator()?;
                Ok(Stmt::Assign { name, value, pos })
            }
            Tok::Fn => Err(self.error("a statement (nested functions are not supported)")),
            _ => {
                let expr = self.expr()?;
                self.terminator()?;
                Ok(Stmt::Expr(expr))
            }
        }
    }

    fn if_stmt(&mut self) -> CompileResult<Stmt> {
        self.expect(Tok::If, "`if`")?;
        let cond = self.expr()?;
        let then = self.block()?;
        let otherwise = if self.eat(&Tok::Else) {
            if self.at(&Tok::If) {
                self.descend()?;
                let chained = self.if_stmt()?;
                self.depth -= 1;
                Some(vec![chained])
            } else {
                Some(self.block()?)
            }
        } else {
            None
        };
        Ok(Stmt::If {
            cond,
            then,
            otherwise,
        })
    }

    fn expr(&mut self) -> CompileResult<Expr> {
        self.binary(0)
    }

    /// Precedence climbing: level 0 binds loosest, `BINARY_LEVELS` is unary.
    fn binary(&mut self, level: usize) -> CompileResult<Expr> {
        if level == BINARY_LEVELS {
            return self.unary();
        }

        // Each operator in a chain nests the tree one level deeper.
        let base = self.depth;
        let mut lhs = self.binary(level + 1)?;
        while let Some(op) = binary_op(level, &self.peek().tok) {
            self.descend()?;
            self.advance();
            let rhs = self.binary(level + 1)?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        self.depth = base;
        Ok(lhs)
    }

    fn unary(&mut self) -> CompileResult<Expr> {
        let op = match self.peek().tok {
            Tok::Minus => UnaryOp::Neg,
            Tok::Bang => UnaryOp::Not,
            _ => return self.primary(),
        };
        self.advance();
        if op == UnaryOp::Neg {
            if let Tok::Int(n) = self.peek().tok {
                // Folded so that i64::MIN can be written.
                let pos = self.advance().pos;
                return i64::try_from(-i128::from(n))
                    .map(|n| Expr::Literal(Value::Int(n)))
                    .map_err(|_| out_of_range(pos, &format!("-{n}")));
            }
        }
        self.descend()?;
        let operand = self.unary()?;
        self.depth -= 1;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    fn primary(&mut self) -> CompileResult<Expr> {
        let token = self.peek().clone();
        let expr = match token.tok {
            Tok::Int(n) => match i64::try_from(n) {
                Ok(n) => Expr::Literal(Value::Int(n)),
                Err(_) => return Err(out_of_range(token.pos, &n.to_string())),
            },
            Tok::Float(x) => Expr::Literal(Value::Float(x)),
            Tok::Str(s) => Expr::Literal(Value::Str(s)),
            Tok::True => Expr::Literal(Value::Bool(true)),
            Tok::False => Expr::Literal(Value::Bool(false)),
            Tok::Nil => Expr::Literal(Value::Nil),
            Tok::LParen => {
                self.advance();
                self.descend()?;
                let inner = self.expr()?;
                self.expect(Tok::RParen, "`)`")?;
                self.depth -= 1;
                return Ok(inner);
            }
            Tok::Ident(name) => {
                self.advance();
                if self.eat(&Tok::LParen) {
                    self.descend()?;
                    let mut args = Vec::new();
                    while !self.at(&Tok::RParen) {
                        args.push(self.expr()?);
                        if !self.eat(&Tok::Comma) {
                            break;
                        }
                    }
                    self.expect(Tok::RParen, "`,` or `)`")?;
                    self.depth -= 1;
                    return Ok(Expr::Call {
                        name,
                        args,
                        pos: token.pos,
                    });
                }
                return Ok(Expr::Var {
                    name,
                    pos: token.pos,
                });
            }
            _ => return Err(self.error("an expression")),
        };
        self.advance();
        Ok(expr)
    }
}

fn out_of_range(pos: Pos, literal: &str) -> CompileError {
    CompileError::Syntax {
        line: pos.line,
        column: pos.column,
        message: format!("integer literal `{literal}` is out of range"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single(src: &str) -> Function {
        let mut fns = parse_program(src).unwrap();
        assert_eq!(fns.len(), 1);
        fns.remove(0)
    }

    #[test]
    fn block_and_expression_bodies_agree() {
        let block = single("fn square(x) { return x * x; }");
        let short = single("fn square(x) = x * x");
        assert_eq!(block.name, "square");
        assert_eq!(block.params, vec!["x".to_string()]);
        assert_eq!(block.body, short.body);
    }

    #[test]
    fn trailing_semicolon_is_optional_before_brace() {
        let f = single("fn f(a, b,) { let c = a + b; c }");
        assert_eq!(f.params.len(), 2);
        assert_eq!(f.body.len(), 2);
    }

    #[test]
    fn precedence() {
        let f = single("fn f() = 1 + 2 * 3 == 7 && !false");
        let Stmt::Return(Some(Expr::Binary { op, lhs, .. })) = &f.body[0] else {
            panic!("expected binary return, got {:?}", f.body[0]);
        };
        assert_eq!(*op, BinOp::And);
        assert!(matches!(**lhs, Expr::Binary { op: BinOp::Eq, .. }));
    }

    #[test]
    fn else_if_chains() {
        let f = single(
            "fn sign(n) {
                if n < 0 { return -1; } else if n > 0 { return 1; } else { return 0; }
            }",
        );
        let Stmt::If { otherwise: Some(rest), .. } = &f.body[0] else {
            panic!("expected if");
        };
        assert!(matches!(rest[0], Stmt::If { .. }));
    }

    #[test]
    fn multiple_definitions_are_returned() {
        let fns = parse_program("fn a() = 1 fn b() = 2").unwrap();
        assert_eq!(fns.len(), 2);
        assert!(parse_program("  # nothing here\n").unwrap().is_empty());
    }

    #[test]
    fn top_level_statements_are_rejected() {
        let err = parse_program("let x = 1;").unwrap_err();
        match err {
            CompileError::Syntax { message, line, column } => {
                assert_eq!((line, column), (1, 1));
                assert!(message.contains("`fn`"), "{message}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn missing_semicolon_reports_position() {
        let err = parse_program("fn f(x) {\n  let y = x\n  return y;\n}").unwrap_err();
        assert!(matches!(err, CompileError::Syntax { line: 3, column: 3, .. }));
    }

    #[test]
    fn unclosed_block() {
        assert!(parse_program("fn f(x) { return x;").is_err());
    }

    #[test]
    fn negative_literals_fold_down_to_i64_min() {
        let f = single("fn f() = -9223372036854775808");
        assert_eq!(f.body, vec![Stmt::Return(Some(Expr::Literal(Value::Int(i64::MIN))))]);
        assert!(parse_program("fn f() = 9223372036854775808").is_err());
        assert!(parse_program("fn f() = -9223372036854775809").is_err());
    }

    fn too_deep(src: &str) -> bool {
        matches!(
            parse_program(src),
            Err(CompileError::Syntax { ref message, .. }) if message.contains("nested too deeply")
        )
    }

    #[test]
    fn nesting_is_bounded() {
        let parens = format!("fn f() = {}1{}", "(".repeat(100_000), ")".repeat(100_000));
        assert!(too_deep(&parens));

        let negations = format!("fn f() = {}x", "-".repeat(200_000));
        assert!(too_deep(&negations));

        let chain = format!("fn f() = 1{}", "+1".repeat(200_000));
        assert!(too_deep(&chain));

        let blocks = format!("fn f() {}{}", "{ if true ".repeat(50_000), "}".repeat(100_000));
        assert!(too_deep(&blocks));

        let else_ifs = format!("fn f(x) {{ if x {{ }}{} }}", " else if x { }".repeat(50_000));
        assert!(too_deep(&else_ifs));
    }

    #[test]
    fn ordinary_nesting_still_parses() {
        let nested = format!("fn f() = {}1{}", "(".repeat(40), ")".repeat(40));
        assert!(parse_program(&nested).is_ok());
        let chain = format!("fn f() = 1{}", " + 1".repeat(50));
        assert!(parse_program(&chain).is_ok());
    }
}
