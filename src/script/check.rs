//! Static checks run on a parsed function before it becomes a handler.
//!
//! Every variable must be declared before use and every call must target an
//! allow-listed [`Primitive`] with a supported argument count. A function
//! that passes these checks can only touch its own locals and the sandbox.

use std::collections::HashSet;

use super::ast::{Expr, Function, Stmt};
use super::error::{CompileError, CompileResult};
use super::sandbox::Primitive;

/// Validate `function` against the sandbox rules.
pub fn check_function(function: &Function) -> CompileResult<()> {
    let mut params = HashSet::new();
    for param in &function.params {
        if !params.insert(param.as_str()) {
            return Err(CompileError::DuplicateParameter {
                function: function.name.clone(),
                name: param.clone(),
            });
        }
    }

    let mut scopes = Scopes(vec![function.params.iter().cloned().collect()]);
    scopes.block(&function.body)
}

struct Scopes(Vec<HashSet<String>>);

impl Scopes {
    fn declared(&self, name: &str) -> bool {
        self.0.iter().rev().any(|scope| scope.contains(name))
    }

    fn block(&mut self, stmts: &[Stmt]) -> CompileResult<()> {
        self.0.push(HashSet::new());
        let result = stmts.iter().try_for_each(|stmt| self.stmt(stmt));
        self.0.pop();
        result
    }

    fn stmt(&mut self, stmt: &Stmt) -> CompileResult<()> {
        match stmt {
            Stmt::Let { name, value, .. } => {
                self.expr(value)?;
                if let Some(scope) = self.0.last_mut() {
                    scope.insert(name.clone());
                }
                Ok(())
            }
            Stmt::Assign { name, value, pos } => {
                if !self.declared(name) {
                    return Err(CompileError::UndefinedVariable {
                        name: name.clone(),
                        line: pos.line,
                        column: pos.column,
                    });
                }
                self.expr(value)
            }
            Stmt::Return(value) => value.as_ref().map_or(Ok(()), |v| self.expr(v)),
            Stmt::If {
                cond,
                then,
                otherwise,
            } => {
                self.expr(cond)?;
                self.block(then)?;
                match otherwise {
                    Some(stmts) => self.block(stmts),
                    None => Ok(()),
                }
            }
            Stmt::While { cond, body } => {
                self.expr(cond)?;
                self.block(body)
            }
            Stmt::Expr(expr) => self.expr(expr),
        }
    }

    fn expr(&self, expr: &Expr) -> CompileResult<()> {
        match expr {
            Expr::Literal(_) => Ok(()),
            Expr::Var { name, pos } => {
                if self.declared(name) {
                    Ok(())
                } else {
                    Err(CompileError::UndefinedVariable {
                        name: name.clone(),
                        line: pos.line,
                        column: pos.column,
                    })
                }
            }
            Expr::Unary { operand, .. } => self.expr(operand),
            Expr::Binary { lhs, rhs, .. } => {
                self.expr(lhs)?;
                self.expr(rhs)
            }
            Expr::Call { name, args, pos } => {
                let primitive =
                    Primitive::lookup(name).ok_or_else(|| CompileError::UnknownFunction {
                        name: name.clone(),
                        line: pos.line,
                        column: pos.column,
                    })?;
                if !primitive.accepts(args.len()) {
                    return Err(CompileError::PrimitiveArity {
                        name: name.clone(),
                        expected: primitive.expected().into(),
                        actual: args.len(),
                        line: pos.line,
                        column: pos.column,
                    });
                }
                args.iter().try_for_each(|arg| self.expr(arg))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::parser::parse_program;

    fn check(src: &str) -> CompileResult<()> {
        let fns = parse_program(src).unwrap();
        check_function(&fns[0])
    }

    #[test]
    fn accepts_locals_and_primitives() {
        check(
            "fn roll(n) {
                let total = 0;
                let i = 0;
                while i < int(n) { total = total + random(1, 6); i = i + 1; }
                print(\"rolled\", total);
                return total;
            }",
        )
        .unwrap();
    }

    #[test]
    fn rejects_calls_outside_allow_list() {
        let err = check("fn f(p) { return open(p); }").unwrap_err();
        assert!(matches!(err, CompileError::UnknownFunction { ref name, .. } if name == "open"));
        // Self-recursion is not on the allow-list either.
        assert!(check("fn f(n) = f(n)").is_err());
    }

    #[test]
    fn rejects_undeclared_variables() {
        assert!(matches!(
            check("fn f() = y").unwrap_err(),
            CompileError::UndefinedVariable { .. }
        ));
        assert!(matches!(
            check("fn f() { y = 1; }").unwrap_err(),
            CompileError::UndefinedVariable { .. }
        ));
    }

    #[test]
    fn block_locals_do_not_escape() {
        let err = check("fn f(x) { if x { let y = 1; } return y; }").unwrap_err();
        assert!(matches!(err, CompileError::UndefinedVariable { ref name, .. } if name == "y"));
    }

    #[test]
    fn rejects_duplicate_parameters() {
        assert!(matches!(
            check("fn f(a, a) = a").unwrap_err(),
            CompileError::DuplicateParameter { .. }
        ));
    }

    #[test]
    fn primitive_argument_counts() {
        assert!(matches!(
            check("fn f() = random(1)").unwrap_err(),
            CompileError::PrimitiveArity { actual: 1, .. }
        ));
        check("fn f() = random()").unwrap();
    }
}
