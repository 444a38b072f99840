//! Tree-walking evaluator for checked functions.

use std::collections::HashMap;
use std::io::Write;

use super::ast::{BinOp, Expr, Function, Stmt, UnaryOp};
use super::error::{ScriptError, ScriptResult};
use super::sandbox::{Primitive, Sandbox};
use super::value::Value;

/// Run `function` with already-bound argument values.
///
/// The caller guarantees `args.len() == function.params.len()`; see
/// [`ScriptFunction::invoke`](super::ScriptFunction).
pub fn call(
    function: &Function,
    args: Vec<Value>,
    sandbox: &Sandbox,
    out: &mut dyn Write,
) -> ScriptResult<Value> {
    let frame = function.params.iter().cloned().zip(args).collect();
    let mut machine = Machine {
        sandbox,
        out,
        scopes: vec![frame],
        steps: 0,
    };
    match machine.block(&function.body)? {
        Flow::Return(value) => Ok(value),
        Flow::Next => Ok(Value::Nil),
    }
}

enum Flow {
    Next,
    Return(Value),
}

struct Machine<'a> {
    sandbox: &'a Sandbox,
    out: &'a mut dyn Write,
    scopes: Vec<HashMap<String, Value>>,
    steps: u64,
}

impl Machine<'_> {
    fn tick(&mut self) -> ScriptResult<()> {
        self.steps += 1;
        if self.steps > self.sandbox.max_steps() {
            return Err(ScriptError::StepLimit {
                limit: self.sandbox.max_steps(),
            });
        }
        Ok(())
    }

    fn lookup(&self, name: &str) -> Value {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name))
            .cloned()
            // Unreachable for checked functions.
            .unwrap_or(Value::Nil)
    }

    fn assign(&mut self, name: &str, value: Value) {
        if let Some(slot) = self
            .scopes
            .iter_mut()
            .rev()
            .find_map(|scope| scope.get_mut(name))
        {
            *slot = value;
        }
    }

    fn block(&mut self, stmts: &[Stmt]) -> ScriptResult<Flow> {
        self.scopes.push(HashMap::new());
        let mut flow = Flow::Next;
        for stmt in stmts {
            match self.stmt(stmt) {
                Ok(Flow::Next) => continue,
                Ok(ret) => {
                    flow = ret;
                    break;
                }
                Err(e) => {
                    self.scopes.pop();
                    return Err(e);
                }
            }
        }
        self.scopes.pop();
        Ok(flow)
    }

    fn stmt(&mut self, stmt: &Stmt) -> ScriptResult<Flow> {
        self.tick()?;
        match stmt {
            Stmt::Let { name, value, .. } => {
                let value = self.expr(value)?;
                if let Some(scope) = self.scopes.last_mut() {
                    scope.insert(name.clone(), value);
                }
                Ok(Flow::Next)
            }
            Stmt::Assign { name, value, .. } => {
                let value = self.expr(value)?;
                self.assign(name, value);
                Ok(Flow::Next)
            }
            Stmt::Return(value) => {
                let value = match value {
                    Some(expr) => self.expr(expr)?,
                    None => Value::Nil,
                };
                Ok(Flow::Return(value))
            }
            Stmt::If {
                cond,
                then,
                otherwise,
            } => {
                if self.expr(cond)?.truthy() {
                    self.block(then)
                } else if let Some(stmts) = otherwise {
                    self.block(stmts)
                } else {
                    Ok(Flow::Next)
                }
            }
            Stmt::While { cond, body } => {
                while self.expr(cond)?.truthy() {
                    if let Flow::Return(value) = self.block(body)? {
                        return Ok(Flow::Return(value));
                    }
                    self.tick()?;
                }
                Ok(Flow::Next)
            }
            Stmt::Expr(expr) => {
                self.expr(expr)?;
                Ok(Flow::Next)
            }
        }
    }

    fn expr(&mut self, expr: &Expr) -> ScriptResult<Value> {
        self.tick()?;
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Var { name, .. } => Ok(self.lookup(name)),
            Expr::Unary { op, operand } => {
                let value = self.expr(operand)?;
                unary(*op, value)
            }
            Expr::Binary { op: BinOp::And, lhs, rhs } => {
                let ok = self.expr(lhs)?.truthy() && self.expr(rhs)?.truthy();
                Ok(Value::Bool(ok))
            }
            Expr::Binary { op: BinOp::Or, lhs, rhs } => {
                let ok = self.expr(lhs)?.truthy() || self.expr(rhs)?.truthy();
                Ok(Value::Bool(ok))
            }
            Expr::Binary { op, lhs, rhs } => {
                let lhs = self.expr(lhs)?;
                let rhs = self.expr(rhs)?;
                binary(*op, lhs, rhs, self.sandbox)
            }
            Expr::Call { name, args, .. } => {
                let primitive = Primitive::lookup(name).ok_or_else(|| ScriptError::Type {
                    message: format!("`{name}` is not callable"),
                })?;
                let args = args
                    .iter()
                    .map(|arg| self.expr(arg))
                    .collect::<ScriptResult<Vec<_>>>()?;
                primitive.call(args, self.sandbox, &mut *self.out)
            }
        }
    }
}

fn unary(op: UnaryOp, value: Value) -> ScriptResult<Value> {
    match (op, value) {
        (UnaryOp::Not, v) => Ok(Value::Bool(!v.truthy())),
        (UnaryOp::Neg, Value::Int(n)) => n
            .checked_neg()
            .map(Value::Int)
            .ok_or_else(|| ScriptError::Overflow { op: "-".into() }),
        (UnaryOp::Neg, Value::Float(x)) => Ok(Value::Float(-x)),
        (UnaryOp::Neg, other) => Err(ScriptError::Type {
            message: format!("cannot negate {}", other.type_name()),
        }),
    }
}

fn binary(op: BinOp, lhs: Value, rhs: Value, sandbox: &Sandbox) -> ScriptResult<Value> {
    use std::cmp::Ordering;

    match op {
        BinOp::Eq => return Ok(Value::Bool(lhs.loose_eq(&rhs))),
        BinOp::Ne => return Ok(Value::Bool(!lhs.loose_eq(&rhs))),
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
            let ord = lhs.compare(&rhs, op.symbol())?;
            let result = match op {
                BinOp::Lt => ord == Ordering::Less,
                BinOp::Le => ord != Ordering::Greater,
                BinOp::Gt => ord == Ordering::Greater,
                _ => ord != Ordering::Less,
            };
            return Ok(Value::Bool(result));
        }
        _ => {}
    }

    match (lhs, rhs) {
        (Value::Str(a), Value::Str(b)) if op == BinOp::Add => {
            sandbox.check_string_len(a.len() + b.len())?;
            Ok(Value::Str(a + &b))
        }
        (Value::Int(a), Value::Int(b)) => int_arith(op, a, b),
        (lhs, rhs) => match (lhs.as_f64(), rhs.as_f64()) {
            (Some(a), Some(b)) => float_arith(op, a, b),
            _ => Err(ScriptError::Type {
                message: format!(
                    "unsupported operands for `{}`: {} and {}",
                    op.symbol(),
                    lhs.type_name(),
                    rhs.type_name()
                ),
            }),
        },
    }
}

fn int_arith(op: BinOp, a: i64, b: i64) -> ScriptResult<Value> {
    if matches!(op, BinOp::Div | BinOp::Rem) && b == 0 {
        return Err(ScriptError::DivisionByZero);
    }
    let result = match op {
        BinOp::Add => a.checked_add(b),
        BinOp::Sub => a.checked_sub(b),
        BinOp::Mul => a.checked_mul(b),
        BinOp::Div => a.checked_div(b),
        BinOp::Rem => a.checked_rem(b),
        _ => unreachable!("comparison and logic operators are handled by the caller"),
    };
    result.map(Value::Int).ok_or_else(|| ScriptError::Overflow {
        op: op.symbol().into(),
    })
}

fn float_arith(op: BinOp, a: f64, b: f64) -> ScriptResult<Value> {
    if matches!(op, BinOp::Div | BinOp::Rem) && b == 0.0 {
        return Err(ScriptError::DivisionByZero);
    }
    Ok(Value::Float(match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => a / b,
        BinOp::Rem => a % b,
        _ => unreachable!("comparison and logic operators are handled by the caller"),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::parser::parse_program;

    fn run(src: &str, args: Vec<Value>) -> ScriptResult<Value> {
        run_limited(src, args, 10_000)
    }

    fn run_limited(src: &str, args: Vec<Value>, max_steps: u64) -> ScriptResult<Value> {
        run_in(src, args, &Sandbox::new(max_steps, Some(0)))
    }

    fn run_in(src: &str, args: Vec<Value>, sandbox: &Sandbox) -> ScriptResult<Value> {
        let fns = parse_program(src).unwrap();
        let mut out = Vec::new();
        call(&fns[0], args, sandbox, &mut out)
    }

    #[test]
    fn arithmetic_and_promotion() {
        assert_eq!(run("fn f(x) = x * x", vec![Value::Int(4)]).unwrap(), Value::Int(16));
        assert_eq!(run("fn f() = 7 / 2", vec![]).unwrap(), Value::Int(3));
        assert_eq!(run("fn f() = 7 / 2.0", vec![]).unwrap(), Value::Float(3.5));
        assert_eq!(run("fn f() = -(3 - 5) % 3", vec![]).unwrap(), Value::Int(2));
        assert_eq!(
            run("fn f(a, b) = a + \" \" + b", vec!["hi".into(), "there".into()]).unwrap(),
            Value::Str("hi there".into())
        );
    }

    #[test]
    fn control_flow() {
        let src = "fn fact(n) {
            let acc = 1;
            while n > 1 { acc = acc * n; n = n - 1; }
            return acc;
        }";
        assert_eq!(run(src, vec![Value::Int(5)]).unwrap(), Value::Int(120));

        let sign = "fn sign(n) { if n < 0 { return \"neg\"; } else if n == 0 { return \"zero\"; } }";
        assert_eq!(run(sign, vec![Value::Int(-4)]).unwrap(), Value::Str("neg".into()));
        assert_eq!(run(sign, vec![Value::Int(3)]).unwrap(), Value::Nil);
    }

    #[test]
    fn shadowing_is_block_scoped() {
        let src = "fn f(x) { if true { let x = 10; } return x; }";
        assert_eq!(run(src, vec![Value::Int(1)]).unwrap(), Value::Int(1));
    }

    #[test]
    fn short_circuit_skips_failing_operand() {
        assert_eq!(
            run("fn f() = false && 1 / 0", vec![]).unwrap(),
            Value::Bool(false)
        );
    }

    #[test]
    fn runtime_errors() {
        assert!(matches!(
            run("fn f(x) = x * x", vec!["abc".into()]),
            Err(ScriptError::Type { .. })
        ));
        assert!(matches!(
            run("fn f() = 1 / 0", vec![]),
            Err(ScriptError::DivisionByZero)
        ));
        assert!(matches!(
            run("fn f(x) = x * x", vec![Value::Int(i64::MAX)]),
            Err(ScriptError::Overflow { .. })
        ));
    }

    #[test]
    fn endless_loops_hit_the_step_limit() {
        let err = run_limited("fn spin() { while true { } }", vec![], 500).unwrap_err();
        assert!(matches!(err, ScriptError::StepLimit { limit: 500 }));
    }

    #[test]
    fn print_goes_to_the_supplied_writer() {
        let fns = parse_program("fn greet(name) { print(\"Hello,\", name); }").unwrap();
        let sandbox = Sandbox::default();
        let mut out = Vec::new();
        let value = call(&fns[0], vec!["Ada".into()], &sandbox, &mut out).unwrap();
        assert!(value.is_nil());
        assert_eq!(String::from_utf8(out).unwrap(), "Hello, Ada\n");
    }

    #[test]
    fn doubling_a_string_hits_the_length_cap() {
        let src = "fn grow(s, n) {
            let i = 0;
            while i < n { s = s + s; i = i + 1; }
            return len(s);
        }";
        let sandbox = Sandbox::new(100_000, Some(0)).with_max_string_len(1024);
        assert_eq!(
            run_in(src, vec!["x".into(), Value::Int(10)], &sandbox).unwrap(),
            Value::Int(1024)
        );
        assert!(matches!(
            run_in(src, vec!["x".into(), Value::Int(27)], &sandbox),
            Err(ScriptError::ResourceLimit { len: 2048, limit: 1024 })
        ));
    }
}
