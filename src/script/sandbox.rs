//! The primitive allow-list: the only functions a script handler can name.
//!
//! Scripts cannot import, open files, spawn processes, or reach the network,
//! because nothing in the grammar or in this table refers to those
//! capabilities. Calls to any other name are rejected at compile time by
//! [`check`](super::check).

use std::cell::RefCell;
use std::cmp::Ordering;
use std::io::Write;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::error::{ScriptError, ScriptResult};
use super::value::Value;

/// Default step budget per invocation.
pub const DEFAULT_MAX_STEPS: u64 = 100_000;

/// Default cap, in bytes, on any string a handler builds.
pub const DEFAULT_MAX_STRING_LEN: usize = 1024 * 1024;

/// Shared execution environment for every function compiled by one loader.
#[derive(Debug)]
pub struct Sandbox {
    rng: RefCell<StdRng>,
    max_steps: u64,
    max_string_len: usize,
}

impl Sandbox {
    /// Create a sandbox. A `seed` makes `random()` reproducible.
    pub fn new(max_steps: u64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            rng: RefCell::new(rng),
            max_steps,
            max_string_len: DEFAULT_MAX_STRING_LEN,
        }
    }

    pub fn with_max_string_len(mut self, max_string_len: usize) -> Self {
        self.max_string_len = max_string_len;
        self
    }

    pub fn max_steps(&self) -> u64 {
        self.max_steps
    }

    pub fn max_string_len(&self) -> usize {
        self.max_string_len
    }

    /// Fail with [`ScriptError::ResourceLimit`] if a string of `len` bytes
    /// would exceed the cap.
    pub fn check_string_len(&self, len: usize) -> ScriptResult<()> {
        if len > self.max_string_len {
            return Err(ScriptError::ResourceLimit {
                len,
                limit: self.max_string_len,
            });
        }
        Ok(())
    }

    fn string(&self, s: String) -> ScriptResult<Value> {
        self.check_string_len(s.len())?;
        Ok(Value::Str(s))
    }
}

impl Default for Sandbox {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_STEPS, None)
    }
}

/// An allow-listed primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    Print,
    Random,
    Int,
    Float,
    Str,
    Len,
    Abs,
    Min,
    Max,
    Round,
    Upper,
    Lower,
}

impl Primitive {
    pub const ALL: [Primitive; 12] = [
        Self::Print,
        Self::Random,
        Self::Int,
        Self::Float,
        Self::Str,
        Self::Len,
        Self::Abs,
        Self::Min,
        Self::Max,
        Self::Round,
        Self::Upper,
        Self::Lower,
    ];

    pub fn lookup(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Print => "print",
            Self::Random => "random",
            Self::Int => "int",
            Self::Float => "float",
            Self::Str => "str",
            Self::Len => "len",
            Self::Abs => "abs",
            Self::Min => "min",
            Self::Max => "max",
            Self::Round => "round",
            Self::Upper => "upper",
            Self::Lower => "lower",
        }
    }

    /// Whether the primitive accepts `n` arguments.
    pub fn accepts(self, n: usize) -> bool {
        match self {
            Self::Print => true,
            Self::Random => n == 0 || n == 2,
            Self::Min | Self::Max => n == 2,
            _ => n == 1,
        }
    }

    /// Accepted argument counts, for diagnostics.
    pub fn expected(self) -> &'static str {
        match self {
            Self::Print => "any number of",
            Self::Random => "0 or 2",
            Self::Min | Self::Max => "2",
            _ => "1",
        }
    }

    /// Apply the primitive. The argument count was validated at compile time.
    pub fn call(self, args: Vec<Value>, sandbox: &Sandbox, out: &mut dyn Write) -> ScriptResult<Value> {
        match self {
            Self::Print => {
                let line = args
                    .iter()
                    .map(|v| v.to_string())
                    .collect::<Vec<_>>()
                    .join(" ");
                writeln!(out, "{line}").map_err(|source| ScriptError::Output { source })?;
                Ok(Value::Nil)
            }
            Self::Random => random(args, sandbox),
            Self::Int => to_int(unary(args)),
            Self::Float => to_float(unary(args)),
            Self::Str => sandbox.string(unary(args).to_string()),
            Self::Len => match unary(args) {
                Value::Str(s) => Ok(Value::Int(s.chars().count() as i64)),
                other => Err(type_error("len", &other)),
            },
            Self::Abs => match unary(args) {
                Value::Int(n) => n
                    .checked_abs()
                    .map(Value::Int)
                    .ok_or_else(|| ScriptError::Overflow { op: "abs".into() }),
                Value::Float(x) => Ok(Value::Float(x.abs())),
                other => Err(type_error("abs", &other)),
            },
            Self::Min | Self::Max => {
                let mut it = args.into_iter();
                let a = it.next().unwrap_or(Value::Nil);
                let b = it.next().unwrap_or(Value::Nil);
                let ord = a.compare(&b, self.name())?;
                let pick_a = match self {
                    Self::Min => ord != Ordering::Greater,
                    _ => ord != Ordering::Less,
                };
                Ok(if pick_a { a } else { b })
            }
            Self::Round => match unary(args) {
                Value::Int(n) => Ok(Value::Int(n)),
                Value::Float(x) => float_to_int(x.round(), "round"),
                other => Err(type_error("round", &other)),
            },
            Self::Upper => match unary(args) {
                Value::Str(s) => sandbox.string(s.to_uppercase()),
                other => Err(type_error("upper", &other)),
            },
            Self::Lower => match unary(args) {
                Value::Str(s) => sandbox.string(s.to_lowercase()),
                other => Err(type_error("lower", &other)),
            },
        }
    }
}

fn unary(args: Vec<Value>) -> Value {
    args.into_iter().next().unwrap_or(Value::Nil)
}

fn type_error(name: &str, value: &Value) -> ScriptError {
    ScriptError::Type {
        message: format!("{name}() does not accept {}", value.type_name()),
    }
}

fn random(args: Vec<Value>, sandbox: &Sandbox) -> ScriptResult<Value> {
    let mut rng = sandbox.rng.borrow_mut();
    match args.as_slice() {
        [] => Ok(Value::Float(rng.gen_range(0.0..1.0))),
        [Value::Int(lo), Value::Int(hi)] if lo <= hi => Ok(Value::Int(rng.gen_range(*lo..=*hi))),
        [Value::Int(lo), Value::Int(hi)] => Err(ScriptError::Type {
            message: format!("random({lo}, {hi}) has an empty range"),
        }),
        [a, b] => Err(ScriptError::Type {
            message: format!(
                "random() bounds must be int, got {} and {}",
                a.type_name(),
                b.type_name()
            ),
        }),
        _ => Err(ScriptError::Type {
            message: "random() takes 0 or 2 arguments".into(),
        }),
    }
}

fn float_to_int(x: f64, target: &str) -> ScriptResult<Value> {
    if x.is_finite() && x >= i64::MIN as f64 && x < i64::MAX as f64 {
        Ok(Value::Int(x as i64))
    } else {
        Err(ScriptError::Overflow { op: target.into() })
    }
}

fn to_int(value: Value) -> ScriptResult<Value> {
    match value {
        Value::Int(n) => Ok(Value::Int(n)),
        Value::Float(x) => float_to_int(x.trunc(), "int"),
        Value::Bool(b) => Ok(Value::Int(b as i64)),
        Value::Str(s) => s
            .trim()
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| ScriptError::Conversion {
                value: s,
                target: "int".into(),
            }),
        Value::Nil => Err(ScriptError::Conversion {
            value: "nil".into(),
            target: "int".into(),
        }),
    }
}

fn to_float(value: Value) -> ScriptResult<Value> {
    match value {
        Value::Int(n) => Ok(Value::Float(n as f64)),
        Value::Float(x) => Ok(Value::Float(x)),
        Value::Str(s) => match s.trim().parse::<f64>() {
            Ok(x) if x.is_finite() => Ok(Value::Float(x)),
            _ => Err(ScriptError::Conversion {
                value: s,
                target: "float".into(),
            }),
        },
        other => Err(ScriptError::Conversion {
            value: other.to_string(),
            target: "float".into(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(p: Primitive, args: Vec<Value>) -> ScriptResult<Value> {
        let sandbox = Sandbox::new(DEFAULT_MAX_STEPS, Some(7));
        let mut out = Vec::new();
        p.call(args, &sandbox, &mut out)
    }

    #[test]
    fn lookup_covers_allow_list_only() {
        for p in Primitive::ALL {
            assert_eq!(Primitive::lookup(p.name()), Some(p));
        }
        assert_eq!(Primitive::lookup("open"), None);
        assert_eq!(Primitive::lookup("exec"), None);
    }

    #[test]
    fn print_joins_arguments() {
        let sandbox = Sandbox::default();
        let mut out = Vec::new();
        let v = Primitive::Print
            .call(vec!["sum:".into(), Value::Int(3)], &sandbox, &mut out)
            .unwrap();
        assert!(v.is_nil());
        assert_eq!(String::from_utf8(out).unwrap(), "sum: 3\n");
    }

    #[test]
    fn conversions() {
        assert_eq!(call(Primitive::Int, vec![" 12 ".into()]).unwrap(), Value::Int(12));
        assert_eq!(call(Primitive::Int, vec![Value::Float(-2.9)]).unwrap(), Value::Int(-2));
        assert!(matches!(
            call(Primitive::Int, vec!["twelve".into()]),
            Err(ScriptError::Conversion { .. })
        ));
        assert_eq!(call(Primitive::Float, vec!["1.5".into()]).unwrap(), Value::Float(1.5));
        assert_eq!(call(Primitive::Str, vec![Value::Int(4)]).unwrap(), Value::Str("4".into()));
        assert_eq!(call(Primitive::Round, vec![Value::Float(2.5)]).unwrap(), Value::Int(3));
    }

    #[test]
    fn random_respects_bounds() {
        let sandbox = Sandbox::new(DEFAULT_MAX_STEPS, Some(1));
        let mut out = Vec::new();
        for _ in 0..100 {
            let v = Primitive::Random
                .call(vec![Value::Int(1), Value::Int(6)], &sandbox, &mut out)
                .unwrap();
            let Value::Int(n) = v else { panic!("expected int") };
            assert!((1..=6).contains(&n));
        }
        assert!(call(Primitive::Random, vec![Value::Int(6), Value::Int(1)]).is_err());
    }

    #[test]
    fn seeded_sandboxes_agree() {
        let a = Sandbox::new(DEFAULT_MAX_STEPS, Some(42));
        let b = Sandbox::new(DEFAULT_MAX_STEPS, Some(42));
        let mut out = Vec::new();
        let args = || vec![Value::Int(0), Value::Int(1_000_000)];
        assert_eq!(
            Primitive::Random.call(args(), &a, &mut out).unwrap(),
            Primitive::Random.call(args(), &b, &mut out).unwrap()
        );
    }

    #[test]
    fn min_max_and_abs() {
        assert_eq!(
            call(Primitive::Min, vec![Value::Int(3), Value::Float(2.5)]).unwrap(),
            Value::Float(2.5)
        );
        assert_eq!(
            call(Primitive::Max, vec!["a".into(), "b".into()]).unwrap(),
            Value::Str("b".into())
        );
        assert!(matches!(
            call(Primitive::Abs, vec![Value::Int(i64::MIN)]),
            Err(ScriptError::Overflow { .. })
        ));
    }

    #[test]
    fn string_results_respect_the_cap() {
        let sandbox = Sandbox::new(DEFAULT_MAX_STEPS, Some(7)).with_max_string_len(4);
        let mut out = Vec::new();
        assert_eq!(
            Primitive::Upper.call(vec!["abcd".into()], &sandbox, &mut out).unwrap(),
            Value::Str("ABCD".into())
        );
        assert!(matches!(
            Primitive::Upper.call(vec!["ßßß".into()], &sandbox, &mut out),
            Err(ScriptError::ResourceLimit { len: 6, limit: 4 })
        ));
        assert!(matches!(
            Primitive::Str.call(vec!["hello".into()], &sandbox, &mut out),
            Err(ScriptError::ResourceLimit { len: 5, limit: 4 })
        ));
    }
}
