use super::operator::BinaryOp;
use serde::{Deserialize, Serialize};
use std::rc::Rc;
use thiserror::Error;

/// Host function signature used by natives registered in the VM globals.
pub type NativeFn = fn(&[Value]) -> Result<Value, String>;

/// A function compiled into the instruction stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    /// Offset of the first instruction of the body.
    pub entry: usize,
    pub arity: u16,
}

/// A function implemented by the embedding program.
#[derive(Clone)]
pub struct NativeFunction {
    pub name: String,
    pub arity: u16,
    pub func: NativeFn,
}

impl std::fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeFunction")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish_non_exhaustive()
    }
}

/// Runtime value.
///
/// `Clone` is the language-level copy: strings and lists are copied deeply,
/// function values share their definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    Unit,
    Int(i32),
    Float(f32),
    Bool(bool),
    String(String),
    List(Vec<Value>),
    CompiledFunction(Rc<Function>),
    /// Never part of a constant pool, so never persisted.
    #[serde(skip)]
    NativeFunction(Rc<NativeFunction>),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValueError {
    #[error("type mismatch: cannot apply '{op}' to {left} and {right}")]
    TypeMismatch {
        left: &'static str,
        op: &'static str,
        right: &'static str,
    },

    #[error("operator '{op}' is not supported for {ty}")]
    Unsupported { op: &'static str, ty: &'static str },

    #[error("division by zero")]
    DivisionByZero,
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Unit => "unit",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Bool(_) => "bool",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::CompiledFunction(_) => "function",
            Value::NativeFunction(_) => "native fn",
        }
    }

    pub fn same_type(&self, other: &Value) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }

    /// The identifier stored in a name constant.
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn native(name: impl Into<String>, arity: u16, func: NativeFn) -> Value {
        Value::NativeFunction(Rc::new(NativeFunction {
            name: name.into(),
            arity,
            func,
        }))
    }

    // =========================================================================
    // Pure binary operations per variant
    // =========================================================================

    pub fn binop_int(op: BinaryOp, a: i32, b: i32) -> Result<Value, ValueError> {
        Ok(match op {
            BinaryOp::Add => Value::Int(a.wrapping_add(b)),
            BinaryOp::Sub => Value::Int(a.wrapping_sub(b)),
            BinaryOp::Mul => Value::Int(a.wrapping_mul(b)),
            BinaryOp::Div => {
                if b == 0 {
                    return Err(ValueError::DivisionByZero);
                }
                Value::Int(a.wrapping_div(b))
            }
            BinaryOp::Less => Value::Bool(a < b),
            BinaryOp::LessEq => Value::Bool(a <= b),
            BinaryOp::Greater => Value::Bool(a > b),
            BinaryOp::GreaterEq => Value::Bool(a >= b),
            BinaryOp::EqEq => Value::Bool(a == b),
            BinaryOp::NotEq => Value::Bool(a != b),
            BinaryOp::And | BinaryOp::Or => return Err(unsupported(op, "int")),
        })
    }

    pub fn binop_float(op: BinaryOp, a: f32, b: f32) -> Result<Value, ValueError> {
        Ok(match op {
            BinaryOp::Add => Value::Float(a + b),
            BinaryOp::Sub => Value::Float(a - b),
            BinaryOp::Mul => Value::Float(a * b),
            BinaryOp::Div => {
                if b == 0.0 {
                    return Err(ValueError::DivisionByZero);
                }
                Value::Float(a / b)
            }
            BinaryOp::Less => Value::Bool(a < b),
            BinaryOp::LessEq => Value::Bool(a <= b),
            BinaryOp::Greater => Value::Bool(a > b),
            BinaryOp::GreaterEq => Value::Bool(a >= b),
            BinaryOp::EqEq => Value::Bool(a == b),
            BinaryOp::NotEq => Value::Bool(a != b),
            BinaryOp::And | BinaryOp::Or => return Err(unsupported(op, "float")),
        })
    }

    pub fn binop_bool(op: BinaryOp, a: bool, b: bool) -> Result<Value, ValueError> {
        Ok(match op {
            BinaryOp::EqEq => Value::Bool(a == b),
            BinaryOp::NotEq => Value::Bool(a != b),
            BinaryOp::And => Value::Bool(a && b),
            BinaryOp::Or => Value::Bool(a || b),
            _ => return Err(unsupported(op, "bool")),
        })
    }

    pub fn binop_str(op: BinaryOp, a: &str, b: &str) -> Result<Value, ValueError> {
        Ok(match op {
            BinaryOp::Add => Value::String(format!("{}{}", a, b)),
            BinaryOp::Less => Value::Bool(a < b),
            BinaryOp::LessEq => Value::Bool(a <= b),
            BinaryOp::Greater => Value::Bool(a > b),
            BinaryOp::GreaterEq => Value::Bool(a >= b),
            BinaryOp::EqEq => Value::Bool(a == b),
            BinaryOp::NotEq => Value::Bool(a != b),
            _ => return Err(unsupported(op, "string")),
        })
    }

    pub fn binop_list(op: BinaryOp, a: &[Value], b: &[Value]) -> Result<Value, ValueError> {
        Ok(match op {
            BinaryOp::Add => Value::List(a.iter().chain(b).cloned().collect()),
            BinaryOp::EqEq => Value::Bool(a == b),
            BinaryOp::NotEq => Value::Bool(a != b),
            _ => return Err(unsupported(op, "list")),
        })
    }

    /// Apply `op` to two values of the same variant. Mixed variants are
    /// rejected; there is no implicit coercion.
    pub fn binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, ValueError> {
        if !left.same_type(right) {
            return Err(mismatch(op, left, right));
        }

        match (left, right) {
            (Value::Int(a), Value::Int(b)) => Value::binop_int(op, *a, *b),
            (Value::Float(a), Value::Float(b)) => Value::binop_float(op, *a, *b),
            (Value::Bool(a), Value::Bool(b)) => Value::binop_bool(op, *a, *b),
            (Value::String(a), Value::String(b)) => Value::binop_str(op, a, b),
            (Value::List(a), Value::List(b)) => Value::binop_list(op, a, b),
            (Value::Unit, Value::Unit) => match op {
                BinaryOp::EqEq => Ok(Value::Bool(true)),
                BinaryOp::NotEq => Ok(Value::Bool(false)),
                _ => Err(unsupported(op, "unit")),
            },
            _ => match op {
                BinaryOp::EqEq => Ok(Value::Bool(left == right)),
                BinaryOp::NotEq => Ok(Value::Bool(left != right)),
                _ => Err(unsupported(op, left.type_name())),
            },
        }
    }

    /// In-place compound operation (`+=` and friends): mutates `self`.
    pub fn modify(&mut self, op: BinaryOp, rhs: &Value) -> Result<(), ValueError> {
        if !self.same_type(rhs) {
            return Err(mismatch(op, self, rhs));
        }

        match (self, rhs) {
            (Value::Int(a), Value::Int(b)) => match op {
                BinaryOp::Add => *a = a.wrapping_add(*b),
                BinaryOp::Sub => *a = a.wrapping_sub(*b),
                BinaryOp::Mul => *a = a.wrapping_mul(*b),
                BinaryOp::Div => {
                    if *b == 0 {
                        return Err(ValueError::DivisionByZero);
                    }
                    *a = a.wrapping_div(*b);
                }
                _ => return Err(unsupported(op, "int")),
            },
            (Value::Float(a), Value::Float(b)) => match op {
                BinaryOp::Add => *a += *b,
                BinaryOp::Sub => *a -= *b,
                BinaryOp::Mul => *a *= *b,
                BinaryOp::Div => {
                    if *b == 0.0 {
                        return Err(ValueError::DivisionByZero);
                    }
                    *a /= *b;
                }
                _ => return Err(unsupported(op, "float")),
            },
            (Value::String(a), Value::String(b)) => match op {
                BinaryOp::Add => a.push_str(b),
                _ => return Err(unsupported(op, "string")),
            },
            (Value::List(a), Value::List(b)) => match op {
                BinaryOp::Add => a.extend(b.iter().cloned()),
                _ => return Err(unsupported(op, "list")),
            },
            (other, _) => return Err(unsupported(op, other.type_name())),
        }

        Ok(())
    }

    pub fn negate(&self) -> Result<Value, ValueError> {
        match self {
            Value::Int(n) => Ok(Value::Int(n.wrapping_neg())),
            Value::Float(n) => Ok(Value::Float(-n)),
            other => Err(ValueError::Unsupported {
                op: "-",
                ty: other.type_name(),
            }),
        }
    }

    pub fn not(&self) -> Result<Value, ValueError> {
        match self {
            Value::Bool(b) => Ok(Value::Bool(!b)),
            other => Err(ValueError::Unsupported {
                op: "!",
                ty: other.type_name(),
            }),
        }
    }
}

fn unsupported(op: BinaryOp, ty: &'static str) -> ValueError {
    ValueError::Unsupported {
        op: op.symbol(),
        ty,
    }
}

fn mismatch(op: BinaryOp, left: &Value, right: &Value) -> ValueError {
    ValueError::TypeMismatch {
        left: left.type_name(),
        op: op.symbol(),
        right: right.type_name(),
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Unit, Value::Unit) => true,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::CompiledFunction(a), Value::CompiledFunction(b)) => Rc::ptr_eq(a, b) || a == b,
            (Value::NativeFunction(a), Value::NativeFunction(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl std::fmt::Display for Value {
    /// The text `print` writes for a value.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Unit => write!(f, "()"),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(n) => write!(f, "{:.6}", n),
            Value::Bool(b) => write!(f, "{}", b),
            Value::String(s) => write!(f, "{}", s),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::CompiledFunction(func) => write!(f, "<fn {}>", func.name),
            Value::NativeFunction(func) => write!(f, "<native fn {}>", func.name),
        }
    }
}
