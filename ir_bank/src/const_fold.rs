// Copyright 2025 Taskflow project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! A local peephole that folds arithmetic over known constants inside one task body.
//!
//! Evaluator kernels are built per operand signature and held in a process-wide cache
//! behind a single mutex; building and executing a kernel both happen under the lock,
//! serializing evaluator execution.

use fnv::FnvHashMap as HashMap;
use log::trace;
use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::body::{BinaryOp, ConstValue, Reg, Stmt, TaskBody, UnaryOp};

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
enum ValueKind {
    I64,
    F64,
    Bool,
}

impl ValueKind {
    fn of(value: ConstValue) -> ValueKind {
        match value {
            ConstValue::I64(_) => ValueKind::I64,
            ConstValue::F64Bits(_) => ValueKind::F64,
            ConstValue::Bool(_) => ValueKind::Bool,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
enum EvalKey {
    Unary(UnaryOp, ValueKind),
    Binary(BinaryOp, ValueKind, ValueKind),
}

type Evaluator = Box<dyn Fn(ConstValue, Option<ConstValue>) -> Option<ConstValue> + Send>;

static EVALUATORS: Lazy<Mutex<HashMap<EvalKey, Evaluator>>> =
    Lazy::new(|| Mutex::new(HashMap::default()));

fn build_unary(op: UnaryOp, kind: ValueKind) -> Evaluator {
    Box::new(move |lhs, _| match (op, kind, lhs) {
        (UnaryOp::Neg, ValueKind::I64, ConstValue::I64(v)) => Some(ConstValue::I64(v.wrapping_neg())),
        (UnaryOp::Neg, ValueKind::F64, ConstValue::F64Bits(bits)) => {
            Some(ConstValue::f64(-f64::from_bits(bits)))
        }
        (UnaryOp::Not, ValueKind::Bool, ConstValue::Bool(v)) => Some(ConstValue::Bool(!v)),
        _ => None,
    })
}

fn build_binary(op: BinaryOp, lhs_kind: ValueKind, rhs_kind: ValueKind) -> Evaluator {
    Box::new(move |lhs, rhs| {
        let rhs = rhs?;
        if ValueKind::of(lhs) != lhs_kind || ValueKind::of(rhs) != rhs_kind {
            return None;
        }
        match (lhs, rhs) {
            (ConstValue::I64(a), ConstValue::I64(b)) => match op {
                BinaryOp::Add => Some(ConstValue::I64(a.wrapping_add(b))),
                BinaryOp::Sub => Some(ConstValue::I64(a.wrapping_sub(b))),
                BinaryOp::Mul => Some(ConstValue::I64(a.wrapping_mul(b))),
                BinaryOp::Div => {
                    if b == 0 {
                        None
                    } else {
                        Some(ConstValue::I64(a.wrapping_div(b)))
                    }
                }
                BinaryOp::Min => Some(ConstValue::I64(a.min(b))),
                BinaryOp::Max => Some(ConstValue::I64(a.max(b))),
                BinaryOp::CmpLt => Some(ConstValue::Bool(a < b)),
                BinaryOp::CmpEq => Some(ConstValue::Bool(a == b)),
            },
            (ConstValue::F64Bits(a), ConstValue::F64Bits(b)) => {
                let (a, b) = (f64::from_bits(a), f64::from_bits(b));
                match op {
                    BinaryOp::Add => Some(ConstValue::f64(a + b)),
                    BinaryOp::Sub => Some(ConstValue::f64(a - b)),
                    BinaryOp::Mul => Some(ConstValue::f64(a * b)),
                    BinaryOp::Div => Some(ConstValue::f64(a / b)),
                    BinaryOp::Min => Some(ConstValue::f64(a.min(b))),
                    BinaryOp::Max => Some(ConstValue::f64(a.max(b))),
                    BinaryOp::CmpLt => Some(ConstValue::Bool(a < b)),
                    BinaryOp::CmpEq => Some(ConstValue::Bool(a == b)),
                }
            }
            (ConstValue::Bool(a), ConstValue::Bool(b)) => match op {
                BinaryOp::CmpEq => Some(ConstValue::Bool(a == b)),
                _ => None,
            },
            _ => None,
        }
    })
}

///
/// Looks up (building on miss) the evaluator kernel for the given signature, and runs it.
///
fn evaluate(key: EvalKey, lhs: ConstValue, rhs: Option<ConstValue>) -> Option<ConstValue> {
    let mut cache = EVALUATORS.lock();
    let evaluator = cache.entry(key).or_insert_with(|| match key {
        EvalKey::Unary(op, kind) => build_unary(op, kind),
        EvalKey::Binary(op, lhs_kind, rhs_kind) => build_binary(op, lhs_kind, rhs_kind),
    });
    evaluator(lhs, rhs)
}

///
/// Folds every unary/binary statement whose operands are known constants into a constant
/// load. A single forward scan reaches the fixed point, because constants only flow forward
/// through the statement list.
///
pub fn fold_constants(body: &TaskBody) -> TaskBody {
    let mut consts: HashMap<Reg, ConstValue> = HashMap::default();
    let mut folded = 0_usize;
    let stmts = body
        .stmts
        .iter()
        .map(|stmt| {
            let replacement = match *stmt {
                Stmt::Unary { dst, op, operand } => consts.get(&operand).and_then(|&value| {
                    evaluate(EvalKey::Unary(op, ValueKind::of(value)), value, None)
                        .map(|value| Stmt::LoadConst { dst, value })
                }),
                Stmt::Binary { dst, op, lhs, rhs } => {
                    match (consts.get(&lhs).copied(), consts.get(&rhs).copied()) {
                        (Some(a), Some(b)) => evaluate(
                            EvalKey::Binary(op, ValueKind::of(a), ValueKind::of(b)),
                            a,
                            Some(b),
                        )
                        .map(|value| Stmt::LoadConst { dst, value }),
                        _ => None,
                    }
                }
                _ => None,
            };
            if replacement.is_some() {
                folded += 1;
            }
            let stmt = replacement.unwrap_or_else(|| stmt.clone());
            match stmt {
                Stmt::LoadConst { dst, value } => {
                    consts.insert(dst, value);
                }
                _ => {
                    if let Some(dst) = stmt.def() {
                        consts.remove(&dst);
                    }
                }
            }
            stmt
        })
        .collect();

    if folded > 0 {
        trace!("Folded constants in {}", body.name);
    }
    TaskBody {
        name: body.name.clone(),
        arch: body.arch,
        shape: body.shape,
        element_wise: body.element_wise,
        block_dim: body.block_dim,
        stmts,
    }
}
