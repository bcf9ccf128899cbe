// Copyright 2025 Taskflow project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::fmt;
use std::io::Write;

use byteorder::{LittleEndian, WriteBytesExt};

use hashing::{BodyHasher, Fingerprint};

use crate::{AsyncState, ResourceId, StateKind};

/// A virtual register within one task body.
pub type Reg = u32;

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Ord, PartialOrd)]
pub enum Arch {
    X64,
    Cuda,
}

impl Arch {
    fn tag(self) -> u8 {
        match self {
            Arch::X64 => 0,
            Arch::Cuda => 1,
        }
    }
}

///
/// The iteration shape of a task launch. Two tasks may only fuse when their shapes are
/// identical: the merged body runs both over the same domain.
///
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum LaunchShape {
    Serial,
    Range { begin: i64, end: i64 },
    Struct { root: ResourceId },
}

///
/// A constant operand. Floats are held as bit patterns so that bodies remain `Eq + Hash`
/// and content-addressable.
///
#[derive(Clone, Copy, Eq, Hash, PartialEq)]
pub enum ConstValue {
    I64(i64),
    F64Bits(u64),
    Bool(bool),
}

impl ConstValue {
    pub fn f64(value: f64) -> ConstValue {
        ConstValue::F64Bits(value.to_bits())
    }

    pub fn as_f64(self) -> Option<f64> {
        match self {
            ConstValue::F64Bits(bits) => Some(f64::from_bits(bits)),
            _ => None,
        }
    }
}

impl fmt::Debug for ConstValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstValue::I64(v) => write!(f, "{v}i64"),
            ConstValue::F64Bits(bits) => write!(f, "{}f64", f64::from_bits(*bits)),
            ConstValue::Bool(v) => write!(f, "{v}"),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Min,
    Max,
    CmpLt,
    CmpEq,
}

///
/// One statement of a task body. The statement set is deliberately small: enough to express
/// loads/stores against the state namespace, arithmetic for folding, sparse-structure
/// maintenance, and an observable side effect.
///
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum Stmt {
    LoadConst { dst: Reg, value: ConstValue },
    Load { dst: Reg, state: AsyncState },
    Store { state: AsyncState, src: Reg },
    Unary { dst: Reg, op: UnaryOp, operand: Reg },
    Binary { dst: Reg, op: BinaryOp, lhs: Reg, rhs: Reg },
    Activate { resource: ResourceId },
    Deactivate { resource: ResourceId },
    ClearList { resource: ResourceId },
    GenerateList { resource: ResourceId },
    Print { src: Reg },
}

impl Stmt {
    ///
    /// The register this statement defines, if any.
    ///
    pub fn def(&self) -> Option<Reg> {
        match self {
            Stmt::LoadConst { dst, .. }
            | Stmt::Load { dst, .. }
            | Stmt::Unary { dst, .. }
            | Stmt::Binary { dst, .. } => Some(*dst),
            _ => None,
        }
    }

    ///
    /// Rewrites all register operands and defs through `f`. Used when concatenating bodies to
    /// keep the two halves' registers disjoint.
    ///
    pub fn map_regs(&self, f: impl Fn(Reg) -> Reg) -> Stmt {
        match *self {
            Stmt::LoadConst { dst, value } => Stmt::LoadConst { dst: f(dst), value },
            Stmt::Load { dst, state } => Stmt::Load { dst: f(dst), state },
            Stmt::Store { state, src } => Stmt::Store { state, src: f(src) },
            Stmt::Unary { dst, op, operand } => Stmt::Unary {
                dst: f(dst),
                op,
                operand: f(operand),
            },
            Stmt::Binary { dst, op, lhs, rhs } => Stmt::Binary {
                dst: f(dst),
                op,
                lhs: f(lhs),
                rhs: f(rhs),
            },
            Stmt::Activate { resource } => Stmt::Activate { resource },
            Stmt::Deactivate { resource } => Stmt::Deactivate { resource },
            Stmt::ClearList { resource } => Stmt::ClearList { resource },
            Stmt::GenerateList { resource } => Stmt::GenerateList { resource },
            Stmt::Print { src } => Stmt::Print { src: f(src) },
        }
    }
}

///
/// A complete task body: the launch header plus the statement list. Bodies are immutable
/// once interned in the bank; edits produce new bodies with new fingerprints.
///
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct TaskBody {
    pub name: String,
    pub arch: Arch,
    pub shape: LaunchShape,
    pub element_wise: bool,
    pub block_dim: u32,
    pub stmts: Vec<Stmt>,
}

impl TaskBody {
    ///
    /// The largest register used by this body plus one; zero for a body using no registers.
    ///
    pub fn reg_count(&self) -> Reg {
        let mut max: Option<Reg> = None;
        let mut see = |r: Reg| {
            max = Some(max.map_or(r, |m| m.max(r)));
        };
        for stmt in &self.stmts {
            match *stmt {
                Stmt::LoadConst { dst, .. } | Stmt::Load { dst, .. } => see(dst),
                Stmt::Store { src, .. } | Stmt::Print { src } => see(src),
                Stmt::Unary { dst, operand, .. } => {
                    see(dst);
                    see(operand);
                }
                Stmt::Binary { dst, lhs, rhs, .. } => {
                    see(dst);
                    see(lhs);
                    see(rhs);
                }
                Stmt::Activate { .. }
                | Stmt::Deactivate { .. }
                | Stmt::ClearList { .. }
                | Stmt::GenerateList { .. } => {}
            }
        }
        max.map_or(0, |m| m + 1)
    }

    ///
    /// Computes the content fingerprint of this body from a stable byte encoding. Identical
    /// IR yields identical fingerprints regardless of how the body was produced.
    ///
    pub fn fingerprint(&self) -> Fingerprint {
        let mut hasher = BodyHasher::new();
        self.encode(&mut hasher)
            .expect("encoding to a hasher cannot fail");
        hasher.finish()
    }

    fn encode<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        w.write_u64::<LittleEndian>(self.name.len() as u64)?;
        w.write_all(self.name.as_bytes())?;
        w.write_u8(self.arch.tag())?;
        w.write_u8(self.element_wise as u8)?;
        w.write_u32::<LittleEndian>(self.block_dim)?;
        match self.shape {
            LaunchShape::Serial => w.write_u8(0)?,
            LaunchShape::Range { begin, end } => {
                w.write_u8(1)?;
                w.write_i64::<LittleEndian>(begin)?;
                w.write_i64::<LittleEndian>(end)?;
            }
            LaunchShape::Struct { root } => {
                w.write_u8(2)?;
                w.write_u32::<LittleEndian>(root.0)?;
            }
        }
        w.write_u64::<LittleEndian>(self.stmts.len() as u64)?;
        for stmt in &self.stmts {
            encode_stmt(stmt, w)?;
        }
        Ok(())
    }
}

fn encode_state<W: Write>(state: &AsyncState, w: &mut W) -> std::io::Result<()> {
    w.write_u32::<LittleEndian>(state.resource.0)?;
    w.write_u8(match state.kind {
        StateKind::Value => 0,
        StateKind::List => 1,
        StateKind::Mask => 2,
    })
}

fn encode_const<W: Write>(value: &ConstValue, w: &mut W) -> std::io::Result<()> {
    match *value {
        ConstValue::I64(v) => {
            w.write_u8(0)?;
            w.write_i64::<LittleEndian>(v)
        }
        ConstValue::F64Bits(bits) => {
            w.write_u8(1)?;
            w.write_u64::<LittleEndian>(bits)
        }
        ConstValue::Bool(v) => {
            w.write_u8(2)?;
            w.write_u8(v as u8)
        }
    }
}

fn encode_stmt<W: Write>(stmt: &Stmt, w: &mut W) -> std::io::Result<()> {
    match *stmt {
        Stmt::LoadConst { dst, ref value } => {
            w.write_u8(0)?;
            w.write_u32::<LittleEndian>(dst)?;
            encode_const(value, w)
        }
        Stmt::Load { dst, ref state } => {
            w.write_u8(1)?;
            w.write_u32::<LittleEndian>(dst)?;
            encode_state(state, w)
        }
        Stmt::Store { ref state, src } => {
            w.write_u8(2)?;
            encode_state(state, w)?;
            w.write_u32::<LittleEndian>(src)
        }
        Stmt::Unary { dst, op, operand } => {
            w.write_u8(3)?;
            w.write_u32::<LittleEndian>(dst)?;
            w.write_u8(op as u8)?;
            w.write_u32::<LittleEndian>(operand)
        }
        Stmt::Binary { dst, op, lhs, rhs } => {
            w.write_u8(4)?;
            w.write_u32::<LittleEndian>(dst)?;
            w.write_u8(op as u8)?;
            w.write_u32::<LittleEndian>(lhs)?;
            w.write_u32::<LittleEndian>(rhs)
        }
        Stmt::Activate { resource } => {
            w.write_u8(5)?;
            w.write_u32::<LittleEndian>(resource.0)
        }
        Stmt::Deactivate { resource } => {
            w.write_u8(6)?;
            w.write_u32::<LittleEndian>(resource.0)
        }
        Stmt::ClearList { resource } => {
            w.write_u8(7)?;
            w.write_u32::<LittleEndian>(resource.0)
        }
        Stmt::GenerateList { resource } => {
            w.write_u8(8)?;
            w.write_u32::<LittleEndian>(resource.0)
        }
        Stmt::Print { src } => {
            w.write_u8(9)?;
            w.write_u32::<LittleEndian>(src)
        }
    }
}
