//! Constant propagation over a lowered CFG
//!
//! A single forward pass in block-creation order (a topological order of
//! the graph as built: branch bodies precede their join). Known constants
//! flow into `Binop` operands; a `Binop` with two known operands folds to
//! a `Const`, as does a `Copy` of a known register. Arithmetic wraps at
//! the operand width (mod 256 / mod 65536), comparisons fold to booleans,
//! and division by a zero constant is left for the runtime. φ-registers
//! are never known, so merged values defeat propagation.

use super::{Cfg, ConstValue, Instr, Operand};
use crate::types::Base;
use std::collections::HashMap;

/// Propagate constants through every block of the graph, rewriting
/// instructions in place. Final vstacks are untouched, so the type list
/// of every block's stack is preserved.
pub fn constant_propagation(cfg: &mut Cfg) {
    let mut known: HashMap<usize, ConstValue> = HashMap::new();

    for index in 0..cfg.blocks.len() {
        for instr in &mut cfg.blocks[index].instructions {
            match instr {
                Instr::Const { dst, value } => {
                    known.insert(dst.id(), value.clone());
                }
                Instr::Binop {
                    dst,
                    word,
                    lhs,
                    rhs,
                } => {
                    if let Operand::Reg(reg) = lhs {
                        if let Some(value) = known.get(&reg.id()) {
                            *lhs = Operand::Const(value.clone());
                        }
                    }
                    if let Operand::Reg(reg) = rhs {
                        if let Some(value) = known.get(&reg.id()) {
                            *rhs = Operand::Const(value.clone());
                        }
                    }
                    if let (Some(a), Some(b)) = (lhs.as_const(), rhs.as_const()) {
                        if let Some(folded) = fold(word, a, b) {
                            known.insert(dst.id(), folded.clone());
                            *instr = Instr::Const {
                                dst: dst.clone(),
                                value: folded,
                            };
                        }
                    }
                }
                Instr::Copy { dst, src } => {
                    if let Some(value) = known.get(&src.id()).cloned() {
                        known.insert(dst.id(), value.clone());
                        *instr = Instr::Const {
                            dst: dst.clone(),
                            value,
                        };
                    }
                }
                Instr::Cast { .. } | Instr::QuoteRef { .. } | Instr::Jump { .. } => {}
            }
        }
    }
}

/// Fold a binop over two integer constants. Returns `None` for
/// non-integer operands, unknown operators, and division by zero.
fn fold(word: &str, lhs: &ConstValue, rhs: &ConstValue) -> Option<ConstValue> {
    let (ConstValue::Int { value: a, .. }, ConstValue::Int { value: b, .. }) = (lhs, rhs) else {
        return None;
    };

    let wide = word.ends_with("u16");
    let modulus: i64 = if wide { 65536 } else { 256 };
    let base = if wide { Base::U16 } else { Base::U8 };
    let x = (*a as i64).rem_euclid(modulus);
    let y = (*b as i64).rem_euclid(modulus);

    let int = |v: i64| {
        Some(ConstValue::Int {
            value: v.rem_euclid(modulus) as u16,
            base,
        })
    };

    let op = word.strip_suffix("u16").or_else(|| word.strip_suffix("u8"))?;
    match op {
        "+" => int(x + y),
        "-" => int(x - y),
        "*" => int(x * y),
        "/" => {
            if y == 0 {
                None
            } else {
                int(x / y)
            }
        }
        "<" => Some(ConstValue::Bool(x < y)),
        "<=" => Some(ConstValue::Bool(x <= y)),
        ">" => Some(ConstValue::Bool(x > y)),
        ">=" => Some(ConstValue::Bool(x >= y)),
        "==" => Some(ConstValue::Bool(x == y)),
        "!=" => Some(ConstValue::Bool(x != y)),
        _ => None,
    }
}
