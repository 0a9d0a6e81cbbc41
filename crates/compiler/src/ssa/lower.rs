//! Virtual-stack simulation of a typed sequence
//!
//! Walks the sequence left to right, pushing a fresh register for every
//! produced value and emitting one instruction per word. `if` closes the
//! current block, lowers both quotation bodies from copies of the current
//! vstack, and opens a join block whose vstack is φ-registers.

use super::{BlockId, Cfg, ConstValue, Instr, Operand, Register, SsaError};
use crate::ast::{NodeId, Sequence, Term};
use crate::context::Context;
use crate::types::{Base, Type};
use std::collections::HashMap;

/// The closed set of two-operand words lowering understands.
const BINOPS: &[&str] = &[
    "+u8", "-u8", "*u8", "/u8", "+u16", "-u16", "*u16", "/u16", "<u8", "<=u8", ">u8", ">=u8",
    "==u8", "!=u8", "<u16", "<=u16", ">u16", ">=u16", "==u16", "!=u16",
];

/// Lower a typed sequence into a CFG. Returns the graph and the final
/// virtual stack of its exit block.
pub fn lower_sequence(seq: &Sequence, ctx: &Context) -> Result<(Cfg, Vec<Register>), SsaError> {
    lower_with_inputs(seq, ctx, &[])
}

/// Lower a sequence whose entry stack is pre-populated with argument
/// registers of the given types (bottom to top). Definition bodies are
/// lowered this way: their inputs are the caller's stack, modelled as
/// formal-parameter registers.
pub fn lower_with_inputs(
    seq: &Sequence,
    ctx: &Context,
    inputs: &[Type],
) -> Result<(Cfg, Vec<Register>), SsaError> {
    let mut lowerer = Lowerer {
        ctx,
        cfg: Cfg::new(),
        next_reg: 0,
        quote_bodies: HashMap::new(),
    };
    let vstack: Vec<Register> = inputs
        .iter()
        .map(|ty| lowerer.fresh_reg(ty.clone()))
        .collect();
    let entry = lowerer.cfg.entry;
    let (_exit, vstack) = lowerer.lower_into(seq, vstack, entry)?;
    Ok((lowerer.cfg, vstack))
}

struct Lowerer<'a> {
    ctx: &'a Context,
    cfg: Cfg,
    next_reg: usize,
    /// Quotation bodies keyed by the register their `QuoteRef` assigned,
    /// so `if` can find the branch code to inline.
    quote_bodies: HashMap<usize, &'a Sequence>,
}

impl<'a> Lowerer<'a> {
    fn fresh_reg(&mut self, ty: Type) -> Register {
        let id = self.next_reg;
        self.next_reg += 1;
        Register::Plain { id, ty }
    }

    fn emit(&mut self, block: BlockId, instr: Instr) {
        self.cfg.block_mut(block).instructions.push(instr);
    }

    fn pop(&self, vstack: &mut Vec<Register>, word: &str) -> Result<Register, SsaError> {
        vstack.pop().ok_or_else(|| SsaError::StackUnderflow {
            word: word.to_string(),
        })
    }

    /// The value type a quotation node pushes, from its finalized type.
    fn quotation_type(&self, id: NodeId) -> Result<Type, SsaError> {
        let node = self.ctx.node_type(id).ok_or(SsaError::MissingType(id))?;
        node.func
            .right
            .items
            .last()
            .cloned()
            .ok_or(SsaError::MissingType(id))
    }

    /// Result type of a binop, from the node's finalized type.
    fn binop_result_type(&self, id: NodeId) -> Result<Type, SsaError> {
        let node = self.ctx.node_type(id).ok_or(SsaError::MissingType(id))?;
        node.func
            .right
            .items
            .last()
            .cloned()
            .ok_or(SsaError::MissingType(id))
    }

    /// Lower `seq` starting in `block` with the given virtual stack.
    /// Returns the exit block (whose final vstack is set) and the vstack
    /// at its end.
    fn lower_into(
        &mut self,
        seq: &'a Sequence,
        mut vstack: Vec<Register>,
        block: BlockId,
    ) -> Result<(BlockId, Vec<Register>), SsaError> {
        let mut current = block;

        for term in &seq.terms {
            match term {
                Term::IntLiteral { value, base, .. } => {
                    let dst = self.fresh_reg(Type::Base(*base));
                    self.emit(
                        current,
                        Instr::Const {
                            dst: dst.clone(),
                            value: ConstValue::Int {
                                value: *value,
                                base: *base,
                            },
                        },
                    );
                    vstack.push(dst);
                }
                Term::BoolLiteral { value, .. } => {
                    let dst = self.fresh_reg(Type::Base(Base::Bool));
                    self.emit(
                        current,
                        Instr::Const {
                            dst: dst.clone(),
                            value: ConstValue::Bool(*value),
                        },
                    );
                    vstack.push(dst);
                }
                Term::Quotation { id, body } => {
                    let ty = self.quotation_type(*id)?;
                    let dst = self.fresh_reg(ty);
                    self.quote_bodies.insert(dst.id(), body);
                    self.emit(
                        current,
                        Instr::QuoteRef {
                            dst: dst.clone(),
                            quote: *id,
                        },
                    );
                    vstack.push(dst);
                }
                Term::WordCall { name, id } => match name.as_str() {
                    "dup" => {
                        let top = vstack
                            .last()
                            .cloned()
                            .ok_or_else(|| SsaError::StackUnderflow {
                                word: "dup".to_string(),
                            })?;
                        let dst = self.fresh_reg(top.ty().clone());
                        self.emit(
                            current,
                            Instr::Copy {
                                dst: dst.clone(),
                                src: top,
                            },
                        );
                        vstack.push(dst);
                    }
                    "drop" => {
                        self.pop(&mut vstack, "drop")?;
                    }
                    "swap" => {
                        let fst = self.pop(&mut vstack, "swap")?;
                        let snd = self.pop(&mut vstack, "swap")?;

                        // Three copies through a temporary keep every
                        // register single-assignment.
                        let temp = self.fresh_reg(snd.ty().clone());
                        self.emit(
                            current,
                            Instr::Copy {
                                dst: temp.clone(),
                                src: snd,
                            },
                        );
                        let new_snd = self.fresh_reg(fst.ty().clone());
                        self.emit(
                            current,
                            Instr::Copy {
                                dst: new_snd.clone(),
                                src: fst,
                            },
                        );
                        let new_fst = self.fresh_reg(temp.ty().clone());
                        self.emit(
                            current,
                            Instr::Copy {
                                dst: new_fst.clone(),
                                src: temp,
                            },
                        );

                        vstack.push(new_snd);
                        vstack.push(new_fst);
                    }
                    "u16" => {
                        let src = self.pop(&mut vstack, "u16")?;
                        let dst = self.fresh_reg(Type::Base(Base::U16));
                        self.emit(
                            current,
                            Instr::Cast {
                                dst: dst.clone(),
                                src,
                                ty: Type::Base(Base::U16),
                            },
                        );
                        vstack.push(dst);
                    }
                    "if" => {
                        let (join, join_vstack) = self.lower_if(&mut vstack, current)?;
                        current = join;
                        vstack = join_vstack;
                    }
                    op if BINOPS.contains(&op) => {
                        let result_ty = self.binop_result_type(*id)?;
                        let rhs = self.pop(&mut vstack, op)?;
                        let lhs = self.pop(&mut vstack, op)?;
                        let dst = self.fresh_reg(result_ty);
                        self.emit(
                            current,
                            Instr::Binop {
                                dst: dst.clone(),
                                word: op.to_string(),
                                lhs: Operand::Reg(lhs),
                                rhs: Operand::Reg(rhs),
                            },
                        );
                        vstack.push(dst);
                    }
                    other => return Err(SsaError::UnsupportedWord(other.to_string())),
                },
            }
        }

        self.cfg.block_mut(current).final_vstack = vstack.clone();
        Ok((current, vstack))
    }

    /// Lower an `if`: consume the boolean condition (topmost, per `if`'s
    /// stack effect) and the two quotation registers, inline both bodies
    /// as branch blocks, and merge at a fresh join block with
    /// φ-registers.
    fn lower_if(
        &mut self,
        vstack: &mut Vec<Register>,
        current: BlockId,
    ) -> Result<(BlockId, Vec<Register>), SsaError> {
        let cond = self.pop(vstack, "if")?;
        if cond.ty() != &Type::Base(Base::Bool) {
            return Err(SsaError::MalformedIf(format!(
                "condition register has type {}, expected BOOL",
                cond.ty()
            )));
        }

        let else_body = self.take_quotation(vstack, current, "else")?;
        let then_body = self.take_quotation(vstack, current, "then")?;

        let then_entry = self.cfg.add_block();
        let (then_exit, then_vstack) = self.lower_into(then_body, vstack.clone(), then_entry)?;
        let else_entry = self.cfg.add_block();
        let (else_exit, else_vstack) = self.lower_into(else_body, vstack.clone(), else_entry)?;

        self.emit(
            current,
            Instr::Jump {
                cond,
                then_block: then_entry,
                else_block: else_entry,
            },
        );
        self.cfg.block_mut(current).final_vstack = vstack.clone();
        self.cfg.add_edge(current, then_entry);
        self.cfg.add_edge(current, else_entry);

        let join = self.cfg.add_block();
        self.cfg.add_edge(then_exit, join);
        self.cfg.add_edge(else_exit, join);

        if then_vstack.len() != else_vstack.len() {
            return Err(SsaError::BranchArity {
                then_len: then_vstack.len(),
                else_len: else_vstack.len(),
            });
        }

        let mut join_vstack = Vec::with_capacity(then_vstack.len());
        for (then_reg, else_reg) in then_vstack.into_iter().zip(else_vstack) {
            if then_reg.ty() != else_reg.ty() {
                return Err(SsaError::PhiTypeMismatch {
                    then_ty: then_reg.ty().to_string(),
                    else_ty: else_reg.ty().to_string(),
                });
            }
            let id = self.next_reg;
            self.next_reg += 1;
            join_vstack.push(Register::Phi {
                id,
                ty: then_reg.ty().clone(),
                then_reg: Box::new(then_reg),
                else_reg: Box::new(else_reg),
            });
        }

        self.cfg.block_mut(join).final_vstack = join_vstack.clone();
        Ok((join, join_vstack))
    }

    /// Pop a quotation register and retire its `QuoteRef` from the
    /// current block: branch code is inlined, never materialized.
    fn take_quotation(
        &mut self,
        vstack: &mut Vec<Register>,
        current: BlockId,
        role: &str,
    ) -> Result<&'a Sequence, SsaError> {
        let reg = self.pop(vstack, "if")?;
        let body = self
            .quote_bodies
            .get(&reg.id())
            .copied()
            .ok_or_else(|| {
                SsaError::MalformedIf(format!(
                    "the {} branch must be a literal quotation",
                    role
                ))
            })?;

        let instructions = &mut self.cfg.block_mut(current).instructions;
        let position = instructions
            .iter()
            .rposition(|i| matches!(i, Instr::QuoteRef { dst, .. } if dst.id() == reg.id()))
            .ok_or_else(|| {
                SsaError::MalformedIf(format!(
                    "the {} branch quotation is not part of the current block",
                    role
                ))
            })?;
        instructions.remove(position);
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_util::lower_first_phrase;
    use super::*;
    use crate::parser::Parser;
    use crate::typechecker::TypeChecker;
    use std::collections::HashSet;

    /// Every register must be assigned exactly once across the graph.
    fn assert_single_assignment(cfg: &Cfg) {
        let mut seen = HashSet::new();
        for block in &cfg.blocks {
            for instr in &block.instructions {
                let dst = match instr {
                    Instr::Const { dst, .. }
                    | Instr::Copy { dst, .. }
                    | Instr::Cast { dst, .. }
                    | Instr::QuoteRef { dst, .. }
                    | Instr::Binop { dst, .. } => dst,
                    Instr::Jump { .. } => continue,
                };
                assert!(seen.insert(dst.id()), "register R{} assigned twice", dst.id());
            }
        }
    }

    #[test]
    fn test_literals_become_consts() {
        let (cfg, vstack) = lower_first_phrase("1 2 3");
        let entry = cfg.block(cfg.entry);
        assert_eq!(entry.instructions.len(), 3);
        for instr in &entry.instructions {
            assert!(matches!(instr, Instr::Const { .. }));
        }
        assert_eq!(vstack.len(), 3);
        assert_single_assignment(&cfg);
    }

    #[test]
    fn test_binop_pops_two_pushes_one() {
        let (cfg, vstack) = lower_first_phrase("1 2 +u8");
        let entry = cfg.block(cfg.entry);
        assert_eq!(entry.instructions.len(), 3);
        assert!(matches!(entry.instructions[0], Instr::Const { .. }));
        assert!(matches!(entry.instructions[1], Instr::Const { .. }));
        let Instr::Binop { dst, word, .. } = &entry.instructions[2] else {
            panic!("expected binop");
        };
        assert_eq!(word, "+u8");
        assert_eq!(dst.ty(), &Type::Base(Base::U8));
        assert_eq!(vstack.len(), 1);
        assert_eq!(vstack[0].id(), dst.id());
    }

    #[test]
    fn test_dup_copies_without_popping() {
        let (cfg, vstack) = lower_first_phrase("1 dup");
        let entry = cfg.block(cfg.entry);
        assert!(matches!(entry.instructions[1], Instr::Copy { .. }));
        assert_eq!(vstack.len(), 2);
        assert_ne!(vstack[0].id(), vstack[1].id());
    }

    #[test]
    fn test_drop_emits_nothing() {
        let (cfg, vstack) = lower_first_phrase("1 2 drop");
        assert_eq!(cfg.block(cfg.entry).instructions.len(), 2);
        assert_eq!(vstack.len(), 1);
    }

    #[test]
    fn test_swap_uses_three_copies() {
        let (cfg, vstack) = lower_first_phrase("1 2 swap");
        let entry = cfg.block(cfg.entry);
        assert_eq!(entry.instructions.len(), 5);
        let copies = entry
            .instructions
            .iter()
            .filter(|i| matches!(i, Instr::Copy { .. }))
            .count();
        assert_eq!(copies, 3);
        assert_eq!(vstack.len(), 2);
        assert_single_assignment(&cfg);
    }

    #[test]
    fn test_cast_to_u16() {
        let (cfg, vstack) = lower_first_phrase("5 u16");
        let entry = cfg.block(cfg.entry);
        assert!(matches!(entry.instructions[1], Instr::Cast { .. }));
        assert_eq!(vstack[0].ty(), &Type::Base(Base::U16));
    }

    #[test]
    fn test_quotation_pushes_function_register() {
        let (cfg, vstack) = lower_first_phrase("[| 1 |]");
        let entry = cfg.block(cfg.entry);
        assert!(matches!(entry.instructions[0], Instr::QuoteRef { .. }));
        assert!(matches!(vstack[0].ty(), Type::Function(_)));
    }

    #[test]
    fn test_if_builds_diamond_with_phi() {
        let (cfg, vstack) = lower_first_phrase("1 2 [| +u8 |] [| drop |] true if");
        assert_eq!(cfg.blocks.len(), 4);

        let entry = cfg.block(cfg.entry);
        // The QuoteRefs are retired; two literal consts and the condition
        // remain, then the Jump.
        assert_eq!(entry.instructions.len(), 4);
        assert!(matches!(
            entry.instructions.last(),
            Some(Instr::Jump { .. })
        ));
        assert_eq!(entry.succs.len(), 2);
        // Condition and both quotes popped, both ints kept.
        assert_eq!(entry.final_vstack.len(), 2);

        let join = cfg.blocks.last().unwrap();
        assert_eq!(join.preds.len(), 2);
        assert_eq!(vstack.len(), 1);
        assert!(vstack[0].is_phi());
        assert_eq!(vstack[0].ty(), &Type::Base(Base::U8));
        assert_single_assignment(&cfg);
    }

    #[test]
    fn test_if_condition_may_be_computed() {
        let (cfg, vstack) = lower_first_phrase("1 2 [| +u8 |] [| drop |] 3 4 <u8 if");
        let entry = cfg.block(cfg.entry);
        // The condition binop separates the QuoteRefs from the `if`; they
        // are still found and retired.
        assert!(matches!(entry.instructions.last(), Some(Instr::Jump { .. })));
        assert!(
            !entry
                .instructions
                .iter()
                .any(|i| matches!(i, Instr::QuoteRef { .. }))
        );
        assert_eq!(vstack.len(), 1);
        assert_single_assignment(&cfg);
    }

    #[test]
    fn test_nested_if() {
        let branch = "[| [| +u8 |] [| drop |] true if |]";
        let source = format!("1 2 {} {} false if", branch, branch);
        let (cfg, vstack) = lower_first_phrase(&source);
        // Outer diamond plus an inner diamond in each branch.
        assert_eq!(cfg.blocks.len(), 10);
        assert_eq!(vstack.len(), 1);
        assert!(vstack[0].is_phi());
        assert_single_assignment(&cfg);
    }

    #[test]
    fn test_unsupported_word_is_fatal() {
        let program = Parser::new("1 [| dup |] eval").parse().unwrap();
        let mut checker = TypeChecker::new();
        checker.check_program(&program).unwrap();
        let crate::ast::Phrase::Expr(seq) = &program.phrases[0] else {
            panic!();
        };
        let err = lower_sequence(seq, checker.context()).unwrap_err();
        assert!(matches!(err, SsaError::UnsupportedWord(name) if name == "eval"));
    }

    #[test]
    fn test_underflow_is_fatal() {
        // `drop` on its own type-checks (row polymorphism) but has no
        // register to consume.
        let program = Parser::new("drop").parse().unwrap();
        let mut checker = TypeChecker::new();
        checker.check_program(&program).unwrap();
        let crate::ast::Phrase::Expr(seq) = &program.phrases[0] else {
            panic!();
        };
        let err = lower_sequence(seq, checker.context()).unwrap_err();
        assert!(matches!(err, SsaError::StackUnderflow { .. }));
    }

    #[test]
    fn test_render_mentions_every_block() {
        let (cfg, _) = lower_first_phrase("1 2 [| +u8 |] [| drop |] true if");
        let rendered = cfg.render();
        for block in &cfg.blocks {
            assert!(rendered.contains(&format!("{}:", block.id)));
        }
    }
}
