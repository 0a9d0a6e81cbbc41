//! Stack-effect inference for Rill
//!
//! Uses row polymorphism and unification to type whole phrases. The type
//! of a sequence is the left fold of [`compose`] over the per-term
//! instantiated types; fold order is part of the contract. Each term's
//! instantiation is cached in the context so the final annotation pass
//! can narrow nested quotation bodies to concrete per-word types once the
//! outer phrase has finished refining them.

use crate::ast::{Phrase, Program, Sequence, Term};
use crate::context::Context;
use crate::types::{Base, FuncType, Type, TypeError, Var};
use crate::unification::unify_rows;
use tracing::debug;

/// The type of the sequential composition of two words.
///
/// With `f : L -> M` and `g : M' -> R`, unifies `M` against `M'` (row
/// splitting lets the shorter middle absorb the longer one's surplus) and
/// returns `L -> R` with the accumulated substitutions applied in
/// dependency order.
pub fn compose(f: &FuncType, g: &FuncType, ctx: &mut Context) -> Result<FuncType, TypeError> {
    debug!("composing {} with {}", f, g);
    unify_rows(&f.right, &g.left, ctx)?;
    let candidate = FuncType::new(f.left.clone(), g.right.clone());
    ctx.resolve(&candidate)
}

pub struct TypeChecker {
    ctx: Context,
}

impl TypeChecker {
    pub fn new() -> Self {
        TypeChecker {
            ctx: Context::with_builtins(),
        }
    }

    /// The inference context, with the finalized node types of every
    /// phrase checked so far. SSA lowering reads these.
    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// Type every phrase in order. Stops at the first failure; the
    /// substitution store is reset so a caller can keep going with the
    /// next input.
    pub fn check_program(&mut self, program: &Program) -> Result<Vec<FuncType>, TypeError> {
        let mut types = Vec::with_capacity(program.phrases.len());
        for phrase in &program.phrases {
            match self.check_phrase(phrase) {
                Ok(func) => types.push(func),
                Err(err) => {
                    self.ctx.reset();
                    return Err(err);
                }
            }
        }
        Ok(types)
    }

    /// Type a single top-level phrase to completion: infer, resolve,
    /// finalize the per-node cache, and (for definitions) register the
    /// word in the user scope.
    pub fn check_phrase(&mut self, phrase: &Phrase) -> Result<FuncType, TypeError> {
        match phrase {
            Phrase::Expr(seq) => {
                let func = self.infer_sequence(seq)?;
                let func = self.ctx.resolve(&func)?;
                self.ctx.finalize_phrase()?;
                Ok(func)
            }
            Phrase::Definition { name, body } => {
                if self.ctx.lookup(name).is_some() {
                    return Err(TypeError::DuplicateDefinition(name.clone()));
                }
                // The body types before the name is registered, so a
                // self-reference fails lookup: user words are not
                // recursive.
                let func = self.infer_sequence(body)?;
                let func = self.ctx.resolve(&func)?;
                self.ctx.finalize_phrase()?;
                self.ctx.register_user_word(name, func.clone())?;
                Ok(func)
            }
        }
    }

    fn infer_sequence(&mut self, seq: &Sequence) -> Result<FuncType, TypeError> {
        if seq.terms.is_empty() {
            return Err(TypeError::EmptySequence);
        }

        let mut acc = self.term_type(&seq.terms[0])?;
        for term in &seq.terms[1..] {
            let next = self.term_type(term)?;
            acc = compose(&acc, &next, &mut self.ctx)?;
        }

        self.ctx.cache_node_type(seq.id, acc.clone());
        Ok(acc)
    }

    /// The instantiated type of a single term, cached under the term's
    /// node id.
    fn term_type(&mut self, term: &Term) -> Result<FuncType, TypeError> {
        let func = match term {
            Term::IntLiteral { base, .. } => {
                let s = Var::row("S");
                FuncType::balanced(s, vec![], vec![Type::Base(*base)])
            }
            Term::BoolLiteral { .. } => {
                let s = Var::row("S");
                FuncType::balanced(s, vec![], vec![Type::Base(Base::Bool)])
            }
            Term::WordCall { name, .. } => {
                let scheme = self
                    .ctx
                    .lookup(name)
                    .cloned()
                    .ok_or_else(|| TypeError::UnknownWord(name.clone()))?;
                self.ctx.instantiate(&scheme)
            }
            Term::Quotation { body, .. } => {
                let inner = self.infer_sequence(body)?;
                let nq = Var::row("NQ");
                FuncType::balanced(nq, vec![], vec![Type::func(inner)])
            }
        };

        self.ctx.cache_node_type(term.id(), func.clone());
        Ok(func)
    }
}

impl Default for TypeChecker {
    fn default() -> Self {
        TypeChecker::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;
    use std::collections::BTreeSet;

    fn check(source: &str) -> Result<Vec<FuncType>, TypeError> {
        let program = Parser::new(source).parse().expect("parse failure");
        let mut checker = TypeChecker::new();
        checker.check_program(&program)
    }

    /// Type of the last phrase, rendered.
    fn phrase_type(source: &str) -> String {
        let types = check(source).expect("inference failure");
        types.last().expect("no phrases").to_string()
    }

    fn u8() -> Type {
        Type::Base(Base::U8)
    }

    // ---- concrete end-to-end scenarios -------------------------------

    #[test]
    fn test_literals() {
        assert_eq!(phrase_type("1 3 5"), "(''S -> ''S U8 U8 U8)");
    }

    #[test]
    fn test_quoted_literals() {
        assert_eq!(
            phrase_type("[| 1 3 5 |]"),
            "(''NQ -> ''NQ (''S -> ''S U8 U8 U8))"
        );
    }

    #[test]
    fn test_indexed_iter_with_store() {
        assert_eq!(
            phrase_type("0 5 [| dup u16 store-at |] indexed-iter"),
            "(''S -> ''S)"
        );
    }

    #[test]
    fn test_polymorphic_quotation() {
        assert_eq!(
            phrase_type("[| dup dup |]"),
            "(''NQ -> ''NQ (''S 'T -> ''S 'T 'T 'T))"
        );
    }

    #[test]
    fn test_while_loop() {
        assert_eq!(
            phrase_type("1 1 [| dup 100 <=u8 |] [| swap over +u8 |] while swap drop"),
            "(''S -> ''S U8)"
        );
    }

    #[test]
    fn test_nested_quotation_eval() {
        assert_eq!(
            phrase_type("100 [| dup [| +u8 |] eval |] eval"),
            "(''S -> ''S U8)"
        );
    }

    #[test]
    fn test_lists() {
        assert_eq!(
            phrase_type("empty-list 1 add-to-list 2 add-to-list"),
            "(''S -> ''S LIST<U8>)"
        );
    }

    #[test]
    fn test_retrieve_stays_generic() {
        assert_eq!(phrase_type("0 u16 retrieve-from"), "(''S -> ''S 'T)");
    }

    // ---- composer unit cases -----------------------------------------

    fn effect(
        lv: &str,
        left: Vec<Type>,
        right: Vec<Type>,
    ) -> FuncType {
        FuncType::balanced(Var::row(lv), left, right)
    }

    #[test]
    fn test_compose_left_output_longer() {
        // (S U8 -> S U8 U16 BOOL) . (A BOOL -> A S8) = (S U8 -> S U8 U16 S8)
        let f = effect(
            "S",
            vec![u8()],
            vec![u8(), Type::Base(Base::U16), Type::Base(Base::Bool)],
        );
        let g = effect("A", vec![Type::Base(Base::Bool)], vec![Type::Base(Base::S8)]);
        let mut ctx = Context::new();
        let composed = compose(&f, &g, &mut ctx).unwrap();
        assert_eq!(composed.to_string(), "(''S U8 -> ''S U8 U16 S8)");
    }

    #[test]
    fn test_compose_right_input_longer() {
        // (S U8 -> S U16) . (T BOOL BOOL U16 -> T S8) = (T BOOL BOOL U8 -> T S8)
        let f = effect("S", vec![u8()], vec![Type::Base(Base::U16)]);
        let g = effect(
            "T",
            vec![
                Type::Base(Base::Bool),
                Type::Base(Base::Bool),
                Type::Base(Base::U16),
            ],
            vec![Type::Base(Base::S8)],
        );
        let mut ctx = Context::new();
        let composed = compose(&f, &g, &mut ctx).unwrap();
        assert_eq!(composed.to_string(), "(''T BOOL BOOL U8 -> ''T S8)");
    }

    #[test]
    fn test_compose_mismatch_fails() {
        // (S U8 -> S U16) . (A S8 -> A BOOL) fails: U16 vs S8
        let f = effect("S", vec![u8()], vec![Type::Base(Base::U16)]);
        let g = effect("A", vec![Type::Base(Base::S8)], vec![Type::Base(Base::Bool)]);
        let mut ctx = Context::new();
        let err = compose(&f, &g, &mut ctx).unwrap_err();
        assert!(matches!(err, TypeError::Unification { .. }));
    }

    #[test]
    fn test_compose_equal_middles() {
        // (T U8 -> T U16 S8) . (A U16 S8 -> A BOOL) = (A U8 -> A BOOL)
        let f = effect(
            "T",
            vec![u8()],
            vec![Type::Base(Base::U16), Type::Base(Base::S8)],
        );
        let g = effect(
            "A",
            vec![Type::Base(Base::U16), Type::Base(Base::S8)],
            vec![Type::Base(Base::Bool)],
        );
        let mut ctx = Context::new();
        let composed = compose(&f, &g, &mut ctx).unwrap();
        assert_eq!(composed.to_string(), "(''A U8 -> ''A BOOL)");
    }

    #[test]
    fn test_compose_two_pushes() {
        // (A -> A U8) . (T -> T U8) = (A -> A U8 U8)
        let f = effect("A", vec![], vec![u8()]);
        let g = effect("T", vec![], vec![u8()]);
        let mut ctx = Context::new();
        let composed = compose(&f, &g, &mut ctx).unwrap();
        assert_eq!(composed.to_string(), "(''A -> ''A U8 U8)");
    }

    #[test]
    fn test_compose_composites() {
        // (S A -> S LIST<A>) . (R LIST<U8> -> R LIST<U8>) = (R U8 -> R LIST<U8>)
        let a = Var::value("A");
        let f = effect(
            "S",
            vec![Type::Var(a.clone())],
            vec![Type::list(Type::Var(a.clone()))],
        );
        let g = effect("R", vec![Type::list(u8())], vec![Type::list(u8())]);
        let mut ctx = Context::new();
        let composed = compose(&f, &g, &mut ctx).unwrap();
        assert_eq!(composed.to_string(), "(''R U8 -> ''R LIST<U8>)");
    }

    #[test]
    fn test_compose_composite_name_mismatch_fails() {
        // LIST<'A> cannot meet MAYBE<U8>
        let a = Var::value("A");
        let f = effect(
            "S",
            vec![Type::Var(a.clone())],
            vec![Type::list(Type::Var(a))],
        );
        let g = effect("R", vec![Type::maybe(u8())], vec![Type::Base(Base::Bool)]);
        let mut ctx = Context::new();
        assert!(compose(&f, &g, &mut ctx).is_err());
    }

    // ---- laws --------------------------------------------------------

    #[test]
    fn test_swap_swap_is_identity() {
        let types = check("swap swap").unwrap();
        let func = &types[0];
        assert_eq!(func.left.to_string(), func.right.to_string());
        assert_eq!(func.left.arity(), 2);
    }

    #[test]
    fn test_dup_drop_is_identity() {
        let types = check("dup drop").unwrap();
        let func = &types[0];
        assert_eq!(func.left.to_string(), func.right.to_string());
        assert_eq!(func.left.arity(), 1);
    }

    #[test]
    fn test_quote_eval_is_transparent() {
        assert_eq!(phrase_type("5 [| dup |] eval"), phrase_type("5 dup"));
    }

    #[test]
    fn test_compose_is_associative() {
        assert_eq!(phrase_type("dup +u8 u16"), "(''S U8 -> ''S U16)");
        // Group by hand: (dup +u8) u16 against dup (+u8 u16).
        let mut checker = TypeChecker::new();
        let dup = checker.ctx.instantiate(checker.ctx.lookup("dup").unwrap());
        let add = checker.ctx.instantiate(checker.ctx.lookup("+u8").unwrap());
        let cast = checker.ctx.instantiate(checker.ctx.lookup("u16").unwrap());
        let left_first = {
            let ab = compose(&dup, &add, &mut checker.ctx).unwrap();
            compose(&ab, &cast, &mut checker.ctx).unwrap()
        };

        let mut checker2 = TypeChecker::new();
        let dup2 = checker2.ctx.instantiate(checker2.ctx.lookup("dup").unwrap());
        let add2 = checker2.ctx.instantiate(checker2.ctx.lookup("+u8").unwrap());
        let cast2 = checker2.ctx.instantiate(checker2.ctx.lookup("u16").unwrap());
        let right_first = {
            let bc = compose(&add2, &cast2, &mut checker2.ctx).unwrap();
            compose(&dup2, &bc, &mut checker2.ctx).unwrap()
        };

        assert_eq!(left_first.to_string(), right_first.to_string());
    }

    // ---- definitions -------------------------------------------------

    #[test]
    fn test_definition_and_use() {
        assert_eq!(phrase_type(": square dup *u8 ;\n3 square"), "(''S -> ''S U8)");
    }

    #[test]
    fn test_definition_type_is_registered_generalized() {
        // Two uses at different types must not interfere.
        assert_eq!(
            phrase_type(": twice dup ;\n1 twice drop drop 0 u16 retrieve-from twice"),
            "(''S -> ''S 'T 'T)"
        );
    }

    #[test]
    fn test_self_reference_is_unknown() {
        let err = check(": loop 1 +u8 loop ;").unwrap_err();
        assert!(matches!(err, TypeError::UnknownWord(name) if name == "loop"));
    }

    #[test]
    fn test_duplicate_definition() {
        let err = check(": foo 1 ;\n: foo 2 ;").unwrap_err();
        assert!(matches!(err, TypeError::DuplicateDefinition(_)));
    }

    #[test]
    fn test_shadowing_builtin_is_rejected() {
        let err = check(": dup 1 ;").unwrap_err();
        assert!(matches!(err, TypeError::DuplicateDefinition(_)));
    }

    // ---- errors ------------------------------------------------------

    #[test]
    fn test_unknown_word() {
        let err = check("frobnicate").unwrap_err();
        assert!(matches!(err, TypeError::UnknownWord(name) if name == "frobnicate"));
    }

    #[test]
    fn test_empty_quotation_body() {
        let err = check("[| |]").unwrap_err();
        assert!(matches!(err, TypeError::EmptySequence));
    }

    #[test]
    fn test_width_mismatch() {
        let err = check("1 u16 +u8").unwrap_err();
        assert!(matches!(err, TypeError::Unification { .. }));
    }

    #[test]
    fn test_if_branch_type_mismatch() {
        // Both arms of `if` must produce the same value type.
        let err = check("true 1 u16 2 rot- if").unwrap_err();
        assert!(matches!(err, TypeError::Unification { .. }));
    }

    // ---- final annotation --------------------------------------------

    #[test]
    fn test_nodes_are_monomorphized_by_context() {
        let program = Parser::new("3 identity 5 u16 identity").parse().unwrap();
        let mut checker = TypeChecker::new();
        checker.check_program(&program).unwrap();

        let Phrase::Expr(seq) = &program.phrases[0] else {
            panic!();
        };
        let first_identity = checker.context().node_type(seq.terms[1].id()).unwrap();
        assert_eq!(first_identity.func.to_string(), "(''S U8 -> ''S U8)");
        let second_identity = checker.context().node_type(seq.terms[4].id()).unwrap();
        assert_eq!(second_identity.func.to_string(), "(''S U16 -> ''S U16)");
    }

    #[test]
    fn test_quotation_body_is_narrowed_by_outer_use() {
        // The dup inside the quotation is monomorphized by the outer 42.
        let program = Parser::new("42 [| dup |] eval").parse().unwrap();
        let mut checker = TypeChecker::new();
        checker.check_program(&program).unwrap();

        let Phrase::Expr(seq) = &program.phrases[0] else {
            panic!();
        };
        let Term::Quotation { body, .. } = &seq.terms[1] else {
            panic!();
        };
        let dup_node = checker.context().node_type(body.terms[0].id()).unwrap();
        assert_eq!(dup_node.func.to_string(), "(''S U8 -> ''S U8 U8)");
    }

    #[test]
    fn test_store_invariant_during_inference() {
        // Mid-phrase, no binding may mention its own key.
        let program = Parser::new("1 1 [| dup 100 <=u8 |] [| swap over +u8 |] while")
            .parse()
            .unwrap();
        let Phrase::Expr(seq) = &program.phrases[0] else {
            panic!();
        };
        let mut checker = TypeChecker::new();
        checker.infer_sequence(seq).unwrap();

        for (var, ty) in checker.context().substitutions() {
            let mut free = BTreeSet::new();
            ty.free_vars(&mut free);
            assert!(!free.contains(var), "{} occurs in its own binding", var);
        }
    }

    #[test]
    fn test_row_difference_accumulates_into_output() {
        // Pushing k literals onto the input row yields an output row whose
        // suffix is exactly the input suffix extended by the pushes.
        let types = check("1 2 3 4").unwrap();
        let func = &types[0];
        assert_eq!(func.left.arity(), 0);
        assert_eq!(func.right.arity(), 4);
        assert_eq!(func.left.var, func.right.var);
        assert!(func.right.items.iter().all(|t| *t == u8()));
    }

    #[test]
    fn test_failure_resets_substitution_store() {
        let program = Parser::new("1 u16 +u8").parse().unwrap();
        let mut checker = TypeChecker::new();
        assert!(checker.check_program(&program).is_err());
        assert!(checker.context().substitutions().is_empty());
    }
}
