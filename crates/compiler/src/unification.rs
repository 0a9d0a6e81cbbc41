//! Type unification for Rill
//!
//! Two-type unifier producing substitution equations. Unification never
//! allocates fresh variables and never rewrites types itself; it only
//! records `var := type` equations in the [`Context`], which owns
//! normalization, the occur check, and conflict resolution.
//!
//! Row unification is where row polymorphism is resolved: the known
//! suffixes of the two rows are matched topmost-first, and whichever row
//! is shorter has its row variable bound to the longer row's unmatched
//! prefix. That is what lets `(''S U8 -> ''S U8 U8)` compose with
//! `(''R U8 U8 -> ''R U8)`.

use crate::context::Context;
use crate::types::{Row, Type, TypeError};

/// Unify two types, recording equations in `ctx`. Fails when the types
/// cannot be made equal.
pub fn unify(a: &Type, b: &Type, ctx: &mut Context) -> Result<(), TypeError> {
    match (a, b) {
        // A variable on either side registers an equation; everything
        // else (kind guard, occur check, rebinds) happens in add_sub.
        (Type::Var(v), _) => ctx.add_sub(v.clone(), b.clone()),
        (_, Type::Var(v)) => ctx.add_sub(v.clone(), a.clone()),

        (Type::Base(x), Type::Base(y)) => {
            if x == y {
                Ok(())
            } else {
                Err(ctx.unification_error(a, b))
            }
        }

        (
            Type::Composite { name: n1, args: a1 },
            Type::Composite { name: n2, args: a2 },
        ) => {
            if n1 != n2 || a1.len() != a2.len() {
                return Err(ctx.unification_error(a, b));
            }
            for (l, r) in a1.iter().zip(a2) {
                unify(l, r, ctx)?;
            }
            Ok(())
        }

        (Type::Function(f), Type::Function(g)) => {
            unify_rows(&f.left, &g.left, ctx)?;
            unify_rows(&f.right, &g.right, ctx)
        }

        (Type::Row(r1), Type::Row(r2)) => unify_rows(r1, r2, ctx),

        _ => Err(ctx.unification_error(a, b)),
    }
}

/// Unify two rows: match the last `min(n, m)` elements pairwise (topmost
/// aligned), then bind the shorter row's variable to the longer row's
/// unmatched prefix.
pub fn unify_rows(a: &Row, b: &Row, ctx: &mut Context) -> Result<(), TypeError> {
    let n = a.items.len();
    let m = b.items.len();
    let k = n.min(m);

    for i in 0..k {
        unify(&a.items[n - 1 - i], &b.items[m - 1 - i], ctx)?;
    }

    if n <= m {
        ctx.add_sub(
            a.var.clone(),
            Type::Row(Row::new(b.var.clone(), b.items[..m - k].to_vec())),
        )
    } else {
        ctx.add_sub(
            b.var.clone(),
            Type::Row(Row::new(a.var.clone(), a.items[..n - k].to_vec())),
        )
    }
}
