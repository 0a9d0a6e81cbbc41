//! Built-in word signatures for Rill
//!
//! The seed catalog of primitive stack effects. Every scheme here is
//! universally quantified over its variables; the context freshens a copy
//! on each lookup so call sites never share identities.
//!
//! Naming conventions: the first row variable of a scheme is `S`, the
//! second `R`; value generics are `T`, `U`, `A`, `B`, `C`.

use crate::types::{Base, FuncType, Type, Var};
use std::collections::HashMap;

/// Get the stack effect signature for a built-in word.
pub fn builtin_signature(name: &str) -> Option<FuncType> {
    builtin_signatures().remove(name)
}

/// Get all built-in word signatures.
pub fn builtin_signatures() -> HashMap<String, FuncType> {
    let mut sigs = HashMap::new();

    let u8t = || Type::Base(Base::U8);
    let u16t = || Type::Base(Base::U16);
    let boolt = || Type::Base(Base::Bool);

    // Stack shufflers
    {
        // dup :: ''S 'T -> ''S 'T 'T
        let s = Var::row("S");
        let t = Var::value("T");
        sigs.insert(
            "dup".to_string(),
            FuncType::balanced(
                s,
                vec![Type::Var(t.clone())],
                vec![Type::Var(t.clone()), Type::Var(t)],
            ),
        );
    }
    {
        // drop :: ''S 'T -> ''S
        let s = Var::row("S");
        let t = Var::value("T");
        sigs.insert(
            "drop".to_string(),
            FuncType::balanced(s, vec![Type::Var(t)], vec![]),
        );
    }
    {
        // swap :: ''S 'T 'U -> ''S 'U 'T
        let s = Var::row("S");
        let t = Var::value("T");
        let u = Var::value("U");
        sigs.insert(
            "swap".to_string(),
            FuncType::balanced(
                s,
                vec![Type::Var(t.clone()), Type::Var(u.clone())],
                vec![Type::Var(u), Type::Var(t)],
            ),
        );
    }
    {
        // over :: ''S 'T 'U -> ''S 'T 'U 'T
        let s = Var::row("S");
        let t = Var::value("T");
        let u = Var::value("U");
        sigs.insert(
            "over".to_string(),
            FuncType::balanced(
                s,
                vec![Type::Var(t.clone()), Type::Var(u.clone())],
                vec![Type::Var(t.clone()), Type::Var(u), Type::Var(t)],
            ),
        );
    }
    {
        // rot+ :: ''S 'A 'B 'C -> ''S 'C 'A 'B
        let s = Var::row("S");
        let a = Var::value("A");
        let b = Var::value("B");
        let c = Var::value("C");
        sigs.insert(
            "rot+".to_string(),
            FuncType::balanced(
                s,
                vec![Type::Var(a.clone()), Type::Var(b.clone()), Type::Var(c.clone())],
                vec![Type::Var(c), Type::Var(a), Type::Var(b)],
            ),
        );
    }
    {
        // rot- :: ''S 'A 'B 'C -> ''S 'B 'C 'A
        let s = Var::row("S");
        let a = Var::value("A");
        let b = Var::value("B");
        let c = Var::value("C");
        sigs.insert(
            "rot-".to_string(),
            FuncType::balanced(
                s,
                vec![Type::Var(a.clone()), Type::Var(b.clone()), Type::Var(c.clone())],
                vec![Type::Var(b), Type::Var(c), Type::Var(a)],
            ),
        );
    }
    {
        // identity :: ''S 'T -> ''S 'T
        let s = Var::row("S");
        let t = Var::value("T");
        sigs.insert(
            "identity".to_string(),
            FuncType::balanced(s, vec![Type::Var(t.clone())], vec![Type::Var(t)]),
        );
    }

    // Control flow
    {
        // if :: ''S 'T 'T BOOL -> ''S 'T
        let s = Var::row("S");
        let t = Var::value("T");
        sigs.insert(
            "if".to_string(),
            FuncType::balanced(
                s,
                vec![Type::Var(t.clone()), Type::Var(t.clone()), boolt()],
                vec![Type::Var(t)],
            ),
        );
    }
    {
        // indexed-iter :: ''S U8 U8 (''R U8 -> ''R) -> ''S
        // The body's row is independent of the outer stack row.
        let s = Var::row("S");
        let r = Var::row("R");
        let body = FuncType::balanced(r, vec![u8t()], vec![]);
        sigs.insert(
            "indexed-iter".to_string(),
            FuncType::balanced(s, vec![u8t(), u8t(), Type::func(body)], vec![]),
        );
    }
    {
        // while :: ''S (''S -> ''S BOOL) (''S -> ''S) -> ''S
        let s = Var::row("S");
        let cond = FuncType::balanced(s.clone(), vec![], vec![boolt()]);
        let body = FuncType::balanced(s.clone(), vec![], vec![]);
        sigs.insert(
            "while".to_string(),
            FuncType::balanced(s, vec![Type::func(cond), Type::func(body)], vec![]),
        );
    }
    {
        // eval :: ''S (''S -> ''R) -> ''R
        let s = Var::row("S");
        let r = Var::row("R");
        let quote = FuncType::spanning(s.clone(), vec![], r.clone(), vec![]);
        sigs.insert(
            "eval".to_string(),
            FuncType::spanning(s, vec![Type::func(quote)], r, vec![]),
        );
    }

    // Arithmetic and comparisons, 8- and 16-bit families
    for name in ["+u8", "-u8", "*u8", "/u8"] {
        let s = Var::row("S");
        sigs.insert(
            name.to_string(),
            FuncType::balanced(s, vec![u8t(), u8t()], vec![u8t()]),
        );
    }
    for name in ["+u16", "-u16", "*u16", "/u16"] {
        let s = Var::row("S");
        sigs.insert(
            name.to_string(),
            FuncType::balanced(s, vec![u16t(), u16t()], vec![u16t()]),
        );
    }
    for name in [">u8", "<u8", ">=u8", "<=u8", "==u8", "!=u8"] {
        let s = Var::row("S");
        sigs.insert(
            name.to_string(),
            FuncType::balanced(s, vec![u8t(), u8t()], vec![boolt()]),
        );
    }
    for name in [">u16", "<u16", ">=u16", "<=u16", "==u16", "!=u16"] {
        let s = Var::row("S");
        sigs.insert(
            name.to_string(),
            FuncType::balanced(s, vec![u16t(), u16t()], vec![boolt()]),
        );
    }
    for name in ["++u8", "--u8"] {
        let s = Var::row("S");
        sigs.insert(
            name.to_string(),
            FuncType::balanced(s, vec![u8t()], vec![u8t()]),
        );
    }
    for name in ["++u16", "--u16"] {
        let s = Var::row("S");
        sigs.insert(
            name.to_string(),
            FuncType::balanced(s, vec![u16t()], vec![u16t()]),
        );
    }

    // Converters
    {
        // u16 :: ''S U8 -> ''S U16
        let s = Var::row("S");
        sigs.insert(
            "u16".to_string(),
            FuncType::balanced(s, vec![u8t()], vec![u16t()]),
        );
    }

    // Lists
    {
        // empty-list :: ''S -> ''S LIST<'T>
        let s = Var::row("S");
        let t = Var::value("T");
        sigs.insert(
            "empty-list".to_string(),
            FuncType::balanced(s, vec![], vec![Type::list(Type::Var(t))]),
        );
    }
    {
        // add-to-list :: ''S LIST<'T> 'T -> ''S LIST<'T>
        let s = Var::row("S");
        let t = Var::value("T");
        sigs.insert(
            "add-to-list".to_string(),
            FuncType::balanced(
                s,
                vec![Type::list(Type::Var(t.clone())), Type::Var(t.clone())],
                vec![Type::list(Type::Var(t))],
            ),
        );
    }

    // Memory
    {
        // store-at :: ''S 'T U16 -> ''S
        let s = Var::row("S");
        let t = Var::value("T");
        sigs.insert(
            "store-at".to_string(),
            FuncType::balanced(s, vec![Type::Var(t), u16t()], vec![]),
        );
    }
    {
        // retrieve-from :: ''S U16 -> ''S 'T
        let s = Var::row("S");
        let t = Var::value("T");
        sigs.insert(
            "retrieve-from".to_string(),
            FuncType::balanced(s, vec![u16t()], vec![Type::Var(t)]),
        );
    }

    sigs
}
