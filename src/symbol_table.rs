//! Symbol table with destructive-then-restorative shadowing of globals by locals.
//!
//! Every name has exactly one [Symbol] record. When a parameter or a local variable reuses the
//! name of a global (or of a function, enum constant or built-in), the record's active
//! [Binding] is archived into its shadow and overwritten. [SymbolTable::recover_all_locals]
//! restores all archived bindings once the function body ends. Records are never removed:
//! a name first introduced by a local archives an [Class::Unbound] binding, so after the
//! function ends the record is treated as if it didn't exist.

use std::fmt;

use crate::error::SemanticError;
use crate::instruction::OpCode;
use crate::token::{TokenKind, KEYWORDS};

/// Storage class of a symbol.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Class {
    Keyword,
    /// Built-in function implemented by a single instruction. The value is the opcode.
    SystemCall,
    /// The value is the instruction index of the function.
    Function,
    /// The value is an address in the data segment.
    Global,
    /// The value is a slot offset relative to the function's parameters.
    Local,
    /// The value is the constant itself.
    EnumConstant,
    /// The record exists but the name is not in scope.
    Unbound,
}

/// Scalar type of a symbol or an expression.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Type {
    Char,
    Int,
    Pointer,
}

impl Type {
    /// Size of a value of this type in bytes.
    pub fn size(self) -> i64 {
        match self {
            Type::Char => 1,
            Type::Int | Type::Pointer => 8,
        }
    }

    /// The type after applying `levels` pointer declarators.
    pub fn pointer_to(self, levels: usize) -> Type {
        if levels == 0 {
            self
        } else {
            Type::Pointer
        }
    }

    pub fn load(self) -> OpCode {
        match self {
            Type::Char => OpCode::LoadChar,
            _ => OpCode::LoadInt,
        }
    }

    pub fn store(self) -> OpCode {
        match self {
            Type::Char => OpCode::StoreChar,
            _ => OpCode::StoreInt,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Type::Char => write!(f, "char"),
            Type::Int => write!(f, "int"),
            Type::Pointer => write!(f, "pointer"),
        }
    }
}

/// The meaning a name currently has.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Binding {
    pub class: Class,
    pub ty: Type,
    pub value: i64,
    /// Number of elements when the symbol names an array.
    pub array: Option<usize>,
}

impl Binding {
    pub fn new(class: Class, ty: Type, value: i64) -> Binding {
        Binding {
            class,
            ty,
            value,
            array: None,
        }
    }

    pub fn unbound() -> Binding {
        Binding::new(Class::Unbound, Type::Int, 0)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Symbol {
    pub name: String,
    pub hash: u64,
    /// Token kind the name lexes as.
    pub token: TokenKind,
    pub binding: Binding,
    /// The binding archived while a local shadows this name.
    pub shadow: Option<Binding>,
}

impl Symbol {
    pub fn is_bound(&self) -> bool {
        self.binding.class != Class::Unbound
    }
}

#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub struct SymbolId(usize);

/// Computes the lookup hash of a name.
pub fn hash_name(name: &str) -> u64 {
    let hash = name
        .chars()
        .fold(0u64, |hash, ch| hash.wrapping_mul(147).wrapping_add(ch as u64));

    (hash << 6).wrapping_add(name.len() as u64)
}

const SYSTEM_CALLS: &[(&str, OpCode)] = &[
    ("open", OpCode::Open),
    ("read", OpCode::Read),
    ("close", OpCode::Close),
    ("printf", OpCode::Printf),
    ("malloc", OpCode::Malloc),
    ("free", OpCode::Free),
    ("memset", OpCode::Memset),
    ("memcmp", OpCode::Memcmp),
    ("exit", OpCode::Exit),
];

#[derive(Debug, Clone)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
    /// The symbol most recently found by [SymbolTable::lookup].
    focus: Option<usize>,
}

impl Default for SymbolTable {
    fn default() -> SymbolTable {
        SymbolTable::new()
    }
}

impl SymbolTable {
    /// Creates a table seeded with the keywords and the built-in functions.
    pub fn new() -> SymbolTable {
        let mut table = SymbolTable {
            symbols: Vec::new(),
            focus: None,
        };

        for (i, (name, token)) in KEYWORDS.iter().enumerate() {
            table.push(name, *token, Binding::new(Class::Keyword, Type::Int, i as i64));
        }

        for (name, opcode) in SYSTEM_CALLS {
            let binding = Binding::new(Class::SystemCall, Type::Int, opcode.code() as i64);
            table.push(name, TokenKind::Id, binding);
        }

        table
    }

    fn push(&mut self, name: &str, token: TokenKind, binding: Binding) -> SymbolId {
        self.symbols.push(Symbol {
            name: name.to_string(),
            hash: hash_name(name),
            token,
            binding,
            shadow: None,
        });

        SymbolId(self.symbols.len() - 1)
    }

    /// Finds the record of `name` without moving the focus.
    pub fn find(&self, name: &str) -> Option<SymbolId> {
        let hash = hash_name(name);

        self.symbols
            .iter()
            .position(|sym| sym.hash == hash && sym.name == name)
            .map(SymbolId)
    }

    /// Finds the record of `name` and focuses it.
    ///
    /// The record is returned even if it is currently [unbound](Class::Unbound).
    pub fn lookup(&mut self, name: &str) -> Option<&Symbol> {
        let id = self.find(name)?;
        self.focus = Some(id.0);
        Some(&self.symbols[id.0])
    }

    /// Finds the symbol `name` if it is in scope.
    pub fn resolve(&self, name: &str) -> Option<SymbolId> {
        self.find(name).filter(|id| self.symbols[id.0].is_bound())
    }

    /// Declares `name`.
    ///
    /// - A new name, or one whose record is unbound, gets the given binding.
    /// - A local declaration over anything other than a local shadows it.
    /// - A redeclaration within the same storage class is an error.
    /// - Otherwise the existing symbol is returned unchanged, the caller decides whether the
    ///   mismatch is acceptable.
    pub fn add_symbol(
        &mut self,
        name: &str,
        token: TokenKind,
        binding: Binding,
    ) -> Result<SymbolId, SemanticError> {
        let id = match self.find(name) {
            Some(id) => id,
            None => {
                let id = self.push(name, token, binding);
                self.focus = Some(id.0);

                if binding.class == Class::Local {
                    self.symbols[id.0].shadow = Some(Binding::unbound());
                }

                return Ok(id);
            }
        };

        self.focus = Some(id.0);
        let existing = self.symbols[id.0].binding.class;

        match (existing, binding.class) {
            (Class::Unbound, Class::Local) => {
                self.hide_global();
                self.symbols[id.0].binding = binding;
            }
            (Class::Unbound, _) => {
                self.symbols[id.0].binding = binding;
            }
            (Class::Local, Class::Local) => return Err(SemanticError::Duplicate(name.to_string())),
            (Class::Keyword, _) => (),
            (_, Class::Local) => {
                self.hide_global();
                self.symbols[id.0].binding = binding;
            }
            (old, new) if old == new => return Err(SemanticError::Duplicate(name.to_string())),
            _ => (),
        }

        Ok(id)
    }

    /// Archives the active binding of the focused symbol without changing it.
    pub fn hide_global(&mut self) {
        if let Some(index) = self.focus {
            let sym = &mut self.symbols[index];
            sym.shadow = Some(sym.binding);
        }
    }

    /// Restores every local that has an archived binding.
    pub fn recover_all_locals(&mut self) {
        for sym in &mut self.symbols {
            if sym.binding.class != Class::Local {
                continue;
            }

            if let Some(shadow) = sym.shadow.take() {
                sym.binding = shadow;
            }
        }
    }

    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.0]
    }

    pub fn symbol_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.symbols[id.0]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Finds the bound name closest to `name`, for "did you mean" hints.
    pub fn suggest(&self, name: &str) -> Option<String> {
        self.symbols
            .iter()
            .filter(|sym| sym.is_bound() && sym.binding.class != Class::Keyword)
            .map(|sym| (edit_distance::edit_distance(name, &sym.name), sym))
            .filter(|(distance, _)| *distance <= 2)
            .min_by_key(|(distance, _)| *distance)
            .map(|(_, sym)| sym.name.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn global(value: i64) -> Binding {
        Binding::new(Class::Global, Type::Int, value)
    }

    fn local(ty: Type, value: i64) -> Binding {
        Binding::new(Class::Local, ty, value)
    }

    #[test]
    fn test_hash() {
        assert_eq!(hash_name(""), 0);
        assert_eq!(hash_name("a"), (97 << 6) + 1);
        assert_eq!(hash_name("ab"), ((97 * 147 + 98) << 6) + 2);
    }

    #[test]
    fn test_seeded_symbols() {
        let mut table = SymbolTable::new();

        let printf = table.lookup("printf").unwrap();
        assert_eq!(printf.binding.class, Class::SystemCall);
        assert_eq!(printf.binding.value, OpCode::Printf.code() as i64);

        assert_eq!(table.lookup("while").unwrap().token, TokenKind::While);
        assert!(table.lookup("main").is_none());
    }

    #[test]
    fn test_keyword_records_match_lexer() {
        let table = SymbolTable::new();
        let keywords: Vec<_> = table
            .iter()
            .filter(|sym| sym.binding.class == Class::Keyword)
            .collect();

        assert_eq!(keywords.len(), KEYWORDS.len());

        for sym in keywords {
            assert_eq!(crate::token::keyword(&sym.name), Some(sym.token));
        }
    }

    #[test]
    fn test_local_shadows_global() {
        let mut table = SymbolTable::new();

        let id = table.add_symbol("a1", TokenKind::Id, global(16)).unwrap();
        let same = table.add_symbol("a1", TokenKind::Id, local(Type::Char, 2)).unwrap();
        assert_eq!(id, same);

        let sym = table.symbol(id);
        assert_eq!(sym.binding, local(Type::Char, 2));
        assert_eq!(sym.shadow, Some(global(16)));

        table.recover_all_locals();

        let sym = table.symbol(id);
        assert_eq!(sym.binding, global(16));
        assert_eq!(sym.shadow, None);
    }

    #[test]
    fn test_fresh_local_becomes_unbound() {
        let mut table = SymbolTable::new();

        let id = table.add_symbol("tmp", TokenKind::Id, local(Type::Int, -1)).unwrap();
        assert_eq!(table.resolve("tmp"), Some(id));

        table.recover_all_locals();
        assert_eq!(table.resolve("tmp"), None);
        assert!(table.find("tmp").is_some());

        // The record is reused by a later function.
        let again = table.add_symbol("tmp", TokenKind::Id, local(Type::Int, -2)).unwrap();
        assert_eq!(again, id);
        assert_eq!(table.symbol(id).binding.value, -2);

        table.recover_all_locals();

        // And by a later global.
        table.add_symbol("tmp", TokenKind::Id, global(8)).unwrap();
        assert_eq!(table.symbol(id).binding, global(8));
    }

    #[test]
    fn test_duplicates() {
        let mut table = SymbolTable::new();

        table.add_symbol("x", TokenKind::Id, global(0)).unwrap();
        assert_eq!(
            table.add_symbol("x", TokenKind::Id, global(8)),
            Err(SemanticError::Duplicate("x".to_string()))
        );

        table.add_symbol("x", TokenKind::Id, local(Type::Int, 1)).unwrap();
        assert_eq!(
            table.add_symbol("x", TokenKind::Id, local(Type::Int, 2)),
            Err(SemanticError::Duplicate("x".to_string()))
        );
    }

    #[test]
    fn test_mismatched_class_returns_existing() {
        let mut table = SymbolTable::new();

        let id = table.add_symbol("f", TokenKind::Id, Binding::new(Class::Function, Type::Int, 3)).unwrap();
        let other = table.add_symbol("f", TokenKind::Id, global(0)).unwrap();

        assert_eq!(id, other);
        assert_eq!(table.symbol(id).binding.class, Class::Function);
    }

    #[test]
    fn test_hide_global() {
        let mut table = SymbolTable::new();
        let id = table.add_symbol("g", TokenKind::Id, global(24)).unwrap();

        table.lookup("g");
        table.hide_global();
        assert_eq!(table.symbol(id).shadow, Some(global(24)));
        assert_eq!(table.symbol(id).binding, global(24));
    }

    #[test]
    fn test_suggest() {
        let mut table = SymbolTable::new();
        table.add_symbol("counter", TokenKind::Id, global(0)).unwrap();

        assert_eq!(table.suggest("countr"), Some("counter".to_string()));
        assert_eq!(table.suggest("prinf"), Some("printf".to_string()));
        assert_eq!(table.suggest("zzzzzz"), None);
    }
}
