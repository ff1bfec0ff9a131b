//! ID-keyed AST arena produced by the frontend adapter.
//!
//! Every statement, declaration, function and record type lives in a flat
//! arena owned by the `TranslationUnit`; all cross-references are integer
//! ids, so the analysis layers never hold borrowed AST pointers.

use std::collections::BTreeSet;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::shared::models::{DataTypeInfo, Span};

macro_rules! arena_id {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub struct $name(pub u32);

        impl $name {
            #[inline]
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

arena_id!(StmtId);
arena_id!(VarId);
arena_id!(FuncId);
arena_id!(RecordId);

/// Binary operator spelling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    BitAnd,
    BitOr,
    BitXor,
    LogAnd,
    LogOr,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
    Assign,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
    RemAssign,
    ShlAssign,
    ShrAssign,
    AndAssign,
    OrAssign,
    XorAssign,
}

impl BinOp {
    pub fn from_token(tok: &str) -> Option<BinOp> {
        Some(match tok {
            "+" => BinOp::Add,
            "-" => BinOp::Sub,
            "*" => BinOp::Mul,
            "/" => BinOp::Div,
            "%" => BinOp::Rem,
            "<<" => BinOp::Shl,
            ">>" => BinOp::Shr,
            "&" => BinOp::BitAnd,
            "|" => BinOp::BitOr,
            "^" => BinOp::BitXor,
            "&&" => BinOp::LogAnd,
            "||" => BinOp::LogOr,
            "<" => BinOp::Lt,
            ">" => BinOp::Gt,
            "<=" => BinOp::Le,
            ">=" => BinOp::Ge,
            "==" => BinOp::Eq,
            "!=" => BinOp::Ne,
            "=" => BinOp::Assign,
            "+=" => BinOp::AddAssign,
            "-=" => BinOp::SubAssign,
            "*=" => BinOp::MulAssign,
            "/=" => BinOp::DivAssign,
            "%=" => BinOp::RemAssign,
            "<<=" => BinOp::ShlAssign,
            ">>=" => BinOp::ShrAssign,
            "&=" => BinOp::AndAssign,
            "|=" => BinOp::OrAssign,
            "^=" => BinOp::XorAssign,
            _ => return None,
        })
    }

    /// `=` or any compound assignment
    pub fn is_assignment(self) -> bool {
        self == BinOp::Assign || self.is_compound_assignment()
    }

    pub fn is_compound_assignment(self) -> bool {
        matches!(
            self,
            BinOp::AddAssign
                | BinOp::SubAssign
                | BinOp::MulAssign
                | BinOp::DivAssign
                | BinOp::RemAssign
                | BinOp::ShlAssign
                | BinOp::ShrAssign
                | BinOp::AndAssign
                | BinOp::OrAssign
                | BinOp::XorAssign
        )
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge | BinOp::Eq | BinOp::Ne
        )
    }
}

/// Unary operator spelling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnOp {
    Neg,
    Plus,
    Not,
    BitNot,
    PreInc,
    PostInc,
    PreDec,
    PostDec,
    Deref,
    AddrOf,
}

impl UnOp {
    pub fn is_inc_dec(self) -> bool {
        matches!(
            self,
            UnOp::PreInc | UnOp::PostInc | UnOp::PreDec | UnOp::PostDec
        )
    }

    pub fn is_increment(self) -> bool {
        matches!(self, UnOp::PreInc | UnOp::PostInc)
    }
}

/// Statement/expression shape, one variant per frontend classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StmtKind {
    Compound {
        stmts: Vec<StmtId>,
    },
    /// `T v = init; T w;` — one entry per declarator
    Decl {
        decls: Vec<(VarId, Option<StmtId>)>,
    },
    If {
        cond: StmtId,
        then_body: StmtId,
        else_body: Option<StmtId>,
    },
    Switch {
        cond: StmtId,
        body: StmtId,
    },
    /// `case <value>:` / `default:` label marker inside a switch body
    Case {
        value: Option<String>,
    },
    For {
        init: Option<StmtId>,
        cond: Option<StmtId>,
        inc: Option<StmtId>,
        body: StmtId,
    },
    While {
        cond: StmtId,
        body: StmtId,
    },
    DoWhile {
        body: StmtId,
        cond: StmtId,
    },
    Return {
        value: Option<StmtId>,
    },
    Break,
    Continue,
    Binary {
        op: BinOp,
        lhs: StmtId,
        rhs: StmtId,
    },
    Unary {
        op: UnOp,
        operand: StmtId,
    },
    DeclRef {
        var: VarId,
    },
    IntLiteral {
        value: i64,
    },
    FloatLiteral {
        value: f64,
    },
    ArraySubscript {
        base: StmtId,
        index: StmtId,
    },
    Member {
        base: StmtId,
        field: String,
        arrow: bool,
    },
    Call {
        callee: Option<FuncId>,
        callee_name: String,
        args: Vec<StmtId>,
    },
    Conditional {
        cond: StmtId,
        then_value: StmtId,
        else_value: StmtId,
    },
    Cast {
        target: String,
        operand: StmtId,
    },
    /// `( ... )` — structural, skipped during lowering
    Paren {
        inner: StmtId,
    },
    Unknown {
        description: String,
    },
}

/// One arena slot: shape plus location/ownership metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StmtNode {
    pub id: StmtId,
    pub kind: StmtKind,
    pub parent: Option<StmtId>,
    pub func: Option<FuncId>,
    pub span: Span,
    /// Normalized source text, truncated to 60 chars
    pub text: String,
}

/// A declared variable or formal parameter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VarDeclInfo {
    pub id: VarId,
    pub name: String,
    pub func: Option<FuncId>,
    pub is_param: bool,
    pub param_index: Option<usize>,
    pub type_name: String,
    pub data_type: DataTypeInfo,
    /// Set when the declared type is a known record (struct/union)
    pub record: Option<RecordId>,
    /// The DeclStmt that introduces it, absent for parameters
    pub decl_stmt: Option<StmtId>,
    pub decl_line: u32,
}

/// A struct or union type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordInfo {
    pub id: RecordId,
    pub name: String,
    pub is_union: bool,
    pub fields: Vec<String>,
}

/// A function declaration; `body` is present only for definitions.
///
/// Identity is canonical: the parser keeps exactly one `FuncId` per function
/// name, preferring the declaration that carries a body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FuncInfo {
    pub id: FuncId,
    pub name: String,
    pub params: Vec<VarId>,
    pub body: Option<StmtId>,
    pub return_type: DataTypeInfo,
    pub return_type_name: String,
    pub span: Span,
}

impl FuncInfo {
    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }

    pub fn returns_void(&self) -> bool {
        self.return_type_name.trim() == "void"
    }
}

/// File name patterns of vector-intrinsic headers; a prototype-only callee
/// whose name matches the intrinsic prefixes below is attributed to them.
pub const INTRINSIC_HEADER_PATTERNS: &[&str] = &[
    "arm_neon",
    "arm_sve",
    "arm_bf16",
    "arm_fp16",
    "mmintrin",
    "immintrin",
    "avxintrin",
    "avx512",
];

const INTRINSIC_NAME_PREFIXES: &[&str] = &[
    "vld", "vst", "vadd", "vsub", "vmul", "vfma", "vdup", "vget", "vset", "vcvt", "vbfdot",
    "vaddv", "_mm_", "_mm256_", "_mm512_", "svld", "svst", "svadd", "svmul", "svwhilelt",
];

/// A parsed translation unit: the arena plus name-resolution tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationUnit {
    pub file_name: String,
    stmts: Vec<StmtNode>,
    vars: Vec<VarDeclInfo>,
    funcs: Vec<FuncInfo>,
    records: Vec<RecordInfo>,
    func_by_name: FxHashMap<String, FuncId>,
}

impl TranslationUnit {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            stmts: Vec::new(),
            vars: Vec::new(),
            funcs: Vec::new(),
            records: Vec::new(),
            func_by_name: FxHashMap::default(),
        }
    }

    // ------------------------------------------------------------
    // Arena construction (used by the parser)
    // ------------------------------------------------------------

    pub fn add_stmt(&mut self, kind: StmtKind, span: Span, text: String) -> StmtId {
        let id = StmtId(self.stmts.len() as u32);
        self.stmts.push(StmtNode {
            id,
            kind,
            parent: None,
            func: None,
            span,
            text,
        });
        id
    }

    pub fn set_parent(&mut self, stmt: StmtId, parent: StmtId) {
        self.stmts[stmt.index()].parent = Some(parent);
    }

    pub fn set_func(&mut self, stmt: StmtId, func: FuncId) {
        self.stmts[stmt.index()].func = Some(func);
    }

    pub fn add_var(&mut self, var: VarDeclInfo) -> VarId {
        let id = VarId(self.vars.len() as u32);
        let mut var = var;
        var.id = id;
        self.vars.push(var);
        id
    }

    pub fn var_mut(&mut self, id: VarId) -> &mut VarDeclInfo {
        &mut self.vars[id.index()]
    }

    pub fn add_record(&mut self, record: RecordInfo) -> RecordId {
        let id = RecordId(self.records.len() as u32);
        let mut record = record;
        record.id = id;
        self.records.push(record);
        id
    }

    pub fn add_func(&mut self, func: FuncInfo) -> FuncId {
        if let Some(&existing) = self.func_by_name.get(&func.name) {
            // Canonical identity: a later definition fills in the prototype.
            let slot = &mut self.funcs[existing.index()];
            if slot.body.is_none() && func.body.is_some() {
                let mut func = func;
                func.id = existing;
                *slot = func;
            }
            return existing;
        }
        let id = FuncId(self.funcs.len() as u32);
        let mut func = func;
        func.id = id;
        self.func_by_name.insert(func.name.clone(), id);
        self.funcs.push(func);
        id
    }

    // ------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------

    pub fn stmt(&self, id: StmtId) -> &StmtNode {
        &self.stmts[id.index()]
    }

    pub fn var(&self, id: VarId) -> &VarDeclInfo {
        &self.vars[id.index()]
    }

    pub fn func(&self, id: FuncId) -> &FuncInfo {
        &self.funcs[id.index()]
    }

    pub fn record(&self, id: RecordId) -> &RecordInfo {
        &self.records[id.index()]
    }

    pub fn stmt_count(&self) -> usize {
        self.stmts.len()
    }

    pub fn functions(&self) -> impl Iterator<Item = &FuncInfo> {
        self.funcs.iter()
    }

    /// Functions with a body, in declaration order
    pub fn user_functions(&self) -> impl Iterator<Item = &FuncInfo> {
        self.funcs.iter().filter(|f| f.body.is_some())
    }

    pub fn find_function(&self, name: &str) -> Option<FuncId> {
        self.func_by_name.get(name).copied()
    }

    pub fn parent(&self, stmt: StmtId) -> Option<StmtId> {
        self.stmts[stmt.index()].parent
    }

    pub fn line(&self, stmt: StmtId) -> u32 {
        self.stmts[stmt.index()].span.start_line
    }

    pub fn column(&self, stmt: StmtId) -> u32 {
        self.stmts[stmt.index()].span.start_col
    }

    pub fn end_line(&self, stmt: StmtId) -> u32 {
        self.stmts[stmt.index()].span.end_line
    }

    pub fn text(&self, stmt: StmtId) -> &str {
        &self.stmts[stmt.index()].text
    }

    pub fn containing_function(&self, stmt: StmtId) -> Option<FuncId> {
        self.stmts[stmt.index()].func
    }

    /// Strip parenthesized wrappers, the analogue of `IgnoreParenImpCasts`.
    pub fn skip_parens(&self, mut stmt: StmtId) -> StmtId {
        while let StmtKind::Paren { inner } = self.stmt(stmt).kind {
            stmt = inner;
        }
        stmt
    }

    /// Direct children of a statement, in source order.
    pub fn children(&self, stmt: StmtId) -> Vec<StmtId> {
        match &self.stmt(stmt).kind {
            StmtKind::Compound { stmts } => stmts.clone(),
            StmtKind::Decl { decls } => decls.iter().filter_map(|(_, init)| *init).collect(),
            StmtKind::If {
                cond,
                then_body,
                else_body,
            } => {
                let mut out = vec![*cond, *then_body];
                if let Some(e) = else_body {
                    out.push(*e);
                }
                out
            }
            StmtKind::Switch { cond, body } => vec![*cond, *body],
            StmtKind::Case { .. } | StmtKind::Break | StmtKind::Continue => Vec::new(),
            StmtKind::For {
                init,
                cond,
                inc,
                body,
            } => {
                let mut out = Vec::new();
                out.extend(init.iter().copied());
                out.extend(cond.iter().copied());
                out.extend(inc.iter().copied());
                out.push(*body);
                out
            }
            StmtKind::While { cond, body } => vec![*cond, *body],
            StmtKind::DoWhile { body, cond } => vec![*body, *cond],
            StmtKind::Return { value } => value.iter().copied().collect(),
            StmtKind::Binary { lhs, rhs, .. } => vec![*lhs, *rhs],
            StmtKind::Unary { operand, .. } => vec![*operand],
            StmtKind::DeclRef { .. }
            | StmtKind::IntLiteral { .. }
            | StmtKind::FloatLiteral { .. }
            | StmtKind::Unknown { .. } => Vec::new(),
            StmtKind::ArraySubscript { base, index } => vec![*base, *index],
            StmtKind::Member { base, .. } => vec![*base],
            StmtKind::Call { args, .. } => args.clone(),
            StmtKind::Conditional {
                cond,
                then_value,
                else_value,
            } => vec![*cond, *then_value, *else_value],
            StmtKind::Cast { operand, .. } => vec![*operand],
            StmtKind::Paren { inner } => vec![*inner],
        }
    }

    /// Preorder walk of a subtree, root included.
    pub fn collect_stmts(&self, root: StmtId) -> Vec<StmtId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(s) = stack.pop() {
            out.push(s);
            let mut kids = self.children(s);
            kids.reverse();
            stack.extend(kids);
        }
        out
    }

    /// All `DeclRef` statements inside a subtree, in preorder.
    pub fn collect_var_refs(&self, root: StmtId) -> Vec<StmtId> {
        self.collect_stmts(root)
            .into_iter()
            .filter(|&s| matches!(self.stmt(s).kind, StmtKind::DeclRef { .. }))
            .collect()
    }

    /// All `Member` statements inside a subtree, in preorder.
    pub fn collect_member_refs(&self, root: StmtId) -> Vec<StmtId> {
        self.collect_stmts(root)
            .into_iter()
            .filter(|&s| matches!(self.stmt(s).kind, StmtKind::Member { .. }))
            .collect()
    }

    /// Variable names referenced anywhere inside a subtree.
    pub fn collect_var_names(&self, root: StmtId) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        for s in self.collect_var_refs(root) {
            if let StmtKind::DeclRef { var } = self.stmt(s).kind {
                names.insert(self.var(var).name.clone());
            }
        }
        names
    }

    /// Walk parents up to the first enclosing compound statement; returns the
    /// compound plus the direct child of it that contains `stmt`.
    pub fn enclosing_compound(&self, stmt: StmtId) -> Option<(StmtId, StmtId)> {
        let mut direct_child = stmt;
        let mut cursor = self.parent(stmt)?;
        loop {
            if matches!(self.stmt(cursor).kind, StmtKind::Compound { .. }) {
                return Some((cursor, direct_child));
            }
            direct_child = cursor;
            cursor = self.parent(cursor)?;
        }
    }

    // ------------------------------------------------------------
    // GEN/USE extraction (reaching-definition rules)
    // ------------------------------------------------------------

    /// LHS variable of an assignment (plain or compound), if it is a DeclRef.
    pub fn assignment_target(&self, stmt: StmtId) -> Option<VarId> {
        if let StmtKind::Binary { op, lhs, .. } = self.stmt(stmt).kind {
            if op.is_assignment() {
                if let StmtKind::DeclRef { var } = self.stmt(self.skip_parens(lhs)).kind {
                    return Some(var);
                }
            }
        }
        None
    }

    /// Operand variable of a `++`/`--`, if it is a DeclRef.
    pub fn inc_dec_target(&self, stmt: StmtId) -> Option<VarId> {
        if let StmtKind::Unary { op, operand } = self.stmt(stmt).kind {
            if op.is_inc_dec() {
                if let StmtKind::DeclRef { var } = self.stmt(self.skip_parens(operand)).kind {
                    return Some(var);
                }
            }
        }
        None
    }

    /// Variables assigned by a statement (the GEN set).
    pub fn defined_vars(&self, stmt: StmtId) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        match &self.stmt(stmt).kind {
            StmtKind::Binary { op, .. } if op.is_assignment() => {
                if let Some(var) = self.assignment_target(stmt) {
                    out.insert(self.var(var).name.clone());
                }
            }
            StmtKind::Decl { decls } => {
                for (var, _) in decls {
                    out.insert(self.var(*var).name.clone());
                }
            }
            StmtKind::Unary { op, .. } if op.is_inc_dec() => {
                if let Some(var) = self.inc_dec_target(stmt) {
                    out.insert(self.var(var).name.clone());
                }
            }
            _ => {}
        }
        out
    }

    /// Variables read by a statement (the USE set).
    pub fn used_vars(&self, stmt: StmtId) -> BTreeSet<String> {
        match &self.stmt(stmt).kind {
            StmtKind::Binary { op, lhs, rhs } if op.is_assignment() => {
                let mut out = self.collect_var_names(*rhs);
                if op.is_compound_assignment() {
                    if let StmtKind::DeclRef { var } = self.stmt(self.skip_parens(*lhs)).kind {
                        out.insert(self.var(var).name.clone());
                    }
                }
                out
            }
            StmtKind::Decl { decls } => {
                let mut out = BTreeSet::new();
                for (_, init) in decls {
                    if let Some(init) = init {
                        out.extend(self.collect_var_names(*init));
                    }
                }
                out
            }
            StmtKind::Unary { op, .. } if op.is_inc_dec() => {
                let mut out = BTreeSet::new();
                if let Some(var) = self.inc_dec_target(stmt) {
                    out.insert(self.var(var).name.clone());
                }
                out
            }
            _ => self.collect_var_names(stmt),
        }
    }

    /// Does `stmt` write `var_name` (declaration, assignment or `++`/`--`)?
    pub fn stmt_defines_variable(&self, stmt: StmtId, var_name: &str) -> bool {
        self.defined_vars(stmt).contains(var_name)
    }

    /// Variable declarations written by a statement (forward-trace form).
    pub fn defined_var_decls(&self, stmt: StmtId) -> Vec<VarId> {
        match &self.stmt(stmt).kind {
            StmtKind::Binary { op, .. } if op.is_assignment() => {
                self.assignment_target(stmt).into_iter().collect()
            }
            StmtKind::Decl { decls } => decls.iter().map(|(v, _)| *v).collect(),
            StmtKind::Unary { op, .. } if op.is_inc_dec() => {
                self.inc_dec_target(stmt).into_iter().collect()
            }
            _ => Vec::new(),
        }
    }

    /// True when a callable looks like a vector intrinsic: prototype-only and
    /// named like the exports of the intrinsic headers.
    pub fn is_intrinsic_function(&self, func: FuncId) -> bool {
        let info = self.func(func);
        if info.body.is_some() {
            return false;
        }
        INTRINSIC_NAME_PREFIXES
            .iter()
            .any(|p| info.name.starts_with(p))
    }

    /// Normalize raw source text: single spaces, 60-char cap with ellipsis.
    pub fn normalize_source_text(raw: &str) -> String {
        let mut text = String::with_capacity(raw.len().min(64));
        let mut last_space = false;
        for ch in raw.chars() {
            let ch = if ch == '\n' || ch == '\t' || ch == '\r' { ' ' } else { ch };
            if ch == ' ' {
                if last_space {
                    continue;
                }
                last_space = true;
            } else {
                last_space = false;
            }
            text.push(ch);
        }
        if text.len() > 60 {
            let cut: String = text.chars().take(57).collect();
            format!("{}...", cut)
        } else {
            text
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(tu: &mut TranslationUnit, name: &str) -> VarId {
        tu.add_var(VarDeclInfo {
            id: VarId(0),
            name: name.to_string(),
            func: None,
            is_param: false,
            param_index: None,
            type_name: "int".to_string(),
            data_type: DataTypeInfo::from_type_name("int"),
            record: None,
            decl_stmt: None,
            decl_line: 1,
        })
    }

    fn decl_ref(tu: &mut TranslationUnit, v: VarId) -> StmtId {
        let name = tu.var(v).name.clone();
        tu.add_stmt(StmtKind::DeclRef { var: v }, Span::zero(), name)
    }

    #[test]
    fn test_gen_use_for_compound_assignment() {
        let mut tu = TranslationUnit::new("test.c");
        let sum = var(&mut tu, "sum");
        let x = var(&mut tu, "x");
        let lhs = decl_ref(&mut tu, sum);
        let rhs = decl_ref(&mut tu, x);
        let assign = tu.add_stmt(
            StmtKind::Binary {
                op: BinOp::AddAssign,
                lhs,
                rhs,
            },
            Span::zero(),
            "sum += x".to_string(),
        );

        assert!(tu.defined_vars(assign).contains("sum"));
        let uses = tu.used_vars(assign);
        assert!(uses.contains("x"));
        assert!(uses.contains("sum"));
    }

    #[test]
    fn test_gen_use_for_plain_assignment() {
        let mut tu = TranslationUnit::new("test.c");
        let y = var(&mut tu, "y");
        let x = var(&mut tu, "x");
        let lhs = decl_ref(&mut tu, y);
        let rhs = decl_ref(&mut tu, x);
        let assign = tu.add_stmt(
            StmtKind::Binary {
                op: BinOp::Assign,
                lhs,
                rhs,
            },
            Span::zero(),
            "y = x".to_string(),
        );

        assert!(tu.defined_vars(assign).contains("y"));
        let uses = tu.used_vars(assign);
        assert!(uses.contains("x"));
        assert!(!uses.contains("y"));
    }

    #[test]
    fn test_inc_dec_defines_and_uses_same_var() {
        let mut tu = TranslationUnit::new("test.c");
        let i = var(&mut tu, "i");
        let operand = decl_ref(&mut tu, i);
        let inc = tu.add_stmt(
            StmtKind::Unary {
                op: UnOp::PostInc,
                operand,
            },
            Span::zero(),
            "i++".to_string(),
        );

        assert!(tu.defined_vars(inc).contains("i"));
        assert!(tu.used_vars(inc).contains("i"));
    }

    #[test]
    fn test_skip_parens() {
        let mut tu = TranslationUnit::new("test.c");
        let x = var(&mut tu, "x");
        let inner = decl_ref(&mut tu, x);
        let paren = tu.add_stmt(StmtKind::Paren { inner }, Span::zero(), "(x)".to_string());
        let outer = tu.add_stmt(
            StmtKind::Paren { inner: paren },
            Span::zero(),
            "((x))".to_string(),
        );
        assert_eq!(tu.skip_parens(outer), inner);
    }

    #[test]
    fn test_canonical_function_identity() {
        let mut tu = TranslationUnit::new("test.c");
        let proto = tu.add_func(FuncInfo {
            id: FuncId(0),
            name: "square".to_string(),
            params: vec![],
            body: None,
            return_type: DataTypeInfo::from_type_name("int"),
            return_type_name: "int".to_string(),
            span: Span::zero(),
        });
        let body = tu.add_stmt(
            StmtKind::Compound { stmts: vec![] },
            Span::zero(),
            String::new(),
        );
        let def = tu.add_func(FuncInfo {
            id: FuncId(0),
            name: "square".to_string(),
            params: vec![],
            body: Some(body),
            return_type: DataTypeInfo::from_type_name("int"),
            return_type_name: "int".to_string(),
            span: Span::zero(),
        });
        assert_eq!(proto, def);
        assert!(tu.func(def).has_body());
    }

    #[test]
    fn test_normalize_source_text_truncates() {
        let long = "x".repeat(100);
        let normalized = TranslationUnit::normalize_source_text(&long);
        assert_eq!(normalized.len(), 60);
        assert!(normalized.ends_with("..."));
    }

    #[test]
    fn test_normalize_source_text_collapses_whitespace() {
        let normalized = TranslationUnit::normalize_source_text("a\n\t  b");
        assert_eq!(normalized, "a b");
    }
}
