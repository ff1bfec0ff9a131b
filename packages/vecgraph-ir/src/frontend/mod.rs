//! Frontend adapter: parsing, the AST arena, and per-function CFGs.
//!
//! Everything downstream of this module works purely on arena ids; no
//! tree-sitter types escape.

pub mod ast;
pub mod cfg;
pub mod parser;

pub use ast::{
    BinOp, FuncId, FuncInfo, RecordId, RecordInfo, StmtId, StmtKind, TranslationUnit, UnOp,
    VarDeclInfo, VarId,
};
pub use cfg::{build_cfg, BlockId, Cfg, CfgBlock};
pub use parser::parse_translation_unit;
