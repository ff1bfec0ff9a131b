//! Operator codes shared by the anchor finder and the compute graph.

use serde::{Deserialize, Serialize};

/// Operation code for BinaryOp/UnaryOp/CompareOp compute nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OpCode {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Neg,
    Not,
    BitNot,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
    Assign,
    #[default]
    Unknown,
}

impl OpCode {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            OpCode::Lt | OpCode::Gt | OpCode::Le | OpCode::Ge | OpCode::Eq | OpCode::Ne
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OpCode::Add => "+",
            OpCode::Sub => "-",
            OpCode::Mul => "*",
            OpCode::Div => "/",
            OpCode::Mod => "%",
            OpCode::And => "&",
            OpCode::Or => "|",
            OpCode::Xor => "^",
            OpCode::Shl => "<<",
            OpCode::Shr => ">>",
            OpCode::Neg => "neg",
            OpCode::Not => "!",
            OpCode::BitNot => "~",
            OpCode::Lt => "<",
            OpCode::Gt => ">",
            OpCode::Le => "<=",
            OpCode::Ge => ">=",
            OpCode::Eq => "==",
            OpCode::Ne => "!=",
            OpCode::Assign => "=",
            OpCode::Unknown => "?",
        }
    }

    pub fn parse(text: &str) -> OpCode {
        match text {
            "+" | "Add" => OpCode::Add,
            "-" | "Sub" => OpCode::Sub,
            "*" | "Mul" => OpCode::Mul,
            "/" | "Div" => OpCode::Div,
            "%" | "Mod" => OpCode::Mod,
            "&" | "And" => OpCode::And,
            "|" | "Or" => OpCode::Or,
            "^" | "Xor" => OpCode::Xor,
            "<<" | "Shl" => OpCode::Shl,
            ">>" | "Shr" => OpCode::Shr,
            "<" | "Lt" => OpCode::Lt,
            ">" | "Gt" => OpCode::Gt,
            "<=" | "Le" => OpCode::Le,
            ">=" | "Ge" => OpCode::Ge,
            "==" | "Eq" => OpCode::Eq,
            "!=" | "Ne" => OpCode::Ne,
            "=" | "Assign" => OpCode::Assign,
            _ => OpCode::Unknown,
        }
    }
}

impl std::fmt::Display for OpCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        for op in [OpCode::Add, OpCode::Mul, OpCode::Shl, OpCode::Ne, OpCode::Assign] {
            assert_eq!(OpCode::parse(op.as_str()), op);
        }
    }

    #[test]
    fn test_parse_names() {
        assert_eq!(OpCode::parse("Mul"), OpCode::Mul);
        assert_eq!(OpCode::parse("bogus"), OpCode::Unknown);
    }
}
