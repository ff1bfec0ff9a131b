//! Anchor discovery: vectorizable expression roots found inside loops,
//! scored and de-duplicated, used as seeds for compute-graph construction.

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::features::compute_graph::ComputeNodeKind;
use crate::features::cpg::CpgContext;
use crate::frontend::ast::{BinOp, FuncId, StmtId, StmtKind, TranslationUnit, UnOp};
use crate::shared::models::OpCode;

/// Result cap after ranking
const MAX_ANCHORS: usize = 50;

/// A vectorization seed expression
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnchorPoint {
    pub stmt: StmtId,
    pub func: FuncId,
    pub expected_kind: ComputeNodeKind,
    pub op_code: OpCode,
    pub loop_depth: u32,
    pub is_in_loop: bool,
    pub score: i64,
    pub source_text: String,
    pub source_line: u32,
}

impl AnchorPoint {
    pub fn render(&self) -> String {
        let mut out = format!("Anchor[L{} {}", self.source_line, self.expected_kind.as_str());
        if self.op_code != OpCode::Unknown {
            out.push_str(&format!("({})", self.op_code));
        }
        out.push_str(&format!(" depth={} score={}", self.loop_depth, self.score));
        if !self.source_text.is_empty() {
            out.push_str(&format!(" code=\"{}\"", self.source_text));
        }
        out.push(']');
        out
    }
}

pub struct AnchorFinder<'c> {
    cpg: &'c CpgContext,
    min_loop_depth: u32,
    include_non_loop_ops: bool,
}

impl<'c> AnchorFinder<'c> {
    pub fn new(cpg: &'c CpgContext) -> Self {
        Self {
            cpg,
            min_loop_depth: 0,
            include_non_loop_ops: true,
        }
    }

    pub fn set_min_loop_depth(&mut self, depth: u32) {
        self.min_loop_depth = depth;
    }

    pub fn set_include_non_loop_ops(&mut self, include: bool) {
        self.include_non_loop_ops = include;
    }

    pub fn find_all_anchors(&self) -> Vec<AnchorPoint> {
        let mut anchors = Vec::new();
        for func in self.cpg.tu().user_functions() {
            anchors.extend(self.find_anchors_in_function(func.id));
        }
        anchors
    }

    pub fn find_anchors_in_function(&self, func: FuncId) -> Vec<AnchorPoint> {
        let tu = self.cpg.tu();
        let Some(body) = tu.func(func).body else {
            return Vec::new();
        };

        let mut walker = AnchorWalker {
            tu,
            func,
            anchors: Vec::new(),
            loop_depth: 0,
            in_loop_increment: false,
            added: FxHashSet::default(),
        };
        walker.walk(body);

        let mut anchors = walker.anchors;
        for anchor in &mut anchors {
            anchor.score = self.compute_anchor_score(anchor);
        }
        anchors
    }

    /// Two dedup passes (statement identity, then function:line), the
    /// loop-depth filter, score ordering and the result cap.
    pub fn filter_and_rank_anchors(&self, anchors: &[AnchorPoint]) -> Vec<AnchorPoint> {
        let mut seen_stmts: FxHashSet<StmtId> = FxHashSet::default();
        let mut unique: Vec<AnchorPoint> = Vec::new();
        for anchor in anchors {
            if seen_stmts.insert(anchor.stmt) {
                unique.push(anchor.clone());
            }
        }

        let tu = self.cpg.tu();
        let mut seen_locations: FxHashSet<String> = FxHashSet::default();
        let mut filtered: Vec<AnchorPoint> = Vec::new();
        for anchor in unique {
            let location_key = format!("{}:{}", tu.func(anchor.func).name, anchor.source_line);
            if seen_locations.contains(&location_key) {
                continue;
            }
            if anchor.loop_depth < self.min_loop_depth && !self.include_non_loop_ops {
                continue;
            }
            seen_locations.insert(location_key);
            filtered.push(anchor);
        }

        filtered.sort_by(|a, b| b.score.cmp(&a.score));
        if filtered.len() > MAX_ANCHORS {
            debug!(
                from = filtered.len(),
                to = MAX_ANCHORS,
                "limiting anchor count"
            );
            filtered.truncate(MAX_ANCHORS);
        }
        filtered
    }

    pub fn compute_anchor_score(&self, anchor: &AnchorPoint) -> i64 {
        let mut score = anchor.loop_depth as i64 * 100;
        score += match anchor.op_code {
            OpCode::Mul => 80,
            OpCode::Add
            | OpCode::Sub
            | OpCode::Shl
            | OpCode::Shr
            | OpCode::And
            | OpCode::Or
            | OpCode::Xor => 60,
            OpCode::Div | OpCode::Mod => 40,
            _ => 0,
        };
        if anchor.expected_kind == ComputeNodeKind::ArrayAccess {
            score += 70;
        }
        if anchor.expected_kind == ComputeNodeKind::Call {
            score += 50;
        }
        score
    }
}

struct AnchorWalker<'t> {
    tu: &'t TranslationUnit,
    func: FuncId,
    anchors: Vec<AnchorPoint>,
    loop_depth: u32,
    in_loop_increment: bool,
    added: FxHashSet<StmtId>,
}

impl<'t> AnchorWalker<'t> {
    fn walk(&mut self, stmt: StmtId) {
        match self.tu.stmt(stmt).kind.clone() {
            StmtKind::For {
                init,
                cond,
                inc,
                body,
            } => {
                self.loop_depth += 1;
                if let Some(init) = init {
                    self.walk(init);
                }
                if let Some(cond) = cond {
                    self.walk(cond);
                }
                if let Some(inc) = inc {
                    let saved = self.in_loop_increment;
                    self.in_loop_increment = true;
                    self.walk(inc);
                    self.in_loop_increment = saved;
                }
                self.walk(body);
                self.loop_depth -= 1;
            }
            StmtKind::While { cond, body } => {
                self.loop_depth += 1;
                self.walk(cond);
                self.walk(body);
                self.loop_depth -= 1;
            }
            StmtKind::DoWhile { body, cond } => {
                self.loop_depth += 1;
                self.walk(body);
                self.walk(cond);
                self.loop_depth -= 1;
            }
            StmtKind::Binary { .. } => {
                self.visit_binary(stmt);
                for child in self.tu.children(stmt) {
                    self.walk(child);
                }
            }
            _ => {
                for child in self.tu.children(stmt) {
                    self.walk(child);
                }
            }
        }
    }

    fn visit_binary(&mut self, stmt: StmtId) {
        if self.in_loop_increment {
            return;
        }
        let StmtKind::Binary { op, .. } = self.tu.stmt(stmt).kind else {
            return;
        };
        if op == BinOp::Assign {
            self.process_assignment(stmt);
        } else {
            self.process_non_assignment(stmt, op);
        }
    }

    /// Assignment rules: the RHS contains a vectorizable op, or both sides
    /// contain an array access.
    fn process_assignment(&mut self, stmt: StmtId) {
        let StmtKind::Binary { lhs, rhs, .. } = self.tu.stmt(stmt).kind else {
            return;
        };
        let rhs = self.tu.skip_parens(rhs);

        if self.contains_vectorizable_op(rhs) {
            self.add_anchor(stmt, OpCode::Assign);
            self.mark_sub_exprs_added(stmt);
            return;
        }

        if self.contains_array_access(rhs) {
            let lhs = self.tu.skip_parens(lhs);
            if self.contains_array_access(lhs) {
                self.add_anchor(stmt, OpCode::Assign);
                self.mark_sub_exprs_added(stmt);
            }
        }
    }

    fn process_non_assignment(&mut self, stmt: StmtId, op: BinOp) {
        if self.is_in_loop_condition(stmt) {
            return;
        }
        let in_if_condition = self.is_in_if_condition(stmt);
        if in_if_condition && !op.is_comparison() {
            return;
        }
        if !is_vectorizable_binary(op) {
            return;
        }
        if self.added.contains(&stmt) {
            return;
        }
        if self.is_simple_array_index_expr(stmt) {
            return;
        }
        // Emit only top-level expressions: no vectorizable-binary ancestor.
        if self.has_vectorizable_parent(stmt) {
            return;
        }
        self.add_anchor(stmt, op_code_of(op));
        self.mark_sub_exprs_added(stmt);
    }

    fn add_anchor(&mut self, stmt: StmtId, op_code: OpCode) {
        if self.added.contains(&stmt) {
            return;
        }
        let expected_kind = if self.contains_array_access(stmt) {
            ComputeNodeKind::ArrayAccess
        } else if self.contains_call(stmt) {
            ComputeNodeKind::Call
        } else {
            ComputeNodeKind::BinaryOp
        };
        self.anchors.push(AnchorPoint {
            stmt,
            func: self.func,
            expected_kind,
            op_code,
            loop_depth: self.loop_depth,
            is_in_loop: self.loop_depth > 0,
            score: 0,
            source_text: self.tu.text(stmt).to_string(),
            source_line: self.tu.line(stmt),
        });
        self.added.insert(stmt);
    }

    fn mark_sub_exprs_added(&mut self, stmt: StmtId) {
        for sub in self.tu.collect_stmts(stmt) {
            self.added.insert(sub);
        }
    }

    // --------------------------------------------------------
    // Position checks
    // --------------------------------------------------------

    fn is_descendant_of(&self, stmt: StmtId, ancestor: StmtId) -> bool {
        self.tu.collect_stmts(ancestor).contains(&stmt)
    }

    fn is_in_loop_condition(&self, stmt: StmtId) -> bool {
        let mut cursor = self.tu.parent(stmt);
        while let Some(parent) = cursor {
            match &self.tu.stmt(parent).kind {
                StmtKind::For { cond: Some(c), .. }
                | StmtKind::While { cond: c, .. }
                | StmtKind::DoWhile { cond: c, .. } => {
                    if self.is_descendant_of(stmt, *c) {
                        return true;
                    }
                }
                _ => {}
            }
            cursor = self.tu.parent(parent);
        }
        false
    }

    fn is_in_if_condition(&self, stmt: StmtId) -> bool {
        let mut cursor = self.tu.parent(stmt);
        while let Some(parent) = cursor {
            if let StmtKind::If { cond, .. } = &self.tu.stmt(parent).kind {
                if self.is_descendant_of(stmt, *cond) {
                    return true;
                }
            }
            cursor = self.tu.parent(parent);
        }
        false
    }

    fn is_in_array_subscript(&self, stmt: StmtId) -> bool {
        let mut cursor = self.tu.parent(stmt);
        while let Some(parent) = cursor {
            if let StmtKind::ArraySubscript { index, .. } = &self.tu.stmt(parent).kind {
                if self.is_descendant_of(stmt, *index) {
                    return true;
                }
            }
            cursor = self.tu.parent(parent);
        }
        false
    }

    /// An index sub-expression with at most one inner operation is part of
    /// the addressing, not an anchor.
    fn is_simple_array_index_expr(&self, stmt: StmtId) -> bool {
        if !self.is_in_array_subscript(stmt) {
            return false;
        }
        self.count_operations(stmt) <= 1
    }

    fn has_vectorizable_parent(&self, stmt: StmtId) -> bool {
        let mut cursor = self.tu.parent(stmt);
        // Parens are transparent when looking for the structural parent.
        while let Some(parent) = cursor {
            match &self.tu.stmt(parent).kind {
                StmtKind::Paren { .. } => cursor = self.tu.parent(parent),
                StmtKind::Binary { op, .. } => return is_vectorizable_binary(*op),
                _ => return false,
            }
        }
        false
    }

    // --------------------------------------------------------
    // Operation checks
    // --------------------------------------------------------

    fn count_operations(&self, stmt: StmtId) -> usize {
        self.tu
            .collect_stmts(stmt)
            .into_iter()
            .filter(|&s| matches!(self.tu.stmt(s).kind, StmtKind::Binary { .. }))
            .count()
    }

    fn contains_array_access(&self, stmt: StmtId) -> bool {
        self.tu
            .collect_stmts(stmt)
            .into_iter()
            .any(|s| matches!(self.tu.stmt(s).kind, StmtKind::ArraySubscript { .. }))
    }

    fn contains_call(&self, stmt: StmtId) -> bool {
        self.tu
            .collect_stmts(stmt)
            .into_iter()
            .any(|s| matches!(self.tu.stmt(s).kind, StmtKind::Call { .. }))
    }

    fn contains_vectorizable_op(&self, stmt: StmtId) -> bool {
        self.tu.collect_stmts(stmt).into_iter().any(|s| {
            match &self.tu.stmt(s).kind {
                StmtKind::Binary { op, .. } => is_vectorizable_binary(*op),
                StmtKind::Unary { op, .. } => {
                    matches!(op, UnOp::Neg | UnOp::Not | UnOp::BitNot)
                }
                _ => false,
            }
        })
    }
}

/// Arithmetic, bitwise, shift, comparison, and compound-assignment binary
/// operators qualify; plain assignment and the logical connectives do not.
fn is_vectorizable_binary(op: BinOp) -> bool {
    matches!(
        op,
        BinOp::Add
            | BinOp::Sub
            | BinOp::Mul
            | BinOp::Div
            | BinOp::Rem
            | BinOp::Shl
            | BinOp::Shr
            | BinOp::BitAnd
            | BinOp::BitOr
            | BinOp::BitXor
            | BinOp::Lt
            | BinOp::Gt
            | BinOp::Le
            | BinOp::Ge
            | BinOp::Eq
            | BinOp::Ne
            | BinOp::AddAssign
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

/// Map a binary operator to its anchor opcode (compound assignments fold to
/// their base operation).
pub fn op_code_of(op: BinOp) -> OpCode {
    match op {
        BinOp::Add | BinOp::AddAssign => OpCode::Add,
        BinOp::Sub | BinOp::SubAssign => OpCode::Sub,
        BinOp::Mul | BinOp::MulAssign => OpCode::Mul,
        BinOp::Div | BinOp::DivAssign => OpCode::Div,
        BinOp::Rem | BinOp::RemAssign => OpCode::Mod,
        BinOp::Shl | BinOp::ShlAssign => OpCode::Shl,
        BinOp::Shr | BinOp::ShrAssign => OpCode::Shr,
        BinOp::BitAnd | BinOp::AndAssign => OpCode::And,
        BinOp::BitOr | BinOp::OrAssign => OpCode::Or,
        BinOp::BitXor | BinOp::XorAssign => OpCode::Xor,
        BinOp::Lt => OpCode::Lt,
        BinOp::Gt => OpCode::Gt,
        BinOp::Le => OpCode::Le,
        BinOp::Ge => OpCode::Ge,
        BinOp::Eq => OpCode::Eq,
        BinOp::Ne => OpCode::Ne,
        BinOp::Assign => OpCode::Assign,
        _ => OpCode::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::parser::parse_translation_unit;

    fn anchors_for(src: &str) -> (CpgContext, Vec<AnchorPoint>) {
        let tu = parse_translation_unit(src, "anchor_test.c").unwrap();
        let ctx = CpgContext::build_full(tu);
        let finder = AnchorFinder::new(&ctx);
        let raw = finder.find_all_anchors();
        let ranked = finder.filter_and_rank_anchors(&raw);
        (ctx, ranked)
    }

    #[test]
    fn test_accumulator_anchor_score() {
        let src = "\
float dot(const float *a, const float *b, int n) {
    float sum = 0.0f;
    for (int i = 0; i < n; ++i) {
        sum += a[i] * b[i];
    }
    return sum;
}
";
        let (_, anchors) = anchors_for(src);
        assert!(!anchors.is_empty());
        let top = &anchors[0];
        assert_eq!(top.source_line, 4);
        assert_eq!(top.loop_depth, 1);
        assert_eq!(top.op_code, OpCode::Add, "+= folds to Add");
        assert_eq!(top.expected_kind, ComputeNodeKind::ArrayAccess);
        assert_eq!(top.score, 230, "100*depth + 60 for += + 70 for arrays");
    }

    #[test]
    fn test_inner_expression_is_covered() {
        let src = "\
void f(float *out, const float *a, const float *b, int n) {
    for (int i = 0; i < n; ++i) {
        out[i] = a[i] * b[i] + 1.0f;
    }
}
";
        let (ctx, anchors) = anchors_for(src);
        // One anchor for the whole assignment; the inner mul/add are covered.
        let line3: Vec<_> = anchors.iter().filter(|a| a.source_line == 3).collect();
        assert_eq!(line3.len(), 1);
        assert_eq!(line3[0].op_code, OpCode::Assign);
        assert!(ctx.tu().text(line3[0].stmt).starts_with("out[i]"));
    }

    #[test]
    fn test_loop_increment_not_an_anchor() {
        let src = "\
void f(int *a, int n) {
    for (int i = 0; i < n; i += 2) {
        a[i] = 0;
    }
}
";
        let (ctx, anchors) = anchors_for(src);
        assert!(anchors
            .iter()
            .all(|a| !ctx.tu().text(a.stmt).contains("i += 2")));
    }

    #[test]
    fn test_loop_condition_not_an_anchor() {
        let src = "\
void f(int *a, int n) {
    for (int i = 0; i < n * 2; ++i) {
        a[i] = a[i] + 1;
    }
}
";
        let (ctx, anchors) = anchors_for(src);
        assert!(anchors
            .iter()
            .all(|a| !ctx.tu().text(a.stmt).contains("n * 2")));
    }

    #[test]
    fn test_comparison_in_if_condition_allowed() {
        let src = "\
void f(int *a, int n) {
    for (int i = 0; i < n; ++i) {
        if (a[i] == 0) {
            a[i] = 1;
        }
    }
}
";
        let (_, anchors) = anchors_for(src);
        assert!(anchors.iter().any(|a| a.op_code == OpCode::Eq));
    }

    #[test]
    fn test_nested_loop_depth_scoring() {
        let src = "\
void mm(float *c, const float *a, const float *b, int n) {
    for (int i = 0; i < n; ++i) {
        for (int j = 0; j < n; ++j) {
            c[i * n + j] += a[i * n + j] * b[j * n + i];
        }
    }
}
";
        let (_, anchors) = anchors_for(src);
        let top = &anchors[0];
        assert_eq!(top.loop_depth, 2);
        assert!(top.score >= 200);
    }

    #[test]
    fn test_dedup_by_line() {
        let src = "\
void f(int *a, int *b) {
    a[0] = a[0] + 1; b[0] = b[0] + 1;
}
";
        let (_, anchors) = anchors_for(src);
        // Both assignments share a line; the second is dropped.
        assert_eq!(anchors.iter().filter(|a| a.source_line == 2).count(), 1);
    }

    #[test]
    fn test_anchor_render() {
        let src = "\
void f(int *a, int n) {
    for (int i = 0; i < n; ++i) {
        a[i] = a[i] + 1;
    }
}
";
        let (_, anchors) = anchors_for(src);
        let rendered = anchors[0].render();
        assert!(rendered.contains("depth=1"));
        assert!(rendered.contains("score="));
    }
}
