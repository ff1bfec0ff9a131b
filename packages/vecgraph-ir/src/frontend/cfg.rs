//! Per-function control flow graphs over the AST arena.
//!
//! Blocks hold *statement elements* (expression statements, declarations,
//! returns, branch/loop conditions); control statements appear as block
//! terminators. Successor order is significant: for `if`/`while` the
//! true/taken branch is successor 0.

use serde::{Deserialize, Serialize};

use crate::errors::{Result, VecgraphError};
use crate::frontend::ast::{FuncId, StmtId, StmtKind, TranslationUnit};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockId(pub u32);

impl BlockId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "B{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CfgBlock {
    pub id: BlockId,
    pub elements: Vec<StmtId>,
    /// The branching statement that ends this block (`if`/`while`/`for`/...)
    pub terminator: Option<StmtId>,
    pub succs: Vec<BlockId>,
    pub preds: Vec<BlockId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cfg {
    pub func: FuncId,
    pub blocks: Vec<CfgBlock>,
    pub entry: BlockId,
    pub exit: BlockId,
}

impl Cfg {
    pub fn block(&self, id: BlockId) -> &CfgBlock {
        &self.blocks[id.index()]
    }

    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> + '_ {
        (0..self.blocks.len() as u32).map(BlockId)
    }

    /// Post-order over blocks reachable from the entry.
    pub fn postorder(&self) -> Vec<BlockId> {
        let mut visited = vec![false; self.blocks.len()];
        let mut out = Vec::with_capacity(self.blocks.len());
        // Iterative DFS; the second stack entry marks the post-visit.
        let mut stack = vec![(self.entry, false)];
        while let Some((block, processed)) = stack.pop() {
            if processed {
                out.push(block);
                continue;
            }
            if visited[block.index()] {
                continue;
            }
            visited[block.index()] = true;
            stack.push((block, true));
            for &succ in self.block(block).succs.iter().rev() {
                if !visited[succ.index()] {
                    stack.push((succ, false));
                }
            }
        }
        out
    }

    /// Reverse post-order, the iteration order for forward dataflow.
    pub fn reverse_postorder(&self) -> Vec<BlockId> {
        let mut order = self.postorder();
        order.reverse();
        order
    }

    /// Every statement element in the CFG, block by block.
    pub fn all_elements(&self) -> impl Iterator<Item = StmtId> + '_ {
        self.blocks.iter().flat_map(|b| b.elements.iter().copied())
    }
}

/// Build the CFG of a function body.
pub fn build_cfg(tu: &TranslationUnit, func: FuncId) -> Result<Cfg> {
    let body = tu
        .func(func)
        .body
        .ok_or_else(|| VecgraphError::internal(format!("{} has no body", tu.func(func).name)))?;

    let mut builder = Builder {
        tu,
        blocks: Vec::new(),
        break_targets: Vec::new(),
        continue_targets: Vec::new(),
        exit: BlockId(0),
    };

    let entry = builder.new_block();
    let exit = builder.new_block();
    builder.exit = exit;

    let first = builder.new_block();
    builder.add_edge(entry, first);

    if let Some(end) = builder.lower(body, first) {
        builder.add_edge(end, exit);
    }

    Ok(Cfg {
        func,
        blocks: builder.blocks,
        entry,
        exit,
    })
}

struct Builder<'t> {
    tu: &'t TranslationUnit,
    blocks: Vec<CfgBlock>,
    break_targets: Vec<BlockId>,
    continue_targets: Vec<BlockId>,
    exit: BlockId,
}

impl<'t> Builder<'t> {
    fn new_block(&mut self) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(CfgBlock {
            id,
            elements: Vec::new(),
            terminator: None,
            succs: Vec::new(),
            preds: Vec::new(),
        });
        id
    }

    fn add_edge(&mut self, from: BlockId, to: BlockId) {
        self.blocks[from.index()].succs.push(to);
        self.blocks[to.index()].preds.push(from);
    }

    fn push_element(&mut self, block: BlockId, stmt: StmtId) {
        self.blocks[block.index()].elements.push(stmt);
    }

    /// Lower `stmt` starting in `current`; returns the block where control
    /// continues, or `None` when fallthrough is unreachable.
    fn lower(&mut self, stmt: StmtId, current: BlockId) -> Option<BlockId> {
        match self.tu.stmt(stmt).kind.clone() {
            StmtKind::Compound { stmts } => {
                let mut cursor = current;
                for child in stmts {
                    match self.lower(child, cursor) {
                        Some(next) => cursor = next,
                        None => return None,
                    }
                }
                Some(cursor)
            }
            StmtKind::Return { .. } => {
                self.push_element(current, stmt);
                self.add_edge(current, self.exit);
                None
            }
            StmtKind::Break => {
                if let Some(&target) = self.break_targets.last() {
                    self.add_edge(current, target);
                }
                None
            }
            StmtKind::Continue => {
                if let Some(&target) = self.continue_targets.last() {
                    self.add_edge(current, target);
                }
                None
            }
            StmtKind::Case { .. } => Some(current),
            StmtKind::If {
                cond,
                then_body,
                else_body,
            } => self.lower_if(stmt, cond, then_body, else_body, current),
            StmtKind::While { cond, body } => self.lower_while(stmt, cond, body, current),
            StmtKind::DoWhile { body, cond } => self.lower_do_while(stmt, body, cond, current),
            StmtKind::For {
                init,
                cond,
                inc,
                body,
            } => self.lower_for(stmt, init, cond, inc, body, current),
            StmtKind::Switch { cond, body } => self.lower_switch(stmt, cond, body, current),
            _ => {
                // Plain statement element (expression, declaration, unknown)
                self.push_element(current, stmt);
                Some(current)
            }
        }
    }

    fn lower_if(
        &mut self,
        stmt: StmtId,
        cond: StmtId,
        then_body: StmtId,
        else_body: Option<StmtId>,
        current: BlockId,
    ) -> Option<BlockId> {
        self.push_element(current, cond);
        self.blocks[current.index()].terminator = Some(stmt);

        let then_block = self.new_block();
        self.add_edge(current, then_block);

        match else_body {
            None => {
                let join = self.new_block();
                self.add_edge(current, join);
                if let Some(then_end) = self.lower(then_body, then_block) {
                    self.add_edge(then_end, join);
                }
                Some(join)
            }
            Some(else_body) => {
                let else_block = self.new_block();
                self.add_edge(current, else_block);
                let then_end = self.lower(then_body, then_block);
                let else_end = self.lower(else_body, else_block);
                if then_end.is_none() && else_end.is_none() {
                    return None;
                }
                let join = self.new_block();
                if let Some(end) = then_end {
                    self.add_edge(end, join);
                }
                if let Some(end) = else_end {
                    self.add_edge(end, join);
                }
                Some(join)
            }
        }
    }

    fn lower_while(
        &mut self,
        stmt: StmtId,
        cond: StmtId,
        body: StmtId,
        current: BlockId,
    ) -> Option<BlockId> {
        let cond_block = self.new_block();
        self.add_edge(current, cond_block);
        self.push_element(cond_block, cond);
        self.blocks[cond_block.index()].terminator = Some(stmt);

        let body_block = self.new_block();
        let after_block = self.new_block();
        self.add_edge(cond_block, body_block);
        self.add_edge(cond_block, after_block);

        self.break_targets.push(after_block);
        self.continue_targets.push(cond_block);
        if let Some(body_end) = self.lower(body, body_block) {
            self.add_edge(body_end, cond_block);
        }
        self.break_targets.pop();
        self.continue_targets.pop();

        Some(after_block)
    }

    fn lower_do_while(
        &mut self,
        stmt: StmtId,
        body: StmtId,
        cond: StmtId,
        current: BlockId,
    ) -> Option<BlockId> {
        let body_block = self.new_block();
        self.add_edge(current, body_block);

        let cond_block = self.new_block();
        let after_block = self.new_block();

        self.break_targets.push(after_block);
        self.continue_targets.push(cond_block);
        if let Some(body_end) = self.lower(body, body_block) {
            self.add_edge(body_end, cond_block);
        }
        self.break_targets.pop();
        self.continue_targets.pop();

        self.push_element(cond_block, cond);
        self.blocks[cond_block.index()].terminator = Some(stmt);
        self.add_edge(cond_block, body_block);
        self.add_edge(cond_block, after_block);

        Some(after_block)
    }

    fn lower_for(
        &mut self,
        stmt: StmtId,
        init: Option<StmtId>,
        cond: Option<StmtId>,
        inc: Option<StmtId>,
        body: StmtId,
        current: BlockId,
    ) -> Option<BlockId> {
        if let Some(init) = init {
            self.push_element(current, init);
        }

        let cond_block = self.new_block();
        self.add_edge(current, cond_block);
        if let Some(cond) = cond {
            self.push_element(cond_block, cond);
        }
        self.blocks[cond_block.index()].terminator = Some(stmt);

        let body_block = self.new_block();
        let after_block = self.new_block();
        self.add_edge(cond_block, body_block);
        self.add_edge(cond_block, after_block);

        let latch = match inc {
            Some(_) => self.new_block(),
            None => cond_block,
        };

        self.break_targets.push(after_block);
        self.continue_targets.push(latch);
        let body_end = self.lower(body, body_block);
        self.break_targets.pop();
        self.continue_targets.pop();

        if let Some(inc) = inc {
            self.push_element(latch, inc);
            self.add_edge(latch, cond_block);
            if let Some(end) = body_end {
                self.add_edge(end, latch);
            }
        } else if let Some(end) = body_end {
            self.add_edge(end, cond_block);
        }

        Some(after_block)
    }

    fn lower_switch(
        &mut self,
        stmt: StmtId,
        cond: StmtId,
        body: StmtId,
        current: BlockId,
    ) -> Option<BlockId> {
        self.push_element(current, cond);
        self.blocks[current.index()].terminator = Some(stmt);

        let after_block = self.new_block();
        self.break_targets.push(after_block);

        let StmtKind::Compound { stmts } = self.tu.stmt(body).kind.clone() else {
            self.break_targets.pop();
            self.add_edge(current, after_block);
            return Some(after_block);
        };

        let mut has_default = false;
        let mut cursor: Option<BlockId> = None;
        for child in stmts {
            if let StmtKind::Case { value } = &self.tu.stmt(child).kind {
                has_default |= value.is_none();
                let case_block = self.new_block();
                self.add_edge(current, case_block);
                // C fallthrough from the previous case body
                if let Some(prev_end) = cursor {
                    self.add_edge(prev_end, case_block);
                }
                cursor = Some(case_block);
                continue;
            }
            if let Some(block) = cursor {
                cursor = self.lower(child, block);
            }
        }

        if let Some(end) = cursor {
            self.add_edge(end, after_block);
        }
        if !has_default {
            self.add_edge(current, after_block);
        }
        self.break_targets.pop();

        Some(after_block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::parser::parse_translation_unit;

    fn cfg_for(src: &str, name: &str) -> (TranslationUnit, Cfg) {
        let tu = parse_translation_unit(src, "cfg_test.c").unwrap();
        let func = tu.find_function(name).unwrap();
        let cfg = build_cfg(&tu, func).unwrap();
        (tu, cfg)
    }

    #[test]
    fn test_straight_line_cfg() {
        let (_, cfg) = cfg_for("void f(void) { int a = 1; int b = a; }", "f");
        assert!(!cfg.block(cfg.entry).succs.is_empty());
        assert!(!cfg.block(cfg.exit).preds.is_empty());
        let elements: Vec<_> = cfg.all_elements().collect();
        assert_eq!(elements.len(), 2);
    }

    #[test]
    fn test_edge_mirroring() {
        let (_, cfg) = cfg_for(
            "int f(int x) { if (x > 0) { x = 1; } else { x = 2; } return x; }",
            "f",
        );
        for block in &cfg.blocks {
            for &succ in &block.succs {
                assert!(
                    cfg.block(succ).preds.contains(&block.id),
                    "{} -> {} not mirrored",
                    block.id,
                    succ
                );
            }
        }
    }

    #[test]
    fn test_if_successor_order_true_first() {
        let (tu, cfg) = cfg_for("int f(int x) { if (x > 0) { x = 1; } return x; }", "f");
        let branch = cfg
            .blocks
            .iter()
            .find(|b| b.terminator.is_some())
            .expect("a branch block");
        assert_eq!(branch.succs.len(), 2);
        // Successor 0 is the then-branch: it holds the assignment.
        let then_block = cfg.block(branch.succs[0]);
        assert!(then_block
            .elements
            .iter()
            .any(|&e| tu.text(e).contains("x = 1")));
    }

    #[test]
    fn test_loop_has_back_edge() {
        let (_, cfg) = cfg_for(
            "void f(int n) { for (int i = 0; i < n; ++i) { n = n - 1; } }",
            "f",
        );
        let header = cfg
            .blocks
            .iter()
            .find(|b| b.terminator.is_some())
            .expect("loop header");
        // Header is reachable both from the preheader and the latch.
        assert!(header.preds.len() >= 2);
    }

    #[test]
    fn test_reverse_postorder_starts_at_entry() {
        let (_, cfg) = cfg_for(
            "void f(int n) { while (n > 0) { n = n - 1; } }",
            "f",
        );
        let rpo = cfg.reverse_postorder();
        assert_eq!(rpo[0], cfg.entry);
        assert!(rpo.contains(&cfg.exit));
    }

    #[test]
    fn test_return_connects_to_exit() {
        let (_, cfg) = cfg_for("int f(int x) { if (x) { return 1; } return 0; }", "f");
        assert!(cfg.block(cfg.exit).preds.len() >= 2);
    }

    #[test]
    fn test_switch_cases_fan_out() {
        let (_, cfg) = cfg_for(
            "int f(int x) { int y = 0; switch (x) { case 1: y = 1; break; case 2: y = 2; break; default: y = 3; } return y; }",
            "f",
        );
        let switch_block = cfg
            .blocks
            .iter()
            .find(|b| b.terminator.is_some())
            .expect("switch block");
        assert!(switch_block.succs.len() >= 3);
    }
}
