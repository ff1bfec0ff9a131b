//! tree-sitter frontend: lowers the C concrete syntax tree into the
//! ID-keyed AST arena consumed by the analysis layers.

use rustc_hash::FxHashMap;
use tree_sitter::{Node, Parser};

use crate::errors::{Result, VecgraphError};
use crate::frontend::ast::{
    BinOp, FuncId, FuncInfo, RecordId, RecordInfo, StmtId, StmtKind, TranslationUnit, UnOp,
    VarDeclInfo, VarId,
};
use crate::shared::models::{DataTypeInfo, Span};

/// Parse a C translation unit into the AST arena.
pub fn parse_translation_unit(source: &str, file_name: &str) -> Result<TranslationUnit> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_c::language())
        .map_err(|e| VecgraphError::parse_error(format!("failed to set language: {e}")))?;

    let tree = parser
        .parse(source, None)
        .ok_or_else(|| VecgraphError::parse_error("tree-sitter returned no tree"))?;

    let root = tree.root_node();
    if root.has_error() {
        return Err(VecgraphError::parse_error(format!(
            "{file_name}: syntax error in input"
        )));
    }

    let mut lowering = Lowering::new(source, file_name);
    lowering.register_records(root);
    lowering.register_function_signatures(root);
    lowering.lower_function_bodies(root);
    Ok(lowering.tu)
}

struct Lowering<'s> {
    src: &'s str,
    tu: TranslationUnit,
    /// Lexical scopes, innermost last
    scopes: Vec<FxHashMap<String, VarId>>,
    /// Fallback for identifiers with no visible declaration (globals)
    globals: FxHashMap<String, VarId>,
    records_by_name: FxHashMap<String, RecordId>,
    current_func: Option<FuncId>,
}

impl<'s> Lowering<'s> {
    fn new(src: &'s str, file_name: &str) -> Self {
        Self {
            src,
            tu: TranslationUnit::new(file_name),
            scopes: Vec::new(),
            globals: FxHashMap::default(),
            records_by_name: FxHashMap::default(),
            current_func: None,
        }
    }

    // ------------------------------------------------------------
    // Source helpers
    // ------------------------------------------------------------

    fn raw_text(&self, node: Node) -> &'s str {
        node.utf8_text(self.src.as_bytes()).unwrap_or("")
    }

    fn span(&self, node: Node) -> Span {
        Span::new(
            node.start_position().row as u32 + 1,
            node.start_position().column as u32 + 1,
            node.end_position().row as u32 + 1,
            node.end_position().column as u32 + 1,
        )
    }

    fn text(&self, node: Node) -> String {
        TranslationUnit::normalize_source_text(self.raw_text(node))
    }

    fn named_children<'t>(&self, node: Node<'t>) -> Vec<Node<'t>> {
        let mut cursor = node.walk();
        let out: Vec<Node<'t>> = node
            .named_children(&mut cursor)
            .filter(|c| c.kind() != "comment")
            .collect();
        out
    }

    // ------------------------------------------------------------
    // Records
    // ------------------------------------------------------------

    fn register_records(&mut self, root: Node) {
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            let kind = node.kind();
            if (kind == "union_specifier" || kind == "struct_specifier")
                && node.child_by_field_name("body").is_some()
            {
                self.register_record(node, kind == "union_specifier");
            }
            for child in self.named_children(node) {
                stack.push(child);
            }
        }
    }

    fn register_record(&mut self, node: Node, is_union: bool) -> RecordId {
        let name = node
            .child_by_field_name("name")
            .map(|n| self.raw_text(n).to_string())
            .unwrap_or_default();

        if !name.is_empty() {
            if let Some(&id) = self.records_by_name.get(&name) {
                return id;
            }
        }

        let mut fields = Vec::new();
        if let Some(body) = node.child_by_field_name("body") {
            for field in self.named_children(body) {
                if field.kind() != "field_declaration" {
                    continue;
                }
                let mut stack = vec![field];
                while let Some(n) = stack.pop() {
                    if n.kind() == "field_identifier" {
                        fields.push(self.raw_text(n).to_string());
                        continue;
                    }
                    let mut kids = self.named_children(n);
                    kids.reverse();
                    for c in kids {
                        if c.kind() != "field_declaration_list" {
                            stack.push(c);
                        }
                    }
                }
            }
        }

        let id = self.tu.add_record(RecordInfo {
            id: RecordId(0),
            name: name.clone(),
            is_union,
            fields,
        });
        if !name.is_empty() {
            self.records_by_name.insert(name, id);
        }
        // typedef alias: `typedef union {...} name_t;`
        if let Some(parent) = node.parent() {
            if parent.kind() == "type_definition" {
                if let Some(alias) = parent.child_by_field_name("declarator") {
                    let alias = self.raw_text(alias).to_string();
                    self.records_by_name.insert(alias, id);
                }
            }
        }
        id
    }

    // ------------------------------------------------------------
    // Functions
    // ------------------------------------------------------------

    fn register_function_signatures(&mut self, root: Node) {
        for node in self.named_children(root) {
            match node.kind() {
                "function_definition" => {
                    self.register_function(node, false);
                }
                "declaration" => {
                    // Prototypes: `int f(int);`
                    if find_descendant(node, "function_declarator").is_some() {
                        self.register_function(node, true);
                    }
                }
                _ => {}
            }
        }
    }

    fn register_function(&mut self, node: Node, prototype_only: bool) -> Option<FuncId> {
        let declarator = find_descendant(node, "function_declarator")?;
        let name_node = declarator_identifier(declarator)?;
        let name = self.raw_text(name_node).to_string();

        let return_type_name = self.return_type_spelling(node);
        let func = FuncInfo {
            id: FuncId(0),
            name,
            params: Vec::new(),
            body: None,
            return_type: DataTypeInfo::from_type_name(&return_type_name),
            return_type_name,
            span: self.span(node),
        };
        let _ = prototype_only;
        Some(self.tu.add_func(func))
    }

    fn return_type_spelling(&self, node: Node) -> String {
        let base = node
            .child_by_field_name("type")
            .map(|n| self.raw_text(n).to_string())
            .unwrap_or_default();
        // A pointer return type wraps the function declarator.
        let stars = match node.child_by_field_name("declarator") {
            Some(d) if d.kind() == "pointer_declarator" => " *",
            _ => "",
        };
        format!("{base}{stars}")
    }

    fn lower_function_bodies(&mut self, root: Node) {
        for node in self.named_children(root) {
            if node.kind() != "function_definition" {
                continue;
            }
            self.lower_function_definition(node);
        }
    }

    fn lower_function_definition(&mut self, node: Node) {
        let Some(declarator) = find_descendant(node, "function_declarator") else {
            return;
        };
        let Some(name_node) = declarator_identifier(declarator) else {
            return;
        };
        let name = self.raw_text(name_node).to_string();
        let Some(func_id) = self.tu.find_function(&name) else {
            return;
        };
        let Some(body_node) = node.child_by_field_name("body") else {
            return;
        };

        self.current_func = Some(func_id);
        self.scopes.push(FxHashMap::default());

        // Parameters
        let mut params = Vec::new();
        if let Some(param_list) = declarator.child_by_field_name("parameters") {
            for (index, param) in self
                .named_children(param_list)
                .into_iter()
                .filter(|p| p.kind() == "parameter_declaration")
                .enumerate()
            {
                if let Some(var) = self.lower_parameter(param, func_id, index) {
                    params.push(var);
                }
            }
        }

        let body = self.lower_statement(body_node);

        for stmt in self.tu.collect_stmts(body) {
            self.tu.set_func(stmt, func_id);
        }

        let return_type_name = self.return_type_spelling(node);
        self.tu.add_func(FuncInfo {
            id: FuncId(0),
            name,
            params,
            body: Some(body),
            return_type: DataTypeInfo::from_type_name(&return_type_name),
            return_type_name,
            span: self.span(node),
        });

        self.scopes.pop();
        self.current_func = None;
    }

    fn lower_parameter(&mut self, param: Node, func: FuncId, index: usize) -> Option<VarId> {
        let declarator = param.child_by_field_name("declarator")?;
        let name_node = declarator_identifier_or_self(declarator)?;
        let name = self.raw_text(name_node).to_string();
        let type_name = self.type_spelling_of_declaration(param, declarator);
        let record = self.record_of_type(param.child_by_field_name("type"), &type_name);

        let var = self.tu.add_var(VarDeclInfo {
            id: VarId(0),
            name: name.clone(),
            func: Some(func),
            is_param: true,
            param_index: Some(index),
            data_type: DataTypeInfo::from_type_name(&type_name),
            type_name,
            record,
            decl_stmt: None,
            decl_line: self.span(param).start_line,
        });
        self.bind(name, var);
        Some(var)
    }

    fn type_spelling_of_declaration(&self, decl: Node, declarator: Node) -> String {
        let base = decl
            .child_by_field_name("type")
            .map(|n| self.raw_text(n))
            .unwrap_or("");
        let mut spelling = String::from(base);
        let mut cursor = Some(declarator);
        while let Some(d) = cursor {
            match d.kind() {
                "pointer_declarator" => {
                    spelling.push_str(" *");
                    cursor = d.child_by_field_name("declarator");
                }
                "array_declarator" => {
                    spelling.push_str(" []");
                    cursor = d.child_by_field_name("declarator");
                }
                _ => break,
            }
        }
        spelling
    }

    fn record_of_type(&mut self, type_node: Option<Node>, type_name: &str) -> Option<RecordId> {
        if let Some(node) = type_node {
            let kind = node.kind();
            if (kind == "union_specifier" || kind == "struct_specifier")
                && node.child_by_field_name("body").is_some()
            {
                return Some(self.register_record(node, kind == "union_specifier"));
            }
            if kind == "union_specifier" || kind == "struct_specifier" {
                if let Some(name) = node.child_by_field_name("name") {
                    let name = self.raw_text(name).to_string();
                    return self.records_by_name.get(&name).copied();
                }
            }
            if kind == "type_identifier" {
                return self.records_by_name.get(self.raw_text(node)).copied();
            }
        }
        self.records_by_name.get(type_name.trim()).copied()
    }

    // ------------------------------------------------------------
    // Scopes
    // ------------------------------------------------------------

    fn bind(&mut self, name: String, var: VarId) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name, var);
        } else {
            self.globals.insert(name, var);
        }
    }

    fn resolve(&mut self, name: &str, line: u32) -> VarId {
        for scope in self.scopes.iter().rev() {
            if let Some(&var) = scope.get(name) {
                return var;
            }
        }
        if let Some(&var) = self.globals.get(name) {
            return var;
        }
        // Unseen identifier (global, enum constant, macro leftover): give it
        // a synthetic declaration so references still share one identity.
        let var = self.tu.add_var(VarDeclInfo {
            id: VarId(0),
            name: name.to_string(),
            func: None,
            is_param: false,
            param_index: None,
            type_name: String::new(),
            data_type: DataTypeInfo::default(),
            record: None,
            decl_stmt: None,
            decl_line: line,
        });
        self.globals.insert(name.to_string(), var);
        var
    }

    // ------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------

    fn add(&mut self, node: Node, kind: StmtKind, children: &[StmtId]) -> StmtId {
        let span = self.span(node);
        let text = self.text(node);
        let id = self.tu.add_stmt(kind, span, text);
        for &child in children {
            self.tu.set_parent(child, id);
        }
        id
    }

    fn lower_statement(&mut self, node: Node) -> StmtId {
        match node.kind() {
            "compound_statement" => {
                self.scopes.push(FxHashMap::default());
                let mut stmts = Vec::new();
                for child in self.named_children(node) {
                    stmts.push(self.lower_statement(child));
                }
                self.scopes.pop();
                let ids = stmts.clone();
                self.add(node, StmtKind::Compound { stmts }, &ids)
            }
            "expression_statement" => match self.named_children(node).first().copied() {
                Some(expr) => self.lower_expression(expr),
                None => self.add(
                    node,
                    StmtKind::Unknown {
                        description: "empty statement".to_string(),
                    },
                    &[],
                ),
            },
            "declaration" => self.lower_declaration(node),
            "if_statement" => {
                let cond = self.lower_condition(node.child_by_field_name("condition"), node);
                let then_body = match node.child_by_field_name("consequence") {
                    Some(c) => self.lower_statement(c),
                    None => self.unknown(node, "if without body"),
                };
                let else_body = node
                    .child_by_field_name("alternative")
                    .and_then(|alt| self.named_children(alt).first().copied())
                    .map(|n| self.lower_statement(n));
                let mut children = vec![cond, then_body];
                children.extend(else_body.iter().copied());
                self.add(
                    node,
                    StmtKind::If {
                        cond,
                        then_body,
                        else_body,
                    },
                    &children,
                )
            }
            "while_statement" => {
                let cond = self.lower_condition(node.child_by_field_name("condition"), node);
                let body = match node.child_by_field_name("body") {
                    Some(b) => self.lower_statement(b),
                    None => self.unknown(node, "while without body"),
                };
                self.add(node, StmtKind::While { cond, body }, &[cond, body])
            }
            "do_statement" => {
                let body = match node.child_by_field_name("body") {
                    Some(b) => self.lower_statement(b),
                    None => self.unknown(node, "do without body"),
                };
                let cond = self.lower_condition(node.child_by_field_name("condition"), node);
                self.add(node, StmtKind::DoWhile { body, cond }, &[body, cond])
            }
            "for_statement" => {
                self.scopes.push(FxHashMap::default());
                let init = node.child_by_field_name("initializer").map(|n| {
                    if n.kind() == "declaration" {
                        self.lower_declaration(n)
                    } else {
                        self.lower_expression(n)
                    }
                });
                let cond = node
                    .child_by_field_name("condition")
                    .map(|n| self.lower_expression(n));
                let inc = node
                    .child_by_field_name("update")
                    .map(|n| self.lower_expression(n));
                let body = match node.child_by_field_name("body") {
                    Some(b) => self.lower_statement(b),
                    None => self.unknown(node, "for without body"),
                };
                self.scopes.pop();
                let mut children: Vec<StmtId> = Vec::new();
                children.extend(init.iter().copied());
                children.extend(cond.iter().copied());
                children.extend(inc.iter().copied());
                children.push(body);
                self.add(
                    node,
                    StmtKind::For {
                        init,
                        cond,
                        inc,
                        body,
                    },
                    &children,
                )
            }
            "switch_statement" => {
                let cond = self.lower_condition(node.child_by_field_name("condition"), node);
                let body = self.lower_switch_body(node);
                self.add(node, StmtKind::Switch { cond, body }, &[cond, body])
            }
            "return_statement" => {
                let value = self
                    .named_children(node)
                    .first()
                    .copied()
                    .map(|n| self.lower_expression(n));
                let children: Vec<StmtId> = value.iter().copied().collect();
                self.add(node, StmtKind::Return { value }, &children)
            }
            "break_statement" => self.add(node, StmtKind::Break, &[]),
            "continue_statement" => self.add(node, StmtKind::Continue, &[]),
            "labeled_statement" => match self.named_children(node).last().copied() {
                Some(inner) => self.lower_statement(inner),
                None => self.unknown(node, "label"),
            },
            _ => self.lower_expression(node),
        }
    }

    fn lower_condition(&mut self, cond: Option<Node>, parent: Node) -> StmtId {
        match cond {
            Some(node) if node.kind() == "parenthesized_expression" => {
                match self.named_children(node).first().copied() {
                    Some(inner) => self.lower_expression(inner),
                    None => self.unknown(parent, "empty condition"),
                }
            }
            Some(node) => self.lower_expression(node),
            None => self.unknown(parent, "missing condition"),
        }
    }

    fn lower_switch_body(&mut self, switch_node: Node) -> StmtId {
        let Some(body) = switch_node.child_by_field_name("body") else {
            return self.unknown(switch_node, "switch without body");
        };
        self.scopes.push(FxHashMap::default());
        let mut stmts = Vec::new();
        for child in self.named_children(body) {
            if child.kind() == "case_statement" {
                let value = child
                    .child_by_field_name("value")
                    .map(|v| self.raw_text(v).to_string());
                let marker = self.add(child, StmtKind::Case { value }, &[]);
                stmts.push(marker);
                for sub in self.named_children(child) {
                    if child
                        .child_by_field_name("value")
                        .map(|v| v.id() == sub.id())
                        .unwrap_or(false)
                    {
                        continue;
                    }
                    stmts.push(self.lower_statement(sub));
                }
            } else {
                stmts.push(self.lower_statement(child));
            }
        }
        self.scopes.pop();
        let ids = stmts.clone();
        self.add(body, StmtKind::Compound { stmts }, &ids)
    }

    fn lower_declaration(&mut self, node: Node) -> StmtId {
        let func = self.current_func;
        let line = self.span(node).start_line;
        let mut decls = Vec::new();
        let mut children = Vec::new();

        for child in self.named_children(node) {
            match child.kind() {
                "init_declarator" => {
                    let declarator = child.child_by_field_name("declarator");
                    let init = child
                        .child_by_field_name("value")
                        .map(|v| self.lower_expression(v));
                    if let Some(name_node) =
                        declarator.and_then(|d| declarator_identifier_or_self(d))
                    {
                        let var = self.declare_var(node, name_node, declarator, func, line);
                        children.extend(init.iter().copied());
                        decls.push((var, init));
                    }
                }
                "identifier" | "pointer_declarator" | "array_declarator" => {
                    if let Some(name_node) = declarator_identifier_or_self(child) {
                        let var = self.declare_var(node, name_node, Some(child), func, line);
                        decls.push((var, None));
                    }
                }
                _ => {}
            }
        }

        let id = self.add(node, StmtKind::Decl { decls: decls.clone() }, &children);
        for (var, _) in &decls {
            self.tu.var_mut(*var).decl_stmt = Some(id);
        }
        id
    }

    fn declare_var(
        &mut self,
        decl: Node,
        name_node: Node,
        declarator: Option<Node>,
        func: Option<FuncId>,
        line: u32,
    ) -> VarId {
        let name = self.raw_text(name_node).to_string();
        let type_name = match declarator {
            Some(d) => self.type_spelling_of_declaration(decl, d),
            None => decl
                .child_by_field_name("type")
                .map(|n| self.raw_text(n).to_string())
                .unwrap_or_default(),
        };
        let record = self.record_of_type(decl.child_by_field_name("type"), &type_name);
        let var = self.tu.add_var(VarDeclInfo {
            id: VarId(0),
            name: name.clone(),
            func,
            is_param: false,
            param_index: None,
            data_type: DataTypeInfo::from_type_name(&type_name),
            type_name,
            record,
            decl_stmt: None,
            decl_line: line,
        });
        self.bind(name, var);
        var
    }

    // ------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------

    fn unknown(&mut self, node: Node, what: &str) -> StmtId {
        self.add(
            node,
            StmtKind::Unknown {
                description: what.to_string(),
            },
            &[],
        )
    }

    fn lower_expression(&mut self, node: Node) -> StmtId {
        match node.kind() {
            "identifier" => {
                let line = self.span(node).start_line;
                let name = self.raw_text(node).to_string();
                let var = self.resolve(&name, line);
                self.add(node, StmtKind::DeclRef { var }, &[])
            }
            "number_literal" => self.lower_number(node),
            "char_literal" => {
                let raw = self.raw_text(node);
                let value = raw
                    .trim_matches('\'')
                    .bytes()
                    .next()
                    .map(|b| b as i64)
                    .unwrap_or(0);
                self.add(node, StmtKind::IntLiteral { value }, &[])
            }
            "true" => self.add(node, StmtKind::IntLiteral { value: 1 }, &[]),
            "false" => self.add(node, StmtKind::IntLiteral { value: 0 }, &[]),
            "parenthesized_expression" => match self.named_children(node).first().copied() {
                Some(inner) => {
                    let inner = self.lower_expression(inner);
                    self.add(node, StmtKind::Paren { inner }, &[inner])
                }
                None => self.unknown(node, "empty parens"),
            },
            "binary_expression" => {
                let op = node
                    .child_by_field_name("operator")
                    .and_then(|o| BinOp::from_token(self.raw_text(o)));
                let lhs = node.child_by_field_name("left");
                let rhs = node.child_by_field_name("right");
                match (op, lhs, rhs) {
                    (Some(op), Some(l), Some(r)) => {
                        let lhs = self.lower_expression(l);
                        let rhs = self.lower_expression(r);
                        self.add(node, StmtKind::Binary { op, lhs, rhs }, &[lhs, rhs])
                    }
                    _ => self.unknown(node, "binary expression"),
                }
            }
            "assignment_expression" => {
                let op = node
                    .child_by_field_name("operator")
                    .and_then(|o| BinOp::from_token(self.raw_text(o)))
                    .unwrap_or(BinOp::Assign);
                let lhs = node.child_by_field_name("left");
                let rhs = node.child_by_field_name("right");
                match (lhs, rhs) {
                    (Some(l), Some(r)) => {
                        let lhs = self.lower_expression(l);
                        let rhs = self.lower_expression(r);
                        self.add(node, StmtKind::Binary { op, lhs, rhs }, &[lhs, rhs])
                    }
                    _ => self.unknown(node, "assignment"),
                }
            }
            "update_expression" => {
                let Some(arg) = node.child_by_field_name("argument") else {
                    return self.unknown(node, "update expression");
                };
                let op_text = node
                    .child_by_field_name("operator")
                    .map(|o| self.raw_text(o))
                    .unwrap_or("++");
                let prefix = node
                    .child(0)
                    .map(|c| c.kind() == "++" || c.kind() == "--")
                    .unwrap_or(false);
                let op = match (op_text, prefix) {
                    ("++", true) => UnOp::PreInc,
                    ("++", false) => UnOp::PostInc,
                    ("--", true) => UnOp::PreDec,
                    _ => UnOp::PostDec,
                };
                let operand = self.lower_expression(arg);
                self.add(node, StmtKind::Unary { op, operand }, &[operand])
            }
            "unary_expression" => {
                let Some(arg) = node.child_by_field_name("argument") else {
                    return self.unknown(node, "unary expression");
                };
                let op = match node
                    .child_by_field_name("operator")
                    .map(|o| self.raw_text(o))
                    .unwrap_or("")
                {
                    "-" => UnOp::Neg,
                    "+" => UnOp::Plus,
                    "!" => UnOp::Not,
                    "~" => UnOp::BitNot,
                    _ => UnOp::Neg,
                };
                let operand = self.lower_expression(arg);
                self.add(node, StmtKind::Unary { op, operand }, &[operand])
            }
            "pointer_expression" => {
                let Some(arg) = node.child_by_field_name("argument") else {
                    return self.unknown(node, "pointer expression");
                };
                let op = match node
                    .child_by_field_name("operator")
                    .map(|o| self.raw_text(o))
                    .unwrap_or("*")
                {
                    "&" => UnOp::AddrOf,
                    _ => UnOp::Deref,
                };
                let operand = self.lower_expression(arg);
                self.add(node, StmtKind::Unary { op, operand }, &[operand])
            }
            "subscript_expression" => {
                let base = node.child_by_field_name("argument");
                let index = node.child_by_field_name("index");
                match (base, index) {
                    (Some(b), Some(i)) => {
                        let base = self.lower_expression(b);
                        let index = self.lower_expression(i);
                        self.add(node, StmtKind::ArraySubscript { base, index }, &[base, index])
                    }
                    _ => self.unknown(node, "subscript"),
                }
            }
            "field_expression" => {
                let Some(base_node) = node.child_by_field_name("argument") else {
                    return self.unknown(node, "field expression");
                };
                let field = node
                    .child_by_field_name("field")
                    .map(|f| self.raw_text(f).to_string())
                    .unwrap_or_default();
                let arrow = node
                    .child_by_field_name("operator")
                    .map(|o| self.raw_text(o) == "->")
                    .unwrap_or_else(|| self.raw_text(node).contains("->"));
                let base = self.lower_expression(base_node);
                self.add(node, StmtKind::Member { base, field, arrow }, &[base])
            }
            "call_expression" => {
                let callee_name = node
                    .child_by_field_name("function")
                    .map(|f| self.raw_text(f).to_string())
                    .unwrap_or_default();
                let callee = self.tu.find_function(&callee_name);
                let mut args = Vec::new();
                if let Some(arg_list) = node.child_by_field_name("arguments") {
                    for arg in self.named_children(arg_list) {
                        args.push(self.lower_expression(arg));
                    }
                }
                let children = args.clone();
                self.add(
                    node,
                    StmtKind::Call {
                        callee,
                        callee_name,
                        args,
                    },
                    &children,
                )
            }
            "conditional_expression" => {
                let cond = node.child_by_field_name("condition");
                let cons = node.child_by_field_name("consequence");
                let alt = node.child_by_field_name("alternative");
                match (cond, cons, alt) {
                    (Some(c), Some(t), Some(e)) => {
                        let cond = self.lower_expression(c);
                        let then_value = self.lower_expression(t);
                        let else_value = self.lower_expression(e);
                        self.add(
                            node,
                            StmtKind::Conditional {
                                cond,
                                then_value,
                                else_value,
                            },
                            &[cond, then_value, else_value],
                        )
                    }
                    _ => self.unknown(node, "conditional"),
                }
            }
            "cast_expression" => {
                let target = node
                    .child_by_field_name("type")
                    .map(|t| self.raw_text(t).to_string())
                    .unwrap_or_default();
                match node.child_by_field_name("value") {
                    Some(v) => {
                        let operand = self.lower_expression(v);
                        self.add(node, StmtKind::Cast { target, operand }, &[operand])
                    }
                    None => self.unknown(node, "cast"),
                }
            }
            other => self.unknown(node, other),
        }
    }

    fn lower_number(&mut self, node: Node) -> StmtId {
        let raw = self.raw_text(node);
        let cleaned: String = raw
            .chars()
            .filter(|c| !matches!(c, 'u' | 'U' | 'l' | 'L' | 'f' | 'F') || raw.starts_with("0x"))
            .collect();
        let trimmed = cleaned.trim();

        if let Some(hex) = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
        {
            let hex: String = hex
                .chars()
                .filter(|c| c.is_ascii_hexdigit())
                .collect();
            if let Ok(value) = i64::from_str_radix(&hex, 16) {
                return self.add(node, StmtKind::IntLiteral { value }, &[]);
            }
        }
        if trimmed.contains('.') || trimmed.contains('e') || trimmed.contains('E') {
            if let Ok(value) = trimmed.parse::<f64>() {
                return self.add(node, StmtKind::FloatLiteral { value }, &[]);
            }
        }
        if let Ok(value) = trimmed.parse::<i64>() {
            return self.add(node, StmtKind::IntLiteral { value }, &[]);
        }
        self.add(node, StmtKind::IntLiteral { value: 0 }, &[])
    }
}

/// First descendant of `node` (node included) with the given kind.
fn find_descendant<'t>(node: Node<'t>, kind: &str) -> Option<Node<'t>> {
    if node.kind() == kind {
        return Some(node);
    }
    let mut cursor = node.walk();
    let children: Vec<Node<'t>> = node.children(&mut cursor).collect();
    for child in children {
        if let Some(found) = find_descendant(child, kind) {
            return Some(found);
        }
    }
    None
}

/// The identifier named by a (possibly nested) declarator.
fn declarator_identifier(declarator: Node) -> Option<Node> {
    let mut cursor = Some(declarator);
    while let Some(node) = cursor {
        match node.kind() {
            "identifier" | "field_identifier" => return Some(node),
            _ => {
                cursor = node
                    .child_by_field_name("declarator")
                    .or_else(|| find_descendant(node, "identifier"))
            }
        }
    }
    None
}

fn declarator_identifier_or_self(declarator: Node) -> Option<Node> {
    if declarator.kind() == "identifier" {
        Some(declarator)
    } else {
        declarator_identifier(declarator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::ast::StmtKind;

    #[test]
    fn test_parse_simple_function() {
        let src = "int add(int a, int b) { return a + b; }\n";
        let tu = parse_translation_unit(src, "add.c").unwrap();

        let func = tu.user_functions().next().expect("one function");
        assert_eq!(func.name, "add");
        assert_eq!(func.params.len(), 2);
        assert_eq!(tu.var(func.params[0]).name, "a");
        assert!(tu.var(func.params[1]).is_param);
        assert_eq!(tu.var(func.params[1]).param_index, Some(1));
    }

    #[test]
    fn test_parse_loop_and_subscript() {
        let src = r#"
void scale(float *a, int n) {
    for (int i = 0; i < n; ++i) {
        a[i] = a[i] * 2.0f;
    }
}
"#;
        let tu = parse_translation_unit(src, "scale.c").unwrap();
        let func = tu.user_functions().next().unwrap();
        let stmts = tu.collect_stmts(func.body.unwrap());

        assert!(stmts
            .iter()
            .any(|&s| matches!(tu.stmt(s).kind, StmtKind::For { .. })));
        assert!(stmts
            .iter()
            .any(|&s| matches!(tu.stmt(s).kind, StmtKind::ArraySubscript { .. })));
        assert!(stmts
            .iter()
            .any(|&s| matches!(tu.stmt(s).kind, StmtKind::FloatLiteral { .. })));
    }

    #[test]
    fn test_call_resolution_is_canonical() {
        let src = r#"
int square(int x);
void f(int *out) { out[0] = square(3); }
int square(int x) { return x * x; }
"#;
        let tu = parse_translation_unit(src, "calls.c").unwrap();
        let square = tu.find_function("square").unwrap();
        assert!(tu.func(square).has_body());

        let f = tu.find_function("f").unwrap();
        let body = tu.func(f).body.unwrap();
        let call = tu
            .collect_stmts(body)
            .into_iter()
            .find(|&s| matches!(tu.stmt(s).kind, StmtKind::Call { .. }))
            .unwrap();
        match &tu.stmt(call).kind {
            StmtKind::Call { callee, .. } => assert_eq!(*callee, Some(square)),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_union_declaration_registers_record() {
        let src = r#"
void f(void) {
    union U { int i; float fl; } u;
    u.i = 0x3f800000;
    float v = u.fl;
}
"#;
        let tu = parse_translation_unit(src, "union.c").unwrap();
        let func = tu.find_function("f").unwrap();
        let body = tu.func(func).body.unwrap();
        let member = tu
            .collect_stmts(body)
            .into_iter()
            .find(|&s| matches!(tu.stmt(s).kind, StmtKind::Member { .. }))
            .unwrap();
        let StmtKind::Member { base, .. } = &tu.stmt(member).kind else {
            unreachable!()
        };
        let StmtKind::DeclRef { var } = tu.stmt(tu.skip_parens(*base)).kind else {
            panic!("member base should be a DeclRef");
        };
        let record = tu.var(var).record.expect("u has a record type");
        assert!(tu.record(record).is_union);
        assert_eq!(tu.record(record).fields, vec!["i", "fl"]);
    }

    #[test]
    fn test_hex_literal_value() {
        let src = "void f(void) { int x = 0x10; }\n";
        let tu = parse_translation_unit(src, "hex.c").unwrap();
        let func = tu.find_function("f").unwrap();
        let body = tu.func(func).body.unwrap();
        let lit = tu
            .collect_stmts(body)
            .into_iter()
            .find_map(|s| match tu.stmt(s).kind {
                StmtKind::IntLiteral { value } => Some(value),
                _ => None,
            })
            .unwrap();
        assert_eq!(lit, 16);
    }

    #[test]
    fn test_syntax_error_is_fatal() {
        let src = "int f( { return; }\n";
        assert!(parse_translation_unit(src, "bad.c").is_err());
    }

    #[test]
    fn test_same_line_statement_columns() {
        let src = "void f(int len, int *ref) { len++; if (ref[len] == 0) len = 1; }\n";
        let tu = parse_translation_unit(src, "sameline.c").unwrap();
        let func = tu.find_function("f").unwrap();
        let body = tu.func(func).body.unwrap();
        let stmts = tu.collect_stmts(body);

        let inc = stmts
            .iter()
            .copied()
            .find(|&s| matches!(tu.stmt(s).kind, StmtKind::Unary { op, .. } if op.is_inc_dec()))
            .unwrap();
        let branch = stmts
            .iter()
            .copied()
            .find(|&s| matches!(tu.stmt(s).kind, StmtKind::If { .. }))
            .unwrap();
        assert_eq!(tu.line(inc), tu.line(branch));
        assert!(tu.column(inc) < tu.column(branch));
    }
}
