//! Closure analysis.
//!
//! Walks a function body collecting identifier references and subtracts
//! everything that is not a free variable: parameters, variables declared in
//! the body, built-ins, reserved words, known top-level function names, and
//! module globals. The remainder, in first-reference order, is the ordered
//! capture list the closure is constructed with. The same walk records
//! whether the body references the `self` pseudo-identifier.

use crate::ast::{Block, Expr, ExprKind, FuncDecl, LoopKind, Program, Stmt, StmtKind};
use crate::builtins;
use crate::varmap;

use super::CodeGen;

struct CaptureWalker<'g> {
    gen: &'g CodeGen,
    params: Vec<String>,
    locals: Vec<String>,
    captured: Vec<String>,
}

impl<'g> CaptureWalker<'g> {
    fn reference(&mut self, name: &str) {
        if self.params.iter().any(|p| p == name)
            || self.locals.iter().any(|l| l == name)
            || self.captured.iter().any(|c| c == name)
            || builtins::is_builtin_name(name)
            || varmap::is_reserved_identifier(name)
            || self.gen.functions.contains_key(name)
            || self.gen.module_globals.contains_key(name)
        {
            return;
        }
        // Only bindings visible at the creation site can be captured.
        if self.gen.lookup_slot(name).is_some() {
            self.captured.push(name.to_string());
        }
    }

    fn declare(&mut self, name: &str) {
        if !self.locals.iter().any(|l| l == name) {
            self.locals.push(name.to_string());
        }
    }

    fn walk_block(&mut self, block: &Block) {
        for stmt in &block.statements {
            self.walk_stmt(stmt);
        }
    }

    fn walk_stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::VarDecl { name, init, .. } => {
                // The initializer is evaluated before the binding exists.
                if let Some(init) = init {
                    self.walk_expr(init);
                }
                self.declare(name);
            }
            StmtKind::FuncDecl(func) => {
                // Nested functions run their own analysis when lowered; only
                // the name binds here.
                self.declare(&func.name);
            }
            StmtKind::ExprStmt(expr) => self.walk_expr(expr),
            StmtKind::Assign { target, value } => {
                self.walk_expr(target);
                self.walk_expr(value);
            }
            StmtKind::If {
                conditions,
                then_blocks,
                else_block,
            } => {
                for cond in conditions {
                    self.walk_expr(cond);
                }
                for block in then_blocks {
                    self.walk_block(block);
                }
                if let Some(block) = else_block {
                    self.walk_block(block);
                }
            }
            StmtKind::Loop(loop_stmt) => {
                match &loop_stmt.kind {
                    LoopKind::Repeat(count) => self.walk_expr(count),
                    LoopKind::For {
                        init,
                        condition,
                        update,
                    } => {
                        if let Some(init) = init {
                            self.walk_stmt(init);
                        }
                        if let Some(condition) = condition {
                            self.walk_expr(condition);
                        }
                        if let Some(update) = update {
                            self.walk_stmt(update);
                        }
                    }
                    LoopKind::Foreach { iterable, binding } => {
                        self.walk_expr(iterable);
                        self.declare(binding);
                    }
                }
                self.walk_block(&loop_stmt.body);
            }
            StmtKind::Return(value) => {
                if let Some(value) = value {
                    self.walk_expr(value);
                }
            }
            StmtKind::Break { .. } | StmtKind::Next { .. } => {}
            StmtKind::Try {
                try_block,
                catch_param,
                catch_block,
                finally_block,
            } => {
                self.walk_block(try_block);
                if let Some(param) = catch_param {
                    self.declare(param);
                }
                if let Some(block) = catch_block {
                    self.walk_block(block);
                }
                if let Some(block) = finally_block {
                    self.walk_block(block);
                }
            }
            StmtKind::Block(block) => self.walk_block(block),
        }
    }

    fn walk_expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Identifier(name) => self.reference(name),
            ExprKind::SelfRef => {}
            ExprKind::Num { .. }
            | ExprKind::Str(_)
            | ExprKind::Bool(_)
            | ExprKind::Null
            | ExprKind::Undef => {}
            ExprKind::Array { elements, .. } => {
                for element in elements {
                    self.walk_expr(element);
                }
            }
            ExprKind::Object { properties } => {
                for (_, value) in properties {
                    self.walk_expr(value);
                }
            }
            ExprKind::Binary { left, right, .. } => {
                self.walk_expr(left);
                self.walk_expr(right);
            }
            ExprKind::Unary { operand, .. } => self.walk_expr(operand),
            ExprKind::Ternary {
                condition,
                then_expr,
                else_expr,
            } => {
                self.walk_expr(condition);
                self.walk_expr(then_expr);
                self.walk_expr(else_expr);
            }
            ExprKind::Call { callee, args, .. } => {
                self.walk_expr(callee);
                for arg in args {
                    self.walk_expr(arg);
                }
            }
            ExprKind::Member { object, .. } => self.walk_expr(object),
            ExprKind::Index { object, index } => {
                self.walk_expr(object);
                self.walk_expr(index);
            }
            ExprKind::Chain { object, links } => {
                self.walk_expr(object);
                for link in links {
                    if let Some(args) = &link.args {
                        for arg in args {
                            self.walk_expr(arg);
                        }
                    }
                }
            }
            ExprKind::Func(func) => {
                // Anonymous nested function: analyzed when lowered.
                self.declare(&func.name);
            }
        }
    }
}

/// Ordered free variables of `func`'s body, relative to the bindings visible
/// in `gen` at the definition site.
pub(super) fn analyze_captures(gen: &CodeGen, func: &FuncDecl) -> Vec<String> {
    let mut walker = CaptureWalker {
        gen,
        params: func.params.clone(),
        locals: Vec::new(),
        captured: Vec::new(),
    };
    walker.walk_block(&func.body);
    walker.captured
}

// ----------------------------------------------------------------------
// `uses_self` annotation pass
// ----------------------------------------------------------------------

fn body_uses_self(block: &Block) -> bool {
    block.statements.iter().any(stmt_uses_self)
}

fn stmt_uses_self(stmt: &Stmt) -> bool {
    match &stmt.kind {
        StmtKind::VarDecl { init, .. } => init.as_ref().map(expr_uses_self).unwrap_or(false),
        // `self` belongs to the innermost function; a nested body does not
        // mark the enclosing one.
        StmtKind::FuncDecl(_) => false,
        StmtKind::ExprStmt(expr) => expr_uses_self(expr),
        StmtKind::Assign { target, value } => expr_uses_self(target) || expr_uses_self(value),
        StmtKind::If {
            conditions,
            then_blocks,
            else_block,
        } => {
            conditions.iter().any(expr_uses_self)
                || then_blocks.iter().any(body_uses_self)
                || else_block.as_ref().map(body_uses_self).unwrap_or(false)
        }
        StmtKind::Loop(loop_stmt) => {
            let header = match &loop_stmt.kind {
                LoopKind::Repeat(count) => expr_uses_self(count),
                LoopKind::For {
                    init,
                    condition,
                    update,
                } => {
                    init.as_deref().map(stmt_uses_self).unwrap_or(false)
                        || condition.as_ref().map(expr_uses_self).unwrap_or(false)
                        || update.as_deref().map(stmt_uses_self).unwrap_or(false)
                }
                LoopKind::Foreach { iterable, .. } => expr_uses_self(iterable),
            };
            header || body_uses_self(&loop_stmt.body)
        }
        StmtKind::Return(value) => value.as_ref().map(expr_uses_self).unwrap_or(false),
        StmtKind::Break { .. } | StmtKind::Next { .. } => false,
        StmtKind::Try {
            try_block,
            catch_block,
            finally_block,
            ..
        } => {
            body_uses_self(try_block)
                || catch_block.as_ref().map(body_uses_self).unwrap_or(false)
                || finally_block.as_ref().map(body_uses_self).unwrap_or(false)
        }
        StmtKind::Block(block) => body_uses_self(block),
    }
}

fn expr_uses_self(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::SelfRef => true,
        ExprKind::Num { .. }
        | ExprKind::Str(_)
        | ExprKind::Bool(_)
        | ExprKind::Null
        | ExprKind::Undef
        | ExprKind::Identifier(_) => false,
        ExprKind::Array { elements, .. } => elements.iter().any(expr_uses_self),
        ExprKind::Object { properties } => properties.iter().any(|(_, v)| expr_uses_self(v)),
        ExprKind::Binary { left, right, .. } => expr_uses_self(left) || expr_uses_self(right),
        ExprKind::Unary { operand, .. } => expr_uses_self(operand),
        ExprKind::Ternary {
            condition,
            then_expr,
            else_expr,
        } => expr_uses_self(condition) || expr_uses_self(then_expr) || expr_uses_self(else_expr),
        ExprKind::Call { callee, args, .. } => {
            expr_uses_self(callee) || args.iter().any(expr_uses_self)
        }
        ExprKind::Member { object, .. } => expr_uses_self(object),
        ExprKind::Index { object, index } => expr_uses_self(object) || expr_uses_self(index),
        ExprKind::Chain { object, links } => {
            expr_uses_self(object)
                || links.iter().any(|link| {
                    link.args
                        .as_ref()
                        .map(|args| args.iter().any(expr_uses_self))
                        .unwrap_or(false)
                })
        }
        ExprKind::Func(_) => false,
    }
}

fn annotate_func(func: &mut FuncDecl) {
    func.uses_self = body_uses_self(&func.body);
    annotate_block(&mut func.body);
}

fn annotate_block(block: &mut Block) {
    for stmt in &mut block.statements {
        annotate_stmt(stmt);
    }
}

fn annotate_stmt(stmt: &mut Stmt) {
    match &mut stmt.kind {
        StmtKind::FuncDecl(func) => annotate_func(func),
        StmtKind::VarDecl { init, .. } => {
            if let Some(init) = init {
                annotate_expr(init);
            }
        }
        StmtKind::ExprStmt(expr) => annotate_expr(expr),
        StmtKind::Assign { target, value } => {
            annotate_expr(target);
            annotate_expr(value);
        }
        StmtKind::If {
            conditions,
            then_blocks,
            else_block,
        } => {
            for cond in conditions {
                annotate_expr(cond);
            }
            for block in then_blocks {
                annotate_block(block);
            }
            if let Some(block) = else_block {
                annotate_block(block);
            }
        }
        StmtKind::Loop(loop_stmt) => {
            match &mut loop_stmt.kind {
                LoopKind::Repeat(count) => annotate_expr(count),
                LoopKind::For {
                    init,
                    condition,
                    update,
                } => {
                    if let Some(init) = init {
                        annotate_stmt(init);
                    }
                    if let Some(condition) = condition {
                        annotate_expr(condition);
                    }
                    if let Some(update) = update {
                        annotate_stmt(update);
                    }
                }
                LoopKind::Foreach { iterable, .. } => annotate_expr(iterable),
            }
            annotate_block(&mut loop_stmt.body);
        }
        StmtKind::Return(value) => {
            if let Some(value) = value {
                annotate_expr(value);
            }
        }
        StmtKind::Break { .. } | StmtKind::Next { .. } => {}
        StmtKind::Try {
            try_block,
            catch_block,
            finally_block,
            ..
        } => {
            annotate_block(try_block);
            if let Some(block) = catch_block {
                annotate_block(block);
            }
            if let Some(block) = finally_block {
                annotate_block(block);
            }
        }
        StmtKind::Block(block) => annotate_block(block),
    }
}

fn annotate_expr(expr: &mut Expr) {
    match &mut expr.kind {
        ExprKind::Func(func) => annotate_func(func),
        ExprKind::Array { elements, .. } => {
            for element in elements {
                annotate_expr(element);
            }
        }
        ExprKind::Object { properties } => {
            for (_, value) in properties {
                annotate_expr(value);
            }
        }
        ExprKind::Binary { left, right, .. } => {
            annotate_expr(left);
            annotate_expr(right);
        }
        ExprKind::Unary { operand, .. } => annotate_expr(operand),
        ExprKind::Ternary {
            condition,
            then_expr,
            else_expr,
        } => {
            annotate_expr(condition);
            annotate_expr(then_expr);
            annotate_expr(else_expr);
        }
        ExprKind::Call { callee, args, .. } => {
            annotate_expr(callee);
            for arg in args {
                annotate_expr(arg);
            }
        }
        ExprKind::Member { object, .. } => annotate_expr(object),
        ExprKind::Index { object, index } => {
            annotate_expr(object);
            annotate_expr(index);
        }
        ExprKind::Chain { object, links } => {
            annotate_expr(object);
            for link in links {
                if let Some(args) = &mut link.args {
                    for arg in args {
                        annotate_expr(arg);
                    }
                }
            }
        }
        _ => {}
    }
}

/// Set `uses_self` on every function declaration in the program. Run once
/// between parsing and code generation.
pub fn annotate_self_usage(program: &mut Program) {
    for stmt in &mut program.statements {
        annotate_stmt(stmt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer;
    use crate::parser::Parser;
    use crate::source_map::{Prov, SourceMap};

    fn parse(src: &str) -> Program {
        let prov: Vec<Prov> = (0..src.len()).map(|i| Prov::Orig(i as u32)).collect();
        let map = SourceMap::from_provenance(src, &prov);
        let offsets: Vec<usize> = (0..src.len()).collect();
        let tokens = lexer::tokenize(src, &map, &offsets).unwrap();
        Parser::new(&tokens).parse().unwrap()
    }

    fn first_func(program: &Program) -> &FuncDecl {
        for stmt in &program.statements {
            if let StmtKind::FuncDecl(func) = &stmt.kind {
                return func;
            }
        }
        panic!("no function in program");
    }

    #[test]
    fn test_captures_outer_binding() {
        let mut gen = CodeGen::new();
        gen.declare_local("k").unwrap();
        let program = parse("f:=(x){R>k+x;};");
        let func = first_func(&program);
        assert_eq!(analyze_captures(&gen, func), vec!["k"]);
    }

    #[test]
    fn test_params_and_locals_not_captured() {
        let mut gen = CodeGen::new();
        gen.declare_local("a").unwrap();
        let program = parse("f:=(a){b:=1;R>a+b;};");
        let func = first_func(&program);
        assert!(analyze_captures(&gen, func).is_empty());
    }

    #[test]
    fn test_builtins_and_functions_not_captured() {
        let mut gen = CodeGen::new();
        gen.functions.insert(
            "helper".into(),
            crate::codegen::state::FuncSig {
                param_count: 1,
                uses_self: false,
            },
        );
        let program = parse("f:=(x){R>helper(len(x));};");
        let func = first_func(&program);
        assert!(analyze_captures(&gen, func).is_empty());
    }

    #[test]
    fn test_capture_order_is_first_reference() {
        let mut gen = CodeGen::new();
        gen.declare_local("b").unwrap();
        gen.declare_local("a").unwrap();
        let program = parse("f:=(x){R>a+b+a;};");
        let func = first_func(&program);
        assert_eq!(analyze_captures(&gen, func), vec!["a", "b"]);
    }

    #[test]
    fn test_self_reference_captures_own_name() {
        let mut gen = CodeGen::new();
        // The nested function's name slot is registered before analysis so
        // recursion resolves to a capture.
        gen.declare_local("f").unwrap();
        let program = parse("f:=(n){R>f(n-1);};");
        let func = first_func(&program);
        assert_eq!(analyze_captures(&gen, func), vec!["f"]);
    }

    #[test]
    fn test_annotate_self_usage() {
        let mut program = parse("o:={n:1};f:=(x){R>self.n+x;};g:=(y){R>y;};");
        annotate_self_usage(&mut program);
        let mut found = vec![];
        for stmt in &program.statements {
            if let StmtKind::FuncDecl(func) = &stmt.kind {
                found.push((func.name.clone(), func.uses_self));
            }
        }
        assert_eq!(
            found,
            vec![("f".to_string(), true), ("g".to_string(), false)]
        );
    }

    #[test]
    fn test_nested_function_does_not_leak_self() {
        let mut program = parse("outer:=(x){inner:=(y){R>self.n;};R>inner;};");
        annotate_self_usage(&mut program);
        match &program.statements[0].kind {
            StmtKind::FuncDecl(outer) => {
                assert!(!outer.uses_self);
                match &outer.body.statements[0].kind {
                    StmtKind::FuncDecl(inner) => assert!(inner.uses_self),
                    other => panic!("expected inner FuncDecl, got {other:?}"),
                }
            }
            other => panic!("expected FuncDecl, got {other:?}"),
        }
    }
}
