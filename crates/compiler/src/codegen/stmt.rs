//! Statement lowering and function emission.
//!
//! Statements are where the refcount discipline is enforced: every scope
//! exit, loop-label jump, and function return releases exactly the right set
//! of temporaries and locals. Blocks do not introduce scopes on their own;
//! the enclosing statement (if / loop / try / function) owns scope
//! management.

use std::fmt::Write as _;

use super::state::{closure_signature, ClosureInfo};
use super::{closure, CodeGen, CodeGenError, Placement};
use crate::ast::{Block, Expr, ExprKind, FuncDecl, LoopKind, LoopStmt, Stmt, StmtKind};

impl CodeGen {
    /// Lower the statements of a block. The current scope is whatever the
    /// enclosing statement arranged.
    pub(super) fn lower_block_stmts(&mut self, block: &Block) -> Result<(), CodeGenError> {
        for stmt in &block.statements {
            if self.block_terminated {
                // Unreachable trailing statements would emit into a
                // terminated basic block.
                break;
            }
            self.lower_stmt(stmt)?;
        }
        Ok(())
    }

    pub(super) fn lower_stmt(&mut self, stmt: &Stmt) -> Result<(), CodeGenError> {
        match &stmt.kind {
            StmtKind::VarDecl {
                name,
                type_annotation,
                init,
                ..
            } => {
                if self.defined_in_current_scope(name) {
                    return Err(self.error_at(
                        stmt.loc,
                        Some(name),
                        "Variable already declared in current scope",
                    ));
                }
                let slot = self.declare_local(name)?;

                let Some(init) = init else {
                    return Ok(());
                };

                // A typed declaration initialized with the literal `null`
                // keeps its declared type across later reads.
                if let (Some(annotation), ExprKind::Null) = (type_annotation, &init.kind) {
                    let old = self.emit_load_slot(&slot)?;
                    self.emit_release(&old)?;
                    self.rt("box_null_typed");
                    let value = self.new_temp();
                    writeln!(
                        self.body,
                        "  {value} = call %struct.Value* @box_null_typed(i32 {})",
                        annotation.type_name.runtime_tag()
                    )?;
                    self.emit_store_slot(&value, &slot)?;
                    self.clear_temps();
                    return Ok(());
                }

                self.current_var_name = Some(name.clone());
                let value = self.lower_expr(init)?;
                self.current_var_name = None;

                match value {
                    Some(value) => {
                        self.take_ownership(&value)?;
                        // In a loop the slot may hold last iteration's value.
                        let old = self.emit_load_slot(&slot)?;
                        self.emit_release(&old)?;
                        self.emit_store_slot(&value, &slot)?;
                    }
                    None => self.release_all_temps()?,
                }
                Ok(())
            }

            StmtKind::Assign { target, value } => self.lower_assign(target, value),

            StmtKind::Return(value) => self.lower_return(value.as_ref()),

            StmtKind::Break { label } => self.lower_break(label.as_deref(), stmt),
            StmtKind::Next { label } => self.lower_next(label.as_deref(), stmt),

            StmtKind::If {
                conditions,
                then_blocks,
                else_block,
            } => self.lower_if(conditions, then_blocks, else_block.as_ref()),

            StmtKind::Loop(loop_stmt) => self.lower_loop(loop_stmt),

            StmtKind::Try {
                try_block,
                catch_param,
                catch_block,
                finally_block,
            } => self.lower_try(
                try_block,
                catch_param.as_deref(),
                catch_block.as_ref(),
                finally_block.as_ref(),
            ),

            StmtKind::ExprStmt(expr) => {
                match self.lower_expr(expr)? {
                    Some(result) if self.is_owned_temp(&result) => {
                        self.release_temps_except(&result)?;
                        // Nothing consumes a discarded expression's value.
                        self.emit_release(&result)?;
                    }
                    // A borrowed load stays owned by its slot.
                    _ => self.release_all_temps()?,
                }
                Ok(())
            }

            StmtKind::Block(block) => self.lower_block_stmts(block),

            StmtKind::FuncDecl(func) => {
                let placement = if self.function_depth == 0 {
                    Placement::TopLevel
                } else {
                    Placement::NestedNamed
                };
                self.lower_function(func, placement)?;
                Ok(())
            }
        }
    }

    // ------------------------------------------------------------------
    // Assignment
    // ------------------------------------------------------------------

    fn lower_assign(&mut self, target: &Expr, value: &Expr) -> Result<(), CodeGenError> {
        match &target.kind {
            ExprKind::Identifier(name) => {
                let existing = self.lookup_slot(name).map(str::to_string);
                let (slot, var_exists) = match existing {
                    Some(slot) => (slot, true),
                    None => (self.declare_local(name)?, false),
                };

                // `x = null` preserves the variable's declared type.
                if matches!(value.kind, ExprKind::Null) {
                    let old = self.emit_load_slot(&slot)?;
                    let new_null =
                        self.emit_value_call("box_null_preserve_type", &[&old])?;
                    self.emit_release(&old)?;
                    self.emit_store_slot(&new_null, &slot)?;
                    return Ok(());
                }

                self.current_var_name = Some(name.clone());
                let new_val = self.lower_expr(value)?;
                self.current_var_name = None;
                let Some(new_val) = new_val else {
                    return self.release_all_temps();
                };
                self.take_ownership(&new_val)?;
                if var_exists {
                    // The new value is computed before the old is released,
                    // so self-referencing assignments stay valid.
                    let old = self.emit_load_slot(&slot)?;
                    self.emit_release(&old)?;
                }
                self.emit_store_slot(&new_val, &slot)?;
                Ok(())
            }

            // The target is evaluated before the value for consistent
            // evaluation order.
            ExprKind::Index { object, index } => {
                let obj_val = self.lower_expr_value(object)?;
                let index_val = self.lower_expr_value(index)?;
                let new_val = self.lower_expr_value(value)?;
                // The stored value's ownership moves into the container.
                self.transfer_into_container(&new_val)?;
                let result =
                    self.emit_value_call("value_set_index", &[&obj_val, &index_val, &new_val])?;
                self.note_temp(&result);
                self.release_all_temps()?;
                Ok(())
            }

            ExprKind::Member {
                object, property, ..
            } => {
                let obj_val = self.lower_expr_value(object)?;
                let key = self.emit_boxed_string_constant(property)?;
                self.note_temp(&key);
                let new_val = self.lower_expr_value(value)?;
                self.transfer_into_container(&new_val)?;
                let result =
                    self.emit_value_call("value_set_field", &[&obj_val, &key, &new_val])?;
                self.note_temp(&result);
                self.release_all_temps()?;
                Ok(())
            }

            _ => Err(CodeGenError::invalid("Unsupported assignment target")),
        }
    }

    // ------------------------------------------------------------------
    // Return / break / next
    // ------------------------------------------------------------------

    fn lower_return(&mut self, value: Option<&Expr>) -> Result<(), CodeGenError> {
        if self.in_main_wrapper {
            // The synthesized entry point returns an exit code, not a value.
            if let Some(expr) = value {
                if let Some(v) = self.lower_expr(expr)? {
                    if self.is_owned_temp(&v) {
                        self.release_temps_except(&v)?;
                        self.emit_release(&v)?;
                    } else {
                        self.release_all_temps()?;
                    }
                } else {
                    self.release_all_temps()?;
                }
            } else {
                self.release_all_temps()?;
            }
            self.emit_function_cleanup()?;
            writeln!(self.body, "  ret i32 0")?;
            self.block_terminated = true;
            return Ok(());
        }

        let ret_val = match value {
            Some(expr) => self.lower_expr(expr)?,
            None => None,
        };
        match ret_val {
            Some(ret_val) => {
                // A value borrowed from a local is retained so the scope
                // cleanup below cannot free it; an owned temporary already
                // carries the reference the caller receives.
                self.take_ownership(&ret_val)?;
                self.emit_function_cleanup()?;
                writeln!(self.body, "  ret %struct.Value* {ret_val}")?;
            }
            None => {
                self.release_all_temps()?;
                let null_ret = self.emit_value_call("box_null", &[])?;
                self.emit_function_cleanup()?;
                writeln!(self.body, "  ret %struct.Value* {null_ret}")?;
            }
        }
        self.block_terminated = true;
        Ok(())
    }

    fn lower_break(&mut self, label: Option<&str>, stmt: &Stmt) -> Result<(), CodeGenError> {
        self.release_all_temps()?;
        match label {
            Some(label) => {
                let Some(index) = self.find_loop_by_label(label) else {
                    return Err(self.error_at(
                        stmt.loc,
                        None,
                        &format!("Undefined loop label '{label}' in break statement"),
                    ));
                };
                self.emit_multilevel_cleanup(index, true)?;
                let end = self.loop_scopes[index].end_label.clone();
                self.emit_br(&end)?;
            }
            None => {
                let Some(scope) = self.loop_scopes.last() else {
                    return Err(self.error_at(stmt.loc, None, "Break statement outside of loop"));
                };
                let end = scope.end_label.clone();
                self.emit_loop_cleanup()?;
                self.emit_br(&end)?;
            }
        }
        self.block_terminated = true;
        Ok(())
    }

    fn lower_next(&mut self, label: Option<&str>, stmt: &Stmt) -> Result<(), CodeGenError> {
        self.release_all_temps()?;
        match label {
            Some(label) => {
                let Some(index) = self.find_loop_by_label(label) else {
                    return Err(self.error_at(
                        stmt.loc,
                        None,
                        &format!("Undefined loop label '{label}' in next statement"),
                    ));
                };
                // The target loop keeps iterating, so its own locals stay.
                self.emit_multilevel_cleanup(index, false)?;
                let cont = self.loop_scopes[index].continue_label.clone();
                self.emit_br(&cont)?;
            }
            None => {
                let Some(scope) = self.loop_scopes.last() else {
                    return Err(self.error_at(stmt.loc, None, "Next statement outside of loop"));
                };
                let cont = scope.continue_label.clone();
                self.emit_loop_cleanup()?;
                self.emit_br(&cont)?;
            }
        }
        self.block_terminated = true;
        Ok(())
    }

    // ------------------------------------------------------------------
    // If
    // ------------------------------------------------------------------

    fn lower_if(
        &mut self,
        conditions: &[Expr],
        then_blocks: &[Block],
        else_block: Option<&Block>,
    ) -> Result<(), CodeGenError> {
        let end_label = self.new_label();

        for (condition, block) in conditions.iter().zip(then_blocks) {
            let cond_val = self.lower_expr_value(condition)?;
            let cond_i1 = self.emit_truthy(&cond_val)?;
            self.release_all_temps()?;

            let then_label = self.new_label();
            let next_label = self.new_label();
            self.emit_cond_br(&cond_i1, &then_label, &next_label)?;

            self.emit_label(&then_label)?;
            self.block_terminated = false;
            self.enter_scope();
            self.lower_block_stmts(block)?;
            if !self.block_terminated {
                self.emit_scope_exit_cleanup()?;
            }
            self.exit_scope();
            if !self.block_terminated {
                self.emit_br(&end_label)?;
            }
            self.block_terminated = false;

            self.emit_label(&next_label)?;
        }

        if let Some(block) = else_block {
            self.block_terminated = false;
            self.enter_scope();
            self.lower_block_stmts(block)?;
            if !self.block_terminated {
                self.emit_scope_exit_cleanup()?;
            }
            self.exit_scope();
        }
        if !self.block_terminated {
            self.emit_br(&end_label)?;
        }
        self.block_terminated = false;

        self.emit_label(&end_label)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Loops
    // ------------------------------------------------------------------

    fn lower_loop(&mut self, loop_stmt: &LoopStmt) -> Result<(), CodeGenError> {
        match &loop_stmt.kind {
            LoopKind::Repeat(count) => self.lower_repeat(count, loop_stmt),
            LoopKind::For {
                init,
                condition,
                update,
            } => self.lower_for(
                init.as_deref(),
                condition.as_ref(),
                update.as_deref(),
                loop_stmt,
            ),
            LoopKind::Foreach { iterable, binding } => {
                self.lower_foreach(iterable, binding, loop_stmt)
            }
        }
    }

    /// `L>[n] { ... }`: counter from 0 while `i < n`.
    fn lower_repeat(&mut self, count: &Expr, loop_stmt: &LoopStmt) -> Result<(), CodeGenError> {
        let limit = self.lower_expr_value(count)?;
        // The limit lives for the whole loop; everything else from the
        // header expression goes now. A borrowed limit (a plain variable)
        // stays owned by its slot.
        let limit_owned = self.is_owned_temp(&limit);
        self.release_temps_except(&limit)?;

        let counter = self.new_slot("rep");
        writeln!(self.entry_allocas, "  {counter} = alloca %struct.Value*")?;
        writeln!(
            self.entry_allocas,
            "  store %struct.Value* null, %struct.Value** {counter}"
        )?;
        self.rt("box_number");
        let zero = self.new_temp();
        writeln!(
            self.body,
            "  {zero} = call %struct.Value* @box_number(double 0.0)"
        )?;
        self.emit_store_slot(&zero, &counter)?;

        let header = self.new_label();
        let body_label = self.new_label();
        let update = self.new_label();
        let end = self.new_label();

        self.emit_br(&header)?;
        self.emit_label(&header)?;
        let current = self.emit_load_slot(&counter)?;
        let cond = self.emit_value_call("value_less_than", &[&current, &limit])?;
        let cond_i1 = self.emit_truthy(&cond)?;
        self.emit_release(&cond)?;
        self.emit_cond_br(&cond_i1, &body_label, &end)?;

        self.emit_label(&body_label)?;
        self.block_terminated = false;
        self.push_loop_scope(&end, &update, loop_stmt.label.clone());
        self.lower_block_stmts(&loop_stmt.body)?;
        self.pop_loop_scope();
        if !self.block_terminated {
            self.emit_br(&update)?;
        }
        self.block_terminated = false;

        self.emit_label(&update)?;
        let old = self.emit_load_slot(&counter)?;
        self.rt("box_number");
        let one = self.new_temp();
        writeln!(
            self.body,
            "  {one} = call %struct.Value* @box_number(double 1.0)"
        )?;
        let next = self.emit_value_call("value_add", &[&old, &one])?;
        self.emit_release(&old)?;
        self.emit_release(&one)?;
        self.emit_store_slot(&next, &counter)?;
        self.emit_br(&header)?;

        self.emit_label(&end)?;
        let last = self.emit_load_slot(&counter)?;
        self.emit_release(&last)?;
        if limit_owned {
            self.emit_release(&limit)?;
        }
        Ok(())
    }

    /// `L>(init; cond; update) { ... }`. The loop variable lives in its own
    /// lexical scope around the whole loop.
    fn lower_for(
        &mut self,
        init: Option<&Stmt>,
        condition: Option<&Expr>,
        update: Option<&Stmt>,
        loop_stmt: &LoopStmt,
    ) -> Result<(), CodeGenError> {
        self.enter_scope();

        let header = self.new_label();
        let body_label = self.new_label();
        let update_label = self.new_label();
        let end = self.new_label();

        if let Some(init) = init {
            self.lower_stmt(init)?;
        }

        self.emit_br(&header)?;
        self.emit_label(&header)?;
        match condition {
            Some(condition) => {
                let cond_val = self.lower_expr_value(condition)?;
                let cond_i1 = self.emit_truthy(&cond_val)?;
                self.release_all_temps()?;
                self.emit_cond_br(&cond_i1, &body_label, &end)?;
            }
            None => self.emit_br(&body_label)?,
        }

        self.emit_label(&body_label)?;
        self.block_terminated = false;
        self.push_loop_scope(&end, &update_label, loop_stmt.label.clone());
        self.lower_block_stmts(&loop_stmt.body)?;
        self.pop_loop_scope();
        if !self.block_terminated {
            self.emit_br(&update_label)?;
        }
        self.block_terminated = false;

        self.emit_label(&update_label)?;
        if let Some(update) = update {
            self.lower_stmt(update)?;
        }
        self.emit_br(&header)?;

        self.emit_label(&end)?;
        self.emit_scope_exit_cleanup()?;
        self.exit_scope();
        Ok(())
    }

    /// `L>(iterable : name) { ... }`: index over `[0, len)`, the binding
    /// owns each element for one iteration.
    fn lower_foreach(
        &mut self,
        iterable: &Expr,
        binding: &str,
        loop_stmt: &LoopStmt,
    ) -> Result<(), CodeGenError> {
        self.enter_scope();

        let array = self.lower_expr_value(iterable)?;
        let array_owned = self.is_owned_temp(&array);
        self.release_temps_except(&array)?;

        let binding_slot = self.declare_local(binding)?;

        self.rt("value_array_length");
        let length = self.new_temp();
        writeln!(
            self.body,
            "  {length} = call i64 @value_array_length(%struct.Value* {array})"
        )?;

        let index_slot = self.new_slot("idx");
        writeln!(self.entry_allocas, "  {index_slot} = alloca i64")?;
        writeln!(self.body, "  store i64 0, i64* {index_slot}")?;

        let header = self.new_label();
        let body_label = self.new_label();
        let update = self.new_label();
        let end = self.new_label();

        self.emit_br(&header)?;
        self.emit_label(&header)?;
        let index_val = self.new_temp();
        writeln!(self.body, "  {index_val} = load i64, i64* {index_slot}")?;
        let cond = self.new_temp();
        writeln!(self.body, "  {cond} = icmp slt i64 {index_val}, {length}")?;
        self.emit_cond_br(&cond, &body_label, &end)?;

        self.emit_label(&body_label)?;
        self.block_terminated = false;
        let current = self.new_temp();
        writeln!(self.body, "  {current} = load i64, i64* {index_slot}")?;
        let as_double = self.new_temp();
        writeln!(self.body, "  {as_double} = sitofp i64 {current} to double")?;
        self.rt("box_number");
        let boxed_index = self.new_temp();
        writeln!(
            self.body,
            "  {boxed_index} = call %struct.Value* @box_number(double {as_double})"
        )?;
        self.rt("value_array_get");
        let element = self.new_temp();
        writeln!(
            self.body,
            "  {element} = call %struct.Value* @value_array_get(%struct.Value* {array}, %struct.Value* {boxed_index})"
        )?;
        // `value_array_get` borrows; the binding owns its element.
        self.emit_retain(&element)?;
        self.emit_release(&boxed_index)?;
        let old = self.emit_load_slot(&binding_slot)?;
        self.emit_release(&old)?;
        self.emit_store_slot(&element, &binding_slot)?;

        self.push_loop_scope(&end, &update, loop_stmt.label.clone());
        self.lower_block_stmts(&loop_stmt.body)?;
        self.pop_loop_scope();
        if !self.block_terminated {
            self.emit_br(&update)?;
        }
        self.block_terminated = false;

        self.emit_label(&update)?;
        let old_index = self.new_temp();
        writeln!(self.body, "  {old_index} = load i64, i64* {index_slot}")?;
        let new_index = self.new_temp();
        writeln!(self.body, "  {new_index} = add i64 {old_index}, 1")?;
        writeln!(self.body, "  store i64 {new_index}, i64* {index_slot}")?;
        self.emit_br(&header)?;

        self.emit_label(&end)?;
        self.emit_scope_exit_cleanup()?;
        self.exit_scope();
        if array_owned {
            self.emit_release(&array)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Try / catch / finally
    // ------------------------------------------------------------------

    fn lower_try(
        &mut self,
        try_block: &Block,
        catch_param: Option<&str>,
        catch_block: Option<&Block>,
        finally_block: Option<&Block>,
    ) -> Result<(), CodeGenError> {
        let saved_in_try = self.in_try_catch;
        self.in_try_catch = true;

        self.rt("value_clear_error");
        writeln!(self.body, "  call %struct.Value* @value_clear_error()")?;

        let catch_label = self.new_label();
        let finally_label = self.new_label();
        let end_label = self.new_label();
        let fail_target = if catch_block.is_some() {
            catch_label.clone()
        } else if finally_block.is_some() {
            finally_label.clone()
        } else {
            end_label.clone()
        };

        // The catch binding is visible to both arms; it is caller-owned
        // error state, not a tracked local.
        if let (Some(param), Some(_)) = (catch_param, catch_block) {
            if self.lookup_slot(param).is_none() {
                let slot = format!("%{param}");
                writeln!(self.entry_allocas, "  {slot} = alloca %struct.Value*")?;
                writeln!(
                    self.entry_allocas,
                    "  store %struct.Value* null, %struct.Value** {slot}"
                )?;
                self.register_param(param, &slot);
            }
        }

        self.enter_scope();
        for stmt in &try_block.statements {
            if self.block_terminated {
                break;
            }
            self.lower_stmt(stmt)?;
            if self.block_terminated {
                break;
            }
            // After every statement inside the try block, check the error
            // channel.
            self.rt("value_is_ok");
            let ok_val = self.new_temp();
            writeln!(self.body, "  {ok_val} = call %struct.Value* @value_is_ok()")?;
            let ok_i1 = self.emit_truthy(&ok_val)?;
            let continue_label = self.new_label();
            self.emit_cond_br(&ok_i1, &continue_label, &fail_target)?;
            self.emit_label(&continue_label)?;
        }
        if !self.block_terminated {
            self.emit_scope_exit_cleanup()?;
        }
        self.exit_scope();
        if !self.block_terminated {
            let after_try = if finally_block.is_some() {
                &finally_label
            } else {
                &end_label
            };
            self.emit_br(after_try)?;
        }
        self.block_terminated = false;

        if let Some(block) = catch_block {
            self.emit_label(&catch_label)?;

            if let Some(param) = catch_param {
                let slot = self
                    .lookup_slot(param)
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("%{param}"));
                let message = self.emit_value_call("value_last_error", &[])?;
                let code = self.emit_value_call("value_last_status", &[])?;
                self.rt("unbox_number");
                let status_num = self.new_temp();
                writeln!(
                    self.body,
                    "  {status_num} = call double @unbox_number(%struct.Value* {code})"
                )?;
                let status_int = self.new_temp();
                writeln!(self.body, "  {status_int} = fptosi double {status_num} to i32")?;
                // Status 3 is TYPE_ERROR.
                let is_type_error = self.new_temp();
                writeln!(self.body, "  {is_type_error} = icmp eq i32 {status_int}, 3")?;

                let type_error_label = self.get_string_global(b"TypeError")?;
                let type_error_ptr = self.emit_string_ptr(&type_error_label, 9)?;
                let generic_label = self.get_string_global(b"Error")?;
                let generic_ptr = self.emit_string_ptr(&generic_label, 5)?;
                let selected = self.new_temp();
                writeln!(
                    self.body,
                    "  {selected} = select i1 {is_type_error}, i8* {type_error_ptr}, i8* {generic_ptr}"
                )?;
                self.rt("box_string");
                let type_str = self.new_temp();
                writeln!(
                    self.body,
                    "  {type_str} = call %struct.Value* @box_string(i8* {selected})"
                )?;

                let error_obj = self.emit_value_call(
                    "create_error_object",
                    &[&message, &code, &type_str],
                )?;
                let old = self.emit_load_slot(&slot)?;
                self.emit_release(&old)?;
                self.emit_store_slot(&error_obj, &slot)?;
                self.emit_release(&message)?;
                self.emit_release(&code)?;
                self.emit_release(&type_str)?;
            }

            self.rt("value_clear_error");
            writeln!(self.body, "  call %struct.Value* @value_clear_error()")?;

            self.block_terminated = false;
            self.enter_scope();
            self.lower_block_stmts(block)?;
            if !self.block_terminated {
                self.emit_scope_exit_cleanup()?;
            }
            self.exit_scope();
            if !self.block_terminated {
                let after_catch = if finally_block.is_some() {
                    &finally_label
                } else {
                    &end_label
                };
                self.emit_br(after_catch)?;
            }
            self.block_terminated = false;
        }

        if let Some(block) = finally_block {
            self.emit_label(&finally_label)?;
            self.block_terminated = false;
            self.enter_scope();
            self.lower_block_stmts(block)?;
            if !self.block_terminated {
                self.emit_scope_exit_cleanup()?;
            }
            self.exit_scope();
            if !self.block_terminated {
                self.emit_br(&end_label)?;
            }
            self.block_terminated = false;
        }

        self.emit_label(&end_label)?;
        self.in_try_catch = saved_in_try;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Functions and closures
    // ------------------------------------------------------------------

    /// Lower a function declaration. Top-level definitions land in the main
    /// code buffer; nested ones land in the globals buffer and a closure
    /// value is constructed in the enclosing function. `NestedExpr` returns
    /// the closure temp instead of storing it.
    pub(super) fn lower_function(
        &mut self,
        func: &FuncDecl,
        placement: Placement,
    ) -> Result<Option<String>, CodeGenError> {
        let llvm_name = super::program::llvm_function_name(&func.name);
        let nested = placement != Placement::TopLevel;

        // Named nested functions bind their slot before capture analysis so
        // recursion resolves to a self-capture.
        let named_slot = if placement == Placement::NestedNamed {
            Some(self.declare_local(&func.name)?)
        } else {
            None
        };

        let captures = if nested {
            closure::analyze_captures(self, func)
        } else {
            Vec::new()
        };

        // Signature: optional self, declared parameters, captures last.
        let mut sig_parts = Vec::new();
        if func.uses_self {
            sig_parts.push("%struct.Value* %param_self".to_string());
        }
        for param in &func.params {
            sig_parts.push(format!("%struct.Value* %param_{param}"));
        }
        for captured in &captures {
            sig_parts.push(format!("%struct.Value* %captured_{captured}"));
        }
        let header = format!(
            "define %struct.Value* @{llvm_name}({}) {{",
            sig_parts.join(", ")
        );

        let frame = self.begin_function();
        let saved_captured = self.current_captured.replace(captures.clone());
        self.function_depth += 1;

        // Parameters and captures get local slots; their lifetime is owned
        // by the caller, so they never join the scope tracker.
        if func.uses_self {
            writeln!(self.entry_allocas, "  %self = alloca %struct.Value*")?;
            writeln!(
                self.entry_allocas,
                "  store %struct.Value* %param_self, %struct.Value** %self"
            )?;
            self.register_param("self", "%self");
        }
        for param in &func.params {
            writeln!(self.entry_allocas, "  %{param} = alloca %struct.Value*")?;
            writeln!(
                self.entry_allocas,
                "  store %struct.Value* %param_{param}, %struct.Value** %{param}"
            )?;
            self.register_param(param, &format!("%{param}"));
        }
        for captured in &captures {
            writeln!(self.entry_allocas, "  %{captured} = alloca %struct.Value*")?;
            writeln!(
                self.entry_allocas,
                "  store %struct.Value* %captured_{captured}, %struct.Value** %{captured}"
            )?;
            self.register_param(captured, &format!("%{captured}"));
        }

        // The body's trailing expression statement is the function's
        // result; everything else falls through to the null epilogue.
        if let Some((last, init_stmts)) = func.body.statements.split_last() {
            for stmt in init_stmts {
                if self.block_terminated {
                    break;
                }
                self.lower_stmt(stmt)?;
            }
            if !self.block_terminated {
                if let StmtKind::ExprStmt(expr) = &last.kind {
                    match self.lower_expr(expr)? {
                        Some(result) => {
                            self.take_ownership(&result)?;
                            self.emit_function_cleanup()?;
                            writeln!(self.body, "  ret %struct.Value* {result}")?;
                            self.block_terminated = true;
                        }
                        None => self.release_all_temps()?,
                    }
                } else {
                    self.lower_stmt(last)?;
                }
            }
        }

        // Fall-through epilogue: release all locals and return null.
        let default_label = self.new_label();
        if !self.block_terminated {
            self.emit_br(&default_label)?;
        }
        self.emit_label(&default_label)?;
        self.block_terminated = false;
        self.emit_function_cleanup()?;
        self.rt("box_null");
        let default_ret = self.new_temp();
        writeln!(
            self.body,
            "  {default_ret} = call %struct.Value* @box_null()"
        )?;
        writeln!(self.body, "  ret %struct.Value* {default_ret}")?;

        self.function_depth -= 1;
        self.current_captured = saved_captured;
        let (entry, body) = self.end_function(frame);
        let text = format!("\n{header}\n{entry}{body}}}\n");
        if nested {
            self.globals_buf.push_str(&text);
        } else {
            self.code.push_str(&text);
        }

        if !nested {
            return Ok(None);
        }

        // Construct the closure value in the enclosing function.
        let signature = closure_signature(func, captures.len());
        let fn_val = if captures.is_empty() {
            self.rt("box_function");
            let fn_val = self.new_temp();
            writeln!(
                self.body,
                "  {fn_val} = call %struct.Value* @box_function(i8* bitcast (%struct.Value* ({signature})* @{llvm_name} to i8*), %struct.Value** null, i32 0, i32 {}, i32 {})",
                func.params.len(),
                if func.uses_self { 1 } else { 0 }
            )?;
            fn_val
        } else {
            let caps_slot = self.new_slot("caps");
            writeln!(
                self.entry_allocas,
                "  {caps_slot} = alloca [{} x %struct.Value*]",
                captures.len()
            )?;
            for (i, captured) in captures.iter().enumerate() {
                let slot = self
                    .lookup_slot(captured)
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("%{captured}"));
                let loaded = self.emit_load_slot(&slot)?;
                self.emit_retain(&loaded)?;
                let elem_ptr = self.new_temp();
                writeln!(
                    self.body,
                    "  {elem_ptr} = getelementptr inbounds [{n} x %struct.Value*], [{n} x %struct.Value*]* {caps_slot}, i64 0, i64 {i}",
                    n = captures.len()
                )?;
                writeln!(
                    self.body,
                    "  store %struct.Value* {loaded}, %struct.Value** {elem_ptr}"
                )?;
            }
            let caps_ptr = self.new_temp();
            writeln!(
                self.body,
                "  {caps_ptr} = getelementptr inbounds [{n} x %struct.Value*], [{n} x %struct.Value*]* {caps_slot}, i64 0, i64 0",
                n = captures.len()
            )?;
            self.rt("box_function");
            let fn_val = self.new_temp();
            writeln!(
                self.body,
                "  {fn_val} = call %struct.Value* @box_function(i8* bitcast (%struct.Value* ({signature})* @{llvm_name} to i8*), %struct.Value** {caps_ptr}, i32 {}, i32 {}, i32 {})",
                captures.len(),
                func.params.len(),
                if func.uses_self { 1 } else { 0 }
            )?;
            fn_val
        };

        match placement {
            Placement::NestedNamed => {
                let slot = named_slot.expect("named nested function has a slot");
                self.emit_store_slot(&fn_val, &slot)?;
                // Self-referencing closure: patch the captured slot so the
                // closure can call itself.
                if let Some(index) = captures.iter().position(|c| c == &func.name) {
                    self.rt("update_closure_captured");
                    writeln!(
                        self.body,
                        "  call void @update_closure_captured(%struct.Value* {fn_val}, i32 {index}, %struct.Value* {fn_val})"
                    )?;
                }
                self.closures.insert(
                    func.name.clone(),
                    ClosureInfo {
                        func_name: llvm_name,
                        captures,
                        param_count: func.params.len(),
                        uses_self: func.uses_self,
                    },
                );
                Ok(None)
            }
            Placement::NestedExpr => {
                self.note_temp(&fn_val);
                Ok(Some(fn_val))
            }
            Placement::TopLevel => unreachable!("handled above"),
        }
    }
}
