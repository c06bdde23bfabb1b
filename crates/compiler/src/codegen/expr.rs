//! Expression lowering.
//!
//! Every expression evaluates to an owned `%struct.Value*` temporary.
//! Freshly-produced owned temporaries are recorded on the temp value stack;
//! loads from variable slots are borrowed and stay off the stack. At each
//! consumption point (store into a variable, return, container element,
//! statement discard) exactly one value is exempted from release.

use std::fmt::Write as _;

use super::state::fmt_double;
use super::{CodeGen, CodeGenError, Placement};
use crate::ast::{BinaryOp, Expr, ExprKind, UnaryOp};
use crate::builtins;
use crate::source_map::SourceLocation;

impl CodeGen {
    /// Lower an expression. `None` means the expression produced no value
    /// (the `print` family of special forms).
    pub(super) fn lower_expr(&mut self, expr: &Expr) -> Result<Option<String>, CodeGenError> {
        match &expr.kind {
            ExprKind::Num { value, .. } => {
                self.rt("box_number");
                let t = self.new_temp();
                writeln!(
                    self.body,
                    "  {t} = call %struct.Value* @box_number(double {})",
                    fmt_double(*value)
                )?;
                self.note_temp(&t);
                Ok(Some(t))
            }
            ExprKind::Str(bytes) => {
                let label = self.get_string_global(bytes)?;
                let ptr = self.emit_string_ptr(&label, bytes.len())?;
                self.rt("box_string_with_length");
                let t = self.new_temp();
                writeln!(
                    self.body,
                    "  {t} = call %struct.Value* @box_string_with_length(i8* {ptr}, i64 {})",
                    bytes.len()
                )?;
                self.note_temp(&t);
                Ok(Some(t))
            }
            ExprKind::Bool(value) => {
                self.rt("box_bool");
                let t = self.new_temp();
                writeln!(
                    self.body,
                    "  {t} = call %struct.Value* @box_bool(i32 {})",
                    if *value { 1 } else { 0 }
                )?;
                self.note_temp(&t);
                Ok(Some(t))
            }
            ExprKind::Null => {
                let t = self.emit_value_call("box_null", &[])?;
                self.note_temp(&t);
                Ok(Some(t))
            }
            ExprKind::Undef => {
                let t = self.emit_value_call("box_undef", &[])?;
                self.note_temp(&t);
                Ok(Some(t))
            }
            ExprKind::SelfRef => {
                if self.lookup_slot("self").is_some() {
                    let t = self.emit_load_slot("%self")?;
                    Ok(Some(t))
                } else {
                    self.rt("box_undef");
                    let t = self.new_temp();
                    writeln!(
                        self.body,
                        "  {t} = call %struct.Value* @box_undef()  ; 'self' outside method"
                    )?;
                    self.note_temp(&t);
                    Ok(Some(t))
                }
            }
            ExprKind::Identifier(name) => self.lower_identifier(name),
            ExprKind::Binary { op, left, right } => self.lower_binary(*op, left, right),
            ExprKind::Unary {
                op,
                operand,
                is_postfix,
            } => self.lower_unary(*op, operand, *is_postfix, expr.loc),
            ExprKind::Ternary {
                condition,
                then_expr,
                else_expr,
            } => self.lower_ternary(condition, then_expr, else_expr),
            ExprKind::Call {
                callee,
                args,
                throw_on_error,
            } => self.lower_call(callee, args, *throw_on_error, expr.loc),
            ExprKind::Array { elements, spread } => self.lower_array_literal(elements, spread),
            ExprKind::Object { properties } => self.lower_object_literal(properties),
            ExprKind::Member {
                object,
                property,
                is_optional,
                is_unbound,
            } => self.lower_member(object, property, *is_optional, *is_unbound),
            ExprKind::Index { object, index } => self.lower_index(object, index),
            ExprKind::Chain { object, links } => self.lower_chain(object, links),
            ExprKind::Func(func) => {
                let closure = self.lower_function(func, Placement::NestedExpr)?;
                Ok(closure)
            }
        }
    }

    /// Lower an expression that must yield a value; a valueless special form
    /// contributes `box_null()`.
    pub(super) fn lower_expr_value(&mut self, expr: &Expr) -> Result<String, CodeGenError> {
        match self.lower_expr(expr)? {
            Some(value) => Ok(value),
            None => {
                let t = self.emit_value_call("box_null", &[])?;
                self.note_temp(&t);
                Ok(t)
            }
        }
    }

    fn lower_identifier(&mut self, name: &str) -> Result<Option<String>, CodeGenError> {
        if let Some(slot) = self.lookup_slot(name).map(str::to_string) {
            // Loading a variable borrows the slot's reference.
            let t = self.emit_load_slot(&slot)?;
            return Ok(Some(t));
        }
        // A top-level function referenced as a value becomes a function
        // value with no captures.
        if let Some(sig) = self.functions.get(name).cloned() {
            let llvm_name = super::program::llvm_function_name(name);
            self.rt("box_function");
            let t = self.new_temp();
            let slot_count = sig.param_count + usize::from(sig.uses_self);
            let params = vec!["%struct.Value*"; slot_count].join(", ");
            writeln!(
                self.body,
                "  {t} = call %struct.Value* @box_function(i8* bitcast (%struct.Value* ({params})* @{llvm_name} to i8*), %struct.Value** null, i32 0, i32 {}, i32 {})",
                sig.param_count,
                i32::from(sig.uses_self)
            )?;
            self.note_temp(&t);
            return Ok(Some(t));
        }
        // Undefined identifiers evaluate to undef, consistent with dynamic
        // semantics.
        self.rt("box_undef");
        let t = self.new_temp();
        writeln!(
            self.body,
            "  {t} = call %struct.Value* @box_undef()  ; undef variable '{name}'"
        )?;
        self.note_temp(&t);
        Ok(Some(t))
    }

    fn lower_binary(
        &mut self,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
    ) -> Result<Option<String>, CodeGenError> {
        let lhs = self.lower_expr_value(left)?;
        let rhs = self.lower_expr_value(right)?;

        let simple = match op {
            BinaryOp::Add => Some("value_add"),
            BinaryOp::Sub => Some("value_subtract"),
            BinaryOp::Mul => Some("value_multiply"),
            BinaryOp::Div => Some("value_divide"),
            BinaryOp::Mod => Some("value_modulo"),
            BinaryOp::Pow => Some("value_power"),
            BinaryOp::Lt => Some("value_less_than"),
            BinaryOp::Gt => Some("value_greater_than"),
            BinaryOp::Eq => Some("value_equals"),
            BinaryOp::BitAnd => Some("value_bit_and"),
            BinaryOp::BitOr => Some("value_bit_or"),
            BinaryOp::BitXor => Some("value_bit_xor"),
            _ => None,
        };
        if let Some(symbol) = simple {
            let result = self.emit_value_call(symbol, &[&lhs, &rhs])?;
            self.note_temp(&result);
            return Ok(Some(result));
        }

        match op {
            // `<=` is `!(a > b)`, `>=` is `!(a < b)`, `!=` is `!(a == b)`.
            BinaryOp::Le | BinaryOp::Ge | BinaryOp::Ne => {
                let symbol = match op {
                    BinaryOp::Le => "value_greater_than",
                    BinaryOp::Ge => "value_less_than",
                    _ => "value_equals",
                };
                let raw = self.emit_value_call(symbol, &[&lhs, &rhs])?;
                self.note_temp(&raw);
                let result = self.emit_not(&raw)?;
                self.note_temp(&result);
                Ok(Some(result))
            }
            // Both operands are always evaluated; the truthiness bits are
            // combined without control flow.
            BinaryOp::And | BinaryOp::Or => {
                let lhs_i1 = self.emit_truthy(&lhs)?;
                let rhs_i1 = self.emit_truthy(&rhs)?;
                let combined = self.new_temp();
                let opcode = if op == BinaryOp::And { "and" } else { "or" };
                writeln!(self.body, "  {combined} = {opcode} i1 {lhs_i1}, {rhs_i1}")?;
                let as_i32 = self.new_temp();
                writeln!(self.body, "  {as_i32} = zext i1 {combined} to i32")?;
                self.rt("box_bool");
                let result = self.new_temp();
                writeln!(
                    self.body,
                    "  {result} = call %struct.Value* @box_bool(i32 {as_i32})"
                )?;
                self.note_temp(&result);
                Ok(Some(result))
            }
            _ => unreachable!("binary operator handled above"),
        }
    }

    fn lower_unary(
        &mut self,
        op: UnaryOp,
        operand: &Expr,
        is_postfix: bool,
        loc: SourceLocation,
    ) -> Result<Option<String>, CodeGenError> {
        if matches!(op, UnaryOp::Inc | UnaryOp::Dec) {
            let Some(name) = operand.identifier_name().map(str::to_string) else {
                return Err(self.error_at(
                    loc,
                    None,
                    "'++' and '--' can only be applied to variables",
                ));
            };
            let Some(slot) = self.lookup_slot(&name).map(str::to_string) else {
                return Err(self.error_at(loc, Some(&name), "Undefined variable in '++'/'--'"));
            };

            let old_val = self.emit_load_slot(&slot)?;
            self.rt("box_number");
            let one = self.new_temp();
            writeln!(
                self.body,
                "  {one} = call %struct.Value* @box_number(double 1.0)"
            )?;
            self.note_temp(&one);
            let symbol = if op == UnaryOp::Inc {
                "value_add"
            } else {
                "value_subtract"
            };
            let new_val = self.emit_value_call(symbol, &[&old_val, &one])?;
            self.emit_store_slot(&new_val, &slot)?;

            return if is_postfix {
                // The slot's previous reference transfers to the expression.
                self.note_temp(&old_val);
                Ok(Some(old_val))
            } else {
                // The slot and the expression each need their own reference.
                self.emit_release(&old_val)?;
                self.emit_retain(&new_val)?;
                self.note_temp(&new_val);
                Ok(Some(new_val))
            };
        }

        let value = self.lower_expr_value(operand)?;
        match op {
            UnaryOp::Pos => Ok(Some(value)),
            UnaryOp::Neg => {
                self.rt("box_number");
                let neg_one = self.new_temp();
                writeln!(
                    self.body,
                    "  {neg_one} = call %struct.Value* @box_number(double -1.0)"
                )?;
                self.note_temp(&neg_one);
                let result = self.emit_value_call("value_multiply", &[&value, &neg_one])?;
                self.note_temp(&result);
                Ok(Some(result))
            }
            UnaryOp::Not => {
                let result = self.emit_not(&value)?;
                self.note_temp(&result);
                Ok(Some(result))
            }
            UnaryOp::Inc | UnaryOp::Dec => unreachable!("handled above"),
        }
    }

    /// Lower `cond ? a : b` through an entry-block result slot so each arm's
    /// temporaries are released inside its own branch.
    fn lower_ternary(
        &mut self,
        condition: &Expr,
        then_expr: &Expr,
        else_expr: &Expr,
    ) -> Result<Option<String>, CodeGenError> {
        let slot = self.new_slot("tern");
        writeln!(self.entry_allocas, "  {slot} = alloca %struct.Value*")?;
        writeln!(
            self.entry_allocas,
            "  store %struct.Value* null, %struct.Value** {slot}"
        )?;

        let cond_val = self.lower_expr_value(condition)?;
        let cond_i1 = self.emit_truthy(&cond_val)?;
        let then_label = self.new_label();
        let else_label = self.new_label();
        let end_label = self.new_label();
        self.emit_cond_br(&cond_i1, &then_label, &else_label)?;

        self.emit_label(&then_label)?;
        let mark = self.temp_mark();
        let then_val = self.lower_expr_value(then_expr)?;
        let owned = self.release_temps_since(mark, Some(&then_val))?;
        if !owned {
            self.emit_retain(&then_val)?;
        }
        self.emit_store_slot(&then_val, &slot)?;
        self.emit_br(&end_label)?;

        self.emit_label(&else_label)?;
        let mark = self.temp_mark();
        let else_val = self.lower_expr_value(else_expr)?;
        let owned = self.release_temps_since(mark, Some(&else_val))?;
        if !owned {
            self.emit_retain(&else_val)?;
        }
        self.emit_store_slot(&else_val, &slot)?;
        self.emit_br(&end_label)?;

        self.emit_label(&end_label)?;
        let result = self.emit_load_slot(&slot)?;
        self.note_temp(&result);
        Ok(Some(result))
    }

    // ------------------------------------------------------------------
    // Calls
    // ------------------------------------------------------------------

    fn lower_call(
        &mut self,
        callee: &Expr,
        args: &[Expr],
        throw_on_error: bool,
        loc: SourceLocation,
    ) -> Result<Option<String>, CodeGenError> {
        let Some(name) = callee.identifier_name().map(str::to_string) else {
            // Computed callee: evaluate it and go through the runtime
            // trampoline.
            let callee_val = self.lower_expr_value(callee)?;
            let mut arg_temps = Vec::with_capacity(args.len());
            for arg in args {
                arg_temps.push(self.lower_expr_value(arg)?);
            }
            let result = self.emit_indirect_call(&callee_val, &arg_temps)?;
            self.note_temp(&result);
            return Ok(Some(result));
        };

        // `length(arr)` with statically-known shape resolves at compile
        // time.
        if name == "length" && args.len() == 1 {
            if let Some(arr_name) = args[0].identifier_name() {
                if let Some(meta) = self.arrays.get(arr_name).cloned() {
                    self.rt("box_number");
                    let t = self.new_temp();
                    writeln!(
                        self.body,
                        "  {t} = call %struct.Value* @box_number(double {})  ; length of {arr_name}",
                        fmt_double(meta.elem_count as f64)
                    )?;
                    self.note_temp(&t);
                    return Ok(Some(t));
                }
            }
        }

        let mut arg_temps = Vec::with_capacity(args.len());
        for arg in args {
            arg_temps.push(self.lower_expr_value(arg)?);
        }
        self.lower_named_call(&name, arg_temps, throw_on_error, loc)
    }

    /// Dispatch a call by name with already-lowered argument temps. Shared
    /// between plain calls and `.>` chain links (where the receiver has been
    /// prepended to `args`).
    pub(super) fn lower_named_call(
        &mut self,
        name: &str,
        args: Vec<String>,
        throw_on_error: bool,
        loc: SourceLocation,
    ) -> Result<Option<String>, CodeGenError> {
        // I/O special forms first.
        match name {
            "print" => {
                self.rt("value_print");
                for arg in &args {
                    writeln!(self.body, "  call void @value_print(%struct.Value* {arg})")?;
                }
                return Ok(None);
            }
            "println" => {
                if args.is_empty() {
                    let label = self.get_string_global(b"\n")?;
                    self.rt("printf");
                    writeln!(
                        self.body,
                        "  call i32 (i8*, ...) @printf(i8* getelementptr inbounds ([2 x i8], [2 x i8]* {label}, i32 0, i32 0))"
                    )?;
                } else {
                    self.rt("value_println");
                    for arg in &args {
                        writeln!(
                            self.body,
                            "  call void @value_println(%struct.Value* {arg})"
                        )?;
                    }
                }
                return Ok(None);
            }
            "printf" => {
                if let Some((fmt, rest)) = args.split_first() {
                    let fmt = fmt.clone();
                    self.emit_printf(&fmt, rest)?;
                }
                return Ok(None);
            }
            "typeOf" if args.len() == 1 => {
                self.rt("value_typeof");
                self.rt("box_string");
                let type_str = self.new_temp();
                writeln!(
                    self.body,
                    "  {type_str} = call i8* @value_typeof(%struct.Value* {})",
                    args[0]
                )?;
                let result = self.new_temp();
                writeln!(
                    self.body,
                    "  {result} = call %struct.Value* @box_string(i8* {type_str})"
                )?;
                self.note_temp(&result);
                return Ok(Some(result));
            }
            _ => {}
        }

        // A locally-constructed closure is called directly, captures
        // appended from their slots.
        if let Some(info) = self.closures.get(name).cloned() {
            let mut call_args = Vec::new();
            if info.uses_self {
                let null_self = self.emit_value_call("box_null", &[])?;
                self.note_temp(&null_self);
                call_args.push(null_self);
            }
            call_args.extend(args.iter().cloned());
            for captured in &info.captures {
                if let Some(slot) = self.lookup_slot(captured).map(str::to_string) {
                    let loaded = self.emit_load_slot(&slot)?;
                    call_args.push(loaded);
                }
            }
            let result = self.new_temp();
            write!(
                self.body,
                "  {result} = call %struct.Value* @{}(",
                info.func_name
            )?;
            for (i, arg) in call_args.iter().enumerate() {
                if i > 0 {
                    write!(self.body, ", ")?;
                }
                write!(self.body, "%struct.Value* {arg}")?;
            }
            writeln!(self.body, ")")?;
            self.note_temp(&result);
            return Ok(Some(result));
        }

        // A variable holding an opaque function value goes through the
        // runtime trampoline.
        if let Some(slot) = self.lookup_slot(name).map(str::to_string) {
            let fn_val = self.emit_load_slot(&slot)?;
            let result = self.emit_indirect_call(&fn_val, &args)?;
            self.note_temp(&result);
            return Ok(Some(result));
        }

        if let Some(builtin) = builtins::lookup(name) {
            return self.lower_builtin_call(builtin, args, throw_on_error, loc);
        }

        // Top-level function: direct call, matching the definition's
        // signature exactly (missing arguments become undef, extras are
        // dropped and released at the statement boundary).
        let llvm_name = super::program::llvm_function_name(name);
        let mut call_args = args;
        if let Some(sig) = self.functions.get(name).cloned() {
            while call_args.len() < sig.param_count {
                let pad = self.emit_value_call("box_undef", &[])?;
                self.note_temp(&pad);
                call_args.push(pad);
            }
            call_args.truncate(sig.param_count);
            if sig.uses_self {
                let null_self = self.emit_value_call("box_null", &[])?;
                self.note_temp(&null_self);
                call_args.insert(0, null_self);
            }
        }
        let result = self.new_temp();
        write!(self.body, "  {result} = call %struct.Value* @{llvm_name}(")?;
        for (i, arg) in call_args.iter().enumerate() {
            if i > 0 {
                write!(self.body, ", ")?;
            }
            write!(self.body, "%struct.Value* {arg}")?;
        }
        writeln!(self.body, ")")?;
        self.note_temp(&result);
        Ok(Some(result))
    }

    fn lower_builtin_call(
        &mut self,
        builtin: &'static builtins::Builtin,
        mut args: Vec<String>,
        throw_on_error: bool,
        loc: SourceLocation,
    ) -> Result<Option<String>, CodeGenError> {
        if builtin.max_args != builtins::VARIADIC
            && (args.len() < builtin.min_args || args.len() > builtin.max_args)
        {
            return Err(self.error_at(
                loc,
                None,
                &format!(
                    "'{}' expects {}..{} arguments, got {}",
                    builtin.name,
                    builtin.min_args,
                    builtin.max_args,
                    args.len()
                ),
            ));
        }

        // Pad optional arguments with null; `exit()` defaults to status 0.
        while builtin.max_args != builtins::VARIADIC && args.len() < builtin.max_args {
            let pad = if builtin.name == "exit" {
                self.rt("box_number");
                let t = self.new_temp();
                writeln!(
                    self.body,
                    "  {t} = call %struct.Value* @box_number(double 0.0)"
                )?;
                t
            } else {
                self.emit_value_call("box_null", &[])?
            };
            self.note_temp(&pad);
            args.push(pad);
        }

        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let symbol: &'static str = builtin.symbol;
        let result = self.emit_value_call(symbol, &arg_refs)?;
        self.note_temp(&result);

        if builtin.error_channel {
            self.emit_error_check(throw_on_error)?;
        }
        Ok(Some(result))
    }

    /// `value_call_function(fn, args_ptr, argc)` on an opaque function
    /// value.
    fn emit_indirect_call(
        &mut self,
        fn_val: &str,
        args: &[String],
    ) -> Result<String, CodeGenError> {
        self.rt("value_call_function");
        let args_ptr = if args.is_empty() {
            let null_ptr = self.new_temp();
            writeln!(self.body, "  {null_ptr} = inttoptr i64 0 to %struct.Value**")?;
            null_ptr
        } else {
            let slot = self.new_slot("callargs");
            writeln!(
                self.entry_allocas,
                "  {slot} = alloca [{} x %struct.Value*]",
                args.len()
            )?;
            for (i, arg) in args.iter().enumerate() {
                let elem_ptr = self.new_temp();
                writeln!(
                    self.body,
                    "  {elem_ptr} = getelementptr inbounds [{n} x %struct.Value*], [{n} x %struct.Value*]* {slot}, i64 0, i64 {i}",
                    n = args.len()
                )?;
                writeln!(
                    self.body,
                    "  store %struct.Value* {arg}, %struct.Value** {elem_ptr}"
                )?;
            }
            let ptr = self.new_temp();
            writeln!(
                self.body,
                "  {ptr} = getelementptr inbounds [{n} x %struct.Value*], [{n} x %struct.Value*]* {slot}, i64 0, i64 0",
                n = args.len()
            )?;
            ptr
        };
        let result = self.new_temp();
        writeln!(
            self.body,
            "  {result} = call %struct.Value* @value_call_function(%struct.Value* {fn_val}, %struct.Value** {args_ptr}, i64 {})",
            args.len()
        )?;
        Ok(result)
    }

    fn emit_printf(&mut self, fmt: &str, rest: &[String]) -> Result<(), CodeGenError> {
        self.rt("value_printf");
        if rest.is_empty() {
            let null_ptr = self.new_temp();
            writeln!(self.body, "  {null_ptr} = inttoptr i64 0 to %struct.Value**")?;
            writeln!(
                self.body,
                "  call void @value_printf(%struct.Value* {fmt}, %struct.Value** {null_ptr}, i64 0)"
            )?;
            return Ok(());
        }
        let slot = self.new_slot("printfargs");
        writeln!(
            self.entry_allocas,
            "  {slot} = alloca [{} x %struct.Value*]",
            rest.len()
        )?;
        for (i, arg) in rest.iter().enumerate() {
            let elem_ptr = self.new_temp();
            writeln!(
                self.body,
                "  {elem_ptr} = getelementptr inbounds [{n} x %struct.Value*], [{n} x %struct.Value*]* {slot}, i64 0, i64 {i}",
                n = rest.len()
            )?;
            writeln!(
                self.body,
                "  store %struct.Value* {arg}, %struct.Value** {elem_ptr}"
            )?;
        }
        let ptr = self.new_temp();
        writeln!(
            self.body,
            "  {ptr} = getelementptr inbounds [{n} x %struct.Value*], [{n} x %struct.Value*]* {slot}, i64 0, i64 0",
            n = rest.len()
        )?;
        writeln!(
            self.body,
            "  call void @value_printf(%struct.Value* {fmt}, %struct.Value** {ptr}, i64 {})",
            rest.len()
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Literals
    // ------------------------------------------------------------------

    fn lower_array_literal(
        &mut self,
        elements: &[Expr],
        spread: &[bool],
    ) -> Result<Option<String>, CodeGenError> {
        let register_as = self.current_var_name.take();

        if elements.is_empty() {
            self.rt("box_array");
            let t = self.new_temp();
            writeln!(
                self.body,
                "  {t} = call %struct.Value* @box_array(i8* null, i64 0)  ; empty array"
            )?;
            self.note_temp(&t);
            self.current_var_name = register_as;
            return Ok(Some(t));
        }

        // Spread elements need runtime concatenation; build up from an
        // empty array. No static shape is registered for this form.
        if spread.iter().any(|&s| s) {
            self.rt("box_array");
            let mut acc = self.new_temp();
            writeln!(
                self.body,
                "  {acc} = call %struct.Value* @box_array(i8* null, i64 0)"
            )?;
            self.note_temp(&acc);
            for (element, &is_spread) in elements.iter().zip(spread) {
                let value = self.lower_expr_value(element)?;
                let symbol = if is_spread {
                    "value_concat"
                } else {
                    "value_push"
                };
                let next = self.emit_value_call(symbol, &[&acc, &value])?;
                self.note_temp(&next);
                acc = next;
            }
            self.current_var_name = register_as;
            return Ok(Some(acc));
        }

        let count = elements.len();
        let slot = self.new_slot("arr");
        writeln!(
            self.entry_allocas,
            "  {slot} = alloca [{count} x %struct.Value*]"
        )?;

        for (i, element) in elements.iter().enumerate() {
            let value = self.lower_expr_value(element)?;
            let elem_ptr = self.new_temp();
            writeln!(
                self.body,
                "  {elem_ptr} = getelementptr inbounds [{count} x %struct.Value*], [{count} x %struct.Value*]* {slot}, i64 0, i64 {i}"
            )?;
            self.transfer_into_container(&value)?;
            writeln!(
                self.body,
                "  store %struct.Value* {value}, %struct.Value** {elem_ptr}"
            )?;
        }

        let as_i8 = self.new_temp();
        writeln!(
            self.body,
            "  {as_i8} = bitcast [{count} x %struct.Value*]* {slot} to i8*"
        )?;
        self.rt("box_array");
        let result = self.new_temp();
        writeln!(
            self.body,
            "  {result} = call %struct.Value* @box_array(i8* {as_i8}, i64 {count})"
        )?;
        self.note_temp(&result);

        if let Some(var_name) = &register_as {
            self.arrays.insert(
                var_name.clone(),
                super::state::ArrayMeta {
                    ptr: slot,
                    elem_count: count,
                },
            );
        }
        self.current_var_name = register_as;
        Ok(Some(result))
    }

    fn lower_object_literal(
        &mut self,
        properties: &[(String, Expr)],
    ) -> Result<Option<String>, CodeGenError> {
        let register_as = self.current_var_name.take();

        if properties.is_empty() {
            self.rt("box_object");
            let t = self.new_temp();
            writeln!(
                self.body,
                "  {t} = call %struct.Value* @box_object(i8* null, i64 0)  ; empty object"
            )?;
            self.note_temp(&t);
            self.current_var_name = register_as;
            return Ok(Some(t));
        }

        let count = properties.len();
        let slot = self.new_slot("objent");
        writeln!(
            self.entry_allocas,
            "  {slot} = alloca [{count} x %struct.ObjectEntry]"
        )?;

        let mut fields = Vec::with_capacity(count);
        for (i, (key, value_expr)) in properties.iter().enumerate() {
            let key_label = self.get_string_global(key.as_bytes())?;
            let key_ptr = self.emit_string_ptr(&key_label, key.len())?;
            let value = self.lower_expr_value(value_expr)?;

            let entry_ptr = self.new_temp();
            writeln!(
                self.body,
                "  {entry_ptr} = getelementptr [{count} x %struct.ObjectEntry], [{count} x %struct.ObjectEntry]* {slot}, i32 0, i32 {i}"
            )?;
            let key_field = self.new_temp();
            writeln!(
                self.body,
                "  {key_field} = getelementptr %struct.ObjectEntry, %struct.ObjectEntry* {entry_ptr}, i32 0, i32 0"
            )?;
            writeln!(self.body, "  store i8* {key_ptr}, i8** {key_field}")?;
            let value_field = self.new_temp();
            writeln!(
                self.body,
                "  {value_field} = getelementptr %struct.ObjectEntry, %struct.ObjectEntry* {entry_ptr}, i32 0, i32 1"
            )?;
            self.transfer_into_container(&value)?;
            writeln!(
                self.body,
                "  store %struct.Value* {value}, %struct.Value** {value_field}"
            )?;
            fields.push((key.clone(), value_field));
        }

        let entries_ptr = self.new_temp();
        writeln!(
            self.body,
            "  {entries_ptr} = getelementptr [{count} x %struct.ObjectEntry], [{count} x %struct.ObjectEntry]* {slot}, i32 0, i32 0"
        )?;
        let as_i8 = self.new_temp();
        writeln!(
            self.body,
            "  {as_i8} = bitcast %struct.ObjectEntry* {entries_ptr} to i8*"
        )?;
        self.rt("box_object");
        let result = self.new_temp();
        writeln!(
            self.body,
            "  {result} = call %struct.Value* @box_object(i8* {as_i8}, i64 {count})"
        )?;
        self.note_temp(&result);

        if let Some(var_name) = &register_as {
            self.objects
                .insert(var_name.clone(), super::state::ObjectMeta { fields });
        }
        self.current_var_name = register_as;
        Ok(Some(result))
    }

    // ------------------------------------------------------------------
    // Member / index access
    // ------------------------------------------------------------------

    fn lower_member(
        &mut self,
        object: &Expr,
        property: &str,
        is_optional: bool,
        is_unbound: bool,
    ) -> Result<Option<String>, CodeGenError> {
        if let Some(obj_name) = object.identifier_name() {
            // `arr.length` with statically-known shape.
            if property == "length" {
                if let Some(meta) = self.arrays.get(obj_name).cloned() {
                    self.rt("box_number");
                    let t = self.new_temp();
                    writeln!(
                        self.body,
                        "  {t} = call %struct.Value* @box_number(double {})  ; {obj_name}.length",
                        fmt_double(meta.elem_count as f64)
                    )?;
                    self.note_temp(&t);
                    return Ok(Some(t));
                }
            }
            // Statically-known object field: read the entry slot directly.
            if !is_optional {
                let field_ptr = self.objects.get(obj_name).and_then(|meta| {
                    meta.fields
                        .iter()
                        .find(|(field, _)| field == property)
                        .map(|(_, ptr)| ptr.clone())
                });
                if let Some(field_ptr) = field_ptr {
                    let t = self.new_temp();
                    writeln!(
                        self.body,
                        "  {t} = load %struct.Value*, %struct.Value** {field_ptr}  ; {obj_name}.{property}"
                    )?;
                    return Ok(Some(t));
                }
            }
        }

        let obj_val = self.lower_expr_value(object)?;
        let result = self.lower_member_on_value(&obj_val, property, is_optional, is_unbound)?;
        Ok(Some(result))
    }

    /// Member access on an already-lowered object value.
    pub(super) fn lower_member_on_value(
        &mut self,
        obj_val: &str,
        property: &str,
        is_optional: bool,
        is_unbound: bool,
    ) -> Result<String, CodeGenError> {
        // Builtin property methods short-circuit to their runtime calls.
        let shortcut = match property {
            "len" | "length" => Some("value_len"),
            "upper" => Some("value_upper"),
            "lower" => Some("value_lower"),
            "trim" => Some("value_trim"),
            _ => None,
        };
        if let Some(symbol) = shortcut {
            let result = self.emit_value_call(symbol, &[obj_val])?;
            self.note_temp(&result);
            return Ok(result);
        }

        let key = self.emit_boxed_string_constant(property)?;
        self.note_temp(&key);
        let symbol = if is_optional {
            "value_get_field_safe"
        } else {
            "value_get_field"
        };
        let field = self.emit_value_call(symbol, &[obj_val, &key])?;
        self.note_temp(&field);

        if is_unbound {
            return Ok(field);
        }
        // `.>prop` access binds method values to their receiver.
        let bound = self.emit_value_call("bind_method", &[&field, obj_val])?;
        self.note_temp(&bound);
        Ok(bound)
    }

    fn lower_index(&mut self, object: &Expr, index: &Expr) -> Result<Option<String>, CodeGenError> {
        // Statically-known array: getelementptr on the cached storage.
        if let Some(arr_name) = object.identifier_name() {
            if let Some(meta) = self.arrays.get(arr_name).cloned() {
                let index_val = self.lower_expr_value(index)?;
                self.rt("unbox_number");
                let index_double = self.new_temp();
                writeln!(
                    self.body,
                    "  {index_double} = call double @unbox_number(%struct.Value* {index_val})"
                )?;
                let index_i64 = self.new_temp();
                writeln!(self.body, "  {index_i64} = fptosi double {index_double} to i64")?;
                let elem_ptr = self.new_temp();
                writeln!(
                    self.body,
                    "  {elem_ptr} = getelementptr inbounds [{n} x %struct.Value*], [{n} x %struct.Value*]* {ptr}, i64 0, i64 {index_i64}",
                    n = meta.elem_count,
                    ptr = meta.ptr
                )?;
                let element = self.new_temp();
                writeln!(
                    self.body,
                    "  {element} = load %struct.Value*, %struct.Value** {elem_ptr}"
                )?;
                // The storage owns the element; this load is a borrow.
                return Ok(Some(element));
            }
        }

        let obj_val = self.lower_expr_value(object)?;
        let index_val = self.lower_expr_value(index)?;
        let result = self.emit_value_call("value_index", &[&obj_val, &index_val])?;
        self.note_temp(&result);
        Ok(Some(result))
    }

    fn lower_chain(
        &mut self,
        object: &Expr,
        links: &[crate::ast::ChainLink],
    ) -> Result<Option<String>, CodeGenError> {
        let loc = object.loc;
        let mut current = self.lower_expr_value(object)?;
        for link in links {
            match &link.args {
                Some(args) => {
                    // `.>method(args)` is uniform call syntax:
                    // method(obj, args...).
                    let mut arg_temps = vec![current.clone()];
                    for arg in args {
                        arg_temps.push(self.lower_expr_value(arg)?);
                    }
                    current = match self.lower_named_call(
                        &link.name,
                        arg_temps,
                        link.throw_on_error,
                        loc,
                    )? {
                        Some(value) => value,
                        None => {
                            let t = self.emit_value_call("box_null", &[])?;
                            self.note_temp(&t);
                            t
                        }
                    };
                }
                None => {
                    // `.>prop` without a call: bound member access.
                    current = self.lower_member_on_value(&current, &link.name, false, false)?;
                }
            }
        }
        Ok(Some(current))
    }
}
