//! Program-level code generation and module finalization.
//!
//! With an explicit `main`, surviving top-level declarations become LLVM
//! module globals initialized by a synthesized `@_flyux_globals_init()`, the
//! user's `main` is renamed `@_flyux_main`, and an `i32 @main()` wrapper
//! calls both. Without one, all top-level statements are collected into a
//! synthetic `i32 @main()` body.

use std::fmt::Write as _;

use super::state::FuncSig;
use super::{platform, runtime, CodeGen, CodeGenError, Placement};
use crate::ast::{Program, Stmt, StmtKind};

/// `main` is renamed so it cannot collide with the C entry point.
pub(super) fn llvm_function_name(name: &str) -> String {
    if name == "main" {
        "_flyux_main".to_string()
    } else {
        name.to_string()
    }
}

impl CodeGen {
    /// Generate LLVM textual IR for the whole program. A generator is
    /// consumed exactly once.
    pub fn generate(&mut self, program: &Program) -> Result<String, CodeGenError> {
        if self.consumed {
            return Err(CodeGenError::invalid("code generator already consumed"));
        }
        self.consumed = true;

        // Pre-register top-level function names so recursion and forward
        // references resolve.
        for stmt in &program.statements {
            if let StmtKind::FuncDecl(func) = &stmt.kind {
                self.functions.insert(
                    func.name.clone(),
                    FuncSig {
                        param_count: func.params.len(),
                        uses_self: func.uses_self,
                    },
                );
            }
        }
        let has_main = self.functions.contains_key("main");

        if has_main {
            self.generate_with_main(program)?;
        } else {
            self.generate_synthetic_main(program)?;
        }

        self.assemble()
    }

    fn generate_with_main(&mut self, program: &Program) -> Result<(), CodeGenError> {
        // Module globals for surviving top-level declarations.
        for stmt in &program.statements {
            if let StmtKind::VarDecl { name, .. } = &stmt.kind {
                let slot = format!("@g_{name}");
                writeln!(
                    self.globals_buf,
                    "{slot} = internal global %struct.Value* null"
                )?;
                self.module_globals.insert(name.clone(), slot);
            }
        }

        for stmt in &program.statements {
            if let StmtKind::FuncDecl(func) = &stmt.kind {
                self.lower_function(func, Placement::TopLevel)?;
            }
        }

        // Global initializers run before _flyux_main.
        let frame = self.begin_function();
        self.function_depth += 1;
        for stmt in &program.statements {
            match &stmt.kind {
                StmtKind::FuncDecl(_) => {}
                StmtKind::VarDecl { .. } => self.lower_global_decl(stmt)?,
                // The normalizer filtered root-level expressions; anything
                // else that survived runs during initialization.
                _ => self.lower_stmt(stmt)?,
            }
        }
        self.function_depth -= 1;
        let (entry, body) = self.end_function(frame);
        self.code.push_str("\ndefine internal void @_flyux_globals_init() {\n");
        self.code.push_str(&entry);
        self.code.push_str(&body);
        self.code.push_str("  ret void\n}\n");

        // i32 @main(): init globals, run the program, discard the result.
        let main_params = self
            .functions
            .get("main")
            .map(|sig| sig.param_count)
            .unwrap_or(0);
        self.rt("value_release");
        let mut wrapper = String::new();
        wrapper.push_str("\ndefine i32 @main() {\n");
        wrapper.push_str("  call void @_flyux_globals_init()\n");
        let mut call_args = Vec::new();
        for i in 0..main_params {
            self.rt("box_undef");
            wrapper.push_str(&format!("  %marg{i} = call %struct.Value* @box_undef()\n"));
            call_args.push(format!("%struct.Value* %marg{i}"));
        }
        wrapper.push_str(&format!(
            "  %ret = call %struct.Value* @_flyux_main({})\n",
            call_args.join(", ")
        ));
        wrapper.push_str("  call void @value_release(%struct.Value* %ret)\n");
        wrapper.push_str("  ret i32 0\n}\n");
        self.code.push_str(&wrapper);
        Ok(())
    }

    /// Top-level declaration lowered into the globals-init function. Array
    /// and object shapes are not registered for globals; their storage dies
    /// with the initializer frame.
    fn lower_global_decl(&mut self, stmt: &Stmt) -> Result<(), CodeGenError> {
        let StmtKind::VarDecl {
            name,
            type_annotation,
            init,
            ..
        } = &stmt.kind
        else {
            return Ok(());
        };
        let slot = self
            .module_globals
            .get(name)
            .cloned()
            .unwrap_or_else(|| format!("@g_{name}"));

        let Some(init) = init else {
            return Ok(());
        };

        if let (Some(annotation), crate::ast::ExprKind::Null) = (type_annotation, &init.kind) {
            self.rt("box_null_typed");
            let value = self.new_temp();
            writeln!(
                self.body,
                "  {value} = call %struct.Value* @box_null_typed(i32 {})",
                annotation.type_name.runtime_tag()
            )?;
            self.emit_store_slot(&value, &slot)?;
            return Ok(());
        }

        let value = self.lower_expr(init)?;
        match value {
            Some(value) => {
                self.release_temps_except(&value)?;
                self.emit_store_slot(&value, &slot)?;
            }
            None => self.release_all_temps()?,
        }
        Ok(())
    }

    fn generate_synthetic_main(&mut self, program: &Program) -> Result<(), CodeGenError> {
        for stmt in &program.statements {
            if let StmtKind::FuncDecl(func) = &stmt.kind {
                self.lower_function(func, Placement::TopLevel)?;
            }
        }

        let frame = self.begin_function();
        self.in_main_wrapper = true;
        self.function_depth += 1;
        for stmt in &program.statements {
            if matches!(stmt.kind, StmtKind::FuncDecl(_)) {
                continue;
            }
            if self.block_terminated {
                break;
            }
            self.lower_stmt(stmt)?;
        }
        // Fall-through: release locals and exit 0.
        let default_label = self.new_label();
        if !self.block_terminated {
            self.emit_br(&default_label)?;
        }
        self.emit_label(&default_label)?;
        self.block_terminated = false;
        self.emit_function_cleanup()?;
        writeln!(self.body, "  ret i32 0")?;
        self.function_depth -= 1;
        let (entry, body) = self.end_function(frame);

        self.code.push_str("\ndefine i32 @main() {\n");
        self.code.push_str(&entry);
        self.code.push_str(&body);
        self.code.push_str("}\n");
        Ok(())
    }

    /// Assemble the output module: header, value struct definitions, runtime
    /// declares, globals (string constants and nested functions), code.
    fn assemble(&mut self) -> Result<String, CodeGenError> {
        let mut ir = String::new();
        writeln!(ir, "; ModuleID = 'flyux_module'")?;
        writeln!(ir, "target datalayout = \"{}\"", platform::get_data_layout())?;
        writeln!(ir, "target triple = \"{}\"", platform::get_target_triple())?;
        writeln!(ir)?;
        writeln!(ir, ";; Tagged-union value system")?;
        writeln!(ir, "%struct.Value = type {{ i32, [12 x i8] }}")?;
        writeln!(ir, "%struct.ObjectEntry = type {{ i8*, %struct.Value* }}")?;
        writeln!(ir)?;

        writeln!(ir, ";; Runtime entry points")?;
        for symbol in &self.runtime_used {
            if let Some(decl) = runtime::declaration_for(symbol) {
                writeln!(ir, "{decl}")?;
            }
        }
        writeln!(ir)?;

        if !self.globals_buf.is_empty() {
            ir.push_str(&self.globals_buf);
            writeln!(ir)?;
        }
        ir.push_str(&self.code);
        Ok(ir)
    }
}
