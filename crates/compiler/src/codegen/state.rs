//! CodeGen state and core emission helpers.
//!
//! A single generator owns three text buffers (globals, entry-block allocas,
//! current-function body), the counters for temporaries/labels/string
//! constants, and the bookkeeping structures the refcount discipline rests
//! on: the scoped symbol table, the per-function scope tracker, the
//! loop-scope stack, and the temp value stack.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt::Write as _;

use super::{CodeGenError, Diagnostic};
use crate::ast::FuncDecl;
use crate::intern::{Interned, StringPool};
use crate::source_map::SourceLocation;
use crate::varmap::VarMapEntry;

/// Statically-known shape of a variable initialized from an array literal.
#[derive(Debug, Clone)]
pub(super) struct ArrayMeta {
    /// Entry-block alloca holding the element slots.
    pub ptr: String,
    pub elem_count: usize,
}

/// Statically-known fields of a variable initialized from an object literal.
#[derive(Debug, Clone)]
pub(super) struct ObjectMeta {
    /// field name -> pointer temp of the entry's value slot.
    pub fields: Vec<(String, String)>,
}

/// A variable known to hold a locally-constructed closure.
#[derive(Debug, Clone)]
pub(super) struct ClosureInfo {
    pub func_name: String,
    pub captures: Vec<String>,
    pub param_count: usize,
    pub uses_self: bool,
}

/// Signature facts about a top-level function, for direct calls and
/// function-value construction.
#[derive(Debug, Clone, Copy)]
pub(super) struct FuncSig {
    pub param_count: usize,
    pub uses_self: bool,
}

/// One lexical scope: name resolution plus the locals declared in it, in
/// declaration order (release order on scope exit).
#[derive(Debug, Default)]
pub(super) struct Scope {
    pub names: HashMap<String, String>,
    pub locals: Vec<String>,
}

/// Per-loop record used by `B>`/`N>` to release the right set of slots
/// before jumping.
#[derive(Debug)]
pub(super) struct LoopScope {
    pub end_label: String,
    pub continue_label: String,
    pub label: Option<String>,
    pub locals: Vec<String>,
}

/// Saved state around a nested function body; restored when the function's
/// text has been assembled.
pub(super) struct FuncFrame {
    entry_allocas: String,
    body: String,
    scopes: Vec<Scope>,
    allocated: HashSet<String>,
    loop_scopes: Vec<LoopScope>,
    temp_values: Vec<String>,
    block_terminated: bool,
    arrays: HashMap<String, ArrayMeta>,
    objects: HashMap<String, ObjectMeta>,
    closures: HashMap<String, ClosureInfo>,
    in_main_wrapper: bool,
}

pub struct CodeGen {
    /// String constants, type-level globals, nested function definitions.
    pub(super) globals_buf: String,
    /// Finished top-level function definitions.
    pub(super) code: String,
    /// Entry-block allocas of the function being lowered.
    pub(super) entry_allocas: String,
    /// Body of the function being lowered.
    pub(super) body: String,

    pub(super) temp_counter: usize,
    pub(super) label_counter: usize,
    pub(super) string_counter: usize,
    pub(super) slot_counter: usize,
    shadow_counter: usize,

    pub(super) pool: StringPool,
    pub(super) string_constants: HashMap<Interned, String>,

    pub(super) scopes: Vec<Scope>,
    pub(super) allocated: HashSet<String>,
    pub(super) loop_scopes: Vec<LoopScope>,
    pub(super) temp_values: Vec<String>,

    pub(super) arrays: HashMap<String, ArrayMeta>,
    pub(super) objects: HashMap<String, ObjectMeta>,
    pub(super) closures: HashMap<String, ClosureInfo>,

    /// Top-level functions, callable directly.
    pub(super) functions: HashMap<String, FuncSig>,
    /// Module-level variables (`has_main` form): source name -> `@slot`.
    pub(super) module_globals: HashMap<String, String>,

    pub(super) block_terminated: bool,
    pub(super) in_try_catch: bool,
    /// Lowering the body of the synthesized `i32 @main()`; `R>` returns the
    /// exit code form instead of a `Value*`.
    pub(super) in_main_wrapper: bool,
    /// Set while lowering the RHS of a declaration so literal lowering can
    /// register array/object metadata under that name.
    pub(super) current_var_name: Option<String>,
    /// Capture list of the closure currently being lowered.
    pub(super) current_captured: Option<Vec<String>>,
    pub(super) function_depth: usize,

    pub(super) runtime_used: BTreeSet<&'static str>,

    /// Varmap entries for resolving `_NNNNN` names back to their original
    /// spelling in diagnostics.
    varmap: Vec<VarMapEntry>,
    original_source: Option<String>,

    pub(super) consumed: bool,
}

impl Default for CodeGen {
    fn default() -> Self {
        Self::new()
    }
}

impl CodeGen {
    pub fn new() -> Self {
        CodeGen {
            globals_buf: String::new(),
            code: String::new(),
            entry_allocas: String::new(),
            body: String::new(),
            temp_counter: 0,
            label_counter: 0,
            string_counter: 0,
            slot_counter: 0,
            shadow_counter: 0,
            pool: StringPool::new(),
            string_constants: HashMap::new(),
            scopes: vec![Scope::default()],
            allocated: HashSet::new(),
            loop_scopes: Vec::new(),
            temp_values: Vec::new(),
            arrays: HashMap::new(),
            objects: HashMap::new(),
            closures: HashMap::new(),
            functions: HashMap::new(),
            module_globals: HashMap::new(),
            block_terminated: false,
            in_try_catch: false,
            in_main_wrapper: false,
            current_var_name: None,
            current_captured: None,
            function_depth: 0,
            runtime_used: BTreeSet::new(),
            varmap: Vec::new(),
            original_source: None,
            consumed: false,
        }
    }

    /// Attach the varmap so diagnostics can show original identifiers.
    pub fn set_varmap(&mut self, entries: Vec<VarMapEntry>) {
        self.varmap = entries;
    }

    /// Attach the original source so diagnostics can quote the line.
    pub fn set_original_source(&mut self, source: String) {
        self.original_source = Some(source);
    }

    // ------------------------------------------------------------------
    // Names and counters
    // ------------------------------------------------------------------

    pub(super) fn new_temp(&mut self) -> String {
        let t = format!("%t{}", self.temp_counter);
        self.temp_counter += 1;
        t
    }

    pub(super) fn new_label(&mut self) -> String {
        let l = format!("label{}", self.label_counter);
        self.label_counter += 1;
        l
    }

    /// Unique name for an entry-block storage slot (arrays, objects, loop
    /// counters, ternary results).
    pub(super) fn new_slot(&mut self, prefix: &str) -> String {
        let s = format!("%{}{}", prefix, self.slot_counter);
        self.slot_counter += 1;
        s
    }

    pub(super) fn rt(&mut self, symbol: &'static str) {
        self.runtime_used.insert(symbol);
    }

    // ------------------------------------------------------------------
    // Diagnostics
    // ------------------------------------------------------------------

    /// Resolve a mapped `_NNNNN` name back to its original spelling.
    pub(super) fn lookup_original_name<'a>(&'a self, mapped: &'a str) -> &'a str {
        self.varmap
            .iter()
            .find(|e| e.mapped == mapped)
            .map(|e| e.original.as_str())
            .unwrap_or(mapped)
    }

    /// Build a positioned diagnostic, resolving the variable back to its
    /// original spelling and quoting the original source line when it is
    /// available.
    pub(super) fn error_at(
        &self,
        loc: SourceLocation,
        var_name: Option<&str>,
        message: &str,
    ) -> CodeGenError {
        let positioned = !loc.is_synthetic && loc.orig_line > 0;
        let source_line = if positioned {
            self.original_source
                .as_ref()
                .and_then(|source| source.lines().nth(loc.orig_line as usize - 1))
                .map(str::to_string)
        } else {
            None
        };
        CodeGenError::Diagnostic(Diagnostic {
            line: if positioned { loc.orig_line } else { 0 },
            column: if positioned { loc.orig_column } else { 0 },
            length: if positioned { loc.orig_length } else { 0 },
            variable: var_name.map(|name| self.lookup_original_name(name).to_string()),
            message: message.to_string(),
            source_line,
        })
    }

    // ------------------------------------------------------------------
    // Symbol table with shadowing
    // ------------------------------------------------------------------

    pub(super) fn enter_scope(&mut self) {
        self.scopes.push(Scope::default());
    }

    pub(super) fn exit_scope(&mut self) {
        self.scopes.pop();
    }

    /// Resolve a source name to its slot (`%local` or `@global`).
    pub(super) fn lookup_slot(&self, name: &str) -> Option<&str> {
        for scope in self.scopes.iter().rev() {
            if let Some(slot) = scope.names.get(name) {
                return Some(slot);
            }
        }
        self.module_globals.get(name).map(|s| s.as_str())
    }

    pub(super) fn defined_in_current_scope(&self, name: &str) -> bool {
        self.scopes
            .last()
            .map(|s| s.names.contains_key(name))
            .unwrap_or(false)
    }

    /// Declare a local in the current scope: shadowing an outer binding gets
    /// a uniquely renamed slot; the alloca is emitted into the entry block
    /// (once per slot) and initialized to null. The slot is added to the
    /// scope tracker and, if a loop is active, to the innermost loop scope.
    pub(super) fn declare_local(&mut self, name: &str) -> Result<String, CodeGenError> {
        let slot = if self.lookup_slot(name).is_some() {
            // Shadowing an outer binding (local, capture, or global) gets a
            // uniquely renamed slot; the outer one stays releasable.
            self.shadow_counter += 1;
            format!("%{}_s{}", name, self.shadow_counter)
        } else {
            // A sibling scope may have allocated this slot already; it was
            // released and nulled on that scope's exit, so it is reusable.
            format!("%{name}")
        };

        if !self.allocated.contains(&slot) {
            writeln!(self.entry_allocas, "  {slot} = alloca %struct.Value*")?;
            writeln!(
                self.entry_allocas,
                "  store %struct.Value* null, %struct.Value** {slot}"
            )?;
            self.allocated.insert(slot.clone());
        }

        let scope = self.scopes.last_mut().expect("scope stack never empty");
        scope.names.insert(name.to_string(), slot.clone());
        if !scope.locals.contains(&slot) {
            scope.locals.push(slot.clone());
        }
        if let Some(loop_scope) = self.loop_scopes.last_mut() {
            if !loop_scope.locals.contains(&slot) {
                loop_scope.locals.push(slot.clone());
            }
        }
        Ok(slot)
    }

    /// Register a parameter/capture slot: visible in the function but owned
    /// by the caller, so never added to the scope tracker.
    pub(super) fn register_param(&mut self, name: &str, slot: &str) {
        self.allocated.insert(slot.to_string());
        let scope = self.scopes.last_mut().expect("scope stack never empty");
        scope.names.insert(name.to_string(), slot.to_string());
    }

    // ------------------------------------------------------------------
    // Temp value stack
    // ------------------------------------------------------------------

    pub(super) fn note_temp(&mut self, temp: &str) {
        self.temp_values.push(temp.to_string());
    }

    /// Drop a temp from the stack without releasing it (its ownership moved
    /// into a container or variable).
    pub(super) fn consume_temp(&mut self, temp: &str) {
        if let Some(pos) = self.temp_values.iter().rposition(|t| t == temp) {
            self.temp_values.remove(pos);
        }
    }

    pub(super) fn temp_mark(&self) -> usize {
        self.temp_values.len()
    }

    pub(super) fn is_owned_temp(&self, value: &str) -> bool {
        self.temp_values.iter().any(|t| t == value)
    }

    /// Release temps registered since `mark`, keeping `keep`; used inside
    /// conditionally-executed expression arms where a statement-boundary
    /// release would not dominate. Returns whether `keep` was among them
    /// (i.e. whether the kept value was owned).
    pub(super) fn release_temps_since(
        &mut self,
        mark: usize,
        keep: Option<&str>,
    ) -> Result<bool, CodeGenError> {
        let tail: Vec<String> = self.temp_values.split_off(mark);
        let mut kept_owned = false;
        for temp in tail {
            if keep == Some(temp.as_str()) {
                kept_owned = true;
                continue;
            }
            self.emit_release(&temp)?;
        }
        Ok(kept_owned)
    }

    /// Prepare `value` to be stored into a slot (or returned): all other
    /// outstanding temporaries are released, and a value that was merely
    /// borrowed from a slot gets its own reference.
    pub(super) fn take_ownership(&mut self, value: &str) -> Result<(), CodeGenError> {
        if self.is_owned_temp(value) {
            self.release_temps_except(value)?;
        } else {
            self.release_all_temps()?;
            self.emit_retain(value)?;
        }
        Ok(())
    }

    /// Transfer `value` into a container mid-expression: an owned temp is
    /// dropped from the stack, a borrowed load is retained.
    pub(super) fn transfer_into_container(&mut self, value: &str) -> Result<(), CodeGenError> {
        if self.is_owned_temp(value) {
            self.consume_temp(value);
        } else {
            self.emit_retain(value)?;
        }
        Ok(())
    }

    /// Statement-boundary cleanup: release every outstanding temporary
    /// except `keep`, then clear the stack.
    pub(super) fn release_temps_except(&mut self, keep: &str) -> Result<(), CodeGenError> {
        let temps = std::mem::take(&mut self.temp_values);
        for temp in temps {
            if temp == keep {
                continue;
            }
            self.emit_release(&temp)?;
        }
        Ok(())
    }

    pub(super) fn release_all_temps(&mut self) -> Result<(), CodeGenError> {
        let temps = std::mem::take(&mut self.temp_values);
        for temp in temps {
            self.emit_release(&temp)?;
        }
        Ok(())
    }

    /// Clear the stack without emitting releases (loop-header values that
    /// must survive the whole loop).
    pub(super) fn clear_temps(&mut self) {
        self.temp_values.clear();
    }

    // ------------------------------------------------------------------
    // Scope / loop-scope cleanup emission
    // ------------------------------------------------------------------

    pub(super) fn emit_release(&mut self, value: &str) -> Result<(), CodeGenError> {
        self.rt("value_release");
        writeln!(self.body, "  call void @value_release(%struct.Value* {value})")?;
        Ok(())
    }

    pub(super) fn emit_retain(&mut self, value: &str) -> Result<(), CodeGenError> {
        self.rt("value_retain");
        writeln!(
            self.body,
            "  call %struct.Value* @value_retain(%struct.Value* {value})"
        )?;
        Ok(())
    }

    fn emit_slot_release(&mut self, slot: &str, null_after: bool) -> Result<(), CodeGenError> {
        let val = self.new_temp();
        writeln!(
            self.body,
            "  {val} = load %struct.Value*, %struct.Value** {slot}"
        )?;
        self.emit_release(&val)?;
        if null_after {
            writeln!(
                self.body,
                "  store %struct.Value* null, %struct.Value** {slot}"
            )?;
        }
        Ok(())
    }

    /// Release the innermost lexical scope's locals (insertion order) and
    /// null their slots so a later re-entry of the same region starts clean.
    pub(super) fn emit_scope_exit_cleanup(&mut self) -> Result<(), CodeGenError> {
        let slots: Vec<String> = self
            .scopes
            .last()
            .map(|s| s.locals.clone())
            .unwrap_or_default();
        for slot in slots {
            self.emit_slot_release(&slot, true)?;
        }
        Ok(())
    }

    /// Release every local of the current function, in declaration order.
    /// The retained return value survives its slot's release.
    pub(super) fn emit_function_cleanup(&mut self) -> Result<(), CodeGenError> {
        let slots: Vec<String> = self
            .scopes
            .iter()
            .flat_map(|s| s.locals.iter().cloned())
            .collect();
        for slot in slots {
            self.emit_slot_release(&slot, false)?;
        }
        Ok(())
    }

    pub(super) fn push_loop_scope(
        &mut self,
        end_label: &str,
        continue_label: &str,
        label: Option<String>,
    ) {
        self.loop_scopes.push(LoopScope {
            end_label: end_label.to_string(),
            continue_label: continue_label.to_string(),
            label,
            locals: Vec::new(),
        });
    }

    pub(super) fn pop_loop_scope(&mut self) {
        self.loop_scopes.pop();
    }

    /// Release the innermost loop's locals (plain `B>`/`N>`).
    pub(super) fn emit_loop_cleanup(&mut self) -> Result<(), CodeGenError> {
        let slots: Vec<String> = self
            .loop_scopes
            .last()
            .map(|l| l.locals.clone())
            .unwrap_or_default();
        for slot in slots {
            self.emit_slot_release(&slot, true)?;
        }
        Ok(())
    }

    /// Index (from innermost) of the loop with `label`, if any.
    pub(super) fn find_loop_by_label(&self, label: &str) -> Option<usize> {
        self.loop_scopes
            .iter()
            .rposition(|l| l.label.as_deref() == Some(label))
    }

    /// Release loop scopes from the innermost outwards. For `B> label` the
    /// named loop is included; for `N> label` it is excluded (the loop keeps
    /// iterating).
    pub(super) fn emit_multilevel_cleanup(
        &mut self,
        target_index: usize,
        include_target: bool,
    ) -> Result<(), CodeGenError> {
        let lower = if include_target {
            target_index
        } else {
            target_index + 1
        };
        let slots: Vec<String> = self.loop_scopes[lower..]
            .iter()
            .rev()
            .flat_map(|l| l.locals.iter().cloned())
            .collect();
        for slot in slots {
            self.emit_slot_release(&slot, true)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Common emission patterns
    // ------------------------------------------------------------------

    /// `call %struct.Value* @sym(args...)` with `Value*`-typed arguments.
    pub(super) fn emit_value_call(
        &mut self,
        symbol: &'static str,
        args: &[&str],
    ) -> Result<String, CodeGenError> {
        self.rt(symbol);
        let result = self.new_temp();
        write!(self.body, "  {result} = call %struct.Value* @{symbol}(")?;
        for (i, arg) in args.iter().enumerate() {
            if i > 0 {
                write!(self.body, ", ")?;
            }
            write!(self.body, "%struct.Value* {arg}")?;
        }
        writeln!(self.body, ")")?;
        Ok(result)
    }

    /// Truthiness of a value as an `i1` temp.
    pub(super) fn emit_truthy(&mut self, value: &str) -> Result<String, CodeGenError> {
        self.rt("value_is_truthy");
        let truthy = self.new_temp();
        writeln!(
            self.body,
            "  {truthy} = call i32 @value_is_truthy(%struct.Value* {value})"
        )?;
        let as_i1 = self.new_temp();
        writeln!(self.body, "  {as_i1} = icmp ne i32 {truthy}, 0")?;
        Ok(as_i1)
    }

    /// Invert a value's truthiness and box the result.
    pub(super) fn emit_not(&mut self, value: &str) -> Result<String, CodeGenError> {
        self.rt("value_is_truthy");
        self.rt("box_bool");
        let truthy = self.new_temp();
        writeln!(
            self.body,
            "  {truthy} = call i32 @value_is_truthy(%struct.Value* {value})"
        )?;
        let inverted = self.new_temp();
        writeln!(self.body, "  {inverted} = icmp eq i32 {truthy}, 0")?;
        let as_i32 = self.new_temp();
        writeln!(self.body, "  {as_i32} = zext i1 {inverted} to i32")?;
        let result = self.new_temp();
        writeln!(
            self.body,
            "  {result} = call %struct.Value* @box_bool(i32 {as_i32})"
        )?;
        Ok(result)
    }

    pub(super) fn emit_load_slot(&mut self, slot: &str) -> Result<String, CodeGenError> {
        let t = self.new_temp();
        writeln!(self.body, "  {t} = load %struct.Value*, %struct.Value** {slot}")?;
        Ok(t)
    }

    pub(super) fn emit_store_slot(&mut self, value: &str, slot: &str) -> Result<(), CodeGenError> {
        writeln!(
            self.body,
            "  store %struct.Value* {value}, %struct.Value** {slot}"
        )?;
        Ok(())
    }

    pub(super) fn emit_label(&mut self, label: &str) -> Result<(), CodeGenError> {
        writeln!(self.body, "\n{label}:")?;
        Ok(())
    }

    pub(super) fn emit_br(&mut self, label: &str) -> Result<(), CodeGenError> {
        writeln!(self.body, "  br label %{label}")?;
        Ok(())
    }

    pub(super) fn emit_cond_br(
        &mut self,
        cond_i1: &str,
        then_label: &str,
        else_label: &str,
    ) -> Result<(), CodeGenError> {
        writeln!(
            self.body,
            "  br i1 {cond_i1}, label %{then_label}, label %{else_label}"
        )?;
        Ok(())
    }

    /// Error-channel prologue after a status-reporting builtin call:
    /// without `!` the error is discarded; with `!` outside a `T>` block a
    /// failure is fatal; inside a `T>` block the enclosing try inserts the
    /// check after the statement instead.
    pub(super) fn emit_error_check(&mut self, throw_on_error: bool) -> Result<(), CodeGenError> {
        if !throw_on_error {
            self.rt("value_clear_error");
            writeln!(self.body, "  call %struct.Value* @value_clear_error()")?;
            return Ok(());
        }
        if self.in_try_catch {
            return Ok(());
        }
        self.rt("value_is_ok");
        self.rt("value_is_truthy");
        self.rt("value_fatal_error");
        let is_ok = self.new_temp();
        writeln!(self.body, "  {is_ok} = call %struct.Value* @value_is_ok()")?;
        let ok_bool = self.new_temp();
        writeln!(
            self.body,
            "  {ok_bool} = call i32 @value_is_truthy(%struct.Value* {is_ok})"
        )?;
        let is_error = self.new_temp();
        writeln!(self.body, "  {is_error} = icmp eq i32 {ok_bool}, 0")?;
        let error_label = self.new_label();
        let continue_label = self.new_label();
        self.emit_cond_br(&is_error, &error_label, &continue_label)?;
        self.emit_label(&error_label)?;
        writeln!(self.body, "  call void @value_fatal_error()")?;
        writeln!(self.body, "  unreachable")?;
        self.emit_label(&continue_label)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Function frames
    // ------------------------------------------------------------------

    /// Swap in a fresh function context; the previous one is restored by
    /// [`CodeGen::end_function`].
    pub(super) fn begin_function(&mut self) -> FuncFrame {
        FuncFrame {
            entry_allocas: std::mem::take(&mut self.entry_allocas),
            body: std::mem::take(&mut self.body),
            scopes: std::mem::replace(&mut self.scopes, vec![Scope::default()]),
            allocated: std::mem::take(&mut self.allocated),
            loop_scopes: std::mem::take(&mut self.loop_scopes),
            temp_values: std::mem::take(&mut self.temp_values),
            block_terminated: std::mem::replace(&mut self.block_terminated, false),
            arrays: std::mem::take(&mut self.arrays),
            objects: std::mem::take(&mut self.objects),
            closures: std::mem::take(&mut self.closures),
            in_main_wrapper: std::mem::replace(&mut self.in_main_wrapper, false),
        }
    }

    /// Restore the enclosing function context, returning the finished
    /// function's (entry, body) text.
    pub(super) fn end_function(&mut self, frame: FuncFrame) -> (String, String) {
        let entry = std::mem::replace(&mut self.entry_allocas, frame.entry_allocas);
        let body = std::mem::replace(&mut self.body, frame.body);
        self.scopes = frame.scopes;
        self.allocated = frame.allocated;
        self.loop_scopes = frame.loop_scopes;
        self.temp_values = frame.temp_values;
        self.block_terminated = frame.block_terminated;
        self.arrays = frame.arrays;
        self.objects = frame.objects;
        self.closures = frame.closures;
        self.in_main_wrapper = frame.in_main_wrapper;
        (entry, body)
    }
}

/// Print a double the way the IR needs it: integral values in plain decimal
/// (exactly representable), everything else as raw IEEE-754 bits, which the
/// LLVM parser accepts without rounding concerns.
pub(super) fn fmt_double(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.1}")
    } else {
        format!("0x{:016X}", value.to_bits())
    }
}

/// The function signature text used in `box_function` bitcasts.
pub(super) fn closure_signature(func: &FuncDecl, capture_count: usize) -> String {
    let mut parts = Vec::new();
    if func.uses_self {
        parts.push("%struct.Value*");
    }
    for _ in 0..func.params.len() {
        parts.push("%struct.Value*");
    }
    for _ in 0..capture_count {
        parts.push("%struct.Value*");
    }
    parts.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fmt_double_integral() {
        assert_eq!(fmt_double(42.0), "42.0");
        assert_eq!(fmt_double(0.0), "0.0");
        assert_eq!(fmt_double(-7.0), "-7.0");
    }

    #[test]
    fn test_fmt_double_fractional_uses_bits() {
        let formatted = fmt_double(3.14);
        assert!(formatted.starts_with("0x"), "got {formatted}");
        assert_eq!(formatted.len(), 18);
    }

    #[test]
    fn test_new_temp_and_label_sequences() {
        let mut gen = CodeGen::new();
        assert_eq!(gen.new_temp(), "%t0");
        assert_eq!(gen.new_temp(), "%t1");
        assert_eq!(gen.new_label(), "label0");
        assert_eq!(gen.new_label(), "label1");
    }

    #[test]
    fn test_declare_local_shadowing() {
        let mut gen = CodeGen::new();
        let outer = gen.declare_local("x").unwrap();
        assert_eq!(outer, "%x");
        gen.enter_scope();
        let inner = gen.declare_local("x").unwrap();
        assert_ne!(inner, outer);
        assert!(inner.starts_with("%x_s"));
        assert_eq!(gen.lookup_slot("x"), Some(inner.as_str()));
        gen.exit_scope();
        assert_eq!(gen.lookup_slot("x"), Some(outer.as_str()));
    }

    #[test]
    fn test_alloca_emitted_once_per_slot() {
        let mut gen = CodeGen::new();
        gen.declare_local("x").unwrap();
        let allocas = gen.entry_allocas.matches("alloca %struct.Value*").count();
        assert_eq!(allocas, 1);
    }

    #[test]
    fn test_temp_stack_release_except() {
        let mut gen = CodeGen::new();
        gen.note_temp("%t0");
        gen.note_temp("%t1");
        gen.release_temps_except("%t1").unwrap();
        assert!(gen.body.contains("call void @value_release(%struct.Value* %t0)"));
        assert!(!gen.body.contains("call void @value_release(%struct.Value* %t1)"));
        assert!(gen.temp_values.is_empty());
    }

    #[test]
    fn test_consume_temp_prevents_release() {
        let mut gen = CodeGen::new();
        gen.note_temp("%t0");
        gen.consume_temp("%t0");
        gen.release_all_temps().unwrap();
        assert!(!gen.body.contains("value_release"));
    }

    #[test]
    fn test_scope_cleanup_order_and_nulling() {
        let mut gen = CodeGen::new();
        gen.declare_local("a").unwrap();
        gen.declare_local("b").unwrap();
        gen.emit_scope_exit_cleanup().unwrap();
        let a_pos = gen.body.find("%struct.Value** %a").unwrap();
        let b_pos = gen.body.find("%struct.Value** %b").unwrap();
        assert!(a_pos < b_pos, "locals must release in declaration order");
        assert!(gen.body.contains("store %struct.Value* null, %struct.Value** %a"));
    }

    #[test]
    fn test_loop_scope_tracks_locals() {
        let mut gen = CodeGen::new();
        gen.push_loop_scope("end", "cont", Some("outer".into()));
        gen.declare_local("i").unwrap();
        assert_eq!(gen.loop_scopes.last().unwrap().locals, vec!["%i"]);
        assert_eq!(gen.find_loop_by_label("outer"), Some(0));
        assert_eq!(gen.find_loop_by_label("missing"), None);
    }

    #[test]
    fn test_error_check_modes() {
        let mut gen = CodeGen::new();
        gen.emit_error_check(false).unwrap();
        assert!(gen.body.contains("value_clear_error"));

        let mut gen = CodeGen::new();
        gen.emit_error_check(true).unwrap();
        assert!(gen.body.contains("value_fatal_error"));
        assert!(gen.body.contains("unreachable"));

        let mut gen = CodeGen::new();
        gen.in_try_catch = true;
        gen.emit_error_check(true).unwrap();
        assert!(gen.body.is_empty());
    }

    #[test]
    fn test_function_frame_round_trip() {
        let mut gen = CodeGen::new();
        gen.declare_local("outer_var").unwrap();
        gen.note_temp("%t9");
        let frame = gen.begin_function();
        assert!(gen.temp_values.is_empty());
        assert!(gen.lookup_slot("outer_var").is_none());
        gen.declare_local("inner_var").unwrap();
        let (entry, _body) = gen.end_function(frame);
        assert!(entry.contains("%inner_var"));
        assert_eq!(gen.lookup_slot("outer_var"), Some("%outer_var"));
        assert_eq!(gen.temp_values, vec!["%t9"]);
    }
}
