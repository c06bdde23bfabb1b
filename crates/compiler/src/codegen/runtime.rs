//! Runtime ABI declarations.
//!
//! Every runtime entry point the generator can reference, with its LLVM
//! declaration. The finalizer emits `declare` lines only for the symbols a
//! compilation actually used.

use crate::builtins;

/// Irregularly-typed runtime entry points (boxing, unboxing, refcounting,
/// the error channel, closures). Builtin `value_*` calls that take and
/// return `%struct.Value*` are declared generically from the builtin table.
pub const RUNTIME_DECLARATIONS: &[(&str, &str)] = &[
    // Boxing
    ("box_number", "declare %struct.Value* @box_number(double)"),
    ("box_bool", "declare %struct.Value* @box_bool(i32)"),
    ("box_string", "declare %struct.Value* @box_string(i8*)"),
    (
        "box_string_with_length",
        "declare %struct.Value* @box_string_with_length(i8*, i64)",
    ),
    ("box_null", "declare %struct.Value* @box_null()"),
    ("box_undef", "declare %struct.Value* @box_undef()"),
    ("box_null_typed", "declare %struct.Value* @box_null_typed(i32)"),
    (
        "box_null_preserve_type",
        "declare %struct.Value* @box_null_preserve_type(%struct.Value*)",
    ),
    ("box_array", "declare %struct.Value* @box_array(i8*, i64)"),
    ("box_object", "declare %struct.Value* @box_object(i8*, i64)"),
    (
        "box_function",
        "declare %struct.Value* @box_function(i8*, %struct.Value**, i32, i32, i32)",
    ),
    // Unboxing
    ("unbox_number", "declare double @unbox_number(%struct.Value*)"),
    ("unbox_string", "declare i8* @unbox_string(%struct.Value*)"),
    // Refcounting & inspection
    ("value_retain", "declare %struct.Value* @value_retain(%struct.Value*)"),
    ("value_release", "declare void @value_release(%struct.Value*)"),
    ("value_is_truthy", "declare i32 @value_is_truthy(%struct.Value*)"),
    ("value_typeof", "declare i8* @value_typeof(%struct.Value*)"),
    // Arithmetic & comparison
    (
        "value_add",
        "declare %struct.Value* @value_add(%struct.Value*, %struct.Value*)",
    ),
    (
        "value_subtract",
        "declare %struct.Value* @value_subtract(%struct.Value*, %struct.Value*)",
    ),
    (
        "value_multiply",
        "declare %struct.Value* @value_multiply(%struct.Value*, %struct.Value*)",
    ),
    (
        "value_divide",
        "declare %struct.Value* @value_divide(%struct.Value*, %struct.Value*)",
    ),
    (
        "value_modulo",
        "declare %struct.Value* @value_modulo(%struct.Value*, %struct.Value*)",
    ),
    (
        "value_power",
        "declare %struct.Value* @value_power(%struct.Value*, %struct.Value*)",
    ),
    (
        "value_equals",
        "declare %struct.Value* @value_equals(%struct.Value*, %struct.Value*)",
    ),
    (
        "value_less_than",
        "declare %struct.Value* @value_less_than(%struct.Value*, %struct.Value*)",
    ),
    (
        "value_greater_than",
        "declare %struct.Value* @value_greater_than(%struct.Value*, %struct.Value*)",
    ),
    (
        "value_bit_and",
        "declare %struct.Value* @value_bit_and(%struct.Value*, %struct.Value*)",
    ),
    (
        "value_bit_or",
        "declare %struct.Value* @value_bit_or(%struct.Value*, %struct.Value*)",
    ),
    (
        "value_bit_xor",
        "declare %struct.Value* @value_bit_xor(%struct.Value*, %struct.Value*)",
    ),
    // Collections
    (
        "value_array_length",
        "declare i64 @value_array_length(%struct.Value*)",
    ),
    (
        "value_array_get",
        "declare %struct.Value* @value_array_get(%struct.Value*, %struct.Value*)",
    ),
    (
        "value_index",
        "declare %struct.Value* @value_index(%struct.Value*, %struct.Value*)",
    ),
    (
        "value_set_index",
        "declare %struct.Value* @value_set_index(%struct.Value*, %struct.Value*, %struct.Value*)",
    ),
    (
        "value_get_field",
        "declare %struct.Value* @value_get_field(%struct.Value*, %struct.Value*)",
    ),
    (
        "value_get_field_safe",
        "declare %struct.Value* @value_get_field_safe(%struct.Value*, %struct.Value*)",
    ),
    // I/O special forms
    ("value_print", "declare void @value_print(%struct.Value*)"),
    ("value_println", "declare void @value_println(%struct.Value*)"),
    (
        "value_printf",
        "declare void @value_printf(%struct.Value*, %struct.Value**, i64)",
    ),
    ("printf", "declare i32 @printf(i8*, ...)"),
    // Error channel
    ("value_clear_error", "declare %struct.Value* @value_clear_error()"),
    ("value_is_ok", "declare %struct.Value* @value_is_ok()"),
    ("value_last_error", "declare %struct.Value* @value_last_error()"),
    ("value_last_status", "declare %struct.Value* @value_last_status()"),
    ("value_fatal_error", "declare void @value_fatal_error()"),
    (
        "create_error_object",
        "declare %struct.Value* @create_error_object(%struct.Value*, %struct.Value*, %struct.Value*)",
    ),
    // Closures
    (
        "update_closure_captured",
        "declare void @update_closure_captured(%struct.Value*, i32, %struct.Value*)",
    ),
    (
        "bind_method",
        "declare %struct.Value* @bind_method(%struct.Value*, %struct.Value*)",
    ),
    (
        "value_call_function",
        "declare %struct.Value* @value_call_function(%struct.Value*, %struct.Value**, i64)",
    ),
];

/// Declaration line for a runtime symbol, or None if unknown. Regular
/// builtin symbols get a `Value* (Value* x N)` signature from the table.
pub fn declaration_for(symbol: &str) -> Option<String> {
    if let Some((_, decl)) = RUNTIME_DECLARATIONS.iter().find(|(s, _)| *s == symbol) {
        return Some((*decl).to_string());
    }
    let builtin = builtins::BUILTINS.iter().find(|b| b.symbol == symbol)?;
    let argc = if builtin.max_args == builtins::VARIADIC {
        1
    } else {
        builtin.max_args
    };
    let params = vec!["%struct.Value*"; argc].join(", ");
    Some(format!("declare %struct.Value* @{symbol}({params})"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_irregular_declarations_resolve() {
        assert!(declaration_for("box_number").unwrap().contains("double"));
        assert!(declaration_for("value_release").unwrap().contains("void"));
        assert!(
            declaration_for("value_array_length")
                .unwrap()
                .starts_with("declare i64")
        );
    }

    #[test]
    fn test_builtin_symbols_resolve_generically() {
        assert_eq!(
            declaration_for("value_to_num").unwrap(),
            "declare %struct.Value* @value_to_num(%struct.Value*)"
        );
        assert_eq!(
            declaration_for("value_substr").unwrap(),
            "declare %struct.Value* @value_substr(%struct.Value*, %struct.Value*, %struct.Value*)"
        );
        assert_eq!(
            declaration_for("value_time").unwrap(),
            "declare %struct.Value* @value_time()"
        );
    }

    #[test]
    fn test_every_builtin_symbol_declares() {
        for builtin in builtins::BUILTINS {
            assert!(
                declaration_for(builtin.symbol).is_some(),
                "no declaration for {}",
                builtin.symbol
            );
        }
    }

    #[test]
    fn test_unknown_symbol() {
        assert!(declaration_for("not_a_symbol").is_none());
    }

    #[test]
    fn test_no_duplicate_table_entries() {
        for (i, (a, _)) in RUNTIME_DECLARATIONS.iter().enumerate() {
            for (b, _) in &RUNTIME_DECLARATIONS[i + 1..] {
                assert_ne!(a, b, "duplicate declaration for {a}");
            }
        }
    }
}
