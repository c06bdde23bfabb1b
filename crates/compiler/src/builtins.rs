//! Built-in function table.
//!
//! One authority for the names the identifier remapper must not touch, the
//! lexer classifies as `BuiltinFunc`, the closure analyzer skips, and the
//! codegen lowers to `value_*` runtime calls.
//!
//! `error_channel` marks builtins whose runtime implementation reports
//! failure through the process-global status register (`value_is_ok`); the
//! codegen emits the matching check/clear prologue after each call site
//! depending on the trailing-`!` flag and try-block context.

/// Arity bound for variadic builtins.
pub const VARIADIC: usize = usize::MAX;

#[derive(Debug, Clone, Copy)]
pub struct Builtin {
    /// Surface name in FLYUX source.
    pub name: &'static str,
    /// Runtime symbol the call lowers to.
    pub symbol: &'static str,
    pub min_args: usize,
    /// Maximum argument count; missing optional arguments are padded with
    /// `box_null()`. `VARIADIC` builtins are lowered as special forms.
    pub max_args: usize,
    /// Sets the runtime error status on failure.
    pub error_channel: bool,
}

const fn b(
    name: &'static str,
    symbol: &'static str,
    min_args: usize,
    max_args: usize,
    error_channel: bool,
) -> Builtin {
    Builtin {
        name,
        symbol,
        min_args,
        max_args,
        error_channel,
    }
}

pub const BUILTINS: &[Builtin] = &[
    // I/O
    b("print", "value_print", 0, VARIADIC, false),
    b("println", "value_println", 0, VARIADIC, false),
    b("printf", "value_printf", 1, VARIADIC, false),
    b("input", "value_input", 0, 1, true),
    // Files
    b("readFile", "value_read_file", 1, 1, true),
    b("writeFile", "value_write_file", 2, 2, true),
    b("appendFile", "value_append_file", 2, 2, true),
    b("readBytes", "value_read_bytes", 1, 1, true),
    b("writeBytes", "value_write_bytes", 2, 2, true),
    b("fileExists", "value_file_exists", 1, 1, false),
    b("deleteFile", "value_delete_file", 1, 1, true),
    b("getFileSize", "value_get_file_size", 1, 1, true),
    b("readLines", "value_read_lines", 1, 1, true),
    b("renameFile", "value_rename_file", 2, 2, true),
    b("copyFile", "value_copy_file", 2, 2, true),
    b("createDir", "value_create_dir", 1, 1, true),
    b("removeDir", "value_remove_dir", 1, 1, true),
    b("listDir", "value_list_dir", 1, 1, true),
    b("dirExists", "value_dir_exists", 1, 1, false),
    // JSON
    b("parseJSON", "value_parse_json", 1, 1, true),
    b("toJSON", "value_to_json", 1, 1, true),
    // Strings
    b("len", "value_len", 1, 1, false),
    b("charAt", "value_char_at", 2, 2, true),
    b("substr", "value_substr", 2, 3, false),
    b("indexOf", "value_index_of", 2, 2, false),
    b("replace", "value_replace", 3, 3, false),
    b("split", "value_split", 1, 2, false),
    b("join", "value_join", 1, 2, false),
    b("trim", "value_trim", 1, 1, false),
    b("upper", "value_upper", 1, 1, false),
    b("lower", "value_lower", 1, 1, false),
    b("toUpper", "value_upper", 1, 1, false),
    b("toLower", "value_lower", 1, 1, false),
    b("startsWith", "value_starts_with", 2, 2, true),
    b("endsWith", "value_ends_with", 2, 2, true),
    b("contains", "value_contains", 2, 2, true),
    // Math
    b("abs", "value_abs", 1, 1, false),
    b("floor", "value_floor", 1, 1, false),
    b("ceil", "value_ceil", 1, 1, false),
    b("round", "value_round", 1, 1, false),
    b("sqrt", "value_sqrt", 1, 1, true),
    b("pow", "value_pow", 2, 2, true),
    b("min", "value_min", 2, 2, false),
    b("max", "value_max", 2, 2, false),
    b("random", "value_random", 0, 0, false),
    b("randomInt", "value_random_int", 2, 2, true),
    b("isNaN", "value_is_nan", 1, 1, false),
    b("isFinite", "value_is_finite", 1, 1, false),
    b("clamp", "value_clamp", 3, 3, true),
    // Arrays
    b("push", "value_push", 2, 2, false),
    b("pop", "value_pop", 1, 1, true),
    b("shift", "value_shift", 1, 1, true),
    b("unshift", "value_unshift", 2, 2, false),
    b("slice", "value_slice", 1, 3, false),
    b("concat", "value_concat", 2, 2, false),
    b("length", "value_len", 1, 1, false),
    // Objects
    b("keys", "value_keys", 1, 1, false),
    b("values", "value_values", 1, 1, false),
    b("entries", "value_entries", 1, 1, false),
    b("hasKey", "value_has_field", 2, 2, false),
    b("hasField", "value_has_field", 2, 2, false),
    b("setField", "value_set_field", 3, 3, false),
    b("deleteField", "value_delete_field", 2, 2, false),
    // Conversions & type checks
    b("toNum", "value_to_num", 1, 1, true),
    b("toStr", "value_to_str", 1, 1, false),
    b("toBl", "value_to_bl", 1, 1, true),
    b("toInt", "value_to_int", 1, 1, true),
    b("toFloat", "value_to_float", 1, 1, true),
    b("typeOf", "value_typeof", 1, 1, false),
    // Time
    b("time", "value_time", 0, 0, false),
    b("sleep", "value_sleep", 1, 1, true),
    b("date", "value_date", 0, 0, false),
    b("now", "value_now", 0, 0, false),
    b("dateStr", "value_date_str", 0, 1, false),
    // System
    b("exit", "value_exit", 0, 1, false),
    b("getEnv", "value_get_env", 1, 1, true),
    b("setEnv", "value_set_env", 2, 2, true),
    // Utilities
    b("assert", "value_assert", 1, 2, true),
    b("range", "value_range", 1, 3, false),
];

pub fn lookup(name: &str) -> Option<&'static Builtin> {
    BUILTINS.iter().find(|builtin| builtin.name == name)
}

pub fn is_builtin_name(name: &str) -> bool {
    lookup(name).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_known() {
        let tonum = lookup("toNum").unwrap();
        assert_eq!(tonum.symbol, "value_to_num");
        assert!(tonum.error_channel);
        assert_eq!((tonum.min_args, tonum.max_args), (1, 1));
    }

    #[test]
    fn test_lookup_unknown() {
        assert!(lookup("definitelyNotABuiltin").is_none());
        assert!(!is_builtin_name("myFunc"));
    }

    #[test]
    fn test_variadic_io() {
        assert_eq!(lookup("print").unwrap().max_args, VARIADIC);
        assert_eq!(lookup("println").unwrap().min_args, 0);
        assert_eq!(lookup("printf").unwrap().min_args, 1);
    }

    #[test]
    fn test_optional_arg_builtins() {
        assert_eq!(lookup("substr").unwrap().max_args, 3);
        assert_eq!(lookup("split").unwrap().max_args, 2);
        assert_eq!(lookup("slice").unwrap().max_args, 3);
    }

    #[test]
    fn test_no_duplicate_names() {
        for (i, a) in BUILTINS.iter().enumerate() {
            for b in &BUILTINS[i + 1..] {
                assert_ne!(a.name, b.name, "duplicate builtin name {}", a.name);
            }
        }
    }

    #[test]
    fn test_aliases_share_symbols() {
        assert_eq!(
            lookup("upper").unwrap().symbol,
            lookup("toUpper").unwrap().symbol
        );
        assert_eq!(
            lookup("length").unwrap().symbol,
            lookup("len").unwrap().symbol
        );
    }
}
