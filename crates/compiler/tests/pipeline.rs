//! End-to-end pipeline tests.
//!
//! These drive the full front end plus codegen through the public API and
//! assert on the shape of the emitted IR. The native-execution half of the
//! end-to-end scenarios needs clang and the C runtime, so the expectations
//! here pin down the IR contracts those scenarios rely on.

use flyuxc::{compile_to_ir, run_frontend};

// ----------------------------------------------------------------------
// End-to-end scenarios
// ----------------------------------------------------------------------

#[test]
fn scenario_number_assignment_and_print() {
    // Expected stdout of the native program: "42\n"
    let ir = compile_to_ir("x := 41 + 1\nprintln(x)").unwrap();
    assert!(ir.contains("@box_number(double 41.0)"));
    assert!(ir.contains("@value_add"));
    assert!(ir.contains("call void @value_println"));
}

#[test]
fn scenario_string_concatenation() {
    // Expected stdout: "hello, world\n"
    let ir = compile_to_ir("s := \"hello, \" + \"world\"\nprintln(s)").unwrap();
    assert!(ir.contains("c\"hello, \\00\""));
    assert!(ir.contains("c\"world\\00\""));
    assert!(ir.contains("@value_add"));
}

#[test]
fn scenario_loop_and_break() {
    // Expected stdout: "0,1,2,"
    let ir = compile_to_ir("L>(i:=0; i<5; i=i+1){ if (i==3){ B> }; print(i,\",\") }").unwrap();
    assert!(ir.contains("@value_less_than"));
    assert!(ir.contains("@value_equals"));
    assert!(ir.contains("call void @value_print"));
    // break releases the loop's locals before jumping out
    assert!(ir.contains("call void @value_release"));
}

#[test]
fn scenario_foreach_sum() {
    // Expected stdout: "60\n"
    let ir = compile_to_ir("xs := [10,20,30]\nsum := 0\nL>(xs:v){ sum = sum + v }\nprintln(sum)")
        .unwrap();
    assert!(ir.contains("alloca [3 x %struct.Value*]"));
    assert!(ir.contains("call i64 @value_array_length"));
    assert!(ir.contains("@value_array_get"));
    // foreach bindings are owned
    assert!(ir.contains("@value_retain"));
}

#[test]
fn scenario_try_catch_bad_conversion() {
    // Expected stdout: "caught: TypeError\n"
    let ir = compile_to_ir(
        "T> { n := toNum!(\"abc\") } (e) { println(\"caught:\", e.type) }",
    )
    .unwrap();
    assert!(ir.contains("@value_to_num"));
    assert!(ir.contains("@value_is_ok"));
    assert!(ir.contains("@value_last_status"));
    assert!(ir.contains("@create_error_object"));
    assert!(ir.contains("c\"TypeError\\00\""));
    assert!(ir.contains("c\"Error\\00\""));
    // e.type is a field read on the error object
    assert!(ir.contains("@value_get_field"));
}

#[test]
fn scenario_closure_captures() {
    // Expected stdout: "15\n"
    let ir = compile_to_ir(
        "make := (k):<func>={ (x):<num>=>{ R> k + x } }\nadd10 := make(10)\nprintln(add10(5))",
    )
    .unwrap();
    // the inner function takes its capture as a trailing parameter
    assert!(ir.contains("%captured_k"));
    assert!(ir.contains("@box_function"));
    // capture values are retained when the closure is constructed
    assert!(ir.contains("@value_retain"));
    assert!(ir.contains("@value_call_function"));
}

// ----------------------------------------------------------------------
// Invariants
// ----------------------------------------------------------------------

#[test]
fn invariant_every_token_resolves_to_original_coordinates() {
    let source = "x := 41 + 1\nprintln(x)\nf := (a) { R> a }";
    let frontend = run_frontend(source).unwrap();
    for token in &frontend.tokens {
        if token.is_synthetic() {
            // Only normalizer-inserted separators lack positions.
            assert_eq!(token.lexeme, ";", "unexpected synthetic {:?}", token.kind);
            continue;
        }
        assert!(token.orig_line >= 1);
        assert!(token.orig_column >= 1);
        assert!(token.orig_length >= 1);
    }
}

#[test]
fn invariant_rewritten_identifier_spans_original() {
    let frontend = run_frontend("变量 := 1\nprintln(变量)").unwrap();
    let ident = frontend
        .tokens
        .iter()
        .find(|t| t.lexeme == "_00001")
        .expect("mapped identifier");
    assert_eq!(ident.orig_line, 1);
    assert_eq!(ident.orig_column, 1);
    // Length of the original identifier in bytes (two 3-byte chars).
    assert_eq!(ident.orig_length, 6);
}

#[test]
fn invariant_alloca_once_per_local_in_entry() {
    let ir = compile_to_ir("f := (p) { x := 1\nif (p) { y := 2\nprintln(y) }\nR> x }\nf(1)")
        .unwrap();
    let f_def: &str = ir.split("define %struct.Value* @f(").nth(1).unwrap();
    let f_def = &f_def[..f_def.find("\n}").unwrap()];
    assert_eq!(f_def.matches("%x = alloca %struct.Value*").count(), 1);
    assert_eq!(f_def.matches("%y = alloca %struct.Value*").count(), 1);
    // Slots start out null before any other use.
    assert!(f_def.contains("store %struct.Value* null, %struct.Value** %x"));
}

#[test]
fn invariant_duplicate_declaration_rejected_shadowing_allowed() {
    assert!(compile_to_ir("x := 1\nx := 2").is_err());
    assert!(compile_to_ir("x := 1\nif (x) { x := 2\nprintln(x) }").is_ok());
}

// ----------------------------------------------------------------------
// Round-trips and idempotence
// ----------------------------------------------------------------------

#[test]
fn roundtrip_normalizer_idempotent() {
    let source = "f := (a, b) {\n  c := a + b\n  R> c\n}\nmain := () { println(f(1, 2)) }";
    let first = run_frontend(source).unwrap().normalized;
    let second = run_frontend(&first).unwrap().normalized;
    assert_eq!(
        first.trim_end_matches(';'),
        second.trim_end_matches(';'),
        "normalizer must be idempotent modulo trailing synthetic ';'"
    );
}

#[test]
fn roundtrip_ascii_program_identity_varmap() {
    let frontend = run_frontend("total := 0\nL>[3]{ total = total + 1 }\nprintln(total)").unwrap();
    assert!(
        frontend.varmap.entries.is_empty(),
        "fully-ASCII programs produce an empty varmap"
    );
}

#[test]
fn roundtrip_relex_token_stream() {
    let source = "x := 1 + 2 * f(a, b)\nif (x == 3) { R> x }";
    let frontend = run_frontend(source).unwrap();
    let joined: Vec<String> = frontend.tokens.iter().map(|t| t.lexeme.clone()).collect();
    let rejoined = joined.join(" ");
    let again = run_frontend(&rejoined).unwrap();
    let kinds_a: Vec<_> = frontend.tokens.iter().map(|t| t.kind).collect();
    let kinds_b: Vec<_> = again.tokens.iter().map(|t| t.kind).collect();
    assert_eq!(kinds_a, kinds_b);
}

// ----------------------------------------------------------------------
// File-level driver
// ----------------------------------------------------------------------

#[test]
fn emit_ir_writes_ll_file() {
    let dir = tempfile::tempdir().unwrap();
    let source_path = dir.path().join("hello.fx");
    std::fs::write(&source_path, "x := 1\nprintln(x)\n").unwrap();
    let output = dir.path().join("hello");

    flyuxc::compile_file(
        &source_path,
        &output,
        false,
        true, // emit_ir_only: no clang required
        &flyuxc::CompilerConfig::default(),
    )
    .unwrap();

    let ir = std::fs::read_to_string(dir.path().join("hello.ll")).unwrap();
    assert!(ir.contains("define i32 @main()"));
}

#[test]
fn compile_file_reports_missing_input() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.fx");
    let err = flyuxc::compile_file(
        &missing,
        &dir.path().join("out"),
        false,
        true,
        &flyuxc::CompilerConfig::default(),
    )
    .unwrap_err();
    assert!(err.contains("Failed to read source file"));
}
