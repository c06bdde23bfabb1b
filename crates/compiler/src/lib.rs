//! FLYUX compiler library.
//!
//! Provides compilation from FLYUX source to LLVM IR and native executables.
//! The pipeline is strictly sequential:
//!
//! ```text
//! source -> [normalize] -> [varmap] -> [lexer] -> [parser] -> [codegen] -> IR
//! ```
//!
//! Each stage owns its output; the previous stage's artifacts are kept only
//! for source-position resolution in diagnostics. The emitted `.ll` is
//! handed to clang together with the compiled C runtime to produce the
//! executable.

pub mod ast;
pub mod builtins;
pub mod codegen;
pub mod config;
pub mod format;
pub mod intern;
pub mod lexer;
pub mod normalize;
pub mod parser;
pub mod source_map;
pub mod varmap;

pub use codegen::{CodeGen, CodeGenError};
pub use config::{CompilerConfig, OptimizationLevel};
pub use parser::Parser;

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;

/// Embedded runtime C source (resolved by build.rs). Empty when the
/// compiler was built without a runtime checkout; the source is then located
/// at compile time instead.
static RUNTIME_SOURCE: &str = include_str!(env!("FLYUX_RUNTIME_SRC_PATH"));

/// Minimum clang version. The generated IR uses typed pointers and the
/// classic `getelementptr`/`bitcast` forms, supported well before this.
const MIN_CLANG_VERSION: u32 = 11;

/// Apple's clang version numbers diverge from upstream LLVM's at every
/// release; Apple clang 12 (Xcode 12) already covers everything this
/// typed-pointer IR uses.
const MIN_APPLE_CLANG_VERSION: u32 = 12;

/// Cache for the clang version probe; it runs once per process.
static CLANG_VERSION_CHECKED: OnceLock<Result<u32, String>> = OnceLock::new();

fn check_clang_version(clang: &str) -> Result<u32, String> {
    CLANG_VERSION_CHECKED
        .get_or_init(|| {
            let output = Command::new(clang).arg("--version").output().map_err(|e| {
                format!(
                    "Failed to run {clang}: {e}. Please install clang {MIN_CLANG_VERSION} or later."
                )
            })?;

            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(format!(
                    "{clang} --version failed with exit code {:?}: {stderr}",
                    output.status.code()
                ));
            }

            let version_str = String::from_utf8_lossy(&output.stdout);
            let version = parse_clang_version(&version_str).ok_or_else(|| {
                format!(
                    "Could not parse clang version from: {}",
                    version_str.lines().next().unwrap_or(&version_str)
                )
            })?;

            let (effective_min, vendor) = clang_minimum_for(&version_str);
            if version < effective_min {
                return Err(format!(
                    "{vendor} version {version} detected, but flyuxc requires {vendor} {effective_min} or later."
                ));
            }
            Ok(version)
        })
        .clone()
}

/// Version floor for the probed toolchain. Apple clang reports Apple's own
/// numbering, so it gets its own minimum.
fn clang_minimum_for(version_output: &str) -> (u32, &'static str) {
    if version_output.contains("Apple clang") {
        (MIN_APPLE_CLANG_VERSION, "Apple clang")
    } else {
        (MIN_CLANG_VERSION, "clang")
    }
}

/// Parse the major version from `clang --version` output. Handles "clang
/// version", "Apple clang version", "Homebrew clang version", "Ubuntu clang
/// version", etc.
fn parse_clang_version(output: &str) -> Option<u32> {
    for line in output.lines() {
        if line.contains("clang version") {
            if let Some(idx) = line.find("version ") {
                let after = &line[idx + 8..];
                let major: String = after.chars().take_while(|c| c.is_ascii_digit()).collect();
                if !major.is_empty() {
                    return major.parse().ok();
                }
            }
        }
    }
    None
}

/// Artifacts of the front-end pipeline, kept around for the debug dump
/// flags and for diagnostics.
pub struct FrontendResult {
    pub normalized: String,
    pub varmap: varmap::VarMapResult,
    pub tokens: Vec<lexer::Token>,
    pub program: ast::Program,
}

/// Run the front end: normalization, identifier remapping, lexing, parsing,
/// and the closure `uses_self` annotation pass.
pub fn run_frontend(source: &str) -> Result<FrontendResult, String> {
    let norm = normalize::normalize(source)?;
    let mapped = varmap::process(&norm.normalized);
    let tokens = lexer::tokenize(&mapped.mapped_source, &norm.source_map, &mapped.offset_map)?;
    let mut program = Parser::new(&tokens).parse()?;
    codegen::annotate_self_usage(&mut program);
    Ok(FrontendResult {
        normalized: norm.normalized,
        varmap: mapped,
        tokens,
        program,
    })
}

/// Compile a source string to LLVM IR text.
pub fn compile_to_ir(source: &str) -> Result<String, String> {
    let frontend = run_frontend(source)?;
    let mut generator = CodeGen::new();
    generator.set_varmap(frontend.varmap.entries.clone());
    generator.set_original_source(source.to_string());
    generator
        .generate(&frontend.program)
        .map_err(|e| e.to_string())
}

/// Compile a FLYUX source file to an executable (or, with `emit_ir_only`,
/// just the `.ll`).
pub fn compile_file(
    input: &Path,
    output: &Path,
    keep_ir: bool,
    emit_ir_only: bool,
    config: &CompilerConfig,
) -> Result<(), String> {
    let source = fs::read_to_string(input)
        .map_err(|e| format!("Failed to read source file '{}': {}", input.display(), e))?;

    let ir = compile_to_ir(&source)?;

    let ir_path = output.with_extension("ll");
    fs::write(&ir_path, &ir).map_err(|e| format!("Failed to write IR file: {e}"))?;
    if emit_ir_only {
        return Ok(());
    }

    let clang = config.clang();
    check_clang_version(clang)?;

    // The runtime C source is embedded in the binary (or located through
    // config / environment), written to a per-PID temp file, and compiled
    // once per invocation.
    let pid = std::process::id();
    let temp_dir = std::env::temp_dir();
    let mut temp_source: Option<PathBuf> = None;
    let runtime_c: PathBuf = if let Some(path) = &config.runtime_source {
        path.clone()
    } else if !RUNTIME_SOURCE.is_empty() {
        let path = temp_dir.join(format!("flyux_runtime_{pid}.c"));
        fs::write(&path, RUNTIME_SOURCE)
            .map_err(|e| format!("Failed to write runtime source: {e}"))?;
        temp_source = Some(path.clone());
        path
    } else if let Ok(path) = std::env::var("FLYUX_RUNTIME_SRC") {
        PathBuf::from(path)
    } else {
        fs::remove_file(&ir_path).ok();
        return Err(
            "Runtime source not available: set FLYUX_RUNTIME_SRC or `runtime_source` in the config"
                .to_string(),
        );
    };

    let runtime_obj = temp_dir.join(format!("flyux_runtime_{pid}.o"));
    let compile_output = Command::new(clang)
        .arg("-c")
        .arg(config.optimization_level.as_flag())
        .arg(&runtime_c)
        .arg("-o")
        .arg(&runtime_obj)
        .output()
        .map_err(|e| format!("Failed to run {clang}: {e}"))?;
    if !compile_output.status.success() {
        let stderr = String::from_utf8_lossy(&compile_output.stderr);
        cleanup(&[temp_source.as_deref(), Some(&runtime_obj)]);
        return Err(format!("Runtime compilation failed:\n{stderr}"));
    }

    let mut link = Command::new(clang);
    link.arg(config.optimization_level.as_flag())
        .arg(&ir_path)
        .arg(&runtime_obj)
        .arg("-o")
        .arg(output)
        .arg("-lm");
    for lib_path in &config.library_paths {
        link.arg("-L").arg(lib_path);
    }
    for lib in &config.libraries {
        link.arg("-l").arg(lib);
    }
    let link_output = link
        .output()
        .map_err(|e| format!("Failed to run {clang}: {e}"))?;

    cleanup(&[temp_source.as_deref(), Some(&runtime_obj)]);

    if !link_output.status.success() {
        let stderr = String::from_utf8_lossy(&link_output.stderr);
        return Err(format!("Clang compilation failed:\n{stderr}"));
    }

    if !keep_ir {
        fs::remove_file(&ir_path).ok();
    }
    Ok(())
}

fn cleanup(paths: &[Option<&Path>]) {
    for path in paths.iter().flatten() {
        fs::remove_file(path).ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_clang_version_standard() {
        let output = "clang version 15.0.0 (https://github.com/llvm/llvm-project)\nTarget: x86_64";
        assert_eq!(parse_clang_version(output), Some(15));
    }

    #[test]
    fn test_parse_clang_version_apple() {
        let output =
            "Apple clang version 14.0.3 (clang-1403.0.22.14.1)\nTarget: arm64-apple-darwin";
        assert_eq!(parse_clang_version(output), Some(14));
    }

    #[test]
    fn test_parse_clang_version_ubuntu() {
        let output = "Ubuntu clang version 15.0.7\nTarget: x86_64-pc-linux-gnu";
        assert_eq!(parse_clang_version(output), Some(15));
    }

    #[test]
    fn test_parse_clang_version_invalid() {
        assert_eq!(parse_clang_version("no version here"), None);
        assert_eq!(parse_clang_version("version "), None);
    }

    #[test]
    fn test_clang_minimum_vendor_aware() {
        let apple = "Apple clang version 14.0.3 (clang-1403.0.22.14.1)";
        assert_eq!(clang_minimum_for(apple), (MIN_APPLE_CLANG_VERSION, "Apple clang"));
        let upstream = "Ubuntu clang version 15.0.7";
        assert_eq!(clang_minimum_for(upstream), (MIN_CLANG_VERSION, "clang"));
    }

    #[test]
    fn test_compile_to_ir_smoke() {
        let ir = compile_to_ir("x := 1\nprintln(x)").unwrap();
        assert!(ir.starts_with("; ModuleID = 'flyux_module'"));
        assert!(ir.contains("target triple"));
        assert!(ir.contains("define i32 @main()"));
    }

    #[test]
    fn test_compile_to_ir_propagates_normalizer_error() {
        let err = compile_to_ir("123 := 4").unwrap_err();
        assert!(err.contains("Number literal"));
    }

    #[test]
    fn test_compile_to_ir_propagates_parser_errors() {
        let err = compile_to_ir("x := ;").unwrap_err();
        assert!(err.contains("Error at line"));
    }

    #[test]
    fn test_run_frontend_exposes_artifacts() {
        let result = run_frontend("变 := 1\nprintln(变)").unwrap();
        assert_eq!(result.varmap.entries.len(), 1);
        assert!(result.normalized.contains("变:=1"));
        assert!(!result.tokens.is_empty());
        assert_eq!(result.program.statements.len(), 2);
    }
}
