//! Build script: resolve the embedded runtime C source.
//!
//! When `FLYUX_RUNTIME_SRC` names a file at build time, its contents are
//! embedded into the compiler binary (see `RUNTIME_SOURCE` in lib.rs) so a
//! single `flyuxc` binary can produce executables without a runtime checkout.
//! Otherwise an empty placeholder is generated and the runtime source is
//! located at compile time instead.

use std::env;
use std::fs;
use std::path::PathBuf;

fn main() {
    println!("cargo:rerun-if-env-changed=FLYUX_RUNTIME_SRC");

    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR not set"));

    let src_path = match env::var("FLYUX_RUNTIME_SRC") {
        Ok(path) if !path.is_empty() => {
            println!("cargo:rerun-if-changed={path}");
            let path = PathBuf::from(path);
            assert!(
                path.is_file(),
                "FLYUX_RUNTIME_SRC points at '{}', which is not a file",
                path.display()
            );
            path
        }
        _ => {
            // No runtime checkout available; embed an empty source and fall
            // back to run-time discovery (config or environment).
            let placeholder = out_dir.join("flyux_runtime_empty.c");
            fs::write(&placeholder, "").expect("failed to write runtime placeholder");
            placeholder
        }
    };

    println!(
        "cargo:rustc-env=FLYUX_RUNTIME_SRC_PATH={}",
        src_path.display()
    );
}
