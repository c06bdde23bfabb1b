//! Target platform detection for the emitted module header.

/// LLVM target triple for the host platform.
pub fn get_target_triple() -> &'static str {
    if cfg!(all(target_os = "macos", target_arch = "aarch64")) {
        "arm64-apple-macosx11.0.0"
    } else if cfg!(all(target_os = "macos", target_arch = "x86_64")) {
        "x86_64-apple-macosx10.15.0"
    } else if cfg!(all(target_os = "linux", target_arch = "aarch64")) {
        "aarch64-unknown-linux-gnu"
    } else {
        "x86_64-unknown-linux-gnu"
    }
}

/// Data layout matching the triple. clang tolerates a slightly generic
/// layout here; these match what clang itself emits for each target.
pub fn get_data_layout() -> &'static str {
    if cfg!(target_os = "macos") {
        if cfg!(target_arch = "aarch64") {
            "e-m:o-i64:64-i128:128-n32:64-S128"
        } else {
            "e-m:o-i64:64-f80:128-n8:16:32:64-S128"
        }
    } else if cfg!(target_arch = "aarch64") {
        "e-m:e-i8:8:32-i16:16:32-i64:64-i128:128-n32:64-S128"
    } else {
        "e-m:e-p270:32:32-p271:32:32-p272:64:64-i64:64-f80:128-n8:16:32:64-S128"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_triple_nonempty() {
        assert!(!get_target_triple().is_empty());
        assert!(get_target_triple().contains('-'));
    }

    #[test]
    fn test_data_layout_nonempty() {
        assert!(get_data_layout().starts_with('e'));
    }
}
