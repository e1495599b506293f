/// Compiler configuration
///
/// Threaded explicitly through the compilation entry point so that independent units compiled
/// in parallel cannot observe each other's configuration.
pub struct Settings {
    /// Compiler identification written into the executable header, at most 64 UTF-8 bytes
    pub compiler_name: String,

    /// Source URL written into the executable header when the unit does not declare one,
    /// at most 255 UTF-8 bytes
    pub source_url: String,

    /// Upper bound on the assembled script size, in bytes
    pub max_script_length: usize,

    /// Number of layout passes after which encoding selection is treated as non-convergent
    ///
    /// Encodings only ever shrink, so the fixed point is normally reached within two or three
    /// passes. The bound guards against a bug turning the loop pathological.
    pub max_layout_passes: usize,
}

impl Settings {
    pub fn new() -> Settings {
        Settings {
            compiler_name: format!("jbc2nef {}", env!("CARGO_PKG_VERSION")),
            source_url: String::new(),
            max_script_length: crate::neo::MAX_SCRIPT_LENGTH,
            max_layout_passes: 8,
        }
    }
}

impl Default for Settings {
    fn default() -> Settings {
        Settings::new()
    }
}
