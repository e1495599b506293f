use std::io;

/// Failure of a compilation unit
///
/// Every variant aborts the whole unit; no artifact is produced once any stage has failed.
/// Variants carry the originating method and, where one exists, the source instruction index.
#[derive(Debug)]
pub enum Error {
    /// A source construct has no translation, or a call cannot be resolved to a unique
    /// target at compile time
    UnsupportedConstruct {
        method: String,
        offset: Option<usize>,
        construct: String,
    },

    /// Conflicting or malformed directives, or malformed unit metadata
    AnnotationConfiguration {
        method: Option<String>,
        problem: String,
    },

    /// A method frame does not fit the target's flat slot model
    TooManyLocalVariables {
        method: String,
        slots: usize,
        max: usize,
    },

    /// Branch encoding selection did not converge, the script outgrew its size limit or a
    /// jump resolved to a mid-instruction address
    AddressResolution {
        method: Option<String>,
        problem: String,
    },

    /// An exposed method's parameter or return type has no ABI mapping, or manifest
    /// metadata failed validation
    ManifestGeneration {
        method: Option<String>,
        problem: String,
    },

    Io(io::Error),
    Json(serde_json::Error),
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Error {
        Error::Json(err)
    }
}
