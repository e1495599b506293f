//! Input contract of the compiler
//!
//! A [`UnitDescriptor`] is what the external class reader hands over: one contract worth of
//! methods, already parsed out of the managed binary format into structured instruction lists.
//! Jump targets are indices into the instruction list of the containing method, never byte
//! offsets; exception ranges arrive lowered to explicit [`SourceInsn::Try`], [`SourceInsn::EndTry`]
//! and [`SourceInsn::EndFinally`] markers. The shapes here derive serde so descriptors can be
//! exchanged as JSON.

use serde::{Deserialize, Serialize};

/// A named, typed parameter, with the type given as a source level type name
#[derive(Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
pub struct ParamDecl {
    pub name: String,

    #[serde(rename = "type")]
    pub param_type: String,
}

/// An event the contract can raise, declared at unit level
#[derive(Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
pub struct EventDecl {
    pub name: String,

    #[serde(default)]
    pub params: Vec<ParamDecl>,
}

/// Permission to call into another contract, copied into the manifest
///
/// An empty method list grants every method of the named contract.
#[derive(Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
pub struct PermissionDecl {
    /// `"*"`, a 20 byte contract hash or a 33 byte group key, hex encoded
    pub contract: String,

    #[serde(default)]
    pub methods: Vec<String>,
}

/// Which lifecycle notification a hook method handles
#[derive(Copy, Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
pub enum HookKind {
    /// Runs when the contract is deployed or updated
    Deploy,

    /// Consulted when a transaction carrying the contract as signer is verified
    Verify,
}

impl HookKind {
    /// Method name the chain invokes the hook under
    pub fn exposed_name(self) -> &'static str {
        match self {
            HookKind::Deploy => "_deploy",
            HookKind::Verify => "verify",
        }
    }
}

/// A declared method annotation
#[derive(Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
pub enum Annotation {
    /// The method is the contract's externally invocable dispatch root
    EntryPoint,

    /// The method handles a lifecycle notification
    Hook(HookKind),

    /// Discard the body and emit one interop service invocation instead
    Syscall(String),

    /// Discard the body and emit exactly the given opcode and operand instead
    Instruction {
        opcode: u8,

        #[serde(default)]
        operand: Vec<u8>,
    },

    /// Discard the body and emit one call into the contract with the given script hash,
    /// hex encoded, 20 bytes
    ContractCall(String),

    /// Promise that the method does not change chain state
    Safe,

    /// Expose the method in the manifest under a different name
    DisplayName(String),
}

/// One source instruction
///
/// Branch targets are indices into the instruction list of the containing method. Slot indices
/// use the source machine's addressing, where a two slot wide value occupies its index and the
/// one after it.
#[derive(Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
pub enum SourceInsn {
    // Constants
    PushInt(i128),
    PushBool(bool),
    PushBytes(Vec<u8>),
    PushString(String),
    PushNull,

    // Variables
    Load(u16),
    Store(u16),
    Inc { slot: u16, amount: i32 },
    LoadStatic(u8),
    StoreStatic(u8),

    // Operand stack
    Nop,
    Dup,
    /// Copy the top value below the value beneath it
    DupUnder,
    Pop,
    Swap,

    // Arithmetic and bit operations
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Neg,
    Shl,
    Shr,
    BitAnd,
    BitOr,
    BitXor,
    Not,

    // Comparisons, leaving a boolean on the stack
    CmpEq,
    CmpNe,
    CmpLt,
    CmpLe,
    CmpGt,
    CmpGe,

    // Control flow
    Jump(u32),
    BranchTrue(u32),
    BranchFalse(u32),
    BranchNull(u32),
    BranchNotNull(u32),

    // Objects, arrays and maps
    /// Length is taken from the stack
    NewArray,
    /// Byte buffer of stack provided length
    NewBuffer,
    /// Instance with the given number of fields
    NewObject { fields: u16 },
    NewMap,
    ArrayGet,
    ArraySet,
    Size,
    GetField(u16),
    SetField(u16),
    /// Concatenate two strings
    Concat,

    // Calls and events
    /// Call another method of the same unit, by name
    Call { method: String },
    /// Raise the unit level event with the given index; the arguments are on the stack
    EmitEvent { event: usize },

    // Exceptions
    Throw,
    /// Open an exception region; handler fields are instruction indices
    Try {
        catch: Option<u32>,
        finally: Option<u32>,
    },
    /// Leave a protected region or handler, continuing at the given instruction index
    EndTry { next: u32 },
    EndFinally,

    Return,
}

/// One source method, as produced by the class reader
#[derive(Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
pub struct MethodDescriptor {
    pub name: String,

    #[serde(default)]
    pub params: Vec<ParamDecl>,

    /// Source level name of the return type
    pub return_type: String,

    /// Whether source visibility exposes the method
    #[serde(default)]
    pub public: bool,

    /// Declared local slot count, in source addressing, parameters not included
    #[serde(default)]
    pub locals: u16,

    /// Source slot indices occupied by two slot wide values
    #[serde(default)]
    pub wide_slots: Vec<u16>,

    #[serde(default)]
    pub annotations: Vec<Annotation>,

    #[serde(default)]
    pub instructions: Vec<SourceInsn>,
}

impl MethodDescriptor {
    /// First annotation matching the given predicate
    pub fn annotation<F>(&self, is_match: F) -> Option<&Annotation>
    where
        F: Fn(&Annotation) -> bool,
    {
        self.annotations.iter().find(|annotation| is_match(annotation))
    }

    /// The name the method is exposed under, honoring a display name annotation
    pub fn exposed_name(&self) -> &str {
        for annotation in &self.annotations {
            if let Annotation::DisplayName(name) = annotation {
                return name;
            }
        }
        &self.name
    }

    /// Whether the method carries a safety promise
    pub fn is_safe(&self) -> bool {
        self.annotations.contains(&Annotation::Safe)
    }
}

/// One compilation unit, the input of the whole pipeline
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct UnitDescriptor {
    /// Contract name, also the manifest name
    pub name: String,

    /// Where the contract's source can be found, recorded in the NEF header
    #[serde(default)]
    pub source_url: Option<String>,

    /// Number of static field slots of the unit
    #[serde(default)]
    pub statics: u16,

    pub methods: Vec<MethodDescriptor>,

    #[serde(default)]
    pub events: Vec<EventDecl>,

    #[serde(default)]
    pub standards: Vec<String>,

    #[serde(default)]
    pub permissions: Vec<PermissionDecl>,

    /// Hex encoded contract hashes or group keys this contract trusts, `"*"` for all
    #[serde(default)]
    pub trusts: Vec<String>,

    /// Free form metadata copied into the manifest
    #[serde(default)]
    pub extra: Option<serde_json::Value>,
}

impl UnitDescriptor {
    /// The method with the given source name
    pub fn method(&self, name: &str) -> Option<&MethodDescriptor> {
        self.methods.iter().find(|method| method.name == name)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn descriptor_json_roundtrip() {
        let unit = UnitDescriptor {
            name: "Example".to_string(),
            source_url: None,
            statics: 0,
            methods: vec![MethodDescriptor {
                name: "main".to_string(),
                params: vec![ParamDecl {
                    name: "value".to_string(),
                    param_type: "int".to_string(),
                }],
                return_type: "int".to_string(),
                public: true,
                locals: 0,
                wide_slots: vec![],
                annotations: vec![Annotation::EntryPoint],
                instructions: vec![SourceInsn::Load(0), SourceInsn::Return],
            }],
            events: vec![],
            standards: vec![],
            permissions: vec![],
            trusts: vec![],
            extra: None,
        };

        let text = serde_json::to_string(&unit).unwrap();
        let back: UnitDescriptor = serde_json::from_str(&text).unwrap();
        assert_eq!(back, unit);
    }

    #[test]
    fn descriptor_json_defaults() {
        let text = r#"{
            "name": "Example",
            "methods": [{
                "name": "run",
                "return_type": "void",
                "instructions": ["Return"]
            }]
        }"#;

        let unit: UnitDescriptor = serde_json::from_str(text).unwrap();
        assert_eq!(unit.statics, 0);
        assert_eq!(unit.methods[0].instructions, vec![SourceInsn::Return]);
        assert!(!unit.methods[0].public);
        assert!(unit.methods[0].annotations.is_empty());
    }

    #[test]
    fn exposed_name_honors_display_name() {
        let method = MethodDescriptor {
            name: "internalName".to_string(),
            params: vec![],
            return_type: "void".to_string(),
            public: true,
            locals: 0,
            wide_slots: vec![],
            annotations: vec![Annotation::DisplayName("prettyName".to_string())],
            instructions: vec![],
        };
        assert_eq!(method.exposed_name(), "prettyName");
        assert!(!method.is_safe());
    }

    #[test]
    fn hook_names() {
        assert_eq!(HookKind::Deploy.exposed_name(), "_deploy");
        assert_eq!(HookKind::Verify.exposed_name(), "verify");
    }
}
