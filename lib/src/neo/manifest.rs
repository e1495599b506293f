//! The contract manifest
//!
//! The manifest is the JSON companion of the NEF file. It names the contract, lists every
//! method the deployed script exposes together with its entry offset into the script, declares
//! the events the contract can raise and states which other contracts it may call and trust.
//! The serde shapes here mirror the field names and ordering the chain expects.

use serde::{Deserialize, Serialize};

/// Parameter and return types of the contract interface
#[derive(Copy, Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
pub enum ParamType {
    Any,
    Signature,
    Boolean,
    Integer,
    Hash160,
    Hash256,
    ByteArray,
    PublicKey,
    String,
    Array,
    Map,
    InteropInterface,
    Void,
}

/// One named, typed parameter of a method or event
#[derive(Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
pub struct ContractParameter {
    pub name: String,

    #[serde(rename = "type")]
    pub param_type: ParamType,
}

/// One exposed method of the contract
#[derive(Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
pub struct ContractMethod {
    pub name: String,
    pub parameters: Vec<ContractParameter>,

    /// Byte offset of the method's first instruction within the script
    pub offset: usize,

    #[serde(rename = "returntype")]
    pub return_type: ParamType,

    /// Safe methods promise not to change chain state and can be called without a signature
    pub safe: bool,
}

/// One event the contract can raise
#[derive(Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
pub struct ContractEvent {
    pub name: String,
    pub parameters: Vec<ContractParameter>,
}

/// The application binary interface section of the manifest
#[derive(Clone, Eq, PartialEq, Debug, Default, Serialize, Deserialize)]
pub struct ContractAbi {
    pub methods: Vec<ContractMethod>,
    pub events: Vec<ContractEvent>,
}

/// A set of method names, possibly the full set
#[derive(Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WildcardSet {
    /// Every member, serialized as the string `"*"`
    Wildcard(String),

    /// An explicit list of members
    Restricted(Vec<String>),
}

impl WildcardSet {
    pub fn wildcard() -> WildcardSet {
        WildcardSet::Wildcard("*".to_string())
    }
}

/// Permission to call methods of another contract
#[derive(Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
pub struct ContractPermission {
    /// `"*"`, a 20 byte contract hash or a 33 byte group public key, hex encoded
    pub contract: String,

    pub methods: WildcardSet,
}

/// Membership of the contract in a manifest group
#[derive(Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
pub struct ContractGroup {
    pub pubkey: String,
    pub signature: String,
}

/// The complete manifest
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct ContractManifest {
    pub name: String,
    pub groups: Vec<ContractGroup>,
    pub features: serde_json::Map<String, serde_json::Value>,

    #[serde(rename = "supportedstandards")]
    pub supported_standards: Vec<String>,

    pub abi: ContractAbi,
    pub permissions: Vec<ContractPermission>,
    pub trusts: WildcardSet,
    pub extra: Option<serde_json::Value>,
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn method_field_names() {
        let method = ContractMethod {
            name: "balanceOf".to_string(),
            parameters: vec![ContractParameter {
                name: "account".to_string(),
                param_type: ParamType::Hash160,
            }],
            offset: 12,
            return_type: ParamType::Integer,
            safe: true,
        };

        assert_eq!(
            serde_json::to_value(&method).unwrap(),
            json!({
                "name": "balanceOf",
                "parameters": [{"name": "account", "type": "Hash160"}],
                "offset": 12,
                "returntype": "Integer",
                "safe": true,
            })
        );
    }

    #[test]
    fn wildcard_sets() {
        assert_eq!(
            serde_json::to_value(WildcardSet::wildcard()).unwrap(),
            json!("*")
        );
        assert_eq!(
            serde_json::to_value(WildcardSet::Restricted(vec!["transfer".to_string()])).unwrap(),
            json!(["transfer"])
        );

        let parsed: WildcardSet = serde_json::from_value(json!("*")).unwrap();
        assert_eq!(parsed, WildcardSet::wildcard());
    }

    #[test]
    fn manifest_roundtrip() {
        let manifest = ContractManifest {
            name: "Token".to_string(),
            groups: vec![],
            features: serde_json::Map::new(),
            supported_standards: vec!["NEP-17".to_string()],
            abi: ContractAbi::default(),
            permissions: vec![ContractPermission {
                contract: "*".to_string(),
                methods: WildcardSet::wildcard(),
            }],
            trusts: WildcardSet::Restricted(vec![]),
            extra: None,
        };

        let text = serde_json::to_string(&manifest).unwrap();
        let back: ContractManifest = serde_json::from_str(&text).unwrap();
        assert_eq!(back, manifest);

        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["supportedstandards"], json!(["NEP-17"]));
        assert_eq!(value["trusts"], json!([]));
    }
}
