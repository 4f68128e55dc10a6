/*!
Name/value parameters exchanged between the core and providers.

The registry never interprets parameter values; it only carries them
between the caller and the provider that answers them.
*/

use std::fmt;

#[cfg(feature = "serde-support")]
use serde::{Deserialize, Serialize};

/// Data type of a parameter, as advertised by a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub enum ParamType {
    /// Signed integer
    Integer,
    /// Unsigned integer
    UInteger,
    /// UTF-8 string
    Utf8String,
    /// Raw bytes
    OctetString,
}

impl ParamType {
    /// Decode the numeric tag used across the module boundary
    pub fn from_raw(tag: u32) -> Option<Self> {
        match tag {
            1 => Some(ParamType::Integer),
            2 => Some(ParamType::UInteger),
            4 => Some(ParamType::Utf8String),
            5 => Some(ParamType::OctetString),
            _ => None,
        }
    }

    /// Numeric tag used across the module boundary
    pub fn as_raw(self) -> u32 {
        match self {
            ParamType::Integer => 1,
            ParamType::UInteger => 2,
            ParamType::Utf8String => 4,
            ParamType::OctetString => 5,
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamType::Integer => write!(f, "integer"),
            ParamType::UInteger => write!(f, "unsigned integer"),
            ParamType::Utf8String => write!(f, "utf8 string"),
            ParamType::OctetString => write!(f, "octet string"),
        }
    }
}

/// A parameter a provider is able to answer
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub struct ParamDescriptor {
    /// Parameter key
    pub key: String,
    /// Type of the value returned for the key
    pub data_type: ParamType,
}

impl ParamDescriptor {
    pub fn new(key: impl Into<String>, data_type: ParamType) -> Self {
        Self {
            key: key.into(),
            data_type,
        }
    }
}

/// Value slot of a parameter
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub enum ParamValue {
    /// Requested but not answered
    #[default]
    Unset,
    Integer(i64),
    UInteger(u64),
    Utf8String(String),
    OctetString(Vec<u8>),
}

/// A single key/value parameter
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub struct Param {
    /// Parameter key
    pub key: String,
    /// Parameter value
    pub value: ParamValue,
}

impl Param {
    /// Create a request for `key`, to be answered by whoever receives it
    pub fn request(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: ParamValue::Unset,
        }
    }

    /// Create a UTF-8 string parameter
    pub fn utf8(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: ParamValue::Utf8String(value.into()),
        }
    }

    /// Whether a value has been written into this parameter
    pub fn is_set(&self) -> bool {
        self.value != ParamValue::Unset
    }

    /// The value as a string slice, if it holds one
    pub fn as_str(&self) -> Option<&str> {
        match &self.value {
            ParamValue::Utf8String(s) => Some(s),
            _ => None,
        }
    }
}

/// Find the parameter with the given key
pub fn locate<'a>(params: &'a mut [Param], key: &str) -> Option<&'a mut Param> {
    params.iter_mut().find(|p| p.key == key)
}
