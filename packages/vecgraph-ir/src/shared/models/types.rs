//! Data type descriptions attached to compute nodes.
//!
//! A `DataTypeInfo` is the vectorizer-facing view of a C type: base kind,
//! bit width, signedness, an optional vector width (1 = scalar), and the
//! raw type-name string for dependent/unrecognized types.

use serde::{Deserialize, Serialize};

/// Base kind of a data type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum BaseType {
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float,
    Double,
    Pointer,
    Array,
    Void,
    /// Named but unrecognized type (typedefs, records); `type_name` carries it
    Dependent,
    #[default]
    Unknown,
}

/// Data type information for a compute node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataTypeInfo {
    pub base_type: BaseType,
    /// Vector width, 1 = scalar
    pub vector_width: u32,
    /// Bit width, 0 = unknown
    pub bit_width: u32,
    pub is_signed: bool,
    /// Raw type name, used for Dependent types
    pub type_name: String,
}

impl Default for DataTypeInfo {
    fn default() -> Self {
        Self {
            base_type: BaseType::Unknown,
            vector_width: 1,
            bit_width: 0,
            is_signed: true,
            type_name: String::new(),
        }
    }
}

impl DataTypeInfo {
    pub fn scalar(base_type: BaseType, bit_width: u32, is_signed: bool) -> Self {
        Self {
            base_type,
            vector_width: 1,
            bit_width,
            is_signed,
            type_name: String::new(),
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self.base_type,
            BaseType::Int8
                | BaseType::Int16
                | BaseType::Int32
                | BaseType::Int64
                | BaseType::UInt8
                | BaseType::UInt16
                | BaseType::UInt32
                | BaseType::UInt64
        )
    }

    pub fn is_float(&self) -> bool {
        matches!(self.base_type, BaseType::Float | BaseType::Double)
    }

    /// Parse a C type spelling into a `DataTypeInfo`.
    ///
    /// Handles the builtin scalar types, pointers and arrays; anything else
    /// becomes `Dependent` with the spelling preserved in `type_name`.
    pub fn from_type_name(spelling: &str) -> Self {
        let name = spelling.trim();
        if name.contains('*') {
            let mut info = Self::scalar(BaseType::Pointer, 64, true);
            info.type_name = name.to_string();
            return info;
        }
        if name.contains('[') {
            let mut info = Self::scalar(BaseType::Array, 0, true);
            info.type_name = name.to_string();
            return info;
        }

        let stripped = name
            .trim_start_matches("const ")
            .trim_start_matches("volatile ")
            .trim();
        match stripped {
            "void" => Self::scalar(BaseType::Void, 0, true),
            "char" | "signed char" | "int8_t" => Self::scalar(BaseType::Int8, 8, true),
            "unsigned char" | "uint8_t" => Self::scalar(BaseType::UInt8, 8, false),
            "short" | "short int" | "int16_t" => Self::scalar(BaseType::Int16, 16, true),
            "unsigned short" | "uint16_t" => Self::scalar(BaseType::UInt16, 16, false),
            "int" | "int32_t" => Self::scalar(BaseType::Int32, 32, true),
            "unsigned" | "unsigned int" | "uint32_t" => Self::scalar(BaseType::UInt32, 32, false),
            "long" | "long int" | "long long" | "long long int" | "int64_t" | "ssize_t" => {
                Self::scalar(BaseType::Int64, 64, true)
            }
            "unsigned long" | "unsigned long long" | "uint64_t" | "size_t" => {
                Self::scalar(BaseType::UInt64, 64, false)
            }
            "float" => Self::scalar(BaseType::Float, 32, true),
            "double" | "long double" => Self::scalar(BaseType::Double, 64, true),
            "" => Self::default(),
            other => {
                let mut info = Self::default();
                info.base_type = BaseType::Dependent;
                info.type_name = other.to_string();
                info
            }
        }
    }

    pub fn to_string_compact(&self) -> String {
        let base = match self.base_type {
            BaseType::Int8 => "i8",
            BaseType::Int16 => "i16",
            BaseType::Int32 => "i32",
            BaseType::Int64 => "i64",
            BaseType::UInt8 => "u8",
            BaseType::UInt16 => "u16",
            BaseType::UInt32 => "u32",
            BaseType::UInt64 => "u64",
            BaseType::Float => "f32",
            BaseType::Double => "f64",
            BaseType::Pointer => "ptr",
            BaseType::Array => "arr",
            BaseType::Void => "void",
            BaseType::Dependent => {
                return if self.type_name.is_empty() {
                    "<dependent>".to_string()
                } else {
                    self.type_name.clone()
                };
            }
            BaseType::Unknown => "unknown",
        };
        if self.vector_width > 1 {
            format!("{}x{}", base, self.vector_width)
        } else {
            base.to_string()
        }
    }
}

impl std::fmt::Display for DataTypeInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_string_compact())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_spellings() {
        assert_eq!(DataTypeInfo::from_type_name("int").base_type, BaseType::Int32);
        assert_eq!(
            DataTypeInfo::from_type_name("unsigned int").base_type,
            BaseType::UInt32
        );
        assert_eq!(DataTypeInfo::from_type_name("float").base_type, BaseType::Float);
        assert!(!DataTypeInfo::from_type_name("uint8_t").is_signed);
    }

    #[test]
    fn test_pointer_and_array() {
        assert_eq!(
            DataTypeInfo::from_type_name("float *").base_type,
            BaseType::Pointer
        );
        assert_eq!(
            DataTypeInfo::from_type_name("int [16]").base_type,
            BaseType::Array
        );
    }

    #[test]
    fn test_dependent_keeps_spelling() {
        let info = DataTypeInfo::from_type_name("ggml_bf16_t");
        assert_eq!(info.base_type, BaseType::Dependent);
        assert_eq!(info.to_string_compact(), "ggml_bf16_t");
    }

    #[test]
    fn test_compact_vector_suffix() {
        let mut info = DataTypeInfo::scalar(BaseType::Float, 32, true);
        info.vector_width = 4;
        assert_eq!(info.to_string_compact(), "f32x4");
    }
}
