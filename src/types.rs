// src/types.rs
use crate::error::compile_error::CompileError;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Width of a scalar value in bytes.
///
/// Shared between the type model and register sizes: every integer type and
/// every virtual register carries one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DataSize {
    Byte,
    Word,
    Dword,
    Qword,
}

impl DataSize {
    pub fn from_bytes(size: u32) -> Result<DataSize, CompileError> {
        match size {
            1 => Ok(DataSize::Byte),
            2 => Ok(DataSize::Word),
            4 => Ok(DataSize::Dword),
            8 => Ok(DataSize::Qword),
            other => Err(CompileError::InvalidDataSize(other)),
        }
    }

    #[inline]
    pub fn in_bytes(self) -> u32 {
        match self {
            DataSize::Byte => 1,
            DataSize::Word => 2,
            DataSize::Dword => 4,
            DataSize::Qword => 8,
        }
    }
}

impl fmt::Display for DataSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.in_bytes())
    }
}

/// A struct field: its type and byte offset within the aggregate.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub ty: Type,
    pub offset: u32,
}

/// The closed set of types the front-end produces.
#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    Void,
    Bool,
    Int { size: DataSize, is_signed: bool },
    Ptr(Box<Type>),
    Func { ret: Box<Type>, params: Vec<Type>, is_vararg: bool },
    Struct { tag: Option<Arc<str>>, fields: Vec<Arc<str>>, field_map: HashMap<Arc<str>, Field> },
    Enum { tag: Option<Arc<str>>, enums: Vec<Arc<str>>, enum_map: HashMap<Arc<str>, i64> },
    Array { element: Box<Type>, length: Option<u32> },
}

/// The underlying type of every enumeration (`long` in the source language).
pub fn enum_underlying_ty() -> Type {
    Type::int(DataSize::Qword, true)
}

impl Type {
    pub fn int(size: DataSize, is_signed: bool) -> Type {
        Type::Int { size, is_signed }
    }

    pub fn ptr(inner: Type) -> Type {
        Type::Ptr(Box::new(inner))
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Type::Int { .. } | Type::Bool | Type::Enum { .. })
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, Type::Ptr(_))
    }

    pub fn is_scalar(&self) -> bool {
        self.is_integer() || self.is_pointer()
    }

    /// A type is complete when its size is known. `void`, struct/enum types
    /// without members and arrays of unknown length are incomplete.
    pub fn is_complete(&self) -> bool {
        match self {
            Type::Void => false,
            Type::Bool | Type::Int { .. } | Type::Ptr(_) | Type::Func { .. } => true,
            Type::Struct { fields, .. } => !fields.is_empty(),
            Type::Enum { enums, .. } => !enums.is_empty(),
            Type::Array { length, .. } => length.is_some(),
        }
    }

    /// Size of the type in bytes.
    ///
    /// Contracts: `sizeof(void) = 1`, `sizeof(ptr) = 8`,
    /// `sizeof(enum) = sizeof(long)`, array size is length times element
    /// size. Requesting the size of any other incomplete type is a
    /// user-visible diagnostic.
    pub fn size_of(&self) -> Result<u32, CompileError> {
        if !matches!(self, Type::Void) && !self.is_complete() {
            return Err(CompileError::IncompleteType);
        }
        match self {
            Type::Void => Ok(1),
            Type::Bool => Ok(1),
            Type::Int { size, .. } => Ok(size.in_bytes()),
            Type::Ptr(_) => Ok(8),
            Type::Func { .. } => {
                Err(CompileError::lowering("attempt to obtain the size of function type"))
            }
            Type::Array { element, length } => {
                let length = length.expect("checked by is_complete");
                Ok(length * element.size_of()?)
            }
            Type::Struct { fields, field_map, .. } => {
                let last = fields.last().expect("checked by is_complete");
                let field = &field_map[last];
                Ok(field.offset + field.ty.size_of()?)
            }
            Type::Enum { .. } => enum_underlying_ty().size_of(),
        }
    }

    /// The register width holding a value of this type.
    pub fn data_size(&self) -> Result<DataSize, CompileError> {
        DataSize::from_bytes(self.size_of()?)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => f.write_str("void"),
            Type::Bool => f.write_str("bool"),
            Type::Int { size, is_signed } => {
                write!(f, "{}int{}", if *is_signed { "" } else { "u" }, size.in_bytes() * 8)
            }
            Type::Ptr(inner) => write!(f, "*{inner}"),
            Type::Func { ret, params, is_vararg } => {
                let params_str = params.iter().map(Type::to_string).collect::<Vec<_>>().join(", ");
                let vararg = if *is_vararg { ", ..." } else { "" };
                write!(f, "{ret}({params_str}{vararg})")
            }
            Type::Struct { tag, .. } => {
                write!(f, "struct {}", tag.as_deref().unwrap_or("<anonymous>"))
            }
            Type::Enum { tag, .. } => write!(f, "enum {}", tag.as_deref().unwrap_or("<anonymous>")),
            Type::Array { element, length } => match length {
                Some(length) => write!(f, "[{element}; {length}]"),
                None => write!(f, "[{element}]"),
            },
        }
    }
}
