//! Integral and array types of the target dialects.
//!
//! `IntTypeId` doubles as the promotion rank: the declaration order of the
//! variants is the total order used by the usual arithmetic conversions.
//! Array types are interned in a `TypeStore`; equality of `ArrayTypeId`s is
//! identity of the interned (element, dims) pair.

use std::collections::HashMap;
use std::fmt;

use crate::options::StdKind;

/// Tag of an integral type. Variant order is the promotion rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IntTypeId {
    Bool,
    SChar,
    UChar,
    Short,
    UShort,
    Int,
    Uint,
    Long,
    Ulong,
    LLong,
    ULLong,
}

impl IntTypeId {
    pub const ALL: [IntTypeId; 11] = [
        IntTypeId::Bool,
        IntTypeId::SChar,
        IntTypeId::UChar,
        IntTypeId::Short,
        IntTypeId::UShort,
        IntTypeId::Int,
        IntTypeId::Uint,
        IntTypeId::Long,
        IntTypeId::Ulong,
        IntTypeId::LLong,
        IntTypeId::ULLong,
    ];

    pub fn is_signed(self) -> bool {
        matches!(
            self,
            IntTypeId::SChar | IntTypeId::Short | IntTypeId::Int | IntTypeId::Long | IntTypeId::LLong
        )
    }

    pub fn bit_width(self) -> u32 {
        match self {
            IntTypeId::Bool => 1,
            IntTypeId::SChar | IntTypeId::UChar => 8,
            IntTypeId::Short | IntTypeId::UShort => 16,
            IntTypeId::Int | IntTypeId::Uint => 32,
            IntTypeId::Long | IntTypeId::Ulong => 64,
            IntTypeId::LLong | IntTypeId::ULLong => 64,
        }
    }

    pub fn min_i128(self) -> i128 {
        if self.is_signed() {
            -(1i128 << (self.bit_width() - 1))
        } else {
            0
        }
    }

    pub fn max_i128(self) -> i128 {
        if self.is_signed() {
            (1i128 << (self.bit_width() - 1)) - 1
        } else {
            (1i128 << self.bit_width()) - 1
        }
    }

    /// Integral promotion: anything below `int` rank becomes `int`.
    pub fn promoted(self) -> IntTypeId {
        if self >= IntTypeId::Int {
            self
        } else {
            IntTypeId::Int
        }
    }

    /// The unsigned type of the same width; identity for unsigned tags.
    pub fn unsigned_counterpart(self) -> IntTypeId {
        match self {
            IntTypeId::SChar => IntTypeId::UChar,
            IntTypeId::Short => IntTypeId::UShort,
            IntTypeId::Int => IntTypeId::Uint,
            IntTypeId::Long => IntTypeId::Ulong,
            IntTypeId::LLong => IntTypeId::ULLong,
            other => other,
        }
    }

    /// Whether this signed type can represent every value of an unsigned one.
    pub fn can_represent_all_of(self, unsigned: IntTypeId) -> bool {
        debug_assert!(self.is_signed() && !unsigned.is_signed());
        self.bit_width() > unsigned.bit_width()
    }

    pub fn literal_suffix(self) -> &'static str {
        match self {
            IntTypeId::Uint => "U",
            IntTypeId::Long => "L",
            IntTypeId::Ulong => "UL",
            IntTypeId::LLong => "LL",
            IntTypeId::ULLong => "ULL",
            _ => "",
        }
    }

    /// Spelling of the type in the given output dialect.
    pub fn name(self, std: StdKind) -> &'static str {
        match std {
            StdKind::Cxx | StdKind::Sycl => match self {
                IntTypeId::Bool => "bool",
                IntTypeId::SChar => "signed char",
                IntTypeId::UChar => "unsigned char",
                IntTypeId::Short => "short",
                IntTypeId::UShort => "unsigned short",
                IntTypeId::Int => "int",
                IntTypeId::Uint => "unsigned int",
                IntTypeId::Long => "long long int",
                IntTypeId::Ulong => "unsigned long long int",
                IntTypeId::LLong => "long long int",
                IntTypeId::ULLong => "unsigned long long int",
            },
            StdKind::Ispc => match self {
                IntTypeId::Bool => "bool",
                IntTypeId::SChar => "int8",
                IntTypeId::UChar => "unsigned int8",
                IntTypeId::Short => "int16",
                IntTypeId::UShort => "unsigned int16",
                IntTypeId::Int => "int",
                IntTypeId::Uint => "unsigned int",
                IntTypeId::Long => "int64",
                IntTypeId::Ulong => "unsigned int64",
                IntTypeId::LLong => "int64",
                IntTypeId::ULLong => "unsigned int64",
            },
        }
    }
}

impl fmt::Display for IntTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name(StdKind::Cxx))
    }
}

/// Element type plus a non-empty list of dimension extents.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArrayType {
    pub elem: IntTypeId,
    pub dims: Vec<u64>,
}

/// Handle of an interned array type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArrayTypeId(pub u32);

/// Either an integral type or an interned array type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeRef {
    Int(IntTypeId),
    Array(ArrayTypeId),
}

/// Interning store for array types. One canonical id per (element, dims).
#[derive(Debug, Default)]
pub struct TypeStore {
    arrays: Vec<ArrayType>,
    interned: HashMap<ArrayType, ArrayTypeId>,
}

impl TypeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn array_type(&mut self, elem: IntTypeId, dims: Vec<u64>) -> ArrayTypeId {
        assert!(
            !dims.is_empty() && dims.iter().all(|&d| d > 0),
            "array types need at least one positive extent"
        );
        let key = ArrayType { elem, dims };
        if let Some(&id) = self.interned.get(&key) {
            return id;
        }
        let id = ArrayTypeId(self.arrays.len() as u32);
        self.arrays.push(key.clone());
        self.interned.insert(key, id);
        id
    }

    pub fn array(&self, id: ArrayTypeId) -> &ArrayType {
        &self.arrays[id.0 as usize]
    }
}
