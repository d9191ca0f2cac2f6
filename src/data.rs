//! Data objects an expression can refer to, and evaluation result values.
//!
//! Data objects live in the IR pool and are referenced by `DataId`; the same
//! object seen through two use expressions is literally the same pool slot,
//! so an assignment through one use is visible through every other.
//!
//! Arrays carry a single representative element value: the generator is
//! dimension-oblivious about individual slots, and a representative is enough
//! to drive the rebuilder.

use std::fmt;

use crate::expr::ExprId;
use crate::ir_value::{IrValue, UbKind};
use crate::types::{ArrayTypeId, IntTypeId};

/// Handle of a data object in the IR pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DataId(pub u32);

impl fmt::Display for DataId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "d{}", self.0)
    }
}

/// A named scalar variable, array, or loop iterator.
#[derive(Debug, Clone)]
pub enum DataObj {
    Scalar {
        name: String,
        ty: IntTypeId,
        cur: IrValue,
    },
    Array {
        name: String,
        ty: ArrayTypeId,
        /// Representative value for every element.
        cur: IrValue,
    },
    Iter {
        name: String,
        ty: IntTypeId,
        start: ExprId,
        end: ExprId,
        step: ExprId,
    },
}

impl DataObj {
    pub fn name(&self) -> &str {
        match self {
            DataObj::Scalar { name, .. } | DataObj::Array { name, .. } | DataObj::Iter { name, .. } => name,
        }
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self, DataObj::Scalar { .. })
    }

    pub fn is_array(&self) -> bool {
        matches!(self, DataObj::Array { .. })
    }

    pub fn is_iter(&self) -> bool {
        matches!(self, DataObj::Iter { .. })
    }
}

/// Result of evaluating an expression node.
///
/// `Iter` is the value of an iterator use that has no pinned value in the
/// evaluation context; it is meaningful only as a subscript index, where the
/// bounds check falls back to the iterator's start/end range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Value {
    Scalar(IrValue),
    Array { ty: ArrayTypeId, elem: IrValue },
    Iter(DataId),
}

impl Value {
    pub fn as_scalar(self) -> Option<IrValue> {
        match self {
            Value::Scalar(v) => Some(v),
            _ => None,
        }
    }

    pub fn has_ub(self) -> bool {
        self.ub_code().is_some()
    }

    pub fn ub_code(self) -> Option<UbKind> {
        match self {
            Value::Scalar(v) => v.ub_code(),
            Value::Array { elem, .. } => elem.ub_code(),
            Value::Iter(_) => None,
        }
    }

    pub fn set_ub_code(&mut self, ub: Option<UbKind>) {
        match self {
            Value::Scalar(v) => v.set_ub_code(ub),
            Value::Array { elem, .. } => elem.set_ub_code(ub),
            Value::Iter(_) => {}
        }
    }
}
