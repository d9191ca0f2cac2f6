//! Expression IR.
//!
//! Nodes live in a pool owned by `Ir` and reference each other by `ExprId`,
//! so the rebuilder can splice casts and repair nodes in place. Use
//! expressions are interned per data object: requesting a use for the same
//! `DataId` twice returns the same node, which makes expression trees DAGs
//! and makes assignments through one use visible through every other.
//!
//! Three passes operate on the pool: `propagate_type` (this file) inserts the
//! implicit conversions the dialect demands, `evaluate` (expr/eval.rs)
//! computes concrete values, and `rebuild` (expr/rebuild.rs) repairs nodes
//! whose evaluation flagged UB.

use std::collections::HashMap;

use crate::data::{DataId, DataObj, Value};
use crate::error::GenError;
use crate::ir_value::IrValue;
use crate::types::{ArrayTypeId, IntTypeId, TypeRef, TypeStore};

mod eval;
mod rebuild;
#[cfg(test)]
mod tests;

/// Handle of an expression node in the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExprId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Negate,
    LogNot,
    BitNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
    LogAnd,
    LogOr,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

impl BinOp {
    pub fn is_shift(self) -> bool {
        matches!(self, BinOp::Shl | BinOp::Shr)
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinOp::LogAnd | BinOp::LogOr)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExprKind {
    Constant(IrValue),
    ScalarUse(DataId),
    ArrayUse(DataId),
    IterUse(DataId),
    Cast {
        arg: ExprId,
        to: TypeRef,
        implicit: bool,
    },
    Unary {
        op: UnaryOp,
        arg: ExprId,
    },
    Binary {
        op: BinOp,
        lhs: ExprId,
        rhs: ExprId,
    },
    Subscript {
        array: ExprId,
        idx: ExprId,
        /// Which dimension this subscript selects into; set during evaluation.
        active_dim: u32,
        /// Extent of that dimension; set during evaluation.
        active_size: u64,
        /// Integral type of the index; set during evaluation.
        idx_ty: IntTypeId,
    },
    Assign {
        to: ExprId,
        from: ExprId,
        /// Whether the assignment is live for value propagation.
        taken: bool,
    },
}

#[derive(Debug, Clone)]
pub struct ExprNode {
    pub kind: ExprKind,
    /// Result of the most recent evaluation.
    pub value: Option<Value>,
    /// Lifetime repair count; drives the rebuilder's escalation.
    pub repairs: u32,
}

/// Pool of expression nodes, data objects, and interned types.
#[derive(Debug, Default)]
pub struct Ir {
    pub types: TypeStore,
    data: Vec<DataObj>,
    exprs: Vec<ExprNode>,
    scalar_uses: HashMap<DataId, ExprId>,
    array_uses: HashMap<DataId, ExprId>,
    iter_uses: HashMap<DataId, ExprId>,
    repairs: u64,
}

impl Ir {
    pub fn new() -> Self {
        Self::default()
    }

    // Data objects.

    pub fn new_scalar(&mut self, name: impl Into<String>, ty: IntTypeId, cur: IrValue) -> DataId {
        self.push_data(DataObj::Scalar { name: name.into(), ty, cur })
    }

    pub fn new_array(&mut self, name: impl Into<String>, ty: ArrayTypeId, cur: IrValue) -> DataId {
        self.push_data(DataObj::Array { name: name.into(), ty, cur })
    }

    pub fn new_iter(
        &mut self,
        name: impl Into<String>,
        ty: IntTypeId,
        start: ExprId,
        end: ExprId,
        step: ExprId,
    ) -> DataId {
        self.push_data(DataObj::Iter { name: name.into(), ty, start, end, step })
    }

    fn push_data(&mut self, obj: DataObj) -> DataId {
        let id = DataId(self.data.len() as u32);
        self.data.push(obj);
        id
    }

    pub fn data(&self, id: DataId) -> &DataObj {
        &self.data[id.0 as usize]
    }

    pub fn data_mut(&mut self, id: DataId) -> &mut DataObj {
        &mut self.data[id.0 as usize]
    }

    /// Number of repair rewrites performed so far. The rebuild driver uses
    /// this to detect whether a full walk of the program was repair-free.
    pub fn repair_count(&self) -> u64 {
        self.repairs
    }

    /// Snapshot of every data object's state, for replaying program
    /// execution from its initial values.
    pub fn snapshot_data(&self) -> Vec<DataObj> {
        self.data.clone()
    }

    pub fn restore_data(&mut self, snapshot: Vec<DataObj>) {
        assert_eq!(snapshot.len(), self.data.len());
        self.data = snapshot;
    }

    // Expression nodes.

    fn push(&mut self, kind: ExprKind) -> ExprId {
        let id = ExprId(self.exprs.len() as u32);
        self.exprs.push(ExprNode { kind, value: None, repairs: 0 });
        id
    }

    pub fn node(&self, id: ExprId) -> &ExprNode {
        &self.exprs[id.0 as usize]
    }

    pub fn kind(&self, id: ExprId) -> ExprKind {
        self.exprs[id.0 as usize].kind
    }

    fn node_mut(&mut self, id: ExprId) -> &mut ExprNode {
        &mut self.exprs[id.0 as usize]
    }

    /// The scalar result of the most recent evaluation of `id`.
    pub(crate) fn scalar_value(&self, id: ExprId) -> Result<IrValue, GenError> {
        match self.node(id).value {
            Some(Value::Scalar(v)) => Ok(v),
            other => Err(GenError::Internal(format!(
                "expected an evaluated scalar value, found {other:?}"
            ))),
        }
    }

    pub fn constant(&mut self, val: IrValue) -> ExprId {
        self.push(ExprKind::Constant(val))
    }

    /// Interned use of a scalar variable: one node per data object.
    pub fn scalar_use(&mut self, d: DataId) -> Result<ExprId, GenError> {
        if !self.data(d).is_scalar() {
            return Err(GenError::Precondition(format!(
                "`{}` is not a scalar variable",
                self.data(d).name()
            )));
        }
        if let Some(&id) = self.scalar_uses.get(&d) {
            return Ok(id);
        }
        let id = self.push(ExprKind::ScalarUse(d));
        self.scalar_uses.insert(d, id);
        Ok(id)
    }

    /// Interned use of an array: one node per data object.
    pub fn array_use(&mut self, d: DataId) -> Result<ExprId, GenError> {
        if !self.data(d).is_array() {
            return Err(GenError::Precondition(format!(
                "`{}` is not an array",
                self.data(d).name()
            )));
        }
        if let Some(&id) = self.array_uses.get(&d) {
            return Ok(id);
        }
        let id = self.push(ExprKind::ArrayUse(d));
        self.array_uses.insert(d, id);
        Ok(id)
    }

    /// Interned use of an iterator: one node per data object.
    pub fn iter_use(&mut self, d: DataId) -> Result<ExprId, GenError> {
        if !self.data(d).is_iter() {
            return Err(GenError::Precondition(format!(
                "`{}` is not an iterator",
                self.data(d).name()
            )));
        }
        if let Some(&id) = self.iter_uses.get(&d) {
            return Ok(id);
        }
        let id = self.push(ExprKind::IterUse(d));
        self.iter_uses.insert(d, id);
        Ok(id)
    }

    /// Casts are only permitted integer-to-integer or array-to-array.
    pub fn cast(&mut self, arg: ExprId, to: TypeRef, implicit: bool) -> Result<ExprId, GenError> {
        let from = self.expr_type(arg)?;
        let compatible = matches!(
            (from, to),
            (TypeRef::Int(_), TypeRef::Int(_)) | (TypeRef::Array(_), TypeRef::Array(_))
        );
        if !compatible {
            return Err(GenError::Precondition(
                "cannot cast between array and integer".into(),
            ));
        }
        Ok(self.push(ExprKind::Cast { arg, to, implicit }))
    }

    pub fn unary(&mut self, op: UnaryOp, arg: ExprId) -> Result<ExprId, GenError> {
        self.int_type_of(arg)?;
        Ok(self.push(ExprKind::Unary { op, arg }))
    }

    pub fn binary(&mut self, op: BinOp, lhs: ExprId, rhs: ExprId) -> Result<ExprId, GenError> {
        self.int_type_of(lhs)?;
        self.int_type_of(rhs)?;
        Ok(self.push(ExprKind::Binary { op, lhs, rhs }))
    }

    pub fn subscript(&mut self, array: ExprId, idx: ExprId) -> Result<ExprId, GenError> {
        let aty = match self.expr_type(array)? {
            TypeRef::Array(aty) => aty,
            TypeRef::Int(_) => {
                return Err(GenError::Precondition("subscript base is not an array".into()))
            }
        };
        let idx_ty = self.int_type_of(idx)?;
        let depth = match self.kind(array) {
            ExprKind::ArrayUse(_) => 0,
            ExprKind::Subscript { .. } => self.subscript_depth(array)? + 1,
            _ => {
                return Err(GenError::Precondition(
                    "subscript base must be an array use or another subscript".into(),
                ))
            }
        };
        if depth as usize >= self.types.array(aty).dims.len() {
            return Err(GenError::Precondition(
                "subscript chain is deeper than the array".into(),
            ));
        }
        Ok(self.push(ExprKind::Subscript {
            array,
            idx,
            active_dim: depth,
            active_size: 0,
            idx_ty,
        }))
    }

    pub fn assign(&mut self, to: ExprId, from: ExprId, taken: bool) -> Result<ExprId, GenError> {
        match self.kind(to) {
            ExprKind::ScalarUse(_)
            | ExprKind::ArrayUse(_)
            | ExprKind::IterUse(_)
            | ExprKind::Subscript { .. } => {}
            _ => {
                return Err(GenError::Precondition(
                    "assignment destination must be a use expression or subscript".into(),
                ))
            }
        }
        Ok(self.push(ExprKind::Assign { to, from, taken }))
    }

    /// How many subscripts sit below this subscript node (0 for a direct
    /// array use base).
    fn subscript_depth(&self, id: ExprId) -> Result<u32, GenError> {
        match self.kind(id) {
            ExprKind::Subscript { array, .. } => match self.kind(array) {
                ExprKind::ArrayUse(_) => Ok(0),
                ExprKind::Subscript { .. } => Ok(self.subscript_depth(array)? + 1),
                _ => Err(GenError::Precondition(
                    "subscript base must be an array use or another subscript".into(),
                )),
            },
            _ => Err(GenError::Internal("subscript_depth on a non-subscript".into())),
        }
    }

    /// Static result type of a node. For binary operators this is the left
    /// operand's type, which after propagation equals the converted type.
    pub fn expr_type(&self, id: ExprId) -> Result<TypeRef, GenError> {
        match self.kind(id) {
            ExprKind::Constant(v) => Ok(TypeRef::Int(v.type_id())),
            ExprKind::ScalarUse(d) => match self.data(d) {
                DataObj::Scalar { ty, .. } => Ok(TypeRef::Int(*ty)),
                _ => Err(GenError::Internal("scalar use of non-scalar data".into())),
            },
            ExprKind::ArrayUse(d) => match self.data(d) {
                DataObj::Array { ty, .. } => Ok(TypeRef::Array(*ty)),
                _ => Err(GenError::Internal("array use of non-array data".into())),
            },
            ExprKind::IterUse(d) => match self.data(d) {
                DataObj::Iter { ty, .. } => Ok(TypeRef::Int(*ty)),
                _ => Err(GenError::Internal("iterator use of non-iterator data".into())),
            },
            ExprKind::Cast { to, .. } => Ok(to),
            ExprKind::Unary { arg, .. } => self.expr_type(arg),
            ExprKind::Binary { lhs, .. } => self.expr_type(lhs),
            ExprKind::Subscript { array, .. } => {
                let aty = match self.expr_type(array)? {
                    TypeRef::Array(aty) => aty,
                    TypeRef::Int(_) => {
                        return Err(GenError::Precondition("subscript base is not an array".into()))
                    }
                };
                let dims = self.types.array(aty).dims.len() as u32;
                if self.subscript_depth(id)? + 1 == dims {
                    Ok(TypeRef::Int(self.types.array(aty).elem))
                } else {
                    Ok(TypeRef::Array(aty))
                }
            }
            ExprKind::Assign { to, .. } => self.expr_type(to),
        }
    }

    fn int_type_of(&self, id: ExprId) -> Result<IntTypeId, GenError> {
        match self.expr_type(id)? {
            TypeRef::Int(ty) => Ok(ty),
            TypeRef::Array(_) => Err(GenError::Precondition(
                "operation needs a scalar operand, found an array".into(),
            )),
        }
    }

    // Type propagation.

    /// Inserts the implicit casts the dialect's promotion and conversion
    /// rules demand, post-order. Idempotent: a tree that already satisfies
    /// the rules is left unchanged.
    pub fn propagate_type(&mut self, id: ExprId) -> Result<(), GenError> {
        match self.kind(id) {
            ExprKind::Constant(_)
            | ExprKind::ScalarUse(_)
            | ExprKind::ArrayUse(_)
            | ExprKind::IterUse(_) => Ok(()),
            ExprKind::Cast { arg, .. } => self.propagate_type(arg),
            ExprKind::Unary { op, arg } => {
                self.propagate_type(arg)?;
                let new_arg = match op {
                    UnaryOp::Plus | UnaryOp::Negate | UnaryOp::BitNot => self.promote(arg)?,
                    UnaryOp::LogNot => self.conv_to_bool(arg)?,
                };
                match &mut self.node_mut(id).kind {
                    ExprKind::Unary { arg, .. } => *arg = new_arg,
                    _ => unreachable!(),
                }
                Ok(())
            }
            ExprKind::Binary { op, lhs, rhs } => {
                self.propagate_type(lhs)?;
                self.propagate_type(rhs)?;
                let (new_lhs, new_rhs) = if op.is_logical() {
                    (self.conv_to_bool(lhs)?, self.conv_to_bool(rhs)?)
                } else if op.is_shift() {
                    // Shift operands promote independently; no conversion.
                    (self.promote(lhs)?, self.promote(rhs)?)
                } else {
                    let l = self.promote(lhs)?;
                    let r = self.promote(rhs)?;
                    self.arith_conv(l, r)?
                };
                match &mut self.node_mut(id).kind {
                    ExprKind::Binary { lhs, rhs, .. } => {
                        *lhs = new_lhs;
                        *rhs = new_rhs;
                    }
                    _ => unreachable!(),
                }
                Ok(())
            }
            ExprKind::Subscript { array, idx, .. } => {
                self.propagate_type(array)?;
                self.propagate_type(idx)
            }
            // The destination cast is deferred to evaluation: for subscripted
            // destinations the type is only known once the destination has
            // been evaluated.
            ExprKind::Assign { to, from, .. } => {
                self.propagate_type(to)?;
                self.propagate_type(from)
            }
        }
    }

    /// Integral promotion: wrap in an implicit cast to `int` when the type
    /// ranks below it.
    fn promote(&mut self, id: ExprId) -> Result<ExprId, GenError> {
        let ty = self.int_type_of(id)?;
        if ty >= IntTypeId::Int {
            Ok(id)
        } else {
            self.cast(id, TypeRef::Int(IntTypeId::Int), true)
        }
    }

    fn conv_to_bool(&mut self, id: ExprId) -> Result<ExprId, GenError> {
        let ty = self.int_type_of(id)?;
        if ty == IntTypeId::Bool {
            Ok(id)
        } else {
            self.cast(id, TypeRef::Int(IntTypeId::Bool), true)
        }
    }

    /// Usual arithmetic conversions over two already-promoted operands.
    /// Ties resolve in operand order: the left-hand side is tried first.
    fn arith_conv(&mut self, lhs: ExprId, rhs: ExprId) -> Result<(ExprId, ExprId), GenError> {
        let a = self.int_type_of(lhs)?;
        let b = self.int_type_of(rhs)?;

        // Same type: nothing to do.
        if a == b {
            return Ok((lhs, rhs));
        }

        // Same signedness: widen the lower-ranked operand.
        if a.is_signed() == b.is_signed() {
            return if a > b {
                let r = self.cast(rhs, TypeRef::Int(a), true)?;
                Ok((lhs, r))
            } else {
                let l = self.cast(lhs, TypeRef::Int(b), true)?;
                Ok((l, rhs))
            };
        }

        // An unsigned operand of at least the signed operand's rank absorbs it.
        if !a.is_signed() && a > b {
            let r = self.cast(rhs, TypeRef::Int(a), true)?;
            return Ok((lhs, r));
        }
        if !b.is_signed() && b > a {
            let l = self.cast(lhs, TypeRef::Int(b), true)?;
            return Ok((l, rhs));
        }

        // A signed operand wide enough for every unsigned value absorbs it.
        if a.is_signed() && a.can_represent_all_of(b) {
            let r = self.cast(rhs, TypeRef::Int(a), true)?;
            return Ok((lhs, r));
        }
        if b.is_signed() && b.can_represent_all_of(a) {
            let l = self.cast(lhs, TypeRef::Int(b), true)?;
            return Ok((l, rhs));
        }

        // Both become the unsigned counterpart of the signed operand's type.
        let target = if a.is_signed() {
            a.unsigned_counterpart()
        } else {
            b.unsigned_counterpart()
        };
        let l = self.cast(lhs, TypeRef::Int(target), true)?;
        let r = self.cast(rhs, TypeRef::Int(target), true)?;
        Ok((l, r))
    }
}
