//! Forward evaluation of expression nodes.
//!
//! Evaluation is pure with respect to the context: the only mutation it
//! performs is the write-back of taken assignments into the underlying data
//! objects (and the bookkeeping fields of subscript nodes). UB never aborts
//! evaluation; it is recorded on the result value for the rebuilder.

use crate::data::{DataObj, Value};
use crate::error::GenError;
use crate::eval::EvalCtx;
use crate::ir_value::UbKind;
use crate::types::{IntTypeId, TypeRef};

use super::{BinOp, ExprId, ExprKind, Ir, UnaryOp};

impl Ir {
    /// Computes the node's value at the point described by `ctx` and stores
    /// it on the node.
    pub fn evaluate(&mut self, id: ExprId, ctx: &EvalCtx) -> Result<Value, GenError> {
        let val = match self.kind(id) {
            ExprKind::Constant(v) => Value::Scalar(v),
            ExprKind::ScalarUse(d) => match self.data(d) {
                DataObj::Scalar { name, cur, .. } => match ctx.lookup(name) {
                    Some(v) => Value::Scalar(v),
                    None => Value::Scalar(*cur),
                },
                _ => return Err(GenError::Internal("scalar use of non-scalar data".into())),
            },
            ExprKind::ArrayUse(d) => match self.data(d) {
                DataObj::Array { ty, cur, .. } => Value::Array { ty: *ty, elem: *cur },
                _ => return Err(GenError::Internal("array use of non-array data".into())),
            },
            ExprKind::IterUse(d) => match self.data(d) {
                DataObj::Iter { name, .. } => match ctx.lookup(name) {
                    Some(v) => Value::Scalar(v),
                    None => Value::Iter(d),
                },
                _ => return Err(GenError::Internal("iterator use of non-iterator data".into())),
            },
            ExprKind::Cast { arg, to, .. } => {
                let v = self.evaluate(arg, ctx)?;
                match (v, to) {
                    (Value::Scalar(s), TypeRef::Int(t)) => Value::Scalar(s.cast_to(t)),
                    (Value::Array { elem, .. }, TypeRef::Array(t)) => Value::Array {
                        ty: t,
                        elem: elem.cast_to(self.types.array(t).elem),
                    },
                    (Value::Iter(d), _) => {
                        return Err(GenError::UnpinnedIterator(self.data(d).name().to_string()))
                    }
                    _ => {
                        return Err(GenError::Precondition(
                            "cannot cast between array and integer".into(),
                        ))
                    }
                }
            }
            ExprKind::Unary { op, arg } => {
                let v = self.eval_scalar_operand(arg, ctx)?;
                Value::Scalar(match op {
                    UnaryOp::Plus => v.plus(),
                    UnaryOp::Negate => v.negate(),
                    UnaryOp::LogNot => v.log_not(),
                    UnaryOp::BitNot => v.bit_not(),
                })
            }
            ExprKind::Binary { op, lhs, rhs } => {
                let l = self.eval_scalar_operand(lhs, ctx)?;
                let r = self.eval_scalar_operand(rhs, ctx)?;
                Value::Scalar(match op {
                    BinOp::Add => l.add(r),
                    BinOp::Sub => l.sub(r),
                    BinOp::Mul => l.mul(r),
                    BinOp::Div => l.div(r),
                    BinOp::Mod => l.rem(r),
                    BinOp::Lt => l.cmp_lt(r),
                    BinOp::Gt => l.cmp_gt(r),
                    BinOp::Le => l.cmp_le(r),
                    BinOp::Ge => l.cmp_ge(r),
                    BinOp::Eq => l.cmp_eq(r),
                    BinOp::Ne => l.cmp_ne(r),
                    BinOp::LogAnd => l.log_and(r),
                    BinOp::LogOr => l.log_or(r),
                    BinOp::BitAnd => l.bit_and(r),
                    BinOp::BitOr => l.bit_or(r),
                    BinOp::BitXor => l.bit_xor(r),
                    BinOp::Shl => l.shl(r),
                    BinOp::Shr => l.shr(r),
                })
            }
            ExprKind::Subscript { array, idx, .. } => self.eval_subscript(id, array, idx, ctx)?,
            ExprKind::Assign { to, from, taken } => self.eval_assign(id, to, from, taken, ctx)?,
        };
        self.node_mut(id).value = Some(val);
        Ok(val)
    }

    fn eval_scalar_operand(
        &mut self,
        id: ExprId,
        ctx: &EvalCtx,
    ) -> Result<crate::ir_value::IrValue, GenError> {
        match self.evaluate(id, ctx)? {
            Value::Scalar(v) => Ok(v),
            Value::Iter(d) => Err(GenError::UnpinnedIterator(self.data(d).name().to_string())),
            Value::Array { .. } => Err(GenError::Precondition(
                "arithmetic needs scalar operands, found an array".into(),
            )),
        }
    }

    fn eval_subscript(
        &mut self,
        id: ExprId,
        array: ExprId,
        idx: ExprId,
        ctx: &EvalCtx,
    ) -> Result<Value, GenError> {
        let av = self.evaluate(array, ctx)?;
        let (aty, elem) = match av {
            Value::Array { ty, elem } => (ty, elem),
            _ => return Err(GenError::Precondition("subscript base is not an array".into())),
        };
        let active_dim = match self.kind(array) {
            ExprKind::ArrayUse(_) => 0,
            ExprKind::Subscript { active_dim, .. } => active_dim + 1,
            _ => {
                return Err(GenError::Precondition(
                    "subscript base must be an array use or another subscript".into(),
                ))
            }
        };
        let dims = self.types.array(aty).dims.clone();
        let active_size = dims[active_dim as usize];

        let iv = self.evaluate(idx, ctx)?;
        let (in_bounds, idx_ty) = self.index_in_bounds(active_size, iv, ctx)?;

        let mut val = if active_dim as usize == dims.len() - 1 {
            Value::Scalar(elem)
        } else {
            Value::Array { ty: aty, elem }
        };
        if !in_bounds {
            val.set_ub_code(Some(UbKind::OutOfBounds));
        }

        match &mut self.node_mut(id).kind {
            ExprKind::Subscript { active_dim: d, active_size: s, idx_ty: t, .. } => {
                *d = active_dim;
                *s = active_size;
                *t = idx_ty;
            }
            _ => unreachable!(),
        }
        Ok(val)
    }

    /// Whether the index's reachable values all land in `[0, size)`.
    ///
    /// A concrete scalar is checked directly. A bare, unpinned iterator is
    /// checked by its start/end range: the step is positive and the end bound
    /// is exclusive, so the endpoints dominate. Everything else shows up here
    /// as a concrete scalar anyway because the sweep evaluates pointwise.
    fn index_in_bounds(
        &mut self,
        size: u64,
        idx_val: Value,
        ctx: &EvalCtx,
    ) -> Result<(bool, IntTypeId), GenError> {
        match idx_val {
            Value::Scalar(v) => {
                let wide = if v.type_id().is_signed() {
                    v.as_i64() as i128
                } else {
                    v.as_u64() as i128
                };
                Ok((wide >= 0 && wide < size as i128, v.type_id()))
            }
            Value::Iter(d) => {
                let (ty, start, end) = match self.data(d) {
                    DataObj::Iter { ty, start, end, .. } => (*ty, *start, *end),
                    _ => return Err(GenError::Internal("iterator use of non-iterator data".into())),
                };
                let start_val = self.eval_scalar_operand(start, ctx)?;
                let end_val = self.eval_scalar_operand(end, ctx)?;
                let s = start_val.as_i64() as i128;
                let e = end_val.as_i64() as i128;
                Ok((s >= 0 && s < size as i128 && e >= 0 && e <= size as i128, ty))
            }
            Value::Array { .. } => Err(GenError::Precondition(
                "subscript index must be a scalar or an iterator".into(),
            )),
        }
    }

    fn eval_assign(
        &mut self,
        id: ExprId,
        to: ExprId,
        mut from: ExprId,
        taken: bool,
        ctx: &EvalCtx,
    ) -> Result<Value, GenError> {
        let tv = self.evaluate(to, ctx)?;
        let dest_ty = match tv {
            Value::Scalar(v) => TypeRef::Int(v.type_id()),
            Value::Array { ty, .. } => TypeRef::Array(ty),
            Value::Iter(d) => {
                return Err(GenError::UnpinnedIterator(self.data(d).name().to_string()))
            }
        };

        // The destination type is only known now, so the implicit cast of the
        // source is inserted here rather than during type propagation. It is
        // inserted at most once: after that the types already match.
        if self.expr_type(from)? != dest_ty {
            let cast = self.cast(from, dest_ty, true)?;
            match &mut self.node_mut(id).kind {
                ExprKind::Assign { from: slot, .. } => *slot = cast,
                _ => unreachable!(),
            }
            from = cast;
        }

        let fv = self.evaluate(from, ctx)?;
        match (tv, fv) {
            (Value::Scalar(_), Value::Scalar(_)) | (Value::Array { .. }, Value::Array { .. }) => {}
            _ => {
                return Err(GenError::Precondition(
                    "cannot assign incompatible data kinds".into(),
                ))
            }
        }

        if taken {
            self.store_through(to, fv)?;
        }
        Ok(fv)
    }

    /// Writes a value back through a use expression into the underlying data
    /// object, where every other use of the same object observes it.
    fn store_through(&mut self, to: ExprId, val: Value) -> Result<(), GenError> {
        let target = match self.kind(to) {
            ExprKind::ScalarUse(d) | ExprKind::ArrayUse(d) => d,
            ExprKind::Subscript { .. } => self.subscript_base_data(to)?,
            ExprKind::IterUse(_) => {
                return Err(GenError::Precondition(
                    "cannot assign through an iterator use".into(),
                ))
            }
            _ => {
                return Err(GenError::Internal(
                    "assignment destination is not a use expression".into(),
                ))
            }
        };
        match (self.data_mut(target), val) {
            (DataObj::Scalar { cur, .. }, Value::Scalar(v)) => *cur = v,
            (DataObj::Array { cur, .. }, Value::Scalar(v)) => *cur = v,
            (DataObj::Array { cur, .. }, Value::Array { elem, .. }) => *cur = elem,
            _ => {
                return Err(GenError::Precondition(
                    "cannot assign incompatible data kinds".into(),
                ))
            }
        }
        Ok(())
    }

    /// The array data object at the bottom of a subscript chain.
    fn subscript_base_data(&self, id: ExprId) -> Result<crate::data::DataId, GenError> {
        match self.kind(id) {
            ExprKind::Subscript { array, .. } => match self.kind(array) {
                ExprKind::ArrayUse(d) => Ok(d),
                ExprKind::Subscript { .. } => self.subscript_base_data(array),
                _ => Err(GenError::Precondition(
                    "subscript base must be an array use or another subscript".into(),
                )),
            },
            _ => Err(GenError::Internal("subscript_base_data on a non-subscript".into())),
        }
    }
}
