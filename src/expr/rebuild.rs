//! UB-driven in-place repair.
//!
//! `rebuild` runs bottom-up: children are rebuilt before the parent, so a
//! parent repair only ever sees UB produced by its own operation. Repairs
//! preserve the shape of the program: operators are swapped and operands are
//! adjusted with constants, never deleted.
//!
//! Operator swaps alone do not always settle: an accumulator that overflows
//! upward as an addition can overflow downward once it becomes a
//! subtraction, and the driver replays the whole program after every repair.
//! Each node therefore carries a repair counter, and a node that keeps
//! getting repaired escalates to range-limiting rewrites (a modulus on the
//! operand, or a mask for shift operands) that are stable at every point of
//! the iteration space.

use log::trace;

use crate::data::Value;
use crate::error::GenError;
use crate::eval::EvalCtx;
use crate::ir_value::{msb_index, IrValue, UbKind};
use crate::rng::RandGen;

use super::{BinOp, ExprId, ExprKind, Ir, UnaryOp};

/// Repair rounds on one node within a single evaluation point before
/// generation gives up.
const MAX_REBUILD_ROUNDS: u32 = 64;

/// Lifetime repairs of one node after which its operand gets range-limited.
const LIMIT_BUDGET: u32 = 4;

/// Lifetime repairs of one node after which the operator is pinned to the
/// additive pair, which a range-limited operand cannot push out of range in
/// both directions.
const PIN_BUDGET: u32 = 8;

/// Modulus applied to a runaway operand; small against every operand type's
/// range, so drift per loop iteration stays far from the type bounds.
const LIMIT_WRAP: u64 = 1 << 16;

impl Ir {
    /// Re-evaluates the subtree and repairs nodes until the result carries no
    /// UB flag at the point described by `ctx`.
    pub fn rebuild(&mut self, id: ExprId, ctx: &EvalCtx, rng: &mut RandGen) -> Result<Value, GenError> {
        match self.kind(id) {
            ExprKind::Constant(_)
            | ExprKind::ScalarUse(_)
            | ExprKind::ArrayUse(_)
            | ExprKind::IterUse(_) => {}
            ExprKind::Cast { arg, .. } | ExprKind::Unary { arg, .. } => {
                self.rebuild(arg, ctx, rng)?;
            }
            ExprKind::Binary { lhs, rhs, .. } => {
                self.rebuild(lhs, ctx, rng)?;
                self.rebuild(rhs, ctx, rng)?;
            }
            ExprKind::Subscript { array, idx, .. } => {
                self.rebuild(array, ctx, rng)?;
                self.rebuild(idx, ctx, rng)?;
            }
            ExprKind::Assign { to, from, .. } => {
                self.rebuild(to, ctx, rng)?;
                self.rebuild(from, ctx, rng)?;
            }
        }

        let mut val = self.evaluate(id, ctx)?;
        let mut rounds = 0;
        while let Some(ub) = val.ub_code() {
            if rounds == MAX_REBUILD_ROUNDS {
                return Err(GenError::RebuildDivergence { context: kind_name(&self.kind(id)), rounds });
            }
            trace!("repair round {rounds}: {ub:?} in {}", kind_name(&self.kind(id)));
            self.repair(id, ub, rng)?;
            val = self.evaluate(id, ctx)?;
            rounds += 1;
        }
        Ok(val)
    }

    fn repair(&mut self, id: ExprId, ub: UbKind, rng: &mut RandGen) -> Result<(), GenError> {
        self.repairs += 1;
        let rounds = {
            let node = self.node_mut(id);
            node.repairs += 1;
            node.repairs
        };
        match self.kind(id) {
            ExprKind::Unary { op: UnaryOp::Negate, arg } if ub == UbKind::SignOvf => {
                // Unary plus is the only sign-safe stand-in for negation.
                self.node_mut(id).kind = ExprKind::Unary { op: UnaryOp::Plus, arg };
                Ok(())
            }
            ExprKind::Binary { op, lhs, rhs } => self.repair_binary(id, op, lhs, rhs, ub, rounds, rng),
            ExprKind::Subscript { idx, active_size, idx_ty, .. } => {
                if ub != UbKind::OutOfBounds {
                    return Err(GenError::Internal(format!("no subscript repair for {ub:?}")));
                }
                let size = self.constant(IrValue::from_u64(idx_ty, active_size));
                let new_idx = self.binary(BinOp::Mod, idx, size)?;
                self.propagate_type(new_idx)?;
                match &mut self.node_mut(id).kind {
                    ExprKind::Subscript { idx, .. } => *idx = new_idx,
                    _ => unreachable!(),
                }
                Ok(())
            }
            other => Err(GenError::Internal(format!(
                "no repair rule for {} with {ub:?}",
                kind_name(&other)
            ))),
        }
    }

    fn repair_binary(
        &mut self,
        id: ExprId,
        op: BinOp,
        lhs: ExprId,
        rhs: ExprId,
        ub: UbKind,
        rounds: u32,
        rng: &mut RandGen,
    ) -> Result<(), GenError> {
        match op {
            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod => {
                let mut new_op = match op {
                    BinOp::Add => BinOp::Sub,
                    BinOp::Sub => BinOp::Add,
                    BinOp::Mul => {
                        if ub == UbKind::SignOvfMin {
                            BinOp::Sub
                        } else {
                            BinOp::Div
                        }
                    }
                    _ => {
                        if ub == UbKind::ZeroDiv {
                            BinOp::Mul
                        } else {
                            BinOp::Sub
                        }
                    }
                };
                if rounds >= PIN_BUDGET {
                    new_op = if op == BinOp::Sub { BinOp::Add } else { BinOp::Sub };
                }
                if rounds == LIMIT_BUDGET {
                    self.limit_operand(id, rhs)?;
                }
                match &mut self.node_mut(id).kind {
                    ExprKind::Binary { op, .. } => *op = new_op,
                    _ => unreachable!(),
                }
                Ok(())
            }
            BinOp::Shl | BinOp::Shr => match ub {
                UbKind::ShiftRhsLarge | UbKind::ShiftRhsNeg => {
                    if rounds >= LIMIT_BUDGET {
                        self.mask_shift_amount(id, op, lhs, rhs)
                    } else {
                        self.repair_shift_amount(id, op, lhs, rhs, ub, rng)
                    }
                }
                UbKind::NegShift => {
                    if rounds >= LIMIT_BUDGET {
                        self.mask_negative_base(id, lhs)
                    } else {
                        // A negative base moves into the non-negative range by
                        // adding its type's maximum: base + MAX lands in
                        // [-1, MAX-1] and never overflows.
                        let lhs_ty = self.int_type_of(lhs)?;
                        let max = self.constant(IrValue::max_of(lhs_ty));
                        let new_lhs = self.binary(BinOp::Add, lhs, max)?;
                        self.propagate_type(new_lhs)?;
                        match &mut self.node_mut(id).kind {
                            ExprKind::Binary { lhs, .. } => *lhs = new_lhs,
                            _ => unreachable!(),
                        }
                        Ok(())
                    }
                }
                _ => Err(GenError::Internal(format!("shift operator flagged {ub:?}"))),
            },
            _ => {
                // Relational, bitwise and logical operators cannot flag UB.
                Err(GenError::Internal(format!("operator {op:?} flagged {ub:?}")))
            }
        }
    }

    /// Draws a valid shift amount and folds it into the right operand with a
    /// wrapped constant. For a negative amount the adjustment is additive and
    /// clamped to the bit width; for a too-large amount it is subtractive.
    fn repair_shift_amount(
        &mut self,
        id: ExprId,
        op: BinOp,
        lhs: ExprId,
        rhs: ExprId,
        ub: UbKind,
        rng: &mut RandGen,
    ) -> Result<(), GenError> {
        let lhs_ty = self.int_type_of(lhs)?;
        let w = lhs_ty.bit_width() as u64;
        let mut max_valid = w;
        if op == BinOp::Shl && lhs_ty.is_signed() && ub == UbKind::ShiftRhsLarge {
            // The most significant set bit must not be shifted past the width.
            max_valid -= msb_index(self.scalar_value(lhs)?.abs_value().magnitude);
        }
        let k = rng.rand_range(0, max_valid);
        let r = self.scalar_value(rhs)?.abs_value().magnitude;
        let rhs_ty = self.int_type_of(rhs)?;

        let (adjust, combine) = if ub == UbKind::ShiftRhsNeg {
            ((k + r).min(w), BinOp::Add)
        } else {
            (r - k, BinOp::Sub)
        };
        let adjust = self.constant(IrValue::from_u64(rhs_ty, adjust));
        let new_rhs = self.binary(combine, rhs, adjust)?;
        self.propagate_type(new_rhs)?;
        match &mut self.node_mut(id).kind {
            ExprKind::Binary { rhs, .. } => *rhs = new_rhs,
            _ => unreachable!(),
        }
        Ok(())
    }

    /// Escalation: mask the amount into the valid range. A signed left shift
    /// also may not move the base's most significant set bit past the width,
    /// so the range is tightened by the same bound the randomized repair
    /// uses; the mask is the largest `2^n - 1` inside it. A later point with
    /// a higher set bit re-enters here and stacks a smaller mask on top.
    fn mask_shift_amount(
        &mut self,
        id: ExprId,
        op: BinOp,
        lhs: ExprId,
        rhs: ExprId,
    ) -> Result<(), GenError> {
        let lhs_ty = self.int_type_of(lhs)?;
        let mut max_valid = lhs_ty.bit_width() as u64;
        if op == BinOp::Shl && lhs_ty.is_signed() {
            max_valid -= msb_index(self.scalar_value(lhs)?.abs_value().magnitude);
        }
        let mask = (1u64 << (63 - (max_valid + 1).leading_zeros())) - 1;
        let rhs_ty = self.int_type_of(rhs)?;
        let mask = self.constant(IrValue::from_u64(rhs_ty, mask));
        let new_rhs = self.binary(BinOp::BitAnd, rhs, mask)?;
        self.propagate_type(new_rhs)?;
        match &mut self.node_mut(id).kind {
            ExprKind::Binary { rhs, .. } => *rhs = new_rhs,
            _ => unreachable!(),
        }
        Ok(())
    }

    /// Escalation: `base & MAX` is non-negative at every point.
    fn mask_negative_base(&mut self, id: ExprId, lhs: ExprId) -> Result<(), GenError> {
        let lhs_ty = self.int_type_of(lhs)?;
        let max = self.constant(IrValue::max_of(lhs_ty));
        let new_lhs = self.binary(BinOp::BitAnd, lhs, max)?;
        self.propagate_type(new_lhs)?;
        match &mut self.node_mut(id).kind {
            ExprKind::Binary { lhs, .. } => *lhs = new_lhs,
            _ => unreachable!(),
        }
        Ok(())
    }

    /// Escalation: wrap the right operand with a small modulus so the node's
    /// drift per evaluation stays far away from the type bounds.
    fn limit_operand(&mut self, id: ExprId, rhs: ExprId) -> Result<(), GenError> {
        let rhs_ty = self.int_type_of(rhs)?;
        let wrap = self.constant(IrValue::from_u64(rhs_ty, LIMIT_WRAP));
        let limited = self.binary(BinOp::Mod, rhs, wrap)?;
        self.propagate_type(limited)?;
        match &mut self.node_mut(id).kind {
            ExprKind::Binary { rhs, .. } => *rhs = limited,
            _ => unreachable!(),
        }
        Ok(())
    }
}

fn kind_name(kind: &ExprKind) -> &'static str {
    match kind {
        ExprKind::Constant(_) => "constant",
        ExprKind::ScalarUse(_) => "scalar use",
        ExprKind::ArrayUse(_) => "array use",
        ExprKind::IterUse(_) => "iterator use",
        ExprKind::Cast { .. } => "cast",
        ExprKind::Unary { .. } => "unary",
        ExprKind::Binary { .. } => "binary",
        ExprKind::Subscript { .. } => "subscript",
        ExprKind::Assign { .. } => "assignment",
    }
}
