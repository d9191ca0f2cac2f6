//! Fixed-width integer values with UB tracking.
//!
//! Every arithmetic operation returns a result value instead of failing:
//! operations whose C++ counterpart would be undefined produce a value whose
//! `UbKind` flag is set. The flag must keep flowing through subsequent
//! arithmetic so the rebuilder can see which node went wrong, so operands
//! with a set flag propagate it into their result unchanged.
//!
//! Values are stored as the low `bit_width` bits of a `u64` in two's
//! complement; intermediate arithmetic runs in `i128`, wide enough for every
//! supported type.

use std::fmt;

use crate::types::IntTypeId;

/// Classes of undefined behavior an operation can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UbKind {
    /// Signed overflow on add/sub/div-like operations.
    SignOvf,
    /// Signed multiplication overflow hitting the `TYPE_MIN * -1` pattern.
    SignOvfMin,
    /// Division or remainder by zero.
    ZeroDiv,
    /// Shift amount is negative.
    ShiftRhsNeg,
    /// Shift amount is at least the bit width of the promoted left operand.
    ShiftRhsLarge,
    /// Left-shifting a negative signed value.
    NegShift,
    /// Array subscript outside `[0, extent)`.
    OutOfBounds,
}

/// Sign-and-magnitude view of a value, as consumed by the shift repair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbsValue {
    pub is_negative: bool,
    pub magnitude: u64,
}

/// A concrete integral value of some `IntTypeId`, with an optional UB flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IrValue {
    ty: IntTypeId,
    bits: u64,
    ub: Option<UbKind>,
}

impl IrValue {
    pub fn zero(ty: IntTypeId) -> Self {
        Self { ty, bits: 0, ub: None }
    }

    /// Wraps the raw value into the type's width, zero-extending semantics.
    pub fn from_u64(ty: IntTypeId, raw: u64) -> Self {
        Self { ty, bits: truncate(ty, raw as u128), ub: None }
    }

    /// Wraps the raw value into the type's width, sign-extending semantics.
    pub fn from_i64(ty: IntTypeId, raw: i64) -> Self {
        Self { ty, bits: truncate(ty, raw as i128 as u128), ub: None }
    }

    pub fn min_of(ty: IntTypeId) -> Self {
        Self::make(ty, ty.min_i128())
    }

    pub fn max_of(ty: IntTypeId) -> Self {
        Self::make(ty, ty.max_i128())
    }

    fn make(ty: IntTypeId, wide: i128) -> Self {
        Self { ty, bits: truncate(ty, wide as u128), ub: None }
    }

    pub fn type_id(self) -> IntTypeId {
        self.ty
    }

    /// The value zero-extended to `u64`.
    pub fn as_u64(self) -> u64 {
        self.bits
    }

    /// The value sign-extended to `i64`.
    pub fn as_i64(self) -> i64 {
        let w = self.ty.bit_width();
        if w == 64 {
            self.bits as i64
        } else if self.ty.is_signed() && (self.bits >> (w - 1)) & 1 == 1 {
            (self.bits | !((1u64 << w) - 1)) as i64
        } else {
            self.bits as i64
        }
    }

    /// The numeric value, signedness-aware, widened to `i128`.
    pub fn as_i128(self) -> i128 {
        if self.ty.is_signed() {
            self.as_i64() as i128
        } else {
            self.bits as i128
        }
    }

    pub fn is_zero(self) -> bool {
        self.bits == 0
    }

    pub fn has_ub(self) -> bool {
        self.ub.is_some()
    }

    pub fn ub_code(self) -> Option<UbKind> {
        self.ub
    }

    pub fn set_ub_code(&mut self, ub: Option<UbKind>) {
        self.ub = ub;
    }

    fn with_ub(self, ub: UbKind) -> Self {
        Self { ub: Some(ub), ..self }
    }

    /// Result carrying an operand's pre-existing flag, if any.
    fn carried(self, rhs: IrValue) -> Option<IrValue> {
        self.ub.or(rhs.ub).map(|ub| self.with_ub(ub))
    }

    fn signed_checked(self, wide: i128, ub: UbKind) -> IrValue {
        if wide < self.ty.min_i128() || wide > self.ty.max_i128() {
            self.with_ub(ub)
        } else {
            Self::make(self.ty, wide)
        }
    }

    pub fn abs_value(self) -> AbsValue {
        let wide = self.as_i128();
        if wide < 0 {
            AbsValue { is_negative: true, magnitude: (-wide) as u64 }
        } else {
            AbsValue { is_negative: false, magnitude: self.bits }
        }
    }

    /// Bitwise conversion between integral types. Never sets a flag; an
    /// already-set flag survives the conversion.
    pub fn cast_to(self, to: IntTypeId) -> IrValue {
        let bits = if to == IntTypeId::Bool {
            (self.bits != 0) as u64
        } else if self.ty.is_signed() {
            truncate(to, self.as_i64() as i128 as u128)
        } else {
            truncate(to, self.bits as u128)
        };
        IrValue { ty: to, bits, ub: self.ub }
    }

    // Unary operations.

    pub fn plus(self) -> IrValue {
        self
    }

    pub fn negate(self) -> IrValue {
        if let Some(ub) = self.ub {
            return self.with_ub(ub);
        }
        if self.ty.is_signed() {
            if self.as_i128() == self.ty.min_i128() {
                self.with_ub(UbKind::SignOvf)
            } else {
                Self::make(self.ty, -self.as_i128())
            }
        } else {
            Self::make(self.ty, -(self.bits as i128))
        }
    }

    pub fn log_not(self) -> IrValue {
        IrValue { ty: self.ty, bits: (self.bits == 0) as u64, ub: self.ub }
    }

    pub fn bit_not(self) -> IrValue {
        IrValue { ty: self.ty, bits: truncate(self.ty, !(self.bits as u128)), ub: self.ub }
    }

    // Additive and multiplicative operations. Both operands must already
    // share a type (the usual arithmetic conversions run first).

    pub fn add(self, rhs: IrValue) -> IrValue {
        debug_assert_eq!(self.ty, rhs.ty);
        if let Some(v) = self.carried(rhs) {
            return v;
        }
        if self.ty.is_signed() {
            self.signed_checked(self.as_i128() + rhs.as_i128(), UbKind::SignOvf)
        } else {
            Self::make(self.ty, self.as_i128() + rhs.as_i128())
        }
    }

    pub fn sub(self, rhs: IrValue) -> IrValue {
        debug_assert_eq!(self.ty, rhs.ty);
        if let Some(v) = self.carried(rhs) {
            return v;
        }
        if self.ty.is_signed() {
            self.signed_checked(self.as_i128() - rhs.as_i128(), UbKind::SignOvf)
        } else {
            Self::make(self.ty, self.as_i128() - rhs.as_i128())
        }
    }

    pub fn mul(self, rhs: IrValue) -> IrValue {
        debug_assert_eq!(self.ty, rhs.ty);
        if let Some(v) = self.carried(rhs) {
            return v;
        }
        let wide = self.as_i128() * rhs.as_i128();
        if !self.ty.is_signed() {
            return Self::make(self.ty, wide);
        }
        if wide >= self.ty.min_i128() && wide <= self.ty.max_i128() {
            return Self::make(self.ty, wide);
        }
        let min = self.ty.min_i128();
        let min_pattern = (self.as_i128() == min && rhs.as_i128() == -1)
            || (rhs.as_i128() == min && self.as_i128() == -1);
        self.with_ub(if min_pattern { UbKind::SignOvfMin } else { UbKind::SignOvf })
    }

    pub fn div(self, rhs: IrValue) -> IrValue {
        debug_assert_eq!(self.ty, rhs.ty);
        if let Some(v) = self.carried(rhs) {
            return v;
        }
        if rhs.is_zero() {
            return self.with_ub(UbKind::ZeroDiv);
        }
        if self.ty.is_signed() && self.as_i128() == self.ty.min_i128() && rhs.as_i128() == -1 {
            return self.with_ub(UbKind::SignOvf);
        }
        Self::make(self.ty, self.as_i128() / rhs.as_i128())
    }

    pub fn rem(self, rhs: IrValue) -> IrValue {
        debug_assert_eq!(self.ty, rhs.ty);
        if let Some(v) = self.carried(rhs) {
            return v;
        }
        if rhs.is_zero() {
            return self.with_ub(UbKind::ZeroDiv);
        }
        if self.ty.is_signed() && self.as_i128() == self.ty.min_i128() && rhs.as_i128() == -1 {
            return self.with_ub(UbKind::SignOvf);
        }
        Self::make(self.ty, self.as_i128() % rhs.as_i128())
    }

    // Comparisons. The result keeps the left operand's type: the dialects
    // type relational results as `int`, and the expression layer takes its
    // result type from the LHS.

    fn boolean(self, rhs: IrValue, truth: bool) -> IrValue {
        if let Some(v) = self.carried(rhs) {
            return v;
        }
        IrValue { ty: self.ty, bits: truth as u64, ub: None }
    }

    pub fn cmp_lt(self, rhs: IrValue) -> IrValue {
        debug_assert_eq!(self.ty, rhs.ty);
        self.boolean(rhs, self.as_i128() < rhs.as_i128())
    }

    pub fn cmp_gt(self, rhs: IrValue) -> IrValue {
        debug_assert_eq!(self.ty, rhs.ty);
        self.boolean(rhs, self.as_i128() > rhs.as_i128())
    }

    pub fn cmp_le(self, rhs: IrValue) -> IrValue {
        debug_assert_eq!(self.ty, rhs.ty);
        self.boolean(rhs, self.as_i128() <= rhs.as_i128())
    }

    pub fn cmp_ge(self, rhs: IrValue) -> IrValue {
        debug_assert_eq!(self.ty, rhs.ty);
        self.boolean(rhs, self.as_i128() >= rhs.as_i128())
    }

    pub fn cmp_eq(self, rhs: IrValue) -> IrValue {
        debug_assert_eq!(self.ty, rhs.ty);
        self.boolean(rhs, self.as_i128() == rhs.as_i128())
    }

    pub fn cmp_ne(self, rhs: IrValue) -> IrValue {
        debug_assert_eq!(self.ty, rhs.ty);
        self.boolean(rhs, self.as_i128() != rhs.as_i128())
    }

    pub fn log_and(self, rhs: IrValue) -> IrValue {
        self.boolean(rhs, !self.is_zero() && !rhs.is_zero())
    }

    pub fn log_or(self, rhs: IrValue) -> IrValue {
        self.boolean(rhs, !self.is_zero() || !rhs.is_zero())
    }

    pub fn bit_and(self, rhs: IrValue) -> IrValue {
        debug_assert_eq!(self.ty, rhs.ty);
        if let Some(v) = self.carried(rhs) {
            return v;
        }
        IrValue { ty: self.ty, bits: self.bits & rhs.bits, ub: None }
    }

    pub fn bit_or(self, rhs: IrValue) -> IrValue {
        debug_assert_eq!(self.ty, rhs.ty);
        if let Some(v) = self.carried(rhs) {
            return v;
        }
        IrValue { ty: self.ty, bits: self.bits | rhs.bits, ub: None }
    }

    pub fn bit_xor(self, rhs: IrValue) -> IrValue {
        debug_assert_eq!(self.ty, rhs.ty);
        if let Some(v) = self.carried(rhs) {
            return v;
        }
        IrValue { ty: self.ty, bits: self.bits ^ rhs.bits, ub: None }
    }

    // Shifts. The operands are promoted independently, so their types may
    // differ; the result takes the left operand's type.

    fn shift_flag(self, rhs: IrValue, left: bool) -> Option<UbKind> {
        let w = self.ty.bit_width() as u64;
        if rhs.ty.is_signed() && rhs.as_i64() < 0 {
            return Some(UbKind::ShiftRhsNeg);
        }
        if rhs.as_u64() >= w {
            return Some(UbKind::ShiftRhsLarge);
        }
        if self.ty.is_signed() && self.as_i64() < 0 {
            return Some(UbKind::NegShift);
        }
        // A signed left shift may not push the most significant set bit past
        // the width of the corresponding unsigned type.
        if left && self.ty.is_signed() && msb_index(self.bits) + rhs.as_u64() > w {
            return Some(UbKind::ShiftRhsLarge);
        }
        None
    }

    pub fn shl(self, rhs: IrValue) -> IrValue {
        if let Some(v) = self.carried(rhs) {
            return v;
        }
        if let Some(ub) = self.shift_flag(rhs, true) {
            return self.with_ub(ub);
        }
        IrValue {
            ty: self.ty,
            bits: truncate(self.ty, (self.bits as u128) << rhs.as_u64()),
            ub: None,
        }
    }

    pub fn shr(self, rhs: IrValue) -> IrValue {
        if let Some(v) = self.carried(rhs) {
            return v;
        }
        if let Some(ub) = self.shift_flag(rhs, false) {
            return self.with_ub(ub);
        }
        IrValue { ty: self.ty, bits: self.bits >> rhs.as_u64(), ub: None }
    }
}

impl fmt::Display for IrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ty == IntTypeId::Bool {
            write!(f, "{}", if self.bits != 0 { "true" } else { "false" })
        } else if self.ty.is_signed() {
            write!(f, "{}", self.as_i64())
        } else {
            write!(f, "{}", self.bits)
        }
    }
}

/// Keep the low `bit_width` bits of the type.
fn truncate(ty: IntTypeId, wide: u128) -> u64 {
    let w = ty.bit_width();
    if ty == IntTypeId::Bool {
        // Converting to bool tests against zero rather than keeping one bit.
        ((wide & 0xFFFF_FFFF_FFFF_FFFF) != 0) as u64
    } else if w == 64 {
        wide as u64
    } else {
        (wide as u64) & ((1u64 << w) - 1)
    }
}

/// One-based index of the most significant set bit; 0 for a zero value.
pub fn msb_index(v: u64) -> u64 {
    64 - v.leading_zeros() as u64
}
