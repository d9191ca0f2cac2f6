use super::*;

use crate::emit::Emitter;
use crate::eval::EvalCtx;
use crate::ir_value::UbKind;
use crate::options::StdKind;
use crate::rng::RandGen;

fn emit(ir: &Ir, id: ExprId) -> String {
    let mut s = String::new();
    Emitter::new(ir, StdKind::Cxx).expr(id, &mut s);
    s
}

fn int_var(ir: &mut Ir, name: &str, v: i64) -> DataId {
    ir.new_scalar(name, IntTypeId::Int, IrValue::from_i64(IntTypeId::Int, v))
}

fn scalar_of(val: Value) -> IrValue {
    val.as_scalar().expect("expected a scalar result")
}

#[test]
fn test_use_interning_returns_same_node() {
    let mut ir = Ir::new();
    let d = int_var(&mut ir, "a", 5);
    let u1 = ir.scalar_use(d).unwrap();
    let u2 = ir.scalar_use(d).unwrap();
    assert_eq!(u1, u2);

    let aty = ir.types.array_type(IntTypeId::Int, vec![4]);
    let arr = ir.new_array("arr", aty, IrValue::zero(IntTypeId::Int));
    assert_eq!(ir.array_use(arr).unwrap(), ir.array_use(arr).unwrap());
}

#[test]
fn test_use_kind_is_checked() {
    let mut ir = Ir::new();
    let aty = ir.types.array_type(IntTypeId::Int, vec![4]);
    let arr = ir.new_array("arr", aty, IrValue::zero(IntTypeId::Int));
    let err = ir.scalar_use(arr).expect_err("array data must not make a scalar use");
    assert!(matches!(err, GenError::Precondition(_)));
}

#[test]
fn test_assignment_is_visible_through_every_use() {
    let mut ir = Ir::new();
    let d = int_var(&mut ir, "a", 5);
    let use_a = ir.scalar_use(d).unwrap();
    let nine = ir.constant(IrValue::from_i64(IntTypeId::Int, 9));
    let assign = ir.assign(use_a, nine, true).unwrap();

    let ctx = EvalCtx::new();
    ir.evaluate(assign, &ctx).unwrap();

    // The interned use reads the mutated data object.
    let d_use = ir.scalar_use(d).unwrap();
    let seen = ir.evaluate(d_use, &ctx).unwrap();
    assert_eq!(scalar_of(seen).as_i64(), 9);
}

#[test]
fn test_promotion_inserts_int_casts() {
    let mut ir = Ir::new();
    let a = ir.new_scalar("a", IntTypeId::Short, IrValue::from_i64(IntTypeId::Short, 1));
    let b = ir.new_scalar("b", IntTypeId::Short, IrValue::from_i64(IntTypeId::Short, 2));
    let ua = ir.scalar_use(a).unwrap();
    let ub = ir.scalar_use(b).unwrap();
    let add = ir.binary(BinOp::Add, ua, ub).unwrap();
    ir.propagate_type(add).unwrap();

    assert_eq!(ir.expr_type(add).unwrap(), TypeRef::Int(IntTypeId::Int));
    match ir.kind(add) {
        ExprKind::Binary { lhs, rhs, .. } => {
            assert!(matches!(ir.kind(lhs), ExprKind::Cast { to: TypeRef::Int(IntTypeId::Int), implicit: true, .. }));
            assert!(matches!(ir.kind(rhs), ExprKind::Cast { to: TypeRef::Int(IntTypeId::Int), implicit: true, .. }));
        }
        other => panic!("expected a binary node, got {other:?}"),
    }

    let val = ir.evaluate(add, &EvalCtx::new()).unwrap();
    assert_eq!(scalar_of(val).as_i64(), 3);
}

#[test]
fn test_propagation_is_idempotent() {
    let mut ir = Ir::new();
    let a = ir.new_scalar("a", IntTypeId::UChar, IrValue::from_u64(IntTypeId::UChar, 200));
    let b = ir.new_scalar("b", IntTypeId::Uint, IrValue::from_u64(IntTypeId::Uint, 3));
    let ua = ir.scalar_use(a).unwrap();
    let ub = ir.scalar_use(b).unwrap();
    let mul = ir.binary(BinOp::Mul, ua, ub).unwrap();
    let neg = ir.unary(UnaryOp::Negate, mul).unwrap();

    ir.propagate_type(neg).unwrap();
    let once = emit(&ir, neg);
    ir.propagate_type(neg).unwrap();
    let twice = emit(&ir, neg);
    assert_eq!(once, twice);
}

#[test]
fn test_arith_conv_same_signedness_widens() {
    let mut ir = Ir::new();
    let a = int_var(&mut ir, "a", 1);
    let b = ir.new_scalar("b", IntTypeId::LLong, IrValue::from_i64(IntTypeId::LLong, 2));
    let ua = ir.scalar_use(a).unwrap();
    let ub = ir.scalar_use(b).unwrap();
    let add = ir.binary(BinOp::Add, ua, ub).unwrap();
    ir.propagate_type(add).unwrap();
    assert_eq!(ir.expr_type(add).unwrap(), TypeRef::Int(IntTypeId::LLong));
}

#[test]
fn test_arith_conv_unsigned_absorbs_lower_signed() {
    let mut ir = Ir::new();
    let a = ir.new_scalar("a", IntTypeId::Uint, IrValue::from_u64(IntTypeId::Uint, 1));
    let b = int_var(&mut ir, "b", 2);
    let ua = ir.scalar_use(a).unwrap();
    let ub = ir.scalar_use(b).unwrap();
    let add = ir.binary(BinOp::Add, ua, ub).unwrap();
    ir.propagate_type(add).unwrap();
    assert_eq!(ir.expr_type(add).unwrap(), TypeRef::Int(IntTypeId::Uint));
    match ir.kind(add) {
        ExprKind::Binary { rhs, .. } => {
            assert!(matches!(ir.kind(rhs), ExprKind::Cast { to: TypeRef::Int(IntTypeId::Uint), .. }));
        }
        _ => unreachable!(),
    }
}

#[test]
fn test_arith_conv_wide_signed_takes_unsigned() {
    let mut ir = Ir::new();
    let a = ir.new_scalar("a", IntTypeId::LLong, IrValue::from_i64(IntTypeId::LLong, 1));
    let b = ir.new_scalar("b", IntTypeId::Uint, IrValue::from_u64(IntTypeId::Uint, 2));
    let ua = ir.scalar_use(a).unwrap();
    let ub = ir.scalar_use(b).unwrap();
    let add = ir.binary(BinOp::Add, ua, ub).unwrap();
    ir.propagate_type(add).unwrap();
    assert_eq!(ir.expr_type(add).unwrap(), TypeRef::Int(IntTypeId::LLong));
}

#[test]
fn test_arith_conv_final_rule_uses_unsigned_counterpart() {
    let mut ir = Ir::new();
    let a = ir.new_scalar("a", IntTypeId::LLong, IrValue::from_i64(IntTypeId::LLong, 1));
    let b = ir.new_scalar("b", IntTypeId::Ulong, IrValue::from_u64(IntTypeId::Ulong, 2));
    let ua = ir.scalar_use(a).unwrap();
    let ub = ir.scalar_use(b).unwrap();
    let add = ir.binary(BinOp::Add, ua, ub).unwrap();
    ir.propagate_type(add).unwrap();
    assert_eq!(ir.expr_type(add).unwrap(), TypeRef::Int(IntTypeId::ULLong));
    match ir.kind(add) {
        ExprKind::Binary { lhs, rhs, .. } => {
            assert!(matches!(ir.kind(lhs), ExprKind::Cast { to: TypeRef::Int(IntTypeId::ULLong), .. }));
            assert!(matches!(ir.kind(rhs), ExprKind::Cast { to: TypeRef::Int(IntTypeId::ULLong), .. }));
        }
        _ => unreachable!(),
    }
}

#[test]
fn test_mixed_int_uint_sub_wraps_to_max() {
    let mut ir = Ir::new();
    let a = int_var(&mut ir, "a", 1);
    let b = ir.new_scalar("b", IntTypeId::Uint, IrValue::from_u64(IntTypeId::Uint, 2));
    let ua = ir.scalar_use(a).unwrap();
    let ub = ir.scalar_use(b).unwrap();
    let sub = ir.binary(BinOp::Sub, ua, ub).unwrap();
    ir.propagate_type(sub).unwrap();

    // Equal rank, differing signedness: both operands become unsigned int.
    assert_eq!(ir.expr_type(sub).unwrap(), TypeRef::Int(IntTypeId::Uint));
    let val = ir.evaluate(sub, &EvalCtx::new()).unwrap();
    let v = scalar_of(val);
    assert!(!v.has_ub());
    assert_eq!(v.as_u64(), u32::MAX as u64);
    assert!(emit(&ir, sub).contains("/* implicit */unsigned int"));
}

#[test]
fn test_logical_ops_convert_to_bool() {
    let mut ir = Ir::new();
    let a = int_var(&mut ir, "a", 3);
    let b = int_var(&mut ir, "b", 0);
    let ua = ir.scalar_use(a).unwrap();
    let ub = ir.scalar_use(b).unwrap();
    let and = ir.binary(BinOp::LogAnd, ua, ub).unwrap();
    ir.propagate_type(and).unwrap();
    assert_eq!(ir.expr_type(and).unwrap(), TypeRef::Int(IntTypeId::Bool));
    let v = scalar_of(ir.evaluate(and, &EvalCtx::new()).unwrap());
    assert_eq!(v.as_u64(), 0);
}

#[test]
fn test_relational_result_takes_lhs_type() {
    let mut ir = Ir::new();
    let a = int_var(&mut ir, "a", 3);
    let b = int_var(&mut ir, "b", 5);
    let ua = ir.scalar_use(a).unwrap();
    let ub = ir.scalar_use(b).unwrap();
    let lt = ir.binary(BinOp::Lt, ua, ub).unwrap();
    ir.propagate_type(lt).unwrap();
    assert_eq!(ir.expr_type(lt).unwrap(), TypeRef::Int(IntTypeId::Int));
    let v = scalar_of(ir.evaluate(lt, &EvalCtx::new()).unwrap());
    assert_eq!(v.as_i64(), 1);
}

#[test]
fn test_binary_over_array_is_rejected() {
    let mut ir = Ir::new();
    let aty = ir.types.array_type(IntTypeId::Int, vec![4]);
    let arr = ir.new_array("arr", aty, IrValue::zero(IntTypeId::Int));
    let ua = ir.array_use(arr).unwrap();
    let one = ir.constant(IrValue::from_i64(IntTypeId::Int, 1));
    let err = ir.binary(BinOp::Add, ua, one).expect_err("arrays are not scalar operands");
    assert!(matches!(err, GenError::Precondition(_)));
}

#[test]
fn test_cast_between_array_and_integer_is_rejected() {
    let mut ir = Ir::new();
    let aty = ir.types.array_type(IntTypeId::Int, vec![4]);
    let arr = ir.new_array("arr", aty, IrValue::zero(IntTypeId::Int));
    let ua = ir.array_use(arr).unwrap();
    let err = ir
        .cast(ua, TypeRef::Int(IntTypeId::Int), false)
        .expect_err("array-to-integer casts are ill-formed");
    assert!(matches!(err, GenError::Precondition(_)));
}

#[test]
fn test_unpinned_iterator_in_arithmetic_is_an_error() {
    let mut ir = Ir::new();
    let start = ir.constant(IrValue::zero(IntTypeId::Int));
    let end = ir.constant(IrValue::from_i64(IntTypeId::Int, 8));
    let step = ir.constant(IrValue::from_i64(IntTypeId::Int, 1));
    let it = ir.new_iter("i_0", IntTypeId::Int, start, end, step);
    let ui = ir.iter_use(it).unwrap();
    let one = ir.constant(IrValue::from_i64(IntTypeId::Int, 1));
    let add = ir.binary(BinOp::Add, ui, one).unwrap();
    let err = ir.evaluate(add, &EvalCtx::new()).expect_err("iterator has no pinned value");
    assert!(matches!(err, GenError::UnpinnedIterator(_)));

    let mut ctx = EvalCtx::new();
    ctx.pin("i_0", IrValue::from_i64(IntTypeId::Int, 4));
    let v = scalar_of(ir.evaluate(add, &ctx).unwrap());
    assert_eq!(v.as_i64(), 5);
}

// Repair scenarios.

#[test]
fn test_rebuild_swaps_overflowing_add_to_sub() {
    let mut ir = Ir::new();
    let a = int_var(&mut ir, "a", i32::MAX as i64);
    let b = int_var(&mut ir, "b", 1);
    let ua = ir.scalar_use(a).unwrap();
    let ub = ir.scalar_use(b).unwrap();
    let add = ir.binary(BinOp::Add, ua, ub).unwrap();
    ir.propagate_type(add).unwrap();

    let flagged = ir.evaluate(add, &EvalCtx::new()).unwrap();
    assert_eq!(flagged.ub_code(), Some(UbKind::SignOvf));

    let mut rng = RandGen::new(0);
    let val = ir.rebuild(add, &EvalCtx::new(), &mut rng).unwrap();
    assert!(!val.has_ub());
    assert_eq!(scalar_of(val).as_i64(), 2147483646);
    assert!(matches!(ir.kind(add), ExprKind::Binary { op: BinOp::Sub, .. }));
    assert_eq!(emit(&ir, add), "((a) - (b))");
}

#[test]
fn test_rebuild_zero_division_becomes_mul() {
    let mut ir = Ir::new();
    let a = int_var(&mut ir, "a", 7);
    let b = int_var(&mut ir, "b", 0);
    let ua = ir.scalar_use(a).unwrap();
    let ub = ir.scalar_use(b).unwrap();
    let div = ir.binary(BinOp::Div, ua, ub).unwrap();
    ir.propagate_type(div).unwrap();

    let mut rng = RandGen::new(0);
    let val = ir.rebuild(div, &EvalCtx::new(), &mut rng).unwrap();
    assert!(!val.has_ub());
    assert_eq!(scalar_of(val).as_i64(), 0);
    assert_eq!(emit(&ir, div), "((a) * (b))");
}

#[test]
fn test_rebuild_div_min_by_minus_one_becomes_sub() {
    let mut ir = Ir::new();
    let a = int_var(&mut ir, "a", i32::MIN as i64);
    let b = int_var(&mut ir, "b", -1);
    let ua = ir.scalar_use(a).unwrap();
    let ub = ir.scalar_use(b).unwrap();
    let div = ir.binary(BinOp::Div, ua, ub).unwrap();
    ir.propagate_type(div).unwrap();

    let mut rng = RandGen::new(0);
    let val = ir.rebuild(div, &EvalCtx::new(), &mut rng).unwrap();
    assert!(!val.has_ub());
    assert_eq!(scalar_of(val).as_i64(), i32::MIN as i64 + 1);
    assert!(matches!(ir.kind(div), ExprKind::Binary { op: BinOp::Sub, .. }));
}

#[test]
fn test_rebuild_mul_min_pattern_becomes_sub() {
    let mut ir = Ir::new();
    let a = int_var(&mut ir, "a", i32::MIN as i64);
    let b = int_var(&mut ir, "b", -1);
    let ua = ir.scalar_use(a).unwrap();
    let ub = ir.scalar_use(b).unwrap();
    let mul = ir.binary(BinOp::Mul, ua, ub).unwrap();
    ir.propagate_type(mul).unwrap();

    let mut rng = RandGen::new(0);
    let val = ir.rebuild(mul, &EvalCtx::new(), &mut rng).unwrap();
    assert!(!val.has_ub());
    assert!(matches!(ir.kind(mul), ExprKind::Binary { op: BinOp::Sub, .. }));
    assert_eq!(scalar_of(val).as_i64(), i32::MIN as i64 + 1);
}

#[test]
fn test_rebuild_negative_shift_lhs_gets_max_added() {
    let mut ir = Ir::new();
    let a = int_var(&mut ir, "a", -1);
    let b = int_var(&mut ir, "b", 3);
    let ua = ir.scalar_use(a).unwrap();
    let ub = ir.scalar_use(b).unwrap();
    let shl = ir.binary(BinOp::Shl, ua, ub).unwrap();
    ir.propagate_type(shl).unwrap();

    let flagged = ir.evaluate(shl, &EvalCtx::new()).unwrap();
    assert_eq!(flagged.ub_code(), Some(UbKind::NegShift));

    let mut rng = RandGen::new(0);
    let val = ir.rebuild(shl, &EvalCtx::new(), &mut rng).unwrap();
    assert!(!val.has_ub());
    // The left operand is now `a + INT_MAX`, which evaluates to INT_MAX - 1.
    let lhs = match ir.kind(shl) {
        ExprKind::Binary { lhs, .. } => lhs,
        _ => unreachable!(),
    };
    assert!(matches!(ir.kind(lhs), ExprKind::Binary { op: BinOp::Add, .. }));
    assert_eq!(ir.scalar_value(lhs).unwrap().as_i64(), i32::MAX as i64 - 1);
}

#[test]
fn test_rebuild_shift_amount_too_large() {
    let mut ir = Ir::new();
    let a = ir.new_scalar("a", IntTypeId::Uint, IrValue::from_u64(IntTypeId::Uint, 5));
    let b = ir.new_scalar("b", IntTypeId::Uint, IrValue::from_u64(IntTypeId::Uint, 40));
    let ua = ir.scalar_use(a).unwrap();
    let ub = ir.scalar_use(b).unwrap();
    let shr = ir.binary(BinOp::Shr, ua, ub).unwrap();
    ir.propagate_type(shr).unwrap();

    let mut rng = RandGen::new(0);
    let val = ir.rebuild(shr, &EvalCtx::new(), &mut rng).unwrap();
    assert!(!val.has_ub());

    // The right operand was folded with a constant; its value is a valid
    // shift amount and the result is exactly `5 >> amount`.
    let rhs = match ir.kind(shr) {
        ExprKind::Binary { rhs, .. } => rhs,
        _ => unreachable!(),
    };
    assert!(matches!(ir.kind(rhs), ExprKind::Binary { .. }));
    let amount = ir.scalar_value(rhs).unwrap().as_u64();
    assert!(amount < 32);
    assert_eq!(scalar_of(val).as_u64(), 5u64 >> amount);
}

#[test]
fn test_rebuild_shift_amount_of_type_min() {
    let mut ir = Ir::new();
    let a = ir.new_scalar("a", IntTypeId::Uint, IrValue::from_u64(IntTypeId::Uint, 5));
    let b = int_var(&mut ir, "b", i32::MIN as i64);
    let ua = ir.scalar_use(a).unwrap();
    let ub = ir.scalar_use(b).unwrap();
    let shr = ir.binary(BinOp::Shr, ua, ub).unwrap();
    ir.propagate_type(shr).unwrap();

    // Each additive adjustment is clamped to the bit width, so the amount
    // creeps toward zero until the escalation masks it into range.
    let mut rng = RandGen::new(0);
    let val = ir.rebuild(shr, &EvalCtx::new(), &mut rng).unwrap();
    assert!(!val.has_ub());
    let rhs = match ir.kind(shr) {
        ExprKind::Binary { rhs, .. } => rhs,
        _ => unreachable!(),
    };
    assert!(matches!(ir.kind(rhs), ExprKind::Binary { op: BinOp::BitAnd, .. }));
    let amount = ir.scalar_value(rhs).unwrap().as_u64();
    assert!(amount < 32);
    assert_eq!(scalar_of(val).as_u64(), 5u64 >> amount);
}

#[test]
fn test_masked_shift_amount_respects_base_msb() {
    let mut ir = Ir::new();
    let a = int_var(&mut ir, "a", 1 << 30);
    let b = int_var(&mut ir, "b", i32::MIN as i64 + 5);
    let ua = ir.scalar_use(a).unwrap();
    let ub = ir.scalar_use(b).unwrap();
    let shl = ir.binary(BinOp::Shl, ua, ub).unwrap();
    ir.propagate_type(shl).unwrap();

    // The base's top set bit is at index 31, so only amounts up to 1 keep a
    // signed left shift defined; the escalation mask must honor that bound.
    let mut rng = RandGen::new(0);
    let val = ir.rebuild(shl, &EvalCtx::new(), &mut rng).unwrap();
    assert!(!val.has_ub());
    let rhs = match ir.kind(shl) {
        ExprKind::Binary { rhs, .. } => rhs,
        _ => unreachable!(),
    };
    assert!(matches!(ir.kind(rhs), ExprKind::Binary { op: BinOp::BitAnd, .. }));
    let amount = ir.scalar_value(rhs).unwrap().as_u64();
    assert!(amount <= 1);
    assert_eq!(scalar_of(val).as_u64(), (1u64 << 30) << amount);
}

#[test]
fn test_limit_operand_after_repeated_overflow() {
    fn set(ir: &mut Ir, d: DataId, v: i64) {
        match ir.data_mut(d) {
            DataObj::Scalar { cur, .. } => *cur = IrValue::from_i64(IntTypeId::Int, v),
            _ => unreachable!(),
        }
    }

    let mut ir = Ir::new();
    let mut rng = RandGen::new(0);
    let a = int_var(&mut ir, "a", i32::MAX as i64);
    let b = int_var(&mut ir, "b", 1);
    let ua = ir.scalar_use(a).unwrap();
    let ub = ir.scalar_use(b).unwrap();
    let add = ir.binary(BinOp::Add, ua, ub).unwrap();
    ir.propagate_type(add).unwrap();

    // Flip the operand between the extremes so every repaired operator
    // overflows again at the next point.
    let ctx = EvalCtx::new();
    ir.rebuild(add, &ctx, &mut rng).unwrap();
    set(&mut ir, a, i32::MIN as i64);
    ir.rebuild(add, &ctx, &mut rng).unwrap();
    set(&mut ir, a, i32::MAX as i64);
    ir.rebuild(add, &ctx, &mut rng).unwrap();
    set(&mut ir, a, i32::MIN as i64);
    let val = ir.rebuild(add, &ctx, &mut rng).unwrap();

    // The fourth repair wraps the right operand with a small modulus.
    assert!(!val.has_ub());
    assert_eq!(scalar_of(val).as_i64(), i32::MIN as i64 + 1);
    let rhs = match ir.kind(add) {
        ExprKind::Binary { rhs, .. } => rhs,
        _ => unreachable!(),
    };
    assert!(matches!(ir.kind(rhs), ExprKind::Binary { op: BinOp::Mod, .. }));
}

#[test]
fn test_masked_negative_shift_base_after_repeated_repairs() {
    fn set(ir: &mut Ir, d: DataId, v: i64) {
        match ir.data_mut(d) {
            DataObj::Scalar { cur, .. } => *cur = IrValue::from_i64(IntTypeId::Int, v),
            _ => unreachable!(),
        }
    }

    let mut ir = Ir::new();
    let mut rng = RandGen::new(0);
    let v = int_var(&mut ir, "v", -1);
    let uv = ir.scalar_use(v).unwrap();
    let zero = ir.constant(IrValue::zero(IntTypeId::Int));
    let shl = ir.binary(BinOp::Shl, uv, zero).unwrap();
    ir.propagate_type(shl).unwrap();

    // Alternating between -1 and the minimum keeps the additive base repair
    // landing on a negative value, so the node's counter climbs until the
    // base gets masked non-negative outright.
    let ctx = EvalCtx::new();
    ir.rebuild(shl, &ctx, &mut rng).unwrap();
    set(&mut ir, v, i32::MIN as i64);
    ir.rebuild(shl, &ctx, &mut rng).unwrap();
    set(&mut ir, v, -1);
    ir.rebuild(shl, &ctx, &mut rng).unwrap();
    set(&mut ir, v, i32::MIN as i64);
    let val = ir.rebuild(shl, &ctx, &mut rng).unwrap();

    assert!(!val.has_ub());
    assert_eq!(scalar_of(val).as_i64(), i32::MAX as i64);
    let lhs = match ir.kind(shl) {
        ExprKind::Binary { lhs, .. } => lhs,
        _ => unreachable!(),
    };
    assert!(matches!(ir.kind(lhs), ExprKind::Binary { op: BinOp::BitAnd, .. }));
}

#[test]
fn test_rebuild_negate_of_min_becomes_plus() {
    let mut ir = Ir::new();
    let a = int_var(&mut ir, "a", i32::MIN as i64);
    let ua = ir.scalar_use(a).unwrap();
    let neg = ir.unary(UnaryOp::Negate, ua).unwrap();
    ir.propagate_type(neg).unwrap();

    let mut rng = RandGen::new(0);
    let val = ir.rebuild(neg, &EvalCtx::new(), &mut rng).unwrap();
    assert!(!val.has_ub());
    assert_eq!(scalar_of(val).as_i64(), i32::MIN as i64);
    assert!(matches!(ir.kind(neg), ExprKind::Unary { op: UnaryOp::Plus, .. }));
    assert_eq!(emit(&ir, neg), "(+(a))");
}

// Subscripts.

#[test]
fn test_subscript_active_dims_and_result_kinds() {
    let mut ir = Ir::new();
    let aty = ir.types.array_type(IntTypeId::Int, vec![8, 4]);
    let arr = ir.new_array("arr", aty, IrValue::from_i64(IntTypeId::Int, 7));
    let base = ir.array_use(arr).unwrap();
    let i = ir.constant(IrValue::from_i64(IntTypeId::Int, 2));
    let j = ir.constant(IrValue::from_i64(IntTypeId::Int, 3));
    let outer = ir.subscript(base, i).unwrap();
    let inner = ir.subscript(outer, j).unwrap();

    assert_eq!(ir.expr_type(outer).unwrap(), TypeRef::Array(aty));
    assert_eq!(ir.expr_type(inner).unwrap(), TypeRef::Int(IntTypeId::Int));

    let val = ir.evaluate(inner, &EvalCtx::new()).unwrap();
    assert!(!val.has_ub());
    assert_eq!(scalar_of(val).as_i64(), 7);

    match ir.kind(outer) {
        ExprKind::Subscript { active_dim, active_size, .. } => {
            assert_eq!(active_dim, 0);
            assert_eq!(active_size, 8);
        }
        _ => unreachable!(),
    }
    match ir.kind(inner) {
        ExprKind::Subscript { active_dim, active_size, .. } => {
            assert_eq!(active_dim, 1);
            assert_eq!(active_size, 4);
        }
        _ => unreachable!(),
    }
}

#[test]
fn test_subscript_oob_constant_gets_modulus() {
    let mut ir = Ir::new();
    let aty = ir.types.array_type(IntTypeId::Int, vec![8]);
    let arr = ir.new_array("arr", aty, IrValue::from_i64(IntTypeId::Int, 1));
    let base = ir.array_use(arr).unwrap();
    let idx = ir.constant(IrValue::from_i64(IntTypeId::Int, 12));
    let sub = ir.subscript(base, idx).unwrap();
    ir.propagate_type(sub).unwrap();

    let flagged = ir.evaluate(sub, &EvalCtx::new()).unwrap();
    assert_eq!(flagged.ub_code(), Some(UbKind::OutOfBounds));

    let mut rng = RandGen::new(0);
    let val = ir.rebuild(sub, &EvalCtx::new(), &mut rng).unwrap();
    assert!(!val.has_ub());
    match ir.kind(sub) {
        ExprKind::Subscript { idx, .. } => {
            assert!(matches!(ir.kind(idx), ExprKind::Binary { op: BinOp::Mod, .. }));
        }
        _ => unreachable!(),
    }
    assert!(emit(&ir, sub).contains("% (8"));
}

#[test]
fn test_subscript_iterator_stays_in_bounds_across_space() {
    let mut ir = Ir::new();
    let aty = ir.types.array_type(IntTypeId::Int, vec![8]);
    let arr = ir.new_array("arr", aty, IrValue::from_i64(IntTypeId::Int, 1));
    let start = ir.constant(IrValue::zero(IntTypeId::Int));
    let end = ir.constant(IrValue::from_i64(IntTypeId::Int, 16));
    let step = ir.constant(IrValue::from_i64(IntTypeId::Int, 1));
    let it = ir.new_iter("i_0", IntTypeId::Int, start, end, step);

    let base = ir.array_use(arr).unwrap();
    let idx = ir.iter_use(it).unwrap();
    let sub = ir.subscript(base, idx).unwrap();
    ir.propagate_type(sub).unwrap();

    // Unpinned, the bounds check falls back to the iterator's [0, 16) range,
    // which is not contained in [0, 8).
    let flagged = ir.evaluate(sub, &EvalCtx::new()).unwrap();
    assert_eq!(flagged.ub_code(), Some(UbKind::OutOfBounds));

    // Sweep the space: the first out-of-bounds point injects `% 8`.
    let mut rng = RandGen::new(0);
    let mut ctx = EvalCtx::new();
    for i in 0..16 {
        ctx.pin("i_0", IrValue::from_i64(IntTypeId::Int, i));
        let val = ir.rebuild(sub, &ctx, &mut rng).unwrap();
        assert!(!val.has_ub());
    }

    // Every point of the space now evaluates in bounds.
    for i in 0..16 {
        ctx.pin("i_0", IrValue::from_i64(IntTypeId::Int, i));
        let val = ir.evaluate(sub, &ctx).unwrap();
        assert!(!val.has_ub(), "index {i} escaped the repaired bounds");
    }
}

// Assignments.

#[test]
fn test_assignment_inserts_destination_cast_once() {
    let mut ir = Ir::new();
    let d = ir.new_scalar("x", IntTypeId::LLong, IrValue::zero(IntTypeId::LLong));
    let to = ir.scalar_use(d).unwrap();
    let from = ir.constant(IrValue::from_i64(IntTypeId::Int, 5));
    let assign = ir.assign(to, from, true).unwrap();
    ir.propagate_type(assign).unwrap();

    let ctx = EvalCtx::new();
    ir.evaluate(assign, &ctx).unwrap();
    let wrapped = match ir.kind(assign) {
        ExprKind::Assign { from, .. } => from,
        _ => unreachable!(),
    };
    assert!(matches!(
        ir.kind(wrapped),
        ExprKind::Cast { to: TypeRef::Int(IntTypeId::LLong), implicit: true, .. }
    ));

    // Re-evaluation leaves the tree alone: the types already match.
    ir.evaluate(assign, &ctx).unwrap();
    match ir.kind(assign) {
        ExprKind::Assign { from, .. } => assert_eq!(from, wrapped),
        _ => unreachable!(),
    }
}

#[test]
fn test_assignment_through_subscript_writes_the_array() {
    let mut ir = Ir::new();
    let aty = ir.types.array_type(IntTypeId::Int, vec![4]);
    let arr = ir.new_array("arr", aty, IrValue::from_i64(IntTypeId::Int, 1));
    let base = ir.array_use(arr).unwrap();
    let idx = ir.constant(IrValue::from_i64(IntTypeId::Int, 2));
    let dest = ir.subscript(base, idx).unwrap();
    let from = ir.constant(IrValue::from_i64(IntTypeId::Int, 9));
    let assign = ir.assign(dest, from, true).unwrap();
    ir.propagate_type(assign).unwrap();

    ir.evaluate(assign, &EvalCtx::new()).unwrap();
    match ir.data(arr) {
        DataObj::Array { cur, .. } => assert_eq!(cur.as_i64(), 9),
        _ => unreachable!(),
    }
}

#[test]
fn test_untaken_assignment_leaves_data_alone() {
    let mut ir = Ir::new();
    let d = int_var(&mut ir, "x", 5);
    let to = ir.scalar_use(d).unwrap();
    let from = ir.constant(IrValue::from_i64(IntTypeId::Int, 9));
    let assign = ir.assign(to, from, false).unwrap();
    ir.evaluate(assign, &EvalCtx::new()).unwrap();
    match ir.data(d) {
        DataObj::Scalar { cur, .. } => assert_eq!(cur.as_i64(), 5),
        _ => unreachable!(),
    }
}

#[test]
fn test_assignment_of_array_to_scalar_is_rejected() {
    let mut ir = Ir::new();
    let aty = ir.types.array_type(IntTypeId::Int, vec![4]);
    let arr = ir.new_array("arr", aty, IrValue::zero(IntTypeId::Int));
    let d = int_var(&mut ir, "x", 0);
    let to = ir.scalar_use(d).unwrap();
    let from = ir.array_use(arr).unwrap();
    let assign = ir.assign(to, from, true).unwrap();
    let err = ir
        .evaluate(assign, &EvalCtx::new())
        .expect_err("array source cannot fill a scalar destination");
    assert!(matches!(err, GenError::Precondition(_)));
}

#[test]
fn test_min_constant_is_emitted_as_min_plus_one_minus_one() {
    let mut ir = Ir::new();
    let c = ir.constant(IrValue::min_of(IntTypeId::Int));
    assert_eq!(emit(&ir, c), "(-2147483647 - 1)");
    let c = ir.constant(IrValue::min_of(IntTypeId::LLong));
    assert_eq!(emit(&ir, c), "(-9223372036854775807LL - 1LL)");
}

#[test]
fn test_cast_emission_marks_implicit_casts() {
    let mut ir = Ir::new();
    let a = int_var(&mut ir, "a", 1);
    let ua = ir.scalar_use(a).unwrap();
    let implicit = ir.cast(ua, TypeRef::Int(IntTypeId::LLong), true).unwrap();
    let explicit = ir.cast(ua, TypeRef::Int(IntTypeId::Short), false).unwrap();
    assert_eq!(emit(&ir, implicit), "((/* implicit */long long int) a)");
    assert_eq!(emit(&ir, explicit), "((short) a)");
}
