//! Statement IR and the iteration-space rebuild driver.
//!
//! Statements own their children as plain trees; expressions inside them are
//! `ExprId` handles into the shared pool. The driver below replays the whole
//! statement tree the way the emitted program executes, loops iterated point
//! by point and statements in order, rebuilding every expression at every
//! point. A repair can change the values that flow into points visited
//! earlier, so the walk restarts from the initial data state until one full
//! walk completes without a single repair.

use log::debug;

use crate::data::{DataId, DataObj, Value};
use crate::error::GenError;
use crate::eval::{for_each_point, EvalCtx, IterDim};
use crate::expr::{ExprId, Ir};
use crate::rng::RandGen;

/// Loop header: prefix statements, one or more iterator declarations, suffix
/// statements. The prefix runs before the loop, the suffix after it.
#[derive(Debug, Clone)]
pub struct LoopHead {
    pub prefix: Vec<Stmt>,
    pub iters: Vec<DataId>,
    pub suffix: Vec<Stmt>,
}

impl LoopHead {
    pub fn new(iters: Vec<DataId>) -> Self {
        Self { prefix: Vec::new(), iters, suffix: Vec::new() }
    }
}

/// One loop of a loop sequence: a header plus its body scope.
#[derive(Debug, Clone)]
pub struct Loop {
    pub head: LoopHead,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub enum Stmt {
    /// A top-level expression, typically an assignment.
    Expr(ExprId),
    /// Declaration of a data object with an optional initializer.
    Decl { data: DataId, init: Option<ExprId> },
    /// Plain statement sequence.
    Block(Vec<Stmt>),
    /// Brace-enclosed sequence introducing a lexical scope.
    Scope(Vec<Stmt>),
    /// Sibling loops; a standalone loop is a sequence of one.
    LoopSeq(Vec<Loop>),
    /// Perfectly nested loop headers sharing one innermost body.
    LoopNest { heads: Vec<LoopHead>, body: Vec<Stmt> },
    /// Opaque text emitted verbatim (pragmas, attributes).
    Stub(String),
}

/// Runs type propagation over every expression in the tree.
pub fn propagate_types(ir: &mut Ir, stmts: &[Stmt]) -> Result<(), GenError> {
    for stmt in stmts {
        match stmt {
            Stmt::Expr(e) => ir.propagate_type(*e)?,
            Stmt::Decl { init: Some(e), .. } => ir.propagate_type(*e)?,
            Stmt::Decl { .. } | Stmt::Stub(_) => {}
            Stmt::Block(inner) | Stmt::Scope(inner) => propagate_types(ir, inner)?,
            Stmt::LoopSeq(loops) => {
                for l in loops {
                    propagate_types(ir, &l.head.prefix)?;
                    propagate_types(ir, &l.body)?;
                    propagate_types(ir, &l.head.suffix)?;
                }
            }
            Stmt::LoopNest { heads, body } => {
                for h in heads {
                    propagate_types(ir, &h.prefix)?;
                    propagate_types(ir, &h.suffix)?;
                }
                propagate_types(ir, body)?;
            }
        }
    }
    Ok(())
}

/// Walks of the whole tree before rebuild is declared divergent. Each walk
/// that performs at least one repair restarts from the initial data state.
const MAX_WALKS: u32 = 32;

/// Rebuilds every expression in the tree over the full iteration space,
/// leaving the data objects at their initial values afterwards.
pub fn rebuild_program(ir: &mut Ir, stmts: &[Stmt], rng: &mut RandGen) -> Result<(), GenError> {
    let baseline = ir.snapshot_data();
    for walk in 0..MAX_WALKS {
        ir.restore_data(baseline.clone());
        let before = ir.repair_count();
        let mut ctx = EvalCtx::new();
        run_block(ir, stmts, &mut ctx, rng)?;
        let repairs = ir.repair_count() - before;
        if repairs == 0 {
            ir.restore_data(baseline);
            return Ok(());
        }
        debug!("rebuild walk {walk}: {repairs} repairs, replaying");
    }
    Err(GenError::RebuildDivergence { context: "program", rounds: MAX_WALKS })
}

fn run_block(
    ir: &mut Ir,
    stmts: &[Stmt],
    ctx: &mut EvalCtx,
    rng: &mut RandGen,
) -> Result<(), GenError> {
    for stmt in stmts {
        run_stmt(ir, stmt, ctx, rng)?;
    }
    Ok(())
}

fn run_stmt(ir: &mut Ir, stmt: &Stmt, ctx: &mut EvalCtx, rng: &mut RandGen) -> Result<(), GenError> {
    match stmt {
        Stmt::Expr(expr) => {
            ir.rebuild(*expr, ctx, rng)?;
            Ok(())
        }
        Stmt::Decl { data, init } => {
            if let Some(init) = init {
                let val = ir.rebuild(*init, ctx, rng)?;
                store_initializer(ir, *data, val)?;
            }
            Ok(())
        }
        Stmt::Block(stmts) | Stmt::Scope(stmts) => run_block(ir, stmts, ctx, rng),
        Stmt::LoopSeq(loops) => {
            for l in loops {
                run_loop(ir, &l.head, &l.body, ctx, rng)?;
            }
            Ok(())
        }
        Stmt::LoopNest { heads, body } => run_nest(ir, heads, body, ctx, rng),
        Stmt::Stub(_) => Ok(()),
    }
}

fn run_loop(
    ir: &mut Ir,
    head: &LoopHead,
    body: &[Stmt],
    ctx: &mut EvalCtx,
    rng: &mut RandGen,
) -> Result<(), GenError> {
    run_block(ir, &head.prefix, ctx, rng)?;
    let dims = loop_dims(ir, &head.iters, ctx)?;
    let mut run = |ctx: &EvalCtx| {
        let mut inner = ctx.clone();
        run_block(ir, body, &mut inner, rng)
    };
    for_each_point(&dims, ctx, &mut run)?;
    run_block(ir, &head.suffix, ctx, rng)
}

fn run_nest(
    ir: &mut Ir,
    heads: &[LoopHead],
    body: &[Stmt],
    ctx: &mut EvalCtx,
    rng: &mut RandGen,
) -> Result<(), GenError> {
    match heads.split_first() {
        None => run_block(ir, body, ctx, rng),
        Some((head, rest)) => {
            run_block(ir, &head.prefix, ctx, rng)?;
            let dims = loop_dims(ir, &head.iters, ctx)?;
            let mut run = |ctx: &EvalCtx| {
                let mut inner = ctx.clone();
                run_nest(ir, rest, body, &mut inner, rng)
            };
            for_each_point(&dims, ctx, &mut run)?;
            run_block(ir, &head.suffix, ctx, rng)
        }
    }
}

/// Resolves a header's iterators to concrete dimensions under the current
/// context. Positive step and `start <= end` are preconditions on the
/// structure generator.
fn loop_dims(ir: &mut Ir, iters: &[DataId], ctx: &EvalCtx) -> Result<Vec<IterDim>, GenError> {
    let mut dims = Vec::with_capacity(iters.len());
    for &d in iters {
        let (name, ty, start, end, step) = match ir.data(d) {
            DataObj::Iter { name, ty, start, end, step } => {
                (name.clone(), *ty, *start, *end, *step)
            }
            other => {
                return Err(GenError::Precondition(format!(
                    "loop head declares `{}`, which is not an iterator",
                    other.name()
                )))
            }
        };
        let start = eval_bound(ir, start, ctx)?;
        let end = eval_bound(ir, end, ctx)?;
        let step = eval_bound(ir, step, ctx)?;
        if step <= 0 || start > end {
            return Err(GenError::Precondition(format!(
                "loop over `{name}` must have a positive step and start <= end"
            )));
        }
        dims.push(IterDim { name, ty, start, end, step });
    }
    Ok(dims)
}

fn eval_bound(ir: &mut Ir, expr: ExprId, ctx: &EvalCtx) -> Result<i128, GenError> {
    match ir.evaluate(expr, ctx)? {
        Value::Scalar(v) => Ok(v.as_i128()),
        _ => Err(GenError::Precondition(
            "loop bounds must evaluate to scalars".into(),
        )),
    }
}

fn store_initializer(ir: &mut Ir, data: DataId, val: Value) -> Result<(), GenError> {
    let val = match (ir.data(data), val) {
        (DataObj::Scalar { ty, .. }, Value::Scalar(v)) => Value::Scalar(v.cast_to(*ty)),
        (DataObj::Array { ty, .. }, Value::Scalar(v)) => {
            Value::Scalar(v.cast_to(ir.types.array(*ty).elem))
        }
        _ => {
            return Err(GenError::Precondition(
                "declaration initializer does not fit the declared object".into(),
            ))
        }
    };
    match (ir.data_mut(data), val) {
        (DataObj::Scalar { cur, .. }, Value::Scalar(v))
        | (DataObj::Array { cur, .. }, Value::Scalar(v)) => *cur = v,
        _ => unreachable!(),
    }
    Ok(())
}
