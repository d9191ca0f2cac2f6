//! Evaluation context and iteration-space enumeration.
//!
//! An `EvalCtx` pins loop iterators (and, optionally, scalar variables) to
//! concrete values by name. The rebuild driver sweeps the Cartesian product
//! of the surrounding loops' domains, evaluating every statement expression
//! at every point.

use std::collections::HashMap;

use crate::error::GenError;
use crate::ir_value::IrValue;
use crate::types::IntTypeId;

/// Name-keyed value overrides supplied to the evaluator.
#[derive(Debug, Default, Clone)]
pub struct EvalCtx {
    input: HashMap<String, IrValue>,
}

impl EvalCtx {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pin(&mut self, name: &str, val: IrValue) {
        self.input.insert(name.to_string(), val);
    }

    pub fn unpin(&mut self, name: &str) {
        self.input.remove(name);
    }

    pub fn lookup(&self, name: &str) -> Option<IrValue> {
        self.input.get(name).copied()
    }
}

/// One resolved loop dimension: `for (ty name = start; name < end; name += step)`.
#[derive(Debug, Clone)]
pub struct IterDim {
    pub name: String,
    pub ty: IntTypeId,
    pub start: i128,
    pub end: i128,
    pub step: i128,
}

/// Calls `f` once per point of the Cartesian product of `dims`, with the
/// context pinned to that point. Earlier dimensions vary slowest, matching
/// the textual loop nesting order.
pub fn for_each_point<F>(dims: &[IterDim], ctx: &mut EvalCtx, f: &mut F) -> Result<(), GenError>
where
    F: FnMut(&EvalCtx) -> Result<(), GenError>,
{
    match dims.split_first() {
        None => f(ctx),
        Some((dim, rest)) => {
            debug_assert!(dim.step > 0, "loop steps are positive by construction");
            let mut v = dim.start;
            while v < dim.end {
                ctx.pin(&dim.name, IrValue::from_i64(dim.ty, v as i64));
                for_each_point(rest, ctx, f)?;
                v += dim.step;
            }
            ctx.unpin(&dim.name);
            Ok(())
        }
    }
}
