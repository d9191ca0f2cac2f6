//! Structure generation and population.
//!
//! The structure pass lays out loop sequences, perfect nests and scopes and
//! declares their iterators; the population pass fills every expression slot
//! with a random assignment over the visible data. Neither pass tries to
//! avoid UB: indices may run past extents and arithmetic may overflow, and
//! the rebuilder repairs all of it afterwards.

use crate::data::{DataId, DataObj};
use crate::error::GenError;
use crate::expr::{ExprId, Ir};
use crate::ir_value::IrValue;
use crate::options::Options;
use crate::policy::{ExprChoice, GenPolicy};
use crate::rng::RandGen;
use crate::stmt::{Loop, LoopHead, Stmt};
use crate::sym_table::SymTable;
use crate::types::IntTypeId;

pub struct GenCtx {
    pub ir: Ir,
    pub rng: RandGen,
    pub policy: GenPolicy,
    pub opts: Options,
    ext_inp: SymTable,
    ext_out: SymTable,
    iter_stack: Vec<DataId>,
    var_count: u64,
    arr_count: u64,
    iter_count: u64,
}

impl GenCtx {
    pub fn new(opts: Options, seed: u64) -> Self {
        Self {
            ir: Ir::new(),
            rng: RandGen::new(seed),
            policy: GenPolicy::default(),
            opts,
            ext_inp: SymTable::new(),
            ext_out: SymTable::new(),
            iter_stack: Vec::new(),
            var_count: 0,
            arr_count: 0,
            iter_count: 0,
        }
    }

    /// Data the generated code may read.
    pub fn ext_in_sym_table(&self) -> &SymTable {
        &self.ext_inp
    }

    /// Data the generated code may write.
    pub fn ext_out_sym_table(&self) -> &SymTable {
        &self.ext_out
    }

    /// Declares the external input variables and arrays with random types
    /// and initial values.
    pub fn seed_inputs(&mut self) {
        for _ in 0..self.policy.input_vars {
            let ty = *self.rng.pick_weighted(&self.policy.int_type_distr);
            let val = self.random_value(ty);
            let name = self.fresh_var_name();
            let d = self.ir.new_scalar(name, ty, val);
            self.ext_inp.add_var(d);
        }
        for _ in 0..self.policy.input_arrays {
            let elem = *self.rng.pick_weighted(&self.policy.int_type_distr);
            let ndims = self.rng.rand_range(1, self.policy.max_array_dims);
            let dims = (0..ndims)
                .map(|_| {
                    self.rng
                        .rand_range(self.policy.min_array_size, self.policy.max_array_size)
                })
                .collect();
            let ty = self.ir.types.array_type(elem, dims);
            let val = self.random_value(elem);
            let name = format!("arr_{}", self.arr_count);
            self.arr_count += 1;
            let d = self.ir.new_array(name, ty, val);
            self.ext_inp.add_array(d);
            self.ext_out.add_array(d);
        }
    }

    /// Builds the populated statement tree of the test function body.
    pub fn generate_body(&mut self) -> Result<Vec<Stmt>, GenError> {
        self.gen_scope(0)
    }

    fn gen_scope(&mut self, depth: u64) -> Result<Vec<Stmt>, GenError> {
        let count = self.rng.rand_range(self.policy.min_stmts, self.policy.max_stmts);
        let mut stmts = Vec::new();
        for _ in 0..count {
            if depth < self.policy.max_loop_depth && self.rng.chance(40, 100) {
                if depth == 0 && self.rng.chance(40, 100) {
                    stmts.push(self.gen_loop_nest(depth)?);
                } else {
                    stmts.push(self.gen_loop_seq(depth)?);
                }
            } else {
                stmts.push(self.gen_assign()?);
            }
        }
        Ok(stmts)
    }

    fn gen_loop_seq(&mut self, depth: u64) -> Result<Stmt, GenError> {
        let count = self.rng.rand_range(1, self.policy.max_loop_seq);
        let mut loops = Vec::new();
        for _ in 0..count {
            let iter = self.new_iterator();
            self.iter_stack.push(iter);
            let body = self.gen_scope(depth + 1)?;
            self.iter_stack.pop();
            loops.push(Loop { head: LoopHead::new(vec![iter]), body });
        }
        Ok(Stmt::LoopSeq(loops))
    }

    fn gen_loop_nest(&mut self, depth: u64) -> Result<Stmt, GenError> {
        let levels = self.rng.rand_range(2, self.policy.max_nest_depth);
        let mut heads = Vec::new();
        for _ in 0..levels {
            let iter = self.new_iterator();
            self.iter_stack.push(iter);
            heads.push(LoopHead::new(vec![iter]));
        }
        let body = self.gen_scope(depth + levels)?;
        for _ in 0..levels {
            self.iter_stack.pop();
        }
        Ok(Stmt::LoopNest { heads, body })
    }

    /// Canonical counted loop: `for (int i_N = 0; i_N < end; i_N += 1)`.
    /// Positive step and a start at zero keep the iterator-range analysis'
    /// precondition satisfied by construction.
    fn new_iterator(&mut self) -> DataId {
        let name = format!("i_{}", self.iter_count);
        self.iter_count += 1;
        let end = self.rng.rand_range(self.policy.min_iters, self.policy.max_iters);
        let start = self.ir.constant(IrValue::zero(IntTypeId::Int));
        let end = self.ir.constant(IrValue::from_u64(IntTypeId::Int, end));
        let step = self.ir.constant(IrValue::from_u64(IntTypeId::Int, 1));
        self.ir.new_iter(name, IntTypeId::Int, start, end, step)
    }

    fn gen_assign(&mut self) -> Result<Stmt, GenError> {
        let to = if !self.ext_out.arrays().is_empty()
            && self.rng.chance(self.policy.array_dest_prob, 100)
        {
            self.gen_array_ref()?
        } else {
            let reuse = !self.ext_out.vars().is_empty()
                && self.rng.chance(self.policy.reuse_out_var_prob, 100);
            let d = if reuse {
                let vars = self.ext_out.vars();
                vars[self.rng.rand_range(0, vars.len() as u64 - 1) as usize]
            } else {
                self.new_out_var()
            };
            self.ir.scalar_use(d)?
        };
        let from = self.gen_expr(0)?;
        let taken =
            !(self.opts.allow_dead_data && self.rng.chance(self.policy.dead_assign_prob, 100));
        let assign = self.ir.assign(to, from, taken)?;
        Ok(Stmt::Expr(assign))
    }

    fn new_out_var(&mut self) -> DataId {
        let ty = *self.rng.pick_weighted(&self.policy.int_type_distr);
        let name = self.fresh_var_name();
        let d = self.ir.new_scalar(name, ty, IrValue::zero(ty));
        self.ext_out.add_var(d);
        d
    }

    fn gen_expr(&mut self, depth: u64) -> Result<ExprId, GenError> {
        let leaf_only = depth >= self.policy.max_depth;
        let have_iters = !self.iter_stack.is_empty();
        let have_arrays = !self.ext_inp.arrays().is_empty();
        let table: Vec<(ExprChoice, u32)> = self
            .policy
            .expr_distr
            .iter()
            .copied()
            .filter(|(c, _)| match c {
                ExprChoice::Constant | ExprChoice::ScalarVar => true,
                ExprChoice::Iter => have_iters,
                ExprChoice::ArrayElem => have_arrays,
                ExprChoice::Unary | ExprChoice::Binary => !leaf_only,
            })
            .collect();
        match *self.rng.pick_weighted(&table) {
            ExprChoice::Constant => Ok(self.gen_constant()),
            ExprChoice::ScalarVar => self.gen_scalar_read(),
            ExprChoice::Iter => {
                let iters = &self.iter_stack;
                let d = iters[self.rng.rand_range(0, iters.len() as u64 - 1) as usize];
                self.ir.iter_use(d)
            }
            ExprChoice::ArrayElem => self.gen_array_ref(),
            ExprChoice::Unary => {
                let op = *self.rng.pick_weighted(&self.policy.unary_op_distr);
                let arg = self.gen_expr(depth + 1)?;
                self.ir.unary(op, arg)
            }
            ExprChoice::Binary => {
                let op = *self.rng.pick_weighted(&self.policy.binary_op_distr);
                let lhs = self.gen_expr(depth + 1)?;
                let rhs = self.gen_expr(depth + 1)?;
                self.ir.binary(op, lhs, rhs)
            }
        }
    }

    fn gen_constant(&mut self) -> ExprId {
        let ty = *self.rng.pick_weighted(&self.policy.int_type_distr);
        let val = self.random_value(ty);
        self.ir.constant(val)
    }

    fn gen_scalar_read(&mut self) -> Result<ExprId, GenError> {
        let inp_len = self.ext_inp.vars().len();
        let total = inp_len + self.ext_out.vars().len();
        let k = self.rng.rand_range(0, total as u64 - 1) as usize;
        let d = if k < inp_len {
            self.ext_inp.vars()[k]
        } else {
            self.ext_out.vars()[k - inp_len]
        };
        self.ir.scalar_use(d)
    }

    /// A fully subscripted element of a random array.
    fn gen_array_ref(&mut self) -> Result<ExprId, GenError> {
        let arrays = self.ext_inp.arrays();
        let d = arrays[self.rng.rand_range(0, arrays.len() as u64 - 1) as usize];
        let aty = match self.ir.data(d) {
            DataObj::Array { ty, .. } => *ty,
            _ => unreachable!("input table holds only arrays in its array list"),
        };
        let dims = self.ir.types.array(aty).dims.clone();
        let mut expr = self.ir.array_use(d)?;
        for extent in dims {
            let idx = self.gen_index(extent)?;
            expr = self.ir.subscript(expr, idx)?;
        }
        Ok(expr)
    }

    /// Indices stay non-negative but may run past the extent; the rebuilder
    /// wraps them with a modulus when they do.
    fn gen_index(&mut self, extent: u64) -> Result<ExprId, GenError> {
        if !self.iter_stack.is_empty() && self.rng.chance(70, 100) {
            let iters = &self.iter_stack;
            let d = iters[self.rng.rand_range(0, iters.len() as u64 - 1) as usize];
            self.ir.iter_use(d)
        } else {
            let v = self.rng.rand_range(0, extent + extent / 2);
            Ok(self.ir.constant(IrValue::from_u64(IntTypeId::Int, v)))
        }
    }

    fn random_value(&mut self, ty: IntTypeId) -> IrValue {
        if self.rng.chance(25, 100) {
            match self.rng.rand_range(0, 3) {
                0 => IrValue::zero(ty),
                1 => IrValue::from_u64(ty, 1),
                2 => IrValue::min_of(ty),
                _ => IrValue::max_of(ty),
            }
        } else {
            IrValue::from_u64(ty, self.rng.rand_range(0, u64::MAX))
        }
    }

    fn fresh_var_name(&mut self) -> String {
        let name = format!("var_{}", self.var_count);
        self.var_count += 1;
        name
    }
}

#[cfg(test)]
mod tests;
