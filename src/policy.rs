//! Generation policy: the weight tables and size limits the structure
//! generator and populator draw from.
//!
//! Weights are relative; a zero weight disables a choice outright.

use crate::expr::{BinOp, UnaryOp};
use crate::types::IntTypeId;

/// Which kind of node to grow at an expression position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExprChoice {
    Constant,
    ScalarVar,
    Iter,
    ArrayElem,
    Unary,
    Binary,
}

#[derive(Debug, Clone)]
pub struct GenPolicy {
    pub unary_op_distr: Vec<(UnaryOp, u32)>,
    pub binary_op_distr: Vec<(BinOp, u32)>,
    pub expr_distr: Vec<(ExprChoice, u32)>,
    pub int_type_distr: Vec<(IntTypeId, u32)>,

    /// Expression tree depth limit.
    pub max_depth: u64,
    /// Statements per scope.
    pub min_stmts: u64,
    pub max_stmts: u64,
    /// Nesting depth of loop structures.
    pub max_loop_depth: u64,
    /// Sibling loops in a loop sequence.
    pub max_loop_seq: u64,
    /// Headers in a perfect loop nest.
    pub max_nest_depth: u64,
    /// Iteration counts of generated loops.
    pub min_iters: u64,
    pub max_iters: u64,
    /// External input variables and arrays seeded before generation.
    pub input_vars: u64,
    pub input_arrays: u64,
    /// Array dimensionality and extents.
    pub max_array_dims: u64,
    pub min_array_size: u64,
    pub max_array_size: u64,
    /// Out of 100: pick an existing output variable over a fresh one.
    pub reuse_out_var_prob: u32,
    /// Out of 100: destination is an array element rather than a scalar.
    pub array_dest_prob: u32,
    /// Out of 100: emit an assignment that is dead for value propagation.
    /// Only honored when dead data is allowed by options.
    pub dead_assign_prob: u32,
}

impl Default for GenPolicy {
    fn default() -> Self {
        Self {
            unary_op_distr: vec![
                (UnaryOp::Plus, 10),
                (UnaryOp::Negate, 35),
                (UnaryOp::LogNot, 15),
                (UnaryOp::BitNot, 25),
            ],
            binary_op_distr: vec![
                (BinOp::Add, 40),
                (BinOp::Sub, 40),
                (BinOp::Mul, 30),
                (BinOp::Div, 15),
                (BinOp::Mod, 15),
                (BinOp::Lt, 10),
                (BinOp::Gt, 10),
                (BinOp::Le, 10),
                (BinOp::Ge, 10),
                (BinOp::Eq, 10),
                (BinOp::Ne, 10),
                (BinOp::LogAnd, 10),
                (BinOp::LogOr, 10),
                (BinOp::BitAnd, 15),
                (BinOp::BitOr, 15),
                (BinOp::BitXor, 15),
                (BinOp::Shl, 15),
                (BinOp::Shr, 15),
            ],
            expr_distr: vec![
                (ExprChoice::Constant, 15),
                (ExprChoice::ScalarVar, 25),
                (ExprChoice::Iter, 15),
                (ExprChoice::ArrayElem, 15),
                (ExprChoice::Unary, 10),
                (ExprChoice::Binary, 45),
            ],
            int_type_distr: vec![
                (IntTypeId::Bool, 5),
                (IntTypeId::SChar, 10),
                (IntTypeId::UChar, 10),
                (IntTypeId::Short, 10),
                (IntTypeId::UShort, 10),
                (IntTypeId::Int, 25),
                (IntTypeId::Uint, 25),
                (IntTypeId::LLong, 15),
                (IntTypeId::ULLong, 15),
            ],
            max_depth: 5,
            min_stmts: 2,
            max_stmts: 5,
            max_loop_depth: 2,
            max_loop_seq: 3,
            max_nest_depth: 3,
            min_iters: 4,
            max_iters: 16,
            input_vars: 8,
            input_arrays: 3,
            max_array_dims: 2,
            min_array_size: 4,
            max_array_size: 16,
            reuse_out_var_prob: 40,
            array_dest_prob: 25,
            dead_assign_prob: 10,
        }
    }
}
