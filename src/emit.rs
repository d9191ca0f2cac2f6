//! Textual emission of expressions and statements.
//!
//! The emitter is a pure pretty-printer: everything it needs is in the IR
//! pool and the statement tree, and its output is deterministic. Operands of
//! unary and binary nodes are always parenthesized, so operator precedence
//! in the target language never matters.

use crate::data::{DataObj, DataId};
use crate::expr::{BinOp, ExprId, ExprKind, Ir, UnaryOp};
use crate::ir_value::IrValue;
use crate::options::StdKind;
use crate::stmt::{Loop, LoopHead, Stmt};
use crate::types::TypeRef;

const INDENT: &str = "    ";

pub struct Emitter<'a> {
    ir: &'a Ir,
    std: StdKind,
}

impl<'a> Emitter<'a> {
    pub fn new(ir: &'a Ir, std: StdKind) -> Self {
        Self { ir, std }
    }

    pub fn expr(&self, id: ExprId, out: &mut String) {
        match self.ir.kind(id) {
            ExprKind::Constant(v) => self.literal(v, out),
            ExprKind::ScalarUse(d) | ExprKind::ArrayUse(d) | ExprKind::IterUse(d) => {
                out.push_str(self.ir.data(d).name());
            }
            ExprKind::Cast { arg, to, implicit } => {
                out.push_str("((");
                if implicit {
                    out.push_str("/* implicit */");
                }
                out.push_str(&self.type_name(to));
                out.push_str(") ");
                self.expr(arg, out);
                out.push(')');
            }
            ExprKind::Unary { op, arg } => {
                out.push('(');
                out.push_str(unary_str(op));
                out.push('(');
                self.expr(arg, out);
                out.push_str("))");
            }
            ExprKind::Binary { op, lhs, rhs } => {
                out.push_str("((");
                self.expr(lhs, out);
                out.push_str(") ");
                out.push_str(binary_str(op));
                out.push_str(" (");
                self.expr(rhs, out);
                out.push_str("))");
            }
            ExprKind::Subscript { array, idx, .. } => {
                self.expr(array, out);
                out.push('[');
                self.expr(idx, out);
                out.push(']');
            }
            ExprKind::Assign { to, from, .. } => {
                self.expr(to, out);
                out.push_str(" = ");
                self.expr(from, out);
            }
        }
    }

    /// A constant with its literal suffix. The minimum of a signed type has
    /// no literal of its own, so it is spelled `(MIN+1 - 1)`.
    pub fn literal(&self, v: IrValue, out: &mut String) {
        let ty = v.type_id();
        let suffix = ty.literal_suffix();
        if ty.is_signed() && v == IrValue::min_of(ty) {
            let min_plus_one = IrValue::from_i64(ty, (ty.min_i128() + 1) as i64);
            out.push_str(&format!("({min_plus_one}{suffix} - 1{suffix})"));
        } else {
            out.push_str(&format!("{v}{suffix}"));
        }
    }

    pub fn type_name(&self, ty: TypeRef) -> String {
        match ty {
            TypeRef::Int(t) => t.name(self.std).to_string(),
            TypeRef::Array(a) => {
                let arr = self.ir.types.array(a);
                let mut name = arr.elem.name(self.std).to_string();
                for d in &arr.dims {
                    name.push_str(&format!(" [{d}]"));
                }
                name
            }
        }
    }

    pub fn stmt(&self, stmt: &Stmt, out: &mut String, offset: &str) {
        match stmt {
            Stmt::Expr(e) => {
                out.push_str(offset);
                self.expr(*e, out);
                out.push_str(";\n");
            }
            Stmt::Decl { data, init } => self.decl(*data, *init, out, offset),
            Stmt::Block(stmts) => {
                for s in stmts {
                    self.stmt(s, out, offset);
                }
            }
            Stmt::Scope(stmts) => {
                out.push_str(offset);
                out.push_str("{\n");
                let inner = format!("{offset}{INDENT}");
                for s in stmts {
                    self.stmt(s, out, &inner);
                }
                out.push_str(offset);
                out.push_str("}\n");
            }
            Stmt::LoopSeq(loops) => {
                for Loop { head, body } in loops {
                    self.one_loop(head, body, out, offset);
                }
            }
            Stmt::LoopNest { heads, body } => self.nest(heads, body, out, offset),
            Stmt::Stub(text) => {
                out.push_str(offset);
                out.push_str(text);
                out.push('\n');
            }
        }
    }

    pub fn decl(&self, data: DataId, init: Option<ExprId>, out: &mut String, offset: &str) {
        out.push_str(offset);
        match self.ir.data(data) {
            DataObj::Scalar { name, ty, cur } => {
                out.push_str(ty.name(self.std));
                out.push(' ');
                out.push_str(name);
                out.push_str(" = ");
                match init {
                    Some(e) => self.expr(e, out),
                    None => self.literal(*cur, out),
                }
                out.push_str(";\n");
            }
            DataObj::Array { name, ty, .. } => {
                let arr = self.ir.types.array(*ty);
                out.push_str(arr.elem.name(self.std));
                out.push(' ');
                out.push_str(name);
                for d in &arr.dims {
                    out.push_str(&format!(" [{d}]"));
                }
                out.push_str(";\n");
            }
            DataObj::Iter { name, ty, .. } => {
                out.push_str(ty.name(self.std));
                out.push(' ');
                out.push_str(name);
                out.push_str(";\n");
            }
        }
    }

    fn one_loop(&self, head: &LoopHead, body: &[Stmt], out: &mut String, offset: &str) {
        for s in &head.prefix {
            self.stmt(s, out, offset);
        }
        self.header(head, out, offset);
        let inner = format!("{offset}{INDENT}");
        for s in body {
            self.stmt(s, out, &inner);
        }
        out.push_str(offset);
        out.push_str("}\n");
        for s in &head.suffix {
            self.stmt(s, out, offset);
        }
    }

    fn nest(&self, heads: &[LoopHead], body: &[Stmt], out: &mut String, offset: &str) {
        match heads.split_first() {
            None => {
                for s in body {
                    self.stmt(s, out, offset);
                }
            }
            Some((head, rest)) => {
                for s in &head.prefix {
                    self.stmt(s, out, offset);
                }
                self.header(head, out, offset);
                self.nest(rest, body, out, &format!("{offset}{INDENT}"));
                out.push_str(offset);
                out.push_str("}\n");
                for s in &head.suffix {
                    self.stmt(s, out, offset);
                }
            }
        }
    }

    /// `for (T i = start, j = start; i < end; i += step, j += step) {`
    fn header(&self, head: &LoopHead, out: &mut String, offset: &str) {
        out.push_str(offset);
        out.push_str("for (");
        let mut iters = head.iters.iter().filter_map(|&d| match self.ir.data(d) {
            DataObj::Iter { name, ty, start, end, step } => {
                Some((name.clone(), *ty, *start, *end, *step))
            }
            _ => None,
        });
        let first = iters.next().expect("loop heads declare at least one iterator");
        let rest: Vec<_> = iters.collect();

        out.push_str(first.1.name(self.std));
        out.push(' ');
        out.push_str(&first.0);
        out.push_str(" = ");
        self.expr(first.2, out);
        for (name, _, start, _, _) in &rest {
            out.push_str(", ");
            out.push_str(name);
            out.push_str(" = ");
            self.expr(*start, out);
        }
        out.push_str("; ");
        out.push_str(&first.0);
        out.push_str(" < ");
        self.expr(first.3, out);
        out.push_str("; ");
        out.push_str(&first.0);
        out.push_str(" += ");
        self.expr(first.4, out);
        for (name, _, _, _, step) in &rest {
            out.push_str(", ");
            out.push_str(name);
            out.push_str(" += ");
            self.expr(*step, out);
        }
        out.push_str(") {\n");
    }
}

fn unary_str(op: UnaryOp) -> &'static str {
    match op {
        UnaryOp::Plus => "+",
        UnaryOp::Negate => "-",
        UnaryOp::LogNot => "!",
        UnaryOp::BitNot => "~",
    }
}

fn binary_str(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Div => "/",
        BinOp::Mod => "%",
        BinOp::Lt => "<",
        BinOp::Gt => ">",
        BinOp::Le => "<=",
        BinOp::Ge => ">=",
        BinOp::Eq => "==",
        BinOp::Ne => "!=",
        BinOp::LogAnd => "&&",
        BinOp::LogOr => "||",
        BinOp::BitAnd => "&",
        BinOp::BitOr => "|",
        BinOp::BitXor => "^",
        BinOp::Shl => "<<",
        BinOp::Shr => ">>",
    }
}
