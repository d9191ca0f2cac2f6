//! Whole-program driver: generation pipeline plus final emission.
//!
//! The pipeline is structure generation, population, type propagation, the
//! iteration-space rebuild, and emission of one self-contained source file.
//! The emitted program runs the generated test function once and prints a
//! checksum over every writable object, which a differential harness can
//! compare across compilers.

use log::info;

use crate::data::{DataId, DataObj};
use crate::emit::Emitter;
use crate::error::GenError;
use crate::generate::GenCtx;
use crate::options::{Options, StdKind};
use crate::stmt::{propagate_types, rebuild_program, Stmt};

pub struct ProgramGenerator {
    ctx: GenCtx,
    body: Vec<Stmt>,
    seed: u64,
}

impl ProgramGenerator {
    pub fn new(opts: Options, seed: u64) -> Self {
        Self { ctx: GenCtx::new(opts, seed), body: Vec::new(), seed }
    }

    /// Runs the full generation pipeline. Afterwards every expression in the
    /// body evaluates without UB at every point of its iteration space.
    pub fn generate(&mut self) -> Result<(), GenError> {
        self.ctx.seed_inputs();
        self.body = self.ctx.generate_body()?;
        propagate_types(&mut self.ctx.ir, &self.body)?;
        rebuild_program(&mut self.ctx.ir, &self.body, &mut self.ctx.rng)?;
        info!(
            "generated {} top-level statements, {} repairs applied",
            self.body.len(),
            self.ctx.ir.repair_count()
        );
        Ok(())
    }

    pub fn body(&self) -> &[Stmt] {
        &self.body
    }

    /// Replays the rebuild walk and reports how many repairs it still needed.
    /// Zero after a successful `generate`: the program is stable.
    pub fn verify_ub_free(&mut self) -> Result<u64, GenError> {
        let before = self.ctx.ir.repair_count();
        rebuild_program(&mut self.ctx.ir, &self.body, &mut self.ctx.rng)?;
        Ok(self.ctx.ir.repair_count() - before)
    }

    pub fn ctx(&self) -> &GenCtx {
        &self.ctx
    }

    pub fn ctx_mut(&mut self) -> &mut GenCtx {
        &mut self.ctx
    }

    /// Serializes the complete program for the selected dialect.
    pub fn emit(&self) -> String {
        let std = self.ctx.opts.std;
        let ir = &self.ctx.ir;
        let e = Emitter::new(ir, std);
        let mut out = String::new();

        let dialect = match std {
            StdKind::Cxx => "c++",
            StdKind::Ispc => "ispc",
            StdKind::Sycl => "sycl",
        };
        out.push_str(&format!(
            "/* This file was generated with seed {} for the {} dialect. */\n",
            self.seed, dialect
        ));
        if matches!(std, StdKind::Cxx | StdKind::Sycl) {
            out.push_str("#include <cstdio>\n");
        }
        out.push('\n');

        let csum_ty = match std {
            StdKind::Cxx | StdKind::Sycl => "unsigned long long int",
            StdKind::Ispc => "unsigned int64",
        };
        let csum_suffix = if std == StdKind::Ispc { "" } else { "ULL" };
        out.push_str(&format!("static {csum_ty} csum = 0{csum_suffix};\n\n"));
        out.push_str(&format!(
            "static void update_csum({csum_ty} v) {{\n    csum = csum * 1000000007{csum_suffix} + v;\n}}\n\n"
        ));

        for &d in self.ctx.ext_in_sym_table().vars() {
            e.decl(d, None, &mut out, "");
        }
        for &d in self.ctx.ext_out_sym_table().vars() {
            e.decl(d, None, &mut out, "");
        }
        for &d in self.ctx.ext_in_sym_table().arrays() {
            e.decl(d, None, &mut out, "");
        }
        out.push('\n');

        out.push_str("static void init_arrays() {\n");
        for &d in self.ctx.ext_in_sym_table().arrays() {
            self.array_loops(&e, d, &mut out, ArrayLoopKind::Fill);
        }
        out.push_str("}\n\n");

        out.push_str("static void test() {\n");
        for stmt in &self.body {
            e.stmt(stmt, &mut out, "    ");
        }
        out.push_str("}\n\n");

        out.push_str("static void checksum() {\n");
        for &d in self.ctx.ext_out_sym_table().vars() {
            out.push_str(&format!(
                "    update_csum(({csum_ty}) {});\n",
                ir.data(d).name()
            ));
        }
        for &d in self.ctx.ext_out_sym_table().arrays() {
            self.array_loops(&e, d, &mut out, ArrayLoopKind::Hash { csum_ty });
        }
        out.push_str("}\n\n");

        match std {
            StdKind::Cxx | StdKind::Sycl => {
                out.push_str(
                    "int main() {\n    init_arrays();\n    test();\n    checksum();\n    \
                     printf(\"checksum = %llu\\n\", csum);\n    return 0;\n}\n",
                );
            }
            StdKind::Ispc => {
                out.push_str(
                    "export void run_test() {\n    init_arrays();\n    test();\n    checksum();\n    \
                     print(\"checksum = %\\n\", csum);\n}\n",
                );
            }
        }
        out
    }

    /// Emits one counted loop per dimension around either an element fill or
    /// an element checksum update.
    fn array_loops(&self, e: &Emitter<'_>, d: DataId, out: &mut String, kind: ArrayLoopKind) {
        let ir = &self.ctx.ir;
        let (name, ty, cur) = match ir.data(d) {
            DataObj::Array { name, ty, cur } => (name.clone(), *ty, *cur),
            _ => return,
        };
        let dims = ir.types.array(ty).dims.clone();
        let mut offset = String::from("    ");
        for (level, extent) in dims.iter().enumerate() {
            out.push_str(&format!(
                "{offset}for (int f{level} = 0; f{level} < {extent}; ++f{level}) {{\n"
            ));
            offset.push_str("    ");
        }
        let mut element = name;
        for level in 0..dims.len() {
            element.push_str(&format!("[f{level}]"));
        }
        match kind {
            ArrayLoopKind::Fill => {
                out.push_str(&format!("{offset}{element} = "));
                e.literal(cur, out);
                out.push_str(";\n");
            }
            ArrayLoopKind::Hash { csum_ty } => {
                out.push_str(&format!("{offset}update_csum(({csum_ty}) {element});\n"));
            }
        }
        for _ in 0..dims.len() {
            offset.truncate(offset.len() - 4);
            out.push_str(&format!("{offset}}}\n"));
        }
    }
}

enum ArrayLoopKind {
    Fill,
    Hash { csum_ty: &'static str },
}
