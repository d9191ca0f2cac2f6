use super::*;

use crate::options::Options;
use crate::stmt::{propagate_types, rebuild_program};

fn generated_ctx(seed: u64) -> (GenCtx, Vec<Stmt>) {
    let mut ctx = GenCtx::new(Options::default(), seed);
    ctx.seed_inputs();
    let body = ctx.generate_body().unwrap();
    (ctx, body)
}

#[test]
fn test_inputs_are_seeded_with_unique_names() {
    let mut ctx = GenCtx::new(Options::default(), 5);
    ctx.seed_inputs();
    let inp = ctx.ext_in_sym_table();
    assert_eq!(inp.vars().len() as u64, ctx.policy.input_vars);
    assert_eq!(inp.arrays().len() as u64, ctx.policy.input_arrays);

    let mut names: Vec<_> = inp
        .vars()
        .iter()
        .chain(inp.arrays())
        .map(|&d| ctx.ir.data(d).name().to_string())
        .collect();
    names.sort();
    names.dedup();
    assert_eq!(names.len(), (ctx.policy.input_vars + ctx.policy.input_arrays) as usize);
}

#[test]
fn test_arrays_are_writable_and_readable() {
    let mut ctx = GenCtx::new(Options::default(), 5);
    ctx.seed_inputs();
    assert_eq!(
        ctx.ext_in_sym_table().arrays(),
        ctx.ext_out_sym_table().arrays()
    );
}

#[test]
fn test_generated_body_rebuilds_clean() {
    for seed in [0, 1, 2, 3, 4, 99, 12345] {
        let (mut ctx, body) = generated_ctx(seed);
        propagate_types(&mut ctx.ir, &body).unwrap();
        rebuild_program(&mut ctx.ir, &body, &mut ctx.rng).unwrap();

        // A second walk finds nothing left to repair.
        let before = ctx.ir.repair_count();
        rebuild_program(&mut ctx.ir, &body, &mut ctx.rng).unwrap();
        assert_eq!(ctx.ir.repair_count(), before, "seed {seed} left UB behind");
    }
}

#[test]
fn test_generation_is_deterministic_per_seed() {
    let (mut a_ctx, a_body) = generated_ctx(42);
    let (mut b_ctx, b_body) = generated_ctx(42);
    propagate_types(&mut a_ctx.ir, &a_body).unwrap();
    propagate_types(&mut b_ctx.ir, &b_body).unwrap();
    rebuild_program(&mut a_ctx.ir, &a_body, &mut a_ctx.rng).unwrap();
    rebuild_program(&mut b_ctx.ir, &b_body, &mut b_ctx.rng).unwrap();

    use crate::emit::Emitter;
    use crate::options::StdKind;
    let mut a_text = String::new();
    let mut b_text = String::new();
    let ae = Emitter::new(&a_ctx.ir, StdKind::Cxx);
    let be = Emitter::new(&b_ctx.ir, StdKind::Cxx);
    for s in &a_body {
        ae.stmt(s, &mut a_text, "");
    }
    for s in &b_body {
        be.stmt(s, &mut b_text, "");
    }
    assert_eq!(a_text, b_text);
}

#[test]
fn test_dead_assignments_only_with_option() {
    let (ctx, body) = generated_ctx(11);
    assert!(!ctx.opts.allow_dead_data);
    fn count_untaken(ctx: &GenCtx, stmts: &[Stmt]) -> usize {
        let mut n = 0;
        for s in stmts {
            match s {
                Stmt::Expr(e) => {
                    if let crate::expr::ExprKind::Assign { taken: false, .. } = ctx.ir.kind(*e) {
                        n += 1;
                    }
                }
                Stmt::Block(inner) | Stmt::Scope(inner) => n += count_untaken(ctx, inner),
                Stmt::LoopSeq(loops) => {
                    for l in loops {
                        n += count_untaken(ctx, &l.body);
                    }
                }
                Stmt::LoopNest { body, .. } => n += count_untaken(ctx, body),
                _ => {}
            }
        }
        n
    }
    assert_eq!(count_untaken(&ctx, &body), 0);
}
