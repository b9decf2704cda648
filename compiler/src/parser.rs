// Parser for .tir textual IR.
//
// Parses a token stream (from the lexer) into a raw statement tree with
// chumsky combinators, then binds it into the arena IR: value names resolve
// to ValueIds, op names to kinds, result types are inferred where the
// textual form omits them.
//
// Preconditions: input is a valid token stream from `lexer::lex()`.
// Postconditions: returns a bound Module, or diagnostics describing why not.
// Failure modes: syntax errors produce `Rich` diagnostics; binding errors
//   (unknown value/op names, missing type annotations) produce E0301.
// Side effects: none.

use std::collections::HashMap;

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;
use chumsky::span::SimpleSpan;

use crate::diag::{codes, DiagLevel, Diagnostic, Span};
use crate::ir::{Attr, ElemType, FuncBody, Module, OpKind, RegionRef, Type};
use crate::lexer::Token;

/// Result of parsing: a bound module plus any diagnostics. `module` is
/// `None` whenever diagnostics contain an error.
#[derive(Debug)]
pub struct ParseResult {
    pub module: Option<Module>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Parse a .tir source string. Lexes, parses, then binds.
pub fn parse(source: &str) -> ParseResult {
    let lex_result = crate::lexer::lex(source);
    let len = source.len();

    let mut diagnostics: Vec<Diagnostic> = lex_result
        .errors
        .iter()
        .map(|e| {
            Diagnostic::new(DiagLevel::Error, e.span, e.message.clone())
                .with_code(codes::PARSE_ERROR)
        })
        .collect();

    let token_iter = lex_result.tokens.into_iter().map(|(tok, span)| {
        let cspan: SimpleSpan = (span.start..span.end).into();
        (tok, cspan)
    });
    let eoi: SimpleSpan = (len..len).into();
    let stream = Stream::from_iter(token_iter).map(eoi, |(t, s): (_, _)| (t, s));

    let (raw_funcs, parse_errors) = module_parser().parse(stream).into_output_errors();
    diagnostics.extend(parse_errors.into_iter().map(|e| {
        let span = Span::new(e.span().start(), e.span().end());
        Diagnostic::new(DiagLevel::Error, span, e.to_string()).with_code(codes::PARSE_ERROR)
    }));

    let module = raw_funcs.map(|funcs| bind_module(funcs, &mut diagnostics));

    let has_errors = diagnostics.iter().any(|d| d.level == DiagLevel::Error);
    ParseResult {
        module: if has_errors { None } else { module },
        diagnostics,
    }
}

// ── Raw statement tree ──────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct RawFunc {
    name: String,
    args: Vec<(String, Type)>,
    body: Vec<RawStmt>,
}

#[derive(Debug, Clone)]
enum RawArg {
    Value(String),
    Num(f64),
}

#[derive(Debug, Clone)]
enum RawStmt {
    Assign {
        dest: String,
        op: String,
        args: Vec<RawArg>,
        ty: Option<Type>,
        span: SimpleSpan,
    },
    Exec {
        op: String,
        args: Vec<RawArg>,
        span: SimpleSpan,
    },
    For {
        iv: String,
        lower: String,
        upper: String,
        step: String,
        body: Vec<RawStmt>,
        span: SimpleSpan,
    },
}

// ── Parser ──────────────────────────────────────────────────────────────────

fn module_parser<'tokens, I>(
) -> impl Parser<'tokens, I, Vec<RawFunc>, extra::Err<Rich<'tokens, Token, SimpleSpan>>>
where
    I: ValueInput<'tokens, Token = Token, Span = SimpleSpan>,
{
    let vref = select! { Token::ValueRef(name) => name };
    let ident = select! { Token::Ident(name) => name };
    let num = select! { Token::Number(n) => n };
    let ty = select! { Token::Ty(t) => t };

    let raw_arg = vref.map(RawArg::Value).or(num.map(RawArg::Num));
    let arg_list = raw_arg
        .separated_by(just(Token::Comma))
        .collect::<Vec<_>>();

    let stmt = recursive(|stmt| {
        let assign = vref
            .then_ignore(just(Token::Equals))
            .then(ident)
            .then(arg_list.clone())
            .then(just(Token::Colon).ignore_then(ty).or_not())
            .map_with(|(((dest, op), args), ty), e| RawStmt::Assign {
                dest,
                op,
                args,
                ty,
                span: e.span(),
            });

        // store/fill/return are keywords; other no-result ops (matmul_acc)
        // come through as idents.
        let exec_name = select! {
            Token::Store => "store".to_string(),
            Token::Fill => "fill".to_string(),
            Token::Return => "return".to_string(),
        }
        .or(ident);
        let exec = exec_name
            .then(arg_list.clone())
            .map_with(|(op, args), e| RawStmt::Exec {
                op,
                args,
                span: e.span(),
            });

        let for_stmt = just(Token::For)
            .ignore_then(vref)
            .then_ignore(just(Token::Equals))
            .then(vref)
            .then_ignore(just(Token::To))
            .then(vref)
            .then_ignore(just(Token::Step))
            .then(vref)
            .then(
                stmt.repeated()
                    .collect::<Vec<_>>()
                    .delimited_by(just(Token::LBrace), just(Token::RBrace)),
            )
            .map_with(|((((iv, lower), upper), step), body), e| RawStmt::For {
                iv,
                lower,
                upper,
                step,
                body,
                span: e.span(),
            });

        for_stmt.or(assign).or(exec)
    });

    let param = vref.then_ignore(just(Token::Colon)).then(ty);
    let func = just(Token::Func)
        .ignore_then(select! { Token::FuncName(name) => name })
        .then(
            param
                .separated_by(just(Token::Comma))
                .collect::<Vec<_>>()
                .delimited_by(just(Token::LParen), just(Token::RParen)),
        )
        .then(
            stmt.repeated()
                .collect::<Vec<_>>()
                .delimited_by(just(Token::LBrace), just(Token::RBrace)),
        )
        .map(|((name, args), body)| RawFunc { name, args, body });

    func.repeated().at_least(1).collect::<Vec<_>>()
}

// ── Binder ──────────────────────────────────────────────────────────────────

fn to_span(span: SimpleSpan) -> Span {
    Span::new(span.start(), span.end())
}

fn bind_module(funcs: Vec<RawFunc>, diagnostics: &mut Vec<Diagnostic>) -> Module {
    let mut module = Module::default();
    for raw in funcs {
        module.funcs.push(bind_func(raw, diagnostics));
    }
    module
}

fn bind_func(raw: RawFunc, diagnostics: &mut Vec<Diagnostic>) -> FuncBody {
    let mut func = FuncBody::new(raw.name);
    let mut env: HashMap<String, crate::id::ValueId> = HashMap::new();
    for (name, ty) in raw.args {
        let id = func.add_arg(ty);
        env.insert(name, id);
    }
    bind_stmts(&mut func, &mut env, RegionRef::Top, &raw.body, diagnostics);
    func
}

fn bind_stmts(
    func: &mut FuncBody,
    env: &mut HashMap<String, crate::id::ValueId>,
    region: RegionRef,
    stmts: &[RawStmt],
    diagnostics: &mut Vec<Diagnostic>,
) {
    for stmt in stmts {
        bind_stmt(func, env, region, stmt, diagnostics);
    }
}

fn bind_error(diagnostics: &mut Vec<Diagnostic>, span: SimpleSpan, message: String) {
    diagnostics.push(
        Diagnostic::new(DiagLevel::Error, to_span(span), message).with_code(codes::PARSE_ERROR),
    );
}

fn bind_stmt(
    func: &mut FuncBody,
    env: &mut HashMap<String, crate::id::ValueId>,
    region: RegionRef,
    stmt: &RawStmt,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match stmt {
        RawStmt::For {
            iv,
            lower,
            upper,
            step,
            body,
            span,
        } => {
            let mut bounds = Vec::with_capacity(3);
            for name in [lower, upper, step] {
                match env.get(name) {
                    Some(&id) => bounds.push(id),
                    None => {
                        bind_error(diagnostics, *span, format!("unknown value '{}'", name));
                        return;
                    }
                }
            }
            let op = func.new_op(OpKind::For, bounds, Vec::new(), None, to_span(*span));
            func.push_op(region, op);
            let induction = func.add_induction(op);
            env.insert(iv.clone(), induction);
            bind_stmts(func, env, RegionRef::Body(op), body, diagnostics);
        }
        RawStmt::Exec { op, args, span } => {
            let Some(kind) = OpKind::from_name(op) else {
                bind_error(diagnostics, *span, format!("unknown operation '{}'", op));
                return;
            };
            if kind.num_results() != 0 {
                bind_error(
                    diagnostics,
                    *span,
                    format!("operation '{}' produces a result; bind it with '='", op),
                );
                return;
            }
            let Some(operands) = resolve_value_args(env, args, *span, diagnostics) else {
                return;
            };
            let id = func.new_op(kind, operands, Vec::new(), None, to_span(*span));
            func.push_op(region, id);
        }
        RawStmt::Assign {
            dest,
            op,
            args,
            ty,
            span,
        } => {
            let Some(kind) = OpKind::from_name(op) else {
                bind_error(diagnostics, *span, format!("unknown operation '{}'", op));
                return;
            };
            if kind.num_results() != 1 {
                bind_error(
                    diagnostics,
                    *span,
                    format!("operation '{}' produces no result", op),
                );
                return;
            }
            let bound = bind_assign(func, env, kind, args, ty.clone(), *span, diagnostics);
            let Some((operands, attr, result_ty)) = bound else {
                return;
            };
            let id = func.new_op(kind, operands, vec![result_ty], attr, to_span(*span));
            func.push_op(region, id);
            let result = func.op(id).results[0];
            env.insert(dest.clone(), result);
        }
    }
}

type BoundAssign = (Vec<crate::id::ValueId>, Option<Attr>, Type);

fn bind_assign(
    func: &FuncBody,
    env: &HashMap<String, crate::id::ValueId>,
    kind: OpKind,
    args: &[RawArg],
    ty: Option<Type>,
    span: SimpleSpan,
    diagnostics: &mut Vec<Diagnostic>,
) -> Option<BoundAssign> {
    match kind {
        OpKind::ConstIndex => {
            let [RawArg::Num(n)] = args else {
                bind_error(diagnostics, span, "const_index takes one number".to_string());
                return None;
            };
            Some((Vec::new(), Some(Attr::Index(*n as u64)), Type::Index))
        }
        OpKind::ConstScalar => {
            let [RawArg::Num(n)] = args else {
                bind_error(
                    diagnostics,
                    span,
                    "const_scalar takes one number".to_string(),
                );
                return None;
            };
            let elem = match ty {
                Some(Type::Scalar(elem)) => elem,
                None => ElemType::F32,
                Some(other) => {
                    bind_error(
                        diagnostics,
                        span,
                        format!("const_scalar type must be scalar, found '{}'", other),
                    );
                    return None;
                }
            };
            Some((Vec::new(), Some(Attr::Scalar(*n)), Type::Scalar(elem)))
        }
        OpKind::Dim => {
            let [RawArg::Value(v), RawArg::Num(n)] = args else {
                bind_error(
                    diagnostics,
                    span,
                    "dim takes a value and a dimension number".to_string(),
                );
                return None;
            };
            let value = resolve_name(env, v, span, diagnostics)?;
            Some((vec![value], Some(Attr::Index(*n as u64)), Type::Index))
        }
        _ => {
            let operands = resolve_value_args_exact(env, args, span, diagnostics)?;
            let result_ty = match kind {
                OpKind::BroadcastTo | OpKind::Matmul => match ty {
                    Some(t) if t.is_tensor() => t,
                    _ => {
                        bind_error(
                            diagnostics,
                            span,
                            format!("'{}' requires a tensor result type annotation", kind),
                        );
                        return None;
                    }
                },
                OpKind::AllocBuffer => match ty {
                    Some(t) if t.is_buffer() => t,
                    _ => {
                        bind_error(
                            diagnostics,
                            span,
                            "alloc_buffer requires a buffer result type annotation".to_string(),
                        );
                        return None;
                    }
                },
                OpKind::CmpNe => Type::Bool,
                OpKind::GetExtent | OpKind::Select => Type::Index,
                OpKind::PackShape => Type::Shape {
                    rank: operands.len(),
                },
                OpKind::Load => {
                    let elem = operands
                        .first()
                        .and_then(|&b| func.value_ty(b).elem())
                        .unwrap_or(ElemType::F32);
                    Type::Scalar(elem)
                }
                _ => Type::Index,
            };
            Some((operands, None, result_ty))
        }
    }
}

fn resolve_name(
    env: &HashMap<String, crate::id::ValueId>,
    name: &str,
    span: SimpleSpan,
    diagnostics: &mut Vec<Diagnostic>,
) -> Option<crate::id::ValueId> {
    match env.get(name) {
        Some(&id) => Some(id),
        None => {
            bind_error(diagnostics, span, format!("unknown value '{}'", name));
            None
        }
    }
}

fn resolve_value_args(
    env: &HashMap<String, crate::id::ValueId>,
    args: &[RawArg],
    span: SimpleSpan,
    diagnostics: &mut Vec<Diagnostic>,
) -> Option<Vec<crate::id::ValueId>> {
    resolve_value_args_exact(env, args, span, diagnostics)
}

fn resolve_value_args_exact(
    env: &HashMap<String, crate::id::ValueId>,
    args: &[RawArg],
    span: SimpleSpan,
    diagnostics: &mut Vec<Diagnostic>,
) -> Option<Vec<crate::id::ValueId>> {
    let mut operands = Vec::with_capacity(args.len());
    for arg in args {
        match arg {
            RawArg::Value(name) => operands.push(resolve_name(env, name, span, diagnostics)?),
            RawArg::Num(n) => {
                bind_error(
                    diagnostics,
                    span,
                    format!("expected a value reference, found number '{}'", n),
                );
                return None;
            }
        }
    }
    Some(operands)
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::DimSize;

    fn parse_ok(source: &str) -> Module {
        let result = parse(source);
        assert!(
            result.diagnostics.is_empty(),
            "diagnostics: {:#?}",
            result.diagnostics
        );
        result.module.expect("module")
    }

    #[test]
    fn parses_broadcast_function() {
        let module = parse_ok(
            r#"
            func @bcast(%arg0: buffer<1x3xf32>) {
              %c2 = const_index 2
              %c3 = const_index 3
              %s = pack_shape %c2, %c3
              %t = broadcast_to %arg0, %s : tensor<2x3xf32>
              return %t
            }
            "#,
        );
        assert_eq!(module.funcs.len(), 1);
        let func = &module.funcs[0];
        assert_eq!(func.name, "bcast");
        let kinds: Vec<OpKind> = func.top_ops().iter().map(|&o| func.op(o).kind).collect();
        assert_eq!(
            kinds,
            vec![
                OpKind::ConstIndex,
                OpKind::ConstIndex,
                OpKind::PackShape,
                OpKind::BroadcastTo,
                OpKind::Return,
            ]
        );
        // pack_shape's rank was inferred from its operand count
        let pack = func.top_ops()[2];
        let shape = func.op(pack).results[0];
        assert_eq!(*func.value_ty(shape), Type::Shape { rank: 2 });
    }

    #[test]
    fn parses_loops_recursively() {
        let module = parse_ok(
            r#"
            func @loops(%arg0: buffer<4x4xf32>) {
              %c0 = const_index 0
              %c4 = const_index 4
              %c1 = const_index 1
              for %i = %c0 to %c4 step %c1 {
                for %j = %c0 to %c4 step %c1 {
                  %x = load %arg0, %i, %j
                  store %x, %arg0, %j, %i
                }
              }
              return
            }
            "#,
        );
        let func = &module.funcs[0];
        let outer = func
            .top_ops()
            .into_iter()
            .find(|&o| func.op(o).kind == OpKind::For)
            .unwrap();
        let inner = func.op(outer).body[0];
        assert_eq!(func.op(inner).kind, OpKind::For);
        assert_eq!(func.op(inner).body.len(), 2);
    }

    #[test]
    fn dynamic_dims_parse() {
        let module = parse_ok(
            r#"
            func @dyn(%arg0: buffer<?x3xf32>, %arg1: shape<2>) {
              %t = broadcast_to %arg0, %arg1 : tensor<?x3xf32>
              return %t
            }
            "#,
        );
        let func = &module.funcs[0];
        let arg_ty = func.value_ty(func.args[0]);
        assert_eq!(
            arg_ty.dims().unwrap(),
            &[DimSize::Dynamic, DimSize::Fixed(3)]
        );
    }

    #[test]
    fn unknown_value_is_reported() {
        let result = parse("func @f() { return %nope }");
        assert!(result.module.is_none());
        assert!(result
            .diagnostics
            .iter()
            .any(|d| d.message.contains("unknown value")));
    }

    #[test]
    fn unknown_operation_is_reported() {
        let result = parse("func @f() { %x = frobnicate }");
        assert!(result.module.is_none());
        assert!(result
            .diagnostics
            .iter()
            .any(|d| d.message.contains("unknown operation")));
    }

    #[test]
    fn missing_type_annotation_is_reported() {
        let result = parse(
            r#"
            func @f(%a: buffer<1xf32>, %s: shape<1>) {
              %t = broadcast_to %a, %s
              return %t
            }
            "#,
        );
        assert!(result.module.is_none());
        assert!(result
            .diagnostics
            .iter()
            .any(|d| d.message.contains("result type annotation")));
    }

    #[test]
    fn print_parse_round_trip() {
        let source = r#"
            func @rt(%arg0: buffer<1x3xf32>) {
              %c2 = const_index 2
              %c3 = const_index 3
              %s = pack_shape %c2, %c3
              %t = broadcast_to %arg0, %s : tensor<2x3xf32>
              return %t
            }
            "#;
        let module = parse_ok(source);
        let printed = crate::printer::print_module(&module);
        let reparsed = parse(&printed);
        assert!(
            reparsed.diagnostics.is_empty(),
            "diagnostics: {:#?}",
            reparsed.diagnostics
        );
        let printed_again = crate::printer::print_module(&reparsed.module.unwrap());
        assert_eq!(printed, printed_again);
    }
}
