pub mod ast;

use crate::lexer::{MIN_WORD_MAGNITUDE, Token};
use crate::types::{OBJECT, Span, Type};
use ast::*;
use chumsky::Parser;
use chumsky::input::ValueInput;
use chumsky::prelude::*;

pub use chumsky::span::SimpleSpan;

type RichTokenError<'a> = Rich<'a, Token>;

fn binary(left: Expr, (op, right): (BinaryOp, Expr)) -> Expr {
    let span = left.span.start..right.span.end;
    Expr::new(
        ExprKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
        span,
    )
}

fn unary(op: UnaryOp, op_span: Span, operand: Expr) -> Expr {
    let span = op_span.start..operand.span.end;
    Expr::new(
        ExprKind::Unary {
            op,
            operand: Box::new(operand),
        },
        span,
    )
}

pub fn expr_parser<'tokens, I>()
-> impl Parser<'tokens, I, Expr, extra::Err<RichTokenError<'tokens>>>
where
    I: ValueInput<'tokens, Token = Token, Span = SimpleSpan> + 'tokens,
{
    recursive(|expr| {
        let ident = select! { Token::Identifier(s) => s }.labelled("identifier");

        let args = expr
            .clone()
            .separated_by(just(Token::Comma))
            .allow_trailing()
            .collect::<Vec<Expr>>()
            .delimited_by(just(Token::LParen), just(Token::RParen));

        let number = select! { Token::Int(n) => n }.try_map(|n, span| {
            i32::try_from(n).map(Literal::Number).map_err(|_| {
                Rich::custom(
                    span,
                    format!("Integer literal '{}' is out of range for a 32-bit word", n),
                )
            })
        });
        let literal = choice((
            number,
            select! {
                Token::Bool(b) => Literal::Bool(b),
                Token::None => Literal::None,
            },
        ))
        .map(ExprKind::Literal)
        .labelled("literal");

        // `f` or `f(args)`
        let name_or_call = ident
            .clone()
            .then(args.clone().or_not())
            .map(|(name, args)| match args {
                Some(args) => ExprKind::Call { name, args },
                None => ExprKind::Identifier(name),
            });

        let nested = expr
            .clone()
            .delimited_by(just(Token::LParen), just(Token::RParen))
            .map(|inner: Expr| ExprKind::Nested(Box::new(inner)));

        let primary = choice((literal, name_or_call, nested)).map_with(|kind, e| {
            let s: I::Span = e.span();
            Expr::new(kind, s.into_range())
        });

        // `.attr` or `.method(args)`, chained
        let postfix = just(Token::Dot)
            .ignore_then(ident)
            .then(args.or_not())
            .map_with(|(name, args), e| {
                let s: I::Span = e.span();
                (name, args, s.into_range())
            });

        let atom = primary.foldl(
            postfix.repeated(),
            |base: Expr, (name, args, span): (String, Option<Vec<Expr>>, Span)| {
                let span = base.span.start..span.end;
                let kind = match args {
                    Some(args) => ExprKind::MethodCall {
                        receiver: Box::new(base),
                        method: name,
                        args,
                    },
                    None => ExprKind::Attribute {
                        object: Box::new(base),
                        attr: name,
                    },
                };
                Expr::new(kind, span)
            },
        );

        let negate = just(Token::Minus).map_with(|_, e| {
            let s: I::Span = e.span();
            s.into_range()
        });
        let min_word = just(Token::Minus)
            .then(select! { Token::Int(n) if n == MIN_WORD_MAGNITUDE => () })
            .map_with(|_, e| {
                let s: I::Span = e.span();
                Expr::new(ExprKind::Literal(Literal::Number(i32::MIN)), s.into_range())
            });
        let neg = recursive(|neg| {
            choice((
                min_word,
                negate
                    .then(neg)
                    .map(|(op_span, operand): (Span, Expr)| unary(UnaryOp::Negate, op_span, operand)),
                atom,
            ))
        });

        let op = |t| just(t).ignored();
        let product = neg.clone().foldl(
            choice((
                op(Token::Star).to(BinaryOp::Multiply),
                op(Token::SlashSlash).to(BinaryOp::FloorDivide),
                op(Token::Percent).to(BinaryOp::Modulo),
            ))
            .then(neg)
            .repeated(),
            binary,
        );
        let sum = product.clone().foldl(
            choice((
                op(Token::Plus).to(BinaryOp::Add),
                op(Token::Minus).to(BinaryOp::Subtract),
            ))
            .then(product)
            .repeated(),
            binary,
        );
        let comparison = sum.clone().foldl(
            choice((
                op(Token::Less).to(BinaryOp::Less),
                op(Token::LessEqual).to(BinaryOp::LessEqual),
                op(Token::Greater).to(BinaryOp::Greater),
                op(Token::GreaterEqual).to(BinaryOp::GreaterEqual),
                op(Token::EqualEqual).to(BinaryOp::Equal),
                op(Token::NotEqual).to(BinaryOp::NotEqual),
                op(Token::Is).to(BinaryOp::Is),
            ))
            .then(sum)
            .repeated(),
            binary,
        );

        // `not` binds looser than comparisons: `not a == b` is `not (a == b)`
        let not_kw = just(Token::Not).map_with(|_, e| {
            let s: I::Span = e.span();
            s.into_range()
        });
        let logical_not = not_kw
            .repeated()
            .foldr(comparison, |op_span: Span, operand: Expr| {
                unary(UnaryOp::Not, op_span, operand)
            });

        logical_not.labelled("expression")
    })
    .boxed()
}

/// Splits a function body into its leading declarations (locals) and the
/// remaining statements.
fn make_func_def(
    name: String,
    params: Vec<(String, Type)>,
    ret: Type,
    body: Vec<StmtS>,
    span: Span,
) -> FuncDef {
    let mut locals = Vec::new();
    let mut stmts = Vec::new();
    for (stmt, s) in body {
        match stmt {
            Stmt::VarDecl { name, decl } => locals.push((name, decl)),
            other => stmts.push((other, s)),
        }
    }
    let identity = FuncIdentity {
        name,
        params: params.iter().map(|(_, ty)| ty.clone()).collect(),
        ret,
    };
    FuncDef {
        identity,
        params,
        locals,
        body: stmts,
        span,
    }
}

fn make_class_def(name: String, body: Vec<StmtS>, span: Span) -> Result<ClassDef, String> {
    let mut class_vars = Vec::new();
    let mut methods = Vec::new();
    for (stmt, s) in body {
        match stmt {
            Stmt::VarDecl { name, decl } => class_vars.push(ClassVar {
                name,
                decl,
                span: s,
            }),
            Stmt::FuncDef(def) => methods.push(def),
            Stmt::Pass => {}
            _ => {
                return Err(format!(
                    "only attribute declarations and methods may appear in the body of class '{}'",
                    name
                ));
            }
        }
    }
    Ok(ClassDef {
        name,
        type_code: 0,
        class_vars,
        methods,
        span,
    })
}

pub fn stmt_parser<'tokens, I>()
-> impl Parser<'tokens, I, StmtS, extra::Err<RichTokenError<'tokens>>>
where
    I: ValueInput<'tokens, Token = Token, Span = SimpleSpan> + 'tokens,
{
    let expr = expr_parser().boxed();

    recursive(|stmt| {
        let ident = select! { Token::Identifier(s) => s }.labelled("identifier");

        let type_ann = choice((
            ident.clone().map(|name: String| Type::from_annotation(&name)),
            just(Token::None).to(Type::None),
        ))
        .labelled("type");

        let line_end = just(Token::Newline).ignored().or(end());

        let return_stmt = just(Token::Return)
            .ignore_then(expr.clone().or_not())
            .map_with(|value, e| {
                let s: I::Span = e.span();
                Stmt::Return(value.unwrap_or_else(|| {
                    Expr::new(ExprKind::Literal(Literal::None), s.into_range())
                }))
            })
            .labelled("return statement");

        let pass_stmt = just(Token::Pass).to(Stmt::Pass);

        let var_decl = ident
            .clone()
            .then_ignore(just(Token::Colon))
            .then(type_ann.clone())
            .then_ignore(just(Token::Equal))
            .then(expr.clone())
            .map(|((name, ty), value)| Stmt::VarDecl {
                name,
                decl: VarDeclr { ty, value },
            })
            .labelled("variable declaration");

        let assign_stmt = expr
            .clone()
            .then_ignore(just(Token::Equal))
            .then(expr.clone())
            .try_map(|(target, value): (Expr, Expr), span| match target.kind {
                ExprKind::Identifier(name) => Ok(Stmt::Assign { name, value }),
                ExprKind::Attribute { object, attr } => Ok(Stmt::AttrAssign {
                    object: *object,
                    attr,
                    value,
                }),
                _ => Err(Rich::custom(span, "invalid assignment target")),
            })
            .labelled("assignment");

        let expr_stmt = expr
            .clone()
            .map(Stmt::Expr)
            .labelled("expression statement");

        let simple_line = choice((return_stmt, pass_stmt, var_decl, assign_stmt, expr_stmt))
            .map_with(|node: Stmt, e| {
                let s: I::Span = e.span();
                (node, s.into_range())
            })
            .then_ignore(line_end);

        // Block after ':' is either indented lines or one simple statement
        let indented_block = stmt
            .clone()
            .repeated()
            .at_least(1)
            .collect::<Vec<StmtS>>()
            .delimited_by(
                just(Token::Newline)
                    .ignore_then(just(Token::Newline).ignored().repeated())
                    .ignore_then(just(Token::Indent)),
                just(Token::Dedent),
            );

        let block = just(Token::Colon).ignore_then(choice((
            indented_block,
            simple_line.clone().map(|s| vec![s]),
        )));

        let param = ident
            .clone()
            .then_ignore(just(Token::Colon))
            .then(type_ann.clone());

        let def_stmt = just(Token::Def)
            .ignore_then(ident.clone())
            .then(
                param
                    .separated_by(just(Token::Comma))
                    .allow_trailing()
                    .collect::<Vec<(String, Type)>>()
                    .delimited_by(just(Token::LParen), just(Token::RParen)),
            )
            .then(just(Token::Arrow).ignore_then(type_ann).or_not())
            .then(block.clone())
            .map_with(|(((name, params), ret), body), e| {
                let s: I::Span = e.span();
                Stmt::FuncDef(make_func_def(
                    name,
                    params,
                    ret.unwrap_or(Type::None),
                    body,
                    s.into_range(),
                ))
            })
            .labelled("function definition");

        let class_stmt = just(Token::Class)
            .ignore_then(ident.clone())
            .then(
                ident
                    .clone()
                    .delimited_by(just(Token::LParen), just(Token::RParen))
                    .or_not(),
            )
            .then(block.clone())
            .try_map(|((name, base), body), span: SimpleSpan| {
                if let Some(base) = base
                    && base != OBJECT
                {
                    return Err(Rich::custom(
                        span,
                        format!("class '{}' cannot inherit from '{}'", name, base),
                    ));
                }
                make_class_def(name, body, span.into_range())
                    .map(Stmt::ClassDef)
                    .map_err(|msg| Rich::custom(span, msg))
            })
            .labelled("class definition");

        let elif_arm = just(Token::Elif)
            .ignore_then(expr.clone())
            .then(block.clone())
            .map_with(|arm, e| {
                let s: I::Span = e.span();
                (arm, s.into_range())
            });

        let if_stmt = just(Token::If)
            .ignore_then(expr.clone())
            .then(block.clone())
            .then(elif_arm.repeated().collect::<Vec<_>>())
            .then(just(Token::Else).ignore_then(block.clone()).or_not())
            .map(|(((cond, then_block), elifs), else_block)| {
                // elif chains nest into the else arm
                let else_block = elifs.into_iter().rev().fold(
                    else_block.unwrap_or_default(),
                    |acc, ((cond, then_block), span): ((Expr, Vec<StmtS>), Span)| {
                        vec![(
                            Stmt::If {
                                cond,
                                then_block,
                                else_block: acc,
                            },
                            span,
                        )]
                    },
                );
                Stmt::If {
                    cond,
                    then_block,
                    else_block,
                }
            })
            .labelled("if statement");

        let while_stmt = just(Token::While)
            .ignore_then(expr.clone())
            .then(block)
            .map(|(cond, body)| Stmt::While { cond, body })
            .labelled("while statement");

        let compound_stmt = choice((class_stmt, def_stmt, if_stmt, while_stmt)).map_with(
            |node: Stmt, e| {
                let s: I::Span = e.span();
                (node, s.into_range())
            },
        );

        let blank_lines = just(Token::Newline).ignored().repeated();

        choice((compound_stmt, simple_line))
            .padded_by(blank_lines)
            .recover_with(skip_then_retry_until(
                any().ignored(),
                just(Token::Newline)
                    .ignored()
                    .or(just(Token::Dedent).ignored())
                    .or(end()),
            ))
    })
    .boxed()
}

pub fn program_parser<'tokens, I>()
-> impl Parser<'tokens, I, Vec<StmtS>, extra::Err<RichTokenError<'tokens>>>
where
    I: ValueInput<'tokens, Token = Token, Span = SimpleSpan> + 'tokens,
{
    let blanks = just(Token::Newline).ignored().repeated();

    blanks
        .clone()
        .ignore_then(stmt_parser().repeated().collect::<Vec<StmtS>>())
        .then_ignore(blanks)
        .then_ignore(end())
        .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;

    fn tokenize(source: &str) -> Vec<(Token, SimpleSpan)> {
        let mut lexer = Lexer::new(source);
        let mut tokens = Vec::new();
        loop {
            let (token, span) = lexer.next_token_with_span();
            if token == Token::Eof {
                break;
            }
            tokens.push((token, SimpleSpan::from(span)));
        }
        tokens
    }

    fn parse_expr(source: &str) -> Result<Expr, Vec<RichTokenError<'_>>> {
        let tokens = tokenize(source);
        let eoi_span = SimpleSpan::new(source.len(), source.len());
        let stream =
            chumsky::input::Stream::from_iter(tokens.into_iter()).map(eoi_span, |(t, s)| (t, s));
        expr_parser().parse(stream).into_result()
    }

    fn parse_program(source: &str) -> Result<Vec<StmtS>, Vec<RichTokenError<'_>>> {
        let tokens = tokenize(source);
        let eoi_span = SimpleSpan::new(source.len(), source.len());
        let stream =
            chumsky::input::Stream::from_iter(tokens.into_iter()).map(eoi_span, |(t, s)| (t, s));
        program_parser().parse(stream).into_result()
    }

    #[test]
    fn test_parse_literals() {
        assert!(matches!(
            parse_expr("42").unwrap().kind,
            ExprKind::Literal(Literal::Number(42))
        ));
        assert!(matches!(
            parse_expr("False").unwrap().kind,
            ExprKind::Literal(Literal::Bool(false))
        ));
        assert!(matches!(
            parse_expr("None").unwrap().kind,
            ExprKind::Literal(Literal::None)
        ));
    }

    #[test]
    fn test_parse_binary_precedence() {
        let expr = parse_expr("1 + 2 * 3").unwrap();
        match expr.kind {
            ExprKind::Binary {
                op: BinaryOp::Add,
                right,
                ..
            } => assert!(matches!(
                right.kind,
                ExprKind::Binary {
                    op: BinaryOp::Multiply,
                    ..
                }
            )),
            other => panic!("expected addition at top level, got {:?}", other),
        }
    }

    #[test]
    fn test_not_binds_looser_than_comparison() {
        let expr = parse_expr("not 10 != 20").unwrap();
        match expr.kind {
            ExprKind::Unary {
                op: UnaryOp::Not,
                operand,
            } => assert!(matches!(
                operand.kind,
                ExprKind::Binary {
                    op: BinaryOp::NotEqual,
                    ..
                }
            )),
            other => panic!("expected not at top level, got {:?}", other),
        }
    }

    #[test]
    fn test_negation_binds_tightly() {
        let expr = parse_expr("-x * 2").unwrap();
        match expr.kind {
            ExprKind::Binary {
                op: BinaryOp::Multiply,
                left,
                ..
            } => assert!(matches!(
                left.kind,
                ExprKind::Unary {
                    op: UnaryOp::Negate,
                    ..
                }
            )),
            other => panic!("expected multiplication, got {:?}", other),
        }
    }

    #[test]
    fn test_smallest_word_literal() {
        assert!(matches!(
            parse_expr("-2147483648").unwrap().kind,
            ExprKind::Literal(Literal::Number(i32::MIN))
        ));
        match parse_expr("- -2147483648").unwrap().kind {
            ExprKind::Unary {
                op: UnaryOp::Negate,
                operand,
            } => assert!(matches!(
                operand.kind,
                ExprKind::Literal(Literal::Number(i32::MIN))
            )),
            other => panic!("expected negation, got {:?}", other),
        }
        assert!(parse_expr("2147483648").is_err());
        assert!(parse_expr("1 - 2147483648").is_err());
    }

    #[test]
    fn test_parse_postfix_chain() {
        let expr = parse_expr("a.next.value(1, True)").unwrap();
        match expr.kind {
            ExprKind::MethodCall {
                receiver,
                method,
                args,
            } => {
                assert_eq!(method, "value");
                assert_eq!(args.len(), 2);
                assert!(matches!(receiver.kind, ExprKind::Attribute { ref attr, .. } if attr == "next"));
            }
            other => panic!("expected method call, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_call_and_nested() {
        let expr = parse_expr("(f(1, 2))").unwrap();
        match expr.kind {
            ExprKind::Nested(inner) => {
                assert!(matches!(inner.kind, ExprKind::Call { ref name, ref args } if name == "f" && args.len() == 2))
            }
            other => panic!("expected nested call, got {:?}", other),
        }
    }

    #[test]
    fn test_is_operator() {
        let expr = parse_expr("x is None").unwrap();
        assert!(matches!(
            expr.kind,
            ExprKind::Binary {
                op: BinaryOp::Is,
                ..
            }
        ));
    }

    #[test]
    fn test_parse_declarations_and_assignments() {
        let program = parse_program("x: int = 1\nx = x + 1\nn.value = 3\nx\n").unwrap();
        assert_eq!(program.len(), 4);
        assert!(matches!(&program[0].0, Stmt::VarDecl { name, decl } if name == "x" && decl.ty == Type::Number));
        assert!(matches!(&program[1].0, Stmt::Assign { name, .. } if name == "x"));
        assert!(matches!(&program[2].0, Stmt::AttrAssign { attr, .. } if attr == "value"));
        assert!(matches!(&program[3].0, Stmt::Expr(_)));
    }

    #[test]
    fn test_invalid_assignment_target() {
        assert!(parse_program("f(1) = 2\n").is_err());
    }

    #[test]
    fn test_parse_function_with_locals() {
        let source = "\
def f(a: int, b: bool) -> int:
  t: int = 0
  if b:
    t = a
  return t
";
        let program = parse_program(source).unwrap();
        assert_eq!(program.len(), 1);
        let Stmt::FuncDef(def) = &program[0].0 else {
            panic!("expected function definition");
        };
        assert_eq!(def.signature(), "f(number,bool,)");
        assert_eq!(def.identity.ret, Type::Number);
        assert_eq!(def.locals.len(), 1);
        assert_eq!(def.body.len(), 2);
    }

    #[test]
    fn test_parse_function_defaults_to_none_return() {
        let program = parse_program("def g():\n  pass\n").unwrap();
        let Stmt::FuncDef(def) = &program[0].0 else {
            panic!("expected function definition");
        };
        assert_eq!(def.identity.ret, Type::None);
        assert!(def.params.is_empty());
    }

    #[test]
    fn test_parse_class() {
        let source = "\
class C(object):
  attr: int = 0
  other: C = None
  def get(self: C) -> int:
    return self.attr
";
        let program = parse_program(source).unwrap();
        let Stmt::ClassDef(class) = &program[0].0 else {
            panic!("expected class definition");
        };
        assert_eq!(class.name, "C");
        assert_eq!(class.class_vars.len(), 2);
        assert_eq!(class.attribute("other").map(|(i, _)| i), Some(1));
        assert_eq!(class.methods.len(), 1);
        assert_eq!(class.methods[0].signature(), "get(C,)");
    }

    #[test]
    fn test_class_inheritance_rejected() {
        assert!(parse_program("class D(C):\n  pass\n").is_err());
    }

    #[test]
    fn test_elif_nests_into_else() {
        let source = "\
if a:
  x = 1
elif b:
  x = 2
else:
  x = 3
";
        let program = parse_program(source).unwrap();
        let Stmt::If { else_block, .. } = &program[0].0 else {
            panic!("expected if");
        };
        assert_eq!(else_block.len(), 1);
        let Stmt::If {
            else_block: inner_else,
            ..
        } = &else_block[0].0
        else {
            panic!("expected nested if");
        };
        assert_eq!(inner_else.len(), 1);
    }

    #[test]
    fn test_parse_while_and_bare_return() {
        let source = "\
def loop(n: int):
  while n > 0:
    n = n - 1
  return
";
        let program = parse_program(source).unwrap();
        let Stmt::FuncDef(def) = &program[0].0 else {
            panic!("expected function definition");
        };
        assert!(matches!(def.body[0].0, Stmt::While { .. }));
        assert!(matches!(
            &def.body[1].0,
            Stmt::Return(e) if e.as_literal() == Some(Literal::None)
        ));
    }

    #[test]
    fn test_blank_lines_between_statements() {
        let program = parse_program("\n\nx: int = 1\n\n\nx\n\n").unwrap();
        assert_eq!(program.len(), 2);
    }
}
