use crate::ast::*;
use crate::parser::{parse, parse_expression, parse_function_body, Parser};

fn single_expr(source: &str) -> ExprKind {
    parse_expression(source).unwrap().kind
}

#[test]
fn test_parse_const_declaration() {
    let program = parse("const answer = 42;").unwrap();
    match &program.body[0] {
        Stmt::Var { kind, decls, .. } => {
            assert_eq!(*kind, VarKind::Const);
            assert_eq!(decls[0].pattern.bound_names(), vec!["answer"]);
            assert!(matches!(
                decls[0].init.as_ref().map(|e| &e.kind),
                Some(ExprKind::Number(n)) if *n == 42.0
            ));
        }
        other => panic!("Expected var declaration, got {:?}", other),
    }
}

#[test]
fn test_parse_destructuring() {
    let program = parse("const [count, setCount] = useState(0);\nconst { a, b: renamed = 1, ...rest } = obj;").unwrap();
    match &program.body[0] {
        Stmt::Var { decls, .. } => {
            assert_eq!(decls[0].pattern.bound_names(), vec!["count", "setCount"]);
        }
        other => panic!("Expected var declaration, got {:?}", other),
    }
    match &program.body[1] {
        Stmt::Var { decls, .. } => {
            assert_eq!(decls[0].pattern.bound_names(), vec!["a", "renamed", "rest"]);
            match &decls[0].pattern {
                Pattern::Object { props, .. } => assert!(props[1].default.is_some()),
                other => panic!("Expected object pattern, got {:?}", other),
            }
        }
        other => panic!("Expected var declaration, got {:?}", other),
    }
}

#[test]
fn test_parse_function_declaration() {
    let program = parse("function App(props) { return props.title; }").unwrap();
    match &program.body[0] {
        Stmt::Function(def) => {
            assert_eq!(def.name.as_deref(), Some("App"));
            assert_eq!(def.params.len(), 1);
            assert!(!def.is_arrow);
            assert!(matches!(&def.body, FunctionBody::Block(stmts) if stmts.len() == 1));
        }
        other => panic!("Expected function, got {:?}", other),
    }
}

#[test]
fn test_parse_arrow_functions() {
    assert!(matches!(
        single_expr("x => x + 1"),
        ExprKind::Function(def) if def.is_arrow && def.params.len() == 1
    ));
    assert!(matches!(
        single_expr("() => {}"),
        ExprKind::Function(def) if def.is_arrow && def.params.is_empty()
    ));
    assert!(matches!(
        single_expr("(a, { b }, ...rest) => a"),
        ExprKind::Function(def) if def.params.len() == 3 && def.params[2].rest
    ));
}

#[test]
fn test_parenthesized_expression_is_not_arrow() {
    assert!(matches!(
        single_expr("(a + b) * c"),
        ExprKind::Binary { op: BinaryOp::Mul, .. }
    ));
}

#[test]
fn test_operator_precedence() {
    match single_expr("1 + 2 * 3") {
        ExprKind::Binary { op, right, .. } => {
            assert_eq!(op, BinaryOp::Add);
            assert!(matches!(right.kind, ExprKind::Binary { op: BinaryOp::Mul, .. }));
        }
        other => panic!("Expected binary, got {:?}", other),
    }
    assert!(matches!(
        single_expr("a && b || c"),
        ExprKind::Logical { op: LogicalOp::Or, .. }
    ));
}

#[test]
fn test_conditional_and_nullish() {
    assert!(matches!(
        single_expr("ready ? a : b ?? c"),
        ExprKind::Conditional { .. }
    ));
}

#[test]
fn test_member_call_chain() {
    match single_expr("items.map(item => item.id)?.length") {
        ExprKind::Member {
            property, optional, ..
        } => {
            assert_eq!(property, "length");
            assert!(optional);
        }
        other => panic!("Expected member, got {:?}", other),
    }
}

#[test]
fn test_keyword_property_name() {
    assert!(matches!(
        single_expr("module.default"),
        ExprKind::Member { property, .. } if property == "default"
    ));
}

#[test]
fn test_object_literal_forms() {
    match single_expr("({ a: 1, b, 'c-d': 2, [key]: 3, ...rest, go() { return 1; } })") {
        ExprKind::Object(props) => {
            assert_eq!(props.len(), 6);
            assert!(matches!(&props[1], ObjectProp::Shorthand(name, _) if name == "b"));
            assert!(matches!(&props[2], ObjectProp::KeyValue(PropKey::Named(k), _) if k == "c-d"));
            assert!(matches!(&props[3], ObjectProp::KeyValue(PropKey::Computed(_), _)));
            assert!(matches!(&props[4], ObjectProp::Spread(_)));
            assert!(matches!(
                &props[5],
                ObjectProp::KeyValue(_, Expr { kind: ExprKind::Function(_), .. })
            ));
        }
        other => panic!("Expected object, got {:?}", other),
    }
}

#[test]
fn test_template_literal() {
    match single_expr("`Count: ${count + 1} items`") {
        ExprKind::Template { quasis, exprs } => {
            assert_eq!(quasis, vec!["Count: ".to_string(), " items".to_string()]);
            assert_eq!(exprs.len(), 1);
        }
        other => panic!("Expected template, got {:?}", other),
    }
}

#[test]
fn test_template_interpolation_spans_are_absolute() {
    let source = "`a${b}`";
    match single_expr(source) {
        ExprKind::Template { exprs, .. } => {
            assert_eq!(exprs[0].span.start, 4);
            assert_eq!(exprs[0].span.end, 5);
        }
        other => panic!("Expected template, got {:?}", other),
    }
}

#[test]
fn test_undefined_literal() {
    assert!(matches!(single_expr("undefined"), ExprKind::Undefined));
}

#[test]
fn test_assignment_targets() {
    assert!(matches!(
        single_expr("ref.current = 5"),
        ExprKind::Assign { op: AssignOp::Assign, .. }
    ));
    let err = parse_expression("a + b = c").unwrap_err();
    assert_eq!(err.message(), "Invalid left-hand side in assignment");
}

#[test]
fn test_imports() {
    let program = parse(
        "import React, { useState as useS } from 'react';\nimport * as NavDS from '@navikt/ds-react';\nimport './style.css';",
    )
    .unwrap();
    match &program.body[0] {
        Stmt::Import(decl) => {
            assert_eq!(decl.source, "react");
            assert_eq!(
                decl.specifiers,
                vec![
                    ImportSpecifier::Default {
                        local: "React".to_string()
                    },
                    ImportSpecifier::Named {
                        imported: "useState".to_string(),
                        local: "useS".to_string()
                    },
                ]
            );
        }
        other => panic!("Expected import, got {:?}", other),
    }
    assert!(matches!(
        &program.body[1],
        Stmt::Import(ImportDecl { specifiers, .. })
            if matches!(&specifiers[0], ImportSpecifier::Namespace { local } if local == "NavDS")
    ));
    assert!(matches!(
        &program.body[2],
        Stmt::Import(ImportDecl { specifiers, .. }) if specifiers.is_empty()
    ));
}

#[test]
fn test_exports() {
    let program = parse(
        "export default function App() { return null; }\nexport const x = 1;\nexport default () => null;",
    )
    .unwrap();
    assert!(matches!(&program.body[0], Stmt::Export { default: true, .. }));
    assert!(matches!(&program.body[1], Stmt::Export { default: false, .. }));
    assert!(matches!(&program.body[2], Stmt::ExportDefault(_)));
}

#[test]
fn test_for_of_and_if() {
    let program = parse_function_body(
        "for (const item of items) { if (item) { total += 1; } else total -= 1; }\nreturn total;",
    )
    .unwrap();
    assert!(matches!(&program.body[0], Stmt::ForOf { .. }));
    assert!(matches!(&program.body[1], Stmt::Return { value: Some(_), .. }));
}

#[test]
fn test_asi_on_newline() {
    let program = parse("const a = 1\nconst b = a\nb").unwrap();
    assert_eq!(program.body.len(), 3);
}

#[test]
fn test_return_newline_returns_undefined() {
    let program = parse_function_body("return\n42").unwrap();
    assert!(matches!(&program.body[0], Stmt::Return { value: None, .. }));
}

#[test]
fn test_top_level_return_rejected_in_modules() {
    let err = parse("return 1;").unwrap_err();
    assert_eq!(err.message(), "Illegal return statement");
}

#[test]
fn test_unexpected_token_messages() {
    assert_eq!(
        parse("const x = ;").unwrap_err().message(),
        "Unexpected token ';'"
    );
    assert_eq!(
        parse("function App() {").unwrap_err().message(),
        "Unexpected end of input"
    );
    assert_eq!(
        parse("let a = 1 foo").unwrap_err().message(),
        "Unexpected identifier 'foo'"
    );
}

#[test]
fn test_missing_initializers() {
    assert_eq!(
        parse("const x;").unwrap_err().message(),
        "Missing initializer in const declaration"
    );
    assert_eq!(
        parse("let [a];").unwrap_err().message(),
        "Missing initializer in destructuring declaration"
    );
    assert!(parse("let pending;").is_ok());
}

#[test]
fn test_nested_import_rejected() {
    let err = parse("function f() { import x from 'y'; }").unwrap_err();
    assert_eq!(
        err.message(),
        "'import' and 'export' may only appear at the top level"
    );
}

#[test]
fn test_error_span_points_at_token() {
    let source = "const a = 1;\nconst b = );";
    let err = parse(source).unwrap_err();
    assert_eq!(&source[err.span().start..err.span().end], ")");
}

fn parse_with_depth(source: &str, max_depth: usize) -> crate::error::Result<Program> {
    Parser::new(source).allow_return().max_depth(max_depth).parse_program()
}

#[test]
fn test_nesting_within_limit() {
    let source = format!("const x = {}1{};", "(".repeat(10), ")".repeat(10));
    assert!(parse_with_depth(&source, 16).is_ok());
}

#[test]
fn test_deep_parentheses_rejected() {
    let source = format!("const x = {}1{};", "(".repeat(40), ")".repeat(40));
    let err = parse_with_depth(&source, 16).unwrap_err();
    assert_eq!(err.message(), "Maximum nesting depth exceeded");
}

#[test]
fn test_deep_arrays_and_unary_rejected() {
    let arrays = format!("const x = {}{};", "[".repeat(40), "]".repeat(40));
    assert_eq!(
        parse_with_depth(&arrays, 16).unwrap_err().message(),
        "Maximum nesting depth exceeded"
    );

    let unary = format!("const x = {}1;", "!".repeat(40));
    assert_eq!(
        parse_with_depth(&unary, 16).unwrap_err().message(),
        "Maximum nesting depth exceeded"
    );
}

#[test]
fn test_deep_blocks_and_member_chains_rejected() {
    let blocks = format!("{}{}", "{".repeat(40), "}".repeat(40));
    assert_eq!(
        parse_with_depth(&blocks, 16).unwrap_err().message(),
        "Maximum nesting depth exceeded"
    );

    let chain = format!("const x = a{};", ".b".repeat(40));
    assert_eq!(
        parse_with_depth(&chain, 16).unwrap_err().message(),
        "Maximum nesting depth exceeded"
    );
}

#[test]
fn test_deep_jsx_rejected() {
    let source = format!("const x = {}{};", "<b>".repeat(40), "</b>".repeat(40));
    assert_eq!(
        parse_with_depth(&source, 16).unwrap_err().message(),
        "Maximum nesting depth exceeded"
    );
}

#[test]
fn test_deep_template_expressions_share_the_limit() {
    let source = format!("const x = `${{{}1{}}}`;", "(".repeat(40), ")".repeat(40));
    assert_eq!(
        parse_with_depth(&source, 16).unwrap_err().message(),
        "Maximum nesting depth exceeded"
    );
}

#[test]
fn test_long_operator_chain_is_not_nesting() {
    let source = format!("const x = 1{};", " + 1".repeat(2_000));
    assert!(parse_with_depth(&source, 16).is_ok());
}

#[test]
fn test_default_limit_stops_pathological_input() {
    let handle = std::thread::Builder::new()
        .stack_size(64 * 1024 * 1024)
        .spawn(|| {
            let source = format!("const x = {}1{};", "(".repeat(2_000), ")".repeat(2_000));
            parse(&source).map(|_| ()).unwrap_err().message().to_string()
        })
        .unwrap();
    assert_eq!(handle.join().unwrap(), "Maximum nesting depth exceeded");
}
