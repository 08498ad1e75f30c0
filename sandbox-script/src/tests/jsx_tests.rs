use crate::ast::*;
use crate::parser::{parse, parse_expression};

fn element(source: &str) -> JsxElement {
    match parse_expression(source).unwrap().kind {
        ExprKind::Jsx(element) => element,
        other => panic!("Expected JSX, got {:?}", other),
    }
}

#[test]
fn test_self_closing_intrinsic() {
    let el = element("<br />");
    assert_eq!(el.name, JsxName::Intrinsic("br".to_string()));
    assert!(el.children.is_empty());
}

#[test]
fn test_component_and_member_names() {
    assert_eq!(
        element("<Button />").name,
        JsxName::Component(vec!["Button".to_string()])
    );
    assert_eq!(
        element("<React.Fragment></React.Fragment>").name,
        JsxName::Component(vec!["React".to_string(), "Fragment".to_string()])
    );
}

#[test]
fn test_attributes() {
    let el = element(r#"<Button variant="primary" disabled onClick={() => go(1)} {...rest} />"#);
    assert_eq!(el.attributes.len(), 4);
    assert!(matches!(
        &el.attributes[0],
        JsxAttribute::Named { name, value: Some(JsxAttrValue::Str(v)) } if name == "variant" && v == "primary"
    ));
    assert!(matches!(
        &el.attributes[1],
        JsxAttribute::Named { name, value: None } if name == "disabled"
    ));
    assert!(matches!(
        &el.attributes[2],
        JsxAttribute::Named { value: Some(JsxAttrValue::Expr(_)), .. }
    ));
    assert!(matches!(&el.attributes[3], JsxAttribute::Spread(_)));
}

#[test]
fn test_hyphenated_attribute_name() {
    let el = element(r#"<div aria-label="close" data-id={3}></div>"#);
    assert!(matches!(
        &el.attributes[0],
        JsxAttribute::Named { name, .. } if name == "aria-label"
    ));
}

#[test]
fn test_children_text_and_expressions() {
    let el = element("<p>\n  Clicked {count} times\n</p>");
    assert_eq!(el.children.len(), 3);
    assert!(matches!(&el.children[0], JsxChild::Text(t) if t == "Clicked "));
    assert!(matches!(&el.children[1], JsxChild::Expr(_)));
    assert!(matches!(&el.children[2], JsxChild::Text(t) if t == " times"));
}

#[test]
fn test_text_with_apostrophe() {
    let el = element("<p>Don't panic</p>");
    assert!(matches!(&el.children[0], JsxChild::Text(t) if t == "Don't panic"));
}

#[test]
fn test_empty_expression_container_dropped() {
    let el = element("<div>{/* note */}<span /></div>");
    assert_eq!(el.children.len(), 1);
    assert!(matches!(&el.children[0], JsxChild::Element(_)));
}

#[test]
fn test_fragment() {
    let el = element("<><a /><b /></>");
    assert_eq!(el.name, JsxName::Fragment);
    assert_eq!(el.children.len(), 2);
}

#[test]
fn test_nested_jsx_in_expression() {
    let el = element("<ul>{items.map(item => <li key={item.id}>{item.label}</li>)}</ul>");
    match &el.children[0] {
        JsxChild::Expr(Expr {
            kind: ExprKind::Call { args, .. },
            ..
        }) => assert_eq!(args.len(), 1),
        other => panic!("Expected call, got {:?}", other),
    }
}

#[test]
fn test_jsx_after_return_in_parens() {
    let program = parse("function App() {\n  return (\n    <div className=\"x\">Hi</div>\n  );\n}").unwrap();
    match &program.body[0] {
        Stmt::Function(def) => match &def.body {
            FunctionBody::Block(stmts) => assert!(matches!(
                &stmts[0],
                Stmt::Return { value: Some(Expr { kind: ExprKind::Jsx(_), .. }), .. }
            )),
            other => panic!("Expected block body, got {:?}", other),
        },
        other => panic!("Expected function, got {:?}", other),
    }
}

#[test]
fn test_less_than_is_still_comparison() {
    assert!(matches!(
        parse_expression("a < b").unwrap().kind,
        ExprKind::Binary { op: BinaryOp::Lt, .. }
    ));
}

#[test]
fn test_mismatched_closing_tag() {
    let err = parse_expression("<div><span></div>").unwrap_err();
    assert_eq!(
        err.message(),
        "Expected corresponding JSX closing tag for <span>"
    );
}

#[test]
fn test_unterminated_element() {
    let err = parse_expression("<div>hello").unwrap_err();
    assert_eq!(err.message(), "Unterminated JSX contents");
}

#[test]
fn test_statement_continues_after_jsx() {
    let program = parse("const el = <b>x</b>;\nconst y = 2;").unwrap();
    assert_eq!(program.body.len(), 2);
}
