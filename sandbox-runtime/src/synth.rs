//! Turning author code into an invokable unit
//!
//! The unit is the author code wrapped between a fixed preamble, which pulls
//! the common hooks out of `React`, and an epilogue returning `App`. Its
//! parameters are the scope's names; invoking it passes the scope's values.
//!
//! Positions reported from a unit are relative to the first byte of author
//! code, so line 1 is the author's first line.

use crate::env::{BindingKind, Env};
use crate::exception::{ErrorKind, Exception, ScriptResult};
use crate::interpreter::{Interpreter, UnitSource};
use crate::scope::Scope;
use crate::value::Value;
use sandbox_script::ast::{ImportDecl, ImportSpecifier, Stmt};
use sandbox_script::{parse_function_body_with_depth, ErrorContext, Program, DEFAULT_MAX_DEPTH};
use std::sync::Arc;

pub const PREAMBLE: &str = "const { useState, useEffect, useCallback, useMemo, useRef } = React;\n";
pub const EPILOGUE: &str = "\nreturn App;\n";

/// File name used in stack frames of author code
pub const SOURCE_FILE: &str = "App.jsx";

/// Entry binding the epilogue returns
pub const ENTRY_NAME: &str = "App";

/// Parsed, not yet invoked, author code
pub struct Unit {
    text: Arc<str>,
    origin: usize,
    program: Program,
}

impl Unit {
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Offset of the author's first byte within [`Unit::text`]
    pub fn origin(&self) -> usize {
        self.origin
    }

    fn epilogue_start(&self) -> usize {
        self.text.len() - EPILOGUE.len()
    }

    fn source(&self) -> UnitSource {
        UnitSource {
            text: Arc::clone(&self.text),
            origin: self.origin,
            file: SOURCE_FILE.to_string(),
        }
    }
}

/// Wrap and parse `code`
///
/// Lex and parse failures become a `SyntaxError` whose stack shows the
/// offending line.
pub fn synthesize(code: &str) -> Result<Unit, Exception> {
    synthesize_nested(code, DEFAULT_MAX_DEPTH)
}

/// [`synthesize`], rejecting code nested deeper than `max_depth`
pub fn synthesize_nested(code: &str, max_depth: usize) -> Result<Unit, Exception> {
    let text: Arc<str> = Arc::from(format!("{}{}{}", PREAMBLE, code, EPILOGUE));
    let origin = PREAMBLE.len();
    match parse_function_body_with_depth(&text, max_depth) {
        Ok(program) => Ok(Unit { text, origin, program }),
        Err(err) => {
            let context = ErrorContext::new(&text, &err).with_origin(origin);
            let (line, col) = context.line_col();
            let message = format!("{} ({}:{})", err, line, col);
            Err(Exception::new(ErrorKind::SyntaxError, message).with_stack(context.to_string()))
        }
    }
}

/// Run `unit` with `scope` bound and return its entry component
///
/// Environments nest as scope parameters, then imports, then the preamble,
/// then the author's own declarations, so authors may redeclare a name the
/// preamble or an import already bound.
pub fn invoke(interp: &mut Interpreter, scope: &Scope, unit: &Unit) -> ScriptResult<Value> {
    interp.set_unit(unit.source());
    interp.with_frame("<sandbox>", |interp| {
        let params = interp.new_env(&Env::root());
        for (name, value) in scope.entries() {
            params
                .declare(name, value.clone(), BindingKind::Param)
                .map_err(|_| interp.error(ErrorKind::SyntaxError, format!("Duplicate parameter name '{}'", name)))?;
        }

        let imports = interp.new_env(&params);
        for stmt in &unit.program.body {
            if let Stmt::Import(decl) = stmt {
                bind_import(interp, scope, decl, &imports)?;
            }
        }

        let body = &unit.program.body[..];
        let (preamble, body) = match body.first() {
            Some(Stmt::Var { span, .. }) if span.start < unit.origin => body.split_at(1),
            _ => body.split_at(0),
        };
        let preamble_env = interp.new_env(&imports);
        interp.run_statements(preamble, &preamble_env)?;

        let epilogue_start = unit.epilogue_start();
        let split = body
            .iter()
            .position(|stmt| matches!(stmt, Stmt::Return { span, .. } if span.start >= epilogue_start))
            .unwrap_or(body.len());
        let (author, epilogue) = body.split_at(split);

        let env = interp.new_env(&preamble_env);
        if let Some(value) = interp.run_statements(author, &env)? {
            return Ok(value);
        }
        if env.lookup(ENTRY_NAME).is_none() {
            if let Some(entry) = interp.take_default_export() {
                tracing::debug!("No App binding, using the default export");
                return Ok(entry);
            }
        }
        let entry = interp.run_statements(epilogue, &env)?;
        Ok(entry.unwrap_or(Value::Undefined))
    })
}

fn bind_import(interp: &mut Interpreter, scope: &Scope, decl: &ImportDecl, env: &Arc<Env>) -> ScriptResult<()> {
    interp.set_cursor(decl.span.start);
    let module = scope.resolve_module(&decl.source).cloned();
    if module.is_none() {
        tracing::debug!(source = %decl.source, "Unknown module, resolving imports by name");
    }
    for specifier in &decl.specifiers {
        let (local, value) = match specifier {
            ImportSpecifier::Default { local } => {
                let value = match &module {
                    Some(module) => match interp.get_property(module, "default")? {
                        Value::Undefined => Some(module.clone()),
                        value => Some(value),
                    },
                    None => scope.get(local).cloned(),
                };
                (local, value.ok_or_else(|| not_defined(interp, local))?)
            }
            ImportSpecifier::Namespace { local } => {
                let value = module.clone().or_else(|| scope.get(local).cloned());
                (local, value.ok_or_else(|| not_defined(interp, local))?)
            }
            ImportSpecifier::Named { imported, local } => {
                let from_module = match &module {
                    Some(module) => match interp.get_property(module, imported)? {
                        Value::Undefined => None,
                        value => Some(value),
                    },
                    None => None,
                };
                let value = from_module.or_else(|| scope.get(imported).cloned());
                (local, value.ok_or_else(|| not_defined(interp, imported))?)
            }
        };
        env.declare(local, value, BindingKind::Import).map_err(|_| {
            interp.error(
                ErrorKind::SyntaxError,
                format!("Identifier '{}' has already been declared", local),
            )
        })?;
    }
    Ok(())
}

fn not_defined(interp: &Interpreter, name: &str) -> Exception {
    interp.error(ErrorKind::ReferenceError, format!("{} is not defined", name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::RuntimeLimits;

    fn entry_of(code: &str) -> ScriptResult<Value> {
        let unit = synthesize(code)?;
        let mut interp = Interpreter::new(RuntimeLimits::default());
        let result = invoke(&mut interp, &Scope::standard(), &unit);
        interp.dispose();
        result
    }

    #[test]
    fn test_returns_app() {
        let entry = entry_of("function App() { return null; }").unwrap();
        assert_eq!(entry.as_function().map(|f| f.name().to_string()), Some("App".to_string()));
    }

    #[test]
    fn test_missing_app() {
        let err = entry_of("const Foo = () => null;").unwrap_err();
        assert_eq!(err.name, "ReferenceError");
        assert_eq!(err.message, "App is not defined");
    }

    #[test]
    fn test_default_export_fallback() {
        let entry = entry_of("export default function Main() { return null; }").unwrap();
        assert_eq!(entry.as_function().map(|f| f.name().to_string()), Some("Main".to_string()));
    }

    #[test]
    fn test_app_wins_over_default_export() {
        let code = "export default function Main() { return null; }\nfunction App() { return null; }";
        let entry = entry_of(code).unwrap();
        assert_eq!(entry.as_function().map(|f| f.name().to_string()), Some("App".to_string()));
    }

    #[test]
    fn test_syntax_error_positions_are_author_relative() {
        let err = entry_of("function App() {\n  return 1 +;\n}").unwrap_err();
        assert_eq!(err.name, "SyntaxError");
        assert!(err.message.contains("(2:"), "{}", err.message);
        let stack = err.stack.unwrap();
        assert!(stack.starts_with("SyntaxError: "), "{}", stack);
        assert!(stack.contains("return 1 +;"), "{}", stack);
    }

    #[test]
    fn test_imports_resolve() {
        let code = r#"
import React from 'react';
import { Button as B, Alert } from "@navikt/ds-react";
import * as DS from "@navikt/ds-react";
function App() { return null; }
if (typeof React.useState !== "function") throw new Error("React");
if (B !== DS.Button || Alert !== DS.Alert) throw new Error("NavDS");
"#;
        entry_of(code).unwrap();
    }

    #[test]
    fn test_unknown_import_name() {
        let err = entry_of("import { Carousel } from '@navikt/ds-react';\nfunction App() {}").unwrap_err();
        assert_eq!(err.name, "ReferenceError");
        assert_eq!(err.message, "Carousel is not defined");
    }

    #[test]
    fn test_author_may_repeat_preamble() {
        entry_of("const { useState } = React;\nfunction App() { return null; }").unwrap();
    }
}
