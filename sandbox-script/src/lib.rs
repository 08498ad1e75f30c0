//! # Component script language
//!
//! The JSX-flavoured JavaScript subset that sandbox authors write:
//! - `const`/`let` bindings with array and object destructuring
//! - function declarations, arrow functions and closures
//! - JSX elements, fragments and embedded `{expressions}`
//! - template literals, optional chaining and nullish coalescing
//! - `import` / `export` declarations, resolved later against a scope
//!
//! Parsing produces an [`ast::Program`]; evaluation lives in the runtime
//! crate.
//!
//! ## Example
//!
//! ```ignore
//! const { useState } = React;
//!
//! function App() {
//!   const [count, setCount] = useState(0);
//!   return <Button onClick={() => setCount(count + 1)}>Clicked {count}</Button>;
//! }
//! ```

pub mod ast;
pub mod error;
mod jsx;
pub mod lexer;
pub mod parser;

#[cfg(test)]
mod tests;

pub use ast::{Expr, ExprKind, FunctionDef, JsxElement, Program, Stmt};
pub use error::{line_col, ErrorContext, Result, ScriptError, Span};
pub use lexer::{tokenize, SpannedToken, Token};
pub use parser::{
    parse, parse_expression, parse_function_body, parse_function_body_with_depth, Parser, DEFAULT_MAX_DEPTH,
};
