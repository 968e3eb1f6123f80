pub use crate::ast::Span;
pub use crate::errors::{ErrorKind, PolicyError};

pub mod ast;
pub mod cli;
pub mod errors;
pub mod parser;
pub mod printer;
pub mod scanner;
