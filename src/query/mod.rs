//! Saved-list query engine: AST decoding, date resolution, SQL compilation
//! and post-query ordering.

pub mod ast;
pub mod compile;
pub mod dates;
pub mod sort;

pub use ast::{BoolOp, Condition, Group, Node};
pub use compile::{CompileContext, CompiledQuery, ProjectLookup, compile};
pub use sort::{Direction, SortDefinition, SortKey};
