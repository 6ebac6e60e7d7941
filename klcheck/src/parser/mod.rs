pub mod sexp;

// Re-export for convenience
pub use sexp::{format_number, parse, serialize, ParseError, SExp, SExpParser};
