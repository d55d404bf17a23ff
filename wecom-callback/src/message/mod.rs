//! Decrypted message parsing.
//!
//! ```text
//! decrypted XML → parse_message() → ParsedMessage → DispatchJob (text/image only)
//! ```

pub mod parser;
pub mod types;

pub use parser::{parse_message, ParseError};
pub use types::{MessageKind, ParsedMessage};
