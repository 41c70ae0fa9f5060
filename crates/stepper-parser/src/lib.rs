pub mod grammar;
pub mod normalizer;
pub mod parser;

pub use grammar::{grammar, GrammarRule};
pub use normalizer::normalize;
pub use parser::{parse, parse_input, parse_script, parse_value, ParseError, ScriptError};
pub use stepper_common::{Command, CommandInput};
