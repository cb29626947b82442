//! Text-level channels for citemark: the bracket citation detector and the
//! bibliography parser.

pub mod bibliography;
pub mod bracket;

pub use bibliography::parse_bibliography;
pub use bracket::{PAREN_CONFIDENCE, SQUARE_CONFIDENCE, bracket_candidates, line_candidates};
