pub mod yahoo_parser;

pub use yahoo_parser::{ResponseParser, YahooParser};
