//! Ready-made sample grammars demonstrating the grammar format.
//!
//! [json_grammar] generates syntactically valid JSON documents; [packet_grammar] generates
//! binary records and shows byte oriented output.

#[cfg(test)]
mod __tests__;

use crate::{Functions, Grammar};

const JSON_TEXT: &str = r#"
# random JSON document generator
root    value

value   5   string
        3   number
        1   "true"
        1   "false"
        1   "null"
        2   object
        2   array

object      "{" members? "}"
members     pair ("," pair){0,3}
pair        string ":" value

array       "[" elements? "]"
elements    value ("," value){0,3}

string  "\"" /[a-zA-Z0-9_ ]{0,9}/ "\""
number  3   rndint(0, 10000)
        1   rndflt(0, 1)
"#;

const PACKET_TEXT: &str = r#"
# binary record stream: magic, a handful of typed records, end marker
root    x"7f504b10" record{1,6} x"0d0a"

record  3   x"00"
        2   x"ff" length
        1   payload

length  x"0004"
payload x"deadbeef"
"#;

/// A grammar producing random JSON documents; every generated value parses as JSON.
pub fn json_grammar() -> Grammar {
    Grammar::new(JSON_TEXT, Some(512), Functions::new()).unwrap()
}

/// A grammar producing binary record streams; generation yields bytes rather than text.
pub fn packet_grammar() -> Grammar {
    Grammar::new(PACKET_TEXT, Some(64), Functions::new()).unwrap()
}
