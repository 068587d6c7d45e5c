//! Parser for the one-integer-per-line dataset format.

use nom::IResult;
use nom::branch::alt;
use nom::character::complete::{char, digit1, multispace0};
use nom::combinator::{all_consuming, map_res, opt, recognize};
use nom::sequence::{delimited, pair};

/// Parses an optionally signed decimal integer.
pub fn integer(input: &str) -> IResult<&str, i64> {
    map_res(
        recognize(pair(opt(alt((char('-'), char('+')))), digit1)),
        |digits: &str| digits.parse::<i64>(),
    )(input)
}

/// Parses a full line holding exactly one integer, surrounding whitespace
/// allowed.
///
/// # Returns
///
/// The value, or `None` if the line holds anything else.
pub fn integer_line(line: &str) -> Option<i64> {
    all_consuming(delimited(multispace0, integer, multispace0))(line)
        .ok()
        .map(|(_, value)| value)
}
