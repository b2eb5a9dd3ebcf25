use std::str::FromStr;

use num::PrimInt;

use crate::errors::{EngineError, Res};

/// `parse::<T>()` returns a completely unbounded error type on failure, so
/// the message is written here instead.
pub fn parse_int_from_str<T: PrimInt + FromStr>(as_str: &str, name: &str) -> Res<T> {
    as_str
        .parse::<T>()
        .map_err(|_| EngineError::protocol(format!("couldn't parse {name} from '{as_str}'")))
}

pub fn parse_int<'a, T, I>(words: &mut I, name: &str) -> Res<T>
where
    T: PrimInt + FromStr,
    I: Iterator<Item = &'a str>,
{
    parse_int_from_str(
        words
            .next()
            .ok_or_else(|| EngineError::protocol(format!("missing {name}")))?,
        name,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_integers() {
        assert_eq!(parse_int_from_str::<u8>("12", "code").unwrap(), 12);
        assert_eq!(parse_int_from_str::<i32>("-3", "score").unwrap(), -3);
        assert!(parse_int_from_str::<u8>("256", "code").is_err());
        assert!(parse_int_from_str::<i32>("x", "score").is_err());
    }

    #[test]
    fn reports_the_missing_field() {
        let mut words = "".split_whitespace();
        let err = parse_int::<u8, _>(&mut words, "query kind").unwrap_err();
        assert!(err.to_string().contains("query kind"));
    }
}
