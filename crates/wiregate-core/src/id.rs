//! ID generation utilities.

use uuid::Uuid;

/// Generate a new UUID v4.
pub fn uuid() -> String {
    Uuid::new_v4().to_string()
}

/// Generate a non-zero numeric token.
///
/// Zero is reserved: it is what an unparsable token string resolves to.
pub fn numeric_token() -> u32 {
    loop {
        let token: u32 = rand::random();
        if token != 0 {
            return token;
        }
    }
}

/// Parse a numeric token as presented by a client (cookie or query value).
///
/// Surrounding whitespace is ignored. Anything that is not a positive
/// integer yields `None`.
pub fn parse_token(value: &str) -> Option<u32> {
    value.trim().parse::<u32>().ok().filter(|t| *t != 0)
}
