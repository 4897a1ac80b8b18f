//! Parser for the game's player-list reply.
//!
//! Accepted forms:
//!
//! ```text
//! There are <online> of a max of <max> players online: <names>
//! There are <online> of a max <max> players online: <names>
//! There are <online>/<max> players online: <names>
//! ```
//!
//! Anything else parses as unknown.

/// Online and maximum player counts reported by the server.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PlayerCount {
    /// Players currently connected.
    pub online: u32,
    /// Advertised player cap.
    pub max: u32,
}

/// Parses a player-list reply, returning `None` when it does not match.
#[must_use]
pub fn parse_player_list(reply: &str) -> Option<PlayerCount> {
    let (_, after_prefix) = reply.split_once("There are ")?;
    let (online, after_online) = leading_number(after_prefix)?;

    let after_separator = after_online
        .strip_prefix(" of a max of ")
        .or_else(|| after_online.strip_prefix(" of a max "))
        .or_else(|| after_online.strip_prefix('/'))?;
    let (max, tail) = leading_number(after_separator)?;

    tail.trim_start()
        .starts_with("players")
        .then_some(PlayerCount { online, max })
}

fn leading_number(text: &str) -> Option<(u32, &str)> {
    let digits_end = text
        .char_indices()
        .find(|(_, ch)| !ch.is_ascii_digit())
        .map_or(text.len(), |(index, _)| index);
    let (digits, rest) = text.split_at_checked(digits_end)?;
    digits.parse().ok().map(|value| (value, rest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("There are 0 of a max of 20 players online: ", 0, 20)]
    #[case("There are 3 of a max of 20 players online: alex, steve, kai", 3, 20)]
    #[case("There are 5 of a max 10 players online:", 5, 10)]
    #[case("There are 2/8 players online:", 2, 8)]
    #[case("\u{a7}6There are 1 of a max of 4 players online: kai", 1, 4)]
    fn recognised_replies_parse(#[case] reply: &str, #[case] online: u32, #[case] max: u32) {
        assert_eq!(parse_player_list(reply), Some(PlayerCount { online, max }));
    }

    #[rstest]
    #[case("")]
    #[case("Unknown command")]
    #[case("There are many of a max of 20 players online:")]
    #[case("There are 3 of a max of lots players online:")]
    #[case("There are 3 of a max of 20 goats")]
    #[case("There are 99999999999 of a max of 20 players online:")]
    fn unrecognised_replies_are_unknown(#[case] reply: &str) {
        assert_eq!(parse_player_list(reply), None);
    }
}
