//! Nom-based IRC message parser.
//!
//! Parsing never allocates for message text: every field of the resulting
//! [`MessageRef`] is a slice of the input line.

use nom::{
    branch::alt,
    bytes::complete::{take_till, take_till1, take_while, take_while1},
    character::complete::char,
    combinator::{cut, map, opt, rest},
    error::{context, VerboseError, VerboseErrorKind},
    sequence::{preceded, terminated},
    IResult,
};

use crate::error::MessageParseError;

use super::{MessageRef, PARAM_MAX};

type ParseResult<I, O> = IResult<I, O, VerboseError<I>>;

fn is_space(c: char) -> bool {
    c == ' '
}

fn spaces0(input: &str) -> ParseResult<&str, &str> {
    take_while(is_space)(input)
}

fn spaces1(input: &str) -> ParseResult<&str, &str> {
    take_while1(is_space)(input)
}

/// Parse IRCv3 message tags (the part after `@` and before the next space).
fn parse_tags(input: &str) -> ParseResult<&str, &str> {
    context(
        "parsing message tags",
        preceded(char('@'), cut(terminated(take_till(is_space), spaces1))),
    )(input)
}

/// Parse the message source (the part after `:` and before the next space).
fn parse_source(input: &str) -> ParseResult<&str, &str> {
    context(
        "parsing message source",
        preceded(char(':'), cut(terminated(take_till(is_space), spaces1))),
    )(input)
}

fn parse_command(input: &str) -> ParseResult<&str, &str> {
    context("parsing command", take_till1(is_space))(input)
}

/// Parse one parameter. A `:` prefix swallows the rest of the line.
fn parse_param(input: &str) -> ParseResult<&str, (&str, bool)> {
    alt((
        map(preceded(char(':'), rest), |p| (p, true)),
        map(take_till1(is_space), |p| (p, false)),
    ))(input)
}

/// Parse a complete IRC message into its components.
///
/// ```text
/// [@tags] [:source] <command> [params...] [:trailing]
/// ```
fn parse_parts(input: &str) -> ParseResult<&str, MessageRef<'_>> {
    let (input, _) = spaces0(input)?;
    let (input, tags) = opt(parse_tags)(input)?;
    let (input, source) = opt(parse_source)(input)?;
    let (mut input, command) = parse_command(input)?;

    let mut msg = MessageRef {
        tags,
        source,
        command,
        params: Vec::new(),
        trailing: false,
    };

    while msg.params.len() < PARAM_MAX {
        let (after, _) = spaces0(input)?;
        if after.is_empty() {
            input = after;
            break;
        }
        let (after, (param, trailing)) = parse_param(after)?;
        msg.params.push(param);
        input = after;
        if trailing {
            msg.trailing = true;
            break;
        }
    }

    Ok((input, msg))
}

pub(super) fn parse_message(line: &str) -> Result<MessageRef<'_>, MessageParseError> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim_start_matches(' ').is_empty() {
        return Err(MessageParseError::EmptyMessage);
    }

    match parse_parts(line) {
        Ok((_, msg)) => Ok(msg),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(convert_error(line, e)),
        Err(nom::Err::Incomplete(_)) => Err(MessageParseError::MissingCommand),
    }
}

fn convert_error(line: &str, e: VerboseError<&str>) -> MessageParseError {
    // The innermost error comes first and carries the failing position.
    let position = e
        .errors
        .first()
        .map_or(line.len(), |(remaining, _)| line.len() - remaining.len());

    if position == line.len() {
        // The line ran out before a command token.
        return MessageParseError::MissingCommand;
    }

    let what = e.errors.iter().find_map(|(_, kind)| match kind {
        VerboseErrorKind::Context(ctx) => Some(*ctx),
        _ => None,
    });

    MessageParseError::ParseContext {
        position,
        context: what.unwrap_or("parsing message").to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_command() {
        let msg = parse_message("PING").unwrap();
        assert_eq!(msg.command, "PING");
        assert!(msg.tags.is_none());
        assert!(msg.source.is_none());
        assert!(msg.params.is_empty());
        assert!(!msg.trailing);
    }

    #[test]
    fn test_parse_command_with_params() {
        let msg = parse_message("PRIVMSG #channel :Hello, world!").unwrap();
        assert_eq!(msg.command, "PRIVMSG");
        assert_eq!(msg.params, vec!["#channel", "Hello, world!"]);
        assert!(msg.trailing);
    }

    #[test]
    fn test_parse_with_source() {
        let msg = parse_message(":nick!user@host PRIVMSG #channel :Hello").unwrap();
        assert_eq!(msg.source, Some("nick!user@host"));
        assert_eq!(msg.command, "PRIVMSG");
        assert_eq!(msg.params, vec!["#channel", "Hello"]);
    }

    #[test]
    fn test_parse_with_tags() {
        let msg = parse_message("@time=2023-01-01T00:00:00Z :nick PRIVMSG #ch :Hi").unwrap();
        assert_eq!(msg.tags, Some("time=2023-01-01T00:00:00Z"));
        assert_eq!(msg.source, Some("nick"));
        assert_eq!(msg.command, "PRIVMSG");
        assert_eq!(msg.params, vec!["#ch", "Hi"]);
    }

    #[test]
    fn test_parse_with_crlf() {
        let msg = parse_message("PING :server\r\n").unwrap();
        assert_eq!(msg.command, "PING");
        assert_eq!(msg.params, vec!["server"]);
    }

    #[test]
    fn test_parse_multiple_params() {
        let msg = parse_message("USER guest 0 * :Real Name").unwrap();
        assert_eq!(msg.command, "USER");
        assert_eq!(msg.params, vec!["guest", "0", "*", "Real Name"]);
    }

    #[test]
    fn test_parse_numeric_response() {
        let msg = parse_message(":server 001 nick :Welcome").unwrap();
        assert_eq!(msg.source, Some("server"));
        assert_eq!(msg.command, "001");
        assert_eq!(msg.params, vec!["nick", "Welcome"]);
    }

    #[test]
    fn test_parse_empty_trailing() {
        let msg = parse_message("PRIVMSG #channel :").unwrap();
        assert_eq!(msg.params, vec!["#channel", ""]);
        assert!(msg.trailing);
    }

    #[test]
    fn test_parse_trailing_keeps_inner_spaces() {
        let msg = parse_message("PRIVMSG #c :a  b :c").unwrap();
        assert_eq!(msg.params, vec!["#c", "a  b :c"]);
    }

    #[test]
    fn test_parse_collapses_spaces() {
        let msg = parse_message("  MODE   #chan  +o   bob  ").unwrap();
        assert_eq!(msg.command, "MODE");
        assert_eq!(msg.params, vec!["#chan", "+o", "bob"]);
        assert!(!msg.trailing);
    }

    #[test]
    fn test_parse_ignores_params_beyond_max() {
        let line = "CMD 1 2 3 4 5 6 7 8 9 10 11 12 13 14 15 16 17";
        let msg = parse_message(line).unwrap();
        assert_eq!(msg.params.len(), PARAM_MAX);
        assert_eq!(msg.last_param(), Some("15"));
    }

    #[test]
    fn test_parse_empty_tags_and_source() {
        let msg = parse_message("@ : PING").unwrap();
        assert_eq!(msg.tags, Some(""));
        assert_eq!(msg.source, Some(""));
        assert_eq!(msg.command, "PING");
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse_message(""), Err(MessageParseError::EmptyMessage));
        assert_eq!(parse_message("\r\n"), Err(MessageParseError::EmptyMessage));
        assert_eq!(parse_message("   "), Err(MessageParseError::EmptyMessage));
        assert_eq!(parse_message("@a=b"), Err(MessageParseError::MissingCommand));
        assert_eq!(parse_message(":server"), Err(MessageParseError::MissingCommand));
        assert_eq!(parse_message("@a=b :server "), Err(MessageParseError::MissingCommand));
    }
}
