/// Slash command detection: split a message into a command key and tokens.
///
/// `/Country  New Zealand` → key `/country`, tokens `["New", "Zealand"]`.
use apibot_core::{CommandParser, CommandRequest, ParsedCommand};

/// Split `text` into a lowercased command key and the remaining whitespace-separated tokens.
/// Returns `None` for blank text.
pub fn detect_command(text: &str) -> Option<(String, Vec<String>)> {
    let mut parts = text.split_whitespace();
    let cmd = parts.next()?.to_lowercase();
    Some((cmd, parts.map(str::to_string).collect()))
}

/// The stock [`CommandParser`]: first word is the command, the rest are arguments.
#[derive(Debug, Clone, Copy, Default)]
pub struct SlashParser;

impl CommandParser for SlashParser {
    fn parse(&self, request: &CommandRequest) -> ParsedCommand {
        let (cmd, tokens) = request
            .text
            .as_deref()
            .and_then(detect_command)
            .map(|(cmd, tokens)| (Some(cmd), tokens))
            .unwrap_or((None, Vec::new()));
        ParsedCommand {
            sender_id: request.sender_id.clone(),
            cmd,
            tokens,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_command_and_tokens() {
        let req = CommandRequest::new("<PSID1>", Some("/country Singapore".into()));
        let parsed = SlashParser.parse(&req);
        assert_eq!(parsed.cmd.as_deref(), Some("/country"));
        assert_eq!(parsed.tokens, vec!["Singapore"]);
        assert_eq!(parsed.sender_id, "<PSID1>");
    }

    #[test]
    fn lowercases_key_and_collapses_spaces() {
        let (cmd, tokens) = detect_command("  /FX   USD  SGD ").unwrap();
        assert_eq!(cmd, "/fx");
        assert_eq!(tokens, vec!["USD", "SGD"]);
    }

    #[test]
    fn absent_or_blank_text_has_no_command() {
        let parsed = SlashParser.parse(&CommandRequest::new("<PSID2>", None));
        assert!(parsed.cmd.is_none());
        assert!(parsed.tokens.is_empty());

        let parsed = SlashParser.parse(&CommandRequest::new("<PSID2>", Some("   ".into())));
        assert!(parsed.cmd.is_none());
    }
}
