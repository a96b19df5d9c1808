/// Comandos de texto que entiende el bot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `play <url|test>`; `None` si no se pasó argumento
    Play(Option<String>),
    Skip,
    Stop,
}

impl Command {
    /// Interpreta un mensaje. Devuelve `None` si no es un comando del bot.
    pub fn parse(content: &str, prefix: &str) -> Option<Self> {
        let rest = content.trim_start().strip_prefix(prefix)?;
        let mut words = rest.split_whitespace();
        let name = words.next()?.to_lowercase();

        match name.as_str() {
            "play" => Some(Command::Play(words.next().map(str::to_string))),
            "skip" => Some(Command::Skip),
            "stop" => Some(Command::Stop),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::Play(_) => "play",
            Command::Skip => "skip",
            Command::Stop => "stop",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_play() {
        assert_eq!(
            Command::parse("!play https://youtu.be/abc", "!"),
            Some(Command::Play(Some("https://youtu.be/abc".to_string())))
        );
        assert_eq!(
            Command::parse("!play   test  ", "!"),
            Some(Command::Play(Some("test".to_string())))
        );
        assert_eq!(Command::parse("!play", "!"), Some(Command::Play(None)));
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!(Command::parse("!SKIP", "!"), Some(Command::Skip));
        assert_eq!(Command::parse("!Stop", "!"), Some(Command::Stop));
    }

    #[test]
    fn test_parse_ignores_other_messages() {
        assert_eq!(Command::parse("play test", "!"), None);
        assert_eq!(Command::parse("!", "!"), None);
        assert_eq!(Command::parse("!pause", "!"), None);
        assert_eq!(Command::parse("?skip", "!"), None);
    }

    #[test]
    fn test_parse_custom_prefix() {
        assert_eq!(Command::parse("jb!skip", "jb!"), Some(Command::Skip));
        assert_eq!(Command::parse("!skip", "jb!"), None);
    }
}
