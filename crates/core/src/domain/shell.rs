// Shell escaping for commands piped into at(1)

use std::borrow::Cow;

/// Bytes that never need quoting in a POSIX shell word
const SAFE_PUNCTUATION: &[u8] = b"-+=/:.,%_";

/// Bytes with special meaning inside a double-quoted shell string
const DOUBLE_QUOTE_SPECIALS: &[u8] = b"\\\"`$";

fn is_shell_safe(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || SAFE_PUNCTUATION.contains(&byte)
}

/// Escape one word so the shell reads it back as exactly `word`
///
/// Non-empty words made only of letters, digits and `-+=/:.,%_` are returned
/// as-is. Anything else (including the empty word) is wrapped in double
/// quotes, with `\`, `"`, `` ` `` and `$` backslash-escaped.
///
/// # Example
/// ```
/// use atbridge_core::domain::shell_escape;
///
/// assert_eq!(&*shell_escape(b"/tmp/out.txt"), b"/tmp/out.txt");
/// assert_eq!(&*shell_escape(b"bl\"a"), b"\"bl\\\"a\"");
/// assert_eq!(&*shell_escape(b""), b"\"\"");
/// ```
pub fn shell_escape(word: &[u8]) -> Cow<'_, [u8]> {
    if !word.is_empty() && word.iter().all(|&b| is_shell_safe(b)) {
        return Cow::Borrowed(word);
    }

    let mut escaped = Vec::with_capacity(word.len() + 2);
    escaped.push(b'"');
    for &byte in word {
        if DOUBLE_QUOTE_SPECIALS.contains(&byte) {
            escaped.push(b'\\');
        }
        escaped.push(byte);
    }
    escaped.push(b'"');
    Cow::Owned(escaped)
}

/// Escape every word independently and join them with single spaces
pub fn join_words<I, W>(words: I) -> Vec<u8>
where
    I: IntoIterator<Item = W>,
    W: AsRef<[u8]>,
{
    let mut line = Vec::new();
    for (i, word) in words.into_iter().enumerate() {
        if i > 0 {
            line.push(b' ');
        }
        line.extend_from_slice(&shell_escape(word.as_ref()));
    }
    line
}

/// A command to hand to the daemon
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    /// Already a shell command line, piped verbatim
    Raw(Vec<u8>),
    /// Argument vector, escaped word by word
    Words(Vec<Vec<u8>>),
}

impl ShellCommand {
    pub fn words<I, W>(words: I) -> Self
    where
        I: IntoIterator<Item = W>,
        W: Into<Vec<u8>>,
    {
        ShellCommand::Words(words.into_iter().map(Into::into).collect())
    }

    /// The bytes written to the daemon's standard input
    pub fn to_script(&self) -> Vec<u8> {
        match self {
            ShellCommand::Raw(bytes) => bytes.clone(),
            ShellCommand::Words(words) => join_words(words),
        }
    }
}

impl From<&str> for ShellCommand {
    fn from(s: &str) -> Self {
        ShellCommand::Raw(s.as_bytes().to_vec())
    }
}

impl From<String> for ShellCommand {
    fn from(s: String) -> Self {
        ShellCommand::Raw(s.into_bytes())
    }
}

impl From<&[u8]> for ShellCommand {
    fn from(bytes: &[u8]) -> Self {
        ShellCommand::Raw(bytes.to_vec())
    }
}

impl From<Vec<u8>> for ShellCommand {
    fn from(bytes: Vec<u8>) -> Self {
        ShellCommand::Raw(bytes)
    }
}

impl From<Vec<String>> for ShellCommand {
    fn from(words: Vec<String>) -> Self {
        ShellCommand::words(words)
    }
}

impl From<Vec<&str>> for ShellCommand {
    fn from(words: Vec<&str>) -> Self {
        ShellCommand::words(words)
    }
}

impl From<Vec<Vec<u8>>> for ShellCommand {
    fn from(words: Vec<Vec<u8>>) -> Self {
        ShellCommand::Words(words)
    }
}
