//! Spyeworks control protocol: command encoding and response parsing.
//!
//! Responses carry no framing beyond CRLF-separated lines and the player
//! reports list names as full file paths with a trailing suffix. Parsing is
//! plain prefix/suffix stripping relative to the configured content path, and
//! everything that depends on the exact reply layout lives in this module.

use chardetng::EncodingDetector;
use encoding_rs::{Encoding, UTF_16BE, UTF_16LE};

use crate::protocol_constants::{
    ALL_LISTS_SUFFIX_LEN, CMD_ALL_LISTS, CMD_CURRENT_LIST, CMD_SET_LIST,
    CURRENT_LIST_SUFFIX_LEN, LINE_TERMINATOR, LIST_EXTENSION,
};

use super::PlayerError;

/// A command understood by the player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerCommand<'a> {
    /// `SCP` - report the currently playing list.
    CurrentList,
    /// `DML` - report every stored list.
    AllLists,
    /// `SPL<filepath><name>.dml` - switch to a list.
    SetList {
        /// Content directory on the player, including its trailing `/`.
        filepath: &'a str,
        /// List name without extension.
        name: &'a str,
    },
}

impl PlayerCommand<'_> {
    /// Encodes the command as it goes on the wire, CRLF included.
    ///
    /// There is no separator between the filepath and the list name other
    /// than whatever the filepath itself ends with.
    #[must_use]
    pub fn encode(&self) -> String {
        match self {
            Self::CurrentList => format!("{CMD_CURRENT_LIST}{LINE_TERMINATOR}"),
            Self::AllLists => format!("{CMD_ALL_LISTS}{LINE_TERMINATOR}"),
            Self::SetList { filepath, name } => {
                format!("{CMD_SET_LIST}{filepath}{name}{LIST_EXTENSION}{LINE_TERMINATOR}")
            }
        }
    }

    /// Returns true if the player answers this command with data worth reading.
    #[must_use]
    pub fn expects_response(&self) -> bool {
        matches!(self, Self::CurrentList | Self::AllLists)
    }
}

/// Decodes raw response bytes.
///
/// Valid UTF-8 is taken as is. A byte order mark or a NUL-laced UTF-16 body
/// selects UTF-16; anything else goes through charset detection, which picks
/// the Windows code page the player most likely wrote in.
#[must_use]
pub fn decode_response(bytes: &[u8]) -> String {
    let encoding = match Encoding::for_bom(bytes) {
        Some((encoding, _)) => encoding,
        None => match utf16_without_bom(bytes) {
            Some(encoding) => encoding,
            None => {
                if let Ok(text) = std::str::from_utf8(bytes) {
                    return text.to_owned();
                }
                let mut detector = EncodingDetector::new();
                detector.feed(bytes, true);
                detector.guess(None, true)
            }
        },
    };

    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        log::debug!(
            "[PlayerClient] Reply not clean {}, replacement characters inserted",
            encoding.name()
        );
    }
    text.into_owned()
}

/// Recognises UTF-16 text without a BOM by its zero high bytes.
fn utf16_without_bom(bytes: &[u8]) -> Option<&'static Encoding> {
    if bytes.len() < 2 || bytes.len() % 2 != 0 {
        return None;
    }
    let units = bytes.len() / 2;
    let even_nuls = bytes.iter().step_by(2).filter(|&&b| b == 0).count();
    let odd_nuls = bytes.iter().skip(1).step_by(2).filter(|&&b| b == 0).count();

    if even_nuls == 0 && odd_nuls * 2 >= units {
        Some(UTF_16LE)
    } else if odd_nuls == 0 && even_nuls * 2 >= units {
        Some(UTF_16BE)
    } else {
        None
    }
}

/// Splits decoded response text into ordered lines.
///
/// The final segment after the last CRLF is dropped when empty.
#[must_use]
pub fn split_lines(text: &str) -> Vec<String> {
    let mut lines: Vec<String> = text.split(LINE_TERMINATOR).map(str::to_owned).collect();
    if lines.last().is_some_and(String::is_empty) {
        lines.pop();
    }
    lines
}

/// Strips `prefix_len` characters from the front and `suffix_len` from the
/// back of a line. Returns an empty string when the line is too short.
fn strip_fixed(line: &str, prefix_len: usize, suffix_len: usize) -> String {
    let chars: Vec<char> = line.chars().collect();
    let end = chars.len().saturating_sub(suffix_len);
    if prefix_len >= end {
        return String::new();
    }
    chars[prefix_len..end].iter().collect()
}

/// Parses an `SCP` response into the currently playing list name.
///
/// Each line has the content path stripped from the front and a fixed
/// 4-character suffix stripped from the back; the first non-empty result wins.
///
/// # Errors
///
/// Returns [`PlayerError::ParseAnomaly`] if no line yields a name.
pub fn parse_current_list(lines: &[String], filepath: &str) -> Result<String, PlayerError> {
    let prefix_len = filepath.chars().count();
    lines
        .iter()
        .map(|line| strip_fixed(line, prefix_len, CURRENT_LIST_SUFFIX_LEN))
        .find(|name| !name.is_empty())
        .ok_or_else(|| {
            PlayerError::ParseAnomaly(format!(
                "no current list in {} response line(s)",
                lines.len()
            ))
        })
}

/// Parses a `DML` response into every list name the player reports.
///
/// Each line has the content path stripped from the front and a fixed
/// 12-character suffix stripped from the back; empty results are skipped.
///
/// # Errors
///
/// Returns [`PlayerError::ParseAnomaly`] if no line yields a name.
pub fn parse_all_lists(lines: &[String], filepath: &str) -> Result<Vec<String>, PlayerError> {
    let prefix_len = filepath.chars().count();
    let names: Vec<String> = lines
        .iter()
        .map(|line| strip_fixed(line, prefix_len, ALL_LISTS_SUFFIX_LEN))
        .filter(|name| !name.is_empty())
        .collect();

    if names.is_empty() {
        return Err(PlayerError::ParseAnomaly(format!(
            "no list names in {} response line(s)",
            lines.len()
        )));
    }
    Ok(names)
}
