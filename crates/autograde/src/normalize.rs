//! Source text normalization
//!
//! Detects the byte encoding of a source file, converts it to a canonical
//! encoding, and performs whole-file rewrites. Every rewrite goes through a
//! temporary sibling file that is renamed over the original, so an
//! interrupted write never leaves a truncated source behind.

use std::borrow::Cow;
use std::fmt;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chardetng::EncodingDetector;
use encoding_rs::{BIG5, Encoding, GB18030, GBK, UTF_8, WINDOWS_1252};
use regex::Regex;
use serde::{Deserialize, Deserializer, de};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::config::{ConfigError, PreprocessConfig};

/// Number of leading bytes inspected when sniffing an encoding
pub const SNIFF_BLOCK_SIZE: usize = 4096;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("unsupported encoding '{0}'")]
    UnsupportedEncoding(String),

    #[error("content is not valid {0}")]
    Decode(FileEncoding),

    #[error("content can not be represented in {0}")]
    Unrepresentable(FileEncoding),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl NormalizeError {
    fn io(path: &Path) -> impl FnOnce(io::Error) -> Self + '_ {
        move |source| NormalizeError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Encodings a source file may be stored in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FileEncoding {
    Big5,
    #[default]
    Utf8,
    Ascii,
    Gb2312,
    UsAscii,
    /// UTF-8 with a leading byte order mark
    Utf8Sig,
    Iso8859_1,
}

impl FileEncoding {
    pub const ALL: [FileEncoding; 7] = [
        FileEncoding::Big5,
        FileEncoding::Utf8,
        FileEncoding::Ascii,
        FileEncoding::Gb2312,
        FileEncoding::UsAscii,
        FileEncoding::Utf8Sig,
        FileEncoding::Iso8859_1,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            FileEncoding::Big5 => "big5",
            FileEncoding::Utf8 => "utf-8",
            FileEncoding::Ascii => "ascii",
            FileEncoding::Gb2312 => "gb2312",
            FileEncoding::UsAscii => "us-ascii",
            FileEncoding::Utf8Sig => "utf-8-sig",
            FileEncoding::Iso8859_1 => "iso-8859-1",
        }
    }

    /// Codec used to decode and encode this encoding
    fn codec(&self) -> &'static Encoding {
        match self {
            FileEncoding::Big5 => BIG5,
            FileEncoding::Gb2312 => GBK,
            FileEncoding::Iso8859_1 => WINDOWS_1252,
            FileEncoding::Utf8
            | FileEncoding::Ascii
            | FileEncoding::UsAscii
            | FileEncoding::Utf8Sig => UTF_8,
        }
    }

    fn is_ascii(&self) -> bool {
        matches!(self, FileEncoding::Ascii | FileEncoding::UsAscii)
    }

    /// Whether a file detected as `self` is already valid in `target`
    ///
    /// Plain ASCII is byte-identical in every supported encoding except
    /// UTF-8 with BOM, which needs the marker prepended.
    pub fn satisfies(&self, target: FileEncoding) -> bool {
        *self == target || (self.is_ascii() && target != FileEncoding::Utf8Sig)
    }

    fn from_codec(codec: &'static Encoding) -> Option<Self> {
        if codec == UTF_8 {
            Some(FileEncoding::Utf8)
        } else if codec == BIG5 {
            Some(FileEncoding::Big5)
        } else if codec == GBK || codec == GB18030 {
            Some(FileEncoding::Gb2312)
        } else if codec == WINDOWS_1252 {
            Some(FileEncoding::Iso8859_1)
        } else {
            None
        }
    }
}

impl fmt::Display for FileEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for FileEncoding {
    type Err = NormalizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        FileEncoding::ALL
            .into_iter()
            .find(|enc| enc.label().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| NormalizeError::UnsupportedEncoding(wanted.to_owned()))
    }
}

impl<'de> Deserialize<'de> for FileEncoding {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(|_| {
            de::Error::invalid_value(
                de::Unexpected::Str(&s),
                &"one of big5, utf-8, ascii, gb2312, us-ascii, utf-8-sig, iso-8859-1",
            )
        })
    }
}

/// What `normalize_encoding` did to a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Normalization {
    /// File was already valid in the target encoding and was not touched
    Unchanged(FileEncoding),

    /// File was re-encoded
    Converted {
        from: FileEncoding,
        to: FileEncoding,
    },
}

/// Guess the encoding of a byte prefix
///
/// `complete` tells whether `prefix` is the whole file; when it is not, a
/// multi-byte UTF-8 sequence cut at the end of the prefix is tolerated.
pub fn detect_encoding(prefix: &[u8], complete: bool) -> Result<FileEncoding, NormalizeError> {
    if let Some((codec, _)) = Encoding::for_bom(prefix) {
        return if codec == UTF_8 {
            Ok(FileEncoding::Utf8Sig)
        } else {
            Err(NormalizeError::UnsupportedEncoding(codec.name().to_lowercase()))
        };
    }

    if prefix.is_ascii() {
        return Ok(FileEncoding::UsAscii);
    }

    match std::str::from_utf8(prefix) {
        Ok(_) => return Ok(FileEncoding::Utf8),
        Err(e) if !complete && e.error_len().is_none() => return Ok(FileEncoding::Utf8),
        Err(_) => {}
    }

    let mut detector = EncodingDetector::new();
    detector.feed(prefix, complete);
    let codec = detector.guess(None, true);
    FileEncoding::from_codec(codec)
        .ok_or_else(|| NormalizeError::UnsupportedEncoding(codec.name().to_lowercase()))
}

/// Detect the encoding of the file at `path` from its first bytes
pub fn detect_file_encoding(path: &Path) -> Result<FileEncoding, NormalizeError> {
    let file = File::open(path).map_err(NormalizeError::io(path))?;
    let mut prefix = Vec::with_capacity(SNIFF_BLOCK_SIZE);
    file.take(SNIFF_BLOCK_SIZE as u64)
        .read_to_end(&mut prefix)
        .map_err(NormalizeError::io(path))?;
    detect_encoding(&prefix, prefix.len() < SNIFF_BLOCK_SIZE)
}

/// Decode `bytes` stored in `encoding`
pub fn decode(bytes: &[u8], encoding: FileEncoding) -> Result<String, NormalizeError> {
    let body = match encoding {
        FileEncoding::Utf8Sig => bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes),
        _ => bytes,
    };
    if encoding.is_ascii() && !body.is_ascii() {
        return Err(NormalizeError::Decode(encoding));
    }
    encoding
        .codec()
        .decode_without_bom_handling_and_without_replacement(body)
        .map(Cow::into_owned)
        .ok_or(NormalizeError::Decode(encoding))
}

/// Encode `text` into `encoding`
pub fn encode(text: &str, encoding: FileEncoding) -> Result<Vec<u8>, NormalizeError> {
    match encoding {
        FileEncoding::Utf8 => Ok(text.as_bytes().to_vec()),
        FileEncoding::Utf8Sig => {
            let mut bytes = Vec::with_capacity(UTF8_BOM.len() + text.len());
            bytes.extend_from_slice(UTF8_BOM);
            bytes.extend_from_slice(text.as_bytes());
            Ok(bytes)
        }
        FileEncoding::Ascii | FileEncoding::UsAscii => {
            if text.is_ascii() {
                Ok(text.as_bytes().to_vec())
            } else {
                Err(NormalizeError::Unrepresentable(encoding))
            }
        }
        FileEncoding::Big5 | FileEncoding::Gb2312 | FileEncoding::Iso8859_1 => {
            let (bytes, _, had_errors) = encoding.codec().encode(text);
            if had_errors {
                Err(NormalizeError::Unrepresentable(encoding))
            } else {
                Ok(bytes.into_owned())
            }
        }
    }
}

/// Convert the file at `path` to `target`
///
/// No-op when the detected encoding already satisfies `target`.
#[instrument]
pub fn normalize_encoding(
    path: &Path,
    target: FileEncoding,
) -> Result<Normalization, NormalizeError> {
    let detected = detect_file_encoding(path)?;
    if detected.satisfies(target) {
        debug!(%detected, "encoding already canonical");
        return Ok(Normalization::Unchanged(detected));
    }

    let bytes = std::fs::read(path).map_err(NormalizeError::io(path))?;
    let text = decode(&bytes, detected)?;
    let converted = encode(&text, target)?;
    replace_file(path, &converted)?;

    debug!(from = %detected, to = %target, "re-encoded source");
    Ok(Normalization::Converted {
        from: detected,
        to: target,
    })
}

/// Insert `lines` at the top of the file at `path`, stored in `encoding`
pub fn insert_prologue<S: AsRef<str>>(
    lines: &[S],
    path: &Path,
    encoding: FileEncoding,
) -> Result<(), NormalizeError> {
    if lines.is_empty() {
        return Ok(());
    }

    let original = read_text(path, encoding)?;
    let mut content = String::with_capacity(original.len() + 64);
    for line in lines {
        content.push_str(line.as_ref());
        content.push('\n');
    }
    content.push_str(&original);
    write_text(path, &content, encoding)
}

/// Replace every match of `pattern` in the file at `path`, stored in `encoding`
///
/// Matching runs over the whole decoded content so patterns may span lines.
/// Returns the number of replaced matches; the file is not rewritten when
/// there are none.
pub fn replace_pattern(
    pattern: &Regex,
    replacement: &str,
    path: &Path,
    encoding: FileEncoding,
) -> Result<usize, NormalizeError> {
    let original = read_text(path, encoding)?;
    let count = pattern.find_iter(&original).count();
    if count == 0 {
        return Ok(0);
    }

    let replaced = pattern.replace_all(&original, replacement);
    write_text(path, &replaced, encoding)?;
    Ok(count)
}

/// Read the file at `path` and decode it from `encoding`
pub fn read_text(path: &Path, encoding: FileEncoding) -> Result<String, NormalizeError> {
    let bytes = std::fs::read(path).map_err(NormalizeError::io(path))?;
    decode(&bytes, encoding)
}

fn write_text(path: &Path, text: &str, encoding: FileEncoding) -> Result<(), NormalizeError> {
    replace_file(path, &encode(text, encoding)?)
}

/// Atomically replace the contents of `path`
fn replace_file(path: &Path, content: &[u8]) -> Result<(), NormalizeError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut temp = NamedTempFile::new_in(parent).map_err(NormalizeError::io(path))?;
    temp.write_all(content).map_err(NormalizeError::io(path))?;
    temp.flush().map_err(NormalizeError::io(path))?;
    temp.persist(path)
        .map_err(|e| NormalizeError::io(path)(e.error))?;
    Ok(())
}

/// Encoding conversion followed by the configured rewrites
#[derive(Debug, Clone)]
pub struct Preprocessor {
    target: FileEncoding,
    prologue: Vec<String>,
    rewrites: Vec<(Regex, String)>,
}

impl Preprocessor {
    pub fn new(target: FileEncoding) -> Self {
        Self {
            target,
            prologue: Vec::new(),
            rewrites: Vec::new(),
        }
    }

    /// Build a preprocessor from configuration
    pub fn from_config(
        target: FileEncoding,
        config: &PreprocessConfig,
    ) -> Result<Self, ConfigError> {
        let rewrites = config
            .rewrites
            .iter()
            .map(|rewrite| {
                Regex::new(&rewrite.pattern)
                    .map(|re| (re, rewrite.replacement.clone()))
                    .map_err(|source| ConfigError::Pattern {
                        pattern: rewrite.pattern.clone(),
                        source,
                    })
            })
            .collect::<Result<_, _>>()?;

        Ok(Self {
            target,
            prologue: config.prologue.clone(),
            rewrites,
        })
    }

    pub fn target(&self) -> FileEncoding {
        self.target
    }

    /// Normalize the encoding of `path`, then apply prologue and rewrites
    ///
    /// Prologue and rewrites work on the decoded text, and the result is
    /// stored in the target encoding again.
    pub fn prepare(&self, path: &Path) -> Result<Normalization, NormalizeError> {
        let normalization = normalize_encoding(path, self.target)?;

        insert_prologue(&self.prologue, path, self.target)?;
        for (pattern, replacement) in &self.rewrites {
            let count = replace_pattern(pattern, replacement, path, self.target)?;
            if count > 0 {
                debug!(pattern = pattern.as_str(), count, "applied rewrite");
            }
        }
        Ok(normalization)
    }
}
