/*
 * ZipVerifier Rust v1.0.0
 * Copyright (c) 2026 Tiash H Kabir / @MrCarb0n.
 * Licensed under the MIT License.
 */

//! Manifest and signature-file text format.
//!
//! A manifest is a main section followed by per-entry sections, each a run of
//! `Key: value` lines closed by a blank line. Long lines are folded: a
//! physical line starting with a single space continues the previous one.
//! The parser works on raw bytes so it can hand back the exact bytes of every
//! entry section ("chunks"), which signature files digest independently.

use crate::{
    attributes::{AttributeName, AttributeSet, NAME},
    error::ManifestError,
};
use std::{
    collections::BTreeMap,
    fmt,
    io::{self, Read, Write},
    iter::Peekable,
    sync::Arc,
};

/// Longest physical line the writer emits, terminator excluded.
pub const MAX_LINE_BYTES: usize = 70;

/// Raw bytes of each entry section, keyed by entry name.
pub type Chunks = BTreeMap<String, Vec<u8>>;

/// Decodes the bytes of one logical line into text.
pub trait CharsetDecoder: Send + Sync + fmt::Debug {
    fn decode(&self, bytes: &[u8]) -> Result<String, ManifestError>;
}

/// ISO-8859-1: every byte maps to the code point of the same value.
#[derive(Debug, Clone, Copy, Default)]
pub struct Latin1;

impl CharsetDecoder for Latin1 {
    fn decode(&self, bytes: &[u8]) -> Result<String, ManifestError> {
        Ok(latin1(bytes))
    }
}

fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

/// Knobs for [`Manifest::parse_with`].
#[derive(Clone, Debug, Default)]
pub struct ParseOptions {
    /// Keep the raw bytes of every entry section.
    pub capture_chunks: bool,
    /// Attribute the main section must contain.
    pub required_version: Option<AttributeName>,
    /// Fixed charset; without one, UTF-8 with a sticky Latin-1 fallback.
    pub charset: Option<Arc<dyn CharsetDecoder>>,
}

impl ParseOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chunks(mut self) -> Self {
        self.capture_chunks = true;
        self
    }

    pub fn require_version(mut self, name: AttributeName) -> Self {
        self.required_version = Some(name);
        self
    }

    pub fn with_charset(mut self, charset: Arc<dyn CharsetDecoder>) -> Self {
        self.charset = Some(charset);
        self
    }
}

/// Main attributes plus per-entry attribute sets.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Manifest {
    main: AttributeSet,
    entries: BTreeMap<String, AttributeSet>,
}

/// A parse result that still owns the bytes it came from.
#[derive(Clone, Debug)]
pub struct ParsedManifest {
    pub manifest: Manifest,
    pub raw: Vec<u8>,
    pub chunks: Option<Chunks>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn main_attributes(&self) -> &AttributeSet {
        &self.main
    }

    pub fn main_attributes_mut(&mut self) -> &mut AttributeSet {
        &mut self.main
    }

    pub fn entry(&self, name: &str) -> Option<&AttributeSet> {
        self.entries.get(name)
    }

    /// Returns the entry's attributes, creating an empty set if needed.
    pub fn entry_mut(&mut self, name: &str) -> &mut AttributeSet {
        self.entries.entry(name.to_string()).or_default()
    }

    pub fn insert_entry(&mut self, name: impl Into<String>, attrs: AttributeSet) -> Option<AttributeSet> {
        self.entries.insert(name.into(), attrs)
    }

    pub fn remove_entry(&mut self, name: &str) -> Option<AttributeSet> {
        self.entries.remove(name)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &AttributeSet)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Parses with default options.
    pub fn parse(bytes: &[u8]) -> Result<Self, ManifestError> {
        parse_bytes(bytes, &ParseOptions::default()).map(|(m, _)| m)
    }

    pub fn parse_with(raw: Vec<u8>, options: &ParseOptions) -> Result<ParsedManifest, ManifestError> {
        let (manifest, chunks) = parse_bytes(&raw, options)?;
        Ok(ParsedManifest {
            manifest,
            raw,
            chunks,
        })
    }

    /// Consumes `reader` to the end and parses what it produced.
    pub fn read_from<R: Read>(
        mut reader: R,
        options: &ParseOptions,
    ) -> crate::error::Result<ParsedManifest> {
        let mut raw = Vec::new();
        reader.read_to_end(&mut raw)?;
        Ok(Self::parse_with(raw, options)?)
    }

    /// Serializes the manifest. Values must not contain line terminators.
    pub fn write_to<W: Write>(&self, mut out: W) -> io::Result<()> {
        out.write_all(&self.to_bytes())
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(64 + self.entries.len() * 96);
        let leading = [
            AttributeName::manifest_version(),
            AttributeName::signature_version(),
        ];
        let version = leading.iter().find(|n| self.main.contains(n));
        if let Some(name) = version {
            if let Some(value) = self.main.get(name) {
                write_attribute(&mut out, name.as_str(), value);
            }
        }
        for (name, value) in self.main.iter() {
            if Some(name) != version {
                write_attribute(&mut out, name.as_str(), value);
            }
        }
        out.extend_from_slice(b"\r\n");

        for (entry, attrs) in &self.entries {
            out.extend(entry_section(entry, attrs));
        }
        out
    }
}

/// Serialized bytes of one entry section, blank terminator included.
pub fn entry_section(name: &str, attrs: &AttributeSet) -> Vec<u8> {
    let mut out = Vec::with_capacity(name.len() + 96);
    write_attribute(&mut out, NAME, name);
    for (key, value) in attrs.iter() {
        write_attribute(&mut out, key.as_str(), value);
    }
    out.extend_from_slice(b"\r\n");
    out
}

fn write_attribute(out: &mut Vec<u8>, key: &str, value: &str) {
    let line = format!("{}: {}", key, value);
    let mut rest = line.as_str();
    let mut limit = MAX_LINE_BYTES;
    loop {
        let mut cut = rest.len().min(limit);
        while !rest.is_char_boundary(cut) {
            cut -= 1;
        }
        if limit < MAX_LINE_BYTES {
            out.push(b' ');
        }
        out.extend_from_slice(&rest.as_bytes()[..cut]);
        out.extend_from_slice(b"\r\n");
        rest = &rest[cut..];
        if rest.is_empty() {
            break;
        }
        limit = MAX_LINE_BYTES - 1;
    }
}

/// One physical line: content without terminator, plus its byte span.
struct PhysicalLine<'a> {
    content: &'a [u8],
    start: usize,
    end: usize,
}

struct PhysicalLines<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Iterator for PhysicalLines<'a> {
    type Item = PhysicalLine<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.data.len() {
            return None;
        }
        let start = self.pos;
        let rest = &self.data[start..];
        let (content_len, end) = match rest.iter().position(|&b| b == b'\n' || b == b'\r') {
            Some(i) if rest[i] == b'\r' && rest.get(i + 1) == Some(&b'\n') => (i, start + i + 2),
            Some(i) => (i, start + i + 1),
            None => (rest.len(), self.data.len()),
        };
        self.pos = end;
        Some(PhysicalLine {
            content: &rest[..content_len],
            start,
            end,
        })
    }
}

/// A physical line plus its continuations.
struct LogicalLine {
    bytes: Vec<u8>,
    start: usize,
    end: usize,
}

/// UTF-8 until the first invalid sequence, then Latin-1 for good.
struct LineDecoder {
    charset: Option<Arc<dyn CharsetDecoder>>,
    fallback: bool,
}

impl LineDecoder {
    fn decode(&mut self, bytes: &[u8]) -> Result<String, ManifestError> {
        if let Some(charset) = &self.charset {
            return charset.decode(bytes);
        }
        if !self.fallback {
            match std::str::from_utf8(bytes) {
                Ok(text) => return Ok(text.to_string()),
                Err(_) => {
                    tracing::debug!("manifest is not valid UTF-8, decoding bytes as Latin-1");
                    self.fallback = true;
                }
            }
        }
        Ok(latin1(bytes))
    }
}

struct Block {
    lines: Vec<String>,
    start: usize,
    end: usize,
}

struct Parser<'a> {
    lines: Peekable<PhysicalLines<'a>>,
    decoder: LineDecoder,
}

impl<'a> Parser<'a> {
    fn next_logical(&mut self) -> Result<Option<LogicalLine>, ManifestError> {
        let first = match self.lines.next() {
            Some(line) => line,
            None => return Ok(None),
        };
        if first.content.first() == Some(&b' ') {
            return Err(ManifestError::Format(
                "continuation line without a preceding attribute".into(),
            ));
        }
        let mut logical = LogicalLine {
            bytes: first.content.to_vec(),
            start: first.start,
            end: first.end,
        };
        if logical.bytes.is_empty() {
            return Ok(Some(logical));
        }
        while let Some(next) = self.lines.next_if(|l| l.content.first() == Some(&b' ')) {
            logical.bytes.extend_from_slice(&next.content[1..]);
            logical.end = next.end;
        }
        Ok(Some(logical))
    }

    /// Reads lines up to and including the blank line closing the block.
    fn read_block(&mut self, skip_leading_blanks: bool) -> Result<Option<Block>, ManifestError> {
        let mut block: Option<Block> = None;
        while let Some(line) = self.next_logical()? {
            if line.bytes.is_empty() {
                match block.as_mut() {
                    Some(b) => {
                        b.end = line.end;
                        break;
                    }
                    None if skip_leading_blanks => continue,
                    None => {
                        return Ok(Some(Block {
                            lines: Vec::new(),
                            start: line.start,
                            end: line.end,
                        }))
                    }
                }
            }
            let text = self.decoder.decode(&line.bytes)?;
            match block.as_mut() {
                Some(b) => {
                    b.lines.push(text);
                    b.end = line.end;
                }
                None => {
                    block = Some(Block {
                        lines: vec![text],
                        start: line.start,
                        end: line.end,
                    })
                }
            }
        }
        Ok(block)
    }
}

fn split_attribute(line: &str) -> Result<(AttributeName, &str), ManifestError> {
    let colon = line
        .find(':')
        .ok_or_else(|| ManifestError::Format(format!("missing ':' in line `{}`", line)))?;
    let value = line[colon + 1..]
        .strip_prefix(' ')
        .ok_or_else(|| ManifestError::Format(format!("missing space after ':' in line `{}`", line)))?;
    Ok((AttributeName::new(&line[..colon])?, value))
}

fn fill(attrs: &mut AttributeSet, lines: &[String]) -> Result<(), ManifestError> {
    for line in lines {
        let (key, value) = split_attribute(line)?;
        attrs.put(key, value);
    }
    Ok(())
}

fn parse_bytes(data: &[u8], options: &ParseOptions) -> Result<(Manifest, Option<Chunks>), ManifestError> {
    let mut parser = Parser {
        lines: PhysicalLines { data, pos: 0 }.peekable(),
        decoder: LineDecoder {
            charset: options.charset.clone(),
            fallback: false,
        },
    };
    let mut manifest = Manifest::new();
    let mut chunks = options.capture_chunks.then(Chunks::new);

    if let Some(main) = parser.read_block(false)? {
        fill(&mut manifest.main, &main.lines)?;
    }
    if let Some(required) = &options.required_version {
        if !manifest.main.contains(required) {
            return Err(ManifestError::MissingVersion(required.to_string()));
        }
    }

    let name_key = AttributeName::trusted(NAME);
    while let Some(block) = parser.read_block(true)? {
        let (header, rest) = block
            .lines
            .split_first()
            .ok_or_else(|| ManifestError::Format("empty entry section".into()))?;
        let (key, entry_name) = split_attribute(header)?;
        if key != name_key {
            return Err(ManifestError::Format(format!(
                "entry section starts with `{}` instead of `Name`",
                key
            )));
        }
        if entry_name.is_empty() {
            return Err(ManifestError::Format("entry section with empty name".into()));
        }
        fill(manifest.entry_mut(entry_name), rest)?;
        if let Some(chunks) = chunks.as_mut() {
            chunks.insert(entry_name.to_string(), data[block.start..block.end].to_vec());
        }
    }

    Ok((manifest, chunks))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> AttributeName {
        AttributeName::new(s).unwrap()
    }

    #[test]
    fn parses_main_and_entry_sections() {
        let text = b"Manifest-Version: 1.0\r\nCreated-By: test\r\n\r\nName: a.txt\r\nSHA-Digest: abc=\r\n\r\nName: dir/b.bin\r\nSHA-256-Digest: def=\r\n\r\n";
        let m = Manifest::parse(text).unwrap();
        assert_eq!(m.main_attributes().get_str("manifest-version"), Some("1.0"));
        assert_eq!(m.main_attributes().get_str("Created-By"), Some("test"));
        assert_eq!(m.entry_count(), 2);
        assert_eq!(m.entry("a.txt").unwrap().get_str("SHA-Digest"), Some("abc="));
        assert_eq!(m.entry("dir/b.bin").unwrap().get_str("sha-256-digest"), Some("def="));
    }

    #[test]
    fn accepts_all_line_terminators() {
        let text = b"Manifest-Version: 1.0\rA: 1\n\r\nName: x\rB: 2\r\rName: y\nC: 3";
        let m = Manifest::parse(text).unwrap();
        assert_eq!(m.main_attributes().get_str("A"), Some("1"));
        assert_eq!(m.entry("x").unwrap().get_str("B"), Some("2"));
        assert_eq!(m.entry("y").unwrap().get_str("C"), Some("3"));
    }

    #[test]
    fn joins_continuation_lines() {
        let text = b"Manifest-Version: 1.0\n\nName: a/very/long/path/that/was/fol\n ded/by/the/writer.class\nSHA-Digest: abc\n  def\n\n";
        let m = Manifest::parse(text).unwrap();
        let attrs = m.entry("a/very/long/path/that/was/folded/by/the/writer.class").unwrap();
        assert_eq!(attrs.get_str("SHA-Digest"), Some("abc def"));
    }

    #[test]
    fn missing_version_is_reported() {
        let opts = ParseOptions::new().require_version(AttributeName::manifest_version());
        let err = Manifest::parse_with(b"Created-By: x\n\n".to_vec(), &opts).unwrap_err();
        assert_eq!(err, ManifestError::MissingVersion("Manifest-Version".into()));

        let ok = Manifest::parse_with(b"manifest-version: 1.0\n\n".to_vec(), &opts);
        assert!(ok.is_ok());
    }

    #[test]
    fn malformed_lines_fail() {
        let cases: [&[u8]; 6] = [
            b"Manifest-Version 1.0\n",
            b"Manifest-Version:1.0\n",
            b"Manifest-Version: 1.0\n\nSHA-Digest: abc\n\n",
            b"Manifest-Version: 1.0\n\nName:x\n\n",
            b" leading continuation\n",
            b"Bad Key: v\n",
        ];
        for case in cases {
            assert!(
                matches!(Manifest::parse(case), Err(ManifestError::Format(_))),
                "{:?} should fail",
                String::from_utf8_lossy(case)
            );
        }
    }

    #[test]
    fn empty_and_blank_inputs_are_empty_manifests() {
        assert_eq!(Manifest::parse(b"").unwrap(), Manifest::new());
        assert_eq!(Manifest::parse(b"\r\n").unwrap(), Manifest::new());
        let m = Manifest::parse(b"\nName: a\nX: 1\n\n\n\nName: b\nY: 2\n").unwrap();
        assert!(m.main_attributes().is_empty());
        assert_eq!(m.entry_count(), 2);
    }

    #[test]
    fn utf8_fallback_is_sticky() {
        let text = b"Manifest-Version: 1.0\nA: caf\xC3\xA9\n\nName: x\nB: \xFF\nC: caf\xC3\xA9\n\n";
        let m = Manifest::parse(text).unwrap();
        assert_eq!(m.main_attributes().get_str("A"), Some("café"));
        let x = m.entry("x").unwrap();
        assert_eq!(x.get_str("B"), Some("\u{ff}"));
        assert_eq!(x.get_str("C"), Some("caf\u{c3}\u{a9}"));
    }

    #[test]
    fn configured_charset_is_used_for_every_line() {
        let opts = ParseOptions::new().with_charset(Arc::new(Latin1));
        let parsed = Manifest::parse_with(b"A: caf\xC3\xA9\n".to_vec(), &opts).unwrap();
        assert_eq!(
            parsed.manifest.main_attributes().get_str("A"),
            Some("caf\u{c3}\u{a9}")
        );
    }

    #[test]
    fn chunks_hold_exact_section_bytes() {
        let text = b"Manifest-Version: 1.0\r\n\r\nName: a\r\nSHA-Digest: x\r\n\r\n\r\nName: long-na\r\n me\r\nSHA-Digest: y\r\n";
        let parsed = Manifest::parse_with(text.to_vec(), &ParseOptions::new().with_chunks()).unwrap();
        let chunks = parsed.chunks.unwrap();
        assert_eq!(chunks["a"], b"Name: a\r\nSHA-Digest: x\r\n\r\n".to_vec());
        assert_eq!(chunks["long-name"], b"Name: long-na\r\n me\r\nSHA-Digest: y\r\n".to_vec());
        assert_eq!(parsed.raw, text.to_vec());
    }

    #[test]
    fn chunks_are_not_kept_unless_requested() {
        let parsed = Manifest::parse_with(b"\nName: a\nX: 1\n\n".to_vec(), &ParseOptions::new()).unwrap();
        assert!(parsed.chunks.is_none());
    }

    #[test]
    fn writer_output_parses_back() {
        let mut m = Manifest::new();
        m.main_attributes_mut().put(name("Created-By"), "zipverifierust");
        m.main_attributes_mut().put(name("Manifest-Version"), "1.0");
        let long_value = "é".repeat(50) + &"x".repeat(130);
        let mut attrs = AttributeSet::new();
        attrs.put(name("SHA-256-Digest"), "q1w2e3r4t5y6u7i8o9p0==");
        attrs.put(name("X-Long"), long_value.clone());
        attrs.put(name("X-Empty"), "");
        attrs.put(name("X-Spaced"), " leading space");
        m.insert_entry("some/deeply/nested/directory/structure/with/a/rather/long/file-name.class", attrs);

        let bytes = m.to_bytes();
        assert!(bytes.starts_with(b"Manifest-Version: 1.0\r\n"));
        for line in bytes.split(|&b| b == b'\n') {
            assert!(line.len() <= MAX_LINE_BYTES + 1, "line too long: {}", line.len());
        }
        let parsed = Manifest::parse(&bytes).unwrap();
        assert_eq!(parsed, m);
        let entry = parsed
            .entry("some/deeply/nested/directory/structure/with/a/rather/long/file-name.class")
            .unwrap();
        assert_eq!(entry.get_str("X-Long"), Some(long_value.as_str()));
    }

    #[test]
    fn entry_section_matches_captured_chunk() {
        let mut attrs = AttributeSet::new();
        attrs.put(name("SHA-Digest"), "abc=");
        let mut m = Manifest::new();
        m.main_attributes_mut().put(AttributeName::manifest_version(), "1.0");
        m.insert_entry("a.txt", attrs.clone());

        let parsed = Manifest::parse_with(m.to_bytes(), &ParseOptions::new().with_chunks()).unwrap();
        assert_eq!(parsed.chunks.unwrap()["a.txt"], entry_section("a.txt", &attrs));
    }
}
