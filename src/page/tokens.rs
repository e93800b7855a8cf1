//! Streaming HTML token source
//!
//! Wraps the html5ever tokenizer (no tree construction) behind a
//! forward-only iterator. Body bytes are fed one chunk at a time; tokens
//! become available as soon as the tokenizer has seen enough input.

use html5ever::tendril::StrTendril;
use html5ever::tokenizer::states::RawKind;
use html5ever::tokenizer::{
    BufferQueue, TagKind, Token, TokenSink, TokenSinkResult, Tokenizer, TokenizerOpts,
};
use std::collections::VecDeque;

/// One lexical HTML event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HtmlToken {
    /// Tag and attribute names are lowercase
    StartTag {
        name: String,
        attrs: Vec<(String, String)>,
        self_closing: bool,
    },
    EndTag {
        name: String,
    },
    Text(String),
    Error(String),
}

impl HtmlToken {
    /// Value of the named attribute on a start tag
    pub fn attr(&self, key: &str) -> Option<&str> {
        match self {
            HtmlToken::StartTag { attrs, .. } => attrs
                .iter()
                .find(|(name, _)| name == key)
                .map(|(_, value)| value.as_str()),
            _ => None,
        }
    }
}

/// Elements whose contents are not interpreted as markup
fn raw_text_kind(name: &str) -> Option<RawKind> {
    match name {
        "script" => Some(RawKind::ScriptData),
        "title" | "textarea" => Some(RawKind::Rcdata),
        "style" | "xmp" | "iframe" | "noembed" | "noframes" => Some(RawKind::Rawtext),
        _ => None,
    }
}

pub(crate) fn is_raw_text(name: &str) -> bool {
    raw_text_kind(name).is_some()
}

/// Collects tokenizer output, merging adjacent character runs
#[derive(Default)]
struct TokenQueue {
    tokens: VecDeque<HtmlToken>,
}

impl TokenQueue {
    fn push_text(&mut self, text: &str) {
        if let Some(HtmlToken::Text(last)) = self.tokens.back_mut() {
            last.push_str(text);
        } else {
            self.tokens.push_back(HtmlToken::Text(text.to_string()));
        }
    }
}

impl TokenSink for TokenQueue {
    type Handle = ();

    fn process_token(&mut self, token: Token, _line_number: u64) -> TokenSinkResult<()> {
        match token {
            Token::TagToken(tag) => {
                let name = tag.name.to_string();
                match tag.kind {
                    TagKind::StartTag => {
                        let raw = raw_text_kind(&name);
                        let attrs = tag
                            .attrs
                            .iter()
                            .map(|a| (a.name.local.to_string(), a.value.to_string()))
                            .collect();
                        self.tokens.push_back(HtmlToken::StartTag {
                            name,
                            attrs,
                            self_closing: tag.self_closing,
                        });
                        if let Some(kind) = raw {
                            return TokenSinkResult::RawData(kind);
                        }
                    }
                    TagKind::EndTag => self.tokens.push_back(HtmlToken::EndTag { name }),
                }
            }
            Token::CharacterTokens(text) => self.push_text(&text),
            Token::ParseError(message) => {
                self.tokens.push_back(HtmlToken::Error(message.into_owned()))
            }
            Token::NullCharacterToken
            | Token::DoctypeToken(_)
            | Token::CommentToken(_)
            | Token::EOFToken => {}
        }
        TokenSinkResult::Continue
    }
}

/// Pull-based HTML token stream fed with raw body chunks
///
/// Invalid UTF-8 is replaced with U+FFFD; a multi-byte sequence split across
/// two chunks is reassembled.
pub struct HtmlTokens {
    tokenizer: Tokenizer<TokenQueue>,
    input: BufferQueue,
    carry: Vec<u8>,
    ended: bool,
}

impl HtmlTokens {
    pub fn new() -> Self {
        Self {
            tokenizer: Tokenizer::new(TokenQueue::default(), TokenizerOpts::default()),
            input: BufferQueue::new(),
            carry: Vec::new(),
            ended: false,
        }
    }

    /// Tokenizes a complete document
    pub fn from_str(html: &str) -> Self {
        let mut tokens = Self::new();
        tokens.feed(html.as_bytes());
        tokens.finish();
        tokens
    }

    /// Feeds the next chunk of body bytes; ignored after [`HtmlTokens::finish`]
    pub fn feed(&mut self, chunk: &[u8]) {
        if self.ended {
            return;
        }
        let text = self.decode(chunk);
        self.push_str(text);
    }

    /// Signals end of input, flushing any buffered text
    pub fn finish(&mut self) {
        if self.ended {
            return;
        }
        if !self.carry.is_empty() {
            let rest = String::from_utf8_lossy(&self.carry).into_owned();
            self.carry.clear();
            self.push_str(rest);
        }
        self.tokenizer.end();
        self.ended = true;
    }

    fn push_str(&mut self, text: String) {
        if text.is_empty() {
            return;
        }
        self.input.push_back(StrTendril::from(text));
        // The sink never yields script handles, so this always runs to completion
        let _ = self.tokenizer.feed(&mut self.input);
    }

    /// Decodes as much of `carry + chunk` as possible, keeping an incomplete trailing sequence
    fn decode(&mut self, chunk: &[u8]) -> String {
        self.carry.extend_from_slice(chunk);

        let mut out = String::with_capacity(self.carry.len());
        loop {
            match std::str::from_utf8(&self.carry) {
                Ok(valid) => {
                    out.push_str(valid);
                    self.carry.clear();
                    return out;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.carry[..valid]));
                    match e.error_len() {
                        None => {
                            self.carry.drain(..valid);
                            return out;
                        }
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.carry.drain(..valid + len);
                        }
                    }
                }
            }
        }
    }
}

impl Default for HtmlTokens {
    fn default() -> Self {
        Self::new()
    }
}

impl Iterator for HtmlTokens {
    type Item = HtmlToken;

    fn next(&mut self) -> Option<HtmlToken> {
        self.tokenizer.sink.tokens.pop_front()
    }
}
