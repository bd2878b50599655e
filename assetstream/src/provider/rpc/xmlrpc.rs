//! Minimal XML-RPC codec.
//!
//! Covers the value types avatar storage uses: strings, integers, booleans,
//! doubles, base64 blobs, structs and arrays.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;

/// Errors from an XML-RPC exchange.
#[derive(Debug, Clone, Error)]
pub enum RpcError {
    /// The request could not be sent or the reply could not be read.
    #[error("HTTP error: {0}")]
    Http(String),

    /// The server answered with a non-success HTTP status.
    #[error("HTTP status {0}")]
    Status(u16),

    /// The reply is not a well-formed method response.
    #[error("Malformed XML-RPC reply: {0}")]
    Parse(String),

    /// The server returned a fault.
    #[error("XML-RPC fault {code}: {message}")]
    Fault { code: i64, message: String },
}

/// An XML-RPC value.
#[derive(Debug, Clone, PartialEq)]
pub enum RpcValue {
    String(String),
    Int(i64),
    Bool(bool),
    Double(f64),
    Base64(Vec<u8>),
    Struct(BTreeMap<String, RpcValue>),
    Array(Vec<RpcValue>),
}

impl RpcValue {
    /// Build a struct from name/value pairs.
    pub fn structure<I, K>(members: I) -> Self
    where
        I: IntoIterator<Item = (K, RpcValue)>,
        K: Into<String>,
    {
        RpcValue::Struct(members.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            RpcValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            RpcValue::Base64(b) => Some(b),
            _ => None,
        }
    }

    /// Struct member lookup. `None` for missing members and non-structs.
    pub fn member(&self, name: &str) -> Option<&RpcValue> {
        match self {
            RpcValue::Struct(members) => members.get(name),
            _ => None,
        }
    }
}

/// Serialize a method call.
pub fn encode_call(method: &str, params: &[RpcValue]) -> String {
    let mut out = String::from("<?xml version=\"1.0\"?><methodCall><methodName>");
    out.push_str(&escape(method));
    out.push_str("</methodName><params>");
    for param in params {
        out.push_str("<param>");
        write_value(&mut out, param);
        out.push_str("</param>");
    }
    out.push_str("</params></methodCall>");
    out
}

/// Serialize a successful method response.
pub fn encode_response(value: &RpcValue) -> String {
    let mut out = String::from("<?xml version=\"1.0\"?><methodResponse><params><param>");
    write_value(&mut out, value);
    out.push_str("</param></params></methodResponse>");
    out
}

/// Serialize a fault response.
pub fn encode_fault(code: i64, message: &str) -> String {
    let fault = RpcValue::structure([
        ("faultCode", RpcValue::Int(code)),
        ("faultString", RpcValue::String(message.to_string())),
    ]);
    let mut out = String::from("<?xml version=\"1.0\"?><methodResponse><fault>");
    write_value(&mut out, &fault);
    out.push_str("</fault></methodResponse>");
    out
}

fn write_value(out: &mut String, value: &RpcValue) {
    out.push_str("<value>");
    match value {
        RpcValue::String(s) => {
            out.push_str("<string>");
            out.push_str(&escape(s.as_str()));
            out.push_str("</string>");
        }
        RpcValue::Int(i) => out.push_str(&format!("<int>{}</int>", i)),
        RpcValue::Bool(b) => out.push_str(&format!("<boolean>{}</boolean>", u8::from(*b))),
        RpcValue::Double(d) => out.push_str(&format!("<double>{}</double>", d)),
        RpcValue::Base64(bytes) => {
            out.push_str("<base64>");
            out.push_str(&STANDARD.encode(bytes));
            out.push_str("</base64>");
        }
        RpcValue::Struct(members) => {
            out.push_str("<struct>");
            for (name, member) in members {
                out.push_str("<member><name>");
                out.push_str(&escape(name.as_str()));
                out.push_str("</name>");
                write_value(out, member);
                out.push_str("</member>");
            }
            out.push_str("</struct>");
        }
        RpcValue::Array(items) => {
            out.push_str("<array><data>");
            for item in items {
                write_value(out, item);
            }
            out.push_str("</data></array>");
        }
    }
    out.push_str("</value>");
}

/// Parse a method response into its single return value.
///
/// A fault response becomes [`RpcError::Fault`].
pub fn decode_response(body: &str) -> Result<RpcValue, RpcError> {
    let mut parser = Parser::new(tokenize(body)?);
    parser.expect_open("methodResponse")?;

    match parser.next()? {
        Token::Open(tag) if tag == "params" => {
            parser.expect_open("param")?;
            let value = parser.value()?;
            parser.expect_close("param")?;
            parser.expect_close("params")?;
            Ok(value)
        }
        Token::Open(tag) if tag == "fault" => {
            let fault = parser.value()?;
            let code = match fault.member("faultCode") {
                Some(RpcValue::Int(code)) => *code,
                _ => 0,
            };
            let message = fault
                .member("faultString")
                .and_then(RpcValue::as_str)
                .unwrap_or_default()
                .to_string();
            Err(RpcError::Fault { code, message })
        }
        other => Err(unexpected("params or fault", &other)),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Open(String),
    Close(String),
    Empty(String),
    Text(String),
}

fn tokenize(body: &str) -> Result<Vec<Token>, RpcError> {
    let mut reader = Reader::from_str(body);
    reader.config_mut().trim_text(true);

    let mut tokens = Vec::new();
    loop {
        let event = reader
            .read_event()
            .map_err(|e| RpcError::Parse(e.to_string()))?;
        match event {
            Event::Start(e) => tokens.push(Token::Open(tag_name(e.name().as_ref()))),
            Event::End(e) => tokens.push(Token::Close(tag_name(e.name().as_ref()))),
            Event::Empty(e) => tokens.push(Token::Empty(tag_name(e.name().as_ref()))),
            Event::Text(e) => {
                let text = e.unescape().map_err(|e| RpcError::Parse(e.to_string()))?;
                tokens.push(Token::Text(text.into_owned()));
            }
            Event::CData(e) => {
                tokens.push(Token::Text(String::from_utf8_lossy(&e.into_inner()).into_owned()));
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(tokens)
}

fn tag_name(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).into_owned()
}

fn unexpected(expected: &str, found: &Token) -> RpcError {
    RpcError::Parse(format!("expected {}, found {:?}", expected, found))
}

struct Parser {
    tokens: std::vec::IntoIter<Token>,
    peeked: Option<Token>,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens: tokens.into_iter(),
            peeked: None,
        }
    }

    fn next(&mut self) -> Result<Token, RpcError> {
        self.peeked
            .take()
            .or_else(|| self.tokens.next())
            .ok_or_else(|| RpcError::Parse("unexpected end of document".to_string()))
    }

    fn peek(&mut self) -> Option<&Token> {
        if self.peeked.is_none() {
            self.peeked = self.tokens.next();
        }
        self.peeked.as_ref()
    }

    fn peek_is_text(&mut self) -> bool {
        matches!(self.peek(), Some(Token::Text(_)))
    }

    fn peek_is_close(&mut self, name: &str) -> bool {
        matches!(self.peek(), Some(Token::Close(tag)) if tag == name)
    }

    fn expect_open(&mut self, name: &str) -> Result<(), RpcError> {
        match self.next()? {
            Token::Open(tag) if tag == name => Ok(()),
            other => Err(unexpected(&format!("<{}>", name), &other)),
        }
    }

    fn expect_close(&mut self, name: &str) -> Result<(), RpcError> {
        match self.next()? {
            Token::Close(tag) if tag == name => Ok(()),
            other => Err(unexpected(&format!("</{}>", name), &other)),
        }
    }

    /// Text up to the closing tag; empty when the element has no text.
    fn text_until(&mut self, name: &str) -> Result<String, RpcError> {
        if self.peek_is_text() {
            if let Token::Text(text) = self.next()? {
                self.expect_close(name)?;
                return Ok(text);
            }
        }
        self.expect_close(name)?;
        Ok(String::new())
    }

    fn value(&mut self) -> Result<RpcValue, RpcError> {
        match self.next()? {
            Token::Open(tag) if tag == "value" => {}
            Token::Empty(tag) if tag == "value" => return Ok(RpcValue::String(String::new())),
            other => return Err(unexpected("<value>", &other)),
        }

        let value = match self.next()? {
            // Untyped values are strings
            Token::Text(text) => {
                self.expect_close("value")?;
                return Ok(RpcValue::String(text));
            }
            Token::Close(tag) if tag == "value" => return Ok(RpcValue::String(String::new())),
            Token::Empty(tag) => empty_value(&tag)?,
            Token::Open(tag) => self.typed_value(&tag)?,
            other => return Err(unexpected("value content", &other)),
        };

        self.expect_close("value")?;
        Ok(value)
    }

    fn typed_value(&mut self, tag: &str) -> Result<RpcValue, RpcError> {
        match tag {
            "string" => Ok(RpcValue::String(self.text_until(tag)?)),
            "int" | "i4" | "i8" => {
                let text = self.text_until(tag)?;
                text.trim()
                    .parse()
                    .map(RpcValue::Int)
                    .map_err(|_| RpcError::Parse(format!("bad integer '{}'", text)))
            }
            "boolean" => match self.text_until(tag)?.trim() {
                "1" | "true" => Ok(RpcValue::Bool(true)),
                "0" | "false" => Ok(RpcValue::Bool(false)),
                other => Err(RpcError::Parse(format!("bad boolean '{}'", other))),
            },
            "double" => {
                let text = self.text_until(tag)?;
                text.trim()
                    .parse()
                    .map(RpcValue::Double)
                    .map_err(|_| RpcError::Parse(format!("bad double '{}'", text)))
            }
            "base64" => {
                let text: String = self
                    .text_until(tag)?
                    .chars()
                    .filter(|c| !c.is_whitespace())
                    .collect();
                STANDARD
                    .decode(text)
                    .map(RpcValue::Base64)
                    .map_err(|e| RpcError::Parse(format!("bad base64: {}", e)))
            }
            "struct" => self.structure(),
            "array" => self.array(),
            other => Err(RpcError::Parse(format!("unsupported type <{}>", other))),
        }
    }

    fn structure(&mut self) -> Result<RpcValue, RpcError> {
        let mut members = BTreeMap::new();
        loop {
            match self.next()? {
                Token::Close(tag) if tag == "struct" => break,
                Token::Open(tag) if tag == "member" => {
                    self.expect_open("name")?;
                    let name = self.text_until("name")?;
                    let value = self.value()?;
                    self.expect_close("member")?;
                    members.insert(name, value);
                }
                other => return Err(unexpected("<member>", &other)),
            }
        }
        Ok(RpcValue::Struct(members))
    }

    fn array(&mut self) -> Result<RpcValue, RpcError> {
        let mut items = Vec::new();
        match self.next()? {
            Token::Empty(tag) if tag == "data" => {}
            Token::Open(tag) if tag == "data" => {
                while !self.peek_is_close("data") {
                    items.push(self.value()?);
                }
                self.expect_close("data")?;
            }
            other => return Err(unexpected("<data>", &other)),
        }
        self.expect_close("array")?;
        Ok(RpcValue::Array(items))
    }
}

fn empty_value(tag: &str) -> Result<RpcValue, RpcError> {
    match tag {
        "string" => Ok(RpcValue::String(String::new())),
        "base64" => Ok(RpcValue::Base64(Vec::new())),
        "struct" => Ok(RpcValue::Struct(BTreeMap::new())),
        "array" => Ok(RpcValue::Array(Vec::new())),
        other => Err(RpcError::Parse(format!("empty <{}>", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_call_escapes_text() {
        let xml = encode_call(
            "GetItem",
            &[RpcValue::structure([("hashcode", RpcValue::String("a<b".into()))])],
        );
        assert!(xml.starts_with("<?xml version=\"1.0\"?><methodCall><methodName>GetItem</methodName>"));
        assert!(xml.contains("<member><name>hashcode</name><value><string>a&lt;b</string></value></member>"));
    }

    #[test]
    fn test_decode_struct_with_binaries() {
        let reply = encode_response(&RpcValue::structure([
            ("binaries", RpcValue::Base64(vec![0, 1, 2, 255])),
            ("name", RpcValue::String("skirt".into())),
            ("count", RpcValue::Int(3)),
            ("flag", RpcValue::Bool(true)),
        ]));

        let value = decode_response(&reply).unwrap();
        assert_eq!(
            value.member("binaries").and_then(RpcValue::as_bytes),
            Some(&[0u8, 1, 2, 255][..])
        );
        assert_eq!(value.member("name").and_then(RpcValue::as_str), Some("skirt"));
        assert_eq!(value.member("count"), Some(&RpcValue::Int(3)));
        assert_eq!(value.member("flag"), Some(&RpcValue::Bool(true)));
    }

    #[test]
    fn test_decode_handwritten_reply() {
        let reply = r#"<?xml version="1.0" encoding="UTF-8"?>
            <methodResponse>
              <params>
                <param>
                  <value>
                    <struct>
                      <member><name>Error</name><value>No such item</value></member>
                      <member><name>items</name>
                        <value><array><data>
                          <value><i4>7</i4></value>
                          <value><double>1.5</double></value>
                        </data></array></value>
                      </member>
                      <member><name>blob</name><value><base64>
                        AAEC
                      </base64></value></member>
                    </struct>
                  </value>
                </param>
              </params>
            </methodResponse>"#;

        let value = decode_response(reply).unwrap();
        assert_eq!(value.member("Error").and_then(RpcValue::as_str), Some("No such item"));
        assert_eq!(
            value.member("items"),
            Some(&RpcValue::Array(vec![RpcValue::Int(7), RpcValue::Double(1.5)]))
        );
        assert_eq!(
            value.member("blob").and_then(RpcValue::as_bytes),
            Some(&[0u8, 1, 2][..])
        );
    }

    #[test]
    fn test_decode_fault() {
        let result = decode_response(&encode_fault(4, "Too many parameters"));
        assert!(matches!(
            result,
            Err(RpcError::Fault { code: 4, message }) if message == "Too many parameters"
        ));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(decode_response("<html>nope</html>"), Err(RpcError::Parse(_))));
        assert!(matches!(
            decode_response("<methodResponse><params>"),
            Err(RpcError::Parse(_))
        ));
    }

    #[test]
    fn test_empty_values() {
        let reply = "<methodResponse><params><param><value><string/></value></param></params></methodResponse>";
        assert_eq!(decode_response(reply).unwrap(), RpcValue::String(String::new()));
    }
}
