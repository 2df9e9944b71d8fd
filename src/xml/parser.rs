use crate::analysis::normalize::unescape;
use crate::core::error::{Error, ErrorKind, Result};
use crate::xml::node::XmlArena;

/// Lexical token stream over raw XML text. Shared by the tree parser and
/// the validator so both see identical structure.
#[derive(Debug, Clone, PartialEq)]
pub enum XmlToken<'a> {
    Open { name: &'a str, attributes: &'a str },
    Close { name: &'a str },
    SelfClose { name: &'a str, attributes: &'a str },
    Text(&'a str),
    Cdata(&'a str),
    Skip, // declarations, comments, processing instructions
}

pub struct XmlLexer<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> XmlLexer<'a> {
    pub fn new(text: &'a str) -> Self {
        XmlLexer { text, pos: 0 }
    }

    pub fn next_token(&mut self) -> Result<Option<XmlToken<'a>>> {
        if self.pos >= self.text.len() {
            return Ok(None);
        }
        let rest = &self.text[self.pos..];

        if !rest.starts_with('<') {
            let end = rest.find('<').unwrap_or(rest.len());
            let token = XmlToken::Text(&rest[..end]);
            self.pos += end;
            return Ok(Some(token));
        }

        if let Some(body) = rest.strip_prefix("<![CDATA[") {
            let end = body.find("]]>").ok_or_else(|| {
                Error::new(ErrorKind::Parse, "unterminated CDATA section")
            })?;
            self.pos += 9 + end + 3;
            return Ok(Some(XmlToken::Cdata(&body[..end])));
        }

        if rest.starts_with("<!--") {
            let end = rest.find("-->").ok_or_else(|| {
                Error::new(ErrorKind::Parse, "unterminated comment")
            })?;
            self.pos += end + 3;
            return Ok(Some(XmlToken::Skip));
        }

        if rest.starts_with("<!") || rest.starts_with("<?") {
            // DOCTYPE may carry an internal subset in square brackets
            let mut depth = 0usize;
            for (offset, ch) in rest.char_indices() {
                match ch {
                    '[' => depth += 1,
                    ']' => depth = depth.saturating_sub(1),
                    '>' if depth == 0 => {
                        self.pos += offset + 1;
                        return Ok(Some(XmlToken::Skip));
                    }
                    _ => {}
                }
            }
            return Err(Error::new(ErrorKind::Parse, "unterminated declaration"));
        }

        let end = rest.find('>').ok_or_else(|| {
            Error::new(ErrorKind::Parse, "unterminated element tag")
        })?;
        let inner = &rest[1..end];
        self.pos += end + 1;

        if let Some(name) = inner.strip_prefix('/') {
            return Ok(Some(XmlToken::Close { name: name.trim() }));
        }

        let self_closing = inner.ends_with('/');
        let inner = if self_closing {
            inner[..inner.len() - 1].trim_end()
        } else {
            inner
        };
        let (name, attributes) = match inner.find(char::is_whitespace) {
            Some(split) => (&inner[..split], inner[split..].trim()),
            None => (inner, ""),
        };
        if name.is_empty() {
            return Err(Error::new(ErrorKind::Parse, "empty element name"));
        }

        if self_closing {
            Ok(Some(XmlToken::SelfClose { name, attributes }))
        } else {
            Ok(Some(XmlToken::Open { name, attributes }))
        }
    }
}

/// Parse one record into the arena, returning the root node index.
/// The arena is reset first; previous indices become invalid.
pub fn parse_into(arena: &mut XmlArena, text: &str) -> Result<usize> {
    arena.reset();

    let mut lexer = XmlLexer::new(text);
    let mut stack: Vec<usize> = Vec::new();
    let mut last_child: Vec<Option<usize>> = Vec::new();
    let mut root: Option<usize> = None;

    while let Some(token) = lexer.next_token()? {
        match token {
            XmlToken::Open { name, attributes } => {
                let node = arena.alloc(name, attributes);
                attach(arena, &mut stack, &mut last_child, &mut root, node)?;
                stack.push(node);
                last_child.push(None);
            }
            XmlToken::SelfClose { name, attributes } => {
                let node = arena.alloc(name, attributes);
                attach(arena, &mut stack, &mut last_child, &mut root, node)?;
            }
            XmlToken::Close { name } => {
                let open = stack.pop().ok_or_else(|| {
                    Error::new(
                        ErrorKind::Parse,
                        format!("closing </{}> without an open element", name),
                    )
                })?;
                last_child.pop();
                if arena.node(open).name != name {
                    return Err(Error::new(
                        ErrorKind::Parse,
                        format!(
                            "mismatched </{}>, expected </{}>",
                            name,
                            arena.node(open).name
                        ),
                    ));
                }
            }
            XmlToken::Text(text) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    continue;
                }
                match stack.last() {
                    Some(&parent) => {
                        let decoded = unescape(trimmed);
                        let node = &mut arena.nodes[parent];
                        if !node.content.is_empty() {
                            node.content.push(' ');
                        }
                        node.content.push_str(&decoded);
                    }
                    None => {
                        return Err(Error::new(
                            ErrorKind::Parse,
                            format!("content outside the root element: {:.40}", trimmed),
                        ));
                    }
                }
            }
            XmlToken::Cdata(text) => {
                if let Some(&parent) = stack.last() {
                    let node = &mut arena.nodes[parent];
                    if !node.content.is_empty() {
                        node.content.push(' ');
                    }
                    node.content.push_str(text);
                }
            }
            XmlToken::Skip => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(Error::new(
            ErrorKind::Parse,
            format!("unclosed <{}> at end of record", arena.node(*open).name),
        ));
    }
    root.ok_or_else(|| Error::new(ErrorKind::Parse, "record has no root element"))
}

fn attach(
    arena: &mut XmlArena,
    stack: &mut [usize],
    last_child: &mut [Option<usize>],
    root: &mut Option<usize>,
    node: usize,
) -> Result<()> {
    match stack.last() {
        Some(&parent) => {
            let slot = last_child.last_mut().unwrap();
            match *slot {
                Some(prev) => arena.nodes[prev].next_sibling = Some(node),
                None => arena.nodes[parent].first_child = Some(node),
            }
            *slot = Some(node);
            Ok(())
        }
        None => {
            if root.is_some() {
                return Err(Error::new(
                    ErrorKind::Parse,
                    "multiple root elements in record",
                ));
            }
            *root = Some(node);
            Ok(())
        }
    }
}
