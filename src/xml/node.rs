/// Arena-backed XML tree. Nodes link through first-child and next-sibling
/// indices only, so the structure is a strict rooted tree. The arena is
/// reused across parse calls; node lifetimes end at the next parse.
pub struct XmlArena {
    pub nodes: Vec<XmlNode>,
    chunk: usize,
}

#[derive(Debug, Clone)]
pub struct XmlNode {
    pub name: String,
    pub attributes: String,
    pub content: String,
    pub first_child: Option<usize>,
    pub next_sibling: Option<usize>,
}

impl XmlArena {
    /// `chunk` is the node-pool allocation quantum (the `farm_size` tunable).
    pub fn new(chunk: usize) -> Self {
        XmlArena {
            nodes: Vec::with_capacity(chunk.max(16)),
            chunk: chunk.max(16),
        }
    }

    pub fn reset(&mut self) {
        self.nodes.clear();
    }

    pub fn alloc(&mut self, name: &str, attributes: &str) -> usize {
        if self.nodes.len() == self.nodes.capacity() {
            self.nodes.reserve(self.chunk);
        }
        let index = self.nodes.len();
        self.nodes.push(XmlNode {
            name: name.to_string(),
            attributes: attributes.to_string(),
            content: String::new(),
            first_child: None,
            next_sibling: None,
        });
        index
    }

    pub fn node(&self, index: usize) -> &XmlNode {
        &self.nodes[index]
    }

    pub fn children(&self, index: usize) -> ChildIter<'_> {
        ChildIter {
            arena: self,
            next: self.nodes[index].first_child,
        }
    }

    pub fn find_child(&self, index: usize, name: &str) -> Option<usize> {
        self.children(index).find(|&c| self.nodes[c].name == name)
    }

    /// Attribute value by name, parsed from the raw attribute text.
    pub fn attribute(&self, index: usize, name: &str) -> Option<String> {
        parse_attribute(&self.nodes[index].attributes, name)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

pub struct ChildIter<'a> {
    arena: &'a XmlArena,
    next: Option<usize>,
}

impl<'a> Iterator for ChildIter<'a> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let current = self.next?;
        self.next = self.arena.nodes[current].next_sibling;
        Some(current)
    }
}

pub fn parse_attribute(attributes: &str, name: &str) -> Option<String> {
    let mut rest = attributes;
    while let Some(eq) = rest.find('=') {
        let key = rest[..eq].trim();
        let after = rest[eq + 1..].trim_start();
        let quote = after.chars().next()?;
        if quote != '"' && quote != '\'' {
            return None;
        }
        let close = after[1..].find(quote)?;
        let value = &after[1..1 + close];
        if key == name {
            return Some(value.to_string());
        }
        rest = &after[close + 2..];
    }
    None
}
