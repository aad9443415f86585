//! Minimal XML walker and plist view over Core Storage metadata.
//!
//! Core Storage embeds Apple XML property lists inside its metadata blocks.
//! Only the subset those plists actually use is understood here:
//!
//! * leaf values: `<string>`, `<integer>` (decimal or `0x…` hex), `<data>`
//!   (base64);
//! * containers: `<dict>` (strictly alternating `<key>`/value children) and
//!   `<array>`;
//! * the outer `<plist version="1.0">` wrapper, which lookups descend
//!   through.
//!
//! The walker is non-mutating: every node borrows `&str` views of the XML
//! buffer, so the buffer must outlive the tree. `<?…?>` declarations and
//! `<!…>` comments/doctypes are skipped.

use crate::encoding::base64;
use crate::{Error, Result};

/// A parsed XML element: tag, raw inner text, child elements.
#[derive(Debug)]
pub struct XmlNode<'a> {
    pub tag: &'a str,
    /// Inner text, exactly as written. Only meaningful for childless nodes.
    pub text: &'a str,
    pub children: Vec<XmlNode<'a>>,
}

impl<'a> XmlNode<'a> {
    /// Parse the first element of an XML document.
    pub fn parse(src: &'a str) -> Result<XmlNode<'a>> {
        let mut parser = Parser { src, pos: 0 };
        loop {
            match parser.next_opening()? {
                Opening::Element => return parser.element(),
                Opening::Skip => continue,
                Opening::Close => return Err(Error::Parse("close tag before any element")),
            }
        }
    }
}

enum Opening {
    Element,
    Skip,
    Close,
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    /// Advance to the next `<` and classify what follows. Leaves `pos` at
    /// the `<`.
    fn next_opening(&mut self) -> Result<Opening> {
        let rest = &self.src[self.pos..];
        let lt = rest.find('<').ok_or(Error::Parse("unterminated element"))?;
        self.pos += lt;
        let rest = &self.src[self.pos..];

        if rest.starts_with("</") {
            return Ok(Opening::Close);
        }
        if rest.starts_with("<!--") {
            let end = rest.find("-->").ok_or(Error::Parse("unterminated comment"))?;
            self.pos += end + 3;
            return Ok(Opening::Skip);
        }
        if rest.starts_with("<?") || rest.starts_with("<!") {
            let end = rest.find('>').ok_or(Error::Parse("unterminated declaration"))?;
            self.pos += end + 1;
            return Ok(Opening::Skip);
        }
        Ok(Opening::Element)
    }

    /// Parse one element starting at `pos` (which sits on `<`).
    fn element(&mut self) -> Result<XmlNode<'a>> {
        let open = self.pos;
        let rest = &self.src[open + 1..];
        let name_len = rest
            .find(|c: char| c == '>' || c == '/' || c.is_whitespace())
            .ok_or(Error::Parse("unterminated tag"))?;
        if name_len == 0 {
            return Err(Error::Parse("empty tag name"));
        }
        let tag = &rest[..name_len];

        // Skip attributes; we never consume them.
        let close = rest.find('>').ok_or(Error::Parse("unterminated tag"))?;
        if close < name_len {
            return Err(Error::Parse("unterminated tag"));
        }
        let self_closing = rest[..close].ends_with('/');
        self.pos = open + 1 + close + 1;

        if self_closing {
            return Ok(XmlNode {
                tag,
                text: "",
                children: Vec::new(),
            });
        }

        let body_start = self.pos;
        let mut children = Vec::new();
        loop {
            match self.next_opening()? {
                Opening::Element => children.push(self.element()?),
                Opening::Skip => continue,
                Opening::Close => {
                    let body_end = self.pos;
                    let rest = &self.src[self.pos + 2..];
                    let end = rest.find('>').ok_or(Error::Parse("unterminated close tag"))?;
                    if rest[..end].trim_end() != tag {
                        return Err(Error::Parse("mismatched close tag"));
                    }
                    self.pos += 2 + end + 1;
                    return Ok(XmlNode {
                        tag,
                        text: &self.src[body_start..body_end],
                        children,
                    });
                }
            }
        }
    }
}

/// A plist entry: a keyed view over the XML tree.
///
/// Dict children carry the `<key>` that named them; array children and the
/// root have no key. Leaf kinds keep their raw inner text in `value`.
#[derive(Debug)]
pub struct PlistEntry<'a> {
    pub key: Option<&'a str>,
    /// The value's tag name: `string`, `integer`, `data`, `dict`, `array`,
    /// or whatever else the document carried.
    pub kind: &'a str,
    pub value: Option<&'a str>,
    pub children: Vec<PlistEntry<'a>>,
}

impl<'a> PlistEntry<'a> {
    /// Parse a plist document.
    ///
    /// A root `<plist>` wrapper is descended through to its single child;
    /// any other root element is taken as the value itself.
    pub fn parse(xml: &'a str) -> Result<PlistEntry<'a>> {
        let doc = XmlNode::parse(xml)?;
        let root = if doc.tag == "plist" {
            doc.children
                .first()
                .ok_or(Error::Parse("empty plist"))?
        } else {
            &doc
        };
        Self::build(None, root)
    }

    fn build(key: Option<&'a str>, node: &XmlNode<'a>) -> Result<PlistEntry<'a>> {
        let mut entry = PlistEntry {
            key,
            kind: node.tag,
            value: None,
            children: Vec::new(),
        };

        match node.tag {
            "string" | "integer" | "data" => {
                if !node.children.is_empty() {
                    return Err(Error::Parse("leaf value with child elements"));
                }
                entry.value = Some(node.text);
            }
            "dict" => {
                let mut nodes = node.children.iter();
                while let Some(key_node) = nodes.next() {
                    if key_node.tag != "key" || !key_node.children.is_empty() {
                        return Err(Error::Parse("dict entry without a key"));
                    }
                    let value_node = nodes.next().ok_or(Error::Parse("dangling dict key"))?;
                    entry
                        .children
                        .push(Self::build(Some(key_node.text), value_node)?);
                }
            }
            "array" => {
                for child in &node.children {
                    entry.children.push(Self::build(None, child)?);
                }
            }
            _ => {}
        }

        Ok(entry)
    }

    /// Look up a dict child by key. Linear scan; only dict children ever
    /// have keys.
    pub fn get(&self, name: &str) -> Option<&PlistEntry<'a>> {
        self.children.iter().find(|c| c.key == Some(name))
    }

    /// The raw text of a leaf value.
    pub fn as_str(&self) -> Result<&'a str> {
        self.value.ok_or(Error::Parse("expected a leaf value"))
    }

    /// Parse an `<integer>` value; accepts decimal or `0x…` hex (the form
    /// Core Storage uses for volume sizes).
    pub fn as_integer(&self) -> Result<u64> {
        let text = self.as_str()?.trim();
        let parsed = if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X"))
        {
            u64::from_str_radix(hex, 16)
        } else {
            text.parse()
        };
        parsed.map_err(|_| Error::Parse("malformed integer"))
    }

    /// Decode a `<data>` value from base64.
    pub fn as_data(&self) -> Result<Vec<u8>> {
        Ok(base64::decode(self.as_str()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_dict_and_array() {
        let xml = "<plist version=\"1.0\"><dict><key>a</key><integer>0x10</integer>\
                   <key>b</key><array><string>x</string></array></dict></plist>";
        let plist = PlistEntry::parse(xml).unwrap();

        let a = plist.get("a").unwrap();
        assert_eq!(a.kind, "integer");
        assert_eq!(a.value, Some("0x10"));
        assert_eq!(a.as_integer().unwrap(), 0x10);

        let b = plist.get("b").unwrap();
        assert_eq!(b.kind, "array");
        assert_eq!(b.children[0].value, Some("x"));
        assert_eq!(b.children[0].key, None);
    }

    #[test]
    fn skips_declarations() {
        let xml = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
                   <!DOCTYPE plist PUBLIC \"-//Apple//DTD PLIST 1.0//EN\" \
                   \"http://www.apple.com/DTDs/PropertyList-1.0.dtd\">\n\
                   <plist version=\"1.0\"><dict><key>k</key><string>v</string></dict></plist>";
        let plist = PlistEntry::parse(xml).unwrap();
        assert_eq!(plist.get("k").unwrap().as_str().unwrap(), "v");
    }

    #[test]
    fn dangling_key_is_an_error() {
        let xml = "<plist><dict><key>a</key></dict></plist>";
        assert!(PlistEntry::parse(xml).is_err());
    }

    #[test]
    fn data_values_decode() {
        let xml = "<plist><dict><key>d</key><data>TWFu</data></dict></plist>";
        let plist = PlistEntry::parse(xml).unwrap();
        assert_eq!(plist.get("d").unwrap().as_data().unwrap(), b"Man");
    }

    #[test]
    fn self_closing_and_nesting() {
        let xml = "<plist><dict><key>flag</key><true/><key>inner</key>\
                   <dict><key>n</key><integer>42</integer></dict></dict></plist>";
        let plist = PlistEntry::parse(xml).unwrap();
        assert_eq!(plist.get("flag").unwrap().kind, "true");
        let inner = plist.get("inner").unwrap();
        assert_eq!(inner.get("n").unwrap().as_integer().unwrap(), 42);
    }

    #[test]
    fn mismatched_close_is_an_error() {
        assert!(XmlNode::parse("<a><b></a></b>").is_err());
    }
}
