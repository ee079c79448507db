//! Descriptor and generic-signature rewriting.

/// Rewrite every class name in a field or method descriptor. `map` returns
/// `None` for names that stay unchanged.
pub fn map_descriptor<F>(desc: &str, map: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(desc.len());
    let mut rest = desc;
    while let Some(start) = rest.find('L') {
        out.push_str(&rest[..=start]);
        let after = &rest[start + 1..];
        match after.find(';') {
            Some(end) => {
                let name = &after[..end];
                match map(name) {
                    Some(mapped) => out.push_str(&mapped),
                    None => out.push_str(name),
                }
                out.push(';');
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(after);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Class name of a `Class` constant, which is either an internal name or an
/// array descriptor.
pub fn map_class_constant<F>(name: &str, map: F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    if name.starts_with('[') {
        let mapped = map_descriptor(name, map);
        (mapped != name).then_some(mapped)
    } else {
        map(name)
    }
}

/// Number of parameters of a method descriptor. Malformed descriptors count
/// what could be read.
pub fn parameter_count(desc: &str) -> usize {
    let Some(params) = desc.strip_prefix('(').and_then(|d| d.split(')').next()) else {
        return 0;
    };
    let bytes = params.as_bytes();
    let mut count = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'[' => {
                i += 1;
                continue;
            }
            b'L' => match params[i..].find(';') {
                Some(end) => i += end + 1,
                None => break,
            },
            _ => i += 1,
        }
        count += 1;
    }
    count
}

/// Rewrite class names in a generic signature (class, method or field).
/// Returns `None` when the signature cannot be parsed.
pub fn map_signature<F>(sig: &str, map: F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    let mut parser = SignatureMapper {
        input: sig.as_bytes(),
        pos: 0,
        out: String::with_capacity(sig.len()),
        map: &map,
    };
    parser.signature()?;
    Some(parser.out)
}

struct SignatureMapper<'a, F> {
    input: &'a [u8],
    pos: usize,
    out: String,
    map: &'a F,
}

impl<F> SignatureMapper<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn copy(&mut self) -> Option<u8> {
        let c = self.peek()?;
        self.out.push(c as char);
        self.pos += 1;
        Some(c)
    }

    fn identifier(&mut self, stops: &[u8]) -> Option<&str> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if stops.contains(&c) {
                break;
            }
            self.pos += 1;
        }
        std::str::from_utf8(&self.input[start..self.pos]).ok()
    }

    fn signature(&mut self) -> Option<()> {
        if self.peek() == Some(b'<') {
            self.formal_type_parameters()?;
        }
        while let Some(c) = self.peek() {
            match c {
                b'(' | b')' | b'^' | b'V' => {
                    self.copy();
                }
                _ => self.type_signature()?,
            }
        }
        Some(())
    }

    fn formal_type_parameters(&mut self) -> Option<()> {
        self.copy(); // '<'
        while self.peek()? != b'>' {
            let name = self.identifier(b":")?.to_string();
            self.out.push_str(&name);
            while self.peek() == Some(b':') {
                self.copy();
                if matches!(self.peek(), Some(b'L' | b'T' | b'[')) {
                    self.type_signature()?;
                }
            }
        }
        self.copy(); // '>'
        Some(())
    }

    fn type_signature(&mut self) -> Option<()> {
        match self.peek()? {
            b'L' => self.class_type(),
            b'T' => {
                let start = self.pos;
                while self.peek()? != b';' {
                    self.pos += 1;
                }
                self.pos += 1;
                let var = std::str::from_utf8(&self.input[start..self.pos]).ok()?;
                self.out.push_str(var);
                Some(())
            }
            b'[' => {
                self.copy();
                self.type_signature()
            }
            b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b'V' => {
                self.copy();
                Some(())
            }
            _ => None,
        }
    }

    fn class_type(&mut self) -> Option<()> {
        self.copy(); // 'L'
        let mut name = self.identifier(b"<.;")?.to_string();
        let mut mapped = (self.map)(&name).unwrap_or_else(|| name.clone());
        self.out.push_str(&mapped);

        loop {
            match self.peek()? {
                b'<' => self.type_arguments()?,
                b'.' => {
                    self.copy();
                    let inner = self.identifier(b"<.;")?.to_string();
                    let full = format!("{}${}", name, inner);
                    let mapped_full = (self.map)(&full).unwrap_or_else(|| full.clone());
                    let prefix = format!("{}$", mapped);
                    let simple = mapped_full
                        .strip_prefix(&prefix)
                        .map(str::to_string)
                        .unwrap_or(inner);
                    self.out.push_str(&simple);
                    name = full;
                    mapped = mapped_full;
                }
                b';' => {
                    self.copy();
                    return Some(());
                }
                _ => return None,
            }
        }
    }

    fn type_arguments(&mut self) -> Option<()> {
        self.copy(); // '<'
        while self.peek()? != b'>' {
            match self.peek()? {
                b'*' => {
                    self.copy();
                }
                b'+' | b'-' => {
                    self.copy();
                    self.type_signature()?;
                }
                _ => self.type_signature()?,
            }
        }
        self.copy(); // '>'
        Some(())
    }
}
