//! `META-INF/MANIFEST.MF` reading and writing.

pub const MANIFEST_PATH: &str = "META-INF/MANIFEST.MF";

type Section = Vec<(String, String)>;

/// A jar manifest: the main section followed by per-entry sections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    main: Section,
    entries: Vec<Section>,
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            main: vec![("Manifest-Version".into(), "1.0".into())],
            entries: Vec::new(),
        }
    }
}

impl Manifest {
    /// Lenient parse: malformed lines are skipped.
    pub fn parse(bytes: &[u8]) -> Self {
        let text = String::from_utf8_lossy(bytes);
        let mut sections: Vec<Section> = vec![Vec::new()];

        for raw in text.split('\n') {
            let line = raw.strip_suffix('\r').unwrap_or(raw);
            if line.is_empty() {
                if sections.last().map_or(false, |s| !s.is_empty()) {
                    sections.push(Vec::new());
                }
                continue;
            }
            let Some(current) = sections.last_mut() else {
                continue;
            };
            if let Some(cont) = line.strip_prefix(' ') {
                if let Some((_, value)) = current.last_mut() {
                    value.push_str(cont);
                }
                continue;
            }
            if let Some((k, v)) = line.split_once(':') {
                current.push((k.trim().to_string(), v.trim_start().to_string()));
            }
        }

        sections.retain(|s| !s.is_empty());
        let mut iter = sections.into_iter();
        let main = iter.next().unwrap_or_default();
        Self {
            main,
            entries: iter.collect(),
        }
    }

    pub fn main_attribute(&self, key: &str) -> Option<&str> {
        self.main
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn set_main_attribute(&mut self, key: &str, value: &str) {
        match self.main.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(key)) {
            Some((_, v)) => *v = value.to_string(),
            None => self.main.push((key.to_string(), value.to_string())),
        }
    }

    /// Drop per-entry digests left over from signing. Sections left with
    /// nothing but a `Name` are removed.
    pub fn strip_digests(&mut self) {
        for section in &mut self.entries {
            section.retain(|(k, _)| !k.to_ascii_lowercase().ends_with("-digest"));
        }
        self.entries
            .retain(|s| s.iter().any(|(k, _)| !k.eq_ignore_ascii_case("Name")));
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = String::new();
        write_section(&mut out, &self.main);
        for section in &self.entries {
            write_section(&mut out, section);
        }
        out.into_bytes()
    }
}

/// Lines are wrapped at 72 bytes as the jar format requires.
fn write_section(out: &mut String, section: &Section) {
    for (k, v) in section {
        let line = format!("{}: {}", k, v);
        let mut rest = line.as_str();
        let mut first = true;
        while !rest.is_empty() {
            let limit = if first { 72 } else { 71 };
            let mut cut = rest.len().min(limit);
            while !rest.is_char_boundary(cut) {
                cut -= 1;
            }
            if !first {
                out.push(' ');
            }
            out.push_str(&rest[..cut]);
            out.push_str("\r\n");
            rest = &rest[cut..];
            first = false;
        }
    }
    out.push_str("\r\n");
}
