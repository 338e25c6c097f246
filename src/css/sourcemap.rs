//! Source map v3 generation
//!
//! Mappings are recorded by the serializer as it writes each node, so the
//! map always reflects the final output no matter how many processors have
//! rewritten the tree.

use serde::{Deserialize, Serialize};

const BASE64: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

/// One generated position and the original position it came from (0-based)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mapping {
    pub generated_line: u32,
    pub generated_column: u32,
    pub source: u32,
    pub original_line: u32,
    pub original_column: u32,
}

/// Serialized source map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMap {
    pub version: u8,
    pub file: String,
    pub sources: Vec<String>,
    #[serde(default)]
    pub sources_content: Vec<Option<String>>,
    #[serde(default)]
    pub names: Vec<String>,
    pub mappings: String,
}

impl SourceMap {
    pub fn to_json(&self) -> String {
        // A struct of strings and vectors always serializes
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Decodes the mappings back into absolute positions
    pub fn decode(&self) -> Result<Vec<Mapping>, String> {
        decode_mappings(&self.mappings)
    }

    /// Original position of the closest mapped segment at or before the
    /// generated position, as `(source path, line, column)`
    pub fn lookup(&self, line: u32, column: u32) -> Option<(&str, u32, u32)> {
        let mappings = self.decode().ok()?;
        mappings
            .iter()
            .filter(|m| m.generated_line == line && m.generated_column <= column)
            .max_by_key(|m| m.generated_column)
            .and_then(|m| {
                self.sources
                    .get(m.source as usize)
                    .map(|s| (s.as_str(), m.original_line, m.original_column))
            })
    }
}

/// Collects sources and mappings while output is generated
#[derive(Debug, Default)]
pub struct SourceMapBuilder {
    sources: Vec<String>,
    contents: Vec<Option<String>>,
    mappings: Vec<Mapping>,
}

impl SourceMapBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a source, returning its index in the map
    pub fn add_source(&mut self, path: impl Into<String>, content: Option<String>) -> u32 {
        self.sources.push(path.into());
        self.contents.push(content);
        (self.sources.len() - 1) as u32
    }

    pub fn add_mapping(&mut self, mapping: Mapping) {
        self.mappings.push(mapping);
    }

    pub fn build(mut self, file: impl Into<String>) -> SourceMap {
        self.mappings
            .sort_by_key(|m| (m.generated_line, m.generated_column));
        self.mappings
            .dedup_by_key(|m| (m.generated_line, m.generated_column));

        SourceMap {
            version: 3,
            file: file.into(),
            sources: self.sources,
            sources_content: self.contents,
            names: Vec::new(),
            mappings: encode_mappings(&self.mappings),
        }
    }
}

/// Encodes sorted mappings into the `mappings` field
pub fn encode_mappings(mappings: &[Mapping]) -> String {
    let mut out = String::new();
    let mut line = 0u32;
    let mut prev_column = 0i64;
    let mut prev_source = 0i64;
    let mut prev_original_line = 0i64;
    let mut prev_original_column = 0i64;
    let mut first_in_line = true;

    for m in mappings {
        while line < m.generated_line {
            out.push(';');
            line += 1;
            prev_column = 0;
            first_in_line = true;
        }
        if !first_in_line {
            out.push(',');
        }
        first_in_line = false;

        encode_vlq(m.generated_column as i64 - prev_column, &mut out);
        encode_vlq(m.source as i64 - prev_source, &mut out);
        encode_vlq(m.original_line as i64 - prev_original_line, &mut out);
        encode_vlq(m.original_column as i64 - prev_original_column, &mut out);

        prev_column = m.generated_column as i64;
        prev_source = m.source as i64;
        prev_original_line = m.original_line as i64;
        prev_original_column = m.original_column as i64;
    }

    out
}

/// Appends one base64 VLQ value
pub fn encode_vlq(value: i64, out: &mut String) {
    let mut vlq: u64 = if value < 0 {
        ((value.unsigned_abs()) << 1) | 1
    } else {
        (value as u64) << 1
    };

    loop {
        let mut digit = (vlq & 0b11111) as usize;
        vlq >>= 5;
        if vlq > 0 {
            digit |= 0b100000;
        }
        out.push(BASE64[digit] as char);
        if vlq == 0 {
            break;
        }
    }
}

fn decode_base64(c: u8) -> Option<u64> {
    BASE64.iter().position(|&b| b == c).map(|p| p as u64)
}

fn decode_segment(segment: &str) -> Result<Vec<i64>, String> {
    let mut values = Vec::new();
    let mut value: u64 = 0;
    let mut shift: u32 = 0;

    for b in segment.bytes() {
        let digit = decode_base64(b).ok_or_else(|| format!("invalid base64 digit '{}'", b as char))?;
        let bits = digit & 0b11111;
        value |= bits
            .checked_shl(shift)
            .filter(|part| part >> shift == bits)
            .ok_or_else(|| format!("value out of range in segment '{}'", segment))?;
        if digit & 0b100000 != 0 {
            shift += 5;
            continue;
        }
        let negative = value & 1 == 1;
        let magnitude = (value >> 1) as i64;
        values.push(if negative { -magnitude } else { magnitude });
        value = 0;
        shift = 0;
    }

    if shift != 0 {
        return Err(format!("truncated segment '{}'", segment));
    }
    Ok(values)
}

/// Decodes a `mappings` field into absolute positions
pub fn decode_mappings(mappings: &str) -> Result<Vec<Mapping>, String> {
    let mut out = Vec::new();
    let mut source = 0i64;
    let mut original_line = 0i64;
    let mut original_column = 0i64;

    for (line, group) in mappings.split(';').enumerate() {
        let mut column = 0i64;
        for segment in group.split(',').filter(|s| !s.is_empty()) {
            let fields = decode_segment(segment)?;
            column += fields[0];
            if fields.len() >= 4 {
                source += fields[1];
                original_line += fields[2];
                original_column += fields[3];
                out.push(Mapping {
                    generated_line: line as u32,
                    generated_column: column as u32,
                    source: source as u32,
                    original_line: original_line as u32,
                    original_column: original_column as u32,
                });
            }
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn vlq(value: i64) -> String {
        let mut out = String::new();
        encode_vlq(value, &mut out);
        out
    }

    #[test]
    fn vlq_known_values() {
        assert_eq!(vlq(0), "A");
        assert_eq!(vlq(1), "C");
        assert_eq!(vlq(-1), "D");
        assert_eq!(vlq(15), "e");
        assert_eq!(vlq(16), "gB");
        assert_eq!(vlq(123), "2H");
    }

    #[test]
    fn encodes_lines_and_segments() {
        let mappings = vec![
            Mapping { generated_line: 0, generated_column: 0, source: 0, original_line: 0, original_column: 0 },
            Mapping { generated_line: 0, generated_column: 4, source: 0, original_line: 1, original_column: 2 },
            Mapping { generated_line: 2, generated_column: 0, source: 1, original_line: 0, original_column: 0 },
        ];
        let encoded = encode_mappings(&mappings);
        assert_eq!(encoded, "AAAA,IACE;;ACDF");
        assert_eq!(decode_mappings(&encoded).unwrap(), mappings);
    }

    #[test]
    fn builder_sorts_and_serializes() {
        let mut builder = SourceMapBuilder::new();
        let src = builder.add_source("../css/screen.css", Some("a{}".into()));
        builder.add_mapping(Mapping { generated_line: 0, generated_column: 5, source: src, original_line: 3, original_column: 0 });
        builder.add_mapping(Mapping { generated_line: 0, generated_column: 0, source: src, original_line: 1, original_column: 0 });

        let map = builder.build("screen.css");
        let json = map.to_json();
        assert!(json.contains("\"sourcesContent\":[\"a{}\"]"));
        assert!(json.contains("\"version\":3"));

        let parsed = SourceMap::from_json(&json).unwrap();
        assert_eq!(parsed.lookup(0, 3), Some(("../css/screen.css", 1, 0)));
        assert_eq!(parsed.lookup(0, 7), Some(("../css/screen.css", 3, 0)));
        assert_eq!(parsed.lookup(1, 0), None);
    }

    #[test]
    fn rejects_invalid_digits() {
        assert!(decode_mappings("AA!A").is_err());
        assert!(decode_mappings("g").is_err());
    }

    #[test]
    fn rejects_values_wider_than_64_bits() {
        // thirteen empty continuation digits push the shift past 64 bits
        assert!(decode_mappings("gggggggggggggA").is_err());
        // full digits overflow once the shift reaches 60
        let err = decode_mappings("/////////////B").unwrap_err();
        assert!(err.contains("out of range"));
        // the widest value that still fits decodes
        assert_eq!(decode_segment(&vlq(i64::MAX)).unwrap(), vec![i64::MAX]);
    }

    proptest! {
        #[test]
        fn vlq_output_stays_in_base64_alphabet(value in -1_000_000i64..1_000_000i64) {
            let encoded = vlq(value);
            prop_assert!(encoded.bytes().all(|b| BASE64.contains(&b)));
            prop_assert_eq!(decode_segment(&encoded).unwrap(), vec![value]);
        }
    }
}
