//! Field list parsing and text rendering of records
//!
//! The metadata field list is `;`-separated `<type> <name>` pairs where the
//! type is a Rust primitive or a (possibly nested) array of one, e.g.
//! `u64 timestamp;[f32; 3] position;`. Fields whose name starts with
//! `_padding` are laid out but never printed.

use std::fmt::Write;

use crate::error::{BusError, Result};

use super::metadata::TopicMetadata;

/// Primitive element type of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    F32,
    F64,
}

impl FieldType {
    /// Parse a primitive type name
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "u8" => Self::U8,
            "i8" => Self::I8,
            "u16" => Self::U16,
            "i16" => Self::I16,
            "u32" => Self::U32,
            "i32" => Self::I32,
            "u64" => Self::U64,
            "i64" => Self::I64,
            "f32" => Self::F32,
            "f64" => Self::F64,
            _ => return None,
        })
    }

    /// Size of one element in bytes
    pub fn size(self) -> usize {
        match self {
            Self::U8 | Self::I8 => 1,
            Self::U16 | Self::I16 => 2,
            Self::U32 | Self::I32 | Self::F32 => 4,
            Self::U64 | Self::I64 | Self::F64 => 8,
        }
    }

    /// Equivalent C type name, as used by log analysis tools
    pub fn c_type(self) -> &'static str {
        match self {
            Self::U8 => "uint8_t",
            Self::I8 => "int8_t",
            Self::U16 => "uint16_t",
            Self::I16 => "int16_t",
            Self::U32 => "uint32_t",
            Self::I32 => "int32_t",
            Self::U64 => "uint64_t",
            Self::I64 => "int64_t",
            Self::F32 => "float",
            Self::F64 => "double",
        }
    }

    fn render(self, bytes: &[u8], out: &mut String) {
        // callers slice exactly `self.size()` bytes
        let mut raw = [0u8; 8];
        raw[..bytes.len()].copy_from_slice(bytes);
        let _ = match self {
            Self::U8 => write!(out, "{}", bytes[0]),
            Self::I8 => write!(out, "{}", bytes[0] as i8),
            Self::U16 => write!(out, "{}", u16::from_ne_bytes([raw[0], raw[1]])),
            Self::I16 => write!(out, "{}", i16::from_ne_bytes([raw[0], raw[1]])),
            Self::U32 => write!(out, "{}", u32::from_ne_bytes([raw[0], raw[1], raw[2], raw[3]])),
            Self::I32 => write!(out, "{}", i32::from_ne_bytes([raw[0], raw[1], raw[2], raw[3]])),
            Self::U64 => write!(out, "{}", u64::from_ne_bytes(raw)),
            Self::I64 => write!(out, "{}", i64::from_ne_bytes(raw)),
            Self::F32 => write!(
                out,
                "{:.4}",
                f32::from_ne_bytes([raw[0], raw[1], raw[2], raw[3]])
            ),
            Self::F64 => write!(out, "{:.4}", f64::from_ne_bytes(raw)),
        };
    }
}

/// One parsed entry of a field list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: String,
    pub ty: FieldType,
    /// Number of elements, 1 for scalars
    pub count: usize,
    /// Byte offset inside the record
    pub offset: usize,
}

impl FieldDescriptor {
    /// Total size of the field in bytes
    pub fn size(&self) -> usize {
        self.ty.size() * self.count
    }

    /// Padding fields are laid out but not displayed
    pub fn is_padding(&self) -> bool {
        self.name.starts_with("_padding")
    }
}

fn parse_type(spec: &str) -> Option<(FieldType, usize)> {
    let spec = spec.trim();
    if let Some(inner) = spec.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
        let (element, count) = inner.rsplit_once(';')?;
        let count: usize = count.trim().parse().ok()?;
        let (ty, inner_count) = parse_type(element)?;
        return Some((ty, inner_count * count));
    }
    FieldType::parse(spec).map(|ty| (ty, 1))
}

/// Split a field list on the `;` separators outside array brackets
fn split_entries(fields: &str) -> Vec<&str> {
    let mut entries = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in fields.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            ';' if depth == 0 => {
                entries.push(&fields[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    entries.push(&fields[start..]);
    entries
        .into_iter()
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .collect()
}

/// Parse the field list of a topic and check it covers the record exactly
pub fn parse_fields(meta: &TopicMetadata) -> Result<Vec<FieldDescriptor>> {
    let mut fields = Vec::new();
    let mut offset = 0;

    for entry in split_entries(meta.fields) {
        let (ty_spec, name) = entry.rsplit_once(' ').ok_or_else(|| {
            BusError::invalid_parameter("fields", format!("{}: malformed entry '{}'", meta.name, entry))
        })?;
        let (ty, count) = parse_type(ty_spec).ok_or_else(|| {
            BusError::invalid_parameter("fields", format!("{}: unknown type '{}'", meta.name, ty_spec))
        })?;

        let field = FieldDescriptor {
            name: name.to_string(),
            ty,
            count,
            offset,
        };
        offset += field.size();
        fields.push(field);
    }

    if offset != meta.size {
        return Err(BusError::invalid_parameter(
            "fields",
            format!("{}: fields cover {} of {} bytes", meta.name, offset, meta.size),
        ));
    }
    Ok(fields)
}

/// Render a record as indented `name: value` lines
pub fn format_message(meta: &TopicMetadata, data: &[u8]) -> Result<String> {
    if data.len() != meta.size {
        return Err(BusError::invalid_parameter(
            "data",
            format!("{} expects {} bytes, got {}", meta.name, meta.size, data.len()),
        ));
    }

    let mut out = String::new();
    for field in parse_fields(meta)?.iter().filter(|f| !f.is_padding()) {
        let _ = write!(out, "    {}: ", field.name);
        let element = field.ty.size();
        if field.count == 1 {
            field.ty.render(&data[field.offset..field.offset + element], &mut out);
        } else {
            out.push('[');
            for i in 0..field.count {
                if i > 0 {
                    out.push_str(", ");
                }
                let start = field.offset + i * element;
                field.ty.render(&data[start..start + element], &mut out);
            }
            out.push(']');
        }
        out.push('\n');
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const VECTOR: TopicMetadata =
        TopicMetadata::new("vector", 24, "u64 timestamp;[f32; 3] xyz;u8 valid;[u8; 3] _padding0;", 90);

    #[test]
    fn test_parse_fields_offsets() {
        let fields = parse_fields(&VECTOR).unwrap();
        assert_eq!(fields.len(), 4);
        assert_eq!(fields[1].name, "xyz");
        assert_eq!(fields[1].ty, FieldType::F32);
        assert_eq!(fields[1].count, 3);
        assert_eq!(fields[1].offset, 8);
        assert_eq!(fields[2].offset, 20);
        assert!(fields[3].is_padding());
    }

    #[test]
    fn test_array_separator_is_not_an_entry_break() {
        assert_eq!(
            split_entries("u64 timestamp;[f32; 3] xyz;[[u8; 2]; 2] grid;"),
            vec!["u64 timestamp", "[f32; 3] xyz", "[[u8; 2]; 2] grid"]
        );

        let meta = TopicMetadata::new("v", 20, "u64 timestamp;[f32; 3] xyz;", 1);
        let fields = parse_fields(&meta).unwrap();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[1].count, 3);
    }

    #[test]
    fn test_nested_arrays() {
        assert_eq!(parse_type("[[f32; 3]; 3]"), Some((FieldType::F32, 9)));
        assert_eq!(parse_type("bool"), None);
    }

    #[test]
    fn test_size_mismatch_rejected() {
        let bad = TopicMetadata::new("bad", 16, "u64 timestamp;", 91);
        assert!(matches!(
            parse_fields(&bad),
            Err(BusError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_format_message() {
        let mut data = Vec::new();
        data.extend_from_slice(&42u64.to_ne_bytes());
        for v in [1.0f32, -2.5, 0.25] {
            data.extend_from_slice(&v.to_ne_bytes());
        }
        data.extend_from_slice(&[1, 0, 0, 0]);

        let text = format_message(&VECTOR, &data).unwrap();
        assert_eq!(
            text,
            "    timestamp: 42\n    xyz: [1.0000, -2.5000, 0.2500]\n    valid: 1\n"
        );
    }

    #[test]
    fn test_c_type_names() {
        assert_eq!(FieldType::F32.c_type(), "float");
        assert_eq!(FieldType::U64.c_type(), "uint64_t");
    }
}
