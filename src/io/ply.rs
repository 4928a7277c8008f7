use std::{
    borrow::Cow,
    fmt::Write as _,
    io::{Read, Write},
};

use flate2::{Compression, read::GzDecoder, write::GzEncoder};

use crate::{cloud::PointBuffer, error::DecodeError, io::is_gzip};


#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlyFormat {
    Ascii,
    BinaryLittleEndian,
    BinaryBigEndian,
}

impl PlyFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            PlyFormat::Ascii => "ascii",
            PlyFormat::BinaryLittleEndian => "binary_little_endian",
            PlyFormat::BinaryBigEndian => "binary_big_endian",
        }
    }
}


#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VertexProperty {
    pub name: String,
    pub kind: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlyHeader {
    pub format: PlyFormat,
    pub vertex_count: usize,
    /// properties of the `vertex` element in declaration order
    pub properties: Vec<VertexProperty>,
    /// byte offset of the first body byte
    pub body_offset: usize,
    /// 1-based line number of the first body line
    pub body_line: usize,
}

impl PlyHeader {
    pub fn has_property(&self, name: &str) -> bool {
        self.properties.iter().any(|property| property.name == name)
    }
}


pub fn gunzip(payload: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let mut decoder = GzDecoder::new(payload);
    let mut inflated = Vec::new();
    decoder
        .read_to_end(&mut inflated)
        .map_err(|err| DecodeError::Decompress(err.to_string()))?;

    Ok(inflated)
}

/// Decodes a ply payload, inflating it first when it carries the gzip magic.
pub fn decode_ply(payload: &[u8]) -> Result<PointBuffer, DecodeError> {
    let bytes: Cow<[u8]> = if is_gzip(payload) {
        Cow::Owned(gunzip(payload)?)
    } else {
        Cow::Borrowed(payload)
    };
    let bytes: &[u8] = &bytes;

    let header = parse_header(bytes)?;
    match header.format {
        PlyFormat::Ascii => {
            let body = std::str::from_utf8(&bytes[header.body_offset..])
                .map_err(|_| DecodeError::InvalidText)?;

            parse_ascii_body(&header, body)
        }
        format => {
            check_binary_capacity(&header, bytes.len() - header.body_offset)?;
            decode_binary(bytes, format)
        }
    }
}

/// Rejects headers declaring more vertices than the body could store.
///
/// Every binary property occupies at least one byte, so a body of `body_len`
/// bytes holds at most `body_len / properties` vertices.
fn check_binary_capacity(header: &PlyHeader, body_len: usize) -> Result<(), DecodeError> {
    let per_vertex = header.properties.len().max(1);
    let fits = header
        .vertex_count
        .checked_mul(per_vertex)
        .is_some_and(|needed| needed <= body_len);

    if fits {
        Ok(())
    } else {
        Err(DecodeError::TruncatedBody {
            expected: header.vertex_count,
            found: body_len / per_vertex,
        })
    }
}

/// Scans header lines up to `end_header`.
///
/// Header lines are ascii for every format, so the body is never touched here.
/// A missing `format` line is read as ascii.
pub fn parse_header(bytes: &[u8]) -> Result<PlyHeader, DecodeError> {
    let mut format = PlyFormat::Ascii;
    let mut vertex_count = None;
    let mut properties = Vec::new();
    let mut in_vertex = false;
    let mut offset = 0;

    for (index, raw) in bytes.split_inclusive(|byte| *byte == b'\n').enumerate() {
        offset += raw.len();

        let line = String::from_utf8_lossy(raw);
        let mut tokens = line.split_whitespace();

        match tokens.next() {
            Some("end_header") => {
                let vertex_count = vertex_count.ok_or(DecodeError::MissingVertexCount)?;

                return Ok(PlyHeader {
                    format,
                    vertex_count,
                    properties,
                    body_offset: offset,
                    body_line: index + 2,
                });
            }
            Some("format") => {
                format = match tokens.next() {
                    Some("ascii") => PlyFormat::Ascii,
                    Some("binary_little_endian") => PlyFormat::BinaryLittleEndian,
                    Some("binary_big_endian") => PlyFormat::BinaryBigEndian,
                    other => {
                        return Err(DecodeError::UnsupportedFormat(
                            other.unwrap_or_default().to_string(),
                        ));
                    }
                };
            }
            Some("element") => {
                in_vertex = tokens.next() == Some("vertex");
                if in_vertex {
                    vertex_count = Some(
                        tokens
                            .next()
                            .and_then(|count| count.parse::<usize>().ok())
                            .ok_or(DecodeError::MissingVertexCount)?,
                    );
                }
            }
            Some("property") if in_vertex => {
                let rest = tokens.collect::<Vec<_>>();
                match rest.as_slice() {
                    [kind, name] => properties.push(VertexProperty {
                        name: name.to_string(),
                        kind: kind.to_string(),
                    }),
                    ["list", .., name] => properties.push(VertexProperty {
                        name: name.to_string(),
                        kind: "list".to_string(),
                    }),
                    _ => {}
                }
            }
            _ => {}
        }
    }

    Err(DecodeError::MissingEndHeader)
}


fn color_scale(kind: &str) -> f32 {
    match kind {
        "uchar" | "uint8" | "char" | "int8" => 1.0 / 255.0,
        "ushort" | "uint16" | "short" | "int16" => 1.0 / 65535.0,
        _ => 1.0,
    }
}

// body column of each consumed attribute
struct Columns {
    position: [usize; 3],
    color: Option<([usize; 3], f32)>,
    normal: Option<[usize; 3]>,
    width: usize,
}

impl Columns {
    fn from_header(header: &PlyHeader) -> Result<Self, DecodeError> {
        if header.properties.is_empty() {
            return Ok(Self {
                position: [0, 1, 2],
                color: None,
                normal: None,
                width: 3,
            });
        }

        let find = |name: &str| {
            header
                .properties
                .iter()
                .position(|property| property.name == name)
        };

        let position = match (find("x"), find("y"), find("z")) {
            (Some(x), Some(y), Some(z)) => [x, y, z],
            _ => return Err(DecodeError::MissingPosition),
        };

        let color = find("red").map(|red| {
            let channels = [
                red,
                find("green").unwrap_or(red + 1),
                find("blue").unwrap_or(red + 2),
            ];
            (channels, color_scale(&header.properties[red].kind))
        });

        let normal = find("nx").map(|nx| {
            [
                nx,
                find("ny").unwrap_or(nx + 1),
                find("nz").unwrap_or(nx + 2),
            ]
        });

        let width = position
            .iter()
            .chain(color.iter().flat_map(|(channels, _)| channels.iter()))
            .chain(normal.iter().flatten())
            .max()
            .map_or(3, |last| last + 1);

        Ok(Self {
            position,
            color,
            normal,
            width,
        })
    }
}

/// Parses exactly `header.vertex_count` non-empty rows of whitespace separated numbers.
pub fn parse_ascii_body(header: &PlyHeader, body: &str) -> Result<PointBuffer, DecodeError> {
    let columns = Columns::from_header(header)?;
    let count = header.vertex_count;

    // the declared count is untrusted, a row needs at least one byte per column
    let capacity = count.min(body.len() / columns.width) * 3;

    let mut positions = Vec::with_capacity(capacity);
    let mut colors = columns.color.map(|_| Vec::with_capacity(capacity));
    let mut normals = columns.normal.map(|_| Vec::with_capacity(capacity));

    let mut values = Vec::with_capacity(columns.width);
    let mut rows = 0;

    for (index, line) in body.lines().enumerate() {
        if rows == count {
            break;
        }

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let line_number = header.body_line + index;

        values.clear();
        for token in line.split_whitespace().take(columns.width) {
            let value = token
                .parse::<f32>()
                .map_err(|_| DecodeError::MalformedVertex {
                    line: line_number,
                    reason: format!("invalid number `{token}`"),
                })?;
            values.push(value);
        }

        if values.len() < columns.width {
            return Err(DecodeError::MalformedVertex {
                line: line_number,
                reason: format!("expected {} values, found {}", columns.width, values.len()),
            });
        }

        positions.extend(columns.position.map(|i| values[i]));

        if let (Some(colors), Some((channels, scale))) = (colors.as_mut(), columns.color) {
            colors.extend(channels.map(|i| values[i] * scale));
        }

        if let (Some(normals), Some(axes)) = (normals.as_mut(), columns.normal) {
            normals.extend(axes.map(|i| values[i]));
        }

        rows += 1;
    }

    if rows < count {
        return Err(DecodeError::TruncatedBody {
            expected: count,
            found: rows,
        });
    }

    PointBuffer::new(positions, colors, normals)
}


#[cfg(feature = "io_ply_binary")]
fn decode_binary(bytes: &[u8], _format: PlyFormat) -> Result<PointBuffer, DecodeError> {
    binary::decode(bytes)
}

#[cfg(not(feature = "io_ply_binary"))]
fn decode_binary(_bytes: &[u8], format: PlyFormat) -> Result<PointBuffer, DecodeError> {
    Err(DecodeError::UnsupportedFormat(format!(
        "{} (enable the io_ply_binary feature)",
        format.as_str(),
    )))
}

#[cfg(feature = "io_ply_binary")]
mod binary {
    use std::io::{BufReader, Cursor};

    use ply_rs::{
        parser::Parser,
        ply::{DefaultElement, Property, PropertyAccess},
    };

    use crate::{cloud::PointBuffer, error::DecodeError};

    #[derive(Clone, Copy, Debug, Default)]
    struct PlyVertex {
        position: [f32; 3],
        color: [f32; 3],
        normal: [f32; 3],
    }

    fn scalar(property: &Property) -> Option<f32> {
        match *property {
            Property::Char(v) => Some(v as f32),
            Property::UChar(v) => Some(v as f32),
            Property::Short(v) => Some(v as f32),
            Property::UShort(v) => Some(v as f32),
            Property::Int(v) => Some(v as f32),
            Property::UInt(v) => Some(v as f32),
            Property::Float(v) => Some(v),
            Property::Double(v) => Some(v as f32),
            _ => None,
        }
    }

    fn unit_color(property: &Property) -> Option<f32> {
        match *property {
            Property::UChar(v) => Some(v as f32 / 255.0),
            Property::UShort(v) => Some(v as f32 / 65535.0),
            ref other => scalar(other),
        }
    }

    impl PropertyAccess for PlyVertex {
        fn new() -> Self {
            PlyVertex::default()
        }

        fn set_property(&mut self, key: String, property: Property) {
            let (slot, value) = match key.as_ref() {
                "x" => (&mut self.position[0], scalar(&property)),
                "y" => (&mut self.position[1], scalar(&property)),
                "z" => (&mut self.position[2], scalar(&property)),
                "red" => (&mut self.color[0], unit_color(&property)),
                "green" => (&mut self.color[1], unit_color(&property)),
                "blue" => (&mut self.color[2], unit_color(&property)),
                "nx" => (&mut self.normal[0], scalar(&property)),
                "ny" => (&mut self.normal[1], scalar(&property)),
                "nz" => (&mut self.normal[2], scalar(&property)),
                _ => return,
            };

            if let Some(value) = value {
                *slot = value;
            }
        }
    }

    fn body_error(err: std::io::Error) -> DecodeError {
        DecodeError::BinaryBody(err.to_string())
    }

    pub(super) fn decode(bytes: &[u8]) -> Result<PointBuffer, DecodeError> {
        let mut reader = BufReader::new(Cursor::new(bytes));

        let vertex_parser = Parser::<PlyVertex>::new();
        let header = vertex_parser.read_header(&mut reader).map_err(body_error)?;

        // elements are stored back to back, anything before the vertices must be consumed
        let skip_parser = Parser::<DefaultElement>::new();

        for (_key, element) in &header.elements {
            if element.name != "vertex" {
                skip_parser
                    .read_payload_for_element(&mut reader, element, &header)
                    .map_err(body_error)?;
                continue;
            }

            if !["x", "y", "z"]
                .iter()
                .all(|axis| element.properties.contains_key(*axis))
            {
                return Err(DecodeError::MissingPosition);
            }

            let has_color = element.properties.contains_key("red");
            let has_normal = element.properties.contains_key("nx");

            let vertices = vertex_parser
                .read_payload_for_element(&mut reader, element, &header)
                .map_err(body_error)?;

            if vertices.len() < element.count {
                return Err(DecodeError::TruncatedBody {
                    expected: element.count,
                    found: vertices.len(),
                });
            }

            let positions = vertices.iter().flat_map(|v| v.position).collect();
            let colors = has_color.then(|| vertices.iter().flat_map(|v| v.color).collect());
            let normals = has_normal.then(|| vertices.iter().flat_map(|v| v.normal).collect());

            return PointBuffer::new(positions, colors, normals);
        }

        Err(DecodeError::MissingVertexCount)
    }
}


/// Serializes `buffer` as ascii ply, colors stored as `uchar`.
pub fn write_ascii_ply(buffer: &PointBuffer) -> String {
    let mut out = String::new();

    // writing into a String cannot fail
    let _ = writeln!(out, "ply");
    let _ = writeln!(out, "format ascii 1.0");
    let _ = writeln!(out, "element vertex {}", buffer.vertex_count());
    for axis in ["x", "y", "z"] {
        let _ = writeln!(out, "property float {axis}");
    }
    if buffer.colors().is_some() {
        for channel in ["red", "green", "blue"] {
            let _ = writeln!(out, "property uchar {channel}");
        }
    }
    if buffer.normals().is_some() {
        for axis in ["nx", "ny", "nz"] {
            let _ = writeln!(out, "property float {axis}");
        }
    }
    let _ = writeln!(out, "end_header");

    for i in 0..buffer.vertex_count() {
        let [x, y, z] = buffer.position(i);
        let _ = write!(out, "{x} {y} {z}");

        if let Some(colors) = buffer.colors() {
            for c in &colors[i * 3..i * 3 + 3] {
                let _ = write!(out, " {}", (c.clamp(0.0, 1.0) * 255.0).round() as u8);
            }
        }

        if let Some(normals) = buffer.normals() {
            for n in &normals[i * 3..i * 3 + 3] {
                let _ = write!(out, " {n}");
            }
        }

        out.push('\n');
    }

    out
}

pub fn gzip(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes)?;
    encoder.finish()
}
