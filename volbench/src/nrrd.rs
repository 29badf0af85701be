//! Minimal NRRD reader/writer for 3-D scalar volumes.
//!
//! Supports attached and detached data (`data file`), `raw` and `ascii`
//! encodings, both byte orders, and the eight basic integer/float sample
//! types. Samples are widened or narrowed to [`Scalar`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use volbench_kernels::{Dims, Scalar, UniformGrid, Vec3, Volume};

use crate::{BenchError, BenchResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleType {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    F32,
    F64,
}

impl SampleType {
    fn parse(name: &str) -> Option<Self> {
        let t = match name {
            "signed char" | "int8" | "int8_t" | "char" => SampleType::I8,
            "uchar" | "unsigned char" | "uint8" | "uint8_t" => SampleType::U8,
            "short" | "short int" | "signed short" | "signed short int" | "int16" | "int16_t" => SampleType::I16,
            "ushort" | "unsigned short" | "unsigned short int" | "uint16" | "uint16_t" => SampleType::U16,
            "int" | "signed int" | "int32" | "int32_t" => SampleType::I32,
            "uint" | "unsigned int" | "uint32" | "uint32_t" => SampleType::U32,
            "float" => SampleType::F32,
            "double" => SampleType::F64,
            _ => return None,
        };
        Some(t)
    }

    pub fn size(&self) -> usize {
        match self {
            SampleType::I8 | SampleType::U8 => 1,
            SampleType::I16 | SampleType::U16 => 2,
            SampleType::I32 | SampleType::U32 | SampleType::F32 => 4,
            SampleType::F64 => 8,
        }
    }

    fn decode(&self, bytes: &[u8], big_endian: bool) -> Scalar {
        macro_rules! read {
            ($t:ty) => {{
                let mut buf = [0u8; std::mem::size_of::<$t>()];
                buf.copy_from_slice(bytes);
                if big_endian {
                    <$t>::from_be_bytes(buf)
                } else {
                    <$t>::from_le_bytes(buf)
                }
            }};
        }
        match self {
            SampleType::I8 => read!(i8) as Scalar,
            SampleType::U8 => read!(u8) as Scalar,
            SampleType::I16 => read!(i16) as Scalar,
            SampleType::U16 => read!(u16) as Scalar,
            SampleType::I32 => read!(i32) as Scalar,
            SampleType::U32 => read!(u32) as Scalar,
            SampleType::F32 => read!(f32),
            SampleType::F64 => read!(f64) as Scalar,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Raw,
    Ascii,
}

#[derive(Debug, Clone)]
pub struct NrrdHeader {
    pub sample_type: SampleType,
    pub dims: Dims,
    pub encoding: Encoding,
    pub big_endian: bool,
    pub spacing: Vec3,
    pub origin: Vec3,
    pub data_file: Option<PathBuf>,
    pub byte_skip: i64,
    pub line_skip: usize,
}

fn data_err(path: &Path, msg: impl std::fmt::Display) -> BenchError {
    BenchError::Data(format!("{}: {}", path.display(), msg))
}

// ────────────────────────────────────────────────────────────────────────────────
// Header
// ────────────────────────────────────────────────────────────────────────────────

/// Split the file into header fields and the offset where attached data
/// starts (end of file when the header has no blank terminator line).
fn split_header(path: &Path, bytes: &[u8]) -> BenchResult<(HashMap<String, String>, usize)> {
    let mut fields = HashMap::new();
    let mut pos = 0;
    let mut first = true;

    while pos < bytes.len() {
        let end = bytes[pos..]
            .iter()
            .position(|&b| b == b'\n')
            .map_or(bytes.len(), |i| pos + i);
        let line = std::str::from_utf8(&bytes[pos..end])
            .map_err(|_| data_err(path, "header is not valid UTF-8"))?
            .trim_end_matches('\r');
        pos = (end + 1).min(bytes.len());

        if first {
            if !line.starts_with("NRRD000") {
                return Err(data_err(path, "missing NRRD magic"));
            }
            first = false;
            continue;
        }
        if line.is_empty() {
            break;
        }
        if line.starts_with('#') || line.contains(":=") {
            continue;
        }
        let Some((key, value)) = line.split_once(": ") else {
            return Err(data_err(path, format!("malformed header line '{line}'")));
        };
        fields.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
    }

    if first {
        return Err(data_err(path, "empty file"));
    }
    Ok((fields, pos))
}

fn parse_vector(text: &str) -> Option<Vec3> {
    let inner = text.trim().strip_prefix('(')?.strip_suffix(')')?;
    let parts: Vec<f32> = inner
        .split(',')
        .map(|p| p.trim().parse().ok())
        .collect::<Option<_>>()?;
    (parts.len() == 3).then(|| Vec3::new(parts[0], parts[1], parts[2]))
}

fn parse_header(path: &Path, fields: &HashMap<String, String>) -> BenchResult<NrrdHeader> {
    let field = |name: &str| fields.get(name).map(String::as_str);
    let require = |name: &str| field(name).ok_or_else(|| data_err(path, format!("missing '{name}' field")));

    let type_name = require("type")?;
    let sample_type = SampleType::parse(type_name)
        .ok_or_else(|| data_err(path, format!("unsupported sample type '{type_name}'")))?;

    let dimension: usize = require("dimension")?
        .parse()
        .map_err(|_| data_err(path, "bad 'dimension' field"))?;
    if dimension != 3 {
        return Err(data_err(path, format!("expected a 3-D volume, got dimension {dimension}")));
    }

    let sizes: Vec<usize> = require("sizes")?
        .split_whitespace()
        .map(|s| s.parse().map_err(|_| data_err(path, format!("bad size '{s}'"))))
        .collect::<BenchResult<_>>()?;
    if sizes.len() != 3 {
        return Err(data_err(path, "'sizes' must list three extents"));
    }
    let dims = Dims::new(sizes[0], sizes[1], sizes[2]);
    dims.checked_point_count()
        .and_then(|n| n.checked_mul(sample_type.size()))
        .ok_or_else(|| data_err(path, format!("extents {dims} are too large")))?;

    let encoding = match require("encoding")? {
        "raw" => Encoding::Raw,
        "ascii" | "text" | "txt" => Encoding::Ascii,
        other => return Err(data_err(path, format!("unsupported encoding '{other}'"))),
    };

    let big_endian = match field("endian") {
        None | Some("little") => false,
        Some("big") => true,
        Some(other) => return Err(data_err(path, format!("bad endian '{other}'"))),
    };

    let spacing = match (field("spacings"), field("space directions")) {
        (Some(text), _) => {
            let s: Vec<f32> = text
                .split_whitespace()
                .map(|v| v.parse::<f32>().ok().filter(|v| v.is_finite()).unwrap_or(1.0))
                .collect();
            if s.len() != 3 {
                return Err(data_err(path, "'spacings' must list three values"));
            }
            Vec3::new(s[0], s[1], s[2])
        }
        (None, Some(text)) => {
            let axes: Vec<Vec3> = text
                .split_inclusive(')')
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(|v| parse_vector(v).ok_or_else(|| data_err(path, format!("bad space direction '{v}'"))))
                .collect::<BenchResult<_>>()?;
            if axes.len() != 3 {
                return Err(data_err(path, "'space directions' must list three vectors"));
            }
            Vec3::new(axes[0].length(), axes[1].length(), axes[2].length())
        }
        (None, None) => Vec3::ONE,
    };

    let origin = match field("space origin") {
        Some(text) => parse_vector(text).ok_or_else(|| data_err(path, format!("bad space origin '{text}'")))?,
        None => Vec3::ZERO,
    };

    let data_file = field("data file").or_else(|| field("datafile")).map(|name| {
        let p = Path::new(name);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            path.parent().unwrap_or_else(|| Path::new(".")).join(p)
        }
    });

    let byte_skip = match field("byte skip").or_else(|| field("byteskip")) {
        Some(v) => v.parse().map_err(|_| data_err(path, "bad 'byte skip' field"))?,
        None => 0,
    };
    let line_skip = match field("line skip").or_else(|| field("lineskip")) {
        Some(v) => v.parse().map_err(|_| data_err(path, "bad 'line skip' field"))?,
        None => 0,
    };

    Ok(NrrdHeader {
        sample_type,
        dims,
        encoding,
        big_endian,
        spacing,
        origin,
        data_file,
        byte_skip,
        line_skip,
    })
}

// ────────────────────────────────────────────────────────────────────────────────
// Data
// ────────────────────────────────────────────────────────────────────────────────

fn skip_lines(data: &[u8], lines: usize) -> &[u8] {
    let mut rest = data;
    for _ in 0..lines {
        match rest.iter().position(|&b| b == b'\n') {
            Some(i) => rest = &rest[i + 1..],
            None => return &[],
        }
    }
    rest
}

fn decode_samples(path: &Path, header: &NrrdHeader, data: &[u8]) -> BenchResult<Vec<Scalar>> {
    let count = header.dims.point_count();
    let data = skip_lines(data, header.line_skip);

    match header.encoding {
        Encoding::Raw => {
            let width = header.sample_type.size();
            let needed = count * width;
            let start = match header.byte_skip {
                -1 => data.len().saturating_sub(needed),
                n if n >= 0 => n as usize,
                n => return Err(data_err(path, format!("bad byte skip {n}"))),
            };
            let body = start.checked_add(needed).and_then(|end| data.get(start..end)).ok_or_else(|| {
                data_err(
                    path,
                    format!("expected {needed} bytes of sample data, found {}", data.len().saturating_sub(start)),
                )
            })?;
            Ok(body
                .chunks_exact(width)
                .map(|b| header.sample_type.decode(b, header.big_endian))
                .collect())
        }
        Encoding::Ascii => {
            let text = std::str::from_utf8(data).map_err(|_| data_err(path, "ascii data is not valid UTF-8"))?;
            let values: Vec<Scalar> = text
                .split(|c: char| c.is_whitespace() || c == ',')
                .filter(|t| !t.is_empty())
                .take(count)
                .map(|t| {
                    t.parse::<f64>()
                        .map(|v| v as Scalar)
                        .map_err(|_| data_err(path, format!("bad sample '{t}'")))
                })
                .collect::<BenchResult<_>>()?;
            if values.len() < count {
                return Err(data_err(path, format!("expected {count} samples, found {}", values.len())));
            }
            Ok(values)
        }
    }
}

/// Read a 3-D NRRD volume.
pub fn load_nrrd(path: &Path) -> BenchResult<Volume> {
    let bytes = std::fs::read(path).map_err(|e| data_err(path, e))?;
    let (fields, data_start) = split_header(path, &bytes)?;
    let header = parse_header(path, &fields)?;

    let detached;
    let (data_path, data): (&Path, &[u8]) = match &header.data_file {
        Some(file) => {
            detached = std::fs::read(file).map_err(|e| data_err(file, e))?;
            (file.as_path(), &detached)
        }
        None => (path, &bytes[data_start..]),
    };
    let values = decode_samples(data_path, &header, data)?;

    let grid = UniformGrid::new(header.dims)
        .with_origin(header.origin)
        .with_spacing(header.spacing);
    tracing::debug!(path = %path.display(), dims = %header.dims, sample_type = ?header.sample_type, "loaded NRRD");
    Volume::new(grid, values).map_err(|e| data_err(path, e))
}

/// Write `volume` as an attached NRRD with `float` samples.
pub fn write_nrrd(path: &Path, volume: &Volume, encoding: Encoding) -> BenchResult<()> {
    use std::io::Write;

    let grid = volume.grid();
    let [nx, ny, nz] = grid.dims.as_array();
    let mut out = std::io::BufWriter::new(std::fs::File::create(path)?);
    writeln!(out, "NRRD0004")?;
    writeln!(out, "# written by volbench")?;
    writeln!(out, "type: float")?;
    writeln!(out, "dimension: 3")?;
    writeln!(out, "sizes: {nx} {ny} {nz}")?;
    writeln!(out, "spacings: {} {} {}", grid.spacing.x, grid.spacing.y, grid.spacing.z)?;
    writeln!(out, "space origin: ({},{},{})", grid.origin.x, grid.origin.y, grid.origin.z)?;
    match encoding {
        Encoding::Raw => {
            writeln!(out, "encoding: raw")?;
            writeln!(out, "endian: little")?;
            writeln!(out)?;
            for v in volume.values() {
                out.write_all(&v.to_le_bytes())?;
            }
        }
        Encoding::Ascii => {
            writeln!(out, "encoding: ascii")?;
            writeln!(out)?;
            for row in volume.values().chunks(nx.max(1)) {
                let line: Vec<String> = row.iter().map(|v| v.to_string()).collect();
                writeln!(out, "{}", line.join(" "))?;
            }
        }
    }
    out.flush()?;
    Ok(())
}
