use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use nalgebra::Point3;
use serde::{Deserialize, Serialize};

/// One reconstructed point with its color.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColoredPoint {
    pub position: Point3<f32>,
    pub color: [u8; 3],
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlyFormat {
    #[default]
    Ascii,
    BinaryLittleEndian,
}

impl PlyFormat {
    fn header_name(self) -> &'static str {
        match self {
            PlyFormat::Ascii => "ascii",
            PlyFormat::BinaryLittleEndian => "binary_little_endian",
        }
    }
}

/// Colored points in the rectified left camera frame.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PointCloud {
    pub points: Vec<ColoredPoint>,
}

impl PointCloud {
    pub fn new(points: Vec<ColoredPoint>) -> Self {
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ColoredPoint> {
        self.points.iter()
    }

    /// Write the cloud as a PLY file.
    pub fn write_ply(&self, path: impl AsRef<Path>, format: PlyFormat) -> io::Result<()> {
        let mut out = BufWriter::new(File::create(path)?);
        match format {
            PlyFormat::Ascii => write_ply_ascii(self, &mut out)?,
            PlyFormat::BinaryLittleEndian => write_ply_binary(self, &mut out)?,
        }
        out.flush()
    }
}

fn write_header<W: Write>(out: &mut W, format: PlyFormat, count: usize) -> io::Result<()> {
    writeln!(out, "ply")?;
    writeln!(out, "format {} 1.0", format.header_name())?;
    writeln!(out, "element vertex {count}")?;
    for axis in ["x", "y", "z"] {
        writeln!(out, "property float {axis}")?;
    }
    for channel in ["red", "green", "blue"] {
        writeln!(out, "property uchar {channel}")?;
    }
    writeln!(out, "end_header")
}

/// `x y z r g b` per line after the header.
pub fn write_ply_ascii<W: Write>(cloud: &PointCloud, mut out: W) -> io::Result<()> {
    write_header(&mut out, PlyFormat::Ascii, cloud.len())?;
    for p in &cloud.points {
        let [r, g, b] = p.color;
        writeln!(
            out,
            "{:.6} {:.6} {:.6} {r} {g} {b}",
            p.position.x, p.position.y, p.position.z
        )?;
    }
    Ok(())
}

/// Little-endian `f32 x, y, z` followed by `u8 r, g, b` per vertex.
pub fn write_ply_binary<W: Write>(cloud: &PointCloud, mut out: W) -> io::Result<()> {
    write_header(&mut out, PlyFormat::BinaryLittleEndian, cloud.len())?;
    let mut record = [0u8; 15];
    for p in &cloud.points {
        record[0..4].copy_from_slice(&p.position.x.to_le_bytes());
        record[4..8].copy_from_slice(&p.position.y.to_le_bytes());
        record[8..12].copy_from_slice(&p.position.z.to_le_bytes());
        record[12..15].copy_from_slice(&p.color);
        out.write_all(&record)?;
    }
    Ok(())
}
