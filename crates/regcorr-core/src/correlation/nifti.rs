//! NIfTI-1 volume reader.
//!
//! Single-file images (`n+1`) only, plain or gzip-compressed. Voxel values
//! are widened to `f64` with `scl_slope`/`scl_inter` applied and kept in file
//! order (first axis fastest).

use std::io::{Read, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use ndarray::{Array2, ShapeBuilder};

use super::ArtifactError;

const HEADER_SIZE: usize = 348;
const MIN_VOX_OFFSET: usize = 352;
const MAGIC_SINGLE_FILE: &[u8; 4] = b"n+1\0";
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// On-disk voxel type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Datatype {
    U8,
    I16,
    I32,
    F32,
    F64,
    I8,
    U16,
    U32,
    I64,
    U64,
}

impl Datatype {
    pub fn from_code(code: i16) -> Option<Self> {
        Some(match code {
            2 => Datatype::U8,
            4 => Datatype::I16,
            8 => Datatype::I32,
            16 => Datatype::F32,
            64 => Datatype::F64,
            256 => Datatype::I8,
            512 => Datatype::U16,
            768 => Datatype::U32,
            1024 => Datatype::I64,
            1280 => Datatype::U64,
            _ => return None,
        })
    }

    pub fn code(&self) -> i16 {
        match self {
            Datatype::U8 => 2,
            Datatype::I16 => 4,
            Datatype::I32 => 8,
            Datatype::F32 => 16,
            Datatype::F64 => 64,
            Datatype::I8 => 256,
            Datatype::U16 => 512,
            Datatype::U32 => 768,
            Datatype::I64 => 1024,
            Datatype::U64 => 1280,
        }
    }

    pub fn size(&self) -> usize {
        match self {
            Datatype::U8 | Datatype::I8 => 1,
            Datatype::I16 | Datatype::U16 => 2,
            Datatype::I32 | Datatype::U32 | Datatype::F32 => 4,
            Datatype::F64 | Datatype::I64 | Datatype::U64 => 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endian {
    Little,
    Big,
}

macro_rules! read_as {
    ($fields:expr, $at:expr, $t:ty) => {
        match $fields.endian {
            Endian::Little => <$t>::from_le_bytes($fields.array($at)) as f64,
            Endian::Big => <$t>::from_be_bytes($fields.array($at)) as f64,
        }
    };
}

struct Fields<'a> {
    bytes: &'a [u8],
    endian: Endian,
}

impl Fields<'_> {
    fn array<const N: usize>(&self, at: usize) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.bytes[at..at + N]);
        out
    }

    fn i16(&self, at: usize) -> i16 {
        match self.endian {
            Endian::Little => i16::from_le_bytes(self.array(at)),
            Endian::Big => i16::from_be_bytes(self.array(at)),
        }
    }

    fn f32(&self, at: usize) -> f32 {
        match self.endian {
            Endian::Little => f32::from_le_bytes(self.array(at)),
            Endian::Big => f32::from_be_bytes(self.array(at)),
        }
    }

    fn value(&self, at: usize, datatype: Datatype) -> f64 {
        match datatype {
            Datatype::U8 => read_as!(self, at, u8),
            Datatype::I8 => read_as!(self, at, i8),
            Datatype::I16 => read_as!(self, at, i16),
            Datatype::U16 => read_as!(self, at, u16),
            Datatype::I32 => read_as!(self, at, i32),
            Datatype::U32 => read_as!(self, at, u32),
            Datatype::F32 => read_as!(self, at, f32),
            Datatype::F64 => read_as!(self, at, f64),
            Datatype::I64 => read_as!(self, at, i64),
            Datatype::U64 => read_as!(self, at, u64),
        }
    }
}

/// A decoded volume.
#[derive(Debug, Clone, PartialEq)]
pub struct NiftiImage {
    /// Extent of each axis.
    pub dims: Vec<usize>,
    /// Voxel spacing per axis (`pixdim[1..]`).
    pub spacing: Vec<f64>,
    /// Scaled voxel values, first axis fastest.
    pub data: Vec<f64>,
}

impl NiftiImage {
    pub fn new(dims: Vec<usize>, data: Vec<f64>) -> Self {
        let spacing = vec![1.0; dims.len()];
        Self {
            dims,
            spacing,
            data,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Extents with trailing singleton axes past the third dropped.
    fn effective_dims(&self) -> &[usize] {
        let mut end = self.dims.len();
        while end > 3 && self.dims[end - 1] == 1 {
            end -= 1;
        }
        &self.dims[..end]
    }

    /// Samples × series matrix for correlation.
    ///
    /// Up to three (non-singleton) axes the whole volume is one series of
    /// shape `(n, 1)`. With more axes each 3-D volume along the extra axes is
    /// one series over its voxels: shape `(voxels, volumes)`.
    pub fn sample_matrix(&self) -> Result<Array2<f64>, String> {
        let dims = self.effective_dims();
        if dims.len() <= 3 {
            return Array2::from_shape_vec((self.data.len(), 1), self.data.clone())
                .map_err(|e| e.to_string());
        }
        let voxels: usize = dims[..3].iter().product();
        let volumes = self.data.len() / voxels.max(1);
        // First axis fastest: each volume is a contiguous run of voxels.
        Array2::from_shape_vec((voxels, volumes).f(), self.data.clone())
            .map_err(|e| e.to_string())
    }

    /// Decode an image from file bytes, gunzipping if needed.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, String> {
        if bytes.starts_with(&GZIP_MAGIC) {
            let mut inflated = Vec::new();
            GzDecoder::new(bytes)
                .read_to_end(&mut inflated)
                .map_err(|e| format!("gzip stream is corrupt: {e}"))?;
            return Self::decode(&inflated);
        }
        Self::decode(bytes)
    }

    fn decode(bytes: &[u8]) -> Result<Self, String> {
        if bytes.len() < HEADER_SIZE {
            return Err(format!("file is {} bytes, shorter than a NIfTI-1 header", bytes.len()));
        }
        let mut sizeof_hdr = [0u8; 4];
        sizeof_hdr.copy_from_slice(&bytes[0..4]);
        let endian = if i32::from_le_bytes(sizeof_hdr) == HEADER_SIZE as i32 {
            Endian::Little
        } else if i32::from_be_bytes(sizeof_hdr) == HEADER_SIZE as i32 {
            Endian::Big
        } else {
            return Err("not a NIfTI-1 file: bad sizeof_hdr".to_string());
        };
        if &bytes[344..348] != MAGIC_SINGLE_FILE {
            return Err("only single-file (n+1) NIfTI-1 images are supported".to_string());
        }
        let fields = Fields { bytes, endian };

        let ndim = fields.i16(40);
        if !(1..=7).contains(&ndim) {
            return Err(format!("invalid dimension count {ndim}"));
        }
        let ndim = ndim as usize;
        let mut dims = Vec::with_capacity(ndim);
        for axis in 1..=ndim {
            let extent = fields.i16(40 + 2 * axis);
            if extent < 1 {
                return Err(format!("axis {axis} has extent {extent}"));
            }
            dims.push(extent as usize);
        }
        let spacing = (1..=ndim)
            .map(|axis| fields.f32(76 + 4 * axis) as f64)
            .collect();

        let code = fields.i16(70);
        let datatype =
            Datatype::from_code(code).ok_or_else(|| format!("unsupported datatype {code}"))?;
        let raw_offset = fields.f32(108);
        if !raw_offset.is_finite() || raw_offset < 0.0 || raw_offset as f64 > bytes.len() as f64 {
            return Err(format!(
                "vox_offset {raw_offset} lies outside the {}-byte file",
                bytes.len()
            ));
        }
        let vox_offset = (raw_offset as usize).max(MIN_VOX_OFFSET);
        let slope = fields.f32(112) as f64;
        let inter = fields.f32(116) as f64;

        let count = dims
            .iter()
            .try_fold(1usize, |acc, &extent| acc.checked_mul(extent))
            .ok_or_else(|| format!("dimensions {dims:?} overflow the voxel count"))?;
        let needed = count
            .checked_mul(datatype.size())
            .and_then(|n| n.checked_add(vox_offset))
            .ok_or_else(|| format!("dimensions {dims:?} overflow the data size"))?;
        if bytes.len() < needed {
            return Err(format!(
                "voxel data truncated: need {needed} bytes, file has {}",
                bytes.len()
            ));
        }

        let scale = slope != 0.0 && slope.is_finite();
        let data = (0..count)
            .map(|i| {
                let raw = fields.value(vox_offset + i * datatype.size(), datatype);
                if scale {
                    raw * slope + inter
                } else {
                    raw
                }
            })
            .collect();

        Ok(Self {
            dims,
            spacing,
            data,
        })
    }

    /// Encode as a little-endian float64 single-file image.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut header = vec![0u8; MIN_VOX_OFFSET];
        header[0..4].copy_from_slice(&(HEADER_SIZE as i32).to_le_bytes());
        let mut dim = [1i16; 8];
        dim[0] = self.dims.len() as i16;
        for (axis, extent) in self.dims.iter().enumerate() {
            dim[axis + 1] = *extent as i16;
        }
        for (i, d) in dim.iter().enumerate() {
            header[40 + 2 * i..42 + 2 * i].copy_from_slice(&d.to_le_bytes());
        }
        header[70..72].copy_from_slice(&Datatype::F64.code().to_le_bytes());
        header[72..74].copy_from_slice(&64i16.to_le_bytes());
        header[76..80].copy_from_slice(&1.0f32.to_le_bytes());
        for (axis, step) in self.spacing.iter().enumerate() {
            let at = 80 + 4 * axis;
            header[at..at + 4].copy_from_slice(&(*step as f32).to_le_bytes());
        }
        header[108..112].copy_from_slice(&(MIN_VOX_OFFSET as f32).to_le_bytes());
        header[344..348].copy_from_slice(MAGIC_SINGLE_FILE);

        let mut bytes = header;
        bytes.reserve(self.data.len() * 8);
        for value in &self.data {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        bytes
    }

    /// Write to `path`, gzip-compressed when it ends in `.gz`.
    pub fn write(&self, path: &Path) -> std::io::Result<()> {
        let bytes = self.to_bytes();
        let file = std::fs::File::create(path)?;
        if path.extension().is_some_and(|ext| ext == "gz") {
            let mut encoder = GzEncoder::new(file, Compression::default());
            encoder.write_all(&bytes)?;
            encoder.finish()?;
        } else {
            let mut file = file;
            file.write_all(&bytes)?;
        }
        Ok(())
    }
}

/// Read the volume at `path`.
pub fn read_volume(path: &Path) -> Result<NiftiImage, ArtifactError> {
    let display = path.display().to_string();
    let bytes = std::fs::read(path).map_err(|e| ArtifactError::Read {
        path: display.clone(),
        detail: e.to_string(),
    })?;
    NiftiImage::from_bytes(&bytes).map_err(|detail| ArtifactError::Read {
        path: display,
        detail,
    })
}
