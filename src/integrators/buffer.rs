//! Where integrated states are written

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use memmap2::{Mmap, MmapMut, MmapOptions};
use ndarray::{Array3, ArrayView3, ArrayViewMut3};

use crate::error::{ConfigError, Result};
use crate::math::Scalar;

const SCALAR_BYTES: usize = std::mem::size_of::<Scalar>();

/// Destination for the `(2*ndim, n_times, norbits)` state history
#[derive(Debug, Default)]
pub enum OutputBuffer<'a> {
    /// A fresh zeroed array owned by the run
    #[default]
    Allocate,
    /// Caller-owned memory of exactly the right shape
    Borrowed(ArrayViewMut3<'a, Scalar>),
    /// A writable memory-mapped file of exactly the right shape
    Mapped(&'a mut MappedBuffer),
}

impl<'a> OutputBuffer<'a> {
    /// Check the buffer against `shape` and hand out writable storage
    pub(crate) fn prepare(self, shape: [usize; 3]) -> Result<Storage<'a>> {
        match self {
            OutputBuffer::Allocate => Ok(Storage::Owned(Array3::zeros(shape))),
            OutputBuffer::Borrowed(view) => {
                check_shape(view.shape(), shape)?;
                Ok(Storage::View(view))
            }
            OutputBuffer::Mapped(mapped) => {
                let view = mapped.view_mut()?;
                check_shape(view.shape(), shape)?;
                Ok(Storage::View(view))
            }
        }
    }
}

impl<'a> From<ArrayViewMut3<'a, Scalar>> for OutputBuffer<'a> {
    fn from(view: ArrayViewMut3<'a, Scalar>) -> Self {
        OutputBuffer::Borrowed(view)
    }
}

impl<'a> From<&'a mut MappedBuffer> for OutputBuffer<'a> {
    fn from(mapped: &'a mut MappedBuffer) -> Self {
        OutputBuffer::Mapped(mapped)
    }
}

fn check_shape(actual: &[usize], expected: [usize; 3]) -> Result<()> {
    if actual == expected {
        Ok(())
    } else {
        Err(ConfigError::BufferShape {
            expected,
            actual: actual.to_vec(),
        }
        .into())
    }
}

pub(crate) enum Storage<'a> {
    Owned(Array3<Scalar>),
    View(ArrayViewMut3<'a, Scalar>),
}

impl Storage<'_> {
    pub(crate) fn view(&self) -> ArrayView3<'_, Scalar> {
        match self {
            Storage::Owned(array) => array.view(),
            Storage::View(view) => view.view(),
        }
    }

    pub(crate) fn view_mut(&mut self) -> ArrayViewMut3<'_, Scalar> {
        match self {
            Storage::Owned(array) => array.view_mut(),
            Storage::View(view) => view.view_mut(),
        }
    }
}

#[derive(Debug)]
enum Mapping {
    Writable(MmapMut),
    ReadOnly(Mmap),
}

/// A native-endian `f64` array of fixed shape backed by a file.
///
/// The file holds the elements in row-major order with no header.
#[derive(Debug)]
pub struct MappedBuffer {
    mapping: Mapping,
    shape: [usize; 3],
    path: PathBuf,
}

impl MappedBuffer {
    /// Create (or truncate) `path` and map it writable
    pub fn create(path: impl AsRef<Path>, shape: [usize; 3]) -> Result<Self> {
        let path = path.as_ref();
        let bytes = byte_len(shape)?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(bytes as u64)?;

        // SAFETY: the file was just sized by us; callers must not resize it
        // while the mapping is alive
        let map = unsafe { MmapOptions::new().len(bytes).map_mut(&file)? };
        Ok(Self {
            mapping: Mapping::Writable(map),
            shape,
            path: path.to_path_buf(),
        })
    }

    /// Map an existing file for reading only
    pub fn open_read_only(path: impl AsRef<Path>, shape: [usize; 3]) -> Result<Self> {
        let path = path.as_ref();
        let bytes = byte_len(shape)?;
        let file = File::open(path)?;
        let actual = file.metadata()?.len();
        if actual != bytes as u64 {
            return Err(ConfigError::BufferShape {
                expected: shape,
                actual: vec![actual as usize / SCALAR_BYTES],
            }
            .into());
        }

        // SAFETY: read-only mapping of a file whose length was just checked
        let map = unsafe { MmapOptions::new().len(bytes).map(&file)? };
        Ok(Self {
            mapping: Mapping::ReadOnly(map),
            shape,
            path: path.to_path_buf(),
        })
    }

    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_writable(&self) -> bool {
        matches!(self.mapping, Mapping::Writable(_))
    }

    pub fn view(&self) -> Result<ArrayView3<'_, Scalar>> {
        let bytes: &[u8] = match &self.mapping {
            Mapping::Writable(map) => &map[..],
            Mapping::ReadOnly(map) => &map[..],
        };
        let data: &[Scalar] = bytemuck::try_cast_slice(bytes)
            .map_err(|e| ConfigError::Shape(format!("mapped buffer: {e}")))?;
        ArrayView3::from_shape(self.shape, data)
            .map_err(|e| ConfigError::Shape(e.to_string()).into())
    }

    pub fn view_mut(&mut self) -> Result<ArrayViewMut3<'_, Scalar>> {
        let Mapping::Writable(map) = &mut self.mapping else {
            return Err(ConfigError::BufferNotWritable.into());
        };
        let data: &mut [Scalar] = bytemuck::try_cast_slice_mut(&mut map[..])
            .map_err(|e| ConfigError::Shape(format!("mapped buffer: {e}")))?;
        ArrayViewMut3::from_shape(self.shape, data)
            .map_err(|e| ConfigError::Shape(e.to_string()).into())
    }

    /// Write dirty pages back to the file
    pub fn flush(&self) -> Result<()> {
        if let Mapping::Writable(map) = &self.mapping {
            map.flush()?;
        }
        Ok(())
    }
}

fn byte_len(shape: [usize; 3]) -> Result<usize> {
    shape
        .iter()
        .try_fold(SCALAR_BYTES, |acc, &n| acc.checked_mul(n))
        .filter(|&bytes| bytes > 0)
        .ok_or_else(|| ConfigError::Shape(format!("cannot map a buffer of shape {shape:?}")).into())
}
