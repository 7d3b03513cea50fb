//! Tensor descriptors and zero-copy batch slicing
//!
//! Batched tensors are contiguous row-major `[N,C,H,W]` buffers. Slicing a
//! batch index out of one is a pure view computation: same C/H/W/dtype,
//! batch 1, data offset `k * C * H * W * element_size`. Views never outlive
//! the buffer they borrow from.

use serde::{Deserialize, Serialize};

use crate::utils::error::{FrameflowError, Result};

/// Element type of a tensor buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Float32,
    Uint8,
}

impl DataType {
    /// Element size in bytes
    pub fn size_of(self) -> usize {
        match self {
            DataType::Float32 => 4,
            DataType::Uint8 => 1,
        }
    }
}

/// Shape and element type of a `[N,C,H,W]` tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TensorDesc {
    pub batch: usize,
    pub channels: usize,
    pub height: usize,
    pub width: usize,
    pub dtype: DataType,
}

impl TensorDesc {
    /// Elements in one batch entry
    pub fn frame_elems(&self) -> usize {
        self.channels * self.height * self.width
    }

    /// Bytes in one batch entry
    pub fn frame_bytes(&self) -> usize {
        self.frame_elems() * self.dtype.size_of()
    }

    /// Bytes in the whole batched buffer
    pub fn total_bytes(&self) -> usize {
        self.batch * self.frame_bytes()
    }

    /// Same shape with a different batch dimension
    pub fn with_batch(mut self, batch: usize) -> Self {
        self.batch = batch;
        self
    }
}

fn check_len(desc: &TensorDesc, len: usize) -> Result<()> {
    if len != desc.total_bytes() {
        return Err(FrameflowError::InvalidArgument(format!(
            "tensor buffer is {} bytes, descriptor requires {}",
            len,
            desc.total_bytes()
        )));
    }
    Ok(())
}

fn check_batch_index(desc: &TensorDesc, index: usize) -> Result<()> {
    if index >= desc.batch {
        return Err(FrameflowError::InvalidArgument(format!(
            "batch index {} out of range for batch size {}",
            index, desc.batch
        )));
    }
    Ok(())
}

/// Read-only view of a batched tensor buffer
#[derive(Debug, Clone, Copy)]
pub struct Tensor<'a> {
    desc: TensorDesc,
    data: &'a [u8],
}

impl<'a> Tensor<'a> {
    pub fn new(desc: TensorDesc, data: &'a [u8]) -> Result<Self> {
        check_len(&desc, data.len())?;
        Ok(Self { desc, data })
    }

    pub fn desc(&self) -> TensorDesc {
        self.desc
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// View of batch entry `index` with batch dimension 1
    pub fn into_batch(self, index: usize) -> Result<Tensor<'a>> {
        check_batch_index(&self.desc, index)?;
        let stride = self.desc.frame_bytes();
        Ok(Tensor {
            desc: self.desc.with_batch(1),
            data: &self.data[index * stride..(index + 1) * stride],
        })
    }
}

/// Mutable view of a batched tensor buffer
#[derive(Debug)]
pub struct TensorMut<'a> {
    desc: TensorDesc,
    data: &'a mut [u8],
}

impl<'a> TensorMut<'a> {
    pub fn new(desc: TensorDesc, data: &'a mut [u8]) -> Result<Self> {
        check_len(&desc, data.len())?;
        Ok(Self { desc, data })
    }

    pub fn desc(&self) -> TensorDesc {
        self.desc
    }

    pub fn data(&mut self) -> &mut [u8] {
        self.data
    }

    /// Mutable view of batch entry `index` with batch dimension 1
    pub fn into_batch(self, index: usize) -> Result<TensorMut<'a>> {
        check_batch_index(&self.desc, index)?;
        let stride = self.desc.frame_bytes();
        Ok(TensorMut {
            desc: self.desc.with_batch(1),
            data: &mut self.data[index * stride..(index + 1) * stride],
        })
    }
}
