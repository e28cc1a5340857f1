//! Dense `f32` tensors with a runtime shape.
//!
//! Shapes are plain `Vec<usize>` checked at runtime: node graphs are wired
//! dynamically, so nothing about a payload's rank is known at compile time.

use std::fmt;
use std::sync::Arc;

use crate::core::error::NodeError;

/// Where a tensor's storage lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Device {
    #[default]
    Cpu,
    /// An accelerator, by ordinal.
    Accelerator(usize),
}

impl Device {
    pub fn is_cpu(&self) -> bool {
        matches!(self, Device::Cpu)
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Accelerator(idx) => write!(f, "cuda:{idx}"),
        }
    }
}

/// A row-major tensor of `f32` values.
///
/// Storage is shared, so moving a tensor between devices or re-viewing it
/// with an extra axis never copies the data.
#[derive(Clone, PartialEq)]
pub struct Tensor {
    shape: Vec<usize>,
    data: Arc<[f32]>,
    device: Device,
}

impl Tensor {
    /// Create a tensor from a shape and row-major data.
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Result<Self, NodeError> {
        let numel: usize = shape.iter().product();
        if numel != data.len() {
            return Err(NodeError::InvalidTensor(format!(
                "shape {:?} needs {} elements, got {}",
                shape,
                numel,
                data.len()
            )));
        }
        Ok(Self {
            shape,
            data: data.into(),
            device: Device::Cpu,
        })
    }

    /// A tensor of the given shape with every element set to `value`.
    pub fn filled(shape: Vec<usize>, value: f32) -> Self {
        let numel: usize = shape.iter().product();
        Self {
            shape,
            data: vec![value; numel].into(),
            device: Device::Cpu,
        }
    }

    pub fn zeros(shape: Vec<usize>) -> Self {
        Self::filled(shape, 0.0)
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Number of axes.
    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn numel(&self) -> usize {
        self.data.len()
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn device(&self) -> Device {
        self.device
    }

    /// The same tensor, placed on `device`.
    pub fn to(&self, device: Device) -> Self {
        Self {
            shape: self.shape.clone(),
            data: Arc::clone(&self.data),
            device,
        }
    }

    /// Insert a singleton axis at `axis`.
    pub fn unsqueeze(&self, axis: usize) -> Result<Self, NodeError> {
        if axis > self.shape.len() {
            return Err(NodeError::InvalidTensor(format!(
                "cannot insert axis {} into a tensor of rank {}",
                axis,
                self.shape.len()
            )));
        }
        let mut shape = self.shape.clone();
        shape.insert(axis, 1);
        Ok(Self {
            shape,
            data: Arc::clone(&self.data),
            device: self.device,
        })
    }

    /// The sub-tensor at `index` along the leading axis.
    pub fn select_first(&self, index: usize) -> Option<Self> {
        let (&leading, rest) = self.shape.split_first()?;
        if index >= leading {
            return None;
        }
        let stride: usize = rest.iter().product();
        let start = index * stride;
        Some(Self {
            shape: rest.to_vec(),
            data: self.data[start..start + stride].into(),
            device: self.device,
        })
    }

    pub fn min(&self) -> Option<f32> {
        self.data.iter().copied().reduce(f32::min)
    }

    pub fn max(&self) -> Option<f32> {
        self.data.iter().copied().reduce(f32::max)
    }

    pub fn sum(&self) -> f32 {
        self.data.iter().sum()
    }

    pub fn mean(&self) -> Option<f32> {
        if self.data.is_empty() {
            None
        } else {
            Some(self.sum() / self.data.len() as f32)
        }
    }

    /// One-line statistical summary used in failure diagnostics.
    pub fn info(&self) -> String {
        let fmt_opt = |v: Option<f32>| v.map_or_else(|| "n/a".to_string(), |v| v.to_string());
        format!(
            "shape={:?} dtype=f32 min={} max={} mean={} sum={} device={}",
            self.shape,
            fmt_opt(self.min()),
            fmt_opt(self.max()),
            fmt_opt(self.mean()),
            self.sum(),
            self.device
        )
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tensor(shape={:?}, device={})", self.shape, self.device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_mismatched_data() {
        assert!(Tensor::new(vec![2, 2], vec![0.0; 3]).is_err());
        assert!(Tensor::new(vec![2, 2], vec![0.0; 4]).is_ok());
    }

    #[test]
    fn test_unsqueeze_leading_axis() {
        let t = Tensor::zeros(vec![4, 5]);
        let u = t.unsqueeze(0).unwrap();
        assert_eq!(u.shape(), &[1, 4, 5]);
        assert_eq!(u.numel(), 20);
        assert!(t.unsqueeze(3).is_err());
    }

    #[test]
    fn test_select_first() {
        let t = Tensor::new(vec![2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let row = t.select_first(1).unwrap();
        assert_eq!(row.shape(), &[2]);
        assert_eq!(row.data(), &[3.0, 4.0]);
        assert!(t.select_first(2).is_none());
    }

    #[test]
    fn test_stats_and_device() {
        let t = Tensor::new(vec![4], vec![-1.0, 0.0, 1.0, 2.0]).unwrap();
        assert_eq!(t.min(), Some(-1.0));
        assert_eq!(t.max(), Some(2.0));
        assert_eq!(t.sum(), 2.0);
        assert_eq!(t.mean(), Some(0.5));

        let moved = t.to(Device::Accelerator(0));
        assert_eq!(moved.device().to_string(), "cuda:0");
        assert!(moved.info().contains("device=cuda:0"));
        assert!(Tensor::zeros(vec![0]).min().is_none());
    }
}
