/// NumPy dataset loader for re-id image crops (.npy format)
use candle_core::{Device, Result, Tensor};
use ndarray::{Array1, Array4, Axis};
use ndarray_npy::ReadNpyExt;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use super::Batch;

/// Metadata from dataset.json
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatasetMetadata {
    pub num_classes: usize,
    pub height: usize,
    pub width: usize,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub fnames: Vec<String>,
}

/// Dataset loaded from NumPy .npy files
pub struct NumpyReidDataset {
    images: Array4<f32>, // [N, C, H, W]
    pids: Vec<u32>,
    camids: Vec<u32>,
    weights: Vec<f32>,
    fnames: Vec<String>,
    metadata: DatasetMetadata,
}

fn read_npy<T: ReadNpyExt>(path: &Path) -> crate::Result<T> {
    let reader = BufReader::new(File::open(path)?);
    T::read_npy(reader).map_err(|e| {
        crate::ReidError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Failed to read {}: {}", path.display(), e),
        ))
    })
}

fn to_labels(values: Array1<i64>, what: &str) -> crate::Result<Vec<u32>> {
    values
        .iter()
        .map(|&v| {
            u32::try_from(v)
                .map_err(|_| crate::ReidError::Data(format!("Invalid {} value: {}", what, v)))
        })
        .collect()
}

impl NumpyReidDataset {
    /// Load from directory containing .npy files and dataset.json
    ///
    /// Expects `images.npy` (f32, `[N, C, H, W]`) and `pids.npy` (i64);
    /// `camids.npy` (i64) and `weights.npy` (f32) are optional.
    pub fn from_directory<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let dir = path.as_ref();

        log::info!("Loading NumPy re-id dataset from: {:?}", dir);

        let metadata_path = dir.join("dataset.json");
        let metadata: DatasetMetadata =
            serde_json::from_reader(BufReader::new(File::open(&metadata_path)?))?;

        let images: Array4<f32> = read_npy(&dir.join("images.npy"))?;
        log::info!("Loaded images: shape {:?}", images.shape());

        let pids = to_labels(read_npy(&dir.join("pids.npy"))?, "pid")?;

        let camids_path = dir.join("camids.npy");
        let camids = if camids_path.exists() {
            to_labels(read_npy(&camids_path)?, "camid")?
        } else {
            log::warn!("camids.npy not found, using camera 0 for every sample");
            vec![0; pids.len()]
        };

        let weights_path = dir.join("weights.npy");
        let weights = if weights_path.exists() {
            read_npy::<Array1<f32>>(&weights_path)?.to_vec()
        } else {
            log::warn!("weights.npy not found, using unit weights");
            vec![1.0; pids.len()]
        };

        Self::from_arrays(images, pids, camids, weights, metadata)
    }

    /// Build a dataset from in-memory arrays
    pub fn from_arrays(
        images: Array4<f32>,
        pids: Vec<u32>,
        camids: Vec<u32>,
        weights: Vec<f32>,
        metadata: DatasetMetadata,
    ) -> crate::Result<Self> {
        let num_examples = images.len_of(Axis(0));

        for (name, len) in [
            ("pids", pids.len()),
            ("camids", camids.len()),
            ("weights", weights.len()),
        ] {
            if len != num_examples {
                return Err(crate::ReidError::Config(format!(
                    "Shape mismatch: {} images but {} {}",
                    num_examples, len, name
                )));
            }
        }

        if let Some(&pid) = pids.iter().find(|&&pid| pid as usize >= metadata.num_classes) {
            return Err(crate::ReidError::Config(format!(
                "pid {} out of range for num_classes={}",
                pid, metadata.num_classes
            )));
        }

        let fnames = if metadata.fnames.is_empty() {
            (0..num_examples).map(|i| format!("{:08}.jpg", i)).collect()
        } else if metadata.fnames.len() == num_examples {
            metadata.fnames.clone()
        } else {
            return Err(crate::ReidError::Config(format!(
                "Shape mismatch: {} images but {} fnames",
                num_examples,
                metadata.fnames.len()
            )));
        };

        log::info!(
            "Dataset loaded: {} examples, {} identities, {}x{}",
            num_examples,
            metadata.num_classes,
            metadata.height,
            metadata.width
        );

        Ok(Self {
            images,
            pids,
            camids,
            weights,
            fnames,
            metadata,
        })
    }

    /// Get number of examples
    pub fn len(&self) -> usize {
        self.pids.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.pids.is_empty()
    }

    pub fn num_classes(&self) -> usize {
        self.metadata.num_classes
    }

    /// `[C, H, W]` of a single image
    pub fn image_shape(&self) -> (usize, usize, usize) {
        let shape = self.images.shape();
        (shape[1], shape[2], shape[3])
    }

    pub fn metadata(&self) -> &DatasetMetadata {
        &self.metadata
    }

    fn gather(&self, indices: &[usize]) -> Result<Batch> {
        let (c, h, w) = self.image_shape();
        let mut image_data = Vec::with_capacity(indices.len() * c * h * w);
        let mut pids = Vec::with_capacity(indices.len());
        let mut camids = Vec::with_capacity(indices.len());
        let mut weights = Vec::with_capacity(indices.len());
        let mut fnames = Vec::with_capacity(indices.len());

        for &idx in indices {
            image_data.extend(self.images.index_axis(Axis(0), idx).iter().copied());
            pids.push(self.pids[idx]);
            camids.push(self.camids[idx]);
            weights.push(self.weights[idx]);
            fnames.push(self.fnames[idx].clone());
        }

        let n = indices.len();
        let device = Device::Cpu;
        Ok(Batch {
            images: Tensor::from_vec(image_data, (n, c, h, w), &device)?,
            fnames,
            pids: Tensor::from_vec(pids, n, &device)?,
            camids: Tensor::from_vec(camids, n, &device)?,
            weights: Tensor::from_vec(weights, n, &device)?,
        })
    }
}

/// Data loader for NumPy re-id datasets
pub struct NumpyReidLoader {
    dataset: NumpyReidDataset,
    batch_size: usize,
    current_idx: usize,
    indices: Vec<usize>,
    shuffle: bool,
}

impl NumpyReidLoader {
    /// Create new data loader
    pub fn new(dataset: NumpyReidDataset, batch_size: usize, shuffle: bool) -> Self {
        let indices: Vec<usize> = (0..dataset.len()).collect();
        let mut loader = Self {
            dataset,
            batch_size: batch_size.max(1),
            current_idx: 0,
            indices,
            shuffle,
        };
        loader.shuffle_indices();
        loader
    }

    fn shuffle_indices(&mut self) {
        if self.shuffle {
            use rand::seq::SliceRandom;
            let mut rng = rand::thread_rng();
            self.indices.shuffle(&mut rng);
        }
    }

    /// Get dataset reference
    pub fn dataset(&self) -> &NumpyReidDataset {
        &self.dataset
    }
}

impl super::BatchDataLoader for NumpyReidLoader {
    fn next_batch(&mut self) -> Result<Option<Batch>> {
        if self.current_idx >= self.indices.len() {
            return Ok(None);
        }

        let end_idx = (self.current_idx + self.batch_size).min(self.indices.len());
        let batch = self.dataset.gather(&self.indices[self.current_idx..end_idx])?;
        self.current_idx = end_idx;

        Ok(Some(batch))
    }

    fn reset(&mut self) {
        self.current_idx = 0;
        self.shuffle_indices();
    }

    fn num_batches(&self) -> usize {
        (self.dataset.len() + self.batch_size - 1) / self.batch_size
    }
}
