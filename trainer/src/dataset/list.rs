use std::{fs, path::Path};

use log::{debug, info};
use machine_learning::MlErr;
use ndarray::{Array2, Array3, Array4, Axis, s, stack};
use rand::{Rng, SeedableRng, rngs::StdRng, seq::SliceRandom};

use super::{Batch, BatchProvider};
use crate::{Result, TrainErr, config::DatasetConfig};

/// The range random scaling draws its factor from.
const SCALE_RANGE: (f64, f64) = (0.5, 1.5);

/// A dataset of pre-converted samples listed one per line in a text file.
///
/// The order of the samples is shuffled at the start of every pass.
#[derive(Debug)]
pub struct ListDataset {
    cfg: DatasetConfig,
    names: Vec<String>,
    height: usize,
    width: usize,
    channels: usize,
    random_scale: bool,

    order: Vec<usize>,
    cursor: usize,
    rng: StdRng,
}

impl ListDataset {
    /// Reads the list file of `cfg`.
    ///
    /// # Arguments
    /// * `cfg` - The dataset section of the configuration.
    /// * `input_size` - The `(height, width)` every sample is stored at.
    /// * `seed` - The seed of the shuffling and scaling.
    /// * `random_scale` - Whether to randomly rescale every sample.
    ///
    /// # Returns
    /// A new `ListDataset` or an error if the list can't be read or is empty.
    pub fn open(
        cfg: &DatasetConfig,
        input_size: (usize, usize),
        seed: u64,
        random_scale: bool,
    ) -> Result<Self> {
        let (height, width) = input_size;
        let names = read_list(&cfg.txt_path)?;
        if names.is_empty() {
            return Err(TrainErr::EmptyDataset);
        }

        info!(
            "listed {} samples of {height}x{width}x{} from {}",
            names.len(),
            cfg.channels(),
            cfg.txt_path.display()
        );

        let mut rng = StdRng::seed_from_u64(seed);
        let mut order: Vec<_> = (0..names.len()).collect();
        order.shuffle(&mut rng);

        Ok(Self {
            cfg: cfg.clone(),
            names,
            height,
            width,
            channels: cfg.channels(),
            random_scale,
            order,
            cursor: 0,
            rng,
        })
    }

    fn load(&mut self, name: &str) -> Result<(Array3<f32>, Array2<u8>)> {
        let (h, w, c) = (self.height, self.width, self.channels);

        let path = self.cfg.image_path(name);
        let bytes = fs::read(&path).map_err(TrainErr::io(&path))?;
        let expected = h * w * c * size_of::<f32>();
        if bytes.len() != expected {
            return Err(TrainErr::MalformedSample {
                path,
                got: bytes.len(),
                expected,
            });
        }

        let pixels = bytes
            .chunks_exact(size_of::<f32>())
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        let image = Array3::from_shape_vec((h, w, c), pixels).map_err(MlErr::from)?;

        let path = self.cfg.label_path(name);
        let bytes = fs::read(&path).map_err(TrainErr::io(&path))?;
        if bytes.len() != h * w {
            return Err(TrainErr::MalformedSample {
                path,
                got: bytes.len(),
                expected: h * w,
            });
        }
        let label = Array2::from_shape_vec((h, w), bytes).map_err(MlErr::from)?;

        if !self.random_scale {
            return Ok((image, label));
        }

        let factor = self.rng.random_range(SCALE_RANGE.0..=SCALE_RANGE.1);
        debug!("scaling {name} by {factor:.3}");
        Ok(rescale(&image, &label, factor, self.cfg.eps))
    }
}

impl BatchProvider for ListDataset {
    fn total_examples(&self) -> usize {
        self.names.len()
    }

    fn next_batch(&mut self, size: usize) -> Result<Batch> {
        let mut images = Vec::with_capacity(size);
        let mut labels = Vec::with_capacity(size);

        for _ in 0..size {
            if self.cursor == self.order.len() {
                self.order.shuffle(&mut self.rng);
                self.cursor = 0;
            }

            let name = self.names[self.order[self.cursor]].clone();
            self.cursor += 1;

            let (image, label) = self.load(&name)?;
            images.push(image);
            labels.push(label.insert_axis(Axis(2)));
        }

        let images: Vec<_> = images.iter().map(|i| i.view()).collect();
        let labels: Vec<_> = labels.iter().map(|l| l.view()).collect();

        let (h, w, c) = (self.height, self.width, self.channels);
        let images = match images.is_empty() {
            true => Array4::zeros((0, h, w, c)),
            false => stack(Axis(0), &images).map_err(MlErr::from)?,
        };
        let labels = match labels.is_empty() {
            true => Array4::zeros((0, h, w, 1)),
            false => stack(Axis(0), &labels).map_err(MlErr::from)?,
        };

        Batch::new(images, labels)
    }
}

/// Reads the sample names of a list file: the first token of every non empty line.
fn read_list(path: &Path) -> Result<Vec<String>> {
    let raw = fs::read_to_string(path).map_err(TrainErr::io(path))?;

    Ok(raw
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .filter(|name| !name.starts_with('#'))
        .map(str::to_string)
        .collect())
}

/// Length of a side after scaling it by `factor`.
fn scaled_len(len: usize, factor: f64, eps: f64) -> usize {
    ((len as f64 * factor + eps).floor() as usize).max(1)
}

/// Scales a sample by `factor` with nearest neighbour interpolation and then crops its centre,
/// or pads it with zeros, back to the original size.
fn rescale(
    image: &Array3<f32>,
    label: &Array2<u8>,
    factor: f64,
    eps: f64,
) -> (Array3<f32>, Array2<u8>) {
    let (h, w, c) = image.dim();
    let (sh, sw) = (scaled_len(h, factor, eps), scaled_len(w, factor, eps));

    // Offset of the output window inside the scaled sample, negative when padding.
    let oy = (sh as isize - h as isize) / 2;
    let ox = (sw as isize - w as isize) / 2;

    let source = |i: usize, j: usize| {
        let y = i as isize + oy;
        let x = j as isize + ox;
        if y < 0 || x < 0 || y >= sh as isize || x >= sw as isize {
            return None;
        }

        let y = (y as usize * h / sh).min(h - 1);
        let x = (x as usize * w / sw).min(w - 1);
        Some((y, x))
    };

    let mut out_image = Array3::zeros((h, w, c));
    let mut out_label = Array2::zeros((h, w));

    for i in 0..h {
        for j in 0..w {
            if let Some((y, x)) = source(i, j) {
                out_image
                    .slice_mut(s![i, j, ..])
                    .assign(&image.slice(s![y, x, ..]));
                out_label[[i, j]] = label[[y, x]];
            }
        }
    }

    (out_image, out_label)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn write_sample(cfg: &DatasetConfig, name: &str, value: f32, h: usize, w: usize) {
        let image: Vec<u8> = (0..h * w * cfg.channels())
            .flat_map(|_| value.to_le_bytes())
            .collect();
        fs::write(cfg.image_path(name), image).unwrap();
        fs::write(cfg.label_path(name), vec![value as u8; h * w]).unwrap();
    }

    fn dataset_dir(names: &[&str]) -> (tempfile::TempDir, DatasetConfig) {
        let dir = tempfile::tempdir().unwrap();
        let cfg = DatasetConfig {
            txt_path: dir.path().join("train.txt"),
            base_dir: dir.path().to_path_buf(),
            input_size: "4,6".to_string(),
            only_pos: true,
            ..Default::default()
        };

        fs::create_dir_all(dir.path().join(&cfg.img_dir)).unwrap();
        fs::create_dir_all(dir.path().join(&cfg.gt_dir)).unwrap();

        let mut list = String::from("# generated\n\n");
        for (i, name) in names.iter().enumerate() {
            write_sample(&cfg, name, i as f32, 4, 6);
            list.push_str(&format!("{name} extra columns\n"));
        }
        fs::write(&cfg.txt_path, list).unwrap();

        (dir, cfg)
    }

    #[test]
    fn reads_every_sample_once_per_pass() {
        let (_dir, cfg) = dataset_dir(&["a", "b", "c"]);
        let mut dataset = ListDataset::open(&cfg, cfg.input_size().unwrap(), 3, false).unwrap();
        assert_eq!(dataset.total_examples(), 3);

        let batch = dataset.next_batch(3).unwrap();
        assert_eq!(batch.images().dim(), (3, 4, 6, 4));
        assert_eq!(batch.labels().dim(), (3, 4, 6, 1));

        let mut firsts: Vec<_> = batch
            .labels()
            .outer_iter()
            .map(|l| l[[0, 0, 0]])
            .collect();
        firsts.sort();
        assert_eq!(firsts, [0, 1, 2]);

        // starts a new pass
        assert_eq!(dataset.next_batch(2).unwrap().len(), 2);
    }

    #[test]
    fn truncated_sample() {
        let (_dir, cfg) = dataset_dir(&["a"]);
        fs::write(cfg.label_path("a"), [0u8; 3]).unwrap();

        let mut dataset = ListDataset::open(&cfg, cfg.input_size().unwrap(), 0, false).unwrap();
        assert!(matches!(
            dataset.next_batch(1),
            Err(TrainErr::MalformedSample { .. })
        ));
    }

    #[test]
    fn empty_list() {
        let (_dir, cfg) = dataset_dir(&[]);
        assert!(matches!(
            ListDataset::open(&cfg, cfg.input_size().unwrap(), 0, false),
            Err(TrainErr::EmptyDataset)
        ));
    }

    #[test]
    fn missing_list() {
        let cfg = DatasetConfig {
            txt_path: PathBuf::from("/nope/train.txt"),
            ..Default::default()
        };
        assert!(matches!(
            ListDataset::open(&cfg, cfg.input_size().unwrap(), 0, false),
            Err(TrainErr::Io { .. })
        ));
    }

    #[test]
    fn rescale_keeps_size() {
        let image = Array3::from_shape_fn((4, 4, 1), |(i, j, _)| (i * 4 + j) as f32);
        let label = Array2::from_shape_fn((4, 4), |(i, j)| (i * 4 + j) as u8);

        let (same, same_label) = rescale(&image, &label, 1., 1e-14);
        assert_eq!(same, image);
        assert_eq!(same_label, label);

        // 2x2 window in the middle of a 4x4 canvas
        let (small, small_label) = rescale(&image, &label, 0.5, 1e-14);
        assert_eq!(small.dim(), (4, 4, 1));
        assert_eq!(small_label[[0, 0]], 0);
        assert_eq!(small_label[[1, 1]], 0);
        assert_eq!(small_label[[1, 2]], 2);
        assert_eq!(small_label[[2, 1]], 8);
        assert_eq!(small_label[[3, 3]], 0);
        assert_eq!(small[[2, 2, 0]], 10.);

        // 6x6 scaled sample cropped to its centre
        let (big, _) = rescale(&image, &label, 1.5, 1e-14);
        assert_eq!(big.dim(), (4, 4, 1));
        assert_eq!(big[[0, 0, 0]], image[[0, 0, 0]]);
    }
}
