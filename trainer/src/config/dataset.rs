use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{Result, TrainErr};

/// Where the training samples live and how big they are.
///
/// Every sample listed in `txt_path` has an image at `base_dir/img_dir/<name><img_ext>` holding
/// `h * w * channels` little endian `f32`s and a mask at `base_dir/gt_dir/<name><gt_ext>` holding
/// `h * w` bytes.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    pub txt_path: PathBuf,
    pub base_dir: PathBuf,
    pub img_dir: String,
    pub img_ext: String,
    #[serde(alias = "instanceann_dir")]
    pub gt_dir: String,
    pub gt_ext: String,
    /// `"h,w"`
    pub input_size: String,
    /// Whether the inputs only carry positive clicks, 4 channels instead of 5.
    pub only_pos: bool,
    pub eps: f64,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            txt_path: PathBuf::from("train.txt"),
            base_dir: PathBuf::from("."),
            img_dir: "JPEGImages".to_string(),
            img_ext: ".f32".to_string(),
            gt_dir: "SegmentationObjectFilledDenseCRF".to_string(),
            gt_ext: ".u8".to_string(),
            input_size: "321,321".to_string(),
            only_pos: false,
            eps: 1e-14,
        }
    }
}

impl DatasetConfig {
    /// Reads a dataset section from a JSON file, missing keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(TrainErr::io(path))?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Parses `input_size`.
    ///
    /// # Returns
    /// The `(height, width)` of the inputs or an error if the field is malformed.
    pub fn input_size(&self) -> Result<(usize, usize)> {
        let malformed = || {
            TrainErr::InvalidConfig(format!(
                "input size must look like \"h,w\", got \"{}\"",
                self.input_size
            ))
        };

        let (h, w) = self.input_size.split_once(',').ok_or_else(malformed)?;
        let h: usize = h.trim().parse().map_err(|_| malformed())?;
        let w: usize = w.trim().parse().map_err(|_| malformed())?;

        if h == 0 || w == 0 {
            return Err(malformed());
        }

        Ok((h, w))
    }

    /// Input channels: RGB plus the positive click map, plus the negative one unless `only_pos`.
    pub fn channels(&self) -> usize {
        if self.only_pos { 4 } else { 5 }
    }

    pub fn image_path(&self, name: &str) -> PathBuf {
        self.base_dir
            .join(&self.img_dir)
            .join(format!("{name}{}", self.img_ext))
    }

    pub fn label_path(&self, name: &str) -> PathBuf {
        self.base_dir
            .join(&self.gt_dir)
            .join(format!("{name}{}", self.gt_ext))
    }

    /// Checks that the list file and base directory exist and that the input size parses.
    pub fn validate(&self) -> Result<()> {
        if !self.txt_path.is_file() {
            return Err(TrainErr::InvalidConfig(format!(
                "list file {} doesn't exist",
                self.txt_path.display()
            )));
        }

        if !self.base_dir.is_dir() {
            return Err(TrainErr::InvalidConfig(format!(
                "base directory {} doesn't exist",
                self.base_dir.display()
            )));
        }

        self.input_size()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_size() {
        let mut cfg = DatasetConfig::default();
        assert_eq!(cfg.input_size().unwrap(), (321, 321));

        cfg.input_size = " 240, 320 ".to_string();
        assert_eq!(cfg.input_size().unwrap(), (240, 320));

        for bad in ["240", "240,", "a,b", "0,10", "1,2,3"] {
            cfg.input_size = bad.to_string();
            assert!(cfg.input_size().is_err(), "{bad}");
        }
    }

    #[test]
    fn channels() {
        let mut cfg = DatasetConfig::default();
        assert_eq!(cfg.channels(), 5);
        cfg.only_pos = true;
        assert_eq!(cfg.channels(), 4);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: DatasetConfig =
            serde_json::from_str(r#"{ "base_dir": "/data/cvppp", "instanceann_dir": "masks" }"#)
                .unwrap();

        assert_eq!(cfg.base_dir, PathBuf::from("/data/cvppp"));
        assert_eq!(cfg.gt_dir, "masks");
        assert_eq!(cfg.img_dir, "JPEGImages");
        assert_eq!(cfg.label_path("a"), PathBuf::from("/data/cvppp/masks/a.u8"));
    }

    #[test]
    fn missing_paths_fail_validation() {
        let cfg = DatasetConfig {
            txt_path: PathBuf::from("/definitely/not/here.txt"),
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(TrainErr::InvalidConfig(_))));
    }
}
