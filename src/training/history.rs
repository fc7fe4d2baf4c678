/// Loss bookkeeping persisted between runs
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Averaged training losses (one per report interval) and test losses
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LossHistory {
    pub train_losses: Vec<f32>,
    pub test_losses: Vec<f32>,
}

impl LossHistory {
    pub fn new(train_losses: Vec<f32>, test_losses: Vec<f32>) -> Self {
        Self {
            train_losses,
            test_losses,
        }
    }

    /// Append the losses of a later run
    pub fn extend(&mut self, train_losses: Vec<f32>, test_losses: Vec<f32>) {
        self.train_losses.extend(train_losses);
        self.test_losses.extend(test_losses);
    }

    pub fn last_train_loss(&self) -> Option<f32> {
        self.train_losses.last().copied()
    }

    pub fn last_test_loss(&self) -> Option<f32> {
        self.test_losses.last().copied()
    }

    /// Overwrite `path` with the history as JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> crate::Result<()> {
        let writer = BufWriter::new(File::create(path.as_ref())?);
        serde_json::to_writer(writer, self)?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let reader = BufReader::new(File::open(path.as_ref())?);
        Ok(serde_json::from_reader(reader)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_extend_keeps_order() {
        let mut history = LossHistory::new(vec![3.0], vec![]);
        history.extend(vec![2.5, 2.0], vec![2.7]);

        assert_eq!(history.train_losses, vec![3.0, 2.5, 2.0]);
        assert_eq!(history.last_train_loss(), Some(2.0));
        assert_eq!(history.last_test_loss(), Some(2.7));
    }

    #[test]
    fn test_json_layout() -> crate::Result<()> {
        let history = LossHistory::new(vec![1.5], vec![2.0]);
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("loss.json");
        history.save(&path)?;

        let raw = std::fs::read_to_string(&path)?;
        assert_eq!(raw, r#"{"train_losses":[1.5],"test_losses":[2.0]}"#);
        assert_eq!(LossHistory::load(&path)?, history);
        Ok(())
    }
}
