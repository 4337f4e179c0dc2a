use crate::stats::{StatsBackend, StatsError, TrainStats};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Stats persisted as a pretty-printed JSON object keyed by train description.
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

impl StatsBackend for JsonFileBackend {
    fn load(&self) -> Result<TrainStats, StatsError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(TrainStats::new()),
            Err(err) => return Err(err.into()),
        };
        Ok(serde_json::from_str(&contents)?)
    }

    fn save(&self, stats: &TrainStats) -> Result<(), StatsError> {
        let contents = serde_json::to_string_pretty(stats)?;
        let temp = self.temp_path();
        std::fs::write(&temp, contents)?;
        std::fs::rename(&temp, &self.path)?;
        Ok(())
    }
}
