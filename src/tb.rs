use std::{fmt, path::Path};

use tensorboard_rs::summary_writer::SummaryWriter;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timestamp(String);

impl Default for Timestamp {
    fn default() -> Self {
        Self(chrono::Local::now().format("%Y%m%d%H%M%S").to_string())
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Scalar writer that stays a no-op until [`TbWriter::init`] is called.
#[derive(Default)]
pub struct TbWriter {
    inner: Option<SummaryWriter>,
}

impl TbWriter {
    pub fn init(
        &mut self,
        root: impl AsRef<Path>,
        suffix: Option<&str>,
        timestamp: &Timestamp,
    ) -> std::io::Result<()> {
        let mut dir = root.as_ref().join(timestamp.to_string());
        if let Some(suffix) = suffix {
            dir = dir.join(suffix);
        }
        std::fs::create_dir_all(&dir)?;
        self.inner = Some(SummaryWriter::new(&dir));
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.inner.is_some()
    }

    pub fn add_scalar(&mut self, tag: &str, scalar: f32, step: usize) {
        if let Some(writer) = self.inner.as_mut() {
            writer.add_scalar(tag, scalar, step);
        }
    }

    pub fn flush(&mut self) {
        if let Some(writer) = self.inner.as_mut() {
            writer.flush();
        }
    }
}
