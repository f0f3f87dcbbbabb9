//! Command implementations for the tutor CLI.

pub mod init_config;
pub mod train;
pub mod validate;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use std::path::{Path, PathBuf};
use tutor_training::{Dataset, DatasetKind};

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum KindArg {
    QaPairs,
    Conversations,
    Documents,
    CodeExamples,
}

impl From<KindArg> for DatasetKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::QaPairs => Self::QaPairs,
            KindArg::Conversations => Self::Conversations,
            KindArg::Documents => Self::Documents,
            KindArg::CodeExamples => Self::CodeExamples,
        }
    }
}

/// Dataset sources shared by `validate` and `train`.
#[derive(Args, Debug, Clone)]
pub struct DatasetArgs {
    /// JSONL dataset file (repeatable)
    #[arg(short, long = "dataset", required = true)]
    pub datasets: Vec<PathBuf>,

    /// Dataset type applied to every file
    #[arg(long, value_enum, default_value = "qa-pairs")]
    pub kind: KindArg,
}

impl DatasetArgs {
    /// Load every file, naming each dataset after its file stem.
    pub fn load(&self) -> Result<Vec<Dataset>> {
        self.datasets.iter().map(|path| load_dataset(path, self.kind.into())).collect()
    }
}

fn load_dataset(path: &Path, kind: DatasetKind) -> Result<Dataset> {
    let name = path
        .file_stem()
        .map_or_else(|| "dataset".to_string(), |stem| stem.to_string_lossy().into_owned());
    Dataset::from_jsonl(name, kind, path).with_context(|| format!("Failed to load dataset {}", path.display()))
}
