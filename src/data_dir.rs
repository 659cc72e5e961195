//! Where docdex keeps its state.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

const ENV_VAR: &str = "DOCDEX_DATA_DIR";
const STORE_FILE: &str = "store.redb";
const PROFILES_FILE: &str = "profiles.json";

#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    /// Resolve and create the data directory.
    ///
    /// `--data-dir` wins over `DOCDEX_DATA_DIR`, which wins over the XDG
    /// data home (`~/.local/share/docdex/`). An empty variable is ignored.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let from_env = std::env::var_os(ENV_VAR)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        let root = match pick_root(explicit, from_env) {
            Some(root) => root,
            None => xdg_data_home()?,
        };
        Self::at(root)
    }

    /// Use `root` as the data directory, creating it when missing.
    pub fn at(root: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&root)
            .map_err(|_| Error::DataDir(root.clone()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn store_db(&self) -> PathBuf {
        self.root.join(STORE_FILE)
    }

    /// Page profile configuration used when `--profiles` is not given,
    /// if one has been placed in the data directory.
    pub fn profiles_file(&self) -> Option<PathBuf> {
        let path = self.root.join(PROFILES_FILE);
        path.is_file().then_some(path)
    }
}

fn pick_root(
    explicit: Option<&Path>,
    from_env: Option<PathBuf>,
) -> Option<PathBuf> {
    explicit.map(Path::to_path_buf).or(from_env)
}

fn xdg_data_home() -> Result<PathBuf> {
    xdg::BaseDirectories::with_prefix("docdex")
        .get_data_home()
        .ok_or_else(|| {
            Error::Config("could not determine XDG data home directory".into())
        })
}
