use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// On-disk home of the store and the index.
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    /// Resolve the data directory from, in order of priority:
    /// 1. An explicit path (from --data-dir)
    /// 2. The FEEDSEARCH_DATA_DIR environment variable
    /// 3. The XDG data directory (~/.local/share/feedsearch/)
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let root = match explicit {
            Some(path) => path.to_path_buf(),
            None => match std::env::var_os("FEEDSEARCH_DATA_DIR") {
                Some(val) if !val.is_empty() => PathBuf::from(val),
                _ => xdg::BaseDirectories::with_prefix("feedsearch")
                    .get_data_home()
                    .ok_or_else(|| {
                        Error::Config(
                            "could not determine XDG data home directory"
                                .into(),
                        )
                    })?,
            },
        };

        std::fs::create_dir_all(&root)
            .map_err(|_| Error::DataDir(root.clone()))?;

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn store_db(&self) -> PathBuf {
        self.root.join("news.redb")
    }

    pub fn index_dir(&self) -> Result<PathBuf> {
        let path = self.root.join("tantivy");
        std::fs::create_dir_all(&path)
            .map_err(|_| Error::DataDir(path.clone()))?;
        Ok(path)
    }
}
