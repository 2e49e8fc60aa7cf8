use log::info;
use std::fs;
use std::io;
use std::path::{ Path, PathBuf };
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to read session file '{path}': {source}")]
    Read {
        path: PathBuf,
        source: io::Error,
    },
    #[error("failed to write session file '{path}': {source}")]
    Write {
        path: PathBuf,
        source: io::Error,
    },
}

/// Per-installation conversation identity sent with every chat request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    id: String,
}

impl SessionIdentity {
    pub fn generate() -> Self {
        Self {
            id: format!("session_{}", Uuid::new_v4().simple()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.id
    }

    /// Reuses the id stored at `path`, or generates one and stores it there.
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self, SessionError> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(content) if !content.trim().is_empty() => {
                let id = content.trim().to_string();
                info!("Resuming session {} from {}", id, path.display());
                return Ok(Self { id });
            }
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(SessionError::Read { path: path.to_path_buf(), source });
            }
        }

        let identity = Self::generate();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| SessionError::Write {
                path: path.to_path_buf(),
                source,
            })?;
        }
        fs::write(path, &identity.id).map_err(|source| SessionError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Started new session {} (stored in {})", identity.id, path.display());
        Ok(identity)
    }
}
