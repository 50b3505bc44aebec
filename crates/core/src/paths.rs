use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Paths {
    pub base: PathBuf,
}

impl Paths {
    pub fn new() -> Self {
        let base = dirs::home_dir()
            .map(|h| h.join(".conductor"))
            .unwrap_or_else(|| PathBuf::from(".conductor"));
        Self { base }
    }

    pub fn with_base(base: PathBuf) -> Self {
        Self { base }
    }

    pub fn config_file(&self) -> PathBuf {
        self.base.join("config.json")
    }

    /// Static capability catalog; the built-in catalog is used when this
    /// file does not exist.
    pub fn catalog_file(&self) -> PathBuf {
        self.base.join("capabilities.yaml")
    }

    pub fn data_dir(&self) -> PathBuf {
        self.base.join("data")
    }

    pub fn trace_db(&self) -> PathBuf {
        self.data_dir().join("trace.db")
    }

    pub fn knowledge_db(&self) -> PathBuf {
        self.data_dir().join("knowledge.db")
    }

    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.base)?;
        std::fs::create_dir_all(self.data_dir())?;
        Ok(())
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}
