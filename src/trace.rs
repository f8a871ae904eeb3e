use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::Mutex,
};

/// Receives the JSON of every emitted sub-kernel and of the merged kernel it came from.
pub trait TraceSink {
    /// `index` is 1-based.
    fn kernel(&self, op_name: &str, index: usize, json: &str) -> io::Result<()>;

    fn merged(&self, op_name: &str, json: &str) -> io::Result<()>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoTrace;

impl TraceSink for NoTrace {
    fn kernel(&self, _: &str, _: usize, _: &str) -> io::Result<()> {
        Ok(())
    }

    fn merged(&self, _: &str, _: &str) -> io::Result<()> {
        Ok(())
    }
}

/// Writes `<op>_stitch_<n>.json` and `<op>_stitch.json` into a directory.
#[derive(Clone, Debug)]
pub struct DirTrace {
    dir: PathBuf,
}

impl Default for DirTrace {
    fn default() -> Self {
        Self::new("stitch_info")
    }
}

impl DirTrace {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self { dir: dir.as_ref().to_path_buf() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn write(&self, file: String, json: &str) -> io::Result<()> {
        match fs::create_dir(&self.dir) {
            Err(err) if err.kind() != io::ErrorKind::AlreadyExists => return Err(err),
            _ => {}
        }

        let path = self.dir.join(file);
        log::debug!("dumping {}", path.display());
        fs::write(path, json)
    }
}

impl TraceSink for DirTrace {
    fn kernel(&self, op_name: &str, index: usize, json: &str) -> io::Result<()> {
        self.write(format!("{op_name}_stitch_{index}.json"), json)
    }

    fn merged(&self, op_name: &str, json: &str) -> io::Result<()> {
        self.write(format!("{op_name}_stitch.json"), json)
    }
}

/// Keeps every record in memory, named as [`DirTrace`] would name the files.
#[derive(Debug, Default)]
pub struct MemoryTrace {
    records: Mutex<Vec<(String, String)>>,
}

impl MemoryTrace {
    pub fn records(&self) -> Vec<(String, String)> {
        match self.records.lock() {
            Ok(records) => records.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.records().into_iter().map(|(name, _)| name).collect()
    }

    fn push(&self, name: String, json: &str) -> io::Result<()> {
        let mut records = self.records.lock().map_err(|_| io::Error::other("trace records poisoned"))?;
        records.push((name, json.to_string()));
        Ok(())
    }
}

impl TraceSink for MemoryTrace {
    fn kernel(&self, op_name: &str, index: usize, json: &str) -> io::Result<()> {
        self.push(format!("{op_name}_stitch_{index}.json"), json)
    }

    fn merged(&self, op_name: &str, json: &str) -> io::Result<()> {
        self.push(format!("{op_name}_stitch.json"), json)
    }
}
