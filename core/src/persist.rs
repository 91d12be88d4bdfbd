use crate::bm25::SparseIndexState;
use anyhow::Result;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

/// Write the exported index as one self-contained record, overwriting any
/// prior content at `path`. There is no incremental format; every build
/// rewrites the whole record.
pub fn save_state(path: &Path, state: &SparseIndexState) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut f = File::create(path)?;
    let bytes = bincode::serialize(state)?;
    f.write_all(&bytes)?;
    Ok(())
}

pub fn load_state(path: &Path) -> Result<SparseIndexState> {
    let mut f = File::open(path)?;
    let mut buf = Vec::new();
    f.read_to_end(&mut buf)?;
    let state = bincode::deserialize(&buf)?;
    Ok(state)
}
