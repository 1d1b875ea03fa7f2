//! Schema registry: compiles user-supplied `.proto` files into a binary
//! descriptor set and resolves fully-qualified message type names to
//! runtime descriptors.

use std::path::{Path, PathBuf};
use std::process::Command;

use prost_reflect::{DescriptorPool, MessageDescriptor};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::errors::SchemaError;

/// Immutable lookup from fully-qualified protobuf type name (dot-separated,
/// case-sensitive, e.g. `test.Main`) to its message descriptor.
///
/// Built once at startup; loading is atomic — any compilation or read error
/// aborts without leaving a partial set. Lookups are pure and safe to share
/// across threads; cloning is cheap (the descriptor pool is
/// reference-counted).
#[derive(Debug, Clone)]
pub struct SchemaSet {
    pool: DescriptorPool,
}

impl SchemaSet {
    /// Compile `proto_files` with the external `protoc` compiler and load
    /// the resulting descriptor set, import closure included.
    ///
    /// The directory of the first file is the single include path for
    /// resolving cross-file imports. The compiler writes to a temporary
    /// artifact that is removed unconditionally, compile failure included.
    pub fn load(proto_files: &[PathBuf]) -> Result<Self, SchemaError> {
        let mut abs_paths = Vec::with_capacity(proto_files.len());
        for path in proto_files {
            let abs = path
                .canonicalize()
                .map_err(|_| SchemaError::FileNotFound(path.clone()))?;
            abs_paths.push(abs);
        }
        let include_dir = abs_paths
            .first()
            .and_then(|path| path.parent())
            .ok_or_else(|| SchemaError::Compile("no proto files to compile".to_string()))?
            .to_path_buf();

        let artifact = NamedTempFile::new()
            .map_err(|e| SchemaError::Load(format!("cannot create descriptor artifact: {e}")))?;
        compile_descriptor_set(&abs_paths, &include_dir, artifact.path())?;
        let bytes = std::fs::read(artifact.path())
            .map_err(|e| SchemaError::Load(format!("cannot read descriptor artifact: {e}")))?;
        Self::from_descriptor_bytes(&bytes)
    }

    /// Decode an already-compiled binary `FileDescriptorSet`.
    pub fn from_descriptor_bytes(bytes: &[u8]) -> Result<Self, SchemaError> {
        let pool = DescriptorPool::decode(bytes).map_err(|e| SchemaError::Load(e.to_string()))?;
        Ok(SchemaSet { pool })
    }

    /// Look up a message descriptor by fully-qualified name.
    pub fn find(&self, type_name: &str) -> Option<MessageDescriptor> {
        self.pool.get_message_by_name(type_name)
    }
}

/// Invoke `protoc` as a child process. The include path and working
/// directory are passed to the child explicitly; the parent process state is
/// never touched.
fn compile_descriptor_set(
    proto_files: &[PathBuf],
    include_dir: &Path,
    out: &Path,
) -> Result<(), SchemaError> {
    let mut command = Command::new("protoc");
    command
        .arg("--include_imports")
        .arg(format!("--descriptor_set_out={}", out.display()))
        .arg("-I")
        .arg(include_dir)
        .args(proto_files)
        .current_dir(include_dir);
    debug!("invoking schema compiler: {:?}", command);

    let output = command
        .output()
        .map_err(|e| SchemaError::Compile(format!("cannot run protoc: {e}")))?;
    if !output.status.success() {
        return Err(SchemaError::Compile(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ));
    }
    Ok(())
}
