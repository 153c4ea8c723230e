//! Vector index backends: an in-process map for tests and small corpora,
//! and LanceDB on disk behind the `lance` feature.

pub mod memory;
#[cfg(feature = "lance")]
pub mod lance;
#[cfg(feature = "lance")]
pub mod schema;

use std::path::Path;

use localrag_core::config::{IndexBackend, IndexSettings};
use localrag_core::traits::VectorIndex;
use localrag_core::Result;

pub use memory::MemoryIndex;
#[cfg(feature = "lance")]
pub use lance::LanceIndex;

/// Open the backend named by `settings`. Relative LanceDB URIs resolve
/// against `base`.
#[cfg_attr(not(feature = "lance"), allow(unused_variables))]
pub fn open_index(settings: &IndexSettings, base: &Path) -> Result<Box<dyn VectorIndex>> {
    match settings.backend {
        IndexBackend::Memory => Ok(Box::new(MemoryIndex::new())),
        #[cfg(feature = "lance")]
        IndexBackend::Lance => {
            let uri = localrag_core::config::resolve_with_base(base, &settings.uri);
            let timeout = std::time::Duration::from_secs(settings.timeout_secs);
            Ok(Box::new(LanceIndex::open(&uri.to_string_lossy(), timeout)?))
        }
        #[cfg(not(feature = "lance"))]
        IndexBackend::Lance => {
            Err(localrag_core::Error::InvalidConfiguration(
                "the lance backend requires building localrag-vector with the `lance` feature".into(),
            ))
        }
    }
}
