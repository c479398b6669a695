pub mod analyze;
pub mod init;
pub mod score;
pub mod validate;

use anyhow::{Context, Result};

/// Size the global rayon pool. 0 keeps rayon's default.
pub fn init_thread_pool(parallelism: usize) -> Result<()> {
    if parallelism == 0 {
        return Ok(());
    }
    rayon::ThreadPoolBuilder::new()
        .num_threads(parallelism)
        .build_global()
        .context("failed to initialize the thread pool")
}
