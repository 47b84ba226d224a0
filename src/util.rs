use std::io;
use std::path::Path;

use tokio::io::AsyncWriteExt;

/// Replace `path` with `data` so readers only ever see the old or the new
/// content. The bytes are flushed to disk in a sibling `.tmp` file, which is
/// then renamed over the target.
pub async fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    let tmp = path.with_extension("tmp");

    let mut file = tokio::fs::File::create(&tmp).await?;
    file.write_all(data).await?;
    file.sync_all().await?;
    drop(file);

    tokio::fs::rename(&tmp, path).await
}
