use crate::{MountError, Result};
use libvirt_csi_exec::{CommandRunner, Invocation};
use std::path::Path;
use tracing::error;

const DF_COLUMNS: &str = "--output=iavail,itotal,iused,avail,size,used";
const FIELDS: usize = 6;

/// Usage of the filesystem holding a path, in bytes and inodes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiskUsage {
  pub inodes_available: u64,
  pub inodes_total: u64,
  pub inodes_used: u64,
  pub bytes_available: u64,
  pub bytes_total: u64,
  pub bytes_used: u64,
}

/// Parses the output of `df -B 1` with the inode columns before the byte
/// columns, each as available, total, used.
/// The first line is the header.
pub fn parse_disk_usage(stdout: &str) -> Result<DiskUsage> {
  let parse_error = |detail: String| MountError::Parse {
    what: "df output",
    detail,
  };

  let line = stdout
    .lines()
    .nth(1)
    .ok_or_else(|| parse_error(format!("expected a value line in {:?}", stdout)))?;

  let values = line
    .split_whitespace()
    .map(|field| {
      field
        .parse::<u64>()
        .map_err(|e| parse_error(format!("{:?} is not a number: {}", field, e)))
    })
    .collect::<Result<Vec<_>>>()?;

  match values[..] {
    [inodes_available, inodes_total, inodes_used, bytes_available, bytes_total, bytes_used] => {
      Ok(DiskUsage {
        inodes_available,
        inodes_total,
        inodes_used,
        bytes_available,
        bytes_total,
        bytes_used,
      })
    }
    _ => Err(parse_error(format!(
      "expected {} fields, got {} in {:?}",
      FIELDS,
      values.len(),
      line
    ))),
  }
}

/// Runs `df` against `path`. A path that does not exist is
/// [`MountError::NotFound`].
pub async fn probe_disk_usage<R: CommandRunner + ?Sized>(runner: &R, path: &Path) -> Result<DiskUsage> {
  let df = Invocation::new("df")
    .args(["-B", "1", DF_COLUMNS])
    .arg(path.to_string_lossy().into_owned());

  match runner.run(&df).await {
    Ok(output) => parse_disk_usage(&output.stdout),
    Err(e) => {
      let stderr = e.stderr().unwrap_or_default().trim();
      if stderr.ends_with("No such file or directory") {
        return Err(MountError::NotFound(stderr.to_owned()));
      }

      error!(
        command = %df,
        code = ?e.exit_code(),
        stdout = e.stdout().unwrap_or_default(),
        stderr = %stderr,
        "disk usage probe failed"
      );
      Err(e.into())
    }
  }
}
