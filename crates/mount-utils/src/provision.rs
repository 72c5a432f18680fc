use crate::{MountError, Result};
use libvirt_csi_exec::{CommandRunner, ExecError, Invocation};
use std::path::{Path, PathBuf};
use tokio::fs::{self, DirBuilder};
use tracing::{debug, error, info, warn};

pub const DEFAULT_FS_TYPE: &str = "ext4";

const DEFAULT_DEV_ROOT: &str = "/dev";

/// Exit status of mount(8) and umount(8) for a generic mount failure.
const MOUNT_FAILURE: i32 = 32;

/// Exit status of blkid(8) when the requested tag was not found.
const BLKID_NOT_FOUND: i32 = 2;

const MOUNT_POINT_MODE: u32 = 0o700;

/// How far a device had progressed when it was probed. Never stored; every
/// call derives it again from the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DeviceState {
  Unpartitioned,
  Partitioned,
  Formatted,
  Mounted,
}

/// Drives a whole-disk device to a mounted filesystem on its first
/// partition. Each step checks before it acts, so a call interrupted half
/// way through can simply be repeated.
pub struct Provisioner<R> {
  runner: R,
  dev_root: PathBuf,
}

impl<R: CommandRunner> Provisioner<R> {
  pub fn new(runner: R) -> Self {
    Self::with_dev_root(runner, DEFAULT_DEV_ROOT)
  }

  /// Resolves device names under `dev_root` instead of `/dev`.
  pub fn with_dev_root(runner: R, dev_root: impl Into<PathBuf>) -> Self {
    Provisioner {
      runner,
      dev_root: dev_root.into(),
    }
  }

  #[inline]
  pub fn device_path(&self, name: &str) -> PathBuf {
    self.dev_root.join(name)
  }

  #[inline]
  pub fn partition_path(&self, name: &str) -> PathBuf {
    self.dev_root.join(format!("{}1", name))
  }

  async fn partition_exists(&self, name: &str) -> Result<bool> {
    let partition = self.partition_path(name);
    match fs::metadata(&partition).await {
      Ok(_) => Ok(true),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
      Err(e) => Err(MountError::io(
        format!("failed to stat {}", partition.display()),
        e,
      )),
    }
  }

  /// Creates one GPT partition spanning the disk unless the first
  /// partition node already exists.
  pub async fn ensure_partitioned(&self, name: &str, fs_type: &str) -> Result<bool> {
    if self.partition_exists(name).await? {
      debug!(device = %name, "partition already exists");
      return Ok(false);
    }

    let device = self.device_path(name);
    info!(device = %device.display(), %fs_type, "partitioning device");
    self
      .run(
        Invocation::new("parted")
          .arg(path_arg(&device))
          .args(["--script", "-a", "optimal", "mklabel", "gpt", "mkpart", "primary"])
          .arg(fs_type)
          .args(["0%", "100%"]),
      )
      .await?;

    Ok(true)
  }

  /// The filesystem type on `partition`, if there is one.
  pub async fn filesystem_type(&self, partition: &Path) -> Result<Option<String>> {
    let probe = Invocation::new("blkid")
      .args(["-o", "value", "-s", "TYPE"])
      .arg(path_arg(partition));

    match self.runner.run(&probe).await {
      Ok(output) => {
        let fs_type = output.stdout.trim();
        Ok(if fs_type.is_empty() {
          None
        } else {
          Some(fs_type.to_owned())
        })
      }
      Err(e)
        if e.exit_code() == Some(BLKID_NOT_FOUND)
          && e.stdout().map_or(true, |s| s.trim().is_empty()) =>
      {
        Ok(None)
      }
      Err(e) => Err(log_failure(&probe, e)),
    }
  }

  /// Creates a filesystem on `partition` unless it already carries one.
  /// An existing filesystem is left alone even when its type differs.
  pub async fn ensure_formatted(&self, partition: &Path, fs_type: &str) -> Result<bool> {
    if let Some(existing) = self.filesystem_type(partition).await? {
      if existing != fs_type {
        warn!(
          partition = %partition.display(),
          %existing,
          requested = %fs_type,
          "partition already formatted with a different filesystem, not reformatting"
        );
      } else {
        debug!(partition = %partition.display(), %existing, "partition already formatted");
      }
      return Ok(false);
    }

    info!(partition = %partition.display(), %fs_type, "formatting partition");
    self
      .run(
        Invocation::new("mkfs")
          .args(["-t", fs_type])
          .arg(path_arg(partition)),
      )
      .await?;

    Ok(true)
  }

  pub async fn prepare_mount_point(&self, target: &Path) -> Result<()> {
    let mut builder = DirBuilder::new();
    builder.recursive(true);
    builder.mode(MOUNT_POINT_MODE);
    builder.create(target).await.map_err(|e| {
      MountError::io(
        format!("failed to create mount point {}", target.display()),
        e,
      )
    })
  }

  /// Mounts `partition` at `target`. Returns `false` when it was mounted
  /// there already.
  pub async fn mount(&self, partition: &Path, target: &Path, flags: &[String]) -> Result<bool> {
    let mut mount = Invocation::new("mount");
    if !flags.is_empty() {
      mount = mount.arg("-o").arg(flags.join(","));
    }
    let mount = mount.arg(path_arg(partition)).arg(path_arg(target));

    info!(partition = %partition.display(), target = %target.display(), "mounting");
    match self.runner.run(&mount).await {
      Ok(_) => Ok(true),
      Err(e) if e.exit_code() == Some(MOUNT_FAILURE) => {
        let stderr = e.stderr().unwrap_or_default().trim();
        if stderr.contains("already mounted on") {
          info!(target = %target.display(), "already mounted");
          Ok(false)
        } else if stderr.ends_with("does not exist.") {
          Err(MountError::NotFound(stderr.to_owned()))
        } else {
          Err(log_failure(&mount, e))
        }
      }
      Err(e) => Err(log_failure(&mount, e)),
    }
  }

  /// Walks the device named `name` through partition, format and mount.
  /// Returns the state the device was found in.
  pub async fn publish(
    &self,
    name: &str,
    target: &Path,
    fs_type: Option<&str>,
    flags: &[String],
  ) -> Result<DeviceState> {
    let fs_type = fs_type.unwrap_or(DEFAULT_FS_TYPE);
    let partition = self.partition_path(name);

    let mut state = DeviceState::Formatted;
    if self.ensure_partitioned(name, fs_type).await? {
      state = DeviceState::Unpartitioned;
    }
    if self.ensure_formatted(&partition, fs_type).await? && state > DeviceState::Partitioned {
      state = DeviceState::Partitioned;
    }

    self.prepare_mount_point(target).await?;
    if !self.mount(&partition, target, flags).await? {
      state = DeviceState::Mounted;
    }

    Ok(state)
  }

  /// Unmounts `target` and removes the directory. Unmounting something that
  /// is not mounted succeeds.
  pub async fn unpublish(&self, target: &Path) -> Result<()> {
    let umount = Invocation::new("umount").arg(path_arg(target));

    match self.runner.run(&umount).await {
      Ok(_) => info!(target = %target.display(), "unmounted"),
      Err(e) if e.exit_code() == Some(MOUNT_FAILURE) => {
        info!(target = %target.display(), stderr = %e.message(), "not mounted");
      }
      Err(e) => return Err(log_failure(&umount, e)),
    }

    if let Err(e) = fs::remove_dir(target).await {
      debug!(target = %target.display(), error = %e, "leaving mount point in place");
    }

    Ok(())
  }

  async fn run(&self, invocation: Invocation) -> Result<()> {
    self
      .runner
      .run(&invocation)
      .await
      .map(drop)
      .map_err(|e| log_failure(&invocation, e))
  }
}

fn path_arg(path: &Path) -> String {
  path.to_string_lossy().into_owned()
}

fn log_failure(invocation: &Invocation, e: ExecError) -> MountError {
  error!(
    command = %invocation,
    code = ?e.exit_code(),
    stdout = e.stdout().unwrap_or_default(),
    stderr = e.stderr().unwrap_or_default(),
    "command failed"
  );
  e.into()
}

#[cfg(test)]
mod tests {
  use super::*;
  use libvirt_csi_exec::FakeRunner;
  use std::{fs::File, os::unix::fs::PermissionsExt, sync::Arc};
  use tempfile::TempDir;

  struct Fixture {
    fake: Arc<FakeRunner>,
    dev: TempDir,
    mnt: TempDir,
    provisioner: Provisioner<Arc<FakeRunner>>,
  }

  fn fixture() -> Fixture {
    let fake = Arc::new(FakeRunner::new());
    let dev = tempfile::tempdir().unwrap();
    let mnt = tempfile::tempdir().unwrap();
    let provisioner = Provisioner::with_dev_root(fake.clone(), dev.path());
    Fixture {
      fake,
      dev,
      mnt,
      provisioner,
    }
  }

  impl Fixture {
    fn add_partition(&self, name: &str) {
      File::create(self.dev.path().join(format!("{}1", name))).unwrap();
    }

    fn target(&self) -> PathBuf {
      self.mnt.path().join("pods/volume/mount")
    }
  }

  #[tokio::test]
  async fn blank_disk_is_partitioned_formatted_and_mounted() {
    let f = fixture();
    f.fake.push_exit("blkid", 2, "", "");
    let target = f.target();

    let state = f
      .provisioner
      .publish("sdb", &target, None, &[])
      .await
      .unwrap();

    assert_eq!(state, DeviceState::Unpartitioned);
    let dev = f.dev.path().display().to_string();
    let programs = f
      .fake
      .log()
      .iter()
      .map(|i| i.program().to_owned())
      .collect::<Vec<_>>();
    assert_eq!(programs, vec!["parted", "blkid", "mkfs", "mount"]);
    assert_eq!(
      f.fake.runs_of("parted")[0].command_line(),
      format!(
        "parted {}/sdb --script -a optimal mklabel gpt mkpart primary ext4 '0%' '100%'",
        dev
      )
    );
    assert_eq!(
      f.fake.runs_of("mkfs")[0].command_line(),
      format!("mkfs -t ext4 {}/sdb1", dev)
    );
    assert_eq!(
      f.fake.runs_of("mount")[0].command_line(),
      format!("mount {}/sdb1 {}", dev, target.display())
    );

    let mode = std::fs::metadata(&target).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o700);
  }

  #[tokio::test]
  async fn existing_partition_and_filesystem_are_kept() {
    let f = fixture();
    f.add_partition("sdc");
    f.fake.push_ok("blkid", "xfs\n");

    let state = f
      .provisioner
      .publish("sdc", &f.target(), Some("ext4"), &[])
      .await
      .unwrap();

    assert_eq!(state, DeviceState::Formatted);
    assert!(f.fake.runs_of("parted").is_empty());
    assert!(f.fake.runs_of("mkfs").is_empty());
    assert_eq!(f.fake.runs_of("mount").len(), 1);
  }

  #[tokio::test]
  async fn partitioned_disk_is_formatted_with_requested_type() {
    let f = fixture();
    f.add_partition("sdd");
    f.fake.push_ok("blkid", "");

    let state = f
      .provisioner
      .publish("sdd", &f.target(), Some("xfs"), &[])
      .await
      .unwrap();

    assert_eq!(state, DeviceState::Partitioned);
    let mkfs = &f.fake.runs_of("mkfs")[0];
    assert_eq!(mkfs.arguments()[0], "-t");
    assert_eq!(mkfs.arguments()[1], "xfs");
  }

  #[tokio::test]
  async fn mount_flags_are_joined() {
    let f = fixture();
    f.add_partition("sdb");
    f.fake.push_ok("blkid", "ext4");

    f.provisioner
      .publish(
        "sdb",
        &f.target(),
        None,
        &["noatime".to_owned(), "ro".to_owned()],
      )
      .await
      .unwrap();

    let mount = &f.fake.runs_of("mount")[0];
    assert_eq!(mount.arguments()[0], "-o");
    assert_eq!(mount.arguments()[1], "noatime,ro");
  }

  #[tokio::test]
  async fn already_mounted_is_success() {
    let f = fixture();
    f.add_partition("sdb");
    f.fake.push_ok("blkid", "ext4");
    f.fake
      .push_exit("mount", 32, "", "mount: /x already mounted on /y\n");

    let state = f
      .provisioner
      .publish("sdb", &f.target(), None, &[])
      .await
      .unwrap();

    assert_eq!(state, DeviceState::Mounted);
  }

  #[tokio::test]
  async fn vanished_device_is_not_found() {
    let f = fixture();
    f.add_partition("sdb");
    f.fake.push_ok("blkid", "ext4");
    f.fake.push_exit(
      "mount",
      32,
      "",
      "mount: /x: special device /dev/sdb1: does not exist.\n",
    );

    let err = f
      .provisioner
      .publish("sdb", &f.target(), None, &[])
      .await
      .unwrap_err();

    assert!(matches!(err, MountError::NotFound(_)));
  }

  #[tokio::test]
  async fn other_mount_failures_surface() {
    let f = fixture();
    f.add_partition("sdb");
    f.fake.push_ok("blkid", "ext4");
    f.fake
      .push_exit("mount", 32, "", "mount: /x: wrong fs type, bad option\n");

    let err = f
      .provisioner
      .publish("sdb", &f.target(), None, &[])
      .await
      .unwrap_err();

    assert_eq!(err.message(), "mount: /x: wrong fs type, bad option");
  }

  #[tokio::test]
  async fn parted_failure_stops_the_walk() {
    let f = fixture();
    f.fake.push_exit("parted", 1, "", "Error: Could not stat device");

    let err = f
      .provisioner
      .publish("sdz", &f.target(), None, &[])
      .await
      .unwrap_err();

    assert_eq!(err.message(), "Error: Could not stat device");
    assert!(f.fake.runs_of("mount").is_empty());
  }

  #[tokio::test]
  async fn blkid_failure_other_than_missing_tag_surfaces() {
    let f = fixture();
    f.fake.push_exit("blkid", 4, "", "blkid: usage error");

    let err = f
      .provisioner
      .filesystem_type(Path::new("/dev/sdb1"))
      .await
      .unwrap_err();

    assert!(matches!(err, MountError::Exec(_)));
  }

  #[tokio::test]
  async fn unpublish_removes_mount_point() {
    let f = fixture();
    let target = f.target();
    std::fs::create_dir_all(&target).unwrap();

    f.provisioner.unpublish(&target).await.unwrap();

    assert!(!target.exists());
    assert_eq!(
      f.fake.command_lines(),
      vec![format!("umount {}", target.display())]
    );
  }

  #[tokio::test]
  async fn unpublish_of_unmounted_path_succeeds() {
    let f = fixture();
    f.fake
      .push_exit("umount", 32, "", "umount: /x: not mounted.\n");

    f.provisioner.unpublish(&f.target()).await.unwrap();
  }

  #[tokio::test]
  async fn unpublish_surfaces_other_failures() {
    let f = fixture();
    let target = f.target();
    std::fs::create_dir_all(&target).unwrap();
    f.fake.push_exit("umount", 1, "", "umount: /x: target is busy.\n");

    let err = f.provisioner.unpublish(&target).await.unwrap_err();

    assert_eq!(err.message(), "umount: /x: target is busy.");
    assert!(target.exists());
  }
}
