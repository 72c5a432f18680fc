use crate::{MountError, Result};
use libvirt_csi_exec::{CommandRunner, Invocation};
use serde::Deserialize;
use tracing::{debug, error, info};

const VOLUME_ID_PREFIX: &str = "pv-";

/// SCSI disks (8) and virtio block devices (254).
const DEVICE_CLASSES: &str = "8,254";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BlockDevice {
  pub name: String,
  /// Serial as reported by the guest. Hypervisors may truncate it.
  #[serde(default)]
  pub serial: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BlockDeviceList {
  #[serde(default)]
  blockdevices: Vec<BlockDevice>,
}

/// The disk serial the hypervisor assigns to a volume: the id without its
/// `pv-` prefix and without hyphens. Case is preserved.
pub fn expected_serial(volume_id: &str) -> Option<String> {
  let uuid = volume_id.strip_prefix(VOLUME_ID_PREFIX)?;
  let serial = uuid.replace('-', "");
  if serial.is_empty() {
    None
  } else {
    Some(serial)
  }
}

/// Parses `lsblk -J` output.
pub fn parse_block_devices(stdout: &str) -> Result<Vec<BlockDevice>> {
  serde_json::from_str::<BlockDeviceList>(stdout)
    .map(|list| list.blockdevices)
    .map_err(|e| MountError::Parse {
      what: "lsblk output",
      detail: e.to_string(),
    })
}

/// First device whose reported serial is a prefix of `expected`.
/// Devices without a serial never match.
pub fn find_device<'a>(devices: &'a [BlockDevice], expected: &str) -> Option<&'a BlockDevice> {
  devices.iter().find(|device| {
    let reported = device.serial.as_deref().map(str::trim).unwrap_or_default();
    debug!(device = %device.name, %reported, %expected, "checking device serial");
    !reported.is_empty() && expected.starts_with(reported)
  })
}

/// Maps volume ids to local block devices using `lsblk`.
pub struct BlockDeviceLocator<R> {
  runner: R,
}

impl<R: CommandRunner> BlockDeviceLocator<R> {
  pub fn new(runner: R) -> Self {
    BlockDeviceLocator { runner }
  }

  pub async fn list(&self) -> Result<Vec<BlockDevice>> {
    let lsblk = Invocation::new("lsblk")
      .args(["--nodeps", "-o", "serial,name", "-J", "--include"])
      .arg(DEVICE_CLASSES);

    let output = self.runner.run(&lsblk).await.map_err(|e| {
      error!(
        command = %lsblk,
        code = ?e.exit_code(),
        stdout = e.stdout().unwrap_or_default(),
        stderr = e.stderr().unwrap_or_default(),
        "listing block devices failed"
      );
      MountError::from(e)
    })?;

    parse_block_devices(&output.stdout)
  }

  /// Finds the device backing `volume_id`.
  pub async fn locate(&self, volume_id: &str) -> Result<BlockDevice> {
    let serial =
      expected_serial(volume_id).ok_or_else(|| MountError::InvalidVolumeId(volume_id.to_owned()))?;
    let devices = self.list().await?;

    match find_device(&devices, &serial) {
      Some(device) => {
        info!(%volume_id, device = %device.name, "found block device for volume");
        Ok(device.clone())
      }
      None => {
        error!(%volume_id, %serial, ?devices, "couldn't find device for volume");
        Err(MountError::DeviceNotFound {
          volume_id: volume_id.to_owned(),
          serial,
        })
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use libvirt_csi_exec::FakeRunner;
  use std::sync::Arc;
  use test_case::test_case;

  fn device(name: &str, serial: Option<&str>) -> BlockDevice {
    BlockDevice {
      name: name.into(),
      serial: serial.map(Into::into),
    }
  }

  #[test_case("pv-1b4e28ba-2fa1-11d2-883f-0016d3cca427" => Some("1b4e28ba2fa111d2883f0016d3cca427".to_owned()); "lower case uuid")]
  #[test_case("pv-1B4E28BA-2FA1-11D2-883F-0016D3CCA427" => Some("1B4E28BA2FA111D2883F0016D3CCA427".to_owned()); "upper case preserved")]
  #[test_case("pv-" => None; "no uuid")]
  #[test_case("1b4e28ba-2fa1" => None; "missing prefix")]
  fn serial_from_volume_id(volume_id: &str) -> Option<String> {
    expected_serial(volume_id)
  }

  #[test_case("1234567" => Some("sdb".to_owned()); "truncated serial matches")]
  #[test_case("1234567890abcdef" => Some("sdb".to_owned()); "full serial matches")]
  #[test_case("abcdef" => None; "suffix does not match")]
  #[test_case("1234567890abcdef00" => None; "longer serial does not match")]
  fn match_by_prefix(reported: &str) -> Option<String> {
    let devices = vec![device("sdb", Some(reported))];
    find_device(&devices, "1234567890abcdef").map(|d| d.name.clone())
  }

  #[test]
  fn empty_and_missing_serials_never_match() {
    let devices = vec![
      device("sda", None),
      device("sdb", Some("")),
      device("sdc", Some("12345")),
    ];

    assert_eq!(find_device(&devices, "1234567890").unwrap().name, "sdc");
  }

  #[test]
  fn first_match_wins() {
    let devices = vec![device("sdb", Some("1234")), device("sdc", Some("123456"))];
    assert_eq!(find_device(&devices, "1234567890").unwrap().name, "sdb");
  }

  #[test]
  fn parses_lsblk_json() {
    let devices = parse_block_devices(
      r#"{
        "blockdevices": [
          {"serial": null, "name": "vda"},
          {"serial": "0QEMU_QEMU_HARDDISK_drive-scsi0", "name": "sda"},
          {"name": "sdb"}
        ]
      }"#,
    )
    .unwrap();

    assert_eq!(
      devices,
      vec![
        device("vda", None),
        device("sda", Some("0QEMU_QEMU_HARDDISK_drive-scsi0")),
        device("sdb", None),
      ]
    );
  }

  #[test]
  fn rejects_garbage() {
    assert!(matches!(
      parse_block_devices("lsblk: unknown column"),
      Err(MountError::Parse { .. })
    ));
  }

  #[tokio::test]
  async fn locate_queries_lsblk() {
    let fake = Arc::new(FakeRunner::new());
    fake.push_ok(
      "lsblk",
      r#"{"blockdevices": [{"serial": "aaaa", "name": "sda"}, {"serial": "1b4e28ba2fa1", "name": "sdb"}]}"#,
    );

    let locator = BlockDeviceLocator::new(fake.clone());
    let found = locator
      .locate("pv-1b4e28ba-2fa1-11d2-883f-0016d3cca427")
      .await
      .unwrap();

    assert_eq!(found.name, "sdb");
    assert_eq!(
      fake.command_lines(),
      vec!["lsblk --nodeps -o serial,name -J --include 8,254"]
    );
  }

  #[tokio::test]
  async fn locate_reports_missing_device() {
    let fake = Arc::new(FakeRunner::new());
    fake.push_ok("lsblk", r#"{"blockdevices": [{"serial": "ffff", "name": "sda"}]}"#);

    let err = BlockDeviceLocator::new(fake.clone())
      .locate("pv-1234-5678")
      .await
      .unwrap_err();

    match err {
      MountError::DeviceNotFound { serial, .. } => assert_eq!(serial, "12345678"),
      other => panic!("unexpected error {:?}", other),
    }
  }
}
