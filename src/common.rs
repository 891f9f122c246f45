//! Shared plumbing for talking to the host's cgroup v1 filesystem: control
//! file writes, mount point discovery and the process-wide state guarding
//! first use.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use once_cell::sync::{Lazy, OnceCell};
use procfs::process::{MountInfo, Process};

use crate::controller::{ControllerKind, CONTROLLERS};
use crate::error::{Error, Result};

/// Control file holding the pids attached to a v1 cgroup.
pub const CGROUP_TASKS: &str = "tasks";
/// Conventional mount root for the v1 hierarchies.
pub const DEFAULT_CGROUP_ROOT: &str = "/sys/fs/cgroup";

static MOUNT_POINTS: OnceCell<HashMap<ControllerKind, PathBuf>> = OnceCell::new();
static CLAIMED_NAMES: Lazy<Mutex<HashSet<String>>> = Lazy::new(|| Mutex::new(HashSet::new()));

/// Process-wide bootstrap: discovers the mount point of every known v1
/// hierarchy and caches the result. Safe to call repeatedly; concurrent
/// first use is serialized by the cell.
pub fn init() -> Result<&'static HashMap<ControllerKind, PathBuf>> {
    MOUNT_POINTS.get_or_try_init(|| {
        let process = Process::myself()
            .map_err(|err| Error::resource("failed to read /proc for the current process", err))?;
        let mounts = process
            .mountinfo()
            .map_err(|err| Error::resource("failed to read mount info for the current process", err))?;

        let mut mount_points = HashMap::new();
        for kind in CONTROLLERS {
            match mounts.iter().find(|m| mounts_controller(m, *kind)) {
                Some(mount) => {
                    log::debug!("found {} hierarchy at {:?}", kind, mount.mount_point);
                    mount_points.insert(*kind, mount.mount_point.clone());
                }
                None => log::warn!("cgroup {} hierarchy is not mounted on this system", kind),
            }
        }

        Ok(mount_points)
    })
}

fn mounts_controller(mount: &MountInfo, kind: ControllerKind) -> bool {
    if mount.fs_type != "cgroup" {
        return false;
    }

    // cpu and cpuacct are commonly co-mounted in a combined directory.
    if let ControllerKind::Cpu = kind {
        return mount.mount_point.ends_with("cpu,cpuacct") || mount.mount_point.ends_with("cpu");
    }

    mount.mount_point.ends_with(kind.as_str())
}

/// The mount point of the given hierarchy, as discovered by [`init`].
pub fn subsystem_mount_point(kind: ControllerKind) -> Result<PathBuf> {
    init()?.get(&kind).cloned().ok_or_else(|| {
        Error::resource_msg(format!(
            "no mount point found for the {} hierarchy (expected under {})",
            kind, DEFAULT_CGROUP_ROOT
        ))
    })
}

/// Claims `name` for this process. Two live handles may not manage the same
/// group; the claim is released when the owning handle is deleted or dropped.
pub(crate) fn claim_name(name: &str) -> Result<()> {
    let mut claimed = CLAIMED_NAMES.lock().unwrap_or_else(|err| err.into_inner());
    if !claimed.insert(name.to_owned()) {
        return Err(Error::InvalidArgument(format!(
            "cgroup {:?} is already managed by this process",
            name
        )));
    }

    Ok(())
}

pub(crate) fn release_name(name: &str) {
    let mut claimed = CLAIMED_NAMES.lock().unwrap_or_else(|err| err.into_inner());
    claimed.remove(name);
}

#[inline]
pub fn write_cgroup_file_str<P: AsRef<Path>>(path: P, data: &str) -> Result<()> {
    let path = path.as_ref();
    let mut file = fs::OpenOptions::new()
        .create(false)
        .write(true)
        .truncate(false)
        .open(path)
        .map_err(|err| Error::resource(format!("failed to open {:?}", path), err))?;
    file.write_all(data.as_bytes())
        .map_err(|err| Error::resource(format!("failed to write to {:?}", path), err))?;

    Ok(())
}

#[inline]
pub fn write_cgroup_file<P: AsRef<Path>, T: ToString>(path: P, data: T) -> Result<()> {
    write_cgroup_file_str(path, &data.to_string())
}

/// Removes the cgroup directory at `path` and any child groups beneath it,
/// children first. Control files inside a cgroup directory are owned by the
/// kernel and disappear with the rmdir; a nonexistent path counts as already
/// removed. An occupied group (live tasks still attached) surfaces as an
/// error and is never retried here.
pub(crate) fn remove_cgroup_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        return Ok(());
    }

    let entries = fs::read_dir(path)
        .map_err(|err| Error::resource(format!("failed to read cgroup {:?}", path), err))?;
    for entry in entries {
        let entry =
            entry.map_err(|err| Error::resource(format!("failed to read cgroup {:?}", path), err))?;
        let child = entry.path();
        if child.is_dir() {
            remove_cgroup_dir(&child)?;
        }
    }

    log::debug!("remove cgroup {:?}", path);
    match fs::remove_dir(path) {
        Ok(()) => Ok(()),
        Err(ref err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(Error::resource(
            format!("failed to remove cgroup {:?}", path),
            err,
        )),
    }
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;
    use crate::test::{create_temp_dir, set_fixture};

    #[test]
    fn test_write_cgroup_file() {
        let tmp = create_temp_dir("test_write_cgroup_file").expect("create temp directory");
        let shares = set_fixture(&tmp, "cpu.shares", "").expect("set fixture");

        write_cgroup_file(&shares, 512).expect("write shares");
        assert_eq!(fs::read_to_string(&shares).expect("read shares"), "512");
    }

    #[test]
    fn test_write_cgroup_file_requires_existing_file() {
        let tmp = create_temp_dir("test_write_cgroup_file_missing").expect("create temp directory");

        let err = write_cgroup_file_str(tmp.join("cpu.shares"), "512").unwrap_err();
        assert!(matches!(err, Error::Resource { .. }));
        // An absent control file is an open failure, not a write failure.
        assert!(format!("{}", err).contains("failed to open"));
    }

    #[test]
    fn test_remove_cgroup_dir_ignores_missing_path() {
        let tmp = create_temp_dir("test_remove_missing").expect("create temp directory");
        remove_cgroup_dir(&tmp.join("never-created")).expect("missing path is not an error");
    }

    #[test]
    fn test_remove_cgroup_dir_removes_children_first() {
        let tmp = create_temp_dir("test_remove_children").expect("create temp directory");
        let group = tmp.join("parent");
        fs::create_dir_all(group.join("child-a/grandchild")).expect("create children");
        fs::create_dir_all(group.join("child-b")).expect("create children");

        remove_cgroup_dir(&group).expect("remove hierarchy");
        assert!(!group.exists());
    }

    #[test]
    fn test_remove_cgroup_dir_surfaces_occupied_group() {
        let tmp = create_temp_dir("test_remove_occupied").expect("create temp directory");
        let group = tmp.join("busy");
        fs::create_dir_all(&group).expect("create group");
        set_fixture(&group, "tasks", "1234").expect("set fixture");

        let err = remove_cgroup_dir(&group).unwrap_err();
        assert!(matches!(err, Error::Resource { .. }));
        assert!(group.exists());
    }

    #[test]
    #[serial]
    fn test_claim_name_rejects_duplicates() {
        claim_name("claim-test").expect("first claim");
        let err = claim_name("claim-test").unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));

        release_name("claim-test");
        claim_name("claim-test").expect("claim again after release");
        release_name("claim-test");
    }

    #[test]
    fn test_init_is_repeatable() {
        let first = init().expect("bootstrap");
        let second = init().expect("bootstrap again");
        assert!(std::ptr::eq(first, second));
    }
}
