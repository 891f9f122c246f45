//! The cgroup handle and its lifecycle.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::PathBuf;

use nix::unistd::{getpid, Pid};

use crate::common::{self, CGROUP_TASKS};
use crate::controller::{ControllerKind, ParameterSpec};
use crate::error::{Error, Result};

/// Lifecycle of a [`CgroupHandle`]. Strictly linear; `Deleted` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Constructed; settings are recorded but nothing exists on the host yet.
    Configured,
    /// The group directories exist and recorded settings have been applied.
    Created,
    /// The group has been removed from the host; the handle is retired.
    Deleted,
}

/// One named cgroup plus the controllers enabled on it.
///
/// A handle owns its group: the group name is claimed for this process at
/// construction and freed again when the handle is deleted or dropped, so
/// two live handles never manage the same group. A handle is meant to be
/// driven by one logical caller at a time; concurrent `create`, `set` or
/// `delete` calls on the same handle from multiple threads are undefined and
/// must be serialized by the caller.
#[derive(Debug)]
pub struct CgroupHandle {
    name: String,
    controllers: Vec<ControllerKind>,
    settings: BTreeMap<(ControllerKind, &'static str), String>,
    subsystems: HashMap<ControllerKind, PathBuf>,
    state: State,
}

impl CgroupHandle {
    /// Creates a handle for `name` with a single controller enabled.
    ///
    /// Runs the process-wide cgroup bootstrap on first use (repeated calls
    /// are no-ops) and claims the group name for this process.
    pub fn new(name: &str, controller: ControllerKind) -> Result<Self> {
        if name.is_empty() {
            return Err(Error::InvalidArgument(
                "cgroup name must not be empty".to_owned(),
            ));
        }
        if name.contains('/') || name == "." || name == ".." {
            return Err(Error::InvalidArgument(format!(
                "cgroup name {:?} is not a valid path component",
                name
            )));
        }

        common::init()?;
        common::claim_name(name)?;

        let mut handle = CgroupHandle {
            name: name.to_owned(),
            controllers: Vec::new(),
            settings: BTreeMap::new(),
            subsystems: HashMap::new(),
            state: State::Configured,
        };
        handle.enable_controller(controller);

        Ok(handle)
    }

    pub fn cpu(name: &str) -> Result<Self> {
        Self::new(name, ControllerKind::Cpu)
    }

    pub fn blkio(name: &str) -> Result<Self> {
        Self::new(name, ControllerKind::Blkio)
    }

    pub fn memory(name: &str) -> Result<Self> {
        Self::new(name, ControllerKind::Memory)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn controllers(&self) -> &[ControllerKind] {
        &self.controllers
    }

    /// Enables an additional controller hierarchy for this group. On a
    /// created group the new hierarchy directory is materialized right away.
    pub fn add_controller(&mut self, controller: ControllerKind) -> Result<()> {
        if self.state == State::Deleted {
            return Err(self.deleted());
        }

        self.enable_controller(controller);
        if self.state == State::Created {
            self.materialize(controller)?;
        }

        Ok(())
    }

    fn enable_controller(&mut self, controller: ControllerKind) {
        if self.controllers.contains(&controller) {
            return;
        }

        match common::subsystem_mount_point(controller) {
            Ok(mount_point) => {
                self.subsystems.insert(controller, mount_point.join(&self.name));
            }
            // Surfaces at create() if the hierarchy is actually needed.
            Err(err) => log::warn!("{}", err),
        }
        self.controllers.push(controller);
    }

    /// Records a parameter for this group and, once the group has been
    /// created, writes it through to the live control file immediately.
    /// Re-applying a key overwrites the recorded value.
    ///
    /// The key must belong to one of the handle's controllers and the value
    /// must pass that parameter's format check; neither failure touches the
    /// recorded settings.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        if self.state == State::Deleted {
            return Err(self.deleted());
        }

        let (controller, spec) = self.lookup_parameter(key)?;
        spec.validate(value)?;

        log::debug!("set {} {}={:?} on cgroup {:?}", controller, key, value, self.name);
        self.settings
            .insert((controller, spec.file), value.to_owned());

        if self.state == State::Created {
            let path = self.subsystem_path(controller)?.join(spec.file);
            common::write_cgroup_file_str(path, value)?;
        }

        Ok(())
    }

    /// CPU bandwidth limit in microseconds per scheduling period; `-1` lifts
    /// the limit.
    pub fn set_cfs_quota_us(&mut self, quota: i64) -> Result<()> {
        self.set("cfs_quota_us", &quota.to_string())
    }

    /// Relative CPU weight of the group.
    pub fn set_shares(&mut self, shares: u64) -> Result<()> {
        self.set("shares", &shares.to_string())
    }

    /// Byte-per-second read limit for the block device given as
    /// `MAJOR:MINOR`.
    pub fn set_throttle_read_bps(&mut self, device: &str, rate: &str) -> Result<()> {
        self.set("throttle.read_bps_device", &format!("{} {}", device, rate))
    }

    /// Byte-per-second write limit for the block device given as
    /// `MAJOR:MINOR`.
    pub fn set_throttle_write_bps(&mut self, device: &str, rate: &str) -> Result<()> {
        self.set("throttle.write_bps_device", &format!("{} {}", device, rate))
    }

    /// Hard memory limit in bytes; `-1` lifts the limit.
    pub fn set_limit_in_bytes(&mut self, limit: i64) -> Result<()> {
        self.set("limit_in_bytes", &limit.to_string())
    }

    /// Soft memory limit in bytes; `-1` lifts the limit.
    pub fn set_soft_limit_in_bytes(&mut self, limit: i64) -> Result<()> {
        self.set("soft_limit_in_bytes", &limit.to_string())
    }

    /// Materializes the group on the host: creates the group directory under
    /// every enabled hierarchy (an existing directory is fine) and applies
    /// all recorded settings. Calling this again on a created handle
    /// succeeds and re-applies the settings.
    pub fn create(&mut self) -> Result<()> {
        if self.state == State::Deleted {
            return Err(self.deleted());
        }

        for controller in &self.controllers {
            self.materialize(*controller)?;
        }

        self.state = State::Created;
        Ok(())
    }

    fn materialize(&self, controller: ControllerKind) -> Result<()> {
        let path = self.subsystem_path(controller)?;
        log::debug!("create cgroup {:?}", path);
        fs::create_dir_all(path)
            .map_err(|err| Error::resource(format!("failed to create cgroup {:?}", path), err))?;

        for ((kind, file), value) in &self.settings {
            if *kind == controller {
                common::write_cgroup_file_str(path.join(file), value)?;
            }
        }

        Ok(())
    }

    /// Writes `pid` (defaulting to the calling process) into the `tasks`
    /// file of every enabled hierarchy. The group must have been created.
    pub fn attach(&self, pid: Option<Pid>) -> Result<()> {
        if self.state != State::Created {
            return Err(self.not_created());
        }

        let pid = pid.unwrap_or_else(getpid);
        for controller in &self.controllers {
            let tasks = self.subsystem_path(*controller)?.join(CGROUP_TASKS);
            log::debug!("attach pid {} to {:?}", pid, tasks);
            common::write_cgroup_file(&tasks, pid)?;
        }

        Ok(())
    }

    /// Removes the group from every enabled hierarchy, child groups first,
    /// and retires the handle. An occupied group (a task still running in
    /// it) is surfaced as an error and never retried, so a live process is
    /// not masked; the handle stays usable for a later attempt.
    pub fn delete(&mut self) -> Result<()> {
        if self.state != State::Created {
            return Err(self.not_created());
        }

        for controller in &self.controllers {
            let path = self.subsystem_path(*controller)?;
            common::remove_cgroup_dir(path)?;
        }

        self.state = State::Deleted;
        common::release_name(&self.name);
        Ok(())
    }

    fn subsystem_path(&self, controller: ControllerKind) -> Result<&PathBuf> {
        self.subsystems.get(&controller).ok_or_else(|| {
            Error::resource_msg(format!(
                "the {} hierarchy is not mounted; cannot manage cgroup {:?}",
                controller, self.name
            ))
        })
    }

    fn lookup_parameter(&self, key: &str) -> Result<(ControllerKind, &'static ParameterSpec)> {
        if self.controllers.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "cgroup {:?} has no controllers enabled",
                self.name
            )));
        }

        for controller in &self.controllers {
            if let Ok(spec) = controller.lookup(key) {
                return Ok((*controller, spec));
            }
        }

        // Name every enabled controller, not just the one probed last.
        let enabled = self
            .controllers
            .iter()
            .map(|c| c.as_str())
            .collect::<Vec<_>>()
            .join(" or ");
        Err(Error::InvalidParameter {
            controller: enabled,
            key: key.to_owned(),
        })
    }

    fn deleted(&self) -> Error {
        Error::NotFound(format!("cgroup {:?} has been deleted", self.name))
    }

    fn not_created(&self) -> Error {
        Error::NotFound(format!("cgroup {:?} has not been created", self.name))
    }

    #[cfg(test)]
    pub(crate) fn set_subsystem_path(&mut self, controller: ControllerKind, path: PathBuf) {
        self.subsystems.insert(controller, path);
    }
}

impl Drop for CgroupHandle {
    fn drop(&mut self) {
        // delete() already freed the claim for retired handles.
        if self.state != State::Deleted {
            common::release_name(&self.name);
        }
    }
}
