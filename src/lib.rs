//! Declarative management of named Linux control groups (cgroup v1).
//!
//! A [`CgroupHandle`] represents one named group plus the controllers
//! enabled on it: tunables are recorded through typed setters, the group is
//! materialized on the host with [`CgroupHandle::create`], process ids are
//! attached with [`CgroupHandle::attach`] and the group is removed again
//! with [`CgroupHandle::delete`].
//!
//! ```no_run
//! use cgroup1::CgroupHandle;
//!
//! # fn main() -> cgroup1::Result<()> {
//! let mut group = CgroupHandle::cpu("batch-1")?;
//! group.set_cfs_quota_us(50_000)?;
//! group.set_shares(512)?;
//! group.create()?;
//! group.attach(None)?;
//! # Ok(())
//! # }
//! ```

pub mod common;
pub mod controller;
mod error;
mod handle;
mod test;

pub use controller::{ControllerKind, ParameterSpec, ValueKind};
pub use error::{Error, Result};
pub use handle::{CgroupHandle, State};
