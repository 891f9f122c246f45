use std::fmt;

use crate::error::{Error, Result};

/// Closed set of cgroup v1 controllers this crate knows how to drive.
///
/// Each variant carries its own parameter catalog; adding a controller means
/// adding a variant and one table, not another copy of the lifecycle logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ControllerKind {
    Cpu,
    Blkio,
    Memory,
}

pub const CONTROLLERS: &[ControllerKind] = &[
    ControllerKind::Cpu,
    ControllerKind::Blkio,
    ControllerKind::Memory,
];

impl ControllerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ControllerKind::Cpu => "cpu",
            ControllerKind::Blkio => "blkio",
            ControllerKind::Memory => "memory",
        }
    }

    /// Resolves a controller name as passed in by a caller that works with
    /// strings (e.g. an embedding layer). Unknown names yield `None`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "cpu" => Some(ControllerKind::Cpu),
            "blkio" => Some(ControllerKind::Blkio),
            "memory" => Some(ControllerKind::Memory),
            _ => None,
        }
    }

    /// The tunables this controller accepts.
    pub fn parameters(self) -> &'static [ParameterSpec] {
        match self {
            ControllerKind::Cpu => CPU_PARAMETERS,
            ControllerKind::Blkio => BLKIO_PARAMETERS,
            ControllerKind::Memory => MEMORY_PARAMETERS,
        }
    }

    pub(crate) fn lookup(self, key: &str) -> Result<&'static ParameterSpec> {
        self.parameters()
            .iter()
            .find(|p| p.name == key)
            .ok_or_else(|| Error::InvalidParameter {
                controller: self.as_str().to_owned(),
                key: key.to_owned(),
            })
    }
}

impl fmt::Display for ControllerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Value shape accepted by a control file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// Signed integer limit where `-1` means unlimited.
    SignedLimit,
    /// Strictly positive integer weight.
    Weight,
    /// Device throttle entry in the form `MAJOR:MINOR RATE`.
    DeviceRate,
}

/// One row of a controller's parameter catalog.
#[derive(Debug)]
pub struct ParameterSpec {
    /// Key accepted by [`crate::CgroupHandle::set`].
    pub name: &'static str,
    /// Control file the encoded value is written to.
    pub file: &'static str,
    pub kind: ValueKind,
}

const CPU_PARAMETERS: &[ParameterSpec] = &[
    ParameterSpec {
        name: "cfs_quota_us",
        file: "cpu.cfs_quota_us",
        kind: ValueKind::SignedLimit,
    },
    ParameterSpec {
        name: "shares",
        file: "cpu.shares",
        kind: ValueKind::Weight,
    },
];

const BLKIO_PARAMETERS: &[ParameterSpec] = &[
    ParameterSpec {
        name: "throttle.read_bps_device",
        file: "blkio.throttle.read_bps_device",
        kind: ValueKind::DeviceRate,
    },
    ParameterSpec {
        name: "throttle.write_bps_device",
        file: "blkio.throttle.write_bps_device",
        kind: ValueKind::DeviceRate,
    },
];

const MEMORY_PARAMETERS: &[ParameterSpec] = &[
    ParameterSpec {
        name: "limit_in_bytes",
        file: "memory.limit_in_bytes",
        kind: ValueKind::SignedLimit,
    },
    ParameterSpec {
        name: "soft_limit_in_bytes",
        file: "memory.soft_limit_in_bytes",
        kind: ValueKind::SignedLimit,
    },
];

impl ParameterSpec {
    /// Checks `value` against the parameter's shape. Nothing is recorded
    /// before this passes.
    pub(crate) fn validate(&self, value: &str) -> Result<()> {
        match self.kind {
            ValueKind::SignedLimit => {
                let parsed: i64 = value
                    .parse()
                    .map_err(|_| self.invalid(value, "expected a signed integer"))?;
                if parsed < -1 || parsed == 0 {
                    return Err(self.invalid(value, "expected -1 (unlimited) or a positive integer"));
                }
            }
            ValueKind::Weight => {
                let parsed: u64 = value
                    .parse()
                    .map_err(|_| self.invalid(value, "expected a positive integer"))?;
                if parsed == 0 {
                    return Err(self.invalid(value, "weight must be greater than zero"));
                }
            }
            ValueKind::DeviceRate => {
                let fields: Vec<&str> = value.split_ascii_whitespace().collect();
                if fields.len() != 2 {
                    return Err(self.invalid(value, "expected \"MAJOR:MINOR RATE\""));
                }
                if parse_device_number(fields[0]).is_none() {
                    return Err(self.invalid(value, "malformed device number"));
                }
                if fields[1].parse::<u64>().is_err() {
                    return Err(self.invalid(value, "rate must be a decimal byte count"));
                }
            }
        }

        Ok(())
    }

    fn invalid(&self, value: &str, reason: &str) -> Error {
        Error::InvalidValue {
            key: self.name.to_owned(),
            value: value.to_owned(),
            reason: reason.to_owned(),
        }
    }
}

pub(crate) fn parse_device_number(entry: &str) -> Option<(u64, u64)> {
    let numbers: Vec<&str> = entry.split_terminator(':').collect();
    if numbers.len() != 2 {
        return None;
    }

    Some((numbers[0].parse().ok()?, numbers[1].parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_controller_names_round_trip() {
        for kind in CONTROLLERS {
            assert_eq!(ControllerKind::from_name(kind.as_str()), Some(*kind));
        }
        assert_eq!(ControllerKind::from_name("net_cls"), None);
        assert_eq!(ControllerKind::from_name(""), None);
    }

    #[test]
    fn test_lookup_unknown_key() {
        let err = ControllerKind::Cpu.lookup("throttle.read_bps_device").unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { .. }));
        assert!(format!("{}", err).contains("cpu"));
    }

    #[test]
    fn test_lookup_maps_key_to_control_file() {
        let spec = ControllerKind::Cpu.lookup("cfs_quota_us").expect("cpu quota");
        assert_eq!(spec.file, "cpu.cfs_quota_us");

        let spec = ControllerKind::Blkio
            .lookup("throttle.write_bps_device")
            .expect("blkio write throttle");
        assert_eq!(spec.file, "blkio.throttle.write_bps_device");
    }

    #[test]
    fn test_signed_limit_accepts_unlimited_sentinel() {
        let spec = ControllerKind::Cpu.lookup("cfs_quota_us").unwrap();
        assert!(spec.validate("-1").is_ok());
        assert!(spec.validate("50000").is_ok());
    }

    #[test]
    fn test_signed_limit_rejects_out_of_range() {
        let spec = ControllerKind::Cpu.lookup("cfs_quota_us").unwrap();
        for value in &["-2", "0", "10.5", "forever", ""] {
            let err = spec.validate(value).unwrap_err();
            assert!(
                matches!(err, Error::InvalidValue { .. }),
                "{:?} should be rejected",
                value
            );
        }
    }

    #[test]
    fn test_weight_rejects_zero_and_negative() {
        let spec = ControllerKind::Cpu.lookup("shares").unwrap();
        assert!(spec.validate("512").is_ok());
        for value in &["0", "-512", "many"] {
            assert!(matches!(
                spec.validate(value).unwrap_err(),
                Error::InvalidValue { .. }
            ));
        }
    }

    #[test]
    fn test_device_rate_format() {
        let spec = ControllerKind::Blkio.lookup("throttle.read_bps_device").unwrap();
        assert!(spec.validate("8:0 1048576").is_ok());
        for value in &["8:0", "8 1048576", "8:0:1 5", "8:0 fast", "8:x 5", "8:0 5 extra"] {
            let err = spec.validate(value).unwrap_err();
            assert!(
                matches!(err, Error::InvalidValue { .. }),
                "{:?} should be rejected",
                value
            );
        }
    }

    #[test]
    fn test_parse_device_number() {
        assert_eq!(parse_device_number("8:0"), Some((8, 0)));
        assert_eq!(parse_device_number("253:16"), Some((253, 16)));
        assert_eq!(parse_device_number("8"), None);
        assert_eq!(parse_device_number("8:0:1"), None);
        assert_eq!(parse_device_number("sda:0"), None);
    }

    #[test]
    fn test_memory_limits_use_unlimited_sentinel() {
        let spec = ControllerKind::Memory.lookup("limit_in_bytes").unwrap();
        assert!(spec.validate("-1").is_ok());
        assert!(spec.validate("268435456").is_ok());
        assert!(matches!(
            spec.validate("-5").unwrap_err(),
            Error::InvalidValue { .. }
        ));
    }
}
