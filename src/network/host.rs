use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

use crate::{DeviceId, PortNo, SwitchId};

/// Switch port a host is plugged into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttachmentPoint {
    pub switch: SwitchId,
    pub port: PortNo,
}

impl fmt::Display for AttachmentPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}:{}", self.switch, self.port)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Host {
    pub device: DeviceId,
    pub ipv4: Ipv4Addr,
    pub attachment: Option<AttachmentPoint>,
    pub last_seen: DateTime<Utc>,
}

impl Host {
    pub fn new(device: impl Into<DeviceId>, ipv4: Ipv4Addr, attachment: Option<AttachmentPoint>) -> Self {
        Self {
            device: device.into(),
            ipv4,
            attachment,
            last_seen: Utc::now(),
        }
    }

    pub fn is_attached(&self) -> bool {
        self.attachment.is_some()
    }

    /// Same routing-relevant identity: address and attachment.
    pub fn same_location(&self, other: &Host) -> bool {
        self.ipv4 == other.ipv4 && self.attachment == other.attachment
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.attachment {
            Some(ap) => write!(f, "{} ({} at {})", self.device, self.ipv4, ap),
            None => write!(f, "{} ({} detached)", self.device, self.ipv4),
        }
    }
}
