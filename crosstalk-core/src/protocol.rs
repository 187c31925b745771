//! Crosstalk wire protocol: frame types, service identifier and version.

use serde::{Deserialize, Serialize};

use crate::identity::PeerId;

/// Current protocol version. Used in beacons and invitations.
pub const PROTOCOL_VERSION: u8 = 1;

/// Service identifier shared by advertisers and browsers.
pub const SERVICE_TYPE: &str = "local-crosstalk";

/// All wire frame types. Encoding is bincode; framing is length-prefix (see wire module).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Frame {
    /// Discovery: advertiser announces presence and where to connect.
    Beacon {
        protocol_version: u8,
        service: String,
        peer: PeerId,
        listen_port: u16,
    },
    /// Discovery: advertiser stopped; browsers drop it immediately.
    Withdraw { peer: PeerId },
    /// First frame on a joiner's connection: ask to join the host's session.
    Invite {
        protocol_version: u8,
        service: String,
        peer: PeerId,
    },
    /// Host accepted the invitation.
    Accept { peer: PeerId },
    /// One codec-encoded chat message.
    Payload { data: Vec<u8> },
    /// Graceful session teardown.
    Leave { peer: PeerId },
}

impl Frame {
    /// Whether a beacon or invite speaks our service and version.
    pub fn is_compatible(protocol_version: u8, service: &str) -> bool {
        protocol_version == PROTOCOL_VERSION && service == SERVICE_TYPE
    }

    pub fn beacon(peer: PeerId, listen_port: u16) -> Self {
        Frame::Beacon {
            protocol_version: PROTOCOL_VERSION,
            service: SERVICE_TYPE.to_string(),
            peer,
            listen_port,
        }
    }

    pub fn invite(peer: PeerId) -> Self {
        Frame::Invite {
            protocol_version: PROTOCOL_VERSION,
            service: SERVICE_TYPE.to_string(),
            peer,
        }
    }
}
