//! Device identity types: MAC addresses and broker client ids.

use std::fmt;
use std::str::FromStr;

use crate::error::GatewayError;

/// Canonical colon-separated MAC address, e.g. `aa:bb:cc:dd:ee:ff`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Mac([u8; 6]);

impl Mac {
    /// Renders the canonical colon-hex form.
    pub fn to_colon_string(&self) -> String {
        self.0
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect::<Vec<_>>()
            .join(":")
    }

    /// Renders the underscore-hex form used inside broker client ids.
    pub fn to_underscore_string(&self) -> String {
        self.0
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect::<Vec<_>>()
            .join("_")
    }

    fn parse_octets(s: &str, sep: char) -> Result<[u8; 6], GatewayError> {
        let parts: Vec<&str> = s.split(sep).collect();
        if parts.len() != 6 {
            return Err(GatewayError::InvalidMac(s.to_string()));
        }
        let mut octets = [0u8; 6];
        for (i, part) in parts.iter().enumerate() {
            if part.len() != 2 {
                return Err(GatewayError::InvalidMac(s.to_string()));
            }
            octets[i] =
                u8::from_str_radix(part, 16).map_err(|_| GatewayError::InvalidMac(s.to_string()))?;
        }
        Ok(octets)
    }

    /// Parses the underscore-hex form (`aa_bb_cc_dd_ee_ff`) used in client ids.
    pub fn from_underscore_str(s: &str) -> Result<Self, GatewayError> {
        Ok(Self(Self::parse_octets(s, '_')?))
    }
}

impl FromStr for Mac {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Self::parse_octets(s, ':')?))
    }
}

impl fmt::Display for Mac {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_colon_string())
    }
}

/// Parsed broker client id: `group@@@mac@@@uuid`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientId {
    pub group: String,
    pub mac: Mac,
    pub uuid: String,
}

impl ClientId {
    /// Full `group@@@mac_with_underscores@@@uuid` form, as published on the
    /// `devices/p2p/<fullClientId>` topic.
    pub fn full(&self) -> String {
        format!(
            "{}@@@{}@@@{}",
            self.group,
            self.mac.to_underscore_string(),
            self.uuid
        )
    }
}

impl FromStr for ClientId {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split("@@@").collect();
        let [group, mac, uuid] = parts[..] else {
            return Err(GatewayError::InvalidClientId(s.to_string()));
        };
        if group.is_empty() || uuid.is_empty() {
            return Err(GatewayError::InvalidClientId(s.to_string()));
        }
        Ok(Self {
            group: group.to_string(),
            mac: Mac::from_underscore_str(mac)?,
            uuid: uuid.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mac_round_trips_colon_form() {
        let mac: Mac = "aa:bb:cc:dd:ee:ff".parse().unwrap();
        assert_eq!(mac.to_colon_string(), "aa:bb:cc:dd:ee:ff");
        assert_eq!(mac.to_underscore_string(), "aa_bb_cc_dd_ee_ff");
    }

    #[test]
    fn mac_rejects_malformed_octets() {
        assert!("aa:bb:cc".parse::<Mac>().is_err());
        assert!("zz:bb:cc:dd:ee:ff".parse::<Mac>().is_err());
    }

    #[test]
    fn client_id_parses_triple() {
        let id: ClientId = "toys@@@aa_bb_cc_dd_ee_ff@@@session-uuid".parse().unwrap();
        assert_eq!(id.group, "toys");
        assert_eq!(id.mac.to_colon_string(), "aa:bb:cc:dd:ee:ff");
        assert_eq!(id.uuid, "session-uuid");
        assert_eq!(id.full(), "toys@@@aa_bb_cc_dd_ee_ff@@@session-uuid");
    }

    #[test]
    fn client_id_rejects_wrong_shape() {
        assert!("toys@@@aa_bb_cc_dd_ee_ff".parse::<ClientId>().is_err());
        assert!("@@@aa_bb_cc_dd_ee_ff@@@uuid".parse::<ClientId>().is_err());
    }
}
