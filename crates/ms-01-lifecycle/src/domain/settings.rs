//! Per-station settings

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use rand::Rng;

/// IMEI that ships with the default configuration.
pub const DEFAULT_IMEI: &str = "000000000000000";

/// Default FBTS control port.
pub const DEFAULT_FBTS_PORT: u16 = 5555;

/// Which SIM the station uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SimType {
    /// No SIM; only emergency/limited service via PLMN selection.
    #[default]
    None,
    /// Card in the layer-1 reader.
    Reader,
    /// Built-in test card.
    Test,
    /// Remote card over SAP.
    Sap,
}

impl FromStr for SimType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "reader" => Ok(Self::Reader),
            "test" => Ok(Self::Test),
            "sap" => Ok(Self::Sap),
            other => Err(format!("unknown SIM type '{other}'")),
        }
    }
}

/// Dedicated channel capability of the station.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelCapability {
    /// Signalling only; no traffic channels.
    Sdcch,
    /// Signalling and full-rate traffic channels.
    #[default]
    Tch,
}

impl FromStr for ChannelCapability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sdcch" => Ok(Self::Sdcch),
            "tch" | "sdcch+tchf" => Ok(Self::Tch),
            other => Err(format!("unknown channel capability '{other}'")),
        }
    }
}

/// Parameters of the built-in test card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCardSettings {
    pub rplmn_mcc: u16,
    pub rplmn_mnc: u16,
    pub lac: u16,
    pub tmsi: u32,
    pub imsi_attached: bool,
}

impl Default for TestCardSettings {
    fn default() -> Self {
        Self {
            rplmn_mcc: 1,
            rplmn_mnc: 1,
            lac: 0,
            tmsi: shared_types::TMSI_UNKNOWN,
            imsi_attached: false,
        }
    }
}

/// Settings of one mobile station.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MsSettings {
    /// Unix socket of the layer-1/2 process.
    pub layer2_socket_path: PathBuf,
    /// Unix socket of the SAP server.
    pub sap_socket_path: PathBuf,
    pub sim: SimType,
    pub test_card: TestCardSettings,
    /// 15-digit IMEI.
    pub imei: String,
    /// Replace the IMEI with random digits at power-on.
    pub imei_random: bool,
    pub channel_capability: ChannelCapability,
    /// UDP port of the FBTS ingest socket.
    pub fbts_port: u16,
}

impl Default for MsSettings {
    fn default() -> Self {
        Self {
            layer2_socket_path: PathBuf::from("/tmp/osmocom_l2"),
            sap_socket_path: PathBuf::from("/tmp/osmocom_sap"),
            sim: SimType::default(),
            test_card: TestCardSettings::default(),
            imei: DEFAULT_IMEI.to_string(),
            imei_random: false,
            channel_capability: ChannelCapability::default(),
            fbts_port: DEFAULT_FBTS_PORT,
        }
    }
}

impl MsSettings {
    /// Replace the IMEI with 14 random digits plus a Luhn check digit.
    pub fn randomize_imei<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let body: String = (0..14)
            .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
            .collect();
        let check = luhn_check_digit(&body);
        self.imei = format!("{body}{check}");
    }

    /// Whether the IMEI is the shared all-zero default.
    #[must_use]
    pub fn has_default_imei(&self) -> bool {
        self.imei == DEFAULT_IMEI
    }
}

impl fmt::Display for SimType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Reader => "reader",
            Self::Test => "test",
            Self::Sap => "sap",
        };
        f.write_str(name)
    }
}

/// Luhn check digit over a string of decimal digits.
fn luhn_check_digit(digits: &str) -> u8 {
    let sum: u32 = digits
        .bytes()
        .rev()
        .enumerate()
        .map(|(i, b)| {
            let d = u32::from(b - b'0');
            if i % 2 == 0 {
                let doubled = d * 2;
                if doubled > 9 { doubled - 9 } else { doubled }
            } else {
                d
            }
        })
        .sum();
    ((10 - (sum % 10)) % 10) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_default_settings() {
        let s = MsSettings::default();
        assert!(s.has_default_imei());
        assert_eq!(s.sim, SimType::None);
        assert_eq!(s.fbts_port, DEFAULT_FBTS_PORT);
    }

    #[test]
    fn test_random_imei_has_valid_check_digit() {
        let mut s = MsSettings::default();
        let mut rng = StdRng::seed_from_u64(7);
        s.randomize_imei(&mut rng);

        assert_eq!(s.imei.len(), 15);
        assert!(s.imei.bytes().all(|b| b.is_ascii_digit()));
        let check = s.imei.as_bytes()[14] - b'0';
        assert_eq!(check, luhn_check_digit(&s.imei[..14]));
        assert!(!s.has_default_imei());
    }

    #[test]
    fn test_luhn_known_value() {
        // 49015420323751 → check digit 8
        assert_eq!(luhn_check_digit("49015420323751"), 8);
    }

    #[test]
    fn test_parse_sim_type() {
        assert_eq!("TEST".parse::<SimType>(), Ok(SimType::Test));
        assert_eq!("sap".parse::<SimType>(), Ok(SimType::Sap));
        assert!("usim".parse::<SimType>().is_err());
    }

    #[test]
    fn test_parse_channel_capability() {
        assert_eq!("sdcch".parse::<ChannelCapability>(), Ok(ChannelCapability::Sdcch));
        assert_eq!("tch".parse::<ChannelCapability>(), Ok(ChannelCapability::Tch));
    }
}
