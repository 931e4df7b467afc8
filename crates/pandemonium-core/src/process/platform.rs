use serde::{Deserialize, Serialize};

/// Operating system family, used to gate effects that only work on some hosts.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[strum(ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Windows,
    Linux,
    #[strum(serialize = "macos")]
    MacOs,
    Other,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "linux") {
            Platform::Linux
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else {
            Platform::Other
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_parse_platform() {
        assert_eq!(Platform::from_str("windows").unwrap(), Platform::Windows);
        assert_eq!(Platform::from_str("LINUX").unwrap(), Platform::Linux);
        assert_eq!(Platform::from_str("macos").unwrap(), Platform::MacOs);
        assert!(Platform::from_str("beos").is_err());
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn test_current_on_linux() {
        assert_eq!(Platform::current(), Platform::Linux);
    }
}
