use serde::{Deserialize, Serialize};

/// Client application details parsed from the User-Agent header
///
/// The platform SDKs send agents in the form
/// `AppName/26 (Moto G; Android/14) CohortSDK/7`, where the device stanza
/// and the SDK stanza are both optional. Anything that doesn't match the
/// format yields the empty ClientInfo; parsing never fails a request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub app_name: Option<String>,
    pub app_version: Option<u32>,
    pub device_name: Option<String>,
    pub os_name: Option<String>,
    pub os_version: Option<String>,
    pub sdk_name: Option<String>,
    pub sdk_version: Option<u32>,
}

impl ClientInfo {
    pub fn is_unknown(&self) -> bool {
        *self == ClientInfo::default()
    }

    /// Parse a platform User-Agent string, falling back to the empty
    /// ClientInfo for browser agents and anything else unrecognized
    pub fn parse(user_agent: &str) -> ClientInfo {
        let user_agent = user_agent.trim();
        if user_agent.is_empty() {
            return ClientInfo::default();
        }

        let mut info = ClientInfo::default();

        let (head, rest) = match user_agent.split_once('(') {
            Some((head, rest)) => {
                let Some((device_stanza, tail)) = rest.split_once(')') else {
                    // Unbalanced parens, not one of ours
                    return ClientInfo::default();
                };
                parse_device_stanza(device_stanza, &mut info);
                (head.trim(), tail.trim())
            }
            None => {
                // No device stanza: "AppName/26 CohortSDK/7" or "AppName/26"
                match user_agent.rsplit_once(' ') {
                    Some((head, tail)) if tail.contains('/') && head.contains('/') => (head, tail),
                    _ => (user_agent, ""),
                }
            }
        };

        if let Some((name, version)) = split_versioned(head) {
            info.app_name = Some(name);
            info.app_version = version.parse().ok();
        } else if !head.is_empty() {
            info.app_name = Some(head.to_string());
        }

        if let Some((name, version)) = split_versioned(rest) {
            info.sdk_name = Some(name);
            info.sdk_version = version.parse().ok();
        }

        // A stray paren-less agent like "Mozilla/5.0 Gecko/20100101" would
        // land here with app fields only; that is acceptable, it still
        // never matches a min-version table entry without an OS name.
        info
    }
}

/// The parenthesized stanza: `Device Name; OS Name/version` or `OS Name/version`
fn parse_device_stanza(stanza: &str, info: &mut ClientInfo) {
    let stanza = stanza.trim();
    let (device, os) = match stanza.split_once(';') {
        Some((device, os)) => (Some(device.trim()), os.trim()),
        None => (None, stanza),
    };

    if let Some(device) = device {
        if !device.is_empty() {
            info.device_name = Some(device.to_string());
        }
    }
    if let Some((name, version)) = split_versioned(os) {
        info.os_name = Some(name);
        info.os_version = Some(version);
    } else if !os.is_empty() {
        info.os_name = Some(os.to_string());
    }
}

/// Split `Name With Spaces/version` on the final slash
fn split_versioned(value: &str) -> Option<(String, String)> {
    let value = value.trim();
    let (name, version) = value.rsplit_once('/')?;
    let (name, version) = (name.trim(), version.trim());
    if name.is_empty() || version.is_empty() {
        return None;
    }
    Some((name.to_string(), version.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_agent() {
        let info = ClientInfo::parse("Cardio Health/26 (Moto G; Android/14) CohortSDK/7");
        assert_eq!(info.app_name.as_deref(), Some("Cardio Health"));
        assert_eq!(info.app_version, Some(26));
        assert_eq!(info.device_name.as_deref(), Some("Moto G"));
        assert_eq!(info.os_name.as_deref(), Some("Android"));
        assert_eq!(info.os_version.as_deref(), Some("14"));
        assert_eq!(info.sdk_name.as_deref(), Some("CohortSDK"));
        assert_eq!(info.sdk_version, Some(7));
    }

    #[test]
    fn parses_agent_without_device_name() {
        let info = ClientInfo::parse("Cardio Health/26 (iPhone OS/9.0.2) CohortSDK/4");
        assert_eq!(info.device_name, None);
        assert_eq!(info.os_name.as_deref(), Some("iPhone OS"));
        assert_eq!(info.os_version.as_deref(), Some("9.0.2"));
    }

    #[test]
    fn parses_app_only_agent() {
        let info = ClientInfo::parse("Cardio Health/26");
        assert_eq!(info.app_name.as_deref(), Some("Cardio Health"));
        assert_eq!(info.app_version, Some(26));
        assert_eq!(info.os_name, None);
        assert_eq!(info.sdk_name, None);
    }

    #[test]
    fn parses_app_and_sdk_without_device() {
        let info = ClientInfo::parse("Cardio Health/26 CohortSDK/7");
        assert_eq!(info.app_version, Some(26));
        assert_eq!(info.sdk_version, Some(7));
    }

    #[test]
    fn empty_agent_is_unknown() {
        assert!(ClientInfo::parse("").is_unknown());
        assert!(ClientInfo::parse("   ").is_unknown());
    }

    #[test]
    fn unbalanced_parens_are_unknown() {
        assert!(ClientInfo::parse("Cardio Health/26 (Moto G; Android/14").is_unknown());
    }

    #[test]
    fn non_numeric_app_version_is_dropped() {
        let info = ClientInfo::parse("Mozilla/5.0 (Windows NT 10.0; Win64) Gecko/20100101");
        assert_eq!(info.app_name.as_deref(), Some("Mozilla"));
        // "5.0" is not a build number, so the version gate can never match it
        assert_eq!(info.app_version, None);
    }
}
