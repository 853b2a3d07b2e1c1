use std::fmt;

/// Four-part control plane version, reported verbatim to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VersionInfo {
    pub major: u32,
    pub minor: u32,
    pub build: u32,
    pub revision: u32,
}

impl VersionInfo {
    /// The protocol version clients check against before driving us.
    pub const CURRENT: VersionInfo = VersionInfo {
        major: 1,
        minor: 1,
        build: 0,
        revision: 0,
    };
}

impl fmt::Display for VersionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.build, self.revision
        )
    }
}

/// Runtime platform name in the vocabulary clients switch on.
pub fn platform_name() -> &'static str {
    if cfg!(target_os = "windows") {
        "WindowsPlayer"
    } else if cfg!(target_os = "macos") {
        "OSXPlayer"
    } else if cfg!(target_os = "android") {
        "Android"
    } else if cfg!(target_os = "ios") {
        "IPhonePlayer"
    } else {
        "LinuxPlayer"
    }
}
