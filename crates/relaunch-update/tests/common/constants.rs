//! Shared constants for test infrastructure

// Tags as published
pub const TAG_V1_0_0: &str = "v1.0.0";
pub const TAG_V1_1_0: &str = "v1.1.0";
pub const TAG_AUTO_TIMESTAMP: &str = "auto-20251110-0800";

// Cleaned forms
pub const VERSION_0_9: &str = "0.9";
pub const VERSION_1_0_0: &str = "1.0.0";
pub const VERSION_1_1_0: &str = "1.1.0";

// Asset names
pub const LAUNCHER_ASSET: &str = "launcher.zip";
pub const CLIENT_ASSET: &str = "client-to-update.zip";

// Release endpoints served by the mock server
pub const LAUNCHER_RELEASE_PATH: &str = "/repos/acme/launcher/releases/latest";
pub const CLIENT_RELEASE_PATH: &str = "/repos/acme/client/releases/latest";

// Payload bytes
pub const HELLO_WORLD: &[u8] = b"Hello, World!";
pub const HELLO_WORLD_SHA256: &str = "dffd6021bb2bd5b0af676290809ec3a53191dd81c7f70a4b28688a362182986f";
pub const WRONG_CHECKSUM: &str = "0000000000000000000000000000000000000000000000000000000000000000";

pub const TEST_TOKEN: &str = "test-token";

/// Launcher executable name used in install-root fixtures
pub fn launcher_exe_name() -> &'static str {
    if cfg!(windows) {
        "launcher.exe"
    } else {
        "launcher"
    }
}
