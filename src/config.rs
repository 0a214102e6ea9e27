//! # Backend Configuration
//!
//! The framebuffer device path is resolved in this order:
//!
//! 1. an explicit path passed by the host
//! 2. the `FRAMEBUFFER` environment variable
//! 3. `/dev/fb0`

use std::ffi::OsString;
use std::path::{Path, PathBuf};

pub const DEFAULT_DEVICE: &str = "/dev/fb0";
pub const DEVICE_ENV: &str = "FRAMEBUFFER";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    pub device_path: PathBuf,
}

impl BackendConfig {
    pub fn from_env(explicit: Option<&Path>) -> Self {
        Self::resolve(explicit, std::env::var_os(DEVICE_ENV))
    }

    pub fn resolve(explicit: Option<&Path>, env_value: Option<OsString>) -> Self {
        let device_path = match (explicit, env_value) {
            (Some(path), _) => path.to_path_buf(),
            (None, Some(value)) if !value.is_empty() => PathBuf::from(value),
            _ => PathBuf::from(DEFAULT_DEVICE),
        };

        Self { device_path }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            device_path: PathBuf::from(DEFAULT_DEVICE),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_path_wins() {
        let config = BackendConfig::resolve(Some(Path::new("/dev/fb1")), Some("/dev/fb2".into()));
        assert_eq!(config.device_path, PathBuf::from("/dev/fb1"));
    }

    #[test]
    fn environment_used_without_explicit_path() {
        let config = BackendConfig::resolve(None, Some("/dev/fb2".into()));
        assert_eq!(config.device_path, PathBuf::from("/dev/fb2"));
    }

    #[test]
    fn falls_back_to_fb0() {
        assert_eq!(BackendConfig::resolve(None, None), BackendConfig::default());
        assert_eq!(
            BackendConfig::resolve(None, Some(OsString::new())).device_path,
            PathBuf::from(DEFAULT_DEVICE)
        );
    }
}
