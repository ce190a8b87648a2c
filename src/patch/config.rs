//! Installer configuration.

/// Settings for [`PatchInstaller`](crate::patch::PatchInstaller).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallConfig {
    /// Run the structural verifier after every patched body (default: true).
    pub verify: bool,

    /// Stop at the first failing patch instead of isolating it (default: false).
    pub fail_fast: bool,

    /// Allow installing a patch whose name is already installed (default: false).
    pub allow_reinstall: bool,
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            verify: true,
            fail_fast: false,
            allow_reinstall: false,
        }
    }
}

impl InstallConfig {
    /// Creates a new configuration with default settings.
    ///
    /// # Returns
    ///
    /// A new `InstallConfig` with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration that stops at the first failing patch.
    ///
    /// Suited to development hosts, where a version mismatch should be loud.
    ///
    /// # Returns
    ///
    /// A new `InstallConfig` with `fail_fast` set.
    #[must_use]
    pub fn strict() -> Self {
        Self {
            fail_fast: true,
            ..Self::default()
        }
    }

    /// Creates a configuration that skips post-edit verification.
    ///
    /// # Returns
    ///
    /// A new `InstallConfig` with `verify` cleared.
    #[must_use]
    pub fn lenient() -> Self {
        Self {
            verify: false,
            ..Self::default()
        }
    }

    /// Enables or disables post-edit verification.
    ///
    /// # Arguments
    ///
    /// * `verify` - Whether to verify patched bodies.
    ///
    /// # Returns
    ///
    /// The modified configuration (builder pattern).
    #[must_use]
    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    /// Enables or disables stopping at the first failure.
    ///
    /// # Arguments
    ///
    /// * `fail_fast` - Whether a failing patch aborts the remaining installs.
    ///
    /// # Returns
    ///
    /// The modified configuration (builder pattern).
    #[must_use]
    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// Allows or forbids installing the same patch twice.
    ///
    /// # Arguments
    ///
    /// * `allow` - Whether a repeated install is permitted.
    ///
    /// # Returns
    ///
    /// The modified configuration (builder pattern).
    #[must_use]
    pub fn with_allow_reinstall(mut self, allow: bool) -> Self {
        self.allow_reinstall = allow;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        let default = InstallConfig::new();
        assert!(default.verify && !default.fail_fast && !default.allow_reinstall);
        assert!(InstallConfig::strict().fail_fast);
        assert!(!InstallConfig::lenient().verify);

        let custom = InstallConfig::strict()
            .with_verify(false)
            .with_allow_reinstall(true)
            .with_fail_fast(false);
        assert_eq!(
            custom,
            InstallConfig {
                verify: false,
                fail_fast: false,
                allow_reinstall: true,
            }
        );
    }
}
