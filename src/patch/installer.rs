//! Installing patches into a host image with per-patch failure isolation.

use std::{collections::HashSet, fmt, sync::Arc};

use crate::{
    metadata::{
        diagnostics::{Diagnostic, DiagnosticCategory, DiagnosticSeverity, Diagnostics},
        HostImage, MethodLocator, RoutineHandle, TargetDescriptor,
    },
    patch::{config::InstallConfig, context::PatchContext, Patch},
    patching::InstructionPatcher,
    Error, Result,
};

/// Outcome of [`PatchInstaller::install_all`].
#[derive(Debug, Default)]
pub struct InstallReport {
    /// Patches that were installed, with the routine each one modified
    pub installed: Vec<(String, RoutineHandle)>,
    /// Patches that failed, with the reason
    pub failed: Vec<(String, Error)>,
    /// Patches not attempted because an earlier one failed in fail-fast mode
    pub skipped: Vec<String>,
}

impl InstallReport {
    /// Returns true if every patch was installed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty()
    }

    /// Returns the failure of the named patch, if it failed.
    #[must_use]
    pub fn failure(&self, patch: &str) -> Option<&Error> {
        self.failed
            .iter()
            .find(|(name, _)| name == patch)
            .map(|(_, error)| error)
    }

    /// Returns the routine the named patch modified, if it was installed.
    #[must_use]
    pub fn installed_at(&self, patch: &str) -> Option<&RoutineHandle> {
        self.installed
            .iter()
            .find(|(name, _)| name == patch)
            .map(|(_, handle)| handle)
    }
}

impl fmt::Display for InstallReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} installed, {} failed, {} skipped",
            self.installed.len(),
            self.failed.len(),
            self.skipped.len()
        )?;
        for (name, error) in &self.failed {
            write!(f, "\n  {name}: {error}")?;
        }
        Ok(())
    }
}

/// Resolves, patches and commits routines for a set of independent patches.
///
/// # Examples
///
/// ```rust
/// use hookscope::patch::{InstallConfig, PatchInstaller};
///
/// let installer = PatchInstaller::new(InstallConfig::strict());
/// assert!(installer.config().fail_fast);
/// assert_eq!(installer.installed_count(), 0);
/// ```
#[derive(Debug)]
pub struct PatchInstaller {
    config: InstallConfig,
    diagnostics: Arc<Diagnostics>,
    installed: HashSet<String>,
}

impl Default for PatchInstaller {
    fn default() -> Self {
        Self::new(InstallConfig::default())
    }
}

impl PatchInstaller {
    /// Creates an installer with its own diagnostics sink.
    #[must_use]
    pub fn new(config: InstallConfig) -> Self {
        Self::with_diagnostics(config, Arc::new(Diagnostics::new()))
    }

    /// Creates an installer reporting into `diagnostics`.
    #[must_use]
    pub fn with_diagnostics(config: InstallConfig, diagnostics: Arc<Diagnostics>) -> Self {
        Self {
            config,
            diagnostics,
            installed: HashSet::new(),
        }
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &InstallConfig {
        &self.config
    }

    /// The diagnostics sink.
    #[must_use]
    pub fn diagnostics(&self) -> &Arc<Diagnostics> {
        &self.diagnostics
    }

    /// Number of patches installed so far.
    #[must_use]
    pub fn installed_count(&self) -> usize {
        self.installed.len()
    }

    /// Returns true if a patch with this name was installed.
    #[must_use]
    pub fn is_installed(&self, name: &str) -> bool {
        self.installed.contains(name)
    }

    /// Installs one patch.
    ///
    /// The target body is only replaced when every step succeeded; a failed install leaves the
    /// image untouched. Every failure is also recorded as an error diagnostic naming the patch.
    ///
    /// # Errors
    ///
    /// - [`Error::PatchAlreadyInstalled`] if the name was installed before and reinstalling is
    ///   not allowed
    /// - [`Error::PatchFailed`] wrapping the locator, directive, patcher or verifier error
    pub fn install(&mut self, image: &mut HostImage, patch: &dyn Patch) -> Result<RoutineHandle> {
        let name = patch.name().to_string();
        let target = patch.target();
        if self.installed.contains(&name) && !self.config.allow_reinstall {
            let error = Error::PatchAlreadyInstalled(name.clone());
            self.report(&name, &target, &error);
            return Err(error);
        }

        match self.try_install(image, patch, &target) {
            Ok(handle) => {
                self.diagnostics.push(
                    Diagnostic::new(
                        DiagnosticSeverity::Info,
                        DiagnosticCategory::Installation,
                        format!("patched {handle}"),
                    )
                    .with_patch(name.clone()),
                );
                for event in patch.events() {
                    log::debug!("{name} wires event {event}");
                }
                self.installed.insert(name);
                Ok(handle)
            }
            Err(source) => {
                self.report(&name, &target, &source);
                Err(Error::PatchFailed {
                    patch: name,
                    source: Box::new(source),
                })
            }
        }
    }

    fn try_install(
        &self,
        image: &mut HostImage,
        patch: &dyn Patch,
        target: &TargetDescriptor,
    ) -> Result<RoutineHandle> {
        let handle = MethodLocator::new(&*image).resolve(target)?;

        let (body, directives) = {
            let mut ctx = PatchContext::new(image, handle.clone())?;
            let directives = patch.directives(&mut ctx)?;
            (ctx.into_body(), directives)
        };

        let patched = InstructionPatcher::new()
            .with_verify(self.config.verify)
            .apply(&body, &directives)?;

        image.replace_body(&handle, patched)?;
        Ok(handle)
    }

    fn report(&self, patch: &str, target: &TargetDescriptor, error: &Error) {
        let category = match error {
            Error::UnresolvedTarget { .. } => DiagnosticCategory::Locator,
            Error::AnchorNotFound { .. } | Error::AmbiguousAnchor { .. } => {
                DiagnosticCategory::Anchor
            }
            _ => DiagnosticCategory::Installation,
        };
        let directive = match error {
            Error::AnchorNotFound { directive, .. }
            | Error::AmbiguousAnchor { directive, .. }
            | Error::OrphanedLabel { directive, .. }
            | Error::OrphanedBlock { directive, .. }
            | Error::InvalidSlotReference {
                directive: Some(directive),
                ..
            } => Some(*directive),
            _ => None,
        };

        // Locator errors already name the target
        let message = match error {
            Error::UnresolvedTarget { .. } => error.to_string(),
            _ => format!("{error} (target {target})"),
        };
        let mut diagnostic =
            Diagnostic::new(DiagnosticSeverity::Error, category, message).with_patch(patch);
        if let Some(directive) = directive {
            diagnostic = diagnostic.with_directive(directive);
        }
        self.diagnostics.push(diagnostic);
    }

    /// Installs every patch, isolating failures.
    ///
    /// A failing patch is recorded in the report and the remaining patches are still installed,
    /// unless [`InstallConfig::fail_fast`] is set, in which case the rest are skipped.
    pub fn install_all(&mut self, image: &mut HostImage, patches: &[&dyn Patch]) -> InstallReport {
        let mut report = InstallReport::default();
        let mut remaining = patches.iter();

        for patch in remaining.by_ref() {
            let name = patch.name().to_string();
            match self.install(image, *patch) {
                Ok(handle) => report.installed.push((name, handle)),
                Err(error) => {
                    report.failed.push((name, error));
                    if self.config.fail_fast {
                        break;
                    }
                }
            }
        }
        report
            .skipped
            .extend(remaining.map(|patch| patch.name().to_string()));

        log::info!("patch installation finished: {report}");
        report
    }
}
