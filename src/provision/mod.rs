//! Conda distribution and environment provisioning
//!
//! `Provisioner` sequences the cache restore, the guarded installation steps
//! and the cache save. `EnvironmentProbe` decides which steps are already done
//! by looking at the filesystem only.

pub mod layout;
pub mod packages;
pub mod probe;
pub mod provisioner;
pub mod settings;

pub use layout::{Layout, BOOTSTRAP_MARKER, PACKAGES_MARKER};
pub use packages::{pin_list, PackagePin, DEFAULT_PINS};
pub use probe::{EnvironmentProbe, Inspection, ProvisioningState};
pub use provisioner::{
    DiagnosticsStatus, ProvisionReport, Provisioner, RestoreStatus, SaveStatus, Step,
};
pub use settings::{detect_os_id, ProvisionSettings};
