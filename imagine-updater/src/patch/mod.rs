//! Applying downloaded files to the install directory.
//!
//! A fetch streams into a [`StagedFile`] created next to the destination.
//! [`PatchApplier::commit`] checks the received size (and optionally the
//! SHA-256 digest), renames the staged file over the destination and then
//! records the new hash in the [`HashCatalog`](crate::catalog::HashCatalog).

mod applier;
mod error;
mod staged;

pub use applier::PatchApplier;
pub use error::{PatchError, PatchResult};
pub use staged::{StagedFile, STAGING_PREFIX, STAGING_SUFFIX};
