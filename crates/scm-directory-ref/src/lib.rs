//! # scm-directory-ref: placement routing for the Storage Container Manager
//!
//! Three small, independently testable pieces the Pipeline Manager (§4.5)
//! consults when it creates a pipeline:
//!
//! - [`PlacementPolicy`]: "which `factor` nodes, from these candidates" —
//!   expressed as a narrow trait rather than a class hierarchy, per §9's
//!   "dynamic dispatch" redesign note.
//! - [`DnsToSwitchResolver`]: hostname/IP -> topology location string,
//!   pluggable and cached (§4.4 `register`).
//! - [`SameMemberIndex`] + [`exclusion_set`]: the bookkeeping behind "no
//!   two OPEN pipelines with an identical member set" and "exclude every
//!   node already committed to an open pipeline of this class" (§4.5).

mod exclusion;
mod placement;
mod topology;

pub use exclusion::{exclusion_set, SameMemberIndex};
pub use placement::{PlacementError, PlacementPolicy, RandomPlacementPolicy, TopologyAwarePlacementPolicy};
pub use topology::{CachedDnsToSwitchResolver, DEFAULT_RACK, DnsToSwitchResolver, StaticDnsToSwitchResolver};
