//! idlemerge continuously propagates commits from one Subversion branch to
//! another: it replays each eligible source revision into a target working
//! copy, auto-resolves the handful of tree conflicts that are mechanically
//! safe, keeps commits minimal by reverting spurious merge churn, batches
//! metadata-only merges, and records the merge history in a structured
//! commit-message tail. Anything it cannot decide safely stops the queue
//! with a reproducible report instead of guessing.
pub mod config;
pub mod errors;
pub mod message;
pub mod notify;
pub mod orchestrator;
pub mod policy;
pub mod record_only;
pub mod resolver;
pub mod reverter;
pub mod revision;
pub mod svn;
