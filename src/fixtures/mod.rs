//! Platform fixtures: names, CLI-driven setup/teardown and REST lookups

pub mod api;
pub mod cleanup;
pub mod names;
pub mod platform;

pub use api::ApiClient;
pub use cleanup::{Cleanup, Cleanups};
pub use names::{NameGenerator, ResourceKind};
pub use platform::{hello_world_app, OrgRole, SpaceRole, TestUser};
