//! Typed benchmark parameters and layered role configuration.
//!
//! Parameters reach a runner through two merge steps. First, the host-level
//! [`RoleConfig`] is overridden by the test-level one ([`merge_layers`]). Second, the
//! general parameter and environment maps are overlaid with the maps specific to the
//! role that is executed ([`resolve`]), yielding an [`EffectiveConfig`].

pub mod config;
pub mod resolve;
pub mod role;
pub mod value;

pub use config::{EffectiveConfig, RoleConfig};
pub use resolve::{merge_layers, resolve};
pub use role::{ParseRoleError, Role};
pub use value::{EnvMap, ParamMap, ParamValue};
