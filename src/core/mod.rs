pub mod coordinator;
pub mod identity;

pub use coordinator::{Coordinator, Phase};
pub use identity::{DISCOVERY_DOMAIN, ServiceIdentity};
